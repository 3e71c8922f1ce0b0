// Copyright (c) 2017-2022, Lawrence Livermore National Security, LLC and other CEED contributors.
// All Rights Reserved. See the top-level LICENSE and NOTICE files for details.
//
// SPDX-License-Identifier: BSD-2-Clause
//
// This file is part of CEED:  http://github.com/ceed

//! A Ceed Operator defines the finite/spectral element operator associated to
//! a QFunction. A Ceed Operator connects ElemRestrictions, Bases, and
//! QFunctions.

use crate::prelude::*;
use crate::qfunction::QFunctionCore;

// -----------------------------------------------------------------------------
// Operator field bindings
// -----------------------------------------------------------------------------
#[derive(Clone, Debug)]
enum FieldBasis {
    Some(crate::Basis),
    Collocated,
    None,
}

#[derive(Clone, Debug)]
enum FieldVector {
    Some(crate::Vector),
    Active,
    None,
}

/// A QFunction field bound to an ElemRestriction, Basis, and data vector
#[derive(Clone, Debug)]
pub struct OperatorField {
    name: String,
    size: usize,
    emode: crate::EvalMode,
    is_input: bool,
    restriction: Option<crate::ElemRestriction>,
    basis: FieldBasis,
    vector: FieldVector,
}

impl OperatorField {
    /// Get the name of an OperatorField
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the number of quadrature components of an OperatorField
    pub fn size(&self) -> usize {
        self.size
    }

    /// Get the evaluation mode of an OperatorField
    pub fn eval_mode(&self) -> crate::EvalMode {
        self.emode
    }

    /// Get the ElemRestriction of an OperatorField, if any
    pub fn elem_restriction(&self) -> ElemRestrictionOpt<'_> {
        match &self.restriction {
            Some(rstr) => ElemRestrictionOpt::Some(rstr),
            None => ElemRestrictionOpt::None,
        }
    }

    /// Get the Basis of an OperatorField, if any
    pub fn basis(&self) -> BasisOpt<'_> {
        match &self.basis {
            FieldBasis::Some(basis) => BasisOpt::Some(basis),
            FieldBasis::Collocated => BasisOpt::Collocated,
            FieldBasis::None => BasisOpt::None,
        }
    }

    /// Get the data vector of an OperatorField, if any
    pub fn vector(&self) -> VectorOpt<'_> {
        match &self.vector {
            FieldVector::Some(vector) => VectorOpt::Some(vector),
            FieldVector::Active => VectorOpt::Active,
            FieldVector::None => VectorOpt::None,
        }
    }
}

// -----------------------------------------------------------------------------
// Operator shape, cached by check()
// -----------------------------------------------------------------------------
#[derive(Clone, Copy, Debug)]
pub(crate) struct OperatorShape {
    pub(crate) nelem: usize,
    pub(crate) nqpts: usize,
    pub(crate) input_size: usize,
    pub(crate) output_size: usize,
}

#[derive(Debug)]
struct OperatorData {
    qf: QFunctionCore,
    dqf: Option<QFunctionCore>,
    dqft: Option<QFunctionCore>,
    fields: Vec<OperatorField>,
    shape: Option<OperatorShape>,
}

fn merge(slot: &mut Option<usize>, value: usize) -> Option<usize> {
    match *slot {
        Some(existing) if existing != value => Some(existing),
        _ => {
            *slot = Some(value);
            None
        }
    }
}

// Resolve the element count, quadrature size, and active vector sizes from
// the field bindings, verifying they are mutually consistent.
fn validate(data: &OperatorData) -> crate::Result<OperatorShape> {
    let qf_inputs = data.qf.inputs()?;
    let qf_outputs = data.qf.outputs()?;

    let mut nelem: Option<usize> = None;
    let mut nqpts: Option<usize> = None;
    let mut input_size: Option<usize> = None;
    let mut output_size: Option<usize> = None;

    let declared = qf_inputs
        .iter()
        .map(|field| (field, true))
        .chain(qf_outputs.iter().map(|field| (field, false)));
    for (qfield, is_input) in declared {
        let name = qfield.name();
        let field = data
            .fields
            .iter()
            .find(|of| of.name == name)
            .ok_or_else(|| Error::FieldNotBound {
                name: name.to_string(),
            })?;
        let size = qfield.size();
        let emode = qfield.eval_mode();

        match emode {
            crate::EvalMode::Weight => {
                if !is_input {
                    return Err(Error::UnsupportedEvalMode {
                        name: name.to_string(),
                        emode,
                    });
                }
                if size != 1 {
                    return Err(Error::FieldSizeMismatch {
                        name: name.to_string(),
                        expected: 1,
                        found: size,
                    });
                }
                if field.restriction.is_some() {
                    return Err(Error::InvalidDimensions {
                        what: format!("field {:?}: quadrature weights take no restriction", name),
                    });
                }
                if !matches!(field.vector, FieldVector::None) {
                    return Err(Error::InvalidDimensions {
                        what: format!("field {:?}: quadrature weights take no vector", name),
                    });
                }
                let basis = match &field.basis {
                    FieldBasis::Some(basis) => basis,
                    _ => {
                        return Err(Error::InvalidDimensions {
                            what: format!("field {:?}: quadrature weights require a basis", name),
                        })
                    }
                };
                if let Some(expected) = merge(&mut nqpts, basis.num_quadrature_points()) {
                    return Err(Error::QuadratureSizeMismatch {
                        name: name.to_string(),
                        expected,
                        found: basis.num_quadrature_points(),
                    });
                }
                continue;
            }
            crate::EvalMode::None => {
                let rstr = field.restriction.as_ref().ok_or_else(|| {
                    Error::InvalidDimensions {
                        what: format!("field {:?}: collocated field requires a restriction", name),
                    }
                })?;
                if size != rstr.num_components() {
                    return Err(Error::FieldSizeMismatch {
                        name: name.to_string(),
                        expected: rstr.num_components(),
                        found: size,
                    });
                }
                if matches!(field.basis, FieldBasis::Some(_)) {
                    return Err(Error::InvalidDimensions {
                        what: format!("field {:?}: collocated field takes no basis", name),
                    });
                }
                if let Some(expected) = merge(&mut nelem, rstr.num_elements()) {
                    return Err(Error::ElementCountMismatch {
                        name: name.to_string(),
                        expected,
                        found: rstr.num_elements(),
                    });
                }
                if let Some(expected) = merge(&mut nqpts, rstr.elem_size()) {
                    return Err(Error::QuadratureSizeMismatch {
                        name: name.to_string(),
                        expected,
                        found: rstr.elem_size(),
                    });
                }
            }
            crate::EvalMode::Interp | crate::EvalMode::Grad => {
                let rstr = field.restriction.as_ref().ok_or_else(|| {
                    Error::InvalidDimensions {
                        what: format!("field {:?}: basis field requires a restriction", name),
                    }
                })?;
                let basis = match &field.basis {
                    FieldBasis::Some(basis) => basis,
                    _ => {
                        return Err(Error::InvalidDimensions {
                            what: format!("field {:?}: evaluation mode requires a basis", name),
                        })
                    }
                };
                let expected_size = if emode == crate::EvalMode::Interp {
                    basis.num_components()
                } else {
                    basis.dimension() * basis.num_components()
                };
                if size != expected_size {
                    return Err(Error::FieldSizeMismatch {
                        name: name.to_string(),
                        expected: expected_size,
                        found: size,
                    });
                }
                if rstr.elem_size() != basis.num_nodes() {
                    return Err(Error::InvalidDimensions {
                        what: format!(
                            "field {:?}: restriction element size {} does not match basis nodes {}",
                            name,
                            rstr.elem_size(),
                            basis.num_nodes()
                        ),
                    });
                }
                if rstr.num_components() != basis.num_components() {
                    return Err(Error::InvalidDimensions {
                        what: format!(
                            "field {:?}: restriction components {} do not match basis components {}",
                            name,
                            rstr.num_components(),
                            basis.num_components()
                        ),
                    });
                }
                if let Some(expected) = merge(&mut nelem, rstr.num_elements()) {
                    return Err(Error::ElementCountMismatch {
                        name: name.to_string(),
                        expected,
                        found: rstr.num_elements(),
                    });
                }
                if let Some(expected) = merge(&mut nqpts, basis.num_quadrature_points()) {
                    return Err(Error::QuadratureSizeMismatch {
                        name: name.to_string(),
                        expected,
                        found: basis.num_quadrature_points(),
                    });
                }
            }
            crate::EvalMode::Div | crate::EvalMode::Curl => {
                return Err(Error::UnsupportedEvalMode {
                    name: name.to_string(),
                    emode,
                });
            }
        }

        // Data vector checks for non-weight fields
        let lsize = field
            .restriction
            .as_ref()
            .map(|rstr| rstr.lvector_size())
            .unwrap_or(0);
        match &field.vector {
            FieldVector::Some(vector) => {
                if vector.length() != lsize {
                    return Err(Error::FieldSizeMismatch {
                        name: name.to_string(),
                        expected: lsize,
                        found: vector.length(),
                    });
                }
            }
            FieldVector::Active => {
                let slot = if is_input {
                    &mut input_size
                } else {
                    &mut output_size
                };
                if let Some(expected) = merge(slot, lsize) {
                    return Err(Error::FieldSizeMismatch {
                        name: name.to_string(),
                        expected,
                        found: lsize,
                    });
                }
            }
            FieldVector::None => {
                return Err(Error::InvalidDimensions {
                    what: format!("field {:?}: requires a data vector", name),
                });
            }
        }
    }

    Ok(OperatorShape {
        nelem: nelem.unwrap_or(0),
        nqpts: nqpts.unwrap_or(0),
        input_size: input_size.ok_or(Error::NoActiveField { dir: "input" })?,
        output_size: output_size.ok_or(Error::NoActiveField { dir: "output" })?,
    })
}

// -----------------------------------------------------------------------------
// Operator core
// -----------------------------------------------------------------------------
#[derive(Debug)]
pub(crate) struct OperatorCore {
    inner: Rc<RefCell<OperatorData>>,
    ceed: crate::Ceed,
}

impl Clone for OperatorCore {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
            ceed: self.ceed.clone(),
        }
    }
}

impl OperatorCore {
    pub(crate) fn ensure_shape(&self) -> crate::Result<OperatorShape> {
        let mut data = self
            .inner
            .try_borrow_mut()
            .map_err(|_| Error::OperatorBorrowed)?;
        if let Some(shape) = data.shape {
            return Ok(shape);
        }
        let shape = validate(&data)?;
        data.shape = Some(shape);
        Ok(shape)
    }

    // The full action: restrict and evaluate each input to quadrature
    // buffers, call the QFunction, then apply the transposed evaluation and
    // restriction for each output.
    fn apply_core(
        &self,
        input: &crate::Vector,
        output: &crate::Vector,
        add: bool,
    ) -> crate::Result<()> {
        let shape = self.ensure_shape()?;
        let data = self
            .inner
            .try_borrow()
            .map_err(|_| Error::OperatorBorrowed)?;
        if input.length() != shape.input_size {
            return Err(Error::LengthMismatch {
                object: "operator input",
                expected: shape.input_size,
                found: input.length(),
            });
        }
        if output.length() != shape.output_size {
            return Err(Error::LengthMismatch {
                object: "operator output",
                expected: shape.output_size,
                found: output.length(),
            });
        }
        let nq = shape.nqpts;
        let qtot = shape.nelem * nq;

        let qf_inputs = data.qf.inputs()?;
        let qf_outputs = data.qf.outputs()?;

        // Gather input quadrature buffers, `buf[s * qtot + e * nq + q]`
        let mut qbufs: Vec<Vec<crate::Scalar>> = Vec::with_capacity(qf_inputs.len());
        for qfield in &qf_inputs {
            let field = find_field(&data.fields, qfield.name())?;
            let size = qfield.size();
            let mut buf = vec![0.0; size * qtot];
            match qfield.eval_mode() {
                crate::EvalMode::Weight => {
                    if let FieldBasis::Some(basis) = &field.basis {
                        let qweight = basis.quadrature_weights();
                        for e in 0..shape.nelem {
                            buf[e * nq..][..nq].copy_from_slice(qweight);
                        }
                    }
                }
                emode => {
                    let rstr = field.restriction.as_ref().ok_or_else(|| {
                        Error::FieldNotBound {
                            name: field.name.clone(),
                        }
                    })?;
                    let rdata = &*rstr.inner;
                    let guard = match &field.vector {
                        FieldVector::Active => input.read_data()?,
                        FieldVector::Some(vector) => vector.read_data()?,
                        FieldVector::None => {
                            return Err(Error::FieldNotBound {
                                name: field.name.clone(),
                            })
                        }
                    };
                    let src = &guard.host;
                    let (elemsize, ncomp) = (rdata.elemsize, rdata.ncomp);
                    let mut elem_nodal = vec![0.0; ncomp * elemsize];
                    let mut elem_quad = vec![0.0; size * nq];
                    for e in 0..shape.nelem {
                        for i in 0..elemsize {
                            let node = rdata.offset(e, i);
                            for c in 0..ncomp {
                                elem_nodal[c * elemsize + i] = src[node * ncomp + c];
                            }
                        }
                        match emode {
                            crate::EvalMode::None => elem_quad.copy_from_slice(&elem_nodal),
                            crate::EvalMode::Interp => {
                                if let FieldBasis::Some(basis) = &field.basis {
                                    basis.inner.interp_elem(&elem_nodal, &mut elem_quad);
                                }
                            }
                            crate::EvalMode::Grad => {
                                if let FieldBasis::Some(basis) = &field.basis {
                                    basis.inner.grad_elem(&elem_nodal, &mut elem_quad);
                                }
                            }
                            _ => unreachable!("mode rejected during validation"),
                        }
                        for s in 0..size {
                            buf[s * qtot + e * nq..][..nq]
                                .copy_from_slice(&elem_quad[s * nq..][..nq]);
                        }
                    }
                }
            }
            qbufs.push(buf);
        }

        // Evaluate the QFunction on the quadrature buffers
        let mut out_bufs: Vec<Vec<crate::Scalar>> = qf_outputs
            .iter()
            .map(|qfield| vec![0.0; qfield.size() * qtot])
            .collect();
        {
            let input_slices: Vec<&[crate::Scalar]> = qbufs.iter().map(|buf| &buf[..]).collect();
            let mut output_slices: Vec<&mut [crate::Scalar]> =
                out_bufs.iter_mut().map(|buf| &mut buf[..]).collect();
            data.qf.apply_raw(qtot, &input_slices, &mut output_slices)?;
        }

        if !add {
            let mut dst = output.write_data()?;
            dst.host.fill(0.0);
        }

        // Transposed evaluation and scatter-add of each output
        for (qfield, buf) in qf_outputs.iter().zip(out_bufs.iter()) {
            let field = find_field(&data.fields, qfield.name())?;
            let rstr = field
                .restriction
                .as_ref()
                .ok_or_else(|| Error::FieldNotBound {
                    name: field.name.clone(),
                })?;
            let rdata = &*rstr.inner;
            let size = qfield.size();
            let mut guard = match &field.vector {
                FieldVector::Active => output.write_data()?,
                FieldVector::Some(vector) => vector.write_data()?,
                FieldVector::None => {
                    return Err(Error::FieldNotBound {
                        name: field.name.clone(),
                    })
                }
            };
            if !add && !matches!(field.vector, FieldVector::Active) {
                guard.host.fill(0.0);
            }
            let (elemsize, ncomp) = (rdata.elemsize, rdata.ncomp);
            let mut elem_quad = vec![0.0; size * nq];
            let mut elem_nodal = vec![0.0; ncomp * elemsize];
            for e in 0..shape.nelem {
                for s in 0..size {
                    elem_quad[s * nq..][..nq].copy_from_slice(&buf[s * qtot + e * nq..][..nq]);
                }
                match qfield.eval_mode() {
                    crate::EvalMode::None => elem_nodal.copy_from_slice(&elem_quad),
                    crate::EvalMode::Interp => {
                        elem_nodal.fill(0.0);
                        if let FieldBasis::Some(basis) = &field.basis {
                            basis.inner.interp_elem_t(&elem_quad, &mut elem_nodal);
                        }
                    }
                    crate::EvalMode::Grad => {
                        elem_nodal.fill(0.0);
                        if let FieldBasis::Some(basis) = &field.basis {
                            basis.inner.grad_elem_t(&elem_quad, &mut elem_nodal);
                        }
                    }
                    _ => unreachable!("mode rejected during validation"),
                }
                for i in 0..elemsize {
                    let node = rdata.offset(e, i);
                    for c in 0..ncomp {
                        guard.host[node * ncomp + c] += elem_nodal[c * elemsize + i];
                    }
                }
            }
        }
        Ok(())
    }
}

fn find_field<'a>(fields: &'a [OperatorField], name: &str) -> crate::Result<&'a OperatorField> {
    fields
        .iter()
        .find(|field| field.name == name)
        .ok_or_else(|| Error::FieldNotBound {
            name: name.to_string(),
        })
}

// -----------------------------------------------------------------------------
// Operator context wrapper
// -----------------------------------------------------------------------------
#[derive(Debug)]
pub struct Operator {
    op_core: OperatorCore,
}

// -----------------------------------------------------------------------------
// Cloning
// -----------------------------------------------------------------------------
impl Clone for Operator {
    /// Perform a shallow clone of an Operator
    fn clone(&self) -> Self {
        Self {
            op_core: self.op_core.clone(),
        }
    }
}

// -----------------------------------------------------------------------------
// Display
// -----------------------------------------------------------------------------
impl fmt::Display for Operator {
    /// View an Operator
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.op_core.inner.try_borrow() {
            Ok(data) => write!(f, "Operator with {} fields", data.fields.len()),
            Err(_) => write!(f, "Operator (in use)"),
        }
    }
}

// -----------------------------------------------------------------------------
// Implementations
// -----------------------------------------------------------------------------
impl Operator {
    pub fn create<'b, 'c, 'd>(
        ceed: &crate::Ceed,
        qf: impl Into<QFunctionOpt<'b>>,
        dqf: impl Into<QFunctionOpt<'c>>,
        dqf_t: impl Into<QFunctionOpt<'d>>,
    ) -> crate::Result<Self> {
        let qf = qf.into().to_core().ok_or_else(|| Error::InvalidDimensions {
            what: "operator requires a QFunction".to_string(),
        })?;
        Ok(Self {
            op_core: OperatorCore {
                inner: Rc::new(RefCell::new(OperatorData {
                    qf,
                    dqf: dqf.into().to_core(),
                    dqft: dqf_t.into().to_core(),
                    fields: Vec::new(),
                    shape: None,
                })),
                ceed: ceed.clone(),
            },
        })
    }

    /// Provide a field to an Operator for use by its QFunction
    ///
    /// # arguments
    ///
    /// * `name`   - Name of the field as declared by the QFunction
    /// * `rstr`   - ElemRestriction for the field, or
    ///   `ElemRestrictionOpt::None` for quadrature weights
    /// * `basis`  - Basis for the field, `BasisOpt::Collocated` if the field
    ///   is collocated with quadrature points, or `BasisOpt::None`
    /// * `vector` - Vector holding the field data, `VectorOpt::Active` if the
    ///   field is active, or `VectorOpt::None` for quadrature weights
    ///
    /// ```
    /// # use ceed_core::prelude::*;
    /// # fn main() -> ceed_core::Result<()> {
    /// # let ceed = ceed_core::Ceed::default_init();
    /// let nelem = 4;
    /// let mut ind: Vec<i32> = vec![0; 2 * nelem];
    /// for i in 0..nelem {
    ///     ind[2 * i + 0] = i as i32;
    ///     ind[2 * i + 1] = i as i32 + 1;
    /// }
    /// let rx = ceed.elem_restriction(nelem, 2, nelem + 1, 1, &ind)?;
    /// let rq = ceed.identity_elem_restriction(nelem, 1, nelem, 1)?;
    /// let b = ceed.basis_tensor_h1(1, 1, 2, 1, &[0.5, 0.5], &[-0.5, 0.5], &[0.0], &[2.0])?;
    ///
    /// let qf = ceed.q_function_interior_by_name("Mass1DBuild")?;
    /// let op = ceed
    ///     .operator(&qf, QFunctionOpt::None, QFunctionOpt::None)?
    ///     .field("dx", &rx, &b, VectorOpt::Active)?
    ///     .field("weights", ElemRestrictionOpt::None, &b, VectorOpt::None)?
    ///     .field("qdata", &rq, BasisOpt::Collocated, VectorOpt::Active)?;
    /// # Ok(())
    /// # }
    /// ```
    #[allow(unused_mut)]
    pub fn field<'b, 'c, 'd>(
        mut self,
        name: &str,
        rstr: impl Into<ElemRestrictionOpt<'b>>,
        basis: impl Into<BasisOpt<'c>>,
        vector: impl Into<VectorOpt<'d>>,
    ) -> crate::Result<Self> {
        {
            let mut data = self
                .op_core
                .inner
                .try_borrow_mut()
                .map_err(|_| Error::OperatorBorrowed)?;
            let snapshot = data
                .qf
                .inputs()?
                .into_iter()
                .map(|field| (field, true))
                .chain(data.qf.outputs()?.into_iter().map(|field| (field, false)))
                .find(|(field, _)| field.name() == name)
                .ok_or_else(|| Error::UnknownField {
                    name: name.to_string(),
                })?;
            if data.fields.iter().any(|field| field.name == name) {
                return Err(Error::DuplicateField {
                    name: name.to_string(),
                });
            }
            let (qfield, is_input) = snapshot;
            let restriction = match rstr.into() {
                ElemRestrictionOpt::Some(rstr) => Some(rstr.clone()),
                ElemRestrictionOpt::None => None,
            };
            let basis = match basis.into() {
                BasisOpt::Some(basis) => FieldBasis::Some(basis.clone()),
                BasisOpt::Collocated => FieldBasis::Collocated,
                BasisOpt::None => FieldBasis::None,
            };
            let vector = match vector.into() {
                VectorOpt::Some(vector) => FieldVector::Some(vector.clone()),
                VectorOpt::Active => FieldVector::Active,
                VectorOpt::None => FieldVector::None,
            };
            data.fields.push(OperatorField {
                name: name.to_string(),
                size: qfield.size(),
                emode: qfield.eval_mode(),
                is_input,
                restriction,
                basis,
                vector,
            });
            // Bindings changed, so any cached shape is stale
            data.shape = None;
        }
        Ok(self)
    }

    /// Verify that all fields are bound consistently and resolve the element
    /// count, quadrature size, and active vector sizes. Called lazily by
    /// [`Operator::apply`] if not invoked explicitly.
    ///
    /// ```
    /// # use ceed_core::prelude::*;
    /// # fn main() -> ceed_core::Result<()> {
    /// # let ceed = ceed_core::Ceed::default_init();
    /// let r = ceed.identity_elem_restriction(2, 3, 6, 1)?;
    /// let qf = ceed.identity_q_function(1)?;
    /// let op = ceed
    ///     .operator(&qf, QFunctionOpt::None, QFunctionOpt::None)?
    ///     .field("input", &r, BasisOpt::None, VectorOpt::Active)?
    ///     .field("output", &r, BasisOpt::None, VectorOpt::Active)?
    ///     .check()?;
    ///
    /// assert_eq!(op.num_elements(), 2, "Incorrect number of elements");
    /// # Ok(())
    /// # }
    /// ```
    pub fn check(self) -> crate::Result<Self> {
        self.op_core.ensure_shape()?;
        Ok(self)
    }

    /// Apply an Operator to a vector, replacing the output values
    ///
    /// # arguments
    ///
    /// * `input`  - Input vector
    /// * `output` - Output vector
    ///
    /// ```
    /// # use ceed_core::prelude::*;
    /// # fn main() -> ceed_core::Result<()> {
    /// # let ceed = ceed_core::Ceed::default_init();
    /// let r = ceed.identity_elem_restriction(2, 3, 6, 1)?;
    /// let qf = ceed.identity_q_function(1)?;
    /// let op = ceed
    ///     .operator(&qf, QFunctionOpt::None, QFunctionOpt::None)?
    ///     .field("input", &r, BasisOpt::None, VectorOpt::Active)?
    ///     .field("output", &r, BasisOpt::None, VectorOpt::Active)?;
    ///
    /// let x = ceed.vector_from_slice(&[1., 2., 3., 4., 5., 6.])?;
    /// let mut y = ceed.vector(6)?;
    /// op.apply(&x, &mut y)?;
    ///
    /// for (y, x) in y.view()?.iter().zip(x.view()?.iter()) {
    ///     assert_eq!(y, x, "Incorrect value in operator application");
    /// }
    /// # Ok(())
    /// # }
    /// ```
    pub fn apply(&self, input: &crate::Vector, output: &mut crate::Vector) -> crate::Result<()> {
        self.op_core.apply_core(input, output, false)
    }

    /// Apply an Operator to a vector, summing into the output values
    pub fn apply_add(
        &self,
        input: &crate::Vector,
        output: &mut crate::Vector,
    ) -> crate::Result<()> {
        self.op_core.apply_core(input, output, true)
    }

    /// Get the bound input fields of an Operator
    pub fn inputs(&self) -> crate::Result<Vec<OperatorField>> {
        let data = self
            .op_core
            .inner
            .try_borrow()
            .map_err(|_| Error::OperatorBorrowed)?;
        Ok(data
            .fields
            .iter()
            .filter(|field| field.is_input)
            .cloned()
            .collect())
    }

    /// Get the bound output fields of an Operator
    pub fn outputs(&self) -> crate::Result<Vec<OperatorField>> {
        let data = self
            .op_core
            .inner
            .try_borrow()
            .map_err(|_| Error::OperatorBorrowed)?;
        Ok(data
            .fields
            .iter()
            .filter(|field| !field.is_input)
            .cloned()
            .collect())
    }

    /// Check if a Jacobian QFunction was associated at creation
    pub fn has_jacobian(&self) -> bool {
        self.op_core
            .inner
            .try_borrow()
            .map(|data| data.dqf.is_some())
            .unwrap_or(false)
    }

    /// Check if a transpose Jacobian QFunction was associated at creation
    pub fn has_jacobian_transpose(&self) -> bool {
        self.op_core
            .inner
            .try_borrow()
            .map(|data| data.dqft.is_some())
            .unwrap_or(false)
    }

    /// Returns the number of elements the Operator acts on, or 0 if the
    /// operator has not yet been checked
    pub fn num_elements(&self) -> usize {
        self.op_core
            .inner
            .try_borrow()
            .ok()
            .and_then(|data| data.shape)
            .map_or(0, |shape| shape.nelem)
    }

    /// Returns the number of quadrature points per element, or 0 if the
    /// operator has not yet been checked
    pub fn num_quadrature_points(&self) -> usize {
        self.op_core
            .inner
            .try_borrow()
            .ok()
            .and_then(|data| data.shape)
            .map_or(0, |shape| shape.nqpts)
    }
}

// -----------------------------------------------------------------------------
// Composite operator
// -----------------------------------------------------------------------------
#[derive(Debug)]
struct CompositeData {
    sub_ops: Vec<Operator>,
    // (input_size, output_size) of the first sub-operator
    sizes: Option<(usize, usize)>,
}

#[derive(Debug)]
pub struct CompositeOperator {
    inner: Rc<RefCell<CompositeData>>,
    ceed: crate::Ceed,
}

impl Clone for CompositeOperator {
    /// Perform a shallow clone of a CompositeOperator
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
            ceed: self.ceed.clone(),
        }
    }
}

impl fmt::Display for CompositeOperator {
    /// View a CompositeOperator
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.inner.try_borrow() {
            Ok(data) => write!(f, "Composite Operator with {} sub-operators", data.sub_ops.len()),
            Err(_) => write!(f, "Composite Operator (in use)"),
        }
    }
}

impl CompositeOperator {
    pub fn create(ceed: &crate::Ceed) -> crate::Result<Self> {
        Ok(Self {
            inner: Rc::new(RefCell::new(CompositeData {
                sub_ops: Vec::new(),
                sizes: None,
            })),
            ceed: ceed.clone(),
        })
    }

    /// Add a sub-operator to a CompositeOperator
    ///
    /// The sub-operator's active vector sizes must match those of any
    /// previously added sub-operator.
    ///
    /// # arguments
    ///
    /// * `subop` - Operator to add
    ///
    /// ```
    /// # use ceed_core::prelude::*;
    /// # fn main() -> ceed_core::Result<()> {
    /// # let ceed = ceed_core::Ceed::default_init();
    /// let r = ceed.identity_elem_restriction(2, 3, 6, 1)?;
    /// let qf = ceed.identity_q_function(1)?;
    /// let op = ceed
    ///     .operator(&qf, QFunctionOpt::None, QFunctionOpt::None)?
    ///     .field("input", &r, BasisOpt::None, VectorOpt::Active)?
    ///     .field("output", &r, BasisOpt::None, VectorOpt::Active)?;
    ///
    /// let composite = ceed.composite_operator()?.sub_operator(&op)?;
    /// # Ok(())
    /// # }
    /// ```
    #[allow(unused_mut)]
    pub fn sub_operator(mut self, subop: &Operator) -> crate::Result<Self> {
        let shape = subop.op_core.ensure_shape()?;
        {
            let mut data = self
                .inner
                .try_borrow_mut()
                .map_err(|_| Error::OperatorBorrowed)?;
            match data.sizes {
                Some((input_size, output_size)) => {
                    if input_size != shape.input_size || output_size != shape.output_size {
                        return Err(Error::IncompatibleSubOperator {
                            input: shape.input_size,
                            output: shape.output_size,
                            expected_input: input_size,
                            expected_output: output_size,
                        });
                    }
                }
                None => data.sizes = Some((shape.input_size, shape.output_size)),
            }
            data.sub_ops.push(subop.clone());
        }
        Ok(self)
    }

    /// Apply a CompositeOperator to a vector, replacing the output with the
    /// sum of the actions of its sub-operators
    ///
    /// # arguments
    ///
    /// * `input`  - Input vector
    /// * `output` - Output vector
    pub fn apply(&self, input: &crate::Vector, output: &mut crate::Vector) -> crate::Result<()> {
        {
            let mut dst = output.write_data()?;
            dst.host.fill(0.0);
        }
        self.apply_add(input, output)
    }

    /// Apply a CompositeOperator to a vector, summing into the output values
    pub fn apply_add(
        &self,
        input: &crate::Vector,
        output: &mut crate::Vector,
    ) -> crate::Result<()> {
        let data = self.inner.try_borrow().map_err(|_| Error::OperatorBorrowed)?;
        for subop in data.sub_ops.iter() {
            subop.op_core.apply_core(input, output, true)?;
        }
        Ok(())
    }

    /// Returns the number of sub-operators
    pub fn num_sub_operators(&self) -> usize {
        self.inner
            .try_borrow()
            .map(|data| data.sub_ops.len())
            .unwrap_or(0)
    }
}

// -----------------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------------
#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Ceed, EPSILON};

    fn identity_op(ceed: &Ceed, nelem: usize, elemsize: usize) -> crate::Result<Operator> {
        let nnodes = nelem * elemsize;
        let rstr = ceed.identity_elem_restriction(nelem, elemsize, nnodes, 1)?;
        let qf = ceed.identity_q_function(1)?;
        ceed.operator(&qf, QFunctionOpt::None, QFunctionOpt::None)?
            .field("input", &rstr, BasisOpt::None, VectorOpt::Active)?
            .field("output", &rstr, BasisOpt::None, VectorOpt::Active)
    }

    #[test]
    fn operator_field_not_bound() -> crate::Result<()> {
        let ceed = Ceed::default_init();
        let nelem = 4;
        let mut ind: Vec<i32> = Vec::new();
        for i in 0..nelem as i32 {
            ind.push(i);
            ind.push(i + 1);
        }
        let rx = ceed.elem_restriction(nelem, 2, nelem + 1, 1, &ind)?;
        let b = ceed.basis_tensor_h1(1, 1, 2, 1, &[0.5, 0.5], &[-0.5, 0.5], &[0.0], &[2.0])?;
        let qf = ceed.q_function_interior_by_name("Mass1DBuild")?;
        let op = ceed
            .operator(&qf, QFunctionOpt::None, QFunctionOpt::None)?
            .field("dx", &rx, &b, VectorOpt::Active)?
            .field("weights", ElemRestrictionOpt::None, &b, VectorOpt::None)?;
        assert!(matches!(
            op.check(),
            Err(Error::FieldNotBound { .. })
        ));
        Ok(())
    }

    #[test]
    fn operator_unknown_field() -> crate::Result<()> {
        let ceed = Ceed::default_init();
        let rstr = ceed.identity_elem_restriction(2, 2, 4, 1)?;
        let qf = ceed.identity_q_function(1)?;
        let op = ceed.operator(&qf, QFunctionOpt::None, QFunctionOpt::None)?;
        assert!(matches!(
            op.field("bogus", &rstr, BasisOpt::None, VectorOpt::Active),
            Err(Error::UnknownField { .. })
        ));
        Ok(())
    }

    #[test]
    fn operator_field_size_mismatch() -> crate::Result<()> {
        let ceed = Ceed::default_init();
        // MassApply declares "u" with one component, but the basis has two
        let rstr = ceed.elem_restriction(1, 2, 2, 2, &[0, 1])?;
        let rq = ceed.identity_elem_restriction(1, 1, 1, 1)?;
        let b = ceed.basis_tensor_h1(1, 2, 2, 1, &[0.5, 0.5], &[-0.5, 0.5], &[0.0], &[2.0])?;
        let qdata = ceed.vector(1)?;
        let qf = ceed.q_function_interior_by_name("MassApply")?;
        let op = ceed
            .operator(&qf, QFunctionOpt::None, QFunctionOpt::None)?
            .field("u", &rstr, &b, VectorOpt::Active)?
            .field("qdata", &rq, BasisOpt::Collocated, &qdata)?
            .field("v", &rstr, &b, VectorOpt::Active)?;
        assert!(matches!(
            op.check(),
            Err(Error::FieldSizeMismatch { .. })
        ));
        Ok(())
    }

    #[test]
    fn operator_apply_add_accumulates() -> crate::Result<()> {
        let ceed = Ceed::default_init();
        let op = identity_op(&ceed, 2, 3)?;

        let x = ceed.vector_from_slice(&[1., 2., 3., 4., 5., 6.])?;
        let mut y = ceed.vector(6)?;
        op.apply(&x, &mut y)?;
        op.apply_add(&x, &mut y)?;
        for (y, x) in y.view()?.iter().zip(x.view()?.iter()) {
            assert_eq!(*y, 2.0 * x, "apply_add did not accumulate");
        }

        op.apply(&x, &mut y)?;
        for (y, x) in y.view()?.iter().zip(x.view()?.iter()) {
            assert_eq!(*y, *x, "apply did not replace output values");
        }
        Ok(())
    }

    #[test]
    fn operator_passive_output() -> crate::Result<()> {
        let ceed = Ceed::default_init();
        let user_f = |[u, ..]: QFunctionInputs, [v, tap, ..]: QFunctionOutputs| {
            v.iter_mut().zip(u.iter()).for_each(|(v, u)| *v = *u);
            tap.iter_mut().zip(u.iter()).for_each(|(t, u)| *t = *u);
            0
        };
        let qf = ceed
            .q_function_interior(1, Box::new(user_f))?
            .input("u", 1, EvalMode::None)?
            .output("v", 1, EvalMode::None)?
            .output("tap", 1, EvalMode::None)?;
        let rstr = ceed.identity_elem_restriction(2, 2, 4, 1)?;
        let tap = ceed.vector(4)?;
        let op = ceed
            .operator(&qf, QFunctionOpt::None, QFunctionOpt::None)?
            .field("u", &rstr, BasisOpt::None, VectorOpt::Active)?
            .field("v", &rstr, BasisOpt::None, VectorOpt::Active)?
            .field("tap", &rstr, BasisOpt::None, &tap)?
            .check()?;

        let x = ceed.vector_from_slice(&[1., 2., 3., 4.])?;
        let mut y = ceed.vector(4)?;
        op.apply(&x, &mut y)?;
        for (t, x) in tap.view()?.iter().zip(x.view()?.iter()) {
            assert_eq!(*t, *x, "passive output not written");
        }

        op.apply_add(&x, &mut y)?;
        for (t, x) in tap.view()?.iter().zip(x.view()?.iter()) {
            assert_eq!(*t, 2.0 * x, "passive output did not accumulate");
        }

        op.apply(&x, &mut y)?;
        for (t, x) in tap.view()?.iter().zip(x.view()?.iter()) {
            assert_eq!(*t, *x, "passive output not zeroed on apply");
        }
        Ok(())
    }

    #[test]
    fn operator_mass_2d_quadrature_data() -> crate::Result<()> {
        let ceed = Ceed::default_init();
        // One bilinear element on the unit square with midpoint quadrature
        let rx = ceed.elem_restriction(1, 4, 4, 2, &[0, 1, 2, 3])?;
        let rq = ceed.identity_elem_restriction(1, 1, 1, 1)?;
        let bx = ceed.basis_tensor_h1(2, 2, 2, 1, &[0.5, 0.5], &[-0.5, 0.5], &[0.0], &[2.0])?;

        let qf = ceed.q_function_interior_by_name("Mass2DBuild")?;
        let op = ceed
            .operator(&qf, QFunctionOpt::None, QFunctionOpt::None)?
            .field("dx", &rx, &bx, VectorOpt::Active)?
            .field("weights", ElemRestrictionOpt::None, &bx, VectorOpt::None)?
            .field("qdata", &rq, BasisOpt::Collocated, VectorOpt::Active)?
            .check()?;
        assert_eq!(op.num_elements(), 1);
        assert_eq!(op.num_quadrature_points(), 1);

        let coords = ceed.vector_from_slice(&[0., 0., 1., 0., 0., 1., 1., 1.])?;
        let mut qdata = ceed.vector(1)?;
        op.apply(&coords, &mut qdata)?;
        assert!(
            (qdata.view()?[0] - 1.0).abs() < 10.0 * EPSILON,
            "quadrature data does not match element area"
        );
        Ok(())
    }

    #[test]
    fn composite_operator_sums_sub_operators() -> crate::Result<()> {
        let ceed = Ceed::default_init();
        let op = identity_op(&ceed, 2, 2)?;
        let composite = ceed
            .composite_operator()?
            .sub_operator(&op)?
            .sub_operator(&op)?;
        assert_eq!(composite.num_sub_operators(), 2);

        let x = ceed.vector_from_slice(&[1., 2., 3., 4.])?;
        let mut y = ceed.vector(4)?;
        composite.apply(&x, &mut y)?;
        for (y, x) in y.view()?.iter().zip(x.view()?.iter()) {
            assert_eq!(*y, 2.0 * x, "Incorrect composite action");
        }
        Ok(())
    }

    #[test]
    fn composite_operator_rejects_incompatible_sizes() -> crate::Result<()> {
        let ceed = Ceed::default_init();
        let op_small = identity_op(&ceed, 2, 2)?;
        let op_large = identity_op(&ceed, 3, 2)?;
        let composite = ceed.composite_operator()?.sub_operator(&op_small)?;
        assert!(matches!(
            composite.sub_operator(&op_large),
            Err(Error::IncompatibleSubOperator { .. })
        ));
        Ok(())
    }

    #[test]
    fn operator_jacobian_qfunctions() -> crate::Result<()> {
        let ceed = Ceed::default_init();
        let qf = ceed.identity_q_function(1)?;
        let dqf = ceed.identity_q_function(1)?;
        let op = ceed.operator(&qf, &dqf, QFunctionOpt::None)?;
        assert!(op.has_jacobian());
        assert!(!op.has_jacobian_transpose());
        Ok(())
    }
}
