// Copyright (c) 2017-2022, Lawrence Livermore National Security, LLC and other CEED contributors.
// All Rights Reserved. See the top-level LICENSE and NOTICE files for details.
//
// SPDX-License-Identifier: BSD-2-Clause
//
// This file is part of CEED:  http://github.com/ceed

//! A Ceed QFunction represents the spatial terms of the point-wise functions
//! describing the physics at the quadrature points.

use crate::prelude::*;

pub type QFunctionInputs<'a> = [&'a [crate::Scalar]; MAX_QFUNCTION_FIELDS];
pub type QFunctionOutputs<'a> = [&'a mut [crate::Scalar]; MAX_QFUNCTION_FIELDS];

/// User closure evaluated at quadrature points. Returns 0 for success or a
/// nonzero error code.
pub type QFunctionUserClosure = dyn FnMut(QFunctionInputs, QFunctionOutputs) -> i32;

macro_rules! mut_max_fields {
    ($e:expr) => {
        [
            $e, $e, $e, $e, $e, $e, $e, $e, $e, $e, $e, $e, $e, $e, $e, $e,
        ]
    };
}

// -----------------------------------------------------------------------------
// QFunction field description
// -----------------------------------------------------------------------------
#[derive(Clone, Debug)]
pub struct QFunctionField {
    name: String,
    size: usize,
    emode: crate::EvalMode,
}

impl QFunctionField {
    /// Get the name of a QFunctionField
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the number of components of a QFunctionField
    pub fn size(&self) -> usize {
        self.size
    }

    /// Get the evaluation mode of a QFunctionField
    pub fn eval_mode(&self) -> crate::EvalMode {
        self.emode
    }
}

// -----------------------------------------------------------------------------
// Gallery of built-in kernels
// -----------------------------------------------------------------------------
type GalleryKernel = fn(usize, &[&[crate::Scalar]], &mut [&mut [crate::Scalar]]);

pub(crate) struct GalleryEntry {
    name: &'static str,
    vlength: usize,
    inputs: &'static [(&'static str, usize, crate::EvalMode)],
    outputs: &'static [(&'static str, usize, crate::EvalMode)],
    kernel: GalleryKernel,
}

// Geometric factors are `dx[(d * ncomp + c) * Q + i]` with coordinate
// components interleaved over basis components, so the Jacobian entry in
// slot `s` is column-major over (c, d).
fn mass_build_1d(q: usize, inputs: &[&[crate::Scalar]], outputs: &mut [&mut [crate::Scalar]]) {
    let (j, w) = (inputs[0], inputs[1]);
    let qd = &mut *outputs[0];
    for i in 0..q {
        qd[i] = j[i] * w[i];
    }
}

fn mass_build_2d(q: usize, inputs: &[&[crate::Scalar]], outputs: &mut [&mut [crate::Scalar]]) {
    let (j, w) = (inputs[0], inputs[1]);
    let qd = &mut *outputs[0];
    for i in 0..q {
        qd[i] = (j[i] * j[i + 3 * q] - j[i + q] * j[i + 2 * q]) * w[i];
    }
}

fn mass_build_3d(q: usize, inputs: &[&[crate::Scalar]], outputs: &mut [&mut [crate::Scalar]]) {
    let (j, w) = (inputs[0], inputs[1]);
    let qd = &mut *outputs[0];
    for i in 0..q {
        let det = j[i] * (j[i + 4 * q] * j[i + 8 * q] - j[i + 5 * q] * j[i + 7 * q])
            - j[i + q] * (j[i + 3 * q] * j[i + 8 * q] - j[i + 5 * q] * j[i + 6 * q])
            + j[i + 2 * q] * (j[i + 3 * q] * j[i + 7 * q] - j[i + 4 * q] * j[i + 6 * q]);
        qd[i] = det * w[i];
    }
}

fn mass_apply(q: usize, inputs: &[&[crate::Scalar]], outputs: &mut [&mut [crate::Scalar]]) {
    let (u, qd) = (inputs[0], inputs[1]);
    let v = &mut *outputs[0];
    for i in 0..q {
        v[i] = u[i] * qd[i];
    }
}

static GALLERY: &[GalleryEntry] = &[
    GalleryEntry {
        name: "Mass1DBuild",
        vlength: 1,
        inputs: &[
            ("dx", 1, crate::EvalMode::Grad),
            ("weights", 1, crate::EvalMode::Weight),
        ],
        outputs: &[("qdata", 1, crate::EvalMode::None)],
        kernel: mass_build_1d,
    },
    GalleryEntry {
        name: "Mass2DBuild",
        vlength: 1,
        inputs: &[
            ("dx", 4, crate::EvalMode::Grad),
            ("weights", 1, crate::EvalMode::Weight),
        ],
        outputs: &[("qdata", 1, crate::EvalMode::None)],
        kernel: mass_build_2d,
    },
    GalleryEntry {
        name: "Mass3DBuild",
        vlength: 1,
        inputs: &[
            ("dx", 9, crate::EvalMode::Grad),
            ("weights", 1, crate::EvalMode::Weight),
        ],
        outputs: &[("qdata", 1, crate::EvalMode::None)],
        kernel: mass_build_3d,
    },
    GalleryEntry {
        name: "MassApply",
        vlength: 1,
        inputs: &[
            ("u", 1, crate::EvalMode::Interp),
            ("qdata", 1, crate::EvalMode::None),
        ],
        outputs: &[("v", 1, crate::EvalMode::Interp)],
        kernel: mass_apply,
    },
];

fn find_gallery(name: &str) -> Option<&'static GalleryEntry> {
    GALLERY.iter().find(|entry| entry.name == name)
}

// -----------------------------------------------------------------------------
// QFunction data
// -----------------------------------------------------------------------------
enum Kernel {
    User(Box<QFunctionUserClosure>),
    Gallery(&'static GalleryEntry),
    Identity(usize),
}

impl fmt::Debug for Kernel {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::User(_) => write!(f, "User"),
            Self::Gallery(entry) => write!(f, "Gallery({})", entry.name),
            Self::Identity(size) => write!(f, "Identity({})", size),
        }
    }
}

#[derive(Debug)]
struct QFunctionData {
    vlength: usize,
    inputs: Vec<QFunctionField>,
    outputs: Vec<QFunctionField>,
    kernel: Kernel,
}

impl QFunctionData {
    fn add_field(
        &mut self,
        is_input: bool,
        name: &str,
        size: usize,
        emode: crate::EvalMode,
    ) -> crate::Result<()> {
        if self
            .inputs
            .iter()
            .chain(self.outputs.iter())
            .any(|field| field.name == name)
        {
            return Err(Error::DuplicateField {
                name: name.to_string(),
            });
        }
        let fields = if is_input {
            &mut self.inputs
        } else {
            &mut self.outputs
        };
        if fields.len() >= MAX_QFUNCTION_FIELDS {
            return Err(Error::TooManyFields {
                max: MAX_QFUNCTION_FIELDS,
            });
        }
        fields.push(QFunctionField {
            name: name.to_string(),
            size,
            emode,
        });
        Ok(())
    }
}

// -----------------------------------------------------------------------------
// QFunction core shared by the user, gallery, and identity variants
// -----------------------------------------------------------------------------
#[derive(Debug)]
pub(crate) struct QFunctionCore {
    inner: Rc<RefCell<QFunctionData>>,
    ceed: crate::Ceed,
}

impl Clone for QFunctionCore {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
            ceed: self.ceed.clone(),
        }
    }
}

impl QFunctionCore {
    pub(crate) fn inputs(&self) -> crate::Result<Vec<QFunctionField>> {
        Ok(self
            .inner
            .try_borrow()
            .map_err(|_| Error::QFunctionBorrowed)?
            .inputs
            .clone())
    }

    pub(crate) fn outputs(&self) -> crate::Result<Vec<QFunctionField>> {
        Ok(self
            .inner
            .try_borrow()
            .map_err(|_| Error::QFunctionBorrowed)?
            .outputs
            .clone())
    }

    // Evaluate on raw quadrature buffers, `field[s * Q + i]` component-major.
    pub(crate) fn apply_raw(
        &self,
        q: usize,
        input_slices: &[&[crate::Scalar]],
        output_slices: &mut [&mut [crate::Scalar]],
    ) -> crate::Result<()> {
        let mut data = self
            .inner
            .try_borrow_mut()
            .map_err(|_| Error::QFunctionBorrowed)?;
        if data.vlength == 0 || q % data.vlength != 0 {
            return Err(Error::InvalidVectorLength {
                q,
                vlength: data.vlength,
            });
        }
        match &mut data.kernel {
            Kernel::User(f) => {
                let mut inputs: QFunctionInputs = [&[]; MAX_QFUNCTION_FIELDS];
                inputs
                    .iter_mut()
                    .zip(input_slices.iter())
                    .for_each(|(dst, src)| *dst = src);
                let mut outputs: QFunctionOutputs = mut_max_fields!(&mut []);
                outputs
                    .iter_mut()
                    .zip(output_slices.iter_mut())
                    .for_each(|(dst, src)| *dst = std::mem::take(src));
                let code = f(inputs, outputs);
                if code != 0 {
                    return Err(Error::QFunctionFailed { code });
                }
            }
            Kernel::Gallery(entry) => (entry.kernel)(q, input_slices, output_slices),
            Kernel::Identity(size) => {
                output_slices[0][..q * *size].copy_from_slice(&input_slices[0][..q * *size]);
            }
        }
        Ok(())
    }

    fn apply(&self, q: usize, u: &[crate::Vector], v: &[crate::Vector]) -> crate::Result<()> {
        let (inputs, outputs) = (self.inputs()?, self.outputs()?);
        if u.len() != inputs.len() {
            return Err(Error::LengthMismatch {
                object: "QFunction input vectors",
                expected: inputs.len(),
                found: u.len(),
            });
        }
        if v.len() != outputs.len() {
            return Err(Error::LengthMismatch {
                object: "QFunction output vectors",
                expected: outputs.len(),
                found: v.len(),
            });
        }
        for (field, vector) in inputs.iter().zip(u.iter()) {
            if vector.length() != field.size * q {
                return Err(Error::FieldSizeMismatch {
                    name: field.name.clone(),
                    expected: field.size * q,
                    found: vector.length(),
                });
            }
        }
        for (field, vector) in outputs.iter().zip(v.iter()) {
            if vector.length() != field.size * q {
                return Err(Error::FieldSizeMismatch {
                    name: field.name.clone(),
                    expected: field.size * q,
                    found: vector.length(),
                });
            }
        }

        let input_guards: Vec<_> = u
            .iter()
            .map(|vector| vector.read_data())
            .collect::<crate::Result<_>>()?;
        let mut output_guards: Vec<_> = v
            .iter()
            .map(|vector| vector.write_data())
            .collect::<crate::Result<_>>()?;
        let input_slices: Vec<&[crate::Scalar]> =
            input_guards.iter().map(|guard| &guard.host[..]).collect();
        let mut output_slices: Vec<&mut [crate::Scalar]> = output_guards
            .iter_mut()
            .map(|guard| &mut guard.host[..])
            .collect();
        self.apply_raw(q, &input_slices, &mut output_slices)
    }
}

// -----------------------------------------------------------------------------
// QFunction option
// -----------------------------------------------------------------------------
#[derive(Debug)]
pub enum QFunctionOpt<'a> {
    SomeQFunction(&'a QFunction),
    SomeQFunctionByName(&'a QFunctionByName),
    SomeIdentity(&'a IdentityQFunction),
    None,
}

/// Construct a QFunctionOpt reference from a QFunction reference
impl<'a> From<&'a QFunction> for QFunctionOpt<'a> {
    fn from(qfunc: &'a QFunction) -> Self {
        Self::SomeQFunction(qfunc)
    }
}

/// Construct a QFunctionOpt reference from a QFunctionByName reference
impl<'a> From<&'a QFunctionByName> for QFunctionOpt<'a> {
    fn from(qfunc: &'a QFunctionByName) -> Self {
        Self::SomeQFunctionByName(qfunc)
    }
}

/// Construct a QFunctionOpt reference from an IdentityQFunction reference
impl<'a> From<&'a IdentityQFunction> for QFunctionOpt<'a> {
    fn from(qfunc: &'a IdentityQFunction) -> Self {
        Self::SomeIdentity(qfunc)
    }
}

impl<'a> QFunctionOpt<'a> {
    pub(crate) fn to_core(&self) -> Option<QFunctionCore> {
        match self {
            Self::SomeQFunction(qfunc) => Some(qfunc.qf_core.clone()),
            Self::SomeQFunctionByName(qfunc) => Some(qfunc.qf_core.clone()),
            Self::SomeIdentity(qfunc) => Some(qfunc.qf_core.clone()),
            Self::None => None,
        }
    }

    /// Check if a QFunctionOpt holds a reference
    ///
    /// ```
    /// # use ceed_core::prelude::*;
    /// # fn main() -> ceed_core::Result<()> {
    /// # let ceed = ceed_core::Ceed::default_init();
    /// let qf = ceed.identity_q_function(1)?;
    /// let qf_opt = QFunctionOpt::from(&qf);
    /// assert!(qf_opt.is_some(), "Incorrect QFunctionOpt");
    ///
    /// let qf_opt = QFunctionOpt::None;
    /// assert!(!qf_opt.is_some(), "Incorrect QFunctionOpt");
    /// # Ok(())
    /// # }
    /// ```
    pub fn is_some(&self) -> bool {
        !matches!(self, Self::None)
    }

    /// Check if a QFunctionOpt is None
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }
}

// -----------------------------------------------------------------------------
// User QFunction
// -----------------------------------------------------------------------------
#[derive(Debug)]
pub struct QFunction {
    pub(crate) qf_core: QFunctionCore,
}

impl QFunction {
    pub fn create(
        ceed: &crate::Ceed,
        vlength: usize,
        f: Box<QFunctionUserClosure>,
    ) -> crate::Result<Self> {
        if vlength == 0 {
            return Err(Error::InvalidDimensions {
                what: "QFunction vector length must be nonzero".to_string(),
            });
        }
        Ok(Self {
            qf_core: QFunctionCore {
                inner: Rc::new(RefCell::new(QFunctionData {
                    vlength,
                    inputs: Vec::new(),
                    outputs: Vec::new(),
                    kernel: Kernel::User(f),
                })),
                ceed: ceed.clone(),
            },
        })
    }

    /// Apply the action of a QFunction
    ///
    /// # arguments
    ///
    /// * `q` - The number of quadrature points
    /// * `u` - Array of input vectors, one per declared input field
    /// * `v` - Array of output vectors, one per declared output field
    ///
    /// ```
    /// # use ceed_core::prelude::*;
    /// # fn main() -> ceed_core::Result<()> {
    /// # let ceed = ceed_core::Ceed::default_init();
    /// let mut user_f = |[u, weights, ..]: QFunctionInputs, [v, ..]: QFunctionOutputs| {
    ///     // Iterate over quadrature points
    ///     v.iter_mut()
    ///         .zip(u.iter().zip(weights.iter()))
    ///         .for_each(|(v, (u, w))| *v = u * w);
    ///
    ///     // Return clean error code
    ///     0
    /// };
    ///
    /// let qf = ceed
    ///     .q_function_interior(1, Box::new(user_f))?
    ///     .input("u", 1, EvalMode::Interp)?
    ///     .input("weights", 1, EvalMode::Weight)?
    ///     .output("v", 1, EvalMode::Interp)?;
    ///
    /// const Q: usize = 8;
    /// let mut u = [0.; Q];
    /// let mut w = [0.; Q];
    /// for i in 0..Q {
    ///     let x = 2. * (i as Scalar) / ((Q as Scalar) - 1.) - 1.;
    ///     u[i] = 2. + 3. * x + 5. * x * x;
    ///     w[i] = 1. - x * x;
    /// }
    ///
    /// let uu = ceed.vector_from_slice(&u)?;
    /// let ww = ceed.vector_from_slice(&w)?;
    /// let vv = ceed.vector(Q)?;
    ///
    /// qf.apply(Q, &[uu, ww], &[vv.clone()])?;
    ///
    /// for (i, v) in vv.view()?.iter().enumerate() {
    ///     assert_eq!(*v, u[i] * w[i], "Incorrect value in QFunction application");
    /// }
    /// # Ok(())
    /// # }
    /// ```
    pub fn apply(&self, q: usize, u: &[crate::Vector], v: &[crate::Vector]) -> crate::Result<()> {
        self.qf_core.apply(q, u, v)
    }

    /// Add a QFunction input
    ///
    /// # arguments
    ///
    /// * `name`  - Name of the field
    /// * `size`  - Number of components per quadrature point
    /// * `emode` - `EvalMode::None` to use values directly, `EvalMode::Interp`
    ///   to use interpolated values, `EvalMode::Grad` to use gradients,
    ///   `EvalMode::Weight` to use quadrature weights
    ///
    /// ```
    /// # use ceed_core::prelude::*;
    /// # fn main() -> ceed_core::Result<()> {
    /// # let ceed = ceed_core::Ceed::default_init();
    /// let mut user_f = |[u, ..]: QFunctionInputs, [v, ..]: QFunctionOutputs| {
    ///     v.iter_mut().zip(u.iter()).for_each(|(v, u)| *v = *u);
    ///     0
    /// };
    ///
    /// let qf = ceed
    ///     .q_function_interior(1, Box::new(user_f))?
    ///     .input("u", 1, EvalMode::Interp)?;
    /// # Ok(())
    /// # }
    /// ```
    #[allow(unused_mut)]
    pub fn input(
        mut self,
        name: &str,
        size: usize,
        emode: crate::EvalMode,
    ) -> crate::Result<Self> {
        self.qf_core
            .inner
            .try_borrow_mut()
            .map_err(|_| Error::QFunctionBorrowed)?
            .add_field(true, name, size, emode)?;
        Ok(self)
    }

    /// Add a QFunction output
    ///
    /// # arguments
    ///
    /// * `name`  - Name of the field
    /// * `size`  - Number of components per quadrature point
    /// * `emode` - `EvalMode::None` to use values directly, `EvalMode::Interp`
    ///   to use interpolated values, `EvalMode::Grad` to use gradients
    #[allow(unused_mut)]
    pub fn output(
        mut self,
        name: &str,
        size: usize,
        emode: crate::EvalMode,
    ) -> crate::Result<Self> {
        self.qf_core
            .inner
            .try_borrow_mut()
            .map_err(|_| Error::QFunctionBorrowed)?
            .add_field(false, name, size, emode)?;
        Ok(self)
    }

    /// Get the declared input fields
    pub fn inputs(&self) -> crate::Result<Vec<QFunctionField>> {
        self.qf_core.inputs()
    }

    /// Get the declared output fields
    pub fn outputs(&self) -> crate::Result<Vec<QFunctionField>> {
        self.qf_core.outputs()
    }
}

// -----------------------------------------------------------------------------
// Gallery QFunction
// -----------------------------------------------------------------------------
#[derive(Debug)]
pub struct QFunctionByName {
    pub(crate) qf_core: QFunctionCore,
}

impl QFunctionByName {
    pub fn create(ceed: &crate::Ceed, name: &str) -> crate::Result<Self> {
        let entry = find_gallery(name).ok_or_else(|| Error::UnknownGalleryFunction {
            name: name.to_string(),
        })?;
        let to_fields = |specs: &[(&'static str, usize, crate::EvalMode)]| {
            specs
                .iter()
                .map(|&(name, size, emode)| QFunctionField {
                    name: name.to_string(),
                    size,
                    emode,
                })
                .collect()
        };
        Ok(Self {
            qf_core: QFunctionCore {
                inner: Rc::new(RefCell::new(QFunctionData {
                    vlength: entry.vlength,
                    inputs: to_fields(entry.inputs),
                    outputs: to_fields(entry.outputs),
                    kernel: Kernel::Gallery(entry),
                })),
                ceed: ceed.clone(),
            },
        })
    }

    /// Apply the action of a QFunction
    ///
    /// # arguments
    ///
    /// * `q` - The number of quadrature points
    /// * `u` - Array of input vectors, one per input field
    /// * `v` - Array of output vectors, one per output field
    ///
    /// ```
    /// # use ceed_core::prelude::*;
    /// # fn main() -> ceed_core::Result<()> {
    /// # let ceed = ceed_core::Ceed::default_init();
    /// let qf = ceed.q_function_interior_by_name("Mass1DBuild")?;
    ///
    /// const Q: usize = 8;
    /// let mut j = [0.; Q];
    /// let mut w = [0.; Q];
    /// for i in 0..Q {
    ///     let x = 2. * (i as Scalar) / ((Q as Scalar) - 1.) - 1.;
    ///     j[i] = 1.;
    ///     w[i] = 1. - x * x;
    /// }
    ///
    /// let jj = ceed.vector_from_slice(&j)?;
    /// let ww = ceed.vector_from_slice(&w)?;
    /// let qdata = ceed.vector(Q)?;
    ///
    /// qf.apply(Q, &[jj, ww], &[qdata.clone()])?;
    ///
    /// for (i, qd) in qdata.view()?.iter().enumerate() {
    ///     assert_eq!(*qd, w[i], "Incorrect value in QFunction application");
    /// }
    /// # Ok(())
    /// # }
    /// ```
    pub fn apply(&self, q: usize, u: &[crate::Vector], v: &[crate::Vector]) -> crate::Result<()> {
        self.qf_core.apply(q, u, v)
    }

    /// Get the input fields of the gallery kernel
    pub fn inputs(&self) -> crate::Result<Vec<QFunctionField>> {
        self.qf_core.inputs()
    }

    /// Get the output fields of the gallery kernel
    pub fn outputs(&self) -> crate::Result<Vec<QFunctionField>> {
        self.qf_core.outputs()
    }
}

// -----------------------------------------------------------------------------
// Identity QFunction
// -----------------------------------------------------------------------------
#[derive(Debug)]
pub struct IdentityQFunction {
    pub(crate) qf_core: QFunctionCore,
}

impl IdentityQFunction {
    pub fn create(ceed: &crate::Ceed, size: usize) -> crate::Result<Self> {
        Ok(Self {
            qf_core: QFunctionCore {
                inner: Rc::new(RefCell::new(QFunctionData {
                    vlength: 1,
                    inputs: vec![QFunctionField {
                        name: "input".to_string(),
                        size,
                        emode: crate::EvalMode::None,
                    }],
                    outputs: vec![QFunctionField {
                        name: "output".to_string(),
                        size,
                        emode: crate::EvalMode::None,
                    }],
                    kernel: Kernel::Identity(size),
                })),
                ceed: ceed.clone(),
            },
        })
    }

    /// Apply the action of a QFunction, copying input values to the output
    ///
    /// ```
    /// # use ceed_core::prelude::*;
    /// # fn main() -> ceed_core::Result<()> {
    /// # let ceed = ceed_core::Ceed::default_init();
    /// let qf = ceed.identity_q_function(1)?;
    ///
    /// let u = ceed.vector_from_slice(&[1., 2., 3., 4.])?;
    /// let v = ceed.vector(4)?;
    ///
    /// qf.apply(4, &[u], &[v.clone()])?;
    ///
    /// for (i, v) in v.view()?.iter().enumerate() {
    ///     assert_eq!(*v, (i + 1) as Scalar, "Incorrect value in identity copy");
    /// }
    /// # Ok(())
    /// # }
    /// ```
    pub fn apply(&self, q: usize, u: &[crate::Vector], v: &[crate::Vector]) -> crate::Result<()> {
        self.qf_core.apply(q, u, v)
    }

    /// Get the single input field
    pub fn inputs(&self) -> crate::Result<Vec<QFunctionField>> {
        self.qf_core.inputs()
    }

    /// Get the single output field
    pub fn outputs(&self) -> crate::Result<Vec<QFunctionField>> {
        self.qf_core.outputs()
    }
}

// -----------------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------------
#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Ceed, EvalMode, Scalar};

    #[test]
    fn qfunction_user_closure() -> crate::Result<()> {
        let ceed = Ceed::default_init();
        let user_f = |[u, w, ..]: QFunctionInputs, [v, ..]: QFunctionOutputs| {
            v.iter_mut()
                .zip(u.iter().zip(w.iter()))
                .for_each(|(v, (u, w))| *v = u * w);
            0
        };
        let qf = ceed
            .q_function_interior(1, Box::new(user_f))?
            .input("u", 1, EvalMode::Interp)?
            .input("w", 1, EvalMode::Weight)?
            .output("v", 1, EvalMode::Interp)?;

        let u = ceed.vector_from_slice(&[1., 2., 3., 4.])?;
        let w = ceed.vector_from_slice(&[2., 2., 2., 2.])?;
        let v = ceed.vector(4)?;
        qf.apply(4, &[u, w], &[v.clone()])?;
        for (i, vi) in v.view()?.iter().enumerate() {
            assert_eq!(*vi, 2.0 * (i + 1) as Scalar);
        }
        Ok(())
    }

    #[test]
    fn qfunction_user_error_code() -> crate::Result<()> {
        let ceed = Ceed::default_init();
        let user_f = |_: QFunctionInputs, _: QFunctionOutputs| 7;
        let qf = ceed
            .q_function_interior(1, Box::new(user_f))?
            .input("u", 1, EvalMode::None)?
            .output("v", 1, EvalMode::None)?;

        let u = ceed.vector(2)?;
        let v = ceed.vector(2)?;
        assert!(matches!(
            qf.apply(2, &[u], &[v]),
            Err(Error::QFunctionFailed { code: 7 })
        ));
        Ok(())
    }

    #[test]
    fn qfunction_duplicate_field() -> crate::Result<()> {
        let ceed = Ceed::default_init();
        let user_f = |_: QFunctionInputs, _: QFunctionOutputs| 0;
        let qf = ceed
            .q_function_interior(1, Box::new(user_f))?
            .input("u", 1, EvalMode::Interp)?;
        assert!(matches!(
            qf.output("u", 1, EvalMode::Interp),
            Err(Error::DuplicateField { .. })
        ));
        Ok(())
    }

    #[test]
    fn qfunction_too_many_fields() -> crate::Result<()> {
        let ceed = Ceed::default_init();
        let user_f = |_: QFunctionInputs, _: QFunctionOutputs| 0;
        let mut qf = ceed.q_function_interior(1, Box::new(user_f))?;
        for i in 0..MAX_QFUNCTION_FIELDS {
            qf = qf.input(&format!("u{}", i), 1, EvalMode::None)?;
        }
        assert!(matches!(
            qf.input("one_too_many", 1, EvalMode::None),
            Err(Error::TooManyFields {
                max: MAX_QFUNCTION_FIELDS
            })
        ));
        Ok(())
    }

    #[test]
    fn qfunction_unknown_gallery_name() {
        let ceed = Ceed::default_init();
        assert!(matches!(
            ceed.q_function_interior_by_name("NotAKernel"),
            Err(Error::UnknownGalleryFunction { .. })
        ));
    }

    #[test]
    fn qfunction_identity_copies_components() -> crate::Result<()> {
        let ceed = Ceed::default_init();
        let qf = ceed.identity_q_function(2)?;

        let u = ceed.vector_from_slice(&[1., 2., 3., 4., 5., 6.])?;
        let v = ceed.vector(6)?;
        qf.apply(3, &[u.clone()], &[v.clone()])?;
        for (vi, ui) in v.view()?.iter().zip(u.view()?.iter()) {
            assert_eq!(*vi, *ui);
        }
        Ok(())
    }

    #[test]
    fn qfunction_vector_length_must_divide() -> crate::Result<()> {
        let ceed = Ceed::default_init();
        let user_f = |_: QFunctionInputs, _: QFunctionOutputs| 0;
        let qf = ceed
            .q_function_interior(4, Box::new(user_f))?
            .input("u", 1, EvalMode::None)?
            .output("v", 1, EvalMode::None)?;

        let u = ceed.vector(3)?;
        let v = ceed.vector(3)?;
        assert!(matches!(
            qf.apply(3, &[u], &[v]),
            Err(Error::InvalidVectorLength { q: 3, vlength: 4 })
        ));
        Ok(())
    }

    #[test]
    fn qfunction_gallery_mass_apply() -> crate::Result<()> {
        let ceed = Ceed::default_init();
        let qf = ceed.q_function_interior_by_name("MassApply")?;

        let u = ceed.vector_from_slice(&[1., 2., 3., 4.])?;
        let qd = ceed.vector_from_slice(&[0.5, 0.5, 2.0, 2.0])?;
        let v = ceed.vector(4)?;
        qf.apply(4, &[u, qd], &[v.clone()])?;
        assert_eq!(&v.view()?[..], &[0.5, 1.0, 6.0, 8.0]);
        Ok(())
    }

    #[test]
    fn qfunction_gallery_mass_2d_build() -> crate::Result<()> {
        let ceed = Ceed::default_init();
        let qf = ceed.q_function_interior_by_name("Mass2DBuild")?;

        // Single point with Jacobian [[2, 0], [0, 3]] and weight 4
        let j = ceed.vector_from_slice(&[2., 0., 0., 3.])?;
        let w = ceed.vector_from_slice(&[4.])?;
        let qd = ceed.vector(1)?;
        qf.apply(1, &[j, w], &[qd.clone()])?;
        assert_eq!(qd.view()?[0], 24.0);
        Ok(())
    }
}
