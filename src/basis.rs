// Copyright (c) 2017-2022, Lawrence Livermore National Security, LLC and other CEED contributors.
// All Rights Reserved. See the top-level LICENSE and NOTICE files for details.
//
// SPDX-License-Identifier: BSD-2-Clause
//
// This file is part of CEED:  http://github.com/ceed

//! A Ceed Basis defines the discrete finite element basis and associated
//! quadrature rule, evaluating fields between nodes and quadrature points.

use rayon::prelude::*;

use crate::prelude::*;

// -----------------------------------------------------------------------------
// Basis option
// -----------------------------------------------------------------------------
#[derive(Debug)]
pub enum BasisOpt<'a> {
    Some(&'a Basis),
    /// The field data is already collocated at quadrature points; no basis
    /// evaluation is performed
    Collocated,
    None,
}
/// Construct a BasisOpt reference from a Basis reference
impl<'a> From<&'a Basis> for BasisOpt<'a> {
    fn from(basis: &'a Basis) -> Self {
        Self::Some(basis)
    }
}
impl<'a> BasisOpt<'a> {
    /// Check if a BasisOpt is Some
    ///
    /// ```
    /// # use ceed_core::prelude::*;
    /// # fn main() -> ceed_core::Result<()> {
    /// # let ceed = ceed_core::Ceed::default_init();
    /// let b = ceed.basis_tensor_h1(1, 1, 2, 1, &[0.5, 0.5], &[-0.5, 0.5], &[0.0], &[2.0])?;
    /// let b_opt = BasisOpt::from(&b);
    /// assert!(b_opt.is_some(), "Incorrect BasisOpt");
    ///
    /// let b_opt = BasisOpt::Collocated;
    /// assert!(!b_opt.is_some(), "Incorrect BasisOpt");
    /// # Ok(())
    /// # }
    /// ```
    pub fn is_some(&self) -> bool {
        matches!(self, Self::Some(_))
    }

    /// Check if a BasisOpt is Collocated
    pub fn is_collocated(&self) -> bool {
        matches!(self, Self::Collocated)
    }

    /// Check if a BasisOpt is None
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }
}

// -----------------------------------------------------------------------------
// Basis data
// -----------------------------------------------------------------------------
#[derive(Debug)]
pub(crate) enum BasisKind {
    H1 { topo: crate::ElemTopology },
    TensorH1 { p1d: usize, q1d: usize },
}

#[derive(Debug)]
pub(crate) struct BasisData {
    pub(crate) kind: BasisKind,
    pub(crate) dim: usize,
    pub(crate) ncomp: usize,
    pub(crate) nnodes: usize,
    pub(crate) nqpts: usize,
    /// Row-major `nqpts x nnodes`
    pub(crate) interp: Vec<crate::Scalar>,
    /// Row-major `nqpts x nnodes` per direction, direction-major
    pub(crate) grad: Vec<crate::Scalar>,
    /// `dim * nqpts`, coordinate-major
    pub(crate) qref: Vec<crate::Scalar>,
    /// `nqpts`
    pub(crate) qweight: Vec<crate::Scalar>,
}

impl BasisData {
    // Per-element kernels. Element data is node-fastest, `u[c * nnodes + i]`,
    // and quadrature data is `v[c * nqpts + q]`, with gradient directions
    // ordered `(d * ncomp + c)`.
    pub(crate) fn interp_elem(&self, u: &[crate::Scalar], v: &mut [crate::Scalar]) {
        for c in 0..self.ncomp {
            let uc = &u[c * self.nnodes..][..self.nnodes];
            let vc = &mut v[c * self.nqpts..][..self.nqpts];
            for (q, vq) in vc.iter_mut().enumerate() {
                let row = &self.interp[q * self.nnodes..][..self.nnodes];
                *vq = row.iter().zip(uc.iter()).map(|(b, u)| b * u).sum();
            }
        }
    }

    pub(crate) fn interp_elem_t(&self, u: &[crate::Scalar], v: &mut [crate::Scalar]) {
        for c in 0..self.ncomp {
            let uc = &u[c * self.nqpts..][..self.nqpts];
            let vc = &mut v[c * self.nnodes..][..self.nnodes];
            for (q, uq) in uc.iter().enumerate() {
                let row = &self.interp[q * self.nnodes..][..self.nnodes];
                for (vi, b) in vc.iter_mut().zip(row.iter()) {
                    *vi += b * uq;
                }
            }
        }
    }

    pub(crate) fn grad_elem(&self, u: &[crate::Scalar], v: &mut [crate::Scalar]) {
        for d in 0..self.dim {
            let gd = &self.grad[d * self.nqpts * self.nnodes..][..self.nqpts * self.nnodes];
            for c in 0..self.ncomp {
                let uc = &u[c * self.nnodes..][..self.nnodes];
                let vdc = &mut v[(d * self.ncomp + c) * self.nqpts..][..self.nqpts];
                for (q, vq) in vdc.iter_mut().enumerate() {
                    let row = &gd[q * self.nnodes..][..self.nnodes];
                    *vq = row.iter().zip(uc.iter()).map(|(g, u)| g * u).sum();
                }
            }
        }
    }

    pub(crate) fn grad_elem_t(&self, u: &[crate::Scalar], v: &mut [crate::Scalar]) {
        for d in 0..self.dim {
            let gd = &self.grad[d * self.nqpts * self.nnodes..][..self.nqpts * self.nnodes];
            for c in 0..self.ncomp {
                let udc = &u[(d * self.ncomp + c) * self.nqpts..][..self.nqpts];
                let vc = &mut v[c * self.nnodes..][..self.nnodes];
                for (q, uq) in udc.iter().enumerate() {
                    let row = &gd[q * self.nnodes..][..self.nnodes];
                    for (vi, g) in vc.iter_mut().zip(row.iter()) {
                        *vi += g * uq;
                    }
                }
            }
        }
    }
}

// -----------------------------------------------------------------------------
// Basis context wrapper
// -----------------------------------------------------------------------------
#[derive(Debug)]
pub struct Basis {
    pub(crate) inner: Rc<BasisData>,
    ceed: crate::Ceed,
}

// -----------------------------------------------------------------------------
// Cloning
// -----------------------------------------------------------------------------
impl Clone for Basis {
    /// Perform a shallow clone of a Basis
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
            ceed: self.ceed.clone(),
        }
    }
}

// -----------------------------------------------------------------------------
// Display
// -----------------------------------------------------------------------------
impl fmt::Display for Basis {
    /// View a Basis
    ///
    /// ```
    /// # use ceed_core::prelude::*;
    /// # fn main() -> ceed_core::Result<()> {
    /// # let ceed = ceed_core::Ceed::default_init();
    /// let b = ceed.basis_tensor_h1(1, 1, 2, 1, &[0.5, 0.5], &[-0.5, 0.5], &[0.0], &[2.0])?;
    /// assert_eq!(b.to_string(), "TensorH1 Basis: dim=1 P=2 Q=1");
    /// # Ok(())
    /// # }
    /// ```
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let d = &self.inner;
        match d.kind {
            BasisKind::H1 { topo } => write!(
                f,
                "H1 Basis: {:?} topology, dim={} P={} Q={}",
                topo, d.dim, d.nnodes, d.nqpts
            ),
            BasisKind::TensorH1 { p1d, q1d } => {
                write!(f, "TensorH1 Basis: dim={} P={} Q={}", d.dim, p1d, q1d)
            }
        }
    }
}

// -----------------------------------------------------------------------------
// Implementations
// -----------------------------------------------------------------------------
impl Basis {
    // Constructors
    #[allow(clippy::too_many_arguments)]
    pub fn create_h1(
        ceed: &crate::Ceed,
        topo: crate::ElemTopology,
        ncomp: usize,
        nnodes: usize,
        nqpts: usize,
        interp: &[crate::Scalar],
        grad: &[crate::Scalar],
        qref: &[crate::Scalar],
        qweight: &[crate::Scalar],
    ) -> crate::Result<Self> {
        let dim = topo.dimension();
        check_length("basis interp matrix", interp, nqpts * nnodes)?;
        check_length("basis grad matrix", grad, dim * nqpts * nnodes)?;
        check_length("basis reference coordinates", qref, dim * nqpts)?;
        check_length("basis quadrature weights", qweight, nqpts)?;
        Ok(Self {
            inner: Rc::new(BasisData {
                kind: BasisKind::H1 { topo },
                dim,
                ncomp,
                nnodes,
                nqpts,
                interp: interp.to_vec(),
                grad: grad.to_vec(),
                qref: qref.to_vec(),
                qweight: qweight.to_vec(),
            }),
            ceed: ceed.clone(),
        })
    }

    #[allow(clippy::too_many_arguments)]
    pub fn create_tensor_h1(
        ceed: &crate::Ceed,
        dim: usize,
        ncomp: usize,
        p1d: usize,
        q1d: usize,
        interp1d: &[crate::Scalar],
        grad1d: &[crate::Scalar],
        qref1d: &[crate::Scalar],
        qweight1d: &[crate::Scalar],
    ) -> crate::Result<Self> {
        if !(1..=3).contains(&dim) {
            return Err(Error::InvalidDimensions {
                what: format!("tensor basis dimension must be 1, 2, or 3, got {}", dim),
            });
        }
        check_length("basis interp matrix", interp1d, q1d * p1d)?;
        check_length("basis grad matrix", grad1d, q1d * p1d)?;
        check_length("basis reference coordinates", qref1d, q1d)?;
        check_length("basis quadrature weights", qweight1d, q1d)?;

        let nnodes = p1d.pow(dim as u32);
        let nqpts = q1d.pow(dim as u32);

        // Expand the one-dimensional matrices to their full tensor products.
        // Indices decompose with the first dimension fastest.
        let mut interp = vec![0.0; nqpts * nnodes];
        let mut grad = vec![0.0; dim * nqpts * nnodes];
        for q in 0..nqpts {
            for i in 0..nnodes {
                let mut bval = 1.0;
                let mut gval = [1.0; 3];
                let (mut qq, mut ii) = (q, i);
                for k in 0..dim {
                    let (jk, ik) = (qq % q1d, ii % p1d);
                    qq /= q1d;
                    ii /= p1d;
                    let b = interp1d[jk * p1d + ik];
                    let g = grad1d[jk * p1d + ik];
                    bval *= b;
                    for (d, gv) in gval.iter_mut().enumerate().take(dim) {
                        *gv *= if d == k { g } else { b };
                    }
                }
                interp[q * nnodes + i] = bval;
                for (d, gv) in gval.iter().enumerate().take(dim) {
                    grad[(d * nqpts + q) * nnodes + i] = *gv;
                }
            }
        }
        let mut qref = vec![0.0; dim * nqpts];
        let mut qweight = vec![0.0; nqpts];
        for (q, w) in qweight.iter_mut().enumerate() {
            let mut weight = 1.0;
            let mut qq = q;
            for k in 0..dim {
                let jk = qq % q1d;
                qq /= q1d;
                qref[k * nqpts + q] = qref1d[jk];
                weight *= qweight1d[jk];
            }
            *w = weight;
        }

        Ok(Self {
            inner: Rc::new(BasisData {
                kind: BasisKind::TensorH1 { p1d, q1d },
                dim,
                ncomp,
                nnodes,
                nqpts,
                interp,
                grad,
                qref,
                qweight,
            }),
            ceed: ceed.clone(),
        })
    }

    /// Apply basis evaluation from nodes to quadrature points or the transpose
    ///
    /// The transpose direction sums into `v` without zeroing it first. Element
    /// data is node-fastest within each element, and gradient quadrature data
    /// is direction-major, `(d * ncomp + c)`.
    ///
    /// # arguments
    ///
    /// * `nelem` - Number of elements to apply the basis evaluation to
    /// * `tmode` - `TransposeMode::NoTranspose` to evaluate from nodes to
    ///   quadrature points, `TransposeMode::Transpose` to apply the transpose
    /// * `emode` - `EvalMode::None` to copy data, `EvalMode::Interp` to use
    ///   interpolation, `EvalMode::Grad` to use gradients, `EvalMode::Weight`
    ///   to use quadrature weights
    /// * `u`     - Input vector; ignored for `EvalMode::Weight`
    /// * `v`     - Output vector
    ///
    /// ```
    /// # use ceed_core::prelude::*;
    /// # fn main() -> ceed_core::Result<()> {
    /// # let ceed = ceed_core::Ceed::default_init();
    /// let b = ceed.basis_tensor_h1(1, 1, 2, 1, &[0.5, 0.5], &[-0.5, 0.5], &[0.0], &[2.0])?;
    ///
    /// let u = ceed.vector_from_slice(&[1., 2.])?;
    /// let mut v = ceed.vector(1)?;
    ///
    /// b.apply(1, TransposeMode::NoTranspose, EvalMode::Interp, &u, &mut v)?;
    /// assert!((v.view()?[0] - 1.5).abs() < EPSILON, "Incorrect interpolation");
    ///
    /// b.apply(1, TransposeMode::NoTranspose, EvalMode::Grad, &u, &mut v)?;
    /// assert!((v.view()?[0] - 0.5).abs() < EPSILON, "Incorrect gradient");
    ///
    /// b.apply(1, TransposeMode::NoTranspose, EvalMode::Weight, &u, &mut v)?;
    /// assert!((v.view()?[0] - 2.0).abs() < EPSILON, "Incorrect weight");
    /// # Ok(())
    /// # }
    /// ```
    pub fn apply(
        &self,
        nelem: usize,
        tmode: crate::TransposeMode,
        emode: crate::EvalMode,
        u: &crate::Vector,
        v: &mut crate::Vector,
    ) -> crate::Result<()> {
        let data = &*self.inner;
        let node_chunk = data.ncomp * data.nnodes;
        let quad_chunk = match emode {
            crate::EvalMode::None | crate::EvalMode::Interp => data.ncomp * data.nqpts,
            crate::EvalMode::Grad => data.dim * data.ncomp * data.nqpts,
            crate::EvalMode::Weight => data.nqpts,
            crate::EvalMode::Div | crate::EvalMode::Curl => {
                return Err(Error::UnsupportedEvalMode {
                    name: "basis apply".to_string(),
                    emode,
                })
            }
        };
        if emode == crate::EvalMode::Weight && tmode == crate::TransposeMode::Transpose {
            return Err(Error::UnsupportedEvalMode {
                name: "basis apply transpose".to_string(),
                emode,
            });
        }

        let (in_chunk, out_chunk) = match (tmode, emode) {
            (_, crate::EvalMode::None) => (quad_chunk, quad_chunk),
            (crate::TransposeMode::NoTranspose, _) => (node_chunk, quad_chunk),
            (crate::TransposeMode::Transpose, _) => (quad_chunk, node_chunk),
        };
        if emode != crate::EvalMode::Weight && u.length() != nelem * in_chunk {
            return Err(Error::LengthMismatch {
                object: "basis input",
                expected: nelem * in_chunk,
                found: u.length(),
            });
        }
        if v.length() != nelem * out_chunk {
            return Err(Error::LengthMismatch {
                object: "basis output",
                expected: nelem * out_chunk,
                found: v.length(),
            });
        }
        if nelem == 0 || out_chunk == 0 || in_chunk == 0 {
            return Ok(());
        }

        if emode == crate::EvalMode::Weight {
            let mut dst = v.write_data()?;
            dst.host
                .par_chunks_mut(out_chunk)
                .for_each(|ve| ve.copy_from_slice(&data.qweight));
            return Ok(());
        }

        let src = u.read_data()?;
        let mut dst = v.write_data()?;
        dst.host
            .par_chunks_mut(out_chunk)
            .zip(src.host.par_chunks(in_chunk))
            .for_each(|(ve, ue)| match (tmode, emode) {
                (crate::TransposeMode::NoTranspose, crate::EvalMode::None) => {
                    ve.copy_from_slice(ue)
                }
                (crate::TransposeMode::Transpose, crate::EvalMode::None) => {
                    for (vi, ui) in ve.iter_mut().zip(ue.iter()) {
                        *vi += ui;
                    }
                }
                (crate::TransposeMode::NoTranspose, crate::EvalMode::Interp) => {
                    data.interp_elem(ue, ve)
                }
                (crate::TransposeMode::Transpose, crate::EvalMode::Interp) => {
                    data.interp_elem_t(ue, ve)
                }
                (crate::TransposeMode::NoTranspose, crate::EvalMode::Grad) => {
                    data.grad_elem(ue, ve)
                }
                (crate::TransposeMode::Transpose, crate::EvalMode::Grad) => {
                    data.grad_elem_t(ue, ve)
                }
                _ => unreachable!("modes rejected above"),
            });
        Ok(())
    }

    /// Returns the dimension of the reference element
    ///
    /// ```
    /// # use ceed_core::prelude::*;
    /// # fn main() -> ceed_core::Result<()> {
    /// # let ceed = ceed_core::Ceed::default_init();
    /// let b = ceed.basis_tensor_h1(2, 1, 3, 4, &[0.; 12], &[0.; 12], &[0.; 4], &[0.; 4])?;
    /// assert_eq!(b.dimension(), 2, "Incorrect dimension");
    /// # Ok(())
    /// # }
    /// ```
    pub fn dimension(&self) -> usize {
        self.inner.dim
    }

    /// Returns the number of components of a Basis
    pub fn num_components(&self) -> usize {
        self.inner.ncomp
    }

    /// Returns the total number of nodes (in `dim` dimensions) of a Basis
    ///
    /// ```
    /// # use ceed_core::prelude::*;
    /// # fn main() -> ceed_core::Result<()> {
    /// # let ceed = ceed_core::Ceed::default_init();
    /// let b = ceed.basis_tensor_h1(2, 1, 3, 4, &[0.; 12], &[0.; 12], &[0.; 4], &[0.; 4])?;
    /// assert_eq!(b.num_nodes(), 9, "Incorrect number of nodes");
    /// # Ok(())
    /// # }
    /// ```
    pub fn num_nodes(&self) -> usize {
        self.inner.nnodes
    }

    /// Returns the total number of quadrature points (in `dim` dimensions) of
    /// a Basis
    ///
    /// ```
    /// # use ceed_core::prelude::*;
    /// # fn main() -> ceed_core::Result<()> {
    /// # let ceed = ceed_core::Ceed::default_init();
    /// let b = ceed.basis_tensor_h1(2, 1, 3, 4, &[0.; 12], &[0.; 12], &[0.; 4], &[0.; 4])?;
    /// assert_eq!(b.num_quadrature_points(), 16, "Incorrect number of points");
    /// # Ok(())
    /// # }
    /// ```
    pub fn num_quadrature_points(&self) -> usize {
        self.inner.nqpts
    }

    /// Returns the topology of the reference element; tensor-product bases
    /// report the corresponding line, quad, or hex topology
    pub fn topology(&self) -> crate::ElemTopology {
        match self.inner.kind {
            BasisKind::H1 { topo } => topo,
            BasisKind::TensorH1 { .. } => match self.inner.dim {
                1 => crate::ElemTopology::Line,
                2 => crate::ElemTopology::Quad,
                _ => crate::ElemTopology::Hex,
            },
        }
    }

    /// Returns the reference coordinates of the quadrature points,
    /// coordinate-major
    pub fn quadrature_points(&self) -> &[crate::Scalar] {
        &self.inner.qref
    }

    /// Returns the quadrature weights
    pub fn quadrature_weights(&self) -> &[crate::Scalar] {
        &self.inner.qweight
    }
}

fn check_length(
    object: &'static str,
    slice: &[crate::Scalar],
    expected: usize,
) -> crate::Result<()> {
    if slice.len() != expected {
        return Err(Error::LengthMismatch {
            object,
            expected,
            found: slice.len(),
        });
    }
    Ok(())
}

// -----------------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------------
#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Ceed, ElemTopology, EvalMode, Scalar, TransposeMode, EPSILON};

    fn midpoint_basis(ceed: &Ceed, dim: usize) -> crate::Result<Basis> {
        ceed.basis_tensor_h1(dim, 1, 2, 1, &[0.5, 0.5], &[-0.5, 0.5], &[0.0], &[2.0])
    }

    #[test]
    fn basis_tensor_expansion_2d() -> crate::Result<()> {
        let ceed = Ceed::default_init();
        let b = midpoint_basis(&ceed, 2)?;
        assert_eq!(b.num_nodes(), 4);
        assert_eq!(b.num_quadrature_points(), 1);
        assert_eq!(&b.inner.interp[..], &[0.25; 4]);
        assert_eq!(&b.inner.grad[..4], &[-0.25, 0.25, -0.25, 0.25]);
        assert_eq!(&b.inner.grad[4..], &[-0.25, -0.25, 0.25, 0.25]);
        assert_eq!(b.quadrature_weights(), &[4.0]);
        assert_eq!(b.quadrature_points(), &[0.0, 0.0]);
        Ok(())
    }

    #[test]
    fn basis_grad_of_coordinate_field() -> crate::Result<()> {
        let ceed = Ceed::default_init();
        let b = midpoint_basis(&ceed, 2)?;

        // Nodal values of the first reference coordinate
        let u = ceed.vector_from_slice(&[0., 1., 0., 1.])?;
        let mut v = ceed.vector(2)?;
        b.apply(1, TransposeMode::NoTranspose, EvalMode::Grad, &u, &mut v)?;
        let v = v.view()?;
        assert!((v[0] - 0.5).abs() < EPSILON, "Incorrect first direction");
        assert!(v[1].abs() < EPSILON, "Incorrect second direction");
        Ok(())
    }

    #[test]
    fn basis_transpose_accumulates() -> crate::Result<()> {
        let ceed = Ceed::default_init();
        let b = midpoint_basis(&ceed, 1)?;

        let u = ceed.vector_from_slice(&[2.0])?;
        let mut v = ceed.vector_from_slice(&[1.0, 1.0])?;
        b.apply(1, TransposeMode::Transpose, EvalMode::Interp, &u, &mut v)?;
        for vi in v.view()?.iter() {
            assert!((vi - 2.0).abs() < EPSILON, "Transpose did not accumulate");
        }
        Ok(())
    }

    #[test]
    fn basis_weight_ignores_input() -> crate::Result<()> {
        let ceed = Ceed::default_init();
        let b = midpoint_basis(&ceed, 2)?;

        let u = ceed.vector(0)?;
        let mut v = ceed.vector(3)?;
        b.apply(3, TransposeMode::NoTranspose, EvalMode::Weight, &u, &mut v)?;
        for w in v.view()?.iter() {
            assert_eq!(*w, 4.0, "Incorrect quadrature weight");
        }
        Ok(())
    }

    #[test]
    fn basis_div_is_unsupported() -> crate::Result<()> {
        let ceed = Ceed::default_init();
        let b = midpoint_basis(&ceed, 1)?;

        let u = ceed.vector(2)?;
        let mut v = ceed.vector(1)?;
        assert!(matches!(
            b.apply(1, TransposeMode::NoTranspose, EvalMode::Div, &u, &mut v),
            Err(Error::UnsupportedEvalMode {
                emode: EvalMode::Div,
                ..
            })
        ));
        Ok(())
    }

    #[test]
    fn basis_h1_matrix_lengths() {
        let ceed = Ceed::default_init();
        assert!(matches!(
            ceed.basis_h1(ElemTopology::Line, 1, 2, 1, &[0.5], &[-0.5, 0.5], &[0.0], &[2.0]),
            Err(Error::LengthMismatch { .. })
        ));
    }

    #[test]
    fn basis_interp_matches_sum_of_nodes() -> crate::Result<()> {
        let ceed = Ceed::default_init();
        let b = midpoint_basis(&ceed, 3)?;
        assert_eq!(b.num_nodes(), 8);

        let nodal: Vec<Scalar> = (0..8).map(|i| i as Scalar).collect();
        let u = ceed.vector_from_slice(&nodal)?;
        let mut v = ceed.vector(1)?;
        b.apply(1, TransposeMode::NoTranspose, EvalMode::Interp, &u, &mut v)?;
        let expected = nodal.iter().sum::<Scalar>() / 8.0;
        assert!(
            (v.view()?[0] - expected).abs() < 10.0 * EPSILON,
            "Incorrect trilinear interpolation"
        );
        Ok(())
    }
}
