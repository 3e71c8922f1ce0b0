// Copyright (c) 2017-2022, Lawrence Livermore National Security, LLC and other CEED contributors.
// All Rights Reserved. See the top-level LICENSE and NOTICE files for details.
//
// SPDX-License-Identifier: BSD-2-Clause
//
// This file is part of CEED:  http://github.com/ceed

//! A Ceed ElemRestriction decomposes elements and groups the degrees of
//! freedom, mapping between the local (L-vector) and element-wise (E-vector)
//! orderings.

use rayon::prelude::*;

use crate::prelude::*;

// -----------------------------------------------------------------------------
// ElemRestriction option
// -----------------------------------------------------------------------------
#[derive(Debug)]
pub enum ElemRestrictionOpt<'a> {
    Some(&'a ElemRestriction),
    None,
}
/// Construct an ElemRestrictionOpt reference from an ElemRestriction reference
impl<'a> From<&'a ElemRestriction> for ElemRestrictionOpt<'a> {
    fn from(rstr: &'a ElemRestriction) -> Self {
        Self::Some(rstr)
    }
}
impl<'a> ElemRestrictionOpt<'a> {
    /// Check if an ElemRestrictionOpt is Some
    ///
    /// ```
    /// # use ceed_core::prelude::*;
    /// # fn main() -> ceed_core::Result<()> {
    /// # let ceed = ceed_core::Ceed::default_init();
    /// let r = ceed.identity_elem_restriction(3, 2, 6, 1)?;
    /// let r_opt = ElemRestrictionOpt::from(&r);
    /// assert!(r_opt.is_some(), "Incorrect ElemRestrictionOpt");
    ///
    /// let r_opt = ElemRestrictionOpt::None;
    /// assert!(!r_opt.is_some(), "Incorrect ElemRestrictionOpt");
    /// # Ok(())
    /// # }
    /// ```
    pub fn is_some(&self) -> bool {
        matches!(self, Self::Some(_))
    }

    /// Check if an ElemRestrictionOpt is None
    ///
    /// ```
    /// # use ceed_core::prelude::*;
    /// # fn main() -> ceed_core::Result<()> {
    /// # let ceed = ceed_core::Ceed::default_init();
    /// let r_opt = ElemRestrictionOpt::None;
    /// assert!(r_opt.is_none(), "Incorrect ElemRestrictionOpt");
    /// # Ok(())
    /// # }
    /// ```
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }
}

// -----------------------------------------------------------------------------
// Restriction mapping kinds
// -----------------------------------------------------------------------------
#[derive(Debug)]
pub(crate) enum RestrictionKind {
    /// Explicit offsets, one L-vector node per element node
    Plain { offsets: Vec<usize> },
    /// Elements tile the L-vector contiguously and in order
    Identity,
    /// Explicit offsets with elements grouped into blocks; partial final
    /// blocks repeat the last element
    Blocked { blksize: usize, offsets: Vec<usize> },
}

#[derive(Debug)]
pub(crate) struct RestrictionData {
    pub(crate) nelem: usize,
    pub(crate) elemsize: usize,
    pub(crate) nnodes: usize,
    pub(crate) ncomp: usize,
    pub(crate) kind: RestrictionKind,
}

impl RestrictionData {
    pub(crate) fn offset(&self, e: usize, i: usize) -> usize {
        match &self.kind {
            RestrictionKind::Identity => e * self.elemsize + i,
            RestrictionKind::Plain { offsets } | RestrictionKind::Blocked { offsets, .. } => {
                offsets[e * self.elemsize + i]
            }
        }
    }

    pub(crate) fn lvector_size(&self) -> usize {
        self.nnodes * self.ncomp
    }

    pub(crate) fn evector_size(&self) -> usize {
        match &self.kind {
            RestrictionKind::Blocked { blksize, .. } => {
                self.num_blocks() * blksize * self.elemsize * self.ncomp
            }
            _ => self.nelem * self.elemsize * self.ncomp,
        }
    }

    fn num_blocks(&self) -> usize {
        match &self.kind {
            RestrictionKind::Blocked { blksize, .. } => self.nelem.div_ceil(*blksize),
            _ => 0,
        }
    }

    fn elem_index(&self, lmode: crate::LayoutMode, i: usize, c: usize) -> usize {
        match lmode {
            crate::LayoutMode::CompFastest => i * self.ncomp + c,
            crate::LayoutMode::NodeFastest => c * self.elemsize + i,
        }
    }

    // Forward gather or transpose scatter-add at the slice level. The
    // transpose direction sums into v without zeroing it first.
    pub(crate) fn apply_slices(
        &self,
        tmode: crate::TransposeMode,
        lmode: crate::LayoutMode,
        u: &[crate::Scalar],
        v: &mut [crate::Scalar],
    ) {
        if self.nelem == 0 || self.elemsize * self.ncomp == 0 {
            return;
        }
        match (tmode, &self.kind) {
            (crate::TransposeMode::NoTranspose, RestrictionKind::Blocked { blksize, .. }) => {
                self.gather_blocked(lmode, *blksize, u, v)
            }
            (crate::TransposeMode::NoTranspose, _) => self.gather(lmode, u, v),
            (crate::TransposeMode::Transpose, RestrictionKind::Blocked { blksize, .. }) => {
                self.scatter_add_blocked(lmode, *blksize, u, v)
            }
            (crate::TransposeMode::Transpose, _) => self.scatter_add(lmode, u, v),
        }
    }

    fn gather(&self, lmode: crate::LayoutMode, u: &[crate::Scalar], v: &mut [crate::Scalar]) {
        let (elemsize, ncomp) = (self.elemsize, self.ncomp);
        v.par_chunks_mut(elemsize * ncomp)
            .enumerate()
            .for_each(|(e, ve)| {
                for i in 0..elemsize {
                    let node = self.offset(e, i);
                    for c in 0..ncomp {
                        ve[self.elem_index(lmode, i, c)] = u[node * ncomp + c];
                    }
                }
            });
    }

    fn scatter_add(&self, lmode: crate::LayoutMode, u: &[crate::Scalar], v: &mut [crate::Scalar]) {
        let (elemsize, ncomp) = (self.elemsize, self.ncomp);
        for e in 0..self.nelem {
            let ue = &u[e * elemsize * ncomp..][..elemsize * ncomp];
            for i in 0..elemsize {
                let node = self.offset(e, i);
                for c in 0..ncomp {
                    v[node * ncomp + c] += ue[self.elem_index(lmode, i, c)];
                }
            }
        }
    }

    fn gather_blocked(
        &self,
        lmode: crate::LayoutMode,
        blksize: usize,
        u: &[crate::Scalar],
        v: &mut [crate::Scalar],
    ) {
        v.par_chunks_mut(blksize * self.elemsize * self.ncomp)
            .enumerate()
            .for_each(|(b, vb)| self.gather_one_block(lmode, blksize, b, u, vb));
    }

    fn gather_one_block(
        &self,
        lmode: crate::LayoutMode,
        blksize: usize,
        block: usize,
        u: &[crate::Scalar],
        vb: &mut [crate::Scalar],
    ) {
        for j in 0..blksize {
            // Partial blocks repeat the last element
            let e = (block * blksize + j).min(self.nelem - 1);
            for i in 0..self.elemsize {
                let node = self.offset(e, i);
                for c in 0..self.ncomp {
                    vb[self.elem_index(lmode, i, c) * blksize + j] = u[node * self.ncomp + c];
                }
            }
        }
    }

    fn scatter_add_blocked(
        &self,
        lmode: crate::LayoutMode,
        blksize: usize,
        u: &[crate::Scalar],
        v: &mut [crate::Scalar],
    ) {
        for b in 0..self.num_blocks() {
            let ub = &u[b * blksize * self.elemsize * self.ncomp..]
                [..blksize * self.elemsize * self.ncomp];
            self.scatter_add_one_block(lmode, blksize, b, ub, v);
        }
    }

    fn scatter_add_one_block(
        &self,
        lmode: crate::LayoutMode,
        blksize: usize,
        block: usize,
        ub: &[crate::Scalar],
        v: &mut [crate::Scalar],
    ) {
        for j in 0..blksize {
            let e = block * blksize + j;
            // Padded lanes of a partial block carry duplicate data
            if e >= self.nelem {
                continue;
            }
            for i in 0..self.elemsize {
                let node = self.offset(e, i);
                for c in 0..self.ncomp {
                    v[node * self.ncomp + c] += ub[self.elem_index(lmode, i, c) * blksize + j];
                }
            }
        }
    }
}

// -----------------------------------------------------------------------------
// ElemRestriction context wrapper
// -----------------------------------------------------------------------------
#[derive(Debug)]
pub struct ElemRestriction {
    pub(crate) inner: Rc<RestrictionData>,
    ceed: crate::Ceed,
}

// -----------------------------------------------------------------------------
// Cloning
// -----------------------------------------------------------------------------
impl Clone for ElemRestriction {
    /// Perform a shallow clone of an ElemRestriction
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
impl fmt::Display for ElemRestriction {
    /// View an ElemRestriction
    ///
    /// ```
    /// # use ceed_core::prelude::*;
    /// # fn main() -> ceed_core::Result<()> {
    /// # let ceed = ceed_core::Ceed::default_init();
    /// let r = ceed.identity_elem_restriction(3, 2, 6, 1)?;
    /// println!("{}", r);
    /// # Ok(())
    /// # }
    /// ```
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let d = &self.inner;
        match &d.kind {
            RestrictionKind::Plain { .. } => write!(
                f,
                "ElemRestriction from ({}, {}) to {} elements with {} nodes each and component stride 1",
                d.nnodes, d.ncomp, d.nelem, d.elemsize
            ),
            RestrictionKind::Identity => write!(
                f,
                "Identity ElemRestriction from ({}, {}) to {} elements with {} nodes each",
                d.nnodes, d.ncomp, d.nelem, d.elemsize
            ),
            RestrictionKind::Blocked { blksize, .. } => write!(
                f,
                "Blocked ElemRestriction from ({}, {}) to {} elements in blocks of {} with {} nodes each",
                d.nnodes, d.ncomp, d.nelem, blksize, d.elemsize
            ),
        }
    }
}

// -----------------------------------------------------------------------------
// Implementations
// -----------------------------------------------------------------------------
impl ElemRestriction {
    // Constructors
    pub fn create(
        ceed: &crate::Ceed,
        nelem: usize,
        elemsize: usize,
        nnodes: usize,
        ncomp: usize,
        offsets: &[i32],
    ) -> crate::Result<Self> {
        let offsets = Self::check_offsets(nelem, elemsize, nnodes, offsets)?;
        Ok(Self {
            inner: Rc::new(RestrictionData {
                nelem,
                elemsize,
                nnodes,
                ncomp,
                kind: RestrictionKind::Plain { offsets },
            }),
            ceed: ceed.clone(),
        })
    }

    pub fn create_identity(
        ceed: &crate::Ceed,
        nelem: usize,
        elemsize: usize,
        nnodes: usize,
        ncomp: usize,
    ) -> crate::Result<Self> {
        if nnodes != nelem * elemsize {
            return Err(Error::LengthMismatch {
                object: "identity restriction L-vector nodes",
                expected: nelem * elemsize,
                found: nnodes,
            });
        }
        Ok(Self {
            inner: Rc::new(RestrictionData {
                nelem,
                elemsize,
                nnodes,
                ncomp,
                kind: RestrictionKind::Identity,
            }),
            ceed: ceed.clone(),
        })
    }

    pub fn create_blocked(
        ceed: &crate::Ceed,
        nelem: usize,
        elemsize: usize,
        blksize: usize,
        nnodes: usize,
        ncomp: usize,
        offsets: &[i32],
    ) -> crate::Result<Self> {
        if blksize == 0 {
            return Err(Error::InvalidDimensions {
                what: "block size must be nonzero".to_string(),
            });
        }
        let offsets = Self::check_offsets(nelem, elemsize, nnodes, offsets)?;
        Ok(Self {
            inner: Rc::new(RestrictionData {
                nelem,
                elemsize,
                nnodes,
                ncomp,
                kind: RestrictionKind::Blocked { blksize, offsets },
            }),
            ceed: ceed.clone(),
        })
    }

    fn check_offsets(
        nelem: usize,
        elemsize: usize,
        nnodes: usize,
        offsets: &[i32],
    ) -> crate::Result<Vec<usize>> {
        if offsets.len() != nelem * elemsize {
            return Err(Error::LengthMismatch {
                object: "restriction offsets",
                expected: nelem * elemsize,
                found: offsets.len(),
            });
        }
        offsets
            .iter()
            .map(|&ind| {
                if ind < 0 || ind as usize >= nnodes {
                    Err(Error::OffsetOutOfRange {
                        index: ind.max(0) as usize,
                        nnodes,
                    })
                } else {
                    Ok(ind as usize)
                }
            })
            .collect()
    }

    /// Restrict an L-vector to an E-vector or apply its transpose
    ///
    /// The transpose direction sums into `ru` without zeroing it first.
    ///
    /// # arguments
    ///
    /// * `tmode` - Apply restriction or transpose
    /// * `u`     - Input vector (of size `lvector_size()` when `tmode` is
    ///   `TransposeMode::NoTranspose`)
    /// * `ru`    - Output vector (of size `evector_size()` when `tmode` is
    ///   `TransposeMode::NoTranspose`)
    ///
    /// ```
    /// # use ceed_core::prelude::*;
    /// # fn main() -> ceed_core::Result<()> {
    /// # let ceed = ceed_core::Ceed::default_init();
    /// let nelem = 3;
    /// let mut ind: Vec<i32> = vec![0; 2 * nelem];
    /// for i in 0..nelem {
    ///     ind[2 * i + 0] = i as i32;
    ///     ind[2 * i + 1] = i as i32 + 1;
    /// }
    /// let r = ceed.elem_restriction(nelem, 2, nelem + 1, 1, &ind)?;
    ///
    /// let x = ceed.vector_from_slice(&[0., 1., 2., 3.])?;
    /// let mut y = ceed.vector(nelem * 2)?;
    ///
    /// r.apply(TransposeMode::NoTranspose, &x, &mut y)?;
    ///
    /// for (i, y) in y.view()?.iter().enumerate() {
    ///     assert_eq!(
    ///         *y,
    ///         ((i + 1) / 2) as Scalar,
    ///         "Incorrect value in restricted vector"
    ///     );
    /// }
    /// # Ok(())
    /// # }
    /// ```
    pub fn apply(
        &self,
        tmode: crate::TransposeMode,
        u: &crate::Vector,
        ru: &mut crate::Vector,
    ) -> crate::Result<()> {
        self.apply_in_layout(
            tmode,
            crate::LayoutMode::CompFastest,
            u,
            ru,
            crate::Request::Immediate,
        )
    }

    /// Restrict an L-vector to an E-vector or apply its transpose, with an
    /// explicit E-vector layout and completion request
    ///
    /// # arguments
    ///
    /// * `tmode`   - Apply restriction or transpose
    /// * `lmode`   - Ordering of unknowns within an element of the E-vector
    /// * `u`       - Input vector
    /// * `ru`      - Output vector
    /// * `request` - Completion semantics; the reference backend completes
    ///   eagerly for both kinds
    ///
    /// ```
    /// # use ceed_core::prelude::*;
    /// # fn main() -> ceed_core::Result<()> {
    /// # let ceed = ceed_core::Ceed::default_init();
    /// let r = ceed.elem_restriction(1, 2, 2, 2, &[0, 1])?;
    ///
    /// let x = ceed.vector_from_slice(&[1., 2., 3., 4.])?;
    /// let mut y = ceed.vector(4)?;
    ///
    /// r.apply_in_layout(
    ///     TransposeMode::NoTranspose,
    ///     LayoutMode::NodeFastest,
    ///     &x,
    ///     &mut y,
    ///     Request::Immediate,
    /// )?;
    /// assert_eq!(&y.view()?[..], &[1., 3., 2., 4.]);
    /// # Ok(())
    /// # }
    /// ```
    pub fn apply_in_layout(
        &self,
        tmode: crate::TransposeMode,
        lmode: crate::LayoutMode,
        u: &crate::Vector,
        ru: &mut crate::Vector,
        request: crate::Request,
    ) -> crate::Result<()> {
        // Synchronous backend; both request kinds complete eagerly
        let _ = request;
        let data = &*self.inner;
        let (in_len, out_len) = match tmode {
            crate::TransposeMode::NoTranspose => (data.lvector_size(), data.evector_size()),
            crate::TransposeMode::Transpose => (data.evector_size(), data.lvector_size()),
        };
        if u.length() != in_len {
            return Err(Error::LengthMismatch {
                object: "restriction input",
                expected: in_len,
                found: u.length(),
            });
        }
        if ru.length() != out_len {
            return Err(Error::LengthMismatch {
                object: "restriction output",
                expected: out_len,
                found: ru.length(),
            });
        }
        let src = u.read_data()?;
        let mut dst = ru.write_data()?;
        data.apply_slices(tmode, lmode, &src.host, &mut dst.host);
        Ok(())
    }

    /// Restrict a single block of a blocked restriction
    ///
    /// # arguments
    ///
    /// * `block`   - Index of the block to apply
    /// * `tmode`   - Apply restriction or transpose
    /// * `lmode`   - Ordering of unknowns within an element of the E-vector
    /// * `u`       - Input vector; the block E-vector of size
    ///   `block_size() * elem_size() * num_components()` when `tmode` is
    ///   `TransposeMode::Transpose`
    /// * `ru`      - Output vector
    /// * `request` - Completion semantics
    ///
    /// ```
    /// # use ceed_core::prelude::*;
    /// # fn main() -> ceed_core::Result<()> {
    /// # let ceed = ceed_core::Ceed::default_init();
    /// let r = ceed.blocked_elem_restriction(3, 2, 2, 4, 1, &[0, 1, 1, 2, 2, 3])?;
    ///
    /// let x = ceed.vector_from_slice(&[0., 1., 2., 3.])?;
    /// let mut y = ceed.vector(4)?;
    ///
    /// // The final partial block repeats the last element
    /// r.apply_block(
    ///     1,
    ///     TransposeMode::NoTranspose,
    ///     LayoutMode::CompFastest,
    ///     &x,
    ///     &mut y,
    ///     Request::Immediate,
    /// )?;
    /// assert_eq!(&y.view()?[..], &[2., 2., 3., 3.]);
    /// # Ok(())
    /// # }
    /// ```
    pub fn apply_block(
        &self,
        block: usize,
        tmode: crate::TransposeMode,
        lmode: crate::LayoutMode,
        u: &crate::Vector,
        ru: &mut crate::Vector,
        request: crate::Request,
    ) -> crate::Result<()> {
        let _ = request;
        let data = &*self.inner;
        let blksize = match &data.kind {
            RestrictionKind::Blocked { blksize, .. } => *blksize,
            _ => return Err(Error::NotBlocked),
        };
        if block >= data.num_blocks() {
            return Err(Error::BlockOutOfRange {
                block,
                num_blocks: data.num_blocks(),
            });
        }
        let block_len = blksize * data.elemsize * data.ncomp;
        let (in_len, out_len) = match tmode {
            crate::TransposeMode::NoTranspose => (data.lvector_size(), block_len),
            crate::TransposeMode::Transpose => (block_len, data.lvector_size()),
        };
        if u.length() != in_len {
            return Err(Error::LengthMismatch {
                object: "restriction input",
                expected: in_len,
                found: u.length(),
            });
        }
        if ru.length() != out_len {
            return Err(Error::LengthMismatch {
                object: "restriction output",
                expected: out_len,
                found: ru.length(),
            });
        }
        let src = u.read_data()?;
        let mut dst = ru.write_data()?;
        match tmode {
            crate::TransposeMode::NoTranspose => {
                data.gather_one_block(lmode, blksize, block, &src.host, &mut dst.host)
            }
            crate::TransposeMode::Transpose => {
                data.scatter_add_one_block(lmode, blksize, block, &src.host, &mut dst.host)
            }
        }
        Ok(())
    }

    /// Create an L-vector for an ElemRestriction
    ///
    /// ```
    /// # use ceed_core::prelude::*;
    /// # fn main() -> ceed_core::Result<()> {
    /// # let ceed = ceed_core::Ceed::default_init();
    /// let r = ceed.identity_elem_restriction(3, 2, 6, 1)?;
    ///
    /// let lvector = r.create_lvector()?;
    /// assert_eq!(lvector.length(), 6, "Incorrect L-vector size");
    /// # Ok(())
    /// # }
    /// ```
    pub fn create_lvector(&self) -> crate::Result<crate::Vector> {
        crate::Vector::create(&self.ceed, self.inner.lvector_size())
    }

    /// Create an E-vector for an ElemRestriction
    ///
    /// ```
    /// # use ceed_core::prelude::*;
    /// # fn main() -> ceed_core::Result<()> {
    /// # let ceed = ceed_core::Ceed::default_init();
    /// let r = ceed.identity_elem_restriction(3, 2, 6, 1)?;
    ///
    /// let evector = r.create_evector()?;
    /// assert_eq!(evector.length(), 6, "Incorrect E-vector size");
    /// # Ok(())
    /// # }
    /// ```
    pub fn create_evector(&self) -> crate::Result<crate::Vector> {
        crate::Vector::create(&self.ceed, self.inner.evector_size())
    }

    /// Create an L-vector and an E-vector for an ElemRestriction
    ///
    /// ```
    /// # use ceed_core::prelude::*;
    /// # fn main() -> ceed_core::Result<()> {
    /// # let ceed = ceed_core::Ceed::default_init();
    /// let r = ceed.identity_elem_restriction(3, 2, 6, 1)?;
    ///
    /// let (lvector, evector) = r.create_vectors()?;
    /// assert_eq!(lvector.length(), 6, "Incorrect L-vector size");
    /// assert_eq!(evector.length(), 6, "Incorrect E-vector size");
    /// # Ok(())
    /// # }
    /// ```
    pub fn create_vectors(&self) -> crate::Result<(crate::Vector, crate::Vector)> {
        Ok((self.create_lvector()?, self.create_evector()?))
    }

    /// Returns the L-vector component stride
    pub fn num_components(&self) -> usize {
        self.inner.ncomp
    }

    /// Returns the total number of elements in the range of an ElemRestriction
    ///
    /// ```
    /// # use ceed_core::prelude::*;
    /// # fn main() -> ceed_core::Result<()> {
    /// # let ceed = ceed_core::Ceed::default_init();
    /// let r = ceed.identity_elem_restriction(3, 2, 6, 1)?;
    /// assert_eq!(r.num_elements(), 3, "Incorrect number of elements");
    /// # Ok(())
    /// # }
    /// ```
    pub fn num_elements(&self) -> usize {
        self.inner.nelem
    }

    /// Returns the size (number of nodes) of elements in an ElemRestriction
    ///
    /// ```
    /// # use ceed_core::prelude::*;
    /// # fn main() -> ceed_core::Result<()> {
    /// # let ceed = ceed_core::Ceed::default_init();
    /// let r = ceed.identity_elem_restriction(3, 2, 6, 1)?;
    /// assert_eq!(r.elem_size(), 2, "Incorrect element size");
    /// # Ok(())
    /// # }
    /// ```
    pub fn elem_size(&self) -> usize {
        self.inner.elemsize
    }

    /// Returns the size of the L-vector for an ElemRestriction
    ///
    /// ```
    /// # use ceed_core::prelude::*;
    /// # fn main() -> ceed_core::Result<()> {
    /// # let ceed = ceed_core::Ceed::default_init();
    /// let r = ceed.identity_elem_restriction(3, 2, 6, 1)?;
    /// assert_eq!(r.lvector_size(), 6, "Incorrect L-vector size");
    /// # Ok(())
    /// # }
    /// ```
    pub fn lvector_size(&self) -> usize {
        self.inner.lvector_size()
    }

    /// Returns the size of the E-vector for an ElemRestriction, including
    /// any block padding
    pub fn evector_size(&self) -> usize {
        self.inner.evector_size()
    }

    /// Returns the number of elements per block, or 0 if the restriction is
    /// not blocked
    pub fn block_size(&self) -> usize {
        match &self.inner.kind {
            RestrictionKind::Blocked { blksize, .. } => *blksize,
            _ => 0,
        }
    }

    /// Returns the number of blocks, or 0 if the restriction is not blocked
    pub fn num_blocks(&self) -> usize {
        self.inner.num_blocks()
    }

    /// Fill an L-vector with the multiplicity of each node, the number of
    /// elements referencing it (identically across components)
    ///
    /// # arguments
    ///
    /// * `mult` - L-vector to fill
    ///
    /// ```
    /// # use ceed_core::prelude::*;
    /// # fn main() -> ceed_core::Result<()> {
    /// # let ceed = ceed_core::Ceed::default_init();
    /// let nelem = 3;
    /// let mut ind: Vec<i32> = vec![0; 2 * nelem];
    /// for i in 0..nelem {
    ///     ind[2 * i + 0] = i as i32;
    ///     ind[2 * i + 1] = i as i32 + 1;
    /// }
    /// let r = ceed.elem_restriction(nelem, 2, nelem + 1, 1, &ind)?;
    ///
    /// let mut mult = r.create_lvector()?;
    /// r.multiplicity(&mut mult)?;
    ///
    /// for (i, m) in mult.view()?.iter().enumerate() {
    ///     let expected = if i == 0 || i == nelem { 1. } else { 2. };
    ///     assert_eq!(*m, expected, "Incorrect multiplicity value");
    /// }
    /// # Ok(())
    /// # }
    /// ```
    pub fn multiplicity(&self, mult: &mut crate::Vector) -> crate::Result<()> {
        let data = &*self.inner;
        if mult.length() != data.lvector_size() {
            return Err(Error::LengthMismatch {
                object: "multiplicity vector",
                expected: data.lvector_size(),
                found: mult.length(),
            });
        }
        let ones = vec![1.0; data.evector_size()];
        let mut counts = vec![0.0; data.lvector_size()];
        data.apply_slices(
            crate::TransposeMode::Transpose,
            crate::LayoutMode::CompFastest,
            &ones,
            &mut counts,
        );
        mult.set_slice(&counts)
    }
}

// -----------------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------------
#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Ceed, LayoutMode, Request, Scalar, TransposeMode};

    fn linear_restriction(ceed: &Ceed, nelem: usize) -> crate::Result<ElemRestriction> {
        let mut ind: Vec<i32> = Vec::with_capacity(2 * nelem);
        for i in 0..nelem as i32 {
            ind.push(i);
            ind.push(i + 1);
        }
        ceed.elem_restriction(nelem, 2, nelem + 1, 1, &ind)
    }

    #[test]
    fn restriction_transpose_of_ones_matches_multiplicity() -> crate::Result<()> {
        let ceed = Ceed::default_init();
        let r = linear_restriction(&ceed, 4)?;

        let (mut lvec, mut evec) = r.create_vectors()?;
        evec.set_value(1.0)?;
        r.apply(TransposeMode::Transpose, &evec, &mut lvec)?;

        let mut mult = r.create_lvector()?;
        r.multiplicity(&mut mult)?;

        for (a, b) in lvec.view()?.iter().zip(mult.view()?.iter()) {
            assert_eq!(*a, *b, "Transposed ones do not match multiplicity");
        }
        Ok(())
    }

    #[test]
    fn restriction_empty_is_noop() -> crate::Result<()> {
        let ceed = Ceed::default_init();
        let r = ceed.elem_restriction(0, 2, 5, 1, &[])?;

        let u = r.create_evector()?;
        assert_eq!(u.length(), 0);

        let mut out = ceed.vector_from_slice(&[7.; 5])?;
        r.apply(TransposeMode::Transpose, &u, &mut out)?;
        for v in out.view()?.iter() {
            assert_eq!(*v, 7.0, "Empty restriction modified its output");
        }
        Ok(())
    }

    #[test]
    fn restriction_empty_elements_is_noop() -> crate::Result<()> {
        let ceed = Ceed::default_init();
        let r = ceed.elem_restriction(3, 0, 5, 1, &[])?;
        assert_eq!(r.evector_size(), 0);

        let u = ceed.vector(5)?;
        let mut evec = r.create_evector()?;
        r.apply(TransposeMode::NoTranspose, &u, &mut evec)?;

        let mut out = ceed.vector_from_slice(&[7.; 5])?;
        r.apply(TransposeMode::Transpose, &evec, &mut out)?;
        for v in out.view()?.iter() {
            assert_eq!(*v, 7.0, "Empty-element restriction modified its output");
        }
        Ok(())
    }

    #[test]
    fn restriction_strided_gather_and_scatter() -> crate::Result<()> {
        let ceed = Ceed::default_init();
        // Every other node of the L-vector
        let r = ceed.elem_restriction(1, 3, 5, 1, &[0, 2, 4])?;

        let x = ceed.vector_from_slice(&[10., 11., 12., 13., 14.])?;
        let mut y = r.create_evector()?;
        r.apply(TransposeMode::NoTranspose, &x, &mut y)?;
        assert_eq!(&y.view()?[..], &[10., 12., 14.]);

        let ones = ceed.vector_from_slice(&[1., 1., 1.])?;
        let mut back = r.create_lvector()?;
        r.apply(TransposeMode::Transpose, &ones, &mut back)?;
        assert_eq!(&back.view()?[..], &[1., 0., 1., 0., 1.]);
        Ok(())
    }

    #[test]
    fn restriction_multiplicity_replicates_components() -> crate::Result<()> {
        let ceed = Ceed::default_init();
        // Two elements sharing node 1, two components per node
        let r = ceed.elem_restriction(2, 2, 3, 2, &[0, 1, 1, 2])?;

        let mut mult = r.create_lvector()?;
        assert_eq!(mult.length(), 6);
        r.multiplicity(&mut mult)?;
        assert_eq!(&mult.view()?[..], &[1., 1., 2., 2., 1., 1.]);
        Ok(())
    }

    #[test]
    fn restriction_offset_out_of_range() {
        let ceed = Ceed::default_init();
        assert!(matches!(
            ceed.elem_restriction(1, 2, 3, 1, &[0, 5]),
            Err(Error::OffsetOutOfRange { .. })
        ));
        assert!(matches!(
            ceed.elem_restriction(1, 2, 3, 1, &[-1, 1]),
            Err(Error::OffsetOutOfRange { .. })
        ));
    }

    #[test]
    fn restriction_blocked_pads_forward() -> crate::Result<()> {
        let ceed = Ceed::default_init();
        let r = ceed.blocked_elem_restriction(3, 2, 2, 4, 1, &[0, 1, 1, 2, 2, 3])?;
        assert_eq!(r.num_blocks(), 2);
        assert_eq!(r.evector_size(), 8);

        let x = ceed.vector_from_slice(&[0., 1., 2., 3.])?;
        let mut y = r.create_evector()?;
        r.apply(TransposeMode::NoTranspose, &x, &mut y)?;
        assert_eq!(&y.view()?[..], &[0., 1., 1., 2., 2., 2., 3., 3.]);
        Ok(())
    }

    #[test]
    fn restriction_blocked_transpose_skips_padding() -> crate::Result<()> {
        let ceed = Ceed::default_init();
        let r = ceed.blocked_elem_restriction(3, 2, 2, 4, 1, &[0, 1, 1, 2, 2, 3])?;

        let ones = crate::Vector::from_vec(&ceed, vec![1.0; r.evector_size()])?;
        let mut lvec = r.create_lvector()?;
        r.apply(TransposeMode::Transpose, &ones, &mut lvec)?;
        assert_eq!(&lvec.view()?[..], &[1., 2., 2., 1.]);
        Ok(())
    }

    #[test]
    fn restriction_block_apply_requires_blocked() -> crate::Result<()> {
        let ceed = Ceed::default_init();
        let r = linear_restriction(&ceed, 3)?;

        let x = ceed.vector(4)?;
        let mut y = ceed.vector(4)?;
        assert!(matches!(
            r.apply_block(
                0,
                TransposeMode::NoTranspose,
                LayoutMode::CompFastest,
                &x,
                &mut y,
                Request::Immediate
            ),
            Err(Error::NotBlocked)
        ));
        Ok(())
    }

    #[test]
    fn restriction_layouts_agree_for_single_component() -> crate::Result<()> {
        let ceed = Ceed::default_init();
        let r = linear_restriction(&ceed, 3)?;

        let x = ceed.vector_from_slice(&[0., 1., 2., 3.])?;
        let mut y_comp = r.create_evector()?;
        let mut y_node = r.create_evector()?;
        r.apply_in_layout(
            TransposeMode::NoTranspose,
            LayoutMode::CompFastest,
            &x,
            &mut y_comp,
            Request::Immediate,
        )?;
        r.apply_in_layout(
            TransposeMode::NoTranspose,
            LayoutMode::NodeFastest,
            &x,
            &mut y_node,
            Request::Ordered,
        )?;
        for (a, b) in y_comp.view()?.iter().zip(y_node.view()?.iter()) {
            assert_eq!(*a, *b);
        }
        Ok(())
    }

    #[test]
    fn restriction_multicomponent_gather() -> crate::Result<()> {
        let ceed = Ceed::default_init();
        // One element, two nodes, two components
        let r = ceed.elem_restriction(1, 2, 2, 2, &[0, 1])?;

        let x = ceed.vector_from_slice(&[1., 2., 3., 4.])?;
        let mut y = r.create_evector()?;
        r.apply(TransposeMode::NoTranspose, &x, &mut y)?;
        assert_eq!(&y.view()?[..], &[1., 2., 3., 4.]);

        let mut back: Vec<Scalar> = vec![0.0; 4];
        let mut lvec = r.create_lvector()?;
        r.apply(TransposeMode::Transpose, &y, &mut lvec)?;
        back.copy_from_slice(&lvec.view()?);
        assert_eq!(back, vec![1., 2., 3., 4.]);
        Ok(())
    }
}
