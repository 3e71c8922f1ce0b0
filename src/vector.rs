// Copyright (c) 2017-2022, Lawrence Livermore National Security, LLC and other CEED contributors.
// All Rights Reserved. See the top-level LICENSE and NOTICE files for details.
//
// SPDX-License-Identifier: BSD-2-Clause
//
// This file is part of CEED:  http://github.com/ceed

//! A Ceed Vector constitutes the main data structure and serves as input/output
//! for Ceed Operators.

use std::ops::{Deref, DerefMut};

use crate::prelude::*;

// -----------------------------------------------------------------------------
// Vector option
// -----------------------------------------------------------------------------
#[derive(Debug)]
pub enum VectorOpt<'a> {
    Some(&'a Vector),
    Active,
    None,
}
/// Construct a VectorOpt reference from a Vector reference
impl<'a> From<&'a Vector> for VectorOpt<'a> {
    fn from(vec: &'a Vector) -> Self {
        Self::Some(vec)
    }
}
impl<'a> VectorOpt<'a> {
    /// Check if a VectorOpt is Some
    ///
    /// ```
    /// # use ceed_core::prelude::*;
    /// # fn main() -> ceed_core::Result<()> {
    /// # let ceed = ceed_core::Ceed::default_init();
    /// let vec = ceed.vector_from_slice(&[1., 2., 3.])?;
    /// let vec_opt = VectorOpt::from(&vec);
    /// assert!(vec_opt.is_some(), "Incorrect VectorOpt");
    ///
    /// let vec_opt = VectorOpt::Active;
    /// assert!(!vec_opt.is_some(), "Incorrect VectorOpt");
    ///
    /// let vec_opt = VectorOpt::None;
    /// assert!(!vec_opt.is_some(), "Incorrect VectorOpt");
    /// # Ok(())
    /// # }
    /// ```
    pub fn is_some(&self) -> bool {
        matches!(self, Self::Some(_))
    }

    /// Check if a VectorOpt is Active
    ///
    /// ```
    /// # use ceed_core::prelude::*;
    /// # fn main() -> ceed_core::Result<()> {
    /// # let ceed = ceed_core::Ceed::default_init();
    /// let vec_opt = VectorOpt::Active;
    /// assert!(vec_opt.is_active(), "Incorrect VectorOpt");
    /// # Ok(())
    /// # }
    /// ```
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }

    /// Check if a VectorOpt is None
    ///
    /// ```
    /// # use ceed_core::prelude::*;
    /// # fn main() -> ceed_core::Result<()> {
    /// # let ceed = ceed_core::Ceed::default_init();
    /// let vec_opt = VectorOpt::None;
    /// assert!(vec_opt.is_none(), "Incorrect VectorOpt");
    /// # Ok(())
    /// # }
    /// ```
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }
}

// -----------------------------------------------------------------------------
// Vector storage
// -----------------------------------------------------------------------------
// Dual host/device storage with validity tracking. The device space is a
// second buffer so that staleness and transfer semantics match backends with
// discrete memory.
#[derive(Debug)]
pub(crate) struct VectorData {
    pub(crate) len: usize,
    pub(crate) host: Vec<crate::Scalar>,
    pub(crate) device: Vec<crate::Scalar>,
    pub(crate) host_valid: bool,
    pub(crate) device_valid: bool,
    pub(crate) transfers: usize,
}

impl VectorData {
    fn new(host: Vec<crate::Scalar>) -> Self {
        Self {
            len: host.len(),
            host,
            device: Vec::new(),
            host_valid: true,
            device_valid: false,
            transfers: 0,
        }
    }

    pub(crate) fn is_valid(&self, mtype: crate::MemType) -> bool {
        match mtype {
            crate::MemType::Host => self.host_valid,
            crate::MemType::Device => self.device_valid,
        }
    }

    // Make mtype valid, transferring from the other space if stale
    pub(crate) fn sync_to(&mut self, mtype: crate::MemType) {
        match mtype {
            crate::MemType::Host => {
                if !self.host_valid {
                    self.host.copy_from_slice(&self.device);
                    self.transfers += 1;
                    self.host_valid = true;
                }
            }
            crate::MemType::Device => {
                if self.device.len() != self.len {
                    self.device = vec![0.0; self.len];
                }
                if !self.device_valid {
                    self.device.copy_from_slice(&self.host);
                    self.transfers += 1;
                    self.device_valid = true;
                }
            }
        }
    }

    fn buffer(&self, mtype: crate::MemType) -> &[crate::Scalar] {
        match mtype {
            crate::MemType::Host => &self.host,
            crate::MemType::Device => &self.device,
        }
    }

    fn buffer_mut(&mut self, mtype: crate::MemType) -> &mut [crate::Scalar] {
        match mtype {
            crate::MemType::Host => &mut self.host,
            crate::MemType::Device => &mut self.device,
        }
    }

    // Overwrite the host space entirely, leaving the device space stale
    fn overwrite_host(&mut self, f: impl FnOnce(&mut [crate::Scalar])) {
        f(&mut self.host);
        self.host_valid = true;
        self.device_valid = false;
    }
}

// -----------------------------------------------------------------------------
// Vector borrowed slice wrapper
// -----------------------------------------------------------------------------
pub struct VectorSliceWrapper<'a> {
    pub(crate) vector: crate::Vector,
    pub(crate) slice: &'a mut [crate::Scalar],
}

// -----------------------------------------------------------------------------
// Destructor
// -----------------------------------------------------------------------------
impl<'a> Drop for VectorSliceWrapper<'a> {
    fn drop(&mut self) {
        // Copy current values back out; skipped if a view is still live
        if let Ok(mut data) = self.vector.inner.try_borrow_mut() {
            data.sync_to(crate::MemType::Host);
            self.slice.copy_from_slice(&data.host);
        }
    }
}

// -----------------------------------------------------------------------------
// Convenience constructor
// -----------------------------------------------------------------------------
impl<'a> VectorSliceWrapper<'a> {
    fn from_vector_and_slice_mut<'b>(
        vec: &mut crate::Vector,
        slice: &'b mut [crate::Scalar],
    ) -> crate::Result<VectorSliceWrapper<'b>> {
        if vec.length() != slice.len() {
            return Err(Error::LengthMismatch {
                object: "wrapped slice",
                expected: vec.length(),
                found: slice.len(),
            });
        }
        {
            let mut data = vec
                .inner
                .try_borrow_mut()
                .map_err(|_| Error::VectorBorrowed)?;
            let values = &*slice;
            data.overwrite_host(|host| host.copy_from_slice(values));
        }
        Ok(VectorSliceWrapper {
            vector: vec.clone(),
            slice,
        })
    }
}

// -----------------------------------------------------------------------------
// Vector context wrapper
// -----------------------------------------------------------------------------
#[derive(Debug)]
pub struct Vector {
    pub(crate) inner: Rc<RefCell<VectorData>>,
    len: usize,
    ceed: crate::Ceed,
}

// -----------------------------------------------------------------------------
// Cloning
// -----------------------------------------------------------------------------
impl Clone for Vector {
    /// Perform a shallow clone of a Vector; both handles share the same
    /// underlying storage
    ///
    /// ```
    /// # use ceed_core::prelude::*;
    /// # fn main() -> ceed_core::Result<()> {
    /// # let ceed = ceed_core::Ceed::default_init();
    /// let mut vec = ceed.vector_from_slice(&[1., 2., 3.])?;
    /// let vec_clone = vec.clone();
    ///
    /// vec.set_value(5.0)?;
    /// for v in vec_clone.view()?.iter() {
    ///     assert_eq!(*v, 5.0, "Cloned handle does not share storage");
    /// }
    /// # Ok(())
    /// # }
    /// ```
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
            len: self.len,
            ceed: self.ceed.clone(),
        }
    }
}

// -----------------------------------------------------------------------------
// Display
// -----------------------------------------------------------------------------
impl fmt::Display for Vector {
    /// View a Vector
    ///
    /// ```
    /// # use ceed_core::prelude::*;
    /// # fn main() -> ceed_core::Result<()> {
    /// # let ceed = ceed_core::Ceed::default_init();
    /// let vec = ceed.vector_from_slice(&[1., 2., 3.])?;
    /// assert_eq!(
    ///     vec.to_string(),
    ///     "Vector length 3\n  1.00000000\n  2.00000000\n  3.00000000\n"
    /// );
    /// # Ok(())
    /// # }
    /// ```
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.view() {
            Ok(view) => {
                writeln!(f, "Vector length {}", self.len)?;
                for v in view.iter() {
                    writeln!(f, "{:12.8}", v)?;
                }
                Ok(())
            }
            Err(_) => write!(f, "Vector length {} (borrowed)", self.len),
        }
    }
}

// -----------------------------------------------------------------------------
// Implementations
// -----------------------------------------------------------------------------
impl Vector {
    // Constructors
    pub fn create(ceed: &crate::Ceed, n: usize) -> crate::Result<Self> {
        Ok(Self {
            inner: Rc::new(RefCell::new(VectorData::new(vec![0.0; n]))),
            len: n,
            ceed: ceed.clone(),
        })
    }

    /// Copy the array of vec_source into self
    ///
    /// # arguments
    ///
    /// * `vec_source` - vector to copy array values from
    ///
    /// ```
    /// # use ceed_core::prelude::*;
    /// # fn main() -> ceed_core::Result<()> {
    /// # let ceed = ceed_core::Ceed::default_init();
    /// let a = ceed.vector_from_slice(&[1., 2., 3.])?;
    /// let mut b = ceed.vector(3)?;
    ///
    /// b.copy_from(&a)?;
    /// for (i, v) in b.view()?.iter().enumerate() {
    ///     assert_eq!(*v, (i + 1) as Scalar, "Copy contents not set correctly");
    /// }
    /// # Ok(())
    /// # }
    /// ```
    pub fn copy_from(&mut self, vec_source: &crate::Vector) -> crate::Result<()> {
        if self.len != vec_source.length() {
            return Err(Error::LengthMismatch {
                object: "copied vector",
                expected: self.len,
                found: vec_source.length(),
            });
        }
        let source = vec_source.view()?;
        let mut data = self
            .inner
            .try_borrow_mut()
            .map_err(|_| Error::VectorBorrowed)?;
        data.overwrite_host(|host| host.copy_from_slice(&source));
        Ok(())
    }

    /// Create a Vector from a slice
    ///
    /// # arguments
    ///
    /// * `v` - values to initialize vector with
    ///
    /// ```
    /// # use ceed_core::prelude::*;
    /// # fn main() -> ceed_core::Result<()> {
    /// # let ceed = ceed_core::Ceed::default_init();
    /// let vec = vector::Vector::from_slice(&ceed, &[1., 2., 3.])?;
    /// assert_eq!(vec.length(), 3, "Incorrect length from slice");
    /// # Ok(())
    /// # }
    /// ```
    pub fn from_slice(ceed: &crate::Ceed, v: &[crate::Scalar]) -> crate::Result<Self> {
        let mut x = Self::create(ceed, v.len())?;
        x.set_slice(v)?;
        Ok(x)
    }

    /// Create a Vector taking ownership of an existing array
    ///
    /// # arguments
    ///
    /// * `v` - values to initialize vector with
    ///
    /// ```
    /// # use ceed_core::prelude::*;
    /// # fn main() -> ceed_core::Result<()> {
    /// # let ceed = ceed_core::Ceed::default_init();
    /// let rust_vec = vec![1., 2., 3.];
    /// let vec = vector::Vector::from_vec(&ceed, rust_vec)?;
    ///
    /// assert_eq!(vec.length(), 3, "Incorrect length from vec");
    /// # Ok(())
    /// # }
    /// ```
    pub fn from_vec(ceed: &crate::Ceed, v: Vec<crate::Scalar>) -> crate::Result<Self> {
        let len = v.len();
        Ok(Self {
            inner: Rc::new(RefCell::new(VectorData::new(v))),
            len,
            ceed: ceed.clone(),
        })
    }

    /// Returns the length of a Vector
    ///
    /// ```
    /// # use ceed_core::prelude::*;
    /// # fn main() -> ceed_core::Result<()> {
    /// # let ceed = ceed_core::Ceed::default_init();
    /// let vec = ceed.vector(10)?;
    ///
    /// let n = vec.length();
    /// assert_eq!(n, 10, "Incorrect length");
    /// # Ok(())
    /// # }
    /// ```
    pub fn length(&self) -> usize {
        self.len
    }

    /// Returns the length of a Vector
    ///
    /// ```
    /// # use ceed_core::prelude::*;
    /// # fn main() -> ceed_core::Result<()> {
    /// # let ceed = ceed_core::Ceed::default_init();
    /// let vec = ceed.vector(10)?;
    /// assert_eq!(vec.len(), 10, "Incorrect length");
    /// # Ok(())
    /// # }
    /// ```
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        self.length()
    }

    /// Set the Vector to a constant value
    ///
    /// # arguments
    ///
    /// * `value` - Value to be used
    ///
    /// ```
    /// # use ceed_core::prelude::*;
    /// # fn main() -> ceed_core::Result<()> {
    /// # let ceed = ceed_core::Ceed::default_init();
    /// let len = 10;
    /// let mut vec = ceed.vector(len)?;
    ///
    /// let val = 42.0;
    /// vec.set_value(val)?;
    ///
    /// for v in vec.view()?.iter() {
    ///     assert_eq!(*v, val, "Value not set correctly");
    /// }
    /// # Ok(())
    /// # }
    /// ```
    pub fn set_value(&mut self, value: crate::Scalar) -> crate::Result<()> {
        let mut data = self
            .inner
            .try_borrow_mut()
            .map_err(|_| Error::VectorBorrowed)?;
        data.overwrite_host(|host| host.fill(value));
        Ok(())
    }

    /// Set values from a slice of the same length
    ///
    /// # arguments
    ///
    /// * `slice` - values to copy into self; length must match
    ///
    /// ```
    /// # use ceed_core::prelude::*;
    /// # fn main() -> ceed_core::Result<()> {
    /// # let ceed = ceed_core::Ceed::default_init();
    /// let mut vec = ceed.vector(4)?;
    /// vec.set_slice(&[10., 11., 12., 13.])?;
    ///
    /// for (i, v) in vec.view()?.iter().enumerate() {
    ///     assert_eq!(*v, 10. + i as Scalar, "Slice not set correctly");
    /// }
    /// # Ok(())
    /// # }
    /// ```
    pub fn set_slice(&mut self, slice: &[crate::Scalar]) -> crate::Result<()> {
        if self.len != slice.len() {
            return Err(Error::LengthMismatch {
                object: "slice",
                expected: self.len,
                found: slice.len(),
            });
        }
        let mut data = self
            .inner
            .try_borrow_mut()
            .map_err(|_| Error::VectorBorrowed)?;
        data.overwrite_host(|host| host.copy_from_slice(slice));
        Ok(())
    }

    /// Wrap a mutable slice in a Vector of the same length
    ///
    /// The wrapper writes the vector's current host values back to the
    /// caller's slice when dropped. If a view of the vector is still live at
    /// that point the copy-back is skipped and the slice keeps its previous
    /// values; drop any views before the wrapper to receive the data.
    ///
    /// # arguments
    ///
    /// * `slice` - values to wrap in self; length must match
    ///
    /// ```
    /// # use ceed_core::prelude::*;
    /// # fn main() -> ceed_core::Result<()> {
    /// # let ceed = ceed_core::Ceed::default_init();
    /// let mut vec = ceed.vector(4)?;
    /// let mut array = [10., 11., 12., 13.];
    ///
    /// {
    ///     // `wrapper` holds a mutable reference to the wrapped slice
    ///     //   that is dropped when `wrapper` goes out of scope
    ///     let wrapper = vec.wrap_slice_mut(&mut array)?;
    ///     for (i, v) in vec.view()?.iter().enumerate() {
    ///         assert_eq!(*v, 10. + i as Scalar, "Slice not set correctly");
    ///     }
    ///
    ///     // This line will not compile, as the `wrapper` holds mutable
    ///     //   access to the `array`
    ///     // array[0] = 5.0;
    ///
    ///     // Changes here are copied into the `array` when `wrapper` is
    ///     //   dropped
    ///     vec.set_value(5.0)?;
    ///     for v in vec.view()?.iter() {
    ///         assert_eq!(*v, 5.0 as Scalar, "Value not set correctly");
    ///     }
    /// }
    ///
    /// // 'array' remains changed
    /// for v in array.iter() {
    ///     assert_eq!(*v, 5.0 as Scalar, "Array not mutated correctly");
    /// }
    ///
    /// // While changes to `vec` no longer affect `array`
    /// vec.set_value(6.0)?;
    /// for v in array.iter() {
    ///     assert_eq!(*v, 5.0 as Scalar, "Array mutated without permission");
    /// }
    /// # Ok(())
    /// # }
    /// ```
    pub fn wrap_slice_mut<'b>(
        &mut self,
        slice: &'b mut [crate::Scalar],
    ) -> crate::Result<VectorSliceWrapper<'b>> {
        VectorSliceWrapper::from_vector_and_slice_mut(self, slice)
    }

    /// Sync the Vector to a specified memtype
    ///
    /// # arguments
    ///
    /// * `mtype` - Memtype to be synced
    ///
    /// ```
    /// # use ceed_core::prelude::*;
    /// # fn main() -> ceed_core::Result<()> {
    /// # let ceed = ceed_core::Ceed::default_init();
    /// let len = 10;
    /// let mut vec = ceed.vector(len)?;
    ///
    /// let val = 42.0;
    /// vec.set_value(val)?;
    /// vec.sync(MemType::Device)?;
    ///
    /// for v in vec.view_at(MemType::Device)?.iter() {
    ///     assert_eq!(*v, val, "Value not set correctly");
    /// }
    /// # Ok(())
    /// # }
    /// ```
    pub fn sync(&self, mtype: crate::MemType) -> crate::Result<()> {
        let valid = self
            .inner
            .try_borrow()
            .map_err(|_| Error::VectorBorrowed)?
            .is_valid(mtype);
        if !valid {
            // Transfers require exclusive access
            self.inner
                .try_borrow_mut()
                .map_err(|_| Error::VectorBorrowed)?
                .sync_to(mtype);
        }
        Ok(())
    }

    /// Create an immutable view of the host array
    ///
    /// ```
    /// # use ceed_core::prelude::*;
    /// # fn main() -> ceed_core::Result<()> {
    /// # let ceed = ceed_core::Ceed::default_init();
    /// let vec = ceed.vector_from_slice(&[10., 11., 12., 13.])?;
    ///
    /// let v = vec.view()?;
    /// assert_eq!(v[0..2], [10., 11.]);
    ///
    /// // It is valid to have multiple immutable views
    /// let w = vec.view()?;
    /// assert_eq!(v[1..], w[1..]);
    /// # Ok(())
    /// # }
    /// ```
    pub fn view(&self) -> crate::Result<VectorView> {
        self.view_at(crate::MemType::Host)
    }

    /// Create an immutable view in a specified memtype, syncing first if that
    /// space is stale
    ///
    /// # arguments
    ///
    /// * `mtype` - Memtype to view
    ///
    /// ```
    /// # use ceed_core::prelude::*;
    /// # fn main() -> ceed_core::Result<()> {
    /// # let ceed = ceed_core::Ceed::default_init();
    /// let vec = ceed.vector_from_slice(&[10., 11., 12., 13.])?;
    ///
    /// let v = vec.view_at(MemType::Device)?;
    /// assert_eq!(v[0..2], [10., 11.]);
    /// # Ok(())
    /// # }
    /// ```
    pub fn view_at(&self, mtype: crate::MemType) -> crate::Result<VectorView> {
        VectorView::new(self, mtype)
    }

    /// Create a mutable view of the host array
    ///
    /// ```
    /// # use ceed_core::prelude::*;
    /// # fn main() -> ceed_core::Result<()> {
    /// # let ceed = ceed_core::Ceed::default_init();
    /// let mut vec = ceed.vector_from_slice(&[10., 11., 12., 13.])?;
    ///
    /// {
    ///     let mut v = vec.view_mut()?;
    ///     v[2] = 9.;
    /// }
    ///
    /// let w = vec.view()?;
    /// assert_eq!(w[2], 9., "View did not mutate data");
    /// # Ok(())
    /// # }
    /// ```
    pub fn view_mut(&mut self) -> crate::Result<VectorViewMut> {
        self.view_mut_at(crate::MemType::Host)
    }

    /// Create a mutable view in a specified memtype; the other space is
    /// marked stale
    ///
    /// # arguments
    ///
    /// * `mtype` - Memtype to view
    ///
    /// ```
    /// # use ceed_core::prelude::*;
    /// # fn main() -> ceed_core::Result<()> {
    /// # let ceed = ceed_core::Ceed::default_init();
    /// let mut vec = ceed.vector_from_slice(&[10., 11., 12., 13.])?;
    ///
    /// {
    ///     let mut v = vec.view_mut_at(MemType::Device)?;
    ///     v[2] = 9.;
    /// }
    ///
    /// // Syncs back to the host on access
    /// let w = vec.view()?;
    /// assert_eq!(w[2], 9., "View did not mutate data");
    /// # Ok(())
    /// # }
    /// ```
    pub fn view_mut_at(&mut self, mtype: crate::MemType) -> crate::Result<VectorViewMut> {
        VectorViewMut::new(self, mtype)
    }

    /// Return the norm of a Vector
    ///
    /// # arguments
    ///
    /// * `ntype` - Norm type One, Two, or Max
    ///
    /// ```
    /// # use ceed_core::prelude::*;
    /// # fn main() -> ceed_core::Result<()> {
    /// # let ceed = ceed_core::Ceed::default_init();
    /// let vec = ceed.vector_from_slice(&[1., 2., 3., 4.])?;
    ///
    /// let max_norm = vec.norm(NormType::Max)?;
    /// assert_eq!(max_norm, 4.0, "Incorrect Max norm");
    ///
    /// let l1_norm = vec.norm(NormType::One)?;
    /// assert_eq!(l1_norm, 10., "Incorrect L1 norm");
    ///
    /// let l2_norm = vec.norm(NormType::Two)?;
    /// assert!((l2_norm - 5.477) < 1e-3, "Incorrect L2 norm");
    /// # Ok(())
    /// # }
    /// ```
    pub fn norm(&self, ntype: crate::NormType) -> crate::Result<crate::Scalar> {
        let view = self.view()?;
        let res = match ntype {
            crate::NormType::One => view.iter().map(|v| v.abs()).sum(),
            crate::NormType::Two => view.iter().map(|v| v * v).sum::<crate::Scalar>().sqrt(),
            crate::NormType::Max => view.iter().fold(0.0, |m: crate::Scalar, v| m.max(v.abs())),
        };
        Ok(res)
    }

    /// Compute x = alpha x for a Vector
    ///
    /// # arguments
    ///
    /// * `alpha` - scaling factor
    ///
    /// ```
    /// # use ceed_core::prelude::*;
    /// # fn main() -> ceed_core::Result<()> {
    /// # let ceed = ceed_core::Ceed::default_init();
    /// let mut vec = ceed.vector_from_slice(&[0., 1., 2., 3., 4.])?;
    ///
    /// vec = vec.scale(-1.0)?;
    /// for (i, v) in vec.view()?.iter().enumerate() {
    ///     assert_eq!(*v, -(i as Scalar), "Value not set correctly");
    /// }
    /// # Ok(())
    /// # }
    /// ```
    #[allow(unused_mut)]
    pub fn scale(mut self, alpha: crate::Scalar) -> crate::Result<Self> {
        self.map_host(|host| host.iter_mut().for_each(|v| *v *= alpha))?;
        Ok(self)
    }

    /// Compute y = alpha x + y for a pair of Vectors
    ///
    /// # arguments
    ///
    /// * `alpha` - scaling factor
    /// * `x`     - second vector, must be different than self
    ///
    /// ```
    /// # use ceed_core::prelude::*;
    /// # fn main() -> ceed_core::Result<()> {
    /// # let ceed = ceed_core::Ceed::default_init();
    /// let x = ceed.vector_from_slice(&[0., 1., 2., 3., 4.])?;
    /// let mut y = ceed.vector_from_slice(&[0., 1., 2., 3., 4.])?;
    ///
    /// y = y.axpy(-0.5, &x)?;
    /// for (i, y) in y.view()?.iter().enumerate() {
    ///     assert_eq!(*y, (i as Scalar) / 2.0, "Value not set correctly");
    /// }
    /// # Ok(())
    /// # }
    /// ```
    #[allow(unused_mut)]
    pub fn axpy(mut self, alpha: crate::Scalar, x: &crate::Vector) -> crate::Result<Self> {
        self.check_same_length(x)?;
        let xv = x.view()?;
        self.map_host(|host| {
            host.iter_mut()
                .zip(xv.iter())
                .for_each(|(y, x)| *y += alpha * x);
        })?;
        Ok(self)
    }

    /// Compute y = alpha x + beta y for a pair of Vectors
    ///
    /// # arguments
    ///
    /// * `alpha` - first scaling factor
    /// * `beta`  - second scaling factor
    /// * `x`     - second vector, must be different than self
    ///
    /// ```
    /// # use ceed_core::prelude::*;
    /// # fn main() -> ceed_core::Result<()> {
    /// # let ceed = ceed_core::Ceed::default_init();
    /// let x = ceed.vector_from_slice(&[0., 1., 2., 3., 4.])?;
    /// let mut y = ceed.vector_from_slice(&[0., 1., 2., 3., 4.])?;
    ///
    /// y = y.axpby(-0.5, 1.0, &x)?;
    /// for (i, y) in y.view()?.iter().enumerate() {
    ///     assert_eq!(*y, (i as Scalar) / 2.0, "Value not set correctly");
    /// }
    /// # Ok(())
    /// # }
    /// ```
    #[allow(unused_mut)]
    pub fn axpby(
        mut self,
        alpha: crate::Scalar,
        beta: crate::Scalar,
        x: &crate::Vector,
    ) -> crate::Result<Self> {
        self.check_same_length(x)?;
        let xv = x.view()?;
        self.map_host(|host| {
            host.iter_mut()
                .zip(xv.iter())
                .for_each(|(y, x)| *y = alpha * x + beta * *y);
        })?;
        Ok(self)
    }

    /// Compute the pointwise multiplication w = x .* y
    ///
    /// # arguments
    ///
    /// * `x` - first vector for product
    /// * `y` - second vector for product
    ///
    /// ```
    /// # use ceed_core::prelude::*;
    /// # fn main() -> ceed_core::Result<()> {
    /// # let ceed = ceed_core::Ceed::default_init();
    /// let mut w = ceed.vector(5)?;
    /// let x = ceed.vector_from_slice(&[0., 1., 2., 3., 4.])?;
    /// let y = ceed.vector_from_slice(&[0., 1., 2., 3., 4.])?;
    ///
    /// w = w.pointwise_mult(&x, &y)?;
    /// for (i, w) in w.view()?.iter().enumerate() {
    ///     assert_eq!(*w, (i as Scalar).powf(2.0), "Value not set correctly");
    /// }
    /// # Ok(())
    /// # }
    /// ```
    #[allow(unused_mut)]
    pub fn pointwise_mult(mut self, x: &crate::Vector, y: &crate::Vector) -> crate::Result<Self> {
        self.check_same_length(x)?;
        self.check_same_length(y)?;
        let xv = x.view()?;
        let yv = y.view()?;
        self.map_host(|host| {
            host.iter_mut()
                .zip(xv.iter().zip(yv.iter()))
                .for_each(|(w, (x, y))| *w = x * y);
        })?;
        Ok(self)
    }

    /// Compute the pointwise multiplication w = w .* x
    ///
    /// # arguments
    ///
    /// * `x` - second vector for product
    ///
    /// ```
    /// # use ceed_core::prelude::*;
    /// # fn main() -> ceed_core::Result<()> {
    /// # let ceed = ceed_core::Ceed::default_init();
    /// let mut w = ceed.vector_from_slice(&[0., 1., 2., 3., 4.])?;
    /// let x = ceed.vector_from_slice(&[0., 1., 2., 3., 4.])?;
    ///
    /// w = w.pointwise_scale(&x)?;
    /// for (i, w) in w.view()?.iter().enumerate() {
    ///     assert_eq!(*w, (i as Scalar).powf(2.0), "Value not set correctly");
    /// }
    /// # Ok(())
    /// # }
    /// ```
    #[allow(unused_mut)]
    pub fn pointwise_scale(mut self, x: &crate::Vector) -> crate::Result<Self> {
        self.check_same_length(x)?;
        let xv = x.view()?;
        self.map_host(|host| {
            host.iter_mut().zip(xv.iter()).for_each(|(w, x)| *w *= x);
        })?;
        Ok(self)
    }

    /// Compute the pointwise multiplication w = w .* w
    ///
    /// ```
    /// # use ceed_core::prelude::*;
    /// # fn main() -> ceed_core::Result<()> {
    /// # let ceed = ceed_core::Ceed::default_init();
    /// let mut w = ceed.vector_from_slice(&[0., 1., 2., 3., 4.])?;
    ///
    /// w = w.pointwise_square()?;
    /// for (i, w) in w.view()?.iter().enumerate() {
    ///     assert_eq!(*w, (i as Scalar).powf(2.0), "Value not set correctly");
    /// }
    /// # Ok(())
    /// # }
    /// ```
    #[allow(unused_mut)]
    pub fn pointwise_square(mut self) -> crate::Result<Self> {
        self.map_host(|host| host.iter_mut().for_each(|w| *w *= *w))?;
        Ok(self)
    }

    // Host-space compute helper; leaves the device space stale
    fn map_host(&self, f: impl FnOnce(&mut [crate::Scalar])) -> crate::Result<()> {
        let mut data = self
            .inner
            .try_borrow_mut()
            .map_err(|_| Error::VectorBorrowed)?;
        data.sync_to(crate::MemType::Host);
        f(&mut data.host);
        data.device_valid = false;
        Ok(())
    }

    fn check_same_length(&self, x: &crate::Vector) -> crate::Result<()> {
        if self.len != x.length() {
            return Err(Error::LengthMismatch {
                object: "vector operand",
                expected: self.len,
                found: x.length(),
            });
        }
        Ok(())
    }

    // Host-synced read access for internal kernels
    pub(crate) fn read_data(&self) -> crate::Result<Ref<'_, VectorData>> {
        let valid = self
            .inner
            .try_borrow()
            .map_err(|_| Error::VectorBorrowed)?
            .host_valid;
        if !valid {
            self.inner
                .try_borrow_mut()
                .map_err(|_| Error::VectorBorrowed)?
                .sync_to(crate::MemType::Host);
        }
        self.inner.try_borrow().map_err(|_| Error::VectorBorrowed)
    }

    // Host-synced write access for internal kernels; the device space is
    // stale after release
    pub(crate) fn write_data(&self) -> crate::Result<RefMut<'_, VectorData>> {
        let mut data = self
            .inner
            .try_borrow_mut()
            .map_err(|_| Error::VectorBorrowed)?;
        data.sync_to(crate::MemType::Host);
        data.device_valid = false;
        Ok(data)
    }
}

// -----------------------------------------------------------------------------
// Vector view
// -----------------------------------------------------------------------------
/// A (host or device) view of a Vector with Deref to slice. We can't make
/// Vector itself Deref to slice because we can't handle the drop to release
/// the borrowed array.
#[derive(Debug)]
pub struct VectorView<'a> {
    data: Ref<'a, VectorData>,
    mem: crate::MemType,
}

impl<'a> VectorView<'a> {
    /// Construct a new view, syncing the requested space first if stale
    fn new(vec: &'a Vector, mem: crate::MemType) -> crate::Result<Self> {
        let valid = vec
            .inner
            .try_borrow()
            .map_err(|_| Error::VectorBorrowed)?
            .is_valid(mem);
        if !valid {
            // Transfers require exclusive access
            vec.inner
                .try_borrow_mut()
                .map_err(|_| Error::VectorBorrowed)?
                .sync_to(mem);
        }
        let data = vec.inner.try_borrow().map_err(|_| Error::VectorBorrowed)?;
        Ok(Self { data, mem })
    }
}

impl<'a> Deref for VectorView<'a> {
    type Target = [crate::Scalar];
    fn deref(&self) -> &[crate::Scalar] {
        self.data.buffer(self.mem)
    }
}

impl<'a> fmt::Display for VectorView<'a> {
    /// View a VectorView
    ///
    /// ```
    /// # use ceed_core::prelude::*;
    /// # fn main() -> ceed_core::Result<()> {
    /// # let ceed = ceed_core::Ceed::default_init();
    /// let vec = ceed.vector_from_slice(&[1., 2., 3.])?;
    /// let v = vec.view()?;
    /// println!("{}", v);
    /// # Ok(())
    /// # }
    /// ```
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "VectorView length {}", self.data.len)?;
        for v in self.iter() {
            writeln!(f, "{:12.8}", v)?;
        }
        Ok(())
    }
}

// -----------------------------------------------------------------------------
// Vector view mutable
// -----------------------------------------------------------------------------
/// A mutable (host or device) view of a Vector with Deref to slice
#[derive(Debug)]
pub struct VectorViewMut<'a> {
    data: RefMut<'a, VectorData>,
    mem: crate::MemType,
}

impl<'a> VectorViewMut<'a> {
    /// Construct a new mutable view; the other memory space is marked stale
    fn new(vec: &'a mut Vector, mem: crate::MemType) -> crate::Result<Self> {
        let mut data = vec
            .inner
            .try_borrow_mut()
            .map_err(|_| Error::VectorBorrowed)?;
        data.sync_to(mem);
        match mem {
            crate::MemType::Host => data.device_valid = false,
            crate::MemType::Device => data.host_valid = false,
        }
        Ok(Self { data, mem })
    }
}

impl<'a> Deref for VectorViewMut<'a> {
    type Target = [crate::Scalar];
    fn deref(&self) -> &[crate::Scalar] {
        self.data.buffer(self.mem)
    }
}

impl<'a> DerefMut for VectorViewMut<'a> {
    fn deref_mut(&mut self) -> &mut [crate::Scalar] {
        self.data.buffer_mut(self.mem)
    }
}

impl<'a> fmt::Display for VectorViewMut<'a> {
    /// View a mutable VectorView
    ///
    /// ```
    /// # use ceed_core::prelude::*;
    /// # fn main() -> ceed_core::Result<()> {
    /// # let ceed = ceed_core::Ceed::default_init();
    /// let mut vec = ceed.vector_from_slice(&[1., 2., 3.])?;
    /// let v = vec.view_mut()?;
    /// println!("{}", v);
    /// # Ok(())
    /// # }
    /// ```
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "VectorViewMut length {}", self.data.len)?;
        for v in self.iter() {
            writeln!(f, "{:12.8}", v)?;
        }
        Ok(())
    }
}

// -----------------------------------------------------------------------------
// Test helpers
// -----------------------------------------------------------------------------
#[cfg(test)]
impl Vector {
    fn transfer_count(&self) -> usize {
        self.inner.borrow().transfers
    }
}

// -----------------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------------
#[cfg(test)]
mod tests {
    use super::*;
    use crate::Ceed;

    #[test]
    fn vector_sync_is_idempotent() -> crate::Result<()> {
        let ceed = Ceed::default_init();
        let mut vec = ceed.vector_from_slice(&[1., 2., 3.])?;
        assert_eq!(vec.transfer_count(), 0);

        vec.sync(crate::MemType::Host)?;
        assert_eq!(vec.transfer_count(), 0);

        vec.sync(crate::MemType::Device)?;
        assert_eq!(vec.transfer_count(), 1);
        vec.sync(crate::MemType::Device)?;
        assert_eq!(vec.transfer_count(), 1);

        // Host write invalidates the device space
        vec.set_value(5.0)?;
        vec.sync(crate::MemType::Device)?;
        assert_eq!(vec.transfer_count(), 2);
        Ok(())
    }

    #[test]
    fn vector_device_view_matches_host_data() -> crate::Result<()> {
        let ceed = Ceed::default_init();
        let mut vec = ceed.vector(4)?;
        vec.set_slice(&[10., 11., 12., 13.])?;

        let view = vec.view_at(crate::MemType::Device)?;
        assert_eq!(&view[..], &[10., 11., 12., 13.]);
        Ok(())
    }

    #[test]
    fn vector_from_vec_preserves_values() -> crate::Result<()> {
        let ceed = Ceed::default_init();
        let values = vec![1.5, -2.25, 0.0, 1e-300, 3.5];
        let vec = Vector::from_vec(&ceed, values.clone())?;

        let view = vec.view_at(crate::MemType::Host)?;
        for (a, b) in view.iter().zip(values.iter()) {
            assert_eq!(a.to_bits(), b.to_bits(), "Values altered by ownership transfer");
        }
        Ok(())
    }

    #[test]
    fn vector_borrowed_transfer_reports_error() -> crate::Result<()> {
        let ceed = Ceed::default_init();
        let vec = ceed.vector_from_slice(&[1., 2.])?;
        let _view = vec.view()?;

        // The device space is stale, so this sync needs exclusive access
        assert!(matches!(
            vec.sync(crate::MemType::Device),
            Err(Error::VectorBorrowed)
        ));
        Ok(())
    }

    #[test]
    fn vector_wrapped_slice_copies_back() -> crate::Result<()> {
        let ceed = Ceed::default_init();
        let mut vec = ceed.vector(3)?;
        let mut array = [1., 2., 3.];
        {
            let _wrapper = vec.wrap_slice_mut(&mut array)?;
            vec.set_slice(&[4., 5., 6.])?;
        }
        assert_eq!(array, [4., 5., 6.]);
        Ok(())
    }

    #[test]
    fn vector_wrapped_slice_skips_copy_back_while_viewed() -> crate::Result<()> {
        let ceed = Ceed::default_init();
        let mut vec = ceed.vector(3)?;
        let mut array = [1., 2., 3.];

        let wrapper = vec.wrap_slice_mut(&mut array)?;
        vec.set_slice(&[4., 5., 6.])?;
        let view = vec.view()?;
        drop(wrapper);
        drop(view);

        // The live view blocked the copy-back at drop
        assert_eq!(array, [1., 2., 3.]);
        Ok(())
    }

    #[test]
    fn vector_length_mismatch_reports_error() -> crate::Result<()> {
        let ceed = Ceed::default_init();
        let mut vec = ceed.vector(3)?;
        assert!(vec.set_slice(&[1., 2.]).is_err());

        let x = ceed.vector(2)?;
        assert!(ceed.vector(3)?.axpy(1.0, &x).is_err());
        Ok(())
    }
}
