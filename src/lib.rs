// Copyright (c) 2017-2022, Lawrence Livermore National Security, LLC and other CEED contributors.
// All Rights Reserved. See the top-level LICENSE and NOTICE files for details.
//
// SPDX-License-Identifier: BSD-2-Clause
//
// This file is part of CEED:  http://github.com/ceed

// Fenced `rust` code blocks included from README.md are executed as part of doctests.
#![doc = include_str!("../README.md")]

// -----------------------------------------------------------------------------
// Crate prelude
// -----------------------------------------------------------------------------
use crate::prelude::*;

pub mod prelude {
    pub use crate::{
        basis::{self, Basis, BasisOpt},
        elem_restriction::{self, ElemRestriction, ElemRestrictionOpt},
        operator::{self, CompositeOperator, Operator, OperatorField},
        qfunction::{
            self, IdentityQFunction, QFunction, QFunctionByName, QFunctionField, QFunctionInputs,
            QFunctionOpt, QFunctionOutputs,
        },
        vector::{self, Vector, VectorOpt, VectorSliceWrapper, VectorView, VectorViewMut},
        ElemTopology, Error, EvalMode, LayoutMode, MemType, NormType, QuadMode, Request, Scalar,
        TransposeMode, EPSILON, MAX_QFUNCTION_FIELDS,
    };
    pub(crate) use std::cell::{Ref, RefCell, RefMut};
    pub(crate) use std::fmt;
    pub(crate) use std::rc::Rc;
}

// -----------------------------------------------------------------------------
// Modules
// -----------------------------------------------------------------------------
pub mod basis;
pub mod elem_restriction;
pub mod error;
pub mod operator;
pub mod qfunction;
pub mod vector;

pub use error::Error;

// -----------------------------------------------------------------------------
// Typedef for scalar
// -----------------------------------------------------------------------------
pub type Scalar = f64;

// -----------------------------------------------------------------------------
// Constants for library
// -----------------------------------------------------------------------------
pub const MAX_QFUNCTION_FIELDS: usize = 16;
pub const EPSILON: crate::Scalar = Scalar::EPSILON;

// -----------------------------------------------------------------------------
// Enums
// -----------------------------------------------------------------------------
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
/// Many interfaces take or return arrays of values. This enum is used to
/// specify which memory space the values should reside in.
pub enum MemType {
    Host,
    Device,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
/// Denotes type of vector norm to be computed
pub enum NormType {
    One,
    Two,
    Max,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
/// Denotes whether a linear transformation or its transpose should be applied
pub enum TransposeMode {
    NoTranspose,
    Transpose,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
/// Ordering of unknowns within an element of an E-vector
pub enum LayoutMode {
    /// Components of a node are adjacent in memory
    #[default]
    CompFastest,
    /// Nodes of a component are adjacent in memory
    NodeFastest,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
/// Completion semantics requested for an operation. The reference backend is
/// synchronous, so both kinds complete before the call returns; `Ordered` is
/// retained as a scheduling hint for asynchronous backends.
pub enum Request {
    #[default]
    Immediate,
    Ordered,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
/// Type of quadrature; also used for location of nodes
pub enum QuadMode {
    Gauss,
    GaussLobatto,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
/// Type of basis shape to create non-tensor H1 element basis
pub enum ElemTopology {
    Line,
    Triangle,
    Quad,
    Tet,
    Pyramid,
    Prism,
    Hex,
}

impl ElemTopology {
    /// Spatial dimension of the reference element
    pub fn dimension(&self) -> usize {
        match self {
            Self::Line => 1,
            Self::Triangle | Self::Quad => 2,
            Self::Tet | Self::Pyramid | Self::Prism | Self::Hex => 3,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
/// Basis evaluation mode
pub enum EvalMode {
    None,
    Interp,
    Grad,
    Div,
    Curl,
    Weight,
}

// -----------------------------------------------------------------------------
// Result type
// -----------------------------------------------------------------------------
pub type Result<T> = std::result::Result<T, Error>;

// -----------------------------------------------------------------------------
// Ceed context wrapper
// -----------------------------------------------------------------------------
/// A Ceed is a library context representing control of a logical hardware
/// resource.
#[derive(Debug)]
pub struct Ceed {
    inner: Rc<CeedInner>,
}

#[derive(Debug)]
struct CeedInner {
    resource: String,
    preferred_memtype: MemType,
}

// -----------------------------------------------------------------------------
// Cloning
// -----------------------------------------------------------------------------
impl Clone for Ceed {
    /// Perform a shallow clone of a Ceed context
    ///
    /// ```
    /// # fn main() -> ceed_core::Result<()> {
    /// let ceed = ceed_core::Ceed::init("/cpu/self")?;
    /// let ceed_clone = ceed.clone();
    ///
    /// println!("{}", ceed);
    /// println!("{}", ceed_clone);
    /// # Ok(())
    /// # }
    /// ```
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

// -----------------------------------------------------------------------------
// Display
// -----------------------------------------------------------------------------
impl fmt::Display for Ceed {
    /// View a Ceed
    ///
    /// ```
    /// # fn main() -> ceed_core::Result<()> {
    /// let ceed = ceed_core::Ceed::init("/cpu/self")?;
    /// assert_eq!(ceed.to_string(), "Ceed resource: /cpu/self");
    /// # Ok(())
    /// # }
    /// ```
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Ceed resource: {}", self.inner.resource)
    }
}

// -----------------------------------------------------------------------------
// Object constructors
// -----------------------------------------------------------------------------
impl Ceed {
    /// Returns a Ceed context initialized with the specified resource
    ///
    /// # arguments
    ///
    /// * `resource` - Resource to use, e.g., "/cpu/self" or "/gpu/cuda"
    ///
    /// ```
    /// # fn main() -> ceed_core::Result<()> {
    /// let ceed = ceed_core::Ceed::init("/cpu/self")?;
    ///
    /// assert!(ceed_core::Ceed::init("cpu").is_err());
    /// # Ok(())
    /// # }
    /// ```
    pub fn init(resource: &str) -> crate::Result<Self> {
        if !resource.starts_with('/') || resource.len() < 2 {
            return Err(Error::InvalidResource {
                resource: resource.to_string(),
            });
        }
        let preferred_memtype = if resource.starts_with("/gpu") {
            MemType::Device
        } else {
            MemType::Host
        };
        Ok(Self {
            inner: Rc::new(CeedInner {
                resource: resource.to_string(),
                preferred_memtype,
            }),
        })
    }

    /// Default initializer for testing
    #[doc(hidden)]
    pub fn default_init() -> Self {
        Self::init("/cpu/self").expect("default resource is valid")
    }

    /// Returns full resource name for a Ceed context
    ///
    /// ```
    /// # fn main() -> ceed_core::Result<()> {
    /// let ceed = ceed_core::Ceed::init("/cpu/self")?;
    /// let resource = ceed.resource();
    ///
    /// assert_eq!(resource, "/cpu/self".to_string());
    /// # Ok(())
    /// # }
    /// ```
    pub fn resource(&self) -> &str {
        &self.inner.resource
    }

    /// Returns the memory space preferred by the backing resource
    ///
    /// ```
    /// # use ceed_core::prelude::*;
    /// # fn main() -> ceed_core::Result<()> {
    /// let ceed = ceed_core::Ceed::init("/gpu/cuda")?;
    ///
    /// assert_eq!(ceed.preferred_memtype(), MemType::Device);
    /// # Ok(())
    /// # }
    /// ```
    pub fn preferred_memtype(&self) -> MemType {
        self.inner.preferred_memtype
    }

    /// Returns a Vector of the specified length (zero-initialized)
    ///
    /// # arguments
    ///
    /// * `n` - Length of vector
    ///
    /// ```
    /// # use ceed_core::prelude::*;
    /// # fn main() -> ceed_core::Result<()> {
    /// # let ceed = ceed_core::Ceed::default_init();
    /// let vec = ceed.vector(10)?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn vector(&self, n: usize) -> crate::Result<Vector> {
        Vector::create(self, n)
    }

    /// Create a Vector initialized with the data (copied) from a slice
    ///
    /// # arguments
    ///
    /// * `slice` - Slice containing data
    ///
    /// ```
    /// # use ceed_core::prelude::*;
    /// # fn main() -> ceed_core::Result<()> {
    /// # let ceed = ceed_core::Ceed::default_init();
    /// let vec = ceed.vector_from_slice(&[1., 2., 3.])?;
    /// assert_eq!(vec.length(), 3, "Incorrect length");
    /// # Ok(())
    /// # }
    /// ```
    pub fn vector_from_slice(&self, slice: &[Scalar]) -> crate::Result<Vector> {
        Vector::from_slice(self, slice)
    }

    /// Returns an ElemRestriction
    ///
    /// # arguments
    ///
    /// * `nelem`    - Number of elements described in the offsets array
    /// * `elemsize` - Size (number of nodes) per element
    /// * `nnodes`   - Number of nodes in the L-vector
    /// * `ncomp`    - Number of field components per interpolation node
    /// * `offsets`  - Array of length `nelem * elemsize`. Column `i` of row
    ///   `e` holds the L-vector node at which the `i`th node of element `e` is
    ///   found.
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
    /// # Ok(())
    /// # }
    /// ```
    pub fn elem_restriction(
        &self,
        nelem: usize,
        elemsize: usize,
        nnodes: usize,
        ncomp: usize,
        offsets: &[i32],
    ) -> crate::Result<ElemRestriction> {
        ElemRestriction::create(self, nelem, elemsize, nnodes, ncomp, offsets)
    }

    /// Returns an identity ElemRestriction, where elements tile the L-vector
    /// contiguously and in order
    ///
    /// # arguments
    ///
    /// * `nelem`    - Number of elements
    /// * `elemsize` - Size (number of nodes) per element
    /// * `nnodes`   - Number of nodes in the L-vector; must equal
    ///   `nelem * elemsize`
    /// * `ncomp`    - Number of field components per interpolation node
    ///
    /// ```
    /// # use ceed_core::prelude::*;
    /// # fn main() -> ceed_core::Result<()> {
    /// # let ceed = ceed_core::Ceed::default_init();
    /// let r = ceed.identity_elem_restriction(3, 2, 6, 1)?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn identity_elem_restriction(
        &self,
        nelem: usize,
        elemsize: usize,
        nnodes: usize,
        ncomp: usize,
    ) -> crate::Result<ElemRestriction> {
        ElemRestriction::create_identity(self, nelem, elemsize, nnodes, ncomp)
    }

    /// Returns a blocked ElemRestriction, where elements are grouped into
    /// blocks for vectorized application
    ///
    /// # arguments
    ///
    /// * `nelem`    - Number of elements described in the offsets array
    /// * `elemsize` - Size (number of nodes) per element
    /// * `blksize`  - Number of elements per block
    /// * `nnodes`   - Number of nodes in the L-vector
    /// * `ncomp`    - Number of field components per interpolation node
    /// * `offsets`  - Array of length `nelem * elemsize`, as for
    ///   [`Ceed::elem_restriction`]
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
    /// let r = ceed.blocked_elem_restriction(nelem, 2, 2, nelem + 1, 1, &ind)?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn blocked_elem_restriction(
        &self,
        nelem: usize,
        elemsize: usize,
        blksize: usize,
        nnodes: usize,
        ncomp: usize,
        offsets: &[i32],
    ) -> crate::Result<ElemRestriction> {
        ElemRestriction::create_blocked(self, nelem, elemsize, blksize, nnodes, ncomp, offsets)
    }

    /// Returns an H1 Basis from tabulated matrices
    ///
    /// # arguments
    ///
    /// * `topo`    - Topology of the reference element
    /// * `ncomp`   - Number of field components
    /// * `nnodes`  - Total number of nodes
    /// * `nqpts`   - Total number of quadrature points
    /// * `interp`  - Row-major `(nqpts * nnodes)` interpolation matrix
    /// * `grad`    - Row-major `(dim * nqpts * nnodes)` gradient matrix,
    ///   direction-major
    /// * `qref`    - Array of length `dim * nqpts` of reference coordinates
    /// * `qweight` - Array of length `nqpts` of quadrature weights
    ///
    /// ```
    /// # use ceed_core::prelude::*;
    /// # fn main() -> ceed_core::Result<()> {
    /// # let ceed = ceed_core::Ceed::default_init();
    /// let b = ceed.basis_h1(
    ///     ElemTopology::Line,
    ///     1,
    ///     2,
    ///     1,
    ///     &[0.5, 0.5],
    ///     &[-0.5, 0.5],
    ///     &[0.0],
    ///     &[2.0],
    /// )?;
    /// # Ok(())
    /// # }
    /// ```
    #[allow(clippy::too_many_arguments)]
    pub fn basis_h1(
        &self,
        topo: ElemTopology,
        ncomp: usize,
        nnodes: usize,
        nqpts: usize,
        interp: &[Scalar],
        grad: &[Scalar],
        qref: &[Scalar],
        qweight: &[Scalar],
    ) -> crate::Result<Basis> {
        Basis::create_h1(
            self, topo, ncomp, nnodes, nqpts, interp, grad, qref, qweight,
        )
    }

    /// Returns a tensor-product H1 Basis built from one-dimensional matrices
    ///
    /// # arguments
    ///
    /// * `dim`       - Topological dimension
    /// * `ncomp`     - Number of field components
    /// * `p1d`       - Number of nodes in one dimension
    /// * `q1d`       - Number of quadrature points in one dimension
    /// * `interp1d`  - Row-major `(q1d * p1d)` interpolation matrix
    /// * `grad1d`    - Row-major `(q1d * p1d)` derivative matrix
    /// * `qref1d`    - Array of length `q1d` of reference coordinates
    /// * `qweight1d` - Array of length `q1d` of quadrature weights
    ///
    /// ```
    /// # use ceed_core::prelude::*;
    /// # fn main() -> ceed_core::Result<()> {
    /// # let ceed = ceed_core::Ceed::default_init();
    /// let b = ceed.basis_tensor_h1(2, 1, 2, 1, &[0.5, 0.5], &[-0.5, 0.5], &[0.0], &[2.0])?;
    /// assert_eq!(b.num_nodes(), 4);
    /// assert_eq!(b.num_quadrature_points(), 1);
    /// # Ok(())
    /// # }
    /// ```
    #[allow(clippy::too_many_arguments)]
    pub fn basis_tensor_h1(
        &self,
        dim: usize,
        ncomp: usize,
        p1d: usize,
        q1d: usize,
        interp1d: &[Scalar],
        grad1d: &[Scalar],
        qref1d: &[Scalar],
        qweight1d: &[Scalar],
    ) -> crate::Result<Basis> {
        Basis::create_tensor_h1(
            self, dim, ncomp, p1d, q1d, interp1d, grad1d, qref1d, qweight1d,
        )
    }

    /// Returns a QFunction for evaluating interior (volumetric) terms
    ///
    /// # arguments
    ///
    /// * `vlength` - Vector length. Caller must ensure that number of
    ///   quadrature points is a multiple of vlength
    /// * `f`       - Boxed closure to evaluate at quadrature points
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
    /// # Ok(())
    /// # }
    /// ```
    pub fn q_function_interior(
        &self,
        vlength: usize,
        f: Box<qfunction::QFunctionUserClosure>,
    ) -> crate::Result<QFunction> {
        QFunction::create(self, vlength, f)
    }

    /// Returns a QFunction from the gallery of built-in kernels
    ///
    /// # arguments
    ///
    /// * `name` - Name of the gallery QFunction, e.g. "Mass1DBuild"
    ///
    /// ```
    /// # use ceed_core::prelude::*;
    /// # fn main() -> ceed_core::Result<()> {
    /// # let ceed = ceed_core::Ceed::default_init();
    /// let qf = ceed.q_function_interior_by_name("Mass1DBuild")?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn q_function_interior_by_name(&self, name: &str) -> crate::Result<QFunctionByName> {
        QFunctionByName::create(self, name)
    }

    /// Returns a QFunction that copies `size` values per quadrature point from
    /// its single input to its single output
    ///
    /// # arguments
    ///
    /// * `size` - Number of values to copy per quadrature point
    ///
    /// ```
    /// # use ceed_core::prelude::*;
    /// # fn main() -> ceed_core::Result<()> {
    /// # let ceed = ceed_core::Ceed::default_init();
    /// let qf = ceed.identity_q_function(1)?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn identity_q_function(&self, size: usize) -> crate::Result<IdentityQFunction> {
        IdentityQFunction::create(self, size)
    }

    /// Returns an Operator and associate a QFunction. A Basis and
    /// ElemRestriction can be associated with QFunction fields via
    /// [`Operator::field`].
    ///
    /// # arguments
    ///
    /// * `qf`    - QFunction defining the action of the operator at
    ///   quadrature points
    /// * `dqf`   - QFunction defining the action of the Jacobian, or
    ///   `QFunctionOpt::None`
    /// * `dqf_t` - QFunction defining the action of the transpose of the
    ///   Jacobian, or `QFunctionOpt::None`
    ///
    /// ```
    /// # use ceed_core::prelude::*;
    /// # fn main() -> ceed_core::Result<()> {
    /// # let ceed = ceed_core::Ceed::default_init();
    /// let qf = ceed.q_function_interior_by_name("Mass1DBuild")?;
    /// let op = ceed.operator(&qf, QFunctionOpt::None, QFunctionOpt::None)?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn operator<'b, 'c, 'd>(
        &self,
        qf: impl Into<QFunctionOpt<'b>>,
        dqf: impl Into<QFunctionOpt<'c>>,
        dqf_t: impl Into<QFunctionOpt<'d>>,
    ) -> crate::Result<Operator> {
        Operator::create(self, qf, dqf, dqf_t)
    }

    /// Returns an Operator that composes the action of several Operators
    ///
    /// ```
    /// # use ceed_core::prelude::*;
    /// # fn main() -> ceed_core::Result<()> {
    /// # let ceed = ceed_core::Ceed::default_init();
    /// let op = ceed.composite_operator()?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn composite_operator(&self) -> crate::Result<CompositeOperator> {
        CompositeOperator::create(self)
    }
}

// -----------------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------------
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ceed_resource() -> crate::Result<()> {
        let ceed = Ceed::init("/cpu/self")?;
        assert_eq!(ceed.resource(), "/cpu/self");
        assert_eq!(ceed.preferred_memtype(), MemType::Host);

        let ceed = Ceed::init("/gpu/cuda")?;
        assert_eq!(ceed.preferred_memtype(), MemType::Device);
        Ok(())
    }

    #[test]
    fn ceed_bad_resource() {
        assert!(Ceed::init("cpu").is_err());
        assert!(Ceed::init("").is_err());
        assert!(Ceed::init("/").is_err());
    }

    #[test]
    fn ceed_t501_mass_operator() -> crate::Result<()> {
        let ceed = Ceed::init("/cpu/self")?;
        let ne = 4;

        // Mesh coordinates on [-1, 1]
        let mut coords = vec![0.0; ne + 1];
        for (i, x) in coords.iter_mut().enumerate() {
            *x = -1.0 + 2.0 * i as Scalar / ne as Scalar;
        }
        let x = ceed.vector_from_slice(&coords)?;

        // Restrictions
        let mut ind: Vec<i32> = Vec::with_capacity(2 * ne);
        for i in 0..ne as i32 {
            ind.push(i);
            ind.push(i + 1);
        }
        let rx = ceed.elem_restriction(ne, 2, ne + 1, 1, &ind)?;
        let ru = ceed.elem_restriction(ne, 2, ne + 1, 1, &ind)?;
        let rq = ceed.identity_elem_restriction(ne, 1, ne, 1)?;

        // Linear basis with midpoint quadrature
        let b = ceed.basis_tensor_h1(1, 1, 2, 1, &[0.5, 0.5], &[-0.5, 0.5], &[0.0], &[2.0])?;

        // Build the quadrature data for the mass operator
        let qf_build = ceed.q_function_interior_by_name("Mass1DBuild")?;
        let op_build = ceed
            .operator(&qf_build, QFunctionOpt::None, QFunctionOpt::None)?
            .field("dx", &rx, &b, VectorOpt::Active)?
            .field("weights", ElemRestrictionOpt::None, &b, VectorOpt::None)?
            .field("qdata", &rq, BasisOpt::Collocated, VectorOpt::Active)?
            .check()?;
        let mut qdata = ceed.vector(ne)?;
        op_build.apply(&x, &mut qdata)?;

        for q in qdata.view()?.iter() {
            assert!((q - 0.5).abs() < 10.0 * EPSILON, "incorrect quadrature data");
        }

        // Mass operator
        let qf_mass = ceed.q_function_interior_by_name("MassApply")?;
        let op_mass = ceed
            .operator(&qf_mass, QFunctionOpt::None, QFunctionOpt::None)?
            .field("u", &ru, &b, VectorOpt::Active)?
            .field("qdata", &rq, BasisOpt::Collocated, &qdata)?
            .field("v", &ru, &b, VectorOpt::Active)?
            .check()?;

        let u = ceed.vector_from_slice(&vec![1.0; ne + 1])?;
        let mut v = ceed.vector(ne + 1)?;
        op_mass.apply(&u, &mut v)?;

        let total: Scalar = v.view()?.iter().sum();
        assert!(
            (total - 2.0).abs() < 10.0 * EPSILON,
            "mass does not sum to interval length"
        );
        Ok(())
    }
}
