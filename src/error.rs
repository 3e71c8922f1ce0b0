// Copyright (c) 2017-2022, Lawrence Livermore National Security, LLC and other CEED contributors.
// All Rights Reserved. See the top-level LICENSE and NOTICE files for details.
//
// SPDX-License-Identifier: BSD-2-Clause
//
// This file is part of CEED:  http://github.com/ceed

//! Error type shared by all Ceed objects.

use crate::EvalMode;
use thiserror::Error;

// -----------------------------------------------------------------------------
// Ceed error
// -----------------------------------------------------------------------------
#[derive(Debug, Error)]
pub enum Error {
    /// Resource string could not be parsed at context initialization.
    #[error("invalid resource specification: {resource:?}")]
    InvalidResource { resource: String },

    /// An array or vector had the wrong length for the requested operation.
    #[error("length mismatch for {object}: expected {expected}, got {found}")]
    LengthMismatch {
        object: &'static str,
        expected: usize,
        found: usize,
    },

    /// A restriction offset addressed a node outside the L-vector.
    #[error("offset {index} out of range for {nnodes} nodes")]
    OffsetOutOfRange { index: usize, nnodes: usize },

    /// A vector array was requested while a conflicting borrow was live.
    #[error("vector array is already borrowed")]
    VectorBorrowed,

    /// A QFunction was re-entered while already being applied.
    #[error("QFunction is already in use")]
    QFunctionBorrowed,

    /// An Operator was re-entered while already being applied.
    #[error("Operator is already in use")]
    OperatorBorrowed,

    /// Block index exceeds the number of blocks in a blocked restriction.
    #[error("block {block} out of range for {num_blocks} blocks")]
    BlockOutOfRange { block: usize, num_blocks: usize },

    /// Block application requested on a restriction that is not blocked.
    #[error("operation requires a blocked element restriction")]
    NotBlocked,

    /// A field name was used that the QFunction does not declare.
    #[error("QFunction field {name:?} is not declared")]
    UnknownField { name: String },

    /// A field name was declared or bound twice.
    #[error("field {name:?} specified twice")]
    DuplicateField { name: String },

    /// The QFunction field limit was exceeded.
    #[error("QFunction declares more than {max} fields")]
    TooManyFields { max: usize },

    /// A declared QFunction field has no operator binding.
    #[error("operator field {name:?} is not bound")]
    FieldNotBound { name: String },

    /// The evaluation mode is not valid in this position.
    #[error("field {name:?}: evaluation mode {emode:?} is not supported here")]
    UnsupportedEvalMode { name: String, emode: EvalMode },

    /// A field size does not agree with its restriction and basis.
    #[error("field {name:?}: expected size {expected}, got {found}")]
    FieldSizeMismatch {
        name: String,
        expected: usize,
        found: usize,
    },

    /// Element counts disagree between operator fields.
    #[error("field {name:?}: element count {found} does not match {expected}")]
    ElementCountMismatch {
        name: String,
        expected: usize,
        found: usize,
    },

    /// Quadrature sizes disagree between operator fields.
    #[error("field {name:?}: quadrature size {found} does not match {expected}")]
    QuadratureSizeMismatch {
        name: String,
        expected: usize,
        found: usize,
    },

    /// No gallery QFunction is registered under the requested name.
    #[error("no gallery QFunction named {name:?}")]
    UnknownGalleryFunction { name: String },

    /// Total quadrature size passed to a QFunction is not divisible by the
    /// vector length it was created with.
    #[error("quadrature size {q} is not a multiple of vector length {vlength}")]
    InvalidVectorLength { q: usize, vlength: usize },

    /// A user QFunction returned a nonzero error code.
    #[error("user QFunction returned error code {code}")]
    QFunctionFailed { code: i32 },

    /// A sub-operator's active vector sizes disagree with the composite.
    #[error(
        "sub-operator active sizes ({input}, {output}) incompatible with composite ({expected_input}, {expected_output})"
    )]
    IncompatibleSubOperator {
        input: usize,
        output: usize,
        expected_input: usize,
        expected_output: usize,
    },

    /// The operator has no active vector in the given direction.
    #[error("operator has no active {dir} field")]
    NoActiveField { dir: &'static str },

    /// Catch-all for configuration errors.
    #[error("invalid configuration: {what}")]
    InvalidDimensions { what: String },
}
