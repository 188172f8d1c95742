#![deny(missing_docs)]

//! Structured memory layout types for tessera
//!
//! A [`DType`] describes where the bytes of one element live relative to an origin address:
//! a predefined scalar, or a derived type built from other types by repetition, striding,
//! indexing, or struct composition. Committing a derived type compiles its layout into a
//! [`tessera_program::Program`] that the engine executes to gather or scatter the data.

pub use dtype::*;
pub use envelope::*;
pub use primitive::*;
pub use subarray::*;

#[cfg(feature = "arbitrary")]
mod arbitrary;
mod bounds;
mod builder;
mod dtype;
mod envelope;
mod primitive;
mod subarray;
