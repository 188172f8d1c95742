#![deny(missing_docs)]

//! Layout programs.
//!
//! A [`Program`] is the compiled form of a structured memory layout: a flat array of
//! [`Node`]s where the index of a node is the stack depth at which the execution engine
//! processes it. Index 0 always holds [`NodeKind::Exit`] and the array is terminated by
//! [`NodeKind::Bottom`].
//!
//! Programs are built once, when a type is committed, and are shared read-only by every
//! traversal afterwards. This crate also provides the transforms over a finished program:
//! return-point linearization, size calculation and a relocatable byte encoding.

pub use builder::*;
pub use node::*;
pub use program::*;

pub mod arith;
mod builder;
mod display;
mod linearize;
mod node;
mod program;
mod serde;

/// The maximum number of nodes in a program, including both sentinels.
///
/// This bounds the frame stack of every traversal, so a cursor never allocates.
pub const MAX_DEPTH: usize = 64;

/// Blocks at or above this many elements are moved with a single bulk copy rather than an
/// element-wise loop.
pub const MEMCPY_THRESHOLD: usize = 1024;
