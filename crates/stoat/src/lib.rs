//! # stoat
//!
//! A minimal reverse-mode automatic-differentiation engine over
//! multi-dimensional numeric arrays.
//!
//! This crate provides:
//! - [`Graph`] / [`Tensor`] — arena-backed computation graph and the cheap
//!   handles user code holds into it
//! - [`Op`] / [`OpKind`] — the closed set of elementwise binary operators
//!   (Add, Sub, Mul, Div) with their local derivative formulas
//! - [`Array`] trait — seam to the external numeric-array library
//!   (implemented for `ndarray::ArrayD<f64>`)
//! - `backward()` — reverse-topological gradient accumulation over the DAG
//!
//! # Example
//! ```
//! use stoat::{Array, NdGraph};
//!
//! let g = NdGraph::new();
//! let x = g.leaf(2.0)?;
//! let y = x.add(1.0)?; // y = x + 1
//! let z = x.mul(2.0)?; // z = 2x
//! let w = y.add(&z)?; // w = 3x + 1
//!
//! w.backward()?;
//! assert_eq!(w.to_vec(), vec![7.0]);
//! assert_eq!(x.grad().to_vec(), vec![3.0]); // both paths accumulate
//! # Ok::<(), stoat::Error>(())
//! ```

pub mod array;
mod backprop;
pub mod error;
mod node;
pub mod op;
pub mod tensor;

pub use array::{Array, Value};
pub use error::{Error, Result};
pub use op::{NodeId, Op, OpKind};
pub use tensor::{Graph, Operand, Tensor};

/// Graph over the default ndarray-backed array type.
pub type NdGraph = Graph<ndarray::ArrayD<f64>>;
/// Tensor over the default ndarray-backed array type.
pub type NdTensor = Tensor<ndarray::ArrayD<f64>>;
