//! Utility types shared by every layer.
//!
//! - [`DType`] - On-disk element types
//! - [`Shape`] - Array extents
//! - [`NdArray`] - Row-major numeric array
//! - [`AttrValue`] / [`Attributes`] - Typed key/value attributes
//! - [`Error`] / [`Result`] - Error handling

mod attr;
mod dtype;
mod error;
mod ndarray;
mod shape;

pub use attr::*;
pub use dtype::*;
pub use error::*;
pub use ndarray::NdArray;
pub(crate) use ndarray::approx;
pub use shape::*;
