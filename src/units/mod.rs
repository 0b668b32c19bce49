//! Physical units and quantities.
//!
//! - [`Dimension`] - exponents over the SI base quantities
//! - [`Unit`] / [`UnitRegistry`] - canonical units and the parser that produces them
//! - [`Quantity`] - magnitude + unit, with dimension-checked arithmetic
//!
//! Conversions never consult global state: a registry value is passed to
//! whoever needs to turn strings into units, and converting between two
//! parsed units is a pure function returning a typed error.

mod dimension;
mod quantity;
mod registry;

pub use dimension::Dimension;
pub use quantity::{Magnitude, Quantity};
pub use registry::{Unit, UnitRegistry};
