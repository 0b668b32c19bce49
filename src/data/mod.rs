//! In-memory data model: containers and bundles.
//!
//! A [`DataContainer`] groups same-shape arrays with their axes, units and
//! metadata; a [`Bundle`] collects the containers of one acquisition event.

mod bundle;
mod container;
mod math;
mod slice;

pub use bundle::Bundle;
pub use container::{default_label, DataContainer, Dimensionality, Source};
pub use slice::SliceSpec;
