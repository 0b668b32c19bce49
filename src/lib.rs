//! # acqdata
//!
//! Data model and on-disk store for instrument acquisition data.
//!
//! Acquired (or calculated) samples live in [`DataContainer`](data::DataContainer)s:
//! one or more same-shape N-dimensional arrays with per-array units, axes
//! describing each dimension, and a dimensionality/source classification.
//! Containers from one acquisition event are grouped in a
//! [`Bundle`](data::Bundle), and bundles are persisted in a single
//! append-only node file by a [`Store`](store::Store).
//!
//! ## Modules
//!
//! - [`util`] - Basic types (dtypes, shapes, arrays, attributes, errors)
//! - [`units`] - Unit registry and quantities
//! - [`axis`] - Coordinate axes
//! - [`data`] - Containers and bundles
//! - [`node`] - Low-level hierarchical node file format
//! - [`store`] - Versioned bundle store
//!
//! ## Example
//!
//! ```
//! use acqdata::prelude::*;
//!
//! let registry = UnitRegistry::with_si();
//! let time = Axis::uniform("time", registry.parse("s")?, 0.0, 0.1, 5)?;
//! assert_eq!(time.slice(1..4)?.offset(), Some(0.1));
//!
//! let a = DataContainer::raw("a", vec![NdArray::from_vec(vec![1.0, 2.0])])?
//!     .with_unit(registry.parse("mm")?);
//! let b = DataContainer::raw("b", vec![NdArray::from_vec(vec![1.0, 1.0])])?
//!     .with_unit(registry.parse("m")?);
//! let sum = a.add(&b)?;
//! assert_eq!(sum.array(0).unwrap().values(), &[1001.0, 1002.0]);
//! # Ok::<(), acqdata::Error>(())
//! ```

pub mod axis;
pub mod data;
pub mod node;
pub mod store;
pub mod units;
pub mod util;

// Re-export commonly used types
pub use util::{Error, ErrorKind, Result};

/// Environment variable holding the log filter used by [`init_tracing`].
pub const LOG_ENV: &str = "ACQDATA_LOG";

/// Install a formatting subscriber filtered by `ACQDATA_LOG` (default
/// `warn`). Does nothing when a global subscriber is already set.
pub fn init_tracing() {
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    let subscriber = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false));
    let _ = tracing::subscriber::set_global_default(subscriber);
}

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::axis::{Axis, AxisData, Monotonicity};
    pub use crate::data::{Bundle, DataContainer, Dimensionality, SliceSpec, Source};
    pub use crate::store::{LoadedBundle, SaveMode, SaveReport, Store, StoreConfig};
    pub use crate::units::{Quantity, Unit, UnitRegistry};
    pub use crate::util::{AttrValue, Attributes, DType, Error, NdArray, Result, Shape};
}
