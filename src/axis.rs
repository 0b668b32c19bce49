//! Coordinate axes.
//!
//! An [`Axis`] labels one dimension of a data array with coordinates in a
//! physical unit. Coordinates are either uniformly spaced (stored as
//! offset + scaling, so lookups are computed) or an explicit list.

use std::fmt;
use std::ops::{Add, Range};
use std::str::FromStr;

use crate::units::Unit;
use crate::util::{approx, Attributes, Error, Result};

/// Relative tolerance used when comparing axis coordinates.
pub const AXIS_TOLERANCE: f64 = 1e-9;

/// Coordinate storage.
#[derive(Clone, Debug, PartialEq)]
pub enum AxisData {
    /// `value(i) = offset + i * scaling`
    Uniform { offset: f64, scaling: f64 },
    /// One coordinate per sample.
    Explicit(Vec<f64>),
}

/// Ordering of the coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Monotonicity {
    Ascending,
    Descending,
    NonMonotonic,
}

impl Monotonicity {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ascending => "ascending",
            Self::Descending => "descending",
            Self::NonMonotonic => "non-monotonic",
        }
    }

    /// Classify a coordinate list (strict ordering).
    pub fn of(values: &[f64]) -> Self {
        if values.windows(2).all(|w| w[0] < w[1]) {
            Self::Ascending
        } else if values.windows(2).all(|w| w[0] > w[1]) {
            Self::Descending
        } else {
            Self::NonMonotonic
        }
    }
}

impl FromStr for Monotonicity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "ascending" => Ok(Self::Ascending),
            "descending" => Ok(Self::Descending),
            "non-monotonic" => Ok(Self::NonMonotonic),
            other => Err(Error::other(format!("unknown monotonicity '{}'", other))),
        }
    }
}

impl fmt::Display for Monotonicity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named, unit-tagged coordinate sequence for one array dimension.
#[derive(Clone, Debug, PartialEq)]
pub struct Axis {
    label: String,
    unit: Unit,
    index: usize,
    size: usize,
    data: AxisData,
    irregular: bool,
    /// Stored attributes this version does not interpret.
    pub(crate) preserved: Attributes,
}

impl Axis {
    /// Create an axis, checking that `size` agrees with the data.
    pub fn new(label: impl Into<String>, unit: Unit, data: AxisData, size: usize) -> Result<Self> {
        let label = label.into();
        match &data {
            AxisData::Explicit(values) => {
                if values.len() != size {
                    return Err(Error::AxisSize { label, expected: size, actual: values.len() });
                }
                if Monotonicity::of(values) == Monotonicity::NonMonotonic {
                    return Err(Error::NonMonotonicAxis(label));
                }
            }
            AxisData::Uniform { offset, scaling } => {
                if !offset.is_finite() || !scaling.is_finite() || (size > 1 && *scaling == 0.0) {
                    return Err(Error::NonMonotonicAxis(label));
                }
            }
        }
        Ok(Self {
            label,
            unit,
            index: 0,
            size,
            data,
            irregular: false,
            preserved: Attributes::new(),
        })
    }

    /// Uniformly spaced axis.
    pub fn uniform(
        label: impl Into<String>,
        unit: Unit,
        offset: f64,
        scaling: f64,
        size: usize,
    ) -> Result<Self> {
        Self::new(label, unit, AxisData::Uniform { offset, scaling }, size)
    }

    /// Axis from explicit, monotonic coordinates.
    pub fn explicit(label: impl Into<String>, unit: Unit, values: Vec<f64>) -> Result<Self> {
        let size = values.len();
        Self::new(label, unit, AxisData::Explicit(values), size)
    }

    /// Axis from explicit coordinates in any order, flagged irregular.
    pub fn irregular(label: impl Into<String>, unit: Unit, values: Vec<f64>) -> Self {
        Self {
            label: label.into(),
            unit,
            index: 0,
            size: values.len(),
            data: AxisData::Explicit(values),
            irregular: true,
            preserved: Attributes::new(),
        }
    }

    /// Axis from coordinates, stored as offset + scaling when they are
    /// evenly spaced.
    pub fn from_values(label: impl Into<String>, unit: Unit, values: Vec<f64>) -> Result<Self> {
        let n = values.len();
        if n >= 2 {
            let offset = values[0];
            let scaling = (values[n - 1] - values[0]) / (n - 1) as f64;
            let even = scaling != 0.0
                && values
                    .iter()
                    .enumerate()
                    .all(|(i, &v)| approx(v, offset + i as f64 * scaling, AXIS_TOLERANCE));
            if even {
                return Self::uniform(label, unit, offset, scaling, n);
            }
        }
        Self::explicit(label, unit, values)
    }

    /// Bind to a dimension index of the owning container.
    pub fn with_index(mut self, index: usize) -> Self {
        self.index = index;
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    #[inline]
    pub fn label(&self) -> &str {
        &self.label
    }

    #[inline]
    pub fn unit(&self) -> &Unit {
        &self.unit
    }

    /// Dimension this axis describes.
    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    #[inline]
    pub fn data(&self) -> &AxisData {
        &self.data
    }

    #[inline]
    pub fn is_irregular(&self) -> bool {
        self.irregular
    }

    #[inline]
    pub fn is_uniform(&self) -> bool {
        matches!(self.data, AxisData::Uniform { .. })
    }

    pub fn offset(&self) -> Option<f64> {
        match self.data {
            AxisData::Uniform { offset, .. } => Some(offset),
            AxisData::Explicit(_) => None,
        }
    }

    pub fn scaling(&self) -> Option<f64> {
        match self.data {
            AxisData::Uniform { scaling, .. } => Some(scaling),
            AxisData::Explicit(_) => None,
        }
    }

    /// Coordinate of sample `index`.
    pub fn value_at(&self, index: usize) -> Result<f64> {
        if index >= self.size {
            return Err(Error::IndexOutOfBounds { index, len: self.size });
        }
        Ok(match &self.data {
            AxisData::Uniform { offset, scaling } => offset + index as f64 * scaling,
            AxisData::Explicit(values) => values[index],
        })
    }

    /// All coordinates.
    pub fn values(&self) -> Vec<f64> {
        match &self.data {
            AxisData::Uniform { offset, scaling } => {
                (0..self.size).map(|i| offset + i as f64 * scaling).collect()
            }
            AxisData::Explicit(values) => values.clone(),
        }
    }

    pub fn monotonicity(&self) -> Monotonicity {
        match &self.data {
            AxisData::Uniform { scaling, .. } => {
                if self.size < 2 || *scaling > 0.0 {
                    Monotonicity::Ascending
                } else {
                    Monotonicity::Descending
                }
            }
            AxisData::Explicit(values) => Monotonicity::of(values),
        }
    }

    #[inline]
    pub fn is_monotonic(&self) -> bool {
        self.monotonicity() != Monotonicity::NonMonotonic
    }

    /// Sub-axis over `range`. Uniform axes keep their scaling and move
    /// their offset; explicit axes keep the matching coordinates.
    pub fn slice(&self, range: Range<usize>) -> Result<Axis> {
        if range.start > range.end || range.end > self.size {
            return Err(Error::IndexOutOfBounds { index: range.end, len: self.size });
        }
        let data = match &self.data {
            AxisData::Uniform { offset, scaling } => AxisData::Uniform {
                offset: offset + range.start as f64 * scaling,
                scaling: *scaling,
            },
            AxisData::Explicit(values) => AxisData::Explicit(values[range.clone()].to_vec()),
        };
        Ok(Axis { size: range.len(), data, ..self.clone() })
    }

    /// Index of the sample nearest to `value`.
    pub fn find_index(&self, value: f64) -> Option<usize> {
        if self.size == 0 {
            return None;
        }
        match &self.data {
            AxisData::Uniform { offset, scaling } => {
                let i = ((value - offset) / scaling).round();
                Some(i.clamp(0.0, (self.size - 1) as f64) as usize)
            }
            AxisData::Explicit(values) => values
                .iter()
                .enumerate()
                .min_by(|(_, a), (_, b)| (*a - value).abs().total_cmp(&(*b - value).abs()))
                .map(|(i, _)| i),
        }
    }

    pub fn min(&self) -> Option<f64> {
        self.values().into_iter().reduce(f64::min)
    }

    pub fn max(&self) -> Option<f64> {
        self.values().into_iter().reduce(f64::max)
    }

    pub fn mean(&self) -> Option<f64> {
        if self.size == 0 {
            return None;
        }
        Some(self.values().iter().sum::<f64>() / self.size as f64)
    }

    /// Multiply every coordinate by `k`.
    pub fn scaled(&self, k: f64) -> Result<Axis> {
        if !k.is_finite() || (k == 0.0 && self.size > 1) {
            return Err(Error::NonMonotonicAxis(self.label.clone()));
        }
        let data = match &self.data {
            AxisData::Uniform { offset, scaling } => AxisData::Uniform {
                offset: offset * k,
                scaling: scaling * k,
            },
            AxisData::Explicit(values) => AxisData::Explicit(values.iter().map(|v| v * k).collect()),
        };
        Ok(Axis { data, ..self.clone() })
    }

    /// Add `delta` to every coordinate.
    pub fn shifted(&self, delta: f64) -> Axis {
        let data = match &self.data {
            AxisData::Uniform { offset, scaling } => AxisData::Uniform {
                offset: offset + delta,
                scaling: *scaling,
            },
            AxisData::Explicit(values) => {
                AxisData::Explicit(values.iter().map(|v| v + delta).collect())
            }
        };
        Axis { data, ..self.clone() }
    }

    /// Express the coordinates in another unit.
    pub fn as_unit(&self, target: &Unit) -> Result<Axis> {
        let k = self.unit.conversion_factor(target)?;
        let mut axis = self.scaled(k)?;
        axis.unit = target.clone();
        Ok(axis)
    }

    /// Check that `other` describes the same coordinates, after unit
    /// conversion, within [`AXIS_TOLERANCE`].
    pub fn check_matches(&self, other: &Axis) -> Result<()> {
        let mismatch = |reason: String| Error::AxisMismatch { index: self.index, reason };
        if self.size != other.size {
            return Err(mismatch(format!(
                "'{}' has {} samples, '{}' has {}",
                self.label, self.size, other.label, other.size
            )));
        }
        let other = other.as_unit(&self.unit).map_err(|e| mismatch(e.to_string()))?;
        let (a, b) = (self.values(), other.values());
        if let Some(i) = (0..a.len()).find(|&i| !approx(a[i], b[i], AXIS_TOLERANCE)) {
            return Err(mismatch(format!(
                "sample {} differs: {} vs {} {}",
                i, a[i], b[i], self.unit
            )));
        }
        Ok(())
    }
}

impl Add<f64> for &Axis {
    type Output = Axis;

    fn add(self, delta: f64) -> Axis {
        self.shifted(delta)
    }
}
