//! Data containers: same-shape arrays with axes, units and metadata.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::axis::Axis;
use crate::units::{Quantity, Unit};
use crate::util::{AttrValue, Attributes, Error, NdArray, Result, Shape};

/// Semantic classification of a container by array rank.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Dimensionality {
    /// A single value (rank 0).
    Scalar,
    /// Zero-dimensional acquisition, e.g. one reading per channel (rank 0).
    Data0D,
    /// Rank 1.
    Data1D,
    /// Rank 2.
    Data2D,
    /// Rank 3 or more.
    DataND,
}

impl Dimensionality {
    pub const ALL: [Dimensionality; 5] = [
        Self::Scalar,
        Self::Data0D,
        Self::Data1D,
        Self::Data2D,
        Self::DataND,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Scalar => "Scalar",
            Self::Data0D => "Data0D",
            Self::Data1D => "Data1D",
            Self::Data2D => "Data2D",
            Self::DataND => "DataND",
        }
    }

    /// Default classification for an array rank.
    pub const fn from_rank(rank: usize) -> Self {
        match rank {
            0 => Self::Data0D,
            1 => Self::Data1D,
            2 => Self::Data2D,
            _ => Self::DataND,
        }
    }

    pub const fn accepts_rank(self, rank: usize) -> bool {
        match self {
            Self::Scalar | Self::Data0D => rank == 0,
            Self::Data1D => rank == 1,
            Self::Data2D => rank == 2,
            Self::DataND => rank >= 3,
        }
    }
}

impl FromStr for Dimensionality {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|d| d.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| Error::other(format!("unknown dimensionality '{}'", s)))
    }
}

impl fmt::Display for Dimensionality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where the data came from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Source {
    /// Read from an instrument.
    #[default]
    Raw,
    /// Derived from other data.
    Calculated,
}

impl Source {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Raw => "raw",
            Self::Calculated => "calculated",
        }
    }
}

impl FromStr for Source {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "raw" => Ok(Self::Raw),
            "calculated" => Ok(Self::Calculated),
            _ => Err(Error::other(format!("unknown source '{}'", s))),
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Default channel label for array `index`.
pub fn default_label(index: usize) -> String {
    format!("CH{:02}", index)
}

/// One or more same-shape arrays plus the axes, units and metadata
/// describing them.
///
/// The shape is fixed at construction. Arrays can be swapped for arrays of
/// the same shape with [`set_arrays`](Self::set_arrays); axes are checked
/// against the shape when bound.
#[derive(Clone, Debug, PartialEq)]
pub struct DataContainer {
    name: String,
    origin: String,
    dimensionality: Dimensionality,
    source: Source,
    arrays: Vec<NdArray>,
    labels: Vec<String>,
    units: Vec<Unit>,
    axes: BTreeMap<usize, Axis>,
    extra: Attributes,
    /// Stored attributes this version does not interpret.
    pub(crate) preserved: Attributes,
    /// Same, per array node.
    pub(crate) array_preserved: Vec<Attributes>,
}

impl DataContainer {
    /// Create a container. All arrays must share one shape; the
    /// dimensionality follows from their rank.
    pub fn new(name: impl Into<String>, source: Source, arrays: Vec<NdArray>) -> Result<Self> {
        let name = name.into();
        let Some(first) = arrays.first() else {
            return Err(Error::EmptyContainer(name));
        };
        let shape = first.shape().clone();
        if let Some(bad) = arrays.iter().find(|a| *a.shape() != shape) {
            return Err(Error::ShapeMismatch {
                left: shape,
                right: bad.shape().clone(),
            });
        }
        let n = arrays.len();
        Ok(Self {
            name,
            origin: String::new(),
            dimensionality: Dimensionality::from_rank(shape.rank()),
            source,
            labels: (0..n).map(default_label).collect(),
            units: vec![Unit::dimensionless(); n],
            array_preserved: vec![Attributes::new(); n],
            arrays,
            axes: BTreeMap::new(),
            extra: Attributes::new(),
            preserved: Attributes::new(),
        })
    }

    /// Raw (acquired) container.
    pub fn raw(name: impl Into<String>, arrays: Vec<NdArray>) -> Result<Self> {
        Self::new(name, Source::Raw, arrays)
    }

    /// Calculated (derived) container.
    pub fn calculated(name: impl Into<String>, arrays: Vec<NdArray>) -> Result<Self> {
        Self::new(name, Source::Calculated, arrays)
    }

    /// Use `unit` for every array.
    pub fn with_unit(mut self, unit: Unit) -> Self {
        self.units = vec![unit; self.arrays.len()];
        self
    }

    /// Per-array units, one per array.
    pub fn with_units(mut self, units: Vec<Unit>) -> Result<Self> {
        if units.len() != self.arrays.len() {
            return Err(Error::length("units", self.arrays.len(), units.len()));
        }
        self.units = units;
        Ok(self)
    }

    /// Channel labels; missing trailing labels get the `CHxx` default.
    pub fn with_labels<S: Into<String>>(mut self, labels: impl IntoIterator<Item = S>) -> Result<Self> {
        let mut labels: Vec<String> = labels.into_iter().map(Into::into).collect();
        if labels.len() > self.arrays.len() {
            return Err(Error::length("labels", self.arrays.len(), labels.len()));
        }
        for i in labels.len()..self.arrays.len() {
            labels.push(default_label(i));
        }
        self.labels = labels;
        Ok(self)
    }

    /// Override the classification; it must agree with the array rank.
    pub fn with_dimensionality(mut self, dimensionality: Dimensionality) -> Result<Self> {
        let rank = self.rank();
        if !dimensionality.accepts_rank(rank) {
            return Err(Error::RankMismatch {
                dimensionality: dimensionality.to_string(),
                rank,
            });
        }
        self.dimensionality = dimensionality;
        Ok(self)
    }

    /// Bind an axis to the dimension given by its index.
    pub fn with_axis(mut self, axis: Axis) -> Result<Self> {
        self.set_axis(axis)?;
        Ok(self)
    }

    /// Bind an axis, replacing any axis already bound to that dimension.
    pub fn set_axis(&mut self, axis: Axis) -> Result<()> {
        let index = axis.index();
        let shape = self.shape();
        let Some(dim_size) = shape.dim(index) else {
            return Err(Error::AxisIndex { index, rank: shape.rank() });
        };
        if axis.size() != dim_size {
            return Err(Error::DimensionMismatch {
                index,
                axis_size: axis.size(),
                dim_size,
            });
        }
        self.axes.insert(index, axis);
        Ok(())
    }

    pub fn remove_axis(&mut self, index: usize) -> Option<Axis> {
        self.axes.remove(&index)
    }

    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = origin.into();
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_source(mut self, source: Source) -> Self {
        self.source = source;
        self
    }

    /// Attach a metadata entry.
    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<AttrValue>) -> Self {
        self.extra.set(key, value);
        self
    }

    /// Replace the arrays wholesale. Count and shape must not change.
    pub fn set_arrays(&mut self, arrays: Vec<NdArray>) -> Result<()> {
        if arrays.len() != self.arrays.len() {
            return Err(Error::length("arrays", self.arrays.len(), arrays.len()));
        }
        let shape = self.shape();
        if let Some(bad) = arrays.iter().find(|a| *a.shape() != shape) {
            return Err(Error::ShapeMismatch {
                left: shape,
                right: bad.shape().clone(),
            });
        }
        self.arrays = arrays;
        Ok(())
    }

    /// Concatenate the channels of `other` (same shape) after ours.
    pub fn append_arrays(&mut self, other: &DataContainer) -> Result<()> {
        if other.shape() != self.shape() {
            return Err(Error::ShapeMismatch {
                left: self.shape(),
                right: other.shape(),
            });
        }
        self.arrays.extend(other.arrays.iter().cloned());
        self.labels.extend(other.labels.iter().cloned());
        self.units.extend(other.units.iter().cloned());
        self.array_preserved.extend(other.array_preserved.iter().cloned());
        Ok(())
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Module or instrument that produced the data.
    #[inline]
    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// `origin/name`, or just the name without an origin.
    pub fn full_name(&self) -> String {
        if self.origin.is_empty() {
            self.name.clone()
        } else {
            format!("{}/{}", self.origin, self.name)
        }
    }

    #[inline]
    pub fn dimensionality(&self) -> Dimensionality {
        self.dimensionality
    }

    #[inline]
    pub fn source(&self) -> Source {
        self.source
    }

    #[inline]
    pub fn arrays(&self) -> &[NdArray] {
        &self.arrays
    }

    pub fn array(&self, index: usize) -> Option<&NdArray> {
        self.arrays.get(index)
    }

    /// Number of arrays.
    #[inline]
    pub fn len(&self) -> usize {
        self.arrays.len()
    }

    /// True if the container holds no arrays.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.arrays.is_empty()
    }

    #[inline]
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    #[inline]
    pub fn units(&self) -> &[Unit] {
        &self.units
    }

    pub fn unit(&self, index: usize) -> Option<&Unit> {
        self.units.get(index)
    }

    /// Shape shared by all arrays.
    pub fn shape(&self) -> Shape {
        self.arrays
            .first()
            .map(|a| a.shape().clone())
            .unwrap_or_default()
    }

    pub fn rank(&self) -> usize {
        self.shape().rank()
    }

    /// Bound axes, by dimension index.
    pub fn axes(&self) -> impl Iterator<Item = &Axis> {
        self.axes.values()
    }

    pub fn axis(&self, index: usize) -> Option<&Axis> {
        self.axes.get(&index)
    }

    pub fn axis_by_label(&self, label: &str) -> Option<&Axis> {
        self.axes.values().find(|a| a.label() == label)
    }

    #[inline]
    pub fn extra(&self) -> &Attributes {
        &self.extra
    }

    #[inline]
    pub fn extra_mut(&mut self) -> &mut Attributes {
        &mut self.extra
    }

    /// Array `index` as a quantity in its unit.
    pub fn quantity(&self, index: usize) -> Option<Quantity> {
        let array = self.arrays.get(index)?;
        Some(Quantity::from_values(array.values().to_vec(), self.units[index].clone()))
    }

    /// A copy with every array expressed in `target`.
    pub fn as_unit(&self, target: &Unit) -> Result<DataContainer> {
        let mut arrays = Vec::with_capacity(self.arrays.len());
        for i in 0..self.arrays.len() {
            let converted = self.converted_values(i, target)?;
            arrays.push(NdArray::new(self.arrays[i].shape().clone(), converted)?);
        }
        Ok(DataContainer {
            arrays,
            units: vec![target.clone(); self.units.len()],
            ..self.clone()
        })
    }

    /// Values of array `index` in `target`.
    pub(crate) fn converted_values(&self, index: usize, target: &Unit) -> Result<Vec<f64>> {
        let q = self
            .quantity(index)
            .ok_or(Error::IndexOutOfBounds { index, len: self.arrays.len() })?;
        Ok(q.convert(target)?.values())
    }

    /// Rebuild with new arrays and axes, keeping everything else. Used by
    /// arithmetic and slicing; shapes are already checked by the caller.
    pub(crate) fn derive(&self, arrays: Vec<NdArray>, axes: BTreeMap<usize, Axis>) -> DataContainer {
        let rank = arrays.first().map(NdArray::rank).unwrap_or(0);
        let dimensionality = if self.dimensionality.accepts_rank(rank) {
            self.dimensionality
        } else {
            Dimensionality::from_rank(rank)
        };
        DataContainer {
            arrays,
            axes,
            dimensionality,
            ..self.clone()
        }
    }

    pub(crate) fn set_units_unchecked(&mut self, units: Vec<Unit>) {
        self.units = units;
    }

    pub(crate) fn axes_map(&self) -> &BTreeMap<usize, Axis> {
        &self.axes
    }
}
