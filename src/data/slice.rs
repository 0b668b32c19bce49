//! Slicing containers along a dimension.

use std::collections::BTreeMap;
use std::ops::Range;

use super::DataContainer;
use crate::util::{Error, Result};

/// Selection along one dimension.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SliceSpec {
    /// Keep one sample and drop the dimension.
    Index(usize),
    /// Keep a sub-range; the rank is unchanged.
    Range(Range<usize>),
}

impl From<usize> for SliceSpec {
    fn from(index: usize) -> Self {
        Self::Index(index)
    }
}

impl From<Range<usize>> for SliceSpec {
    fn from(range: Range<usize>) -> Self {
        Self::Range(range)
    }
}

impl DataContainer {
    /// Slice every array along dimension `dim`.
    ///
    /// An index removes the dimension together with its axis and shifts the
    /// axes of higher dimensions down by one; a range keeps the dimension
    /// and slices its axis.
    pub fn slice_dim(&self, dim: usize, spec: impl Into<SliceSpec>) -> Result<DataContainer> {
        let rank = self.rank();
        if dim >= rank {
            return Err(Error::AxisIndex { index: dim, rank });
        }
        let spec = spec.into();

        let arrays = self
            .arrays()
            .iter()
            .map(|a| match &spec {
                SliceSpec::Index(i) => a.take(dim, *i),
                SliceSpec::Range(r) => a.narrow(dim, r.clone()),
            })
            .collect::<Result<Vec<_>>>()?;

        let mut axes = BTreeMap::new();
        for (&index, axis) in self.axes_map() {
            match &spec {
                SliceSpec::Index(_) if index == dim => {}
                SliceSpec::Index(_) if index > dim => {
                    axes.insert(index - 1, axis.clone().with_index(index - 1));
                }
                SliceSpec::Range(r) if index == dim => {
                    axes.insert(index, axis.slice(r.clone())?);
                }
                _ => {
                    axes.insert(index, axis.clone());
                }
            }
        }
        Ok(self.derive(arrays, axes))
    }

    /// Slice along the axis with the given label.
    pub fn slice_axis(&self, label: &str, spec: impl Into<SliceSpec>) -> Result<DataContainer> {
        let axis = self
            .axis_by_label(label)
            .ok_or_else(|| Error::NotFound(format!("axis '{}' in '{}'", label, self.name())))?;
        self.slice_dim(axis.index(), spec)
    }
}
