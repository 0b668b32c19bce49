//! Array shapes.
//!
//! A [`Shape`] lists the extent of every dimension of a row-major array.

use smallvec::SmallVec;
use std::fmt;

/// Shape of an N-dimensional array.
///
/// Empty means rank 0 (a single value).
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Shape {
    dims: SmallVec<[usize; 4]>,
}

impl Shape {
    /// Rank-0 shape.
    pub fn scalar() -> Self {
        Self { dims: SmallVec::new() }
    }

    /// 1D shape.
    pub fn d1(len: usize) -> Self {
        Self { dims: smallvec::smallvec![len] }
    }

    /// 2D shape (rows, columns).
    pub fn d2(rows: usize, cols: usize) -> Self {
        Self { dims: smallvec::smallvec![rows, cols] }
    }

    /// Create from a slice of extents.
    pub fn from_slice(dims: &[usize]) -> Self {
        Self { dims: SmallVec::from_slice(dims) }
    }

    /// Number of dimensions.
    #[inline]
    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    /// Extent of one dimension.
    pub fn dim(&self, index: usize) -> Option<usize> {
        self.dims.get(index).copied()
    }

    /// All extents.
    #[inline]
    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    /// Total number of elements (1 for rank 0).
    pub fn size(&self) -> usize {
        self.dims.iter().product()
    }

    /// Element count, or None if it (or any stride) overflows `usize`.
    pub fn checked_size(&self) -> Option<usize> {
        // strides multiply the trailing extents even when an earlier one is 0
        self.dims
            .iter()
            .filter(|&&d| d != 0)
            .try_fold(1usize, |acc, &d| acc.checked_mul(d))?;
        Some(self.size())
    }

    /// True for rank 0.
    #[inline]
    pub fn is_scalar(&self) -> bool {
        self.dims.is_empty()
    }

    /// Row-major strides, in elements.
    pub fn strides(&self) -> SmallVec<[usize; 4]> {
        let mut strides: SmallVec<[usize; 4]> = smallvec::smallvec![1; self.dims.len()];
        for i in (0..self.dims.len().saturating_sub(1)).rev() {
            strides[i] = strides[i + 1] * self.dims[i + 1];
        }
        strides
    }

    /// Flat offset of a multi-index, or None if out of range.
    pub fn offset(&self, index: &[usize]) -> Option<usize> {
        if index.len() != self.dims.len() {
            return None;
        }
        let mut offset = 0;
        for ((&i, &n), s) in index.iter().zip(self.dims.iter()).zip(self.strides()) {
            if i >= n {
                return None;
            }
            offset += i * s;
        }
        Some(offset)
    }

    /// Shape with one dimension removed.
    pub fn without(&self, index: usize) -> Self {
        let mut dims = self.dims.clone();
        if index < dims.len() {
            dims.remove(index);
        }
        Self { dims }
    }

    /// Shape with one dimension resized.
    pub fn with_dim(&self, index: usize, len: usize) -> Self {
        let mut dims = self.dims.clone();
        if index < dims.len() {
            dims[index] = len;
        }
        Self { dims }
    }
}

impl From<usize> for Shape {
    fn from(len: usize) -> Self {
        Self::d1(len)
    }
}

impl From<(usize, usize)> for Shape {
    fn from((rows, cols): (usize, usize)) -> Self {
        Self::d2(rows, cols)
    }
}

impl From<Vec<usize>> for Shape {
    fn from(v: Vec<usize>) -> Self {
        Self { dims: SmallVec::from_vec(v) }
    }
}

impl From<&[usize]> for Shape {
    fn from(s: &[usize]) -> Self {
        Self::from_slice(s)
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, d) in self.dims.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", d)?;
        }
        write!(f, ")")
    }
}
