//! N-dimensional numeric arrays.

use std::ops::Range;

use super::{DType, Error, Result, Shape};

/// Row-major N-dimensional array of samples.
///
/// Values are held as `f64`; [`DType`] is the element type used on disk.
#[derive(Clone, Debug, PartialEq)]
pub struct NdArray {
    shape: Shape,
    dtype: DType,
    data: Vec<f64>,
}

impl NdArray {
    /// Create an array from a shape and row-major values.
    pub fn new(shape: impl Into<Shape>, data: Vec<f64>) -> Result<Self> {
        let shape = shape.into();
        match shape.checked_size() {
            Some(size) if size == data.len() => {}
            size => {
                return Err(Error::length(
                    format!("array of shape {}", shape),
                    size.unwrap_or(usize::MAX),
                    data.len(),
                ))
            }
        }
        Ok(Self { shape, dtype: DType::Float64, data })
    }

    /// 1D array.
    pub fn from_vec(data: Vec<f64>) -> Self {
        Self { shape: Shape::d1(data.len()), dtype: DType::Float64, data }
    }

    /// Rank-0 array holding one value.
    pub fn scalar(value: f64) -> Self {
        Self { shape: Shape::scalar(), dtype: DType::Float64, data: vec![value] }
    }

    /// Array of zeros.
    pub fn zeros(shape: impl Into<Shape>) -> Self {
        let shape = shape.into();
        let data = vec![0.0; shape.size()];
        Self { shape, dtype: DType::Float64, data }
    }

    /// Change the storage type, rounding the values to what it can hold.
    pub fn with_dtype(mut self, dtype: DType) -> Self {
        if dtype != DType::Float64 {
            for v in &mut self.data {
                *v = dtype.quantize(*v);
            }
        }
        self.dtype = dtype;
        self
    }

    #[inline]
    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    #[inline]
    pub fn dtype(&self) -> DType {
        self.dtype
    }

    #[inline]
    pub fn rank(&self) -> usize {
        self.shape.rank()
    }

    /// Number of elements.
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Row-major values.
    #[inline]
    pub fn values(&self) -> &[f64] {
        &self.data
    }

    /// Take the values out.
    pub fn into_values(self) -> Vec<f64> {
        self.data
    }

    /// Value at a multi-index.
    pub fn get(&self, index: &[usize]) -> Result<f64> {
        self.shape
            .offset(index)
            .map(|o| self.data[o])
            .ok_or_else(|| Error::other(format!("index {:?} outside shape {}", index, self.shape)))
    }

    /// Apply a function to every element. The result is stored as float64.
    pub fn map(&self, f: impl Fn(f64) -> f64) -> Self {
        Self {
            shape: self.shape.clone(),
            dtype: DType::Float64,
            data: self.data.iter().map(|&v| f(v)).collect(),
        }
    }

    /// Combine two same-shape arrays element by element.
    pub fn zip_with(&self, other: &NdArray, f: impl Fn(f64, f64) -> f64) -> Result<Self> {
        if self.shape != other.shape {
            return Err(Error::ShapeMismatch {
                left: self.shape.clone(),
                right: other.shape.clone(),
            });
        }
        Ok(Self {
            shape: self.shape.clone(),
            dtype: DType::Float64,
            data: self.data.iter().zip(&other.data).map(|(&a, &b)| f(a, b)).collect(),
        })
    }

    /// Pick one index along a dimension, dropping that dimension.
    pub fn take(&self, dim: usize, index: usize) -> Result<Self> {
        let n = self.extent(dim)?;
        if index >= n {
            return Err(Error::IndexOutOfBounds { index, len: n });
        }
        let data = self.gather(dim, index..index + 1);
        Ok(Self { shape: self.shape.without(dim), dtype: self.dtype, data })
    }

    /// Restrict a dimension to an index range.
    pub fn narrow(&self, dim: usize, range: Range<usize>) -> Result<Self> {
        let n = self.extent(dim)?;
        if range.start > range.end || range.end > n {
            return Err(Error::IndexOutOfBounds { index: range.end, len: n });
        }
        let data = self.gather(dim, range.clone());
        Ok(Self {
            shape: self.shape.with_dim(dim, range.len()),
            dtype: self.dtype,
            data,
        })
    }

    fn extent(&self, dim: usize) -> Result<usize> {
        self.shape.dim(dim).ok_or(Error::AxisIndex { index: dim, rank: self.rank() })
    }

    fn gather(&self, dim: usize, range: Range<usize>) -> Vec<f64> {
        let dims = self.shape.dims();
        let outer: usize = dims[..dim].iter().product();
        let inner: usize = dims[dim + 1..].iter().product();
        let n = dims[dim];
        let mut out = Vec::with_capacity(outer * range.len() * inner);
        for o in 0..outer {
            let base = o * n * inner;
            out.extend_from_slice(&self.data[base + range.start * inner..base + range.end * inner]);
        }
        out
    }

    /// Encode the samples as little-endian bytes of the storage type.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.dtype.encode(&self.data)
    }

    /// Decode an array from stored bytes.
    pub fn from_bytes(shape: impl Into<Shape>, dtype: DType, bytes: &[u8]) -> Result<Self> {
        let shape = shape.into();
        let expected = shape
            .checked_size()
            .and_then(|n| n.checked_mul(dtype.num_bytes()))
            .ok_or_else(|| Error::other(format!("{} payload of shape {} overflows", dtype, shape)))?;
        if bytes.len() != expected {
            return Err(Error::length(
                format!("{} payload of shape {}", dtype, shape),
                expected,
                bytes.len(),
            ));
        }
        let data = dtype.decode(bytes)?;
        Ok(Self { shape, dtype, data })
    }

    /// Element-wise comparison within a relative tolerance.
    pub fn approx_eq(&self, other: &NdArray, tol: f64) -> bool {
        self.shape == other.shape
            && self
                .data
                .iter()
                .zip(&other.data)
                .all(|(&a, &b)| approx(a, b, tol))
    }
}

/// Relative float comparison with an absolute floor of `tol`.
pub(crate) fn approx(a: f64, b: f64, tol: f64) -> bool {
    if a == b {
        return true;
    }
    let scale = a.abs().max(b.abs()).max(1.0);
    (a - b).abs() <= tol * scale
}
