//! Arithmetic on data containers.
//!
//! Binary operations between containers require the same number of arrays,
//! identical shapes and matching axes. Addition and subtraction convert the
//! right-hand arrays to the units of the left-hand ones; multiplication and
//! division compose the units. Results are tagged [`Source::Calculated`].

use std::collections::BTreeMap;

use super::{DataContainer, Source};
use crate::axis::Axis;
use crate::units::{Quantity, Unit};
use crate::util::{approx, Error, NdArray, Result};

#[derive(Clone, Copy)]
enum Op {
    Add,
    Sub,
    Mul,
    Div,
}

impl Op {
    fn apply(self, a: f64, b: f64) -> f64 {
        match self {
            Op::Add => a + b,
            Op::Sub => a - b,
            Op::Mul => a * b,
            Op::Div => a / b,
        }
    }
}

impl DataContainer {
    pub fn add(&self, other: &DataContainer) -> Result<DataContainer> {
        self.binary(other, Op::Add)
    }

    pub fn sub(&self, other: &DataContainer) -> Result<DataContainer> {
        self.binary(other, Op::Sub)
    }

    pub fn mul(&self, other: &DataContainer) -> Result<DataContainer> {
        self.binary(other, Op::Mul)
    }

    pub fn div(&self, other: &DataContainer) -> Result<DataContainer> {
        self.binary(other, Op::Div)
    }

    pub fn add_scalar(&self, k: f64) -> DataContainer {
        self.map_values(|v| v + k)
    }

    pub fn sub_scalar(&self, k: f64) -> DataContainer {
        self.map_values(|v| v - k)
    }

    pub fn mul_scalar(&self, k: f64) -> DataContainer {
        self.map_values(|v| v * k)
    }

    pub fn div_scalar(&self, k: f64) -> DataContainer {
        self.map_values(|v| v / k)
    }

    /// Multiply by a scalar quantity; units compose.
    pub fn mul_quantity(&self, q: &Quantity) -> Result<DataContainer> {
        self.with_quantity(q, Op::Mul)
    }

    /// Divide by a scalar quantity; units compose.
    pub fn div_quantity(&self, q: &Quantity) -> Result<DataContainer> {
        self.with_quantity(q, Op::Div)
    }

    /// Absolute value of every sample.
    pub fn abs(&self) -> DataContainer {
        self.map_values(f64::abs)
    }

    /// Running average: `(self * (weight - 1) + other) / weight`.
    ///
    /// `self` is the average of `weight - 1` earlier frames and `other` the
    /// newest one.
    pub fn average(&self, other: &DataContainer, weight: usize) -> Result<DataContainer> {
        if weight == 0 {
            return Err(Error::other("average weight must be at least 1"));
        }
        let w = weight as f64;
        Ok(self.mul_scalar(w - 1.0).add(other)?.div_scalar(w))
    }

    /// Value equality that honours units: `1 mm` equals `1000 um`.
    pub fn approx_eq_units(&self, other: &DataContainer, tol: f64) -> bool {
        if self.dimensionality() != other.dimensionality()
            || self.len() != other.len()
            || self.shape() != other.shape()
        {
            return false;
        }
        for i in 0..self.len() {
            let Ok(values) = other.converted_values(i, &self.units()[i]) else {
                return false;
            };
            let same = self.arrays()[i]
                .values()
                .iter()
                .zip(&values)
                .all(|(&a, &b)| approx(a, b, tol));
            if !same {
                return false;
            }
        }
        self.merged_axes(other).is_ok()
    }

    fn binary(&self, other: &DataContainer, op: Op) -> Result<DataContainer> {
        if self.len() != other.len() {
            return Err(Error::length("arrays", self.len(), other.len()));
        }
        if self.shape() != other.shape() {
            return Err(Error::ShapeMismatch {
                left: self.shape(),
                right: other.shape(),
            });
        }
        let axes = self.merged_axes(other)?;

        let mut arrays = Vec::with_capacity(self.len());
        let mut units = Vec::with_capacity(self.len());
        for (i, (a, b)) in self.arrays().iter().zip(other.arrays()).enumerate() {
            let (lhs_unit, rhs_unit) = (&self.units()[i], &other.units()[i]);
            let (rhs, unit) = match op {
                Op::Add | Op::Sub => {
                    let values = other.converted_values(i, lhs_unit)?;
                    (NdArray::new(b.shape().clone(), values)?, lhs_unit.clone())
                }
                Op::Mul => (b.clone(), lhs_unit.mul(rhs_unit)?),
                Op::Div => (b.clone(), lhs_unit.div(rhs_unit)?),
            };
            arrays.push(a.zip_with(&rhs, |x, y| op.apply(x, y))?);
            units.push(unit);
        }

        let mut out = self.derive(arrays, axes).with_source(Source::Calculated);
        out.set_units_unchecked(units);
        Ok(out)
    }

    fn with_quantity(&self, q: &Quantity, op: Op) -> Result<DataContainer> {
        let Some(k) = q.value() else {
            return Err(Error::other("container arithmetic takes a scalar quantity"));
        };
        let mut out = self.map_values(|v| op.apply(v, k));
        let units: Vec<Unit> = self
            .units()
            .iter()
            .map(|u| match op {
                Op::Div => u.div(q.unit()),
                _ => u.mul(q.unit()),
            })
            .collect::<Result<_>>()?;
        out.set_units_unchecked(units);
        Ok(out)
    }

    fn map_values(&self, f: impl Fn(f64) -> f64) -> DataContainer {
        let arrays = self.arrays().iter().map(|a| a.map(&f)).collect();
        self.derive(arrays, self.axes_map().clone())
            .with_source(Source::Calculated)
    }

    /// Axes of both operands; axes bound on both sides must agree.
    fn merged_axes(&self, other: &DataContainer) -> Result<BTreeMap<usize, Axis>> {
        let mut axes = self.axes_map().clone();
        for (index, theirs) in other.axes_map() {
            match axes.get(index) {
                Some(ours) => ours.check_matches(theirs)?,
                None => {
                    axes.insert(*index, theirs.clone());
                }
            }
        }
        Ok(axes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::units::UnitRegistry;

    fn unit(s: &str) -> Unit {
        UnitRegistry::default().parse(s).unwrap()
    }

    fn data1d(name: &str, values: Vec<f64>, u: &str) -> DataContainer {
        let n = values.len();
        DataContainer::raw(name, vec![NdArray::from_vec(values)])
            .unwrap()
            .with_unit(unit(u))
            .with_axis(Axis::uniform("time", unit("s"), 0.0, 0.1, n).unwrap())
            .unwrap()
    }

    #[test]
    fn test_add_matching() {
        let a = data1d("a", vec![1.0, 2.0, 3.0, 4.0], "V");
        let b = data1d("b", vec![1.0, 1.0, 1.0, 1.0], "mV");
        let sum = a.add(&b).unwrap();
        assert_eq!(sum.source(), Source::Calculated);
        assert_eq!(sum.name(), "a");
        assert_eq!(sum.units()[0].symbol(), "V");
        assert!((sum.arrays()[0].values()[0] - 1.001).abs() < 1e-12);
        assert_eq!(sum.axis(0).unwrap().label(), "time");
    }

    #[test]
    fn test_shape_mismatch() {
        let a = data1d("a", vec![1.0; 4], "V");
        let b = data1d("b", vec![1.0; 5], "V");
        assert!(matches!(a.add(&b), Err(Error::ShapeMismatch { .. })));
    }

    #[test]
    fn test_axis_mismatch() {
        let a = data1d("a", vec![1.0; 4], "V");
        let shifted = Axis::uniform("time", unit("s"), 0.5, 0.1, 4).unwrap();
        let b = data1d("b", vec![1.0; 4], "V").with_axis(shifted).unwrap();
        assert!(matches!(a.add(&b), Err(Error::AxisMismatch { index: 0, .. })));

        // same coordinates expressed in ms
        let ms = Axis::uniform("time", unit("ms"), 0.0, 100.0, 4).unwrap();
        let c = data1d("c", vec![1.0; 4], "V").with_axis(ms).unwrap();
        assert!(a.sub(&c).is_ok());
    }

    #[test]
    fn test_incompatible_units() {
        let a = data1d("a", vec![1.0; 4], "V");
        let b = data1d("b", vec![1.0; 4], "s");
        assert!(matches!(a.add(&b), Err(Error::IncompatibleUnit { .. })));
        let p = a.mul(&b).unwrap();
        assert!(p.units()[0].is_compatible(&unit("V*s")));
        let q = a.div(&b).unwrap();
        assert_eq!(q.units()[0].symbol(), "V/s");
    }

    #[test]
    fn test_scalar_ops() {
        let a = data1d("a", vec![-1.0, 2.0, -3.0, 4.0], "V");
        assert_eq!(a.abs().arrays()[0].values(), &[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(a.mul_scalar(2.0).arrays()[0].values(), &[-2.0, 4.0, -6.0, 8.0]);
        assert_eq!(a.add_scalar(1.0).arrays()[0].values(), &[0.0, 3.0, -2.0, 5.0]);

        let r = Quantity::new(2.0, unit("ohm"));
        let i = a.div_quantity(&r).unwrap();
        assert_eq!(i.arrays()[0].values()[1], 1.0);
        assert!(i.units()[0].is_compatible(&unit("A")));
    }

    #[test]
    fn test_average() {
        let a = data1d("a", vec![2.0; 4], "V");
        let b = data1d("b", vec![5.0; 4], "V");
        let avg = a.average(&b, 3).unwrap();
        assert_eq!(avg.arrays()[0].values(), &[3.0; 4]);
        assert!(a.average(&b, 0).is_err());
    }

    #[test]
    fn test_unit_aware_equality() {
        let a = data1d("a", vec![1.0, 2.0, 3.0, 4.0], "mm");
        let b = data1d("b", vec![1000.0, 2000.0, 3000.0, 4000.0], "um");
        assert!(a.approx_eq_units(&b, 1e-12));
        assert!(!a.approx_eq_units(&a.add_scalar(1.0), 1e-12));
        let c = data1d("c", vec![1.0, 2.0, 3.0, 4.0], "s");
        assert!(!a.approx_eq_units(&c, 1e-12));
    }
}
