//! Quantities: magnitudes paired with a unit.

use std::fmt;

use super::Unit;
use crate::util::{approx, Error, Result, Shape};

/// Magnitude of a quantity.
#[derive(Clone, Debug, PartialEq)]
pub enum Magnitude {
    Scalar(f64),
    Array(Vec<f64>),
}

impl Magnitude {
    fn map(&self, f: impl Fn(f64) -> f64) -> Self {
        match self {
            Self::Scalar(v) => Self::Scalar(f(*v)),
            Self::Array(v) => Self::Array(v.iter().map(|&x| f(x)).collect()),
        }
    }

    /// Element-wise combination, broadcasting scalars.
    fn zip(&self, other: &Magnitude, f: impl Fn(f64, f64) -> f64) -> Result<Self> {
        Ok(match (self, other) {
            (Self::Scalar(a), Self::Scalar(b)) => Self::Scalar(f(*a, *b)),
            (Self::Scalar(a), Self::Array(b)) => Self::Array(b.iter().map(|&x| f(*a, x)).collect()),
            (Self::Array(a), Self::Scalar(b)) => Self::Array(a.iter().map(|&x| f(x, *b)).collect()),
            (Self::Array(a), Self::Array(b)) => {
                if a.len() != b.len() {
                    return Err(Error::ShapeMismatch {
                        left: Shape::d1(a.len()),
                        right: Shape::d1(b.len()),
                    });
                }
                Self::Array(a.iter().zip(b).map(|(&x, &y)| f(x, y)).collect())
            }
        })
    }
}

/// A magnitude with a physical unit.
#[derive(Clone, Debug, PartialEq)]
pub struct Quantity {
    magnitude: Magnitude,
    unit: Unit,
}

impl Quantity {
    /// Scalar quantity.
    pub fn new(value: f64, unit: Unit) -> Self {
        Self { magnitude: Magnitude::Scalar(value), unit }
    }

    /// Array quantity.
    pub fn from_values(values: Vec<f64>, unit: Unit) -> Self {
        Self { magnitude: Magnitude::Array(values), unit }
    }

    #[inline]
    pub fn unit(&self) -> &Unit {
        &self.unit
    }

    #[inline]
    pub fn magnitude(&self) -> &Magnitude {
        &self.magnitude
    }

    /// Scalar value, if this is a scalar quantity.
    pub fn value(&self) -> Option<f64> {
        match self.magnitude {
            Magnitude::Scalar(v) => Some(v),
            Magnitude::Array(_) => None,
        }
    }

    /// All values (one for a scalar).
    pub fn values(&self) -> Vec<f64> {
        match &self.magnitude {
            Magnitude::Scalar(v) => vec![*v],
            Magnitude::Array(v) => v.clone(),
        }
    }

    /// Express this quantity in another unit of the same dimension.
    pub fn convert(&self, target: &Unit) -> Result<Quantity> {
        let k = self.unit.conversion_factor(target)?;
        Ok(Quantity {
            magnitude: self.magnitude.map(|v| v * k),
            unit: target.clone(),
        })
    }

    /// Sum, in the unit of `self`.
    pub fn add(&self, rhs: &Quantity) -> Result<Quantity> {
        let rhs = rhs.convert(&self.unit)?;
        Ok(Quantity {
            magnitude: self.magnitude.zip(&rhs.magnitude, |a, b| a + b)?,
            unit: self.unit.clone(),
        })
    }

    /// Difference, in the unit of `self`.
    pub fn sub(&self, rhs: &Quantity) -> Result<Quantity> {
        let rhs = rhs.convert(&self.unit)?;
        Ok(Quantity {
            magnitude: self.magnitude.zip(&rhs.magnitude, |a, b| a - b)?,
            unit: self.unit.clone(),
        })
    }

    /// Product; the unit is the product of both units.
    pub fn mul(&self, rhs: &Quantity) -> Result<Quantity> {
        Ok(Quantity {
            magnitude: self.magnitude.zip(&rhs.magnitude, |a, b| a * b)?,
            unit: self.unit.mul(&rhs.unit)?,
        })
    }

    /// Quotient; the unit is the quotient of both units.
    pub fn div(&self, rhs: &Quantity) -> Result<Quantity> {
        Ok(Quantity {
            magnitude: self.magnitude.zip(&rhs.magnitude, |a, b| a / b)?,
            unit: self.unit.div(&rhs.unit)?,
        })
    }

    /// Multiply by a plain number.
    pub fn scale(&self, k: f64) -> Quantity {
        Quantity { magnitude: self.magnitude.map(|v| v * k), unit: self.unit.clone() }
    }

    /// Unit-aware comparison within a relative tolerance.
    pub fn approx_eq(&self, other: &Quantity, tol: f64) -> bool {
        let Ok(other) = other.convert(&self.unit) else {
            return false;
        };
        let (a, b) = (self.values(), other.values());
        a.len() == b.len() && a.iter().zip(&b).all(|(&x, &y)| approx(x, y, tol))
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.magnitude {
            Magnitude::Scalar(v) => write!(f, "{}", v)?,
            Magnitude::Array(v) => write!(f, "{:?}", v)?,
        }
        if !self.unit.is_dimensionless() {
            write!(f, " {}", self.unit)?;
        }
        Ok(())
    }
}
