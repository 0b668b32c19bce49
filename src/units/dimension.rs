//! Physical dimensions as exponent vectors over the SI base quantities.

use std::fmt;

/// Symbols of the base quantities, in storage order.
const BASE_SYMBOLS: [&str; 7] = ["L", "M", "T", "I", "Θ", "N", "J"];

/// Exponents of length, mass, time, current, temperature, amount and
/// luminous intensity.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Dimension(pub [i8; 7]);

impl Dimension {
    pub const NONE: Self = Self([0; 7]);
    pub const LENGTH: Self = Self([1, 0, 0, 0, 0, 0, 0]);
    pub const MASS: Self = Self([0, 1, 0, 0, 0, 0, 0]);
    pub const TIME: Self = Self([0, 0, 1, 0, 0, 0, 0]);
    pub const CURRENT: Self = Self([0, 0, 0, 1, 0, 0, 0]);
    pub const TEMPERATURE: Self = Self([0, 0, 0, 0, 1, 0, 0]);
    pub const AMOUNT: Self = Self([0, 0, 0, 0, 0, 1, 0]);
    pub const LUMINOSITY: Self = Self([0, 0, 0, 0, 0, 0, 1]);

    /// Build from (length, mass, time, current) exponents.
    pub const fn lmti(l: i8, m: i8, t: i8, i: i8) -> Self {
        Self([l, m, t, i, 0, 0, 0])
    }

    #[inline]
    pub fn is_dimensionless(&self) -> bool {
        self.0 == [0; 7]
    }

    /// Dimension of a product, or None if an exponent leaves the `i8` range.
    pub fn checked_add(self, rhs: Self) -> Option<Self> {
        let mut out = self.0;
        for (a, b) in out.iter_mut().zip(rhs.0) {
            *a = a.checked_add(b)?;
        }
        Some(Self(out))
    }

    /// Dimension of a quotient.
    pub fn checked_sub(self, rhs: Self) -> Option<Self> {
        let mut out = self.0;
        for (a, b) in out.iter_mut().zip(rhs.0) {
            *a = a.checked_sub(b)?;
        }
        Some(Self(out))
    }

    /// Raise to an integer power.
    pub fn checked_powi(self, n: i32) -> Option<Self> {
        let mut out = self.0;
        for e in &mut out {
            *e = i32::from(*e)
                .checked_mul(n)
                .and_then(|v| i8::try_from(v).ok())?;
        }
        Some(Self(out))
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_dimensionless() {
            return write!(f, "1");
        }
        let mut first = true;
        for (sym, &e) in BASE_SYMBOLS.iter().zip(self.0.iter()) {
            if e == 0 {
                continue;
            }
            if !first {
                write!(f, " ")?;
            }
            first = false;
            if e == 1 {
                write!(f, "{}", sym)?;
            } else {
                write!(f, "{}^{}", sym, e)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arithmetic() {
        let velocity = Dimension::LENGTH.checked_sub(Dimension::TIME).unwrap();
        assert_eq!(velocity, Dimension::lmti(1, 0, -1, 0));
        let accel = velocity.checked_sub(Dimension::TIME).unwrap();
        assert_eq!(accel.to_string(), "L T^-2");
        assert!(velocity.checked_sub(velocity).unwrap().is_dimensionless());
        assert_eq!(Dimension::LENGTH.checked_powi(3), Some(Dimension::lmti(3, 0, 0, 0)));
        assert_eq!(velocity.checked_powi(-1), Some(Dimension::lmti(-1, 0, 1, 0)));
    }

    #[test]
    fn test_exponent_overflow() {
        assert_eq!(Dimension::LENGTH.checked_powi(256), None);
        assert_eq!(Dimension::LENGTH.checked_powi(i32::MAX), None);
        let big = Dimension::LENGTH.checked_powi(100).unwrap();
        assert_eq!(big.checked_add(big), None);
        assert_eq!(Dimension::LENGTH.checked_powi(-128).unwrap().checked_sub(Dimension::LENGTH), None);
        assert_eq!(Dimension::TIME.checked_powi(0), Some(Dimension::NONE));
    }
}
