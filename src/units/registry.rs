//! Unit registry and unit expressions.
//!
//! A [`UnitRegistry`] resolves unit strings such as `"ms"`, `"kHz"` or
//! `"kg*m/s^2"` into canonical [`Unit`] values. Conversion between two units
//! is a pure function of their dimensions and scale factors; the registry is
//! only needed to parse strings.

use smallvec::SmallVec;
use std::collections::HashMap;
use std::fmt;

use super::Dimension;
use crate::util::{Error, Result};

/// SI prefixes, two-letter ones first so `da` wins over `d`.
const PREFIXES: &[(&str, &str, f64)] = &[
    ("da", "da", 1e1),
    ("Y", "Y", 1e24),
    ("Z", "Z", 1e21),
    ("E", "E", 1e18),
    ("P", "P", 1e15),
    ("T", "T", 1e12),
    ("G", "G", 1e9),
    ("M", "M", 1e6),
    ("k", "k", 1e3),
    ("h", "h", 1e2),
    ("d", "d", 1e-1),
    ("c", "c", 1e-2),
    ("m", "m", 1e-3),
    ("u", "u", 1e-6),
    ("µ", "u", 1e-6),
    ("μ", "u", 1e-6),
    ("n", "n", 1e-9),
    ("p", "p", 1e-12),
    ("f", "f", 1e-15),
    ("a", "a", 1e-18),
    ("z", "z", 1e-21),
    ("y", "y", 1e-24),
];

/// Elementary charge, J per eV.
const ELECTRON_VOLT: f64 = 1.602_176_634e-19;

/// One factor of a unit expression: a canonical symbol and its exponent.
#[derive(Clone, Debug, PartialEq, Eq)]
struct Term {
    symbol: String,
    exp: i32,
}

/// A canonical physical unit.
///
/// Units compare equal when their canonical terms are equal, so `"s*m"`
/// and `"m*s"` are the same unit, while `"mm"` and `"m"` are different
/// (but compatible) units.
#[derive(Clone, Debug)]
pub struct Unit {
    terms: SmallVec<[Term; 2]>,
    dimension: Dimension,
    factor: f64,
}

impl Unit {
    /// The dimensionless unit (empty symbol).
    pub fn dimensionless() -> Self {
        Self { terms: SmallVec::new(), dimension: Dimension::NONE, factor: 1.0 }
    }

    fn atom(symbol: String, dimension: Dimension, factor: f64) -> Self {
        let mut terms = SmallVec::new();
        terms.push(Term { symbol, exp: 1 });
        Self { terms, dimension, factor }
    }

    /// Physical dimension.
    #[inline]
    pub fn dimension(&self) -> Dimension {
        self.dimension
    }

    /// Scale to the coherent SI unit of the same dimension.
    #[inline]
    pub fn factor(&self) -> f64 {
        self.factor
    }

    /// True for the empty unit.
    pub fn is_dimensionless(&self) -> bool {
        self.terms.is_empty()
    }

    /// True if both units measure the same physical dimension.
    pub fn is_compatible(&self, other: &Unit) -> bool {
        self.dimension == other.dimension
    }

    /// Canonical string form, parseable back by the registry.
    pub fn symbol(&self) -> String {
        let render = |t: &Term, exp: i32| {
            if exp == 1 {
                t.symbol.clone()
            } else {
                format!("{}^{}", t.symbol, exp)
            }
        };
        let num: Vec<String> = self
            .terms
            .iter()
            .filter(|t| t.exp > 0)
            .map(|t| render(t, t.exp))
            .collect();
        let den: Vec<String> = self
            .terms
            .iter()
            .filter(|t| t.exp < 0)
            .map(|t| render(t, -t.exp))
            .collect();

        let mut out = if num.is_empty() && !den.is_empty() {
            "1".to_string()
        } else {
            num.join("*")
        };
        for d in den {
            out.push('/');
            out.push_str(&d);
        }
        out
    }

    /// Product of two units. Fails if an exponent overflows.
    pub fn mul(&self, other: &Unit) -> Result<Unit> {
        let overflow = || Error::UnitExponent(format!("({})*({})", self, other));
        let mut terms = self.terms.clone();
        for t in &other.terms {
            match terms.iter_mut().find(|x| x.symbol == t.symbol) {
                Some(x) => x.exp = x.exp.checked_add(t.exp).ok_or_else(overflow)?,
                None => terms.push(t.clone()),
            }
        }
        terms.retain(|t| t.exp != 0);
        terms.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        Ok(Unit {
            terms,
            dimension: self.dimension.checked_add(other.dimension).ok_or_else(overflow)?,
            factor: self.factor * other.factor,
        })
    }

    /// Quotient of two units.
    pub fn div(&self, other: &Unit) -> Result<Unit> {
        self.mul(&other.powi(-1)?)
    }

    /// Integer power.
    pub fn powi(&self, n: i32) -> Result<Unit> {
        if n == 0 {
            return Ok(Unit::dimensionless());
        }
        let overflow = || Error::UnitExponent(format!("({})^{}", self, n));
        let terms: SmallVec<[Term; 2]> = self
            .terms
            .iter()
            .map(|t| {
                let exp = t.exp.checked_mul(n).ok_or_else(overflow)?;
                Ok(Term { symbol: t.symbol.clone(), exp })
            })
            .collect::<Result<_>>()?;
        Ok(Unit {
            terms,
            dimension: self.dimension.checked_powi(n).ok_or_else(overflow)?,
            factor: self.factor.powi(n),
        })
    }

    /// Multiplier taking a magnitude in `self` to a magnitude in `to`.
    pub fn conversion_factor(&self, to: &Unit) -> Result<f64> {
        if !self.is_compatible(to) {
            return Err(Error::IncompatibleUnit {
                from: self.symbol(),
                to: to.symbol(),
            });
        }
        if self == to {
            return Ok(1.0);
        }
        Ok(self.factor / to.factor)
    }
}

impl PartialEq for Unit {
    fn eq(&self, other: &Self) -> bool {
        self.terms == other.terms
    }
}

impl Default for Unit {
    fn default() -> Self {
        Self::dimensionless()
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

#[derive(Clone, Debug)]
struct UnitDef {
    dimension: Dimension,
    factor: f64,
    prefixable: bool,
}

/// Registry of named units.
#[derive(Clone, Debug)]
pub struct UnitRegistry {
    units: HashMap<String, UnitDef>,
    aliases: HashMap<String, String>,
}

impl UnitRegistry {
    /// Registry with no units at all.
    pub fn empty() -> Self {
        Self { units: HashMap::new(), aliases: HashMap::new() }
    }

    /// Registry with the SI base and derived units plus the common
    /// laboratory units.
    pub fn with_si() -> Self {
        let mut reg = Self::empty();
        let d = Dimension::lmti;

        // Base units. "g" carries the prefix, so kg is resolved as k + g.
        reg.define("m", Dimension::LENGTH, 1.0, true);
        reg.define("g", Dimension::MASS, 1e-3, true);
        reg.define("s", Dimension::TIME, 1.0, true);
        reg.define("A", Dimension::CURRENT, 1.0, true);
        reg.define("K", Dimension::TEMPERATURE, 1.0, true);
        reg.define("mol", Dimension::AMOUNT, 1.0, true);
        reg.define("cd", Dimension::LUMINOSITY, 1.0, true);

        // Derived
        reg.define("Hz", d(0, 0, -1, 0), 1.0, true);
        reg.define("N", d(1, 1, -2, 0), 1.0, true);
        reg.define("Pa", d(-1, 1, -2, 0), 1.0, true);
        reg.define("J", d(2, 1, -2, 0), 1.0, true);
        reg.define("W", d(2, 1, -3, 0), 1.0, true);
        reg.define("C", d(0, 0, 1, 1), 1.0, true);
        reg.define("V", d(2, 1, -3, -1), 1.0, true);
        reg.define("ohm", d(2, 1, -3, -2), 1.0, true);
        reg.define("S", d(-2, -1, 3, 2), 1.0, true);
        reg.define("F", d(-2, -1, 4, 2), 1.0, true);
        reg.define("Wb", d(2, 1, -2, -1), 1.0, true);
        reg.define("T", d(0, 1, -2, -1), 1.0, true);
        reg.define("H", d(2, 1, -2, -2), 1.0, true);

        // Non-SI
        reg.define("eV", d(2, 1, -2, 0), ELECTRON_VOLT, true);
        reg.define("L", d(3, 0, 0, 0), 1e-3, true);
        reg.define("bar", d(-1, 1, -2, 0), 1e5, true);
        reg.define("Torr", d(-1, 1, -2, 0), 101_325.0 / 760.0, false);
        reg.define("Å", Dimension::LENGTH, 1e-10, false);
        reg.define("min", Dimension::TIME, 60.0, false);
        reg.define("h", Dimension::TIME, 3600.0, false);
        reg.define("rad", Dimension::NONE, 1.0, true);
        reg.define("deg", Dimension::NONE, std::f64::consts::PI / 180.0, false);
        reg.define("counts", Dimension::NONE, 1.0, false);
        reg.define("%", Dimension::NONE, 1e-2, false);

        for (alias, target) in [
            ("meter", "m"),
            ("metre", "m"),
            ("gram", "g"),
            ("second", "s"),
            ("sec", "s"),
            ("ampere", "A"),
            ("kelvin", "K"),
            ("hertz", "Hz"),
            ("newton", "N"),
            ("pascal", "Pa"),
            ("joule", "J"),
            ("watt", "W"),
            ("volt", "V"),
            ("Ω", "ohm"),
            ("tesla", "T"),
            ("liter", "L"),
            ("litre", "L"),
            ("angstrom", "Å"),
            ("minute", "min"),
            ("hour", "h"),
            ("radian", "rad"),
            ("degree", "deg"),
            ("°", "deg"),
            ("count", "counts"),
            ("cts", "counts"),
            ("percent", "%"),
        ] {
            reg.alias(alias, target);
        }
        reg
    }

    /// Add a unit.
    pub fn define(&mut self, symbol: &str, dimension: Dimension, factor: f64, prefixable: bool) {
        self.units.insert(
            symbol.to_string(),
            UnitDef { dimension, factor, prefixable },
        );
    }

    /// Add another spelling for an existing unit.
    pub fn alias(&mut self, alias: &str, target: &str) {
        self.aliases.insert(alias.to_string(), target.to_string());
    }

    /// Look up a single unprefixed name, following aliases.
    fn lookup(&self, name: &str) -> Option<(&str, &UnitDef)> {
        let canonical = self.aliases.get(name).map(String::as_str).unwrap_or(name);
        self.units
            .get_key_value(canonical)
            .map(|(k, def)| (k.as_str(), def))
    }

    /// Resolve one atom, possibly prefixed.
    fn resolve(&self, atom: &str) -> Result<Unit> {
        if let Some((symbol, def)) = self.lookup(atom) {
            return Ok(Unit::atom(symbol.to_string(), def.dimension, def.factor));
        }
        for &(prefix, canonical_prefix, scale) in PREFIXES {
            let Some(rest) = atom.strip_prefix(prefix) else {
                continue;
            };
            if rest.is_empty() {
                continue;
            }
            if let Some((symbol, def)) = self.lookup(rest) {
                if def.prefixable {
                    return Ok(Unit::atom(
                        format!("{}{}", canonical_prefix, symbol),
                        def.dimension,
                        def.factor * scale,
                    ));
                }
            }
        }
        Err(Error::UnknownUnit(atom.to_string()))
    }

    /// Parse a unit expression.
    ///
    /// Grammar: terms joined by `*` or `/` (left-associative), each term an
    /// optionally prefixed unit name with an optional `^n` (or `**n`)
    /// integer exponent. `"1"` is the unit term, the empty string is
    /// dimensionless.
    pub fn parse(&self, expr: &str) -> Result<Unit> {
        let expr = expr.trim();
        if expr.is_empty() || expr == "dimensionless" {
            return Ok(Unit::dimensionless());
        }
        let normalized = expr.replace("**", "^").replace('·', "*");

        let mut parts: Vec<(i32, String)> = Vec::new();
        let mut sign = 1;
        let mut current = String::new();
        for c in normalized.chars() {
            match c {
                '*' | '/' => {
                    parts.push((sign, std::mem::take(&mut current)));
                    sign = if c == '/' { -1 } else { 1 };
                }
                _ => current.push(c),
            }
        }
        parts.push((sign, current));

        let mut unit = Unit::dimensionless();
        for (sign, term) in parts {
            let term = term.trim();
            if term.is_empty() {
                return Err(Error::UnknownUnit(expr.to_string()));
            }
            let (name, exp) = match term.split_once('^') {
                Some((name, exp)) => {
                    let exp: i32 = exp
                        .trim()
                        .parse()
                        .map_err(|_| Error::UnknownUnit(expr.to_string()))?;
                    (name.trim(), exp)
                }
                None => (term, 1),
            };
            if name == "1" {
                continue;
            }
            let atom = self.resolve(name)?;
            let exp = exp
                .checked_mul(sign)
                .ok_or_else(|| Error::UnitExponent(expr.to_string()))?;
            unit = unit
                .mul(&atom.powi(exp)?)
                .map_err(|_| Error::UnitExponent(expr.to_string()))?;
        }
        Ok(unit)
    }

    /// Parse `target` and convert a quantity to it.
    pub fn convert(&self, quantity: &super::Quantity, target: &str) -> Result<super::Quantity> {
        let unit = self.parse(target)?;
        quantity.convert(&unit)
    }
}

impl Default for UnitRegistry {
    fn default() -> Self {
        Self::with_si()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::ErrorKind;

    fn reg() -> UnitRegistry {
        UnitRegistry::default()
    }

    #[test]
    fn test_parse_prefixed() {
        let r = reg();
        let ms = r.parse("ms").unwrap();
        assert_eq!(ms.symbol(), "ms");
        assert_eq!(ms.dimension(), Dimension::TIME);
        assert!((ms.factor() - 1e-3).abs() < 1e-18);

        assert_eq!(r.parse("µm").unwrap(), r.parse("um").unwrap());
        assert_eq!(r.parse("kg").unwrap().factor(), 1.0);
        assert_eq!(r.parse("meter").unwrap().symbol(), "m");
    }

    #[test]
    fn test_exact_match_beats_prefix() {
        let r = reg();
        assert_eq!(r.parse("min").unwrap().factor(), 60.0);
        assert_eq!(r.parse("h").unwrap().factor(), 3600.0);
        assert_eq!(r.parse("T").unwrap().dimension(), Dimension::lmti(0, 1, -2, -1));
        assert_eq!(r.parse("Pa").unwrap().factor(), 1.0);
    }

    #[test]
    fn test_unknown_unit() {
        let r = reg();
        assert!(matches!(r.parse("furlong"), Err(Error::UnknownUnit(_))));
        assert!(matches!(r.parse("kmin"), Err(Error::UnknownUnit(_))));
        assert!(matches!(r.parse("m/"), Err(Error::UnknownUnit(_))));
        assert!(matches!(r.parse("m^x"), Err(Error::UnknownUnit(_))));
    }

    #[test]
    fn test_expressions() {
        let r = reg();
        let accel = r.parse("m/s^2").unwrap();
        assert_eq!(accel.dimension(), Dimension::lmti(1, 0, -2, 0));
        assert_eq!(accel.symbol(), "m/s^2");
        assert_eq!(r.parse(&accel.symbol()).unwrap(), accel);

        let n = r.parse("kg*m/s^2").unwrap();
        assert!(n.is_compatible(&r.parse("N").unwrap()));

        let per_s = r.parse("1/s").unwrap();
        assert_eq!(per_s.symbol(), "1/s");
        assert!(per_s.is_compatible(&r.parse("Hz").unwrap()));

        assert_eq!(r.parse("s*m").unwrap(), r.parse("m*s").unwrap());
        assert!(r.parse("").unwrap().is_dimensionless());
    }

    #[test]
    fn test_conversion_factor() {
        let r = reg();
        let s = r.parse("s").unwrap();
        let ms = r.parse("ms").unwrap();
        assert!((s.conversion_factor(&ms).unwrap() - 1000.0).abs() < 1e-9);

        let m = r.parse("m").unwrap();
        match s.conversion_factor(&m) {
            Err(Error::IncompatibleUnit { from, to }) => {
                assert_eq!(from, "s");
                assert_eq!(to, "m");
            }
            other => panic!("expected incompatible units, got {:?}", other),
        }
    }

    #[test]
    fn test_mul_div_cancel() {
        let r = reg();
        let m = r.parse("m").unwrap();
        let s = r.parse("s").unwrap();
        let v = m.div(&s).unwrap();
        assert_eq!(v.symbol(), "m/s");
        assert!(v.mul(&s).unwrap().eq(&m));
        assert!(m.div(&m).unwrap().is_dimensionless());
    }

    #[test]
    fn test_exponent_overflow() {
        let r = reg();
        let err = r.parse("m^256").unwrap_err();
        assert!(matches!(err, Error::UnitExponent(_)));
        assert_eq!(err.kind(), ErrorKind::Unit);
        assert!(matches!(r.parse("m^100*m^100"), Err(Error::UnitExponent(_))));
        assert!(matches!(r.parse("m^-2147483648"), Err(Error::UnitExponent(_))));
        assert!(matches!(r.parse("m^2147483648"), Err(Error::UnknownUnit(_))));

        // the largest exponent still parses but is not dimensionless
        let big = r.parse("m^127").unwrap();
        assert!(matches!(
            big.conversion_factor(&Unit::dimensionless()),
            Err(Error::IncompatibleUnit { .. })
        ));
        assert!(matches!(big.mul(&r.parse("m").unwrap()), Err(Error::UnitExponent(_))));
        assert!(matches!(big.powi(2), Err(Error::UnitExponent(_))));
        assert!(r.parse("m^127/m^127").unwrap().is_dimensionless());
    }
}
