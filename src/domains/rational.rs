use std::fmt::{Display, Formatter};

use rug::Rational as MultiPrecisionRational;

use super::{integer::Integer, Field, Ring};

/// Rational numbers are stored with arbitrary precision.
pub type Rational = MultiPrecisionRational;

/// The field of rational numbers.
pub type Q = RationalField;
/// The field of rational numbers.
pub const Q: RationalField = RationalField;

/// The field of rational numbers.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default)]
pub struct RationalField;

impl RationalField {
    pub const fn new() -> RationalField {
        RationalField
    }
}

impl Display for RationalField {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str("Q")
    }
}

impl Ring for RationalField {
    type Element = Rational;

    #[inline]
    fn add(&self, a: &Self::Element, b: &Self::Element) -> Self::Element {
        Rational::from(a + b)
    }

    #[inline]
    fn sub(&self, a: &Self::Element, b: &Self::Element) -> Self::Element {
        Rational::from(a - b)
    }

    #[inline]
    fn mul(&self, a: &Self::Element, b: &Self::Element) -> Self::Element {
        Rational::from(a * b)
    }

    #[inline]
    fn neg(&self, a: &Self::Element) -> Self::Element {
        Rational::from(-a)
    }

    #[inline]
    fn add_assign(&self, a: &mut Self::Element, b: &Self::Element) {
        *a += b;
    }

    #[inline]
    fn sub_assign(&self, a: &mut Self::Element, b: &Self::Element) {
        *a -= b;
    }

    #[inline]
    fn mul_assign(&self, a: &mut Self::Element, b: &Self::Element) {
        *a *= b;
    }

    #[inline]
    fn zero(&self) -> Self::Element {
        Rational::new()
    }

    #[inline]
    fn one(&self) -> Self::Element {
        Rational::from(1)
    }

    #[inline]
    fn nth(&self, n: i64) -> Self::Element {
        Rational::from(n)
    }

    #[inline]
    fn is_zero(&self, a: &Self::Element) -> bool {
        a.cmp0().is_eq()
    }

    #[inline]
    fn is_one(&self, a: &Self::Element) -> bool {
        *a == 1
    }

    fn format(
        &self,
        element: &Self::Element,
        _in_product: bool,
        f: &mut Formatter<'_>,
    ) -> std::fmt::Result {
        Display::fmt(element, f)
    }
}

impl Field for RationalField {
    fn try_inv(&self, a: &Self::Element) -> Option<Self::Element> {
        if a.cmp0().is_eq() {
            None
        } else {
            Some(Rational::from(a.recip_ref()))
        }
    }
}

/// Returns the numerator if the rational number is an integer.
pub fn to_integer(r: &Rational) -> Option<Integer> {
    if *r.denom() == 1 {
        Some(r.numer().clone())
    } else {
        None
    }
}
