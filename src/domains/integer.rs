use std::fmt::{Display, Formatter};

use rug::{ops::RemRounding, Integer as MultiPrecisionInteger};

use super::Ring;

/// Integers are stored with arbitrary precision.
pub type Integer = MultiPrecisionInteger;

/// The integer ring.
pub type Z = IntegerRing;
/// The integer ring.
pub const Z: IntegerRing = IntegerRing;

/// The ring of arbitrary precision integers.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default)]
pub struct IntegerRing;

impl IntegerRing {
    pub const fn new() -> IntegerRing {
        IntegerRing
    }
}

impl Display for IntegerRing {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str("Z")
    }
}

impl Ring for IntegerRing {
    type Element = Integer;

    #[inline]
    fn add(&self, a: &Self::Element, b: &Self::Element) -> Self::Element {
        Integer::from(a + b)
    }

    #[inline]
    fn sub(&self, a: &Self::Element, b: &Self::Element) -> Self::Element {
        Integer::from(a - b)
    }

    #[inline]
    fn mul(&self, a: &Self::Element, b: &Self::Element) -> Self::Element {
        Integer::from(a * b)
    }

    #[inline]
    fn neg(&self, a: &Self::Element) -> Self::Element {
        Integer::from(-a)
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
        Integer::new()
    }

    #[inline]
    fn one(&self) -> Self::Element {
        Integer::from(1)
    }

    #[inline]
    fn nth(&self, n: i64) -> Self::Element {
        Integer::from(n)
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

/// Perform the symmetric mod `p` on `a`, yielding a representative in `(-p/2, p/2]`.
pub fn symmetric_mod(a: &Integer, p: &Integer) -> Integer {
    let mut c = Integer::from(a % p);
    if c.cmp0().is_lt() {
        c += p;
    }

    if Integer::from(&c * 2u32) > *p {
        c - p
    } else {
        c
    }
}

/// Use Garner's algorithm for the Chinese remainder theorem
/// to reconstruct an `x` that satisfies `n1 = x % p1` and `n2 = x % p2`,
/// where `p1` and `p2` are coprime.
///
/// The result is in the range `[0, p1*p2)`, so that the routine can be folded
/// over any number of moduli. Use [symmetric_mod] on the final value to obtain the
/// representative with minimal absolute value. Returns `None` if `p1` is not invertible
/// modulo `p2`.
pub fn chinese_remainder(n1: &Integer, n2: &Integer, p1: &Integer, p2: &Integer) -> Option<Integer> {
    let n1 = Integer::from(n1.rem_euc(p1));
    let n2 = Integer::from(n2.rem_euc(p2));

    // convert to mixed-radix notation
    let gamma1 = Integer::from(p1 % p2).invert(p2).ok()?;
    let v1 = Integer::from((n2 - &n1) * gamma1).rem_euc(p2);

    // convert to standard representation
    Some(v1 * p1 + n1)
}

#[cfg(test)]
mod test {
    use super::{chinese_remainder, symmetric_mod, Integer};

    #[test]
    fn symmetric_representatives() {
        let p = Integer::from(7);
        let reps: Vec<_> = (0..7)
            .map(|i| symmetric_mod(&Integer::from(i), &p))
            .collect();
        assert_eq!(reps, [0, 1, 2, 3, -3, -2, -1]);
        assert_eq!(symmetric_mod(&Integer::from(-10), &p), -3);
    }

    #[test]
    fn garner() {
        let x = chinese_remainder(
            &Integer::from(1),
            &Integer::from(2),
            &Integer::from(3),
            &Integer::from(5),
        )
        .unwrap();
        assert_eq!(x, 7);

        let x = chinese_remainder(
            &Integer::from(-1),
            &Integer::from(-1),
            &Integer::from(3),
            &Integer::from(7),
        )
        .unwrap();
        assert_eq!(symmetric_mod(&x, &Integer::from(21)), -1);

        // residues outside [0, p) are normalised first
        let x = chinese_remainder(
            &Integer::from(-4),
            &Integer::from(13),
            &Integer::from(3),
            &Integer::from(5),
        )
        .unwrap();
        assert_eq!(x, 8);
    }

    #[test]
    fn not_coprime() {
        assert!(chinese_remainder(
            &Integer::from(1),
            &Integer::from(2),
            &Integer::from(3),
            &Integer::from(3),
        )
        .is_none());
    }
}
