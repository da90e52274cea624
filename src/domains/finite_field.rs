use std::fmt::{Display, Formatter};

use rug::ops::RemRounding;

use super::{integer::Integer, Field, Ring};

const HENSEL_LIFTING_MASK: [u8; 128] = [
    255, 85, 51, 73, 199, 93, 59, 17, 15, 229, 195, 89, 215, 237, 203, 33, 31, 117, 83, 105, 231,
    125, 91, 49, 47, 5, 227, 121, 247, 13, 235, 65, 63, 149, 115, 137, 7, 157, 123, 81, 79, 37, 3,
    153, 23, 45, 11, 97, 95, 181, 147, 169, 39, 189, 155, 113, 111, 69, 35, 185, 55, 77, 43, 129,
    127, 213, 179, 201, 71, 221, 187, 145, 143, 101, 67, 217, 87, 109, 75, 161, 159, 245, 211, 233,
    103, 253, 219, 177, 175, 133, 99, 249, 119, 141, 107, 193, 191, 21, 243, 9, 135, 29, 251, 209,
    207, 165, 131, 25, 151, 173, 139, 225, 223, 53, 19, 41, 167, 61, 27, 241, 239, 197, 163, 57,
    183, 205, 171, 1,
];

/// A 64-bit number representing a number in Montgomery form.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct FiniteFieldElement(pub(crate) u64);

/// A prime field `Z/pZ` over an odd prime `p < 2^63` that uses Montgomery modular arithmetic
/// to increase the performance of the multiplication operator.
///
/// Elements of the field are stored in Montgomery form and should only be
/// created through [FiniteField::to_element] or the [Ring] interface.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct FiniteField {
    p: u64,
    m: u64,
    one: FiniteFieldElement,
}

impl FiniteField {
    /// Create a new finite field. `p` must be an odd prime smaller than `2^63`.
    /// Primality is not checked here, use [is_prime_u64] for vetting.
    pub fn new(p: u64) -> FiniteField {
        assert!(p % 2 != 0 && p < 1 << 63, "{} is not a supported modulus", p);

        FiniteField {
            p,
            m: Self::inv_2_64(p),
            one: FiniteFieldElement(Self::get_one(p)),
        }
    }

    pub fn get_prime(&self) -> u64 {
        self.p
    }

    /// Returns the unit element in Montgomery form, i.e. 2^64 mod p.
    fn get_one(p: u64) -> u64 {
        (((1u128 << 64) % p as u128) as u64) % p
    }

    /// Returns -p^-1 mod 2^64.
    fn inv_2_64(p: u64) -> u64 {
        let mut ret: u64 = HENSEL_LIFTING_MASK[((p >> 1) & 127) as usize] as u64;
        ret = ret.wrapping_mul(p.wrapping_mul(ret).wrapping_add(2));
        ret = ret.wrapping_mul(p.wrapping_mul(ret).wrapping_add(2));
        ret = ret.wrapping_mul(p.wrapping_mul(ret).wrapping_add(2));
        ret
    }

    /// Convert a number `a` to its Montgomery form modulo `p`.
    #[inline(always)]
    pub fn to_element(&self, a: u64) -> FiniteFieldElement {
        FiniteFieldElement((((a as u128) << 64) % self.p as u128) as u64)
    }

    /// Map an arbitrary integer into the field.
    pub fn to_element_integer(&self, a: &Integer) -> FiniteFieldElement {
        let r = Integer::from(a.rem_euc(&Integer::from(self.p)));
        self.to_element(r.to_u64_wrapping())
    }

    /// Convert a number from Montgomery form to standard form in `[0, p)`.
    #[inline(always)]
    pub fn from_element(&self, a: &FiniteFieldElement) -> u64 {
        self.mont_mul(a, &FiniteFieldElement(1)).0
    }

    /// Convert a number from Montgomery form to its representative in `(-p/2, p/2]`.
    pub fn to_symmetric_integer(&self, a: &FiniteFieldElement) -> Integer {
        let i = self.from_element(a);
        if i > self.p / 2 {
            Integer::from(i) - self.p
        } else {
            Integer::from(i)
        }
    }

    #[inline(always)]
    fn mont_mul(&self, a: &FiniteFieldElement, b: &FiniteFieldElement) -> FiniteFieldElement {
        let t = a.0 as u128 * b.0 as u128;
        let m = (t as u64).wrapping_mul(self.m);
        let u = ((t.wrapping_add(m as u128 * self.p as u128)) >> 64) as u64;

        // correct for overflow
        if u < (t >> 64) as u64 {
            return FiniteFieldElement(u.wrapping_sub(self.p));
        }

        if u >= self.p {
            FiniteFieldElement(u - self.p)
        } else {
            FiniteFieldElement(u)
        }
    }
}

impl Display for FiniteField {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Z_{}", self.p)
    }
}

impl Ring for FiniteField {
    type Element = FiniteFieldElement;

    #[inline(always)]
    fn add(&self, a: &Self::Element, b: &Self::Element) -> Self::Element {
        let t = a.0 as u128 + b.0 as u128;

        if t >= self.p as u128 {
            FiniteFieldElement((t - self.p as u128) as u64)
        } else {
            FiniteFieldElement(t as u64)
        }
    }

    #[inline(always)]
    fn sub(&self, a: &Self::Element, b: &Self::Element) -> Self::Element {
        if a.0 >= b.0 {
            FiniteFieldElement(a.0 - b.0)
        } else {
            FiniteFieldElement(a.0 + (self.p - b.0))
        }
    }

    #[inline(always)]
    fn mul(&self, a: &Self::Element, b: &Self::Element) -> Self::Element {
        self.mont_mul(a, b)
    }

    #[inline]
    fn neg(&self, a: &Self::Element) -> Self::Element {
        if a.0 == 0 {
            *a
        } else {
            FiniteFieldElement(self.p - a.0)
        }
    }

    #[inline]
    fn zero(&self) -> Self::Element {
        FiniteFieldElement(0)
    }

    #[inline]
    fn one(&self) -> Self::Element {
        self.one
    }

    fn nth(&self, n: i64) -> Self::Element {
        let r = (n as i128).rem_euclid(self.p as i128) as u64;
        self.to_element(r)
    }

    #[inline]
    fn is_zero(&self, a: &Self::Element) -> bool {
        a.0 == 0
    }

    #[inline]
    fn is_one(&self, a: &Self::Element) -> bool {
        *a == self.one
    }

    fn format(
        &self,
        element: &Self::Element,
        _in_product: bool,
        f: &mut Formatter<'_>,
    ) -> std::fmt::Result {
        write!(f, "{}", self.from_element(element))
    }
}

impl Field for FiniteField {
    /// Computes x^-1 mod p using the extended Euclidean algorithm.
    fn try_inv(&self, x: &Self::Element) -> Option<Self::Element> {
        if x.0 == 0 {
            return None;
        }

        // apply multiplication with 1 twice to get the correct scaling of R=2^64
        // see the paper [Montgomery Arithmetic from a Software Perspective](https://eprint.iacr.org/2017/1057.pdf).
        let x_mont = self
            .mont_mul(
                &self.mont_mul(x, &FiniteFieldElement(1)),
                &FiniteFieldElement(1),
            )
            .0;

        // extended Euclidean algorithm: a x + b p = gcd(x, p) = 1 or a x = 1 (mod p)
        let mut u1: u64 = 1;
        let mut u3 = x_mont;
        let mut v1: u64 = 0;
        let mut v3 = self.p;
        let mut even_iter: bool = true;

        while v3 != 0 {
            let q = u3 / v3;
            let t3 = u3 % v3;
            let t1 = u1 + q * v1;
            u1 = v1;
            v1 = t1;
            u3 = v3;
            v3 = t3;
            even_iter = !even_iter;
        }

        if u3 != 1 {
            return None;
        }

        if even_iter {
            Some(FiniteFieldElement(u1))
        } else {
            Some(FiniteFieldElement(self.p - u1))
        }
    }
}

/// Do a deterministic Miller test to check if `n` is a prime.
/// Since `n` is a `u64`, a basis of only 7 witnesses has to be tested.
///
/// Based on [Wojciech Izykowski's implementation](https://github.com/wizykowski/miller-rabin).
pub fn is_prime_u64(n: u64) -> bool {
    // shortest SPRP basis from Jim Sinclair for testing primality of u64
    let witnesses: [u64; 7] = [2, 325, 9375, 28178, 450775, 9780504, 1795265022];

    if n < 2 {
        return false;
    }

    if n % 2 == 0 {
        return n == 2;
    }

    if n >= 1 << 63 {
        // outside of the supported range of the Montgomery field
        return is_prime_trial_division(n);
    }

    let mut s = 0;
    let mut d = n - 1;
    while d % 2 == 0 {
        d /= 2;
        s += 1;
    }

    let f = FiniteField::new(n);
    let neg_one = f.neg(&f.one());

    'test: for a in witnesses {
        let a = f.to_element(a);

        if a.0 == 0 {
            continue;
        }

        let mut x = f.pow(&a, d);

        if x == f.one() || x == neg_one {
            continue;
        }

        for _ in 0..s {
            x = f.mul(&x, &x);

            if x == f.one() {
                return false;
            }
            if x == neg_one {
                continue 'test;
            }
        }

        return false;
    }

    true
}

fn is_prime_trial_division(n: u64) -> bool {
    let mut i = 3u64;
    while i.saturating_mul(i) <= n {
        if n % i == 0 {
            return false;
        }
        i += 2;
    }
    true
}

#[cfg(test)]
mod test {
    use crate::domains::{integer::Integer, Field, Ring};

    use super::{is_prime_u64, FiniteField};

    #[test]
    fn arithmetic() {
        let f = FiniteField::new(7);
        let a = f.to_element(5);
        let b = f.to_element(4);
        assert_eq!(f.from_element(&f.add(&a, &b)), 2);
        assert_eq!(f.from_element(&f.sub(&b, &a)), 6);
        assert_eq!(f.from_element(&f.mul(&a, &b)), 6);
        assert_eq!(f.from_element(&f.neg(&f.zero())), 0);
        assert_eq!(f.from_element(&f.add(&f.to_element(3), &f.to_element(4))), 0);
        assert_eq!(f.from_element(&f.nth(-1)), 6);
    }

    #[test]
    fn inverse() {
        let f = FiniteField::new(530560271);
        for i in [1u64, 2, 3, 12345, 530560270] {
            let a = f.to_element(i);
            assert!(f.is_one(&f.mul(&a, &f.inv(&a))));
        }
        assert!(f.try_inv(&f.zero()).is_none());
    }

    #[test]
    fn symmetric() {
        let f = FiniteField::new(5);
        assert_eq!(f.to_symmetric_integer(&f.to_element(3)), -2);
        assert_eq!(f.to_symmetric_integer(&f.to_element(2)), 2);
        assert_eq!(
            f.from_element(&f.to_element_integer(&Integer::from(-1))),
            4
        );
        // -2^100 = -1 mod 5
        let big = -(Integer::from(1) << 100u32);
        assert_eq!(f.from_element(&f.to_element_integer(&big)), 4);
    }

    #[test]
    fn primality() {
        let primes: Vec<u64> = (0..50).filter(|n| is_prime_u64(*n)).collect();
        assert_eq!(
            primes,
            [2, 3, 5, 7, 11, 13, 17, 19, 23, 29, 31, 37, 41, 43, 47]
        );
        assert!(is_prime_u64(530560271));
        assert!(!is_prime_u64(530560271 * 3));
    }
}
