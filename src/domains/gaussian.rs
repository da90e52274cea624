use std::fmt::{Display, Formatter};

use super::{
    integer::{IntegerRing, Z},
    rational::{RationalField, Q},
    Field, Ring,
};

/// The field `Q(i)` of Gaussian rationals.
pub type QI = GaussianRing<RationalField>;
/// The field `Q(i)` of Gaussian rationals.
pub const QI: QI = GaussianRing::new(Q);

/// The ring `Z[i]` of Gaussian integers.
pub type ZI = GaussianRing<IntegerRing>;
/// The ring `Z[i]` of Gaussian integers.
pub const ZI: ZI = GaussianRing::new(Z);

/// An element `re + im * I` of a Gaussian extension, with `I^2 = -1`.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct Gaussian<T> {
    pub re: T,
    pub im: T,
}

impl<T> Gaussian<T> {
    pub fn new(re: T, im: T) -> Gaussian<T> {
        Gaussian { re, im }
    }
}

/// The ring `R[I]/(I^2 + 1)`.
///
/// Over the integers this is the ring of Gaussian integers, over the rationals it is
/// the field `Q(i)` and over a prime field `Z_p` with `p = 3 mod 4` it is the field
/// with `p^2` elements, since `-1` is not a square modulo `p`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct GaussianRing<R: Ring> {
    base: R,
}

impl<R: Ring> GaussianRing<R> {
    pub const fn new(base: R) -> GaussianRing<R> {
        GaussianRing { base }
    }

    pub fn base(&self) -> &R {
        &self.base
    }

    /// Embed an element of the base ring.
    pub fn from_real(&self, re: R::Element) -> Gaussian<R::Element> {
        Gaussian::new(re, self.base.zero())
    }

    /// The imaginary unit `I`.
    pub fn i(&self) -> Gaussian<R::Element> {
        Gaussian::new(self.base.zero(), self.base.one())
    }

    pub fn conjugate(&self, a: &Gaussian<R::Element>) -> Gaussian<R::Element> {
        Gaussian::new(a.re.clone(), self.base.neg(&a.im))
    }

    /// Compute `re^2 + im^2`.
    pub fn norm(&self, a: &Gaussian<R::Element>) -> R::Element {
        self.base
            .add(&self.base.mul(&a.re, &a.re), &self.base.mul(&a.im, &a.im))
    }

    pub fn is_real(&self, a: &Gaussian<R::Element>) -> bool {
        self.base.is_zero(&a.im)
    }
}

impl<R: Ring> Display for GaussianRing<R> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}[I]", self.base)
    }
}

impl<R: Ring> Ring for GaussianRing<R> {
    type Element = Gaussian<R::Element>;

    fn add(&self, a: &Self::Element, b: &Self::Element) -> Self::Element {
        Gaussian::new(self.base.add(&a.re, &b.re), self.base.add(&a.im, &b.im))
    }

    fn sub(&self, a: &Self::Element, b: &Self::Element) -> Self::Element {
        Gaussian::new(self.base.sub(&a.re, &b.re), self.base.sub(&a.im, &b.im))
    }

    fn mul(&self, a: &Self::Element, b: &Self::Element) -> Self::Element {
        if self.base.is_zero(&a.im) && self.base.is_zero(&b.im) {
            return Gaussian::new(self.base.mul(&a.re, &b.re), self.base.zero());
        }

        let re = self
            .base
            .sub(&self.base.mul(&a.re, &b.re), &self.base.mul(&a.im, &b.im));
        let im = self
            .base
            .add(&self.base.mul(&a.re, &b.im), &self.base.mul(&a.im, &b.re));
        Gaussian::new(re, im)
    }

    fn neg(&self, a: &Self::Element) -> Self::Element {
        Gaussian::new(self.base.neg(&a.re), self.base.neg(&a.im))
    }

    fn add_assign(&self, a: &mut Self::Element, b: &Self::Element) {
        self.base.add_assign(&mut a.re, &b.re);
        self.base.add_assign(&mut a.im, &b.im);
    }

    fn sub_assign(&self, a: &mut Self::Element, b: &Self::Element) {
        self.base.sub_assign(&mut a.re, &b.re);
        self.base.sub_assign(&mut a.im, &b.im);
    }

    fn zero(&self) -> Self::Element {
        Gaussian::new(self.base.zero(), self.base.zero())
    }

    fn one(&self) -> Self::Element {
        Gaussian::new(self.base.one(), self.base.zero())
    }

    fn nth(&self, n: i64) -> Self::Element {
        Gaussian::new(self.base.nth(n), self.base.zero())
    }

    fn is_zero(&self, a: &Self::Element) -> bool {
        self.base.is_zero(&a.re) && self.base.is_zero(&a.im)
    }

    fn is_one(&self, a: &Self::Element) -> bool {
        self.base.is_one(&a.re) && self.base.is_zero(&a.im)
    }

    fn format(
        &self,
        element: &Self::Element,
        in_product: bool,
        f: &mut Formatter<'_>,
    ) -> std::fmt::Result {
        if self.base.is_zero(&element.im) {
            return self.base.format(&element.re, in_product, f);
        }

        if self.base.is_zero(&element.re) {
            return write!(f, "{}*I", self.base.printer(&element.im).in_product());
        }

        if in_product {
            f.write_str("(")?;
        }

        self.base.format(&element.re, false, f)?;
        let im = self.base.printer(&element.im).in_product().to_string();
        if im.starts_with('-') {
            write!(f, "{}*I", im)?;
        } else {
            write!(f, "+{}*I", im)?;
        }

        if in_product {
            f.write_str(")")?;
        }
        Ok(())
    }
}

impl<R: Field> Field for GaussianRing<R> {
    /// Compute `conj(a) / norm(a)`. Returns `None` when the norm vanishes, which
    /// happens for non-zero elements only if `-1` is a square in the base field.
    fn try_inv(&self, a: &Self::Element) -> Option<Self::Element> {
        let n = self.base.try_inv(&self.norm(a))?;
        let c = self.conjugate(a);
        Some(Gaussian::new(
            self.base.mul(&c.re, &n),
            self.base.mul(&c.im, &n),
        ))
    }
}

#[cfg(test)]
mod test {
    use crate::domains::{
        finite_field::FiniteField,
        integer::{Integer, Z},
        rational::{Rational, Q},
        Field, Ring,
    };

    use super::{Gaussian, GaussianRing};

    #[test]
    fn multiplication() {
        let r = GaussianRing::new(Z);
        let a = Gaussian::new(Integer::from(1), Integer::from(2));
        let b = Gaussian::new(Integer::from(3), Integer::from(-1));
        assert_eq!(
            r.mul(&a, &b),
            Gaussian::new(Integer::from(5), Integer::from(5))
        );
        assert_eq!(r.mul(&r.i(), &r.i()), r.nth(-1));
    }

    #[test]
    fn inverse_rational() {
        let r = GaussianRing::new(Q);
        let a = Gaussian::new(Rational::from(1), Rational::from(1));
        let inv = r.inv(&a);
        assert_eq!(inv, Gaussian::new(Rational::from((1, 2)), Rational::from((-1, 2))));
    }

    #[test]
    fn f_p_squared() {
        // -1 is not a square modulo 7, so every non-zero element is invertible
        let f = FiniteField::new(7);
        let r = GaussianRing::new(f);
        for re in 0..7 {
            for im in 0..7 {
                let a = Gaussian::new(f.to_element(re), f.to_element(im));
                if r.is_zero(&a) {
                    assert!(r.try_inv(&a).is_none());
                } else {
                    assert!(r.is_one(&r.mul(&a, &r.inv(&a))));
                }
            }
        }

        // 2^2 = -1 modulo 5, so 2 + I has zero norm
        let f = FiniteField::new(5);
        let r = GaussianRing::new(f);
        let a = Gaussian::new(f.to_element(2), f.to_element(1));
        assert!(r.try_inv(&a).is_none());
    }

    #[test]
    fn format() {
        let r = GaussianRing::new(Q);
        let a = Gaussian::new(Rational::from(1), Rational::from((-1, 3)));
        assert_eq!(format!("{}", r.printer(&a)), "1-1/3*I");
        assert_eq!(format!("{}", r.printer(&a).in_product()), "(1-1/3*I)");
        assert_eq!(format!("{}", r.printer(&r.i())), "1*I");
        assert_eq!(format!("{}", r.printer(&r.nth(4))), "4");
    }
}
