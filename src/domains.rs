//! Defines core algebraic traits and the coefficient domains used by the inversion pipeline.
//!
//! The core trait is [Ring], which has two binary operations, addition and multiplication.
//! Each ring has an associated element type, that should not be confused with the ring type itself.
//! For example:
//! - The ring of integers [Z](integer::Z) has elements of type [Integer](integer::Integer).
//! - The field of rational numbers [Q](rational::Q) has elements of type [Rational](rational::Rational).
//! - A prime field [FiniteField](finite_field::FiniteField) has elements of type [FiniteFieldElement](finite_field::FiniteFieldElement).
//! - The Gaussian extension [GaussianRing](gaussian::GaussianRing) of any of the above has elements of type [Gaussian](gaussian::Gaussian).
//!
//! The ring elements do not implement operations such as addition or multiplication,
//! but rather the ring itself does, since for example a finite field element does not know its prime.
pub mod finite_field;
pub mod gaussian;
pub mod integer;
pub mod rational;

use std::fmt::{Debug, Display, Formatter};

/// A ring is a set with two binary operations, addition and multiplication.
///
/// Rings are cheap to copy and can be shared between the worker threads of
/// the term-parallel evaluator, hence the `Send + Sync` bounds.
pub trait Ring: Clone + Copy + PartialEq + Debug + Display + Send + Sync {
    type Element: Clone + PartialEq + Debug + Send + Sync;

    fn add(&self, a: &Self::Element, b: &Self::Element) -> Self::Element;
    fn sub(&self, a: &Self::Element, b: &Self::Element) -> Self::Element;
    fn mul(&self, a: &Self::Element, b: &Self::Element) -> Self::Element;
    fn neg(&self, a: &Self::Element) -> Self::Element;
    fn zero(&self) -> Self::Element;
    fn one(&self) -> Self::Element;
    /// Return the nth element by computing `n * 1`.
    fn nth(&self, n: i64) -> Self::Element;
    fn is_zero(&self, a: &Self::Element) -> bool;
    fn is_one(&self, a: &Self::Element) -> bool;

    /// Format an element. Sums are wrapped in parentheses when `in_product` is set,
    /// so that the output can be read back by the [parser](crate::parser).
    fn format(
        &self,
        element: &Self::Element,
        in_product: bool,
        f: &mut Formatter<'_>,
    ) -> std::fmt::Result;

    #[inline]
    fn add_assign(&self, a: &mut Self::Element, b: &Self::Element) {
        *a = self.add(a, b);
    }

    #[inline]
    fn sub_assign(&self, a: &mut Self::Element, b: &Self::Element) {
        *a = self.sub(a, b);
    }

    #[inline]
    fn mul_assign(&self, a: &mut Self::Element, b: &Self::Element) {
        *a = self.mul(a, b);
    }

    /// Compute `b^e` by repeated squaring.
    fn pow(&self, b: &Self::Element, mut e: u64) -> Self::Element {
        if e == 0 {
            return self.one();
        }

        let mut x = b.clone();
        let mut y = self.one();
        while e != 1 {
            if e % 2 == 1 {
                self.mul_assign(&mut y, &x);
            }

            x = self.mul(&x, &x);
            e /= 2;
        }

        self.mul(&x, &y)
    }

    /// Create a printer for the given ring element that
    /// can be used in a [format!] macro.
    fn printer<'a>(&'a self, element: &'a Self::Element) -> RingPrinter<'a, Self> {
        RingPrinter {
            ring: self,
            element,
            in_product: false,
        }
    }
}

/// A field is a ring that supports division and inversion.
pub trait Field: Ring {
    /// Compute the inverse of `a`, if it exists.
    fn try_inv(&self, a: &Self::Element) -> Option<Self::Element>;

    /// Compute the inverse of `a`. Panics when `a` is not invertible.
    fn inv(&self, a: &Self::Element) -> Self::Element {
        self.try_inv(a)
            .unwrap_or_else(|| panic!("{} is not invertible in {}", self.printer(a), self))
    }

    fn div(&self, a: &Self::Element, b: &Self::Element) -> Self::Element {
        self.mul(a, &self.inv(b))
    }
}

/// Provides an interface for printing elements of a ring,
/// suitable as an argument to [format!]. Internally, it will call [Ring::format].
pub struct RingPrinter<'a, R: Ring> {
    pub ring: &'a R,
    pub element: &'a R::Element,
    pub in_product: bool,
}

impl<'a, R: Ring> RingPrinter<'a, R> {
    /// Print the element as a factor of a product.
    pub fn in_product(mut self) -> Self {
        self.in_product = true;
        self
    }
}

impl<'a, R: Ring> Display for RingPrinter<'a, R> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        self.ring.format(self.element, self.in_product, f)
    }
}
