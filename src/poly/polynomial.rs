use std::cmp::Ordering;
use std::fmt::Display;
use std::mem;
use std::ops::{Add, Mul, Neg, Sub};
use std::sync::Arc;

use ahash::{HashMap, HashMapExt};
use smallvec::SmallVec;

use crate::domains::Ring;

use super::{Variable, INLINED_EXPONENTS};

/// A multivariate polynomial with sparse storage.
///
/// The terms are kept sorted in lexicographical order of their exponents
/// and every stored coefficient is non-zero. The exponents of all terms are stored
/// in one flat vector, `nvars` entries per term.
#[derive(Clone, Debug)]
pub struct MultivariatePolynomial<F: Ring> {
    pub coefficients: Vec<F::Element>,
    pub exponents: Vec<u32>,
    pub field: F,
    pub variables: Arc<Vec<Variable>>,
}

/// A view of a single term of a polynomial.
#[derive(Clone, Copy, Debug)]
pub struct MonomialView<'a, F: 'a + Ring> {
    pub coefficient: &'a F::Element,
    pub exponents: &'a [u32],
}

impl<'a, F: Ring> MonomialView<'a, F> {
    /// The total degree of the term.
    #[inline]
    pub fn degree(&self) -> u32 {
        self.exponents.iter().fold(0u32, |d, e| d.saturating_add(*e))
    }

    #[inline]
    fn degree_u64(&self) -> u64 {
        self.exponents.iter().map(|e| *e as u64).sum()
    }
}

impl<F: Ring> MultivariatePolynomial<F> {
    /// Constructs a zero polynomial over the variables `variables`.
    #[inline]
    pub fn new(field: &F, cap: Option<usize>, variables: Arc<Vec<Variable>>) -> Self {
        Self {
            coefficients: Vec::with_capacity(cap.unwrap_or(0)),
            exponents: Vec::with_capacity(cap.unwrap_or(0) * variables.len()),
            field: *field,
            variables,
        }
    }

    /// Constructs a zero polynomial with the same variables and field as `self`.
    #[inline]
    pub fn zero(&self) -> Self {
        Self::new(&self.field, None, self.variables.clone())
    }

    #[inline]
    pub fn zero_with_capacity(&self, cap: usize) -> Self {
        Self::new(&self.field, Some(cap), self.variables.clone())
    }

    /// Constructs a constant polynomial with the same variables as `self`.
    pub fn constant(&self, coeff: F::Element) -> Self {
        let mut res = self.zero_with_capacity(1);
        res.append_monomial(coeff, &vec![0; self.nvars()]);
        res
    }

    #[inline]
    pub fn one(&self) -> Self {
        self.constant(self.field.one())
    }

    /// Constructs a polynomial with a single term.
    pub fn monomial(&self, coeff: F::Element, exponents: Vec<u32>) -> Self {
        let mut res = self.zero_with_capacity(1);
        res.append_monomial(coeff, &exponents);
        res
    }

    /// Constructs the polynomial `X_var`.
    pub fn variable(&self, var: usize) -> Self {
        let mut exp = vec![0; self.nvars()];
        exp[var] = 1;
        self.monomial(self.field.one(), exp)
    }

    /// Constructs a polynomial from a list of terms. Equal monomials are merged.
    pub fn from_terms(
        field: &F,
        variables: Arc<Vec<Variable>>,
        terms: impl IntoIterator<Item = (F::Element, Vec<u32>)>,
    ) -> Self {
        let mut res = Self::new(field, None, variables);
        for (c, e) in terms {
            res.append_monomial(c, &e);
        }
        res
    }

    #[inline]
    pub fn is_zero(&self) -> bool {
        self.nterms() == 0
    }

    /// Returns the number of terms in the polynomial.
    #[inline]
    pub fn nterms(&self) -> usize {
        self.coefficients.len()
    }

    /// Returns the number of variables in the polynomial.
    #[inline]
    pub fn nvars(&self) -> usize {
        self.variables.len()
    }

    /// Returns true if the polynomial is constant.
    #[inline]
    pub fn is_constant(&self) -> bool {
        match self.nterms() {
            0 => true,
            1 => self.exponents(0).iter().all(|e| *e == 0),
            _ => false,
        }
    }

    /// Returns the constant term of the polynomial.
    pub fn get_constant(&self) -> F::Element {
        if self.is_zero() || !self.exponents(0).iter().all(|e| *e == 0) {
            return self.field.zero();
        }

        self.coefficients[0].clone()
    }

    /// Get the exponents of the `index`th monomial.
    #[inline]
    pub fn exponents(&self, index: usize) -> &[u32] {
        &self.exponents[index * self.nvars()..(index + 1) * self.nvars()]
    }

    #[inline]
    pub fn last_exponents(&self) -> &[u32] {
        assert!(self.nterms() > 0);

        let nterms = self.nterms();
        &self.exponents[(nterms - 1) * self.nvars()..nterms * self.nvars()]
    }

    #[inline]
    pub fn to_monomial_view(&self, i: usize) -> MonomialView<F> {
        MonomialView {
            coefficient: &self.coefficients[i],
            exponents: self.exponents(i),
        }
    }

    /// Return the coefficient of the monomial with exponents `exponents`.
    pub fn coefficient(&self, exponents: &[u32]) -> F::Element {
        match self.search(exponents) {
            Ok(i) => self.coefficients[i].clone(),
            Err(_) => self.field.zero(),
        }
    }

    fn search(&self, exponents: &[u32]) -> Result<usize, usize> {
        let mut l = 0;
        let mut r = self.nterms();
        while l < r {
            let m = (l + r) / 2;
            match self.exponents(m).cmp(exponents) {
                Ordering::Equal => return Ok(m),
                Ordering::Less => l = m + 1,
                Ordering::Greater => r = m,
            }
        }
        Err(l)
    }

    /// Appends a monomial to the polynomial.
    pub fn append_monomial(&mut self, coefficient: F::Element, exponents: &[u32]) {
        if self.field.is_zero(&coefficient) {
            return;
        }
        if self.nvars() != exponents.len() {
            panic!(
                "nvars mismatched: got {}, expected {}",
                exponents.len(),
                self.nvars()
            );
        }

        // should we append to the back?
        if self.nterms() == 0 || self.last_exponents() < exponents {
            self.coefficients.push(coefficient);
            self.exponents.extend_from_slice(exponents);
            return;
        }

        match self.search(exponents) {
            Ok(m) => {
                self.field
                    .add_assign(&mut self.coefficients[m], &coefficient);
                if self.field.is_zero(&self.coefficients[m]) {
                    // the coefficient becomes zero, remove this monomial
                    self.coefficients.remove(m);
                    let i = m * self.nvars();
                    self.exponents.drain(i..i + self.nvars());
                }
            }
            Err(l) => {
                self.coefficients.insert(l, coefficient);
                let i = l * self.nvars();
                self.exponents.splice(i..i, exponents.iter().cloned());
            }
        }
    }

    /// Returns the total degree, i.e. the maximal degree over all terms.
    /// The zero polynomial has degree 0.
    pub fn degree(&self) -> u32 {
        self.into_iter().map(|t| t.degree()).max().unwrap_or(0)
    }

    /// Returns the lowest total degree over all terms.
    /// The zero polynomial has lowest degree 0.
    pub fn ldegree(&self) -> u32 {
        self.into_iter().map(|t| t.degree()).min().unwrap_or(0)
    }

    /// Returns the highest power of variable `var`.
    pub fn degree_in(&self, var: usize) -> u32 {
        (0..self.nterms())
            .map(|i| self.exponents(i)[var])
            .max()
            .unwrap_or(0)
    }

    /// Keep only the terms whose total degree is in `[min, max]`.
    pub fn filter_degree(&self, min: u32, max: u32) -> Self {
        let mut res = self.zero();
        for t in self {
            let d = t.degree();
            if d >= min && d <= max {
                // terms stay sorted
                res.coefficients.push(t.coefficient.clone());
                res.exponents.extend_from_slice(t.exponents);
            }
        }
        res
    }

    /// Drop all terms of total degree larger than `max_degree`.
    #[inline]
    pub fn truncate(&self, max_degree: u32) -> Self {
        self.filter_degree(0, max_degree)
    }

    /// Multiply every coefficient with `other`.
    pub fn mul_coeff(mut self, other: &F::Element) -> Self {
        for c in &mut self.coefficients {
            self.field.mul_assign(c, other);
        }

        for i in (0..self.nterms()).rev() {
            if self.field.is_zero(&self.coefficients[i]) {
                self.coefficients.remove(i);
                self.exponents
                    .drain(i * self.nvars()..(i + 1) * self.nvars());
            }
        }

        self
    }

    /// Map a coefficient using the function `f`.
    pub fn map_coeff<U: Ring, T: Fn(&F::Element) -> U::Element>(
        &self,
        f: T,
        field: U,
    ) -> MultivariatePolynomial<U> {
        let mut coefficients = Vec::with_capacity(self.coefficients.len());
        let mut exponents = Vec::with_capacity(self.exponents.len());

        for m in self {
            let nc = f(m.coefficient);
            if !field.is_zero(&nc) {
                coefficients.push(nc);
                exponents.extend_from_slice(m.exponents);
            }
        }

        MultivariatePolynomial {
            coefficients,
            exponents,
            field,
            variables: self.variables.clone(),
        }
    }

    /// Map a coefficient using the fallible function `f`, stopping at the first error.
    pub fn try_map_coeff<U: Ring, Err, T: Fn(&F::Element) -> Result<U::Element, Err>>(
        &self,
        f: T,
        field: U,
    ) -> Result<MultivariatePolynomial<U>, Err> {
        let mut coefficients = Vec::with_capacity(self.coefficients.len());
        let mut exponents = Vec::with_capacity(self.exponents.len());

        for m in self {
            let nc = f(m.coefficient)?;
            if !field.is_zero(&nc) {
                coefficients.push(nc);
                exponents.extend_from_slice(m.exponents);
            }
        }

        Ok(MultivariatePolynomial {
            coefficients,
            exponents,
            field,
            variables: self.variables.clone(),
        })
    }

    /// Map every term `c*X^a` to `f(c, a)*X^a`.
    pub fn map_terms<T: Fn(&F::Element, &[u32]) -> F::Element>(&self, f: T) -> Self {
        let mut res = self.zero_with_capacity(self.nterms());
        for m in self {
            let nc = f(m.coefficient, m.exponents);
            if !self.field.is_zero(&nc) {
                res.coefficients.push(nc);
                res.exponents.extend_from_slice(m.exponents);
            }
        }
        res
    }

    /// Take the derivative of the polynomial w.r.t the variable `var`.
    pub fn derivative(&self, var: usize) -> Self {
        debug_assert!(var < self.nvars());

        let mut res = self.zero_with_capacity(self.nterms());

        let mut exp = vec![0; self.nvars()];
        for x in self {
            if x.exponents[var] > 0 {
                exp.copy_from_slice(x.exponents);
                let pow = exp[var] as i64;
                exp[var] -= 1;
                res.append_monomial(self.field.mul(x.coefficient, &self.field.nth(pow)), &exp);
            }
        }

        res
    }

    /// Multiply two polynomials, dropping every product term of total degree
    /// larger than `max_degree`.
    pub fn mul_truncated(&self, other: &Self, max_degree: u32) -> Self {
        debug_assert_eq!(self.nvars(), other.nvars());

        if self.is_zero() || other.is_zero() {
            return self.zero();
        }

        // degrees are compared in u64 so that huge exponents cannot wrap around
        let degrees_a: Vec<u64> = self.into_iter().map(|t| t.degree_u64()).collect();
        let degrees_b: Vec<u64> = other.into_iter().map(|t| t.degree_u64()).collect();
        let min_b = degrees_b.iter().copied().min().unwrap_or(0);
        let max_degree = max_degree as u64;

        // the accumulator only grows with the terms that survive the truncation
        let mut acc: HashMap<SmallVec<[u32; INLINED_EXPONENTS]>, F::Element> = HashMap::new();

        for (i, a) in self.into_iter().enumerate() {
            if degrees_a[i] + min_b > max_degree {
                continue;
            }

            for (j, b) in other.into_iter().enumerate() {
                if degrees_a[i] + degrees_b[j] > max_degree {
                    continue;
                }

                let exp: SmallVec<[u32; INLINED_EXPONENTS]> = a
                    .exponents
                    .iter()
                    .zip(b.exponents)
                    .map(|(x, y)| x + y)
                    .collect();
                let c = self.field.mul(a.coefficient, b.coefficient);
                match acc.get_mut(&exp) {
                    Some(v) => self.field.add_assign(v, &c),
                    None => {
                        acc.insert(exp, c);
                    }
                }
            }
        }

        let mut terms: Vec<_> = acc
            .into_iter()
            .filter(|(_, c)| !self.field.is_zero(c))
            .collect();
        terms.sort_unstable_by(|a, b| a.0.cmp(&b.0));

        let mut res = self.zero_with_capacity(terms.len());
        for (e, c) in terms {
            res.coefficients.push(c);
            res.exponents.extend_from_slice(&e);
        }
        res
    }

    /// Compute `self^e`, dropping every term of total degree larger than `max_degree`.
    pub fn pow_truncated(&self, mut e: u32, max_degree: u32) -> Self {
        if e == 0 {
            return self.one();
        }

        let mut x = self.truncate(max_degree);
        let mut y = self.one();
        while e != 1 {
            if e % 2 == 1 {
                y = y.mul_truncated(&x, max_degree);
            }

            x = x.mul_truncated(&x, max_degree);
            e /= 2;
        }

        x.mul_truncated(&y, max_degree)
    }
}

impl<'a, F: Ring> IntoIterator for &'a MultivariatePolynomial<F> {
    type Item = MonomialView<'a, F>;
    type IntoIter = MonomialViewIterator<'a, F>;

    #[inline]
    fn into_iter(self) -> Self::IntoIter {
        MonomialViewIterator {
            poly: self,
            index: 0,
        }
    }
}

/// Iterator over terms in a multivariate polynomial.
pub struct MonomialViewIterator<'a, F: Ring> {
    poly: &'a MultivariatePolynomial<F>,
    index: usize,
}

impl<'a, F: Ring> Iterator for MonomialViewIterator<'a, F> {
    type Item = MonomialView<'a, F>;

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        if self.index == self.poly.nterms() {
            None
        } else {
            let view = self.poly.to_monomial_view(self.index);
            self.index += 1;
            Some(view)
        }
    }
}

impl<F: Ring> PartialEq for MultivariatePolynomial<F> {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.variables == other.variables
            && self.exponents == other.exponents
            && self.coefficients == other.coefficients
    }
}

impl<F: Ring> Display for MultivariatePolynomial<F> {
    /// Print the terms from highest to lowest monomial, for example `X1^2*X2-1/3*X3+1`.
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        if self.is_zero() {
            return f.write_str("0");
        }

        let mut first = true;
        for i in (0..self.nterms()).rev() {
            let t = self.to_monomial_view(i);
            let mut term = String::new();

            if t.exponents.iter().all(|e| *e == 0) {
                term = self.field.printer(t.coefficient).to_string();
            } else {
                if self.field.is_one(&self.field.neg(t.coefficient)) {
                    term.push('-');
                } else if !self.field.is_one(t.coefficient) {
                    term = format!("{}*", self.field.printer(t.coefficient).in_product());
                }

                let mut first_var = true;
                for (v, e) in self.variables.iter().zip(t.exponents) {
                    if *e == 0 {
                        continue;
                    }
                    if !first_var {
                        term.push('*');
                    }
                    first_var = false;

                    if *e == 1 {
                        term.push_str(v.as_str());
                    } else {
                        term.push_str(&format!("{}^{}", v, e));
                    }
                }
            }

            if !first && !term.starts_with('-') {
                f.write_str("+")?;
            }
            first = false;
            f.write_str(&term)?;
        }

        Ok(())
    }
}

impl<F: Ring> Add for MultivariatePolynomial<F> {
    type Output = Self;

    fn add(mut self, mut other: Self) -> Self::Output {
        debug_assert_eq!(self.field, other.field);
        debug_assert_eq!(self.nvars(), other.nvars());

        if self.is_zero() {
            return other;
        }
        if other.is_zero() {
            return self;
        }

        // Merge the two polynomials, which are assumed to be already sorted.

        let nvars = self.nvars();
        let mut new_coefficients = vec![self.field.zero(); self.nterms() + other.nterms()];
        let mut new_exponents: Vec<u32> = vec![0; nvars * (self.nterms() + other.nterms())];
        let mut new_nterms = 0;
        let mut i = 0;
        let mut j = 0;

        macro_rules! insert_monomial {
            ($source:expr, $index:expr) => {
                mem::swap(
                    &mut new_coefficients[new_nterms],
                    &mut $source.coefficients[$index],
                );

                new_exponents[new_nterms * nvars..(new_nterms + 1) * nvars]
                    .clone_from_slice($source.exponents($index));
                new_nterms += 1;
            };
        }

        while i < self.nterms() && j < other.nterms() {
            let c = self.exponents(i).cmp(other.exponents(j));
            match c {
                Ordering::Less => {
                    insert_monomial!(self, i);
                    i += 1;
                }
                Ordering::Greater => {
                    insert_monomial!(other, j);
                    j += 1;
                }
                Ordering::Equal => {
                    self.field
                        .add_assign(&mut self.coefficients[i], &other.coefficients[j]);
                    if !self.field.is_zero(&self.coefficients[i]) {
                        insert_monomial!(self, i);
                    }
                    i += 1;
                    j += 1;
                }
            }
        }

        while i < self.nterms() {
            insert_monomial!(self, i);
            i += 1;
        }

        while j < other.nterms() {
            insert_monomial!(other, j);
            j += 1;
        }

        new_coefficients.truncate(new_nterms);
        new_exponents.truncate(nvars * new_nterms);

        Self {
            coefficients: new_coefficients,
            exponents: new_exponents,
            field: self.field,
            variables: self.variables,
        }
    }
}

impl<'a, 'b, F: Ring> Add<&'a MultivariatePolynomial<F>> for &'b MultivariatePolynomial<F> {
    type Output = MultivariatePolynomial<F>;

    fn add(self, other: &'a MultivariatePolynomial<F>) -> Self::Output {
        self.clone().add(other.clone())
    }
}

impl<F: Ring> Sub for MultivariatePolynomial<F> {
    type Output = Self;

    fn sub(self, other: Self) -> Self::Output {
        self.add(other.neg())
    }
}

impl<'a, 'b, F: Ring> Sub<&'a MultivariatePolynomial<F>> for &'b MultivariatePolynomial<F> {
    type Output = MultivariatePolynomial<F>;

    fn sub(self, other: &'a MultivariatePolynomial<F>) -> Self::Output {
        self.clone().add(other.clone().neg())
    }
}

impl<F: Ring> Neg for MultivariatePolynomial<F> {
    type Output = Self;

    fn neg(mut self) -> Self::Output {
        // Negate coefficients of all terms.
        for c in &mut self.coefficients {
            *c = self.field.neg(c);
        }
        self
    }
}

impl<'a, 'b, F: Ring> Mul<&'a MultivariatePolynomial<F>> for &'b MultivariatePolynomial<F> {
    type Output = MultivariatePolynomial<F>;

    fn mul(self, other: &'a MultivariatePolynomial<F>) -> Self::Output {
        self.mul_truncated(other, u32::MAX)
    }
}

#[cfg(test)]
mod test {
    use crate::domains::integer::{Integer, Z};
    use crate::domains::rational::{Rational, Q};
    use crate::domains::Ring;
    use crate::poly::standard_variables;

    use super::MultivariatePolynomial;

    fn poly(terms: &[(i64, [u32; 2])]) -> MultivariatePolynomial<crate::domains::integer::IntegerRing> {
        MultivariatePolynomial::from_terms(
            &Z,
            standard_variables(2),
            terms.iter().map(|(c, e)| (Integer::from(*c), e.to_vec())),
        )
    }

    #[test]
    fn append_keeps_order() {
        let p = poly(&[(1, [2, 0]), (3, [0, 1]), (-1, [1, 1]), (2, [0, 1])]);
        assert_eq!(p.nterms(), 3);
        assert_eq!(p.exponents(0), &[0, 1]);
        assert_eq!(p.coefficients[0], 5);
        assert_eq!(p.exponents(2), &[2, 0]);

        let q = poly(&[(1, [1, 0]), (-1, [1, 0])]);
        assert!(q.is_zero());
    }

    #[test]
    fn add_cancels() {
        let a = poly(&[(1, [1, 0]), (2, [0, 2])]);
        let b = poly(&[(-1, [1, 0]), (1, [3, 0])]);
        let c = &a + &b;
        assert_eq!(c, poly(&[(2, [0, 2]), (1, [3, 0])]));
        assert!((&a - &a).is_zero());
    }

    #[test]
    fn truncated_multiplication() {
        // (1 + X1 + X2)^2 truncated at degree 1
        let a = poly(&[(1, [0, 0]), (1, [1, 0]), (1, [0, 1])]);
        let sq = a.mul_truncated(&a, 1);
        assert_eq!(sq, poly(&[(1, [0, 0]), (2, [1, 0]), (2, [0, 1])]));

        let full = &a * &a;
        assert_eq!(full.nterms(), 6);
        assert_eq!(full.truncate(1), sq);
        assert_eq!(a.pow_truncated(3, 2), (&full * &a).truncate(2));
    }

    #[test]
    fn truncation_drops_products_early() {
        // every pairwise product has degree at least 20, none survives
        let a = MultivariatePolynomial::from_terms(
            &Z,
            standard_variables(2),
            (0..70_000).map(|i| (Integer::from(1), vec![i, 10])),
        );
        assert_eq!(a.nterms(), 70_000);
        assert!(a.mul_truncated(&a, 5).is_zero());

        let b = poly(&[(1, [0, 1]), (1, [1, 0])]);
        assert_eq!(a.mul_truncated(&b, 11), poly(&[(1, [0, 11]), (1, [1, 10])]));
    }

    #[test]
    fn huge_exponents_do_not_wrap() {
        let a = poly(&[(1, [u32::MAX - 1, 0]), (1, [0, 1])]);
        let b = poly(&[(1, [5, 0]), (1, [0, u32::MAX])]);
        assert_eq!(a.mul_truncated(&b, 10), poly(&[(1, [5, 1])]));
        assert_eq!(&a * &b, poly(&[(1, [5, 1])]));
        assert_eq!(b.degree(), u32::MAX);
    }

    #[test]
    fn degrees() {
        let a = poly(&[(1, [1, 0]), (1, [2, 3])]);
        assert_eq!(a.degree(), 5);
        assert_eq!(a.ldegree(), 1);
        assert_eq!(a.degree_in(1), 3);
        assert_eq!(a.filter_degree(2, u32::MAX), poly(&[(1, [2, 3])]));
        assert_eq!(a.derivative(1), poly(&[(3, [2, 2])]));
    }

    #[test]
    fn display() {
        let p = MultivariatePolynomial::from_terms(
            &Q,
            standard_variables(2),
            [
                (Rational::from((-1, 3)), vec![3, 0]),
                (Q.one(), vec![0, 1]),
                (Q.nth(-1), vec![0, 0]),
            ],
        );
        assert_eq!(p.to_string(), "-1/3*X1^3+X2-1");
        assert_eq!(p.zero().to_string(), "0");
    }
}
