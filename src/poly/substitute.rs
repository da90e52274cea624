//! Truncated composition `trunc(p(F), max_degree)` of a polynomial with a polynomial map.
//!
//! The full composition can be exponentially larger than its truncation, so the
//! product for every term is truncated while it is being built. Large polynomials are
//! split into their terms, which are evaluated independently on a thread pool and
//! summed afterwards.
use rayon::{prelude::*, ThreadPool, ThreadPoolBuildError, ThreadPoolBuilder};
use tracing::trace;

use crate::domains::Ring;

use super::polynomial::{MonomialView, MultivariatePolynomial};

/// Settings for the substitution evaluator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SubstitutionConfig {
    /// Evaluate the terms of large polynomials in parallel.
    pub parallel: bool,
    /// The number of threads in the pool.
    pub workers: usize,
    /// Polynomials with fewer terms are always evaluated sequentially.
    pub parallel_threshold: usize,
}

impl Default for SubstitutionConfig {
    fn default() -> Self {
        SubstitutionConfig {
            parallel: false,
            workers: 12,
            parallel_threshold: 20,
        }
    }
}

impl SubstitutionConfig {
    pub fn sequential() -> Self {
        Self::default()
    }

    pub fn parallel() -> Self {
        SubstitutionConfig {
            parallel: true,
            ..Self::default()
        }
    }
}

/// Evaluates polynomials at a fixed list of polynomial values, truncated to a degree ceiling.
///
/// The evaluator owns its thread pool, which is dropped together with the evaluator.
pub struct TruncatedEvaluator<'a, F: Ring> {
    values: &'a [MultivariatePolynomial<F>],
    max_degree: u32,
    threshold: usize,
    pool: Option<ThreadPool>,
}

impl<'a, F: Ring> TruncatedEvaluator<'a, F> {
    /// Create an evaluator that substitutes `values[i]` for variable `i`.
    pub fn new(
        values: &'a [MultivariatePolynomial<F>],
        max_degree: u32,
        config: &SubstitutionConfig,
    ) -> Result<Self, ThreadPoolBuildError> {
        let pool = if config.parallel {
            Some(
                ThreadPoolBuilder::new()
                    .num_threads(config.workers.max(1))
                    .build()?,
            )
        } else {
            None
        };

        Ok(TruncatedEvaluator {
            values,
            max_degree,
            threshold: config.parallel_threshold,
            pool,
        })
    }

    /// Compute `trunc(p(values), max_degree)`.
    pub fn evaluate(&self, p: &MultivariatePolynomial<F>) -> MultivariatePolynomial<F> {
        let zero = p.zero();
        if p.is_zero() {
            return zero;
        }

        let powers = self.power_table(p);

        match &self.pool {
            Some(pool) if p.nterms() >= self.threshold => {
                trace!("parallel substitution of {} terms", p.nterms());
                let terms: Vec<MonomialView<F>> = p.into_iter().collect();
                pool.install(|| {
                    terms
                        .par_iter()
                        .map(|t| self.evaluate_term(t, &powers, &zero))
                        .reduce(|| zero.clone(), |a, b| a + b)
                })
            }
            _ => {
                let mut res = zero.clone();
                for t in p {
                    res = res + self.evaluate_term(&t, &powers, &zero);
                }
                res
            }
        }
    }

    /// Tabulate `trunc(values[i]^k, max_degree)` for every power `k` of variable `i` in `p`.
    fn power_table(&self, p: &MultivariatePolynomial<F>) -> Vec<Vec<MultivariatePolynomial<F>>> {
        let one = p.one();
        self.values
            .iter()
            .enumerate()
            .map(|(i, v)| {
                let d = p.degree_in(i) as usize;
                let base = v.truncate(self.max_degree);
                let mut pows = Vec::with_capacity(d + 1);
                pows.push(one.clone());
                for k in 1..=d {
                    let next = pows[k - 1].mul_truncated(&base, self.max_degree);
                    pows.push(next);
                }
                pows
            })
            .collect()
    }

    fn evaluate_term(
        &self,
        t: &MonomialView<F>,
        powers: &[Vec<MultivariatePolynomial<F>>],
        zero: &MultivariatePolynomial<F>,
    ) -> MultivariatePolynomial<F> {
        let mut res = zero.constant(t.coefficient.clone());
        for (i, e) in t.exponents.iter().enumerate() {
            if *e == 0 {
                continue;
            }

            res = res.mul_truncated(&powers[i][*e as usize], self.max_degree);
            if res.is_zero() {
                break;
            }
        }
        res
    }
}

/// Compute `p(values)` without truncation.
pub fn substitute<F: Ring>(
    p: &MultivariatePolynomial<F>,
    values: &[MultivariatePolynomial<F>],
) -> MultivariatePolynomial<F> {
    let mut res = p.zero();
    for t in p {
        let mut term = p.constant(t.coefficient.clone());
        for (i, e) in t.exponents.iter().enumerate() {
            if *e > 0 {
                term = &term * &values[i].pow_truncated(*e, u32::MAX);
            }
        }
        res = res + term;
    }
    res
}

#[cfg(test)]
mod test {
    use crate::domains::rational::{Rational, RationalField, Q};
    use crate::domains::Ring;
    use crate::poly::polynomial::MultivariatePolynomial;
    use crate::poly::standard_variables;

    use super::{substitute, SubstitutionConfig, TruncatedEvaluator};

    type Poly = MultivariatePolynomial<RationalField>;

    fn map() -> Vec<Poly> {
        let vars = standard_variables(3);
        let x = MultivariatePolynomial::new(&Q, None, vars);
        let x1 = x.variable(0);
        let x2 = x.variable(1);
        let x3 = x.variable(2);
        vec![
            &x1 + &(&x2 * &x3),
            &x2 - &(&x1 * &x1),
            &x3 + &(&x1 * &x2).mul_coeff(&Rational::from((1, 2))),
        ]
    }

    fn dense(vals: &[Poly]) -> Poly {
        // (1 + X1 + X2 + X3)^4 has 35 terms
        let x = &vals[0];
        let s = &(&x.one() + &x.variable(0)) + &(&x.variable(1) + &x.variable(2));
        s.pow_truncated(4, u32::MAX)
    }

    #[test]
    fn truncation_matches_full_substitution() {
        let f = map();
        let p = dense(&f);
        let full = substitute(&p, &f);

        for max_degree in [0, 1, 3, 6] {
            let e = TruncatedEvaluator::new(&f, max_degree, &SubstitutionConfig::sequential())
                .unwrap();
            assert_eq!(e.evaluate(&p), full.truncate(max_degree));
        }
    }

    #[test]
    fn parallel_matches_sequential() {
        let f = map();
        let p = dense(&f);
        assert!(p.nterms() >= 20);

        let seq = TruncatedEvaluator::new(&f, 5, &SubstitutionConfig::sequential()).unwrap();
        let par = TruncatedEvaluator::new(
            &f,
            5,
            &SubstitutionConfig {
                workers: 3,
                ..SubstitutionConfig::parallel()
            },
        )
        .unwrap();
        assert_eq!(seq.evaluate(&p), par.evaluate(&p));
    }

    #[test]
    fn constant() {
        let f = map();
        let c = f[0].constant(Q.nth(5));
        let e = TruncatedEvaluator::new(&f, 2, &SubstitutionConfig::sequential()).unwrap();
        assert_eq!(e.evaluate(&c), c);
    }
}
