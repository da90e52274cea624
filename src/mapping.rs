//! Polynomial maps `F = (F_1, ..., F_n)` and the coefficient transformations
//! applied to them: scaling, denominator clearing and reduction modulo a prime.
use std::fmt::Display;
use std::sync::Arc;

use smartstring::{LazyCompact, SmartString};
use thiserror::Error;
use tracing::debug;

use crate::{
    domains::{
        finite_field::{is_prime_u64, FiniteField},
        gaussian::{Gaussian, GaussianRing, QI, ZI},
        integer::Integer,
        rational::{to_integer, Rational, Q},
        Field, Ring,
    },
    parser::{ExactPolynomial, ParseError, PolynomialParser},
    poly::{polynomial::MultivariatePolynomial, standard_variables, Variable},
};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MappingError {
    #[error("a map needs at least one coordinate")]
    Empty,
    #[error("{coordinates} coordinates given for {variables} variables")]
    CoordinateCount { coordinates: usize, variables: usize },
    #[error("{0} is not an odd prime")]
    NotOddPrime(u64),
    #[error("{0} = 1 mod 4 splits in Z[i], so Z[i]/({0}) is not a field")]
    NotInert(u64),
    #[error("coordinate {coordinate} has an imaginary coefficient, but the map is declared real")]
    ImaginaryCoefficient { coordinate: usize },
    #[error("coefficient {coefficient} of coordinate {coordinate} is not integral after scaling")]
    NotIntegral {
        coordinate: usize,
        coefficient: String,
    },
    #[error("the denominator of coefficient {coefficient} is divisible by {prime}")]
    DenominatorDivisible { prime: u64, coefficient: String },
    #[error("the scaling constant must be non-zero")]
    ZeroScaling,
    #[error("unknown mapping {0}")]
    UnknownMapping(String),
    #[error(transparent)]
    Parse(#[from] ParseError),
}

/// An ordered tuple of `n` polynomials in `n` variables together with
/// the data needed by the multi-modular pipeline.
///
/// Transformations never modify a map in-place, but return a new map.
#[derive(Clone, Debug)]
pub struct PolynomialMap<F: Ring> {
    pub name: SmartString<LazyCompact>,
    pub coordinates: Vec<MultivariatePolynomial<F>>,
    pub variables: Arc<Vec<Variable>>,
    /// The working primes of the multi-modular pipeline.
    pub primes: Vec<u64>,
    /// The Segre scaling constant that clears all denominators.
    pub r: Rational,
    /// The coefficient domain contains the imaginary unit.
    pub imaginary: bool,
}

/// A map over the Gaussian rationals, as parsed from its definition.
pub type ExactMap = PolynomialMap<QI>;

/// Optional data for [PolynomialMap::parse] and [PolynomialMap::from_gradient].
#[derive(Clone, Debug)]
pub struct MapOptions {
    pub primes: Vec<u64>,
    pub r: Rational,
    pub params: Vec<(String, String)>,
    /// The variable names. Defaults to `X1, ..., Xn`.
    pub variables: Option<Vec<String>>,
    pub imaginary: bool,
}

impl Default for MapOptions {
    fn default() -> Self {
        MapOptions {
            primes: vec![3, 5, 7],
            r: Rational::from(1),
            params: vec![],
            variables: None,
            imaginary: false,
        }
    }
}

impl MapOptions {
    pub fn primes(mut self, primes: &[u64]) -> Self {
        self.primes = primes.to_vec();
        self
    }

    pub fn segre_constant(mut self, r: i64) -> Self {
        self.r = Rational::from(r);
        self
    }

    pub fn param(mut self, name: &str, value: &str) -> Self {
        self.params.push((name.into(), value.into()));
        self
    }

    pub fn imaginary(mut self) -> Self {
        self.imaginary = true;
        self
    }

    fn variables(&self, n: usize) -> Arc<Vec<Variable>> {
        match &self.variables {
            Some(v) => Arc::new(v.iter().map(|x| Variable::new(x)).collect()),
            None => standard_variables(n),
        }
    }
}

impl<F: Ring> PolynomialMap<F> {
    /// Create a new map, checking that the number of coordinates matches the number of variables.
    pub fn new(
        name: &str,
        coordinates: Vec<MultivariatePolynomial<F>>,
        variables: Arc<Vec<Variable>>,
        primes: Vec<u64>,
        r: Rational,
        imaginary: bool,
    ) -> Result<Self, MappingError> {
        if coordinates.is_empty() {
            return Err(MappingError::Empty);
        }
        if coordinates.len() != variables.len()
            || coordinates.iter().any(|c| c.nvars() != variables.len())
        {
            return Err(MappingError::CoordinateCount {
                coordinates: coordinates.len(),
                variables: variables.len(),
            });
        }

        Ok(PolynomialMap {
            name: name.into(),
            coordinates,
            variables,
            primes,
            r,
            imaginary,
        })
    }

    /// The number of coordinates.
    #[inline]
    pub fn n(&self) -> usize {
        self.coordinates.len()
    }

    pub fn field(&self) -> F {
        self.coordinates[0].field
    }

    /// Create a map with the same metadata and the given coordinates.
    pub fn with_coordinates<G: Ring>(
        &self,
        name: &str,
        coordinates: Vec<MultivariatePolynomial<G>>,
    ) -> PolynomialMap<G> {
        PolynomialMap {
            name: name.into(),
            coordinates,
            variables: self.variables.clone(),
            primes: self.primes.clone(),
            r: self.r.clone(),
            imaginary: self.imaginary,
        }
    }

    /// The polynomial `X_i` in the ring of this map.
    pub fn variable(&self, i: usize) -> MultivariatePolynomial<F> {
        self.coordinates[0].variable(i)
    }

    /// The remainder `F_i - X_i`.
    pub fn remainder(&self, i: usize) -> MultivariatePolynomial<F> {
        &self.coordinates[i] - &self.variable(i)
    }

    /// Return the coordinates whose part of degree at most one is not `X_i`.
    pub fn non_identity_coordinates(&self) -> Vec<usize> {
        (0..self.n())
            .filter(|i| !self.remainder(*i).truncate(1).is_zero())
            .collect()
    }

    /// Check that the primes can be used by the multi-modular pipeline: all primes
    /// are odd primes, and for a map over the Gaussian numbers they are `3 mod 4`,
    /// so that `Z[i]/(p)` is the field with `p^2` elements.
    pub fn validate_primes(&self) -> Result<(), MappingError> {
        for &p in &self.primes {
            if p == 2 || !is_prime_u64(p) || p >= 1 << 63 {
                return Err(MappingError::NotOddPrime(p));
            }
            if self.imaginary && p % 4 != 3 {
                return Err(MappingError::NotInert(p));
            }
        }
        Ok(())
    }
}

impl ExactMap {
    /// Parse a map from the textual definitions of its coordinates.
    pub fn parse<S: AsRef<str>>(
        definitions: &[S],
        name: &str,
        options: &MapOptions,
    ) -> Result<ExactMap, MappingError> {
        let variables = options.variables(definitions.len());
        if variables.len() != definitions.len() {
            return Err(ParseError::VariableCountMismatch {
                definitions: definitions.len(),
                variables: variables.len(),
            }
            .into());
        }

        let mut parser = PolynomialParser::new(variables.clone());
        for (k, v) in &options.params {
            parser.add_param(k, v)?;
        }

        let coordinates = definitions
            .iter()
            .map(|d| parser.parse(d.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;

        let map = PolynomialMap::new(
            name,
            coordinates,
            variables,
            options.primes.clone(),
            options.r.clone(),
            options.imaginary,
        )?;
        map.check_real()?;
        Ok(map)
    }

    /// Construct the map `X + grad(g)`.
    pub fn from_gradient(
        g: &ExactPolynomial,
        name: &str,
        options: &MapOptions,
    ) -> Result<ExactMap, MappingError> {
        let coordinates = (0..g.nvars())
            .map(|i| &g.variable(i) + &g.derivative(i))
            .collect();
        let map = PolynomialMap::new(
            name,
            coordinates,
            g.variables.clone(),
            options.primes.clone(),
            options.r.clone(),
            options.imaginary,
        )?;
        map.check_real()?;
        Ok(map)
    }

    fn check_real(&self) -> Result<(), MappingError> {
        if self.imaginary {
            return Ok(());
        }

        for (i, c) in self.coordinates.iter().enumerate() {
            if c.coefficients.iter().any(|x| !QI.is_real(x)) {
                return Err(MappingError::ImaginaryCoefficient { coordinate: i });
            }
        }
        Ok(())
    }

    /// Compute `F(s X) / s`, which maps every term `c X^a` to `c s^(|a| - 1) X^a`.
    pub fn scale(&self, s: &Rational) -> Result<ExactMap, MappingError> {
        let s_inv = Q.try_inv(s).ok_or(MappingError::ZeroScaling)?;

        let coordinates = self
            .coordinates
            .iter()
            .map(|f| {
                f.map_terms(|c, e| {
                    let d: u32 = e.iter().sum();
                    let factor = if d == 0 {
                        s_inv.clone()
                    } else {
                        Q.pow(s, (d - 1) as u64)
                    };
                    Gaussian::new(
                        Rational::from(&c.re * &factor),
                        Rational::from(&c.im * &factor),
                    )
                })
            })
            .collect();

        let mut res = self.with_coordinates(&self.name, coordinates);
        res.r = Rational::from(&self.r / s);
        Ok(res)
    }

    /// Apply the Segre homotopy `F(r X) / r` and move the map to the Gaussian integers.
    /// Fails if the scaling constant `r` does not clear all denominators.
    pub fn segre_homotopy(&self) -> Result<PolynomialMap<ZI>, MappingError> {
        let scaled = self.scale(&self.r)?;

        let mut coordinates = Vec::with_capacity(self.n());
        for (i, f) in scaled.coordinates.iter().enumerate() {
            let g = f.try_map_coeff(
                |c| match (to_integer(&c.re), to_integer(&c.im)) {
                    (Some(re), Some(im)) => Ok(Gaussian::new(re, im)),
                    _ => Err(MappingError::NotIntegral {
                        coordinate: i,
                        coefficient: QI.printer(c).to_string(),
                    }),
                },
                ZI,
            )?;
            coordinates.push(g);
        }

        debug!("applied Segre homotopy with r = {} to {}", self.r, self.name);

        let mut res = self.with_coordinates(&format!("{}{}", self.r, self.name), coordinates);
        res.r = Rational::from(1);
        Ok(res)
    }

    /// Reduce the map into the modular field `field`. Fails if the prime divides a denominator.
    pub fn reduce<M: ModularField>(&self, field: M) -> Result<PolynomialMap<M>, MappingError> {
        let coordinates = self
            .coordinates
            .iter()
            .map(|f| {
                f.try_map_coeff(
                    |c| {
                        field
                            .reduce_rational(c)
                            .ok_or_else(|| MappingError::DenominatorDivisible {
                                prime: field.prime(),
                                coefficient: QI.printer(c).to_string(),
                            })
                    },
                    field,
                )
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(self.with_coordinates(&format!("{}_{}", self.name, field.prime()), coordinates))
    }
}

impl PolynomialMap<ZI> {
    /// Reduce the integral map into the modular field `field` by the canonical homomorphism.
    pub fn reduce<M: ModularField>(&self, field: M) -> PolynomialMap<M> {
        let coordinates = self
            .coordinates
            .iter()
            .map(|f| f.map_coeff(|c| field.reduce(c), field))
            .collect();

        self.with_coordinates(&format!("{}_{}", self.name, field.prime()), coordinates)
    }

    /// Embed the map in the Gaussian rationals.
    pub fn to_exact(&self) -> ExactMap {
        let coordinates = self
            .coordinates
            .iter()
            .map(|f| {
                f.map_coeff(
                    |c| Gaussian::new(Rational::from(c.re.clone()), Rational::from(c.im.clone())),
                    QI,
                )
            })
            .collect();
        self.with_coordinates(&self.name, coordinates)
    }
}

impl<F: Ring> Display for PolynomialMap<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "==================== Mapping ====================")?;
        let vars: Vec<&str> = self.variables.iter().map(|v| v.as_str()).collect();
        writeln!(f, "{}[{}]", self.field(), vars.join(", "))?;
        for (i, c) in self.coordinates.iter().enumerate() {
            writeln!(f, "{}_{} = {}", self.name, i + 1, c)?;
        }
        Ok(())
    }
}

/// A field of prime characteristic into which maps over the Gaussian integers
/// can be reduced: `Z_p` for real maps and `F_{p^2} = Z[i]/(p)` for imaginary maps.
pub trait ModularField: Field {
    /// Construct the field for the odd prime `p`.
    fn for_prime(p: u64) -> Self;
    fn prime(&self) -> u64;
    /// The canonical image of a Gaussian integer.
    fn reduce(&self, c: &Gaussian<Integer>) -> Self::Element;
    /// The image of a Gaussian rational, if `p` does not divide its denominators.
    fn reduce_rational(&self, c: &Gaussian<Rational>) -> Option<Self::Element>;
    /// The residue of `a` as a Gaussian integer with both parts in `(-p/2, p/2]`.
    fn residue(&self, a: &Self::Element) -> Gaussian<Integer>;
    /// A textual description of the field for external engines, such as `GF(7)`.
    fn engine_ring(&self) -> String;
}

fn reduce_rational_part(field: &FiniteField, r: &Rational) -> Option<<FiniteField as Ring>::Element> {
    let den = field.to_element_integer(r.denom());
    let den_inv = field.try_inv(&den)?;
    Some(field.mul(&field.to_element_integer(r.numer()), &den_inv))
}

impl ModularField for FiniteField {
    fn for_prime(p: u64) -> Self {
        FiniteField::new(p)
    }

    fn prime(&self) -> u64 {
        self.get_prime()
    }

    fn reduce(&self, c: &Gaussian<Integer>) -> Self::Element {
        debug_assert!(c.im.cmp0().is_eq());
        self.to_element_integer(&c.re)
    }

    fn reduce_rational(&self, c: &Gaussian<Rational>) -> Option<Self::Element> {
        debug_assert!(c.im.cmp0().is_eq());
        reduce_rational_part(self, &c.re)
    }

    fn residue(&self, a: &Self::Element) -> Gaussian<Integer> {
        Gaussian::new(self.to_symmetric_integer(a), Integer::new())
    }

    fn engine_ring(&self) -> String {
        format!("GF({})", self.get_prime())
    }
}

impl ModularField for GaussianRing<FiniteField> {
    fn for_prime(p: u64) -> Self {
        GaussianRing::new(FiniteField::new(p))
    }

    fn prime(&self) -> u64 {
        self.base().get_prime()
    }

    fn reduce(&self, c: &Gaussian<Integer>) -> Self::Element {
        Gaussian::new(
            self.base().to_element_integer(&c.re),
            self.base().to_element_integer(&c.im),
        )
    }

    fn reduce_rational(&self, c: &Gaussian<Rational>) -> Option<Self::Element> {
        Some(Gaussian::new(
            reduce_rational_part(self.base(), &c.re)?,
            reduce_rational_part(self.base(), &c.im)?,
        ))
    }

    fn residue(&self, a: &Self::Element) -> Gaussian<Integer> {
        Gaussian::new(
            self.base().to_symmetric_integer(&a.re),
            self.base().to_symmetric_integer(&a.im),
        )
    }

    fn engine_ring(&self) -> String {
        format!("GF({}^2)", self.base().get_prime())
    }
}
