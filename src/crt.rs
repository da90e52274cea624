//! Multi-modular reconstruction of Gaussian integer coefficients.
//!
//! Every coefficient of a map is addressed by a [MonomialKey]. The inverses computed
//! modulo several primes contribute one [Observation] per prime and key, and the
//! exact coefficient is recovered with the Chinese remainder theorem.
use std::fmt::Display;

use ahash::{HashMap, HashMapExt};
use rug::ops::RemRounding;
use smallvec::SmallVec;
use thiserror::Error;
use tracing::debug;

use crate::{
    domains::{
        gaussian::{Gaussian, ZI},
        integer::{chinese_remainder, symmetric_mod, Integer},
        Ring,
    },
    mapping::{ModularField, PolynomialMap},
    poly::{polynomial::MultivariatePolynomial, INLINED_EXPONENTS},
};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CrtError {
    #[error("coefficient {key} has both real and imaginary residues")]
    MixedObservation { key: MonomialKey },
    #[error("coefficient {key} has no observations")]
    NoObservations { key: MonomialKey },
    #[error("the moduli of coefficient {key} are not coprime")]
    NotCoprime { key: MonomialKey },
}

/// The address `(coordinate, exponents)` of a single coefficient of a map.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MonomialKey {
    pub coordinate: usize,
    pub exponents: SmallVec<[u32; INLINED_EXPONENTS]>,
}

impl MonomialKey {
    pub fn new(coordinate: usize, exponents: &[u32]) -> MonomialKey {
        MonomialKey {
            coordinate,
            exponents: exponents.into(),
        }
    }
}

impl Display for MonomialKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {:?})", self.coordinate, self.exponents.as_slice())
    }
}

/// The residue of a coefficient modulo a prime, in the symmetric representation.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Observation {
    pub prime: u64,
    pub residue: Gaussian<Integer>,
}

impl Observation {
    pub fn new(prime: u64, residue: Gaussian<Integer>) -> Observation {
        Observation { prime, residue }
    }

    pub fn real(prime: u64, residue: i64) -> Observation {
        Observation::new(prime, Gaussian::new(Integer::from(residue), Integer::new()))
    }
}

/// A table from coefficient addresses to their residues modulo the primes
/// that have been processed so far.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CoefficientStore {
    entries: HashMap<MonomialKey, Vec<Observation>>,
}

impl CoefficientStore {
    pub fn new() -> CoefficientStore {
        CoefficientStore {
            entries: HashMap::new(),
        }
    }

    /// Record every coefficient of a map reduced modulo a prime.
    pub fn from_map<M: ModularField>(map: &PolynomialMap<M>) -> CoefficientStore {
        let field = map.field();
        let p = field.prime();

        let mut store = CoefficientStore::new();
        for (i, f) in map.coordinates.iter().enumerate() {
            for t in f {
                store.insert(
                    MonomialKey::new(i, t.exponents),
                    Observation::new(p, field.residue(t.coefficient)),
                );
            }
        }
        store
    }

    pub fn insert(&mut self, key: MonomialKey, observation: Observation) {
        self.entries.entry(key).or_default().push(observation);
    }

    pub fn get(&self, key: &MonomialKey) -> Option<&[Observation]> {
        self.entries.get(key).map(|x| x.as_slice())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Merge two stores by concatenating the observations of equal keys.
    pub fn union(mut self, other: CoefficientStore) -> CoefficientStore {
        for (k, mut v) in other.entries {
            self.entries.entry(k).or_default().append(&mut v);
        }
        self
    }

    /// Add a zero residue for every prime that has no observation for a key,
    /// as a monomial that is absent modulo a prime has coefficient zero there.
    pub fn fill_gaps(mut self, primes: &[u64]) -> CoefficientStore {
        for obs in self.entries.values_mut() {
            for &p in primes {
                if !obs.iter().any(|o| o.prime == p) {
                    obs.push(Observation::new(p, ZI.zero()));
                }
            }
        }
        self
    }

    /// Reconstruct the exact Gaussian integer for every key.
    ///
    /// A key must be observed either with real residues only or with imaginary
    /// residues only, otherwise the per-prime results are inconsistent.
    pub fn reconstruct(&self) -> Result<HashMap<MonomialKey, Gaussian<Integer>>, CrtError> {
        let mut res = HashMap::with_capacity(self.entries.len());

        for (key, obs) in &self.entries {
            if obs.is_empty() {
                return Err(CrtError::NoObservations { key: key.clone() });
            }

            let real = obs.iter().all(|o| o.residue.im.cmp0().is_eq());
            let imaginary = obs.iter().all(|o| o.residue.re.cmp0().is_eq());

            let value = if real {
                let r = reconstruct_value(obs.iter().map(|o| (o.prime, &o.residue.re)))
                    .ok_or_else(|| CrtError::NotCoprime { key: key.clone() })?;
                Gaussian::new(r, Integer::new())
            } else if imaginary {
                let r = reconstruct_value(obs.iter().map(|o| (o.prime, &o.residue.im)))
                    .ok_or_else(|| CrtError::NotCoprime { key: key.clone() })?;
                Gaussian::new(Integer::new(), r)
            } else {
                return Err(CrtError::MixedObservation { key: key.clone() });
            };

            res.insert(key.clone(), value);
        }

        debug!("reconstructed {} coefficients", res.len());
        Ok(res)
    }
}

/// Find the value `v` with `v = c_i mod p_i` for all observations `(p_i, c_i)` that has
/// minimal absolute value, i.e. lies in `(-N/2, N/2]` for `N = prod p_i`.
///
/// Returns `None` if the moduli are not pairwise coprime.
pub fn reconstruct_value<'a>(observations: impl IntoIterator<Item = (u64, &'a Integer)>) -> Option<Integer> {
    let mut iter = observations.into_iter();
    let (p0, c0) = iter.next()?;

    let mut modulus = Integer::from(p0);
    let mut value = Integer::from(c0.rem_euc(&modulus));

    for (p, c) in iter {
        let p = Integer::from(p);
        value = chinese_remainder(&value, c, &modulus, &p)?;
        modulus *= &p;
    }

    Some(symmetric_mod(&value, &modulus))
}

/// Build a map over the Gaussian integers from reconstructed coefficients,
/// with the variables and metadata of `template`.
pub fn assemble<F: Ring>(
    values: &HashMap<MonomialKey, Gaussian<Integer>>,
    template: &PolynomialMap<F>,
) -> PolynomialMap<ZI> {
    let zero = MultivariatePolynomial::new(&ZI, None, template.variables.clone());
    let mut coordinates = vec![zero; template.n()];

    let mut keys: Vec<_> = values.keys().collect();
    keys.sort();
    for k in keys {
        coordinates[k.coordinate].append_monomial(values[k].clone(), &k.exponents);
    }

    template.with_coordinates(&format!("{}^{{-1}}", template.name), coordinates)
}
