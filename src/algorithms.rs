//! The inversion algorithms and the multi-modular pipeline.
use std::{fmt::Display, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, debug_span, info, instrument, warn};

use crate::{
    crt::{assemble, CoefficientStore},
    domains::{
        finite_field::FiniteField,
        gaussian::{GaussianRing, ZI},
        rational::Q,
        Field,
    },
    engine::{Engine, EngineField, ExternalGroebner},
    inverse::Inversion,
    mapping::{ExactMap, MappingError, ModularField, PolynomialMap},
    poly::substitute::SubstitutionConfig,
    InversionError,
};

/// A named inversion algorithm.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Algorithm {
    /// ABCH over the Gaussian rationals.
    Abch,
    AbchParallel,
    /// ABCH modulo every working prime, followed by CRT reconstruction.
    AbchCrt,
    AbchCrtParallel,
    /// The external Gröbner engine over the Gaussian rationals.
    GbExternal,
    GbExternalCrt,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown algorithm {0}, expected one of ABCH, ABCH_PARALLEL, ABCH_CRT, ABCH_CRT_PARALLEL, GB_EXTERNAL, GB_EXTERNAL_CRT")]
pub struct UnknownAlgorithm(pub String);

impl Algorithm {
    pub const ALL: [Algorithm; 6] = [
        Algorithm::Abch,
        Algorithm::AbchParallel,
        Algorithm::AbchCrt,
        Algorithm::AbchCrtParallel,
        Algorithm::GbExternal,
        Algorithm::GbExternalCrt,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Algorithm::Abch => "ABCH",
            Algorithm::AbchParallel => "ABCH_PARALLEL",
            Algorithm::AbchCrt => "ABCH_CRT",
            Algorithm::AbchCrtParallel => "ABCH_CRT_PARALLEL",
            Algorithm::GbExternal => "GB_EXTERNAL",
            Algorithm::GbExternalCrt => "GB_EXTERNAL_CRT",
        }
    }

    /// Returns true if the algorithm inverts modulo primes and reconstructs with the CRT.
    pub fn is_multi_modular(&self) -> bool {
        matches!(
            self,
            Algorithm::AbchCrt | Algorithm::AbchCrtParallel | Algorithm::GbExternalCrt
        )
    }

    pub fn is_external(&self) -> bool {
        matches!(self, Algorithm::GbExternal | Algorithm::GbExternalCrt)
    }

    /// Construct the engine that inverts a single map.
    pub fn engine(&self, options: &EngineOptions) -> Result<Engine, InversionError> {
        let config = SubstitutionConfig {
            parallel: matches!(self, Algorithm::AbchParallel | Algorithm::AbchCrtParallel),
            workers: options.workers,
            ..SubstitutionConfig::default()
        };

        if self.is_external() {
            let command = options.engine_command.as_deref().unwrap_or_default();
            Ok(Engine::ExternalGroebner(ExternalGroebner::new(
                command,
                &options.method,
            )?))
        } else {
            Ok(Engine::Abch(config))
        }
    }
}

impl Display for Algorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Algorithm {
    type Err = UnknownAlgorithm;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Algorithm::ALL
            .into_iter()
            .find(|a| a.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownAlgorithm(s.to_owned()))
    }
}

/// Settings that select and configure an engine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EngineOptions {
    /// The Gröbner basis method for the external engine.
    pub method: String,
    /// The command line of the external engine.
    pub engine_command: Option<String>,
    /// The thread count of the term-parallel evaluator.
    pub workers: usize,
}

impl Default for EngineOptions {
    fn default() -> Self {
        EngineOptions {
            method: String::new(),
            engine_command: None,
            workers: SubstitutionConfig::default().workers,
        }
    }
}

/// The inverse of a map together with the conditions that make it unreliable.
#[derive(Clone, Debug)]
pub struct InversionOutcome {
    pub inverse: ExactMap,
    pub warnings: Vec<String>,
}

/// Invert `map` with `algorithm`.
#[instrument(skip_all, fields(algorithm = %algorithm, map = %map.name))]
pub fn invert(
    map: &ExactMap,
    algorithm: Algorithm,
    options: &EngineOptions,
) -> Result<InversionOutcome, InversionError> {
    let engine = algorithm.engine(options)?;

    if algorithm.is_multi_modular() {
        return invert_multi_modular(map, &engine);
    }

    let inv = engine.invert(map)?;
    let warnings = exhaustion_warnings(&inv, None);
    Ok(InversionOutcome {
        inverse: inv.map,
        warnings,
    })
}

/// Invert `map` modulo each of its primes with `engine` and reconstruct the exact inverse.
///
/// The primes are vetted before any inversion runs. The map is first scaled with
/// the Segre homotopy so that it has Gaussian integer coefficients, and the
/// reconstructed inverse is scaled back.
pub fn invert_multi_modular(
    map: &ExactMap,
    engine: &Engine,
) -> Result<InversionOutcome, InversionError> {
    map.validate_primes()?;
    let scaled = map.segre_homotopy()?;

    let (scaled_inverse, warnings) = if map.imaginary {
        invert_per_prime::<GaussianRing<FiniteField>>(&scaled, engine)?
    } else {
        invert_per_prime::<FiniteField>(&scaled, engine)?
    };

    let r_inv = Q.try_inv(&map.r).ok_or(MappingError::ZeroScaling)?;
    let mut inverse = scaled_inverse.to_exact().scale(&r_inv)?;
    inverse.name = format!("{}^{{-1}}", map.name).into();
    inverse.r = map.r.clone();

    Ok(InversionOutcome { inverse, warnings })
}

fn invert_per_prime<M: ModularField + EngineField>(
    scaled: &PolynomialMap<ZI>,
    engine: &Engine,
) -> Result<(PolynomialMap<ZI>, Vec<String>), InversionError> {
    let mut store = CoefficientStore::new();
    let mut warnings = vec![];

    for &p in &scaled.primes {
        let _span = debug_span!("prime", p).entered();

        let reduced = scaled.reduce(M::for_prime(p));
        debug!("reduced {} into {}", scaled.name, reduced.field());

        let inv = engine.invert(&reduced)?;
        warnings.extend(exhaustion_warnings(&inv, Some(p)));
        store = store.union(CoefficientStore::from_map(&inv.map));
    }

    let values = store.fill_gaps(&scaled.primes).reconstruct()?;
    info!(
        "reconstructed {} coefficients from {} primes",
        values.len(),
        scaled.primes.len()
    );

    Ok((assemble(&values, scaled), warnings))
}

fn exhaustion_warnings<F: EngineField>(inv: &Inversion<F>, prime: Option<u64>) -> Vec<String> {
    inv.exhausted()
        .into_iter()
        .map(|i| {
            let w = match prime {
                Some(p) => format!("coordinate {} is not Pascal finite modulo {}", i + 1, p),
                None => format!("coordinate {} is not Pascal finite", i + 1),
            };
            warn!("{}", w);
            w
        })
        .collect()
}

#[cfg(test)]
mod test {
    use crate::{
        mapping::{ExactMap, MapOptions, MappingError},
        InversionError,
    };

    use super::{invert, Algorithm, EngineOptions};

    #[test]
    fn names() {
        for a in Algorithm::ALL {
            assert_eq!(a.name().parse::<Algorithm>().unwrap(), a);
            assert_eq!(
                serde_json::to_string(&a).unwrap(),
                format!("\"{}\"", a.name())
            );
        }
        assert_eq!("abch_crt".parse::<Algorithm>().unwrap(), Algorithm::AbchCrt);
        assert!("SAGE".parse::<Algorithm>().is_err());
    }

    #[test]
    fn scaled_cubic() {
        let f = ExactMap::parse(
            &["X1", "X2 - 1/3*X1^3"],
            "F",
            &MapOptions::default().segre_constant(3),
        )
        .unwrap();

        for a in [Algorithm::Abch, Algorithm::AbchCrt, Algorithm::AbchCrtParallel] {
            let res = invert(&f, a, &EngineOptions::default()).unwrap();
            assert_eq!(res.inverse.name.as_str(), "F^{-1}");
            assert_eq!(res.inverse.coordinates[1].to_string(), "1/3*X1^3+X2");
            assert!(res.warnings.is_empty());
        }
    }

    #[test]
    fn unscaled_denominator() {
        let f = ExactMap::parse(&["X1", "X2 - 1/3*X1^3"], "F", &MapOptions::default()).unwrap();
        assert!(matches!(
            invert(&f, Algorithm::AbchCrt, &EngineOptions::default()),
            Err(InversionError::Mapping(MappingError::NotIntegral { .. }))
        ));
    }

    #[test]
    fn missing_engine() {
        let f = ExactMap::parse(&["X1", "X2"], "F", &MapOptions::default()).unwrap();
        assert!(matches!(
            invert(&f, Algorithm::GbExternal, &EngineOptions::default()),
            Err(InversionError::Engine(_))
        ));
    }
}
