//! Polyinv inverts polynomial automorphisms `F = X + H` of affine space.
//!
//! The inverse is computed with the truncated fixed-point method of Adjamagbo,
//! van den Essen, Cheng and Hubbers (ABCH), either exactly over the Gaussian
//! rationals or modulo several primes followed by reconstruction of the exact
//! coefficients with the Chinese remainder theorem. Long computations run in
//! worker processes under time and memory limits.
//!
//! For example:
//!
//! ```
//! use polyinv::mapping::{ExactMap, MapOptions};
//! use polyinv::algorithms::{invert, Algorithm, EngineOptions};
//!
//! let f = ExactMap::parse(
//!     &["X1", "X2 - 1/3*X1^3"],
//!     "F",
//!     &MapOptions::default().segre_constant(3),
//! )
//! .unwrap();
//! let g = invert(&f, Algorithm::AbchCrt, &EngineOptions::default()).unwrap();
//! assert_eq!(g.inverse.coordinates[1].to_string(), "1/3*X1^3+X2");
//! ```
use rayon::ThreadPoolBuildError;
use thiserror::Error;

pub mod algorithms;
pub mod catalog;
pub mod crt;
pub mod domains;
pub mod engine;
pub mod inverse;
pub mod mapping;
pub mod parser;
pub mod poly;
pub mod run;
pub mod supervisor;
pub mod verify;

#[derive(Error, Debug)]
pub enum InversionError {
    #[error(transparent)]
    Parse(#[from] parser::ParseError),
    #[error(transparent)]
    Mapping(#[from] mapping::MappingError),
    #[error(transparent)]
    Crt(#[from] crt::CrtError),
    #[error(transparent)]
    Engine(#[from] engine::EngineError),
    #[error("could not build the thread pool: {0}")]
    ThreadPool(#[from] ThreadPoolBuildError),
}

impl InversionError {
    /// A short label for the kind of error.
    pub fn kind(&self) -> &'static str {
        match self {
            InversionError::Parse(_) => "ParseError",
            InversionError::Mapping(_) => "MappingError",
            InversionError::Crt(_) => "CrtError",
            InversionError::Engine(_) => "EngineError",
            InversionError::ThreadPool(_) => "ThreadPoolBuildError",
        }
    }
}
