//! Inversion of near-identity polynomial maps with the truncated fixed-point method
//! of Adjamagbo, van den Essen, Cheng and Hubbers (ABCH).
pub mod abch;
pub mod degree;

use std::fmt::Display;

use serde::{Deserialize, Serialize};

use crate::{domains::Ring, mapping::PolynomialMap};

/// The state of the fixed-point iteration for a single coordinate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SolverState {
    Iterating,
    /// The remainder vanished, so the result is the exact inverse coordinate.
    Converged,
    /// The step ceiling was reached before the remainder vanished. The result is
    /// only a truncated approximation and the map is not Pascal finite.
    BoundExhausted,
    /// The coordinate is the identity and needs no iteration.
    Skipped,
}

impl SolverState {
    /// Returns true if no more steps will be taken.
    pub fn is_terminal(&self) -> bool {
        *self != SolverState::Iterating
    }
}

impl Display for SolverState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            SolverState::Iterating => "iterating",
            SolverState::Converged => "converged",
            SolverState::BoundExhausted => "bound exhausted",
            SolverState::Skipped => "skipped",
        })
    }
}

/// A candidate inverse map together with the terminal state of every coordinate.
#[derive(Clone, Debug)]
pub struct Inversion<F: Ring> {
    pub map: PolynomialMap<F>,
    pub states: Vec<SolverState>,
    pub steps: Vec<u64>,
}

impl<F: Ring> Inversion<F> {
    /// Create an inversion result for an engine that does not iterate,
    /// where every coordinate is exact.
    pub fn exact(map: PolynomialMap<F>) -> Self {
        let n = map.n();
        Inversion {
            map,
            states: vec![SolverState::Converged; n],
            steps: vec![0; n],
        }
    }

    /// The coordinates that ended in [SolverState::BoundExhausted].
    pub fn exhausted(&self) -> Vec<usize> {
        self.states
            .iter()
            .enumerate()
            .filter(|(_, s)| **s == SolverState::BoundExhausted)
            .map(|(i, _)| i)
            .collect()
    }

    /// Returns true if every coordinate is exact.
    pub fn is_exact(&self) -> bool {
        self.exhausted().is_empty()
    }
}
