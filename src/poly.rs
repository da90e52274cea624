//! Sparse multivariate polynomials over an arbitrary [Ring](crate::domains::Ring),
//! together with the truncated substitution and Jacobian routines used by the solvers.
pub mod jacobian;
pub mod polynomial;
pub mod substitute;

use std::fmt::Display;
use std::sync::Arc;

use smartstring::{LazyCompact, SmartString};

/// The number of exponents that are stored inline before spilling to the heap
/// in temporary monomial buffers.
pub const INLINED_EXPONENTS: usize = 6;

/// A named polynomial variable, such as `X1`.
#[derive(Clone, PartialEq, Eq, Hash, Debug, PartialOrd, Ord)]
pub struct Variable(SmartString<LazyCompact>);

impl Variable {
    pub fn new(name: &str) -> Variable {
        Variable(name.into())
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl From<&str> for Variable {
    fn from(name: &str) -> Variable {
        Variable::new(name)
    }
}

impl Display for Variable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Create the variable list `X1, ..., Xn`.
pub fn standard_variables(n: usize) -> Arc<Vec<Variable>> {
    Arc::new(
        (1..=n)
            .map(|i| Variable::new(&format!("X{}", i)))
            .collect(),
    )
}
