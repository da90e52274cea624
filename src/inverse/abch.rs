use rayon::ThreadPoolBuildError;
use tracing::{debug, instrument, warn};

use crate::{
    domains::Ring,
    mapping::PolynomialMap,
    poly::{
        polynomial::MultivariatePolynomial,
        substitute::{SubstitutionConfig, TruncatedEvaluator},
    },
};

use super::{degree::DegreeProfile, Inversion, SolverState};

/// The fixed-point iteration `p <- p - trunc(p(F))`, `G_i <- G_i + p` for one coordinate.
///
/// Starting from `p = G_i = X_i`, the accumulated `G_i` converges to the `i`th
/// coordinate of the inverse of `F` if and only if `p` eventually vanishes.
pub struct CoordinateIteration<'a, 'b, F: Ring> {
    evaluator: &'b TruncatedEvaluator<'a, F>,
    p: MultivariatePolynomial<F>,
    result: MultivariatePolynomial<F>,
    step: u64,
    step_ceiling: u64,
    state: SolverState,
}

impl<'a, 'b, F: Ring> CoordinateIteration<'a, 'b, F> {
    /// Start the iteration for coordinate `var`. If `step_ceiling` is `None`,
    /// the coordinate is the identity and the iteration is skipped.
    pub fn new(
        evaluator: &'b TruncatedEvaluator<'a, F>,
        x: MultivariatePolynomial<F>,
        step_ceiling: Option<u64>,
    ) -> Self {
        let (state, step_ceiling) = match step_ceiling {
            Some(s) => (SolverState::Iterating, s),
            None => (SolverState::Skipped, 0),
        };

        CoordinateIteration {
            evaluator,
            p: x.clone(),
            result: x,
            step: 0,
            step_ceiling,
            state,
        }
    }

    pub fn state(&self) -> SolverState {
        self.state
    }

    pub fn steps(&self) -> u64 {
        self.step
    }

    /// The current approximation of the inverse coordinate.
    pub fn result(&self) -> &MultivariatePolynomial<F> {
        &self.result
    }

    /// Perform one iteration step and return the new state.
    pub fn step(&mut self) -> SolverState {
        if self.state.is_terminal() {
            return self.state;
        }

        self.step += 1;
        let delta = self.evaluator.evaluate(&self.p);
        self.p = &self.p - &delta;
        self.result = &self.result + &self.p;

        if self.p.is_zero() {
            debug!("P_{} = 0", self.step);
            self.state = SolverState::Converged;
        } else {
            debug!(
                "P_{} has degree: {}, ldegree: {}, length: {}",
                self.step,
                self.p.degree(),
                self.p.ldegree(),
                self.p.nterms()
            );

            if self.step >= self.step_ceiling {
                self.state = SolverState::BoundExhausted;
            }
        }

        self.state
    }

    /// Iterate until a terminal state is reached.
    pub fn run(mut self) -> (MultivariatePolynomial<F>, SolverState, u64) {
        while !self.step().is_terminal() {}
        (self.result, self.state, self.step)
    }
}

/// Invert the map `F` coordinate by coordinate with the ABCH method.
///
/// Coordinates that do not converge within their step ceiling are returned as
/// truncated approximations and are marked [SolverState::BoundExhausted].
#[instrument(skip_all, fields(map = %map.name, parallel = config.parallel))]
pub fn invert<F: Ring>(
    map: &PolynomialMap<F>,
    config: &SubstitutionConfig,
) -> Result<Inversion<F>, ThreadPoolBuildError> {
    let profile = DegreeProfile::analyze(map);
    debug!(
        "D = {}, d = {}, inversion degree boundary: {}",
        profile.max_shift, profile.min_shift, profile.degree_ceiling
    );

    let evaluator = TruncatedEvaluator::new(&map.coordinates, profile.degree_ceiling, config)?;

    let mut coordinates = Vec::with_capacity(map.n());
    let mut states = Vec::with_capacity(map.n());
    let mut steps = Vec::with_capacity(map.n());

    for i in 0..map.n() {
        let x = map.variable(i);
        let step_ceiling = profile.step_ceiling(i);
        match step_ceiling {
            Some(s) => debug!("executing algorithm for {}, maximum number of steps: {}", x, s),
            None => debug!("{} is the identity, there is no need to perform the algorithm", x),
        }

        let (g, state, n_steps) = CoordinateIteration::new(&evaluator, x, step_ceiling).run();

        if state == SolverState::BoundExhausted {
            warn!(
                "{}: coordinate {} is not Pascal finite after {} steps",
                map.name,
                i + 1,
                n_steps
            );
        }

        coordinates.push(g);
        states.push(state);
        steps.push(n_steps);
    }

    Ok(Inversion {
        map: map.with_coordinates(&format!("{}^{{-1}}", map.name), coordinates),
        states,
        steps,
    })
}
