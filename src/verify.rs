//! Exact verification of a candidate inverse.
use tracing::{debug, warn};

use crate::{
    domains::{gaussian::QI, Ring},
    mapping::ExactMap,
    poly::{jacobian::has_unit_jacobian, substitute::substitute},
};

/// Check that `G_i(F) = c X_i` for every coordinate, with `c` a non-zero constant.
///
/// A constant `c != 1` means that `G` inverts `F` only up to a scaling of the
/// coordinates, which is accepted with a warning.
pub fn check_inversion(f: &ExactMap, g: &ExactMap) -> bool {
    if f.n() != g.n() || f.variables != g.variables {
        warn!("{} and {} have different variables", f.name, g.name);
        return false;
    }

    let mut ok = true;
    for (i, gi) in g.coordinates.iter().enumerate() {
        let composed = substitute(gi, &f.coordinates);
        let x = f.variable(i);

        if composed.nterms() != 1 || composed.exponents(0) != x.exponents(0) {
            warn!(
                "{}_{}({}) = {}, which is not a multiple of {}",
                g.name,
                i + 1,
                f.name,
                composed,
                x
            );
            ok = false;
            continue;
        }

        let c = &composed.coefficients[0];
        if !QI.is_one(c) {
            warn!(
                "{}_{}({}) = {}, which is {} only up to a constant",
                g.name,
                i + 1,
                f.name,
                composed,
                x
            );
        } else {
            debug!("{}_{}({}) = {}", g.name, i + 1, f.name, x);
        }
    }

    ok
}

/// Check that the Jacobian determinant of `F` is the constant 1.
pub fn check_jacobian(f: &ExactMap) -> bool {
    let ok = has_unit_jacobian(&f.coordinates);
    if !ok {
        warn!("the Jacobian determinant of {} is not 1", f.name);
    }
    ok
}

#[cfg(test)]
mod test {
    use crate::mapping::{ExactMap, MapOptions};

    use super::{check_inversion, check_jacobian};

    fn parse(coords: &[&str]) -> ExactMap {
        ExactMap::parse(coords, "F", &MapOptions::default()).unwrap()
    }

    #[test]
    fn inversion() {
        let f = parse(&["X1", "X2 - 1/3*X1^3"]);
        assert!(check_inversion(&f, &parse(&["X1", "X2 + 1/3*X1^3"])));
        assert!(!check_inversion(&f, &parse(&["X1", "X2 - 1/3*X1^3"])));
        assert!(!check_inversion(&f, &parse(&["X1", "X2 + 1/3*X1^3 + 1"])));
        // accepted up to a constant factor
        assert!(check_inversion(&f, &parse(&["X1", "2*X2 + 2/3*X1^3"])));
        assert!(!check_inversion(&f, &parse(&["X1"; 2])));
    }

    #[test]
    fn jacobian() {
        assert!(check_jacobian(&parse(&["X1", "X2 - 1/3*X1^3"])));
        assert!(!check_jacobian(&parse(&["2*X1", "X2"])));
        assert!(!check_jacobian(&parse(&["X1 + X2^2", "X2 + X1^2"])));
    }
}
