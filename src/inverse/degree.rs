use tracing::warn;

use crate::{domains::Ring, mapping::PolynomialMap};

/// Degree data of a map `F = X + H` that bounds the ABCH iteration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DegreeProfile {
    /// `D`, the maximal degree of all remainders `F_i - X_i`.
    pub max_shift: u32,
    /// `d`, the minimal degree of all remainders `F_i - X_i`.
    pub min_shift: u32,
    /// The lowest degree of `F_i - X_i`, or `None` if the remainder vanishes.
    pub lower: Vec<Option<u32>>,
    /// `D^(n-1)`, the maximal degree of the inverse. At least 1.
    pub degree_ceiling: u32,
}

impl DegreeProfile {
    pub fn analyze<F: Ring>(map: &PolynomialMap<F>) -> DegreeProfile {
        let n = map.n();
        let mut max_shift = None::<u32>;
        let mut min_shift = None::<u32>;
        let mut lower = Vec::with_capacity(n);

        for i in 0..n {
            let h = map.remainder(i);
            if h.is_zero() {
                lower.push(None);
                continue;
            }

            let (lo, hi) = (h.ldegree(), h.degree());
            max_shift = Some(max_shift.map_or(hi, |m| m.max(hi)));
            min_shift = Some(min_shift.map_or(lo, |m| m.min(lo)));
            lower.push(Some(lo));
        }

        let non_identity = map.non_identity_coordinates();
        if !non_identity.is_empty() {
            warn!(
                "{} is not a near-identity map in coordinates {:?}",
                map.name, non_identity
            );
        }

        let max_shift = max_shift.unwrap_or(0);
        let degree_ceiling = (max_shift as u64)
            .checked_pow(n as u32 - 1)
            .unwrap_or(u64::MAX)
            .clamp(1, u32::MAX as u64) as u32;

        DegreeProfile {
            max_shift,
            min_shift: min_shift.unwrap_or(0),
            lower,
            degree_ceiling,
        }
    }

    /// The maximal number of iteration steps for coordinate `i`, or `None` if
    /// the coordinate is the identity and needs no iteration.
    ///
    /// Every step raises the lowest degree of the remainder by at least `d - 1`,
    /// so for `d > 1` the remainder vanishes after at most
    /// `floor((D^(n-1) - lower[i]) / (d - 1)) + 2` steps if the map is Pascal finite.
    pub fn step_ceiling(&self, i: usize) -> Option<u64> {
        let lower = self.lower[i]?;

        if self.min_shift > 1 {
            let span = self.degree_ceiling as i64 - lower as i64;
            let steps = span.div_euclid(self.min_shift as i64 - 1) + 2;
            Some(steps.max(1) as u64)
        } else {
            Some(self.degree_ceiling as u64)
        }
    }
}

#[cfg(test)]
mod test {
    use crate::mapping::{ExactMap, MapOptions};

    use super::DegreeProfile;

    #[test]
    fn cubic() {
        let f = ExactMap::parse(&["X1", "X2 - 1/3*X1^3"], "F", &MapOptions::default()).unwrap();
        let p = DegreeProfile::analyze(&f);
        assert_eq!(p.max_shift, 3);
        assert_eq!(p.min_shift, 3);
        assert_eq!(p.lower, [None, Some(3)]);
        assert_eq!(p.degree_ceiling, 3);
        assert_eq!(p.step_ceiling(0), None);
        // floor((3 - 3) / 2) + 2
        assert_eq!(p.step_ceiling(1), Some(2));
    }

    #[test]
    fn mixed_degrees() {
        let f = ExactMap::parse(
            &["X1", "X2 - X1^2", "X3 - X2^2 - X1^3*X2"],
            "F",
            &MapOptions::default(),
        )
        .unwrap();
        let p = DegreeProfile::analyze(&f);
        assert_eq!((p.max_shift, p.min_shift), (4, 2));
        assert_eq!(p.degree_ceiling, 16);
        assert_eq!(p.step_ceiling(1), Some(16));
        assert_eq!(p.step_ceiling(2), Some(16));
    }

    #[test]
    fn linear_shift() {
        let f = ExactMap::parse(&["X1 + X2", "X2 + X1^2"], "F", &MapOptions::default()).unwrap();
        let p = DegreeProfile::analyze(&f);
        assert_eq!(p.min_shift, 1);
        assert_eq!(p.step_ceiling(0), Some(p.degree_ceiling as u64));
    }

    #[test]
    fn identity() {
        let f = ExactMap::parse(&["X1", "X2"], "F", &MapOptions::default()).unwrap();
        let p = DegreeProfile::analyze(&f);
        assert_eq!(p.degree_ceiling, 1);
        assert!(p.lower.iter().all(|l| l.is_none()));
    }
}
