use polyinv::{
    algorithms::{invert, Algorithm, EngineOptions},
    catalog,
    crt::CrtError,
    mapping::{ExactMap, MapOptions, MappingError},
    verify::check_inversion,
    InversionError,
};

fn parse(coords: &[&str], options: &MapOptions) -> ExactMap {
    ExactMap::parse(coords, "F", options).unwrap()
}

#[test]
fn triangular() {
    let f = parse(&["X1", "X2 - X1^2", "X3 - X2^2"], &MapOptions::default());
    let expected = parse(
        &["X1", "X2 + X1^2", "X3 + X2^2 + 2*X1^2*X2 + X1^4"],
        &MapOptions::default(),
    );

    for a in [
        Algorithm::Abch,
        Algorithm::AbchParallel,
        Algorithm::AbchCrt,
        Algorithm::AbchCrtParallel,
    ] {
        let g = invert(&f, a, &EngineOptions::default()).unwrap();
        assert_eq!(g.inverse.coordinates, expected.coordinates, "{}", a);
        assert!(check_inversion(&f, &g.inverse));
    }
}

#[test]
fn gaussian_coefficients() {
    let options = MapOptions::default().primes(&[3, 7]).imaginary();
    let f = parse(&["X1", "X2 + I*X1^2"], &options);
    let g = invert(&f, Algorithm::AbchCrt, &EngineOptions::default()).unwrap();

    assert_eq!(
        g.inverse.coordinates,
        parse(&["X1", "X2 - I*X1^2"], &options).coordinates
    );
    assert!(check_inversion(&f, &g.inverse));
}

#[test]
fn mixed_observation() {
    let options = MapOptions::default().primes(&[3, 7]).imaginary();
    let f = parse(&["X1", "X2 + (1 + I)*X1^2"], &options);
    assert!(matches!(
        invert(&f, Algorithm::AbchCrt, &EngineOptions::default()),
        Err(InversionError::Crt(CrtError::MixedObservation { .. }))
    ));

    // the exact algorithm has no such restriction
    let g = invert(&f, Algorithm::Abch, &EngineOptions::default()).unwrap();
    assert!(check_inversion(&f, &g.inverse));
}

#[test]
fn prime_vetting() {
    let f = parse(&["X1", "X2 - X1^2"], &MapOptions::default().primes(&[3, 15]));
    assert!(matches!(
        invert(&f, Algorithm::AbchCrt, &EngineOptions::default()),
        Err(InversionError::Mapping(MappingError::NotOddPrime(15)))
    ));

    let f = parse(
        &["X1", "X2 - I*X1^2"],
        &MapOptions::default().primes(&[3, 5]).imaginary(),
    );
    assert!(matches!(
        invert(&f, Algorithm::AbchCrt, &EngineOptions::default()),
        Err(InversionError::Mapping(MappingError::NotInert(5)))
    ));
}

#[test]
fn bound_exhausted_is_reported() {
    let f = parse(&["X1 + X2", "X2"], &MapOptions::default());
    let g = invert(&f, Algorithm::Abch, &EngineOptions::default()).unwrap();
    assert_eq!(g.warnings, ["coordinate 1 is not Pascal finite"]);
    // the candidate happens to be correct, but the solver could not prove it
    assert!(check_inversion(&f, &g.inverse));
}

#[test]
fn hubbers_maps() {
    for name in ["H1", "H2", "H4"] {
        let f = catalog::get(name).unwrap();
        let exact = invert(&f, Algorithm::Abch, &EngineOptions::default()).unwrap();
        let modular = invert(&f, Algorithm::AbchCrtParallel, &EngineOptions::default()).unwrap();

        assert!(exact.warnings.is_empty(), "{}", name);
        assert_eq!(exact.inverse.coordinates, modular.inverse.coordinates, "{}", name);
        assert!(check_inversion(&f, &modular.inverse), "{}", name);
    }
}
