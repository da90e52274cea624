//! Named polynomial maps: the maps of Hubbers (`H1`-`H8`), the gradient maps of
//! de Bondt (`B1`-`B6`) and the examples `EX17`, `EX19` and `EX20` of
//! "Algorithm for studying polynomial maps and reductions modulo prime number".
use crate::{
    mapping::{ExactMap, MapOptions, MappingError},
    parser::PolynomialParser,
    poly::standard_variables,
};

enum Definition {
    Coordinates(&'static [&'static str]),
    /// `X + grad(g)` in `n` variables.
    Gradient { n: usize, g: &'static str },
}

struct CatalogEntry {
    name: &'static str,
    definition: Definition,
    params: &'static [(&'static str, &'static str)],
    r: i64,
    primes: &'static [u64],
    imaginary: bool,
}

const DEFAULT_PRIMES: &[u64] = &[3, 5, 7];

static CATALOG: &[CatalogEntry] = &[
    CatalogEntry {
        name: "H1",
        definition: Definition::Coordinates(&[
            "X1",
            "X2",
            "X3",
            concat!(
                "X4 - a4*X1^3 - b4*X1^2*X2 - c4*X1^2*X3 - e4*X1*X2^2 - f4*X1*X2*X3",
                "- h4*X1*X3^2 - k4*X2^3 - l4*X2^2*X3 - n4*X2*X3^2 - q4*X3^3"
            ),
        ]),
        params: &[
            ("a4", "1"),
            ("b4", "1"),
            ("c4", "1"),
            ("e4", "1"),
            ("f4", "1"),
            ("h4", "1"),
            ("k4", "1"),
            ("l4", "1"),
            ("n4", "1"),
            ("q4", "1"),
        ],
        r: 1,
        primes: DEFAULT_PRIMES,
        imaginary: false,
    },
    CatalogEntry {
        name: "H2",
        definition: Definition::Coordinates(&[
            "X1",
            "X2 - 1/3*X1^3 - h2*X1*X3**2 - q2*X3**3",
            "X3",
            "X4 - X1**2 - h4*X1*X3**2 - q4*X3**3",
        ]),
        params: &[("h2", "1"), ("q2", "1"), ("h4", "1"), ("q4", "1")],
        r: 3,
        primes: DEFAULT_PRIMES,
        imaginary: false,
    },
    CatalogEntry {
        name: "H3",
        definition: Definition::Coordinates(&[
            "X1",
            concat!(
                "X2 - 1/3*X1^3 - c1*X1^2*X4 + 3*c1*X1*X2*X3 - (16*q4*c1^2-r4^2)/48/c1^2*X1*X3^2",
                "- 1/2*r4*X1*X3*X4 + 3/4*r4*X2*X3^2 - r4*q4/12/c1*X3^3 - r4^2/16/c1*X3^2*X4"
            ),
            "X3",
            "X4 -X1^2*X3 + r4/4/c1*X1*X3^2 - 3*c1*X1*X3*X4 + 9*c1*X2*X3^2 - q4*X3^3 - 3/4*r4*X3^2*X4",
        ]),
        params: &[("c1", "1"), ("q4", "1"), ("r4", "1")],
        r: 48,
        primes: &[3, 5, 7, 11, 13, 17],
        imaginary: false,
    },
    CatalogEntry {
        name: "H4",
        definition: Definition::Coordinates(&[
            "X1",
            "X2 - 1/3*X1^3",
            "X3 - X1^2*X2 - e3*X1*X2^2 -k3*X2^3",
            "X4 - e4*X1*X2^2 - k4*X2^3",
        ]),
        params: &[("e3", "1"), ("k3", "1"), ("e4", "1"), ("k4", "1")],
        r: 3,
        primes: &[3, 5, 7, 11, 13],
        imaginary: false,
    },
    CatalogEntry {
        name: "H5",
        definition: Definition::Coordinates(&[
            "X1",
            "X2 - 1/3*X1^3 + i3*X1*X2*X4 - j2*X1*X4^2 + s3*X2*X4^2 + i3^2*X3*X4^2 - t2*X4^3",
            concat!(
                "X3 - X1^2*X2 - 2*s3/i3*X1*X2*X4 - i3*X1*X3*X4 - j3*X1*X4^2 - s3^2/i3^2*X2*X4^2",
                " - s3*X3*X4^2 - t3*X4^3"
            ),
            "X4",
        ]),
        params: &[
            ("i3", "1"),
            ("j2", "1"),
            ("s3", "1"),
            ("t2", "1"),
            ("t3", "1"),
            ("j3", "1"),
        ],
        r: 3,
        primes: &[3, 5, 7, 11, 13],
        imaginary: false,
    },
    CatalogEntry {
        name: "H6",
        definition: Definition::Coordinates(&[
            "X1",
            "X2 - 1/3*X1^3 - j2*X1*X4^2 - t2*X4^3",
            "X3 - X1^2*X2 - e3*X1*X2^2 - g3*X1*X2*X4 - j3*X1*X4^2 - k3*X2^3 - m3*X2^2*X4",
            "X4",
        ]),
        params: &[
            ("j2", "1"),
            ("t2", "1"),
            ("e3", "1"),
            ("g3", "1"),
            ("j3", "1"),
            ("k3", "1"),
            ("m3", "1"),
        ],
        r: 3,
        primes: &[5, 7, 11, 13, 17],
        imaginary: false,
    },
    CatalogEntry {
        name: "H7",
        definition: Definition::Coordinates(&[
            "X1",
            "X2-(1/3)*X1^3",
            "-X1*X2^2*e3-X2^3*k3-X1^2*X2+X3",
            "-X1*X2^2*e4-X1*X2*X3*f4-X1*X3^2*h4-X2^3*k4-X2^2*X3*l4-X2*X3^2*n4-X3^3*q4-X1^2*X3+X4",
        ]),
        params: &[
            ("e3", "1"),
            ("k3", "1"),
            ("e4", "1"),
            ("f4", "1"),
            ("h4", "1"),
            ("k4", "1"),
            ("l4", "1"),
            ("n4", "1"),
            ("q4", "1"),
        ],
        r: 3,
        primes: &[5, 7, 11, 13, 17, 23, 29, 31, 37],
        imaginary: false,
    },
    CatalogEntry {
        name: "H8",
        definition: Definition::Coordinates(&[
            "X1",
            "X2-(1/3)*X1^3",
            "X2^2*X4*g4^2-X1*X2^2*e3+X1*X2*X3*g4-X2^3*k3+X2^2*X3*m4-X1^2*X2+X3",
            "X4-X1^2*X3-e4*X1*X2^2-2*m4*X1*X2*X3/g4-g4*X1*X2*X4-k4*X2^3-m4^2*X2^2*X3/g4^2-m4*X2^2*X4",
        ]),
        params: &[
            ("g4", "1"),
            ("e3", "1"),
            ("k3", "1"),
            ("m4", "1"),
            ("e4", "1"),
            ("k4", "1"),
        ],
        r: 3,
        primes: &[5, 7, 11, 13, 17, 19, 23],
        imaginary: false,
    },
    CatalogEntry {
        name: "B1",
        definition: Definition::Gradient {
            n: 5,
            g: "(((X4+I*X5)^2-1)*X1+(2*(X4+I*X5))*X2+I*((X4+I*X5)^2+1)*X3)^2",
        },
        params: &[],
        r: 1,
        primes: &[3, 7, 11, 47],
        imaginary: true,
    },
    CatalogEntry {
        name: "B2",
        definition: Definition::Gradient {
            n: 5,
            g: concat!(
                "(((X4+I*X5)^2-1)*X1+(2*(X4+I*X5))*X2+I*((X4+I*X5)^2+1)*X3)",
                "*((2*(X4+I*X5))*X1-((X4+I*X5)^2-1)*X2)"
            ),
        },
        params: &[],
        r: 1,
        primes: &[3, 7, 11, 19, 23],
        imaginary: true,
    },
    CatalogEntry {
        name: "B3",
        definition: Definition::Gradient {
            n: 7,
            g: concat!(
                "(((X4+I*X5)^2-(X6+I*X7)^2)*X1+(2*(X4+I*X5))*(X6+I*X7)*X2",
                "+I*((X4+I*X5)^2+(X6+I*X7)^2)*X3)^2"
            ),
        },
        params: &[],
        r: 1,
        primes: &[3, 7, 11, 19, 23],
        imaginary: true,
    },
    CatalogEntry {
        name: "B4",
        definition: Definition::Gradient {
            n: 7,
            g: concat!(
                "(((X4+I*X5)^2-(X6+I*X7)^2)*X1+(2*(X4+I*X5))*(X6+I*X7)*X2",
                "+I*((X4+I*X5)^2+(X6+I*X7)^2)*X3)",
                "*((2*(X4+I*X5))*(X6+I*X7)*X1-((X4+I*X5)^2-(X6+I*X7)^2)*X2)"
            ),
        },
        params: &[],
        r: 1,
        primes: &[3, 7, 11, 19, 23],
        imaginary: true,
    },
    CatalogEntry {
        name: "B5",
        definition: Definition::Gradient {
            n: 7,
            g: concat!(
                "(((X4+I*X5)^2-(X6+I*X7)^2)*X1+(2*(X4+I*X5))*(X6+I*X7)*X2",
                "+I*((X4+I*X5)^2+(X6+I*X7)^2)*X3)^2",
                "+(X6+I*X7)^5*X4"
            ),
        },
        params: &[],
        r: 1,
        primes: &[3, 7, 11, 19, 23],
        imaginary: true,
    },
    CatalogEntry {
        name: "B6",
        definition: Definition::Gradient {
            n: 7,
            g: concat!(
                "(((X4+I*X5)^2-(X6+I*X7)^2)*X1+(2*(X4+I*X5))*(X6+I*X7)*X2",
                "+I*((X4+I*X5)^2+(X6+I*X7)^2)*X3)",
                "*((2*(X4+I*X5))*(X6+I*X7)*X1-((X4+I*X5)^2-(X6+I*X7)^2)*X2)",
                "+(X6+I*X7)^5*X4"
            ),
        },
        params: &[],
        r: 1,
        primes: &[3, 7, 11, 19, 23],
        imaginary: true,
    },
    CatalogEntry {
        name: "EX17",
        definition: Definition::Coordinates(&[
            "X1",
            "1/3*X1**3 + X2",
            concat!(
                "-1/243*X1**15 - 2/81*X1**13 - 5/81*X1**12*X2 - 1/27*X1**11 - 8/27*X1**10*X2",
                " - 10/27*X1**9*X2**2 - 2/27*X1**9 - 1/3*X1**8*X2 - 4/3*X1**7*X2**2",
                " - 10/9*X1**6*X2**3 + 1/9*X1**7 - 1/3*X1**6*X2 - X1**5*X2**2",
                " - 8/3*X1**4*X2**3 - 5/3*X1**3*X2**4 - 1/9*X1**6*X4 + 1/3*X1**5 + 2/3*X1**4*X2",
                " - X1**2*X2**3 - 2*X1*X2**4 - X2**5 - 1/3*X1**4*X3 - 2/3*X1**3*X2*X4",
                " + X1**2*X2 + X1*X2**2 + X2**3 - X1*X2*X3 - X2**2*X4 + X3"
            ),
            concat!(
                "1/81*X1**13 + 2/27*X1**11 + 4/27*X1**10*X2 + 4/27*X1**9 + 2/3*X1**8*X2",
                " + 2/3*X1**7*X2**2 + 4/9*X1**7 + X1**6*X2 + 2*X1**5*X2**2 + 4/3*X1**4*X2**3",
                " + 5/3*X1**4*X2 + 2*X1**3*X2**2 + 2*X1**2*X2**3 + X1*X2**4 + 1/3*X1**4*X4",
                " + X1*X2**2 + X2**3 + X1**2*X3 + X1*X2*X4 + X4"
            ),
        ]),
        params: &[],
        r: 243,
        primes: &[3, 5, 7, 11, 13, 17, 19],
        imaginary: false,
    },
    CatalogEntry {
        name: "EX19",
        definition: Definition::Coordinates(&[
            "X1+I*(X8^3)",
            "X2+(2*X1+5*X6+7*X7+11*X8)^3",
            "X3+(13*X1+19*X6+23*X7+29*X8)^3",
            "X4+(31*X1+41*X6+43*X7+47*X8)^3",
            "X5+(53*X1)^3",
            "X6",
            "X7+(59*X1+61*X8)^3",
            "X8+I*X6^3",
            "X9+(67*X1+71*X5+73*X6+79*X7+83*X8)^3",
        ]),
        params: &[],
        r: 1,
        primes: &[530560271, 530560211, 530560207, 530560183],
        imaginary: true,
    },
    CatalogEntry {
        name: "EX20",
        definition: Definition::Gradient {
            n: 5,
            g: concat!(
                "(((X4+I*X5)^2-1)*X1+(2*(X4+I*X5))*X2+I*((X4+I*X5)^2+1)*X3)",
                "*((2*(X4+I*X5))*X1-((X4+I*X5)^2-1)*X2)"
            ),
        },
        params: &[],
        r: 1,
        primes: &[3, 7, 11, 19, 23],
        imaginary: true,
    },
];

/// The names of all maps in the catalog.
pub fn names() -> impl Iterator<Item = &'static str> {
    CATALOG.iter().map(|e| e.name)
}

/// Construct the catalog map `name`.
pub fn get(name: &str) -> Result<ExactMap, MappingError> {
    let entry = CATALOG
        .iter()
        .find(|e| e.name == name)
        .ok_or_else(|| MappingError::UnknownMapping(name.to_owned()))?;

    let mut options = MapOptions::default()
        .primes(entry.primes)
        .segre_constant(entry.r);
    for (k, v) in entry.params {
        options = options.param(k, v);
    }
    if entry.imaginary {
        options = options.imaginary();
    }

    match entry.definition {
        Definition::Coordinates(c) => ExactMap::parse(c, entry.name, &options),
        Definition::Gradient { n, g } => {
            let g = PolynomialParser::new(standard_variables(n)).parse(g)?;
            ExactMap::from_gradient(&g, entry.name, &options)
        }
    }
}
