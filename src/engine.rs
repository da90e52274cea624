//! Inversion engines: the built-in ABCH solver and an external Gröbner basis
//! engine that is driven through a line based text protocol on its standard streams.
//!
//! The request for a map `F` in `n` variables is
//! ```text
//! ring GF(7)
//! variables X1 X2
//! method
//! F X1
//! F -1/3*X1^3+X2
//! end
//! ```
//! and the engine answers with exactly `n` lines `G <polynomial>`. Empty lines
//! and lines starting with `#` are ignored.
use std::{
    io::Write,
    process::{Command, Stdio},
    thread,
};

use thiserror::Error;
use tracing::{debug, instrument};

use crate::{
    domains::{
        finite_field::FiniteField,
        gaussian::{Gaussian, GaussianRing, QI},
        rational::Rational,
        Ring,
    },
    inverse::{abch, Inversion},
    mapping::{ModularField, PolynomialMap},
    parser::{ParseError, PolynomialParser},
    poly::substitute::SubstitutionConfig,
    InversionError,
};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("no command for the external Gröbner engine is configured")]
    NotConfigured,
    #[error("could not start {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("the external engine exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },
    #[error("malformed engine output: {0}")]
    Malformed(String),
    #[error("malformed polynomial on output line {line}: {source}")]
    Parse {
        line: usize,
        #[source]
        source: ParseError,
    },
}

/// A coefficient domain that can be described to an external engine and that
/// exact results can be mapped into.
pub trait EngineField: Ring {
    /// The ring description in the request, such as `QQ[I]` or `GF(7^2)`.
    fn engine_ring(&self, imaginary: bool) -> String;
    /// Map a Gaussian rational into this domain.
    fn from_exact(&self, c: &Gaussian<Rational>) -> Option<Self::Element>;
}

impl EngineField for QI {
    fn engine_ring(&self, imaginary: bool) -> String {
        if imaginary {
            "QQ[I]".into()
        } else {
            "QQ".into()
        }
    }

    fn from_exact(&self, c: &Gaussian<Rational>) -> Option<Self::Element> {
        Some(c.clone())
    }
}

impl EngineField for FiniteField {
    fn engine_ring(&self, _imaginary: bool) -> String {
        ModularField::engine_ring(self)
    }

    fn from_exact(&self, c: &Gaussian<Rational>) -> Option<Self::Element> {
        if c.im.cmp0().is_ne() {
            return None;
        }
        self.reduce_rational(c)
    }
}

impl EngineField for GaussianRing<FiniteField> {
    fn engine_ring(&self, _imaginary: bool) -> String {
        ModularField::engine_ring(self)
    }

    fn from_exact(&self, c: &Gaussian<Rational>) -> Option<Self::Element> {
        self.reduce_rational(c)
    }
}

/// An external computer algebra process that computes the inverse from a Gröbner basis.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExternalGroebner {
    pub command: Vec<String>,
    /// The Gröbner basis method, passed on verbatim.
    pub method: String,
}

impl ExternalGroebner {
    /// Create an engine from a command line, which is split on whitespace.
    pub fn new(command: &str, method: &str) -> Result<ExternalGroebner, EngineError> {
        let command: Vec<String> = command.split_whitespace().map(|x| x.to_owned()).collect();
        if command.is_empty() {
            return Err(EngineError::NotConfigured);
        }

        Ok(ExternalGroebner {
            command,
            method: method.to_owned(),
        })
    }

    pub fn request<F: EngineField>(&self, map: &PolynomialMap<F>) -> String {
        let vars: Vec<&str> = map.variables.iter().map(|v| v.as_str()).collect();

        let mut r = format!("ring {}\n", map.field().engine_ring(map.imaginary));
        r += &format!("variables {}\n", vars.join(" "));
        r += format!("method {}", self.method).trim_end();
        r.push('\n');
        for c in &map.coordinates {
            r += &format!("F {}\n", c);
        }
        r += "end\n";
        r
    }

    /// Read the coordinates of the inverse from the engine output.
    pub fn parse_response<F: EngineField>(
        &self,
        map: &PolynomialMap<F>,
        output: &str,
    ) -> Result<PolynomialMap<F>, EngineError> {
        let field = map.field();
        let parser = PolynomialParser::new(map.variables.clone());

        let mut coordinates = Vec::with_capacity(map.n());
        for (line_number, line) in output.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let Some(poly) = line.strip_prefix("G ") else {
                return Err(EngineError::Malformed(format!(
                    "unexpected line {}: {}",
                    line_number + 1,
                    line
                )));
            };

            let g = parser.parse(poly).map_err(|source| EngineError::Parse {
                line: line_number + 1,
                source,
            })?;

            let g = g.try_map_coeff(
                |c| {
                    field.from_exact(c).ok_or_else(|| {
                        EngineError::Malformed(format!(
                            "coefficient {} on line {} is not in {}",
                            QI.printer(c),
                            line_number + 1,
                            field
                        ))
                    })
                },
                field,
            )?;
            coordinates.push(g);
        }

        if coordinates.len() != map.n() {
            return Err(EngineError::Malformed(format!(
                "expected {} coordinates, got {}",
                map.n(),
                coordinates.len()
            )));
        }

        Ok(map.with_coordinates(&format!("{}^{{-1}}", map.name), coordinates))
    }

    /// Run the engine on `map`. A non-zero exit status is an error, even if the
    /// engine produced output.
    #[instrument(skip_all, fields(map = %map.name, command = %self.command[0]))]
    pub fn invert<F: EngineField>(&self, map: &PolynomialMap<F>) -> Result<Inversion<F>, EngineError> {
        let input = self.request(map);

        let mut child = Command::new(&self.command[0])
            .args(&self.command[1..])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| EngineError::Spawn {
                command: self.command.join(" "),
                source,
            })?;

        // feed the request from another thread so that a large answer cannot block the engine
        let stdin = child.stdin.take();
        let writer = thread::spawn(move || {
            if let Some(mut stdin) = stdin {
                // an engine that exits early closes the pipe, which the exit status reports
                let _ = stdin.write_all(input.as_bytes());
            }
        });

        let output = child.wait_with_output().map_err(|source| EngineError::Spawn {
            command: self.command.join(" "),
            source,
        })?;
        let _ = writer.join();

        if !output.status.success() {
            return Err(EngineError::Failed {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
            });
        }

        let stdout = String::from_utf8(output.stdout)
            .map_err(|_| EngineError::Malformed("output is not valid UTF-8".into()))?;
        debug!("engine returned {} bytes", stdout.len());

        Ok(Inversion::exact(self.parse_response(map, &stdout)?))
    }
}

/// The inversion method applied to a single map.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Engine {
    Abch(SubstitutionConfig),
    ExternalGroebner(ExternalGroebner),
}

impl Engine {
    pub fn invert<F: EngineField>(&self, map: &PolynomialMap<F>) -> Result<Inversion<F>, InversionError> {
        match self {
            Engine::Abch(config) => Ok(abch::invert(map, config)?),
            Engine::ExternalGroebner(e) => Ok(e.invert(map)?),
        }
    }
}

#[cfg(test)]
mod test {
    use crate::{
        domains::finite_field::FiniteField,
        mapping::{ExactMap, MapOptions, ModularField},
    };

    use super::{EngineError, ExternalGroebner};

    fn cubic() -> ExactMap {
        ExactMap::parse(&["X1", "X2 - 1/3*X1^3"], "F", &MapOptions::default()).unwrap()
    }

    #[test]
    fn request() {
        let e = ExternalGroebner::new("engine --quiet", "").unwrap();
        assert_eq!(e.command, ["engine", "--quiet"]);
        assert_eq!(
            e.request(&cubic()),
            "ring QQ\nvariables X1 X2\nmethod\nF X1\nF -1/3*X1^3+X2\nend\n"
        );

        let m = cubic().reduce(FiniteField::for_prime(7)).unwrap();
        let e = ExternalGroebner::new("engine", "slimgb").unwrap();
        assert!(e.request(&m).starts_with("ring GF(7)\nvariables X1 X2\nmethod slimgb\n"));

        assert!(matches!(
            ExternalGroebner::new("  ", ""),
            Err(EngineError::NotConfigured)
        ));
    }

    #[test]
    fn response() {
        let f = cubic();
        let e = ExternalGroebner::new("engine", "").unwrap();
        let g = e
            .parse_response(&f, "# inverse\n\nG X1\nG X2 + 1/3*X1^3\n")
            .unwrap();
        assert_eq!(g.coordinates[1].to_string(), "1/3*X1^3+X2");

        assert!(matches!(
            e.parse_response(&f, "G X1\n"),
            Err(EngineError::Malformed(_))
        ));
        assert!(matches!(
            e.parse_response(&f, "G X1\nH X2\n"),
            Err(EngineError::Malformed(_))
        ));
        assert!(matches!(
            e.parse_response(&f, "G X1\nG X2 +\n"),
            Err(EngineError::Parse { line: 2, .. })
        ));
    }

    #[test]
    fn modular_response() {
        let m = cubic().reduce(FiniteField::for_prime(7)).unwrap();
        let e = ExternalGroebner::new("engine", "").unwrap();
        let g = e.parse_response(&m, "G X1\nG X2 + 1/3*X1^3\n").unwrap();
        // 1/3 = 5 mod 7
        assert_eq!(g.coordinates[1].to_string(), "5*X1^3+X2");

        assert!(matches!(
            e.parse_response(&m, "G X1\nG X2 + I*X1^3\n"),
            Err(EngineError::Malformed(_))
        ));
    }
}
