//! Parse polynomial expressions over the Gaussian rationals.
//!
//! The accepted syntax consists of integer literals, the imaginary unit `I`,
//! variables, named numeric parameters, parentheses and the binary operators
//! `+ - * / ^`, where `**` is accepted as an alias for `^`. Division is only
//! allowed by non-zero constants, and exponents must be non-negative integers.
use std::sync::Arc;

use ahash::HashMap;
use smartstring::{LazyCompact, SmartString};
use thiserror::Error;

use crate::{
    domains::{
        gaussian::{Gaussian, QI},
        integer::Integer,
        rational::Rational,
        Field,
    },
    poly::{polynomial::MultivariatePolynomial, Variable},
};

/// A polynomial over the Gaussian rationals.
pub type ExactPolynomial = MultivariatePolynomial<QI>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("unexpected character '{character}' at position {position}")]
    UnexpectedCharacter { position: usize, character: char },
    #[error("unexpected {found} at position {position}, expected {expected}")]
    UnexpectedToken {
        position: usize,
        found: String,
        expected: &'static str,
    },
    #[error("unexpected end of input, expected {0}")]
    UnexpectedEnd(&'static str),
    #[error("unknown symbol '{0}'")]
    UnknownSymbol(String),
    #[error("cannot divide by the non-constant expression {0}")]
    NonConstantDivisor(String),
    #[error("division by zero")]
    DivisionByZero,
    #[error("exponent {0} is not a non-negative machine-size integer")]
    BadExponent(String),
    #[error("the degree of {0} exceeds the largest supported exponent")]
    DegreeOverflow(String),
    #[error("{definitions} definitions given for {variables} variables")]
    VariableCountMismatch { definitions: usize, variables: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operator {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Number(Integer),
    Identifier(SmartString<LazyCompact>),
    Op(Operator),
    OpenParenthesis,
    CloseParenthesis,
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Token::Number(n) => write!(f, "number {}", n),
            Token::Identifier(s) => write!(f, "symbol {}", s),
            Token::Op(o) => f.write_str(match o {
                Operator::Add => "'+'",
                Operator::Sub => "'-'",
                Operator::Mul => "'*'",
                Operator::Div => "'/'",
                Operator::Pow => "'^'",
            }),
            Token::OpenParenthesis => f.write_str("'('"),
            Token::CloseParenthesis => f.write_str("')'"),
        }
    }
}

/// Split the input into tokens, each tagged with its byte position.
pub fn tokenize(input: &str) -> Result<Vec<(usize, Token)>, ParseError> {
    let mut tokens = vec![];
    let mut chars = input.char_indices().peekable();

    while let Some((pos, c)) = chars.next() {
        let token = match c {
            c if c.is_whitespace() => continue,
            '+' => Token::Op(Operator::Add),
            '-' => Token::Op(Operator::Sub),
            '*' => {
                if let Some((_, '*')) = chars.peek() {
                    chars.next();
                    Token::Op(Operator::Pow)
                } else {
                    Token::Op(Operator::Mul)
                }
            }
            '/' => Token::Op(Operator::Div),
            '^' => Token::Op(Operator::Pow),
            '(' => Token::OpenParenthesis,
            ')' => Token::CloseParenthesis,
            c if c.is_ascii_digit() => {
                let mut end = pos + c.len_utf8();
                while let Some((p, d)) = chars.peek() {
                    if !d.is_ascii_digit() {
                        break;
                    }
                    end = p + d.len_utf8();
                    chars.next();
                }

                // the slice consists of ascii digits only
                let n = input[pos..end]
                    .parse::<Integer>()
                    .map_err(|_| ParseError::UnexpectedCharacter {
                        position: pos,
                        character: c,
                    })?;
                Token::Number(n)
            }
            c if c.is_alphabetic() || c == '_' => {
                let mut end = pos + c.len_utf8();
                while let Some((p, d)) = chars.peek() {
                    if !d.is_alphanumeric() && *d != '_' {
                        break;
                    }
                    end = p + d.len_utf8();
                    chars.next();
                }
                Token::Identifier(input[pos..end].into())
            }
            c => {
                return Err(ParseError::UnexpectedCharacter {
                    position: pos,
                    character: c,
                })
            }
        };
        tokens.push((pos, token));
    }

    Ok(tokens)
}

/// A recursive descent parser for polynomials in a fixed list of variables.
#[derive(Clone, Debug)]
pub struct PolynomialParser {
    variables: Arc<Vec<Variable>>,
    params: HashMap<SmartString<LazyCompact>, Gaussian<Rational>>,
}

impl PolynomialParser {
    pub fn new(variables: Arc<Vec<Variable>>) -> PolynomialParser {
        PolynomialParser {
            variables,
            params: HashMap::default(),
        }
    }

    /// Register a named parameter. The value must be a constant expression.
    pub fn add_param(&mut self, name: &str, value: &str) -> Result<(), ParseError> {
        let v = self.parse(value)?;
        if !v.is_constant() {
            return Err(ParseError::UnknownSymbol(format!(
                "{} in the value of parameter {}",
                value, name
            )));
        }
        self.params.insert(name.into(), v.get_constant());
        Ok(())
    }

    pub fn variables(&self) -> &Arc<Vec<Variable>> {
        &self.variables
    }

    /// Parse an expression into a polynomial over the Gaussian rationals.
    pub fn parse(&self, input: &str) -> Result<ExactPolynomial, ParseError> {
        let tokens = tokenize(input)?;
        let mut state = ParserState {
            parser: self,
            tokens: &tokens,
            pos: 0,
        };

        let res = state.expression()?;
        if let Some((p, t)) = tokens.get(state.pos) {
            return Err(ParseError::UnexpectedToken {
                position: *p,
                found: t.to_string(),
                expected: "an operator or the end of input",
            });
        }
        Ok(res)
    }

    fn zero(&self) -> ExactPolynomial {
        MultivariatePolynomial::new(&QI, None, self.variables.clone())
    }
}

struct ParserState<'a> {
    parser: &'a PolynomialParser,
    tokens: &'a [(usize, Token)],
    pos: usize,
}

impl<'a> ParserState<'a> {
    fn peek(&self) -> Option<&'a Token> {
        self.tokens.get(self.pos).map(|(_, t)| t)
    }

    fn next(&mut self, expected: &'static str) -> Result<&'a (usize, Token), ParseError> {
        let t = self
            .tokens
            .get(self.pos)
            .ok_or(ParseError::UnexpectedEnd(expected))?;
        self.pos += 1;
        Ok(t)
    }

    /// expression := term (('+' | '-') term)*
    fn expression(&mut self) -> Result<ExactPolynomial, ParseError> {
        let mut res = self.term()?;
        loop {
            match self.peek() {
                Some(Token::Op(Operator::Add)) => {
                    self.pos += 1;
                    res = res + self.term()?;
                }
                Some(Token::Op(Operator::Sub)) => {
                    self.pos += 1;
                    res = res - self.term()?;
                }
                _ => return Ok(res),
            }
        }
    }

    /// term := unary (('*' | '/') unary)*
    fn term(&mut self) -> Result<ExactPolynomial, ParseError> {
        let mut res = self.unary()?;
        loop {
            match self.peek() {
                Some(Token::Op(Operator::Mul)) => {
                    self.pos += 1;
                    let rhs = self.unary()?;
                    if res.degree() as u64 + rhs.degree() as u64 > u32::MAX as u64 {
                        return Err(ParseError::DegreeOverflow(format!("({})*({})", res, rhs)));
                    }
                    res = &res * &rhs;
                }
                Some(Token::Op(Operator::Div)) => {
                    self.pos += 1;
                    let d = self.unary()?;
                    if !d.is_constant() {
                        return Err(ParseError::NonConstantDivisor(d.to_string()));
                    }
                    let inv = QI
                        .try_inv(&d.get_constant())
                        .ok_or(ParseError::DivisionByZero)?;
                    res = res.mul_coeff(&inv);
                }
                _ => return Ok(res),
            }
        }
    }

    /// unary := ('-' | '+') unary | power
    fn unary(&mut self) -> Result<ExactPolynomial, ParseError> {
        match self.peek() {
            Some(Token::Op(Operator::Sub)) => {
                self.pos += 1;
                Ok(-self.unary()?)
            }
            Some(Token::Op(Operator::Add)) => {
                self.pos += 1;
                self.unary()
            }
            _ => self.power(),
        }
    }

    /// power := atom ('^' exponent)?
    fn power(&mut self) -> Result<ExactPolynomial, ParseError> {
        let base = self.atom()?;
        if let Some(Token::Op(Operator::Pow)) = self.peek() {
            self.pos += 1;
            let e = self.exponent()?;
            if base.degree() as u64 * e as u64 > u32::MAX as u64 {
                return Err(ParseError::DegreeOverflow(format!("({})^{}", base, e)));
            }
            Ok(base.pow_truncated(e, u32::MAX))
        } else {
            Ok(base)
        }
    }

    /// exponent := number | '(' number ')'
    fn exponent(&mut self) -> Result<u32, ParseError> {
        let (p, t) = self.next("an exponent")?;
        match t {
            Token::Number(n) => n
                .to_u32()
                .ok_or_else(|| ParseError::BadExponent(n.to_string())),
            Token::OpenParenthesis => {
                let e = self.expression()?;
                self.expect_close()?;
                if !e.is_constant() {
                    return Err(ParseError::BadExponent(e.to_string()));
                }
                let c = e.get_constant();
                if c.im.cmp0().is_ne() || *c.re.denom() != 1 {
                    return Err(ParseError::BadExponent(e.to_string()));
                }
                c.re.numer()
                    .to_u32()
                    .ok_or_else(|| ParseError::BadExponent(e.to_string()))
            }
            t => Err(ParseError::UnexpectedToken {
                position: *p,
                found: t.to_string(),
                expected: "an exponent",
            }),
        }
    }

    fn expect_close(&mut self) -> Result<(), ParseError> {
        let (p, t) = self.next("')'")?;
        if *t != Token::CloseParenthesis {
            return Err(ParseError::UnexpectedToken {
                position: *p,
                found: t.to_string(),
                expected: "')'",
            });
        }
        Ok(())
    }

    /// atom := number | 'I' | variable | parameter | '(' expression ')'
    fn atom(&mut self) -> Result<ExactPolynomial, ParseError> {
        let (p, t) = self.next("a number, symbol or '('")?;
        let zero = self.parser.zero();
        match t {
            Token::Number(n) => Ok(zero.constant(Gaussian::new(
                Rational::from(n.clone()),
                Rational::new(),
            ))),
            Token::Identifier(name) => {
                if let Some(i) = self
                    .parser
                    .variables
                    .iter()
                    .position(|v| v.as_str() == name.as_str())
                {
                    Ok(zero.variable(i))
                } else if let Some(v) = self.parser.params.get(name) {
                    Ok(zero.constant(v.clone()))
                } else if name.as_str() == "I" {
                    Ok(zero.constant(QI.i()))
                } else {
                    Err(ParseError::UnknownSymbol(name.to_string()))
                }
            }
            Token::OpenParenthesis => {
                let e = self.expression()?;
                self.expect_close()?;
                Ok(e)
            }
            t => Err(ParseError::UnexpectedToken {
                position: *p,
                found: t.to_string(),
                expected: "a number, symbol or '('",
            }),
        }
    }
}

#[cfg(test)]
mod test {
    use crate::domains::gaussian::{Gaussian, QI};
    use crate::domains::rational::Rational;
    use crate::domains::Ring;
    use crate::poly::standard_variables;

    use super::{ParseError, PolynomialParser};

    #[test]
    fn parse_and_print() {
        let p = PolynomialParser::new(standard_variables(2));
        let f = p.parse("X2 - 1/3*X1^3").unwrap();
        assert_eq!(f.to_string(), "-1/3*X1^3+X2");
        assert_eq!(p.parse(&f.to_string()).unwrap(), f);

        let g = p.parse("(X1 + I*X2)**2").unwrap();
        assert_eq!(g.to_string(), "X1^2+2*I*X1*X2-X2^2");
        assert_eq!(p.parse(&g.to_string()).unwrap(), g);
    }

    #[test]
    fn precedence() {
        let p = PolynomialParser::new(standard_variables(1));
        assert_eq!(p.parse("-X1^2").unwrap(), p.parse("-(X1*X1)").unwrap());
        assert_eq!(p.parse("2^3").unwrap(), p.parse("8").unwrap());
        assert_eq!(p.parse("1 - 2 - 3").unwrap(), p.parse("-4").unwrap());
        assert_eq!(p.parse("12/4/3").unwrap(), p.parse("1").unwrap());
    }

    #[test]
    fn params() {
        let mut p = PolynomialParser::new(standard_variables(2));
        p.add_param("c1", "2").unwrap();
        p.add_param("r4", "1").unwrap();
        let f = p.parse("(16*c1^2-r4^2)/48/c1^2*X1").unwrap();
        assert_eq!(
            f.coefficient(&[1, 0]),
            Gaussian::new(Rational::from((63, 192)), Rational::new())
        );
    }

    #[test]
    fn gaussian_division() {
        let p = PolynomialParser::new(standard_variables(1));
        let f = p.parse("X1/(1+I)").unwrap();
        let c = f.coefficient(&[1]);
        assert_eq!(
            c,
            Gaussian::new(Rational::from((1, 2)), Rational::from((-1, 2)))
        );
        assert!(QI.is_one(&QI.mul(&c, &Gaussian::new(Rational::from(1), Rational::from(1)))));
    }

    #[test]
    fn errors() {
        let p = PolynomialParser::new(standard_variables(2));
        assert_eq!(
            p.parse("X3").unwrap_err(),
            ParseError::UnknownSymbol("X3".into())
        );
        assert!(matches!(
            p.parse("X1/X2"),
            Err(ParseError::NonConstantDivisor(_))
        ));
        assert_eq!(p.parse("X1/(2-2)").unwrap_err(), ParseError::DivisionByZero);
        assert!(matches!(p.parse("X1^X2"), Err(ParseError::UnexpectedToken { .. })));
        assert!(matches!(p.parse("X1 +"), Err(ParseError::UnexpectedEnd(_))));
        assert!(matches!(
            p.parse("X1 $ 2"),
            Err(ParseError::UnexpectedCharacter { character: '$', .. })
        ));
        assert!(matches!(p.parse("(X1"), Err(ParseError::UnexpectedEnd(_))));
    }

    #[test]
    fn huge_exponents() {
        let p = PolynomialParser::new(standard_variables(2));
        assert_eq!(p.parse("X1^3000000000").unwrap().degree(), 3000000000);
        assert!(matches!(
            p.parse("X1^3000000000 * X2^3000000000"),
            Err(ParseError::DegreeOverflow(_))
        ));
        assert!(matches!(
            p.parse("(X1^3000000000)^2"),
            Err(ParseError::DegreeOverflow(_))
        ));
    }
}
