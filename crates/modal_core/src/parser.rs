use crate::error::{PolynomialError, Result};
use crate::monomial::{monomial_count, Monomial};
use log::trace;
use serde::{Deserialize, Serialize};

/// Grammar switches for the equation parser.
///
/// The strict grammar is
///
/// ```text
/// equation := "x" INT "'" "=" term ("+" term)*
/// term     := FLOAT "*" monomial
/// monomial := factor ("*" factor)*
/// factor   := "x" INT ("^" INT)?
/// ```
///
/// where `FLOAT` may carry a leading `-`. The defaults relax it so that
/// `x2' = -x3 + 4.32*x1^2*x3 - x1` is accepted as written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseSettings {
    /// A bare monomial (`x3`, `-x3`) carries an implied coefficient of `±1`.
    pub allow_implicit_coefficients: bool,
    /// `-` between terms negates the following term.
    pub allow_subtraction: bool,
    /// Largest accepted coefficient-row width, i.e. number of monomials of a
    /// single degree. Terms whose degree needs wider rows are rejected.
    pub max_row_width: usize,
}

impl Default for ParseSettings {
    fn default() -> Self {
        Self {
            allow_implicit_coefficients: true,
            allow_subtraction: true,
            max_row_width: 1 << 20,
        }
    }
}

impl ParseSettings {
    /// Only the strict grammar: every term is a signed literal times a monomial.
    pub fn strict() -> Self {
        Self {
            allow_implicit_coefficients: false,
            allow_subtraction: false,
            ..Self::default()
        }
    }
}

/// One right-hand-side term after parsing.
#[derive(Debug, Clone, PartialEq)]
pub struct Term {
    pub coefficient: f64,
    pub monomial: Monomial,
    pub degree: usize,
    /// Column of `monomial` within its degree's row.
    pub column: usize,
    /// Width of the row for `degree`.
    pub width: usize,
}

/// The contribution of one equation to the degree-`degree` coefficient matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct DegreeRow {
    pub degree: usize,
    pub width: usize,
    pub row: Vec<f64>,
}

/// A fully parsed equation `x<lhs>' = ...`.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedEquation {
    /// 1-based index of the differentiated state variable.
    pub lhs: usize,
    /// One row per degree, in order of first appearance on the right-hand side.
    pub rows: Vec<DegreeRow>,
}

/// Parses `text` with the default settings.
pub fn parse_equation(text: &str, n_variables: usize) -> Result<ParsedEquation> {
    parse_equation_with(text, n_variables, &ParseSettings::default())
}

/// Parses `text` into its left-hand-side index and per-degree coefficient rows.
/// Terms sharing a degree share a row; terms sharing a monomial add up.
pub fn parse_equation_with(
    text: &str,
    n_variables: usize,
    settings: &ParseSettings,
) -> Result<ParsedEquation> {
    let (lhs, terms) = parse_terms(text, n_variables, settings)?;

    let mut rows: Vec<DegreeRow> = Vec::new();
    for term in terms {
        let idx = match rows.iter().position(|r| r.degree == term.degree) {
            Some(idx) => idx,
            None => {
                rows.push(DegreeRow {
                    degree: term.degree,
                    width: term.width,
                    row: vec![0.0; term.width],
                });
                rows.len() - 1
            }
        };
        rows[idx].row[term.column] += term.coefficient;
    }

    Ok(ParsedEquation { lhs, rows })
}

/// Parses `text` into its left-hand-side index and the list of terms, without
/// merging them into rows.
pub fn parse_terms(
    text: &str,
    n_variables: usize,
    settings: &ParseSettings,
) -> Result<(usize, Vec<Term>)> {
    let tokens = tokenize(text)?;
    let mut parser = Parser {
        source: text,
        tokens,
        pos: 0,
        n_variables,
        settings: *settings,
    };
    parser.parse_equation()
}

// --- Tokenizer ---

#[derive(Debug, Clone, Copy, PartialEq)]
enum Token {
    Number(f64),
    Variable(usize),
    Prime,
    Equals,
    Plus,
    Minus,
    Star,
    Caret,
}

#[derive(Debug, Clone, Copy)]
struct Spanned {
    token: Token,
    start: usize,
    end: usize,
}

fn tokenize(input: &str) -> Result<Vec<Spanned>> {
    let bytes = input.as_bytes();
    let mut tokens = Vec::new();
    let mut pos = 0;

    while pos < bytes.len() {
        let c = bytes[pos];
        let start = pos;

        if c.is_ascii_whitespace() {
            pos += 1;
        } else if c.is_ascii_digit() || c == b'.' {
            while pos < bytes.len() && (bytes[pos].is_ascii_digit() || bytes[pos] == b'.') {
                pos += 1;
            }
            // Scientific notation: 1e-3, 2.5E+4
            if pos < bytes.len() && (bytes[pos] == b'e' || bytes[pos] == b'E') {
                let mut ahead = pos + 1;
                if ahead < bytes.len() && (bytes[ahead] == b'+' || bytes[ahead] == b'-') {
                    ahead += 1;
                }
                if ahead < bytes.len() && bytes[ahead].is_ascii_digit() {
                    pos = ahead;
                    while pos < bytes.len() && bytes[pos].is_ascii_digit() {
                        pos += 1;
                    }
                }
            }
            let literal = &input[start..pos];
            let value: f64 = literal
                .parse()
                .map_err(|_| PolynomialError::parse(literal, "not a valid number"))?;
            tokens.push(Spanned {
                token: Token::Number(value),
                start,
                end: pos,
            });
        } else if c == b'x' {
            pos += 1;
            while pos < bytes.len() && bytes[pos].is_ascii_digit() {
                pos += 1;
            }
            let literal = &input[start..pos];
            if literal.len() == 1 {
                return Err(PolynomialError::monomial(
                    literal,
                    "variables are written x<k> with k >= 1",
                ));
            }
            // All digits, so parsing only fails on overflow. A saturated index
            // is out of range for any system and gets reported as such.
            let index: usize = literal[1..].parse().unwrap_or(usize::MAX);
            tokens.push(Spanned {
                token: Token::Variable(index),
                start,
                end: pos,
            });
        } else if c.is_ascii_alphabetic() || c == b'_' {
            while pos < bytes.len() && (bytes[pos].is_ascii_alphanumeric() || bytes[pos] == b'_')
            {
                pos += 1;
            }
            return Err(PolynomialError::parse(
                &input[start..pos],
                "unknown symbol; only state variables x<k> are allowed",
            ));
        } else {
            let token = match c {
                b'\'' => Token::Prime,
                b'=' => Token::Equals,
                b'+' => Token::Plus,
                b'-' => Token::Minus,
                b'^' => Token::Caret,
                b'*' if bytes.get(pos + 1) == Some(&b'*') => {
                    pos += 1;
                    Token::Caret
                }
                b'*' => Token::Star,
                _ => {
                    let symbol = input[start..].chars().next().unwrap_or_default();
                    return Err(PolynomialError::parse(
                        symbol.to_string(),
                        "unexpected character",
                    ));
                }
            };
            pos += 1;
            tokens.push(Spanned {
                token,
                start,
                end: pos,
            });
        }
    }

    Ok(tokens)
}

// --- Parser ---

struct Parser<'a> {
    source: &'a str,
    tokens: Vec<Spanned>,
    pos: usize,
    n_variables: usize,
    settings: ParseSettings,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<Token> {
        self.tokens.get(self.pos).map(|s| s.token)
    }

    fn consume(&mut self) -> Option<Spanned> {
        let spanned = self.tokens.get(self.pos).copied();
        if spanned.is_some() {
            self.pos += 1;
        }
        spanned
    }

    /// Byte offset where the next token starts, or the end of the source.
    fn offset(&self) -> usize {
        self.tokens
            .get(self.pos)
            .map_or(self.source.len(), |s| s.start)
    }

    /// Source text from `start` through the next unconsumed token.
    fn fragment(&self, start: usize) -> &'a str {
        let end = self
            .tokens
            .get(self.pos)
            .map_or(self.source.len(), |s| s.end);
        self.source[start..end].trim()
    }

    /// Source text from `start` through the last consumed token.
    fn consumed(&self, start: usize) -> &'a str {
        let end = self
            .pos
            .checked_sub(1)
            .and_then(|i| self.tokens.get(i))
            .map_or(start, |s| s.end);
        self.source[start..end.max(start)].trim()
    }

    fn parse_equation(&mut self) -> Result<(usize, Vec<Term>)> {
        if !self.tokens.iter().any(|s| s.token == Token::Equals) {
            return Err(PolynomialError::parse(self.source.trim(), "missing `=`"));
        }

        let lhs = self.parse_lhs()?;
        let terms = self.parse_rhs()?;
        Ok((lhs, terms))
    }

    fn parse_lhs(&mut self) -> Result<usize> {
        let start = self.offset();
        let index = match self.consume().map(|s| s.token) {
            Some(Token::Variable(k)) => k,
            _ => {
                return Err(PolynomialError::parse(
                    self.consumed(start),
                    "left-hand side must be a derivative x<k>'",
                ))
            }
        };
        if self.consume().map(|s| s.token) != Some(Token::Prime) {
            return Err(PolynomialError::parse(
                self.consumed(start),
                "left-hand side must be a derivative x<k>'",
            ));
        }
        if self.consume().map(|s| s.token) != Some(Token::Equals) {
            return Err(PolynomialError::parse(
                self.consumed(start),
                "expected `=` after the left-hand side",
            ));
        }
        if index == 0 || index > self.n_variables {
            return Err(PolynomialError::DimensionError {
                index,
                n_variables: self.n_variables,
            });
        }
        Ok(index)
    }

    fn parse_rhs(&mut self) -> Result<Vec<Term>> {
        if self.peek().is_none() {
            return Err(PolynomialError::parse(
                self.source.trim(),
                "right-hand side is empty",
            ));
        }

        let mut terms = vec![self.parse_term(1.0)?];
        while let Some(token) = self.peek() {
            let start = self.offset();
            let sign = match token {
                Token::Plus => 1.0,
                Token::Minus if self.settings.allow_subtraction => -1.0,
                Token::Minus => {
                    self.consume();
                    return Err(PolynomialError::parse(
                        self.fragment(start),
                        "subtraction between terms is disabled; use `+` with a negative coefficient",
                    ));
                }
                _ => {
                    return Err(PolynomialError::parse(
                        self.fragment(start),
                        "expected `+` between terms",
                    ))
                }
            };
            self.consume();
            if self.peek().is_none() {
                return Err(PolynomialError::parse(
                    self.consumed(start),
                    "dangling operator at end of equation",
                ));
            }
            terms.push(self.parse_term(sign)?);
        }
        Ok(terms)
    }

    fn parse_term(&mut self, sign: f64) -> Result<Term> {
        let start = self.offset();
        let mut sign = sign;
        if self.peek() == Some(Token::Minus) {
            self.consume();
            sign = -sign;
            if !self.settings.allow_implicit_coefficients
                && !matches!(self.peek(), Some(Token::Number(_)))
            {
                return Err(PolynomialError::parse(
                    self.fragment(start),
                    "a leading `-` must belong to a numeric coefficient",
                ));
            }
        }

        let coefficient = match self.peek() {
            Some(Token::Number(value)) => {
                self.consume();
                match self.peek() {
                    Some(Token::Star) => {
                        self.consume();
                    }
                    Some(Token::Variable(_)) | Some(Token::Caret) => {
                        return Err(PolynomialError::parse(
                            self.fragment(start),
                            "missing `*` between coefficient and monomial",
                        ))
                    }
                    _ => {
                        return Err(PolynomialError::parse(
                            self.consumed(start),
                            "constant terms are not supported",
                        ))
                    }
                }
                value
            }
            Some(Token::Variable(_)) if self.settings.allow_implicit_coefficients => 1.0,
            Some(Token::Variable(_)) => {
                return Err(PolynomialError::parse(
                    self.fragment(start),
                    "missing numeric coefficient",
                ))
            }
            _ => {
                return Err(PolynomialError::parse(
                    self.fragment(start),
                    "expected a coefficient or a monomial",
                ))
            }
        };

        let factors = self.parse_monomial(start)?;
        let text = self.consumed(start);
        let monomial = Monomial::from_factors(&factors, self.n_variables).map_err(|err| match err {
            PolynomialError::InvalidMonomial { reason, .. } => {
                PolynomialError::monomial(text, reason)
            }
            other => other,
        })?;
        let degree = monomial.degree();
        if degree == 0 {
            return Err(PolynomialError::parse(text, "constant terms are not supported"));
        }

        let width = match monomial_count(degree, self.n_variables) {
            Some(width) if width <= self.settings.max_row_width => width,
            Some(width) => {
                return Err(PolynomialError::parse(
                    text,
                    format!(
                        "degree {degree} needs {width} columns, above the limit of {}",
                        self.settings.max_row_width
                    ),
                ))
            }
            None => {
                return Err(PolynomialError::parse(
                    text,
                    format!("the number of degree-{degree} monomials overflows"),
                ))
            }
        };
        // Every column is below a width that fits in usize.
        let column = monomial.column().ok_or_else(|| {
            PolynomialError::parse(text, "monomial column overflows")
        })?;

        let coefficient = sign * coefficient;
        trace!(
            "term `{}`: coefficient {}, degree {}, column {}",
            text,
            coefficient,
            degree,
            column
        );
        Ok(Term {
            coefficient,
            monomial,
            degree,
            column,
            width,
        })
    }

    fn parse_monomial(&mut self, start: usize) -> Result<Vec<(usize, u32)>> {
        let mut factors = vec![self.parse_factor(start)?];
        while self.peek() == Some(Token::Star) {
            self.consume();
            factors.push(self.parse_factor(start)?);
        }
        Ok(factors)
    }

    fn parse_factor(&mut self, start: usize) -> Result<(usize, u32)> {
        let variable = match self.tokens.get(self.pos).copied() {
            Some(Spanned {
                token: Token::Variable(k),
                start: lo,
                end: hi,
            }) => {
                self.consume();
                // The tokenizer saturates indices that do not fit in usize.
                if self.source[lo + 1..hi].parse::<usize>().is_err() {
                    return Err(PolynomialError::monomial(
                        self.consumed(start),
                        "variable index is too large",
                    ));
                }
                k
            }
            _ => {
                return Err(PolynomialError::monomial(
                    self.fragment(start),
                    "expected a factor of the form x<k> or x<k>^<e>",
                ))
            }
        };

        if self.peek() != Some(Token::Caret) {
            return Ok((variable, 1));
        }
        self.consume();

        match self.consume() {
            Some(Spanned {
                token: Token::Number(_),
                start: lo,
                end: hi,
            }) => {
                let literal = &self.source[lo..hi];
                let exponent = literal.parse::<u32>().map_err(|_| {
                    let reason = if literal.bytes().all(|b| b.is_ascii_digit()) {
                        format!("exponent exceeds the largest supported value {}", u32::MAX)
                    } else {
                        "exponents must be non-negative integers".to_string()
                    };
                    PolynomialError::monomial(self.consumed(start), reason)
                })?;
                Ok((variable, exponent))
            }
            _ => Err(PolynomialError::monomial(
                self.consumed(start),
                "exponents must be non-negative integers",
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_err_contains<T: std::fmt::Debug>(result: Result<T>, needle: &str) {
        let err = result.expect_err("expected error");
        let message = format!("{err}");
        assert!(
            message.contains(needle),
            "expected error to contain \"{needle}\", got \"{message}\""
        );
    }

    #[test]
    fn documented_example_splits_by_degree() {
        let parsed = parse_equation("x2' = -1*x3 + 4.32*x1^2*x3", 3).unwrap();
        assert_eq!(parsed.lhs, 2);
        assert_eq!(parsed.rows.len(), 2);

        assert_eq!(parsed.rows[0].degree, 1);
        assert_eq!(parsed.rows[0].width, 3);
        assert_eq!(parsed.rows[0].row, vec![0.0, 0.0, -1.0]);

        let cubic = &parsed.rows[1];
        assert_eq!(cubic.degree, 3);
        assert_eq!(cubic.width, 10);
        let mut expected = vec![0.0; 10];
        expected[2] = 4.32;
        assert_eq!(cubic.row, expected);
    }

    #[test]
    fn implicit_coefficient_matches_explicit_form() {
        let implicit = parse_equation("x2' = -x3 + 4.32*x1**2*x3", 3).unwrap();
        let explicit = parse_equation("x2' = -1*x3 + 4.32*x1^2*x3", 3).unwrap();
        assert_eq!(implicit, explicit);
    }

    #[test]
    fn same_monomial_accumulates() {
        let parsed = parse_equation("x1' = 1.0*x1^2 + 2.0*x1^2", 2).unwrap();
        assert_eq!(parsed.rows.len(), 1);
        assert_eq!(parsed.rows[0].row, vec![3.0, 0.0, 0.0]);
    }

    #[test]
    fn repeated_factors_sum_exponents() {
        let parsed = parse_equation("x1' = 2*x1*x2*x1", 2).unwrap();
        assert_eq!(parsed.rows[0].degree, 3);
        // x1^2*x2 is the second cubic monomial over two variables.
        assert_eq!(parsed.rows[0].row, vec![0.0, 2.0, 0.0, 0.0]);
    }

    #[test]
    fn whitespace_is_insignificant() {
        let spaced = parse_equation("  x1 '  =  2.5 * x1 ^ 2  +  1 * x2 ", 2).unwrap();
        let packed = parse_equation("x1'=2.5*x1^2+1*x2", 2).unwrap();
        assert_eq!(spaced, packed);
    }

    #[test]
    fn subtraction_negates_following_term() {
        let parsed = parse_equation("x1' = 2*x1 - 3*x2 - -1*x1", 2).unwrap();
        assert_eq!(parsed.rows[0].row, vec![3.0, -3.0]);
    }

    #[test]
    fn scientific_notation_coefficients() {
        let parsed = parse_equation("x1' = 1e-3*x1 + 2.5E+2*x2", 2).unwrap();
        assert_eq!(parsed.rows[0].row, vec![1e-3, 250.0]);
    }

    #[test]
    fn strict_settings_require_signed_literals() {
        let strict = ParseSettings::strict();
        assert!(parse_equation_with("x1' = -1.5*x2 + 2*x1^2", 2, &strict).is_ok());
        assert_err_contains(
            parse_equation_with("x1' = x2", 2, &strict),
            "missing numeric coefficient",
        );
        assert_err_contains(
            parse_equation_with("x1' = -x2", 2, &strict),
            "leading `-`",
        );
        assert_err_contains(
            parse_equation_with("x1' = 1*x1 - 2*x2", 2, &strict),
            "subtraction between terms is disabled",
        );
    }

    #[test]
    fn malformed_equations_are_parse_errors() {
        let cases = [
            ("x1 2*x1", "missing `=`"),
            ("x1 = 2*x1", "derivative"),
            ("x1' =", "right-hand side is empty"),
            ("x1' = 2*x1 +", "dangling operator"),
            ("x1' = 2 x1", "missing `*`"),
            ("x1' = abc*x1", "unknown symbol"),
            ("x1' = 2*x1 + 3", "constant terms"),
            ("x1' = 2*x1 = 3*x2", "expected `+`"),
            ("x1' = 2*x1 # 3", "unexpected character"),
            ("x1' = 1.2.3*x1", "not a valid number"),
        ];
        for (text, needle) in cases {
            let result = parse_equation(text, 2);
            assert!(
                matches!(result, Err(PolynomialError::ParseError { .. })),
                "{text}: {result:?}"
            );
            assert_err_contains(result, needle);
        }
    }

    #[test]
    fn malformed_factors_are_invalid_monomials() {
        let cases = [
            ("x1' = 2*x3", "outside"),
            ("x1' = 2*x0", "outside"),
            ("x1' = 2*x1^1.5", "non-negative integers"),
            ("x1' = 2*x1^-1", "non-negative integers"),
            ("x1' = 2*x1*3", "expected a factor"),
            ("x1' = 2*x", "x<k>"),
        ];
        for (text, needle) in cases {
            let result = parse_equation(text, 2);
            assert!(
                matches!(result, Err(PolynomialError::InvalidMonomial { .. })),
                "{text}: {result:?}"
            );
            assert_err_contains(result, needle);
        }
    }

    #[test]
    fn error_quotes_the_offending_term() {
        let err = parse_equation("x1' = 1*x1 + 2*x7*x1", 2).unwrap_err();
        assert_eq!(
            err,
            PolynomialError::InvalidMonomial {
                term: "2*x7*x1".to_string(),
                reason: "variable x7 is outside x1..x2".to_string(),
            }
        );
    }

    #[test]
    fn lhs_out_of_range_is_dimension_error() {
        let err = parse_equation("x4' = 1*x1", 3).unwrap_err();
        assert_eq!(
            err,
            PolynomialError::DimensionError {
                index: 4,
                n_variables: 3
            }
        );
        assert!(matches!(
            parse_equation("x0' = 1*x1", 3),
            Err(PolynomialError::DimensionError { index: 0, .. })
        ));
        assert_eq!(
            parse_equation("x99999999999999999999999' = 1*x1", 3).unwrap_err(),
            PolynomialError::DimensionError {
                index: usize::MAX,
                n_variables: 3
            }
        );
    }

    #[test]
    fn oversized_indices_and_exponents_are_named() {
        let err = parse_equation("x1' = 1*x99999999999999999999999", 3).unwrap_err();
        assert_eq!(
            err,
            PolynomialError::InvalidMonomial {
                term: "1*x99999999999999999999999".to_string(),
                reason: "variable index is too large".to_string(),
            }
        );

        let result = parse_equation("x1' = 1*x1^99999999999", 1);
        assert!(
            matches!(result, Err(PolynomialError::InvalidMonomial { .. })),
            "{result:?}"
        );
        assert_err_contains(result, "exceeds the largest supported value 4294967295");
    }

    #[test]
    fn repeated_factor_exponent_overflow_is_reported() {
        let err = parse_equation("x1' = 1*x1^4294967295*x1", 1).unwrap_err();
        assert_eq!(
            err,
            PolynomialError::InvalidMonomial {
                term: "1*x1^4294967295*x1".to_string(),
                reason: "exponent of x1 overflows".to_string(),
            }
        );
    }

    #[test]
    fn unrepresentable_rows_are_rejected_before_allocation() {
        let err = parse_equation("x1' = 1*x30^40", 30).unwrap_err();
        assert!(matches!(err, PolynomialError::ParseError { ref term, .. } if term == "1*x30^40"));
        assert_err_contains(Err::<(), _>(err), "degree-40 monomials overflows");

        // C(39, 29) columns fit in usize but not under the default limit.
        let result = parse_equation("x2' = 1*x1^10", 30);
        assert!(matches!(result, Err(PolynomialError::ParseError { .. })));
        assert_err_contains(result, "635745396 columns, above the limit of 1048576");
    }

    #[test]
    fn row_width_limit_is_configurable() {
        let settings = ParseSettings {
            max_row_width: 3,
            ..ParseSettings::default()
        };
        let parsed = parse_equation_with("x1' = 1*x1*x2", 2, &settings).unwrap();
        assert_eq!(parsed.rows[0].width, 3);

        let result = parse_equation_with("x1' = 1*x1 + 1*x2^3", 2, &settings);
        assert_err_contains(result, "`1*x2^3`: degree 3 needs 4 columns");
    }

    #[test]
    fn rows_follow_first_appearance() {
        let parsed = parse_equation("x1' = 1*x1^2 + 1*x2 + 1*x1*x2", 2).unwrap();
        let degrees: Vec<usize> = parsed.rows.iter().map(|r| r.degree).collect();
        assert_eq!(degrees, vec![2, 1]);
        assert_eq!(parsed.rows[0].row, vec![1.0, 1.0, 0.0]);
    }

    #[test]
    fn parse_terms_keeps_terms_separate() {
        let (lhs, terms) =
            parse_terms("x2' = 1*x1 + 2*x1", 2, &ParseSettings::default()).unwrap();
        assert_eq!(lhs, 2);
        assert_eq!(terms.len(), 2);
        assert_eq!(terms[1].coefficient, 2.0);
        assert_eq!(terms[1].monomial.to_string(), "x1");
    }
}
