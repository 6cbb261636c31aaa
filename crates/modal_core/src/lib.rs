/// The `modal_core` crate turns a textual polynomial ODE system into per-degree
/// coefficient matrices, so that the vector field reads
/// `X' = L·X + N2·X^[2] + N3·X^[3] + ...`.
///
/// Key components:
/// - **Monomial**: the rank/unrank bijection between exponent tuples and matrix columns.
/// - **Parser**: a tokenizer and recursive-descent parser for `x<k>' = ...` equations.
/// - **System**: `PolynomialSystem`, which accumulates matrices, renders a summary and
///   evaluates the field it represents through the `DynamicalSystem` trait.
pub mod error;
pub mod monomial;
pub mod parser;
pub mod system;
pub mod traits;

pub use error::{PolynomialError, Result};
pub use monomial::{index, monomial_count, Monomial};
pub use parser::{parse_equation, parse_equation_with, ParseSettings, ParsedEquation};
pub use system::{PolynomialSystem, SystemSnapshot};
