//! The polynomial system builder.
//!
//! A [`PolynomialSystem`] stores the vector field
//!
//! ```text
//! X' = L·X + N2·X^[2] + N3·X^[3] + ...
//! ```
//!
//! as one dense coefficient matrix per total degree. The matrix for degree `d`
//! has one row per state variable and one column per degree-`d` monomial, in
//! the order defined by [`crate::monomial`].

use crate::error::{PolynomialError, Result};
use crate::monomial::{monomial_vector, monomials_of_degree};
use crate::parser::{parse_equation_with, ParseSettings};
use crate::traits::DynamicalSystem;
use anyhow::anyhow;
use log::{debug, info, warn};
use nalgebra::linalg::Schur;
use nalgebra::{DMatrix, DVector};
use num_complex::Complex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Per-degree coefficient matrices of a polynomial ODE system.
#[derive(Debug, Clone, PartialEq)]
pub struct PolynomialSystem {
    n_variables: usize,
    settings: ParseSettings,
    matrices: BTreeMap<usize, DMatrix<f64>>,
}

impl PolynomialSystem {
    pub fn new(n_variables: usize) -> Result<Self> {
        Self::with_settings(n_variables, ParseSettings::default())
    }

    pub fn with_settings(n_variables: usize, settings: ParseSettings) -> Result<Self> {
        if n_variables == 0 {
            return Err(PolynomialError::EmptySystem);
        }
        info!("Polynomial system created with {} state variables", n_variables);
        Ok(Self {
            n_variables,
            settings,
            matrices: BTreeMap::new(),
        })
    }

    /// Builds a system and adds every equation in turn, stopping at the first error.
    pub fn from_equations<I, S>(n_variables: usize, equations: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut system = Self::new(n_variables)?;
        for equation in equations {
            system.add_equation(equation.as_ref())?;
        }
        Ok(system)
    }

    /// Parses `text` and writes its coefficients into row `lhs - 1` of each
    /// degree's matrix, creating matrices on first use.
    ///
    /// The row of every degree the equation touches is replaced, not summed into.
    /// Degrees the equation does not mention keep their previous contents.
    /// On error the system is left exactly as it was.
    pub fn add_equation(&mut self, text: &str) -> Result<()> {
        let parsed = parse_equation_with(text, self.n_variables, &self.settings)?;
        let row_idx = parsed.lhs - 1;
        let n = self.n_variables;

        for degree_row in &parsed.rows {
            let matrix = self
                .matrices
                .entry(degree_row.degree)
                .or_insert_with(|| DMatrix::zeros(n, degree_row.width));

            if matrix.row(row_idx).iter().any(|&v| v != 0.0) {
                warn!(
                    "Overwriting degree-{} coefficients of x{}'",
                    degree_row.degree, parsed.lhs
                );
            }
            matrix.row_mut(row_idx).copy_from_slice(&degree_row.row);
        }

        debug!(
            "Equation added for x{}' with degrees {:?}",
            parsed.lhs,
            parsed.rows.iter().map(|r| r.degree).collect::<Vec<_>>()
        );
        Ok(())
    }

    pub fn n_variables(&self) -> usize {
        self.n_variables
    }

    pub fn settings(&self) -> &ParseSettings {
        &self.settings
    }

    /// Degree → coefficient matrix, ascending by degree.
    pub fn matrices(&self) -> &BTreeMap<usize, DMatrix<f64>> {
        &self.matrices
    }

    pub fn matrix(&self, degree: usize) -> Option<&DMatrix<f64>> {
        self.matrices.get(&degree)
    }

    /// The matrix `L` of the linear part, if any degree-1 term was added.
    pub fn linear_part(&self) -> Option<&DMatrix<f64>> {
        self.matrix(1)
    }

    pub fn degrees(&self) -> impl Iterator<Item = usize> + '_ {
        self.matrices.keys().copied()
    }

    pub fn max_degree(&self) -> Option<usize> {
        self.matrices.keys().next_back().copied()
    }

    /// Human-readable description `X' = L·X + N2(X) + ...` followed by each
    /// coefficient matrix.
    pub fn render_summary(&self) -> String {
        self.to_string()
    }

    pub fn snapshot(&self) -> SystemSnapshot {
        let matrices = self
            .matrices
            .iter()
            .map(|(&degree, matrix)| CoefficientMatrix {
                degree,
                rows: matrix.nrows(),
                columns: matrix.ncols(),
                monomials: monomials_of_degree(degree, self.n_variables)
                    .iter()
                    .map(ToString::to_string)
                    .collect(),
                values: matrix.transpose().as_slice().to_vec(),
            })
            .collect();
        SystemSnapshot {
            n_variables: self.n_variables,
            matrices,
        }
    }

    /// Evaluates the vector field at `x`.
    pub fn evaluate(&self, x: &[f64]) -> Result<Vec<f64>> {
        self.check_state(x)?;
        let mut out = vec![0.0; self.n_variables];
        self.apply(0.0, x, &mut out);
        Ok(out)
    }

    /// Jacobian of the vector field at `x`, row `i` holding the gradient of `x_i'`.
    pub fn jacobian(&self, x: &[f64]) -> Result<DMatrix<f64>> {
        self.check_state(x)?;
        let n = self.n_variables;
        let mut jacobian = DMatrix::zeros(n, n);

        for (&degree, matrix) in &self.matrices {
            for (column, monomial) in monomials_of_degree(degree, n).iter().enumerate() {
                for slot in 0..n {
                    let Some((factor, lowered)) = monomial.differentiate(slot) else {
                        continue;
                    };
                    let derivative = factor as f64 * lowered.evaluate(x);
                    if derivative == 0.0 {
                        continue;
                    }
                    for row in 0..n {
                        jacobian[(row, slot)] += matrix[(row, column)] * derivative;
                    }
                }
            }
        }

        Ok(jacobian)
    }

    /// Eigenvalues of the linear part `L` (a zero matrix when the system has no
    /// degree-1 terms).
    pub fn linear_spectrum(&self) -> anyhow::Result<Vec<Complex<f64>>> {
        let n = self.n_variables;
        let linear = self
            .linear_part()
            .cloned()
            .unwrap_or_else(|| DMatrix::zeros(n, n));
        let schur = Schur::try_new(linear, f64::EPSILON, 10_000)
            .ok_or_else(|| anyhow!("Schur decomposition of the linear part did not converge."))?;
        Ok(schur.complex_eigenvalues().iter().copied().collect())
    }

    fn check_state(&self, x: &[f64]) -> Result<()> {
        if x.len() != self.n_variables {
            return Err(PolynomialError::StateMismatch {
                expected: self.n_variables,
                actual: x.len(),
            });
        }
        Ok(())
    }
}

impl DynamicalSystem<f64> for PolynomialSystem {
    fn dimension(&self) -> usize {
        self.n_variables
    }

    fn apply(&self, _t: f64, x: &[f64], out: &mut [f64]) {
        out.iter_mut().for_each(|v| *v = 0.0);
        for (&degree, matrix) in &self.matrices {
            let monomials = DVector::from_vec(monomial_vector(x, degree));
            let contribution = matrix * monomials;
            for (value, delta) in out.iter_mut().zip(contribution.iter()) {
                *value += delta;
            }
        }
    }
}

impl fmt::Display for PolynomialSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .degrees()
            .map(|degree| match degree {
                1 => "L·X".to_string(),
                d => format!("N{d}(X)"),
            })
            .collect();

        if parts.is_empty() {
            return writeln!(f, "X' = 0");
        }
        writeln!(f, "X' = {}, where:", parts.join(" + "))?;

        let derivatives: Vec<String> = (1..=self.n_variables).map(|k| format!("x{k}'")).collect();
        writeln!(f)?;
        writeln!(f, "X' = [{}] is the derivative vector", derivatives.join(", "))?;

        for (&degree, matrix) in &self.matrices {
            let labels: Vec<String> = monomials_of_degree(degree, self.n_variables)
                .iter()
                .map(ToString::to_string)
                .collect();
            writeln!(f)?;
            if degree == 1 {
                writeln!(
                    f,
                    "L is the linear coefficient matrix over [{}]:",
                    labels.join(", ")
                )?;
            } else {
                writeln!(
                    f,
                    "N{degree}(X) holds the degree-{degree} terms, coefficients over [{}]:",
                    labels.join(", ")
                )?;
            }
            write!(f, "{matrix}")?;
        }
        Ok(())
    }
}

/// One coefficient matrix in a [`SystemSnapshot`], values in row-major order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoefficientMatrix {
    pub degree: usize,
    pub rows: usize,
    pub columns: usize,
    pub monomials: Vec<String>,
    pub values: Vec<f64>,
}

/// Plain-data view of a [`PolynomialSystem`] for serialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemSnapshot {
    pub n_variables: usize,
    pub matrices: Vec<CoefficientMatrix>,
}
