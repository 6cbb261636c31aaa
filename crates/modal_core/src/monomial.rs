//! Monomial indexing.
//!
//! All monomials of total degree `d` over `n` state variables are enumerated in
//! lexicographically descending order of their exponent tuples, so `x1^d` sits
//! in column 0 and `xn^d` in the last column. For `n = 3, d = 2` the columns are
//! `x1^2, x1*x2, x1*x3, x2^2, x2*x3, x3^2`.
//!
//! The rank of a monomial is computed position by position: at variable `i` we
//! count the monomials that agree on variables `1..i` and carry a strictly
//! larger exponent at `i`. Those are exactly the monomials whose tail
//! `i+1..n` has a total degree below the one the target leaves over.

use crate::error::{PolynomialError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Binomial coefficient `C(n, k)`, zero when `k > n`, `None` when it does not
/// fit in a `usize`.
pub fn binomial(n: usize, k: usize) -> Option<usize> {
    if k > n {
        return Some(0);
    }
    let k = k.min(n - k);
    // acc == C(n, i) at the top of every iteration, so the division is exact.
    let mut acc: usize = 1;
    for i in 0..k {
        let next = acc as u128 * (n - i) as u128 / (i + 1) as u128;
        acc = usize::try_from(next).ok()?;
    }
    Some(acc)
}

/// Number of monomials of total degree `degree` in `n_variables` variables,
/// `C(degree + n - 1, n - 1)`. This is the width of the degree's coefficient
/// matrix. `None` when the count does not fit in a `usize`.
pub fn monomial_count(degree: usize, n_variables: usize) -> Option<usize> {
    if n_variables == 0 {
        return Some(0);
    }
    binomial(degree.checked_add(n_variables - 1)?, n_variables - 1)
}

/// Monomials whose `free` trailing variables sum to less than `remaining`:
/// `Σ_{j<remaining} C(j + free - 1, free - 1) = C(remaining + free - 1, free)`.
fn tail_weight(remaining: usize, free: usize) -> Option<usize> {
    if remaining == 0 {
        return Some(0);
    }
    binomial(remaining.checked_add(free - 1)?, free)
}

/// A product of state variables with non-negative integer exponents.
///
/// Exponents are stored densely: variable `x_k` lives in slot `k - 1`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Monomial {
    exponents: Vec<u32>,
}

impl Monomial {
    /// The constant monomial `1` over `n_variables` variables.
    pub fn one(n_variables: usize) -> Self {
        Self {
            exponents: vec![0; n_variables],
        }
    }

    pub fn from_exponents(exponents: Vec<u32>) -> Self {
        Self { exponents }
    }

    /// Builds a monomial from `(variable_index, exponent)` pairs with 1-based
    /// variable indices. Repeated variables have their exponents summed.
    pub fn from_factors(factors: &[(usize, u32)], n_variables: usize) -> Result<Self> {
        let mut monomial = Self::one(n_variables);
        for &(variable, exponent) in factors {
            if variable == 0 || variable > n_variables {
                return Err(PolynomialError::monomial(
                    factors_label(factors),
                    format!("variable x{variable} is outside x1..x{n_variables}"),
                ));
            }
            let slot = &mut monomial.exponents[variable - 1];
            *slot = slot.checked_add(exponent).ok_or_else(|| {
                PolynomialError::monomial(
                    factors_label(factors),
                    format!("exponent of x{variable} overflows"),
                )
            })?;
        }
        Ok(monomial)
    }

    /// Inverse of [`Monomial::column`]: the monomial sitting at `column` among
    /// the degree-`degree` monomials over `n_variables` variables.
    pub fn from_column(degree: usize, column: usize, n_variables: usize) -> Result<Self> {
        let width = monomial_count(degree, n_variables).ok_or_else(|| {
            PolynomialError::monomial(
                format!("column {column}"),
                format!("degree {degree} over {n_variables} variables has too many columns"),
            )
        })?;
        if column >= width {
            return Err(PolynomialError::monomial(
                format!("column {column}"),
                format!(
                    "degree {degree} over {n_variables} variables has only {width} columns"
                ),
            ));
        }

        let mut exponents = vec![0u32; n_variables];
        let mut remaining = degree;
        let mut rest = column;
        for slot in 0..n_variables - 1 {
            let free = n_variables - slot - 1;
            let mut exponent = remaining;
            loop {
                // A block too large for usize is larger than any valid column.
                let block = monomial_count(remaining - exponent, free).unwrap_or(usize::MAX);
                if rest < block {
                    break;
                }
                rest -= block;
                exponent -= 1;
            }
            exponents[slot] = exponent as u32;
            remaining -= exponent;
        }
        exponents[n_variables - 1] = remaining as u32;

        Ok(Self { exponents })
    }

    pub fn n_variables(&self) -> usize {
        self.exponents.len()
    }

    pub fn exponents(&self) -> &[u32] {
        &self.exponents
    }

    /// Total degree, the sum of all exponents. Saturates at `usize::MAX`.
    pub fn degree(&self) -> usize {
        self.exponents
            .iter()
            .fold(0usize, |acc, &e| acc.saturating_add(e as usize))
    }

    /// Column of this monomial within the degree-`self.degree()` enumeration,
    /// in `0..monomial_count(degree, n)`. `None` when the degree or the rank
    /// does not fit in a `usize`.
    pub fn column(&self) -> Option<usize> {
        let n = self.exponents.len();
        let mut remaining = self
            .exponents
            .iter()
            .try_fold(0usize, |acc, &e| acc.checked_add(e as usize))?;
        let mut column: usize = 0;
        for (slot, &power) in self.exponents.iter().enumerate().take(n.saturating_sub(1)) {
            remaining -= power as usize;
            column = column.checked_add(tail_weight(remaining, n - slot - 1)?)?;
        }
        Some(column)
    }

    /// Evaluates the monomial at state `x`. `x` must have one entry per variable.
    pub fn evaluate(&self, x: &[f64]) -> f64 {
        self.exponents
            .iter()
            .zip(x)
            .map(|(&e, &v)| v.powi(e as i32))
            .product()
    }

    /// Partial derivative with respect to the variable in `slot` (0-based),
    /// as `(factor, lowered monomial)`. `None` when the variable is absent.
    pub fn differentiate(&self, slot: usize) -> Option<(u32, Monomial)> {
        let power = *self.exponents.get(slot)?;
        if power == 0 {
            return None;
        }
        let mut lowered = self.clone();
        lowered.exponents[slot] -= 1;
        Some((power, lowered))
    }
}

impl fmt::Display for Monomial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (slot, &power) in self.exponents.iter().enumerate() {
            if power == 0 {
                continue;
            }
            if !first {
                f.write_str("*")?;
            }
            first = false;
            if power == 1 {
                write!(f, "x{}", slot + 1)?;
            } else {
                write!(f, "x{}^{}", slot + 1, power)?;
            }
        }
        if first {
            f.write_str("1")?;
        }
        Ok(())
    }
}

fn factors_label(factors: &[(usize, u32)]) -> String {
    factors
        .iter()
        .map(|(variable, exponent)| format!("x{variable}^{exponent}"))
        .collect::<Vec<_>>()
        .join("*")
}

/// Returns `(degree, column)` for a monomial given as `(variable_index, exponent)`
/// pairs with 1-based variable indices.
pub fn index(factors: &[(usize, u32)], n_variables: usize) -> Result<(usize, usize)> {
    let monomial = Monomial::from_factors(factors, n_variables)?;
    let column = monomial.column().ok_or_else(|| {
        PolynomialError::monomial(
            factors_label(factors),
            "too many monomials of this degree to index",
        )
    })?;
    Ok((monomial.degree(), column))
}

/// Every monomial of total degree `degree` over `n_variables` variables, in
/// column order.
pub fn monomials_of_degree(degree: usize, n_variables: usize) -> Vec<Monomial> {
    let mut out = Vec::with_capacity(monomial_count(degree, n_variables).unwrap_or(0));
    if n_variables == 0 {
        return out;
    }
    let mut prefix = Vec::with_capacity(n_variables);
    push_descending(&mut prefix, degree as u32, n_variables, &mut out);
    out
}

fn push_descending(prefix: &mut Vec<u32>, remaining: u32, n: usize, out: &mut Vec<Monomial>) {
    if prefix.len() == n - 1 {
        prefix.push(remaining);
        out.push(Monomial::from_exponents(prefix.clone()));
        prefix.pop();
        return;
    }
    for power in (0..=remaining).rev() {
        prefix.push(power);
        push_descending(prefix, remaining - power, n, out);
        prefix.pop();
    }
}

/// `X^[d]`: the values of all degree-`degree` monomials at state `x`, in
/// column order.
pub fn monomial_vector(x: &[f64], degree: usize) -> Vec<f64> {
    monomials_of_degree(degree, x.len())
        .iter()
        .map(|m| m.evaluate(x))
        .collect()
}
