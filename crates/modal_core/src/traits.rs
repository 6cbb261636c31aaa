use num_traits::{Float, FromPrimitive};
use std::fmt::Debug;

/// Element type of the states a [`DynamicalSystem`] is evaluated on.
pub trait Scalar: Float + FromPrimitive + Debug + 'static {}

impl<T: Float + FromPrimitive + Debug + 'static> Scalar for T {}

/// Right-hand side of an ODE `x' = f(t, x)`.
///
/// [`PolynomialSystem`](crate::system::PolynomialSystem) implements this over
/// `f64`, evaluating `L·X + N2(X) + ...` from its assembled coefficient
/// matrices. Integrators, continuation and root-finding code written against
/// the trait therefore accept an assembled system without knowing how its
/// field was built.
pub trait DynamicalSystem<T: Scalar> {
    /// Number of state variables.
    fn dimension(&self) -> usize;

    /// Writes `f(t, x)` into `out`. Both slices hold `dimension()` entries.
    fn apply(&self, t: T, x: &[T], out: &mut [T]);
}
