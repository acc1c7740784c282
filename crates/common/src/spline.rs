//! Cubic Hermite interpolation over a handful of control points.
//!
//! Used for fade and threshold curves: designers supply a few `(x, y)` samples,
//! `commit()` derives a tangent per sample, and `evaluate()` reads a smooth
//! curve through them. See <https://en.wikipedia.org/wiki/Cubic_Hermite_spline>.

use std::fmt::Debug;
use std::ops::{Add, Div, Mul, Sub};

/// Scalar types a [`SplineTable`] can be built over.
pub trait SplineScalar:
    Copy
    + PartialOrd
    + Debug
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Div<Output = Self>
{
    const ZERO: Self;
    const ONE: Self;
    const TWO: Self;
    const THREE: Self;

    fn is_nan(self) -> bool;
}

macro_rules! impl_spline_scalar {
    ($($t:ty),*) => {
        $(
            impl SplineScalar for $t {
                const ZERO: Self = 0.0;
                const ONE: Self = 1.0;
                const TWO: Self = 2.0;
                const THREE: Self = 3.0;

                fn is_nan(self) -> bool {
                    <$t>::is_nan(self)
                }
            }
        )*
    };
}

impl_spline_scalar!(f32, f64);

/// Piecewise cubic Hermite interpolant with strictly increasing x.
///
/// Build-once: insert points, `commit()`, then read. Inserting after a commit
/// leaves the tangents stale until the next `commit()`, and evaluating a stale
/// table with two or more points panics.
#[derive(Debug, Clone)]
pub struct SplineTable<T> {
    /// Sorted by x, no duplicate x.
    points: Vec<(T, T)>,
    /// One slope per point once committed.
    tangents: Vec<T>,
    committed: bool,
}

impl<T: SplineScalar> Default for SplineTable<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: SplineScalar> SplineTable<T> {
    pub fn new() -> Self {
        Self {
            points: Vec::new(),
            tangents: Vec::new(),
            committed: true,
        }
    }

    /// Build and commit a table from `(x, y)` samples in any order.
    pub fn from_points(samples: impl IntoIterator<Item = (T, T)>) -> Self {
        let mut table = Self::new();
        for (x, y) in samples {
            table.add_point(x, y);
        }
        table.commit();
        table
    }

    /// Insert or overwrite the sample at `x`.
    pub fn add_point(&mut self, x: T, y: T) {
        assert!(!x.is_nan(), "spline sample x must not be NaN");
        // x is never NaN here so partial_cmp always answers
        match self
            .points
            .binary_search_by(|(px, _)| px.partial_cmp(&x).unwrap_or(std::cmp::Ordering::Less))
        {
            Ok(i) => self.points[i].1 = y,
            Err(i) => self.points.insert(i, (x, y)),
        }
        self.committed = false;
    }

    /// Recompute every tangent from the current points.
    pub fn commit(&mut self) {
        let n = self.points.len();
        self.tangents.clear();
        self.committed = true;
        match n {
            0 => {}
            1 => self.tangents.push(T::ZERO),
            _ => {
                self.tangents.push(self.secant(0, 1));
                for i in 1..n - 1 {
                    self.tangents.push(self.secant(i - 1, i + 1));
                }
                self.tangents.push(self.secant(n - 2, n - 1));
            }
        }
    }

    fn secant(&self, a: usize, b: usize) -> T {
        let (x0, y0) = self.points[a];
        let (x1, y1) = self.points[b];
        (y1 - y0) / (x1 - x0)
    }

    /// Interpolated value at `x`, extrapolating linearly past either end.
    pub fn evaluate(&self, x: T) -> T {
        match self.points.len() {
            0 => return T::ZERO,
            1 => return self.points[0].1,
            _ => {}
        }
        assert!(
            self.committed,
            "spline table evaluated after add_point without a commit"
        );

        let last = self.points.len() - 1;
        let (min_x, min_y) = self.points[0];
        let (max_x, max_y) = self.points[last];
        if x <= min_x {
            return min_y + (x - min_x) * self.tangents[0];
        }
        if x >= max_x {
            return max_y + (x - max_x) * self.tangents[last];
        }

        // index 0 cannot match because x > min_x
        for i in 1..=last {
            let (x1, y1) = self.points[i];
            if x1 > x {
                let (x0, y0) = self.points[i - 1];
                let m0 = self.tangents[i - 1];
                let m1 = self.tangents[i];
                let h = x1 - x0;
                let t = (x - x0) / h;
                let one = T::ONE;
                let two = T::TWO;
                let three = T::THREE;
                let u = one - t;
                return (one + two * t) * u * u * y0
                    + t * u * u * h * m0
                    + t * t * (three - two * t) * y1
                    + t * t * (t - one) * h * m1;
            }
        }
        unreachable!("spline scan fell through without bracketing {x:?}");
    }

    pub fn min_x(&self) -> Option<T> {
        self.points.first().map(|p| p.0)
    }

    pub fn max_x(&self) -> Option<T> {
        self.points.last().map(|p| p.0)
    }

    /// Samples in ascending x.
    pub fn points(&self) -> &[(T, T)] {
        &self.points
    }

    /// Tangents aligned with `points()`; empty or stale until `commit()`.
    pub fn tangents(&self) -> &[T] {
        &self.tangents
    }

    pub fn is_committed(&self) -> bool {
        self.committed
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    #[test]
    fn empty_table_evaluates_to_zero() {
        let table = SplineTable::<f32>::new();
        assert_eq!(table.evaluate(-5.0), 0.0);
        assert_eq!(table.evaluate(0.0), 0.0);
        assert_eq!(table.evaluate(1e6), 0.0);
        assert!(table.min_x().is_none());
    }

    #[test]
    fn single_point_is_constant() {
        let table = SplineTable::from_points([(2.0f64, 7.5)]);
        assert_eq!(table.tangents(), &[0.0]);
        for x in [-100.0, 0.0, 2.0, 3.0, 1e9] {
            assert_eq!(table.evaluate(x), 7.5);
        }
    }

    #[test]
    fn two_points_are_linear_everywhere() {
        let table = SplineTable::from_points([(0.0f64, 1.0), (4.0, 9.0)]);
        assert_eq!(table.tangents(), &[2.0, 2.0]);
        for x in [-2.0, 0.0, 0.5, 1.0, 2.5, 3.9, 4.0, 10.0] {
            assert_relative_eq!(table.evaluate(x), 1.0 + 2.0 * x, epsilon = 1e-12);
        }
    }

    #[test]
    fn tangents_use_central_differences() {
        let table = SplineTable::from_points([(0.0f64, 0.0), (1.0, 2.0), (3.0, 2.0), (4.0, 0.0)]);
        // endpoints: secant of adjacent interval; interior: secant of neighbours
        assert_eq!(table.tangents(), &[2.0, 2.0 / 3.0, -2.0 / 3.0, -2.0]);
    }

    #[test]
    fn add_point_overwrites_same_x() {
        let mut table = SplineTable::new();
        table.add_point(1.0f32, 1.0);
        table.add_point(0.0, 0.0);
        table.add_point(1.0, 5.0);
        table.commit();
        assert_eq!(table.points(), &[(0.0, 0.0), (1.0, 5.0)]);
        assert_eq!(table.min_x(), Some(0.0));
        assert_eq!(table.max_x(), Some(1.0));
    }

    #[test]
    fn extrapolates_linearly_with_end_tangents() {
        let table = SplineTable::from_points([(0.0f64, 0.0), (1.0, 1.0), (2.0, 0.0)]);
        // tangent at 0 is 1, at 2 is -1
        assert_relative_eq!(table.evaluate(-1.0), -1.0);
        assert_relative_eq!(table.evaluate(3.0), -1.0);
    }

    #[test]
    fn adding_a_point_requires_recommit() {
        let mut table = SplineTable::from_points([(0.0f32, 0.0), (1.0, 1.0)]);
        assert!(table.is_committed());
        table.add_point(2.0, 0.0);
        assert!(!table.is_committed());
        table.commit();
        assert_relative_eq!(table.evaluate(2.0), 0.0);
    }

    #[test]
    #[should_panic(expected = "without a commit")]
    fn stale_table_panics() {
        let mut table = SplineTable::from_points([(0.0f32, 0.0), (1.0, 1.0)]);
        table.add_point(2.0, 0.0);
        table.evaluate(0.5);
    }

    #[test]
    #[should_panic(expected = "fell through")]
    fn nan_input_is_fatal() {
        let table = SplineTable::from_points([(0.0f32, 0.0), (1.0, 1.0), (2.0, 4.0)]);
        table.evaluate(f32::NAN);
    }

    #[test]
    fn continuous_at_interior_knots() {
        let table = SplineTable::from_points([(0.0f64, 1.0), (0.7, 1.0), (1.0, 0.0), (2.0, 0.5)]);
        for &(x, y) in &table.points()[1..table.len() - 1] {
            let eps = 1e-9;
            assert_relative_eq!(table.evaluate(x - eps), y, epsilon = 1e-6);
            assert_relative_eq!(table.evaluate(x + eps), y, epsilon = 1e-6);
        }
    }

    fn sorted_samples() -> impl Strategy<Value = Vec<(f64, f64)>> {
        prop::collection::vec((0.1f64..10.0, -100.0f64..100.0), 1..12).prop_map(|steps| {
            let mut x = -50.0;
            steps
                .into_iter()
                .map(|(dx, y)| {
                    x += dx;
                    (x, y)
                })
                .collect()
        })
    }

    proptest! {
        #[test]
        fn interpolates_every_sample(samples in sorted_samples()) {
            let table = SplineTable::from_points(samples.clone());
            for (x, y) in samples {
                let got = table.evaluate(x);
                prop_assert!((got - y).abs() <= 1e-9 * (1.0 + y.abs()), "x={x} y={y} got={got}");
            }
        }

        #[test]
        fn one_sided_limits_match_at_knots(samples in sorted_samples()) {
            let table = SplineTable::from_points(samples.clone());
            for &(x, y) in &samples {
                let eps = 1e-7;
                let left = table.evaluate(x - eps);
                let right = table.evaluate(x + eps);
                let tol = 1e-3 * (1.0 + y.abs());
                prop_assert!((left - y).abs() <= tol, "left x={x} y={y} got={left}");
                prop_assert!((right - y).abs() <= tol, "right x={x} y={y} got={right}");
            }
        }
    }
}
