//! Growable parameter arrays with a comparison tolerance and a monotonicity
//! flag.
//!
//! Out-of-range access returns `None`; there is no sentinel element.

use serde::{Deserialize, Serialize};

use super::core::Tolerance;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamArray {
    values: Vec<f64>,
    tolerance: f64,
    /// True while every value exceeds its predecessor by more than `tolerance`.
    strictly_increasing: bool,
}

impl ParamArray {
    #[must_use]
    pub fn new(tol: Tolerance) -> Self {
        Self::with_capacity(0, tol)
    }

    #[must_use]
    pub fn with_capacity(capacity: usize, tol: Tolerance) -> Self {
        Self {
            values: Vec::with_capacity(capacity),
            tolerance: tol.eps.abs(),
            strictly_increasing: true,
        }
    }

    #[must_use]
    pub fn from_values(values: Vec<f64>, tol: Tolerance) -> Self {
        let tolerance = tol.eps.abs();
        let strictly_increasing = values.windows(2).all(|w| w[1] - w[0] > tolerance);
        Self {
            values,
            tolerance,
            strictly_increasing,
        }
    }

    /// Appends a value, downgrading the monotonicity flag if needed.
    pub fn push(&mut self, value: f64) {
        if let Some(&last) = self.values.last() {
            if value - last <= self.tolerance {
                self.strictly_increasing = false;
            }
        }
        self.values.push(value);
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<f64> {
        self.values.get(index).copied()
    }

    #[must_use]
    pub fn first(&self) -> Option<f64> {
        self.values.first().copied()
    }

    #[must_use]
    pub fn last(&self) -> Option<f64> {
        self.values.last().copied()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.values.capacity()
    }

    #[must_use]
    pub const fn tolerance(&self) -> f64 {
        self.tolerance
    }

    #[must_use]
    pub const fn is_strictly_increasing(&self) -> bool {
        self.strictly_increasing
    }

    #[must_use]
    pub fn as_slice(&self) -> &[f64] {
        &self.values
    }

    /// Drops the logical contents, keeping the allocation.
    pub fn clear(&mut self) {
        self.values.clear();
        self.strictly_increasing = true;
    }

    /// Sorts ascending and removes values within `tolerance` of their
    /// predecessor, restoring strict monotonicity.
    pub fn sort_dedup(&mut self) {
        self.values.retain(|x| x.is_finite());
        self.values.sort_by(f64::total_cmp);
        let tol = self.tolerance;
        self.values.dedup_by(|b, a| *b - *a <= tol);
        self.strictly_increasing = true;
    }

    /// Index of the last value `<= x`, by binary search. Requires a strictly
    /// increasing array; returns `None` otherwise or when `x` precedes every
    /// value.
    #[must_use]
    pub fn floor_index(&self, x: f64) -> Option<usize> {
        if !self.strictly_increasing || self.values.is_empty() {
            return None;
        }
        match self.values.binary_search_by(|value| value.total_cmp(&x)) {
            Ok(i) => Some(i),
            Err(0) => None,
            Err(i) => Some(i - 1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_of_range_is_none() {
        let a = ParamArray::from_values(vec![0.0, 1.0], Tolerance::PARAM);
        assert_eq!(a.get(1), Some(1.0));
        assert_eq!(a.get(2), None);
        assert_eq!(ParamArray::new(Tolerance::PARAM).first(), None);
    }

    #[test]
    fn push_tracks_monotonicity() {
        let mut a = ParamArray::with_capacity(8, Tolerance::new(1e-6));
        a.push(0.0);
        a.push(0.5);
        assert!(a.is_strictly_increasing());
        a.push(0.5 + 1e-9);
        assert!(!a.is_strictly_increasing());
        assert_eq!(a.len(), 3);
        assert!(a.capacity() >= 8);
    }

    #[test]
    fn sort_dedup_restores_order() {
        let mut a = ParamArray::from_values(vec![0.3, 0.1, 0.3 + 1e-12, 0.2], Tolerance::PARAM);
        assert!(!a.is_strictly_increasing());
        a.sort_dedup();
        assert_eq!(a.as_slice(), &[0.1, 0.2, 0.3]);
        assert!(a.is_strictly_increasing());
    }

    #[test]
    fn floor_index_brackets() {
        let a = ParamArray::from_values(vec![0.0, 1.0, 2.0], Tolerance::PARAM);
        assert_eq!(a.floor_index(-0.5), None);
        assert_eq!(a.floor_index(0.0), Some(0));
        assert_eq!(a.floor_index(1.5), Some(1));
        assert_eq!(a.floor_index(9.0), Some(2));
    }

    #[test]
    fn clear_keeps_capacity() {
        let mut a = ParamArray::with_capacity(16, Tolerance::PARAM);
        a.push(1.0);
        a.clear();
        assert!(a.is_empty());
        assert!(a.capacity() >= 16);
    }
}
