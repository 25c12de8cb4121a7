//! Buffer utility and the combined ("TUON") utility.
//!
//! `U = log10(U_space) + log10(U_time)`, where `U_space` is the number of
//! occupied buffer bytes (absolute, not normalized by capacity) and
//! `U_time` comes from the [`estimator`](crate::estimator).
//!
//! `log10` is undefined for non-positive input and an infinite `U_time`
//! poisons the sum, so each operand goes through a [`UtilityGuard`] first.
//! The guarded result is always finite or absent.

use crate::config::UtilityGuard;
use crate::estimator::ContactMetrics;
use crate::traits::Buffer;

/// Occupied buffer bytes as a float.
pub fn space_utility<B: Buffer + ?Sized>(buffer: &B) -> f64 {
    buffer.capacity().saturating_sub(buffer.free_space()) as f64
}

/// Apply the guard to one operand.
///
/// Returns the operand to feed into `log10` and whether it was replaced, or
/// `None` if the guard says skip.
fn guard_operand(value: f64, guard: UtilityGuard) -> Option<(f64, bool)> {
    if value.is_finite() && value > 0.0 {
        return Some((value, false));
    }
    match guard {
        UtilityGuard::Floor(floor) => Some((floor, true)),
        UtilityGuard::Skip => None,
    }
}

/// Combined utility of a node.
///
/// Returns `None` only under [`UtilityGuard::Skip`] with a bad operand.
pub fn combined_utility(space: f64, time: f64, guard: UtilityGuard) -> Option<f64> {
    let (space, _) = guard_operand(space, guard)?;
    let (time, _) = guard_operand(time, guard)?;
    let combined = libm::log10(space) + libm::log10(time);
    combined.is_finite().then_some(combined)
}

/// Fraction of the sender's copies that the receiver should get.
///
/// `U_receiver / (U_sender + U_receiver)`, clamped to `[0, 1]`. `None` if
/// either utility is missing or the sum is not positive, in which case the
/// split falls back to the unweighted rule.
pub fn receiver_share(sender: Option<f64>, receiver: Option<f64>) -> Option<f64> {
    let (s, r) = (sender?, receiver?);
    let total = s + r;
    if !(total.is_finite() && total > 0.0) {
        return None;
    }
    Some((r / total).clamp(0.0, 1.0))
}

/// Utility components of one node at one instant.
///
/// Derived on demand, never stored.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct UtilitySnapshot {
    /// Latest contact duration (s).
    pub t1: f64,
    /// Previous contact duration (s).
    pub t2: f64,
    /// Current gap duration (s).
    pub t3: f64,
    /// Duty ratio.
    pub mu: f64,
    /// `exp(R * mu)`, unguarded.
    pub time_utility: f64,
    /// Occupied bytes, unguarded.
    pub space_utility: f64,
    /// Guarded combined utility.
    pub combined: Option<f64>,
    /// True if the guard replaced or rejected an operand.
    pub guarded: bool,
}

impl UtilitySnapshot {
    /// Compute a snapshot from contact metrics and buffer state.
    pub fn compute<B: Buffer + ?Sized>(
        metrics: ContactMetrics,
        buffer: &B,
        smoothing_factor: f64,
        guard: UtilityGuard,
    ) -> Self {
        let time_utility = metrics.time_utility(smoothing_factor);
        let space_utility = space_utility(buffer);

        let space = guard_operand(space_utility, guard);
        let time = guard_operand(time_utility, guard);
        let guarded = !matches!((space, time), (Some((_, false)), Some((_, false))));

        Self {
            t1: metrics.t1,
            t2: metrics.t2,
            t3: metrics.t3,
            mu: metrics.mu(),
            time_utility,
            space_utility,
            combined: combined_utility(space_utility, time_utility, guard),
            guarded,
        }
    }
}
