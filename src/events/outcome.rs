//! Outcome shapes that handlers write and firing routines read back.
//!
//! Two shapes cover every event the patches wire in:
//!
//! - [`BinaryGate`]: starts at the firing routine's proposal; every handler may overwrite the
//!   decision and the last write wins. Besides allow and deny a handler may
//!   [`BinaryGate::defer`], which tells the firing routine to re-fire at its next scheduled
//!   opportunity instead of resolving now.
//! - [`VetoRetry`]: a cancelled flag plus a delay. A cancelled outcome with a positive delay
//!   asks the firing routine to wait and re-fire; a cancelled outcome with `delay <= 0` aborts
//!   the enclosing operation.

use std::time::Duration;

/// Decision state of a [`BinaryGate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GateDecision {
    /// Proceed
    Allow,
    /// Do not proceed
    Deny,
    /// Undecided; ask again at the next scheduled opportunity
    Defer,
}

/// Allow/deny outcome with last-write-wins semantics and a deferred third state.
///
/// # Examples
///
/// ```rust
/// use hookscope::events::{BinaryGate, GateDecision};
///
/// let mut gate = BinaryGate::new(true);
/// assert_eq!(gate.decision(), GateDecision::Allow);
///
/// gate.deny();
/// gate.allow();
/// gate.deny();
/// assert_eq!(gate.decision(), GateDecision::Deny);
/// assert!(gate.proposed());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BinaryGate {
    proposed: bool,
    decision: GateDecision,
}

impl BinaryGate {
    /// Creates a gate whose decision starts at `proposed`.
    #[must_use]
    pub fn new(proposed: bool) -> Self {
        Self {
            proposed,
            decision: if proposed {
                GateDecision::Allow
            } else {
                GateDecision::Deny
            },
        }
    }

    /// What the firing routine proposed before any handler ran.
    #[must_use]
    pub fn proposed(&self) -> bool {
        self.proposed
    }

    /// The current decision.
    #[must_use]
    pub fn decision(&self) -> GateDecision {
        self.decision
    }

    /// Returns true if the current decision is [`GateDecision::Allow`].
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        self.decision == GateDecision::Allow
    }

    /// Overwrites the decision.
    pub fn set(&mut self, decision: GateDecision) {
        self.decision = decision;
    }

    /// Overwrites the decision from a boolean.
    pub fn set_allowed(&mut self, allowed: bool) {
        self.set(if allowed {
            GateDecision::Allow
        } else {
            GateDecision::Deny
        });
    }

    /// Sets the decision to [`GateDecision::Allow`].
    pub fn allow(&mut self) {
        self.set(GateDecision::Allow);
    }

    /// Sets the decision to [`GateDecision::Deny`].
    pub fn deny(&mut self) {
        self.set(GateDecision::Deny);
    }

    /// Sets the decision to [`GateDecision::Defer`].
    pub fn defer(&mut self) {
        self.set(GateDecision::Defer);
    }
}

/// What the firing routine does after reading a [`VetoRetry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Not cancelled; continue
    Proceed,
    /// Cancelled; wait this long, then fire the same event again
    RetryAfter(Duration),
    /// Cancelled without a usable delay; abandon the enclosing operation
    Abort,
}

/// Cancellation with an optional retry delay, in seconds.
///
/// # Examples
///
/// ```rust
/// use hookscope::events::{RetryDecision, VetoRetry};
/// use std::time::Duration;
///
/// let mut veto = VetoRetry::new();
/// assert_eq!(veto.resolve(), RetryDecision::Proceed);
///
/// veto.cancel(2.0);
/// assert_eq!(veto.resolve(), RetryDecision::RetryAfter(Duration::from_secs(2)));
///
/// veto.cancel(0.0);
/// assert_eq!(veto.resolve(), RetryDecision::Abort);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct VetoRetry {
    cancelled: bool,
    delay: f32,
}

impl VetoRetry {
    /// Creates an outcome that is not cancelled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancels with a retry delay in seconds. `delay <= 0` means abort.
    pub fn cancel(&mut self, delay: f32) {
        self.cancelled = true;
        self.delay = delay;
    }

    /// Clears a previous cancellation.
    pub fn proceed(&mut self) {
        self.cancelled = false;
        self.delay = 0.0;
    }

    /// Returns true if a handler cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    /// The requested delay in seconds.
    #[must_use]
    pub fn delay(&self) -> f32 {
        self.delay
    }

    /// Interprets the outcome.
    ///
    /// Non-finite delays (NaN, infinity) are treated like `delay <= 0`, so a cancelled outcome
    /// can never schedule an unbounded wait.
    #[must_use]
    pub fn resolve(&self) -> RetryDecision {
        if !self.cancelled {
            return RetryDecision::Proceed;
        }
        if !(self.delay > 0.0) {
            return RetryDecision::Abort;
        }
        match Duration::try_from_secs_f32(self.delay) {
            Ok(delay) if self.delay.is_finite() => RetryDecision::RetryAfter(delay),
            _ => RetryDecision::Abort,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gate_starts_at_proposal() {
        assert_eq!(BinaryGate::new(true).decision(), GateDecision::Allow);
        assert_eq!(BinaryGate::new(false).decision(), GateDecision::Deny);
        assert!(!BinaryGate::new(false).is_allowed());
    }

    #[test]
    fn test_gate_last_write_wins() {
        let mut gate = BinaryGate::new(false);
        gate.set_allowed(true);
        gate.defer();
        assert_eq!(gate.decision(), GateDecision::Defer);
        gate.set_allowed(false);
        assert_eq!(gate.decision(), GateDecision::Deny);
        assert!(!gate.proposed());
    }

    #[test]
    fn test_veto_resolution() {
        let mut veto = VetoRetry::new();
        assert_eq!(veto.resolve(), RetryDecision::Proceed);

        veto.cancel(1.5);
        assert_eq!(
            veto.resolve(),
            RetryDecision::RetryAfter(Duration::from_millis(1500))
        );

        veto.cancel(-3.0);
        assert_eq!(veto.resolve(), RetryDecision::Abort);

        veto.cancel(f32::NAN);
        assert_eq!(veto.resolve(), RetryDecision::Abort);

        veto.cancel(f32::INFINITY);
        assert_eq!(veto.resolve(), RetryDecision::Abort);

        veto.proceed();
        assert_eq!(veto.resolve(), RetryDecision::Proceed);
    }
}
