//! Events fired by the round-end sequence.

use std::time::Duration;

use crate::{
    events::{BinaryGate, Event, GateDecision, RetryDecision, VetoRetry},
    round::rules::{ClassCounts, LeadingTeam},
};

/// Fired once per evaluated poll while the round is not yet ended.
///
/// The gate starts at the rule-based proposal. [`GateDecision::Defer`] skips the rest of this
/// poll; the conditions are evaluated again at the next poll.
#[derive(Debug, Clone)]
pub struct EndingConditionsCheck {
    /// Whether the conditions are satisfied
    pub gate: BinaryGate,
}

impl EndingConditionsCheck {
    /// Creates the event with the rule-based proposal.
    #[must_use]
    pub fn new(should_round_end: bool) -> Self {
        Self {
            gate: BinaryGate::new(should_round_end),
        }
    }
}

impl Event for EndingConditionsCheck {
    const NAME: &'static str = "EndingConditionsCheck";
    type Outcome = GateDecision;

    fn outcome(&self) -> GateDecision {
        self.gate.decision()
    }
}

/// Fired on every evaluated poll with the tentative result.
///
/// The gate starts at the rule-based proposal, whatever the conditions check decided. Handlers
/// may keep the round running (deny the gate), end it early (allow it) or change the credited
/// team.
#[derive(Debug, Clone)]
pub struct EndingRound {
    /// Team that would be credited
    pub leading_team: LeadingTeam,
    /// Counts at this poll
    pub counts: ClassCounts,
    /// Whether the round ends now
    pub gate: BinaryGate,
}

impl EndingRound {
    /// Creates the event.
    #[must_use]
    pub fn new(leading_team: LeadingTeam, counts: ClassCounts, should_round_end: bool) -> Self {
        Self {
            leading_team,
            counts,
            gate: BinaryGate::new(should_round_end),
        }
    }

    /// Returns true if the round ends now.
    #[must_use]
    pub fn is_round_ended(&self) -> bool {
        self.gate.is_allowed()
    }

    /// Sets whether the round ends now.
    pub fn set_round_ended(&mut self, ended: bool) {
        self.gate.set_allowed(ended);
    }
}

impl Event for EndingRound {
    const NAME: &'static str = "EndingRound";
    type Outcome = (bool, LeadingTeam);

    fn outcome(&self) -> (bool, LeadingTeam) {
        (self.is_round_ended(), self.leading_team)
    }
}

/// Fired after the round was decided, before the summary.
///
/// A cancelled outcome with a positive delay re-fires this event after the delay; a cancelled
/// outcome with `delay <= 0` abandons the round-end sequence.
#[derive(Debug, Clone)]
pub struct RoundEnd {
    /// The credited team
    pub leading_team: LeadingTeam,
    /// Cancellation and retry delay
    pub veto: VetoRetry,
}

impl RoundEnd {
    /// Creates the event, not cancelled.
    #[must_use]
    pub fn new(leading_team: LeadingTeam) -> Self {
        Self {
            leading_team,
            veto: VetoRetry::new(),
        }
    }
}

impl Event for RoundEnd {
    const NAME: &'static str = "RoundEnd";
    type Outcome = RetryDecision;

    fn outcome(&self) -> RetryDecision {
        self.veto.resolve()
    }
}

/// Fired when the summary is shown. Informational.
#[derive(Debug, Clone)]
pub struct RoundEnded {
    /// The credited team
    pub leading_team: LeadingTeam,
    /// Counts at the deciding poll
    pub counts: ClassCounts,
    /// Time until the restart
    pub restart_time: Duration,
}

impl Event for RoundEnded {
    const NAME: &'static str = "RoundEnded";
    type Outcome = ();

    fn outcome(&self) {}
}
