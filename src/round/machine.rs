//! The round-end sequence as an explicit state machine.
//!
//! ```text
//! Idle --start--> Polling --decided--> Releasing --proceed--> Summary --> Dimming --> Restarting --> Finished
//!                   ^  |                 |    ^
//!                   +--+ (not ended)     +----+ (retry after delay)
//!                                        |
//!                                        +--abort--> Aborted
//! ```
//!
//! Time is supplied by the caller as a [`Duration`] on any monotonic clock. Each phase waits for
//! a deadline; [`RoundEndMachine::step`] performs at most one transition when the deadline has
//! passed, and [`RoundEndMachine::advance`] performs every transition due at `now`.
//!
//! The host is read through [`RoundHost`] and the machine reports what the host should do as
//! [`RoundAction`]s. Event handlers run on the caller's thread, inside `step`.

use std::time::Duration;

use strum::Display;

use crate::{
    events::{Dispatcher, GateDecision, RetryDecision},
    metadata::diagnostics::DiagnosticCategory,
    round::{
        config::RoundConfig,
        events::{EndingConditionsCheck, EndingRound, RoundEnd, RoundEnded},
        rules::{
            escape_ratios, leading_team, poll_blocked, should_round_end, ClassCounts, Escapes,
            PlayerState, RoundReport, RoundStatus,
        },
    },
    utils::ListPool,
};

/// Read access to the host's round state.
pub trait RoundHost {
    /// Lock and progress flags.
    fn status(&self) -> RoundStatus;

    /// Appends every connected player to `players`.
    fn collect_players(&self, players: &mut Vec<PlayerState>);

    /// Players Chaos still has to eliminate.
    fn chaos_target_count(&self) -> u32;

    /// Escape counters for the round so far.
    fn escapes(&self) -> Escapes;

    /// Warhead kills, `None` if the warhead has not detonated.
    fn warhead_kills(&self) -> Option<u32>;

    /// Class counts recorded when the round started.
    fn starting_counts(&self) -> ClassCounts;
}

/// Phase of a [`RoundEndMachine`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum RoundPhase {
    /// Not started
    Idle,
    /// Checking end conditions every poll interval
    Polling,
    /// Round decided, waiting for `RoundEnd` handlers to release it
    Releasing,
    /// Waiting to show the summary
    Summary,
    /// Summary shown, waiting to dim the screen
    Dimming,
    /// Screen dimmed, waiting to restart
    Restarting,
    /// Restart requested or the host object went away
    Finished,
    /// A `RoundEnd` handler cancelled without a retry delay
    Aborted,
}

/// Something the host must do on behalf of the machine.
#[derive(Debug, Clone, PartialEq)]
pub enum RoundAction {
    /// Show the end-of-round summary to every player
    ShowSummary(RoundReport),
    /// Fade the screen out
    DimScreen,
    /// Restart the round
    RestartRound,
}

/// Drives one round from its start to the restart.
#[derive(Debug)]
pub struct RoundEndMachine {
    config: RoundConfig,
    phase: RoundPhase,
    started_at: Duration,
    deadline: Duration,
    round_ended: bool,
    report: Option<RoundReport>,
    players: ListPool<PlayerState>,
}

impl RoundEndMachine {
    /// Creates an idle machine.
    #[must_use]
    pub fn new(config: RoundConfig) -> Self {
        Self {
            config,
            phase: RoundPhase::Idle,
            started_at: Duration::ZERO,
            deadline: Duration::ZERO,
            round_ended: false,
            report: None,
            players: ListPool::new(),
        }
    }

    /// The active configuration.
    #[must_use]
    pub fn config(&self) -> &RoundConfig {
        &self.config
    }

    /// The current phase.
    #[must_use]
    pub fn phase(&self) -> RoundPhase {
        self.phase
    }

    /// Returns true once the round was decided.
    #[must_use]
    pub fn is_round_ended(&self) -> bool {
        self.round_ended
    }

    /// The summary of the decided round, if any.
    #[must_use]
    pub fn report(&self) -> Option<&RoundReport> {
        self.report.as_ref()
    }

    /// Returns true in [`RoundPhase::Finished`] and [`RoundPhase::Aborted`].
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self.phase, RoundPhase::Finished | RoundPhase::Aborted)
    }

    /// When the next transition is due, or `None` if nothing is scheduled.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Duration> {
        match self.phase {
            RoundPhase::Idle | RoundPhase::Finished | RoundPhase::Aborted => None,
            _ => Some(self.deadline),
        }
    }

    /// Starts polling; the round is considered to have started at `now`.
    pub fn start(&mut self, now: Duration) {
        self.phase = RoundPhase::Polling;
        self.started_at = now;
        self.deadline = now + self.config.poll_interval;
        self.round_ended = false;
        self.report = None;
        log::debug!("round-end polling started");
    }

    /// Stops the machine without restarting the round.
    pub fn stop(&mut self) {
        self.phase = RoundPhase::Finished;
    }

    /// Performs the transition due at `now`, if any.
    pub fn step<H: RoundHost + ?Sized>(
        &mut self,
        now: Duration,
        host: &H,
        dispatcher: &Dispatcher,
    ) -> Option<RoundAction> {
        if self.next_deadline().map_or(true, |deadline| now < deadline) {
            return None;
        }

        match self.phase {
            RoundPhase::Polling => {
                self.poll(now, host, dispatcher);
                None
            }
            RoundPhase::Releasing => {
                self.release(now, dispatcher);
                None
            }
            RoundPhase::Summary => self.summarize(now, dispatcher),
            RoundPhase::Dimming => {
                self.phase = RoundPhase::Restarting;
                self.deadline = now + self.config.dim_lead;
                Some(RoundAction::DimScreen)
            }
            RoundPhase::Restarting => {
                self.phase = RoundPhase::Finished;
                Some(RoundAction::RestartRound)
            }
            RoundPhase::Idle | RoundPhase::Finished | RoundPhase::Aborted => None,
        }
    }

    /// Performs every transition due at `now`, returning the actions in order.
    pub fn advance<H: RoundHost + ?Sized>(
        &mut self,
        now: Duration,
        host: &H,
        dispatcher: &Dispatcher,
    ) -> Vec<RoundAction> {
        let mut actions = Vec::new();
        while self.next_deadline().is_some_and(|deadline| deadline <= now) {
            let before = (self.phase, self.deadline);
            actions.extend(self.step(now, host, dispatcher));
            if (self.phase, self.deadline) == before {
                break;
            }
        }
        actions
    }

    fn poll<H: RoundHost + ?Sized>(&mut self, now: Duration, host: &H, dispatcher: &Dispatcher) {
        self.deadline = now + self.config.poll_interval;
        let elapsed = now.saturating_sub(self.started_at);

        let mut counts = {
            let mut players = self.players.scoped();
            host.collect_players(&mut players);
            if poll_blocked(
                &host.status(),
                players.as_slice(),
                elapsed,
                self.config.minimum_round_time,
            ) {
                return;
            }
            ClassCounts::tally(players.iter())
        };
        counts.warhead_kills = host.warhead_kills();
        let proposal = should_round_end(&counts, host.chaos_target_count());

        if !self.round_ended {
            match dispatcher.fire(&mut EndingConditionsCheck::new(proposal)) {
                GateDecision::Allow => self.round_ended = true,
                // A handler overruled satisfied conditions
                GateDecision::Deny if proposal => {
                    log::debug!("end conditions rejected by a handler, polling again");
                    return;
                }
                GateDecision::Deny => {}
                GateDecision::Defer => {
                    log::debug!("end conditions deferred, polling again");
                    return;
                }
            }
        }

        let escapes = host.escapes();
        let leading = leading_team(&counts, &escapes);
        let mut ending = EndingRound::new(leading, counts, proposal);
        let (ended, leading) = dispatcher.fire(&mut ending);
        self.round_ended = ended;
        if !ended {
            return;
        }

        let start = host.starting_counts();
        let (class_d_escape, scientist_escape) = escape_ratios(&start, &counts, &escapes);
        self.report = Some(RoundReport {
            leading_team: leading,
            start,
            end: counts,
            escapes,
            class_d_escape,
            scientist_escape,
            restart_time: self.config.clamped_restart_time(),
            round_length: elapsed,
        });
        self.phase = RoundPhase::Releasing;
        self.release(now, dispatcher);
    }

    fn release(&mut self, now: Duration, dispatcher: &Dispatcher) {
        let Some(report) = &self.report else {
            self.phase = RoundPhase::Finished;
            return;
        };

        match dispatcher.fire(&mut RoundEnd::new(report.leading_team)) {
            RetryDecision::Proceed => {
                log::info!("{report}");
                self.phase = RoundPhase::Summary;
                self.deadline = now + self.config.summary_delay;
            }
            RetryDecision::RetryAfter(delay) => {
                log::debug!("round end held for {delay:?}");
                self.deadline = now + delay;
            }
            RetryDecision::Abort => {
                dispatcher
                    .diagnostics()
                    .info(DiagnosticCategory::Round, "round end cancelled without retry");
                self.phase = RoundPhase::Aborted;
            }
        }
    }

    fn summarize(&mut self, now: Duration, dispatcher: &Dispatcher) -> Option<RoundAction> {
        let Some(report) = self.report.clone() else {
            self.phase = RoundPhase::Finished;
            return None;
        };

        dispatcher.fire(&mut RoundEnded {
            leading_team: report.leading_team,
            counts: report.end,
            restart_time: report.restart_time,
        });
        self.phase = RoundPhase::Dimming;
        self.deadline = now + report.restart_time.saturating_sub(self.config.dim_lead);
        Some(RoundAction::ShowSummary(report))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::round::rules::{LeadingTeam, Team};
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    struct Facility {
        status: RoundStatus,
        players: Vec<PlayerState>,
        escapes: Escapes,
    }

    impl Facility {
        // Two SCPs and a dead guard: one faction left
        fn scps_win() -> Self {
            Self {
                status: RoundStatus {
                    in_progress: true,
                    ..RoundStatus::default()
                },
                players: vec![
                    PlayerState::new(Team::Scps),
                    PlayerState::zombie(),
                    PlayerState::new(Team::Dead),
                    PlayerState::dedicated(),
                ],
                escapes: Escapes::default(),
            }
        }

        fn contested() -> Self {
            let mut facility = Self::scps_win();
            facility.players.push(PlayerState::new(Team::FoundationForces));
            facility
        }
    }

    impl RoundHost for Facility {
        fn status(&self) -> RoundStatus {
            self.status
        }

        fn collect_players(&self, players: &mut Vec<PlayerState>) {
            players.extend_from_slice(&self.players);
        }

        fn chaos_target_count(&self) -> u32 {
            0
        }

        fn escapes(&self) -> Escapes {
            self.escapes
        }

        fn warhead_kills(&self) -> Option<u32> {
            None
        }

        fn starting_counts(&self) -> ClassCounts {
            ClassCounts {
                class_ds: 4,
                scientists: 2,
                scps_except_zombies: 2,
                ..ClassCounts::default()
            }
        }
    }

    fn secs(s: f32) -> Duration {
        Duration::from_secs_f32(s)
    }

    fn counter() -> Arc<AtomicUsize> {
        Arc::new(AtomicUsize::new(0))
    }

    #[test]
    fn test_full_sequence() {
        let host = Facility::scps_win();
        let dispatcher = Dispatcher::new();
        let ended_fired = counter();
        let seen = Arc::clone(&ended_fired);
        dispatcher.subscribe::<RoundEnded, _>(0, move |ev| {
            assert_eq!(ev.restart_time, Duration::from_secs(10));
            seen.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        let mut machine = RoundEndMachine::new(RoundConfig::new());
        assert_eq!(machine.next_deadline(), None);
        machine.start(Duration::ZERO);

        // Younger than the minimum round time
        assert!(machine.advance(secs(2.5), &host, &dispatcher).is_empty());
        assert_eq!(machine.phase(), RoundPhase::Polling);

        assert!(machine.advance(secs(15.0), &host, &dispatcher).is_empty());
        assert_eq!(machine.phase(), RoundPhase::Summary);
        assert!(machine.is_round_ended());
        assert_eq!(machine.next_deadline(), Some(secs(16.5)));

        let actions = machine.advance(secs(16.5), &host, &dispatcher);
        let [RoundAction::ShowSummary(report)] = actions.as_slice() else {
            panic!("expected the summary, got {actions:?}");
        };
        assert_eq!(report.leading_team, LeadingTeam::Anomalies);
        assert_eq!(report.end.anomalies(), 2);
        assert_eq!(ended_fired.load(Ordering::SeqCst), 1);

        assert_eq!(
            machine.advance(secs(25.5), &host, &dispatcher),
            vec![RoundAction::DimScreen]
        );
        assert_eq!(
            machine.advance(secs(26.5), &host, &dispatcher),
            vec![RoundAction::RestartRound]
        );
        assert!(machine.is_terminal());
    }

    #[test]
    fn test_contested_round_keeps_polling() {
        let host = Facility::contested();
        let dispatcher = Dispatcher::new();
        let mut machine = RoundEndMachine::new(RoundConfig::new());
        machine.start(Duration::ZERO);

        machine.advance(secs(15.0), &host, &dispatcher);
        machine.advance(secs(17.5), &host, &dispatcher);
        assert_eq!(machine.phase(), RoundPhase::Polling);
        assert!(!machine.is_round_ended());
        assert_eq!(machine.next_deadline(), Some(secs(20.0)));
    }

    #[test]
    fn test_deferred_conditions_skip_the_poll() {
        let host = Facility::scps_win();
        let dispatcher = Dispatcher::new();
        dispatcher.subscribe::<EndingConditionsCheck, _>(0, |ev| {
            ev.gate.defer();
            Ok(())
        });
        let ending_fired = counter();
        let seen = Arc::clone(&ending_fired);
        dispatcher.subscribe::<EndingRound, _>(0, move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        let mut machine = RoundEndMachine::new(RoundConfig::new());
        machine.start(Duration::ZERO);
        machine.advance(secs(15.0), &host, &dispatcher);
        assert_eq!(machine.phase(), RoundPhase::Polling);
        assert_eq!(ending_fired.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_allowed_conditions_do_not_end_contested_round() {
        let host = Facility::contested();
        let dispatcher = Dispatcher::new();
        dispatcher.subscribe::<EndingConditionsCheck, _>(0, |ev| {
            ev.gate.allow();
            Ok(())
        });
        let proposals = Arc::new(AtomicUsize::new(usize::MAX));
        let seen = Arc::clone(&proposals);
        dispatcher.subscribe::<EndingRound, _>(0, move |ev| {
            seen.store(usize::from(ev.is_round_ended()), Ordering::SeqCst);
            Ok(())
        });

        let mut machine = RoundEndMachine::new(RoundConfig::new());
        machine.start(Duration::ZERO);
        machine.advance(secs(15.0), &host, &dispatcher);
        assert_eq!(proposals.load(Ordering::SeqCst), 0);
        assert_eq!(machine.phase(), RoundPhase::Polling);
        assert!(!machine.is_round_ended());
    }

    #[test]
    fn test_denied_conditions_skip_the_poll() {
        let host = Facility::scps_win();
        let dispatcher = Dispatcher::new();
        let checks = counter();
        let seen_checks = Arc::clone(&checks);
        dispatcher.subscribe::<EndingConditionsCheck, _>(0, move |ev| {
            if seen_checks.fetch_add(1, Ordering::SeqCst) == 0 {
                ev.gate.deny();
            }
            Ok(())
        });
        let ending_fired = counter();
        let seen = Arc::clone(&ending_fired);
        dispatcher.subscribe::<EndingRound, _>(0, move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        let mut machine = RoundEndMachine::new(RoundConfig::new());
        machine.start(Duration::ZERO);
        machine.advance(secs(15.0), &host, &dispatcher);
        assert_eq!(machine.phase(), RoundPhase::Polling);
        assert_eq!(ending_fired.load(Ordering::SeqCst), 0);

        // The next poll is not overruled
        machine.advance(secs(17.5), &host, &dispatcher);
        assert_eq!(checks.load(Ordering::SeqCst), 2);
        assert_eq!(ending_fired.load(Ordering::SeqCst), 1);
        assert_eq!(machine.phase(), RoundPhase::Summary);
    }

    #[test]
    fn test_handlers_override_result() {
        let host = Facility::contested();
        let dispatcher = Dispatcher::new();
        dispatcher.subscribe::<EndingRound, _>(0, |ev| {
            ev.set_round_ended(true);
            ev.leading_team = LeadingTeam::ChaosInsurgency;
            Ok(())
        });

        let mut machine = RoundEndMachine::new(RoundConfig::new());
        machine.start(Duration::ZERO);
        machine.advance(secs(15.0), &host, &dispatcher);
        assert_eq!(machine.phase(), RoundPhase::Summary);
        assert_eq!(
            machine.report().map(|r| r.leading_team),
            Some(LeadingTeam::ChaosInsurgency)
        );
    }

    #[test]
    fn test_round_end_retry_then_proceed() {
        let host = Facility::scps_win();
        let dispatcher = Dispatcher::new();
        let fired = counter();
        let seen = Arc::clone(&fired);
        dispatcher.subscribe::<RoundEnd, _>(0, move |ev| {
            if seen.fetch_add(1, Ordering::SeqCst) == 0 {
                ev.veto.cancel(2.0);
            }
            Ok(())
        });

        let mut machine = RoundEndMachine::new(RoundConfig::new());
        machine.start(Duration::ZERO);
        machine.advance(secs(15.0), &host, &dispatcher);
        assert_eq!(machine.phase(), RoundPhase::Releasing);
        assert_eq!(machine.next_deadline(), Some(secs(17.0)));

        machine.advance(secs(17.0), &host, &dispatcher);
        assert_eq!(fired.load(Ordering::SeqCst), 2);
        assert_eq!(machine.phase(), RoundPhase::Summary);
    }

    #[test]
    fn test_zero_delay_cancel_aborts() {
        let host = Facility::scps_win();
        let dispatcher = Dispatcher::new();
        dispatcher.subscribe::<RoundEnd, _>(0, |ev| {
            ev.veto.cancel(0.0);
            Ok(())
        });

        let mut machine = RoundEndMachine::new(RoundConfig::new());
        machine.start(Duration::ZERO);
        assert!(machine.advance(secs(60.0), &host, &dispatcher).is_empty());
        assert_eq!(machine.phase(), RoundPhase::Aborted);
        assert_eq!(machine.next_deadline(), None);
        assert_eq!(
            dispatcher
                .diagnostics()
                .by_category(DiagnosticCategory::Round)
                .len(),
            1
        );
    }

    #[test]
    fn test_locked_round_never_ends() {
        let mut host = Facility::scps_win();
        host.status.round_locked = true;
        let dispatcher = Dispatcher::new();
        let mut machine = RoundEndMachine::new(RoundConfig::new());
        machine.start(Duration::ZERO);
        for tick in 1..=40 {
            machine.advance(secs(2.5 * tick as f32), &host, &dispatcher);
        }
        assert_eq!(machine.phase(), RoundPhase::Polling);

        machine.stop();
        assert!(machine.is_terminal());
    }
}
