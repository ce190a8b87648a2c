//! The round-end sequence.
//!
//! The host decides when a round is over in a coroutine started from `RoundSummary::Start`.
//! [`RoundEndPatch`] redirects that coroutine to the extension, where [`RoundEndMachine`] takes
//! over: it polls the end conditions, fires the round events through a
//! [`Dispatcher`](crate::events::Dispatcher) and tells the host when to show the summary, dim
//! the screen and restart.
//!
//! # Components
//!
//! - [`rules`] - Pure win-condition predicates over player counts
//! - [`events`] - `EndingConditionsCheck`, `EndingRound`, `RoundEnd` and `RoundEnded`
//! - [`machine`] - The polling state machine and its host interface
//! - [`config`] - Timing
//! - [`patch`] - The routine patch installing the machine's coroutine
//!
//! # Examples
//!
//! ```rust
//! use std::time::Duration;
//! use hookscope::events::Dispatcher;
//! use hookscope::round::{
//!     ClassCounts, Escapes, PlayerState, RoundAction, RoundConfig, RoundEndMachine, RoundHost,
//!     RoundPhase, RoundStatus, Team,
//! };
//!
//! struct LastScpStanding;
//!
//! impl RoundHost for LastScpStanding {
//!     fn status(&self) -> RoundStatus {
//!         RoundStatus { in_progress: true, ..RoundStatus::default() }
//!     }
//!     fn collect_players(&self, players: &mut Vec<PlayerState>) {
//!         players.push(PlayerState::new(Team::Scps));
//!         players.push(PlayerState::new(Team::Dead));
//!     }
//!     fn chaos_target_count(&self) -> u32 { 0 }
//!     fn escapes(&self) -> Escapes { Escapes::default() }
//!     fn warhead_kills(&self) -> Option<u32> { None }
//!     fn starting_counts(&self) -> ClassCounts { ClassCounts::default() }
//! }
//!
//! let dispatcher = Dispatcher::new();
//! let mut machine = RoundEndMachine::new(RoundConfig::new());
//! machine.start(Duration::ZERO);
//!
//! let mut shown = false;
//! for tick in 1..=20u64 {
//!     let now = Duration::from_millis(2500 * tick);
//!     for action in machine.advance(now, &LastScpStanding, &dispatcher) {
//!         shown |= matches!(action, RoundAction::ShowSummary(_));
//!     }
//! }
//! assert!(shown);
//! assert_eq!(machine.phase(), RoundPhase::Finished);
//! ```

pub mod config;
pub mod events;
pub mod machine;
pub mod patch;
pub mod rules;

pub use config::RoundConfig;
pub use events::{EndingConditionsCheck, EndingRound, RoundEnd, RoundEnded};
pub use machine::{RoundAction, RoundEndMachine, RoundHost, RoundPhase};
pub use patch::{process_hook, RoundEndPatch};
pub use rules::{
    ClassCounts, Escapes, LeadingTeam, PlayerState, RoundReport, RoundStatus, Team,
};
