//! Pure predicates over round state.
//!
//! Nothing here reads a clock or fires an event; the [`machine`](crate::round::machine) feeds
//! the current counts in and acts on the answers.

use std::{fmt, time::Duration};

use strum::{Display, EnumIter};

/// Team of a player at poll time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
pub enum Team {
    /// Class-D personnel
    ClassD,
    /// Scientists
    Scientists,
    /// MTF and facility guards
    FoundationForces,
    /// Chaos Insurgency
    ChaosInsurgency,
    /// SCP subjects, zombies included
    Scps,
    /// Spectators and dead players
    Dead,
    /// Tutorials and anything else that does not count
    Other,
}

/// The team credited with the round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
pub enum LeadingTeam {
    /// MTF, guards and scientists
    FacilityForces,
    /// Chaos Insurgency and Class-D
    ChaosInsurgency,
    /// SCP subjects
    Anomalies,
    /// Nobody
    Draw,
}

/// One connected player as seen by a poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlayerState {
    /// Current team
    pub team: Team,
    /// Playing SCP-049-2
    pub zombie: bool,
    /// The host's own dedicated-server connection
    pub dedicated: bool,
}

impl PlayerState {
    /// A regular (non-dedicated, non-zombie) player.
    #[must_use]
    pub fn new(team: Team) -> Self {
        Self {
            team,
            zombie: false,
            dedicated: false,
        }
    }

    /// A player controlling SCP-049-2.
    #[must_use]
    pub fn zombie() -> Self {
        Self {
            team: Team::Scps,
            zombie: true,
            dedicated: false,
        }
    }

    /// The dedicated-server connection.
    #[must_use]
    pub fn dedicated() -> Self {
        Self {
            team: Team::Other,
            zombie: false,
            dedicated: true,
        }
    }
}

/// Living players per class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ClassCounts {
    /// Class-D personnel
    pub class_ds: u32,
    /// Scientists
    pub scientists: u32,
    /// MTF and guards
    pub mtf_and_guards: u32,
    /// Chaos Insurgency
    pub chaos_insurgents: u32,
    /// SCPs other than SCP-049-2
    pub scps_except_zombies: u32,
    /// SCP-049-2 instances
    pub zombies: u32,
    /// Warhead kills, `None` if the warhead has not detonated
    pub warhead_kills: Option<u32>,
}

impl ClassCounts {
    /// Counts living players by class.
    pub fn tally<'a>(players: impl IntoIterator<Item = &'a PlayerState>) -> Self {
        let mut counts = Self::default();
        for player in players {
            match player.team {
                Team::ClassD => counts.class_ds += 1,
                Team::ChaosInsurgency => counts.chaos_insurgents += 1,
                Team::FoundationForces => counts.mtf_and_guards += 1,
                Team::Scientists => counts.scientists += 1,
                Team::Scps if player.zombie => counts.zombies += 1,
                Team::Scps => counts.scps_except_zombies += 1,
                Team::Dead | Team::Other => {}
            }
        }
        counts
    }

    /// MTF, guards and scientists.
    #[must_use]
    pub fn facility_forces(&self) -> u32 {
        self.mtf_and_guards + self.scientists
    }

    /// Chaos Insurgency and Class-D.
    #[must_use]
    pub fn chaos(&self) -> u32 {
        self.chaos_insurgents + self.class_ds
    }

    /// All SCPs including zombies.
    #[must_use]
    pub fn anomalies(&self) -> u32 {
        self.scps_except_zombies + self.zombies
    }
}

/// Escape and survival counters kept by the host for the whole round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Escapes {
    /// Class-D that escaped
    pub class_d: u32,
    /// Scientists that escaped
    pub scientists: u32,
}

/// Host flags consulted before every poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RoundStatus {
    /// An administrator locked the round
    pub round_locked: bool,
    /// Keep the round running while fewer than two players are connected
    pub keep_round_on_one: bool,
    /// The round has started and not yet ended
    pub in_progress: bool,
}

/// Returns true if a poll must not evaluate end conditions.
#[must_use]
pub fn poll_blocked(
    status: &RoundStatus,
    players: &[PlayerState],
    elapsed: Duration,
    minimum_round_time: Duration,
) -> bool {
    let connected = players.iter().filter(|p| !p.dedicated).count();
    status.round_locked
        || (status.keep_round_on_one && connected < 2)
        || !status.in_progress
        || elapsed < minimum_round_time
}

/// Returns true if the current counts end the round.
///
/// With no Class-D, no facility forces and no remaining Chaos targets the round is over.
/// Otherwise it is over when at most one faction still has living members.
#[must_use]
pub fn should_round_end(counts: &ClassCounts, chaos_target_count: u32) -> bool {
    if counts.class_ds == 0 && counts.facility_forces() == 0 && chaos_target_count == 0 {
        return true;
    }
    let alive = [counts.facility_forces(), counts.chaos(), counts.anomalies()]
        .iter()
        .filter(|n| **n > 0)
        .count();
    alive <= 1
}

/// Picks the team credited with the round.
#[must_use]
pub fn leading_team(counts: &ClassCounts, escapes: &Escapes) -> LeadingTeam {
    let surviving_scps = counts.scps_except_zombies;

    if counts.facility_forces() > 0 {
        if escapes.scientists < escapes.class_d {
            LeadingTeam::Draw
        } else {
            LeadingTeam::FacilityForces
        }
    } else if counts.anomalies() > 0 {
        if escapes.class_d > surviving_scps {
            LeadingTeam::ChaosInsurgency
        } else if surviving_scps > escapes.scientists {
            LeadingTeam::Anomalies
        } else {
            LeadingTeam::Draw
        }
    } else if counts.chaos() > 0 {
        if escapes.class_d >= escapes.scientists {
            LeadingTeam::ChaosInsurgency
        } else {
            LeadingTeam::Draw
        }
    } else {
        LeadingTeam::Draw
    }
}

/// Share of the starting Class-D and scientists that survived or escaped.
///
/// A round that started without Class-D reports 0 for them; one that started without
/// scientists reports 1.
#[must_use]
pub fn escape_ratios(start: &ClassCounts, now: &ClassCounts, escapes: &Escapes) -> (f32, f32) {
    let class_d = if start.class_ds == 0 {
        0.0
    } else {
        (now.class_ds + escapes.class_d) as f32 / start.class_ds as f32
    };
    let scientists = if start.scientists == 0 {
        1.0
    } else {
        (now.scientists + escapes.scientists) as f32 / start.scientists as f32
    };
    (class_d, scientists)
}

/// Everything the end-of-round summary shows.
#[derive(Debug, Clone, PartialEq)]
pub struct RoundReport {
    /// The credited team
    pub leading_team: LeadingTeam,
    /// Counts when the round started
    pub start: ClassCounts,
    /// Counts at the deciding poll
    pub end: ClassCounts,
    /// Escape counters at the deciding poll
    pub escapes: Escapes,
    /// See [`escape_ratios`]
    pub class_d_escape: f32,
    /// See [`escape_ratios`]
    pub scientist_escape: f32,
    /// Clamped restart delay
    pub restart_time: Duration,
    /// Time since the round started
    pub round_length: Duration,
}

impl fmt::Display for RoundReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Round finished! Anomalies: {} | Chaos: {} | Facility Forces: {} | D escaped percentage: {} | S escaped percentage: {}.",
            self.end.anomalies(),
            self.end.chaos(),
            self.end.facility_forces(),
            self.class_d_escape,
            self.scientist_escape
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counts(class_ds: u32, scientists: u32, mtf: u32, chaos: u32, scps: u32) -> ClassCounts {
        ClassCounts {
            class_ds,
            scientists,
            mtf_and_guards: mtf,
            chaos_insurgents: chaos,
            scps_except_zombies: scps,
            ..ClassCounts::default()
        }
    }

    #[test]
    fn test_tally() {
        let players = [
            PlayerState::new(Team::ClassD),
            PlayerState::new(Team::ClassD),
            PlayerState::new(Team::Scps),
            PlayerState::zombie(),
            PlayerState::new(Team::Dead),
            PlayerState::dedicated(),
            PlayerState::new(Team::FoundationForces),
        ];
        let counts = ClassCounts::tally(&players);
        assert_eq!(counts.class_ds, 2);
        assert_eq!(counts.scps_except_zombies, 1);
        assert_eq!(counts.zombies, 1);
        assert_eq!(counts.anomalies(), 2);
        assert_eq!(counts.facility_forces(), 1);
        assert_eq!(counts.chaos(), 2);
    }

    #[test]
    fn test_should_round_end() {
        // Only SCPs left
        assert!(should_round_end(&counts(0, 0, 0, 0, 3), 0));
        // SCPs alone but chaos still has targets: one faction alive, still over
        assert!(should_round_end(&counts(0, 0, 0, 0, 3), 2));
        // Two factions alive
        assert!(!should_round_end(&counts(1, 0, 0, 0, 3), 0));
        assert!(!should_round_end(&counts(0, 2, 1, 0, 1), 0));
        // Facility and Class-D only
        assert!(!should_round_end(&counts(2, 1, 0, 0, 0), 0));
        // Chaos side only
        assert!(should_round_end(&counts(2, 0, 0, 3, 0), 1));
        // Nobody at all
        assert!(should_round_end(&ClassCounts::default(), 0));
    }

    #[test]
    fn test_leading_team() {
        let escapes = |class_d, scientists| Escapes {
            class_d,
            scientists,
        };

        let facility = counts(0, 1, 2, 0, 0);
        assert_eq!(leading_team(&facility, &escapes(0, 0)), LeadingTeam::FacilityForces);
        assert_eq!(leading_team(&facility, &escapes(3, 1)), LeadingTeam::Draw);

        let scps = counts(0, 0, 0, 0, 2);
        assert_eq!(leading_team(&scps, &escapes(3, 0)), LeadingTeam::ChaosInsurgency);
        assert_eq!(leading_team(&scps, &escapes(1, 1)), LeadingTeam::Anomalies);
        assert_eq!(leading_team(&scps, &escapes(0, 2)), LeadingTeam::Draw);

        let chaos = counts(1, 0, 0, 2, 0);
        assert_eq!(leading_team(&chaos, &escapes(1, 1)), LeadingTeam::ChaosInsurgency);
        assert_eq!(leading_team(&chaos, &escapes(0, 1)), LeadingTeam::Draw);

        assert_eq!(
            leading_team(&ClassCounts::default(), &escapes(5, 0)),
            LeadingTeam::Draw
        );
    }

    #[test]
    fn test_poll_blocked() {
        let open = RoundStatus {
            round_locked: false,
            keep_round_on_one: false,
            in_progress: true,
        };
        let players = [PlayerState::new(Team::ClassD), PlayerState::dedicated()];
        let late = Duration::from_secs(20);
        let minimum = Duration::from_secs(15);

        assert!(!poll_blocked(&open, &players, late, minimum));
        assert!(poll_blocked(&open, &players, Duration::from_secs(3), minimum));
        assert!(poll_blocked(
            &RoundStatus {
                round_locked: true,
                ..open
            },
            &players,
            late,
            minimum
        ));
        assert!(poll_blocked(
            &RoundStatus {
                keep_round_on_one: true,
                ..open
            },
            &players,
            late,
            minimum
        ));
        assert!(poll_blocked(
            &RoundStatus {
                in_progress: false,
                ..open
            },
            &players,
            late,
            minimum
        ));
    }

    #[test]
    fn test_escape_ratios_and_report_line() {
        let start = counts(4, 2, 0, 0, 0);
        let now = counts(1, 0, 0, 0, 0);
        let escapes = Escapes {
            class_d: 1,
            scientists: 1,
        };
        assert_eq!(escape_ratios(&start, &now, &escapes), (0.5, 0.5));
        assert_eq!(
            escape_ratios(&ClassCounts::default(), &now, &escapes),
            (0.0, 1.0)
        );

        let report = RoundReport {
            leading_team: LeadingTeam::ChaosInsurgency,
            start,
            end: counts(1, 0, 0, 2, 1),
            escapes,
            class_d_escape: 0.5,
            scientist_escape: 0.5,
            restart_time: Duration::from_secs(10),
            round_length: Duration::from_secs(600),
        };
        assert_eq!(
            report.to_string(),
            "Round finished! Anomalies: 1 | Chaos: 3 | Facility Forces: 0 | D escaped percentage: 0.5 | S escaped percentage: 0.5."
        );
    }
}
