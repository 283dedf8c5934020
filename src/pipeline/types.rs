//! Core data types shared by the ingestion pipeline
//!
//! `DeathEvent` is what the snapshot reader yields, `KillOutcome` is what the
//! classifier produces, `ScoreRow` is what the ranking store persists.

use serde::{Deserialize, Serialize};
use std::fmt;

/// `eventType` code of a death in the game's `game_events` table.
pub const DEATH_EVENT_TYPE: i64 = 103;

/// Creature name used when a non-player causer can't be resolved.
pub const UNKNOWN_CREATURE: &str = "unknown";

/// A single death read from a snapshot
///
/// Only lives for the duration of one cycle; never persisted verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeathEvent {
    /// In-game unix timestamp (seconds). Not unique within a snapshot.
    pub world_time: i64,

    /// Ordinal of this event among the death events sharing `world_time`.
    pub slot: u32,

    /// Player that caused the death, if any
    pub causer_name: Option<String>,

    /// Player that died, if any
    pub owner_name: Option<String>,

    /// Spawn row id of a non-player causer (only meaningful without `causer_name`)
    pub npc_id: Option<String>,
}

impl DeathEvent {
    pub fn key(&self) -> EventKey {
        EventKey {
            world_time: self.world_time,
            slot: self.slot,
        }
    }
}

/// Stable identity of an event across polls: `(world_time, slot)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventKey {
    pub world_time: i64,
    pub slot: u32,
}

/// Why an event was dropped by the classifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IgnoreReason {
    /// Causer and victim are the same player
    SelfKill,
    /// No identifiable victim
    NoVictim,
}

/// Classified result of a death event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum KillOutcome {
    PvpKill { killer: String, victim: String },
    EnvironmentKill { victim: String, creature: String },
    Ignore { reason: IgnoreReason },
}

impl KillOutcome {
    pub fn is_pvp(&self) -> bool {
        matches!(self, KillOutcome::PvpKill { .. })
    }
}

impl fmt::Display for KillOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KillOutcome::PvpKill { killer, victim } => write!(f, "{} killed {}", killer, victim),
            KillOutcome::EnvironmentKill { victim, creature } => {
                write!(f, "{} was killed by {}", victim, creature)
            }
            KillOutcome::Ignore { reason } => write!(f, "ignored ({:?})", reason),
        }
    }
}

/// Outcome published on the feed channel for notification consumers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedEvent {
    /// Configured source name
    pub source: String,
    pub world_time: i64,
    pub outcome: KillOutcome,
}

/// One player's standing on one server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreRow {
    pub server_name: String,
    pub player_name: String,
    pub kills: i64,
    pub deaths: i64,
    /// Always `kills - deaths`
    pub score: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_display() {
        let pvp = KillOutcome::PvpKill {
            killer: "Conan".to_string(),
            victim: "Thulsa".to_string(),
        };
        assert_eq!(pvp.to_string(), "Conan killed Thulsa");

        let env = KillOutcome::EnvironmentKill {
            victim: "Valeria".to_string(),
            creature: "Rocknose".to_string(),
        };
        assert_eq!(env.to_string(), "Valeria was killed by Rocknose");
    }

    #[test]
    fn test_outcome_serializes_with_kind_tag() {
        let outcome = KillOutcome::Ignore {
            reason: IgnoreReason::SelfKill,
        };
        let json = serde_json::to_value(&outcome).unwrap();

        assert_eq!(json["kind"], "ignore");
        assert_eq!(json["reason"], "self_kill");
    }
}
