//! Death event classification
//!
//! Pure mapping from a raw `DeathEvent` to a `KillOutcome`. No I/O; the creature
//! table is passed in.
//!
//! | causer        | owner   | outcome            |
//! |---------------|---------|--------------------|
//! | present ≠ own | present | `PvpKill`          |
//! | = owner       | present | `Ignore(SelfKill)` |
//! | absent        | present | `EnvironmentKill`  |
//! | any           | absent  | `Ignore(NoVictim)` |
//!
//! Empty names count as absent.

use super::creatures::CreatureNames;
use super::types::{DeathEvent, IgnoreReason, KillOutcome};

/// Classify a death event
pub fn classify(event: &DeathEvent, creatures: &CreatureNames) -> KillOutcome {
    let causer = non_empty(event.causer_name.as_deref());
    let owner = non_empty(event.owner_name.as_deref());

    match (causer, owner) {
        (_, None) => KillOutcome::Ignore {
            reason: IgnoreReason::NoVictim,
        },
        (Some(killer), Some(victim)) if killer == victim => KillOutcome::Ignore {
            reason: IgnoreReason::SelfKill,
        },
        (Some(killer), Some(victim)) => KillOutcome::PvpKill {
            killer: killer.to_string(),
            victim: victim.to_string(),
        },
        (None, Some(victim)) => KillOutcome::EnvironmentKill {
            victim: victim.to_string(),
            creature: creatures.resolve(non_empty(event.npc_id.as_deref())),
        },
    }
}

/// Whether an outcome should be published on the feed for a source
///
/// PvP-only sources only publish PvP kills; `Ignore` is never published.
/// The aggregate is unaffected either way.
pub fn should_publish(outcome: &KillOutcome, pvp_only: bool) -> bool {
    match outcome {
        KillOutcome::PvpKill { .. } => true,
        KillOutcome::EnvironmentKill { .. } => !pvp_only,
        KillOutcome::Ignore { .. } => false,
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|s| !s.is_empty())
}
