//! Killfeed - PvP ranking engine for rotated game-server event snapshots
//!
//! Polls each configured server's latest snapshot database, extracts death events,
//! classifies them and folds PvP kills into a per-server ranking table.
//!
//! See `pipeline` for the ingestion engine and `src/bin/` for the runtime and
//! operator tools.

pub mod pipeline;
pub mod sqlite_pragma;
