//! # Directory Usage Engine
//!
//! The stateful heart of the daemon: one actor task owns the directory
//! history and answers every query, fed by pluggable usage sources.
//!
//! ## Pieces
//!
//! | Piece | Role |
//! |-------|------|
//! | [`actor`] | the engine task, its handle, and the control loop |
//! | [`query`] | pure matching, grouping, ranking, result ids |
//! | [`source`] | the [`UsageSource`] trait and manual pushes |
//! | [`poller`] | the `/proc` working-directory sweep |
//!
//! ## Flow
//!
//! Sources observe directory use and send [`UsageEvent`]s into the engine's
//! event channel. Clients send query strings and wait on a one-shot reply.
//! The engine periodically snapshots its history to disk and flushes once
//! more on shutdown.

pub mod actor;
pub mod poller;
pub mod query;
pub mod source;

pub use actor::{spawn_engine, EngineHandle};
pub use poller::CwdPoller;
pub use query::{MatchOffset, QueryMatch, QUERY_ALL};
pub use source::{manual_source, ManualHandle, ManualSource, UsageEvent, UsageSource};
