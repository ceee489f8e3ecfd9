//! Live DPS/HPS meter core for Ashes of Creation combat logs.
//!
//! The game client appends newline-delimited JSON envelopes to a log file;
//! this crate tails that file, extracts typed combat events, and maintains
//! live damage/healing statistics segmented into discrete combat encounters.
//!
//! Pipeline: [`tailer::Tailer`] -> batch of raw lines ->
//! [`parser::EventParser`] -> typed [`parser::DomainEvent`]s ->
//! [`aggregator::CombatAggregator`] -> [`snapshot::SessionSnapshot`] views.
//!
//! [`monitor::Monitor`] ties the stages together behind a start/stop/reset
//! facade; presentation layers consume its snapshot queries.

pub mod aggregator;
pub mod config;
pub mod monitor;
pub mod parser;
pub mod session;
pub mod snapshot;
pub mod tailer;

pub use aggregator::{CombatAggregator, SharedAggregator};
pub use config::AppConfig;
pub use monitor::{MeterError, Monitor};
pub use parser::{BuffKind, DomainEvent, EventParser};
pub use snapshot::{AbilityRow, SessionSnapshot, TargetRow};
pub use tailer::{Tailer, TailerError};
