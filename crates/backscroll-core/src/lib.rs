//! backscroll-core library.
//!
//! Recovers the complete history of a virtualized, lazily loaded
//! conversation view. The view only materializes a window of items at a
//! time, so the engine repeatedly scrolls it toward older history, merges
//! every window it sees into a deduplicated aggregate, re-reads sparsely
//! rendered entries, and finally orders everything into a day-bucketed
//! transcript.
//!
//! # Conventions
//!
//! - **Errors**: typed `thiserror` enums with stable [`error::ErrorCode`]s.
//!   Only environment failures abort a run; per-item problems are logged.
//! - **Logging**: `tracing` macros with structured fields.
//! - **Time**: epoch milliseconds (`i64`) everywhere; calendar days are
//!   decided in an explicit [`time::Calendar`].

pub mod aggregate;
pub mod config;
pub mod context;
pub mod driver;
pub mod engine;
pub mod error;
pub mod extract;
pub mod hydrate;
pub mod model;
pub mod resolve;
pub mod stagnation;
pub mod status;
pub mod text;
pub mod time;
pub mod view;

pub use config::{EngineConfig, ScrapeOptions};
pub use engine::{ScrapeOutcome, ScrapeReport, Scraper, Transcript};
pub use error::{ErrorCode, ScrapeError};
