//! backscroll-sim library.
//!
//! Deterministic stand-in for a live conversation view, used to exercise
//! the engine end to end against known ground truth.
//!
//! # Conventions
//!
//! - **Errors**: `anyhow::Result` for return types.
//! - **Logging**: `tracing` macros with structured fields.
//! - **Time**: every run happens on a paused tokio clock.

pub mod campaign;
pub mod conversation;
pub mod extractor;
pub mod oracle;
pub mod rng;
pub mod view;

pub use campaign::{CampaignConfig, CampaignReport, SeedRun, replay_seed, run_campaign};
pub use conversation::{Conversation, ConversationConfig, generate_conversation};
pub use extractor::SimExtractor;
pub use oracle::{InvariantViolation, OracleResult, TranscriptOracle};
pub use view::{ScriptedView, ViewConfig};
