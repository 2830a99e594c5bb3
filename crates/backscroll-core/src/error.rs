//! Error taxonomy for scrape runs.
//!
//! Only environment failures abort a run. Extraction gaps are logged and
//! skipped, hydration exhaustion is reported as a diagnostic, and an empty
//! transcript is a distinct non-failure outcome (see
//! [`crate::engine::ScrapeOutcome::Empty`]).

use std::fmt;

/// Machine-readable error codes for callers that branch on failure kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ContainerNotFound,
    ViewSurfaceLost,
    ConfigParseError,
    ConfigInvalid,
    ExtractionFailed,
    InternalUnexpected,
}

impl ErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::ContainerNotFound => "E1001",
            Self::ViewSurfaceLost => "E1002",
            Self::ConfigParseError => "E2001",
            Self::ConfigInvalid => "E2002",
            Self::ExtractionFailed => "E3001",
            Self::InternalUnexpected => "E9001",
        }
    }

    /// Short human-facing summary for logs and terminal output.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::ContainerNotFound => "Scrollable container not found",
            Self::ViewSurfaceLost => "Conversation view surface unavailable",
            Self::ConfigParseError => "Config file parse error",
            Self::ConfigInvalid => "Invalid engine configuration",
            Self::ExtractionFailed => "Item extraction failed",
            Self::InternalUnexpected => "Internal unexpected error",
        }
    }

    /// Optional remediation hint that can be surfaced to operators.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::ContainerNotFound => {
                Some("Open the conversation so its message list is on screen, then retry.")
            }
            Self::ViewSurfaceLost => Some("Keep the conversation open until the export finishes."),
            Self::ConfigParseError => Some("Fix syntax in .backscroll/config.toml and retry."),
            Self::ConfigInvalid => Some("Thresholds and retry budgets must be greater than zero."),
            Self::ExtractionFailed => None,
            Self::InternalUnexpected => Some("Retry once. If persistent, report a bug with logs."),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Failure reported by a [`crate::view::ConversationView`] capability.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ViewError {
    /// The scrollable container could not be located.
    #[error("scrollable container not found")]
    ContainerNotFound,

    /// The view stopped answering (detached, navigated away, crashed).
    #[error("view surface unavailable: {0}")]
    Unavailable(String),

    /// A single control could not be activated. Never fatal.
    #[error("control activation failed: {0}")]
    ControlFailed(String),
}

/// A single item failed to yield a record. Logged and skipped.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("extraction failed for {node}: {reason}")]
pub struct ExtractError {
    /// Best-effort description of the node (identity or position).
    pub node: String,
    /// Why the extractor gave up.
    pub reason: String,
}

impl ExtractError {
    pub fn new(node: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            node: node.into(),
            reason: reason.into(),
        }
    }
}

/// Fatal errors that abort a scrape run.
#[derive(Debug, thiserror::Error)]
pub enum ScrapeError {
    /// The scrollable container or view surface cannot be found.
    #[error("environment error: {0}")]
    Environment(#[from] ViewError),

    /// The engine configuration failed validation.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl ScrapeError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Environment(ViewError::ContainerNotFound) => ErrorCode::ContainerNotFound,
            Self::Environment(ViewError::Unavailable(_)) => ErrorCode::ViewSurfaceLost,
            Self::Environment(ViewError::ControlFailed(_)) => ErrorCode::InternalUnexpected,
            Self::Config(err) => err.code(),
        }
    }
}

/// Errors loading or validating [`crate::config::EngineConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid config: {0}")]
    Invalid(String),
}

impl ConfigError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Read { .. } | Self::Parse { .. } => ErrorCode::ConfigParseError,
            Self::Invalid(_) => ErrorCode::ConfigInvalid,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn all_codes_are_unique() {
        let all = [
            ErrorCode::ContainerNotFound,
            ErrorCode::ViewSurfaceLost,
            ErrorCode::ConfigParseError,
            ErrorCode::ConfigInvalid,
            ErrorCode::ExtractionFailed,
            ErrorCode::InternalUnexpected,
        ];

        let mut seen = HashSet::new();
        for code in all {
            assert!(seen.insert(code.code()), "duplicate code {}", code.code());
        }
    }

    #[test]
    fn code_format_is_machine_friendly() {
        let code = ErrorCode::ContainerNotFound.code();
        assert_eq!(code.len(), 5);
        assert!(code.starts_with('E'));
        assert!(code.chars().skip(1).all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn environment_errors_map_to_codes() {
        let err = ScrapeError::from(ViewError::ContainerNotFound);
        assert_eq!(err.code(), ErrorCode::ContainerNotFound);
        assert!(err.to_string().contains("container"));

        let err = ScrapeError::from(ViewError::Unavailable("detached".into()));
        assert_eq!(err.code(), ErrorCode::ViewSurfaceLost);
    }

    #[test]
    fn extraction_gap_code_and_message() {
        assert_eq!(ErrorCode::ExtractionFailed.code(), "E3001");
        let err = ExtractError::new("m7", "no body");
        assert_eq!(err.to_string(), "extraction failed for m7: no body");
    }
}
