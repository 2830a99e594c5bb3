//! Contract for the per-item extractor.
//!
//! Field parsing (author, rich text, reactions, attachments, reply previews)
//! lives outside the engine. The engine only consumes what comes back.

use async_trait::async_trait;

use crate::config::ScrapeOptions;
use crate::context::OrderContext;
use crate::error::ExtractError;
use crate::model::Extracted;

#[async_trait]
pub trait ItemExtractor<N: Sync>: Send + Sync {
    /// Extract one node.
    ///
    /// Returns `Ok(None)` for nodes that should be ignored (for example a
    /// divider when dividers are excluded). May advance the order context's
    /// author and time cursors so later ambiguous items in the same pass can
    /// be resolved by recency.
    ///
    /// # Errors
    ///
    /// An [`ExtractError`] is an extraction gap: the engine logs it and moves
    /// on to the next node.
    async fn extract(
        &self,
        node: &N,
        ctx: &mut OrderContext,
        options: &ScrapeOptions,
    ) -> Result<Option<Extracted>, ExtractError>;
}

/// Identity from timestamp and author, the way the view's own markup would
/// key a message. `None` without a timestamp: an author alone does not
/// distinguish messages.
#[must_use]
pub fn fallback_identity(timestamp_text: &str, author: &str) -> Option<String> {
    (!timestamp_text.is_empty()).then(|| format!("{timestamp_text}#{author}"))
}

/// Keys for an entry that has no identity of its own, derived from its
/// distance to identified neighbours in the same window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PositionalIdentity {
    /// Relative to the nearest older identified item, else the nearest newer
    /// one, else the bare window position.
    pub primary: String,
    /// Relative to the nearest newer identified item, when `primary` used an
    /// older one. Matches the key given while the older anchor was not yet
    /// loaded.
    pub alias: Option<String>,
}

/// Positional keys for every `None` in `keys` (window order, oldest first).
///
/// An older anchor stays in view longer than the items after it as the
/// window moves toward older history, so it is preferred.
#[must_use]
pub fn positional_identities(keys: &[Option<String>]) -> Vec<Option<PositionalIdentity>> {
    keys.iter()
        .enumerate()
        .map(|(index, key)| {
            if key.is_some() {
                return None;
            }
            let older = keys[..index]
                .iter()
                .enumerate()
                .rev()
                .find_map(|(j, k)| k.as_ref().map(|k| format!("{k}+{}", index - j)));
            let newer = keys[index + 1..]
                .iter()
                .enumerate()
                .find_map(|(j, k)| k.as_ref().map(|k| format!("{k}-{}", j + 1)));
            Some(match older {
                Some(primary) => PositionalIdentity {
                    primary,
                    alias: newer,
                },
                None => PositionalIdentity {
                    primary: newer.unwrap_or_else(|| format!("~{index}")),
                    alias: None,
                },
            })
        })
        .collect()
}
