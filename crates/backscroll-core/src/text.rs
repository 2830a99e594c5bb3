//! Placeholder detection and text preference used by merging and hydration.

/// Replace non-breaking spaces so trimming and length checks see real text.
#[must_use]
pub fn normalize_text(s: &str) -> String {
    s.replace('\u{00a0}', " ")
}

/// True when the text is empty or a loading indicator rather than content.
///
/// Recognised indicators: `Loading`, `Loading..`, `Loading...`, `Loading…`
/// (case-insensitive).
#[must_use]
pub fn is_placeholder_text(s: &str) -> bool {
    let clean = normalize_text(s);
    let clean = clean.trim();
    if clean.is_empty() {
        return true;
    }
    let lower = clean.to_lowercase();
    let Some(rest) = lower.strip_prefix("loading") else {
        return false;
    };
    matches!(rest, "" | ".." | "..." | "…")
}

fn text_score(s: &str) -> usize {
    normalize_text(s).trim().chars().count()
}

/// Pick the better of two renders of the same message text.
///
/// Real text beats a placeholder. Between two real texts the longer one
/// wins, and the newer one wins a tie.
#[must_use]
pub fn prefer_text<'a>(prev: &'a str, next: &'a str) -> &'a str {
    match (is_placeholder_text(prev), is_placeholder_text(next)) {
        (false, true) | (true, true) => prev,
        (true, false) => next,
        (false, false) => {
            if text_score(next) >= text_score(prev) {
                next
            } else {
                prev
            }
        }
    }
}
