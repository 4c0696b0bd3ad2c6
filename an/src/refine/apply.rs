//! Exact-substitution patching

use tracing::{debug, warn};

use super::Fix;

/// Result of applying a list of fixes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixOutcome {
    pub document: String,
    pub applied: usize,
    pub skipped: usize,
}

/// Apply fixes in emission order, replacing the first occurrence of each
/// `find` in the document as patched so far
///
/// A fix whose `find` is empty or absent is skipped, never forced.
pub fn apply_fixes(document: &str, fixes: &[Fix]) -> FixOutcome {
    debug!(fixes = fixes.len(), chars = document.len(), "apply_fixes: called");
    let mut patched = document.to_string();
    let mut applied = 0;
    let mut skipped = 0;

    for (i, fix) in fixes.iter().enumerate() {
        if fix.find.is_empty() {
            warn!(index = i, "Skipping fix with empty find text");
            skipped += 1;
            continue;
        }
        match patched.find(&fix.find) {
            Some(at) => {
                patched.replace_range(at..at + fix.find.len(), &fix.replace);
                applied += 1;
                debug!(index = i, at, "apply_fixes: applied");
            }
            None => {
                warn!(index = i, find = %crate::extract::truncate_chars(&fix.find, 80), "Skipping fix; find text not in document");
                skipped += 1;
            }
        }
    }

    FixOutcome {
        document: patched,
        applied,
        skipped,
    }
}
