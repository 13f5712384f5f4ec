use std::fmt;

/// Why an entry was left out of a listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// The name was listed but the entry does not exist (e.g. a dangling symlink).
    Missing,
    /// Metadata lookup failed for another reason.
    Metadata(String),
    /// The name does not follow the expected naming scheme.
    MalformedName,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::Missing => write!(f, "entry does not exist"),
            SkipReason::Metadata(msg) => write!(f, "metadata lookup failed: {}", msg),
            SkipReason::MalformedName => write!(f, "malformed entry name"),
        }
    }
}

/// An entry a listing could not include.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedEntry {
    pub path: String,
    pub reason: SkipReason,
}

/// Result of a listing: the entries that made it, plus diagnostics for the
/// ones that did not. A bad entry never aborts the whole listing.
#[derive(Debug, Clone)]
pub struct Listing<T> {
    pub items: Vec<T>,
    pub skipped: Vec<SkippedEntry>,
}

impl<T> Default for Listing<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            skipped: Vec::new(),
        }
    }
}

impl<T> Listing<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, item: T) {
        self.items.push(item);
    }

    pub fn skip(&mut self, path: impl Into<String>, reason: SkipReason) {
        self.skipped.push(SkippedEntry {
            path: path.into(),
            reason,
        });
    }
}
