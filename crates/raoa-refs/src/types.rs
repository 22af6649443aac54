//! Core reference types.

use std::fmt;

use raoa_types::ObjectId;

/// Name of the symbolic ref file inside a git directory.
pub const HEAD: &str = "HEAD";

/// The single branch every album repository advances.
pub const MASTER_REF: &str = "refs/heads/master";

/// The state of `HEAD`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Head {
    /// HEAD names a branch ref (e.g. `refs/heads/master`).
    Symbolic(String),
    /// HEAD points directly at a commit.
    Detached(ObjectId),
}

impl Head {
    /// Parse the textual content of a `HEAD` file.
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        if let Some(target) = text.strip_prefix("ref:") {
            let target = target.trim();
            return (!target.is_empty()).then(|| Head::Symbolic(target.to_string()));
        }
        ObjectId::from_hex(text).ok().map(Head::Detached)
    }

    /// Returns the branch ref name if HEAD is symbolic.
    pub fn branch(&self) -> Option<&str> {
        match self {
            Head::Symbolic(name) => Some(name),
            Head::Detached(_) => None,
        }
    }
}

impl fmt::Display for Head {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Head::Symbolic(name) => write!(f, "ref: {name}"),
            Head::Detached(id) => write!(f, "{}", id.to_hex()),
        }
    }
}

/// Outcome of a compare-and-swap on a ref.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RefUpdate {
    /// The ref held the expected value and now points at `new`.
    Updated {
        previous: Option<ObjectId>,
        new: ObjectId,
    },
    /// Another writer moved the ref (or holds its lock); nothing was changed.
    Rejected {
        expected: Option<ObjectId>,
        actual: Option<ObjectId>,
    },
}

impl RefUpdate {
    /// Returns `true` if the swap took effect.
    pub fn is_updated(&self) -> bool {
        matches!(self, RefUpdate::Updated { .. })
    }
}
