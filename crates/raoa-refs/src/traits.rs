//! The [`RefStore`] trait defining the reference storage interface.

use raoa_types::ObjectId;

use crate::error::Result;
use crate::types::{Head, RefUpdate, MASTER_REF};

/// Storage backend for the refs of one repository.
///
/// Implementations must be thread-safe (`Send + Sync`). The only way to move
/// a ref is [`compare_and_swap`](RefStore::compare_and_swap): of several
/// writers racing from the same expected value, exactly one observes
/// [`RefUpdate::Updated`].
pub trait RefStore: Send + Sync {
    /// Read a ref by its canonical name (e.g. "refs/heads/master").
    ///
    /// Returns `Ok(None)` if the ref does not exist (an empty repository).
    fn read_ref(&self, name: &str) -> Result<Option<ObjectId>>;

    /// Atomically set `name` to `new` if it currently holds `expected`.
    ///
    /// `expected == None` means "the ref must not exist yet".
    fn compare_and_swap(
        &self,
        name: &str,
        expected: Option<ObjectId>,
        new: ObjectId,
    ) -> Result<RefUpdate>;

    /// Read the current HEAD state.
    ///
    /// Returns `Ok(None)` if HEAD has not been set.
    fn head(&self) -> Result<Option<Head>>;

    /// Point HEAD at a branch ref.
    fn set_head(&self, branch: &str) -> Result<()>;

    /// The branch ref HEAD names, falling back to [`MASTER_REF`].
    fn current_branch(&self) -> Result<String> {
        Ok(match self.head()? {
            Some(Head::Symbolic(name)) => name,
            _ => MASTER_REF.to_string(),
        })
    }

    /// Resolve HEAD to a commit id.
    fn resolve_head(&self) -> Result<Option<ObjectId>> {
        match self.head()? {
            Some(Head::Detached(id)) => Ok(Some(id)),
            Some(Head::Symbolic(name)) => self.read_ref(&name),
            None => self.read_ref(MASTER_REF),
        }
    }
}
