//! In-memory reference store for testing and ephemeral use.

use std::collections::HashMap;
use std::sync::RwLock;

use raoa_types::ObjectId;

use crate::error::Result;
use crate::names::validate_ref_name;
use crate::traits::RefStore;
use crate::types::{Head, RefUpdate};

/// An in-memory implementation of [`RefStore`].
///
/// All data lives in a `HashMap` behind a `RwLock`; the write lock makes
/// compare-and-swap atomic. Data is lost when the store is dropped.
#[derive(Debug, Default)]
pub struct InMemoryRefStore {
    refs: RwLock<HashMap<String, ObjectId>>,
    head: RwLock<Option<Head>>,
}

impl InMemoryRefStore {
    /// Create a new empty ref store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl RefStore for InMemoryRefStore {
    fn read_ref(&self, name: &str) -> Result<Option<ObjectId>> {
        let refs = self.refs.read().expect("lock poisoned");
        Ok(refs.get(name).copied())
    }

    fn compare_and_swap(
        &self,
        name: &str,
        expected: Option<ObjectId>,
        new: ObjectId,
    ) -> Result<RefUpdate> {
        validate_ref_name(name)?;
        let mut refs = self.refs.write().expect("lock poisoned");
        let actual = refs.get(name).copied();
        if actual != expected {
            return Ok(RefUpdate::Rejected { expected, actual });
        }
        refs.insert(name.to_string(), new);
        Ok(RefUpdate::Updated {
            previous: actual,
            new,
        })
    }

    fn head(&self) -> Result<Option<Head>> {
        Ok(self.head.read().expect("lock poisoned").clone())
    }

    fn set_head(&self, branch: &str) -> Result<()> {
        validate_ref_name(branch)?;
        *self.head.write().expect("lock poisoned") = Some(Head::Symbolic(branch.to_string()));
        Ok(())
    }
}
