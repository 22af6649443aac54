use std::sync::{Arc, Condvar, Mutex};

use raoa_store::Tree;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::RepoResult;
use crate::repository::Repository;
use crate::snapshot::FileEntry;

/// Which paths a listing yields.
#[derive(Clone, Default)]
pub enum PathFilter {
    /// Every file.
    #[default]
    All,
    /// Paths ending in any of the suffixes (ASCII case-insensitive), e.g.
    /// media extensions.
    Suffix(Vec<String>),
    /// Paths starting with `prefix` and ending in `suffix` (suffix ASCII
    /// case-insensitive), e.g. sidecars next to an entry.
    PrefixSuffix { prefix: String, suffix: String },
    /// Arbitrary predicate over the full path.
    Custom(Arc<dyn Fn(&str) -> bool + Send + Sync>),
}

impl PathFilter {
    pub fn suffixes<I, S>(suffixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Suffix(suffixes.into_iter().map(Into::into).collect())
    }

    pub fn prefix_suffix(prefix: impl Into<String>, suffix: impl Into<String>) -> Self {
        Self::PrefixSuffix {
            prefix: prefix.into(),
            suffix: suffix.into(),
        }
    }

    pub fn custom<F>(predicate: F) -> Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        Self::Custom(Arc::new(predicate))
    }

    pub fn matches(&self, path: &str) -> bool {
        match self {
            Self::All => true,
            Self::Suffix(suffixes) => suffixes.iter().any(|s| ends_with_ignore_case(path, s)),
            Self::PrefixSuffix { prefix, suffix } => {
                path.starts_with(prefix.as_str()) && ends_with_ignore_case(path, suffix)
            }
            Self::Custom(predicate) => predicate(path),
        }
    }
}

fn ends_with_ignore_case(path: &str, suffix: &str) -> bool {
    path.len() >= suffix.len()
        && path.is_char_boundary(path.len() - suffix.len())
        && path[path.len() - suffix.len()..].eq_ignore_ascii_case(suffix)
}

impl std::fmt::Debug for PathFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::All => write!(f, "All"),
            Self::Suffix(s) => f.debug_tuple("Suffix").field(s).finish(),
            Self::PrefixSuffix { prefix, suffix } => f
                .debug_struct("PrefixSuffix")
                .field("prefix", prefix)
                .field("suffix", suffix)
                .finish(),
            Self::Custom(_) => write!(f, "Custom(..)"),
        }
    }
}

#[derive(Default)]
struct CreditState {
    available: u64,
    closed: bool,
}

/// Demand shared between the consumer and the walk thread.
#[derive(Default)]
struct Credits {
    state: Mutex<CreditState>,
    changed: Condvar,
}

impl Credits {
    fn grant(&self, n: u64) {
        let mut state = self.state.lock().expect("lock poisoned");
        state.available = state.available.saturating_add(n);
        self.changed.notify_all();
    }

    fn close(&self) {
        let mut state = self.state.lock().expect("lock poisoned");
        state.closed = true;
        self.changed.notify_all();
    }

    /// Block until one credit is available; `false` once closed.
    fn take(&self) -> bool {
        let mut state = self.state.lock().expect("lock poisoned");
        loop {
            if state.closed {
                return false;
            }
            if state.available > 0 {
                state.available -= 1;
                return true;
            }
            state = self.changed.wait(state).expect("lock poisoned");
        }
    }
}

/// A credit-based stream of the files in one snapshot.
///
/// The tree walk runs on a dedicated thread and produces an entry only after
/// the consumer has granted credit for it with [`request`](Self::request), so
/// a slow consumer never causes unbounded buffering. Dropping the listing
/// stops the walk at the next entry boundary.
pub struct FileListing {
    receiver: mpsc::UnboundedReceiver<RepoResult<FileEntry>>,
    credits: Arc<Credits>,
}

impl FileListing {
    /// Start walking `tree` on a new thread.
    pub(crate) fn spawn(
        repo: Arc<Repository>,
        tree: Arc<Tree>,
        filter: PathFilter,
    ) -> RepoResult<Self> {
        let (sender, receiver) = mpsc::unbounded_channel();
        let credits = Arc::new(Credits::default());
        let producer_credits = Arc::clone(&credits);
        std::thread::Builder::new()
            .name("list files".into())
            .spawn(move || {
                let mut delivered = 0u64;
                let result = repo.walk(&tree, |entry| {
                    if !filter.matches(&entry.path) {
                        return true;
                    }
                    if !producer_credits.take() {
                        return false;
                    }
                    delivered += 1;
                    sender.send(Ok(entry)).is_ok()
                });
                match result {
                    Ok(()) => debug!(delivered, "file listing finished"),
                    Err(e) => {
                        warn!(error = %e, "file listing failed");
                        let _ = sender.send(Err(e));
                    }
                }
            })?;
        Ok(Self { receiver, credits })
    }

    /// Allow the walk to produce `n` more entries.
    pub fn request(&self, n: u64) {
        self.credits.grant(n);
    }

    /// Receive the next produced entry; `None` once the walk has finished.
    ///
    /// This does not grant credit: without outstanding requests it waits
    /// until [`request`](Self::request) is called from elsewhere or the walk
    /// ends.
    pub async fn next(&mut self) -> Option<RepoResult<FileEntry>> {
        self.receiver.recv().await
    }

    /// Request one entry and wait for it.
    pub async fn pull(&mut self) -> Option<RepoResult<FileEntry>> {
        self.request(1);
        self.next().await
    }

    /// An entry that has already been produced, without waiting.
    pub fn try_next(&mut self) -> Option<RepoResult<FileEntry>> {
        self.receiver.try_recv().ok()
    }

    /// Drain the whole listing.
    pub async fn collect_all(mut self) -> RepoResult<Vec<FileEntry>> {
        self.request(u64::MAX);
        let mut out = Vec::new();
        while let Some(entry) = self.next().await {
            out.push(entry?);
        }
        Ok(out)
    }

    /// Stop the walk. Equivalent to dropping the listing.
    pub fn cancel(self) {}
}

impl Drop for FileListing {
    fn drop(&mut self) {
        self.credits.close();
    }
}

impl std::fmt::Debug for FileListing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileListing").finish_non_exhaustive()
    }
}
