//! Batch copy engine
//!
//! Drives many single-object copies through a provider with bounded
//! concurrency. The call never aborts on first failure: every mapping is
//! drained and yields exactly one outcome, so callers can retry just the
//! failed subset.

use std::collections::HashMap;
use std::sync::Mutex;

use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::Error;
use crate::path::normalize_key;
use crate::traits::StorageProvider;

/// Default worker-pool size for batch operations
pub const DEFAULT_BATCH_CONCURRENCY: usize = 5;

/// One copy instruction inside a batch. Ephemeral; exists only for the
/// duration of the call.
#[derive(Debug, Clone)]
pub struct BatchMapping {
    pub from: String,
    pub to: String,

    /// Replacement metadata, applied only with `replace_metadata`
    pub metadata: Option<HashMap<String, String>>,

    /// Replace the source object's metadata instead of preserving it
    pub replace_metadata: bool,
}

impl BatchMapping {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            metadata: None,
            replace_metadata: false,
        }
    }
}

/// Per-mapping verdict
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOutcome {
    Succeeded,

    /// The provider attempted the copy and it failed
    Failed { reason: String },

    /// The backend cannot perform this copy natively; distinct from a
    /// failure so callers do not retry it
    Unsupported,

    /// The batch was cancelled before this mapping was dispatched
    Cancelled,
}

/// Outcome record for one mapping
#[derive(Debug, Clone)]
pub struct BatchItemResult {
    pub from: String,
    pub to: String,
    pub outcome: BatchOutcome,
}

/// Full result of a batch call: one record per mapping, in input order
#[derive(Debug)]
pub struct BatchReport {
    pub items: Vec<BatchItemResult>,
}

impl BatchReport {
    pub fn succeeded(&self) -> usize {
        self.count(|o| matches!(o, BatchOutcome::Succeeded))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, BatchOutcome::Failed { .. }))
    }

    pub fn unsupported(&self) -> usize {
        self.count(|o| matches!(o, BatchOutcome::Unsupported))
    }

    pub fn cancelled(&self) -> usize {
        self.count(|o| matches!(o, BatchOutcome::Cancelled))
    }

    fn count(&self, pred: impl Fn(&BatchOutcome) -> bool) -> usize {
        self.items.iter().filter(|item| pred(&item.outcome)).count()
    }

    /// Collapse into error semantics: `Ok` only when every mapping
    /// succeeded, `Error::PartialBatch` otherwise. Partial failures are
    /// never silently swallowed.
    pub fn into_result(self) -> crate::error::Result<Vec<BatchItemResult>> {
        let total = self.items.len();
        let failed = total - self.succeeded();
        if failed == 0 {
            Ok(self.items)
        } else {
            Err(Error::PartialBatch { failed, total })
        }
    }
}

/// Coordinator for batch copy operations
#[derive(Debug, Clone)]
pub struct BatchCoordinator {
    concurrency: usize,
}

impl Default for BatchCoordinator {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_BATCH_CONCURRENCY,
        }
    }
}

impl BatchCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the worker-pool size, clamped to at least one worker
    pub fn concurrency(mut self, n: usize) -> Self {
        self.concurrency = n.max(1);
        self
    }

    /// Copy every mapping through the provider, never exceeding the
    /// configured concurrency
    pub async fn batch_copy(
        &self,
        provider: &dyn StorageProvider,
        mappings: Vec<BatchMapping>,
    ) -> BatchReport {
        self.batch_copy_cancellable(provider, mappings, &CancellationToken::new())
            .await
    }

    /// Like [`Self::batch_copy`], observing a cancellation token.
    ///
    /// Cancellation lets already-dispatched copies finish but prevents new
    /// dispatches; undispatched mappings are reported as `Cancelled`, never
    /// dropped.
    pub async fn batch_copy_cancellable(
        &self,
        provider: &dyn StorageProvider,
        mappings: Vec<BatchMapping>,
        cancel: &CancellationToken,
    ) -> BatchReport {
        let total = mappings.len();
        if total == 0 {
            return BatchReport { items: Vec::new() };
        }

        let supports_copy = provider.capabilities().server_side_copy;

        // Mappings sharing a destination key must not run concurrently, or
        // the batch would race against itself last-writer-wins. Group them
        // so exactly one worker owns each destination.
        let mut groups: Vec<Vec<(usize, BatchMapping)>> = Vec::new();
        let mut group_by_dest: HashMap<String, usize> = HashMap::new();
        for (index, mapping) in mappings.into_iter().enumerate() {
            match group_by_dest.entry(normalize_key(&mapping.to)) {
                std::collections::hash_map::Entry::Occupied(entry) => {
                    groups[*entry.get()].push((index, mapping));
                }
                std::collections::hash_map::Entry::Vacant(entry) => {
                    entry.insert(groups.len());
                    groups.push(vec![(index, mapping)]);
                }
            }
        }

        let slots: Mutex<Vec<Option<BatchItemResult>>> = Mutex::new((0..total).map(|_| None).collect());

        futures::stream::iter(groups)
            .for_each_concurrent(self.concurrency, |group| {
                let slots = &slots;
                async move {
                    for (index, mapping) in group {
                        let outcome = if cancel.is_cancelled() {
                            BatchOutcome::Cancelled
                        } else if !supports_copy {
                            BatchOutcome::Unsupported
                        } else {
                            match provider
                                .copy_object(
                                    &mapping.from,
                                    &mapping.to,
                                    mapping.metadata.as_ref(),
                                    mapping.replace_metadata,
                                )
                                .await
                            {
                                Ok(()) => BatchOutcome::Succeeded,
                                Err(e) if e.is_unsupported() => BatchOutcome::Unsupported,
                                Err(e) => BatchOutcome::Failed {
                                    reason: e.to_string(),
                                },
                            }
                        };

                        let mut guard = slots
                            .lock()
                            .unwrap_or_else(std::sync::PoisonError::into_inner);
                        guard[index] = Some(BatchItemResult {
                            from: mapping.from,
                            to: mapping.to,
                            outcome,
                        });
                    }
                }
            })
            .await;

        let items: Vec<BatchItemResult> = slots
            .into_inner()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .into_iter()
            .flatten()
            .collect();
        debug_assert_eq!(items.len(), total, "every mapping must yield an outcome");

        let report = BatchReport { items };
        if report.failed() > 0 || report.unsupported() > 0 || report.cancelled() > 0 {
            warn!(
                total,
                succeeded = report.succeeded(),
                failed = report.failed(),
                unsupported = report.unsupported(),
                cancelled = report.cancelled(),
                "batch copy completed with non-success outcomes"
            );
        } else {
            debug!(total, "batch copy completed");
        }
        report
    }
}
