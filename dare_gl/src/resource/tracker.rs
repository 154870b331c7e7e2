use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{error, warn};

use crate::error::GlError;
use crate::handle::{NativeHandle, ResourceKind};
use crate::resource::reference::{
    DisposeAction, OwnerToken, ReferenceId, ResourceReference,
};

/// A handle reclaimed by a sweep because its owner was finalized without being disposed
#[derive(Debug, Clone)]
pub struct LeakReport {
    pub kind: ResourceKind,
    pub handle: NativeHandle,
    pub label: Option<String>,
    pub creation_trace: Option<Arc<str>>,
}

/// A disposal operation which failed during a sweep
#[derive(Debug)]
pub struct DisposalFailure {
    pub kind: ResourceKind,
    pub handle: NativeHandle,
    pub error: GlError,
}

#[derive(Debug, Default)]
pub struct SweepReport {
    /// `false` when no collection happened since the previous sweep and nothing was examined
    pub swept: bool,
    pub reclaimed: Vec<LeakReport>,
    pub failures: Vec<DisposalFailure>,
    /// References still tracked after compaction
    pub remaining: usize,
}

impl SweepReport {
    pub fn leak_count(&self) -> usize {
        self.reclaimed.len()
    }
}

/// Per context registry of handles whose owners may be finalized without being disposed.
///
/// References are keyed by their monotonically increasing id, so iteration follows registration
/// order. Only the thread the owning context is current on mutates the tracker.
#[derive(Debug)]
pub struct ResourceTracker {
    references: BTreeMap<ReferenceId, ResourceReference>,
    last_collection: u64,
    next_id: u64,
    abandoned: bool,
}

impl ResourceTracker {
    /// `collection_count` is the collector's count at creation; the first sweep only does work
    /// once it has moved on.
    pub fn new(collection_count: u64) -> Self {
        Self {
            references: BTreeMap::new(),
            last_collection: collection_count,
            next_id: 0,
            abandoned: false,
        }
    }

    pub fn len(&self) -> usize {
        self.references.len()
    }

    pub fn is_empty(&self) -> bool {
        self.references.is_empty()
    }

    pub fn is_abandoned(&self) -> bool {
        self.abandoned
    }

    pub fn references(&self) -> impl Iterator<Item = &ResourceReference> {
        self.references.values()
    }

    pub(crate) fn register(
        &mut self,
        owner: &Arc<OwnerToken>,
        kind: ResourceKind,
        handle: NativeHandle,
        action: DisposeAction,
        label: Option<String>,
        creation_trace: Option<Arc<str>>,
    ) -> Result<ReferenceId, GlError> {
        if self.abandoned {
            return Err(GlError::ContextDisposed);
        }
        self.next_id += 1;
        let id = ReferenceId(self.next_id);
        self.references.insert(
            id,
            ResourceReference::new(id, owner, kind, handle, action, label, creation_trace),
        );
        Ok(id)
    }

    /// Explicit dispose of a tracked owner. The entry leaves the tracker immediately and the
    /// returned action must be run by the caller.
    pub(crate) fn mark_disposed(&mut self, id: ReferenceId) -> Option<DisposeAction> {
        self.references
            .remove(&id)
            .and_then(|mut reference| reference.mark_disposed())
    }

    /// Reclaims every handle whose owner is gone.
    ///
    /// `dispose` issues the native release for a single handle. Its failures are logged and
    /// collected, never propagated, so one bad entry cannot hide the others.
    pub fn sweep<F>(&mut self, collection_count: u64, mut dispose: F) -> SweepReport
    where
        F: FnMut(ResourceKind, NativeHandle, DisposeAction) -> Result<(), GlError>,
    {
        if self.abandoned || collection_count == self.last_collection {
            return SweepReport {
                remaining: self.references.len(),
                ..Default::default()
            };
        }
        self.last_collection = collection_count;

        let mut report = SweepReport {
            swept: true,
            ..Default::default()
        };
        for reference in self.references.values_mut() {
            let Some(action) = reference.take_if_orphaned() else {
                continue;
            };
            let kind = reference.kind();
            let handle = reference.handle();
            let result = dispose(kind, handle, action);
            warn!(
                kind = %kind,
                handle = handle.raw(),
                label = reference.label().unwrap_or("<unnamed>"),
                trace = reference.creation_trace().map(|trace| &**trace).unwrap_or("<not captured>"),
                "Disposing {kind} {handle} after its owner was collected without being disposed"
            );
            report.reclaimed.push(LeakReport {
                kind,
                handle,
                label: reference.label().map(str::to_owned),
                creation_trace: reference.creation_trace().cloned(),
            });
            if let Err(err) = result {
                error!(kind = %kind, handle = handle.raw(), "Failed to reclaim leaked handle: {err}");
                report.failures.push(DisposalFailure {
                    kind,
                    handle,
                    error: err,
                });
            }
        }
        self.references.retain(|_, reference| reference.is_alive());
        report.remaining = self.references.len();
        report
    }

    /// The native context is gone. Drops every reference without running its action and
    /// refuses all further work.
    pub(crate) fn abandon(&mut self) -> usize {
        self.abandoned = true;
        let abandoned = self.references.values().filter(|r| r.is_alive()).count();
        self.references.clear();
        abandoned
    }
}
