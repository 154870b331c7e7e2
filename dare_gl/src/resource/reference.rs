use std::sync::{Arc, Weak};

use derivative::Derivative;

use crate::handle::{NativeHandle, ResourceKind};
use crate::native::NativeApi;

/// Caller supplied release of a native handle
pub type DisposeFn =
    dyn FnOnce(&mut dyn NativeApi, NativeHandle) -> anyhow::Result<()> + Send + Sync;

/// How a handle is given back to the native layer. Consumed by the single call that runs it.
#[derive(Derivative)]
#[derivative(Debug)]
pub enum DisposeAction {
    /// The native delete call of the resource's kind
    Delete,
    /// Custom release, e.g. for resources which own more than one native object
    Custom(#[derivative(Debug = "ignore")] Box<DisposeFn>),
}

impl DisposeAction {
    pub fn custom<F>(f: F) -> Self
    where
        F: FnOnce(&mut dyn NativeApi, NativeHandle) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        DisposeAction::Custom(Box::new(f))
    }
}

impl Default for DisposeAction {
    fn default() -> Self {
        DisposeAction::Delete
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ReferenceId(pub(crate) u64);

/// Strong half of the owner observation. Lives inside the owning resource; the tracker only
/// ever holds a [`Weak`] to it.
#[derive(Debug)]
pub(crate) struct OwnerToken;

/// The tracker's shadow of one owned native handle
#[derive(Derivative)]
#[derivative(Debug)]
pub struct ResourceReference {
    id: ReferenceId,
    #[derivative(Debug = "ignore")]
    owner: Weak<OwnerToken>,
    kind: ResourceKind,
    handle: NativeHandle,
    action: Option<DisposeAction>,
    alive: bool,
    label: Option<String>,
    #[derivative(Debug = "ignore")]
    creation_trace: Option<Arc<str>>,
}

impl ResourceReference {
    pub(crate) fn new(
        id: ReferenceId,
        owner: &Arc<OwnerToken>,
        kind: ResourceKind,
        handle: NativeHandle,
        action: DisposeAction,
        label: Option<String>,
        creation_trace: Option<Arc<str>>,
    ) -> Self {
        Self {
            id,
            owner: Arc::downgrade(owner),
            kind,
            handle,
            action: Some(action),
            alive: true,
            label,
            creation_trace,
        }
    }

    pub fn id(&self) -> ReferenceId {
        self.id
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    pub fn handle(&self) -> NativeHandle {
        self.handle
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn creation_trace(&self) -> Option<&Arc<str>> {
        self.creation_trace.as_ref()
    }

    /// Whether the tracker is still responsible for this handle
    pub fn is_alive(&self) -> bool {
        self.alive
    }

    /// Whether the weak observation still resolves to a live owner
    pub fn owner_alive(&self) -> bool {
        self.owner.strong_count() > 0
    }

    /// The owner released the handle itself. Hands the action over to the caller, after which
    /// no sweep can run it again.
    pub(crate) fn mark_disposed(&mut self) -> Option<DisposeAction> {
        if !self.alive {
            return None;
        }
        self.alive = false;
        self.action.take()
    }

    /// Flips the reference dead if its owner is gone, returning the action the sweep must run
    pub(crate) fn take_if_orphaned(&mut self) -> Option<DisposeAction> {
        if !self.alive || self.owner_alive() {
            return None;
        }
        self.alive = false;
        self.action.take()
    }
}
