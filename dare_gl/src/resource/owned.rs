use std::backtrace::Backtrace;
use std::sync::Arc;

use derivative::Derivative;
#[cfg(feature = "log-lifetimes")]
use tracing::trace;
use tracing::{debug, error};

use crate::context::Context;
use crate::error::GlError;
use crate::handle::{NativeHandle, ResourceKind};
use crate::resource::reference::{DisposeAction, OwnerToken, ReferenceId};
use crate::traits::Disposable;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum LifecycleState {
    Uninitialized,
    Initialized,
    Disposed,
}

#[derive(Debug)]
struct Tracking {
    id: ReferenceId,
    /// Never read. Dropping it is what the tracker observes through its weak reference
    _owner: Arc<OwnerToken>,
}

/// A native handle whose validity is tied to the lifetime of this value.
///
/// Resources start out [`LifecycleState::Uninitialized`], receive their handle exactly once
/// through [`OwnedResource::initialize`] and are released by [`OwnedResource::dispose`]. A
/// resource dropped while still initialized never calls into the native layer from `Drop`; if
/// its context tracks resources the handle is reclaimed by the next [`Context::run_sweep`] on
/// the context's thread, otherwise the handle leaks and an error is logged.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct OwnedResource {
    context: Context,
    kind: ResourceKind,
    handle: NativeHandle,
    state: LifecycleState,
    label: Option<String>,
    #[derivative(Debug = "ignore")]
    creation_trace: Option<Arc<str>>,
    /// Held here until the resource is registered with the tracker, which then owns it
    dispose_action: Option<DisposeAction>,
    tracking: Option<Tracking>,
}

impl OwnedResource {
    pub fn new(context: &Context, kind: ResourceKind) -> Self {
        Self {
            context: context.clone(),
            kind,
            handle: NativeHandle::NULL,
            state: LifecycleState::Uninitialized,
            label: None,
            creation_trace: None,
            dispose_action: Some(DisposeAction::Delete),
            tracking: None,
        }
    }

    /// Allocates a handle of `kind` and initializes a new resource with it
    pub fn allocate(context: &Context, kind: ResourceKind) -> Result<Self, GlError> {
        Self::new(context, kind).create()
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_dispose_action(mut self, action: DisposeAction) -> Self {
        if self.state == LifecycleState::Uninitialized {
            self.dispose_action = Some(action);
        }
        self
    }

    /// Allocates a handle from the context and initializes with it. If initialization is
    /// rejected the fresh handle is deleted again.
    pub fn create(mut self) -> Result<Self, GlError> {
        let handle = self.context.create_handle(self.kind)?;
        if let Err(err) = self.initialize(handle) {
            if let Err(cleanup) = self.context.delete_handle(self.kind, handle) {
                error!("Failed to release {} {handle} after rejected initialization: {cleanup}", self.kind);
            }
            return Err(err);
        }
        Ok(self)
    }

    /// Takes ownership of `handle`. Valid exactly once, with a non-null handle.
    pub fn initialize(&mut self, handle: NativeHandle) -> Result<(), GlError> {
        match self.state {
            LifecycleState::Disposed => return Err(GlError::ResourceDisposed),
            LifecycleState::Initialized => return Err(GlError::AlreadyInitialized),
            LifecycleState::Uninitialized => {}
        }
        if handle.is_null() {
            return Err(GlError::InvalidHandle);
        }

        let mut state = self.context.enter()?;
        let creation_trace: Option<Arc<str>> = self
            .context
            .config()
            .capture_creation_trace
            .then(|| Arc::from(Backtrace::force_capture().to_string()));
        if self.context.config().track_resources {
            let owner = Arc::new(OwnerToken);
            let action = self.dispose_action.take().unwrap_or_default();
            let id = state.tracker.register(
                &owner,
                self.kind,
                handle,
                action,
                self.label.clone(),
                creation_trace.clone(),
            )?;
            self.tracking = Some(Tracking { id, _owner: owner });
        }
        drop(state);

        #[cfg(feature = "log-lifetimes")]
        trace!("Initialized {} {handle}", self.kind);
        self.handle = handle;
        self.creation_trace = creation_trace;
        self.state = LifecycleState::Initialized;
        Ok(())
    }

    /// Releases the native handle on the calling thread.
    ///
    /// Repeated calls are no-ops. If the context was already disposed the handle died with it
    /// and no native call is made.
    pub fn dispose(&mut self) -> Result<(), GlError> {
        match self.state {
            LifecycleState::Disposed => return Ok(()),
            LifecycleState::Uninitialized => {
                self.state = LifecycleState::Disposed;
                self.dispose_action = None;
                return Ok(());
            }
            LifecycleState::Initialized => {}
        }

        let mut state = match self.context.enter() {
            Ok(state) => state,
            Err(GlError::ContextDisposed) => {
                debug!(
                    "Skipping release of {} {}, its context is already disposed",
                    self.kind, self.handle
                );
                self.state = LifecycleState::Disposed;
                self.tracking = None;
                self.dispose_action = None;
                return Ok(());
            }
            Err(err) => return Err(err),
        };

        self.state = LifecycleState::Disposed;
        let action = match self.tracking.take() {
            Some(tracking) => state.tracker.mark_disposed(tracking.id),
            None => self.dispose_action.take(),
        };
        match action {
            Some(action) => state.native.release(self.kind, self.handle, action),
            None => Ok(()),
        }
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    /// The raw handle, regardless of lifecycle state
    pub fn handle(&self) -> NativeHandle {
        self.handle
    }

    /// The handle, if it may still be used
    pub fn checked_handle(&self) -> Result<NativeHandle, GlError> {
        match self.state {
            LifecycleState::Initialized => Ok(self.handle),
            LifecycleState::Uninitialized => Err(GlError::NotInitialized),
            LifecycleState::Disposed => Err(GlError::ResourceDisposed),
        }
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn is_disposed(&self) -> bool {
        self.state == LifecycleState::Disposed
    }

    pub fn is_tracked(&self) -> bool {
        self.tracking.is_some()
    }

    pub fn creation_trace(&self) -> Option<&str> {
        self.creation_trace.as_deref()
    }
}

impl Disposable for OwnedResource {
    fn dispose(&mut self) -> Result<(), GlError> {
        OwnedResource::dispose(self)
    }

    fn is_disposed(&self) -> bool {
        OwnedResource::is_disposed(self)
    }
}

impl Drop for OwnedResource {
    fn drop(&mut self) {
        if self.state != LifecycleState::Initialized || self.context.is_disposed() {
            return;
        }
        match self.tracking.take() {
            Some(tracking) => {
                // the token must be gone before the counter moves, or a sweep racing us could
                // still see a live owner
                drop(tracking);
                self.context.counter().record_finalization();
            }
            None => error!(
                kind = %self.kind,
                handle = self.handle.raw(),
                label = self.label.as_deref().unwrap_or("<unnamed>"),
                trace = self.creation_trace.as_deref().unwrap_or("<not captured>"),
                "{} {} was never disposed and its handle leaks",
                self.kind,
                self.handle
            ),
        }
    }
}
