pub mod affinity;
pub mod state_cache;

pub use affinity::ThreadAffinity;
pub use state_cache::StateCache;

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use derivative::Derivative;
#[cfg(feature = "log-lifetimes")]
use tracing::trace;
use tracing::{debug, error, info, warn};

use crate::collector::{CollectionCounter, FinalizationCounter};
use crate::error::GlError;
use crate::handle::{FramebufferTarget, NativeHandle, ResourceKind, TextureTarget, TextureUnit};
use crate::native::NativeApi;
use crate::resource::{DisposeAction, ResourceTracker, SweepReport};
use crate::traits::Disposable;

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct ContextId(u64);

impl ContextId {
    pub(crate) fn next() -> Self {
        Self(NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "context {}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextConfig {
    /// Register every initialized resource so handles of owners dropped without being disposed
    /// are reclaimed by [`Context::run_sweep`]
    pub track_resources: bool,
    /// Attach a backtrace of the initialization site to every resource for leak diagnostics
    pub capture_creation_trace: bool,
    /// Poll the native error queue after every bind and delete
    pub check_errors: bool,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            track_resources: true,
            capture_creation_trace: cfg!(debug_assertions),
            check_errors: true,
        }
    }
}

#[derive(Debug, Default)]
pub struct ContextBuilder {
    config: ContextConfig,
    counter: Option<Arc<dyn CollectionCounter>>,
}

impl ContextBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn track_resources(mut self, track: bool) -> Self {
        self.config.track_resources = track;
        self
    }

    pub fn capture_creation_trace(mut self, capture: bool) -> Self {
        self.config.capture_creation_trace = capture;
        self
    }

    pub fn check_errors(mut self, check: bool) -> Self {
        self.config.check_errors = check;
        self
    }

    /// Replaces the default [`FinalizationCounter`]
    pub fn collection_counter(mut self, counter: Arc<dyn CollectionCounter>) -> Self {
        self.counter = Some(counter);
        self
    }

    /// Wraps a native context and makes it current on the calling thread
    pub fn build<N: NativeApi + 'static>(self, native: N) -> Result<Context, GlError> {
        let texture_units = native.max_texture_units();
        if texture_units == 0 {
            return Err(GlError::InvalidTextureUnitCount);
        }
        let counter = self
            .counter
            .unwrap_or_else(|| Arc::new(FinalizationCounter::new()));
        let id = ContextId::next();
        let affinity = ThreadAffinity::new(id);
        affinity.acquire()?;

        let state = ContextState {
            native: NativeContext {
                api: Box::new(native),
                cache: StateCache::new(texture_units),
                check_errors: self.config.check_errors,
            },
            tracker: ResourceTracker::new(counter.collection_count()),
        };
        info!("Created {id} with {texture_units} texture units");
        Ok(Context {
            inner: Arc::new(ContextInner {
                id,
                config: self.config,
                affinity,
                disposed: AtomicBool::new(false),
                counter,
                state: Mutex::new(state),
            }),
        })
    }
}

/// The native layer together with what the context believes is bound on it
#[derive(Derivative)]
#[derivative(Debug)]
pub(crate) struct NativeContext {
    #[derivative(Debug = "ignore")]
    api: Box<dyn NativeApi>,
    cache: StateCache,
    check_errors: bool,
}

impl NativeContext {
    fn check(&mut self) -> Result<(), GlError> {
        if !self.check_errors {
            return Ok(());
        }
        match self.api.take_error() {
            Some(code) => Err(GlError::Native(code)),
            None => Ok(()),
        }
    }

    /// Gives `handle` back to the native layer and forgets it in every cache slot
    pub(crate) fn release(
        &mut self,
        kind: ResourceKind,
        handle: NativeHandle,
        action: DisposeAction,
    ) -> Result<(), GlError> {
        self.cache.forget(kind, handle);
        #[cfg(feature = "log-lifetimes")]
        trace!("Deleting {kind} {handle}");
        let released = match action {
            DisposeAction::Delete => {
                self.api.delete(kind, handle.raw());
                Ok(())
            }
            DisposeAction::Custom(dispose) => dispose(self.api.as_mut(), handle),
        };
        released
            .and_then(|_| self.check().map_err(anyhow::Error::from))
            .map_err(|source| GlError::DisposalFailed {
                kind,
                handle,
                source,
            })
    }
}

#[derive(Debug)]
pub(crate) struct ContextState {
    pub(crate) native: NativeContext,
    pub(crate) tracker: ResourceTracker,
}

#[derive(Derivative)]
#[derivative(Debug)]
struct ContextInner {
    id: ContextId,
    config: ContextConfig,
    affinity: ThreadAffinity,
    disposed: AtomicBool,
    counter: Arc<dyn CollectionCounter>,
    #[derivative(Debug = "ignore")]
    state: Mutex<ContextState>,
}

impl Drop for ContextInner {
    fn drop(&mut self) {
        if !self.disposed.load(Ordering::Acquire) {
            warn!("{} dropped without being disposed, the native context leaks", self.id);
        }
    }
}

/// One native graphics session.
///
/// A context is current on exactly one thread at a time and every entry point which may touch
/// the native layer rejects calls from any other thread. Cloning is cheap and yields another
/// reference to the same session.
///
/// Contexts should be disposed on their owner thread. Dropping the last clone without disposing
/// only logs a warning; the native context itself is never torn down from `Drop`.
#[derive(Debug, Clone)]
pub struct Context {
    inner: Arc<ContextInner>,
}

impl PartialEq for Context {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Context {}

impl Context {
    pub fn builder() -> ContextBuilder {
        ContextBuilder::new()
    }

    /// Builds a context with the default configuration
    pub fn new<N: NativeApi + 'static>(native: N) -> Result<Self, GlError> {
        ContextBuilder::new().build(native)
    }

    pub fn id(&self) -> ContextId {
        self.inner.id
    }

    pub fn config(&self) -> &ContextConfig {
        &self.inner.config
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::Acquire)
    }

    pub fn is_current(&self) -> bool {
        self.inner.affinity.is_current()
    }

    pub fn affinity(&self) -> &ThreadAffinity {
        &self.inner.affinity
    }

    pub fn make_current(&self) -> Result<(), GlError> {
        self.ensure_alive()?;
        self.inner.affinity.acquire()
    }

    /// Detaches from the calling thread so another thread may make the context current
    pub fn release_current(&self) -> Result<(), GlError> {
        self.ensure_alive()?;
        self.inner.affinity.release()
    }

    pub(crate) fn counter(&self) -> &Arc<dyn CollectionCounter> {
        &self.inner.counter
    }

    fn ensure_alive(&self) -> Result<(), GlError> {
        if self.is_disposed() {
            return Err(GlError::ContextDisposed);
        }
        Ok(())
    }

    /// Checks liveness and thread affinity, then locks the native state
    pub(crate) fn enter(&self) -> Result<MutexGuard<'_, ContextState>, GlError> {
        self.ensure_alive()?;
        self.inner.affinity.check()?;
        let state = self.inner.state.lock()?;
        // disposal may have won the race for the lock
        self.ensure_alive()?;
        Ok(state)
    }

    /// Allocates a native object. The null handle is turned into [`GlError::AllocationFailed`].
    pub fn create_handle(&self, kind: ResourceKind) -> Result<NativeHandle, GlError> {
        let mut state = self.enter()?;
        let handle = NativeHandle::from_raw(state.native.api.create(kind));
        if handle.is_null() {
            let native = state.native.api.take_error();
            error!(kind = %kind, native = ?native, "Native layer failed to allocate a {kind}");
            return Err(GlError::AllocationFailed(kind));
        }
        if let Err(err) = state.native.check() {
            state.native.api.delete(kind, handle.raw());
            return Err(err);
        }
        #[cfg(feature = "log-lifetimes")]
        trace!("Created {kind} {handle}");
        Ok(handle)
    }

    /// Deletes a native object which is not owned by an [`crate::OwnedResource`].
    ///
    /// Native failures are logged, not returned; only protocol violations are.
    pub fn delete_handle(&self, kind: ResourceKind, handle: NativeHandle) -> Result<(), GlError> {
        let mut state = self.enter()?;
        if handle.is_null() {
            return Ok(());
        }
        if let Err(err) = state.native.release(kind, handle, DisposeAction::Delete) {
            error!(kind = %kind, handle = handle.raw(), "{err}");
        }
        Ok(())
    }

    /// Binds a program. Returns whether a native call was issued.
    pub fn use_program(&self, program: NativeHandle) -> Result<bool, GlError> {
        let mut state = self.enter()?;
        let native = &mut state.native;
        if !native.cache.set_program(program) {
            return Ok(false);
        }
        native.api.use_program(program.raw());
        native.check()?;
        Ok(true)
    }

    pub fn bind_vertex_array(&self, vertex_array: NativeHandle) -> Result<bool, GlError> {
        let mut state = self.enter()?;
        let native = &mut state.native;
        if !native.cache.set_vertex_array(vertex_array) {
            return Ok(false);
        }
        native.api.bind_vertex_array(vertex_array.raw());
        native.check()?;
        Ok(true)
    }

    pub fn active_texture(&self, unit: TextureUnit) -> Result<bool, GlError> {
        let mut state = self.enter()?;
        let native = &mut state.native;
        if !native.cache.set_active_unit(unit)? {
            return Ok(false);
        }
        native.api.active_texture(unit);
        native.check()?;
        Ok(true)
    }

    /// Binds `texture` into the active texture unit
    pub fn bind_texture(
        &self,
        target: TextureTarget,
        texture: NativeHandle,
    ) -> Result<bool, GlError> {
        let mut state = self.enter()?;
        let native = &mut state.native;
        if !native.cache.set_texture(texture) {
            return Ok(false);
        }
        native.api.bind_texture(target, texture.raw());
        native.check()?;
        Ok(true)
    }

    /// Selects `unit` and binds `texture` into it
    pub fn bind_texture_unit(
        &self,
        unit: TextureUnit,
        target: TextureTarget,
        texture: NativeHandle,
    ) -> Result<bool, GlError> {
        let selected = self.active_texture(unit)?;
        let bound = self.bind_texture(target, texture)?;
        Ok(selected || bound)
    }

    pub fn bind_framebuffer(
        &self,
        target: FramebufferTarget,
        framebuffer: NativeHandle,
    ) -> Result<bool, GlError> {
        let mut state = self.enter()?;
        let native = &mut state.native;
        if !native.cache.set_framebuffer(target, framebuffer) {
            return Ok(false);
        }
        native.api.bind_framebuffer(target, framebuffer.raw());
        native.check()?;
        Ok(true)
    }

    /// Binds the window system provided framebuffer
    pub fn bind_default_framebuffer(&self, target: FramebufferTarget) -> Result<bool, GlError> {
        self.bind_framebuffer(target, NativeHandle::NULL)
    }

    /// Snapshot of the bind cache
    pub fn state_cache(&self) -> Result<StateCache, GlError> {
        Ok(self.enter()?.native.cache.clone())
    }

    /// Number of handles the tracker is responsible for, including orphans awaiting a sweep
    pub fn tracked_count(&self) -> Result<usize, GlError> {
        Ok(self.enter()?.tracker.len())
    }

    /// Reclaims handles of tracked owners which were dropped without being disposed.
    ///
    /// Does nothing unless the collection counter moved since the previous sweep.
    pub fn run_sweep(&self) -> Result<SweepReport, GlError> {
        let count = self.inner.counter.collection_count();
        let mut state = self.enter()?;
        let ContextState { native, tracker } = &mut *state;
        let report = tracker.sweep(count, |kind, handle, action| {
            native.release(kind, handle, action)
        });
        if report.swept {
            debug!(
                reclaimed = report.leak_count(),
                failed = report.failures.len(),
                remaining = report.remaining,
                "Swept {}",
                self.inner.id
            );
        }
        Ok(report)
    }

    /// Frame boundary hook for the host's render loop
    pub fn end_frame(&self) -> Result<SweepReport, GlError> {
        self.run_sweep()
    }

    /// Tears the native context down.
    ///
    /// Tracked references are abandoned without running their disposal operations, since no
    /// native call is valid anymore. Resources disposed afterwards skip the native layer.
    pub fn dispose(&self) -> Result<(), GlError> {
        if self.is_disposed() {
            return Ok(());
        }
        self.inner.affinity.check()?;
        let mut state = self.inner.state.lock()?;
        if self.inner.disposed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let abandoned = state.tracker.abandon();
        if let Err(err) = state.native.check() {
            warn!("Pending native error while disposing {}: {err}", self.inner.id);
        }
        state.native.api.destroy_context();
        drop(state);
        self.inner.affinity.release()?;
        info!(abandoned, "Disposed {}", self.inner.id);
        Ok(())
    }
}

impl Disposable for Context {
    fn dispose(&mut self) -> Result<(), GlError> {
        Context::dispose(self)
    }

    fn is_disposed(&self) -> bool {
        Context::is_disposed(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NativeErrorCode;
    use crate::headless::{HeadlessDevice, NativeCall};

    fn h(raw: u32) -> NativeHandle {
        NativeHandle::from_raw(raw)
    }

    #[test]
    fn builds_current_on_calling_thread() {
        let context = Context::new(HeadlessDevice::new()).unwrap();
        assert!(context.is_current());
        assert_eq!(
            context.state_cache().unwrap().texture_units(),
            HeadlessDevice::DEFAULT_TEXTURE_UNITS
        );
        context.dispose().unwrap();
        assert!(!context.is_current());
    }

    #[test]
    fn rejects_zero_texture_units() {
        let result = Context::new(HeadlessDevice::with_texture_units(0));
        assert!(matches!(result, Err(GlError::InvalidTextureUnitCount)));
    }

    #[test]
    fn one_context_per_thread() {
        let first = Context::new(HeadlessDevice::new()).unwrap();
        let second = Context::new(HeadlessDevice::new());
        assert!(matches!(second, Err(GlError::ThreadHasContext)));
        first.dispose().unwrap();
        let third = Context::new(HeadlessDevice::new()).unwrap();
        third.dispose().unwrap();
    }

    #[test]
    fn allocation_failure_is_reported() {
        let device = HeadlessDevice::new();
        let probe = device.probe();
        let context = Context::new(device).unwrap();
        probe.fail_next_create();
        let err = context.create_handle(ResourceKind::Texture).unwrap_err();
        assert!(matches!(err, GlError::AllocationFailed(ResourceKind::Texture)));
        assert!(!context.create_handle(ResourceKind::Texture).unwrap().is_null());
        context.dispose().unwrap();
    }

    #[test]
    fn redundant_binds_are_elided() {
        let device = HeadlessDevice::new();
        let probe = device.probe();
        let context = Context::new(device).unwrap();

        assert!(context.use_program(h(1)).unwrap());
        assert!(!context.use_program(h(1)).unwrap());
        assert!(context.bind_vertex_array(h(2)).unwrap());
        assert!(!context.bind_vertex_array(h(2)).unwrap());
        assert!(!context.active_texture(TextureUnit(0)).unwrap());
        assert!(context.bind_texture_unit(TextureUnit(3), TextureTarget::Texture2D, h(4)).unwrap());
        assert!(!context.bind_texture_unit(TextureUnit(3), TextureTarget::Texture2D, h(4)).unwrap());
        assert!(context.bind_framebuffer(FramebufferTarget::Both, h(5)).unwrap());
        assert!(!context.bind_framebuffer(FramebufferTarget::Read, h(5)).unwrap());
        assert!(context.bind_default_framebuffer(FramebufferTarget::Draw).unwrap());

        assert_eq!(
            probe.calls(),
            vec![
                NativeCall::UseProgram(1),
                NativeCall::BindVertexArray(2),
                NativeCall::ActiveTexture(TextureUnit(3)),
                NativeCall::BindTexture(TextureTarget::Texture2D, 4),
                NativeCall::BindFramebuffer(FramebufferTarget::Both, 5),
                NativeCall::BindFramebuffer(FramebufferTarget::Draw, 0),
            ]
        );
        assert_eq!(probe.bind_count(), 6);
        assert!(probe.calls().iter().all(NativeCall::is_bind));
        context.dispose().unwrap();
    }

    #[test]
    fn deleting_bound_handle_clears_cache() {
        let device = HeadlessDevice::new();
        let probe = device.probe();
        let context = Context::new(device).unwrap();

        let program = context.create_handle(ResourceKind::Program).unwrap();
        assert!(context.use_program(program).unwrap());
        context.delete_handle(ResourceKind::Program, program).unwrap();
        assert!(context.state_cache().unwrap().program().is_null());

        let reused = context.create_handle(ResourceKind::Program).unwrap();
        assert_eq!(reused, program);
        assert!(context.use_program(reused).unwrap());
        assert_eq!(probe.count(|call| matches!(call, NativeCall::UseProgram(_))), 2);
        context.dispose().unwrap();
    }

    #[test]
    fn native_errors_surface_from_binds_when_checked() {
        let device = HeadlessDevice::new();
        let probe = device.probe();
        let context = Context::new(device).unwrap();
        probe.push_error(NativeErrorCode::InvalidOperation);
        let err = context.use_program(h(9)).unwrap_err();
        assert!(matches!(err, GlError::Native(NativeErrorCode::InvalidOperation)));
        context.dispose().unwrap();

        let device = HeadlessDevice::new();
        let probe = device.probe();
        let context = Context::builder().check_errors(false).build(device).unwrap();
        probe.push_error(NativeErrorCode::InvalidOperation);
        assert!(context.use_program(h(9)).unwrap());
        context.dispose().unwrap();
    }

    #[test]
    fn native_delete_failure_is_swallowed() {
        let device = HeadlessDevice::new();
        let probe = device.probe();
        let context = Context::new(device).unwrap();
        let buffer = context.create_handle(ResourceKind::Buffer).unwrap();
        probe.fail_delete_of(buffer.raw());
        context.delete_handle(ResourceKind::Buffer, buffer).unwrap();
        context.delete_handle(ResourceKind::Buffer, NativeHandle::NULL).unwrap();
        assert_eq!(probe.delete_count(), 1);
        context.dispose().unwrap();
    }

    #[test]
    fn use_from_other_thread_is_rejected() {
        let context = Context::new(HeadlessDevice::new()).unwrap();
        let remote = context.clone();
        let (bind, sweep, dispose) = std::thread::spawn(move || {
            (
                remote.use_program(h(1)),
                remote.run_sweep().map(|_| ()),
                remote.dispose(),
            )
        })
        .join()
        .unwrap();
        assert!(matches!(bind, Err(GlError::WrongThread { .. })));
        assert!(matches!(sweep, Err(GlError::WrongThread { .. })));
        assert!(matches!(dispose, Err(GlError::WrongThread { .. })));
        assert!(!context.is_disposed());
        context.dispose().unwrap();
    }

    #[test]
    fn context_moves_between_threads_after_release() {
        let context = Context::new(HeadlessDevice::new()).unwrap();
        context.release_current().unwrap();
        assert!(matches!(context.use_program(h(1)), Err(GlError::NotCurrent)));

        let remote = context.clone();
        std::thread::spawn(move || {
            remote.make_current().unwrap();
            assert!(remote.use_program(h(1)).unwrap());
            remote.release_current().unwrap();
        })
        .join()
        .unwrap();

        context.make_current().unwrap();
        assert!(!context.use_program(h(1)).unwrap());
        context.dispose().unwrap();
    }

    #[test]
    fn undisposed_context_dropped_elsewhere_frees_its_thread() {
        let context = Context::new(HeadlessDevice::new()).unwrap();
        std::thread::spawn(move || drop(context)).join().unwrap();
        let next = Context::new(HeadlessDevice::new()).unwrap();
        next.dispose().unwrap();
    }

    #[test]
    fn disposed_context_rejects_work() {
        let device = HeadlessDevice::new();
        let probe = device.probe();
        let context = Context::new(device).unwrap();
        context.dispose().unwrap();
        context.dispose().unwrap();
        assert!(probe.is_destroyed());
        assert!(matches!(context.use_program(h(1)), Err(GlError::ContextDisposed)));
        assert!(matches!(context.run_sweep(), Err(GlError::ContextDisposed)));
        assert!(matches!(context.make_current(), Err(GlError::ContextDisposed)));
        assert_eq!(probe.count(|call| *call == NativeCall::DestroyContext), 1);
    }
}
