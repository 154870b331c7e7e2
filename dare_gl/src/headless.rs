//! An in-memory [`NativeApi`] which behaves like a driver without touching a GPU.
//!
//! Handles are allocated per object namespace and freed numbers are handed out again, so code
//! that caches handle values sees the same reuse it would see from a real driver. Every call is
//! recorded and can be inspected through a [`HeadlessProbe`] after the device has been moved
//! into a [`crate::Context`].
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::NativeErrorCode;
use crate::handle::{FramebufferTarget, RawHandle, ResourceKind, TextureTarget, TextureUnit};
use crate::native::NativeApi;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NativeCall {
    Create(ResourceKind, RawHandle),
    Delete(ResourceKind, RawHandle),
    UseProgram(RawHandle),
    BindVertexArray(RawHandle),
    ActiveTexture(TextureUnit),
    BindTexture(TextureTarget, RawHandle),
    BindFramebuffer(FramebufferTarget, RawHandle),
    DestroyContext,
}

impl NativeCall {
    pub fn is_bind(&self) -> bool {
        matches!(
            self,
            NativeCall::UseProgram(_)
                | NativeCall::BindVertexArray(_)
                | NativeCall::ActiveTexture(_)
                | NativeCall::BindTexture(..)
                | NativeCall::BindFramebuffer(..)
        )
    }
}

/// Programs and shaders share one name space, every other kind has its own
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
enum Namespace {
    Buffer,
    Texture,
    Framebuffer,
    Renderbuffer,
    VertexArray,
    ShaderObject,
}

impl From<ResourceKind> for Namespace {
    fn from(kind: ResourceKind) -> Self {
        match kind {
            ResourceKind::Buffer => Namespace::Buffer,
            ResourceKind::Texture => Namespace::Texture,
            ResourceKind::Framebuffer => Namespace::Framebuffer,
            ResourceKind::Renderbuffer => Namespace::Renderbuffer,
            ResourceKind::VertexArray => Namespace::VertexArray,
            ResourceKind::Program | ResourceKind::Shader(_) => Namespace::ShaderObject,
        }
    }
}

#[derive(Debug, Default)]
struct NameAllocator {
    next: RawHandle,
    free: Vec<RawHandle>,
    live: HashSet<RawHandle>,
}

impl NameAllocator {
    fn allocate(&mut self) -> RawHandle {
        let raw = self.free.pop().unwrap_or_else(|| {
            self.next += 1;
            self.next
        });
        self.live.insert(raw);
        raw
    }

    fn free(&mut self, raw: RawHandle) -> bool {
        if self.live.remove(&raw) {
            self.free.push(raw);
            true
        } else {
            false
        }
    }
}

#[derive(Debug)]
struct HeadlessState {
    max_texture_units: u32,
    names: HashMap<Namespace, NameAllocator>,
    calls: Vec<NativeCall>,
    errors: VecDeque<NativeErrorCode>,
    fail_next_create: bool,
    failing_deletes: HashSet<RawHandle>,
    invalid_deletes: usize,
    destroyed: bool,
}

fn lock(state: &Mutex<HeadlessState>) -> MutexGuard<'_, HeadlessState> {
    // a panicking test thread must not hide the log from the others
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Recording implementation of [`NativeApi`]
#[derive(Debug)]
pub struct HeadlessDevice {
    state: Arc<Mutex<HeadlessState>>,
}

/// Shared view into a [`HeadlessDevice`] for inspecting calls and injecting failures
#[derive(Debug, Clone)]
pub struct HeadlessProbe {
    state: Arc<Mutex<HeadlessState>>,
}

impl HeadlessDevice {
    pub const DEFAULT_TEXTURE_UNITS: u32 = 16;

    pub fn new() -> Self {
        Self::with_texture_units(Self::DEFAULT_TEXTURE_UNITS)
    }

    pub fn with_texture_units(max_texture_units: u32) -> Self {
        Self {
            state: Arc::new(Mutex::new(HeadlessState {
                max_texture_units,
                names: HashMap::new(),
                calls: Vec::new(),
                errors: VecDeque::new(),
                fail_next_create: false,
                failing_deletes: HashSet::new(),
                invalid_deletes: 0,
                destroyed: false,
            })),
        }
    }

    pub fn probe(&self) -> HeadlessProbe {
        HeadlessProbe {
            state: self.state.clone(),
        }
    }
}

impl Default for HeadlessDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl NativeApi for HeadlessDevice {
    fn create(&mut self, kind: ResourceKind) -> RawHandle {
        let mut state = lock(&self.state);
        let raw = if std::mem::take(&mut state.fail_next_create) {
            0
        } else {
            state.names.entry(kind.into()).or_default().allocate()
        };
        state.calls.push(NativeCall::Create(kind, raw));
        raw
    }

    fn delete(&mut self, kind: ResourceKind, handle: RawHandle) {
        let mut state = lock(&self.state);
        state.calls.push(NativeCall::Delete(kind, handle));
        if state.failing_deletes.remove(&handle) {
            state.errors.push_back(NativeErrorCode::InvalidOperation);
            return;
        }
        let freed = state.names.entry(kind.into()).or_default().free(handle);
        if !freed {
            state.invalid_deletes += 1;
            state.errors.push_back(NativeErrorCode::InvalidValue);
        }
    }

    fn use_program(&mut self, handle: RawHandle) {
        lock(&self.state).calls.push(NativeCall::UseProgram(handle));
    }

    fn bind_vertex_array(&mut self, handle: RawHandle) {
        lock(&self.state).calls.push(NativeCall::BindVertexArray(handle));
    }

    fn active_texture(&mut self, unit: TextureUnit) {
        lock(&self.state).calls.push(NativeCall::ActiveTexture(unit));
    }

    fn bind_texture(&mut self, target: TextureTarget, handle: RawHandle) {
        lock(&self.state).calls.push(NativeCall::BindTexture(target, handle));
    }

    fn bind_framebuffer(&mut self, target: FramebufferTarget, handle: RawHandle) {
        lock(&self.state).calls.push(NativeCall::BindFramebuffer(target, handle));
    }

    fn max_texture_units(&self) -> u32 {
        lock(&self.state).max_texture_units
    }

    fn take_error(&mut self) -> Option<NativeErrorCode> {
        lock(&self.state).errors.pop_front()
    }

    fn destroy_context(&mut self) {
        let mut state = lock(&self.state);
        state.destroyed = true;
        state.calls.push(NativeCall::DestroyContext);
    }
}

impl HeadlessProbe {
    /// Every call issued so far, in order
    pub fn calls(&self) -> Vec<NativeCall> {
        lock(&self.state).calls.clone()
    }

    pub fn count(&self, predicate: impl Fn(&NativeCall) -> bool) -> usize {
        lock(&self.state).calls.iter().filter(|call| predicate(call)).count()
    }

    pub fn delete_count(&self) -> usize {
        self.count(|call| matches!(call, NativeCall::Delete(..)))
    }

    pub fn deletes_of(&self, handle: RawHandle) -> usize {
        self.count(|call| matches!(call, NativeCall::Delete(_, raw) if *raw == handle))
    }

    pub fn bind_count(&self) -> usize {
        self.count(NativeCall::is_bind)
    }

    /// Number of deletes issued for handles that were not live
    pub fn invalid_deletes(&self) -> usize {
        lock(&self.state).invalid_deletes
    }

    pub fn live_handles(&self) -> usize {
        lock(&self.state).names.values().map(|names| names.live.len()).sum()
    }

    pub fn is_destroyed(&self) -> bool {
        lock(&self.state).destroyed
    }

    pub fn clear_calls(&self) {
        lock(&self.state).calls.clear();
    }

    /// The next `create` returns the null handle
    pub fn fail_next_create(&self) {
        lock(&self.state).fail_next_create = true;
    }

    /// The next `delete` of `handle` raises an error and leaves the handle live
    pub fn fail_delete_of(&self, handle: RawHandle) {
        lock(&self.state).failing_deletes.insert(handle);
    }

    /// Queues an error as if some untracked call had failed
    pub fn push_error(&self, code: NativeErrorCode) {
        lock(&self.state).errors.push_back(code);
    }
}
