use crate::error::NativeErrorCode;
use crate::handle::{FramebufferTarget, RawHandle, ResourceKind, TextureTarget, TextureUnit};

/// The raw entry points of a stateful, handle based graphics API.
///
/// Implementations issue exactly one native call per method and keep no binding state of
/// their own; redundancy elimination lives in [`crate::context::StateCache`]. Every method is
/// only ever invoked from the thread the owning [`crate::Context`] is current on.
pub trait NativeApi: Send {
    /// Create a native object, returning `0` on failure
    fn create(&mut self, kind: ResourceKind) -> RawHandle;

    /// Delete a native object. Never called twice for the same live handle.
    fn delete(&mut self, kind: ResourceKind, handle: RawHandle);

    fn use_program(&mut self, handle: RawHandle);

    fn bind_vertex_array(&mut self, handle: RawHandle);

    fn active_texture(&mut self, unit: TextureUnit);

    fn bind_texture(&mut self, target: TextureTarget, handle: RawHandle);

    fn bind_framebuffer(&mut self, target: FramebufferTarget, handle: RawHandle);

    /// Number of texture image units available to fragment shaders
    fn max_texture_units(&self) -> u32;

    /// Pops the oldest pending error, if any
    fn take_error(&mut self) -> Option<NativeErrorCode>;

    /// Tears down the native context itself. Called once.
    fn destroy_context(&mut self) {}
}
