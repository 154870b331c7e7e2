//! [`NativeApi`] over the function pointers loaded by the `gl` crate
use gl::types::{GLenum, GLint, GLuint};

use crate::error::NativeErrorCode;
use crate::handle::{
    FramebufferTarget, RawHandle, ResourceKind, ShaderStage, TextureTarget, TextureUnit,
};
use crate::native::NativeApi;

#[derive(Debug)]
pub struct GlDevice {
    max_texture_units: u32,
}

impl GlDevice {
    /// # Safety
    /// The `gl` function pointers must be loaded and a native context must be current on the
    /// calling thread. Every later call on the device must happen on that thread while the
    /// native context is still alive.
    pub unsafe fn new() -> Self {
        let mut units: GLint = 0;
        gl::GetIntegerv(gl::MAX_TEXTURE_IMAGE_UNITS, &mut units);
        Self {
            max_texture_units: units.max(0) as u32,
        }
    }
}

fn texture_target(target: TextureTarget) -> GLenum {
    match target {
        TextureTarget::Texture2D => gl::TEXTURE_2D,
        TextureTarget::Texture2DMultisample => gl::TEXTURE_2D_MULTISAMPLE,
        TextureTarget::CubeMap => gl::TEXTURE_CUBE_MAP,
    }
}

fn framebuffer_target(target: FramebufferTarget) -> GLenum {
    match target {
        FramebufferTarget::Read => gl::READ_FRAMEBUFFER,
        FramebufferTarget::Draw => gl::DRAW_FRAMEBUFFER,
        FramebufferTarget::Both => gl::FRAMEBUFFER,
    }
}

fn shader_type(stage: ShaderStage) -> GLenum {
    match stage {
        ShaderStage::Vertex => gl::VERTEX_SHADER,
        ShaderStage::Fragment => gl::FRAGMENT_SHADER,
        ShaderStage::Geometry => gl::GEOMETRY_SHADER,
        ShaderStage::Compute => gl::COMPUTE_SHADER,
    }
}

impl NativeApi for GlDevice {
    fn create(&mut self, kind: ResourceKind) -> RawHandle {
        let mut handle: GLuint = 0;
        unsafe {
            match kind {
                ResourceKind::Buffer => gl::GenBuffers(1, &mut handle),
                ResourceKind::Texture => gl::GenTextures(1, &mut handle),
                ResourceKind::Framebuffer => gl::GenFramebuffers(1, &mut handle),
                ResourceKind::Renderbuffer => gl::GenRenderbuffers(1, &mut handle),
                ResourceKind::VertexArray => gl::GenVertexArrays(1, &mut handle),
                ResourceKind::Program => handle = gl::CreateProgram(),
                ResourceKind::Shader(stage) => handle = gl::CreateShader(shader_type(stage)),
            }
        }
        handle
    }

    fn delete(&mut self, kind: ResourceKind, handle: RawHandle) {
        unsafe {
            match kind {
                ResourceKind::Buffer => gl::DeleteBuffers(1, &handle),
                ResourceKind::Texture => gl::DeleteTextures(1, &handle),
                ResourceKind::Framebuffer => gl::DeleteFramebuffers(1, &handle),
                ResourceKind::Renderbuffer => gl::DeleteRenderbuffers(1, &handle),
                ResourceKind::VertexArray => gl::DeleteVertexArrays(1, &handle),
                ResourceKind::Program => gl::DeleteProgram(handle),
                ResourceKind::Shader(_) => gl::DeleteShader(handle),
            }
        }
    }

    fn use_program(&mut self, handle: RawHandle) {
        unsafe { gl::UseProgram(handle) }
    }

    fn bind_vertex_array(&mut self, handle: RawHandle) {
        unsafe { gl::BindVertexArray(handle) }
    }

    fn active_texture(&mut self, unit: TextureUnit) {
        unsafe { gl::ActiveTexture(gl::TEXTURE0 + unit.0) }
    }

    fn bind_texture(&mut self, target: TextureTarget, handle: RawHandle) {
        unsafe { gl::BindTexture(texture_target(target), handle) }
    }

    fn bind_framebuffer(&mut self, target: FramebufferTarget, handle: RawHandle) {
        unsafe { gl::BindFramebuffer(framebuffer_target(target), handle) }
    }

    fn max_texture_units(&self) -> u32 {
        self.max_texture_units
    }

    fn take_error(&mut self) -> Option<NativeErrorCode> {
        match unsafe { gl::GetError() } {
            gl::NO_ERROR => None,
            code => Some(NativeErrorCode::from_raw(code)),
        }
    }
}
