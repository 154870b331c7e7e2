use crate::error::GlError;
use crate::handle::{FramebufferTarget, NativeHandle, ResourceKind, TextureUnit};

/// What the context believes is currently bound on the native side.
///
/// Every `set_*` method updates the slot and returns `true` when the native bind call still
/// has to be issued, or `false` when the slot already held the requested handle. The cache is
/// only correct as long as every binding goes through it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateCache {
    program: NativeHandle,
    vertex_array: NativeHandle,
    textures: Box<[NativeHandle]>,
    active_unit: TextureUnit,
    read_framebuffer: NativeHandle,
    draw_framebuffer: NativeHandle,
}

impl StateCache {
    pub fn new(texture_units: u32) -> Self {
        Self {
            program: NativeHandle::NULL,
            vertex_array: NativeHandle::NULL,
            textures: vec![NativeHandle::NULL; texture_units as usize].into_boxed_slice(),
            active_unit: TextureUnit::ZERO,
            read_framebuffer: NativeHandle::NULL,
            draw_framebuffer: NativeHandle::NULL,
        }
    }

    pub fn texture_units(&self) -> u32 {
        self.textures.len() as u32
    }

    pub fn program(&self) -> NativeHandle {
        self.program
    }

    pub fn vertex_array(&self) -> NativeHandle {
        self.vertex_array
    }

    pub fn active_unit(&self) -> TextureUnit {
        self.active_unit
    }

    pub fn texture(&self, unit: TextureUnit) -> Option<NativeHandle> {
        self.textures.get(unit.index()).copied()
    }

    pub fn read_framebuffer(&self) -> NativeHandle {
        self.read_framebuffer
    }

    pub fn draw_framebuffer(&self) -> NativeHandle {
        self.draw_framebuffer
    }

    pub fn set_program(&mut self, handle: NativeHandle) -> bool {
        replace_slot(&mut self.program, handle)
    }

    pub fn set_vertex_array(&mut self, handle: NativeHandle) -> bool {
        replace_slot(&mut self.vertex_array, handle)
    }

    pub fn set_active_unit(&mut self, unit: TextureUnit) -> Result<bool, GlError> {
        if unit.index() >= self.textures.len() {
            return Err(GlError::TextureUnitOutOfRange {
                unit: unit.0,
                max: self.texture_units(),
            });
        }
        if self.active_unit == unit {
            return Ok(false);
        }
        self.active_unit = unit;
        Ok(true)
    }

    /// Binds into the active unit
    pub fn set_texture(&mut self, handle: NativeHandle) -> bool {
        let slot = &mut self.textures[self.active_unit.index()];
        replace_slot(slot, handle)
    }

    /// [`FramebufferTarget::Both`] only hits when both slots already hold `handle`
    pub fn set_framebuffer(&mut self, target: FramebufferTarget, handle: NativeHandle) -> bool {
        match target {
            FramebufferTarget::Read => replace_slot(&mut self.read_framebuffer, handle),
            FramebufferTarget::Draw => replace_slot(&mut self.draw_framebuffer, handle),
            FramebufferTarget::Both => {
                if self.read_framebuffer == handle && self.draw_framebuffer == handle {
                    return false;
                }
                self.read_framebuffer = handle;
                self.draw_framebuffer = handle;
                true
            }
        }
    }

    /// Clears every slot of `kind` holding `handle`. Must be called whenever a handle is deleted,
    /// since the native layer is free to hand the same number out again.
    pub fn forget(&mut self, kind: ResourceKind, handle: NativeHandle) {
        if handle.is_null() {
            return;
        }
        match kind {
            ResourceKind::Program => clear_if(&mut self.program, handle),
            ResourceKind::VertexArray => clear_if(&mut self.vertex_array, handle),
            ResourceKind::Texture => self
                .textures
                .iter_mut()
                .for_each(|slot| clear_if(slot, handle)),
            ResourceKind::Framebuffer => {
                clear_if(&mut self.read_framebuffer, handle);
                clear_if(&mut self.draw_framebuffer, handle);
            }
            ResourceKind::Buffer | ResourceKind::Renderbuffer | ResourceKind::Shader(_) => {}
        }
    }
}

fn replace_slot(slot: &mut NativeHandle, handle: NativeHandle) -> bool {
    if *slot == handle {
        return false;
    }
    *slot = handle;
    true
}

fn clear_if(slot: &mut NativeHandle, handle: NativeHandle) {
    if *slot == handle {
        *slot = NativeHandle::NULL;
    }
}
