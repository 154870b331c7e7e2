use std::fmt;

/// Raw name of an object owned by the native layer
pub type RawHandle = u32;

/// Opaque identifier of a native-side object.
///
/// `0` is reserved by the native layer as "no object" and is exposed as [`NativeHandle::NULL`].
/// Uniqueness of live handles is guaranteed by the native layer, not by this crate.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NativeHandle(RawHandle);

impl NativeHandle {
    pub const NULL: NativeHandle = NativeHandle(0);

    pub const fn from_raw(raw: RawHandle) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> RawHandle {
        self.0
    }

    pub const fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl From<RawHandle> for NativeHandle {
    fn from(raw: RawHandle) -> Self {
        Self(raw)
    }
}

impl fmt::Display for NativeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
    Geometry,
    Compute,
}

/// Selects which native create/delete entry points apply to a handle
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Buffer,
    Texture,
    Framebuffer,
    Renderbuffer,
    VertexArray,
    Program,
    Shader(ShaderStage),
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceKind::Buffer => f.write_str("buffer"),
            ResourceKind::Texture => f.write_str("texture"),
            ResourceKind::Framebuffer => f.write_str("framebuffer"),
            ResourceKind::Renderbuffer => f.write_str("renderbuffer"),
            ResourceKind::VertexArray => f.write_str("vertex array"),
            ResourceKind::Program => f.write_str("program"),
            ResourceKind::Shader(stage) => write!(f, "{stage:?} shader"),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum TextureTarget {
    Texture2D,
    Texture2DMultisample,
    CubeMap,
}

/// Framebuffer binding points. [`FramebufferTarget::Both`] aliases the read and draw targets.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum FramebufferTarget {
    Read,
    Draw,
    Both,
}

/// Zero based texture unit index (`GL_TEXTURE0 + n`)
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TextureUnit(pub u32);

impl TextureUnit {
    pub const ZERO: TextureUnit = TextureUnit(0);

    pub fn index(self) -> usize {
        self.0 as usize
    }
}
