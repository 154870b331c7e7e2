pub mod collector;
pub mod context;
pub mod error;
#[cfg(feature = "gl")]
pub mod gl_backend;
pub mod handle;
pub mod headless;
pub mod native;
pub mod prelude;
pub mod resource;
pub mod traits;
pub mod util;

pub use context::{Context, ContextBuilder, ContextConfig};
pub use error::GlError;
pub use handle::{NativeHandle, ResourceKind};
pub use resource::OwnedResource;

// Re-exports
#[cfg(feature = "gl")]
pub use gl;
