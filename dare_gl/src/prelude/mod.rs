pub use crate::collector::{CollectionCounter, FinalizationCounter, ManualCollector};
pub use crate::context::{Context, ContextBuilder, ContextConfig};
pub use crate::error::GlError;
pub use crate::handle::{
    FramebufferTarget, NativeHandle, ResourceKind, ShaderStage, TextureTarget, TextureUnit,
};
pub use crate::native::NativeApi;
pub use crate::resource::{DisposeAction, LifecycleState, OwnedResource, SweepReport};
pub use crate::traits::Disposable;
pub use crate::util::DisposalStack;
