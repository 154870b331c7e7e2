use std::fmt;
use std::sync::PoisonError;
use std::thread::ThreadId;

use crate::handle::{NativeHandle, ResourceKind};
/// Possible errors
use thiserror::Error;

/// Error codes reported by the native layer after a call
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum NativeErrorCode {
    InvalidEnum,
    InvalidValue,
    InvalidOperation,
    InvalidFramebufferOperation,
    OutOfMemory,
    StackUnderflow,
    StackOverflow,
    Other(u32),
}

impl NativeErrorCode {
    /// Maps a raw `glGetError` value
    pub fn from_raw(raw: u32) -> Self {
        match raw {
            0x0500 => NativeErrorCode::InvalidEnum,
            0x0501 => NativeErrorCode::InvalidValue,
            0x0502 => NativeErrorCode::InvalidOperation,
            0x0503 => NativeErrorCode::StackOverflow,
            0x0504 => NativeErrorCode::StackUnderflow,
            0x0505 => NativeErrorCode::OutOfMemory,
            0x0506 => NativeErrorCode::InvalidFramebufferOperation,
            other => NativeErrorCode::Other(other),
        }
    }
}

impl fmt::Display for NativeErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NativeErrorCode::Other(code) => write!(f, "native error 0x{code:04X}"),
            code => write!(f, "{code:?}"),
        }
    }
}

#[derive(Debug, Error)]
pub enum GlError {
    #[error("Native layer returned the null handle when creating a {0}")]
    AllocationFailed(ResourceKind),

    #[error("Expected a non-null native handle")]
    InvalidHandle,

    #[error("Resource has already been initialized")]
    AlreadyInitialized,

    #[error("Resource has not been initialized with a native handle")]
    NotInitialized,

    #[error("Resource has already been disposed")]
    ResourceDisposed,

    #[error("Context has already been disposed")]
    ContextDisposed,

    #[error("Context is not current on any thread")]
    NotCurrent,

    #[error("Context is current on thread {owner:?}, but was used from thread {caller:?}")]
    WrongThread { owner: ThreadId, caller: ThreadId },

    #[error("Another context is already current on this thread")]
    ThreadHasContext,

    #[error("Texture unit {unit} is out of range, the context has {max} units")]
    TextureUnitOutOfRange { unit: u32, max: u32 },

    #[error("Native layer reported zero texture units")]
    InvalidTextureUnitCount,

    #[error("Native call failed: {0}")]
    Native(NativeErrorCode),

    #[error("Failed to dispose {kind} {handle}")]
    DisposalFailed {
        kind: ResourceKind,
        handle: NativeHandle,
        #[source]
        source: anyhow::Error,
    },

    #[error("Poisoned mutex")]
    PoisonError,
}

impl GlError {
    /// Protocol violations are programmer errors and are never retried
    pub fn is_protocol_violation(&self) -> bool {
        matches!(
            self,
            GlError::InvalidHandle
                | GlError::AlreadyInitialized
                | GlError::NotInitialized
                | GlError::ResourceDisposed
                | GlError::ContextDisposed
                | GlError::NotCurrent
                | GlError::WrongThread { .. }
                | GlError::ThreadHasContext
                | GlError::TextureUnitOutOfRange { .. }
        )
    }
}

impl<T> From<PoisonError<T>> for GlError {
    fn from(_: PoisonError<T>) -> Self {
        GlError::PoisonError
    }
}

impl From<NativeErrorCode> for GlError {
    fn from(code: NativeErrorCode) -> Self {
        GlError::Native(code)
    }
}
