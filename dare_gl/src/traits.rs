use crate::error::GlError;

/// Describes native resources which must be released explicitly
pub trait Disposable {
    /// Release the resource. Calling this on an already disposed resource does nothing.
    fn dispose(&mut self) -> Result<(), GlError>;

    fn is_disposed(&self) -> bool;
}
