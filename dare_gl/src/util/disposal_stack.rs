use tracing::error;

use crate::error::GlError;
use crate::traits::Disposable;

type DisposeTask<'a> = Box<dyn FnOnce() -> Result<(), GlError> + 'a>;

/// A stack which is used to dispose resources in reverse creation order
#[derive(Default)]
pub struct DisposalStack<'a> {
    stack: Vec<DisposeTask<'a>>,
}

impl<'a> DisposalStack<'a> {
    pub fn new() -> Self {
        Self { stack: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.stack.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    pub fn push<T>(&mut self, func: T)
    where
        T: FnOnce() -> Result<(), GlError> + 'a,
    {
        self.stack.push(Box::new(func));
    }

    /// Takes ownership of `resource` and disposes it on flush
    pub fn push_resource<T: Disposable + 'a>(&mut self, mut resource: T) {
        self.push(move || resource.dispose());
    }

    pub fn push_resources<T: Disposable + 'a>(&mut self, resources: Vec<T>) {
        let mut resources = resources;
        self.push(move || {
            let mut first_error = None;
            while let Some(mut resource) = resources.pop() {
                if let Err(err) = resource.dispose() {
                    first_error.get_or_insert(err);
                }
            }
            first_error.map_or(Ok(()), Err)
        });
    }

    /// Runs every entry, last pushed first. A failing entry does not stop the others; the
    /// first error is returned once the stack is empty.
    pub fn flush(&mut self) -> Result<(), GlError> {
        let mut first_error = None;
        while let Some(element) = self.stack.pop() {
            if let Err(err) = element() {
                error!("Disposal stack entry failed: {err}");
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

impl Drop for DisposalStack<'_> {
    fn drop(&mut self) {
        if !self.stack.is_empty() {
            error!("Dropped a disposal stack with {} pending entries", self.stack.len());
        }
    }
}
