use std::cell::RefCell;
use std::sync::{Arc, Mutex, Weak};
use std::thread::{self, ThreadId};

use crate::context::ContextId;
use crate::error::GlError;

/// A thread's claim on a context. The claim lapses on its own once the affinity is dropped,
/// which may happen on any thread.
#[derive(Debug)]
struct CurrentSlot {
    context: ContextId,
    alive: Weak<()>,
}

thread_local! {
    /// The context currently bound to this thread, if any
    static CURRENT: RefCell<Option<CurrentSlot>> = const { RefCell::new(None) };
}

fn current_context() -> Option<ContextId> {
    CURRENT.with(|slot| {
        slot.borrow()
            .as_ref()
            .filter(|current| current.alive.strong_count() > 0)
            .map(|current| current.context)
    })
}

/// Binds a context to at most one thread, and each thread to at most one context.
#[derive(Debug)]
pub struct ThreadAffinity {
    context: ContextId,
    owner: Mutex<Option<ThreadId>>,
    alive: Arc<()>,
}

impl ThreadAffinity {
    pub(crate) fn new(context: ContextId) -> Self {
        Self {
            context,
            owner: Mutex::new(None),
            alive: Arc::new(()),
        }
    }

    /// The thread the context is current on
    pub fn owner(&self) -> Option<ThreadId> {
        self.owner.lock().ok().and_then(|owner| *owner)
    }

    pub fn is_current(&self) -> bool {
        self.owner() == Some(thread::current().id())
    }

    /// Makes the context current on the calling thread
    pub fn acquire(&self) -> Result<(), GlError> {
        let caller = thread::current().id();
        let mut owner = self.owner.lock()?;
        match *owner {
            Some(current) if current == caller => return Ok(()),
            Some(current) => {
                return Err(GlError::WrongThread {
                    owner: current,
                    caller,
                })
            }
            None => {}
        }
        if current_context().is_some_and(|id| id != self.context) {
            return Err(GlError::ThreadHasContext);
        }
        CURRENT.with(|slot| {
            *slot.borrow_mut() = Some(CurrentSlot {
                context: self.context,
                alive: Arc::downgrade(&self.alive),
            })
        });
        *owner = Some(caller);
        Ok(())
    }

    /// Detaches the context from the calling thread, allowing another thread to acquire it
    pub fn release(&self) -> Result<(), GlError> {
        let caller = thread::current().id();
        let mut owner = self.owner.lock()?;
        match *owner {
            None => Ok(()),
            Some(current) if current != caller => Err(GlError::WrongThread {
                owner: current,
                caller,
            }),
            Some(_) => {
                CURRENT.with(|slot| {
                    let mut slot = slot.borrow_mut();
                    if slot.as_ref().is_some_and(|current| current.context == self.context) {
                        *slot = None;
                    }
                });
                *owner = None;
                Ok(())
            }
        }
    }

    /// Guard run by every entry point which may touch the native layer
    pub fn check(&self) -> Result<(), GlError> {
        let caller = thread::current().id();
        match *self.owner.lock()? {
            Some(owner) if owner == caller => Ok(()),
            Some(owner) => Err(GlError::WrongThread { owner, caller }),
            None => Err(GlError::NotCurrent),
        }
    }
}
