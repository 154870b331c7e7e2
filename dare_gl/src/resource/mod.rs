pub mod owned;
pub mod reference;
pub mod tracker;

pub use owned::{LifecycleState, OwnedResource};
pub use reference::{DisposeAction, DisposeFn, ReferenceId, ResourceReference};
pub use tracker::{DisposalFailure, LeakReport, ResourceTracker, SweepReport};
