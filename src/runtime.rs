//! Event handling runtime: router and detached composition coordinator

pub mod coordinator;
pub mod router;
#[cfg(test)]
pub mod testing;

pub use coordinator::{ComposeCoordinator, SYNTHESIS_OPERATION};
pub use router::{EventRouter, RouterError};
