//! Control plane: the finite table of management operations checked before
//! any request falls through to data-plane matching.

mod router;
mod types;

pub use router::{ConnectionDropped, ControlOperation, ControlRouter};
pub use types::PortBinding;
