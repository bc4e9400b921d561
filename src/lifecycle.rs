//! Model lifecycle state machine
//!
//! Pure transitions over [`LifecycleSnapshot`] produce effects; the
//! [`ModelManager`] executes them and owns the live engine handle.

mod effect;
pub mod event;
mod manager;
pub mod state;
pub(crate) mod transition;


pub use effect::Effect;
pub use event::LifecycleEvent;
pub use manager::{EngineLease, ModelManager};
pub use state::{LifecycleSnapshot, ModelState};
pub use transition::{transition, TransitionError};
