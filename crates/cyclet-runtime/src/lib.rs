#![doc = "Cyclic timer runtime: runs an action repeatedly on a background thread."]

pub mod action;
pub mod timer;

pub use action::TimerAction;
pub use cyclet_common::INFINITE;
pub use timer::{CyclicTimer, TimerBuilder, TimerHandle};
