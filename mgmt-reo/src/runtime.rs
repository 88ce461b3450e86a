//! Runtime services: time source and timer thread.

pub mod clock;
pub(crate) mod timers;
