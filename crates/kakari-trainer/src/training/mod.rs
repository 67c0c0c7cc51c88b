//! # Training Orchestration
//!
//! An event-driven training loop. The [`Trainer`] fires [`Event`]s at fixed
//! points of every epoch; [`Listener`]s and single-event hooks registered
//! with a priority react to them (progress display, evaluation,
//! checkpointing). [`OptimizerHook`]s adjust each parameter update.

pub mod event;
pub mod hooks;
pub mod listener;
pub mod progress;
mod trainer;

#[cfg(test)]
pub(crate) mod testing;

pub use event::{Event, EventContext, Observation};
pub use hooks::{ExponentialDecayAnnealing, GradientClipping, OptimizerHook, UpdateContext};
pub use listener::{Hook, Listener, Registry, DEFAULT_PRIORITY};
pub use progress::{ProgressListener, PROGRESS_PRIORITY};
pub use trainer::{parameter_count, Trainer};
