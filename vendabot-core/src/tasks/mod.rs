// vendabot-core/src/tasks/mod.rs

pub mod sweep;

pub use sweep::{spawn_sweep_task, Sweeper, TimeoutEscalator};
