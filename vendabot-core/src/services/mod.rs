// vendabot-core/src/services/mod.rs

pub mod ai_pipeline;
pub mod intake;
pub mod intent;
pub mod reply;
pub mod sanitize;
