// vendabot-ai/src/lib.rs

pub mod gateway;
pub mod models;

pub use gateway::{GeminiClient, LlmGateway};
pub use models::GenerateRequest;
