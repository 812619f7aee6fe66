// vendabot-core/src/repositories/mod.rs

pub mod postgres;

pub use postgres::question_log::{PostgresQuestionLogRepository, QuestionLogRepository};
pub use postgres::tenant_connections::{
    PostgresTenantConnectionRepository, TenantConnectionRepository,
};
