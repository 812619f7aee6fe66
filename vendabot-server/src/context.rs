// vendabot-server/src/context.rs
//
// Builds the whole object graph. Every secret and endpoint arrives here as
// explicit configuration; nothing reads ambient state below this point.

use std::sync::Arc;

use vendabot_ai::GeminiClient;
use vendabot_core::auth::TokenManager;
use vendabot_core::crypto::Encryptor;
use vendabot_core::platforms::marketplace::MercadoClient;
use vendabot_core::platforms::whatsapp::EvolutionClient;
use vendabot_core::repositories::{
    PostgresQuestionLogRepository, PostgresTenantConnectionRepository,
};
use vendabot_core::services::ai_pipeline::AiPipeline;
use vendabot_core::services::intake::IntakeService;
use vendabot_core::services::intent::IntentClassifier;
use vendabot_core::services::reply::ReplyService;
use vendabot_core::tasks::{Sweeper, TimeoutEscalator};
use vendabot_core::Database;

#[derive(Debug, Clone)]
pub struct Config {
    pub encryption_key: String,
    pub marketplace_base_url: String,
    pub marketplace_token_url: String,
    pub marketplace_app_id: String,
    pub marketplace_app_secret: String,
    pub messaging_base_url: String,
    pub messaging_instance: String,
    pub messaging_api_key: String,
    pub llm_api_key: String,
    pub llm_model: String,
    pub timeout_minutes: i64,
}

pub struct AppContext {
    pub intake: Arc<IntakeService>,
    pub reply: Arc<ReplyService>,
    pub sweeper: Arc<Sweeper>,
}

impl AppContext {
    pub fn build(db: &Database, config: &Config) -> anyhow::Result<Self> {
        let encryptor = Encryptor::from_base64_key(&config.encryption_key)?;

        let questions = Arc::new(PostgresQuestionLogRepository::new(db.pool().clone()));
        let connections = Arc::new(PostgresTenantConnectionRepository::new(
            db.pool().clone(),
            encryptor,
        ));

        let marketplace = Arc::new(MercadoClient::new(
            &config.marketplace_base_url,
            &config.marketplace_token_url,
            &config.marketplace_app_id,
            &config.marketplace_app_secret,
        )?);
        let messenger = Arc::new(EvolutionClient::new(
            &config.messaging_base_url,
            &config.messaging_instance,
            &config.messaging_api_key,
        )?);
        let llm = Arc::new(GeminiClient::new(&config.llm_api_key, &config.llm_model)?);

        let tokens = Arc::new(TokenManager::new(connections.clone(), marketplace.clone()));

        let intake = Arc::new(IntakeService::new(
            questions.clone(),
            connections.clone(),
            marketplace.clone(),
            messenger.clone(),
            tokens.clone(),
            config.timeout_minutes,
        ));
        let pipeline = Arc::new(AiPipeline::new(
            questions.clone(),
            connections.clone(),
            marketplace.clone(),
            messenger.clone(),
            tokens.clone(),
            llm.clone(),
        ));
        let reply = Arc::new(ReplyService::new(
            questions.clone(),
            connections.clone(),
            marketplace.clone(),
            messenger.clone(),
            tokens.clone(),
            IntentClassifier::new(llm),
            pipeline.clone(),
        ));
        let escalator = TimeoutEscalator::new(questions, pipeline, config.timeout_minutes);
        let sweeper = Arc::new(Sweeper::new(connections, intake.clone(), escalator));

        Ok(Self {
            intake,
            reply,
            sweeper,
        })
    }
}
