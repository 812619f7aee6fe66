// tests/reply_tests.rs

mod common;

use chrono::{Duration, Utc};
use std::sync::Arc;

use common::{
    fixture_connection, fixture_question_detail, fixture_record, fixture_tenant,
    InMemoryQuestionLog, MockConnections, MockLlm, MockMarketplace, MockMessenger,
};
use vendabot_core::auth::TokenManager;
use vendabot_core::models::QuestionStatus;
use vendabot_core::services::ai_pipeline::AiPipeline;
use vendabot_core::services::intent::IntentClassifier;
use vendabot_core::services::reply::{InboundReply, ReplyService};

const JID: &str = "5511999990000@s.whatsapp.net";

struct World {
    questions: Arc<InMemoryQuestionLog>,
    marketplace: Arc<MockMarketplace>,
    messenger: Arc<MockMessenger>,
    llm: Arc<MockLlm>,
    reply: ReplyService,
}

fn build() -> World {
    let questions = Arc::new(InMemoryQuestionLog::new());
    let connections = Arc::new(MockConnections::new());
    let marketplace = Arc::new(MockMarketplace::new());
    let messenger = Arc::new(MockMessenger::new());
    let llm = Arc::new(MockLlm::new());

    let tenant = fixture_tenant(Some(JID));
    let conn = fixture_connection(tenant.tenant_id, Duration::hours(2));
    connections.seed(conn, tenant);

    let tokens = Arc::new(TokenManager::new(connections.clone(), marketplace.clone()));
    let pipeline = Arc::new(AiPipeline::new(
        questions.clone(),
        connections.clone(),
        marketplace.clone(),
        messenger.clone(),
        tokens.clone(),
        llm.clone(),
    ));
    let reply = ReplyService::new(
        questions.clone(),
        connections.clone(),
        marketplace.clone(),
        messenger.clone(),
        tokens,
        IntentClassifier::new(llm.clone()),
        pipeline,
    );
    World {
        questions,
        marketplace,
        messenger,
        llm,
        reply,
    }
}

fn inbound(text: &str, quoted: Option<&str>) -> InboundReply {
    InboundReply {
        sender: "5511888880000@s.whatsapp.net".into(),
        text: text.into(),
        quoted_message_id: quoted.map(str::to_string),
        from_me: false,
    }
}

fn seed_awaiting(world: &World, question_id: i64) {
    world.questions.seed(fixture_record(
        question_id,
        QuestionStatus::AwaitingReply,
        Some(Utc::now() - Duration::minutes(5)),
    ));
}

#[tokio::test]
async fn own_messages_are_ignored() {
    let world = build();
    seed_awaiting(&world, 123);
    let mut reply = inbound("qualquer coisa", Some("NOTIF-123"));
    reply.from_me = true;

    world.reply.handle_reply(&reply).await.unwrap();

    assert_eq!(world.questions.status_of(123), Some(QuestionStatus::AwaitingReply));
    assert!(world.messenger.sent_messages().is_empty());
}

#[tokio::test]
async fn uncorrelated_reply_is_ignored() {
    let world = build();
    seed_awaiting(&world, 123);

    world
        .reply
        .handle_reply(&inbound("texto solto", None))
        .await
        .unwrap();
    world
        .reply
        .handle_reply(&inbound("resposta", Some("NOTIF-DESCONHECIDO")))
        .await
        .unwrap();

    assert_eq!(world.questions.status_of(123), Some(QuestionStatus::AwaitingReply));
    assert!(world.messenger.sent_messages().is_empty());
}

#[tokio::test]
async fn reply_after_escalation_gets_informational_notice_only() {
    let world = build();
    world.questions.seed(fixture_record(
        123,
        QuestionStatus::AiProcessing,
        Some(Utc::now() - Duration::hours(1)),
    ));

    world
        .reply
        .handle_reply(&inbound("verde, tamanho M", Some("NOTIF-123")))
        .await
        .unwrap();

    assert_eq!(world.questions.status_of(123), Some(QuestionStatus::AiProcessing));
    let sent = world.messenger.sent_messages();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, JID);
    assert!(sent[0].1.contains("já foi tratada"));
    assert!(world.llm.recorded_requests().is_empty());
}

#[tokio::test]
async fn sentinel_reply_triggers_ai_resolution() {
    let world = build();
    seed_awaiting(&world, 123);
    world
        .marketplace
        .seed_question(fixture_question_detail(123, "UNANSWERED"));
    world
        .llm
        .script(r#"{"answer": "Sim, serve.", "requires_external_search": false}"#);

    world
        .reply
        .handle_reply(&inbound("2", Some("NOTIF-123")))
        .await
        .unwrap();

    assert_eq!(world.questions.status_of(123), Some(QuestionStatus::AiAnswered));
    assert_eq!(
        world.marketplace.posted_answers(),
        vec![(123, "Sim, serve.".to_string())]
    );
}

#[tokio::test]
async fn manual_answer_is_posted_and_acknowledged() {
    let world = build();
    seed_awaiting(&world, 123);
    world.llm.script(
        r#"{"intent": "MANUAL_ANSWER", "cleaned_text": "Sim, encaixe direto no G6."}"#,
    );

    world
        .reply
        .handle_reply(&inbound("pode responder: sim, encaixe direto no G6", Some("NOTIF-123")))
        .await
        .unwrap();

    let record = world.questions.record(123).unwrap();
    assert_eq!(record.status, QuestionStatus::HumanAnsweredViaChannel);
    assert!(record.human_answered_at.is_some());
    assert_eq!(
        world.marketplace.posted_answers(),
        vec![(123, "Sim, encaixe direto no G6.".to_string())]
    );
    let sent = world.messenger.sent_messages();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].1.contains("publicada com sucesso"));
}

#[tokio::test]
async fn manual_answer_post_failure_marks_error_and_notifies() {
    let world = build();
    seed_awaiting(&world, 123);
    world.llm.script(r#"{"intent": "MANUAL_ANSWER", "cleaned_text": "Sim."}"#);
    world
        .marketplace
        .post_fails
        .store(true, std::sync::atomic::Ordering::SeqCst);

    world
        .reply
        .handle_reply(&inbound("sim", Some("NOTIF-123")))
        .await
        .unwrap();

    let record = world.questions.record(123).unwrap();
    assert_eq!(record.status, QuestionStatus::Error);
    assert!(record.error_message.is_some());
    let sent = world.messenger.sent_messages();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].1.contains("Falha ao publicar"));
    assert!(sent[0].1.contains("responda diretamente pelo site do marketplace"));
}

#[tokio::test]
async fn classifier_failure_fails_closed_to_clarification() {
    let world = build();
    seed_awaiting(&world, 123);
    world.llm.script_failure("gateway unreachable");

    world
        .reply
        .handle_reply(&inbound("mensagem ambígua", Some("NOTIF-123")))
        .await
        .unwrap();

    assert_eq!(world.questions.status_of(123), Some(QuestionStatus::AwaitingReply));
    let sent = world.messenger.sent_messages();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].1.contains("Não entendi"));
    assert!(world.marketplace.posted_answers().is_empty());
}
