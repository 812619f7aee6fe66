// tests/common/mod.rs
//
// Hand-rolled in-memory doubles for the repository and gateway traits. The
// question log double routes every write through merge_patch, the same code
// path the Postgres repository uses.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use uuid::Uuid;

use vendabot_ai::models::GenerateRequest;
use vendabot_ai::LlmGateway;
use vendabot_core::models::{
    merge_patch, QuestionPatch, QuestionRecord, QuestionStatus, Tenant, TenantConnection,
};
use vendabot_core::platforms::marketplace::{
    ItemDetail, MarketplaceApi, QuestionDetail, QuestionSearchPage, TokenGrant,
};
use vendabot_core::platforms::whatsapp::Messenger;
use vendabot_core::repositories::{QuestionLogRepository, TenantConnectionRepository};
use vendabot_core::Error;

// ---------- question log ----------

#[derive(Default)]
pub struct InMemoryQuestionLog {
    rows: DashMap<i64, QuestionRecord>,
}

impl InMemoryQuestionLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(&self, record: QuestionRecord) {
        self.rows.insert(record.question_id, record);
    }

    pub fn status_of(&self, question_id: i64) -> Option<QuestionStatus> {
        self.rows.get(&question_id).map(|r| r.status)
    }

    pub fn record(&self, question_id: i64) -> Option<QuestionRecord> {
        self.rows.get(&question_id).map(|r| r.value().clone())
    }
}

#[async_trait]
impl QuestionLogRepository for InMemoryQuestionLog {
    async fn get(&self, question_id: i64) -> Result<Option<QuestionRecord>, Error> {
        Ok(self.rows.get(&question_id).map(|r| r.value().clone()))
    }

    async fn get_by_notification_id(
        &self,
        message_id: &str,
    ) -> Result<Option<QuestionRecord>, Error> {
        Ok(self
            .rows
            .iter()
            .find(|r| r.notification_message_id.as_deref() == Some(message_id))
            .map(|r| r.value().clone()))
    }

    async fn upsert(&self, patch: &QuestionPatch) -> Result<QuestionRecord, Error> {
        let existing = self.rows.get(&patch.question_id).map(|r| r.value().clone());
        let merged = merge_patch(existing.as_ref(), patch, Utc::now())?;
        self.rows.insert(merged.question_id, merged.clone());
        Ok(merged)
    }

    async fn awaiting_reply_older_than(
        &self,
        seller_id: i64,
        cutoff: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<QuestionRecord>, Error> {
        let mut matched: Vec<QuestionRecord> = self
            .rows
            .iter()
            .filter(|r| {
                r.seller_id == seller_id
                    && r.status == QuestionStatus::AwaitingReply
                    && r.notified_at.is_some_and(|at| at <= cutoff)
            })
            .map(|r| r.value().clone())
            .collect();
        matched.sort_by_key(|r| r.notified_at);
        matched.truncate(limit as usize);
        Ok(matched)
    }
}

// ---------- tenant connections ----------

#[derive(Default)]
pub struct MockConnections {
    entries: DashMap<Uuid, (TenantConnection, Tenant)>,
    pub token_updates: Mutex<Vec<(Uuid, String, Option<String>)>>,
    pub deactivated: Mutex<Vec<Uuid>>,
}

impl MockConnections {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(&self, conn: TenantConnection, tenant: Tenant) {
        self.entries.insert(conn.connection_id, (conn, tenant));
    }

    pub fn is_active(&self, connection_id: Uuid) -> bool {
        self.entries
            .get(&connection_id)
            .map(|e| e.0.is_active)
            .unwrap_or(false)
    }
}

#[async_trait]
impl TenantConnectionRepository for MockConnections {
    async fn active_for_seller(
        &self,
        seller_id: i64,
    ) -> Result<Option<(TenantConnection, Tenant)>, Error> {
        Ok(self
            .entries
            .iter()
            .find(|e| e.0.seller_id == seller_id && e.0.is_active && e.1.is_active)
            .map(|e| e.value().clone()))
    }

    async fn get(&self, connection_id: Uuid) -> Result<Option<TenantConnection>, Error> {
        Ok(self.entries.get(&connection_id).map(|e| e.0.clone()))
    }

    async fn all_active(&self) -> Result<Vec<(TenantConnection, Tenant)>, Error> {
        Ok(self
            .entries
            .iter()
            .filter(|e| e.0.is_active && e.1.is_active)
            .map(|e| e.value().clone())
            .collect())
    }

    async fn update_tokens(
        &self,
        connection_id: Uuid,
        access_token: &str,
        refresh_token: Option<&str>,
        expires_at: DateTime<Utc>,
    ) -> Result<(), Error> {
        if let Some(mut entry) = self.entries.get_mut(&connection_id) {
            entry.0.access_token = access_token.to_string();
            if let Some(refresh) = refresh_token {
                entry.0.refresh_token = refresh.to_string();
            }
            entry.0.token_expires_at = expires_at;
            entry.0.updated_at = Utc::now();
        }
        self.token_updates
            .lock()
            .unwrap()
            .push((
                connection_id,
                access_token.to_string(),
                refresh_token.map(str::to_string),
            ));
        Ok(())
    }

    async fn deactivate(&self, connection_id: Uuid) -> Result<(), Error> {
        if let Some(mut entry) = self.entries.get_mut(&connection_id) {
            entry.0.is_active = false;
        }
        self.deactivated.lock().unwrap().push(connection_id);
        Ok(())
    }
}

// ---------- marketplace ----------

#[derive(Default)]
pub struct MockMarketplace {
    pub questions: DashMap<i64, QuestionDetail>,
    pub items: DashMap<String, ItemDetail>,
    pub descriptions: DashMap<String, String>,
    pub nicknames: DashMap<i64, String>,
    pub search_pages: Mutex<VecDeque<QuestionSearchPage>>,
    pub search_auth_fails: AtomicBool,
    pub posted: Mutex<Vec<(i64, String)>>,
    pub post_fails: AtomicBool,
    pub grant: Mutex<Option<TokenGrant>>,
    pub refresh_fails: AtomicBool,
    pub refresh_calls: AtomicUsize,
}

impl MockMarketplace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed_question(&self, detail: QuestionDetail) {
        self.questions.insert(detail.id, detail);
    }

    pub fn push_search_page(&self, page: QuestionSearchPage) {
        self.search_pages.lock().unwrap().push_back(page);
    }

    pub fn posted_answers(&self) -> Vec<(i64, String)> {
        self.posted.lock().unwrap().clone()
    }
}

#[async_trait]
impl MarketplaceApi for MockMarketplace {
    async fn question(
        &self,
        question_id: i64,
        _access_token: &str,
    ) -> Result<QuestionDetail, Error> {
        self.questions
            .get(&question_id)
            .map(|q| q.value().clone())
            .ok_or_else(|| Error::Marketplace(format!("question {question_id} not found")))
    }

    async fn unanswered_questions(
        &self,
        _seller_id: i64,
        _from: DateTime<Utc>,
        _limit: i64,
        _offset: i64,
        _access_token: &str,
    ) -> Result<QuestionSearchPage, Error> {
        if self.search_auth_fails.load(Ordering::SeqCst) {
            return Err(Error::Auth("search questions: HTTP 401".into()));
        }
        Ok(self
            .search_pages
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(QuestionSearchPage {
                questions: vec![],
                total: 0,
            }))
    }

    async fn item(&self, item_id: &str, _access_token: &str) -> Result<ItemDetail, Error> {
        self.items
            .get(item_id)
            .map(|i| i.value().clone())
            .ok_or_else(|| Error::Marketplace(format!("item {item_id} not found")))
    }

    async fn item_description(
        &self,
        item_id: &str,
        _access_token: &str,
    ) -> Result<Option<String>, Error> {
        Ok(self.descriptions.get(item_id).map(|d| d.value().clone()))
    }

    async fn seller_nickname(
        &self,
        seller_id: i64,
        _access_token: &str,
    ) -> Result<Option<String>, Error> {
        Ok(self.nicknames.get(&seller_id).map(|n| n.value().clone()))
    }

    async fn post_answer(
        &self,
        question_id: i64,
        text: &str,
        _access_token: &str,
    ) -> Result<(), Error> {
        if self.post_fails.load(Ordering::SeqCst) {
            return Err(Error::Marketplace("post answer: HTTP 500: boom".into()));
        }
        self.posted
            .lock()
            .unwrap()
            .push((question_id, text.to_string()));
        Ok(())
    }

    async fn refresh_token(&self, _refresh_token: &str) -> Result<TokenGrant, Error> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        if self.refresh_fails.load(Ordering::SeqCst) {
            return Err(Error::Auth("token refresh rejected: invalid_grant".into()));
        }
        Ok(self
            .grant
            .lock()
            .unwrap()
            .clone()
            .unwrap_or(TokenGrant {
                access_token: "new-access".into(),
                refresh_token: Some("new-refresh".into()),
                expires_in: Some(21_600),
            }))
    }
}

// ---------- messenger ----------

#[derive(Default)]
pub struct MockMessenger {
    pub sent: Mutex<Vec<(String, String)>>,
    pub fail_sends: AtomicBool,
    counter: AtomicUsize,
}

impl MockMessenger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent_messages(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Messenger for MockMessenger {
    async fn send_text(&self, jid: &str, text: &str) -> Result<String, Error> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(Error::Messaging("sendText: HTTP 500".into()));
        }
        self.sent
            .lock()
            .unwrap()
            .push((jid.to_string(), text.to_string()));
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        Ok(format!("WAMID-{n}"))
    }

    async fn send_image(&self, jid: &str, _image_url: &str, caption: &str) -> Result<String, Error> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(Error::Messaging("sendMedia: HTTP 500".into()));
        }
        self.sent
            .lock()
            .unwrap()
            .push((jid.to_string(), caption.to_string()));
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        Ok(format!("WAMID-{n}"))
    }
}

// ---------- LLM ----------

#[derive(Default)]
pub struct MockLlm {
    responses: Mutex<VecDeque<Result<String, String>>>,
    pub requests: Mutex<Vec<GenerateRequest>>,
}

impl MockLlm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(&self, response: &str) {
        self.responses
            .lock()
            .unwrap()
            .push_back(Ok(response.to_string()));
    }

    pub fn script_failure(&self, message: &str) {
        self.responses
            .lock()
            .unwrap()
            .push_back(Err(message.to_string()));
    }

    pub fn recorded_requests(&self) -> Vec<GenerateRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl LlmGateway for MockLlm {
    async fn generate(&self, request: &GenerateRequest) -> anyhow::Result<String> {
        self.requests.lock().unwrap().push(request.clone());
        match self.responses.lock().unwrap().pop_front() {
            Some(Ok(text)) => Ok(text),
            Some(Err(message)) => Err(anyhow::anyhow!("{message}")),
            None => Err(anyhow::anyhow!("no scripted LLM response")),
        }
    }
}

// ---------- fixtures ----------

pub const SELLER_ID: i64 = 777001;

pub fn fixture_tenant(jid: Option<&str>) -> Tenant {
    Tenant {
        tenant_id: Uuid::new_v4(),
        email: "loja@example.com".into(),
        whatsapp_jid: jid.map(str::to_string),
        is_active: true,
    }
}

pub fn fixture_connection(tenant_id: Uuid, expires_in: Duration) -> TenantConnection {
    let now = Utc::now();
    TenantConnection {
        connection_id: Uuid::new_v4(),
        tenant_id,
        seller_id: SELLER_ID,
        access_token: "stored-access".into(),
        refresh_token: "stored-refresh".into(),
        token_expires_at: now + expires_in,
        is_active: true,
        created_at: now,
        updated_at: now,
    }
}

pub fn fixture_question_detail(question_id: i64, status: &str) -> QuestionDetail {
    QuestionDetail {
        id: question_id,
        seller_id: SELLER_ID,
        item_id: Some("MLB42".into()),
        status: status.to_string(),
        text: Some("Serve no Gol G6 2014?".into()),
        date_created: Some(Utc::now()),
    }
}

pub fn fixture_record(
    question_id: i64,
    status: QuestionStatus,
    notified_at: Option<DateTime<Utc>>,
) -> QuestionRecord {
    let now = Utc::now();
    QuestionRecord {
        question_id,
        tenant_id: None,
        seller_id: SELLER_ID,
        item_id: Some("MLB42".into()),
        question_text: Some("Serve no Gol G6 2014?".into()),
        status,
        ai_response_text: None,
        error_message: None,
        notification_message_id: Some(format!("NOTIF-{question_id}")),
        created_at: now,
        notified_at,
        ai_answered_at: None,
        human_answered_at: None,
        last_processed_at: now,
    }
}
