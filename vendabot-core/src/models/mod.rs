// File: vendabot-core/src/models/mod.rs

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::Error;

/// Error messages persisted on a question row are bounded so a runaway
/// upstream body cannot bloat the log.
pub const MAX_ERROR_MESSAGE_LEN: usize = 250;

/// Processing state of a marketplace question, stored as TEXT.
///
/// The set is closed and every write goes through [`merge_patch`], which
/// rejects transitions not listed in [`QuestionStatus::can_transition_to`].
#[derive(Debug, Serialize, Deserialize, Clone, Copy, Eq, PartialEq, Hash, sqlx::Type)]
#[sqlx(type_name = "TEXT")]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QuestionStatus {
    /// Seen, but the tenant could not be notified (no target configured or
    /// the send failed). No escalation clock is running.
    PendingNotify,
    AwaitingReply,
    AiProcessing,
    AiAnswered,
    AiFailed,
    HumanAnsweredViaChannel,
    HumanAnsweredOnMarketplace,
    Error,
}

impl QuestionStatus {
    /// Answered states accept no further transitions (other than re-asserting
    /// themselves, which idempotent re-processing may do).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            QuestionStatus::AiAnswered
                | QuestionStatus::HumanAnsweredViaChannel
                | QuestionStatus::HumanAnsweredOnMarketplace
        )
    }

    pub fn can_transition_to(&self, next: QuestionStatus) -> bool {
        use QuestionStatus::*;
        if *self == next {
            return true;
        }
        match self {
            PendingNotify => matches!(
                next,
                AwaitingReply | HumanAnsweredOnMarketplace | Error
            ),
            AwaitingReply => matches!(
                next,
                AiProcessing | HumanAnsweredViaChannel | HumanAnsweredOnMarketplace | Error
            ),
            AiProcessing => matches!(
                next,
                AiAnswered | AiFailed | HumanAnsweredOnMarketplace | Error
            ),
            AiFailed => matches!(next, AiProcessing | HumanAnsweredOnMarketplace | Error),
            Error => matches!(
                next,
                AiProcessing | AwaitingReply | HumanAnsweredOnMarketplace
            ),
            AiAnswered | HumanAnsweredViaChannel | HumanAnsweredOnMarketplace => false,
        }
    }
}

impl fmt::Display for QuestionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            QuestionStatus::PendingNotify => "PENDING_NOTIFY",
            QuestionStatus::AwaitingReply => "AWAITING_REPLY",
            QuestionStatus::AiProcessing => "AI_PROCESSING",
            QuestionStatus::AiAnswered => "AI_ANSWERED",
            QuestionStatus::AiFailed => "AI_FAILED",
            QuestionStatus::HumanAnsweredViaChannel => "HUMAN_ANSWERED_VIA_CHANNEL",
            QuestionStatus::HumanAnsweredOnMarketplace => "HUMAN_ANSWERED_ON_MARKETPLACE",
            QuestionStatus::Error => "ERROR",
        };
        write!(f, "{s}")
    }
}

impl FromStr for QuestionStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING_NOTIFY" => Ok(QuestionStatus::PendingNotify),
            "AWAITING_REPLY" => Ok(QuestionStatus::AwaitingReply),
            "AI_PROCESSING" => Ok(QuestionStatus::AiProcessing),
            "AI_ANSWERED" => Ok(QuestionStatus::AiAnswered),
            "AI_FAILED" => Ok(QuestionStatus::AiFailed),
            "HUMAN_ANSWERED_VIA_CHANNEL" => Ok(QuestionStatus::HumanAnsweredViaChannel),
            "HUMAN_ANSWERED_ON_MARKETPLACE" => Ok(QuestionStatus::HumanAnsweredOnMarketplace),
            "ERROR" => Ok(QuestionStatus::Error),
            _ => Err(format!("Unknown question status: {s}")),
        }
    }
}

/// One row of the question log. `question_id` is the marketplace's id and the
/// primary key; rows are upserted and never deleted.
#[derive(Debug, Serialize, Deserialize, Clone, FromRow)]
pub struct QuestionRecord {
    pub question_id: i64,
    pub tenant_id: Option<Uuid>,
    pub seller_id: i64,
    pub item_id: Option<String>,
    pub question_text: Option<String>,
    pub status: QuestionStatus,
    pub ai_response_text: Option<String>,
    pub error_message: Option<String>,
    pub notification_message_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub notified_at: Option<DateTime<Utc>>,
    pub ai_answered_at: Option<DateTime<Utc>>,
    pub human_answered_at: Option<DateTime<Utc>>,
    pub last_processed_at: DateTime<Utc>,
}

/// A single write against the question log.
///
/// `None` fields other than `error_message` mean "keep whatever is stored";
/// `error_message` is last-writer-wins so a successful pass clears the error
/// from the previous one. `status` always wins, subject to the transition
/// check.
#[derive(Debug, Clone)]
pub struct QuestionPatch {
    pub question_id: i64,
    pub seller_id: i64,
    pub status: QuestionStatus,
    pub tenant_id: Option<Uuid>,
    pub item_id: Option<String>,
    pub question_text: Option<String>,
    pub notified_at: Option<DateTime<Utc>>,
    pub ai_answered_at: Option<DateTime<Utc>>,
    pub human_answered_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub ai_response_text: Option<String>,
    pub notification_message_id: Option<String>,
}

impl QuestionPatch {
    pub fn new(question_id: i64, seller_id: i64, status: QuestionStatus) -> Self {
        Self {
            question_id,
            seller_id,
            status,
            tenant_id: None,
            item_id: None,
            question_text: None,
            notified_at: None,
            ai_answered_at: None,
            human_answered_at: None,
            error_message: None,
            ai_response_text: None,
            notification_message_id: None,
        }
    }

    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }
}

fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        s.chars().take(max).collect()
    }
}

/// Applies `patch` on top of `existing`, producing the row to store.
///
/// This is the single write boundary for the question log: both the Postgres
/// repository and the in-memory test double route every upsert through here,
/// so merge semantics and transition enforcement cannot drift apart.
pub fn merge_patch(
    existing: Option<&QuestionRecord>,
    patch: &QuestionPatch,
    now: DateTime<Utc>,
) -> Result<QuestionRecord, Error> {
    let error_message = patch
        .error_message
        .as_deref()
        .map(|m| truncate_chars(m, MAX_ERROR_MESSAGE_LEN));

    match existing {
        None => Ok(QuestionRecord {
            question_id: patch.question_id,
            tenant_id: patch.tenant_id,
            seller_id: patch.seller_id,
            item_id: patch.item_id.clone(),
            question_text: patch.question_text.clone(),
            status: patch.status,
            ai_response_text: patch.ai_response_text.clone(),
            error_message,
            notification_message_id: patch.notification_message_id.clone(),
            created_at: now,
            notified_at: patch.notified_at,
            ai_answered_at: patch.ai_answered_at,
            human_answered_at: patch.human_answered_at,
            last_processed_at: now,
        }),
        Some(cur) => {
            if !cur.status.can_transition_to(patch.status) {
                return Err(Error::IllegalTransition {
                    from: cur.status,
                    to: patch.status,
                });
            }
            Ok(QuestionRecord {
                question_id: cur.question_id,
                tenant_id: patch.tenant_id.or(cur.tenant_id),
                seller_id: patch.seller_id,
                item_id: patch.item_id.clone().or_else(|| cur.item_id.clone()),
                question_text: patch
                    .question_text
                    .clone()
                    .or_else(|| cur.question_text.clone()),
                status: patch.status,
                ai_response_text: patch
                    .ai_response_text
                    .clone()
                    .or_else(|| cur.ai_response_text.clone()),
                error_message,
                notification_message_id: patch
                    .notification_message_id
                    .clone()
                    .or_else(|| cur.notification_message_id.clone()),
                created_at: cur.created_at,
                notified_at: patch.notified_at.or(cur.notified_at),
                ai_answered_at: patch.ai_answered_at.or(cur.ai_answered_at),
                human_answered_at: patch.human_answered_at.or(cur.human_answered_at),
                last_processed_at: now,
            })
        }
    }
}

/// A customer account. `whatsapp_jid` is where every notification for this
/// tenant goes, regardless of who replied on the channel.
#[derive(Debug, Serialize, Deserialize, Clone, FromRow)]
pub struct Tenant {
    pub tenant_id: Uuid,
    pub email: String,
    pub whatsapp_jid: Option<String>,
    pub is_active: bool,
}

/// One marketplace seller account owned by a tenant. Tokens are plaintext in
/// memory; the repository encrypts them on the way to the database.
#[derive(Debug, Clone)]
pub struct TenantConnection {
    pub connection_id: Uuid,
    pub tenant_id: Uuid,
    pub seller_id: i64,
    pub access_token: String,
    pub refresh_token: String,
    pub token_expires_at: DateTime<Utc>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
