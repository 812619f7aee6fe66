// vendabot-core/src/tasks/sweep.rs
//
// Periodic background pass: reconcile missed questions, then escalate the
// ones a human never answered. Every tenant runs inside its own error
// boundary so one broken connection cannot starve the rest.

use chrono::{Duration as ChronoDuration, Utc};
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::models::{Tenant, TenantConnection};
use crate::repositories::{QuestionLogRepository, TenantConnectionRepository};
use crate::services::ai_pipeline::AiPipeline;
use crate::services::intake::IntakeService;
use crate::Error;

/// Upper bound of escalations per tenant per sweep, to bound sweep duration.
const ESCALATION_CAP: i64 = 20;

pub struct TimeoutEscalator {
    questions: Arc<dyn QuestionLogRepository>,
    pipeline: Arc<AiPipeline>,
    timeout_minutes: i64,
}

impl TimeoutEscalator {
    pub fn new(
        questions: Arc<dyn QuestionLogRepository>,
        pipeline: Arc<AiPipeline>,
        timeout_minutes: i64,
    ) -> Self {
        Self {
            questions,
            pipeline,
            timeout_minutes,
        }
    }

    /// Force-resolves every question for this seller that has waited past the
    /// timeout window, oldest first, capped per sweep.
    pub async fn escalate_tenant(&self, seller_id: i64) -> Result<usize, Error> {
        let cutoff = Utc::now() - ChronoDuration::minutes(self.timeout_minutes);
        let overdue = self
            .questions
            .awaiting_reply_older_than(seller_id, cutoff, ESCALATION_CAP)
            .await?;

        if overdue.is_empty() {
            return Ok(0);
        }
        info!(seller_id, count = overdue.len(), "escalating timed-out questions");

        let mut escalated = 0;
        for record in &overdue {
            self.pipeline.resolve_with_ai(record.question_id).await;
            escalated += 1;
            // Cooperative rate limiting toward the LLM and marketplace APIs.
            let secs = rand::rng().random_range(3..=6);
            tokio::time::sleep(Duration::from_secs(secs)).await;
        }
        Ok(escalated)
    }
}

pub struct Sweeper {
    connections: Arc<dyn TenantConnectionRepository>,
    intake: Arc<IntakeService>,
    escalator: TimeoutEscalator,
}

impl Sweeper {
    pub fn new(
        connections: Arc<dyn TenantConnectionRepository>,
        intake: Arc<IntakeService>,
        escalator: TimeoutEscalator,
    ) -> Self {
        Self {
            connections,
            intake,
            escalator,
        }
    }

    /// One full pass over all active tenants: reconciliation first (webhooks
    /// are not guaranteed), then timeout escalation.
    pub async fn run_once(&self) {
        let tenants = match self.connections.all_active().await {
            Ok(tenants) => tenants,
            Err(e) => {
                error!(error = %e, "could not list active connections, skipping sweep");
                return;
            }
        };
        info!(tenants = tenants.len(), "sweep started");

        for (conn, tenant) in &tenants {
            self.sweep_tenant(conn, tenant).await;
            let secs = rand::rng().random_range(1..=2);
            tokio::time::sleep(Duration::from_secs(secs)).await;
        }
        info!("sweep finished");
    }

    async fn sweep_tenant(&self, conn: &TenantConnection, tenant: &Tenant) {
        if let Err(e) = self.intake.reconcile_tenant(conn, tenant).await {
            warn!(tenant_id = %tenant.tenant_id, error = %e,
                  "reconciliation failed, continuing with next tenant");
            // An expired connection cannot escalate either.
            if matches!(e, Error::AuthExpired(_)) {
                return;
            }
        }
        if let Err(e) = self.escalator.escalate_tenant(conn.seller_id).await {
            warn!(tenant_id = %tenant.tenant_id, error = %e, "escalation failed");
        }
    }
}

/// Runs the sweep on a fixed interval until the handle is aborted.
pub fn spawn_sweep_task(sweeper: Arc<Sweeper>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            sweeper.run_once().await;
        }
    })
}
