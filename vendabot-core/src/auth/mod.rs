// vendabot-core/src/auth/mod.rs
//
// Access-token lifecycle for marketplace connections. Every API call goes
// through `valid_access_token`, which refreshes proactively inside a
// per-connection lock; a rejected refresh deactivates the connection.

use chrono::{Duration, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use crate::models::TenantConnection;
use crate::platforms::marketplace::MarketplaceApi;
use crate::repositories::TenantConnectionRepository;
use crate::Error;

/// Tokens are treated as stale this long before their recorded expiry, so a
/// token never dies mid-request.
const REFRESH_SKEW_MINUTES: i64 = 10;

/// Fallback lifetime when the grant omits `expires_in`.
const DEFAULT_EXPIRES_IN_SECS: i64 = 21_600;

pub struct TokenManager {
    connections: Arc<dyn TenantConnectionRepository>,
    marketplace: Arc<dyn MarketplaceApi>,
    refresh_locks: DashMap<Uuid, Arc<Mutex<()>>>,
}

impl TokenManager {
    pub fn new(
        connections: Arc<dyn TenantConnectionRepository>,
        marketplace: Arc<dyn MarketplaceApi>,
    ) -> Self {
        Self {
            connections,
            marketplace,
            refresh_locks: DashMap::new(),
        }
    }

    /// Returns an access token guaranteed fresh for at least the skew window.
    ///
    /// Concurrent callers for the same connection serialize on a lock; the
    /// second caller re-reads the row and usually finds the first caller's
    /// refresh already persisted.
    pub async fn valid_access_token(&self, conn: &TenantConnection) -> Result<String, Error> {
        if !Self::is_stale(conn) {
            return Ok(conn.access_token.clone());
        }

        let lock = self
            .refresh_locks
            .entry(conn.connection_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        // Double-check under the lock.
        let current = self
            .connections
            .get(conn.connection_id)
            .await?
            .ok_or_else(|| Error::Auth(format!("connection {} not found", conn.connection_id)))?;
        if !current.is_active {
            return Err(Error::AuthExpired(conn.connection_id));
        }
        if !Self::is_stale(&current) {
            return Ok(current.access_token);
        }

        self.refresh(&current).await
    }

    fn is_stale(conn: &TenantConnection) -> bool {
        Utc::now() >= conn.token_expires_at - Duration::minutes(REFRESH_SKEW_MINUTES)
    }

    async fn refresh(&self, conn: &TenantConnection) -> Result<String, Error> {
        info!(connection_id = %conn.connection_id, seller_id = conn.seller_id, "refreshing access token");

        let grant = match self.marketplace.refresh_token(&conn.refresh_token).await {
            Ok(grant) => grant,
            Err(e) => {
                warn!(connection_id = %conn.connection_id, error = %e,
                      "token refresh failed, deactivating connection");
                self.connections.deactivate(conn.connection_id).await?;
                return Err(Error::AuthExpired(conn.connection_id));
            }
        };

        let expires_at = Utc::now()
            + Duration::seconds(grant.expires_in.unwrap_or(DEFAULT_EXPIRES_IN_SECS));
        self.connections
            .update_tokens(
                conn.connection_id,
                &grant.access_token,
                grant.refresh_token.as_deref(),
                expires_at,
            )
            .await?;

        Ok(grant.access_token)
    }
}
