// vendabot-core/src/repositories/postgres/tenant_connections.rs

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres, Row};
use uuid::Uuid;

use crate::crypto::Encryptor;
use crate::models::{Tenant, TenantConnection};
use crate::Error;

#[async_trait]
pub trait TenantConnectionRepository: Send + Sync {
    /// Active connection for a marketplace seller id, with its owning tenant.
    async fn active_for_seller(
        &self,
        seller_id: i64,
    ) -> Result<Option<(TenantConnection, Tenant)>, Error>;

    async fn get(&self, connection_id: Uuid) -> Result<Option<TenantConnection>, Error>;

    async fn all_active(&self) -> Result<Vec<(TenantConnection, Tenant)>, Error>;

    /// Persist a refreshed token pair. `refresh_token` stays untouched when
    /// the grant did not include a new one.
    async fn update_tokens(
        &self,
        connection_id: Uuid,
        access_token: &str,
        refresh_token: Option<&str>,
        expires_at: DateTime<Utc>,
    ) -> Result<(), Error>;

    /// Marks the connection inactive. Done when a refresh is rejected, so the
    /// sweeper stops hammering a dead grant.
    async fn deactivate(&self, connection_id: Uuid) -> Result<(), Error>;
}

#[derive(Clone)]
pub struct PostgresTenantConnectionRepository {
    pool: Pool<Postgres>,
    encryptor: Encryptor,
}

impl PostgresTenantConnectionRepository {
    pub fn new(pool: Pool<Postgres>, encryptor: Encryptor) -> Self {
        Self { pool, encryptor }
    }

    fn connection_from_row(&self, row: &sqlx::postgres::PgRow) -> Result<TenantConnection, Error> {
        let access_enc: String = row.try_get("access_token")?;
        let refresh_enc: String = row.try_get("refresh_token")?;
        Ok(TenantConnection {
            connection_id: row.try_get("connection_id")?,
            tenant_id: row.try_get("tenant_id")?,
            seller_id: row.try_get("seller_id")?,
            access_token: self.encryptor.decrypt(&access_enc)?,
            refresh_token: self.encryptor.decrypt(&refresh_enc)?,
            token_expires_at: row.try_get("token_expires_at")?,
            is_active: row.try_get("is_active")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn tenant_from_row(row: &sqlx::postgres::PgRow) -> Result<Tenant, Error> {
        Ok(Tenant {
            tenant_id: row.try_get("tenant_id")?,
            email: row.try_get("email")?,
            whatsapp_jid: row.try_get("whatsapp_jid")?,
            is_active: row.try_get("tenant_is_active")?,
        })
    }
}

const JOINED_COLUMNS: &str = r#"
    c.connection_id, c.tenant_id, c.seller_id, c.access_token, c.refresh_token,
    c.token_expires_at, c.is_active, c.created_at, c.updated_at,
    t.email, t.whatsapp_jid, t.is_active AS tenant_is_active
"#;

#[async_trait]
impl TenantConnectionRepository for PostgresTenantConnectionRepository {
    async fn active_for_seller(
        &self,
        seller_id: i64,
    ) -> Result<Option<(TenantConnection, Tenant)>, Error> {
        let query = format!(
            r#"
            SELECT {JOINED_COLUMNS}
            FROM tenant_connections c
            JOIN tenants t ON t.tenant_id = c.tenant_id
            WHERE c.seller_id = $1 AND c.is_active AND t.is_active
            "#
        );
        let row = sqlx::query(&query)
            .bind(seller_id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let conn = self.connection_from_row(&row)?;
                let tenant = Self::tenant_from_row(&row)?;
                Ok(Some((conn, tenant)))
            }
            None => Ok(None),
        }
    }

    async fn get(&self, connection_id: Uuid) -> Result<Option<TenantConnection>, Error> {
        let row = sqlx::query(
            r#"
            SELECT connection_id, tenant_id, seller_id, access_token, refresh_token,
                   token_expires_at, is_active, created_at, updated_at
            FROM tenant_connections
            WHERE connection_id = $1
            "#,
        )
        .bind(connection_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(self.connection_from_row(&row)?)),
            None => Ok(None),
        }
    }

    async fn all_active(&self) -> Result<Vec<(TenantConnection, Tenant)>, Error> {
        let query = format!(
            r#"
            SELECT {JOINED_COLUMNS}
            FROM tenant_connections c
            JOIN tenants t ON t.tenant_id = c.tenant_id
            WHERE c.is_active AND t.is_active
            ORDER BY c.created_at
            "#
        );
        let rows = sqlx::query(&query).fetch_all(&self.pool).await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in &rows {
            out.push((self.connection_from_row(row)?, Self::tenant_from_row(row)?));
        }
        Ok(out)
    }

    async fn update_tokens(
        &self,
        connection_id: Uuid,
        access_token: &str,
        refresh_token: Option<&str>,
        expires_at: DateTime<Utc>,
    ) -> Result<(), Error> {
        let access_enc = self.encryptor.encrypt(access_token)?;
        let refresh_enc = match refresh_token {
            Some(token) => Some(self.encryptor.encrypt(token)?),
            None => None,
        };

        sqlx::query(
            r#"
            UPDATE tenant_connections
               SET access_token     = $2,
                   refresh_token    = COALESCE($3, refresh_token),
                   token_expires_at = $4,
                   updated_at       = NOW()
             WHERE connection_id = $1
            "#,
        )
        .bind(connection_id)
        .bind(access_enc)
        .bind(refresh_enc)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn deactivate(&self, connection_id: Uuid) -> Result<(), Error> {
        sqlx::query(
            r#"
            UPDATE tenant_connections
               SET is_active = FALSE, updated_at = NOW()
             WHERE connection_id = $1
            "#,
        )
        .bind(connection_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
