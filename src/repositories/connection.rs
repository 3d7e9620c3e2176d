//! Connection repository for database operations
//!
//! Encapsulates SeaORM operations for the connections table. Token material
//! never leaves this module unencrypted except through
//! [`ConnectionRepository::decrypt_tokens`].

use anyhow::{Result, anyhow};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, ModelTrait, QueryFilter,
    QueryOrder, Set,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::crypto::{CryptoKey, decrypt_connection_tokens, encrypt_connection_tokens};
use crate::models::connection::{self, Entity as Connection, STATUS_ACTIVE, STATUS_ERROR};
use crate::platforms::TokenGrant;

/// Repository for connection database operations
#[derive(Debug, Clone)]
pub struct ConnectionRepository {
    pub db: Arc<DatabaseConnection>,
    pub crypto_key: CryptoKey,
}

impl ConnectionRepository {
    /// Creates a new ConnectionRepository instance
    pub fn new(db: Arc<DatabaseConnection>, crypto_key: CryptoKey) -> Self {
        Self { db, crypto_key }
    }

    /// Creates or replaces the connection for a (tenant, venue, platform)
    /// triple from a completed OAuth exchange.
    ///
    /// Re-authorizing an existing connection overwrites its tokens and
    /// resets its status to active.
    pub async fn upsert_from_grant(
        &self,
        tenant_id: Uuid,
        venue_id: Uuid,
        platform: &str,
        platform_account_id: &str,
        grant: &TokenGrant,
    ) -> Result<connection::Model> {
        let existing = self
            .find_by_venue_platform(&tenant_id, &venue_id, platform)
            .await?;

        let now: sea_orm::prelude::DateTimeWithTimeZone = chrono::Utc::now().into();

        let connection_id = existing.as_ref().map(|c| c.id).unwrap_or_else(Uuid::new_v4);

        // AAD is derived from identity columns only, so a scratch model is
        // enough for encryption.
        let aad_model = connection::Model {
            id: connection_id,
            tenant_id,
            venue_id,
            platform: platform.to_string(),
            platform_account_id: platform_account_id.to_string(),
            status: STATUS_ACTIVE.to_string(),
            access_token_ciphertext: None,
            refresh_token_ciphertext: None,
            expires_at: None,
            scopes: None,
            created_at: now,
            updated_at: now,
        };

        let (access_ct, refresh_ct) = encrypt_connection_tokens(
            &self.crypto_key,
            &aad_model,
            Some(grant.access_token.as_str()),
            grant.refresh_token.as_deref(),
        )
        .map_err(|e| anyhow!("Token encryption failed: {}", e))?;

        match existing {
            Some(model) => {
                let mut active: connection::ActiveModel = model.into();
                active.platform_account_id = Set(platform_account_id.to_string());
                active.status = Set(STATUS_ACTIVE.to_string());
                active.access_token_ciphertext = Set(access_ct);
                // Keep the previous refresh token when the platform does not
                // rotate it on re-authorization.
                if refresh_ct.is_some() {
                    active.refresh_token_ciphertext = Set(refresh_ct);
                }
                active.expires_at = Set(grant.expires_at.map(Into::into));
                active.scopes = Set(grant.scopes.clone());
                active.updated_at = Set(now);
                Ok(active.update(&*self.db).await?)
            }
            None => {
                let active = connection::ActiveModel {
                    id: Set(connection_id),
                    tenant_id: Set(tenant_id),
                    venue_id: Set(venue_id),
                    platform: Set(platform.to_string()),
                    platform_account_id: Set(platform_account_id.to_string()),
                    status: Set(STATUS_ACTIVE.to_string()),
                    access_token_ciphertext: Set(access_ct),
                    refresh_token_ciphertext: Set(refresh_ct),
                    expires_at: Set(grant.expires_at.map(Into::into)),
                    scopes: Set(grant.scopes.clone()),
                    created_at: Set(now),
                    updated_at: Set(now),
                };
                active.insert(&*self.db).await?;

                let fetched = Connection::find_by_id(connection_id).one(&*self.db).await?;
                fetched.ok_or_else(|| anyhow!("connection not persisted"))
            }
        }
    }

    /// Retrieves a connection by its ID without tenant scoping
    pub async fn get_by_id(&self, id: &Uuid) -> Result<Option<connection::Model>> {
        Ok(Connection::find_by_id(*id).one(&*self.db).await?)
    }

    /// Finds the connection for a (tenant, venue, platform) triple
    pub async fn find_by_venue_platform(
        &self,
        tenant_id: &Uuid,
        venue_id: &Uuid,
        platform: &str,
    ) -> Result<Option<connection::Model>> {
        Ok(Connection::find()
            .filter(connection::Column::TenantId.eq(*tenant_id))
            .filter(connection::Column::VenueId.eq(*venue_id))
            .filter(connection::Column::Platform.eq(platform))
            .one(&*self.db)
            .await?)
    }

    /// Lists active connections for a venue ordered by creation time
    pub async fn find_active_by_venue(
        &self,
        tenant_id: &Uuid,
        venue_id: &Uuid,
    ) -> Result<Vec<connection::Model>> {
        Ok(Connection::find()
            .filter(connection::Column::TenantId.eq(*tenant_id))
            .filter(connection::Column::VenueId.eq(*venue_id))
            .filter(connection::Column::Status.eq(STATUS_ACTIVE))
            .order_by_asc(connection::Column::CreatedAt)
            .order_by_asc(connection::Column::Id)
            .all(&*self.db)
            .await?)
    }

    /// Lists every active connection across tenants, for batch sync runs
    pub async fn find_all_active(&self) -> Result<Vec<connection::Model>> {
        Ok(Connection::find()
            .filter(connection::Column::Status.eq(STATUS_ACTIVE))
            .order_by_asc(connection::Column::CreatedAt)
            .order_by_asc(connection::Column::Id)
            .all(&*self.db)
            .await?)
    }

    /// Decrypts tokens from a connection model
    pub async fn decrypt_tokens(
        &self,
        connection: &connection::Model,
    ) -> Result<(Option<String>, Option<String>)> {
        decrypt_connection_tokens(&self.crypto_key, connection).map_err(|e| {
            tracing::error!(
                tenant_id = %connection.tenant_id,
                venue_id = %connection.venue_id,
                platform = %connection.platform,
                "Token decryption failed"
            );
            anyhow!("Token decryption failed: {}", e)
        })
    }

    /// Persists a refreshed token grant onto the connection
    pub async fn apply_refreshed_tokens(
        &self,
        connection_id: &Uuid,
        grant: &TokenGrant,
    ) -> Result<connection::Model> {
        let connection = self
            .get_by_id(connection_id)
            .await?
            .ok_or_else(|| anyhow!("Connection with ID '{}' not found", connection_id))?;

        let (access_ct, refresh_ct) = encrypt_connection_tokens(
            &self.crypto_key,
            &connection,
            Some(grant.access_token.as_str()),
            grant.refresh_token.as_deref(),
        )
        .map_err(|e| anyhow!("Token encryption failed: {}", e))?;

        let mut active: connection::ActiveModel = connection.into();
        active.access_token_ciphertext = Set(access_ct);
        if refresh_ct.is_some() {
            active.refresh_token_ciphertext = Set(refresh_ct);
        }
        active.expires_at = Set(grant.expires_at.map(Into::into));
        if grant.scopes.is_some() {
            active.scopes = Set(grant.scopes.clone());
        }
        active.status = Set(STATUS_ACTIVE.to_string());
        active.updated_at = Set(chrono::Utc::now().into());
        Ok(active.update(&*self.db).await?)
    }

    /// Marks a connection as errored after a permanent refresh failure
    pub async fn mark_error(&self, connection_id: &Uuid) -> Result<()> {
        let connection = self
            .get_by_id(connection_id)
            .await?
            .ok_or_else(|| anyhow!("Connection with ID '{}' not found", connection_id))?;

        let mut active: connection::ActiveModel = connection.into();
        active.status = Set(STATUS_ERROR.to_string());
        active.updated_at = Set(chrono::Utc::now().into());
        active.update(&*self.db).await?;
        Ok(())
    }

    /// Deletes the connection for a (tenant, venue, platform) triple.
    /// Discovered locations and their reviews cascade.
    pub async fn delete_by_venue_platform(
        &self,
        tenant_id: &Uuid,
        venue_id: &Uuid,
        platform: &str,
    ) -> Result<bool> {
        let Some(connection) = self
            .find_by_venue_platform(tenant_id, venue_id, platform)
            .await?
        else {
            return Ok(false);
        };

        connection.delete(&*self.db).await?;
        Ok(true)
    }
}
