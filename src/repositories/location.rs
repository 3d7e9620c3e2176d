//! Location repository for database operations

use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
    sea_query::Expr,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::models::location::{self, Entity as Location};
use crate::platforms::RemoteLocation;

/// Repository for location database operations
#[derive(Debug, Clone)]
pub struct LocationRepository {
    pub db: Arc<DatabaseConnection>,
}

impl LocationRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Inserts or updates a discovered location, keyed by its remote
    /// identifier. Returns the row and whether it was newly created.
    pub async fn upsert_remote(
        &self,
        connection_id: Uuid,
        remote: &RemoteLocation,
    ) -> Result<(location::Model, bool)> {
        let now: sea_orm::prelude::DateTimeWithTimeZone = Utc::now().into();

        let existing = Location::find()
            .filter(location::Column::RemoteLocationId.eq(remote.remote_location_id.as_str()))
            .one(&*self.db)
            .await?;

        match existing {
            Some(model) => {
                let mut active: location::ActiveModel = model.into();
                active.connection_id = Set(connection_id);
                active.display_name = Set(remote.display_name.clone());
                active.address = Set(remote.address.clone());
                active.phone = Set(remote.phone.clone());
                active.website = Set(remote.website.clone());
                active.is_active = Set(true);
                active.updated_at = Set(now);
                Ok((active.update(&*self.db).await?, false))
            }
            None => {
                let id = Uuid::new_v4();
                let active = location::ActiveModel {
                    id: Set(id),
                    connection_id: Set(connection_id),
                    remote_location_id: Set(remote.remote_location_id.clone()),
                    display_name: Set(remote.display_name.clone()),
                    address: Set(remote.address.clone()),
                    phone: Set(remote.phone.clone()),
                    website: Set(remote.website.clone()),
                    is_active: Set(true),
                    last_synced_at: Set(None),
                    created_at: Set(now),
                    updated_at: Set(now),
                };
                active.insert(&*self.db).await?;

                let fetched = Location::find_by_id(id).one(&*self.db).await?;
                Ok((
                    fetched.ok_or_else(|| anyhow!("location not persisted"))?,
                    true,
                ))
            }
        }
    }

    pub async fn get_by_id(&self, id: &Uuid) -> Result<Option<location::Model>> {
        Ok(Location::find_by_id(*id).one(&*self.db).await?)
    }

    /// Lists active locations for a connection ordered by display name
    pub async fn find_active_by_connection(
        &self,
        connection_id: &Uuid,
    ) -> Result<Vec<location::Model>> {
        Ok(Location::find()
            .filter(location::Column::ConnectionId.eq(*connection_id))
            .filter(location::Column::IsActive.eq(true))
            .order_by_asc(location::Column::DisplayName)
            .order_by_asc(location::Column::Id)
            .all(&*self.db)
            .await?)
    }

    /// Soft-disables locations the platform no longer reports.
    /// Historical reviews under them are kept.
    pub async fn deactivate_missing(
        &self,
        connection_id: &Uuid,
        keep_remote_ids: &[String],
    ) -> Result<u64> {
        let mut query = Location::update_many()
            .col_expr(location::Column::IsActive, Expr::value(false))
            .col_expr(
                location::Column::UpdatedAt,
                Expr::value(sea_orm::prelude::DateTimeWithTimeZone::from(Utc::now())),
            )
            .filter(location::Column::ConnectionId.eq(*connection_id))
            .filter(location::Column::IsActive.eq(true));

        if !keep_remote_ids.is_empty() {
            query = query
                .filter(location::Column::RemoteLocationId.is_not_in(keep_remote_ids.to_vec()));
        }

        let result = query.exec(&*self.db).await?;
        Ok(result.rows_affected)
    }

    /// Stamps a successful reconciliation
    pub async fn mark_synced(&self, location_id: &Uuid, at: DateTime<Utc>) -> Result<()> {
        let location = self
            .get_by_id(location_id)
            .await?
            .ok_or_else(|| anyhow!("Location with ID '{}' not found", location_id))?;

        let mut active: location::ActiveModel = location.into();
        active.last_synced_at = Set(Some(at.into()));
        active.updated_at = Set(Utc::now().into());
        active.update(&*self.db).await?;
        Ok(())
    }
}
