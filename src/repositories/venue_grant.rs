//! Venue grant repository for database operations

use anyhow::{Result, anyhow};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::models::venue_grant::{self, Entity as VenueGrant};

/// Repository for venue grant lookups
#[derive(Debug, Clone)]
pub struct VenueGrantRepository {
    pub db: Arc<DatabaseConnection>,
}

impl VenueGrantRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Finds the grant a user holds on a venue, if any
    pub async fn find(
        &self,
        user_id: &Uuid,
        venue_id: &Uuid,
    ) -> Result<Option<venue_grant::Model>> {
        Ok(VenueGrant::find()
            .filter(venue_grant::Column::UserId.eq(*user_id))
            .filter(venue_grant::Column::VenueId.eq(*venue_id))
            .one(&*self.db)
            .await?)
    }

    /// Creates a grant
    pub async fn create(
        &self,
        tenant_id: Uuid,
        venue_id: Uuid,
        user_id: Uuid,
        can_manage_reviews: bool,
    ) -> Result<venue_grant::Model> {
        let id = Uuid::new_v4();
        let active = venue_grant::ActiveModel {
            id: Set(id),
            tenant_id: Set(tenant_id),
            venue_id: Set(venue_id),
            user_id: Set(user_id),
            can_manage_reviews: Set(can_manage_reviews),
            created_at: Set(chrono::Utc::now().into()),
        };
        active.insert(&*self.db).await?;

        let fetched = VenueGrant::find_by_id(id).one(&*self.db).await?;
        fetched.ok_or_else(|| anyhow!("venue grant not persisted"))
    }
}
