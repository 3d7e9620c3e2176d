//! Cached rating repository for database operations

use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::models::cached_rating::{self, Entity as CachedRating};
use crate::platforms::RemoteRating;

/// Repository for cached aggregate rating operations
#[derive(Debug, Clone)]
pub struct CachedRatingRepository {
    pub db: Arc<DatabaseConnection>,
}

impl CachedRatingRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Finds the cached rating for a (venue, platform) pair, any age
    pub async fn find(
        &self,
        venue_id: &Uuid,
        platform: &str,
    ) -> Result<Option<cached_rating::Model>> {
        Ok(CachedRating::find()
            .filter(cached_rating::Column::VenueId.eq(*venue_id))
            .filter(cached_rating::Column::Platform.eq(platform))
            .one(&*self.db)
            .await?)
    }

    /// Stores a freshly fetched rating, replacing any previous value
    pub async fn upsert(
        &self,
        tenant_id: Uuid,
        venue_id: Uuid,
        platform: &str,
        remote: &RemoteRating,
        fetched_at: DateTime<Utc>,
    ) -> Result<cached_rating::Model> {
        let existing = self.find(&venue_id, platform).await?;

        match existing {
            Some(model) => {
                let mut active: cached_rating::ActiveModel = model.into();
                active.rating = Set(remote.rating);
                active.rating_count = Set(remote.rating_count);
                active.attribution = Set(remote.attribution.clone());
                active.fetched_at = Set(fetched_at.into());
                Ok(active.update(&*self.db).await?)
            }
            None => {
                let id = Uuid::new_v4();
                let active = cached_rating::ActiveModel {
                    id: Set(id),
                    tenant_id: Set(tenant_id),
                    venue_id: Set(venue_id),
                    platform: Set(platform.to_string()),
                    rating: Set(remote.rating),
                    rating_count: Set(remote.rating_count),
                    attribution: Set(remote.attribution.clone()),
                    fetched_at: Set(fetched_at.into()),
                };
                active.insert(&*self.db).await?;

                let fetched = CachedRating::find_by_id(id).one(&*self.db).await?;
                fetched.ok_or_else(|| anyhow!("cached rating not persisted"))
            }
        }
    }
}
