//! Review repository for database operations
//!
//! Upserts are keyed on the remote review identifier: a review is created
//! on first sight and counts as updated on every later pass, whether or not
//! its content changed. Content-identical rows skip the write itself.

use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::models::review::{self, Entity as Review};
use crate::platforms::RemoteReview;

/// Outcome of a review upsert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created,
    Updated,
}

/// Response-state filter for review listings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewFilter {
    #[default]
    All,
    Unresponded,
    Responded,
}

/// Repository for review database operations
#[derive(Debug, Clone)]
pub struct ReviewRepository {
    pub db: Arc<DatabaseConnection>,
}

impl ReviewRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Inserts or updates a review from its remote representation.
    ///
    /// `rating` is the already-normalized star value; NULL marks an
    /// unparseable upstream rating.
    pub async fn upsert_remote(
        &self,
        location_id: Uuid,
        remote: &RemoteReview,
        rating: Option<i16>,
    ) -> Result<(review::Model, UpsertOutcome)> {
        let now: sea_orm::prelude::DateTimeWithTimeZone = Utc::now().into();
        let is_replied = remote.reply_text.is_some();

        let existing = Review::find()
            .filter(review::Column::RemoteReviewId.eq(remote.remote_review_id.as_str()))
            .one(&*self.db)
            .await?;

        match existing {
            Some(model) => {
                let unchanged = model.location_id == location_id
                    && model.reviewer_name == remote.reviewer_name
                    && model.reviewer_photo_url == remote.reviewer_photo_url
                    && model.rating == rating
                    && model.body == remote.body
                    && model.submitted_at == remote.submitted_at.map(Into::into)
                    && model.reply_text == remote.reply_text
                    && model.is_replied == is_replied;
                // Identical content still classifies as an update, only the
                // write is skipped.
                if unchanged {
                    return Ok((model, UpsertOutcome::Updated));
                }

                let mut active: review::ActiveModel = model.into();
                active.location_id = Set(location_id);
                active.reviewer_name = Set(remote.reviewer_name.clone());
                active.reviewer_photo_url = Set(remote.reviewer_photo_url.clone());
                active.rating = Set(rating);
                active.body = Set(remote.body.clone());
                active.submitted_at = Set(remote.submitted_at.map(Into::into));
                active.reply_text = Set(remote.reply_text.clone());
                active.replied_at = Set(remote.replied_at.map(Into::into));
                active.is_replied = Set(is_replied);
                active.updated_at = Set(now);
                Ok((active.update(&*self.db).await?, UpsertOutcome::Updated))
            }
            None => {
                let id = Uuid::new_v4();
                let active = review::ActiveModel {
                    id: Set(id),
                    location_id: Set(location_id),
                    remote_review_id: Set(remote.remote_review_id.clone()),
                    reviewer_name: Set(remote.reviewer_name.clone()),
                    reviewer_photo_url: Set(remote.reviewer_photo_url.clone()),
                    rating: Set(rating),
                    body: Set(remote.body.clone()),
                    submitted_at: Set(remote.submitted_at.map(Into::into)),
                    reply_text: Set(remote.reply_text.clone()),
                    replied_at: Set(remote.replied_at.map(Into::into)),
                    is_replied: Set(is_replied),
                    created_at: Set(now),
                    updated_at: Set(now),
                };
                active.insert(&*self.db).await?;

                let fetched = Review::find_by_id(id).one(&*self.db).await?;
                Ok((
                    fetched.ok_or_else(|| anyhow!("review not persisted"))?,
                    UpsertOutcome::Created,
                ))
            }
        }
    }

    pub async fn get_by_id(&self, id: &Uuid) -> Result<Option<review::Model>> {
        Ok(Review::find_by_id(*id).one(&*self.db).await?)
    }

    /// Lists reviews across a set of locations, newest first
    pub async fn list_for_locations(
        &self,
        location_ids: &[Uuid],
        filter: ReviewFilter,
    ) -> Result<Vec<review::Model>> {
        if location_ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut query = Review::find()
            .filter(review::Column::LocationId.is_in(location_ids.to_vec()));

        match filter {
            ReviewFilter::All => {}
            ReviewFilter::Unresponded => {
                query = query.filter(review::Column::IsReplied.eq(false));
            }
            ReviewFilter::Responded => {
                query = query.filter(review::Column::IsReplied.eq(true));
            }
        }

        Ok(query
            .order_by_desc(review::Column::SubmittedAt)
            .order_by_asc(review::Column::Id)
            .all(&*self.db)
            .await?)
    }

    /// Persists a published reply
    pub async fn set_reply(
        &self,
        review_id: &Uuid,
        body: &str,
        at: DateTime<Utc>,
    ) -> Result<review::Model> {
        let review = self
            .get_by_id(review_id)
            .await?
            .ok_or_else(|| anyhow!("Review with ID '{}' not found", review_id))?;

        let mut active: review::ActiveModel = review.into();
        active.reply_text = Set(Some(body.to_string()));
        active.replied_at = Set(Some(at.into()));
        active.is_replied = Set(true);
        active.updated_at = Set(Utc::now().into());
        Ok(active.update(&*self.db).await?)
    }
}
