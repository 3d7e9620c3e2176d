//! CachedRating entity model
//!
//! One aggregate rating per (venue, platform). Keyed independently of the
//! connections table so a cached value survives disconnect/reconnect and is
//! retained indefinitely as a stale fallback.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "cached_ratings")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub tenant_id: Uuid,
    pub venue_id: Uuid,
    pub platform: String,

    /// Aggregate rating, platform scale normalized to 1.0..=5.0
    pub rating: f64,

    /// Number of ratings backing the aggregate
    pub rating_count: i64,

    /// Attribution strings required by the platform's display terms
    pub attribution: Option<String>,

    /// When this value was last fetched fresh from upstream
    pub fetched_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
