//! VenueGrant entity model
//!
//! Explicit per-venue access for manager-role callers. Tenant-level venue
//! access does not imply the narrower can_manage_reviews grant required for
//! sync and reply actions.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "venue_grants")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub tenant_id: Uuid,
    pub venue_id: Uuid,
    pub user_id: Uuid,

    /// Gates sync and reply actions specifically
    pub can_manage_reviews: bool,

    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
