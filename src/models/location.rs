//! Location entity model
//!
//! A business location discovered under a connection. The remote location
//! identifier is globally unique and drives upsert conflict resolution.
//! Locations that disappear from the upstream listing are soft-disabled
//! (is_active = false) so their historical reviews are preserved.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "locations")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Owning connection
    pub connection_id: Uuid,

    /// Platform-assigned resource name, globally unique
    pub remote_location_id: String,

    pub display_name: String,

    /// Address components flattened into a single display string
    pub address: Option<String>,

    pub phone: Option<String>,
    pub website: Option<String>,

    /// False once the platform stops returning this location
    pub is_active: bool,

    /// Stamped after each successful reconciliation
    pub last_synced_at: Option<DateTimeWithTimeZone>,

    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::connection::Entity",
        from = "Column::ConnectionId",
        to = "super::connection::Column::Id"
    )]
    Connection,
    #[sea_orm(has_many = "super::review::Entity")]
    Review,
}

impl Related<super::connection::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Connection.def()
    }
}

impl Related<super::review::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Review.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
