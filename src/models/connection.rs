//! Connection entity model
//!
//! One row per (tenant, venue, platform): the persisted OAuth credential
//! record for a venue's link to an external review platform.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use uuid::Uuid;

/// Connection entity representing a tenant-venue authorization to a review platform
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "connections")]
pub struct Model {
    /// Unique identifier for the connection (primary key)
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Tenant identifier for multi-tenancy
    pub tenant_id: Uuid,

    /// Venue this connection belongs to
    pub venue_id: Uuid,

    /// Platform slug (e.g. "google")
    pub platform: String,

    /// Account identifier reported by the platform for the authorized identity
    pub platform_account_id: String,

    /// Connection status: active | revoked | error
    pub status: String,

    /// Encrypted access token (AES-256-GCM, AAD-bound to tenant|venue|platform)
    pub access_token_ciphertext: Option<Vec<u8>>,

    /// Encrypted refresh token
    pub refresh_token_ciphertext: Option<Vec<u8>>,

    /// Access token expiry
    pub expires_at: Option<DateTimeWithTimeZone>,

    /// Granted OAuth scopes, space separated
    pub scopes: Option<String>,

    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

pub const STATUS_ACTIVE: &str = "active";
pub const STATUS_ERROR: &str = "error";

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::location::Entity")]
    Location,
}

impl Related<super::location::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Location.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
