//! Review entity model
//!
//! One row per remote review identifier, scoped to a location. The rating is
//! normalized to 1..=5 on ingest; unrecognized upstream values are stored as
//! NULL. is_replied is derivable from reply_text but kept denormalized for
//! query speed.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "reviews")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub location_id: Uuid,

    /// Platform-assigned review identifier, unique
    pub remote_review_id: String,

    pub reviewer_name: Option<String>,
    pub reviewer_photo_url: Option<String>,

    /// Normalized star rating, NULL when the upstream value was unparseable
    pub rating: Option<i16>,

    pub body: Option<String>,
    pub submitted_at: Option<DateTimeWithTimeZone>,

    pub reply_text: Option<String>,
    pub replied_at: Option<DateTimeWithTimeZone>,
    pub is_replied: bool,

    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::location::Entity",
        from = "Column::LocationId",
        to = "super::location::Column::Id"
    )]
    Location,
}

impl Related<super::location::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Location.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
