//! Creates the reviews table: one row per remote review identifier, scoped
//! to a location. Rating is nullable; an upstream rating that cannot be
//! normalized to 1..=5 is stored as NULL rather than coerced.

use sea_orm_migration::prelude::*;

use crate::m2025_06_01_000200_create_locations::Locations;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Reviews::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Reviews::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Reviews::LocationId).uuid().not_null())
                    .col(ColumnDef::new(Reviews::RemoteReviewId).text().not_null())
                    .col(ColumnDef::new(Reviews::ReviewerName).text().null())
                    .col(ColumnDef::new(Reviews::ReviewerPhotoUrl).text().null())
                    .col(ColumnDef::new(Reviews::Rating).small_integer().null())
                    .col(ColumnDef::new(Reviews::Body).text().null())
                    .col(
                        ColumnDef::new(Reviews::SubmittedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(ColumnDef::new(Reviews::ReplyText).text().null())
                    .col(
                        ColumnDef::new(Reviews::RepliedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Reviews::IsReplied)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Reviews::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Reviews::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_reviews_location_id")
                            .from(Reviews::Table, Reviews::LocationId)
                            .to(Locations::Table, Locations::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("ux_reviews_remote_review_id")
                    .table(Reviews::Table)
                    .col(Reviews::RemoteReviewId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("ix_reviews_location_id")
                    .table(Reviews::Table)
                    .col(Reviews::LocationId)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Reviews::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum Reviews {
    Table,
    Id,
    LocationId,
    RemoteReviewId,
    ReviewerName,
    ReviewerPhotoUrl,
    Rating,
    Body,
    SubmittedAt,
    ReplyText,
    RepliedAt,
    IsReplied,
    CreatedAt,
    UpdatedAt,
}
