//! Creates the cached_ratings table: one aggregate rating per
//! (venue, platform). Deliberately independent of the connections table so
//! a cached value survives disconnect/reconnect and can serve as a stale
//! fallback indefinitely.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(CachedRatings::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(CachedRatings::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(CachedRatings::TenantId).uuid().not_null())
                    .col(ColumnDef::new(CachedRatings::VenueId).uuid().not_null())
                    .col(ColumnDef::new(CachedRatings::Platform).text().not_null())
                    .col(ColumnDef::new(CachedRatings::Rating).double().not_null())
                    .col(
                        ColumnDef::new(CachedRatings::RatingCount)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(CachedRatings::Attribution).text().null())
                    .col(
                        ColumnDef::new(CachedRatings::FetchedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("ux_cached_ratings_venue_platform")
                    .table(CachedRatings::Table)
                    .col(CachedRatings::VenueId)
                    .col(CachedRatings::Platform)
                    .unique()
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(CachedRatings::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum CachedRatings {
    Table,
    Id,
    TenantId,
    VenueId,
    Platform,
    Rating,
    RatingCount,
    Attribution,
    FetchedAt,
}
