//! Creates the venue_grants table: explicit per-venue access for managers,
//! with a narrower can_manage_reviews flag gating sync/reply actions.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(VenueGrants::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(VenueGrants::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(VenueGrants::TenantId).uuid().not_null())
                    .col(ColumnDef::new(VenueGrants::VenueId).uuid().not_null())
                    .col(ColumnDef::new(VenueGrants::UserId).uuid().not_null())
                    .col(
                        ColumnDef::new(VenueGrants::CanManageReviews)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(VenueGrants::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("ux_venue_grants_user_venue")
                    .table(VenueGrants::Table)
                    .col(VenueGrants::UserId)
                    .col(VenueGrants::VenueId)
                    .unique()
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(VenueGrants::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum VenueGrants {
    Table,
    Id,
    TenantId,
    VenueId,
    UserId,
    CanManageReviews,
    CreatedAt,
}
