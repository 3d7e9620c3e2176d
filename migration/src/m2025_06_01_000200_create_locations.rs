//! Creates the locations table: business locations discovered under a
//! connection. The remote location identifier drives upsert conflict
//! resolution and is globally unique.

use sea_orm_migration::prelude::*;

use crate::m2025_06_01_000100_create_connections::Connections;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Locations::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Locations::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Locations::ConnectionId).uuid().not_null())
                    .col(
                        ColumnDef::new(Locations::RemoteLocationId)
                            .text()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Locations::DisplayName).text().not_null())
                    .col(ColumnDef::new(Locations::Address).text().null())
                    .col(ColumnDef::new(Locations::Phone).text().null())
                    .col(ColumnDef::new(Locations::Website).text().null())
                    .col(
                        ColumnDef::new(Locations::IsActive)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(Locations::LastSyncedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Locations::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Locations::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_locations_connection_id")
                            .from(Locations::Table, Locations::ConnectionId)
                            .to(Connections::Table, Connections::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("ux_locations_remote_location_id")
                    .table(Locations::Table)
                    .col(Locations::RemoteLocationId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("ix_locations_connection_id")
                    .table(Locations::Table)
                    .col(Locations::ConnectionId)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Locations::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum Locations {
    Table,
    Id,
    ConnectionId,
    RemoteLocationId,
    DisplayName,
    Address,
    Phone,
    Website,
    IsActive,
    LastSyncedAt,
    CreatedAt,
    UpdatedAt,
}
