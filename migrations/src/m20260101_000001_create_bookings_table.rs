use sea_orm_migration::prelude::*;

pub struct Migration;

impl MigrationName for Migration {
    fn name(&self) -> &str {
        "m20260101_000001_create_bookings_table"
    }
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Bookings::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Bookings::Id)
                            .uuid()
                            .primary_key()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Bookings::Tenant).string().not_null())
                    .col(ColumnDef::new(Bookings::UserId).uuid().not_null())
                    .col(ColumnDef::new(Bookings::EventId).uuid().not_null())
                    .col(ColumnDef::new(Bookings::ShowId).uuid().not_null())
                    .col(ColumnDef::new(Bookings::ZoneId).uuid().not_null())
                    .col(ColumnDef::new(Bookings::Quantity).integer().not_null())
                    .col(ColumnDef::new(Bookings::UnitPrice).decimal_len(12, 2).not_null())
                    .col(ColumnDef::new(Bookings::Total).decimal_len(12, 2).not_null())
                    .col(ColumnDef::new(Bookings::Currency).string().not_null())
                    .col(ColumnDef::new(Bookings::Status).string().not_null())
                    .col(
                        ColumnDef::new(Bookings::ReservationToken)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Bookings::ReferenceId).string().not_null())
                    .col(ColumnDef::new(Bookings::ExpiresAt).timestamp().null())
                    .col(ColumnDef::new(Bookings::ConfirmedAt).timestamp().null())
                    .col(ColumnDef::new(Bookings::PaymentId).string().null())
                    .col(ColumnDef::new(Bookings::CancelledAt).timestamp().null())
                    .col(ColumnDef::new(Bookings::CreatedAt).timestamp().not_null())
                    .col(ColumnDef::new(Bookings::UpdatedAt).timestamp().not_null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_bookings_reference_id")
                    .table(Bookings::Table)
                    .col(Bookings::ReferenceId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_bookings_user_id")
                    .table(Bookings::Table)
                    .col(Bookings::UserId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_bookings_status_expires_at")
                    .table(Bookings::Table)
                    .col(Bookings::Status)
                    .col(Bookings::ExpiresAt)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Bookings::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum Bookings {
    Table,
    Id,
    Tenant,
    UserId,
    EventId,
    ShowId,
    ZoneId,
    Quantity,
    UnitPrice,
    Total,
    Currency,
    Status,
    ReservationToken,
    ReferenceId,
    ExpiresAt,
    ConfirmedAt,
    PaymentId,
    CancelledAt,
    CreatedAt,
    UpdatedAt,
}
