use sea_orm_migration::prelude::*;

pub struct Migration;

impl MigrationName for Migration {
    fn name(&self) -> &str {
        "m20260101_000002_create_saga_instances_table"
    }
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(SagaInstances::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(SagaInstances::Id)
                            .uuid()
                            .primary_key()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(SagaInstances::SagaType)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(SagaInstances::BookingId).uuid().not_null())
                    .col(ColumnDef::new(SagaInstances::Status).string().not_null())
                    .col(
                        ColumnDef::new(SagaInstances::CurrentStep)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(SagaInstances::Context).json_binary().not_null())
                    .col(
                        ColumnDef::new(SagaInstances::CompletedSteps)
                            .json_binary()
                            .not_null(),
                    )
                    .col(ColumnDef::new(SagaInstances::LastError).text().null())
                    .col(
                        ColumnDef::new(SagaInstances::CreatedAt)
                            .timestamp()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(SagaInstances::UpdatedAt)
                            .timestamp()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_saga_instances_booking_id")
                    .table(SagaInstances::Table)
                    .col(SagaInstances::BookingId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_saga_instances_status")
                    .table(SagaInstances::Table)
                    .col(SagaInstances::Status)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(SagaInstances::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum SagaInstances {
    Table,
    Id,
    SagaType,
    BookingId,
    Status,
    CurrentStep,
    Context,
    CompletedSteps,
    LastError,
    CreatedAt,
    UpdatedAt,
}
