use sea_orm_migration::prelude::*;

/// Durable record of messages moved to a DLQ, supplementing the bus-level
/// DLQ topic so operators can inspect/replay without consuming from it.
pub struct Migration;

impl MigrationName for Migration {
    fn name(&self) -> &str {
        "m20260101_000003_create_dead_letters_table"
    }
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(DeadLetters::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(DeadLetters::Id)
                            .uuid()
                            .primary_key()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(DeadLetters::OriginalTopic)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(DeadLetters::EventType).string().not_null())
                    .col(ColumnDef::new(DeadLetters::Payload).json_binary().not_null())
                    .col(
                        ColumnDef::new(DeadLetters::Attempts)
                            .integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(DeadLetters::LastError).text().null())
                    .col(
                        ColumnDef::new(DeadLetters::MovedToDlqAt)
                            .timestamp()
                            .not_null(),
                    )
                    .col(ColumnDef::new(DeadLetters::ReplayedAt).timestamp().null())
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(DeadLetters::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum DeadLetters {
    Table,
    Id,
    OriginalTopic,
    EventType,
    Payload,
    Attempts,
    LastError,
    MovedToDlqAt,
    ReplayedAt,
}
