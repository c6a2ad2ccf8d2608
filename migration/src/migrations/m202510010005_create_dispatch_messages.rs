use sea_orm_migration::prelude::*;

#[derive(DeriveIden)]
enum DispatchMessages {
    Table,
    Id,
    Topic,
    SubmissionId,
    Payload,
    Deliveries,
    LeasedUntil,
    DeadLetteredAt,
    CreatedAt,
}

pub struct Migration;

impl MigrationName for Migration {
    fn name(&self) -> &str {
        "m202510010005_create_dispatch_messages"
    }
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(DispatchMessages::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(DispatchMessages::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(DispatchMessages::Topic).string().not_null())
                    .col(
                        ColumnDef::new(DispatchMessages::SubmissionId)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(DispatchMessages::Payload).text().not_null())
                    .col(
                        ColumnDef::new(DispatchMessages::Deliveries)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(DispatchMessages::LeasedUntil)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(DispatchMessages::DeadLetteredAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(DispatchMessages::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_dispatch_messages_topic")
                    .table(DispatchMessages::Table)
                    .col(DispatchMessages::Topic)
                    .if_not_exists()
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(DispatchMessages::Table).to_owned())
            .await
    }
}
