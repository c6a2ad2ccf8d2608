use sea_orm_migration::prelude::*;

#[derive(DeriveIden)]
enum SubmissionAudits {
    Table,
    Id,
    SubmissionId,
    SubmitterEmail,
    Outcome,
    FailureReason,
    StorageKey,
    SizeBytes,
    Notified,
    NotifiedAt,
    CreatedAt,
}

#[derive(DeriveIden)]
enum Submissions {
    Table,
    Id,
}

pub struct Migration;

impl MigrationName for Migration {
    fn name(&self) -> &str {
        "m202510010004_create_submission_audits"
    }
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(SubmissionAudits::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(SubmissionAudits::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(SubmissionAudits::SubmissionId)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(SubmissionAudits::SubmitterEmail)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(SubmissionAudits::Outcome).string().not_null())
                    .col(ColumnDef::new(SubmissionAudits::FailureReason).string().null())
                    .col(ColumnDef::new(SubmissionAudits::StorageKey).string().null())
                    .col(ColumnDef::new(SubmissionAudits::SizeBytes).big_integer().null())
                    .col(
                        ColumnDef::new(SubmissionAudits::Notified)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(SubmissionAudits::NotifiedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(SubmissionAudits::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .from(SubmissionAudits::Table, SubmissionAudits::SubmissionId)
                            .to(Submissions::Table, Submissions::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(SubmissionAudits::Table).to_owned())
            .await
    }
}
