use sea_orm_migration::prelude::*;

#[derive(DeriveIden)]
enum Submissions {
    Table,
    Id,
    AssignmentId,
    SubmitterEmail,
    SubmissionUrl,
    Status,
    FailureReason,
    StorageKey,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Assignments {
    Table,
    Id,
}

pub struct Migration;

impl MigrationName for Migration {
    fn name(&self) -> &str {
        "m202510010003_create_submissions"
    }
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Submissions::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Submissions::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Submissions::AssignmentId).string().not_null())
                    .col(ColumnDef::new(Submissions::SubmitterEmail).string().not_null())
                    .col(ColumnDef::new(Submissions::SubmissionUrl).string().not_null())
                    .col(
                        ColumnDef::new(Submissions::Status)
                            .string()
                            .not_null()
                            .default("accepted"),
                    )
                    .col(ColumnDef::new(Submissions::FailureReason).string().null())
                    .col(ColumnDef::new(Submissions::StorageKey).string().null())
                    .col(
                        ColumnDef::new(Submissions::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Submissions::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .from(Submissions::Table, Submissions::AssignmentId)
                            .to(Assignments::Table, Assignments::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Attempt counting filters on exactly this pair.
        manager
            .create_index(
                Index::create()
                    .name("idx_submissions_assignment_submitter")
                    .table(Submissions::Table)
                    .col(Submissions::AssignmentId)
                    .col(Submissions::SubmitterEmail)
                    .if_not_exists()
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Submissions::Table).to_owned())
            .await
    }
}
