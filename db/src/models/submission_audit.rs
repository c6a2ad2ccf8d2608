use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveValue::Set, ConnectionTrait, QueryFilter, QueryOrder};
use serde::{Deserialize, Serialize};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    #[sea_orm(string_value = "archived")]
    Archived,
    #[sea_orm(string_value = "failed")]
    Failed,
}

/// Append-only record of one finished processing run.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize)]
#[sea_orm(table_name = "submission_audits")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub submission_id: String,
    pub submitter_email: String,
    pub outcome: AuditOutcome,
    pub failure_reason: Option<String>,
    pub storage_key: Option<String>,
    pub size_bytes: Option<i64>,
    /// Whether the submitter notification was delivered.
    pub notified: bool,
    pub notified_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::submission::Entity",
        from = "Column::SubmissionId",
        to = "super::submission::Column::Id"
    )]
    Submission,
}

impl Related<super::submission::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Submission.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

#[derive(Debug, Clone)]
pub struct NewAuditEntry<'a> {
    pub submission_id: &'a str,
    pub submitter_email: &'a str,
    pub outcome: AuditOutcome,
    pub failure_reason: Option<&'a str>,
    pub storage_key: Option<&'a str>,
    pub size_bytes: Option<u64>,
    pub notified_at: Option<DateTime<Utc>>,
}

impl Model {
    pub async fn append<C: ConnectionTrait>(
        db: &C,
        entry: NewAuditEntry<'_>,
    ) -> Result<Self, DbErr> {
        let size_bytes = entry
            .size_bytes
            .map(i64::try_from)
            .transpose()
            .map_err(|_| DbErr::Custom("artifact size does not fit in i64".into()))?;

        ActiveModel {
            submission_id: Set(entry.submission_id.to_string()),
            submitter_email: Set(entry.submitter_email.to_string()),
            outcome: Set(entry.outcome),
            failure_reason: Set(entry.failure_reason.map(str::to_string)),
            storage_key: Set(entry.storage_key.map(str::to_string)),
            size_bytes: Set(size_bytes),
            notified: Set(entry.notified_at.is_some()),
            notified_at: Set(entry.notified_at),
            created_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(db)
        .await
    }

    pub async fn find_by_submission(
        db: &DatabaseConnection,
        submission_id: &str,
    ) -> Result<Vec<Self>, DbErr> {
        Entity::find()
            .filter(Column::SubmissionId.eq(submission_id))
            .order_by_asc(Column::Id)
            .all(db)
            .await
    }
}
