use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::sea_query::Expr;
use sea_orm::{ActiveValue::Set, ConnectionTrait, PaginatorTrait, QueryFilter, Statement};
use serde::{Deserialize, Serialize};

/// Lifecycle of a submission in the ledger.
///
/// Transitions only move forward: `Accepted -> Processing -> {Archived | Failed}`,
/// and `Accepted` may jump straight to a terminal state. Nothing leaves a
/// terminal state.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "snake_case")]
pub enum SubmissionStatus {
    /// Admitted by intake, waiting for a worker
    #[sea_orm(string_value = "accepted")]
    Accepted,
    /// Claimed by a worker
    #[sea_orm(string_value = "processing")]
    Processing,
    /// Artifact fetched and stored
    #[sea_orm(string_value = "archived")]
    Archived,
    /// Fetch or store failed
    #[sea_orm(string_value = "failed")]
    Failed,
}

impl SubmissionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Archived | Self::Failed)
    }

    pub fn can_transition_to(self, next: Self) -> bool {
        match (self, next) {
            (Self::Accepted, Self::Processing) => true,
            (Self::Accepted | Self::Processing, n) => n.is_terminal(),
            _ => false,
        }
    }
}

impl std::fmt::Display for SubmissionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let status_str = match self {
            SubmissionStatus::Accepted => "accepted",
            SubmissionStatus::Processing => "processing",
            SubmissionStatus::Archived => "archived",
            SubmissionStatus::Failed => "failed",
        };
        write!(f, "{}", status_str)
    }
}

/// One admitted submission attempt.
///
/// Exactly one row exists per admitted request, so the number of rows for an
/// `(assignment_id, submitter_email)` pair is that submitter's attempt count.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize)]
#[sea_orm(table_name = "submissions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub assignment_id: String,
    pub submitter_email: String,
    pub submission_url: String,
    pub status: SubmissionStatus,
    /// `FetchFailed` or `StoreFailed` once the submission has failed.
    pub failure_reason: Option<String>,
    /// Key of the archived artifact once the submission is archived.
    pub storage_key: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::assignment::Entity",
        from = "Column::AssignmentId",
        to = "super::assignment::Column::Id"
    )]
    Assignment,

    #[sea_orm(has_many = "super::submission_audit::Entity")]
    Audit,
}

impl Related<super::assignment::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Assignment.def()
    }
}

impl Related<super::submission_audit::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Audit.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

/// Fields intake supplies for a new ledger entry.
#[derive(Debug, Clone)]
pub struct NewSubmission<'a> {
    pub assignment_id: &'a str,
    pub submitter_email: &'a str,
    pub submission_url: &'a str,
    pub submitted_at: DateTime<Utc>,
}

/// Result of a worker trying to take ownership of a submission.
#[derive(Debug, Clone, PartialEq)]
pub enum Claim {
    /// The caller now owns processing; the row is `Processing`.
    Claimed(Model),
    /// Already `Archived` or `Failed`; nothing left to do.
    Terminal(Model),
    /// Another worker holds a fresh claim.
    InFlight,
    /// No such submission.
    Missing,
}

impl Model {
    /// Insert an `Accepted` submission only while the submitter has fewer than
    /// `max_attempts` rows for the assignment.
    ///
    /// The count and the insert happen in one statement, so two concurrent
    /// admissions cannot both take the last attempt. Returns `None` when the
    /// limit is already reached.
    pub async fn create_within_limit(
        db: &DatabaseConnection,
        new: NewSubmission<'_>,
        max_attempts: i32,
    ) -> Result<Option<Self>, DbErr> {
        let id = uuid::Uuid::new_v4().to_string();
        let stmt = Statement::from_sql_and_values(
            db.get_database_backend(),
            r#"INSERT INTO submissions
                   (id, assignment_id, submitter_email, submission_url, status, created_at, updated_at)
               SELECT ?, ?, ?, ?, ?, ?, ?
               WHERE (SELECT COUNT(*) FROM submissions
                      WHERE assignment_id = ? AND submitter_email = ?) < ?"#,
            [
                id.clone().into(),
                new.assignment_id.into(),
                new.submitter_email.into(),
                new.submission_url.into(),
                SubmissionStatus::Accepted.to_string().into(),
                new.submitted_at.into(),
                new.submitted_at.into(),
                new.assignment_id.into(),
                new.submitter_email.into(),
                i64::from(max_attempts).into(),
            ],
        );

        let result = db.execute(stmt).await?;
        if result.rows_affected() == 0 {
            return Ok(None);
        }
        Self::find_by_id(db, &id).await
    }

    pub async fn find_by_id(db: &DatabaseConnection, id: &str) -> Result<Option<Self>, DbErr> {
        Entity::find_by_id(id.to_string()).one(db).await
    }

    /// Number of admitted submissions for one submitter on one assignment.
    pub async fn count_attempts(
        db: &DatabaseConnection,
        assignment_id: &str,
        submitter_email: &str,
    ) -> Result<u64, DbErr> {
        Entity::find()
            .filter(Column::AssignmentId.eq(assignment_id))
            .filter(Column::SubmitterEmail.eq(submitter_email))
            .count(db)
            .await
    }

    /// Take ownership of a submission for processing.
    ///
    /// `Accepted` rows are claimed directly. A `Processing` row is re-claimed only
    /// when its last update is older than `stale_after`, which covers a worker that
    /// died mid-delivery. The update is conditional on the row still looking the
    /// way it did when read.
    pub async fn claim(
        db: &DatabaseConnection,
        id: &str,
        now: DateTime<Utc>,
        stale_after: chrono::Duration,
    ) -> Result<Claim, DbErr> {
        let Some(current) = Self::find_by_id(db, id).await? else {
            return Ok(Claim::Missing);
        };

        match current.status {
            s if s.is_terminal() => return Ok(Claim::Terminal(current)),
            SubmissionStatus::Processing if now - current.updated_at < stale_after => {
                return Ok(Claim::InFlight);
            }
            _ => {}
        }

        let result = Entity::update_many()
            .col_expr(Column::Status, Expr::value(SubmissionStatus::Processing))
            .col_expr(Column::UpdatedAt, Expr::value(now))
            .filter(Column::Id.eq(id))
            .filter(Column::Status.eq(current.status))
            .filter(Column::UpdatedAt.eq(current.updated_at))
            .exec(db)
            .await?;

        if result.rows_affected == 0 {
            return Ok(Claim::InFlight);
        }

        Ok(Claim::Claimed(Model {
            status: SubmissionStatus::Processing,
            updated_at: now,
            ..current
        }))
    }

    /// Move a non-terminal submission to `Archived` or `Failed`.
    ///
    /// Returns `false` when the row was already terminal (or missing), in which
    /// case nothing is written.
    pub async fn finalize<C: ConnectionTrait>(
        db: &C,
        id: &str,
        status: SubmissionStatus,
        failure_reason: Option<&str>,
        storage_key: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<bool, DbErr> {
        if !status.is_terminal() {
            return Err(DbErr::Custom(format!(
                "cannot finalize submission {id} as non-terminal status {status}"
            )));
        }

        let result = Entity::update_many()
            .col_expr(Column::Status, Expr::value(status))
            .col_expr(
                Column::FailureReason,
                Expr::value(failure_reason.map(str::to_string)),
            )
            .col_expr(Column::StorageKey, Expr::value(storage_key.map(str::to_string)))
            .col_expr(Column::UpdatedAt, Expr::value(now))
            .filter(Column::Id.eq(id))
            .filter(
                Column::Status.is_in([SubmissionStatus::Accepted, SubmissionStatus::Processing]),
            )
            .exec(db)
            .await?;

        Ok(result.rows_affected == 1)
    }

    /// Remove a submission that was admitted but never dispatched.
    ///
    /// Only `Accepted` rows are removed; anything a worker has touched stays.
    pub async fn rollback_admission(db: &DatabaseConnection, id: &str) -> Result<bool, DbErr> {
        let result = Entity::delete_many()
            .filter(Column::Id.eq(id))
            .filter(Column::Status.eq(SubmissionStatus::Accepted))
            .exec(db)
            .await?;
        Ok(result.rows_affected == 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::assignment::Model as AssignmentModel;
    use crate::test_utils::{seed_submission, setup_test_db};
    use chrono::Duration;

    async fn assignment(db: &DatabaseConnection, max_attempts: i32) -> AssignmentModel {
        AssignmentModel::create(
            db,
            "Assignment 1",
            "prof@example.com",
            10,
            max_attempts,
            Utc::now() + Duration::days(1),
        )
        .await
        .unwrap()
    }

    fn new_submission<'a>(assignment_id: &'a str, email: &'a str) -> NewSubmission<'a> {
        NewSubmission {
            assignment_id,
            submitter_email: email,
            submission_url: "https://example.com/hw1.zip",
            submitted_at: Utc::now(),
        }
    }

    #[test]
    fn test_transitions_are_monotonic() {
        use SubmissionStatus::*;
        assert!(Accepted.can_transition_to(Processing));
        assert!(Accepted.can_transition_to(Archived));
        assert!(Processing.can_transition_to(Failed));
        assert!(!Processing.can_transition_to(Accepted));
        assert!(!Archived.can_transition_to(Failed));
        assert!(!Failed.can_transition_to(Archived));
        assert!(!Failed.can_transition_to(Processing));
    }

    #[tokio::test]
    async fn test_count_attempts_scoped_to_pair() {
        let db = setup_test_db().await;
        let a = assignment(&db, 5).await;
        let b = assignment(&db, 5).await;

        seed_submission(&db, new_submission(&a.id, "s1@example.com")).await;
        seed_submission(&db, new_submission(&a.id, "s1@example.com")).await;
        seed_submission(&db, new_submission(&a.id, "s2@example.com")).await;
        seed_submission(&db, new_submission(&b.id, "s1@example.com")).await;

        assert_eq!(Model::count_attempts(&db, &a.id, "s1@example.com").await.unwrap(), 2);
        assert_eq!(Model::count_attempts(&db, &a.id, "s2@example.com").await.unwrap(), 1);
        assert_eq!(Model::count_attempts(&db, &b.id, "s1@example.com").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_create_within_limit_stops_at_max() {
        let db = setup_test_db().await;
        let a = assignment(&db, 2).await;

        let first = Model::create_within_limit(&db, new_submission(&a.id, "s@example.com"), 2)
            .await
            .unwrap();
        let second = Model::create_within_limit(&db, new_submission(&a.id, "s@example.com"), 2)
            .await
            .unwrap();
        let third = Model::create_within_limit(&db, new_submission(&a.id, "s@example.com"), 2)
            .await
            .unwrap();

        let first = first.expect("first attempt admitted");
        assert_eq!(first.status, SubmissionStatus::Accepted);
        assert!(second.is_some());
        assert!(third.is_none());
        assert_eq!(Model::count_attempts(&db, &a.id, "s@example.com").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_claim_then_finalize_once() {
        let db = setup_test_db().await;
        let a = assignment(&db, 3).await;
        let sub = seed_submission(&db, new_submission(&a.id, "s@example.com")).await;

        let claim = Model::claim(&db, &sub.id, Utc::now(), Duration::minutes(5))
            .await
            .unwrap();
        assert!(matches!(claim, Claim::Claimed(ref m) if m.status == SubmissionStatus::Processing));

        // A second worker sees a fresh claim.
        let again = Model::claim(&db, &sub.id, Utc::now(), Duration::minutes(5))
            .await
            .unwrap();
        assert_eq!(again, Claim::InFlight);

        let done = Model::finalize(
            &db,
            &sub.id,
            SubmissionStatus::Archived,
            None,
            Some("hw1.zip-20250101000000000Z"),
            Utc::now(),
        )
        .await
        .unwrap();
        assert!(done);

        let repeat = Model::finalize(
            &db,
            &sub.id,
            SubmissionStatus::Failed,
            Some("FetchFailed"),
            None,
            Utc::now(),
        )
        .await
        .unwrap();
        assert!(!repeat);

        let stored = Model::find_by_id(&db, &sub.id).await.unwrap().unwrap();
        assert_eq!(stored.status, SubmissionStatus::Archived);
        assert_eq!(stored.storage_key.as_deref(), Some("hw1.zip-20250101000000000Z"));
        assert!(stored.failure_reason.is_none());

        let terminal = Model::claim(&db, &sub.id, Utc::now(), Duration::minutes(5))
            .await
            .unwrap();
        assert!(matches!(terminal, Claim::Terminal(_)));
    }

    #[tokio::test]
    async fn test_stale_processing_is_reclaimed() {
        let db = setup_test_db().await;
        let a = assignment(&db, 3).await;
        let sub = seed_submission(&db, new_submission(&a.id, "s@example.com")).await;

        let long_ago = Utc::now() - Duration::hours(1);
        let first = Model::claim(&db, &sub.id, long_ago, Duration::minutes(5))
            .await
            .unwrap();
        assert!(matches!(first, Claim::Claimed(_)));

        let second = Model::claim(&db, &sub.id, Utc::now(), Duration::minutes(5))
            .await
            .unwrap();
        assert!(matches!(second, Claim::Claimed(_)));
    }

    #[tokio::test]
    async fn test_finalize_rejects_non_terminal_status() {
        let db = setup_test_db().await;
        let a = assignment(&db, 3).await;
        let sub = seed_submission(&db, new_submission(&a.id, "s@example.com")).await;

        let err = Model::finalize(
            &db,
            &sub.id,
            SubmissionStatus::Processing,
            None,
            None,
            Utc::now(),
        )
        .await;
        assert!(err.is_err());
    }

    #[tokio::test]
    async fn test_rollback_only_removes_accepted() {
        let db = setup_test_db().await;
        let a = assignment(&db, 3).await;
        let accepted = seed_submission(&db, new_submission(&a.id, "s@example.com")).await;
        let claimed = seed_submission(&db, new_submission(&a.id, "s@example.com")).await;
        Model::claim(&db, &claimed.id, Utc::now(), Duration::minutes(5))
            .await
            .unwrap();

        assert!(Model::rollback_admission(&db, &accepted.id).await.unwrap());
        assert!(!Model::rollback_admission(&db, &claimed.id).await.unwrap());
        assert!(Model::find_by_id(&db, &accepted.id).await.unwrap().is_none());
        assert!(Model::find_by_id(&db, &claimed.id).await.unwrap().is_some());
    }
}
