use chrono::{DateTime, Utc};
use sea_orm::ActiveValue::Set;
use sea_orm::entity::prelude::*;

/// Valid range for `max_attempts`.
pub const MAX_ATTEMPTS_RANGE: std::ops::RangeInclusive<i32> = 1..=100;
/// Valid range for `points`.
pub const POINTS_RANGE: std::ops::RangeInclusive<i32> = 1..=10;

/// An assignment students can submit to.
///
/// Assignment management owns this table; the submission pipeline only reads the
/// attempt limit and deadline from it.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "assignments")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub name: String,
    /// Email of the account that created the assignment.
    pub owner_email: String,
    pub points: i32,
    /// Maximum number of admitted submissions per submitter.
    pub max_attempts: i32,
    /// Submissions after this instant are rejected.
    pub deadline: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::submission::Entity")]
    Submission,
}

impl Related<super::submission::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Submission.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Create a new assignment.
    ///
    /// Fails with `DbErr::Custom` when `points` or `max_attempts` fall outside
    /// their allowed ranges.
    pub async fn create(
        db: &DatabaseConnection,
        name: &str,
        owner_email: &str,
        points: i32,
        max_attempts: i32,
        deadline: DateTime<Utc>,
    ) -> Result<Self, DbErr> {
        if !POINTS_RANGE.contains(&points) {
            return Err(DbErr::Custom(format!(
                "points must be between {} and {}",
                POINTS_RANGE.start(),
                POINTS_RANGE.end()
            )));
        }
        if !MAX_ATTEMPTS_RANGE.contains(&max_attempts) {
            return Err(DbErr::Custom(format!(
                "max_attempts must be between {} and {}",
                MAX_ATTEMPTS_RANGE.start(),
                MAX_ATTEMPTS_RANGE.end()
            )));
        }

        let now = Utc::now();
        ActiveModel {
            id: Set(uuid::Uuid::new_v4().to_string()),
            name: Set(name.to_string()),
            owner_email: Set(owner_email.to_string()),
            points: Set(points),
            max_attempts: Set(max_attempts),
            deadline: Set(deadline),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(db)
        .await
    }

    pub async fn find_by_id(db: &DatabaseConnection, id: &str) -> Result<Option<Self>, DbErr> {
        Entity::find_by_id(id.to_string()).one(db).await
    }
}
