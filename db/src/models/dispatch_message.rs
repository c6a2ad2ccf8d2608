use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveValue::Set, Condition, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect,
};

/// A message waiting in the dispatch outbox.
///
/// A row lives until it is acknowledged. `leased_until` hides it from other
/// consumers while one holds it; `deliveries` counts hand-outs and doubles as
/// the optimistic version for leasing.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "dispatch_messages")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub topic: String,
    pub submission_id: String,
    #[sea_orm(column_type = "Text")]
    pub payload: String,
    pub deliveries: i32,
    pub leased_until: Option<DateTime<Utc>>,
    pub dead_lettered_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub async fn enqueue(
        db: &DatabaseConnection,
        topic: &str,
        submission_id: &str,
        payload: &str,
    ) -> Result<Self, DbErr> {
        ActiveModel {
            topic: Set(topic.to_string()),
            submission_id: Set(submission_id.to_string()),
            payload: Set(payload.to_string()),
            deliveries: Set(0),
            leased_until: Set(None),
            dead_lettered_at: Set(None),
            created_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(db)
        .await
    }

    /// Oldest live messages on `topic`, leased or not.
    pub async fn live(db: &DatabaseConnection, topic: &str, limit: u64) -> Result<Vec<Self>, DbErr> {
        Entity::find()
            .filter(Column::Topic.eq(topic))
            .filter(Column::DeadLetteredAt.is_null())
            .order_by_asc(Column::Id)
            .limit(limit)
            .all(db)
            .await
    }

    /// Oldest live messages on `topic` whose lease is free at `now`.
    pub async fn deliverable(
        db: &DatabaseConnection,
        topic: &str,
        now: DateTime<Utc>,
        limit: u64,
    ) -> Result<Vec<Self>, DbErr> {
        Entity::find()
            .filter(Column::Topic.eq(topic))
            .filter(Column::DeadLetteredAt.is_null())
            .filter(
                Condition::any()
                    .add(Column::LeasedUntil.is_null())
                    .add(Column::LeasedUntil.lte(now)),
            )
            .order_by_asc(Column::Id)
            .limit(limit)
            .all(db)
            .await
    }

    pub fn is_leased_at(&self, now: DateTime<Utc>) -> bool {
        self.leased_until.is_some_and(|until| until > now)
    }

    /// Lease this message until `until`, bumping its delivery count.
    ///
    /// Returns the leased row, or `None` if another consumer got there first.
    pub async fn try_lease(
        &self,
        db: &DatabaseConnection,
        until: DateTime<Utc>,
    ) -> Result<Option<Self>, DbErr> {
        let result = Entity::update_many()
            .col_expr(Column::Deliveries, Expr::value(self.deliveries + 1))
            .col_expr(Column::LeasedUntil, Expr::value(Some(until)))
            .filter(Column::Id.eq(self.id))
            .filter(Column::Deliveries.eq(self.deliveries))
            .filter(Column::DeadLetteredAt.is_null())
            .exec(db)
            .await?;

        if result.rows_affected == 0 {
            return Ok(None);
        }

        Ok(Some(Model {
            deliveries: self.deliveries + 1,
            leased_until: Some(until),
            ..self.clone()
        }))
    }

    /// Park a message that will not be handed out again.
    pub async fn dead_letter(&self, db: &DatabaseConnection, now: DateTime<Utc>) -> Result<bool, DbErr> {
        let result = Entity::update_many()
            .col_expr(Column::DeadLetteredAt, Expr::value(Some(now)))
            .col_expr(Column::LeasedUntil, Expr::value(Option::<DateTime<Utc>>::None))
            .filter(Column::Id.eq(self.id))
            .filter(Column::Deliveries.eq(self.deliveries))
            .exec(db)
            .await?;
        Ok(result.rows_affected == 1)
    }

    /// Remove an acknowledged message.
    pub async fn ack(db: &DatabaseConnection, id: i64) -> Result<(), DbErr> {
        Entity::delete_by_id(id).exec(db).await?;
        Ok(())
    }

    /// Live (not dead-lettered) messages on `topic`.
    pub async fn count_live(db: &DatabaseConnection, topic: &str) -> Result<u64, DbErr> {
        Entity::find()
            .filter(Column::Topic.eq(topic))
            .filter(Column::DeadLetteredAt.is_null())
            .count(db)
            .await
    }

    pub async fn count_dead_lettered(db: &DatabaseConnection, topic: &str) -> Result<u64, DbErr> {
        Entity::find()
            .filter(Column::Topic.eq(topic))
            .filter(Column::DeadLetteredAt.is_not_null())
            .count(db)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::Model;
    use crate::test_utils::setup_test_db;
    use chrono::{Duration, Utc};

    #[tokio::test]
    async fn test_lease_is_exclusive() {
        let db = setup_test_db().await;
        let msg = Model::enqueue(&db, "submissions", "sub-1", "{}").await.unwrap();

        let until = Utc::now() + Duration::minutes(5);
        let leased = msg.try_lease(&db, until).await.unwrap().unwrap();
        assert_eq!(leased.deliveries, 1);
        assert!(leased.is_leased_at(Utc::now()));

        // Stale copy loses the race.
        assert!(msg.try_lease(&db, until).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_ack_removes_and_dead_letter_hides() {
        let db = setup_test_db().await;
        let a = Model::enqueue(&db, "submissions", "sub-a", "{}").await.unwrap();
        let b = Model::enqueue(&db, "submissions", "sub-b", "{}").await.unwrap();
        Model::enqueue(&db, "other", "sub-c", "{}").await.unwrap();

        assert_eq!(Model::count_live(&db, "submissions").await.unwrap(), 2);

        Model::ack(&db, a.id).await.unwrap();
        assert!(b.dead_letter(&db, Utc::now()).await.unwrap());

        assert_eq!(Model::count_live(&db, "submissions").await.unwrap(), 0);
        assert_eq!(Model::count_dead_lettered(&db, "submissions").await.unwrap(), 1);
        assert!(Model::live(&db, "submissions", 10).await.unwrap().is_empty());
        assert_eq!(Model::live(&db, "other", 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_deliverable_skips_active_leases() {
        let db = setup_test_db().await;
        let held = Model::enqueue(&db, "submissions", "sub-held", "{}").await.unwrap();
        let expired = Model::enqueue(&db, "submissions", "sub-expired", "{}").await.unwrap();
        let free = Model::enqueue(&db, "submissions", "sub-free", "{}").await.unwrap();

        let now = Utc::now();
        held.try_lease(&db, now + Duration::minutes(5)).await.unwrap().unwrap();
        expired.try_lease(&db, now - Duration::seconds(1)).await.unwrap().unwrap();

        let ids: Vec<_> = Model::deliverable(&db, "submissions", now, 10)
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.id)
            .collect();
        assert_eq!(ids, vec![expired.id, free.id]);
    }
}
