use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
};
use chrono::{DateTime, Utc};
use rand::rngs::OsRng;
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveValue::Set, QueryFilter};

/// An account allowed to submit. Owned by account management; the pipeline only
/// reads it to authenticate submitters.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "accounts")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    #[sea_orm(unique)]
    pub email: String,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Inserts a new account, hashing `password` with Argon2.
    pub async fn create(
        db: &DatabaseConnection,
        email: &str,
        password: &str,
        first_name: &str,
        last_name: &str,
    ) -> Result<Self, DbErr> {
        let email = email.trim();
        if email.is_empty() {
            return Err(DbErr::Custom("email cannot be empty".into()));
        }

        let now = Utc::now();
        let active = ActiveModel {
            id: Set(uuid::Uuid::new_v4().to_string()),
            email: Set(email.to_string()),
            password_hash: Set(Self::hash_password(password)?),
            first_name: Set(first_name.to_string()),
            last_name: Set(last_name.to_string()),
            created_at: Set(now),
            updated_at: Set(now),
        };

        active.insert(db).await
    }

    /// Returns the account registered under `email`, inserting it first if there is
    /// none. An existing account is left untouched, password included.
    ///
    /// The flag is `true` when the account was created by this call.
    pub async fn find_or_create(
        db: &DatabaseConnection,
        email: &str,
        password: &str,
        first_name: &str,
        last_name: &str,
    ) -> Result<(Self, bool), DbErr> {
        if let Some(existing) = Self::find_by_email(db, email).await? {
            return Ok((existing, false));
        }
        let created = Self::create(db, email, password, first_name, last_name).await?;
        Ok((created, true))
    }

    pub async fn find_by_email(
        db: &DatabaseConnection,
        email: &str,
    ) -> Result<Option<Self>, DbErr> {
        Entity::find()
            .filter(Column::Email.eq(email.trim()))
            .one(db)
            .await
    }

    /// Returns the account only if `password` matches its stored hash.
    pub async fn verify_credentials(
        db: &DatabaseConnection,
        email: &str,
        password: &str,
    ) -> Result<Option<Self>, DbErr> {
        Ok(Self::find_by_email(db, email)
            .await?
            .filter(|account| account.verify_password(password)))
    }

    pub fn hash_password(password: &str) -> Result<String, DbErr> {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| DbErr::Custom(format!("password hashing failed: {e}")))
    }

    pub fn verify_password(&self, password: &str) -> bool {
        let parsed = match PasswordHash::new(&self.password_hash) {
            Ok(parsed) => parsed,
            Err(_) => return false,
        };

        Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::Model;
    use crate::test_utils::setup_test_db;

    #[tokio::test]
    async fn test_verify_credentials() {
        let db = setup_test_db().await;
        Model::create(&db, "jane@example.com", "hunter2", "Jane", "Doe")
            .await
            .unwrap();

        let ok = Model::verify_credentials(&db, "jane@example.com", "hunter2")
            .await
            .unwrap();
        assert!(ok.is_some());

        let wrong = Model::verify_credentials(&db, "jane@example.com", "nope")
            .await
            .unwrap();
        assert!(wrong.is_none());

        let unknown = Model::verify_credentials(&db, "who@example.com", "hunter2")
            .await
            .unwrap();
        assert!(unknown.is_none());
    }

    #[tokio::test]
    async fn test_find_or_create_keeps_existing_account() {
        let db = setup_test_db().await;
        let (first, created) =
            Model::find_or_create(&db, "sam@example.com", "original", "Sam", "Lee")
                .await
                .unwrap();
        assert!(created);

        let (second, created) =
            Model::find_or_create(&db, " sam@example.com ", "changed", "Samuel", "Lee")
                .await
                .unwrap();
        assert!(!created);
        assert_eq!(second.id, first.id);
        assert_eq!(second.first_name, "Sam");
        assert!(second.verify_password("original"));
        assert!(!second.verify_password("changed"));
    }

    #[tokio::test]
    async fn test_duplicate_email_rejected() {
        let db = setup_test_db().await;
        Model::create(&db, "dup@example.com", "pw", "A", "B")
            .await
            .unwrap();
        let second = Model::create(&db, "dup@example.com", "pw", "C", "D").await;
        assert!(second.is_err());
    }
}
