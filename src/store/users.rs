use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set, SqlErr,
};

use crate::db::entities::user;
use crate::db::now_ts;
use crate::error::{Result, ServerError};

#[derive(Clone)]
pub struct UserStore {
    db: DatabaseConnection,
}

impl UserStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Insert a new user. The unique index on `email` turns duplicate
    /// registrations into `EmailExists`.
    pub async fn create(&self, email: &str, password_hash: &str) -> Result<user::Model> {
        let now = now_ts();
        let model = user::ActiveModel {
            email: Set(email.to_string()),
            password_hash: Set(password_hash.to_string()),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        };

        match model.insert(&self.db).await {
            Ok(user) => Ok(user),
            Err(e) => {
                if matches!(e.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) {
                    Err(ServerError::EmailExists)
                } else {
                    Err(e.into())
                }
            }
        }
    }

    pub async fn by_email(&self, email: &str) -> Result<Option<user::Model>> {
        Ok(user::Entity::find()
            .filter(user::Column::Email.eq(email))
            .one(&self.db)
            .await?)
    }

    pub async fn by_id(&self, id: i64) -> Result<Option<user::Model>> {
        Ok(user::Entity::find_by_id(id).one(&self.db).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_db;

    #[tokio::test]
    async fn test_create_and_lookup() {
        let store = UserStore::new(test_db().await);

        let user = store.create("alice@example.com", "hash").await.unwrap();
        assert!(user.id > 0);

        let by_email = store.by_email("alice@example.com").await.unwrap().unwrap();
        assert_eq!(by_email.id, user.id);

        let by_id = store.by_id(user.id).await.unwrap().unwrap();
        assert_eq!(by_id.email, "alice@example.com");

        assert!(store.by_email("nobody@example.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_email_rejected() {
        let store = UserStore::new(test_db().await);

        store.create("bob@example.com", "hash1").await.unwrap();
        match store.create("bob@example.com", "hash2").await {
            Err(ServerError::EmailExists) => {}
            other => panic!("expected EmailExists, got {:?}", other.map(|u| u.id)),
        }
    }
}
