use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};

use crate::db::entities::share_link;
use crate::db::now_ts;
use crate::error::Result;

#[derive(Clone)]
pub struct ShareStore {
    db: DatabaseConnection,
}

impl ShareStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn create(
        &self,
        file_id: i64,
        user_id: i64,
        token: &str,
        expires_at: Option<i64>,
    ) -> Result<share_link::Model> {
        let model = share_link::ActiveModel {
            file_id: Set(file_id),
            user_id: Set(user_id),
            token: Set(token.to_string()),
            expires_at: Set(expires_at),
            created_at: Set(now_ts()),
            ..Default::default()
        };
        Ok(model.insert(&self.db).await?)
    }

    pub async fn by_token(&self, token: &str) -> Result<Option<share_link::Model>> {
        Ok(share_link::Entity::find()
            .filter(share_link::Column::Token.eq(token))
            .one(&self.db)
            .await?)
    }

    pub async fn list_by_file(
        &self,
        file_id: i64,
        user_id: i64,
    ) -> Result<Vec<share_link::Model>> {
        Ok(share_link::Entity::find()
            .filter(share_link::Column::FileId.eq(file_id))
            .filter(share_link::Column::UserId.eq(user_id))
            .order_by_asc(share_link::Column::CreatedAt)
            .all(&self.db)
            .await?)
    }

    pub async fn delete(&self, link_id: i64, user_id: i64) -> Result<bool> {
        let res = share_link::Entity::delete_many()
            .filter(share_link::Column::Id.eq(link_id))
            .filter(share_link::Column::UserId.eq(user_id))
            .exec(&self.db)
            .await?;
        Ok(res.rows_affected > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_db;
    use crate::store::{FileStore, UserStore};

    #[tokio::test]
    async fn test_share_link_lifecycle() {
        let db = test_db().await;
        let user = UserStore::new(db.clone())
            .create("share@example.com", "hash")
            .await
            .unwrap();
        let file = FileStore::new(db.clone())
            .create(user.id, "shared.txt", "text/plain", 4, None)
            .await
            .unwrap();
        let shares = ShareStore::new(db);

        let link = shares
            .create(file.id, user.id, "token123", Some(now_ts() + 3600))
            .await
            .unwrap();

        let found = shares.by_token("token123").await.unwrap().unwrap();
        assert_eq!(found.id, link.id);
        assert!(shares.by_token("other").await.unwrap().is_none());

        let listed = shares.list_by_file(file.id, user.id).await.unwrap();
        assert_eq!(listed.len(), 1);

        // Only the owner may delete.
        assert!(!shares.delete(link.id, user.id + 1).await.unwrap());
        assert!(shares.delete(link.id, user.id).await.unwrap());
        assert!(shares.by_token("token123").await.unwrap().is_none());
    }
}
