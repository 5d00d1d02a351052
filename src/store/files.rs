use sea_orm::sea_query::{Expr, Func};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set,
};

use crate::db::entities::{file, file_block};
use crate::db::now_ts;
use crate::error::Result;

const SEARCH_LIMIT: u64 = 50;

#[derive(Clone)]
pub struct FileStore {
    db: DatabaseConnection,
}

impl FileStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn create(
        &self,
        user_id: i64,
        name: &str,
        mime_type: &str,
        total_size: i64,
        folder_id: Option<i64>,
    ) -> Result<file::Model> {
        let now = now_ts();
        let model = file::ActiveModel {
            user_id: Set(user_id),
            folder_id: Set(folder_id),
            name: Set(name.to_string()),
            mime_type: Set(mime_type.to_string()),
            total_size: Set(total_size),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        };
        Ok(model.insert(&self.db).await?)
    }

    /// Ownership check: the file only resolves for its owner.
    pub async fn owned_by(&self, file_id: i64, user_id: i64) -> Result<Option<file::Model>> {
        Ok(file::Entity::find()
            .filter(file::Column::Id.eq(file_id))
            .filter(file::Column::UserId.eq(user_id))
            .one(&self.db)
            .await?)
    }

    /// Fetch regardless of owner; used by the public share-link path only.
    pub async fn by_id(&self, file_id: i64) -> Result<Option<file::Model>> {
        Ok(file::Entity::find_by_id(file_id).one(&self.db).await?)
    }

    pub async fn list_by_folder(
        &self,
        user_id: i64,
        folder_id: Option<i64>,
    ) -> Result<Vec<file::Model>> {
        let mut query = file::Entity::find().filter(file::Column::UserId.eq(user_id));
        query = match folder_id {
            Some(id) => query.filter(file::Column::FolderId.eq(id)),
            None => query.filter(file::Column::FolderId.is_null()),
        };
        Ok(query.order_by_asc(file::Column::Name).all(&self.db).await?)
    }

    /// Case-insensitive substring search on name, capped at 50 results.
    pub async fn search(&self, user_id: i64, term: &str) -> Result<Vec<file::Model>> {
        Ok(file::Entity::find()
            .filter(file::Column::UserId.eq(user_id))
            .filter(
                Expr::expr(Func::lower(Expr::col(file::Column::Name)))
                    .like(format!("%{}%", term.to_lowercase())),
            )
            .order_by_asc(file::Column::Name)
            .limit(SEARCH_LIMIT)
            .all(&self.db)
            .await?)
    }

    pub async fn rename(
        &self,
        file_id: i64,
        user_id: i64,
        new_name: &str,
    ) -> Result<Option<file::Model>> {
        let res = file::Entity::update_many()
            .col_expr(file::Column::Name, Expr::value(new_name))
            .col_expr(file::Column::UpdatedAt, Expr::value(now_ts()))
            .filter(file::Column::Id.eq(file_id))
            .filter(file::Column::UserId.eq(user_id))
            .exec(&self.db)
            .await?;

        if res.rows_affected == 0 {
            return Ok(None);
        }
        self.owned_by(file_id, user_id).await
    }

    pub async fn move_to(
        &self,
        file_id: i64,
        user_id: i64,
        folder_id: Option<i64>,
    ) -> Result<Option<file::Model>> {
        let res = file::Entity::update_many()
            .col_expr(file::Column::FolderId, Expr::value(folder_id))
            .col_expr(file::Column::UpdatedAt, Expr::value(now_ts()))
            .filter(file::Column::Id.eq(file_id))
            .filter(file::Column::UserId.eq(user_id))
            .exec(&self.db)
            .await?;

        if res.rows_affected == 0 {
            return Ok(None);
        }
        self.owned_by(file_id, user_id).await
    }

    /// Remove the file row (cascades file_blocks). Returns false when the
    /// file does not exist or belongs to someone else. Block reference
    /// counts must be settled by the caller from a prior snapshot.
    pub async fn delete(&self, file_id: i64, user_id: i64) -> Result<bool> {
        let res = file::Entity::delete_many()
            .filter(file::Column::Id.eq(file_id))
            .filter(file::Column::UserId.eq(user_id))
            .exec(&self.db)
            .await?;
        Ok(res.rows_affected > 0)
    }

    /// Ordered block ids for a file.
    pub async fn block_ids(&self, file_id: i64) -> Result<Vec<i64>> {
        let rows = file_block::Entity::find()
            .filter(file_block::Column::FileId.eq(file_id))
            .order_by_asc(file_block::Column::BlockIndex)
            .all(&self.db)
            .await?;
        Ok(rows.into_iter().map(|fb| fb.block_id).collect())
    }

    /// Link ordered block ids to a file. Index i in the slice becomes
    /// block_index i.
    pub async fn link_blocks(&self, file_id: i64, block_ids: &[i64]) -> Result<()> {
        if block_ids.is_empty() {
            return Ok(());
        }

        let rows = block_ids.iter().enumerate().map(|(i, block_id)| {
            file_block::ActiveModel {
                file_id: Set(file_id),
                block_id: Set(*block_id),
                block_index: Set(i as i32),
                ..Default::default()
            }
        });

        file_block::Entity::insert_many(rows).exec(&self.db).await?;
        Ok(())
    }

    /// File ids contained in any of the given folders, for recursive folder
    /// deletion.
    pub async fn ids_in_folders(&self, user_id: i64, folder_ids: &[i64]) -> Result<Vec<i64>> {
        if folder_ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = file::Entity::find()
            .filter(file::Column::UserId.eq(user_id))
            .filter(file::Column::FolderId.is_in(folder_ids.iter().copied()))
            .all(&self.db)
            .await?;
        Ok(rows.into_iter().map(|f| f.id).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_db;
    use crate::store::{BlockStore, UserStore};

    async fn fixture() -> (FileStore, BlockStore, i64) {
        let db = test_db().await;
        let user = UserStore::new(db.clone())
            .create("files@example.com", "hash")
            .await
            .unwrap();
        (FileStore::new(db.clone()), BlockStore::new(db), user.id)
    }

    #[tokio::test]
    async fn test_create_and_ownership() {
        let (files, _, user_id) = fixture().await;

        let f = files
            .create(user_id, "report.pdf", "application/pdf", 1024, None)
            .await
            .unwrap();

        assert!(files.owned_by(f.id, user_id).await.unwrap().is_some());
        // A different user cannot resolve the file.
        assert!(files.owned_by(f.id, user_id + 1).await.unwrap().is_none());
        assert!(files.owned_by(9999, user_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_link_blocks_preserves_order() {
        let (files, blocks, user_id) = fixture().await;

        let f = files.create(user_id, "a.bin", "", 30, None).await.unwrap();

        let mut ids = Vec::new();
        for i in 0..3 {
            let digest = format!("{:064x}", i + 1);
            let b = blocks.try_create(&digest, &digest, 10).await.unwrap().unwrap();
            ids.push(b.id);
        }
        // Deliberately non-monotonic ordering.
        let ordered = vec![ids[2], ids[0], ids[1]];
        files.link_blocks(f.id, &ordered).await.unwrap();

        assert_eq!(files.block_ids(f.id).await.unwrap(), ordered);
    }

    #[tokio::test]
    async fn test_delete_cascades_file_blocks() {
        let (files, blocks, user_id) = fixture().await;

        let f = files.create(user_id, "b.bin", "", 10, None).await.unwrap();
        let digest = format!("{:064x}", 7);
        let b = blocks.try_create(&digest, &digest, 10).await.unwrap().unwrap();
        files.link_blocks(f.id, &[b.id]).await.unwrap();

        // Wrong owner cannot delete.
        assert!(!files.delete(f.id, user_id + 1).await.unwrap());
        assert!(files.delete(f.id, user_id).await.unwrap());
        assert!(files.block_ids(f.id).await.unwrap().is_empty());
        // Second delete is a no-op.
        assert!(!files.delete(f.id, user_id).await.unwrap());
    }

    #[tokio::test]
    async fn test_search_is_case_insensitive() {
        let (files, _, user_id) = fixture().await;

        files.create(user_id, "Quarterly Report.pdf", "", 1, None).await.unwrap();
        files.create(user_id, "notes.txt", "", 1, None).await.unwrap();

        let hits = files.search(user_id, "rEpOrT").await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].name, "Quarterly Report.pdf");

        assert!(files.search(user_id, "missing").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rename_and_move() {
        let (files, _, user_id) = fixture().await;

        let f = files.create(user_id, "old.txt", "", 1, None).await.unwrap();

        let renamed = files.rename(f.id, user_id, "new.txt").await.unwrap().unwrap();
        assert_eq!(renamed.name, "new.txt");

        // Non-owner rename resolves to nothing.
        assert!(files.rename(f.id, user_id + 1, "x").await.unwrap().is_none());
    }
}
