use std::collections::HashMap;

use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DbBackend, EntityTrait,
    QueryFilter, Set, SqlErr, Statement,
};

use crate::db::entities::block;
use crate::db::now_ts;
use crate::error::{Result, ServerError};

#[derive(Clone)]
pub struct BlockStore {
    db: DatabaseConnection,
}

impl BlockStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn find_by_digest(&self, digest: &str) -> Result<Option<block::Model>> {
        Ok(block::Entity::find()
            .filter(block::Column::Digest.eq(digest))
            .one(&self.db)
            .await?)
    }

    /// Insert a new block with ref_count = 1. Returns `None` when another
    /// writer won the insert race for this digest; the caller should re-run
    /// `find_by_digest` and increment instead.
    pub async fn try_create(
        &self,
        digest: &str,
        object_key: &str,
        size_bytes: i64,
    ) -> Result<Option<block::Model>> {
        let model = block::ActiveModel {
            digest: Set(digest.to_string()),
            object_key: Set(object_key.to_string()),
            size_bytes: Set(size_bytes),
            ref_count: Set(1),
            created_at: Set(now_ts()),
            ..Default::default()
        };

        match model.insert(&self.db).await {
            Ok(created) => Ok(Some(created)),
            Err(e) => {
                if matches!(e.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) {
                    Ok(None)
                } else {
                    Err(e.into())
                }
            }
        }
    }

    /// Atomic SQL-level increment.
    pub async fn inc_ref(&self, id: i64) -> Result<()> {
        block::Entity::update_many()
            .col_expr(
                block::Column::RefCount,
                Expr::col(block::Column::RefCount).add(1),
            )
            .filter(block::Column::Id.eq(id))
            .exec(&self.db)
            .await?;
        Ok(())
    }

    /// Atomic SQL-level decrement, returning the new count.
    pub async fn dec_ref(&self, id: i64) -> Result<i64> {
        let backend = self.db.get_database_backend();
        let sql = match backend {
            DbBackend::Postgres => {
                "UPDATE blocks SET ref_count = ref_count - 1 WHERE id = $1 RETURNING ref_count"
            }
            _ => "UPDATE blocks SET ref_count = ref_count - 1 WHERE id = ? RETURNING ref_count",
        };

        let row = self
            .db
            .query_one(Statement::from_sql_and_values(backend, sql, [id.into()]))
            .await?
            .ok_or_else(|| {
                ServerError::Internal(format!("decrement of missing block row id={id}"))
            })?;

        Ok(row.try_get::<i64>("", "ref_count")?)
    }

    /// Remove the row only while its count is still at or below zero, so a
    /// concurrent resurrection (dedup hit raising the count back to 1) wins
    /// over reclamation.
    pub async fn delete_if_zero(&self, id: i64) -> Result<bool> {
        let res = block::Entity::delete_many()
            .filter(block::Column::Id.eq(id))
            .filter(block::Column::RefCount.lte(0))
            .exec(&self.db)
            .await?;
        Ok(res.rows_affected > 0)
    }

    /// Fetch blocks by id, ordered per the input slice. Duplicate input ids
    /// yield duplicate entries; unknown ids are skipped.
    pub async fn by_ids(&self, ids: &[i64]) -> Result<Vec<block::Model>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let rows = block::Entity::find()
            .filter(block::Column::Id.is_in(ids.iter().copied()))
            .all(&self.db)
            .await?;

        let by_id: HashMap<i64, block::Model> =
            rows.into_iter().map(|b| (b.id, b)).collect();

        Ok(ids.iter().filter_map(|id| by_id.get(id).cloned()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_db;

    const DIGEST_A: &str =
        "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
    const DIGEST_B: &str =
        "bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb";

    #[tokio::test]
    async fn test_create_and_find() {
        let store = BlockStore::new(test_db().await);

        let created = store.try_create(DIGEST_A, DIGEST_A, 128).await.unwrap().unwrap();
        assert_eq!(created.ref_count, 1);
        assert_eq!(created.object_key, DIGEST_A);

        let found = store.find_by_digest(DIGEST_A).await.unwrap().unwrap();
        assert_eq!(found.id, created.id);

        assert!(store.find_by_digest(DIGEST_B).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_digest_loses_race() {
        let store = BlockStore::new(test_db().await);

        store.try_create(DIGEST_A, DIGEST_A, 128).await.unwrap().unwrap();
        // Second insert of the same digest must report the conflict, not fail.
        assert!(store.try_create(DIGEST_A, DIGEST_A, 128).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_ref_count_lifecycle() {
        let store = BlockStore::new(test_db().await);

        let b = store.try_create(DIGEST_A, DIGEST_A, 64).await.unwrap().unwrap();

        store.inc_ref(b.id).await.unwrap();
        store.inc_ref(b.id).await.unwrap();
        assert_eq!(store.find_by_digest(DIGEST_A).await.unwrap().unwrap().ref_count, 3);

        assert_eq!(store.dec_ref(b.id).await.unwrap(), 2);
        assert_eq!(store.dec_ref(b.id).await.unwrap(), 1);

        // Not yet reclaimable.
        assert!(!store.delete_if_zero(b.id).await.unwrap());

        assert_eq!(store.dec_ref(b.id).await.unwrap(), 0);
        assert!(store.delete_if_zero(b.id).await.unwrap());
        assert!(store.find_by_digest(DIGEST_A).await.unwrap().is_none());

        // Idempotent once gone.
        assert!(!store.delete_if_zero(b.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_by_ids_preserves_input_order() {
        let store = BlockStore::new(test_db().await);

        let a = store.try_create(DIGEST_A, DIGEST_A, 1).await.unwrap().unwrap();
        let b = store.try_create(DIGEST_B, DIGEST_B, 2).await.unwrap().unwrap();

        let ordered = store.by_ids(&[b.id, a.id, b.id]).await.unwrap();
        let ids: Vec<i64> = ordered.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![b.id, a.id, b.id]);

        // Unknown ids are skipped.
        let partial = store.by_ids(&[a.id, 9999]).await.unwrap();
        assert_eq!(partial.len(), 1);

        assert!(store.by_ids(&[]).await.unwrap().is_empty());
    }
}
