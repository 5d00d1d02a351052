use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};

use crate::db::entities::folder;
use crate::db::now_ts;
use crate::error::Result;

/// Upper bound on ancestry climbs, in case a cycle ever sneaks into the
/// parent chain.
const MAX_DEPTH: usize = 100;

#[derive(Clone)]
pub struct FolderStore {
    db: DatabaseConnection,
}

impl FolderStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn create(
        &self,
        user_id: i64,
        parent_id: Option<i64>,
        name: &str,
    ) -> Result<folder::Model> {
        let now = now_ts();
        let model = folder::ActiveModel {
            user_id: Set(user_id),
            parent_id: Set(parent_id),
            name: Set(name.to_string()),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        };
        Ok(model.insert(&self.db).await?)
    }

    pub async fn owned_by(&self, folder_id: i64, user_id: i64) -> Result<Option<folder::Model>> {
        Ok(folder::Entity::find()
            .filter(folder::Column::Id.eq(folder_id))
            .filter(folder::Column::UserId.eq(user_id))
            .one(&self.db)
            .await?)
    }

    /// Subfolders of `parent_id` (root when None), name order.
    pub async fn list_by_parent(
        &self,
        user_id: i64,
        parent_id: Option<i64>,
    ) -> Result<Vec<folder::Model>> {
        let mut query = folder::Entity::find().filter(folder::Column::UserId.eq(user_id));
        query = match parent_id {
            Some(id) => query.filter(folder::Column::ParentId.eq(id)),
            None => query.filter(folder::Column::ParentId.is_null()),
        };
        Ok(query.order_by_asc(folder::Column::Name).all(&self.db).await?)
    }

    pub async fn rename(
        &self,
        folder_id: i64,
        user_id: i64,
        new_name: &str,
    ) -> Result<Option<folder::Model>> {
        let res = folder::Entity::update_many()
            .col_expr(folder::Column::Name, Expr::value(new_name))
            .col_expr(folder::Column::UpdatedAt, Expr::value(now_ts()))
            .filter(folder::Column::Id.eq(folder_id))
            .filter(folder::Column::UserId.eq(user_id))
            .exec(&self.db)
            .await?;

        if res.rows_affected == 0 {
            return Ok(None);
        }
        self.owned_by(folder_id, user_id).await
    }

    /// Remove the folder row; cascades subfolders and contained files.
    pub async fn delete(&self, folder_id: i64, user_id: i64) -> Result<bool> {
        let res = folder::Entity::delete_many()
            .filter(folder::Column::Id.eq(folder_id))
            .filter(folder::Column::UserId.eq(user_id))
            .exec(&self.db)
            .await?;
        Ok(res.rows_affected > 0)
    }

    /// Ancestry path from the root down to the folder itself, resolved by
    /// iterative climb over `parent_id`.
    pub async fn breadcrumbs(&self, folder_id: i64, user_id: i64) -> Result<Vec<folder::Model>> {
        let mut crumbs = Vec::new();
        let mut current = self.owned_by(folder_id, user_id).await?;

        while let Some(f) = current {
            let parent_id = f.parent_id;
            crumbs.push(f);
            if crumbs.len() >= MAX_DEPTH {
                break;
            }
            current = match parent_id {
                Some(pid) => self.owned_by(pid, user_id).await?,
                None => None,
            };
        }

        crumbs.reverse();
        Ok(crumbs)
    }

    /// The folder plus all of its descendants, breadth-first.
    pub async fn subtree_ids(&self, folder_id: i64, user_id: i64) -> Result<Vec<i64>> {
        let mut all = vec![folder_id];
        let mut frontier = vec![folder_id];

        while let Some(current) = frontier.pop() {
            let children = self.list_by_parent(user_id, Some(current)).await?;
            for child in children {
                all.push(child.id);
                frontier.push(child.id);
            }
            if all.len() >= MAX_DEPTH * MAX_DEPTH {
                break;
            }
        }

        Ok(all)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_db;
    use crate::store::UserStore;

    async fn fixture() -> (FolderStore, i64) {
        let db = test_db().await;
        let user = UserStore::new(db.clone())
            .create("folders@example.com", "hash")
            .await
            .unwrap();
        (FolderStore::new(db), user.id)
    }

    #[tokio::test]
    async fn test_breadcrumbs_climb_to_root() {
        let (folders, user_id) = fixture().await;

        let root = folders.create(user_id, None, "docs").await.unwrap();
        let mid = folders.create(user_id, Some(root.id), "2026").await.unwrap();
        let leaf = folders.create(user_id, Some(mid.id), "q1").await.unwrap();

        let crumbs = folders.breadcrumbs(leaf.id, user_id).await.unwrap();
        let names: Vec<&str> = crumbs.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["docs", "2026", "q1"]);

        // Unknown or foreign folder yields an empty path.
        assert!(folders.breadcrumbs(leaf.id, user_id + 1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_subtree_collects_descendants() {
        let (folders, user_id) = fixture().await;

        let root = folders.create(user_id, None, "a").await.unwrap();
        let b = folders.create(user_id, Some(root.id), "b").await.unwrap();
        let c = folders.create(user_id, Some(b.id), "c").await.unwrap();
        folders.create(user_id, None, "unrelated").await.unwrap();

        let mut ids = folders.subtree_ids(root.id, user_id).await.unwrap();
        ids.sort();
        let mut expected = vec![root.id, b.id, c.id];
        expected.sort();
        assert_eq!(ids, expected);
    }

    #[tokio::test]
    async fn test_list_by_parent_root_vs_nested() {
        let (folders, user_id) = fixture().await;

        let root = folders.create(user_id, None, "top").await.unwrap();
        folders.create(user_id, Some(root.id), "inner").await.unwrap();

        let at_root = folders.list_by_parent(user_id, None).await.unwrap();
        assert_eq!(at_root.len(), 1);
        assert_eq!(at_root[0].name, "top");

        let nested = folders.list_by_parent(user_id, Some(root.id)).await.unwrap();
        assert_eq!(nested.len(), 1);
        assert_eq!(nested[0].name, "inner");
    }
}
