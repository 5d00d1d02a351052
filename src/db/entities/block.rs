//! Block entity (the unit of deduplicated storage)
//!
//! The digest doubles as the object-store key, so an existence check in the
//! store is a digest check. The unique index on `digest` is what makes the
//! concurrent-insert race resolvable.

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "blocks")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    /// 64-char hex SHA-256 of the block contents.
    #[sea_orm(unique)]
    pub digest: String,
    pub object_key: String,
    pub size_bytes: i64,
    pub ref_count: i64,
    pub created_at: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::file_block::Entity")]
    FileBlocks,
}

impl Related<super::file_block::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::FileBlocks.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
