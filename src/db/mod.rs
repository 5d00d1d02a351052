//! Metadata store connection and schema.

pub mod entities;

use sea_orm::{ConnectionTrait, Database, DatabaseConnection, DbBackend, DbErr, Statement};

/// Connect to the metadata store and make sure the schema exists.
pub async fn init_database(url: &str) -> Result<DatabaseConnection, DbErr> {
    let db = Database::connect(url).await?;
    db.ping().await?;
    create_tables(&db).await?;
    Ok(db)
}

/// Current time as epoch seconds, the storage representation of timestamps.
pub fn now_ts() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Create all tables and indexes if they don't exist.
async fn create_tables(db: &DatabaseConnection) -> Result<(), DbErr> {
    let backend = db.get_database_backend();

    // Auto-incrementing 64-bit primary key, spelled per backend.
    let big_pk = match backend {
        DbBackend::Postgres => "BIGSERIAL PRIMARY KEY",
        _ => "INTEGER PRIMARY KEY AUTOINCREMENT",
    };

    let ddl = [
        format!(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id {big_pk},
                email TEXT NOT NULL UNIQUE,
                password_hash TEXT NOT NULL,
                created_at BIGINT NOT NULL,
                updated_at BIGINT NOT NULL
            )
            "#
        ),
        format!(
            r#"
            CREATE TABLE IF NOT EXISTS folders (
                id {big_pk},
                user_id BIGINT NOT NULL,
                parent_id BIGINT,
                name TEXT NOT NULL,
                created_at BIGINT NOT NULL,
                updated_at BIGINT NOT NULL,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE,
                FOREIGN KEY (parent_id) REFERENCES folders(id) ON DELETE CASCADE
            )
            "#
        ),
        format!(
            r#"
            CREATE TABLE IF NOT EXISTS files (
                id {big_pk},
                user_id BIGINT NOT NULL,
                folder_id BIGINT,
                name TEXT NOT NULL,
                mime_type TEXT NOT NULL DEFAULT '',
                total_size BIGINT NOT NULL,
                created_at BIGINT NOT NULL,
                updated_at BIGINT NOT NULL,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE,
                FOREIGN KEY (folder_id) REFERENCES folders(id) ON DELETE CASCADE
            )
            "#
        ),
        format!(
            r#"
            CREATE TABLE IF NOT EXISTS blocks (
                id {big_pk},
                digest TEXT NOT NULL UNIQUE,
                object_key TEXT NOT NULL,
                size_bytes BIGINT NOT NULL,
                ref_count BIGINT NOT NULL DEFAULT 0,
                created_at BIGINT NOT NULL
            )
            "#
        ),
        format!(
            r#"
            CREATE TABLE IF NOT EXISTS file_blocks (
                id {big_pk},
                file_id BIGINT NOT NULL,
                block_id BIGINT NOT NULL,
                block_index INTEGER NOT NULL,
                FOREIGN KEY (file_id) REFERENCES files(id) ON DELETE CASCADE,
                FOREIGN KEY (block_id) REFERENCES blocks(id),
                UNIQUE (file_id, block_index)
            )
            "#
        ),
        format!(
            r#"
            CREATE TABLE IF NOT EXISTS share_links (
                id {big_pk},
                file_id BIGINT NOT NULL,
                user_id BIGINT NOT NULL,
                token TEXT NOT NULL UNIQUE,
                expires_at BIGINT,
                created_at BIGINT NOT NULL,
                FOREIGN KEY (file_id) REFERENCES files(id) ON DELETE CASCADE,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            )
            "#
        ),
    ];

    for statement in ddl {
        db.execute(Statement::from_string(backend, statement)).await?;
    }

    let indexes = [
        "CREATE INDEX IF NOT EXISTS idx_folders_user ON folders(user_id)",
        "CREATE INDEX IF NOT EXISTS idx_folders_parent ON folders(parent_id)",
        "CREATE INDEX IF NOT EXISTS idx_files_user ON files(user_id)",
        "CREATE INDEX IF NOT EXISTS idx_files_folder ON files(folder_id)",
        "CREATE INDEX IF NOT EXISTS idx_file_blocks_file ON file_blocks(file_id)",
        "CREATE INDEX IF NOT EXISTS idx_file_blocks_block ON file_blocks(block_id)",
        "CREATE INDEX IF NOT EXISTS idx_share_links_file ON share_links(file_id)",
    ];

    for statement in indexes {
        db.execute(Statement::from_string(backend, statement.to_string()))
            .await?;
    }

    Ok(())
}

/// In-memory database for tests. A single pooled connection keeps every
/// query on the same SQLite memory instance.
#[cfg(test)]
pub async fn test_db() -> DatabaseConnection {
    let mut options = sea_orm::ConnectOptions::new("sqlite::memory:".to_owned());
    options.max_connections(1).min_connections(1);
    let db = Database::connect(options).await.expect("in-memory database");
    create_tables(&db).await.expect("schema creation");
    db
}
