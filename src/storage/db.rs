use once_cell::sync::Lazy;
use sea_orm::{ConnectionTrait, Database, DatabaseConnection, DbErr};
use sea_orm_migration::SchemaManager;
use std::sync::Arc;
use tokio::sync::Mutex;

// Single upstream connection handle per process; lazily created once and
// reused for the process lifetime. No teardown path.
static DB_CONN: Lazy<Arc<Mutex<Option<DatabaseConnection>>>> =
    Lazy::new(|| Arc::new(Mutex::new(None)));

pub async fn init_db(database_url: &str) -> Result<DatabaseConnection, DbErr> {
    tracing::info!("Connecting to database: {}", database_url);

    // Handle special SQLite URL formats
    let db = if database_url == "sqlite::memory:" {
        Database::connect(database_url)
            .await
            .map_err(|e| DbErr::Custom(format!("Connection failed: {}", e)))?
    } else if let Some(path_str) = database_url.strip_prefix("sqlite://") {
        let path_str = path_str.split('?').next().unwrap_or(path_str);
        let path = std::path::Path::new(path_str);

        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| DbErr::Custom(format!("Failed to create DB directory: {}", e)))?;
                tracing::info!("Created database directory: {}", parent.display());
            }
        }

        if !path.exists() {
            std::fs::File::create(path)
                .map_err(|e| DbErr::Custom(format!("Failed to create DB file: {}", e)))?;
            tracing::info!("Created database file: {}", path.display());
        }

        Database::connect(database_url)
            .await
            .map_err(|e| DbErr::Custom(format!("Connection failed: {}", e)))?
    } else {
        return Err(DbErr::Custom("Invalid SQLite URL format".to_string()));
    };

    tracing::info!("Applying migrations...");
    let schema_manager = SchemaManager::new(&db);

    let migrations_applied = schema_manager
        .has_table("seaql_migrations")
        .await
        .unwrap_or(false);

    if !migrations_applied {
        tracing::info!("First run: executing all migration SQL files");

        let migrations = [
            include_str!("../../migrations/001_create_chats.sql"),
            include_str!("../../migrations/002_create_messages.sql"),
        ];

        for (i, sql) in migrations.iter().enumerate() {
            db.execute_unprepared(sql).await?;
            tracing::info!("Applied migration {}", i + 1);
        }

        db.execute_unprepared(
            r#"
            CREATE TABLE IF NOT EXISTS seaql_migrations (
                version TEXT PRIMARY KEY,
                applied_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .await?;

        for i in 1..=migrations.len() {
            db.execute_unprepared(&format!(
                "INSERT INTO seaql_migrations (version) VALUES ('m20250801_{:08}')",
                i * 100000
            ))
            .await?;
        }
    } else {
        tracing::info!("Migrations already applied, skipping");
    }

    // Store connection
    let mut conn = DB_CONN.lock().await;
    *conn = Some(db.clone());

    Ok(db)
}

pub async fn get_connection() -> Option<DatabaseConnection> {
    DB_CONN.lock().await.clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::Statement;
    use tempfile::TempDir;

    async fn has_table(db: &DatabaseConnection, name: &str) -> bool {
        db.query_one(Statement::from_string(
            db.get_database_backend(),
            format!(
                "SELECT name FROM sqlite_master WHERE type='table' AND name='{}'",
                name
            ),
        ))
        .await
        .unwrap()
        .is_some()
    }

    #[tokio::test]
    async fn test_init_db_creates_file() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");
        let url = format!("sqlite://{}", db_path.display());

        let db = init_db(&url).await.unwrap();

        assert!(db_path.exists());
        assert!(has_table(&db, "seaql_migrations").await);
    }

    #[tokio::test]
    async fn test_init_db_runs_migrations() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");
        let url = format!("sqlite://{}", db_path.display());

        let db = init_db(&url).await.unwrap();

        assert!(has_table(&db, "chats").await);
        assert!(has_table(&db, "chat_messages").await);
    }
}
