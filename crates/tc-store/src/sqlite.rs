//! SQLite-backed `KeyValueBackend`, grounded in the teacher's
//! `dl_store::db::Store`: WAL journal mode and foreign-key enforcement
//! are set at connection time (not inside a migration — SQLite forbids
//! changing `journal_mode` inside the transaction sqlx wraps every
//! migration in), and migrations are run via `sqlx::migrate!`.

use std::path::Path;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool};
use sqlx::Row;

use crate::backend::{KeyValueBackend, Op};
use crate::error::StoreError;

#[derive(Clone)]
pub struct SqliteBackend {
    pool: SqlitePool,
}

impl SqliteBackend {
    pub async fn open(db_path: &Path) -> Result<Self, StoreError> {
        let opts = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true);

        let pool = SqlitePool::connect_with(opts).await?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| StoreError::Migration(e.to_string()))?;

        Ok(Self { pool })
    }

    async fn put_row(&self, table: &str, key: &str, value: &[u8]) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO kv_rows (table_name, key, value) VALUES (?, ?, ?) ON CONFLICT(table_name, key) DO UPDATE SET value = excluded.value")
            .bind(table)
            .bind(key)
            .bind(value)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn put_index_row(&self, table: &str, index_name: &str, index_key: &str, key: &str) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO kv_index (table_name, index_name, index_key, key) VALUES (?, ?, ?, ?) ON CONFLICT(table_name, index_name, index_key, key) DO NOTHING",
        )
        .bind(table)
        .bind(index_name)
        .bind(index_key)
        .bind(key)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl KeyValueBackend for SqliteBackend {
    async fn get(&self, table: &str, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let row = sqlx::query("SELECT value FROM kv_rows WHERE table_name = ? AND key = ?")
            .bind(table)
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.get::<Vec<u8>, _>("value")))
    }

    async fn put(&self, table: &str, key: &str, value: Vec<u8>) -> Result<(), StoreError> {
        self.put_row(table, key, &value).await
    }

    async fn put_indexed(
        &self,
        table: &str,
        key: &str,
        value: Vec<u8>,
        index_name: &str,
        index_key: &str,
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("INSERT INTO kv_rows (table_name, key, value) VALUES (?, ?, ?) ON CONFLICT(table_name, key) DO UPDATE SET value = excluded.value")
            .bind(table)
            .bind(key)
            .bind(&value)
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            "INSERT INTO kv_index (table_name, index_name, index_key, key) VALUES (?, ?, ?, ?) ON CONFLICT(table_name, index_name, index_key, key) DO NOTHING",
        )
        .bind(table)
        .bind(index_name)
        .bind(index_key)
        .bind(key)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn delete(&self, table: &str, key: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM kv_rows WHERE table_name = ? AND key = ?")
            .bind(table)
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn find_by_index(&self, table: &str, index_name: &str, index_key: &str) -> Result<Vec<Vec<u8>>, StoreError> {
        let rows = sqlx::query(
            "SELECT r.value AS value FROM kv_index i JOIN kv_rows r \
             ON r.table_name = i.table_name AND r.key = i.key \
             WHERE i.table_name = ? AND i.index_name = ? AND i.index_key = ?",
        )
        .bind(table)
        .bind(index_name)
        .bind(index_key)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|r| r.get::<Vec<u8>, _>("value")).collect())
    }

    async fn transaction(&self, ops: Vec<Op>) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        for op in ops {
            match op {
                Op::Put { table, key, value } => {
                    sqlx::query("INSERT INTO kv_rows (table_name, key, value) VALUES (?, ?, ?) ON CONFLICT(table_name, key) DO UPDATE SET value = excluded.value")
                        .bind(table)
                        .bind(key)
                        .bind(value)
                        .execute(&mut *tx)
                        .await?;
                }
                Op::PutIndexed {
                    table,
                    key,
                    value,
                    index_name,
                    index_key,
                } => {
                    sqlx::query("INSERT INTO kv_rows (table_name, key, value) VALUES (?, ?, ?) ON CONFLICT(table_name, key) DO UPDATE SET value = excluded.value")
                        .bind(&table)
                        .bind(&key)
                        .bind(value)
                        .execute(&mut *tx)
                        .await?;
                    sqlx::query(
                        "INSERT INTO kv_index (table_name, index_name, index_key, key) VALUES (?, ?, ?, ?) ON CONFLICT(table_name, index_name, index_key, key) DO NOTHING",
                    )
                    .bind(table)
                    .bind(index_name)
                    .bind(index_key)
                    .bind(key)
                    .execute(&mut *tx)
                    .await?;
                }
                Op::Delete { table, key } => {
                    sqlx::query("DELETE FROM kv_rows WHERE table_name = ? AND key = ?")
                        .bind(table)
                        .bind(key)
                        .execute(&mut *tx)
                        .await?;
                }
            }
        }
        tx.commit().await?;
        Ok(())
    }

    async fn schema_version(&self) -> Result<u32, StoreError> {
        let row = sqlx::query("SELECT schema_version FROM kv_meta WHERE id = 0").fetch_one(&self.pool).await?;
        Ok(row.get::<i64, _>("schema_version") as u32)
    }

    async fn set_schema_version(&self, version: u32) -> Result<(), StoreError> {
        sqlx::query("UPDATE kv_meta SET schema_version = ? WHERE id = 0")
            .bind(version as i64)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    async fn open_temp() -> (SqliteBackend, std::path::PathBuf) {
        let path = std::env::temp_dir().join(format!("tc-store-test-{}.db", Uuid::new_v4()));
        let backend = SqliteBackend::open(&path).await.expect("open backend");
        (backend, path)
    }

    fn cleanup(path: &std::path::Path) {
        let _ = std::fs::remove_file(path);
        let _ = std::fs::remove_file(path.with_extension("db-wal"));
        let _ = std::fs::remove_file(path.with_extension("db-shm"));
    }

    #[tokio::test]
    async fn put_get_delete_roundtrip() {
        let (backend, path) = open_temp().await;
        backend.put("resource_keys", "r1", vec![1, 2, 3]).await.unwrap();
        assert_eq!(backend.get("resource_keys", "r1").await.unwrap(), Some(vec![1, 2, 3]));
        backend.delete("resource_keys", "r1").await.unwrap();
        assert_eq!(backend.get("resource_keys", "r1").await.unwrap(), None);
        cleanup(&path);
    }

    #[tokio::test]
    async fn schema_version_starts_at_zero_and_persists() {
        let (backend, path) = open_temp().await;
        assert_eq!(backend.schema_version().await.unwrap(), 0);
        backend.set_schema_version(3).await.unwrap();
        assert_eq!(backend.schema_version().await.unwrap(), 3);
        cleanup(&path);
    }

    #[tokio::test]
    async fn find_by_index_resolves_indexed_rows() {
        let (backend, path) = open_temp().await;
        backend
            .put_indexed("groups_pending_encryption_keys", "g1", vec![9], "provisional", "alice")
            .await
            .unwrap();
        let found = backend.find_by_index("groups_pending_encryption_keys", "provisional", "alice").await.unwrap();
        assert_eq!(found, vec![vec![9]]);
        cleanup(&path);
    }
}
