//! The pluggable key/value adapter (C11 §4.9.1): the key safe and every
//! higher layer talk only to this trait object, never to a concrete
//! backend, matching the "pluggable adapter" framing in the spec and
//! the teacher's own `dl_store`/`guard-service` trait-object plumbing.

use async_trait::async_trait;

use crate::error::StoreError;

/// One write in an atomic batch. `PutIndexed` additionally records a
/// secondary-index entry so `find_by_index` can look the row up by
/// something other than its primary key (e.g. a group's provisional
/// identity key).
#[derive(Debug, Clone)]
pub enum Op {
    Put {
        table: String,
        key: String,
        value: Vec<u8>,
    },
    PutIndexed {
        table: String,
        key: String,
        value: Vec<u8>,
        index_name: String,
        index_key: String,
    },
    Delete {
        table: String,
        key: String,
    },
}

#[async_trait]
pub trait KeyValueBackend: Send + Sync {
    async fn get(&self, table: &str, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    async fn put(&self, table: &str, key: &str, value: Vec<u8>) -> Result<(), StoreError>;

    async fn put_indexed(
        &self,
        table: &str,
        key: &str,
        value: Vec<u8>,
        index_name: &str,
        index_key: &str,
    ) -> Result<(), StoreError>;

    async fn delete(&self, table: &str, key: &str) -> Result<(), StoreError>;

    /// Every row in `table` whose secondary index `index_name` carries
    /// `index_key`. Used to find every group a not-yet-claimed
    /// provisional identity belongs to, for example.
    async fn find_by_index(&self, table: &str, index_name: &str, index_key: &str) -> Result<Vec<Vec<u8>>, StoreError>;

    /// Apply every op in `ops` atomically: either all land, or none do.
    async fn transaction(&self, ops: Vec<Op>) -> Result<(), StoreError>;

    async fn schema_version(&self) -> Result<u32, StoreError>;

    async fn set_schema_version(&self, version: u32) -> Result<(), StoreError>;
}
