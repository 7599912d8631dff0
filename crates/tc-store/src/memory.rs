//! In-memory reference backend, used by this crate's own tests and by
//! callers' test suites so they don't need a real SQLite file.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::backend::{KeyValueBackend, Op};
use crate::error::StoreError;

#[derive(Default)]
struct State {
    rows: HashMap<(String, String), Vec<u8>>,
    index: HashMap<(String, String, String), Vec<String>>,
    schema_version: u32,
}

#[derive(Default)]
pub struct MemoryBackend {
    state: Mutex<State>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn apply(state: &mut State, op: Op) {
        match op {
            Op::Put { table, key, value } => {
                state.rows.insert((table, key), value);
            }
            Op::PutIndexed {
                table,
                key,
                value,
                index_name,
                index_key,
            } => {
                state.index.entry((table.clone(), index_name, index_key)).or_default().push(key.clone());
                state.rows.insert((table, key), value);
            }
            Op::Delete { table, key } => {
                state.rows.remove(&(table, key));
            }
        }
    }
}

#[async_trait]
impl KeyValueBackend for MemoryBackend {
    async fn get(&self, table: &str, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.state.lock().rows.get(&(table.to_string(), key.to_string())).cloned())
    }

    async fn put(&self, table: &str, key: &str, value: Vec<u8>) -> Result<(), StoreError> {
        self.state.lock().rows.insert((table.to_string(), key.to_string()), value);
        Ok(())
    }

    async fn put_indexed(
        &self,
        table: &str,
        key: &str,
        value: Vec<u8>,
        index_name: &str,
        index_key: &str,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock();
        Self::apply(
            &mut state,
            Op::PutIndexed {
                table: table.to_string(),
                key: key.to_string(),
                value,
                index_name: index_name.to_string(),
                index_key: index_key.to_string(),
            },
        );
        Ok(())
    }

    async fn delete(&self, table: &str, key: &str) -> Result<(), StoreError> {
        self.state.lock().rows.remove(&(table.to_string(), key.to_string()));
        Ok(())
    }

    async fn find_by_index(&self, table: &str, index_name: &str, index_key: &str) -> Result<Vec<Vec<u8>>, StoreError> {
        let state = self.state.lock();
        let keys = state
            .index
            .get(&(table.to_string(), index_name.to_string(), index_key.to_string()))
            .cloned()
            .unwrap_or_default();
        Ok(keys
            .into_iter()
            .filter_map(|key| state.rows.get(&(table.to_string(), key)).cloned())
            .collect())
    }

    async fn transaction(&self, ops: Vec<Op>) -> Result<(), StoreError> {
        let mut state = self.state.lock();
        for op in ops {
            Self::apply(&mut state, op);
        }
        Ok(())
    }

    async fn schema_version(&self) -> Result<u32, StoreError> {
        Ok(self.state.lock().schema_version)
    }

    async fn set_schema_version(&self, version: u32) -> Result<(), StoreError> {
        self.state.lock().schema_version = version;
        Ok(())
    }
}
