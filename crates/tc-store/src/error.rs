use thiserror::Error;

/// Errors raised by the local key store (C11). Mirrors the teacher's
/// `dl_store::StoreError` layering: lower-layer crypto failures are
/// wrapped with `#[from]`, this crate's own logic failures get their
/// own variants.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("crypto error: {0}")]
    Crypto(#[from] tc_primitives::PrimitiveError),

    #[error("wire codec error: {0}")]
    Wire(#[from] tc_wire::WireError),

    #[error("record not found: {table}/{key}")]
    NotFound { table: String, key: String },

    #[error("schema downgrade rejected: on-disk schema is v{on_disk}, refusing to open as v{requested}")]
    SchemaDowngrade { on_disk: u32, requested: u32 },

    #[error("migration error: {0}")]
    Migration(String),

    #[error("store already locked by another session")]
    AlreadyLocked,

    #[error("corrupt record: {0}")]
    Corrupt(&'static str),
}
