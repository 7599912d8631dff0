//! Binary wire format for the trustchain: serializer primitives (C2),
//! the block envelope (C3), the nature catalog (C4), and per-nature
//! payload codecs (C5).
//!
//! Layout mirrors the layering of the format itself: `varint`/`reader`/
//! `writer` are the serializer primitives; `fields` are the fixed-size
//! newtypes built on them; `block` is the outer envelope; `nature` is
//! the closed operation catalog; `payloads` holds one module per nature
//! family.

pub mod block;
pub mod error;
pub mod fields;
pub mod nature;
pub mod payloads;
pub mod reader;
pub mod varint;
pub mod writer;

pub use block::{create_block, create_root_block, Block, CreatedBlock};
pub use error::WireError;
pub use nature::Nature;
