//! Hierarchical node file format.
//!
//! A node file is an append-only binary file holding a tree of named
//! Group and Array nodes. Each node carries typed attributes; array nodes
//! also carry a binary payload (optionally zlib-compressed, always
//! checksummed). The layout is described in [`format`].
//!
//! [`BlockReader`] and [`BlockWriter`] deal in raw group and data blocks;
//! [`NodeFile`] builds on them to read and commit whole node trees.

pub mod codec;
pub mod compression;
pub mod format;
mod reader;
mod tree;
mod writer;

pub use codec::{validate_name, NodeHeader, NodeKind, PayloadInfo};
pub use compression::Codec;
pub use reader::{Block, BlockReader, ChildRef, DataBlock, FileHeader, GroupBlock};
pub use tree::{NodeFile, NodeOptions, NodeSnapshot, NodeSpec, PayloadRef};
pub use writer::BlockWriter;
