//! artdb - An embedded analytical database index built on an Adaptive
//! Radix Tree.
//!
//! # Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                            artdb                                │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  ┌─────────────────────────────────────────────────────────┐   │
//! │  │                Index Layer (index/art/)                  │   │
//! │  │   Art → Node4/16/48/256 + Leaf → Prefix + NodeRef        │   │
//! │  │   lookup · range scan · insert · delete · merge          │   │
//! │  └─────────────────────────────────────────────────────────┘   │
//! │                              ↓                                  │
//! │  ┌─────────────────────────────────────────────────────────┐   │
//! │  │          Serialization (storage/writer, reader)          │   │
//! │  │     append-only byte streams over chained blocks         │   │
//! │  └─────────────────────────────────────────────────────────┘   │
//! │                              ↓                                  │
//! │  ┌─────────────────────────────────────────────────────────┐   │
//! │  │              Storage Layer (storage/)                    │   │
//! │  │        BlockManager + Block (CRC32 + chain header)       │   │
//! │  └─────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The index maps opaque, ordered byte keys (produced by the surrounding
//! database's key encoding) to row identifiers. Nodes adapt their layout
//! to their fan-out, compress shared key paths into per-node prefixes,
//! and move between memory and block storage transparently: a persisted
//! child is loaded the first time a traversal touches it ("swizzling").
//!
//! # Modules
//! - [`common`] - Shared primitives (BlockId, BlockPointer, RowId, Error)
//! - [`storage`] - Block file I/O, block format, sequential writer/reader
//! - [`index`] - The Adaptive Radix Tree
//!
//! # Quick Start
//! ```no_run
//! use std::sync::Arc;
//! use parking_lot::Mutex;
//! use artdb::{Art, BlockManager, RowId};
//!
//! let store = Arc::new(Mutex::new(BlockManager::create("my_index.idx").unwrap()));
//! let mut art = Art::new(store);
//!
//! art.insert(b"key", RowId::new(42)).unwrap();
//! assert_eq!(art.lookup(b"key").unwrap(), Some(RowId::new(42)));
//!
//! // Persist and remember the root coordinate
//! let root = art.persist().unwrap();
//! # let _ = root;
//! ```

pub mod common;
pub mod index;
pub mod storage;

// Re-export commonly used items at crate root for convenience
pub use common::config::BLOCK_SIZE;
pub use common::{BlockId, BlockPointer, Error, Result, RowId};

pub use index::{Art, RangeScan};
pub use storage::{BlockManager, BlockReader, BlockWriter};
