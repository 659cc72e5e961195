//! docdex - index versioned HTML reference documentation and look entries up
//! by approximate name.
//!
//! A build walks each version's corpus, derives searchable names from every
//! heading, merges entries found by several passes, and stores the result in
//! [redb](https://github.com/cberner/redb). Lookups run in two stages:
//! trigram candidates from an in-memory
//! [Tantivy](https://github.com/quickwit-oss/tantivy) index, then a
//! token-sort rerank with exact/prefix/substring bonuses.
//!
//! # Quick start
//!
//! ```no_run
//! use std::sync::atomic::AtomicBool;
//!
//! use docdex::{Catalog, DataDir, Profiles, Store, ingestion, search};
//!
//! let data_dir = DataDir::resolve(None).unwrap();
//! let store = Store::open(&data_dir.store_db()).unwrap();
//! store.set_source(2, "/srv/docs/v2").unwrap();
//!
//! let cancel = AtomicBool::new(false);
//! ingestion::build(&store, &Profiles::builtin(), Some(2), &cancel).unwrap();
//!
//! let catalog = Catalog::load(&store).unwrap();
//! for hit in search::search(&catalog, "msgbox", 2, 5).unwrap() {
//!     println!("{} ({:.1})", hit.name, hit.score);
//! }
//! let entry = search::resolve(&catalog, &store, "msgbox", 2, 1).unwrap();
//! if let Some(entry) = entry {
//!     println!("{entry}");
//! }
//! ```

pub mod aggregator;
pub mod catalog;
pub mod cli;
pub mod data_dir;
pub mod entry;
pub mod error;
pub mod html;
pub mod ingestion;
pub mod mcp;
pub mod names;
pub mod page_parser;
pub mod profile;
pub mod search;
pub mod server;
pub mod store;
pub mod text_util;
pub mod trigram_index;
pub mod walker;

pub use catalog::Catalog;
pub use data_dir::DataDir;
pub use entry::{DocVersion, Entry, EntryId};
pub use error::{Error, Result};
pub use profile::Profiles;
pub use store::Store;
