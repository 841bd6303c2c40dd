//! Reading linker map files.
//!
//! A linker map lists, for one linked binary, the object files that went into
//! it, the sections that came out, and where every symbol was placed and how
//! big it is. This crate reads the ld64 flavor of that report in a single
//! streaming pass and rolls symbol sizes up into a library -> object -> symbol
//! tree, which is what you want when asking "where did all these bytes come
//! from?"
//!
//! ```no_run
//! use linkmap::{LinkMapParser, TreeView};
//!
//! let parser = LinkMapParser::new();
//! let map = parser.parse_file("App-LinkMap-normal-arm64.txt", |_, _| ())?;
//! println!("{}", map.summary());
//!
//! let mut view = TreeView::from_linkmap(&map);
//! view.set_filter("swift");
//! for lib in view.visible() {
//!     println!("{} {}", lib.name(), lib.size());
//! }
//! # Ok::<(), linkmap::ParseError>(())
//! ```

pub mod addr;
pub mod classify;
pub mod error;
pub mod logging;
pub mod model;
pub mod parser;
pub mod scan;
pub mod tree;

pub use crate::addr::AddressIndex;
pub use crate::classify::{classify, LineOutcome};
pub use crate::error::ParseError;
pub use crate::model::{LinkMap, ObjectRecord, SectionRecord, Summary, SymbolRecord};
pub use crate::parser::{LinkMapParser, ParseJob};
pub use crate::scan::{scan, CancelToken, ScanConfig};
pub use crate::tree::{build_tree, FilteredNode, LibraryTree, NameFilter, TreeNode, TreeView};
