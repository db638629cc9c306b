//! Incremental Parser (C2) and its supporting modules.

pub mod export_map;
pub mod incremental;
pub mod paths;
pub mod stoplist;
pub mod typescript;

pub use export_map::ExportMap;
pub use incremental::{concretize_pending, parse_file, FileSource, FsFileSource, ParseOptions, ParseResult};
pub use stoplist::StopList;
pub use typescript::{ParseIssue, Severity};
