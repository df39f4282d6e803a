pub mod archive;
pub mod error;
pub mod extract;
pub mod hash;
pub mod index;
pub mod names;
pub mod scanner;

pub use archive::{archive, Archived, Archiver};
pub use error::{Error, Result};
pub use extract::{extract, Extractor, HashCheck};
pub use hash::HashAlgo;
pub use index::{FileEntry, Header, Index, SENTINEL};
pub use scanner::scan_directory;
