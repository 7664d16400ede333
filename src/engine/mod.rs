mod domain;
mod index;
mod loader;
mod reload;
mod traits;

pub use domain::{Ancestors, DomainName, DEFAULT_ANCESTOR_FLOOR};
pub use index::DomainIndex;
pub use loader::{parse, FileFormat, ParsedList, SourceLoader};
pub use reload::{
    jitter, jitter_with, IndexReader, IndexSnapshot, ReloadController, MAX_JITTER_PERCENT,
};
pub use traits::IndexSource;
