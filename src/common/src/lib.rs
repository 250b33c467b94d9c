pub mod cli;
pub mod config;
pub mod filecache;
pub mod storage;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use filecache::{CatalogEntry, FileCache, UploadCatalog};
