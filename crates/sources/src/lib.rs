mod emit;
mod loader;
mod location;

pub use emit::{canonical_blobs, package_blobs, write_catalog, write_catalog_to_dir};
pub use loader::{fetch_file, load, FetchResult, LoadError, Loader};
pub use location::Location;
