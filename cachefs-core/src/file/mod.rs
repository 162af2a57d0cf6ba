pub mod blockcache;
pub mod cached;

pub use cached::{CachedFile, FileFlags};
