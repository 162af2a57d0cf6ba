use std::io::Read;

use crate::error::Result;
use crate::node::NodeInfo;
use crate::upath::UPath;

/// A readable byte stream returned by [`RemoteStore::get_content`].
/// Dropping the stream is how a consumer signals it is done with it;
/// there is no separate close call.
pub trait ContentStream: Read {}
impl<T: Read> ContentStream for T {}

/// The remote object store this crate caches against. Implementations are
/// expected to do their own retrying and connection management; any
/// failure that reaches the cache core is treated as non-recoverable for
/// that single call.
pub trait RemoteStore {
    /// Fetch the `[kind, attrs]` node info for `upath`.
    fn get_info(&self, upath: &UPath) -> Result<NodeInfo>;

    /// Open a stream of `length` bytes starting at `offset` within the
    /// object identified by `cap` (a file's `ro_uri`).
    fn get_content(&self, cap: &str, offset: u64, length: u64) -> Result<Box<dyn ContentStream>>;
}
