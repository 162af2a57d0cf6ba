/// Runtime-tunable knobs that do not affect on-disk key derivation.
#[derive(Clone, Copy, Debug)]
pub struct Tunables {
    /// PBKDF2-HMAC-SHA256 iteration count used when deriving the master key.
    /// Changing this for an existing cache directory invalidates all
    /// previously-derived artifact names and keys.
    pub pbkdf2_iterations: u32,
    /// Maximum forward gap, in bytes, for which an open remote stream is
    /// reused instead of closed and reopened at the new offset.
    pub stream_forward_skip_bytes: u64,
    /// Chunk size used when pulling bytes from an open remote stream.
    pub stream_pull_chunk_bytes: usize,
}

impl Default for Tunables {
    fn default() -> Self {
        Self {
            pbkdf2_iterations: 100_000,
            stream_forward_skip_bytes: 10_000,
            stream_pull_chunk_bytes: 131_072,
        }
    }
}
