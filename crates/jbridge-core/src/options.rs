//! Interop context configuration

/// Options for an [`Interop`](crate::Interop) context
#[derive(Debug, Clone)]
pub struct InteropOptions {
    /// Memoise overload selection per call shape
    pub resolution_cache: bool,

    /// Maximum number of memoised call shapes; the cache is cleared when full
    pub resolution_cache_capacity: usize,

    /// Attach the calling thread on entry when it is not attached
    pub auto_attach: bool,

    /// Pending-actions queue depth above which enqueues are logged as warnings
    pub pending_warn_threshold: usize,
}

impl Default for InteropOptions {
    fn default() -> Self {
        Self {
            resolution_cache: true,
            resolution_cache_capacity: 4096,
            auto_attach: true,
            pending_warn_threshold: 1024,
        }
    }
}
