//! Codec instance configuration and driver dependencies.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use hcodec_hdi::{ComponentManager, SurfaceAllocator};

/// Default delay before a transitional state is considered stuck.
pub const DEFAULT_STUCK_TIMEOUT: Duration = Duration::from_secs(3);

/// Tunables of a codec instance.
///
/// ```
/// use std::time::Duration;
/// use hcodec::CodecOptions;
///
/// let options = CodecOptions::new()
///     .stuck_timeout(Duration::from_millis(500))
///     .sync_timeout(Duration::from_secs(5));
/// assert_eq!(options.stuck_timeout, Duration::from_millis(500));
/// ```
#[derive(Debug, Clone)]
pub struct CodecOptions {
    /// How long a transitional state may wait for the driver before the
    /// watchdog fires. Also the delay of a forced shutdown.
    pub stuck_timeout: Duration,
    /// Bound on every synchronous call. `None` waits forever.
    pub sync_timeout: Option<Duration>,
    /// Directory receiving raw dumps of every shared-memory buffer
    /// exchanged with the driver.
    pub dump_dir: Option<PathBuf>,
}

impl Default for CodecOptions {
    fn default() -> Self {
        Self {
            stuck_timeout: DEFAULT_STUCK_TIMEOUT,
            sync_timeout: None,
            dump_dir: None,
        }
    }
}

impl CodecOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn stuck_timeout(mut self, timeout: Duration) -> Self {
        self.stuck_timeout = timeout;
        self
    }

    #[must_use]
    pub fn sync_timeout(mut self, timeout: Duration) -> Self {
        self.sync_timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn dump_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dump_dir = Some(dir.into());
        self
    }
}

/// Driver services a codec instance talks to.
#[derive(Clone)]
pub struct HdiContext {
    pub manager: Arc<dyn ComponentManager>,
    pub surface_allocator: Arc<dyn SurfaceAllocator>,
}

impl HdiContext {
    #[must_use]
    pub fn new(
        manager: Arc<dyn ComponentManager>,
        surface_allocator: Arc<dyn SurfaceAllocator>,
    ) -> Self {
        Self {
            manager,
            surface_allocator,
        }
    }
}

impl fmt::Debug for HdiContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HdiContext").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = CodecOptions::default();
        assert_eq!(options.stuck_timeout, Duration::from_secs(3));
        assert!(options.sync_timeout.is_none());
        assert!(options.dump_dir.is_none());
    }

    #[test]
    fn test_builder() {
        let options = CodecOptions::new().dump_dir("/tmp/d");
        assert_eq!(options.dump_dir, Some(PathBuf::from("/tmp/d")));
    }
}
