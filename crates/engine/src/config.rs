//! Service configuration.

use serde::{Deserialize, Serialize};

/// Configuration for [`crate::BasicProgressionService`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Update `last_accessed_at` when an instance is read
    pub touch_on_read: bool,

    /// Page size when a listing does not ask for one
    pub default_page_size: usize,

    /// Upper bound on requested page sizes
    pub max_page_size: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            touch_on_read: true,
            default_page_size: 20,
            max_page_size: 100,
        }
    }
}
