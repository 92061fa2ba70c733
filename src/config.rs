//! Store configuration

/// Environment variable holding the optional cascade depth limit
pub const MAX_DEPTH_ENV: &str = "STAUNCH_MAX_DISPATCH_DEPTH";

/// Configuration for a [`crate::Store`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreConfig {
    /// Maximum nesting of reentrant dispatches. `None` leaves cascades
    /// unbounded, so a response or effect cycle recurses until the stack
    /// overflows.
    pub max_dispatch_depth: Option<usize>,
}

impl StoreConfig {
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            max_dispatch_depth: parse_depth(std::env::var(MAX_DEPTH_ENV).ok().as_deref()),
        }
    }

    /// Bounds cascade depth; `0` means no limit, as in the environment.
    #[must_use]
    pub fn with_max_dispatch_depth(mut self, limit: usize) -> Self {
        self.max_dispatch_depth = (limit > 0).then_some(limit);
        self
    }
}

fn parse_depth(raw: Option<&str>) -> Option<usize> {
    let raw = raw?.trim();
    match raw.parse::<usize>() {
        Ok(0) => None,
        Ok(limit) => Some(limit),
        Err(_) => {
            tracing::warn!(value = %raw, var = MAX_DEPTH_ENV, "Ignoring unparseable dispatch depth");
            None
        }
    }
}
