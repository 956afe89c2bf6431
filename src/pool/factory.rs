// src/pool/factory.rs
//! Resource kinds and the factory seam for constructing live handles
//!
//! The pool never knows what a handle actually is — the adapter layer
//! implements [`ResourceFactory`] and the pool only creates, shares, and
//! eventually closes handles through it.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::utils::errors::Result;

/// The two classes of expensive external resources the pool governs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// A configured REST API client (keep-alive sockets, auth headers)
    ApiClient,

    /// A headless browser session (an external process)
    BrowserSession,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 2] = [ResourceKind::ApiClient, ResourceKind::BrowserSession];

    /// Stable label used in logs and stats
    pub fn label(&self) -> &'static str {
        match self {
            ResourceKind::ApiClient => "api_client",
            ResourceKind::BrowserSession => "browser_session",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Constructs and tears down the handles the pool manages
///
/// `close` is invoked whenever the pool retires a handle: LRU eviction,
/// explicit release, idle reaping, and shutdown. Kinds without teardown
/// (API clients) can make it a no-op; browser sessions release their
/// underlying process here. Close failures are absorbed and logged by the
/// pool, never surfaced to the caller whose acquisition triggered them.
#[async_trait]
pub trait ResourceFactory: Send + Sync + 'static {
    type Handle: Send + Sync + 'static;

    /// Build a new live handle for `kind` from its configuration options
    async fn create(&self, kind: ResourceKind, options: &Value) -> Result<Self::Handle>;

    /// Release whatever the handle holds open
    async fn close(&self, kind: ResourceKind, handle: &Self::Handle) -> Result<()>;
}
