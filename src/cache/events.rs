// src/cache/events.rs
//! Cache lifecycle events

use serde::Serialize;

/// What happened to a cache entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheEventKind {
    Hit,
    Miss,
    Set,
    Delete,
    Expired,
    Clear,
}

/// One cache lifecycle event
///
/// `key` is the affected cache key; `clear` events use `"*"` since they
/// affect every entry.
#[derive(Debug, Clone, Serialize)]
pub struct CacheEvent {
    pub kind: CacheEventKind,
    pub key: String,
}
