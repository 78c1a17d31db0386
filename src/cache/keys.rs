//! Cache key scheme: `prefix:owner:path?query`, invalidated by `prefix:owner*`.

use uuid::Uuid;

pub const ANONYMOUS: &str = "anonymous";

/// Key prefix for paginated task listings.
pub const TASKS_PREFIX: &str = "tasks";
/// Key prefix for single-task lookups.
pub const TASK_PREFIX: &str = "task";

fn owner_segment(owner: Option<Uuid>) -> String {
    owner.map_or_else(|| ANONYMOUS.to_string(), |id| id.to_string())
}

pub fn cache_key(prefix: &str, owner: Option<Uuid>, path_and_query: &str) -> String {
    format!("{}:{}:{}", prefix, owner_segment(owner), path_and_query)
}

/// Matches every key of `prefix` for `owner`, whatever the path or query.
pub fn invalidation_pattern(prefix: &str, owner: Option<Uuid>) -> String {
    format!("{}:{}*", prefix, owner_segment(owner))
}
