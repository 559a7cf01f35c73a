//! Cache-aside reads of the top leaderboard and of single player ranks.

use tracing::debug;

use crate::{
    dao::models::{RankEntryEntity, UserId},
    error::ServiceError,
    state::SharedState,
};

/// A value together with where it was served from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cached<T> {
    pub value: T,
    /// `true` when the cache answered without touching the store.
    pub hit: bool,
}

impl<T> Cached<T> {
    fn hit(value: T) -> Self {
        Self { value, hit: true }
    }

    fn miss(value: T) -> Self {
        Self { value, hit: false }
    }
}

/// Resolve the requested top size against the configured bounds.
pub fn resolve_limit(state: &SharedState, requested: Option<usize>) -> Result<usize, ServiceError> {
    let config = state.config();
    match requested {
        None => Ok(config.top_limit),
        Some(limit) if (1..=config.max_top_limit).contains(&limit) => Ok(limit),
        Some(limit) => Err(ServiceError::InvalidInput(format!(
            "limit must be between 1 and {} (got {limit})",
            config.max_top_limit
        ))),
    }
}

/// First `limit` rank entries, served from the cache when possible.
///
/// Misses read the rank table and repopulate the cache; an empty leaderboard
/// is cached as an empty list.
pub async fn get_top(
    state: &SharedState,
    limit: Option<usize>,
) -> Result<Cached<Vec<RankEntryEntity>>, ServiceError> {
    let limit = resolve_limit(state, limit)?;

    if let Some(entries) = state.cache().get_top(limit).await {
        return Ok(Cached::hit(entries));
    }

    let generation = state.cache().top_generation();
    let entries = state.store().top_ranks(limit).await?;
    debug!(limit, entries = entries.len(), "loaded top leaderboard from store");
    state.cache().put_top_at(limit, &entries, generation).await;
    Ok(Cached::miss(entries))
}

/// Rank entry of `user_id`, served from the cache when possible.
///
/// Unknown players are reported as not found and never cached.
pub async fn get_user_rank(
    state: &SharedState,
    user_id: UserId,
) -> Result<Cached<RankEntryEntity>, ServiceError> {
    if user_id <= 0 {
        return Err(ServiceError::InvalidInput(format!(
            "user_id must be a positive integer (got {user_id})"
        )));
    }

    if let Some(entry) = state.cache().get_user_rank(user_id).await {
        return Ok(Cached::hit(entry));
    }

    let entry = state
        .store()
        .find_rank(user_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("user {user_id} has no rank yet")))?;
    state.cache().put_user_rank(&entry).await;
    Ok(Cached::miss(entry))
}
