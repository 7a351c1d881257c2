//! Media-ID resolver for free-form user input.
//!
//! Accepts a raw AniList ID, an AniList URL, or a MyAnimeList URL. Only the
//! MyAnimeList case needs a remote lookup, performed exactly once.

use async_trait::async_trait;
use lazy_regex::regex;

use crate::anilist::client::QueryError;

/// Seam for the one remote translation the resolver may perform.
///
/// Implemented by `AniListClient`; tests substitute a counting mock.
#[async_trait]
pub trait MalLookup: Send + Sync {
    /// Translate a MyAnimeList ID into the canonical AniList media ID.
    async fn mal_to_anilist(&self, mal_id: i64) -> Result<Option<i64>, QueryError>;
}

/// Resolve user input to an AniList media ID.
///
/// Rules, in order, first match wins:
/// 1. the whole input parses as a positive integer;
/// 2. an AniList URL (`anilist.co/anime/<id>`);
/// 3. a MyAnimeList URL (`myanimelist.net/anime/<id>`), translated through
///    `lookup` with a single call.
///
/// Returns `None` when no rule matches or the lookup finds nothing. A lookup
/// error is logged and treated as a miss; it is never retried.
pub async fn resolve_media_id(lookup: &dyn MalLookup, input: &str) -> Option<i64> {
    let input = input.trim();

    if let Ok(id) = input.parse::<i64>() {
        if id > 0 {
            return Some(id);
        }
    }

    if let Some(captures) = regex!(r"anilist\.co/anime/(\d+)").captures(input) {
        return captures[1].parse().ok();
    }

    let captures = regex!(r"myanimelist\.net/anime/(\d+)").captures(input)?;
    let mal_id: i64 = captures[1].parse().ok()?;

    match lookup.mal_to_anilist(mal_id).await {
        Ok(found) => found,
        Err(e) => {
            log::warn!("MAL lookup for {} failed: {}", mal_id, e);
            None
        }
    }
}
