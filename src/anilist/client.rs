//! AniList GraphQL client.
//!
//! Wraps the paginated airing-schedule query into one logical call and
//! surfaces structured errors so the scheduling cycle can treat any failure
//! as "no results this cycle" without crashing.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};
use thiserror::Error;

use crate::anilist::model::AiringSchedule;
use crate::anilist::resolver::MalLookup;
use crate::core::config;

/// Airing schedules for a set of media IDs inside a time window.
///
/// `airingAt_greater` / `airingAt_lesser` are strict comparisons on the
/// AniList side; see `get_upcoming_episodes` for how the window edges map
/// onto them.
const SCHEDULE_QUERY: &str = r#"query($page: Int, $amount: Int = 50, $ids: [Int!]!, $nextDay: Int!, $dateStart: Int) {
  Page(page: $page, perPage: $amount) {
    pageInfo {
      hasNextPage
    }
    airingSchedules(notYetAired: true, mediaId_in: $ids, sort: TIME, airingAt_greater: $dateStart, airingAt_lesser: $nextDay) {
      media {
        id
        siteUrl
        format
        duration
        episodes
        title {
          native
          romaji
          english
        }
        coverImage {
          large
          color
        }
        externalLinks {
          site
          url
        }
      }
      id
      episode
      airingAt
      timeUntilAiring
    }
  }
}"#;

const MAL_ID_QUERY: &str = "query($malId: Int) { Media(idMal: $malId) { id } }";

/// Errors from a catalog query.
///
/// `Transport` covers network failures and timeouts; `Api` is a well-formed
/// GraphQL `errors` payload. Callers must treat both as an empty result for
/// the current cycle, never as a reason to stop scheduling.
#[derive(Error, Debug)]
pub enum QueryError {
    #[error("request to AniList failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("AniList returned an error payload: {0}")]
    Api(String),
}

#[derive(Deserialize)]
struct GraphQlResponse<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Option<Vec<GraphQlError>>,
}

#[derive(Deserialize)]
struct GraphQlError {
    message: String,
}

#[derive(Deserialize)]
struct PageData {
    #[serde(rename = "Page")]
    page: SchedulePage,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SchedulePage {
    page_info: PageInfo,
    #[serde(default)]
    airing_schedules: Vec<AiringSchedule>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageInfo {
    has_next_page: bool,
}

#[derive(Deserialize)]
struct MalMediaData {
    #[serde(rename = "Media")]
    media: Option<MalMedia>,
}

#[derive(Deserialize)]
struct MalMedia {
    id: i64,
}

/// HTTP client for the AniList GraphQL endpoint.
pub struct AniListClient {
    http: reqwest::Client,
    api_url: String,
}

impl AniListClient {
    /// Create a client against the configured endpoint (see `config::ANILIST_API_URL`).
    pub fn new() -> Result<Self, QueryError> {
        Self::with_api_url(config::ANILIST_API_URL.clone())
    }

    /// Create a client against an explicit endpoint. Used by tests.
    pub fn with_api_url(api_url: impl Into<String>) -> Result<Self, QueryError> {
        let http = reqwest::Client::builder()
            .timeout(config::anilist::http_timeout())
            .build()?;
        Ok(Self {
            http,
            api_url: api_url.into(),
        })
    }

    /// Run one GraphQL query and unwrap the `{data, errors}` envelope.
    async fn query<T: DeserializeOwned>(&self, query: &str, variables: JsonValue) -> Result<T, QueryError> {
        let response = self
            .http
            .post(&self.api_url)
            .json(&json!({ "query": query, "variables": variables }))
            .send()
            .await?
            .error_for_status()?;

        let envelope: GraphQlResponse<T> = response.json().await?;

        if let Some(errors) = envelope.errors {
            if !errors.is_empty() {
                let messages = errors.iter().map(|e| e.message.as_str()).collect::<Vec<_>>().join("; ");
                return Err(QueryError::Api(messages));
            }
        }

        envelope
            .data
            .ok_or_else(|| QueryError::Api("response contained no data".to_string()))
    }

    /// Fetch every airing schedule for `media_ids` with `start <= airingAt < end`
    /// (unix seconds), following pagination until exhausted.
    ///
    /// An empty ID set short-circuits to an empty result without a request.
    /// `per_page` overrides the endpoint's default page size (50) when set.
    pub async fn get_upcoming_episodes(
        &self,
        media_ids: &[i64],
        start: i64,
        end: i64,
        per_page: Option<u32>,
    ) -> Result<Vec<AiringSchedule>, QueryError> {
        if media_ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut upcoming = Vec::new();
        let mut page: u32 = 1;

        loop {
            // airingAt_greater is strict, so shift the left edge by one to make
            // the window start inclusive; airingAt_lesser keeps the end exclusive.
            let mut variables = json!({
                "page": page,
                "ids": media_ids,
                "dateStart": start - 1,
                "nextDay": end,
            });
            if let Some(amount) = per_page {
                variables["amount"] = amount.into();
            }

            let data: PageData = self.query(SCHEDULE_QUERY, variables).await?;
            upcoming.extend(data.page.airing_schedules);

            if !data.page.page_info.has_next_page {
                break;
            }
            page += 1;
        }

        Ok(upcoming)
    }
}

#[async_trait]
impl MalLookup for AniListClient {
    /// Translate a MyAnimeList ID into the canonical AniList media ID.
    /// One request, never retried.
    async fn mal_to_anilist(&self, mal_id: i64) -> Result<Option<i64>, QueryError> {
        let data: MalMediaData = self.query(MAL_ID_QUERY, json!({ "malId": mal_id })).await?;
        Ok(data.media.map(|m| m.id))
    }
}
