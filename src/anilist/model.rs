//! Plain data model for AniList catalog responses.

use serde::Deserialize;

/// Which title field announcements should display.
///
/// Stored per server; romaji is the universal fallback since AniList
/// guarantees it on every entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TitleFormat {
    Native,
    #[default]
    Romaji,
    English,
}

impl TitleFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            TitleFormat::Native => "NATIVE",
            TitleFormat::Romaji => "ROMAJI",
            TitleFormat::English => "ENGLISH",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "NATIVE" => Some(TitleFormat::Native),
            "ROMAJI" => Some(TitleFormat::Romaji),
            "ENGLISH" => Some(TitleFormat::English),
            _ => None,
        }
    }
}

/// One episode-airing event for a tracked media item.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiringSchedule {
    /// AniList's ID for this specific airing (not the media ID).
    pub id: i64,
    pub media: Media,
    pub episode: u32,
    /// Airing time in unix seconds.
    pub airing_at: i64,
    /// Seconds until airing, relative to when AniList answered.
    pub time_until_airing: i64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Media {
    pub id: i64,
    pub site_url: String,
    pub title: MediaTitle,
    #[serde(default)]
    pub format: Option<MediaFormat>,
    /// Episode length in minutes, when AniList knows it.
    #[serde(default)]
    pub duration: Option<u32>,
    /// Total episode count; absent while a season is still open-ended.
    #[serde(default)]
    pub episodes: Option<u32>,
    #[serde(default)]
    pub cover_image: CoverImage,
    #[serde(default)]
    pub external_links: Vec<ExternalLink>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MediaTitle {
    pub romaji: String,
    #[serde(default)]
    pub native: Option<String>,
    #[serde(default)]
    pub english: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MediaFormat {
    Tv,
    TvShort,
    Movie,
    Special,
    Ova,
    Ona,
    Music,
}

impl MediaFormat {
    /// Human-readable label for embed footers.
    pub fn readable(&self) -> &'static str {
        match self {
            MediaFormat::Tv => "TV",
            MediaFormat::TvShort => "TV Short",
            MediaFormat::Movie => "Movie",
            MediaFormat::Special => "Special",
            MediaFormat::Ova => "OVA",
            MediaFormat::Ona => "ONA",
            MediaFormat::Music => "Music",
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CoverImage {
    #[serde(default)]
    pub large: Option<String>,
    /// Dominant color as a "#rrggbb" hex string.
    #[serde(default)]
    pub color: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExternalLink {
    pub site: String,
    pub url: String,
}
