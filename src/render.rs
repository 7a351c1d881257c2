//! Pure rendering of announcement embeds.
//!
//! No network or persistence access: `(airing schedule, title preference)`
//! in, platform-agnostic `Embed` out. The bot shell maps `Embed` onto
//! whatever message type its chat platform uses.

use crate::anilist::{AiringSchedule, ExternalLink, MediaTitle, TitleFormat};

/// Embed color used when AniList has no dominant cover color (AniList blue).
pub const DEFAULT_EMBED_COLOR: u32 = 43_775;

/// Platform-agnostic announcement content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Embed {
    pub author_name: String,
    pub author_url: String,
    pub author_icon_url: String,
    pub color: u32,
    pub description: String,
    /// Airing time in unix seconds; shown as the embed timestamp.
    pub timestamp: i64,
    pub thumbnail: Option<String>,
    pub footer: String,
    pub fields: Vec<EmbedField>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
}

/// A streaming service worth linking in announcements.
pub struct StreamSite {
    pub name: &'static str,
    /// Custom emoji markup prepended to the link; empty when none exists.
    pub icon: &'static str,
    /// Extra per-site check; AniList sometimes lists non-stream pages
    /// (storefronts, info pages) under a streaming site's name.
    pub filter: Option<fn(&ExternalLink) -> bool>,
}

/// Fixed allow-list of recognized streaming sites.
pub static STREAMING_SITES: &[StreamSite] = &[
    StreamSite {
        name: "Amazon",
        icon: "",
        // Amazon links are only watchable when they point at a video detail page.
        filter: Some(|link| link.url.contains("/dp/") || link.url.contains("primevideo")),
    },
    StreamSite {
        name: "AnimeLab",
        icon: "",
        filter: None,
    },
    StreamSite {
        name: "Crunchyroll",
        icon: "",
        filter: None,
    },
    StreamSite {
        name: "Funimation",
        icon: "",
        filter: None,
    },
    StreamSite {
        name: "Hidive",
        icon: "",
        filter: None,
    },
    StreamSite {
        name: "Hulu",
        icon: "",
        filter: None,
    },
    StreamSite {
        name: "Netflix",
        icon: "",
        filter: None,
    },
    StreamSite {
        name: "VRV",
        icon: "",
        filter: None,
    },
];

/// Pick the display title for a preference, falling back to romaji.
///
/// Romaji is the universal fallback: AniList guarantees it, while native and
/// english may be absent.
pub fn get_title(title: &MediaTitle, format: TitleFormat) -> &str {
    match format {
        TitleFormat::Native => title.native.as_deref().unwrap_or(&title.romaji),
        TitleFormat::Romaji => &title.romaji,
        TitleFormat::English => title.english.as_deref().unwrap_or(&title.romaji),
    }
}

/// Parse a "#rrggbb" cover color into an embed color value.
fn parse_color(color: Option<&str>) -> u32 {
    color
        .and_then(|c| u32::from_str_radix(c.trim_start_matches('#'), 16).ok())
        .unwrap_or(DEFAULT_EMBED_COLOR)
}

/// External links recognized by the streaming-site allow-list.
fn allowed_stream_links(links: &[ExternalLink]) -> Vec<(&StreamSite, &ExternalLink)> {
    links
        .iter()
        .filter_map(|link| {
            let site = STREAMING_SITES.iter().find(|s| s.name == link.site)?;
            match site.filter {
                Some(filter) if !filter(link) => None,
                _ => Some((site, link)),
            }
        })
        .collect()
}

/// Build the announcement embed for an aired episode.
pub fn create_announcement_embed(airing: &AiringSchedule, title_format: TitleFormat) -> Embed {
    let media = &airing.media;
    let title = get_title(&media.title, title_format);
    let is_finale = media.episodes == Some(airing.episode);

    let description = format!(
        "Episode {} of [{}]({}) has just aired.{}",
        airing.episode,
        title,
        media.site_url,
        if is_finale { " This is the season finale." } else { "" }
    );

    let footer = [
        media.episodes.map(|count| format!("{} Episodes", count)),
        media.format.map(|f| format!("Format: {}", f.readable())),
    ]
    .into_iter()
    .flatten()
    .collect::<Vec<_>>()
    .join(" • ");

    let mut fields = Vec::new();
    let streams = allowed_stream_links(&media.external_links);
    if streams.is_empty() {
        fields.push(EmbedField {
            name: "Streams".to_string(),
            value: "No licensed streaming links available".to_string(),
        });
    } else {
        let value = streams
            .iter()
            .map(|(site, link)| {
                if site.icon.is_empty() {
                    format!("[{}]({})", link.site, link.url)
                } else {
                    format!("{} [{}]({})", site.icon, link.site, link.url)
                }
            })
            .collect::<Vec<_>>()
            .join(" | ");
        fields.push(EmbedField {
            name: "Streams".to_string(),
            value,
        });
        fields.push(EmbedField {
            name: "Notice".to_string(),
            value: "It may take some time for this episode to appear on the above streaming service(s).".to_string(),
        });
    }

    Embed {
        author_name: "AniList".to_string(),
        author_url: "https://anilist.co/".to_string(),
        author_icon_url: "https://anilist.co/img/logo_al.png".to_string(),
        color: parse_color(media.cover_image.color.as_deref()),
        description,
        timestamp: airing.airing_at,
        thumbnail: media.cover_image.large.clone(),
        footer,
        fields,
    }
}

/// Compact "time until airing" rendering, e.g. `2d 5h 30m`.
///
/// Used by the upcoming-episode listing; anything under a minute reads `<1m`.
pub fn format_time_until(seconds: i64) -> String {
    if seconds < 60 {
        return "<1m".to_string();
    }

    let days = seconds / 86_400;
    let hours = (seconds % 86_400) / 3_600;
    let minutes = (seconds % 3_600) / 60;

    let mut parts = Vec::new();
    if days > 0 {
        parts.push(format!("{}d", days));
    }
    if hours > 0 {
        parts.push(format!("{}h", hours));
    }
    if minutes > 0 {
        parts.push(format!("{}m", minutes));
    }
    parts.join(" ")
}
