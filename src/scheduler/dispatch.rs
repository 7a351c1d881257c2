//! Announcement dispatcher: runs when an airing timer fires.
//!
//! Delivers the announcement to every channel watching the media item.
//! Matches are independent: a missing channel, a failed send, or a failed
//! thread creation never affects the other matches. The completion flag is
//! written only after every delivery attempt has been issued.

use std::sync::Arc;

use crate::anilist::{AiringSchedule, TitleFormat};
use crate::render;
use crate::scheduler::SchedulerDeps;
use crate::storage::{self, WatchConfig};

/// Announce one aired episode to every watching channel.
///
/// Never returns an error: each failure mode here is logged and contained,
/// because the worst acceptable outcome is one incomplete announcement.
pub async fn announce(deps: &SchedulerDeps, airing: &AiringSchedule) {
    // The timer has conclusively fired; a future cycle may re-queue this
    // airing ID should the catalog ever return it again.
    deps.state.remove(airing.id);

    let media_id = airing.media.id;
    let watches = {
        let conn = match storage::get_connection(&deps.db) {
            Ok(conn) => conn,
            Err(e) => {
                log::error!("Dispatch for media {}: no database connection: {}", media_id, e);
                return;
            }
        };
        match storage::watch::find_watches_for_media(&conn, media_id) {
            Ok(watches) => watches,
            Err(e) => {
                log::error!("Dispatch for media {}: failed to load watch configs: {}", media_id, e);
                return;
            }
        }
    };

    if watches.is_empty() {
        log::warn!(
            "No active watch configs for media {} at fire time (episode {})",
            media_id,
            airing.episode,
        );
        return;
    }

    for watch in &watches {
        announce_to_watch(deps, airing, watch).await;
    }

    // Only flag completion after every delivery attempt has been issued.
    if airing.media.episodes == Some(airing.episode) {
        mark_finale_completed(deps, airing).await;
    }
}

/// Deliver to a single watching channel; all failures stay local.
async fn announce_to_watch(deps: &SchedulerDeps, airing: &AiringSchedule, watch: &WatchConfig) {
    let Some(channel) = deps.gateway.resolve_channel(&watch.channel_id).await else {
        log::warn!(
            "Channel {} is gone, skipping announcement for media {}",
            watch.channel_id,
            watch.media_id,
        );
        return;
    };

    let title_format = lookup_title_format(deps, &channel.guild_id);
    let embed = render::create_announcement_embed(airing, title_format);

    let message = match deps
        .gateway
        .send_announcement(&channel, &embed, watch.ping_role.as_deref())
        .await
    {
        Ok(message) => message,
        Err(e) => {
            log::warn!("Failed to deliver announcement to channel {}: {}", channel.id, e);
            return;
        }
    };

    log::info!(
        "Announced {} episode {} to {}#{}",
        airing.media.title.romaji,
        airing.episode,
        channel.guild_id,
        channel.name,
    );

    if watch.create_threads {
        let name = format!(
            "{} Episode {} Discussion",
            render::get_title(&airing.media.title, title_format),
            airing.episode,
        );
        // Fire and forget: the primary message already went out, and a slow
        // or failing thread creation must not hold up the next channel's
        // announcement. The server's boost tier may no longer cover the
        // configured archive duration.
        let gateway = Arc::clone(&deps.gateway);
        let archive_minutes = watch.thread_archive.minutes();
        let channel_id = channel.id.clone();
        tokio::spawn(async move {
            if let Err(e) = gateway.start_thread(&message, &name, archive_minutes).await {
                log::warn!("Failed to create discussion thread in channel {}: {}", channel_id, e);
            }
        });
    }
}

/// Title preference of the channel's owning server, defaulting to romaji.
fn lookup_title_format(deps: &SchedulerDeps, guild_id: &str) -> TitleFormat {
    let conn = match storage::get_connection(&deps.db) {
        Ok(conn) => conn,
        Err(e) => {
            log::warn!("No database connection for server {} config: {}", guild_id, e);
            return TitleFormat::default();
        }
    };
    match storage::server::get_server_config(&conn, guild_id) {
        Ok(Some(config)) => config.title_format,
        Ok(None) => TitleFormat::default(),
        Err(e) => {
            log::warn!("Failed to load server {} config: {}", guild_id, e);
            TitleFormat::default()
        }
    }
}

/// Set `completed` on every watch of a finished show.
async fn mark_finale_completed(deps: &SchedulerDeps, airing: &AiringSchedule) {
    let conn = match storage::get_connection(&deps.db) {
        Ok(conn) => conn,
        Err(e) => {
            log::error!("Finale of media {}: no database connection: {}", airing.media.id, e);
            return;
        }
    };
    match storage::watch::mark_completed(&conn, airing.media.id) {
        Ok(count) => {
            log::info!(
                "{} finished with episode {}; marked {} watch config(s) completed",
                airing.media.title.romaji,
                airing.episode,
                count,
            );
        }
        Err(e) => {
            log::error!("Failed to mark media {} completed: {}", airing.media.id, e);
        }
    }
}
