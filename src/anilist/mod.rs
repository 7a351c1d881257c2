//! AniList catalog integration.
//!
//! The client wraps the paginated GraphQL schedule query into a single
//! logical call; the resolver turns free-form user input (ID, AniList URL,
//! MyAnimeList URL) into a canonical AniList media ID. Everything else in
//! the crate only consumes the plain structs in `model`.

pub mod client;
pub mod model;
pub mod resolver;

pub use client::{AniListClient, QueryError};
pub use model::{AiringSchedule, CoverImage, ExternalLink, Media, MediaFormat, MediaTitle, TitleFormat};
pub use resolver::{resolve_media_id, MalLookup};
