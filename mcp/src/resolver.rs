//! Request resolution: turning "this movie / these seasons, maybe in 4K" into
//! a concrete Jellyseerr request.
//!
//! Creating a request is a two-step protocol:
//!
//! 1. `GET {movie|tv}/{id}` fetches the media details, which list the
//!    fulfillment services (Radarr/Sonarr instances) and, for TV, the seasons.
//! 2. `POST request` submits a payload naming one of those services and,
//!    optionally, a subset of the seasons.
//!
//! Details are fetched fresh on every call; service availability can change
//! between calls.
//!
//! ## Service selection
//!
//! In priority order: explicit `server_id`, explicit `service_slug`, then the
//! [`ServicePolicy`] slug for the media type (with a 4K suffix when asked),
//! the non-4K slug, and finally the first service the server listed.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::client::{ClientError, HttpMethod, JellyseerrApi};

/// Kind of catalog item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Movie,
    Tv,
}

impl MediaType {
    pub fn as_str(self) -> &'static str {
        match self {
            MediaType::Movie => "movie",
            MediaType::Tv => "tv",
        }
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MediaType {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "movie" => Ok(MediaType::Movie),
            "tv" => Ok(MediaType::Tv),
            other => Err(ClientError::InvalidArgument(format!(
                "Invalid media_type '{other}'. Must be 'movie' or 'tv'"
            ))),
        }
    }
}

/// A Radarr/Sonarr instance able to fulfill the request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FulfillmentService {
    pub id: i64,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One season of a TV show, kept whole so it can be echoed back verbatim.
///
/// Entries without a number (some servers list "Specials" that way) can
/// never be requested.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Season {
    #[serde(
        rename = "seasonNumber",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub season_number: Option<i64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// The subset of `GET {movie|tv}/{id}` the resolver inspects.
#[derive(Debug, Clone, Deserialize)]
pub struct MediaDetails {
    pub id: i64,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub services: Vec<FulfillmentService>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub seasons: Vec<Season>,
}

/// A list that is missing or `null` reads as empty.
fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

/// Body of `POST request`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestPayload {
    pub media_id: i64,
    pub media_type: MediaType,
    pub is4k: bool,
    pub server_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seasons: Option<Vec<Season>>,
}

/// Slug naming convention used when no service is chosen explicitly.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ServicePolicy {
    /// Slug of the movie backend (Radarr by default).
    pub movie: String,
    /// Slug of the TV backend (Sonarr by default).
    pub tv: String,
    /// Appended to a slug to address its 4K instance.
    pub uhd_suffix: String,
}

impl Default for ServicePolicy {
    fn default() -> Self {
        Self {
            movie: "radarr".into(),
            tv: "sonarr".into(),
            uhd_suffix: "_4k".into(),
        }
    }
}

impl ServicePolicy {
    /// Non-4K slug for a media type.
    pub fn base_slug(&self, media_type: MediaType) -> &str {
        match media_type {
            MediaType::Movie => &self.movie,
            MediaType::Tv => &self.tv,
        }
    }

    /// Slug to try first for a media type and quality tier.
    pub fn preferred_slug(&self, media_type: MediaType, is_4k: bool) -> String {
        let base = self.base_slug(media_type);
        if is_4k {
            format!("{base}{}", self.uhd_suffix)
        } else {
            base.to_string()
        }
    }
}

/// Arguments of a media request.
#[derive(Debug, Clone)]
pub struct MediaRequest {
    pub media_id: i64,
    pub media_type: MediaType,
    pub is_4k: bool,
    /// Season numbers to request; `None` lets the server request all of them.
    pub seasons: Option<Vec<i64>>,
    /// Takes precedence over `service_slug` when both are given.
    pub server_id: Option<i64>,
    pub service_slug: Option<String>,
}

impl MediaRequest {
    pub fn new(media_id: i64, media_type: MediaType) -> Self {
        Self {
            media_id,
            media_type,
            is_4k: false,
            seasons: None,
            server_id: None,
            service_slug: None,
        }
    }
}

/// Pick the fulfillment service for a request.
pub fn select_service<'a>(
    services: &'a [FulfillmentService],
    req: &MediaRequest,
    policy: &ServicePolicy,
) -> Result<&'a FulfillmentService, ClientError> {
    if services.is_empty() {
        return Err(ClientError::InvalidArgument(format!(
            "No services available for media_id {} (media_type: {})",
            req.media_id, req.media_type
        )));
    }

    if let Some(server_id) = req.server_id {
        return services.iter().find(|s| s.id == server_id).ok_or_else(|| {
            let ids: Vec<i64> = services.iter().map(|s| s.id).collect();
            ClientError::InvalidArgument(format!(
                "Server ID {server_id} not found for media_id {}. Available server IDs: {ids:?}",
                req.media_id
            ))
        });
    }

    let by_slug = move |slug: &str| services.iter().find(|s| s.slug.as_deref() == Some(slug));

    if let Some(slug) = req.service_slug.as_deref() {
        return by_slug(slug).ok_or_else(|| {
            let slugs: Vec<String> = services
                .iter()
                .filter_map(|s| s.slug.as_deref())
                .filter(|s| !s.is_empty())
                .map(|s| format!("'{s}'"))
                .collect();
            let available = if slugs.is_empty() {
                "none".to_string()
            } else {
                slugs.join(", ")
            };
            ClientError::InvalidArgument(format!(
                "Service slug '{slug}' not found for media_id {}. Available services: {available}",
                req.media_id
            ))
        });
    }

    let preferred = policy.preferred_slug(req.media_type, req.is_4k);
    let selected = by_slug(preferred.as_str())
        .or_else(|| {
            req.is_4k
                .then(|| by_slug(policy.base_slug(req.media_type)))
                .flatten()
        })
        .unwrap_or(&services[0]);
    Ok(selected)
}

/// Resolve requested season numbers against the seasons the server reports.
///
/// Returns the matching season objects in server order.
pub fn select_seasons(
    available: &[Season],
    requested: &[i64],
    media_id: i64,
) -> Result<Vec<Season>, ClientError> {
    let known: HashSet<i64> = available.iter().filter_map(|s| s.season_number).collect();

    let mut invalid: Vec<i64> = Vec::new();
    for n in requested {
        if !known.contains(n) && !invalid.contains(n) {
            invalid.push(*n);
        }
    }
    if !invalid.is_empty() {
        let numbers: Vec<i64> = available.iter().filter_map(|s| s.season_number).collect();
        return Err(ClientError::InvalidArgument(format!(
            "Invalid season numbers {invalid:?} for media_id {media_id}. Available seasons: {numbers:?}"
        )));
    }

    let wanted: HashSet<i64> = requested.iter().copied().collect();
    Ok(available
        .iter()
        .filter(|s| s.season_number.is_some_and(|n| wanted.contains(&n)))
        .cloned()
        .collect())
}

/// Build the `POST request` payload from fetched details.
pub fn build_payload(
    details: &MediaDetails,
    req: &MediaRequest,
    policy: &ServicePolicy,
) -> Result<RequestPayload, ClientError> {
    let service = select_service(&details.services, req, policy)?;
    debug!(
        media_id = req.media_id,
        server_id = service.id,
        slug = service.slug.as_deref().unwrap_or(""),
        "selected fulfillment service"
    );

    let seasons = match (req.media_type, req.seasons.as_deref()) {
        (MediaType::Tv, Some(requested)) => {
            Some(select_seasons(&details.seasons, requested, req.media_id)?)
        }
        (MediaType::Movie, Some(_)) => {
            debug!(media_id = req.media_id, "ignoring seasons for movie request");
            None
        }
        (_, None) => None,
    };

    Ok(RequestPayload {
        media_id: details.id,
        media_type: req.media_type,
        is4k: req.is_4k,
        server_id: service.id,
        seasons,
    })
}

/// Domain operations over a [`JellyseerrApi`].
#[derive(Clone)]
pub struct RequestResolver {
    api: Arc<dyn JellyseerrApi>,
    policy: ServicePolicy,
}

impl RequestResolver {
    pub fn new(api: Arc<dyn JellyseerrApi>, policy: ServicePolicy) -> Self {
        Self { api, policy }
    }

    /// `GET {movie|tv}/{id}` parsed into [`MediaDetails`].
    pub async fn media_details(
        &self,
        media_type: MediaType,
        media_id: i64,
    ) -> Result<MediaDetails, ClientError> {
        let endpoint = format!("{media_type}/{media_id}");
        let raw = self
            .api
            .request(HttpMethod::Get, &endpoint, None, None)
            .await?;
        serde_json::from_value(raw).map_err(|e| ClientError::Unexpected {
            method: HttpMethod::Get,
            url: self.api.url_for(&endpoint),
            kind: "InvalidMediaDetails",
            message: e.to_string(),
        })
    }

    /// Discover services for the media item, then create the request.
    pub async fn request_media(&self, req: &MediaRequest) -> Result<Value, ClientError> {
        let details = self.media_details(req.media_type, req.media_id).await?;
        let payload = build_payload(&details, req, &self.policy)?;
        info!(
            media_id = payload.media_id,
            media_type = %payload.media_type,
            server_id = payload.server_id,
            is4k = payload.is4k,
            seasons = payload.seasons.as_ref().map_or(0, Vec::len),
            "creating media request"
        );

        let body = serde_json::to_value(&payload).map_err(|e| ClientError::Unexpected {
            method: HttpMethod::Post,
            url: self.api.url_for("request"),
            kind: "Serialize",
            message: e.to_string(),
        })?;
        self.api
            .request(HttpMethod::Post, "request", None, Some(&body))
            .await
    }

    pub async fn get_request(&self, request_id: i64) -> Result<Value, ClientError> {
        self.api.get_request(request_id).await
    }

    pub async fn search_media(&self, query: &str, page: Option<u32>) -> Result<Value, ClientError> {
        self.api.search_media(query, page).await
    }

    /// Unvalidated passthrough for advanced callers.
    pub async fn raw_request(
        &self,
        method: HttpMethod,
        endpoint: &str,
        params: Option<&Map<String, Value>>,
        body: Option<&Value>,
    ) -> Result<Value, ClientError> {
        self.api.request(method, endpoint, params, body).await
    }
}
