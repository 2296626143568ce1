//! External-call executor: the platform endpoint catalog
//!
//! Each endpoint id maps to exactly one read-oriented HTTPS call against the
//! content platform's Data or Analytics API, bearer-token authenticated,
//! with a fixed parameter set and a fixed output shape. Nested response
//! fields are normalized into flat objects and numeric-string statistics are
//! coerced to numbers.

use std::time::Duration;

use serde_json::{Map, Value};

use crate::error::StepError;
use crate::workflow::{ExternalCallConfig, OutputMap};

/// Default timeout for platform API requests.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Base URLs for the platform's Data and Analytics APIs.
#[derive(Debug, Clone)]
pub struct PlatformEndpoints {
    pub data_base: String,
    pub analytics_base: String,
}

impl Default for PlatformEndpoints {
    fn default() -> Self {
        Self {
            data_base: "https://www.googleapis.com/youtube/v3".to_string(),
            analytics_base: "https://youtubeanalytics.googleapis.com/v2".to_string(),
        }
    }
}

/// The closed endpoint catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    ChannelInfo,
    VideoInfo,
    VideoSearch,
    VideoComments,
    VideoCaptions,
    PlaylistItems,
    ChannelAnalytics,
}

impl Endpoint {
    pub fn from_id(id: &str) -> Option<Self> {
        match id {
            "channel-info" => Some(Endpoint::ChannelInfo),
            "video-info" => Some(Endpoint::VideoInfo),
            "video-search" => Some(Endpoint::VideoSearch),
            "video-comments" => Some(Endpoint::VideoComments),
            "video-captions" => Some(Endpoint::VideoCaptions),
            "playlist-items" => Some(Endpoint::PlaylistItems),
            "channel-analytics" => Some(Endpoint::ChannelAnalytics),
            _ => None,
        }
    }

    /// The fixed output shape, in declaration order. The compiler wires
    /// downstream inputs to the first of these.
    pub fn output_names(&self) -> &'static [&'static str] {
        match self {
            Endpoint::ChannelInfo => &[
                "title",
                "id",
                "description",
                "publishedAt",
                "subscriberCount",
                "viewCount",
                "videoCount",
            ],
            Endpoint::VideoInfo => &[
                "title",
                "id",
                "description",
                "channelId",
                "publishedAt",
                "duration",
                "viewCount",
                "likeCount",
                "commentCount",
            ],
            Endpoint::VideoSearch => &["results", "totalResults"],
            Endpoint::VideoComments => &["comments", "count"],
            Endpoint::VideoCaptions => &["captions", "count"],
            Endpoint::PlaylistItems => &["items", "count"],
            Endpoint::ChannelAnalytics => &["rows", "columns", "rowCount"],
        }
    }

    /// Parameters that must be present among config params or resolved
    /// inputs. The credential is required by every endpoint and listed
    /// separately.
    pub fn required_params(&self) -> &'static [&'static str] {
        match self {
            Endpoint::ChannelInfo => &["channelId"],
            Endpoint::VideoInfo => &["videoId"],
            Endpoint::VideoSearch => &["query"],
            Endpoint::VideoComments => &["videoId"],
            Endpoint::VideoCaptions => &["videoId"],
            Endpoint::PlaylistItems => &["playlistId"],
            Endpoint::ChannelAnalytics => &["channelId", "startDate", "endDate"],
        }
    }
}

pub struct ExternalCallExecutor {
    client: reqwest::Client,
    endpoints: PlatformEndpoints,
}

impl ExternalCallExecutor {
    pub fn new(endpoints: PlatformEndpoints) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .connect_timeout(Duration::from_secs(10))
            .user_agent("strand/0.1")
            .build()
            .expect("Failed to build HTTP client");
        Self { client, endpoints }
    }

    pub async fn execute(
        &self,
        cfg: &ExternalCallConfig,
        inputs: &OutputMap,
    ) -> Result<OutputMap, StepError> {
        let endpoint = Endpoint::from_id(&cfg.endpoint)
            .ok_or_else(|| StepError::UnknownEndpoint(cfg.endpoint.clone()))?;

        let token = credential(inputs).ok_or(StepError::MissingCredential)?;

        let params = ParamSet {
            inputs,
            config: &cfg.params,
        };
        let (url, query) = build_request(endpoint, &self.endpoints, &params)?;

        tracing::debug!(endpoint = %cfg.endpoint, url = %url, "calling platform API");

        let response = self
            .client
            .get(&url)
            .query(&query)
            .bearer_auth(token)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StepError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|e| StepError::Http(e.to_string()))?;

        Ok(normalize(endpoint, &payload))
    }
}

/// The bearer credential among resolved inputs.
fn credential(inputs: &OutputMap) -> Option<&str> {
    ["accessToken", "access_token"]
        .iter()
        .find_map(|key| inputs.get(*key))
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}

/// Runtime inputs win over design-time config params.
struct ParamSet<'a> {
    inputs: &'a OutputMap,
    config: &'a OutputMap,
}

impl ParamSet<'_> {
    fn get(&self, name: &str) -> Option<String> {
        self.inputs
            .get(name)
            .or_else(|| self.config.get(name))
            .map(param_string)
    }

    fn required(&self, name: &str) -> Result<String, StepError> {
        self.get(name)
            .ok_or_else(|| StepError::MissingInput(name.to_string()))
    }
}

fn param_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

type Query = Vec<(&'static str, String)>;

fn build_request(
    endpoint: Endpoint,
    bases: &PlatformEndpoints,
    params: &ParamSet<'_>,
) -> Result<(String, Query), StepError> {
    let (path, query): (&str, Query) = match endpoint {
        Endpoint::ChannelInfo => (
            "/channels",
            vec![
                ("part", "snippet,statistics".to_string()),
                ("id", params.required("channelId")?),
            ],
        ),
        Endpoint::VideoInfo => (
            "/videos",
            vec![
                ("part", "snippet,statistics,contentDetails".to_string()),
                ("id", params.required("videoId")?),
            ],
        ),
        Endpoint::VideoSearch => (
            "/search",
            vec![
                ("part", "snippet".to_string()),
                ("type", "video".to_string()),
                ("q", params.required("query")?),
                ("maxResults", params.get("maxResults").unwrap_or_else(|| "25".to_string())),
            ],
        ),
        Endpoint::VideoComments => (
            "/commentThreads",
            vec![
                ("part", "snippet".to_string()),
                ("videoId", params.required("videoId")?),
                ("maxResults", params.get("maxResults").unwrap_or_else(|| "100".to_string())),
            ],
        ),
        Endpoint::VideoCaptions => (
            "/captions",
            vec![
                ("part", "snippet".to_string()),
                ("videoId", params.required("videoId")?),
            ],
        ),
        Endpoint::PlaylistItems => (
            "/playlistItems",
            vec![
                ("part", "snippet,contentDetails".to_string()),
                ("playlistId", params.required("playlistId")?),
                ("maxResults", params.get("maxResults").unwrap_or_else(|| "50".to_string())),
            ],
        ),
        Endpoint::ChannelAnalytics => {
            let url = format!("{}/reports", bases.analytics_base);
            let query = vec![
                ("ids", format!("channel=={}", params.required("channelId")?)),
                ("startDate", params.required("startDate")?),
                ("endDate", params.required("endDate")?),
                (
                    "metrics",
                    params.get("metrics").unwrap_or_else(|| {
                        "views,estimatedMinutesWatched,subscribersGained".to_string()
                    }),
                ),
            ];
            return Ok((url, query));
        }
    };

    Ok((format!("{}{}", bases.data_base, path), query))
}

// ---------------------------------------------------------------------------
// Response normalization
// ---------------------------------------------------------------------------

fn normalize(endpoint: Endpoint, payload: &Value) -> OutputMap {
    match endpoint {
        Endpoint::ChannelInfo => normalize_channel(payload),
        Endpoint::VideoInfo => normalize_video(payload),
        Endpoint::VideoSearch => normalize_search(payload),
        Endpoint::VideoComments => normalize_comments(payload),
        Endpoint::VideoCaptions => normalize_captions(payload),
        Endpoint::PlaylistItems => normalize_playlist(payload),
        Endpoint::ChannelAnalytics => normalize_analytics(payload),
    }
}

/// Statistics arrive as numeric strings; coerce them.
fn coerce_number(value: &Value) -> Value {
    if let Some(s) = value.as_str() {
        if let Ok(n) = s.parse::<i64>() {
            return Value::from(n);
        }
        if let Ok(f) = s.parse::<f64>() {
            return Value::from(f);
        }
    }
    value.clone()
}

fn field(payload: &Value, path: &[&str]) -> Value {
    let mut current = payload;
    for key in path {
        match current.get(key) {
            Some(next) => current = next,
            None => return Value::Null,
        }
    }
    current.clone()
}

fn first_item(payload: &Value) -> Value {
    field(payload, &["items"])
        .as_array()
        .and_then(|a| a.first().cloned())
        .unwrap_or(Value::Null)
}

fn normalize_channel(payload: &Value) -> OutputMap {
    let item = first_item(payload);
    let mut out = Map::new();
    out.insert("id".into(), field(&item, &["id"]));
    out.insert("title".into(), field(&item, &["snippet", "title"]));
    out.insert("description".into(), field(&item, &["snippet", "description"]));
    out.insert("publishedAt".into(), field(&item, &["snippet", "publishedAt"]));
    out.insert(
        "subscriberCount".into(),
        coerce_number(&field(&item, &["statistics", "subscriberCount"])),
    );
    out.insert(
        "viewCount".into(),
        coerce_number(&field(&item, &["statistics", "viewCount"])),
    );
    out.insert(
        "videoCount".into(),
        coerce_number(&field(&item, &["statistics", "videoCount"])),
    );
    out
}

fn normalize_video(payload: &Value) -> OutputMap {
    let item = first_item(payload);
    let mut out = Map::new();
    out.insert("id".into(), field(&item, &["id"]));
    out.insert("title".into(), field(&item, &["snippet", "title"]));
    out.insert("description".into(), field(&item, &["snippet", "description"]));
    out.insert("channelId".into(), field(&item, &["snippet", "channelId"]));
    out.insert("publishedAt".into(), field(&item, &["snippet", "publishedAt"]));
    out.insert("duration".into(), field(&item, &["contentDetails", "duration"]));
    out.insert(
        "viewCount".into(),
        coerce_number(&field(&item, &["statistics", "viewCount"])),
    );
    out.insert(
        "likeCount".into(),
        coerce_number(&field(&item, &["statistics", "likeCount"])),
    );
    out.insert(
        "commentCount".into(),
        coerce_number(&field(&item, &["statistics", "commentCount"])),
    );
    out
}

fn normalize_search(payload: &Value) -> OutputMap {
    let results: Vec<Value> = field(payload, &["items"])
        .as_array()
        .map(|items| {
            items
                .iter()
                .map(|item| {
                    let mut entry = Map::new();
                    entry.insert("videoId".into(), field(item, &["id", "videoId"]));
                    entry.insert("title".into(), field(item, &["snippet", "title"]));
                    entry.insert("channelId".into(), field(item, &["snippet", "channelId"]));
                    entry.insert(
                        "channelTitle".into(),
                        field(item, &["snippet", "channelTitle"]),
                    );
                    entry.insert(
                        "publishedAt".into(),
                        field(item, &["snippet", "publishedAt"]),
                    );
                    Value::Object(entry)
                })
                .collect()
        })
        .unwrap_or_default();

    let mut out = Map::new();
    out.insert(
        "totalResults".into(),
        coerce_number(&field(payload, &["pageInfo", "totalResults"])),
    );
    out.insert("results".into(), Value::Array(results));
    out
}

fn normalize_comments(payload: &Value) -> OutputMap {
    let comments: Vec<Value> = field(payload, &["items"])
        .as_array()
        .map(|items| {
            items
                .iter()
                .map(|item| {
                    let top = field(item, &["snippet", "topLevelComment", "snippet"]);
                    let mut entry = Map::new();
                    entry.insert("id".into(), field(item, &["id"]));
                    entry.insert("author".into(), field(&top, &["authorDisplayName"]));
                    entry.insert("text".into(), field(&top, &["textDisplay"]));
                    entry.insert("likeCount".into(), coerce_number(&field(&top, &["likeCount"])));
                    entry.insert("publishedAt".into(), field(&top, &["publishedAt"]));
                    Value::Object(entry)
                })
                .collect()
        })
        .unwrap_or_default();

    let mut out = Map::new();
    out.insert("count".into(), Value::from(comments.len()));
    out.insert("comments".into(), Value::Array(comments));
    out
}

fn normalize_captions(payload: &Value) -> OutputMap {
    let captions: Vec<Value> = field(payload, &["items"])
        .as_array()
        .map(|items| {
            items
                .iter()
                .map(|item| {
                    let mut entry = Map::new();
                    entry.insert("id".into(), field(item, &["id"]));
                    entry.insert("language".into(), field(item, &["snippet", "language"]));
                    entry.insert("kind".into(), field(item, &["snippet", "trackKind"]));
                    entry.insert("lastUpdated".into(), field(item, &["snippet", "lastUpdated"]));
                    Value::Object(entry)
                })
                .collect()
        })
        .unwrap_or_default();

    let mut out = Map::new();
    out.insert("count".into(), Value::from(captions.len()));
    out.insert("captions".into(), Value::Array(captions));
    out
}

fn normalize_playlist(payload: &Value) -> OutputMap {
    let items: Vec<Value> = field(payload, &["items"])
        .as_array()
        .map(|entries| {
            entries
                .iter()
                .map(|item| {
                    let mut entry = Map::new();
                    entry.insert("videoId".into(), field(item, &["contentDetails", "videoId"]));
                    entry.insert("title".into(), field(item, &["snippet", "title"]));
                    entry.insert(
                        "position".into(),
                        coerce_number(&field(item, &["snippet", "position"])),
                    );
                    Value::Object(entry)
                })
                .collect()
        })
        .unwrap_or_default();

    let mut out = Map::new();
    out.insert("count".into(), Value::from(items.len()));
    out.insert("items".into(), Value::Array(items));
    out
}

fn normalize_analytics(payload: &Value) -> OutputMap {
    let headers: Vec<Value> = field(payload, &["columnHeaders"])
        .as_array()
        .map(|cols| cols.iter().map(|c| field(c, &["name"])).collect())
        .unwrap_or_default();
    let rows = field(payload, &["rows"]);
    let row_count = rows.as_array().map(|r| r.len()).unwrap_or(0);

    let mut out = Map::new();
    out.insert("columns".into(), Value::Array(headers));
    out.insert(
        "rows".into(),
        if rows.is_null() { Value::Array(vec![]) } else { rows },
    );
    out.insert("rowCount".into(), Value::from(row_count));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn inputs(pairs: &[(&str, Value)]) -> OutputMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn endpoint_ids_round_trip() {
        assert_eq!(Endpoint::from_id("channel-info"), Some(Endpoint::ChannelInfo));
        assert_eq!(Endpoint::from_id("channel-analytics"), Some(Endpoint::ChannelAnalytics));
        assert_eq!(Endpoint::from_id("delete-video"), None);
    }

    #[tokio::test]
    async fn missing_credential_is_fatal() {
        let executor = ExternalCallExecutor::new(PlatformEndpoints::default());
        let cfg = ExternalCallConfig {
            endpoint: "channel-info".to_string(),
            params: Map::new(),
        };
        let err = executor.execute(&cfg, &Map::new()).await.unwrap_err();
        assert!(matches!(err, StepError::MissingCredential));
    }

    #[tokio::test]
    async fn missing_required_param_is_fatal() {
        let executor = ExternalCallExecutor::new(PlatformEndpoints::default());
        let cfg = ExternalCallConfig {
            endpoint: "video-info".to_string(),
            params: Map::new(),
        };
        let ins = inputs(&[("accessToken", json!("tok"))]);
        let err = executor.execute(&cfg, &ins).await.unwrap_err();
        assert!(matches!(err, StepError::MissingInput(name) if name == "videoId"));
    }

    #[tokio::test]
    async fn unknown_endpoint_is_fatal() {
        let executor = ExternalCallExecutor::new(PlatformEndpoints::default());
        let cfg = ExternalCallConfig {
            endpoint: "upload-video".to_string(),
            params: Map::new(),
        };
        let ins = inputs(&[("accessToken", json!("tok"))]);
        let err = executor.execute(&cfg, &ins).await.unwrap_err();
        assert!(matches!(err, StepError::UnknownEndpoint(id) if id == "upload-video"));
    }

    #[test]
    fn config_params_fill_in_but_inputs_win() {
        let config = inputs(&[("channelId", json!("from-config")), ("maxResults", json!(5))]);
        let runtime = inputs(&[("channelId", json!("from-input"))]);
        let params = ParamSet {
            inputs: &runtime,
            config: &config,
        };
        assert_eq!(params.get("channelId").as_deref(), Some("from-input"));
        assert_eq!(params.get("maxResults").as_deref(), Some("5"));
    }

    #[test]
    fn channel_normalization_flattens_and_coerces() {
        let payload = json!({
            "items": [{
                "id": "UC123",
                "snippet": {"title": "My Channel", "description": "d", "publishedAt": "2020-01-01T00:00:00Z"},
                "statistics": {"subscriberCount": "15300", "viewCount": "2000000", "videoCount": "87"}
            }]
        });
        let out = normalize_channel(&payload);
        assert_eq!(out["id"], json!("UC123"));
        assert_eq!(out["subscriberCount"], json!(15300));
        assert_eq!(out["viewCount"], json!(2000000));
        assert_eq!(out["videoCount"], json!(87));
    }

    #[test]
    fn search_normalization_keeps_result_list() {
        let payload = json!({
            "pageInfo": {"totalResults": 2},
            "items": [
                {"id": {"videoId": "v1"}, "snippet": {"title": "A", "channelId": "c", "channelTitle": "C", "publishedAt": "p"}},
                {"id": {"videoId": "v2"}, "snippet": {"title": "B", "channelId": "c", "channelTitle": "C", "publishedAt": "p"}}
            ]
        });
        let out = normalize_search(&payload);
        assert_eq!(out["totalResults"], json!(2));
        assert_eq!(out["results"][0]["videoId"], json!("v1"));
        assert_eq!(out["results"][1]["title"], json!("B"));
    }

    #[test]
    fn analytics_normalization_extracts_columns() {
        let payload = json!({
            "columnHeaders": [{"name": "views"}, {"name": "subscribersGained"}],
            "rows": [[100, 3], [250, 7]]
        });
        let out = normalize_analytics(&payload);
        assert_eq!(out["columns"], json!(["views", "subscribersGained"]));
        assert_eq!(out["rowCount"], json!(2));
        assert_eq!(out["rows"][1][0], json!(250));
    }

    #[test]
    fn empty_analytics_rows_become_empty_array() {
        let out = normalize_analytics(&json!({"columnHeaders": []}));
        assert_eq!(out["rows"], json!([]));
        assert_eq!(out["rowCount"], json!(0));
    }

    #[test]
    fn missing_statistics_stay_null() {
        let out = normalize_channel(&json!({"items": [{"id": "UC1", "snippet": {"title": "t"}}]}));
        assert_eq!(out["subscriberCount"], Value::Null);
    }

    #[test]
    fn comments_normalization_flattens_thread_shape() {
        let payload = json!({
            "items": [{
                "id": "cm1",
                "snippet": {"topLevelComment": {"snippet": {
                    "authorDisplayName": "viewer",
                    "textDisplay": "great video",
                    "likeCount": "12",
                    "publishedAt": "2024-05-01T00:00:00Z"
                }}}
            }]
        });
        let out = normalize_comments(&payload);
        assert_eq!(out["count"], json!(1));
        assert_eq!(out["comments"][0]["author"], json!("viewer"));
        assert_eq!(out["comments"][0]["likeCount"], json!(12));
    }
}
