use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// One tracked chart, as served by `/api/scores` and `/api/scores/batch`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreRecord {
    pub score_code: String,
    #[serde(default)]
    pub completion: Option<u8>,
    #[serde(default, deserialize_with = "flag")]
    pub is_favorite: bool,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub remark: String,
    #[serde(default, deserialize_with = "flag")]
    pub has_review: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

impl ScoreRecord {
    pub fn new(score_code: impl Into<String>) -> Self {
        Self {
            score_code: score_code.into(),
            completion: None,
            is_favorite: false,
            remark: String::new(),
            has_review: false,
            created_at: None,
        }
    }

    pub fn has_remark(&self) -> bool {
        !self.remark.trim().is_empty()
    }

    /// Server timestamps are SQLite `CURRENT_TIMESTAMP` values (UTC) or RFC 3339.
    pub fn created_at_utc(&self) -> Option<DateTime<Utc>> {
        let raw = self.created_at.as_deref()?.trim();
        if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
            return Some(parsed.with_timezone(&Utc));
        }
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
            .ok()
            .map(|naive| Utc.from_utc_datetime(&naive))
    }

    pub fn created_at_local(&self) -> Option<String> {
        self.created_at_utc().map(|ts| {
            ts.with_timezone(&Local)
                .format("%Y-%m-%d %H:%M:%S")
                .to_string()
        })
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// SQLite hands booleans back as `0`/`1`; accept those alongside JSON booleans.
#[derive(Deserialize)]
#[serde(untagged)]
enum Flag {
    Bool(bool),
    Int(i64),
}

impl From<Flag> for bool {
    fn from(flag: Flag) -> Self {
        match flag {
            Flag::Bool(value) => value,
            Flag::Int(value) => value != 0,
        }
    }
}

pub(crate) fn flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Flag>::deserialize(deserializer)?.is_some_and(bool::from))
}

pub(crate) fn optional_flag<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Flag>::deserialize(deserializer)?.map(bool::from))
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreStats {
    pub total_records: u64,
    pub unique_songs: u64,
    pub favorite_songs: u64,
}

/// Envelope shared by every mutating endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct Ack {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SaveRequest<'a> {
    pub score_code: &'a str,
    pub completion: u8,
}

#[derive(Debug, Deserialize)]
pub struct FavoriteResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default, deserialize_with = "optional_flag")]
    pub is_favorite: Option<bool>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchQueryRequest {
    pub score_codes: Vec<String>,
    pub exclude_codes: Vec<String>,
    pub min_completion: Option<u8>,
    pub max_completion: Option<u8>,
    pub favorite: u8,
    pub include_remark: String,
    pub exclude_remark: String,
}

#[derive(Debug, Deserialize)]
pub struct BatchQueryResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub results: Vec<ScoreRecord>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RemarkRequest<'a> {
    pub remark: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct RemarkResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub remark: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct BatchRemarkRequest<'a> {
    pub score_codes: &'a [String],
    pub remark: &'a str,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemarkUpdate {
    pub score_code: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub remark: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct BatchRemarkResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub updates: Option<Vec<RemarkUpdate>>,
    #[serde(default)]
    pub updated_count: Option<u64>,
    #[serde(default)]
    pub unchanged_count: Option<u64>,
    #[serde(default)]
    pub skipped: Option<Vec<String>>,
    #[serde(default)]
    pub remark: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl BatchRemarkResponse {
    pub fn updated(&self) -> u64 {
        self.updated_count
            .unwrap_or_else(|| self.updates.as_ref().map_or(0, |u| u.len() as u64))
    }

    pub fn unchanged(&self) -> u64 {
        self.unchanged_count
            .unwrap_or_else(|| self.skipped.as_ref().map_or(0, |s| s.len() as u64))
    }
}

#[derive(Debug, Deserialize)]
pub struct JianshangResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub results: Vec<ScoreRecord>,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub extracted_count: Option<u64>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LatestCodesResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub codes: Vec<String>,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub extracted_count: Option<u64>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Result of a server-side harvesting job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Harvest<T> {
    pub items: Vec<T>,
    pub filename: Option<String>,
    pub extracted_count: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoType {
    None,
    Url,
    Embed,
    /// Any other label the server uses, e.g. `file` for uploads.
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoSource {
    #[default]
    Upload,
    External,
}

impl VideoSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Upload => "upload",
            Self::External => "external",
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReviewResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default, deserialize_with = "flag")]
    pub has_review: bool,
    #[serde(default)]
    pub rating: Option<u8>,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub video_url: Option<String>,
    #[serde(default)]
    pub video_type: Option<VideoType>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VideoAttachment {
    Upload { file_name: String, bytes: Vec<u8> },
    External(String),
}

impl VideoAttachment {
    pub fn source(&self) -> VideoSource {
        match self {
            Self::Upload { .. } => VideoSource::Upload,
            Self::External(_) => VideoSource::External,
        }
    }
}

/// A validated review, ready for `POST /api/reviews`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewReview {
    pub score_code: String,
    pub rating: u8,
    pub comment: String,
    pub video: VideoAttachment,
}
