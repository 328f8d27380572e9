use crate::errors::{ClientError, Result};
use crate::extract::is_valid_score_code;
use crate::filter::{ListQuery, QueryPlan};
use crate::models::{
    Ack, BatchQueryRequest, BatchQueryResponse, BatchRemarkRequest, BatchRemarkResponse,
    FavoriteResponse, Harvest, JianshangResponse, LatestCodesResponse, NewReview, RemarkRequest,
    RemarkResponse, ReviewResponse, SaveRequest, ScoreRecord, ScoreStats, VideoAttachment,
};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response, Url};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

/// The server of record, as seen by the page controllers.
#[async_trait]
pub trait ScoreApi: Send + Sync {
    async fn list_scores(&self, query: &ListQuery) -> Result<Vec<ScoreRecord>>;

    async fn batch_query(&self, request: &BatchQueryRequest) -> Result<Vec<ScoreRecord>>;

    async fn save_completion(&self, score_code: &str, completion: u8) -> Result<()>;

    /// Returns the authoritative favorite state after the toggle.
    async fn toggle_favorite(&self, score_code: &str) -> Result<bool>;

    async fn remark(&self, score_code: &str) -> Result<String>;

    /// Returns the remark as stored by the server.
    async fn set_remark(&self, score_code: &str, remark: &str) -> Result<String>;

    async fn batch_remark(&self, score_codes: &[String], remark: &str)
        -> Result<BatchRemarkResponse>;

    async fn stats(&self) -> Result<ScoreStats>;

    async fn fetch_jianshang(&self) -> Result<Harvest<ScoreRecord>>;

    async fn latest_jianshang_codes(&self) -> Result<Harvest<String>>;

    async fn review(&self, score_code: &str) -> Result<ReviewResponse>;

    async fn create_review(&self, review: NewReview) -> Result<serde_json::Value>;

    /// Base for media paths the server hands back relative to itself.
    fn media_base(&self) -> Option<&Url> {
        None
    }

    async fn execute(&self, plan: &QueryPlan) -> Result<Vec<ScoreRecord>> {
        match plan {
            QueryPlan::Listing(query) => self.list_scores(query).await,
            QueryPlan::Batch(request) => self.batch_query(request).await,
        }
    }
}

#[derive(Debug, Clone)]
pub struct HttpApi {
    client: Client,
    base_url: Url,
}

impl HttpApi {
    pub fn new(base_url: Url) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()?;
        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|_| ClientError::validation("server URL cannot be a base"))?;
            path.pop_if_empty();
            path.extend(segments);
        }
        Ok(url)
    }

    fn score_endpoint(&self, score_code: &str, tail: &str) -> Result<Url> {
        let code = checked_code(score_code)?;
        self.endpoint(&["api", "scores", code, tail])
    }
}

fn checked_code(score_code: &str) -> Result<&str> {
    let code = score_code.trim();
    if !is_valid_score_code(code) {
        return Err(ClientError::validation(
            "Invalid score code (digits only, at least 5)",
        ));
    }
    Ok(code)
}

/// Reads the body regardless of status so the server's `error` text wins
/// over a bare status line.
async fn read_json<T: DeserializeOwned>(response: Response, fallback: &str) -> Result<T> {
    let status = response.status();
    let bytes = response.bytes().await?;
    if !status.is_success() {
        let message = serde_json::from_slice::<Ack>(&bytes)
            .ok()
            .and_then(|ack| ack.error)
            .unwrap_or_else(|| format!("{fallback} ({status})"));
        return Err(ClientError::server(message));
    }
    Ok(serde_json::from_slice(&bytes)?)
}

fn ensure_success(success: bool, error: Option<String>, fallback: &str) -> Result<()> {
    if success {
        Ok(())
    } else {
        Err(ClientError::server(error.unwrap_or_else(|| fallback.to_string())))
    }
}

#[async_trait]
impl ScoreApi for HttpApi {
    fn media_base(&self) -> Option<&Url> {
        Some(&self.base_url)
    }

    async fn list_scores(&self, query: &ListQuery) -> Result<Vec<ScoreRecord>> {
        let url = self.endpoint(&["api", "scores"])?;
        debug!(params = ?query.params(), "listing scores");
        let response = self.client.get(url).query(&query.params()).send().await?;
        read_json(response, "Failed to load scores").await
    }

    async fn batch_query(&self, request: &BatchQueryRequest) -> Result<Vec<ScoreRecord>> {
        let url = self.endpoint(&["api", "scores", "batch"])?;
        debug!(
            codes = request.score_codes.len(),
            excluded = request.exclude_codes.len(),
            "batch query"
        );
        let response = self.client.post(url).json(request).send().await?;
        let body: BatchQueryResponse = read_json(response, "Query failed").await?;
        ensure_success(body.success, body.error, "Query failed")?;
        Ok(body.results)
    }

    async fn save_completion(&self, score_code: &str, completion: u8) -> Result<()> {
        let score_code = checked_code(score_code)?;
        if completion > 100 {
            return Err(ClientError::validation("Completion must be between 0 and 100"));
        }
        let url = self.endpoint(&["api", "scores", "save"])?;
        let payload = SaveRequest {
            score_code,
            completion,
        };
        let response = self.client.post(url).json(&payload).send().await?;
        let ack: Ack = read_json(response, "Save failed").await?;
        ensure_success(ack.success, ack.error, "Save failed")
    }

    async fn toggle_favorite(&self, score_code: &str) -> Result<bool> {
        let url = self.score_endpoint(score_code, "favorite")?;
        let response = self.client.post(url).send().await?;
        let body: FavoriteResponse = read_json(response, "Favorite update failed").await?;
        ensure_success(body.success, body.error, "Favorite update failed")?;
        body.is_favorite
            .ok_or_else(|| ClientError::server("Favorite response missing state"))
    }

    async fn remark(&self, score_code: &str) -> Result<String> {
        let url = self.score_endpoint(score_code, "remark")?;
        let response = self.client.get(url).send().await?;
        let body: RemarkResponse = read_json(response, "Failed to load remark").await?;
        ensure_success(body.success, body.error, "Failed to load remark")?;
        Ok(body.remark.unwrap_or_default())
    }

    async fn set_remark(&self, score_code: &str, remark: &str) -> Result<String> {
        let url = self.score_endpoint(score_code, "remark")?;
        let response = self
            .client
            .post(url)
            .json(&RemarkRequest { remark })
            .send()
            .await?;
        let body: RemarkResponse = read_json(response, "Failed to save remark").await?;
        ensure_success(body.success, body.error, "Failed to save remark")?;
        Ok(body.remark.unwrap_or_else(|| remark.to_string()))
    }

    async fn batch_remark(
        &self,
        score_codes: &[String],
        remark: &str,
    ) -> Result<BatchRemarkResponse> {
        let url = self.endpoint(&["api", "scores", "remarks", "batch"])?;
        let response = self
            .client
            .post(url)
            .json(&BatchRemarkRequest {
                score_codes,
                remark,
            })
            .send()
            .await?;
        let mut body: BatchRemarkResponse = read_json(response, "Batch remark failed").await?;
        ensure_success(body.success, body.error.take(), "Batch remark failed")?;
        Ok(body)
    }

    async fn stats(&self) -> Result<ScoreStats> {
        let url = self.endpoint(&["api", "scores", "stats"])?;
        let response = self.client.get(url).send().await?;
        read_json(response, "Failed to load stats").await
    }

    async fn fetch_jianshang(&self) -> Result<Harvest<ScoreRecord>> {
        let url = self.endpoint(&["api", "fetch_jianshang"])?;
        let response = self.client.get(url).send().await?;
        let body: JianshangResponse = read_json(response, "Jianshang fetch failed").await?;
        ensure_success(body.success, body.error, "Jianshang fetch failed")?;
        let extracted_count = body.extracted_count.unwrap_or(body.results.len() as u64);
        Ok(Harvest {
            items: body.results,
            filename: body.filename,
            extracted_count,
        })
    }

    async fn latest_jianshang_codes(&self) -> Result<Harvest<String>> {
        let url = self.endpoint(&["api", "latest_jianshang_codes"])?;
        let response = self.client.get(url).send().await?;
        let body: LatestCodesResponse =
            read_json(response, "Failed to load latest codes").await?;
        ensure_success(body.success, body.error, "Failed to load latest codes")?;
        let extracted_count = body.extracted_count.unwrap_or(body.codes.len() as u64);
        Ok(Harvest {
            items: body.codes,
            filename: body.filename,
            extracted_count,
        })
    }

    async fn review(&self, score_code: &str) -> Result<ReviewResponse> {
        let code = checked_code(score_code)?;
        let url = self.endpoint(&["api", "reviews", code])?;
        let response = self.client.get(url).send().await?;
        read_json(response, "Failed to load review").await
    }

    async fn create_review(&self, review: NewReview) -> Result<serde_json::Value> {
        let url = self.endpoint(&["api", "reviews"])?;
        let source = review.video.source();
        let form = Form::new()
            .text("score_code", review.score_code)
            .text("rating", review.rating.to_string())
            .text("comment", review.comment)
            .text("video_source", source.as_str());
        let form = match review.video {
            VideoAttachment::External(value) => form.text("video_url", value),
            VideoAttachment::Upload { file_name, bytes } => {
                form.part("video", Part::bytes(bytes).file_name(file_name))
            }
        };

        let response = self.client.post(url).multipart(form).send().await?;
        let body: serde_json::Value = read_json(response, "Save failed").await?;
        let success = body.get("success").and_then(|v| v.as_bool()).unwrap_or(false);
        let error = body
            .get("error")
            .and_then(|v| v.as_str())
            .map(str::to_string);
        ensure_success(success, error, "Save failed")?;
        Ok(body)
    }
}
