//! In-memory server of record for controller tests.

use crate::api::ScoreApi;
use crate::errors::{ClientError, Result};
use crate::filter::{FavoriteFilter, FilterState, ListQuery};
use crate::models::{
    BatchQueryRequest, BatchRemarkResponse, Harvest, NewReview, RemarkUpdate, ReviewResponse,
    ScoreRecord, ScoreStats, VideoAttachment, VideoType,
};
use async_trait::async_trait;
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

#[derive(Debug, Default)]
pub struct FakeState {
    pub records: Vec<ScoreRecord>,
    pub reviews: HashMap<String, ReviewResponse>,
    pub jianshang: Vec<ScoreRecord>,
    pub latest_codes: Vec<String>,
    pub calls: Vec<String>,
    pub failing: HashSet<&'static str>,
    clock: u32,
}

#[derive(Debug, Default)]
pub struct FakeApi {
    pub state: Mutex<FakeState>,
}

impl FakeApi {
    pub fn with_records(records: Vec<ScoreRecord>) -> Self {
        let api = Self::default();
        api.state.lock().unwrap().records = records;
        api
    }

    pub fn fail(&self, call: &'static str) {
        self.state.lock().unwrap().failing.insert(call);
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn record(&self, code: &str) -> Option<ScoreRecord> {
        let state = self.state.lock().unwrap();
        state.records.iter().find(|r| r.score_code == code).cloned()
    }

    fn enter(&self, call: &'static str) -> Result<std::sync::MutexGuard<'_, FakeState>> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(call.to_string());
        if state.failing.contains(call) {
            return Err(ClientError::server(format!("{call} unavailable")));
        }
        Ok(state)
    }
}

impl FakeState {
    fn upsert(&mut self, code: &str) -> &mut ScoreRecord {
        if let Some(index) = self.records.iter().position(|r| r.score_code == code) {
            return &mut self.records[index];
        }
        self.clock += 1;
        let mut record = ScoreRecord::new(code);
        record.created_at = Some(format!("2025-01-01 00:{:02}:{:02}", self.clock / 60, self.clock % 60));
        self.records.insert(0, record);
        &mut self.records[0]
    }
}

#[async_trait]
impl ScoreApi for FakeApi {
    async fn list_scores(&self, query: &ListQuery) -> Result<Vec<ScoreRecord>> {
        let state = self.enter("list_scores")?;
        let filter = FilterState {
            min_completion: query.min_completion,
            max_completion: query.max_completion,
            favorite: query.favorite,
        };
        Ok(state.records.iter().filter(|r| filter.matches(r)).cloned().collect())
    }

    async fn batch_query(&self, request: &BatchQueryRequest) -> Result<Vec<ScoreRecord>> {
        let state = self.enter("batch_query")?;
        let filter = FilterState {
            min_completion: request.min_completion,
            max_completion: request.max_completion,
            favorite: FavoriteFilter::from_code(request.favorite).unwrap_or_default(),
        };
        Ok(state
            .records
            .iter()
            .filter(|r| request.score_codes.is_empty() || request.score_codes.contains(&r.score_code))
            .filter(|r| !request.exclude_codes.contains(&r.score_code))
            .filter(|r| request.include_remark.is_empty() || r.remark.contains(&request.include_remark))
            .filter(|r| request.exclude_remark.is_empty() || !r.remark.contains(&request.exclude_remark))
            .filter(|r| filter.matches(r))
            .cloned()
            .collect())
    }

    async fn save_completion(&self, score_code: &str, completion: u8) -> Result<()> {
        let mut state = self.enter("save_completion")?;
        state.upsert(score_code).completion = Some(completion);
        Ok(())
    }

    async fn toggle_favorite(&self, score_code: &str) -> Result<bool> {
        let mut state = self.enter("toggle_favorite")?;
        let record = state.upsert(score_code);
        record.is_favorite = !record.is_favorite;
        Ok(record.is_favorite)
    }

    async fn remark(&self, score_code: &str) -> Result<String> {
        let state = self.enter("remark")?;
        Ok(state
            .records
            .iter()
            .find(|r| r.score_code == score_code)
            .map(|r| r.remark.clone())
            .unwrap_or_default())
    }

    async fn set_remark(&self, score_code: &str, remark: &str) -> Result<String> {
        let mut state = self.enter("set_remark")?;
        state.upsert(score_code).remark = remark.to_string();
        Ok(remark.to_string())
    }

    async fn batch_remark(&self, score_codes: &[String], remark: &str) -> Result<BatchRemarkResponse> {
        let mut state = self.enter("batch_remark")?;
        let mut updates = Vec::new();
        let mut skipped = Vec::new();
        for code in score_codes {
            let record = state.upsert(code);
            if record.has_remark() {
                skipped.push(code.clone());
            } else {
                record.remark = remark.to_string();
                updates.push(RemarkUpdate {
                    score_code: code.clone(),
                    remark: remark.to_string(),
                });
            }
        }
        Ok(BatchRemarkResponse {
            success: true,
            updated_count: Some(updates.len() as u64),
            unchanged_count: Some(skipped.len() as u64),
            updates: Some(updates),
            skipped: Some(skipped),
            ..BatchRemarkResponse::default()
        })
    }

    async fn stats(&self) -> Result<ScoreStats> {
        let state = self.enter("stats")?;
        let unique: HashSet<&str> = state.records.iter().map(|r| r.score_code.as_str()).collect();
        Ok(ScoreStats {
            total_records: state.records.len() as u64,
            unique_songs: unique.len() as u64,
            favorite_songs: state.records.iter().filter(|r| r.is_favorite).count() as u64,
        })
    }

    async fn fetch_jianshang(&self) -> Result<Harvest<ScoreRecord>> {
        let state = self.enter("fetch_jianshang")?;
        Ok(Harvest {
            items: state.jianshang.clone(),
            filename: Some("jianshang.txt".to_string()),
            extracted_count: state.jianshang.len() as u64,
        })
    }

    async fn latest_jianshang_codes(&self) -> Result<Harvest<String>> {
        let state = self.enter("latest_jianshang_codes")?;
        Ok(Harvest {
            items: state.latest_codes.clone(),
            filename: Some("latest.txt".to_string()),
            extracted_count: state.latest_codes.len() as u64,
        })
    }

    async fn review(&self, score_code: &str) -> Result<ReviewResponse> {
        let state = self.enter("review")?;
        Ok(state.reviews.get(score_code).cloned().unwrap_or(ReviewResponse {
            success: true,
            has_review: false,
            ..ReviewResponse::default()
        }))
    }

    async fn create_review(&self, review: NewReview) -> Result<serde_json::Value> {
        let mut state = self.enter("create_review")?;
        let (video_url, video_type) = match &review.video {
            VideoAttachment::External(value) => (Some(value.clone()), None),
            VideoAttachment::Upload { file_name, .. } => {
                (Some(format!("/uploads/{file_name}")), Some(VideoType::Url))
            }
        };
        state.upsert(&review.score_code).has_review = true;
        state.reviews.insert(
            review.score_code.clone(),
            ReviewResponse {
                success: true,
                has_review: true,
                rating: Some(review.rating),
                comment: Some(review.comment),
                video_url,
                video_type,
                error: None,
            },
        );
        Ok(json!({ "success": true }))
    }
}
