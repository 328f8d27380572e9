use crate::api::ScoreApi;
use crate::errors::{ClientError, Result};
use crate::extract::is_valid_score_code;
use crate::models::{NewReview, ReviewResponse, VideoAttachment, VideoSource, VideoType};
use crate::toast::{REVIEW_TOAST_DURATION, Toasts};
use reqwest::Url;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{error, warn};

pub const AUTO_CLOSE_DELAY: Duration = Duration::from_millis(500);
const DEFAULT_RATING: u8 = 5;

/// Classifies a stored video value when the server does not say.
pub fn detect_video_type(value: Option<&str>, fallback: VideoType) -> VideoType {
    let Some(value) = value.map(str::trim).filter(|v| !v.is_empty()) else {
        return fallback;
    };
    if starts_with_ignore_case(value, "<iframe") {
        VideoType::Embed
    } else if is_http_url(value) {
        VideoType::Url
    } else {
        fallback
    }
}

fn starts_with_ignore_case(value: &str, prefix: &str) -> bool {
    value
        .get(..prefix.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
}

fn is_http_url(value: &str) -> bool {
    (starts_with_ignore_case(value, "http://") || starts_with_ignore_case(value, "https://"))
        && Url::parse(value).is_ok_and(|url| url.host_str().is_some())
}

/// An embed reduced to the one thing it may carry: an http(s) frame source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustedEmbed {
    src: String,
}

impl TrustedEmbed {
    /// Accepts only a lone `<iframe ...>` element (optionally closed) whose
    /// `src` is an http(s) URL. Every other attribute is discarded.
    pub fn from_markup(markup: &str) -> Option<Self> {
        let markup = markup.trim();
        if !starts_with_ignore_case(markup, "<iframe") {
            return None;
        }
        let open_end = markup.find('>')?;
        let tag = &markup[..open_end];
        let tail = markup[open_end + 1..].trim();
        if !(tail.is_empty() || tail.eq_ignore_ascii_case("</iframe>")) {
            return None;
        }
        if tag.contains('<') && tag.rfind('<') != Some(0) {
            return None;
        }

        let src = attribute(tag, "src")?;
        let src = src.trim();
        if !is_http_url(src) {
            return None;
        }
        Some(Self {
            src: src.to_string(),
        })
    }

    pub fn src(&self) -> &str {
        &self.src
    }
}

fn attribute<'a>(tag: &'a str, name: &str) -> Option<&'a str> {
    let lower = tag.to_ascii_lowercase();
    let mut search = 0;
    while let Some(found) = lower[search..].find(name) {
        let start = search + found;
        search = start + name.len();
        let preceded_by_space = lower[..start]
            .chars()
            .next_back()
            .is_some_and(char::is_whitespace);
        if !preceded_by_space {
            continue;
        }
        let rest = tag[search..].trim_start();
        let Some(rest) = rest.strip_prefix('=') else {
            continue;
        };
        let rest = rest.trim_start();
        let quote = rest.chars().next()?;
        return if quote == '"' || quote == '\'' {
            let body = &rest[1..];
            body.find(quote).map(|end| &body[..end])
        } else {
            let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
            Some(&rest[..end])
        };
    }
    None
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Preview {
    None,
    Video(String),
    Embed(TrustedEmbed),
}

impl Preview {
    /// Embeds go through sanitization; any other value is played as a video
    /// source, with relative upload paths resolved against `base`.
    pub fn build(video_type: VideoType, value: Option<&str>, base: Option<&Url>) -> Self {
        let Some(value) = value.map(str::trim).filter(|v| !v.is_empty()) else {
            return Self::None;
        };
        if video_type == VideoType::Embed {
            return match TrustedEmbed::from_markup(value) {
                Some(embed) => Self::Embed(embed),
                None => {
                    warn!("discarding embed preview that failed sanitization");
                    Self::None
                }
            };
        }
        match video_source(value, base) {
            Some(src) => Self::Video(src),
            None => {
                warn!("no playable source in stored video value");
                Self::None
            }
        }
    }
}

fn video_source(value: &str, base: Option<&Url>) -> Option<String> {
    if is_http_url(value) {
        return Some(value.to_string());
    }
    if value.starts_with('<') {
        return None;
    }
    match base {
        Some(base) => base
            .join(value)
            .ok()
            .filter(|url| matches!(url.scheme(), "http" | "https"))
            .map(|url| url.to_string()),
        None => value.starts_with('/').then(|| value.to_string()),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModalMode {
    Closed,
    Create,
    View,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PreferredMode {
    #[default]
    Auto,
    Create,
    View,
}

/// Where the dialog was opened from, handed back on save so the host can
/// update the right widget.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReviewOrigin {
    Current,
    TableRow,
    RandomCard,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReviewPrefill {
    pub rating: Option<u8>,
    pub comment: Option<String>,
    pub video_source: Option<VideoSource>,
    pub video_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenRequest {
    pub score_code: String,
    pub mode: PreferredMode,
    pub fallback_to_create: bool,
    pub prefill: ReviewPrefill,
    pub origin: ReviewOrigin,
}

impl OpenRequest {
    pub fn new(score_code: impl Into<String>, mode: PreferredMode, origin: ReviewOrigin) -> Self {
        Self {
            score_code: score_code.into(),
            mode,
            fallback_to_create: true,
            prefill: ReviewPrefill::default(),
            origin,
        }
    }

    pub fn without_fallback(mut self) -> Self {
        self.fallback_to_create = false;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReviewDraft {
    pub rating: u8,
    pub comment: String,
    pub source: VideoSource,
    pub upload: Option<(String, Vec<u8>)>,
    pub external: String,
}

impl ReviewDraft {
    fn from_prefill(prefill: &ReviewPrefill) -> Self {
        Self {
            rating: prefill.rating.filter(|r| (1..=5).contains(r)).unwrap_or(DEFAULT_RATING),
            comment: prefill.comment.clone().unwrap_or_default(),
            source: prefill.video_source.unwrap_or_default(),
            upload: None,
            external: prefill.video_url.clone().unwrap_or_default(),
        }
    }

    /// Local checks only; nothing is sent unless this passes.
    pub fn validate(&self, score_code: &str) -> Result<NewReview> {
        if !is_valid_score_code(score_code) {
            return Err(ClientError::validation("Invalid score code"));
        }
        if !(1..=5).contains(&self.rating) {
            return Err(ClientError::validation("Rating must be between 1 and 5"));
        }
        let comment = self.comment.trim();
        if comment.is_empty() {
            return Err(ClientError::validation("Comment cannot be empty"));
        }
        let video = match self.source {
            VideoSource::External => {
                let value = self.external.trim();
                if value.is_empty() {
                    return Err(ClientError::validation(
                        "Enter a video link or embed code",
                    ));
                }
                VideoAttachment::External(value.to_string())
            }
            VideoSource::Upload => match &self.upload {
                Some((file_name, bytes)) => VideoAttachment::Upload {
                    file_name: file_name.clone(),
                    bytes: bytes.clone(),
                },
                None => {
                    return Err(ClientError::validation("Choose a video file to upload"));
                }
            },
        };
        Ok(NewReview {
            score_code: score_code.trim().to_string(),
            rating: self.rating,
            comment: comment.to_string(),
            video,
        })
    }
}

/// Read-only data shown in view mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewView {
    pub rating: u8,
    pub comment: String,
    pub preview: Preview,
}

impl ReviewView {
    fn from_response(data: &ReviewResponse, base: Option<&Url>) -> Self {
        let video_type = data
            .video_type
            .unwrap_or_else(|| detect_video_type(data.video_url.as_deref(), VideoType::None));
        Self {
            rating: data.rating.filter(|r| (1..=5).contains(r)).unwrap_or(DEFAULT_RATING),
            comment: data.comment.clone().unwrap_or_default(),
            preview: Preview::build(video_type, data.video_url.as_deref(), base),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReviewSubmitted {
    pub score_code: String,
    pub origin: ReviewOrigin,
    pub response: serde_json::Value,
}

/// Shared view/create dialog for a single score code's review.
#[derive(Debug)]
pub struct ReviewModal {
    mode: ModalMode,
    score_code: Option<String>,
    origin: Option<ReviewOrigin>,
    draft: ReviewDraft,
    view: Option<ReviewView>,
    message: String,
    submitting: bool,
    close_at: Option<Instant>,
    ready: bool,
    pub toasts: Toasts,
}

impl Default for ReviewModal {
    fn default() -> Self {
        Self::new(true)
    }
}

impl ReviewModal {
    pub fn new(ready: bool) -> Self {
        Self {
            mode: ModalMode::Closed,
            score_code: None,
            origin: None,
            draft: ReviewDraft::from_prefill(&ReviewPrefill::default()),
            view: None,
            message: String::new(),
            submitting: false,
            close_at: None,
            ready,
            toasts: Toasts::new(REVIEW_TOAST_DURATION),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn mode(&self) -> ModalMode {
        self.mode
    }

    pub fn score_code(&self) -> Option<&str> {
        self.score_code.as_deref()
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn view(&self) -> Option<&ReviewView> {
        self.view.as_ref()
    }

    pub fn draft(&self) -> &ReviewDraft {
        &self.draft
    }

    pub fn draft_mut(&mut self) -> Option<&mut ReviewDraft> {
        (self.mode == ModalMode::Create && !self.submitting).then_some(&mut self.draft)
    }

    pub fn is_submitting(&self) -> bool {
        self.submitting
    }

    /// Filled/empty state of the five stars.
    pub fn stars(&self) -> [bool; 5] {
        let rating = match (&self.mode, &self.view) {
            (ModalMode::View, Some(view)) => view.rating,
            _ => self.draft.rating,
        };
        std::array::from_fn(|i| (i as u8) < rating)
    }

    pub fn set_rating(&mut self, rating: u8) {
        if let Some(draft) = self.draft_mut() {
            if (1..=5).contains(&rating) {
                draft.rating = rating;
            }
        }
    }

    /// Keyboard stepping, clamped to 1..=5.
    pub fn step_rating(&mut self, delta: i8) {
        if let Some(draft) = self.draft_mut() {
            let next = (draft.rating as i16 + delta as i16).clamp(1, 5);
            draft.rating = next as u8;
        }
    }

    /// Returns the mode the dialog ended up in, or `None` when it refused to open.
    pub async fn open<A: ScoreApi + ?Sized>(
        &mut self,
        api: &A,
        request: OpenRequest,
    ) -> Option<ModalMode> {
        if !self.ready {
            return None;
        }
        let score_code = request.score_code.trim().to_string();
        if !is_valid_score_code(&score_code) {
            self.toasts
                .push("Copy a valid score code first (digits only, at least 5)");
            return None;
        }

        self.score_code = Some(score_code.clone());
        self.origin = Some(request.origin.clone());
        self.message.clear();
        self.close_at = None;

        if request.mode == PreferredMode::Create {
            self.render_create(&request.prefill);
            return Some(self.mode);
        }

        match api.review(&score_code).await {
            Ok(data) if data.success && data.has_review => {
                self.render_view(&data, api.media_base());
                return Some(self.mode);
            }
            Ok(_) if !request.fallback_to_create => {
                self.render_not_found("No review found");
                return Some(self.mode);
            }
            Ok(_) => {}
            Err(err) if !request.fallback_to_create => {
                self.render_not_found(&err.to_string());
                return Some(self.mode);
            }
            Err(err) => {
                warn!("review fetch for {score_code} failed: {err}");
                self.toasts
                    .push("Failed to load review, switching to create mode");
            }
        }

        self.render_create(&request.prefill);
        Some(self.mode)
    }

    fn render_view(&mut self, data: &ReviewResponse, base: Option<&Url>) {
        self.mode = ModalMode::View;
        self.view = Some(ReviewView::from_response(data, base));
    }

    fn render_not_found(&mut self, message: &str) {
        self.mode = ModalMode::View;
        self.view = None;
        self.message = message.to_string();
    }

    fn render_create(&mut self, prefill: &ReviewPrefill) {
        self.mode = ModalMode::Create;
        self.view = None;
        self.draft = ReviewDraft::from_prefill(prefill);
    }

    /// Validates locally, then posts. Stays in create mode on any failure.
    pub async fn submit<A: ScoreApi + ?Sized>(
        &mut self,
        api: &A,
    ) -> Result<Option<ReviewSubmitted>> {
        if self.mode != ModalMode::Create || self.submitting || !self.ready {
            return Ok(None);
        }
        let score_code = self.score_code.clone().unwrap_or_default();
        let review = match self.draft.validate(&score_code) {
            Ok(review) => review,
            Err(err) => {
                self.message = err.to_string();
                return Err(err);
            }
        };

        self.submitting = true;
        self.message = "Saving...".to_string();
        let outcome = api.create_review(review).await;
        self.submitting = false;

        match outcome {
            Ok(response) => {
                self.message = "Saved!".to_string();
                self.toasts.push("Review saved");
                self.close_at = Some(Instant::now() + AUTO_CLOSE_DELAY);
                Ok(Some(ReviewSubmitted {
                    score_code,
                    origin: self.origin.clone().unwrap_or(ReviewOrigin::Current),
                    response,
                }))
            }
            Err(err) => {
                error!("saving review for {score_code} failed: {err}");
                self.message = format!("Save failed: {err}");
                self.toasts.push(format!("Save failed: {err}"));
                Err(err)
            }
        }
    }

    /// Applies the delayed auto-close after a successful save.
    pub fn tick(&mut self, now: Instant) {
        if self.close_at.is_some_and(|at| at <= now) {
            self.close();
        }
    }

    /// Always tears down any preview.
    pub fn close(&mut self) {
        if !self.ready {
            return;
        }
        self.mode = ModalMode::Closed;
        self.view = None;
        self.message.clear();
        self.submitting = false;
        self.close_at = None;
    }

    pub fn preview(&self) -> &Preview {
        const NONE: &Preview = &Preview::None;
        match (&self.mode, &self.view) {
            (ModalMode::View, Some(view)) => &view.preview,
            _ => NONE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn video_type_detection() {
        assert_eq!(
            detect_video_type(Some("  <IFRAME src=\"https://x.test/v\">"), VideoType::None),
            VideoType::Embed
        );
        assert_eq!(
            detect_video_type(Some("HTTPS://cdn.test/a.mp4"), VideoType::None),
            VideoType::Url
        );
        assert_eq!(detect_video_type(Some("ftp://x/a"), VideoType::None), VideoType::None);
        assert_eq!(detect_video_type(None, VideoType::Url), VideoType::Url);
        assert_eq!(detect_video_type(Some("   "), VideoType::None), VideoType::None);
    }

    #[test]
    fn upload_paths_preview_as_video_against_the_server() {
        let response: ReviewResponse = serde_json::from_str(
            r#"{"success":true,"has_review":true,"rating":4,"comment":"ok","video_url":"/static/uploads/a.mp4","video_type":"file"}"#,
        )
        .unwrap();
        assert_eq!(response.video_type, Some(VideoType::Unknown));

        let base = Url::parse("http://127.0.0.1:5000/").unwrap();
        let view = ReviewView::from_response(&response, Some(&base));
        assert_eq!(
            view.preview,
            Preview::Video("http://127.0.0.1:5000/static/uploads/a.mp4".to_string())
        );

        let untyped = ReviewResponse {
            video_type: None,
            ..response
        };
        let view = ReviewView::from_response(&untyped, None);
        assert_eq!(view.preview, Preview::Video("/static/uploads/a.mp4".to_string()));
    }

    #[test]
    fn non_web_sources_get_no_preview() {
        let base = Url::parse("http://127.0.0.1:5000/").unwrap();
        assert_eq!(
            Preview::build(VideoType::Url, Some("javascript:alert(1)"), Some(&base)),
            Preview::None
        );
        assert_eq!(
            Preview::build(VideoType::None, Some("<iframe src=\"https://x.test/v\">"), Some(&base)),
            Preview::None
        );
        assert_eq!(Preview::build(VideoType::Url, Some("  "), Some(&base)), Preview::None);
    }

    #[test]
    fn embed_keeps_only_http_source() {
        let embed = TrustedEmbed::from_markup(
            r#"<iframe src="https://player.test/v/1" onload="alert(1)" width=640></iframe>"#,
        )
        .unwrap();
        assert_eq!(embed.src(), "https://player.test/v/1");

        assert!(TrustedEmbed::from_markup(r#"<iframe src="javascript:alert(1)"></iframe>"#).is_none());
        assert!(TrustedEmbed::from_markup(r#"<iframe src="https://a.test"></iframe><script>x</script>"#).is_none());
        assert!(TrustedEmbed::from_markup(r#"<iframe data-src="https://a.test"></iframe>"#).is_none());
        assert!(TrustedEmbed::from_markup("<div>").is_none());
    }

    #[test]
    fn unquoted_src_is_read() {
        let embed = TrustedEmbed::from_markup("<iframe src=https://a.test/v allowfullscreen>").unwrap();
        assert_eq!(embed.src(), "https://a.test/v");
    }

    #[test]
    fn validation_rejects_out_of_range_rating() {
        let draft = ReviewDraft {
            rating: 6,
            comment: "nice".to_string(),
            source: VideoSource::External,
            external: "https://v.test/1".to_string(),
            ..ReviewDraft::default()
        };
        let err = draft.validate("12345").unwrap_err();
        assert!(err.is_validation());
        assert_eq!(err.to_string(), "Rating must be between 1 and 5");
    }

    #[test]
    fn validation_requires_comment_and_video() {
        let mut draft = ReviewDraft {
            rating: 4,
            comment: "   ".to_string(),
            ..ReviewDraft::default()
        };
        assert!(draft.validate("12345").is_err());
        draft.comment = "fun chart".to_string();
        assert_eq!(
            draft.validate("12345").unwrap_err().to_string(),
            "Choose a video file to upload"
        );
        draft.upload = Some(("clip.mp4".to_string(), vec![1, 2, 3]));
        let review = draft.validate("12345").unwrap();
        assert_eq!(review.video.source(), VideoSource::Upload);
        assert!(draft.validate("1234").is_err());
    }

    #[test]
    fn stars_follow_rating_steps() {
        let mut modal = ReviewModal::default();
        modal.mode = ModalMode::Create;
        modal.step_rating(1);
        assert_eq!(modal.draft().rating, 5);
        modal.step_rating(-2);
        assert_eq!(modal.stars(), [true, true, true, false, false]);
        modal.set_rating(9);
        assert_eq!(modal.draft().rating, 3);
    }
}
