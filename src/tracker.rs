//! Single-code tracking page: follows the code currently on the clipboard,
//! saves its completion, and keeps a newest-first history feed.

use crate::api::ScoreApi;
use crate::config::Tunables;
use crate::errors::{ClientError, Result};
use crate::extract::parse_completion;
use crate::filter::ListQuery;
use crate::models::{ScoreRecord, ScoreStats};
use crate::realtime::{ClipboardUpdate, FavoriteUpdate, RemarkPush, ServerEvent, SyncAction};
use crate::regions::{Feature, RegionSet};
use crate::remark::{apply_reconcile, Reconcile, RemarkModal, RemarkSaved};
use crate::render::{drive, Chunk, ChunkedList, Completion as RenderDone, RenderToken, ScrollPolicy};
use crate::review::{ModalMode, OpenRequest, PreferredMode, ReviewModal, ReviewOrigin, ReviewSubmitted};
use crate::toast::Toasts;
use crate::ui::{render_history_item, render_load_all, text_history_item, HistoryItemView};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayStatus {
    Playing,
    Completed,
}

/// The code most recently announced by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentCode {
    pub record: ScoreRecord,
    pub exists: bool,
    pub status: PlayStatus,
    pub message: String,
}

/// Fires once after `delay` of input inactivity.
#[derive(Debug, Clone)]
pub struct Debouncer {
    delay: Duration,
    due: Option<Instant>,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self { delay, due: None }
    }

    pub fn touch(&mut self, now: Instant) {
        self.due = Some(now + self.delay);
    }

    pub fn cancel(&mut self) {
        self.due = None;
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.due
    }

    pub fn fire(&mut self, now: Instant) -> bool {
        if self.due.is_some_and(|due| due <= now) {
            self.due = None;
            return true;
        }
        false
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedHistory {
    pub items: Vec<HistoryItemView>,
    pub done: Option<RenderDone>,
}

impl RenderedHistory {
    pub fn hidden(&self) -> usize {
        self.done.map_or(0, |done| done.hidden)
    }

    pub fn to_html(&self, codes_only: bool) -> String {
        let mut html: String = self
            .items
            .iter()
            .map(|item| render_history_item(item, codes_only))
            .collect();
        if self.hidden() > 0 {
            html.push_str(&render_load_all(self.hidden()));
        }
        html
    }

    pub fn to_text(&self, codes_only: bool) -> String {
        let mut out = String::new();
        for item in &self.items {
            out.push_str(&text_history_item(item, codes_only));
            out.push('\n');
        }
        if self.hidden() > 0 {
            out.push_str(&format!("... {} more (use --all)\n", self.hidden()));
        }
        out
    }
}

fn sort_newest_first(records: &mut [ScoreRecord]) {
    records.sort_by(|a, b| b.created_at_utc().cmp(&a.created_at_utc()));
}

pub struct TrackerPage<A> {
    api: A,
    regions: RegionSet,
    current: Option<CurrentCode>,
    completion_raw: String,
    save_enabled: bool,
    autosave: Option<Debouncer>,
    autosave_delay: Duration,
    history: Vec<ScoreRecord>,
    favorites_only: bool,
    codes_only: bool,
    stats: Option<ScoreStats>,
    list: ChunkedList<HistoryItemView>,
    message: String,
    current_tx: watch::Sender<Option<String>>,
    pub toasts: Toasts,
    pub review: ReviewModal,
    pub remark: RemarkModal,
}

impl<A: ScoreApi> TrackerPage<A> {
    pub fn new(api: A, tunables: &Tunables, regions: RegionSet) -> Self {
        let (current_tx, _) = watch::channel(None);
        Self {
            api,
            current: None,
            completion_raw: String::new(),
            save_enabled: false,
            autosave: None,
            autosave_delay: tunables.autosave_debounce,
            history: Vec::new(),
            favorites_only: false,
            codes_only: false,
            stats: None,
            list: ChunkedList::new(tunables.chunk_size, Some(tunables.render_cap)),
            message: String::new(),
            current_tx,
            toasts: Toasts::new(tunables.toast_duration),
            review: ReviewModal::new(regions.supports(Feature::Reviews)),
            remark: RemarkModal::default(),
            regions,
        }
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    pub fn current(&self) -> Option<&CurrentCode> {
        self.current.as_ref()
    }

    /// Widgets that depend on the current code watch this instead of
    /// inspecting page state.
    pub fn subscribe_current(&self) -> watch::Receiver<Option<String>> {
        self.current_tx.subscribe()
    }

    pub fn history(&self) -> &[ScoreRecord] {
        &self.history
    }

    pub fn stats(&self) -> Option<&ScoreStats> {
        self.stats.as_ref()
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn completion_input(&self) -> &str {
        &self.completion_raw
    }

    pub fn can_save(&self) -> bool {
        self.save_enabled && self.current.is_some()
    }

    pub fn favorites_only(&self) -> bool {
        self.favorites_only
    }

    pub fn codes_only(&self) -> bool {
        self.codes_only
    }

    pub fn set_autosave(&mut self, enabled: bool) {
        self.autosave = enabled.then(|| Debouncer::new(self.autosave_delay));
    }

    pub fn autosave_deadline(&self) -> Option<Instant> {
        self.autosave.as_ref().and_then(Debouncer::deadline)
    }

    pub fn set_completion_input(&mut self, raw: &str, now: Instant) {
        self.completion_raw = raw.to_string();
        self.save_enabled = parse_completion(raw).is_some();
        let armed = self.can_save();
        if let Some(debouncer) = self.autosave.as_mut() {
            if armed {
                debouncer.touch(now);
            } else {
                debouncer.cancel();
            }
        }
    }

    /// Saves once the input has been idle for the debounce delay.
    pub async fn poll_autosave(&mut self, now: Instant) -> Result<bool> {
        let due = self.autosave.as_mut().is_some_and(|debouncer| debouncer.fire(now));
        if !due {
            return Ok(false);
        }
        self.save().await?;
        Ok(true)
    }

    fn set_current(&mut self, current: Option<CurrentCode>) {
        let code = current.as_ref().map(|c| c.record.score_code.clone());
        self.current = current;
        self.current_tx.send_if_modified(|published| {
            if *published == code {
                return false;
            }
            *published = code;
            true
        });
    }

    fn current_matching(&mut self, score_code: &str) -> Option<&mut CurrentCode> {
        self.current
            .as_mut()
            .filter(|current| current.record.score_code == score_code)
    }

    fn patch_history(&mut self, score_code: &str, patch: impl Fn(&mut ScoreRecord) -> bool) -> SyncAction {
        let mut found = false;
        let mut changed = false;
        for record in self.history.iter_mut().filter(|r| r.score_code == score_code) {
            found = true;
            changed |= patch(record);
        }
        match (found, changed) {
            (false, _) => SyncAction::Refetch,
            (true, true) => SyncAction::Rerender,
            (true, false) => SyncAction::None,
        }
    }

    /// Applies a push event to local state only. Reapplying the same payload
    /// is a no-op.
    pub fn patch_event(&mut self, event: &ServerEvent) -> SyncAction {
        match event {
            ServerEvent::Clipboard(ClipboardUpdate::ScoreCode {
                score_code,
                exists,
                completion,
                is_favorite,
                remark,
                has_review,
            }) => {
                let record = ScoreRecord {
                    completion: if *exists { *completion } else { None },
                    is_favorite: *exists && is_favorite.unwrap_or(false),
                    remark: remark.clone().unwrap_or_default(),
                    has_review: has_review.unwrap_or(false),
                    ..ScoreRecord::new(score_code.as_str())
                };
                self.completion_raw = record.completion.map(|c| c.to_string()).unwrap_or_default();
                self.save_enabled = record.completion.is_some();
                self.message.clear();
                if let Some(debouncer) = self.autosave.as_mut() {
                    debouncer.cancel();
                }
                let snapshot = record.clone();
                self.set_current(Some(CurrentCode {
                    record,
                    exists: *exists,
                    status: PlayStatus::Playing,
                    message: String::new(),
                }));
                if !*exists {
                    return SyncAction::None;
                }
                self.patch_history(score_code, |r| {
                    let before = r.clone();
                    r.completion = snapshot.completion;
                    r.is_favorite = snapshot.is_favorite;
                    if remark.is_some() {
                        r.remark = snapshot.remark.clone();
                    }
                    if has_review.is_some() {
                        r.has_review = snapshot.has_review;
                    }
                    *r != before
                })
            }
            ServerEvent::Clipboard(ClipboardUpdate::Completion {
                score_code,
                completion,
                message,
            }) => {
                let message = message.clone().unwrap_or_default();
                let matched = match self.current_matching(score_code) {
                    Some(current) => {
                        current.status = PlayStatus::Completed;
                        current.exists = true;
                        current.record.completion = Some(*completion);
                        current.message = message.clone();
                        true
                    }
                    None => false,
                };
                if matched {
                    self.completion_raw = completion.to_string();
                    self.save_enabled = false;
                    self.message = message;
                }
                let completion = *completion;
                self.patch_history(score_code, |r| {
                    let changed = r.completion != Some(completion);
                    r.completion = Some(completion);
                    changed
                })
            }
            ServerEvent::Favorite(FavoriteUpdate {
                score_code,
                is_favorite,
            }) => {
                if let Some(current) = self.current_matching(score_code) {
                    current.record.is_favorite = *is_favorite;
                }
                let is_favorite = *is_favorite;
                self.patch_history(score_code, |r| {
                    let changed = r.is_favorite != is_favorite;
                    r.is_favorite = is_favorite;
                    changed
                })
            }
            ServerEvent::Remark(RemarkPush { score_code, remark }) => {
                let remark = remark.clone().unwrap_or_default();
                if let Some(current) = self.current_matching(score_code) {
                    current.record.remark = remark.clone();
                }
                self.patch_history(score_code, |r| {
                    let changed = r.remark != remark;
                    r.remark = remark.clone();
                    changed
                })
            }
        }
    }

    /// Patches first; re-fetches only when the record is not cached.
    pub async fn handle_event(&mut self, event: &ServerEvent) -> Result<SyncAction> {
        let action = self.patch_event(event);
        debug!(score_code = event.score_code(), ?action, "tracker event");
        if action == SyncAction::Refetch {
            self.refresh_history().await?;
        }
        let touches_stats = matches!(
            event,
            ServerEvent::Clipboard(ClipboardUpdate::Completion { .. }) | ServerEvent::Favorite(_)
        );
        if touches_stats && action != SyncAction::None {
            self.refresh_stats().await?;
        }
        Ok(action)
    }

    pub async fn load(&mut self) -> Result<()> {
        self.refresh_stats().await?;
        self.refresh_history().await?;
        Ok(())
    }

    pub async fn refresh_history(&mut self) -> Result<usize> {
        match self.api.list_scores(&ListQuery::default()).await {
            Ok(mut records) => {
                sort_newest_first(&mut records);
                self.history = records;
                debug!(records = self.history.len(), "history refreshed");
                Ok(self.history.len())
            }
            Err(err) => {
                warn!("loading history failed: {err}");
                self.toasts.push("Failed to load history");
                Err(err)
            }
        }
    }

    pub async fn refresh_stats(&mut self) -> Result<ScoreStats> {
        match self.api.stats().await {
            Ok(stats) => {
                self.stats = Some(stats.clone());
                Ok(stats)
            }
            Err(err) => {
                error!("loading stats failed: {err}");
                Err(err)
            }
        }
    }

    fn current_code(&mut self) -> Result<String> {
        match &self.current {
            Some(current) => Ok(current.record.score_code.clone()),
            None => {
                self.toasts.push("Copy a score code first");
                Err(ClientError::validation("No current score code"))
            }
        }
    }

    pub async fn save(&mut self) -> Result<()> {
        let score_code = self.current_code()?;
        let Some(completion) = parse_completion(&self.completion_raw) else {
            self.message = "Completion must be between 0 and 100".to_string();
            return Err(ClientError::validation("Completion must be between 0 and 100"));
        };
        if let Some(debouncer) = self.autosave.as_mut() {
            debouncer.cancel();
        }

        if let Err(err) = self.api.save_completion(&score_code, completion).await {
            warn!("saving {score_code} failed: {err}");
            self.message = err.to_string();
            self.toasts.push(format!("Save failed: {err}"));
            return Err(err);
        }
        info!(%score_code, completion, "completion saved");
        if let Some(current) = self.current_matching(&score_code) {
            current.exists = true;
            current.record.completion = Some(completion);
        }
        self.refresh_history().await?;
        Ok(())
    }

    /// Saves a valid pending completion first, then toggles. The server's
    /// answer is taken as the new state.
    pub async fn toggle_favorite(&mut self) -> Result<bool> {
        let score_code = self.current_code()?;
        if let Some(completion) = parse_completion(&self.completion_raw) {
            if let Err(err) = self.api.save_completion(&score_code, completion).await {
                warn!("saving {score_code} before favorite failed: {err}");
                self.toasts.push(format!("Save failed: {err}"));
                return Err(err);
            }
        }
        let is_favorite = match self.api.toggle_favorite(&score_code).await {
            Ok(is_favorite) => is_favorite,
            Err(err) => {
                warn!("favorite toggle for {score_code} failed: {err}");
                self.toasts.push(format!("Favorite update failed: {err}"));
                return Err(err);
            }
        };
        if let Some(current) = self.current_matching(&score_code) {
            current.exists = true;
            current.record.is_favorite = is_favorite;
        }
        self.refresh_history().await?;
        Ok(is_favorite)
    }

    /// Toggle from a history entry.
    pub async fn toggle_history_favorite(&mut self, score_code: &str) -> Result<SyncAction> {
        let is_favorite = match self.api.toggle_favorite(score_code).await {
            Ok(is_favorite) => is_favorite,
            Err(err) => {
                self.toasts.push(format!("Favorite update failed: {err}"));
                return Err(err);
            }
        };
        self.handle_event(&ServerEvent::Favorite(FavoriteUpdate {
            score_code: score_code.to_string(),
            is_favorite,
        }))
        .await
    }

    pub fn set_favorites_only(&mut self, favorites_only: bool) -> SyncAction {
        if self.favorites_only == favorites_only {
            return SyncAction::None;
        }
        self.favorites_only = favorites_only;
        SyncAction::Rerender
    }

    pub fn set_codes_only(&mut self, codes_only: bool) -> SyncAction {
        if self.codes_only == codes_only {
            return SyncAction::None;
        }
        self.codes_only = codes_only;
        SyncAction::Rerender
    }

    pub fn visible_history(&self) -> Vec<&ScoreRecord> {
        self.history
            .iter()
            .filter(|record| !self.favorites_only || record.is_favorite)
            .collect()
    }

    pub fn begin_render(&mut self, scroll: ScrollPolicy) -> RenderToken {
        let items = self
            .visible_history()
            .into_iter()
            .map(HistoryItemView::from)
            .collect();
        self.list.begin(items, scroll)
    }

    pub fn next_chunk(&mut self, token: RenderToken) -> Option<Chunk<HistoryItemView>> {
        self.list.next_chunk(token)
    }

    /// Lifts the initial cap and starts a fresh pass.
    pub fn load_all(&mut self) -> RenderToken {
        self.list.show_all();
        self.begin_render(ScrollPolicy::Preserve)
    }

    pub fn show_all(&mut self) {
        self.list.show_all();
    }

    /// Runs a whole chunked pass, yielding between chunks.
    pub async fn render_history(&mut self, scroll: ScrollPolicy) -> RenderedHistory {
        let token = self.begin_render(scroll);
        let mut rendered = RenderedHistory {
            items: Vec::new(),
            done: None,
        };
        drive(
            &mut self.list,
            token,
            |chunk| {
                if chunk.replace {
                    rendered.items.clear();
                }
                rendered.items.extend(chunk.items);
                if chunk.done.is_some() {
                    rendered.done = chunk.done;
                }
            },
            tokio::task::yield_now,
        )
        .await;
        rendered
    }

    pub async fn open_remark(&mut self) -> bool {
        if !self.regions.supports(Feature::Remarks) {
            self.toasts.push(Feature::Remarks.unavailable_message());
            return false;
        }
        let Some(current) = &self.current else {
            self.toasts.push("Copy a score code first");
            return false;
        };
        let score_code = current.record.score_code.clone();
        let initial = current.record.remark.clone();
        self.remark.open_single(&self.api, &score_code, &initial).await;
        true
    }

    pub async fn save_remark(&mut self) -> Result<Option<RemarkSaved>> {
        let saved = self.remark.save(&self.api).await?;
        if let Some(saved) = &saved {
            self.apply_remark_saved(saved).await?;
        }
        Ok(saved)
    }

    /// Folds a saved remark into the current code and the history cache.
    pub async fn apply_remark_saved(&mut self, saved: &RemarkSaved) -> Result<SyncAction> {
        let plan = saved.reconcile();
        if plan == Reconcile::Refetch {
            self.refresh_history().await?;
            return Ok(SyncAction::Refetch);
        }
        if let Some(current) = self.current.as_mut() {
            apply_reconcile(std::slice::from_mut(&mut current.record), &plan);
        }
        Ok(if apply_reconcile(&mut self.history, &plan) {
            SyncAction::Rerender
        } else {
            SyncAction::None
        })
    }

    pub async fn open_review(&mut self, mode: PreferredMode) -> Option<ModalMode> {
        if !self.review.is_ready() {
            self.toasts.push(Feature::Reviews.unavailable_message());
            return None;
        }
        let score_code = self.current_code().ok()?;
        let request = OpenRequest::new(score_code.as_str(), mode, ReviewOrigin::Current);
        let opened = self.review.open(&self.api, request).await;
        match opened {
            Some(ModalMode::View) if self.review.view().is_some() => self.mark_reviewed(&score_code, true),
            Some(ModalMode::Create) if mode == PreferredMode::View => {
                self.mark_reviewed(&score_code, false)
            }
            _ => {}
        }
        opened
    }

    pub async fn submit_review(&mut self) -> Result<Option<ReviewSubmitted>> {
        let submitted = self.review.submit(&self.api).await?;
        if let Some(submitted) = &submitted {
            self.mark_reviewed(&submitted.score_code, true);
        }
        Ok(submitted)
    }

    fn mark_reviewed(&mut self, score_code: &str, has_review: bool) {
        if let Some(current) = self.current_matching(score_code) {
            current.record.has_review = has_review;
        }
        for record in self.history.iter_mut().filter(|r| r.score_code == score_code) {
            record.has_review = has_review;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RemarkUpdate;
    use crate::testing::FakeApi;

    fn record(code: &str, completion: Option<u8>, favorite: bool, created_at: &str) -> ScoreRecord {
        ScoreRecord {
            completion,
            is_favorite: favorite,
            created_at: Some(created_at.to_string()),
            ..ScoreRecord::new(code)
        }
    }

    fn page(records: Vec<ScoreRecord>) -> TrackerPage<FakeApi> {
        TrackerPage::new(FakeApi::with_records(records), &Tunables::default(), RegionSet::all())
    }

    fn code_event(code: &str, exists: bool, completion: Option<u8>) -> ServerEvent {
        ServerEvent::Clipboard(ClipboardUpdate::ScoreCode {
            score_code: code.to_string(),
            exists,
            completion,
            is_favorite: Some(false),
            remark: None,
            has_review: None,
        })
    }

    #[tokio::test]
    async fn history_is_sorted_newest_first() {
        let mut page = page(vec![
            record("11111", Some(10), false, "2025-01-01 10:00:00"),
            record("22222", Some(20), false, "2025-03-01 10:00:00"),
            record("33333", None, false, "2025-02-01 10:00:00"),
        ]);
        page.load().await.unwrap();
        let codes: Vec<_> = page.history().iter().map(|r| r.score_code.as_str()).collect();
        assert_eq!(codes, vec!["22222", "33333", "11111"]);
        assert_eq!(page.stats().unwrap().total_records, 3);
    }

    #[tokio::test]
    async fn favorite_push_is_idempotent() {
        let mut page = page(vec![record("11111", Some(10), false, "2025-01-01 10:00:00")]);
        page.refresh_history().await.unwrap();
        let event = ServerEvent::Favorite(FavoriteUpdate {
            score_code: "11111".to_string(),
            is_favorite: true,
        });
        assert_eq!(page.patch_event(&event), SyncAction::Rerender);
        assert_eq!(page.patch_event(&event), SyncAction::None);
        assert!(page.history()[0].is_favorite);
    }

    #[tokio::test]
    async fn push_for_uncached_record_refetches() {
        let mut page = page(Vec::new());
        page.refresh_history().await.unwrap();
        page.api().state.lock().unwrap().records.push(record("44444", Some(50), true, "2025-01-01 10:00:00"));
        let event = ServerEvent::Favorite(FavoriteUpdate {
            score_code: "44444".to_string(),
            is_favorite: true,
        });
        assert_eq!(page.handle_event(&event).await.unwrap(), SyncAction::Refetch);
        assert_eq!(page.history().len(), 1);
        assert_eq!(page.stats().unwrap().favorite_songs, 1);
    }

    #[tokio::test]
    async fn new_code_publishes_and_gates_save() {
        let mut page = page(Vec::new());
        let mut watcher = page.subscribe_current();
        page.patch_event(&code_event("12345", false, None));
        assert!(watcher.has_changed().unwrap());
        assert_eq!(watcher.borrow_and_update().as_deref(), Some("12345"));
        assert!(!page.can_save());

        page.set_completion_input("42", Instant::now());
        assert!(page.can_save());
        page.set_completion_input("142", Instant::now());
        assert!(!page.can_save());
    }

    #[tokio::test]
    async fn completion_push_disables_save_until_new_input() {
        let mut page = page(Vec::new());
        page.patch_event(&code_event("12345", false, None));
        page.set_completion_input("40", Instant::now());
        page.patch_event(&ServerEvent::Clipboard(ClipboardUpdate::Completion {
            score_code: "12345".to_string(),
            completion: 88,
            message: Some("Recorded 88%".to_string()),
        }));
        let current = page.current().unwrap();
        assert_eq!(current.status, PlayStatus::Completed);
        assert_eq!(current.record.completion, Some(88));
        assert_eq!(page.completion_input(), "88");
        assert!(!page.can_save());
        assert_eq!(page.message(), "Recorded 88%");
    }

    #[tokio::test]
    async fn save_round_trips_completion() {
        let mut page = page(Vec::new());
        page.patch_event(&code_event("12345", false, None));
        page.set_completion_input("42", Instant::now());
        page.save().await.unwrap();
        assert_eq!(page.history()[0].completion, Some(42));
        assert_eq!(page.current().unwrap().record.completion, Some(42));
    }

    #[tokio::test]
    async fn invalid_completion_never_reaches_the_server() {
        let mut page = page(Vec::new());
        page.patch_event(&code_event("12345", false, None));
        page.set_completion_input("abc", Instant::now());
        assert!(page.save().await.unwrap_err().is_validation());
        assert!(page.api().calls().is_empty());
    }

    #[tokio::test]
    async fn favorite_saves_pending_completion_first() {
        let mut page = page(Vec::new());
        page.patch_event(&code_event("12345", false, None));
        page.set_completion_input("75", Instant::now());
        assert!(page.toggle_favorite().await.unwrap());
        let calls = page.api().calls();
        assert_eq!(&calls[..2], &["save_completion", "toggle_favorite"]);
        let stored = page.api().record("12345").unwrap();
        assert_eq!(stored.completion, Some(75));
        assert!(stored.is_favorite);
        assert!(page.current().unwrap().record.is_favorite);
    }

    #[tokio::test]
    async fn failed_favorite_leaves_state_untouched() {
        let mut page = page(Vec::new());
        page.patch_event(&code_event("12345", false, None));
        page.api().fail("toggle_favorite");
        assert!(page.toggle_favorite().await.is_err());
        assert!(!page.current().unwrap().record.is_favorite);
        assert!(page.toasts.latest().unwrap().starts_with("Favorite update failed"));
    }

    #[tokio::test]
    async fn autosave_fires_after_idle_delay() {
        let mut page = page(Vec::new());
        page.set_autosave(true);
        page.patch_event(&code_event("12345", false, None));
        let start = Instant::now();
        page.set_completion_input("3", start);
        page.set_completion_input("30", start + Duration::from_millis(600));
        assert!(!page.poll_autosave(start + Duration::from_millis(1200)).await.unwrap());
        assert!(page.poll_autosave(start + Duration::from_millis(1600)).await.unwrap());
        assert_eq!(page.api().record("12345").unwrap().completion, Some(30));
        assert!(page.autosave_deadline().is_none());
    }

    #[tokio::test]
    async fn favorites_only_filters_render() {
        let mut page = page(vec![
            record("11111", Some(10), true, "2025-01-01 10:00:00"),
            record("22222", Some(20), false, "2025-01-02 10:00:00"),
        ]);
        page.refresh_history().await.unwrap();
        assert_eq!(page.set_favorites_only(true), SyncAction::Rerender);
        let rendered = page.render_history(ScrollPolicy::Preserve).await;
        assert_eq!(rendered.items.len(), 1);
        assert_eq!(rendered.items[0].score_code, "11111");
        assert!(rendered.to_html(true).contains("history-11111"));
    }

    #[tokio::test]
    async fn history_render_is_capped_until_load_all() {
        let records = (0..5)
            .map(|i| record(&format!("1000{i}"), Some(i), false, &format!("2025-01-01 10:00:0{i}")))
            .collect();
        let tunables = Tunables {
            chunk_size: 2,
            render_cap: 3,
            ..Tunables::default()
        };
        let mut page = TrackerPage::new(FakeApi::with_records(records), &tunables, RegionSet::all());
        page.refresh_history().await.unwrap();
        let rendered = page.render_history(ScrollPolicy::Reset).await;
        assert_eq!(rendered.items.len(), 3);
        assert_eq!(rendered.hidden(), 2);
        assert!(rendered.to_html(false).contains("Load all (2 more)"));

        page.show_all();
        let rendered = page.render_history(ScrollPolicy::Preserve).await;
        assert_eq!(rendered.items.len(), 5);
        assert_eq!(rendered.hidden(), 0);
    }

    #[tokio::test]
    async fn remark_save_updates_current_and_history() {
        let mut page = page(vec![record("12345", Some(10), false, "2025-01-01 10:00:00")]);
        page.refresh_history().await.unwrap();
        page.patch_event(&code_event("12345", true, Some(10)));
        assert!(page.open_remark().await);
        page.remark.text = "tricky bridge".to_string();
        let saved = page.save_remark().await.unwrap().unwrap();
        assert_eq!(
            saved.reconcile(),
            Reconcile::Updates(vec![RemarkUpdate {
                score_code: "12345".to_string(),
                remark: "tricky bridge".to_string(),
            }])
        );
        assert_eq!(page.current().unwrap().record.remark, "tricky bridge");
        assert_eq!(page.history()[0].remark, "tricky bridge");
        assert!(!page.remark.is_open());
    }

    #[tokio::test]
    async fn missing_remark_region_degrades_with_toast() {
        let regions = RegionSet::all().without(crate::regions::Region::RemarkModal);
        let mut page = TrackerPage::new(FakeApi::default(), &Tunables::default(), regions);
        page.patch_event(&code_event("12345", false, None));
        assert!(!page.open_remark().await);
        assert_eq!(page.toasts.latest(), Some("Remark dialog unavailable"));
    }

    #[tokio::test]
    async fn view_without_review_falls_back_and_clears_heart() {
        let mut page = page(Vec::new());
        page.patch_event(&ServerEvent::Clipboard(ClipboardUpdate::ScoreCode {
            score_code: "12345".to_string(),
            exists: true,
            completion: Some(10),
            is_favorite: None,
            remark: None,
            has_review: Some(true),
        }));
        let mode = page.open_review(PreferredMode::View).await;
        assert_eq!(mode, Some(ModalMode::Create));
        assert!(!page.current().unwrap().record.has_review);
    }
}
