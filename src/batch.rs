//! Batch query page: pasted code lists, server-side filters, a results table
//! and a random picker over the filtered rows.

use crate::api::ScoreApi;
use crate::clipboard::Clipboard;
use crate::config::Tunables;
use crate::errors::{ClientError, Result};
use crate::extract::{is_valid_score_code, parse_completion};
use crate::filter::{
    parse_completion_bounds, plan_query, FavoriteFilter, FilterState, PoolFilter, QueryInputs, QueryPlan, ViewOptions,
};
use crate::models::ScoreRecord;
use crate::realtime::{ClipboardUpdate, FavoriteUpdate, RemarkPush, ServerEvent, SyncAction};
use crate::regions::{Feature, RegionSet};
use crate::remark::{apply_reconcile, Reconcile, RemarkModal, RemarkSaved};
use crate::review::{ModalMode, OpenRequest, PreferredMode, ReviewModal, ReviewOrigin, ReviewSubmitted};
use crate::storage::Preferences;
use crate::theme::Theme;
use crate::toast::Toasts;
use crate::ui::{render_count, render_random_card, render_table_body, text_table, RowView, TableState, TableView};
use rand::Rng;
use tracing::{debug, info, warn};

/// Identifies one list load; only the newest ticket may apply its result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadTicket(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    Applied(usize),
    /// A newer load started first; the result was discarded.
    Superseded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TableLoad {
    Loading,
    Failed,
    Ready,
}

/// The jianshang button fetches once, then pulls the latest codes into the
/// exclude list on every later press.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JianshangStep {
    #[default]
    Fetch,
    Latest,
}

impl JianshangStep {
    pub fn label(self) -> &'static str {
        match self {
            Self::Fetch => "Fetch jianshang",
            Self::Latest => "Latest codes",
        }
    }
}

pub struct BatchPage<A> {
    api: A,
    regions: RegionSet,
    pub inputs: QueryInputs,
    filter: FilterState,
    pub view: ViewOptions,
    results: Vec<ScoreRecord>,
    table: TableLoad,
    load_seq: u64,
    last_pick: Option<String>,
    card: Option<ScoreRecord>,
    jianshang: JianshangStep,
    pub toasts: Toasts,
    pub review: ReviewModal,
    pub remark: RemarkModal,
}

impl<A: ScoreApi> BatchPage<A> {
    pub fn new(api: A, tunables: &Tunables, regions: RegionSet) -> Self {
        Self {
            api,
            inputs: QueryInputs::default(),
            filter: FilterState::default(),
            view: ViewOptions::default(),
            results: Vec::new(),
            table: TableLoad::Loading,
            load_seq: 0,
            last_pick: None,
            card: None,
            jianshang: JianshangStep::default(),
            toasts: Toasts::new(tunables.toast_duration),
            review: ReviewModal::new(regions.supports(Feature::Reviews)),
            remark: RemarkModal::default(),
            regions,
        }
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    pub fn filter(&self) -> &FilterState {
        &self.filter
    }

    pub fn results(&self) -> &[ScoreRecord] {
        &self.results
    }

    pub fn card(&self) -> Option<&ScoreRecord> {
        self.card.as_ref()
    }

    pub fn jianshang_step(&self) -> JianshangStep {
        self.jianshang
    }

    /// Rows left after the client-side view filter.
    pub fn filtered(&self) -> Vec<&ScoreRecord> {
        self.view.apply(&self.results)
    }

    /// Starts a load and invalidates any load still in flight.
    pub fn begin_load(&mut self) -> (LoadTicket, QueryPlan) {
        self.load_seq += 1;
        self.table = TableLoad::Loading;
        (LoadTicket(self.load_seq), plan_query(&self.inputs, &self.filter))
    }

    /// Applies a finished load unless a newer one has started. A superseded
    /// load is not an error, whatever its result.
    pub fn finish_load(
        &mut self,
        ticket: LoadTicket,
        result: Result<Vec<ScoreRecord>>,
    ) -> Result<LoadOutcome> {
        if ticket != LoadTicket(self.load_seq) {
            debug!(?ticket, latest = self.load_seq, "discarding superseded load");
            return Ok(LoadOutcome::Superseded);
        }
        match result {
            Ok(records) => {
                self.display_results(records);
                Ok(LoadOutcome::Applied(self.results.len()))
            }
            Err(err) => {
                warn!("loading results failed: {err}");
                self.table = TableLoad::Failed;
                self.toasts.push(match &err {
                    ClientError::Server(message) => format!("Query failed: {message}"),
                    _ => "Failed to load data".to_string(),
                });
                Err(err)
            }
        }
    }

    /// Listing when no codes or remark filters are given, batch lookup otherwise.
    pub async fn load_data(&mut self) -> Result<LoadOutcome> {
        let (ticket, plan) = self.begin_load();
        let result = self.api.execute(&plan).await;
        self.finish_load(ticket, result)
    }

    fn display_results(&mut self, records: Vec<ScoreRecord>) {
        self.results = records;
        self.table = TableLoad::Ready;
        if let Some(card) = self.card.as_mut() {
            if let Some(latest) = self.results.iter().find(|r| r.score_code == card.score_code) {
                *card = latest.clone();
            }
        }
    }

    /// Validates both bounds before touching the filter.
    pub async fn apply_completion_filter(&mut self, min_raw: &str, max_raw: &str) -> Result<LoadOutcome> {
        let (min, max) = match parse_completion_bounds(min_raw, max_raw) {
            Ok(bounds) => bounds,
            Err(err) => {
                self.toasts.push(err.to_string());
                return Err(err);
            }
        };
        self.filter.min_completion = min;
        self.filter.max_completion = max;
        self.load_data().await
    }

    /// Takes effect on the next load.
    pub fn set_favorite_filter(&mut self, favorite: FavoriteFilter) {
        self.filter.favorite = favorite;
    }

    pub async fn cycle_favorite_filter(&mut self) -> Result<LoadOutcome> {
        self.filter.favorite = self.filter.favorite.next();
        self.load_data().await
    }

    pub fn table_view(&self) -> TableView {
        let state = match self.table {
            TableLoad::Loading => TableState::Loading,
            TableLoad::Failed => TableState::Failed,
            TableLoad::Ready => TableState::Rows(self.filtered().into_iter().map(RowView::from).collect()),
        };
        TableView {
            state,
            view: self.view,
        }
    }

    pub fn render_html(&self) -> String {
        let table = self.table_view();
        format!(
            r#"<tbody id="resultsBody">{}</tbody><span id="scoreCount">{}</span>"#,
            render_table_body(&table),
            render_count(table.count())
        )
    }

    pub fn render_text(&self) -> String {
        match self.table_view().state {
            TableState::Rows(rows) => text_table(&rows, &self.view),
            TableState::Loading => "Loading...\n".to_string(),
            TableState::Failed => "Failed to load, please retry\n".to_string(),
        }
    }

    fn remark_filters_match(&self, record: &ScoreRecord) -> bool {
        let include = self.inputs.include_remark.trim();
        let exclude = self.inputs.exclude_remark.trim();
        (include.is_empty() || record.remark.contains(include))
            && (exclude.is_empty() || !record.remark.contains(exclude))
    }

    /// Patches every cached copy of `score_code`, then drops rows that stopped
    /// matching the active filters.
    fn patch_results(&mut self, score_code: &str, patch: impl Fn(&mut ScoreRecord) -> bool) -> SyncAction {
        if let Some(card) = self.card.as_mut().filter(|card| card.score_code == score_code) {
            patch(card);
        }
        let mut found = false;
        let mut changed = false;
        for record in self.results.iter_mut().filter(|r| r.score_code == score_code) {
            found = true;
            changed |= patch(record);
        }
        if !found {
            return SyncAction::Refetch;
        }
        let before = self.results.len();
        let filter = self.filter;
        let results = std::mem::take(&mut self.results);
        self.results = results
            .into_iter()
            .filter(|r| r.score_code != score_code || (filter.matches(r) && self.remark_filters_match(r)))
            .collect();
        if changed || self.results.len() != before {
            SyncAction::Rerender
        } else {
            SyncAction::None
        }
    }

    /// Applies a push event to local state only.
    pub fn patch_event(&mut self, event: &ServerEvent) -> SyncAction {
        match event {
            ServerEvent::Clipboard(ClipboardUpdate::ScoreCode { .. }) => SyncAction::None,
            ServerEvent::Clipboard(ClipboardUpdate::Completion {
                score_code,
                completion,
                ..
            }) => {
                let completion = Some(*completion);
                self.patch_results(score_code, |r| {
                    let changed = r.completion != completion;
                    r.completion = completion;
                    changed
                })
            }
            ServerEvent::Favorite(FavoriteUpdate {
                score_code,
                is_favorite,
            }) => {
                let is_favorite = *is_favorite;
                self.patch_results(score_code, |r| {
                    let changed = r.is_favorite != is_favorite;
                    r.is_favorite = is_favorite;
                    changed
                })
            }
            ServerEvent::Remark(RemarkPush { score_code, remark }) => {
                let remark = remark.clone().unwrap_or_default();
                self.patch_results(score_code, |r| {
                    let changed = r.remark != remark;
                    r.remark = remark.clone();
                    changed
                })
            }
        }
    }

    /// Patches first and re-queries only for codes not in the table.
    pub async fn handle_event(&mut self, event: &ServerEvent) -> Result<SyncAction> {
        let action = self.patch_event(event);
        debug!(score_code = event.score_code(), ?action, "batch event");
        if action == SyncAction::Refetch {
            self.load_data().await?;
        }
        Ok(action)
    }

    /// Picks one filtered row, avoiding an immediate repeat when there is a
    /// choice, and copies its code.
    pub fn pick_random<R: Rng + ?Sized>(
        &mut self,
        rng: &mut R,
        clipboard: &mut dyn Clipboard,
    ) -> Option<ScoreRecord> {
        if !self.regions.supports(Feature::RandomPick) {
            self.toasts.push(Feature::RandomPick.unavailable_message());
            return None;
        }
        let candidates = self.filtered();
        let len = candidates.len();
        if len == 0 {
            self.toasts.push("No score codes to copy");
            return None;
        }

        let repeats = |index: usize| self.last_pick.as_deref() == Some(candidates[index].score_code.as_str());
        let mut index = 0;
        if len > 1 {
            for _ in 0..len {
                index = rng.gen_range(0..len);
                if !repeats(index) {
                    break;
                }
            }
            if repeats(index) {
                index = (index + 1) % len;
            }
        }
        let picked = candidates[index].clone();
        self.last_pick = Some(picked.score_code.clone());

        match clipboard.copy(&picked.score_code) {
            Ok(()) => {
                info!(score_code = %picked.score_code, "copied random pick");
                self.toasts.push(format!("Copied: {}", picked.score_code));
                self.card = Some(picked.clone());
                Some(picked)
            }
            Err(err) => {
                warn!("copy failed: {err}");
                self.toasts.push("Copy failed, please copy manually");
                None
            }
        }
    }

    pub fn card_html(&self, theme: Theme) -> Option<String> {
        self.card.as_ref().map(|card| render_random_card(card, theme))
    }

    fn card_code(&mut self) -> Result<String> {
        match &self.card {
            Some(card) => Ok(card.score_code.clone()),
            None => {
                self.toasts.push("Pick a score first");
                Err(ClientError::validation("No picked score"))
            }
        }
    }

    pub async fn edit_card_completion(&mut self, raw: &str) -> Result<u8> {
        let score_code = self.card_code()?;
        let Some(completion) = parse_completion(raw) else {
            self.toasts.push("Enter a number between 0 and 100");
            return Err(ClientError::validation("Completion must be between 0 and 100"));
        };
        if let Err(err) = self.api.save_completion(&score_code, completion).await {
            warn!("card completion save failed: {err}");
            self.toasts.push("Update failed");
            return Err(err);
        }
        let action = self.patch_results(&score_code, |r| {
            let changed = r.completion != Some(completion);
            r.completion = Some(completion);
            changed
        });
        self.resync_after_card_edit(&score_code, action).await;
        self.toasts.push("Completion updated");
        Ok(completion)
    }

    pub async fn toggle_card_favorite(&mut self) -> Result<bool> {
        let score_code = self.card_code()?;
        let is_favorite = match self.api.toggle_favorite(&score_code).await {
            Ok(is_favorite) => is_favorite,
            Err(err) => {
                warn!("card favorite toggle failed: {err}");
                self.toasts.push("Operation failed");
                return Err(err);
            }
        };
        let action = self.patch_results(&score_code, |r| {
            let changed = r.is_favorite != is_favorite;
            r.is_favorite = is_favorite;
            changed
        });
        self.resync_after_card_edit(&score_code, action).await;
        self.toasts.push(if is_favorite { "Favorited" } else { "Unfavorited" });
        Ok(is_favorite)
    }

    /// The card may outlive its table row; re-query so the table reflects the save.
    async fn resync_after_card_edit(&mut self, score_code: &str, action: SyncAction) {
        if action != SyncAction::Refetch {
            return;
        }
        if let Err(err) = self.load_data().await {
            warn!(score_code, "table refresh after card edit failed: {err}");
        }
    }

    fn cached(&self, score_code: &str) -> Option<&ScoreRecord> {
        self.results
            .iter()
            .chain(self.card.iter())
            .find(|r| r.score_code == score_code)
    }

    pub async fn open_remark_for(&mut self, score_code: &str) -> bool {
        if !self.regions.supports(Feature::Remarks) {
            self.toasts.push(Feature::Remarks.unavailable_message());
            return false;
        }
        let initial = self
            .cached(score_code)
            .map(|r| r.remark.clone())
            .unwrap_or_default();
        self.remark.open_single(&self.api, score_code, &initial).await;
        true
    }

    /// Opens the batch dialog over the filtered rows.
    pub fn open_batch_remark(&mut self) -> bool {
        if !self.regions.supports(Feature::Remarks) {
            self.toasts.push(Feature::Remarks.unavailable_message());
            return false;
        }
        let view = self.view;
        let rows = self.results.iter().filter(move |r| view.keeps(r));
        if rows.clone().next().is_none() {
            self.toasts.push("No scores in the current table to annotate");
            return false;
        }
        self.remark.open_batch(rows);
        true
    }

    pub async fn save_remark(&mut self) -> Result<Option<RemarkSaved>> {
        let saved = self.remark.save(&self.api).await?;
        if let Some(saved) = &saved {
            self.apply_remark_saved(saved).await?;
        }
        Ok(saved)
    }

    /// Reconciles the table and the picked card with a saved remark.
    pub async fn apply_remark_saved(&mut self, saved: &RemarkSaved) -> Result<SyncAction> {
        let plan = saved.reconcile();
        if plan == Reconcile::Refetch {
            self.load_data().await?;
            return Ok(SyncAction::Refetch);
        }
        if let Some(card) = self.card.as_mut() {
            apply_reconcile(std::slice::from_mut(card), &plan);
        }
        Ok(if apply_reconcile(&mut self.results, &plan) {
            SyncAction::Rerender
        } else {
            SyncAction::None
        })
    }

    /// Views an existing review or starts a new one, keeping the heart icons
    /// in step with what the server reported.
    pub async fn open_review_for(&mut self, score_code: &str, origin: ReviewOrigin) -> Option<ModalMode> {
        if !self.review.is_ready() {
            self.toasts.push(Feature::Reviews.unavailable_message());
            return None;
        }
        let preferred = if self.cached(score_code).is_some_and(|r| r.has_review) {
            PreferredMode::View
        } else {
            PreferredMode::Create
        };
        let opened = self
            .review
            .open(&self.api, OpenRequest::new(score_code, preferred, origin))
            .await;
        match opened {
            Some(ModalMode::View) if self.review.view().is_some() => self.mark_reviewed(score_code, true),
            Some(ModalMode::Create) if preferred == PreferredMode::View => {
                self.mark_reviewed(score_code, false)
            }
            _ => {}
        }
        opened
    }

    pub async fn submit_review(&mut self) -> Result<Option<ReviewSubmitted>> {
        let submitted = self.review.submit(&self.api).await?;
        if let Some(submitted) = &submitted {
            self.mark_reviewed(&submitted.score_code, true);
            self.load_data().await?;
        }
        Ok(submitted)
    }

    fn mark_reviewed(&mut self, score_code: &str, has_review: bool) {
        for record in self
            .results
            .iter_mut()
            .chain(self.card.iter_mut())
            .filter(|r| r.score_code == score_code)
        {
            record.has_review = has_review;
        }
    }

    /// First press harvests and shows a fresh batch; later presses exclude
    /// the latest harvested codes and re-query.
    pub async fn press_jianshang(&mut self) -> Result<LoadOutcome> {
        if !self.regions.supports(Feature::Jianshang) {
            self.toasts.push(Feature::Jianshang.unavailable_message());
            return Err(ClientError::validation(Feature::Jianshang.unavailable_message()));
        }
        match self.jianshang {
            JianshangStep::Fetch => {
                let harvest = match self.api.fetch_jianshang().await {
                    Ok(harvest) => harvest,
                    Err(err) => {
                        self.toasts.push(format!("Jianshang fetch failed: {err}"));
                        return Err(err);
                    }
                };
                self.load_seq += 1;
                self.inputs.include_codes = harvest
                    .items
                    .iter()
                    .map(|r| r.score_code.as_str())
                    .collect::<Vec<_>>()
                    .join("\n");
                self.display_results(harvest.items);
                self.jianshang = JianshangStep::Latest;
                self.toasts.push(format!(
                    "Fetched {} score codes. File: {}",
                    harvest.extracted_count,
                    harvest.filename.as_deref().unwrap_or("unknown file")
                ));
                Ok(LoadOutcome::Applied(self.results.len()))
            }
            JianshangStep::Latest => {
                let harvest = match self.api.latest_jianshang_codes().await {
                    Ok(harvest) => harvest,
                    Err(err) => {
                        self.toasts.push(format!("Failed to load latest codes: {err}"));
                        return Err(err);
                    }
                };
                let added = harvest.items.join("\n");
                let existing = self.inputs.exclude_codes.trim();
                self.inputs.exclude_codes = if existing.is_empty() {
                    added
                } else {
                    format!("{existing}\n{added}")
                };
                let outcome = self.load_data().await;
                self.toasts.push(format!(
                    "Extracted {} codes from {} and added them to the exclude list",
                    harvest.extracted_count,
                    harvest.filename.as_deref().unwrap_or("unknown file")
                ));
                outcome
            }
        }
    }

    /// Hands the active filter and the visible codes to the random-pool page.
    pub fn pool_handoff(&self, prefs: &mut Preferences) -> usize {
        let codes: Vec<String> = self
            .filtered()
            .into_iter()
            .map(|r| r.score_code.trim())
            .filter(|code| is_valid_score_code(code))
            .map(str::to_string)
            .collect();
        let count = codes.len();
        prefs.batch_pool_filter = Some(PoolFilter::from(&self.filter));
        prefs.batch_pool_codes = Some(codes);
        count
    }
}
