use crate::api::ScoreApi;
use crate::errors::{ClientError, Result};
use crate::models::{BatchRemarkResponse, RemarkUpdate, ScoreRecord};
use crate::toast::Toasts;
use std::collections::HashSet;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemarkTarget {
    Single(String),
    Batch(Vec<String>),
}

/// How a host should fold a saved remark back into its caches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemarkSaved {
    Single {
        score_code: String,
        remark: String,
    },
    Batch {
        codes: Vec<String>,
        response: BatchRemarkResponse,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reconcile {
    /// Explicit per-code results from the server.
    Updates(Vec<RemarkUpdate>),
    /// One remark for the batch; applied only where the local remark is blank.
    Fill { codes: Vec<String>, remark: String },
    /// Nothing precise came back; re-fetch to converge.
    Refetch,
}

impl RemarkSaved {
    pub fn reconcile(&self) -> Reconcile {
        match self {
            Self::Single { score_code, remark } => Reconcile::Updates(vec![RemarkUpdate {
                score_code: score_code.clone(),
                remark: remark.clone(),
            }]),
            Self::Batch { codes, response } => match (&response.updates, &response.remark) {
                (Some(updates), _) if !updates.is_empty() => Reconcile::Updates(updates.clone()),
                (_, Some(remark)) => Reconcile::Fill {
                    codes: codes.clone(),
                    remark: remark.clone(),
                },
                (Some(_), None) => Reconcile::Updates(Vec::new()),
                (None, None) => Reconcile::Refetch,
            },
        }
    }
}

/// Applies a reconcile plan to a record cache; returns whether anything changed.
pub fn apply_reconcile(records: &mut [ScoreRecord], plan: &Reconcile) -> bool {
    let mut changed = false;
    match plan {
        Reconcile::Updates(updates) => {
            for update in updates {
                for record in records.iter_mut().filter(|r| r.score_code == update.score_code) {
                    if record.remark != update.remark {
                        record.remark = update.remark.clone();
                        changed = true;
                    }
                }
            }
        }
        Reconcile::Fill { codes, remark } => {
            let codes: HashSet<&str> = codes.iter().map(String::as_str).collect();
            for record in records.iter_mut() {
                if codes.contains(record.score_code.as_str())
                    && !record.has_remark()
                    && record.remark != *remark
                {
                    record.remark = remark.clone();
                    changed = true;
                }
            }
        }
        Reconcile::Refetch => {}
    }
    changed
}

/// Prefill for a batch: the shared remark when every selected record carries
/// the same non-empty one, blank otherwise.
pub fn shared_remark<'a>(records: impl IntoIterator<Item = &'a ScoreRecord>) -> String {
    let mut shared: Option<&str> = None;
    for record in records {
        let remark = record.remark.trim();
        if remark.is_empty() {
            return String::new();
        }
        match shared {
            None => shared = Some(remark),
            Some(existing) if existing == remark => {}
            Some(_) => return String::new(),
        }
    }
    shared.unwrap_or_default().to_string()
}

#[derive(Debug, Default)]
pub struct RemarkModal {
    target: Option<RemarkTarget>,
    pub text: String,
    message: String,
    saving: bool,
    pub toasts: Toasts,
}

impl RemarkModal {
    pub fn is_open(&self) -> bool {
        self.target.is_some()
    }

    pub fn target(&self) -> Option<&RemarkTarget> {
        self.target.as_ref()
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn is_saving(&self) -> bool {
        self.saving
    }

    pub fn summary(&self) -> Option<String> {
        match self.target.as_ref()? {
            RemarkTarget::Single(code) => Some(format!("Current score: {code}")),
            RemarkTarget::Batch(codes) => Some(format!(
                "Adds a remark to {} scores from the current results. Existing remarks are not overwritten.",
                codes.len()
            )),
        }
    }

    /// Opens for one code; the stored remark replaces `initial` once loaded.
    pub async fn open_single<A: ScoreApi + ?Sized>(
        &mut self,
        api: &A,
        score_code: &str,
        initial: &str,
    ) {
        self.target = Some(RemarkTarget::Single(score_code.to_string()));
        self.text = initial.to_string();
        self.message.clear();
        self.saving = false;

        match api.remark(score_code).await {
            Ok(remark) => self.text = remark,
            Err(err) => warn!("loading remark for {score_code} failed: {err}"),
        }
    }

    pub fn open_batch<'a>(&mut self, records: impl IntoIterator<Item = &'a ScoreRecord> + Clone) {
        let mut seen = HashSet::new();
        let codes: Vec<String> = records
            .clone()
            .into_iter()
            .filter(|r| seen.insert(r.score_code.clone()))
            .map(|r| r.score_code.clone())
            .collect();
        self.text = shared_remark(records);
        self.target = Some(RemarkTarget::Batch(codes));
        self.message.clear();
        self.saving = false;
    }

    pub fn close(&mut self) {
        self.target = None;
        self.message.clear();
        self.saving = false;
    }

    /// Saves through the single or batch endpoint. Failures keep the dialog
    /// open with the text intact.
    pub async fn save<A: ScoreApi + ?Sized>(&mut self, api: &A) -> Result<Option<RemarkSaved>> {
        let Some(target) = self.target.clone() else {
            return Ok(None);
        };
        if self.saving {
            return Ok(None);
        }
        let remark = self.text.trim().to_string();
        self.message.clear();

        let outcome = match target {
            RemarkTarget::Batch(codes) if codes.is_empty() => {
                self.message = "No scores to update".to_string();
                return Err(ClientError::validation("No scores to update"));
            }
            RemarkTarget::Batch(codes) => {
                self.saving = true;
                let result = api.batch_remark(&codes, &remark).await;
                self.saving = false;
                result.map(|response| {
                    self.toasts.push(format!(
                        "Batch remark saved: {} updated, {} kept",
                        response.updated(),
                        response.unchanged()
                    ));
                    RemarkSaved::Batch { codes, response }
                })
            }
            RemarkTarget::Single(score_code) => {
                self.saving = true;
                let result = api.set_remark(&score_code, &remark).await;
                self.saving = false;
                result.map(|remark| {
                    self.toasts.push("Remark updated");
                    RemarkSaved::Single { score_code, remark }
                })
            }
        };

        match outcome {
            Ok(saved) => {
                self.close();
                Ok(Some(saved))
            }
            Err(err) => {
                warn!("saving remark failed: {err}");
                self.message = match &err {
                    ClientError::Server(message) => message.clone(),
                    _ => "Save failed, please retry".to_string(),
                };
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(code: &str, remark: &str) -> ScoreRecord {
        ScoreRecord {
            remark: remark.to_string(),
            ..ScoreRecord::new(code)
        }
    }

    #[test]
    fn shared_remark_requires_unanimous_non_empty() {
        let same = [record("11111", "boss"), record("22222", " boss ")];
        assert_eq!(shared_remark(&same), "boss");
        let mixed = [record("11111", "boss"), record("22222", "")];
        assert_eq!(shared_remark(&mixed), "");
        let differ = [record("11111", "a"), record("22222", "b")];
        assert_eq!(shared_remark(&differ), "");
        assert_eq!(shared_remark(Vec::<ScoreRecord>::new().iter()), "");
    }

    #[test]
    fn fill_never_overwrites_populated_remarks() {
        let mut records = vec![record("11111", "x"), record("22222", "")];
        let plan = Reconcile::Fill {
            codes: vec!["11111".to_string(), "22222".to_string()],
            remark: "y".to_string(),
        };
        assert!(apply_reconcile(&mut records, &plan));
        assert_eq!(records[0].remark, "x");
        assert_eq!(records[1].remark, "y");
        assert!(!apply_reconcile(&mut records, &plan));
    }

    #[test]
    fn explicit_updates_are_preferred() {
        let saved = RemarkSaved::Batch {
            codes: vec!["11111".to_string(), "22222".to_string()],
            response: BatchRemarkResponse {
                success: true,
                updates: Some(vec![RemarkUpdate {
                    score_code: "22222".to_string(),
                    remark: "y".to_string(),
                }]),
                remark: Some("y".to_string()),
                ..BatchRemarkResponse::default()
            },
        };
        assert!(matches!(saved.reconcile(), Reconcile::Updates(ref u) if u.len() == 1));
    }

    #[test]
    fn count_only_response_requires_refetch() {
        let saved = RemarkSaved::Batch {
            codes: vec!["11111".to_string()],
            response: BatchRemarkResponse {
                success: true,
                updated_count: Some(1),
                ..BatchRemarkResponse::default()
            },
        };
        assert_eq!(saved.reconcile(), Reconcile::Refetch);
    }

    #[test]
    fn open_batch_dedupes_codes() {
        let records = [record("11111", "a"), record("11111", "a"), record("22222", "a")];
        let mut modal = RemarkModal::default();
        modal.open_batch(&records);
        assert_eq!(
            modal.target(),
            Some(&RemarkTarget::Batch(vec!["11111".to_string(), "22222".to_string()]))
        );
        assert_eq!(modal.text, "a");
    }
}
