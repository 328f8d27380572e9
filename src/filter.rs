use crate::errors::{ClientError, Result};
use crate::extract::extract_score_codes;
use crate::models::{BatchQueryRequest, ScoreRecord};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FavoriteFilter {
    #[default]
    All,
    FavoritesOnly,
    NonFavoritesOnly,
}

impl FavoriteFilter {
    /// Integer used on the wire: 0 all, 1 favorites, 2 non-favorites.
    pub fn code(self) -> u8 {
        match self {
            Self::All => 0,
            Self::FavoritesOnly => 1,
            Self::NonFavoritesOnly => 2,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::All),
            1 => Some(Self::FavoritesOnly),
            2 => Some(Self::NonFavoritesOnly),
            _ => None,
        }
    }

    pub fn next(self) -> Self {
        match self {
            Self::All => Self::FavoritesOnly,
            Self::FavoritesOnly => Self::NonFavoritesOnly,
            Self::NonFavoritesOnly => Self::All,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::All => "All",
            Self::FavoritesOnly => "Favorites only",
            Self::NonFavoritesOnly => "Non-favorites only",
        }
    }

    pub fn matches(self, is_favorite: bool) -> bool {
        match self {
            Self::All => true,
            Self::FavoritesOnly => is_favorite,
            Self::NonFavoritesOnly => !is_favorite,
        }
    }
}

/// Filters that travel to the server.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FilterState {
    pub min_completion: Option<u8>,
    pub max_completion: Option<u8>,
    pub favorite: FavoriteFilter,
}

impl FilterState {
    /// Mirrors the server's range/favorite predicate so pushed patches can
    /// evict rows that stopped qualifying. Unplayed records only satisfy an
    /// unbounded range.
    pub fn matches(&self, record: &ScoreRecord) -> bool {
        if !self.favorite.matches(record.is_favorite) {
            return false;
        }
        if self.min_completion.is_none() && self.max_completion.is_none() {
            return true;
        }
        let Some(completion) = record.completion else {
            return false;
        };
        self.min_completion.is_none_or(|min| completion >= min)
            && self.max_completion.is_none_or(|max| completion <= max)
    }

    pub fn list_query(&self) -> ListQuery {
        ListQuery {
            min_completion: self.min_completion,
            max_completion: self.max_completion,
            favorite: self.favorite,
        }
    }
}

/// Validates raw completion bound inputs; blank means unbounded.
pub fn parse_completion_bounds(min_raw: &str, max_raw: &str) -> Result<(Option<u8>, Option<u8>)> {
    let min = parse_bound(min_raw, "Enter a minimum completion between 0 and 100")?;
    let max = parse_bound(max_raw, "Enter a maximum completion between 0 and 100")?;
    if let (Some(min), Some(max)) = (min, max) {
        if min > max {
            return Err(ClientError::validation(
                "Minimum completion cannot exceed maximum completion",
            ));
        }
    }
    Ok((min, max))
}

fn parse_bound(raw: &str, message: &str) -> Result<Option<u8>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    match raw.parse::<i64>() {
        Ok(value) if (0..=100).contains(&value) => Ok(Some(value as u8)),
        _ => Err(ClientError::validation(message)),
    }
}

/// Query parameters of `GET /api/scores`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListQuery {
    pub min_completion: Option<u8>,
    pub max_completion: Option<u8>,
    pub favorite: FavoriteFilter,
}

impl ListQuery {
    pub fn params(&self) -> Vec<(&'static str, String)> {
        let mut params = Vec::new();
        if let Some(min) = self.min_completion {
            params.push(("min_completion", min.to_string()));
        }
        if let Some(max) = self.max_completion {
            params.push(("max_completion", max.to_string()));
        }
        if self.favorite != FavoriteFilter::All {
            params.push(("favorite", self.favorite.code().to_string()));
        }
        params
    }
}

/// Raw text typed or pasted into the batch page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryInputs {
    pub include_codes: String,
    pub exclude_codes: String,
    pub include_remark: String,
    pub exclude_remark: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryPlan {
    Listing(ListQuery),
    Batch(BatchQueryRequest),
}

/// Chooses between the plain listing and the targeted batch lookup.
///
/// Batch-only filters are meaningless without codes or remark text, so the
/// listing is used whenever all of them are empty.
pub fn plan_query(inputs: &QueryInputs, filter: &FilterState) -> QueryPlan {
    let score_codes = extract_score_codes(inputs.include_codes.trim());
    let exclude_codes = extract_score_codes(inputs.exclude_codes.trim());
    let include_remark = inputs.include_remark.trim().to_string();
    let exclude_remark = inputs.exclude_remark.trim().to_string();

    if score_codes.is_empty()
        && exclude_codes.is_empty()
        && include_remark.is_empty()
        && exclude_remark.is_empty()
    {
        return QueryPlan::Listing(filter.list_query());
    }

    QueryPlan::Batch(BatchQueryRequest {
        score_codes,
        exclude_codes,
        min_completion: filter.min_completion,
        max_completion: filter.max_completion,
        favorite: filter.favorite.code(),
        include_remark,
        exclude_remark,
    })
}

/// Pure view concerns of the results table; never sent to the server.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ViewOptions {
    pub incomplete_only: bool,
    pub hide_completion: bool,
    pub hide_favorite: bool,
    pub show_all_remarks: bool,
}

impl ViewOptions {
    pub fn keeps(&self, record: &ScoreRecord) -> bool {
        !self.incomplete_only || record.completion.is_none()
    }

    pub fn apply<'a>(&self, records: &'a [ScoreRecord]) -> Vec<&'a ScoreRecord> {
        records.iter().filter(|record| self.keeps(record)).collect()
    }

    /// Number of `<td>` cells each result row emits.
    pub fn column_count(&self) -> usize {
        1 + usize::from(!self.hide_completion) + usize::from(!self.hide_favorite)
    }
}

/// Filter handed to the random-pool page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_completion: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_completion: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub favorite: Option<u8>,
}

impl From<&FilterState> for PoolFilter {
    fn from(filter: &FilterState) -> Self {
        Self {
            min_completion: filter.min_completion,
            max_completion: filter.max_completion,
            favorite: (filter.favorite != FavoriteFilter::All).then(|| filter.favorite.code()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(code: &str, completion: Option<u8>, favorite: bool) -> ScoreRecord {
        ScoreRecord {
            completion,
            is_favorite: favorite,
            ..ScoreRecord::new(code)
        }
    }

    #[test]
    fn empty_inputs_use_plain_listing() {
        let filter = FilterState {
            min_completion: Some(10),
            ..FilterState::default()
        };
        let plan = plan_query(&QueryInputs::default(), &filter);
        assert_eq!(plan, QueryPlan::Listing(filter.list_query()));
    }

    #[test]
    fn text_without_codes_still_lists() {
        let inputs = QueryInputs {
            include_codes: "no codes, just 123".to_string(),
            ..QueryInputs::default()
        };
        assert!(matches!(
            plan_query(&inputs, &FilterState::default()),
            QueryPlan::Listing(_)
        ));
    }

    #[test]
    fn remark_text_alone_selects_batch_with_all_filters() {
        let inputs = QueryInputs {
            include_remark: "  boss  ".to_string(),
            ..QueryInputs::default()
        };
        let filter = FilterState {
            min_completion: Some(20),
            max_completion: Some(80),
            favorite: FavoriteFilter::NonFavoritesOnly,
        };
        let QueryPlan::Batch(request) = plan_query(&inputs, &filter) else {
            panic!("expected batch plan");
        };
        assert!(request.score_codes.is_empty());
        assert_eq!(request.include_remark, "boss");
        assert_eq!(request.min_completion, Some(20));
        assert_eq!(request.max_completion, Some(80));
        assert_eq!(request.favorite, 2);
    }

    #[test]
    fn listing_params_skip_defaults() {
        assert!(ListQuery::default().params().is_empty());
        let query = ListQuery {
            min_completion: Some(0),
            max_completion: None,
            favorite: FavoriteFilter::FavoritesOnly,
        };
        assert_eq!(
            query.params(),
            vec![
                ("min_completion", "0".to_string()),
                ("favorite", "1".to_string())
            ]
        );
    }

    #[test]
    fn bounds_validation() {
        assert_eq!(parse_completion_bounds("", " ").unwrap(), (None, None));
        assert_eq!(parse_completion_bounds("10", "90").unwrap(), (Some(10), Some(90)));
        assert!(parse_completion_bounds("101", "").unwrap_err().is_validation());
        assert!(parse_completion_bounds("x", "").is_err());
        assert!(parse_completion_bounds("60", "50").is_err());
    }

    #[test]
    fn favorite_filter_cycles_through_three_states() {
        let start = FavoriteFilter::All;
        assert_eq!(start.next(), FavoriteFilter::FavoritesOnly);
        assert_eq!(start.next().next(), FavoriteFilter::NonFavoritesOnly);
        assert_eq!(start.next().next().next(), FavoriteFilter::All);
    }

    #[test]
    fn incomplete_only_is_a_pure_view_filter() {
        let records = vec![
            record("11111", Some(40), false),
            record("22222", None, false),
            record("33333", Some(0), true),
        ];
        let view = ViewOptions {
            incomplete_only: true,
            ..ViewOptions::default()
        };
        let kept: Vec<_> = view.apply(&records).iter().map(|r| r.score_code.as_str()).collect();
        assert_eq!(kept, vec!["22222"]);
        assert_eq!(ViewOptions::default().apply(&records).len(), 3);
    }

    #[test]
    fn column_count_tracks_hidden_columns() {
        let mut view = ViewOptions::default();
        assert_eq!(view.column_count(), 3);
        view.hide_completion = true;
        assert_eq!(view.column_count(), 2);
        view.hide_favorite = true;
        assert_eq!(view.column_count(), 1);
    }

    #[test]
    fn filter_state_matches_range_and_favorite() {
        let filter = FilterState {
            min_completion: Some(50),
            max_completion: None,
            favorite: FavoriteFilter::FavoritesOnly,
        };
        assert!(filter.matches(&record("11111", Some(60), true)));
        assert!(!filter.matches(&record("11111", Some(60), false)));
        assert!(!filter.matches(&record("11111", Some(40), true)));
        assert!(!filter.matches(&record("11111", None, true)));
        assert!(FilterState::default().matches(&record("11111", None, false)));
    }

    #[test]
    fn pool_filter_omits_unset_fields() {
        let filter = FilterState {
            min_completion: Some(5),
            ..FilterState::default()
        };
        let json = serde_json::to_string(&PoolFilter::from(&filter)).unwrap();
        assert_eq!(json, r#"{"min_completion":5}"#);
    }
}
