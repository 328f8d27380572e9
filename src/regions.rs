//! Optional parts of a page.
//!
//! A page declares which regions it has when it is built. Features that need a
//! missing region are reported as unavailable up front instead of every
//! handler guarding its own lookups.

use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Region {
    ReviewModal,
    RemarkModal,
    StatsPanel,
    HistoryList,
    RandomCard,
    JianshangButton,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feature {
    Reviews,
    Remarks,
    Stats,
    History,
    RandomPick,
    Jianshang,
}

impl Feature {
    fn requires(self) -> &'static [Region] {
        match self {
            Self::Reviews => &[Region::ReviewModal],
            Self::Remarks => &[Region::RemarkModal],
            Self::Stats => &[Region::StatsPanel],
            Self::History => &[Region::HistoryList],
            Self::RandomPick => &[Region::RandomCard],
            Self::Jianshang => &[Region::JianshangButton],
        }
    }

    pub fn unavailable_message(self) -> &'static str {
        match self {
            Self::Reviews => "Review dialog unavailable",
            Self::Remarks => "Remark dialog unavailable",
            Self::Stats => "Stats panel unavailable",
            Self::History => "History list unavailable",
            Self::RandomPick => "Random pick unavailable",
            Self::Jianshang => "Jianshang fetch unavailable",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionSet {
    present: BTreeSet<Region>,
}

impl RegionSet {
    pub fn all() -> Self {
        Self::from_iter([
            Region::ReviewModal,
            Region::RemarkModal,
            Region::StatsPanel,
            Region::HistoryList,
            Region::RandomCard,
            Region::JianshangButton,
        ])
    }

    pub fn none() -> Self {
        Self {
            present: BTreeSet::new(),
        }
    }

    pub fn without(mut self, region: Region) -> Self {
        self.present.remove(&region);
        self
    }

    pub fn has(&self, region: Region) -> bool {
        self.present.contains(&region)
    }

    pub fn supports(&self, feature: Feature) -> bool {
        feature.requires().iter().all(|region| self.has(*region))
    }
}

impl Default for RegionSet {
    fn default() -> Self {
        Self::all()
    }
}

impl FromIterator<Region> for RegionSet {
    fn from_iter<I: IntoIterator<Item = Region>>(iter: I) -> Self {
        Self {
            present: iter.into_iter().collect(),
        }
    }
}
