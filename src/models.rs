use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

use crate::dataset::EvaluationRecord;

/// Attributes scored by the reward model, in payload order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RewardAttribute {
    Helpfulness,
    Correctness,
    Coherence,
    Complexity,
    Verbosity,
}

impl RewardAttribute {
    pub const ALL: [RewardAttribute; 5] = [
        RewardAttribute::Helpfulness,
        RewardAttribute::Correctness,
        RewardAttribute::Coherence,
        RewardAttribute::Complexity,
        RewardAttribute::Verbosity,
    ];

    pub fn name(self) -> &'static str {
        match self {
            RewardAttribute::Helpfulness => "Helpfulness",
            RewardAttribute::Correctness => "Correctness",
            RewardAttribute::Coherence => "Coherence",
            RewardAttribute::Complexity => "Complexity",
            RewardAttribute::Verbosity => "Verbosity",
        }
    }

    /// Case-insensitive lookup of a payload key
    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|attribute| attribute.name().eq_ignore_ascii_case(key))
    }

    pub(crate) fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for RewardAttribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One score per attribute; there is no way to build a partial set
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RewardScoreSet {
    values: [f64; 5],
}

impl RewardScoreSet {
    /// Values in `RewardAttribute::ALL` order
    pub fn new(values: [f64; 5]) -> Self {
        Self { values }
    }

    pub fn get(&self, attribute: RewardAttribute) -> f64 {
        self.values[attribute.index()]
    }

    pub fn iter(&self) -> impl Iterator<Item = (RewardAttribute, f64)> + '_ {
        RewardAttribute::ALL
            .into_iter()
            .map(|attribute| (attribute, self.get(attribute)))
    }
}

impl Serialize for RewardScoreSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.values.len()))?;
        for (attribute, value) in self.iter() {
            map.serialize_entry(attribute.name(), &value)?;
        }
        map.end()
    }
}

/// A dataset row with its reward scores attached
#[derive(Debug, Clone, Serialize)]
pub struct ScoredRecord {
    pub record: EvaluationRecord,
    /// `None` when the request or the parse failed
    pub scores: Option<RewardScoreSet>,
    /// Why the scores are absent
    pub error: Option<String>,
}

/// Per-attribute aggregates across a batch
#[derive(Debug, Clone, Default, Serialize)]
pub struct AggregateReport {
    /// Mean of the non-absent scores; `None` when every record failed
    pub mean: BTreeMap<RewardAttribute, Option<f64>>,
    /// Number of scores contributing to each mean
    pub count: BTreeMap<RewardAttribute, usize>,
    /// Records without scores
    pub failed: usize,
}

/// Final results containing statistics and individual results
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub statistics: AggregateReport,
    /// Same length and order as the input records
    pub results: Vec<ScoredRecord>,
}
