//! Proposal data model.
//!
//! A proposal describes one commission-split configuration for an insurance
//! group over a date interval. Source proposals are read once and never
//! mutated; retained proposals are the widened survivors of a consolidation run.

use std::collections::BTreeSet;
use std::fmt::{Display, Formatter};

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use tracing::debug;

/// Reserved token meaning "matches every code".
pub const WILDCARD: &str = "*";

/// Opaque source record identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProposalId(pub String);

impl ProposalId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ProposalId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ProposalId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for ProposalId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Identifier of the insurance group a proposal belongs to.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupId(pub String);

impl GroupId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for GroupId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for GroupId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for GroupId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Inclusive date interval; `to == None` means no upper bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub from: NaiveDate,
    #[serde(default)]
    pub to: Option<NaiveDate>,
}

impl DateRange {
    pub fn new(from: NaiveDate, to: Option<NaiveDate>) -> Self {
        Self { from, to }
    }

    /// Interval starting at `from` with no upper bound.
    pub fn open(from: NaiveDate) -> Self {
        Self { from, to: None }
    }

    pub fn is_open(&self) -> bool {
        self.to.is_none()
    }

    /// Widen in place to cover `other` as well.
    ///
    /// The result is always one continuous interval: two disjoint ranges
    /// produce a range spanning the gap between them.
    pub fn widen(&mut self, other: &DateRange) {
        self.from = self.from.min(other.from);
        self.to = match (self.to, other.to) {
            (Some(mine), Some(theirs)) => Some(mine.max(theirs)),
            _ => None,
        };
    }

    /// Whether `other` lies entirely within this range.
    pub fn covers(&self, other: &DateRange) -> bool {
        if other.from < self.from {
            return false;
        }
        match (self.to, other.to) {
            (None, _) => true,
            (Some(_), None) => false,
            (Some(mine), Some(theirs)) => theirs <= mine,
        }
    }
}

impl Display for DateRange {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.to {
            Some(to) => write!(f, "[{}, {}]", self.from, to),
            None => write!(f, "[{}, open)", self.from),
        }
    }
}

/// A set of product or plan codes, or the match-all wildcard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodeSet {
    MatchAll,
    Codes(BTreeSet<String>),
}

impl Default for CodeSet {
    fn default() -> Self {
        Self::Codes(BTreeSet::new())
    }
}

impl CodeSet {
    /// Decode a stored code column.
    ///
    /// Accepts the wildcard token or a JSON array of strings. Blank text is the
    /// empty set. Anything else is kept, trimmed, as a single code rather than
    /// rejected.
    pub fn decode(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed == WILDCARD {
            return Self::MatchAll;
        }
        if trimmed.is_empty() {
            return Self::default();
        }
        match serde_json::from_str::<Vec<String>>(trimmed) {
            Ok(codes) => Self::from_codes(codes),
            Err(err) => {
                debug!(raw, %err, "code list is not an encoded list, keeping raw text");
                Self::Codes(BTreeSet::from([trimmed.to_string()]))
            }
        }
    }

    /// Build a set from individual codes. A wildcard token among them makes
    /// the whole set match-all.
    pub fn from_codes<I, S>(codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut set = BTreeSet::new();
        for code in codes {
            let code = code.into();
            if code.trim() == WILDCARD {
                return Self::MatchAll;
            }
            set.insert(code);
        }
        Self::Codes(set)
    }

    pub fn is_match_all(&self) -> bool {
        matches!(self, Self::MatchAll)
    }

    /// Number of explicit codes; `None` for the wildcard.
    pub fn len(&self) -> Option<usize> {
        match self {
            Self::MatchAll => None,
            Self::Codes(codes) => Some(codes.len()),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Codes(codes) if codes.is_empty())
    }

    /// Union `other` into this set. The wildcard absorbs everything.
    pub fn union_with(&mut self, other: &CodeSet) {
        match other {
            Self::MatchAll => *self = Self::MatchAll,
            Self::Codes(theirs) => {
                if let Self::Codes(mine) = self {
                    mine.extend(theirs.iter().cloned());
                }
            }
        }
    }

    /// Canonical stored form: the wildcard token or a JSON array.
    pub fn encode(&self) -> String {
        match self {
            Self::MatchAll => WILDCARD.to_string(),
            Self::Codes(codes) => {
                serde_json::to_string(codes).unwrap_or_else(|_| "[]".to_string())
            }
        }
    }
}

impl Display for CodeSet {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MatchAll => f.write_str(WILDCARD),
            Self::Codes(codes) => {
                let joined: Vec<&str> = codes.iter().map(String::as_str).collect();
                write!(f, "{{{}}}", joined.join(", "))
            }
        }
    }
}

impl Serialize for CodeSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::MatchAll => serializer.serialize_str(WILDCARD),
            Self::Codes(codes) => codes.serialize(serializer),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StoredCodes {
    Encoded(String),
    List(Vec<String>),
}

impl<'de> Deserialize<'de> for CodeSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match Option::<StoredCodes>::deserialize(deserializer)? {
            None => Self::default(),
            Some(StoredCodes::Encoded(raw)) => Self::decode(&raw),
            Some(StoredCodes::List(codes)) => Self::from_codes(codes),
        })
    }
}

/// One proposed commission-split configuration, as read from the snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceProposal {
    pub id: ProposalId,
    pub group_id: GroupId,
    /// Content hash of the full split configuration. Equal fingerprints mean
    /// the same configuration.
    #[serde(default)]
    pub split_config_fingerprint: Option<String>,
    pub date_range: DateRange,
    pub effective_date_range: DateRange,
    #[serde(default)]
    pub product_codes: CodeSet,
    #[serde(default)]
    pub plan_codes: CodeSet,
    /// Descriptive columns carried through untouched (broker, notes, ...).
    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

impl SourceProposal {
    /// A proposal whose effective range equals its date range and whose code
    /// sets are empty.
    pub fn new(
        id: impl Into<ProposalId>,
        group_id: impl Into<GroupId>,
        fingerprint: Option<&str>,
        date_range: DateRange,
    ) -> Self {
        Self {
            id: id.into(),
            group_id: group_id.into(),
            split_config_fingerprint: fingerprint.map(str::to_string),
            date_range,
            effective_date_range: date_range,
            product_codes: CodeSet::default(),
            plan_codes: CodeSet::default(),
            attributes: Map::new(),
        }
    }

    pub fn with_effective_range(mut self, range: DateRange) -> Self {
        self.effective_date_range = range;
        self
    }

    pub fn with_product_codes(mut self, codes: CodeSet) -> Self {
        self.product_codes = codes;
        self
    }

    pub fn with_plan_codes(mut self, codes: CodeSet) -> Self {
        self.plan_codes = codes;
        self
    }

    pub fn with_attribute(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.to_string(), value.into());
        self
    }

    pub fn fingerprint(&self) -> &str {
        self.split_config_fingerprint.as_deref().unwrap_or("")
    }
}

/// Survivor of a consolidation run: the seeding proposal with both ranges
/// widened and both code sets unioned over everything it absorbed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetainedProposal {
    pub proposal: SourceProposal,
}

impl RetainedProposal {
    pub fn id(&self) -> &ProposalId {
        &self.proposal.id
    }

    pub fn into_source(self) -> SourceProposal {
        self.proposal
    }
}

#[cfg(test)]
pub(crate) fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid test date")
}
