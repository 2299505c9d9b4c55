// ********* Input data structures ***********

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Display;

use snafu::Snafu;

/// A raw response code as it appears in the survey extract.
///
/// Codes are usually 1 to 5 on a Likert scale, plus sentinel values
/// (for example 9) for skipped or not-applicable answers.
pub type ResponseCode = i64;

/// The identifier of a survey item, for example `Q12`.
///
/// Items follow the `Q` + integer naming convention of the survey extracts and are
/// ordered naturally: `Q2` comes before `Q10`. Identifiers that do not end with a number
/// are compared as plain strings.
#[derive(Eq, PartialEq, Debug, Clone, Hash)]
pub struct ItemId(String);

impl ItemId {
    pub fn new(id: impl Into<String>) -> ItemId {
        ItemId(id.into())
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    // The prefix and the trailing number, if any.
    fn split_numeric(&self) -> (&str, Option<u64>) {
        let prefix = self.0.trim_end_matches(|c: char| c.is_ascii_digit());
        let suffix = &self.0[prefix.len()..];
        (prefix, suffix.parse::<u64>().ok())
    }
}

impl Ord for ItemId {
    fn cmp(&self, other: &Self) -> Ordering {
        let (p1, n1) = self.split_numeric();
        let (p2, n2) = other.split_numeric();
        p1.cmp(p2)
            .then_with(|| n1.cmp(&n2))
            .then_with(|| self.0.cmp(&other.0))
    }
}

impl PartialOrd for ItemId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Display for ItemId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.0.as_str())
    }
}

impl From<&str> for ItemId {
    fn from(s: &str) -> ItemId {
        ItemId(s.to_string())
    }
}

impl From<String> for ItemId {
    fn from(s: String) -> ItemId {
        ItemId(s)
    }
}

/// The category of a single response, once normalized against the scale of its item.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Ord, PartialOrd)]
pub enum Category {
    Positive,
    Neutral,
    Negative,
    /// Skipped, not applicable, absent or outside of the valid range of the scale.
    Missing,
}

/// Per-item metadata describing which raw codes count as positive, neutral, negative
/// or missing.
///
/// Invariant: the positive, neutral and negative sets partition the valid code range
/// exactly, and the missing codes lie outside of that range. Scales are checked when
/// they are constructed (see `ItemScale::new`) and never change afterwards.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct ItemScale {
    pub(crate) name: String,
    pub(crate) min_code: ResponseCode,
    pub(crate) max_code: ResponseCode,
    pub(crate) positive: BTreeSet<ResponseCode>,
    pub(crate) neutral: BTreeSet<ResponseCode>,
    pub(crate) negative: BTreeSet<ResponseCode>,
    pub(crate) missing: BTreeSet<ResponseCode>,
}

/// The scales of all the items of interest, keyed by item.
pub type ScaleMap = BTreeMap<ItemId, ItemScale>;

/// The row of one respondent.
///
/// Immutable once loaded. Records are built through `builder::DatasetBuilder`, which
/// guarantees that every declared item and attribute has a value (possibly missing).
#[derive(PartialEq, Debug, Clone)]
pub struct RawRecord {
    pub id: String,
    /// The survey weight of this respondent. It is only used for weighted aggregation.
    pub weight: f64,
    pub(crate) responses: BTreeMap<ItemId, Option<ResponseCode>>,
    pub(crate) attributes: BTreeMap<String, Option<String>>,
}

impl RawRecord {
    /// The raw code for this item, or None if the respondent left it empty.
    pub fn response(&self, item: &ItemId) -> Result<Option<ResponseCode>, MetricsError> {
        match self.responses.get(item) {
            Some(code) => Ok(*code),
            None => SchemaSnafu {
                name: item.to_string(),
                kind: SchemaKind::Item,
            }
            .fail(),
        }
    }

    /// The categorical value of an attribute (organization size, supervisory status, ...).
    pub fn attribute(&self, name: &str) -> Result<Option<&str>, MetricsError> {
        match self.attributes.get(name) {
            Some(v) => Ok(v.as_deref()),
            None => SchemaSnafu {
                name,
                kind: SchemaKind::Attribute,
            }
            .fail(),
        }
    }
}

/// An ordered sequence of records sharing the same item and attribute schema.
#[derive(PartialEq, Debug, Clone)]
pub struct Dataset {
    pub(crate) items: Vec<ItemId>,
    pub(crate) attributes: Vec<String>,
    pub(crate) records: Vec<RawRecord>,
}

impl Dataset {
    pub fn items(&self) -> &[ItemId] {
        &self.items
    }

    pub fn attributes(&self) -> &[String] {
        &self.attributes
    }

    pub fn records(&self) -> &[RawRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn require_item(&self, item: &ItemId) -> Result<(), MetricsError> {
        if self.items.contains(item) {
            Ok(())
        } else {
            SchemaSnafu {
                name: item.to_string(),
                kind: SchemaKind::Item,
            }
            .fail()
        }
    }

    pub fn require_attribute(&self, name: &str) -> Result<(), MetricsError> {
        if self.attributes.iter().any(|a| a == name) {
            Ok(())
        } else {
            SchemaSnafu {
                name,
                kind: SchemaKind::Attribute,
            }
            .fail()
        }
    }
}

// ******** Output data structures *********

/// A partition of the records, derived from one attribute column.
///
/// `Overall` is the implicit group of all the records and sorts before any named group.
#[derive(Eq, PartialEq, Debug, Clone, Hash, Ord, PartialOrd)]
pub enum GroupKey {
    Overall,
    Group(String),
}

impl Display for GroupKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GroupKey::Overall => write!(f, "overall"),
            GroupKey::Group(s) => write!(f, "{}", s),
        }
    }
}

/// The metrics of one item within one group.
#[derive(PartialEq, Debug, Clone)]
pub struct ItemMetric {
    pub item: ItemId,
    pub group: GroupKey,
    /// Always in [0, 1].
    pub positive_rate: f64,
    pub neutral_rate: f64,
    pub negative_rate: f64,
    /// The mean of the raw codes, over the non-missing responses.
    pub mean_score: f64,
    /// The number of non-missing responses (never weighted, never zero).
    pub response_count: u64,
}

pub type MetricMap = BTreeMap<(ItemId, GroupKey), ItemMetric>;

/// The result of one aggregation call.
#[derive(PartialEq, Debug, Clone)]
pub struct Aggregation {
    /// The grouping attribute, or None for the overall aggregation.
    pub attribute: Option<String>,
    pub metrics: MetricMap,
    /// The number of (item, group) pairs omitted because they had no non-missing response.
    pub omitted_pairs: u64,
    /// The number of codes that fell outside of the scale of their item.
    pub out_of_range_codes: u64,
    /// The number of records without a usable value for the grouping attribute.
    pub excluded_records: u64,
    /// The number of respondents in each group.
    pub group_sizes: BTreeMap<GroupKey, u64>,
}

/// Where a positive rate stands relative to the baseline and the target.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash)]
pub enum Standing {
    BelowBaseline,
    /// At or above the baseline, but below the target (if any).
    MeetsBaseline,
    MeetsTarget,
}

/// The final output unit: a metric with its rank and its comparison against the baseline.
#[derive(PartialEq, Debug, Clone)]
pub struct SummaryRow {
    pub metric: ItemMetric,
    /// 1-based position in the ranking.
    pub rank: u32,
    /// positive rate - baseline, as a signed fraction. Multiply by 100 for percentage points.
    pub delta: f64,
    /// True iff the positive rate is strictly below the baseline.
    pub below_baseline: bool,
    pub standing: Standing,
}

impl SummaryRow {
    pub fn delta_points(&self) -> f64 {
        self.delta * 100.0
    }
}

/// The average of the positive rates of all the items of the survey.
#[derive(PartialEq, Debug, Clone)]
pub struct EngagementIndex {
    pub mean_positive_rate: f64,
    pub delta: f64,
    pub below_baseline: bool,
    pub num_items: usize,
    pub highest: ItemId,
    /// The lowest-ranked items, lowest first.
    pub priority_items: Vec<ItemId>,
}

/// The average engagement of one group across the items reported for it.
#[derive(PartialEq, Debug, Clone)]
pub struct GroupEngagement {
    pub group: GroupKey,
    pub avg_positive_rate: f64,
    pub respondents: u64,
    pub items_reported: usize,
}

/// The share of respondents for whom a binary indicator holds
/// (for example, considering leaving the organization).
#[derive(PartialEq, Debug, Clone)]
pub struct IndicatorRate {
    pub attribute: String,
    pub rate: f64,
    /// The number of respondents with a non-missing value for the attribute.
    pub respondents: u64,
}

// ********* Configuration **********

#[derive(PartialEq, Debug, Clone)]
pub struct EngagementRules {
    /// The reference positive rate, a fraction in [0, 1].
    pub baseline: f64,
    /// An optional, higher, goal for the positive rate.
    pub target: Option<f64>,
    /// If true, rates and means use the weight of each record.
    pub weighted: bool,
    /// How many of the lowest items are reported as priority areas.
    pub priority_count: usize,
}

impl EngagementRules {
    pub const DEFAULT_RULES: EngagementRules = EngagementRules {
        baseline: 0.62,
        target: Some(0.70),
        weighted: false,
        priority_count: 2,
    };

    pub fn validate(&self) -> Result<(), MetricsError> {
        if !(0.0..=1.0).contains(&self.baseline) {
            return InvalidRuleSnafu {
                reason: format!("baseline {} is not in [0, 1]", self.baseline),
            }
            .fail();
        }
        if let Some(t) = self.target {
            if !(0.0..=1.0).contains(&t) || t < self.baseline {
                return InvalidRuleSnafu {
                    reason: format!("target {} is not in [baseline, 1]", t),
                }
                .fail();
            }
        }
        Ok(())
    }
}

// ********* Errors **********

#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum SchemaKind {
    Item,
    Attribute,
}

impl Display for SchemaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SchemaKind::Item => write!(f, "item"),
            SchemaKind::Attribute => write!(f, "attribute"),
        }
    }
}

/// Errors that prevent a computation from completing.
///
/// All of them are deterministic: running again on the same input fails the same way.
#[derive(Eq, PartialEq, Debug, Clone, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum MetricsError {
    #[snafu(display("{kind} {name} is not present in the dataset"))]
    Schema { name: String, kind: SchemaKind },

    #[snafu(display("no metric for item {item} in group {group}"))]
    NotFound { item: ItemId, group: GroupKey },

    #[snafu(display("invalid scale {scale}: {reason}"))]
    InvalidScale { scale: String, reason: String },

    #[snafu(display("invalid rule: {reason}"))]
    InvalidRule { reason: String },

    #[snafu(display("record {id} has {found} values, {expected} were expected"))]
    RecordWidth {
        id: String,
        expected: usize,
        found: usize,
    },
}
