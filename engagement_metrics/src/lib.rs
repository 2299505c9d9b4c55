mod config;
use log::{debug, info, warn};

use std::collections::{BTreeMap, BTreeSet};

pub mod builder;
pub mod grouping;
pub mod manual;
pub mod report;
pub mod scale;

pub use crate::config::*;
pub use crate::grouping::{BoundaryMode, GroupRule, Grouping, SizeBand};

// **** Private structures ****

// Running totals for one (item, group) pair.
#[derive(PartialEq, Debug, Clone, Default)]
struct Tally {
    // Unweighted count of non-missing responses.
    responses: u64,
    // Sum of the weights of the non-missing responses (equal to `responses` when unweighted).
    total: f64,
    positive: f64,
    neutral: f64,
    negative: f64,
    score: f64,
}

impl Tally {
    fn add(&mut self, category: Category, code: ResponseCode, weight: f64) {
        let slot = match category {
            Category::Positive => &mut self.positive,
            Category::Neutral => &mut self.neutral,
            Category::Negative => &mut self.negative,
            Category::Missing => return,
        };
        *slot += weight;
        self.responses += 1;
        self.total += weight;
        self.score += weight * code as f64;
    }

    // None when there is nothing to divide by: a zero-response pair is not a zero rate.
    fn to_metric(&self, item: &ItemId, group: &GroupKey) -> Option<ItemMetric> {
        if self.responses == 0 || self.total <= 0.0 {
            return None;
        }
        Some(ItemMetric {
            item: item.clone(),
            group: group.clone(),
            positive_rate: self.positive / self.total,
            neutral_rate: self.neutral / self.total,
            negative_rate: self.negative / self.total,
            mean_score: self.score / self.total,
            response_count: self.responses,
        })
    }
}

/// The complete output of one run: the overall ranking and one comparison per grouping.
#[derive(PartialEq, Debug, Clone)]
pub struct EngagementResult {
    pub respondents: u64,
    pub overall: Aggregation,
    pub summary: Vec<SummaryRow>,
    pub index: Option<EngagementIndex>,
    pub comparisons: Vec<GroupComparison>,
}

#[derive(PartialEq, Debug, Clone)]
pub struct GroupComparison {
    pub attribute: String,
    pub aggregation: Aggregation,
    /// Ordered by item, then ranked within each item.
    pub rows: Vec<SummaryRow>,
    pub groups: Vec<GroupEngagement>,
}

/// Computes the metrics of every item of `scales`, optionally partitioned by a grouping.
///
/// Arguments:
/// * `dataset` the respondents
/// * `scales` the items of interest, with their scale
/// * `grouping` if provided, the metrics are computed per group and the records without a
/// usable value for the grouping attribute are left out. Otherwise all the records form the
/// single group `GroupKey::Overall`.
/// * `rules` only `weighted` is used here
///
/// (item, group) pairs without any non-missing response are omitted from the output and
/// counted in `omitted_pairs`. The result is built fresh for every call: calls for
/// different groupings over the same dataset are independent.
pub fn aggregate(
    dataset: &Dataset,
    scales: &ScaleMap,
    grouping: Option<&Grouping>,
    rules: &EngagementRules,
) -> Result<Aggregation, MetricsError> {
    for item in scales.keys() {
        dataset.require_item(item)?;
    }
    if let Some(g) = grouping {
        dataset.require_attribute(&g.attribute)?;
        g.validate()?;
    }
    info!(
        "aggregate: {} records, {} items, grouping: {:?}, weighted: {}",
        dataset.len(),
        scales.len(),
        grouping.map(|g| g.attribute.as_str()),
        rules.weighted
    );

    // The group of each record, in record order.
    let mut memberships: Vec<Option<GroupKey>> = Vec::with_capacity(dataset.len());
    let mut group_sizes: BTreeMap<GroupKey, u64> = BTreeMap::new();
    let mut excluded_records: u64 = 0;
    for record in dataset.records() {
        let membership = match grouping {
            None => Some(GroupKey::Overall),
            Some(g) => g.group_of(record.attribute(&g.attribute)?),
        };
        match &membership {
            Some(key) => *group_sizes.entry(key.clone()).or_insert(0) += 1,
            None => excluded_records += 1,
        }
        memberships.push(membership);
    }
    if excluded_records > 0 {
        info!(
            "aggregate: {} records without a group are excluded from the grouped output",
            excluded_records
        );
    }

    let mut metrics: MetricMap = BTreeMap::new();
    let mut omitted_pairs: u64 = 0;
    let mut out_of_range_codes: u64 = 0;
    for (item, scale) in scales.iter() {
        let mut tallies: BTreeMap<&GroupKey, Tally> = BTreeMap::new();
        for (record, membership) in dataset.records().iter().zip(memberships.iter()) {
            let key = match membership {
                Some(k) => k,
                None => continue,
            };
            let code = record.response(item)?;
            if let Some(c) = code {
                if scale.is_out_of_range(c) {
                    debug!(
                        "aggregate: record {}: code {} is outside of scale {} for item {}",
                        record.id,
                        c,
                        scale.name(),
                        item
                    );
                    out_of_range_codes += 1;
                }
            }
            let category = scale.normalize_code(code);
            let weight = if rules.weighted { record.weight } else { 1.0 };
            let tally = tallies.entry(key).or_default();
            if let Some(c) = code {
                tally.add(category, c, weight);
            }
        }
        for group in group_sizes.keys() {
            let metric = tallies
                .get(group)
                .and_then(|t| t.to_metric(item, group));
            match metric {
                Some(m) => {
                    debug!(
                        "aggregate: {} / {}: rate {:.4} over {} responses",
                        item, group, m.positive_rate, m.response_count
                    );
                    metrics.insert((item.clone(), group.clone()), m);
                }
                None => {
                    debug!("aggregate: {} / {}: no response, omitted", item, group);
                    omitted_pairs += 1;
                }
            }
        }
    }

    if out_of_range_codes > 0 {
        warn!(
            "aggregate: {} codes outside of their scale were treated as missing",
            out_of_range_codes
        );
    }
    if omitted_pairs > 0 {
        warn!(
            "aggregate: {} (item, group) pairs without any response were omitted",
            omitted_pairs
        );
    }

    Ok(Aggregation {
        attribute: grouping.map(|g| g.attribute.clone()),
        metrics,
        omitted_pairs,
        out_of_range_codes,
        excluded_records,
        group_sizes,
    })
}

/// The share of respondents whose value for `attribute` is one of `values`.
///
/// Only the respondents with a non-missing value are counted. Returns None if there
/// is no such respondent.
pub fn indicator_rate(
    dataset: &Dataset,
    attribute: &str,
    values: &[String],
    rules: &EngagementRules,
) -> Result<Option<IndicatorRate>, MetricsError> {
    dataset.require_attribute(attribute)?;
    let accepted: BTreeSet<&str> = values.iter().map(|s| s.trim()).collect();
    let mut respondents: u64 = 0;
    let mut total: f64 = 0.0;
    let mut hits: f64 = 0.0;
    for record in dataset.records() {
        let v = match record.attribute(attribute)?.map(|s| s.trim()) {
            Some(v) if !v.is_empty() => v,
            _ => continue,
        };
        let weight = if rules.weighted { record.weight } else { 1.0 };
        respondents += 1;
        total += weight;
        if accepted.contains(v) {
            hits += weight;
        }
    }
    debug!(
        "indicator_rate: {}: {} respondents, {} matching",
        attribute, respondents, hits
    );
    if respondents == 0 || total <= 0.0 {
        return Ok(None);
    }
    Ok(Some(IndicatorRate {
        attribute: attribute.to_string(),
        rate: hits / total,
        respondents,
    }))
}

/// Runs the complete analysis: the overall metrics and their ranking, the engagement index
/// and one ranked comparison for each grouping.
///
/// Arguments:
/// * `dataset` the respondents
/// * `scales` the items to report, with their scale
/// * `groupings` the breakdowns to compute (organization size, supervisory status, ...)
/// * `rules` the baseline, the target and the weighting
pub fn run_engagement_stats(
    dataset: &Dataset,
    scales: &ScaleMap,
    groupings: &[Grouping],
    rules: &EngagementRules,
) -> Result<EngagementResult, MetricsError> {
    rules.validate()?;
    info!(
        "run_engagement_stats: Processing {:?} records, {:?} items, {:?} groupings, rules: {:?}",
        dataset.len(),
        scales.len(),
        groupings.len(),
        rules
    );

    let overall = aggregate(dataset, scales, None, rules)?;
    let summary = report::rank_items(&overall.metrics, rules);
    for row in summary.iter() {
        info!(
            "{:>3} {:<8} {:>6.1}% ({:+.1} points, {} responses)",
            row.rank,
            row.metric.item,
            row.metric.positive_rate * 100.0,
            row.delta_points(),
            row.metric.response_count
        );
    }
    let index = report::engagement_index(&summary, rules);
    if let Some(idx) = &index {
        info!(
            "Engagement index: {:.1}% ({:+.1} points from the baseline)",
            idx.mean_positive_rate * 100.0,
            idx.delta * 100.0
        );
    }

    let mut comparisons: Vec<GroupComparison> = Vec::new();
    for g in groupings.iter() {
        let aggregation = aggregate(dataset, scales, Some(g), rules)?;
        let rows = report::rank_groups(&aggregation.metrics, rules);
        let groups = report::group_engagement(&aggregation);
        for ge in groups.iter() {
            info!(
                "{}: {} -> {:.1}% over {} items ({} respondents)",
                g.attribute,
                ge.group,
                ge.avg_positive_rate * 100.0,
                ge.items_reported,
                ge.respondents
            );
        }
        comparisons.push(GroupComparison {
            attribute: g.attribute.clone(),
            aggregation,
            rows,
            groups,
        });
    }

    Ok(EngagementResult {
        respondents: dataset.len() as u64,
        overall,
        summary,
        index,
        comparisons,
    })
}
