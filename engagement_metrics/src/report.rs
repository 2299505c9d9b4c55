//! Ranking of the items and comparison against the baseline.
//!
//! The rankings are total orders: positive rate descending, then item id ascending (and
//! group ascending for the grouped tables). Identical inputs always produce identical
//! sequences.

use log::debug;
use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::config::*;

fn by_rate(a: &ItemMetric, b: &ItemMetric) -> Ordering {
    b.positive_rate
        .total_cmp(&a.positive_rate)
        .then_with(|| a.item.cmp(&b.item))
        .then_with(|| a.group.cmp(&b.group))
}

fn standing(rate: f64, rules: &EngagementRules) -> Standing {
    if rate < rules.baseline {
        Standing::BelowBaseline
    } else if rules.target.map_or(false, |t| rate < t) {
        Standing::MeetsBaseline
    } else {
        Standing::MeetsTarget
    }
}

/// Compares one metric against the baseline.
pub fn summary_row(metric: &ItemMetric, rank: u32, rules: &EngagementRules) -> SummaryRow {
    let rate = metric.positive_rate;
    SummaryRow {
        metric: metric.clone(),
        rank,
        delta: rate - rules.baseline,
        below_baseline: rate < rules.baseline,
        standing: standing(rate, rules),
    }
}

/// Ranks the items of the overall group. One row per item, best positive rate first.
///
/// Metrics of named groups are ignored.
pub fn rank_items(metrics: &MetricMap, rules: &EngagementRules) -> Vec<SummaryRow> {
    let mut overall: Vec<&ItemMetric> = metrics
        .values()
        .filter(|m| m.group == GroupKey::Overall)
        .collect();
    overall.sort_by(|a, b| by_rate(a, b));
    debug!("rank_items: ranking {} items", overall.len());
    overall
        .iter()
        .enumerate()
        .map(|(idx, m)| summary_row(m, (idx + 1) as u32, rules))
        .collect()
}

/// The ranked row of a single item.
///
/// A missing item is reported as `NotFound`: it is a data problem, not a zero rate.
pub fn rank_item(
    metrics: &MetricMap,
    item: &ItemId,
    rules: &EngagementRules,
) -> Result<SummaryRow, MetricsError> {
    let rows = rank_items(metrics, rules);
    find_row(&rows, item, &GroupKey::Overall).cloned()
}

/// Ranks the groups within each item.
///
/// The rows are ordered by item, then by positive rate within the item. The rank of a row
/// is its position among the groups of the same item.
pub fn rank_groups(metrics: &MetricMap, rules: &EngagementRules) -> Vec<SummaryRow> {
    let mut by_item: BTreeMap<&ItemId, Vec<&ItemMetric>> = BTreeMap::new();
    for m in metrics.values().filter(|m| m.group != GroupKey::Overall) {
        by_item.entry(&m.item).or_default().push(m);
    }
    let mut res: Vec<SummaryRow> = Vec::new();
    for (item, mut group_metrics) in by_item.into_iter() {
        group_metrics.sort_by(|a, b| by_rate(a, b));
        debug!(
            "rank_groups: {}: {} groups, best: {:?}",
            item,
            group_metrics.len(),
            group_metrics.first().map(|m| &m.group)
        );
        for (idx, m) in group_metrics.iter().enumerate() {
            res.push(summary_row(m, (idx + 1) as u32, rules));
        }
    }
    res
}

/// The ranked row of a group for one item.
pub fn rank_group(
    metrics: &MetricMap,
    item: &ItemId,
    group: &GroupKey,
    rules: &EngagementRules,
) -> Result<SummaryRow, MetricsError> {
    let rows = rank_groups(metrics, rules);
    find_row(&rows, item, group).cloned()
}

/// Looks up a row in a ranked sequence.
pub fn find_row<'a>(
    rows: &'a [SummaryRow],
    item: &ItemId,
    group: &GroupKey,
) -> Result<&'a SummaryRow, MetricsError> {
    match rows
        .iter()
        .find(|r| r.metric.item == *item && r.metric.group == *group)
    {
        Some(r) => Ok(r),
        None => NotFoundSnafu {
            item: item.clone(),
            group: group.clone(),
        }
        .fail(),
    }
}

/// Averages the positive rates of a ranking (as produced by `rank_items`).
///
/// Returns None for an empty ranking.
pub fn engagement_index(rows: &[SummaryRow], rules: &EngagementRules) -> Option<EngagementIndex> {
    let highest = rows.first()?.metric.item.clone();
    let total: f64 = rows.iter().map(|r| r.metric.positive_rate).sum();
    let mean = total / rows.len() as f64;
    let priority_items: Vec<ItemId> = rows
        .iter()
        .rev()
        .take(rules.priority_count)
        .map(|r| r.metric.item.clone())
        .collect();
    Some(EngagementIndex {
        mean_positive_rate: mean,
        delta: mean - rules.baseline,
        below_baseline: mean < rules.baseline,
        num_items: rows.len(),
        highest,
        priority_items,
    })
}

/// The average positive rate of each group of a grouped aggregation, best first.
///
/// Groups for which no item could be reported are left out.
pub fn group_engagement(aggregation: &Aggregation) -> Vec<GroupEngagement> {
    let mut res: Vec<GroupEngagement> = Vec::new();
    for (group, respondents) in aggregation.group_sizes.iter() {
        let rates: Vec<f64> = aggregation
            .metrics
            .values()
            .filter(|m| m.group == *group)
            .map(|m| m.positive_rate)
            .collect();
        if rates.is_empty() {
            debug!("group_engagement: {}: no item reported, skipping", group);
            continue;
        }
        res.push(GroupEngagement {
            group: group.clone(),
            avg_positive_rate: rates.iter().sum::<f64>() / rates.len() as f64,
            respondents: *respondents,
            items_reported: rates.len(),
        });
    }
    res.sort_by(|a, b| {
        b.avg_positive_rate
            .total_cmp(&a.avg_positive_rate)
            .then_with(|| a.group.cmp(&b.group))
    });
    res
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metric(item: &str, group: Option<&str>, rate: f64) -> ItemMetric {
        ItemMetric {
            item: ItemId::from(item),
            group: group.map_or(GroupKey::Overall, |g| GroupKey::Group(g.to_string())),
            positive_rate: rate,
            neutral_rate: 0.0,
            negative_rate: 1.0 - rate,
            mean_score: 3.0,
            response_count: 10,
        }
    }

    fn map(ms: Vec<ItemMetric>) -> MetricMap {
        ms.into_iter()
            .map(|m| ((m.item.clone(), m.group.clone()), m))
            .collect()
    }

    fn items(rows: &[SummaryRow]) -> Vec<String> {
        rows.iter().map(|r| r.metric.item.to_string()).collect()
    }

    #[test]
    fn rate_below_baseline() {
        let rules = EngagementRules::DEFAULT_RULES;
        let row = summary_row(&metric("Q1", None, 4.0 / 9.0), 1, &rules);
        assert!(row.below_baseline);
        assert_eq!(row.standing, Standing::BelowBaseline);
        assert!((row.delta + 0.176).abs() < 1e-3);
        assert!((row.delta_points() + 17.56).abs() < 1e-2);
    }

    #[test]
    fn rate_equal_to_baseline_is_not_below() {
        let rules = EngagementRules::DEFAULT_RULES;
        // 31 / 50 rounds to the same double as the literal.
        let row = summary_row(&metric("Q1", None, 31.0 / 50.0), 1, &rules);
        assert!(!row.below_baseline);
        assert_eq!(row.standing, Standing::MeetsBaseline);
        let row = summary_row(&metric("Q1", None, 0.6199), 1, &rules);
        assert!(row.below_baseline);
    }

    #[test]
    fn target_standing() {
        let rules = EngagementRules::DEFAULT_RULES;
        assert_eq!(
            summary_row(&metric("Q1", None, 0.70), 1, &rules).standing,
            Standing::MeetsTarget
        );
        let no_target = EngagementRules {
            target: None,
            ..EngagementRules::DEFAULT_RULES
        };
        assert_eq!(
            summary_row(&metric("Q1", None, 0.65), 1, &no_target).standing,
            Standing::MeetsTarget
        );
    }

    #[test]
    fn ties_are_broken_by_item() {
        let rules = EngagementRules::DEFAULT_RULES;
        let m = map(vec![
            metric("Q10", None, 0.5),
            metric("Q2", None, 0.5),
            metric("Q3", None, 0.8),
            metric("Q1", None, 0.1),
            metric("Q4", Some("A"), 0.99),
        ]);
        let rows = rank_items(&m, &rules);
        assert_eq!(items(&rows), vec!["Q3", "Q2", "Q10", "Q1"]);
        let ranks: Vec<u32> = rows.iter().map(|r| r.rank).collect();
        assert_eq!(ranks, vec![1, 2, 3, 4]);
        // Same input, same output.
        assert_eq!(rows, rank_items(&m, &rules));
    }

    #[test]
    fn unknown_item_is_not_found() {
        let rules = EngagementRules::DEFAULT_RULES;
        let m = map(vec![metric("Q1", None, 0.5)]);
        assert_eq!(
            rank_item(&m, &ItemId::from("Q999"), &rules),
            Err(MetricsError::NotFound {
                item: ItemId::from("Q999"),
                group: GroupKey::Overall
            })
        );
        assert_eq!(rank_item(&m, &ItemId::from("Q1"), &rules).unwrap().rank, 1);
    }

    #[test]
    fn groups_are_ranked_within_each_item() {
        let rules = EngagementRules::DEFAULT_RULES;
        let m = map(vec![
            metric("Q1", None, 0.5),
            metric("Q1", Some("small"), 0.4),
            metric("Q1", Some("large"), 0.7),
            metric("Q1", Some("mid"), 0.4),
            metric("Q2", Some("small"), 0.9),
            metric("Q2", Some("large"), 0.3),
        ]);
        let rows = rank_groups(&m, &rules);
        let got: Vec<(String, String, u32)> = rows
            .iter()
            .map(|r| {
                (
                    r.metric.item.to_string(),
                    r.metric.group.to_string(),
                    r.rank,
                )
            })
            .collect();
        let expected: Vec<(String, String, u32)> = [
            ("Q1", "large", 1),
            ("Q1", "mid", 2),
            ("Q1", "small", 3),
            ("Q2", "small", 1),
            ("Q2", "large", 2),
        ]
        .iter()
        .map(|(i, g, r)| (i.to_string(), g.to_string(), *r))
        .collect();
        assert_eq!(got, expected);

        let small = GroupKey::Group("small".to_string());
        assert_eq!(
            rank_group(&m, &ItemId::from("Q2"), &small, &rules)
                .unwrap()
                .rank,
            1
        );
        assert!(matches!(
            rank_group(&m, &ItemId::from("Q3"), &small, &rules),
            Err(MetricsError::NotFound { .. })
        ));
    }

    #[test]
    fn index_and_priorities() {
        let rules = EngagementRules::DEFAULT_RULES;
        let m = map(vec![
            metric("Q1", None, 0.5),
            metric("Q2", None, 0.75),
            metric("Q3", None, 0.25),
        ]);
        let rows = rank_items(&m, &rules);
        let idx = engagement_index(&rows, &rules).unwrap();
        assert_eq!(idx.mean_positive_rate, 0.5);
        assert!(idx.below_baseline);
        assert_eq!(idx.num_items, 3);
        assert_eq!(idx.highest, ItemId::from("Q2"));
        assert_eq!(
            idx.priority_items,
            vec![ItemId::from("Q3"), ItemId::from("Q1")]
        );
        assert_eq!(engagement_index(&[], &rules), None);
    }

    #[test]
    fn group_averages() {
        let m = map(vec![
            metric("Q1", Some("A"), 0.5),
            metric("Q2", Some("A"), 0.25),
            metric("Q1", Some("B"), 0.375),
        ]);
        let mut group_sizes = BTreeMap::new();
        group_sizes.insert(GroupKey::Group("A".to_string()), 12);
        group_sizes.insert(GroupKey::Group("B".to_string()), 4);
        group_sizes.insert(GroupKey::Group("C".to_string()), 1);
        let agg = Aggregation {
            attribute: Some("DSUPER".to_string()),
            metrics: m,
            omitted_pairs: 3,
            out_of_range_codes: 0,
            excluded_records: 0,
            group_sizes,
        };
        let ge = group_engagement(&agg);
        assert_eq!(ge.len(), 2);
        // Tie on 0.375: A before B.
        assert_eq!(ge[0].group, GroupKey::Group("A".to_string()));
        assert_eq!(ge[0].avg_positive_rate, 0.375);
        assert_eq!(ge[0].respondents, 12);
        assert_eq!(ge[0].items_reported, 2);
        assert_eq!(ge[1].group, GroupKey::Group("B".to_string()));
    }
}
