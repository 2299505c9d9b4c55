//! Declarative rules that turn an attribute value into a group.

use log::debug;
use std::collections::BTreeMap;

use crate::config::*;

/// How a value lying exactly on a band boundary is assigned.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum BoundaryMode {
    /// `lower <= value < upper`
    LowerInclusive,
    /// `lower < value <= upper`
    UpperInclusive,
}

/// A numeric range of an attribute (typically the headcount of an organization) and its label.
/// A missing bound is open.
#[derive(PartialEq, Debug, Clone)]
pub struct SizeBand {
    pub lower: Option<f64>,
    pub upper: Option<f64>,
    pub label: String,
}

impl SizeBand {
    pub fn new(lower: Option<f64>, upper: Option<f64>, label: &str) -> SizeBand {
        SizeBand {
            lower,
            upper,
            label: label.to_string(),
        }
    }

    pub fn contains(&self, value: f64, boundary: BoundaryMode) -> bool {
        match boundary {
            BoundaryMode::LowerInclusive => {
                self.lower.map_or(true, |l| value >= l) && self.upper.map_or(true, |u| value < u)
            }
            BoundaryMode::UpperInclusive => {
                self.lower.map_or(true, |l| value > l) && self.upper.map_or(true, |u| value <= u)
            }
        }
    }
}

#[derive(PartialEq, Debug, Clone)]
pub enum GroupRule {
    /// Each distinct value is a group. Values found in the map are renamed, the others are
    /// kept as they are.
    Categorical { labels: BTreeMap<String, String> },
    /// The value is parsed as a number and assigned to the first band that contains it.
    Banded {
        bands: Vec<SizeBand>,
        boundary: BoundaryMode,
    },
}

/// The grouping of the records by one attribute.
#[derive(PartialEq, Debug, Clone)]
pub struct Grouping {
    pub attribute: String,
    pub rule: GroupRule,
}

impl Grouping {
    pub fn categorical(attribute: &str) -> Grouping {
        Grouping {
            attribute: attribute.to_string(),
            rule: GroupRule::Categorical {
                labels: BTreeMap::new(),
            },
        }
    }

    pub fn labelled(attribute: &str, labels: &[(&str, &str)]) -> Grouping {
        Grouping {
            attribute: attribute.to_string(),
            rule: GroupRule::Categorical {
                labels: labels
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            },
        }
    }

    pub fn banded(
        attribute: &str,
        bands: Vec<SizeBand>,
        boundary: BoundaryMode,
    ) -> Result<Grouping, MetricsError> {
        let g = Grouping {
            attribute: attribute.to_string(),
            rule: GroupRule::Banded { bands, boundary },
        };
        g.validate()?;
        Ok(g)
    }

    pub fn validate(&self) -> Result<(), MetricsError> {
        if let GroupRule::Banded { bands, boundary } = &self.rule {
            if bands.is_empty() {
                return InvalidRuleSnafu {
                    reason: format!("no band defined for {}", self.attribute),
                }
                .fail();
            }
            for b in bands.iter() {
                if b.label.trim().is_empty() {
                    return InvalidRuleSnafu {
                        reason: format!("band without label for {}", self.attribute),
                    }
                    .fail();
                }
                let nan = b.lower.map_or(false, f64::is_nan) || b.upper.map_or(false, f64::is_nan);
                // With a single inclusive side, a band needs lower < upper to contain anything.
                let empty = matches!((b.lower, b.upper), (Some(l), Some(u)) if l >= u);
                if nan || empty {
                    return InvalidRuleSnafu {
                        reason: format!(
                            "band {} has invalid bounds {:?}..{:?} ({:?})",
                            b.label, b.lower, b.upper, boundary
                        ),
                    }
                    .fail();
                }
            }
        }
        Ok(())
    }

    /// The group of an attribute value, or None if the value is missing or
    /// does not fall in any band.
    pub fn group_of(&self, value: Option<&str>) -> Option<GroupKey> {
        let v = value.map(|s| s.trim()).filter(|s| !s.is_empty())?;
        match &self.rule {
            GroupRule::Categorical { labels } => {
                let label = labels.get(v).cloned().unwrap_or_else(|| v.to_string());
                Some(GroupKey::Group(label))
            }
            GroupRule::Banded { bands, boundary } => {
                let x = match v.parse::<f64>() {
                    Ok(x) if x.is_finite() => x,
                    _ => {
                        debug!(
                            "group_of: {}: value {:?} is not a number",
                            self.attribute, v
                        );
                        return None;
                    }
                };
                let band = bands.iter().find(|b| b.contains(x, *boundary));
                if band.is_none() {
                    debug!("group_of: {}: value {} is in no band", self.attribute, x);
                }
                band.map(|b| GroupKey::Group(b.label.clone()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn size_bands() -> Vec<SizeBand> {
        vec![
            SizeBand::new(Some(0.0), Some(100.0), "Under 100"),
            SizeBand::new(Some(100.0), Some(500.0), "100 to 499"),
            SizeBand::new(Some(500.0), None, "500 or more"),
        ]
    }

    fn group(s: &str) -> Option<GroupKey> {
        Some(GroupKey::Group(s.to_string()))
    }

    #[test]
    fn lower_bound_is_inclusive_by_default() {
        let g = Grouping::banded("SIZE", size_bands(), BoundaryMode::LowerInclusive).unwrap();
        assert_eq!(g.group_of(Some("99")), group("Under 100"));
        assert_eq!(g.group_of(Some("100")), group("100 to 499"));
        assert_eq!(g.group_of(Some("499.5")), group("100 to 499"));
        assert_eq!(g.group_of(Some("500")), group("500 or more"));
        assert_eq!(g.group_of(Some("120000")), group("500 or more"));
    }

    #[test]
    fn upper_inclusive_boundaries() {
        let g = Grouping::banded("SIZE", size_bands(), BoundaryMode::UpperInclusive).unwrap();
        assert_eq!(g.group_of(Some("100")), group("Under 100"));
        assert_eq!(g.group_of(Some("500")), group("100 to 499"));
        // Zero is excluded from the first band in this mode.
        assert_eq!(g.group_of(Some("0")), None);
    }

    #[test]
    fn first_matching_band_wins() {
        let bands = vec![
            SizeBand::new(Some(100.0), Some(500.0), "mid"),
            SizeBand::new(None, None, "any"),
        ];
        let g = Grouping::banded("SIZE", bands, BoundaryMode::LowerInclusive).unwrap();
        assert_eq!(g.group_of(Some("200")), group("mid"));
        assert_eq!(g.group_of(Some("20")), group("any"));
    }

    #[test]
    fn unusable_values_have_no_group() {
        let g = Grouping::banded("SIZE", size_bands(), BoundaryMode::LowerInclusive).unwrap();
        assert_eq!(g.group_of(None), None);
        assert_eq!(g.group_of(Some("  ")), None);
        assert_eq!(g.group_of(Some("large")), None);
        assert_eq!(g.group_of(Some("-3")), None);
    }

    #[test]
    fn categorical_labels() {
        let g = Grouping::labelled("DSUPER", &[("A", "Non-supervisor"), ("B", "Supervisor")]);
        assert_eq!(g.group_of(Some("A")), group("Non-supervisor"));
        assert_eq!(g.group_of(Some(" B ")), group("Supervisor"));
        assert_eq!(g.group_of(Some("C")), group("C"));
        assert_eq!(g.group_of(Some("")), None);
        assert_eq!(Grouping::categorical("DSUPER").group_of(Some("A")), group("A"));
    }

    #[test]
    fn invalid_bands() {
        let inverted = vec![SizeBand::new(Some(500.0), Some(100.0), "x")];
        assert!(Grouping::banded("SIZE", inverted, BoundaryMode::LowerInclusive).is_err());
        let unlabelled = vec![SizeBand::new(Some(0.0), Some(100.0), " ")];
        assert!(Grouping::banded("SIZE", unlabelled, BoundaryMode::LowerInclusive).is_err());
        assert!(Grouping::banded("SIZE", vec![], BoundaryMode::LowerInclusive).is_err());
        let nan = vec![SizeBand::new(Some(f64::NAN), None, "nan")];
        assert!(Grouping::banded("SIZE", nan, BoundaryMode::LowerInclusive).is_err());
    }
}
