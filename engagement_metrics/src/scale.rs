//! Normalization of raw response codes into categories.

use log::debug;
use std::collections::BTreeSet;
use std::ops::RangeInclusive;

use crate::config::*;

impl ItemScale {
    /// Creates a scale and checks that it is well formed.
    ///
    /// Arguments:
    /// * `name` a label for this scale, used in error messages
    /// * `valid` the range of codes that carry an answer
    /// * `positive`, `neutral`, `negative` the codes of each category. Together they must
    /// cover the valid range exactly once.
    /// * `missing` the sentinel codes for skipped or not-applicable answers. They must lie
    /// outside of the valid range.
    pub fn new(
        name: &str,
        valid: RangeInclusive<ResponseCode>,
        positive: &[ResponseCode],
        neutral: &[ResponseCode],
        negative: &[ResponseCode],
        missing: &[ResponseCode],
    ) -> Result<ItemScale, MetricsError> {
        let scale = ItemScale {
            name: name.to_string(),
            min_code: *valid.start(),
            max_code: *valid.end(),
            positive: positive.iter().cloned().collect(),
            neutral: neutral.iter().cloned().collect(),
            negative: negative.iter().cloned().collect(),
            missing: missing.iter().cloned().collect(),
        };
        scale.check_partition()?;
        Ok(scale)
    }

    /// The usual 5-point agreement scale where 4 and 5 are the favorable answers.
    pub fn agree_high() -> ItemScale {
        ItemScale {
            name: "agree-high".to_string(),
            min_code: 1,
            max_code: 5,
            positive: [4, 5].into_iter().collect(),
            neutral: [3].into_iter().collect(),
            negative: [1, 2].into_iter().collect(),
            missing: BTreeSet::new(),
        }
    }

    /// The reversed 5-point scale (1 = strongly agree), where 1 and 2 are the favorable answers.
    pub fn agree_low() -> ItemScale {
        ItemScale {
            name: "agree-low".to_string(),
            min_code: 1,
            max_code: 5,
            positive: [1, 2].into_iter().collect(),
            neutral: [3].into_iter().collect(),
            negative: [4, 5].into_iter().collect(),
            missing: BTreeSet::new(),
        }
    }

    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    pub fn valid_range(&self) -> RangeInclusive<ResponseCode> {
        self.min_code..=self.max_code
    }

    /// The codes assigned to a category.
    pub fn codes(&self, category: Category) -> &BTreeSet<ResponseCode> {
        match category {
            Category::Positive => &self.positive,
            Category::Neutral => &self.neutral,
            Category::Negative => &self.negative,
            Category::Missing => &self.missing,
        }
    }

    /// True if this code is neither in the valid range nor a declared missing code.
    /// Such codes are stray values of the extract: they are treated as missing.
    pub fn is_out_of_range(&self, code: ResponseCode) -> bool {
        !self.missing.contains(&code) && !self.valid_range().contains(&code)
    }

    /// Maps a raw code to its category. This never fails: empty, sentinel and
    /// out-of-range codes are all missing.
    pub fn normalize_code(&self, code: Option<ResponseCode>) -> Category {
        match code {
            None => Category::Missing,
            Some(c) if self.missing.contains(&c) => Category::Missing,
            Some(c) if self.positive.contains(&c) => Category::Positive,
            Some(c) if self.neutral.contains(&c) => Category::Neutral,
            Some(c) if self.negative.contains(&c) => Category::Negative,
            Some(_) => Category::Missing,
        }
    }

    fn check_partition(&self) -> Result<(), MetricsError> {
        if self.min_code > self.max_code {
            return self.invalid(format!(
                "empty valid range {}..={}",
                self.min_code, self.max_code
            ));
        }
        let sets = [
            (Category::Positive, &self.positive),
            (Category::Neutral, &self.neutral),
            (Category::Negative, &self.negative),
        ];
        for (category, codes) in sets.iter() {
            if let Some(c) = codes.iter().find(|c| !self.valid_range().contains(*c)) {
                return self.invalid(format!(
                    "{:?} code {} is outside of the valid range",
                    category, c
                ));
            }
        }
        for code in self.valid_range() {
            let owners: Vec<Category> = sets
                .iter()
                .filter(|(_, codes)| codes.contains(&code))
                .map(|(category, _)| *category)
                .collect();
            match owners.as_slice() {
                [_] => {}
                [] => {
                    return self.invalid(format!("code {} has no category", code));
                }
                _ => {
                    return self.invalid(format!(
                        "code {} belongs to several categories: {:?}",
                        code, owners
                    ));
                }
            }
        }
        if let Some(c) = self.missing.iter().find(|c| self.valid_range().contains(*c)) {
            return self.invalid(format!("missing code {} is inside the valid range", c));
        }
        Ok(())
    }

    fn invalid(&self, reason: String) -> Result<(), MetricsError> {
        InvalidScaleSnafu {
            scale: self.name.clone(),
            reason,
        }
        .fail()
    }
}

/// Normalizes the response of a record to one item.
///
/// This is a pure function of the code and the scale: it does not look at any other
/// record and does not modify the record.
pub fn normalize(
    record: &RawRecord,
    item: &ItemId,
    scale: &ItemScale,
) -> Result<Category, MetricsError> {
    let code = record.response(item)?;
    Ok(scale.normalize_code(code))
}

/// A single normalized response. It only borrows from the dataset.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub struct NormalizedResponse<'a> {
    pub record_id: &'a str,
    pub item: &'a ItemId,
    pub category: Category,
}

/// The normalized view of all the responses to one item, in record order.
pub fn normalized_responses<'a>(
    dataset: &'a Dataset,
    item: &'a ItemId,
    scale: &'a ItemScale,
) -> Result<Vec<NormalizedResponse<'a>>, MetricsError> {
    dataset.require_item(item)?;
    let mut res: Vec<NormalizedResponse<'a>> = Vec::with_capacity(dataset.len());
    for record in dataset.records() {
        let category = normalize(record, item, scale)?;
        res.push(NormalizedResponse {
            record_id: record.id.as_str(),
            item,
            category,
        });
    }
    debug!(
        "normalized_responses: {} responses for item {} with scale {}",
        res.len(),
        item,
        scale.name()
    );
    Ok(res)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::DatasetBuilder;

    fn five_point_scale() -> ItemScale {
        ItemScale::new("five", 1..=5, &[4, 5], &[3], &[1, 2], &[9]).unwrap()
    }

    #[test]
    fn categories_of_a_five_point_scale() {
        let scale = five_point_scale();
        assert_eq!(scale.normalize_code(Some(5)), Category::Positive);
        assert_eq!(scale.normalize_code(Some(4)), Category::Positive);
        assert_eq!(scale.normalize_code(Some(3)), Category::Neutral);
        assert_eq!(scale.normalize_code(Some(2)), Category::Negative);
        assert_eq!(scale.normalize_code(Some(1)), Category::Negative);
        assert_eq!(scale.normalize_code(Some(9)), Category::Missing);
        assert_eq!(scale.normalize_code(None), Category::Missing);
    }

    #[test]
    fn stray_codes_are_missing() {
        let scale = five_point_scale();
        assert_eq!(scale.normalize_code(Some(0)), Category::Missing);
        assert_eq!(scale.normalize_code(Some(-1)), Category::Missing);
        assert_eq!(scale.normalize_code(Some(77)), Category::Missing);
        assert!(scale.is_out_of_range(77));
        assert!(!scale.is_out_of_range(9));
        assert!(!scale.is_out_of_range(3));
    }

    #[test]
    fn normalization_is_deterministic() {
        let scale = five_point_scale();
        for code in -2..12 {
            assert_eq!(
                scale.normalize_code(Some(code)),
                scale.normalize_code(Some(code))
            );
        }
    }

    #[test]
    fn presets_partition_their_range() {
        for scale in [ItemScale::agree_high(), ItemScale::agree_low()] {
            assert!(scale.check_partition().is_ok());
            for code in scale.valid_range() {
                let n = [Category::Positive, Category::Neutral, Category::Negative]
                    .iter()
                    .filter(|c| scale.codes(**c).contains(&code))
                    .count();
                assert_eq!(n, 1, "code {} in scale {}", code, scale.name());
            }
        }
        assert_eq!(
            ItemScale::agree_low().normalize_code(Some(1)),
            Category::Positive
        );
    }

    #[test]
    fn gap_in_the_range_is_rejected() {
        let res = ItemScale::new("gap", 1..=5, &[4, 5], &[], &[1, 2], &[]);
        assert!(matches!(res, Err(MetricsError::InvalidScale { .. })));
    }

    #[test]
    fn overlap_is_rejected() {
        let res = ItemScale::new("overlap", 1..=5, &[3, 4, 5], &[3], &[1, 2], &[]);
        assert!(matches!(res, Err(MetricsError::InvalidScale { .. })));
    }

    #[test]
    fn category_code_outside_the_range_is_rejected() {
        let res = ItemScale::new("outside", 1..=5, &[4, 5, 6], &[3], &[1, 2], &[]);
        assert!(res.is_err());
    }

    #[test]
    fn missing_code_inside_the_range_is_rejected() {
        let res = ItemScale::new("inside", 1..=5, &[4, 5], &[3], &[1, 2], &[3]);
        assert!(res.is_err());
    }

    #[test]
    fn inverted_range_is_rejected() {
        let res = ItemScale::new("inverted", 5..=1, &[], &[], &[], &[]);
        assert!(res.is_err());
    }

    #[test]
    fn normalized_view_follows_record_order() {
        let q1 = ItemId::from("Q1");
        let mut builder = DatasetBuilder::new(&[q1.clone()], &[]).unwrap();
        builder.add_record("a", &[Some(5)], &[]).unwrap();
        builder.add_record("b", &[None], &[]).unwrap();
        builder.add_record("c", &[Some(2)], &[]).unwrap();
        let dataset = builder.build();
        let scale = five_point_scale();
        let view = normalized_responses(&dataset, &q1, &scale).unwrap();
        let cats: Vec<(&str, Category)> = view.iter().map(|r| (r.record_id, r.category)).collect();
        assert_eq!(
            cats,
            vec![
                ("a", Category::Positive),
                ("b", Category::Missing),
                ("c", Category::Negative)
            ]
        );
    }

    #[test]
    fn unknown_item_is_a_schema_error() {
        let q1 = ItemId::from("Q1");
        let mut builder = DatasetBuilder::new(&[q1], &[]).unwrap();
        builder.add_record("a", &[Some(5)], &[]).unwrap();
        let dataset = builder.build();
        let scale = five_point_scale();
        let q2 = ItemId::from("Q2");
        let res = normalized_responses(&dataset, &q2, &scale);
        assert!(matches!(res, Err(MetricsError::Schema { .. })));
        let res = normalize(&dataset.records()[0], &q2, &scale);
        assert!(matches!(res, Err(MetricsError::Schema { .. })));
    }
}
