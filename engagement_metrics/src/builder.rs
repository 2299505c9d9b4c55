use std::collections::{BTreeMap, HashSet};

pub use crate::config::*;

/// A builder for assembling a dataset, one respondent at a time.
///
/// The builder enforces the schema of the dataset: every record must provide a value
/// (possibly empty) for every declared item and attribute.
///
/// ```
/// use engagement_metrics::builder::DatasetBuilder;
/// use engagement_metrics::{ItemId, MetricsError};
///
/// let mut builder = DatasetBuilder::new(
///     &[ItemId::from("Q1"), ItemId::from("Q2")],
///     &["DSUPER".to_string()],
/// )?;
///
/// builder.add_record("r1", &[Some(5), None], &[Some("A".to_string())])?;
/// builder.add_weighted_record("r2", 2.5, &[Some(3), Some(9)], &[None])?;
///
/// let dataset = builder.build();
/// assert_eq!(dataset.len(), 2);
/// # Ok::<(), MetricsError>(())
/// ```
pub struct DatasetBuilder {
    pub(crate) _items: Vec<ItemId>,
    pub(crate) _attributes: Vec<String>,
    pub(crate) _records: Vec<RawRecord>,
}

impl DatasetBuilder {
    pub fn new(items: &[ItemId], attributes: &[String]) -> Result<DatasetBuilder, MetricsError> {
        let mut seen: HashSet<&str> = HashSet::new();
        for name in items
            .iter()
            .map(|i| i.as_str())
            .chain(attributes.iter().map(|a| a.as_str()))
        {
            if !seen.insert(name) {
                return InvalidRuleSnafu {
                    reason: format!("column {} is declared twice", name),
                }
                .fail();
            }
        }
        Ok(DatasetBuilder {
            _items: items.to_vec(),
            _attributes: attributes.to_vec(),
            _records: Vec::new(),
        })
    }

    /// Adds a record with a weight of 1.
    ///
    /// codes: the raw codes, in the order of the declared items. None marks an empty cell.
    /// attributes: the attribute values, in the order of the declared attributes.
    pub fn add_record(
        &mut self,
        id: &str,
        codes: &[Option<ResponseCode>],
        attributes: &[Option<String>],
    ) -> Result<(), MetricsError> {
        self.add_weighted_record(id, 1.0, codes, attributes)
    }

    /// Adds a record with a survey weight. Weights must be finite and non-negative.
    pub fn add_weighted_record(
        &mut self,
        id: &str,
        weight: f64,
        codes: &[Option<ResponseCode>],
        attributes: &[Option<String>],
    ) -> Result<(), MetricsError> {
        if codes.len() != self._items.len() {
            return RecordWidthSnafu {
                id,
                expected: self._items.len(),
                found: codes.len(),
            }
            .fail();
        }
        if attributes.len() != self._attributes.len() {
            return RecordWidthSnafu {
                id,
                expected: self._attributes.len(),
                found: attributes.len(),
            }
            .fail();
        }
        if !weight.is_finite() || weight < 0.0 {
            return InvalidRuleSnafu {
                reason: format!("record {} has an invalid weight {}", id, weight),
            }
            .fail();
        }
        let responses: BTreeMap<ItemId, Option<ResponseCode>> = self
            ._items
            .iter()
            .cloned()
            .zip(codes.iter().cloned())
            .collect();
        let attrs: BTreeMap<String, Option<String>> = self
            ._attributes
            .iter()
            .cloned()
            .zip(attributes.iter().cloned())
            .collect();
        self._records.push(RawRecord {
            id: id.to_string(),
            weight,
            responses,
            attributes: attrs,
        });
        Ok(())
    }

    pub fn build(self) -> Dataset {
        Dataset {
            items: self._items,
            attributes: self._attributes,
            records: self._records,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_must_match_the_schema() {
        let mut b = DatasetBuilder::new(&[ItemId::from("Q1")], &["DSUPER".to_string()]).unwrap();
        assert!(matches!(
            b.add_record("r1", &[Some(1), Some(2)], &[None]),
            Err(MetricsError::RecordWidth {
                expected: 1,
                found: 2,
                ..
            })
        ));
        assert!(b.add_record("r1", &[Some(1)], &[]).is_err());
        assert!(b.add_record("r1", &[Some(1)], &[None]).is_ok());
        assert_eq!(b.build().len(), 1);
    }

    #[test]
    fn duplicate_columns() {
        let res = DatasetBuilder::new(
            &[ItemId::from("Q1"), ItemId::from("Q1")],
            &["DSUPER".to_string()],
        );
        assert!(res.is_err());
    }

    #[test]
    fn negative_weight() {
        let mut b = DatasetBuilder::new(&[ItemId::from("Q1")], &[]).unwrap();
        assert!(b.add_weighted_record("r1", -1.0, &[Some(1)], &[]).is_err());
        assert!(b.add_weighted_record("r1", f64::NAN, &[Some(1)], &[]).is_err());
        assert!(b.add_weighted_record("r1", 0.0, &[Some(1)], &[]).is_ok());
    }

    #[test]
    fn values_are_reachable_by_name() {
        let mut b = DatasetBuilder::new(&[ItemId::from("Q1")], &["DSUPER".to_string()]).unwrap();
        b.add_record("r1", &[Some(4)], &[Some("B".to_string())])
            .unwrap();
        let d = b.build();
        let r = &d.records()[0];
        assert_eq!(r.response(&ItemId::from("Q1")), Ok(Some(4)));
        assert_eq!(r.attribute("DSUPER"), Ok(Some("B")));
        assert!(r.attribute("DLEAVING").is_err());
        assert!(d.require_attribute("DSUPER").is_ok());
        assert!(d.require_item(&ItemId::from("Q9")).is_err());
    }
}
