// Primitives shared by the readers: column lookup and cell parsing.

use std::path::Path;

use crate::survey::*;

/// A respondent, as parsed by the readers.
/// The codes and the attributes follow the order of the columns of the layout.
#[derive(PartialEq, Debug, Clone)]
pub struct ParsedRecord {
    pub id: String,
    pub weight: f64,
    pub codes: Vec<Option<ResponseCode>>,
    pub attributes: Vec<Option<String>>,
}

/// The content of one data source.
#[derive(PartialEq, Debug, Clone)]
pub struct LoadedTable {
    pub path: String,
    /// The requested items that were found in the file.
    pub items: Vec<ItemId>,
    /// The requested attributes that were found in the file.
    pub attributes: Vec<String>,
    pub records: Vec<ParsedRecord>,
}

/// The position of the requested columns in a file.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct ColumnLayout {
    id: Option<usize>,
    weight: Option<usize>,
    items: Vec<(ItemId, usize)>,
    attributes: Vec<(String, usize)>,
    missing_labels: Vec<String>,
}

impl ColumnLayout {
    /// Locates the columns by name in the header.
    ///
    /// The id and weight columns must be present if they are configured. Items and attributes
    /// that are absent are only reported: the metrics engine decides whether they are needed.
    pub fn from_header(
        header: &[String],
        path: &str,
        cfs: &DataSource,
        items: &[ItemId],
        attributes: &[String],
    ) -> SurveyResult<ColumnLayout> {
        let find = |name: &str| header.iter().position(|h| h.trim() == name.trim());
        let find_required = |name: &Option<String>| -> SurveyResult<Option<usize>> {
            match name {
                Some(n) => find(n.as_str())
                    .map(Some)
                    .context(MissingColumnSnafu { column: n, path }),
                None => Ok(None),
            }
        };
        let id = find_required(&cfs.id_column)?;
        let weight = find_required(&cfs.weight_column)?;

        let mut item_cols: Vec<(ItemId, usize)> = Vec::new();
        for item in items.iter() {
            match find(item.as_str()) {
                Some(idx) => item_cols.push((item.clone(), idx)),
                None => warn!("from_header: {}: no column for item {}", path, item),
            }
        }
        let mut attribute_cols: Vec<(String, usize)> = Vec::new();
        for attr in attributes.iter() {
            match find(attr.as_str()) {
                Some(idx) => attribute_cols.push((attr.clone(), idx)),
                None => warn!("from_header: {}: no column for attribute {}", path, attr),
            }
        }
        let layout = ColumnLayout {
            id,
            weight,
            items: item_cols,
            attributes: attribute_cols,
            missing_labels: cfs.missing_labels(),
        };
        debug!("from_header: {}: {:?}", path, layout);
        Ok(layout)
    }

    pub fn items(&self) -> Vec<ItemId> {
        self.items.iter().map(|(i, _)| i.clone()).collect()
    }

    pub fn attributes(&self) -> Vec<String> {
        self.attributes.iter().map(|(a, _)| a.clone()).collect()
    }

    /// True if the column at this index is read by `parse_record`.
    pub fn uses_column(&self, idx: usize) -> bool {
        self.id == Some(idx)
            || self.weight == Some(idx)
            || self.items.iter().any(|(_, i)| *i == idx)
            || self.attributes.iter().any(|(_, i)| *i == idx)
    }

    /// Parses one row of the file. `lineno` is the 1-based line (or row) number in the file.
    pub fn parse_record(
        &self,
        row: &[&str],
        lineno: usize,
        default_id: &impl Fn(usize) -> String,
    ) -> SurveyResult<ParsedRecord> {
        let cell = |idx: usize| get_cell(row, idx, lineno);
        let id = match self.id {
            Some(idx) if !cell(idx)?.trim().is_empty() => cell(idx)?.trim().to_string(),
            _ => default_id(lineno),
        };
        let weight = match self.weight {
            Some(idx) => parse_weight(cell(idx)?, lineno)?,
            None => 1.0,
        };
        let mut codes: Vec<Option<ResponseCode>> = Vec::with_capacity(self.items.len());
        for (item, idx) in self.items.iter() {
            codes.push(parse_code(cell(*idx)?, &self.missing_labels, lineno, item));
        }
        let mut attributes: Vec<Option<String>> = Vec::with_capacity(self.attributes.len());
        for (_, idx) in self.attributes.iter() {
            let v = cell(*idx)?.trim();
            attributes.push(if v.is_empty() {
                None
            } else {
                Some(v.to_string())
            });
        }
        Ok(ParsedRecord {
            id,
            weight,
            codes,
            attributes,
        })
    }
}

fn get_cell<'a>(row: &[&'a str], idx: usize, lineno: usize) -> SurveyResult<&'a str> {
    row.get(idx).copied().context(CsvLineTooShortSnafu { lineno })
}

/// Reads a response code. Blank cells, labels such as `X` ("no basis to judge") and
/// anything else that is not an integer are absent codes.
pub fn parse_code(
    cell: &str,
    missing_labels: &[String],
    lineno: usize,
    item: &ItemId,
) -> Option<ResponseCode> {
    let s = cell.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(c) = s.parse::<ResponseCode>() {
        return Some(c);
    }
    // Spreadsheets tend to export integers as 4.0
    if let Ok(f) = s.parse::<f64>() {
        if f.is_finite() && f.fract() == 0.0 {
            return Some(f as ResponseCode);
        }
    }
    if missing_labels.iter().any(|l| l.trim() == s) {
        debug!("parse_code: line {}: {}: missing label {:?}", lineno, item, s);
    } else {
        warn!(
            "parse_code: line {}: {}: could not read {:?}, treated as missing",
            lineno, item, s
        );
    }
    None
}

pub fn parse_weight(cell: &str, lineno: usize) -> SurveyResult<f64> {
    match cell.trim().parse::<f64>() {
        Ok(w) if w.is_finite() && w >= 0.0 => Ok(w),
        _ => InvalidWeightSnafu {
            lineno,
            value: cell,
        }
        .fail(),
    }
}

pub fn simplify_file_name(path: &str) -> String {
    Path::new(path)
        .file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| path.to_string())
}

pub fn make_default_id(path: &str) -> impl Fn(usize) -> String {
    let simplified_file_name = simplify_file_name(path);
    move |lineno| format!("{}-{:08}", simplified_file_name, lineno)
}
