// Primitives for reading CSV files.

use std::fs::File;

use crate::survey::{
    io_common::{make_default_id, ColumnLayout, LoadedTable, ParsedRecord},
    *,
};

pub fn read_csv_survey(
    path: &str,
    cfs: &DataSource,
    items: &[ItemId],
    attributes: &[String],
) -> SurveyResult<LoadedTable> {
    let default_id = make_default_id(path);
    let mut records = get_records(path)?;

    let header: Vec<String> = match records.next() {
        Some(line_r) => line_r
            .context(CsvLineParseSnafu { lineno: 1_usize })?
            .iter()
            .map(|s| s.trim().to_string())
            .collect(),
        None => return MissingHeaderSnafu { path }.fail(),
    };
    debug!("read_csv_survey: header: {:?}", header);
    let layout = ColumnLayout::from_header(&header, path, cfs, items, attributes)?;

    let mut res: Vec<ParsedRecord> = Vec::new();
    for (idx, line_r) in records.enumerate() {
        // The header is on line 1.
        let lineno = idx + 2;
        let line = line_r.context(CsvLineParseSnafu { lineno })?;
        let cells: Vec<&str> = line.iter().collect();
        if cells.iter().all(|c| c.trim().is_empty()) {
            debug!("read_csv_survey: lineno: {}: empty line", lineno);
            continue;
        }
        let record = layout.parse_record(&cells, lineno, &default_id)?;
        debug!("read_csv_survey: lineno: {:?} record: {:?}", lineno, record);
        res.push(record);
    }
    info!("read_csv_survey: {}: {} records", path, res.len());
    Ok(LoadedTable {
        path: path.to_string(),
        items: layout.items(),
        attributes: layout.attributes(),
        records: res,
    })
}

fn get_records(path: &str) -> SurveyResult<csv::StringRecordsIntoIter<File>> {
    // The rows may be shorter than the header: this is checked for the requested columns only.
    let rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .context(CsvOpenSnafu { path })?;
    Ok(rdr.into_records())
}
