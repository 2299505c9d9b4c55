// Reading the survey from an Excel (.xlsx) workbook.

use calamine::{open_workbook, DataType, Reader, Xlsx};

use crate::survey::{
    io_common::{make_default_id, ColumnLayout, LoadedTable, ParsedRecord},
    *,
};

pub fn read_excel_survey(
    path: &str,
    cfs: &DataSource,
    items: &[ItemId],
    attributes: &[String],
) -> SurveyResult<LoadedTable> {
    let default_id = make_default_id(path);
    let wrange = get_range(path, cfs)?;

    let mut iter = wrange.rows();
    let header_cells = iter.next().context(MissingHeaderSnafu { path })?;
    let mut header: Vec<String> = Vec::with_capacity(header_cells.len());
    for cell in header_cells.iter() {
        header.push(cell_text(cell, 1).trim().to_string());
    }
    debug!("read_excel_survey: header: {:?}", header);
    let layout = ColumnLayout::from_header(&header, path, cfs, items, attributes)?;

    let mut res: Vec<ParsedRecord> = Vec::new();
    for (idx, row) in iter.enumerate() {
        // Same numbering as in the spreadsheet: the header is row 1.
        let lineno = idx + 2;
        if row.iter().all(is_blank) {
            continue;
        }
        // Only the requested columns are read, the others stay blank.
        let mut texts: Vec<String> = Vec::with_capacity(row.len());
        for (col, cell) in row.iter().enumerate() {
            texts.push(if layout.uses_column(col) {
                cell_text(cell, lineno)
            } else {
                String::new()
            });
        }
        let cells: Vec<&str> = texts.iter().map(|s| s.as_str()).collect();
        let record = layout.parse_record(&cells, lineno, &default_id)?;
        debug!("read_excel_survey: lineno: {:?} record: {:?}", lineno, record);
        res.push(record);
    }
    info!("read_excel_survey: {}: {} records", path, res.len());
    Ok(LoadedTable {
        path: path.to_string(),
        items: layout.items(),
        attributes: layout.attributes(),
        records: res,
    })
}

fn is_blank(cell: &DataType) -> bool {
    match cell {
        DataType::Empty => true,
        DataType::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

fn cell_text(cell: &DataType, lineno: usize) -> String {
    match cell {
        DataType::Empty => String::new(),
        DataType::String(s) => s.clone(),
        DataType::Int(i) => i.to_string(),
        // Integral floats are printed without decimals.
        DataType::Float(f) => f.to_string(),
        DataType::Bool(b) => b.to_string(),
        // Dates are kept as their serial number.
        DataType::DateTime(f) => f.to_string(),
        other => {
            warn!(
                "cell_text: row {}: could not read {:?}, treated as missing",
                lineno, other
            );
            String::new()
        }
    }
}

fn get_range(path: &str, cfs: &DataSource) -> SurveyResult<calamine::Range<DataType>> {
    debug!(
        "get_range: path: {:?} worksheet: {:?}",
        path, &cfs.excel_worksheet_name
    );
    let mut workbook: Xlsx<_> = open_workbook(path).context(OpeningExcelSnafu { path })?;

    let wrange = match &cfs.excel_worksheet_name {
        // A worksheet name was provided, use it.
        Some(worksheet_name) => workbook.worksheet_range(worksheet_name),
        None => workbook.worksheet_range_at(0),
    };
    wrange
        .context(EmptyExcelSnafu { path })?
        .context(OpeningExcelSnafu { path })
}
