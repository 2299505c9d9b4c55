use log::{debug, info, warn};

use engagement_metrics::builder::DatasetBuilder;
pub use engagement_metrics::*;
use snafu::{prelude::*, Snafu};

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde_json::json;
use serde_json::Map as JSMap;
use serde_json::Value as JSValue;
use text_diff::print_diff;

use crate::args::Args;
use crate::survey::config_reader::*;
use crate::survey::io_common::LoadedTable;

pub mod config_reader;
pub mod export;
pub mod io_common;
pub mod io_csv;
pub mod io_excel;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum SurveyError {
    #[snafu(display("Error opening file {path}"))]
    OpeningJson {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error parsing JSON: {source}"))]
    ParsingJson { source: serde_json::Error },
    #[snafu(display("Could not read {field} as a number"))]
    ParsingJsonNumber { field: String },
    #[snafu(display("The configuration file has no parent directory"))]
    MissingParentDir {},

    #[snafu(display("Error opening CSV file {path}"))]
    CsvOpen { source: csv::Error, path: String },
    #[snafu(display("Error parsing CSV line {lineno}"))]
    CsvLineParse { source: csv::Error, lineno: usize },
    #[snafu(display("Line {lineno} is too short"))]
    CsvLineTooShort { lineno: usize },
    #[snafu(display("Error writing CSV file {path}"))]
    CsvWrite { source: csv::Error, path: String },

    #[snafu(display("Error opening Excel file {path}"))]
    OpeningExcel {
        source: calamine::XlsxError,
        path: String,
    },
    #[snafu(display("No worksheet found in {path}"))]
    EmptyExcel { path: String },

    #[snafu(display("{path} has no header row"))]
    MissingHeader { path: String },
    #[snafu(display("Column {column} not found in {path}"))]
    MissingColumn { column: String, path: String },
    #[snafu(display("Invalid weight {value:?} on line {lineno}"))]
    InvalidWeight { lineno: usize, value: String },
    #[snafu(display("{path} does not have the same columns as {first}"))]
    SchemaMismatch { path: String, first: String },

    #[snafu(display("{source}"))]
    Metrics { source: MetricsError },

    #[snafu(display("Error writing {path}"))]
    WritingOutput {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Difference detected between calculated summary and reference summary"))]
    ReferenceMismatch {},

    #[snafu(whatever, display("{message}"))]
    Whatever {
        message: String,
        #[snafu(source(from(Box<dyn std::error::Error>, Some)))]
        source: Option<Box<dyn std::error::Error>>,
    },
}

pub type SurveyResult<T> = Result<T, SurveyError>;

/// Everything computed for one configuration.
#[derive(PartialEq, Debug, Clone)]
pub struct Tabulation {
    pub rules: EngagementRules,
    pub result: EngagementResult,
    pub indicators: Vec<(IndicatorConfig, Option<IndicatorRate>)>,
}

pub fn fmt_rate(x: f64) -> String {
    format!("{:.4}", x)
}

/// Percentage points and mean scores.
pub fn fmt_points(x: f64) -> String {
    format!("{:.2}", x)
}

pub fn standing_name(standing: Standing) -> &'static str {
    match standing {
        Standing::BelowBaseline => "belowBaseline",
        Standing::MeetsBaseline => "meetsBaseline",
        Standing::MeetsTarget => "meetsTarget",
    }
}

fn read_source(
    cfs: &DataSource,
    items: &[ItemId],
    attributes: &[String],
) -> SurveyResult<LoadedTable> {
    info!("Attempting to read survey file {:?}", cfs.file_path);
    match cfs.provider.as_str() {
        "csv" => io_csv::read_csv_survey(&cfs.file_path, cfs, items, attributes),
        "xlsx" | "excel" => io_excel::read_excel_survey(&cfs.file_path, cfs, items, attributes),
        x => whatever!("Provider not implemented {:?}", x),
    }
}

/// Loads all the data sources into one dataset. The sources must all provide the same columns.
fn read_survey_data(
    config: &SurveyConfig,
    items: &[ItemId],
    attributes: &[String],
) -> SurveyResult<Dataset> {
    let mut tables: Vec<LoadedTable> = Vec::new();
    for cfs in config.data_sources.iter() {
        tables.push(read_source(cfs, items, attributes)?);
    }
    let first = match tables.first() {
        Some(t) => t,
        None => whatever!("No data source"),
    };
    let mut builder =
        DatasetBuilder::new(&first.items, &first.attributes).context(MetricsSnafu {})?;
    for table in tables.iter() {
        if table.items != first.items || table.attributes != first.attributes {
            return SchemaMismatchSnafu {
                path: table.path.clone(),
                first: first.path.clone(),
            }
            .fail();
        }
        for r in table.records.iter() {
            builder
                .add_weighted_record(&r.id, r.weight, &r.codes, &r.attributes)
                .context(MetricsSnafu {})?;
        }
    }
    let dataset = builder.build();
    info!(
        "read_survey_data: {} records from {} sources",
        dataset.len(),
        tables.len()
    );
    Ok(dataset)
}

/// Runs the analysis described by a configuration.
pub fn tabulate(config: &SurveyConfig) -> SurveyResult<Tabulation> {
    let rules = config
        .rules
        .clone()
        .unwrap_or_default()
        .engagement_rules()?;
    let scales = item_scales(config)?;
    let mut groupings: Vec<Grouping> = Vec::new();
    for gc in config.groupings.iter() {
        groupings.push(gc.grouping()?);
    }
    let items: Vec<ItemId> = scales.keys().cloned().collect();
    let attributes = required_attributes(config);
    debug!("tabulate: items: {:?} attributes: {:?}", items, attributes);

    let dataset = read_survey_data(config, &items, &attributes)?;

    let result =
        run_engagement_stats(&dataset, &scales, &groupings, &rules).context(MetricsSnafu {})?;

    let mut indicators: Vec<(IndicatorConfig, Option<IndicatorRate>)> = Vec::new();
    for ic in config.indicators.iter() {
        let rate = indicator_rate(&dataset, &ic.attribute, &ic.values, &rules)
            .context(MetricsSnafu {})?;
        match &rate {
            Some(r) => info!(
                "{}: {:.1}% of {} respondents",
                ic.label.as_deref().unwrap_or(&ic.attribute),
                r.rate * 100.0,
                r.respondents
            ),
            None => warn!("tabulate: no respondent for indicator {}", ic.attribute),
        }
        indicators.push((ic.clone(), rate));
    }
    Ok(Tabulation {
        rules,
        result,
        indicators,
    })
}

fn descriptions(config: &SurveyConfig) -> BTreeMap<ItemId, String> {
    config
        .items
        .iter()
        .filter_map(|ic| {
            ic.description
                .clone()
                .map(|d| (ItemId::from(ic.id.trim()), d))
        })
        .collect()
}

fn summary_row_js(row: &SummaryRow) -> JSMap<String, JSValue> {
    let m = &row.metric;
    let mut js: JSMap<String, JSValue> = JSMap::new();
    js.insert("rank".to_string(), json!(row.rank));
    js.insert("item".to_string(), json!(m.item.to_string()));
    js.insert("positiveRate".to_string(), json!(fmt_rate(m.positive_rate)));
    js.insert("meanScore".to_string(), json!(fmt_points(m.mean_score)));
    js.insert("responses".to_string(), json!(m.response_count.to_string()));
    js.insert("deltaPoints".to_string(), json!(fmt_points(row.delta_points())));
    js.insert("belowBaseline".to_string(), json!(row.below_baseline));
    js
}

fn build_summary_js(config: &SurveyConfig, tab: &Tabulation) -> JSValue {
    let result = &tab.result;
    let descriptions = descriptions(config);

    let results: Vec<JSValue> = result
        .summary
        .iter()
        .map(|row| {
            let mut js = summary_row_js(row);
            let m = &row.metric;
            if let Some(d) = descriptions.get(&m.item) {
                js.insert("description".to_string(), json!(d));
            }
            js.insert("neutralRate".to_string(), json!(fmt_rate(m.neutral_rate)));
            js.insert("negativeRate".to_string(), json!(fmt_rate(m.negative_rate)));
            js.insert("standing".to_string(), json!(standing_name(row.standing)));
            JSValue::Object(js)
        })
        .collect();

    let index = match &result.index {
        Some(idx) => json!({
            "positiveRate": fmt_rate(idx.mean_positive_rate),
            "deltaPoints": fmt_points(idx.delta * 100.0),
            "belowBaseline": idx.below_baseline,
            "items": idx.num_items.to_string(),
            "highest": idx.highest.to_string(),
            "priorityItems": idx
                .priority_items
                .iter()
                .map(|i| i.to_string())
                .collect::<Vec<String>>(),
        }),
        None => JSValue::Null,
    };

    let comparisons: Vec<JSValue> = result
        .comparisons
        .iter()
        .map(|c| {
            let rows: Vec<JSValue> = c
                .rows
                .iter()
                .map(|row| {
                    let mut js = summary_row_js(row);
                    js.insert("group".to_string(), json!(row.metric.group.to_string()));
                    JSValue::Object(js)
                })
                .collect();
            let groups: Vec<JSValue> = c
                .groups
                .iter()
                .map(|ge| {
                    json!({
                        "group": ge.group.to_string(),
                        "positiveRate": fmt_rate(ge.avg_positive_rate),
                        "respondents": ge.respondents.to_string(),
                        "items": ge.items_reported.to_string(),
                    })
                })
                .collect();
            json!({
                "attribute": c.attribute,
                "excludedRecords": c.aggregation.excluded_records.to_string(),
                "omittedPairs": c.aggregation.omitted_pairs.to_string(),
                "groups": groups,
                "rows": rows,
            })
        })
        .collect();

    let indicators: Vec<JSValue> = tab
        .indicators
        .iter()
        .map(|(ic, rate)| {
            json!({
                "attribute": ic.attribute,
                "label": ic.label.clone().unwrap_or_else(|| ic.attribute.clone()),
                "rate": rate.as_ref().map(|r| fmt_rate(r.rate)),
                "respondents": rate.as_ref().map(|r| r.respondents).unwrap_or(0).to_string(),
            })
        })
        .collect();

    json!({
        "config": {
            "survey": config.output_settings.survey_name,
            "year": config.output_settings.survey_year,
            "baseline": fmt_rate(tab.rules.baseline),
            "target": tab.rules.target.map(fmt_rate),
            "weighted": tab.rules.weighted,
        },
        "respondents": result.respondents.to_string(),
        "dataQuality": {
            "outOfRangeCodes": result.overall.out_of_range_codes.to_string(),
            "omittedPairs": result.overall.omitted_pairs.to_string(),
        },
        "results": results,
        "engagementIndex": index,
        "comparisons": comparisons,
        "indicators": indicators,
    })
}

fn write_output(path: &str, contents: &str) -> SurveyResult<()> {
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).context(WritingOutputSnafu { path })?;
        }
    }
    fs::write(path, contents).context(WritingOutputSnafu { path })?;
    info!("Summary written to {}", path);
    Ok(())
}

/// Runs a configuration and writes its outputs.
///
/// Arguments:
/// * `out` where to write the JSON summary: a path or `stdout`. Defaults to `summary.json` in the
/// output directory of the configuration, if any.
/// * `export_dir` where to write the CSV tables. Defaults to the output directory of the
/// configuration, if any.
/// * `check_summary_path` a reference summary. The run fails if the computed summary differs.
pub fn run_survey(
    config: &SurveyConfig,
    out: Option<String>,
    export_dir: Option<String>,
    check_summary_path: Option<String>,
) -> SurveyResult<JSValue> {
    info!("run_survey: {:?}", config.output_settings);
    let tab = tabulate(config)?;

    // Assemble the final json
    let result_js = build_summary_js(config, &tab);
    let pretty_js_stats = serde_json::to_string_pretty(&result_js).context(ParsingJsonSnafu {})?;

    let output_dir = config.output_settings.output_directory.clone();
    let out_path = out.or_else(|| {
        output_dir.as_ref().map(|d| {
            let p: PathBuf = [d.as_str(), "summary.json"].iter().collect();
            p.as_path().display().to_string()
        })
    });
    match out_path.as_deref() {
        Some("stdout") => println!("{}", pretty_js_stats),
        Some(p) => write_output(p, &pretty_js_stats)?,
        None => debug!("run_survey: no output requested"),
    }
    if let Some(dir) = export_dir.or(output_dir) {
        export::write_tables(&dir, &tab.result, &descriptions(config))?;
    }

    // The reference summary, if provided for comparison
    if let Some(summary_p) = check_summary_path {
        let summary_ref = read_summary(&summary_p)?;
        let pretty_js_summary_ref =
            serde_json::to_string_pretty(&summary_ref).context(ParsingJsonSnafu {})?;
        if pretty_js_summary_ref != pretty_js_stats {
            warn!("Found differences with the reference string");
            print_diff(
                pretty_js_summary_ref.as_str(),
                pretty_js_stats.as_ref(),
                "\n",
            );
            return ReferenceMismatchSnafu {}.fail();
        }
        info!("run_survey: summary matches the reference {}", summary_p);
    }
    Ok(result_js)
}

/// The entry point of the command line.
pub fn run(args: &Args) -> SurveyResult<()> {
    let config = match &args.config {
        Some(p) => read_config(p)?,
        None => SurveyConfig::default(),
    };
    let config = merge_args(config, args)?;
    run_survey(
        &config,
        args.out.clone(),
        args.export_dir.clone(),
        args.reference.clone(),
    )?;
    Ok(())
}

#[cfg(test)]
fn run_survey_test(
    test_name: &str,
    config_lpath: &str,
    summary_lpath: &str,
) -> SurveyResult<JSValue> {
    let test_dir = option_env!("FEVS_TEST_DIR")
        .unwrap_or(concat!(env!("CARGO_MANIFEST_DIR"), "/tests"))
        .to_string();
    info!("Running test {}", test_name);
    let config = read_config(&format!("{}/{}/{}", test_dir, test_name, config_lpath))?;
    run_survey(
        &config,
        None,
        None,
        Some(format!("{}/{}/{}", test_dir, test_name, summary_lpath)),
    )
}

#[cfg(test)]
pub fn test_wrapper(test_name: &str) {
    let res = run_survey_test(
        test_name,
        format!("{}_config.json", test_name).as_str(),
        format!("{}_expected_summary.json", test_name).as_str(),
    );
    if let Err(e) = res {
        panic!("test {} failed: {}", test_name, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_args() -> Args {
        Args {
            config: None,
            reference: None,
            out: None,
            input: None,
            input_type: None,
            items: None,
            group_by: None,
            baseline: None,
            target: None,
            scale: None,
            weight_column: None,
            weighted: false,
            export_dir: None,
            verbose: false,
        }
    }

    fn test_config(name: &str) -> SurveyConfig {
        read_config(&format!(
            "{}/tests/{}/{}_config.json",
            env!("CARGO_MANIFEST_DIR"),
            name,
            name
        ))
        .unwrap()
    }

    #[test]
    fn small_survey() {
        test_wrapper("small_survey");
    }

    #[test]
    fn small_survey_xlsx() {
        test_wrapper("small_survey_xlsx");
    }

    #[test]
    fn weighted_survey() {
        test_wrapper("weighted_survey");
    }

    #[test]
    fn missing_item() {
        let res = run_survey_test(
            "missing_item",
            "missing_item_config.json",
            "missing_item_expected_summary.json",
        );
        match res {
            Err(SurveyError::Metrics {
                source: MetricsError::Schema { name, kind },
            }) => {
                assert_eq!(name, "Q99");
                assert_eq!(kind, SchemaKind::Item);
            }
            x => panic!("unexpected result {:?}", x),
        }
    }

    #[test]
    fn reference_mismatch() {
        let res = run_survey_test(
            "small_survey",
            "small_survey_config.json",
            "../weighted_survey/weighted_survey_expected_summary.json",
        );
        assert!(matches!(res, Err(SurveyError::ReferenceMismatch {})));
    }

    #[test]
    fn command_line_overrides_the_config() {
        let mut args = test_args();
        args.items = Some(vec!["Q3".to_string(), "Q1".to_string()]);
        args.scale = Some("agree-low".to_string());
        args.group_by = Some(vec!["DSUPER".to_string()]);
        args.baseline = Some(0.5);
        args.weighted = true;
        let config = merge_args(test_config("small_survey"), &args).unwrap();
        assert_eq!(config.items.len(), 2);
        assert_eq!(config.items[0].scale, Some("agree-low".to_string()));
        assert_eq!(config.groupings.len(), 1);
        // The data source of the configuration is kept.
        assert_eq!(config.data_sources.len(), 1);
        let rules = config.rules.clone().unwrap().engagement_rules().unwrap();
        assert_eq!(rules.baseline, 0.5);
        assert!(rules.weighted);

        let tab = tabulate(&config).unwrap();
        assert_eq!(tab.result.summary.len(), 2);
        assert_eq!(tab.result.comparisons[0].attribute, "DSUPER");
    }

    #[test]
    fn command_line_only() {
        let mut args = test_args();
        args.input = Some(format!(
            "{}/tests/small_survey/small_survey.csv",
            env!("CARGO_MANIFEST_DIR")
        ));
        args.items = Some(vec!["Q1".to_string(), "Q2".to_string()]);
        let config = merge_args(SurveyConfig::default(), &args).unwrap();
        assert_eq!(config.data_sources[0].provider, "csv");
        let tab = tabulate(&config).unwrap();
        assert_eq!(tab.result.respondents, 10);
        assert!(tab.result.comparisons.is_empty());

        assert!(merge_args(SurveyConfig::default(), &test_args()).is_err());
    }

    #[test]
    fn formatting() {
        assert_eq!(fmt_rate(4.0 / 9.0), "0.4444");
        assert_eq!(fmt_points((4.0 / 9.0 - 0.62) * 100.0), "-17.56");
        assert_eq!(standing_name(Standing::MeetsBaseline), "meetsBaseline");
    }
}
