use crate::survey::*;

use serde::{Deserialize, Serialize};
use serde_json::Value as JSValue;
use std::collections::BTreeMap;

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize, Default)]
pub struct OutputSettings {
    #[serde(rename = "surveyName")]
    pub survey_name: Option<String>,
    #[serde(rename = "surveyYear")]
    pub survey_year: Option<String>,
    #[serde(rename = "outputDirectory")]
    pub output_directory: Option<String>,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct DataSource {
    pub provider: String,
    #[serde(rename = "filePath")]
    pub file_path: String,
    #[serde(rename = "idColumn")]
    pub id_column: Option<String>,
    #[serde(rename = "weightColumn")]
    pub weight_column: Option<String>,
    #[serde(rename = "missingLabels")]
    pub missing_labels: Option<Vec<String>>,
    // Only for Excel inputs
    #[serde(rename = "excelWorksheetName")]
    pub excel_worksheet_name: Option<String>,
}

impl DataSource {
    pub fn missing_labels(&self) -> Vec<String> {
        self.missing_labels.clone().unwrap_or_default()
    }
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct ScaleConfig {
    pub name: String,
    #[serde(rename = "minCode")]
    pub min_code: ResponseCode,
    #[serde(rename = "maxCode")]
    pub max_code: ResponseCode,
    pub positive: Vec<ResponseCode>,
    pub neutral: Vec<ResponseCode>,
    pub negative: Vec<ResponseCode>,
    pub missing: Option<Vec<ResponseCode>>,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct ItemConfig {
    pub id: String,
    pub description: Option<String>,
    pub scale: Option<String>,
}

#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct BandConfig {
    pub lower: Option<f64>,
    pub upper: Option<f64>,
    pub label: String,
}

#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct GroupingConfig {
    pub attribute: String,
    pub labels: Option<BTreeMap<String, String>>,
    pub bands: Option<Vec<BandConfig>>,
    pub boundary: Option<String>,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct IndicatorConfig {
    pub attribute: String,
    pub values: Vec<String>,
    pub label: Option<String>,
}

#[derive(PartialEq, Debug, Clone, Serialize, Deserialize, Default)]
pub struct RulesConfig {
    pub baseline: Option<JSValue>,
    pub target: Option<JSValue>,
    pub weighted: Option<bool>,
    #[serde(rename = "priorityCount")]
    pub priority_count: Option<JSValue>,
}

#[derive(PartialEq, Debug, Clone, Serialize, Deserialize, Default)]
pub struct SurveyConfig {
    #[serde(rename = "outputSettings", default)]
    pub output_settings: OutputSettings,
    #[serde(rename = "dataSources", default)]
    pub data_sources: Vec<DataSource>,
    #[serde(default)]
    pub scales: Vec<ScaleConfig>,
    #[serde(default)]
    pub items: Vec<ItemConfig>,
    #[serde(default)]
    pub groupings: Vec<GroupingConfig>,
    #[serde(default)]
    pub indicators: Vec<IndicatorConfig>,
    pub rules: Option<RulesConfig>,
}

pub const DEFAULT_SCALE: &str = "agree-high";

/// Reads a configuration file. The relative paths it contains are resolved against the
/// directory of the file.
pub fn read_config(path: &str) -> SurveyResult<SurveyConfig> {
    let contents = fs::read_to_string(path).context(OpeningJsonSnafu { path })?;
    let mut config: SurveyConfig =
        serde_json::from_str(contents.as_str()).context(ParsingJsonSnafu {})?;
    let root_p = Path::new(path).parent().context(MissingParentDirSnafu {})?;
    for cfs in config.data_sources.iter_mut() {
        cfs.file_path = resolve(root_p, &cfs.file_path);
    }
    if let Some(dir) = config.output_settings.output_directory.clone() {
        config.output_settings.output_directory = Some(resolve(root_p, &dir));
    }
    debug!("read_config: {:?}", config);
    Ok(config)
}

fn resolve(root_p: &Path, path: &str) -> String {
    let p: PathBuf = [root_p, Path::new(path)].iter().collect();
    p.as_path().display().to_string()
}

/// Applies the command line options on top of the configuration.
pub fn merge_args(config: SurveyConfig, args: &Args) -> SurveyResult<SurveyConfig> {
    let mut c = config;
    if let Some(input) = &args.input {
        let provider = match (&args.input_type, input.to_lowercase().ends_with(".xlsx")) {
            (Some(t), _) => t.clone(),
            (None, true) => "xlsx".to_string(),
            (None, false) => "csv".to_string(),
        };
        // Keep the column settings of the configuration, if any.
        let mut cfs = c.data_sources.first().cloned().unwrap_or(DataSource {
            provider: provider.clone(),
            file_path: input.clone(),
            id_column: None,
            weight_column: None,
            missing_labels: None,
            excel_worksheet_name: None,
        });
        cfs.provider = provider;
        cfs.file_path = input.clone();
        c.data_sources = vec![cfs];
    } else if let Some(t) = &args.input_type {
        for cfs in c.data_sources.iter_mut() {
            cfs.provider = t.clone();
        }
    }
    if let Some(wc) = &args.weight_column {
        for cfs in c.data_sources.iter_mut() {
            cfs.weight_column = Some(wc.clone());
        }
    }
    if let Some(items) = &args.items {
        c.items = items
            .iter()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(|s| ItemConfig {
                id: s.to_string(),
                description: None,
                scale: args.scale.clone(),
            })
            .collect();
    } else if args.scale.is_some() {
        warn!("merge_args: --scale only applies to the items passed with --items");
    }
    if let Some(attrs) = &args.group_by {
        c.groupings = attrs
            .iter()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(|s| GroupingConfig {
                attribute: s.to_string(),
                labels: None,
                bands: None,
                boundary: None,
            })
            .collect();
    }
    let mut rules = c.rules.clone().unwrap_or_default();
    if let Some(b) = args.baseline {
        rules.baseline = Some(json!(b));
    }
    if let Some(t) = args.target {
        rules.target = Some(json!(t));
    }
    if args.weighted {
        rules.weighted = Some(true);
    }
    c.rules = Some(rules);

    if c.data_sources.is_empty() {
        whatever!("No data source: pass --input or a configuration file with dataSources")
    }
    if c.items.is_empty() {
        whatever!("No item to report: pass --items or a configuration file with items")
    }
    Ok(c)
}

impl RulesConfig {
    pub fn engagement_rules(&self) -> SurveyResult<EngagementRules> {
        let defaults = EngagementRules::DEFAULT_RULES;
        let baseline = read_js_float(&self.baseline, "baseline")?.unwrap_or(defaults.baseline);
        let rules = EngagementRules {
            baseline,
            // The default target is dropped when the baseline is set above it.
            target: match read_js_float(&self.target, "target")? {
                Some(t) => Some(t),
                None => defaults.target.filter(|t| *t >= baseline),
            },
            weighted: self.weighted.unwrap_or(defaults.weighted),
            priority_count: read_js_int(&self.priority_count, "priorityCount")?
                .unwrap_or(defaults.priority_count),
        };
        rules.validate().context(MetricsSnafu {})?;
        Ok(rules)
    }
}

fn builtin_scale(name: &str) -> Option<ItemScale> {
    match name {
        "agree-high" => Some(ItemScale::agree_high()),
        "agree-low" => Some(ItemScale::agree_low()),
        _ => None,
    }
}

/// The scale of every item of the configuration.
pub fn item_scales(config: &SurveyConfig) -> SurveyResult<ScaleMap> {
    let mut named: BTreeMap<String, ItemScale> = BTreeMap::new();
    for sc in config.scales.iter() {
        let scale = ItemScale::new(
            &sc.name,
            sc.min_code..=sc.max_code,
            &sc.positive,
            &sc.neutral,
            &sc.negative,
            &sc.missing.clone().unwrap_or_default(),
        )
        .context(MetricsSnafu {})?;
        if named.insert(sc.name.clone(), scale).is_some() {
            whatever!("Scale {} is defined twice", sc.name)
        }
    }

    let mut res: ScaleMap = ScaleMap::new();
    for ic in config.items.iter() {
        let scale_name = ic.scale.clone().unwrap_or_else(|| DEFAULT_SCALE.to_string());
        let scale = match named.get(&scale_name).cloned().or_else(|| builtin_scale(&scale_name)) {
            Some(s) => s,
            None => whatever!("Unknown scale {:?} for item {}", scale_name, ic.id),
        };
        if res.insert(ItemId::from(ic.id.trim()), scale).is_some() {
            whatever!("Item {} is listed twice", ic.id)
        }
    }
    Ok(res)
}

impl GroupingConfig {
    pub fn grouping(&self) -> SurveyResult<Grouping> {
        match (&self.bands, &self.labels) {
            (Some(_), Some(_)) => {
                whatever!(
                    "Grouping {}: labels and bands cannot be used together",
                    self.attribute
                )
            }
            (Some(bands), None) => {
                let boundary = match self.boundary.as_deref() {
                    None | Some("lowerInclusive") => BoundaryMode::LowerInclusive,
                    Some("upperInclusive") => BoundaryMode::UpperInclusive,
                    Some(x) => whatever!("Unknown boundary mode {:?} for {}", x, self.attribute),
                };
                let size_bands: Vec<SizeBand> = bands
                    .iter()
                    .map(|b| SizeBand::new(b.lower, b.upper, &b.label))
                    .collect();
                Grouping::banded(&self.attribute, size_bands, boundary).context(MetricsSnafu {})
            }
            (None, labels) => {
                if self.boundary.is_some() {
                    warn!(
                        "grouping: {}: boundary is ignored without bands",
                        self.attribute
                    );
                }
                Ok(Grouping {
                    attribute: self.attribute.clone(),
                    rule: GroupRule::Categorical {
                        labels: labels.clone().unwrap_or_default(),
                    },
                })
            }
        }
    }
}

/// The attribute columns needed by the groupings and the indicators, without duplicates.
pub fn required_attributes(config: &SurveyConfig) -> Vec<String> {
    let mut res: Vec<String> = Vec::new();
    let names = config
        .groupings
        .iter()
        .map(|g| &g.attribute)
        .chain(config.indicators.iter().map(|i| &i.attribute));
    for name in names {
        if !res.contains(name) {
            res.push(name.clone());
        }
    }
    res
}

pub fn read_summary(path: &str) -> SurveyResult<JSValue> {
    let contents = fs::read_to_string(path).context(OpeningJsonSnafu { path })?;
    let js: JSValue = serde_json::from_str(contents.as_str()).context(ParsingJsonSnafu {})?;
    Ok(js)
}

fn read_js_float(x: &Option<JSValue>, field: &str) -> SurveyResult<Option<f64>> {
    match x {
        None | Some(JSValue::Null) => Ok(None),
        Some(JSValue::Number(n)) => n
            .as_f64()
            .map(Some)
            .context(ParsingJsonNumberSnafu { field }),
        Some(JSValue::String(s)) => s
            .trim()
            .parse::<f64>()
            .ok()
            .map(Some)
            .context(ParsingJsonNumberSnafu { field }),
        _ => None.context(ParsingJsonNumberSnafu { field }),
    }
}

fn read_js_int(x: &Option<JSValue>, field: &str) -> SurveyResult<Option<usize>> {
    match x {
        None | Some(JSValue::Null) => Ok(None),
        Some(JSValue::Number(n)) => n
            .as_u64()
            .map(|x| Some(x as usize))
            .context(ParsingJsonNumberSnafu { field }),
        Some(JSValue::String(s)) => s
            .trim()
            .parse::<usize>()
            .ok()
            .map(Some)
            .context(ParsingJsonNumberSnafu { field }),
        _ => None.context(ParsingJsonNumberSnafu { field }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(s: &str) -> SurveyConfig {
        serde_json::from_str(s).unwrap()
    }

    #[test]
    fn numbers_as_strings_or_numbers() {
        let c = parse(r#"{"rules": {"baseline": "0.5", "target": 0.75, "priorityCount": "3"}}"#);
        let rules = c.rules.unwrap().engagement_rules().unwrap();
        assert_eq!(rules.baseline, 0.5);
        assert_eq!(rules.target, Some(0.75));
        assert_eq!(rules.priority_count, 3);
        assert!(!rules.weighted);

        let c = parse(r#"{"rules": {"baseline": "high"}}"#);
        assert!(c.rules.unwrap().engagement_rules().is_err());
        let c = parse(r#"{"rules": {"baseline": 1.5}}"#);
        assert!(matches!(
            c.rules.unwrap().engagement_rules(),
            Err(SurveyError::Metrics { .. })
        ));
    }

    #[test]
    fn scales_are_resolved_by_name() {
        let c = parse(
            r#"{
            "scales": [{"name": "yes-no", "minCode": 1, "maxCode": 2,
                        "positive": [1], "neutral": [], "negative": [2], "missing": [8]}],
            "items": [{"id": "Q1"}, {"id": "Q2", "scale": "agree-low"}, {"id": "Q3", "scale": "yes-no"}]
        }"#,
        );
        let scales = item_scales(&c).unwrap();
        assert_eq!(scales[&ItemId::from("Q1")].name(), "agree-high");
        assert_eq!(scales[&ItemId::from("Q2")].name(), "agree-low");
        assert_eq!(scales[&ItemId::from("Q3")].name(), "yes-no");

        let c = parse(r#"{"items": [{"id": "Q1", "scale": "unknown"}]}"#);
        assert!(item_scales(&c).is_err());
        let c = parse(r#"{"items": [{"id": "Q1"}, {"id": "Q1"}]}"#);
        assert!(item_scales(&c).is_err());
    }

    #[test]
    fn groupings() {
        let c = parse(
            r#"{"groupings": [
            {"attribute": "DSUPER", "labels": {"A": "Non-supervisor"}},
            {"attribute": "DAGENCYSZ", "boundary": "upperInclusive",
             "bands": [{"upper": 100, "label": "small"}, {"lower": 100, "label": "large"}]},
            {"attribute": "DSEX", "boundary": "sideways", "bands": [{"label": "all"}]}
        ]}"#,
        );
        let g0 = c.groupings[0].grouping().unwrap();
        assert_eq!(
            g0.group_of(Some("A")),
            Some(GroupKey::Group("Non-supervisor".to_string()))
        );
        let g1 = c.groupings[1].grouping().unwrap();
        assert_eq!(
            g1.group_of(Some("100")),
            Some(GroupKey::Group("small".to_string()))
        );
        assert!(c.groupings[2].grouping().is_err());
        assert_eq!(
            required_attributes(&c),
            vec!["DSUPER".to_string(), "DAGENCYSZ".to_string(), "DSEX".to_string()]
        );
    }
}
