use clap::Parser;

/// This is a tabulation program for the engagement items of employee surveys.
#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    /// (file path, optional) The file containing the description of the analysis, in JSON format.
    /// For more information about the file format, read the documentation of the manual.
    #[clap(short, long, value_parser)]
    pub config: Option<String>,
    /// (file path) A reference file containing the summary of an analysis in JSON format. If provided, fevstab will
    /// check that the computed summary matches the reference.
    #[clap(short, long, value_parser)]
    pub reference: Option<String>,

    /// (file path, 'stdout' or empty) If specified, the summary of the analysis will be written in JSON format to the given
    /// location. Setting this option overrides the path that may be specified with the --config option.
    #[clap(short, long, value_parser)]
    pub out: Option<String>,

    /// (file path or empty) The survey extract to read. Setting this option overrides the data sources
    /// that may be specified with the --config option.
    #[clap(short, long, value_parser)]
    pub input: Option<String>,

    /// (default csv) The type of the input: csv or xlsx.
    #[clap(long, value_parser)]
    pub input_type: Option<String>,

    /// (list of comma-separated values) The items to report, for example Q1,Q2,Q3. Overrides the items of the
    /// configuration. All the items use the scale given by --scale.
    #[clap(long, value_parser, value_delimiter = ',')]
    pub items: Option<Vec<String>>,

    /// (list of comma-separated values) The attributes to break the results down by (categorical
    /// grouping). Overrides the groupings of the configuration.
    #[clap(long, value_parser, value_delimiter = ',')]
    pub group_by: Option<Vec<String>>,

    /// (fraction, default 0.62) The reference positive rate.
    #[clap(long, value_parser)]
    pub baseline: Option<f64>,

    /// (fraction, default 0.70) The goal for the positive rate.
    #[clap(long, value_parser)]
    pub target: Option<f64>,

    /// (default agree-high) The scale of the items given with --items: agree-high or agree-low.
    #[clap(long, value_parser)]
    pub scale: Option<String>,

    /// (column name) The column containing the weight of each respondent.
    #[clap(long, value_parser)]
    pub weight_column: Option<String>,

    /// If passed as an argument, the rates and the means are weighted.
    #[clap(long, takes_value = false)]
    pub weighted: bool,

    /// (directory) If specified, the summary tables are also written as CSV files in this directory.
    #[clap(long, value_parser)]
    pub export_dir: Option<String>,

    // Other arguments
    /// If passed as an argument, will turn on verbose logging to the standard output.
    #[clap(long, takes_value = false)]
    pub verbose: bool,
}
