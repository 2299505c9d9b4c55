// Writing the result tables as CSV files.

use std::fs::File;

use crate::survey::*;

pub const ENGAGEMENT_SUMMARY_FILE: &str = "engagement_summary.csv";
pub const GROUP_COMPARISON_FILE: &str = "group_comparison.csv";
pub const GROUP_ENGAGEMENT_FILE: &str = "group_engagement.csv";

/// Writes the engagement summary, the group comparison and the group engagement tables
/// in the given directory, which is created if needed.
///
/// The tables are written under a temporary name and renamed once all three are complete:
/// after a failure, no new table is left in the directory.
pub fn write_tables(
    dir: &str,
    result: &EngagementResult,
    descriptions: &BTreeMap<ItemId, String>,
) -> SurveyResult<Vec<String>> {
    fs::create_dir_all(dir).context(WritingOutputSnafu { path: dir })?;
    let paths: Vec<String> = [
        ENGAGEMENT_SUMMARY_FILE,
        GROUP_COMPARISON_FILE,
        GROUP_ENGAGEMENT_FILE,
    ]
    .iter()
    .map(|f| output_path(dir, f))
    .collect();
    let tmp_paths: Vec<String> = paths.iter().map(|p| format!("{}.tmp", p)).collect();

    let written = write_engagement_summary(&tmp_paths[0], &result.summary, descriptions)
        .and_then(|_| write_group_comparison(&tmp_paths[1], &result.comparisons))
        .and_then(|_| write_group_engagement(&tmp_paths[2], &result.comparisons));
    if let Err(e) = written {
        for p in tmp_paths.iter() {
            if fs::remove_file(p).is_ok() {
                debug!("write_tables: removed {}", p);
            }
        }
        return Err(e);
    }
    for (tmp_p, p) in tmp_paths.iter().zip(paths.iter()) {
        fs::rename(tmp_p, p).context(WritingOutputSnafu { path: p.as_str() })?;
    }
    info!("write_tables: tables written in {}", dir);
    Ok(paths)
}

fn output_path(dir: &str, file_name: &str) -> String {
    let p: PathBuf = [dir, file_name].iter().collect();
    p.as_path().display().to_string()
}

fn writer(path: &str) -> SurveyResult<csv::Writer<File>> {
    csv::Writer::from_path(path).context(CsvWriteSnafu { path })
}

fn write_engagement_summary(
    path: &str,
    rows: &[SummaryRow],
    descriptions: &BTreeMap<ItemId, String>,
) -> SurveyResult<()> {
    let mut wtr = writer(path)?;
    wtr.write_record([
        "rank",
        "item",
        "description",
        "positive_rate",
        "neutral_rate",
        "negative_rate",
        "mean_score",
        "responses",
        "delta_points",
        "below_baseline",
        "standing",
    ])
    .context(CsvWriteSnafu { path })?;
    for row in rows.iter() {
        let m = &row.metric;
        wtr.write_record([
            row.rank.to_string(),
            m.item.to_string(),
            descriptions.get(&m.item).cloned().unwrap_or_default(),
            fmt_rate(m.positive_rate),
            fmt_rate(m.neutral_rate),
            fmt_rate(m.negative_rate),
            fmt_points(m.mean_score),
            m.response_count.to_string(),
            fmt_points(row.delta_points()),
            row.below_baseline.to_string(),
            standing_name(row.standing).to_string(),
        ])
        .context(CsvWriteSnafu { path })?;
    }
    wtr.flush().context(WritingOutputSnafu { path })?;
    Ok(())
}

fn write_group_comparison(path: &str, comparisons: &[GroupComparison]) -> SurveyResult<()> {
    let mut wtr = writer(path)?;
    wtr.write_record([
        "attribute",
        "item",
        "group",
        "rank",
        "positive_rate",
        "mean_score",
        "responses",
        "delta_points",
        "below_baseline",
    ])
    .context(CsvWriteSnafu { path })?;
    for comparison in comparisons.iter() {
        for row in comparison.rows.iter() {
            let m = &row.metric;
            wtr.write_record([
                comparison.attribute.clone(),
                m.item.to_string(),
                m.group.to_string(),
                row.rank.to_string(),
                fmt_rate(m.positive_rate),
                fmt_points(m.mean_score),
                m.response_count.to_string(),
                fmt_points(row.delta_points()),
                row.below_baseline.to_string(),
            ])
            .context(CsvWriteSnafu { path })?;
        }
    }
    wtr.flush().context(WritingOutputSnafu { path })?;
    Ok(())
}

fn write_group_engagement(path: &str, comparisons: &[GroupComparison]) -> SurveyResult<()> {
    let mut wtr = writer(path)?;
    wtr.write_record([
        "attribute",
        "group",
        "avg_positive_rate",
        "respondents",
        "items_reported",
    ])
    .context(CsvWriteSnafu { path })?;
    for comparison in comparisons.iter() {
        for ge in comparison.groups.iter() {
            wtr.write_record([
                comparison.attribute.clone(),
                ge.group.to_string(),
                fmt_rate(ge.avg_positive_rate),
                ge.respondents.to_string(),
                ge.items_reported.to_string(),
            ])
            .context(CsvWriteSnafu { path })?;
        }
    }
    wtr.flush().context(WritingOutputSnafu { path })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use engagement_metrics::builder::DatasetBuilder;

    fn two_supervisors() -> EngagementResult {
        let mut b = DatasetBuilder::new(&[ItemId::from("Q1")], &["DSUPER".to_string()]).unwrap();
        b.add_record("r1", &[Some(5)], &[Some("A".to_string())])
            .unwrap();
        b.add_record("r2", &[Some(2)], &[Some("B".to_string())])
            .unwrap();
        let dataset = b.build();
        let mut scales = ScaleMap::new();
        scales.insert(ItemId::from("Q1"), ItemScale::agree_high());
        run_engagement_stats(
            &dataset,
            &scales,
            &[Grouping::categorical("DSUPER")],
            &EngagementRules::DEFAULT_RULES,
        )
        .unwrap()
    }

    fn test_dir(name: &str) -> PathBuf {
        [
            std::env::temp_dir(),
            PathBuf::from(format!("fevstab-{}-{}", name, std::process::id())),
        ]
        .iter()
        .collect()
    }

    #[test]
    fn tables_have_fixed_columns() {
        let result = two_supervisors();
        let mut descriptions = BTreeMap::new();
        descriptions.insert(ItemId::from("Q1"), "My work, my way".to_string());

        let dir = test_dir("export");
        let dir_s = dir.display().to_string();
        let paths = write_tables(&dir_s, &result, &descriptions).unwrap();
        assert_eq!(paths.len(), 3);

        let summary = fs::read_to_string(&paths[0]).unwrap();
        let lines: Vec<&str> = summary.lines().collect();
        assert_eq!(
            lines[0],
            "rank,item,description,positive_rate,neutral_rate,negative_rate,mean_score,responses,delta_points,below_baseline,standing"
        );
        assert_eq!(
            lines[1],
            "1,Q1,\"My work, my way\",0.5000,0.0000,0.5000,3.50,2,-12.00,true,belowBaseline"
        );

        let comparison = fs::read_to_string(&paths[1]).unwrap();
        let lines: Vec<&str> = comparison.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[1], "DSUPER,Q1,A,1,1.0000,5.00,1,38.00,false");
        assert_eq!(lines[2], "DSUPER,Q1,B,2,0.0000,2.00,1,-62.00,true");

        let engagement = fs::read_to_string(&paths[2]).unwrap();
        let lines: Vec<&str> = engagement.lines().collect();
        assert_eq!(lines[1], "DSUPER,A,1.0000,1,1");
        assert!(!Path::new(&format!("{}.tmp", paths[0])).exists());

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn no_table_is_left_after_a_failure() {
        let result = two_supervisors();
        let dir = test_dir("export-failure");
        let dir_s = dir.display().to_string();
        // A directory is in the way of the second table.
        let blocked = format!("{}.tmp", output_path(&dir_s, GROUP_COMPARISON_FILE));
        fs::create_dir_all(&blocked).unwrap();

        let res = write_tables(&dir_s, &result, &BTreeMap::new());
        assert!(matches!(res, Err(SurveyError::CsvWrite { .. })));
        let summary_p = output_path(&dir_s, ENGAGEMENT_SUMMARY_FILE);
        assert!(!Path::new(&summary_p).exists());
        assert!(!Path::new(&format!("{}.tmp", summary_p)).exists());

        fs::remove_dir_all(&dir).unwrap();
    }
}
