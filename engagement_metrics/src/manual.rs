/*!

This is the long-form manual for `engagement_metrics` and `fevstab`.

## Quick start

The public data file of the Federal Employee Viewpoint Survey contains one row per respondent,
one column per item (`Q1`, `Q2`, ...) and a few demographic columns (`DSUPER`, `DAGENCYSZ`,
`DLEAVING`, ...). Without any configuration file, `fevstab` reports the items requested on the
command line:

```bash
fevstab -i fevs_puf.csv --items Q1,Q2,Q3,Q4 --group-by DSUPER
```

```text
[2023-03-02T10:12:41Z INFO  engagement_metrics]   1 Q2         71.3% (+9.3 points, 612 responses)
[2023-03-02T10:12:41Z INFO  engagement_metrics]   2 Q1         64.0% (+2.0 points, 618 responses)
[2023-03-02T10:12:41Z INFO  engagement_metrics]   3 Q4         58.2% (-3.8 points, 605 responses)
[2023-03-02T10:12:41Z INFO  engagement_metrics] Engagement index: 64.5% (+2.5 points from the baseline)
```

The items are ranked by positive rate, best first. Ties are broken by item id, in natural
order (`Q2` before `Q10`), so that two runs over the same data always print the same table.
The delta is expressed in percentage points from the baseline (62% unless configured).

The complete summary is written in JSON format with `--out` (`stdout` is accepted) and the
tables can be exported as CSV files with `--export-dir`.

## Response codes

Every item is read through a scale that assigns each valid code to exactly one category:
positive, neutral or negative. The scale also lists the codes that mean "no answer" (for
example `9` for "do not know"). The built-in scales are:
* `agree-high` codes 1 to 5, positive 4 and 5, neutral 3, negative 1 and 2. This is the scale
 of the FEVS public files (5 = Strongly agree). It declares no sentinel code: any other code is
 treated as missing.
* `agree-low` the same scale in the reverse direction: positive 1 and 2, negative 4 and 5.

Codes outside of the range of the scale are treated as missing: they are counted and reported
once as a warning, but they never stop the computation. Blank cells and non numeric cells
(such as `X`, "no basis to judge") are missing as well.

A rate is never computed over zero responses: an item for which a group has no usable answer
is left out of the tables and counted in `omittedPairs`.

## Input formats

### `csv`

The first row is the header. The columns are found by name, and their order is not significant.

```text
RandomID,POSTWT,DSUPER,DAGENCYSZ,Q1,Q2,Q3
1001,1.25,A,50,5,4,X
1002,0.75,B,900,3,,2
```

The id column is optional. If absent, the records are named after the file and the line number
(`survey.csv-00000002`).

### `xlsx`

The same layout in an Excel workbook. The first worksheet is read unless `excelWorksheetName`
is provided. Only the requested columns are read. In those, error cells (`#N/A`) are missing
values and booleans are read as `true` and `false`.

## Configuration

`fevstab` comes with sensible defaults but most analyses need a configuration file in JSON
(`--config`). The values passed on the command line take precedence over the file.

```json
{
  "outputSettings": {
    "surveyName": "FEVS 2022",
    "surveyYear": "2022",
    "outputDirectory": "results"
  },
  "dataSources": [
    {
      "provider": "csv",
      "filePath": "fevs_puf.csv",
      "idColumn": "RandomID",
      "weightColumn": "POSTWT",
      "missingLabels": ["X"]
    }
  ],
  "scales": [
    { "name": "agree", "minCode": 1, "maxCode": 5,
      "positive": [4, 5], "neutral": [3], "negative": [1, 2], "missing": [9] }
  ],
  "items": [
    { "id": "Q1", "description": "I am given a real opportunity to improve my skills.", "scale": "agree" }
  ],
  "groupings": [
    { "attribute": "DSUPER", "labels": { "A": "Non-supervisor", "B": "Supervisor" } },
    { "attribute": "DAGENCYSZ", "boundary": "lowerInclusive",
      "bands": [
        { "upper": 100, "label": "Under 100" },
        { "lower": 100, "upper": 1000, "label": "100 to 999" },
        { "lower": 1000, "label": "1000 or more" }
      ] }
  ],
  "indicators": [
    { "attribute": "DLEAVING", "values": ["B", "C", "D"], "label": "Considering leaving" }
  ],
  "rules": { "baseline": "0.62", "target": "0.70", "weighted": false, "priorityCount": 2 }
}
```

Notes:
- `filePath` is relative to the directory of the configuration file.
- `scale` may refer to a scale of the `scales` section or to a built-in scale.
- A grouping without `bands` is categorical: each distinct value is a group, renamed through
 `labels` when listed there.
- Bands are tried in order and the first one that contains the value wins. With the default
 `lowerInclusive` boundary, a band contains `lower <= value < upper`. With `upperInclusive`, it
 contains `lower < value <= upper`. A missing bound is open.
- Records with no value (or with a value in no band) for the grouping attribute are left out of
 that breakdown, but they still count in the overall results.
- `weighted` uses the weight column for the rates and the means. The response counts are never
 weighted.
- Numbers in `rules` may be written as JSON numbers or as strings.

 */
