// ==============================================================================
// status_view.rs - Case Status Table
// ==============================================================================
// Description: Renders case progress as a psql-style table for the CLI
// Author: Matt Barham
// Created: 2026-10-19
// Modified: 2026-10-19
// Version: 1.0.0
// ==============================================================================

use std::str::FromStr;

use chrono::{DateTime, Utc};

use crate::constants::UnknownOption;
use crate::store::{CaseStatus, Stage, StageProgress};

pub const HEADERS: [&str; 9] = [
    "Case",
    "Ordered",
    "Rec",
    "Pre",
    "Seq",
    "Analysed",
    "Uploaded",
    "Delivered",
    "Invoiced",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputType {
    #[default]
    Bool,
    Count,
    Date,
    Datetime,
}

impl FromStr for OutputType {
    type Err = UnknownOption;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bool" => Ok(OutputType::Bool),
            "count" => Ok(OutputType::Count),
            "date" => Ok(OutputType::Date),
            "datetime" => Ok(OutputType::Datetime),
            _ => Err(UnknownOption {
                kind: "output type",
                value: s.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ViewOptions {
    pub output: OutputType,
    pub verbose: bool,
    /// Show the case name next to the id
    pub with_name: bool,
    /// Show the data analysis next to the id
    pub with_data_analysis: bool,
}

pub fn present_bool(value: Option<bool>, verbose: bool) -> String {
    match value {
        None => "-".to_string(),
        Some(true) => "✓".to_string(),
        Some(false) if verbose => "✗".to_string(),
        Some(false) => String::new(),
    }
}

pub fn present_date(value: Option<DateTime<Utc>>, verbose: bool, show_time: bool) -> String {
    match value {
        Some(date) if show_time => date.format("%Y-%m-%d %H:%M:%S").to_string(),
        Some(date) => date.format("%Y-%m-%d").to_string(),
        None if verbose => "-".to_string(),
        None => String::new(),
    }
}

fn present_count(progress: &StageProgress, verbose: bool) -> String {
    if progress.total == 0 {
        return present_bool(None, verbose);
    }
    format!("{}/{}", progress.done, progress.total)
}

fn stage_cell(case: &CaseStatus, stage: Stage, opts: &ViewOptions) -> String {
    let progress = match stage {
        Stage::Received => Some(&case.received),
        Stage::Prepared => Some(&case.prepared),
        Stage::Sequenced => Some(&case.sequenced),
        Stage::Delivered => Some(&case.delivered),
        Stage::Invoiced => Some(&case.invoiced),
        Stage::Analysed | Stage::Uploaded => None,
    };

    let analysis_date = match stage {
        Stage::Analysed => case.analysis_completed_at,
        Stage::Uploaded => case.analysis_uploaded_at,
        _ => None,
    };

    match (opts.output, progress) {
        (OutputType::Bool, _) => present_bool(case.stage(stage), opts.verbose),
        (OutputType::Count, Some(progress)) => present_count(progress, opts.verbose),
        (OutputType::Count, None) => present_date(analysis_date, opts.verbose, false),
        (OutputType::Date | OutputType::Datetime, progress) => {
            let show_time = opts.output == OutputType::Datetime;
            let date = progress.map_or(analysis_date, |p| p.completed_at);
            present_date(date, opts.verbose, show_time)
        }
    }
}

fn case_title(case: &CaseStatus, opts: &ViewOptions) -> String {
    let mut title = case.internal_id.clone();
    if opts.with_name {
        title.push_str(&format!(" ({})", case.name));
    }
    if opts.with_data_analysis {
        title.push_str(&format!(" {}", case.data_analysis));
    }
    title
}

pub fn case_row(case: &CaseStatus, opts: &ViewOptions) -> Vec<String> {
    let mut row = vec![
        case_title(case, opts),
        present_date(Some(case.ordered_at), opts.verbose, opts.output == OutputType::Datetime),
    ];
    row.extend(
        [
            Stage::Received,
            Stage::Prepared,
            Stage::Sequenced,
            Stage::Analysed,
            Stage::Uploaded,
            Stage::Delivered,
            Stage::Invoiced,
        ]
        .into_iter()
        .map(|stage| stage_cell(case, stage, opts)),
    );
    row
}

fn pad(value: &str, width: usize) -> String {
    let len = value.chars().count();
    format!("{}{}", value, " ".repeat(width.saturating_sub(len)))
}

/// psql-style table with a row count footer
pub fn render_table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let line = |cells: Vec<String>| {
        let padded: Vec<String> = cells.iter().zip(&widths).map(|(c, w)| pad(c, *w)).collect();
        format!(" {} ", padded.join(" | ")).trim_end().to_string()
    };

    let mut out = Vec::with_capacity(rows.len() + 3);
    out.push(line(headers.iter().map(|h| h.to_string()).collect()));
    out.push(
        widths
            .iter()
            .map(|w| "-".repeat(w + 2))
            .collect::<Vec<_>>()
            .join("+"),
    );
    for row in rows {
        out.push(line(row.clone()));
    }
    let noun = if rows.len() == 1 { "row" } else { "rows" };
    out.push(format!("({} {})", rows.len(), noun));
    out.join("\n")
}

pub fn render_cases(cases: &[CaseStatus], opts: &ViewOptions) -> String {
    let rows: Vec<Vec<String>> = cases.iter().map(|c| case_row(c, opts)).collect();
    render_table(&HEADERS, &rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::Priority;
    use chrono::TimeZone;

    fn status() -> CaseStatus {
        let ordered = Utc.with_ymd_and_hms(2026, 10, 1, 9, 30, 0).unwrap();
        let done = |n: usize, at: Option<DateTime<Utc>>| StageProgress {
            total: 2,
            done: n,
            completed_at: at,
        };

        CaseStatus {
            internal_id: "grumpyowl".to_string(),
            name: "family 1".to_string(),
            customer_id: 1,
            data_analysis: "mip-dna".to_string(),
            action: None,
            priority: Priority::Standard,
            ordered_at: ordered,
            sample_ids: vec!["ADM1".to_string(), "ADM2".to_string()],
            received: done(2, Some(ordered)),
            prepared: done(1, None),
            sequenced: done(0, None),
            delivered: done(0, None),
            invoiced: StageProgress::default(),
            analysis_pipeline: None,
            analysis_started_at: None,
            analysis_completed_at: None,
            analysis_uploaded_at: None,
            received_bool: Some(true),
            prepared_bool: Some(false),
            sequenced_bool: Some(false),
            analysed_bool: None,
            uploaded_bool: None,
            delivered_bool: Some(false),
            invoiced_bool: None,
        }
    }

    #[test]
    fn test_present_bool() {
        assert_eq!(present_bool(None, false), "-");
        assert_eq!(present_bool(Some(true), false), "✓");
        assert_eq!(present_bool(Some(false), true), "✗");
        assert_eq!(present_bool(Some(false), false), "");
    }

    #[test]
    fn test_present_date() {
        let date = Utc.with_ymd_and_hms(2026, 10, 1, 9, 30, 0).unwrap();
        assert_eq!(present_date(Some(date), false, false), "2026-10-01");
        assert_eq!(present_date(Some(date), false, true), "2026-10-01 09:30:00");
        assert_eq!(present_date(None, false, false), "");
        assert_eq!(present_date(None, true, false), "-");
    }

    #[test]
    fn test_bool_row() {
        let row = case_row(&status(), &ViewOptions::default());
        assert_eq!(row, vec!["grumpyowl", "2026-10-01", "✓", "", "", "-", "-", "", "-"]);
    }

    #[test]
    fn test_count_row() {
        let opts = ViewOptions {
            output: OutputType::Count,
            ..Default::default()
        };
        let row = case_row(&status(), &opts);
        assert_eq!(&row[2..5], &["2/2", "1/2", "0/2"]);
        assert_eq!(row[5], "");
        assert_eq!(row[8], "-");
    }

    #[test]
    fn test_title_with_name_and_analysis() {
        let opts = ViewOptions {
            with_name: true,
            with_data_analysis: true,
            ..Default::default()
        };
        assert_eq!(case_row(&status(), &opts)[0], "grumpyowl (family 1) mip-dna");
    }

    #[test]
    fn test_render_table() {
        let table = render_table(&["Case", "Rec"], &[vec!["grumpyowl".to_string(), "✓".to_string()]]);
        let lines: Vec<&str> = table.lines().collect();

        assert_eq!(lines[0], " Case      | Rec");
        assert_eq!(lines[1], "-----------+-----");
        assert_eq!(lines[2], " grumpyowl | ✓");
        assert_eq!(lines[3], "(1 row)");
    }

    #[test]
    fn test_render_cases_has_all_headers() {
        let table = render_cases(&[status()], &ViewOptions::default());
        let header = table.lines().next().unwrap();
        for name in HEADERS {
            assert!(header.contains(name));
        }
    }

    #[test]
    fn test_output_type_from_str() {
        assert_eq!("datetime".parse::<OutputType>().unwrap(), OutputType::Datetime);
        assert!("table".parse::<OutputType>().is_err());
    }
}
