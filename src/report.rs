/*!
 * Reporting functionality for codeflat
 *
 * Summarises a run as console tables using the tabled library.
 */

use std::time::Duration;

use tabled::{
    settings::{object::Columns, Alignment, Modify, Padding, Style},
    Table, Tabled,
};

use crate::error::FlattenError;
use crate::types::FileOutcome;
use crate::utils::format_file_size;

/// A selected file that could not be fully processed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileFailure {
    /// Relative path of the file
    pub path: String,
    /// Annotation written into the artifact
    pub message: String,
}

impl FileFailure {
    /// Capture a per-file error
    pub fn new(path: &str, error: &FlattenError) -> Self {
        Self {
            path: path.to_string(),
            message: error.annotation(),
        }
    }
}

/// Statistics for a flattening run
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    /// Output file path
    pub output_file: String,
    /// Time taken by the run
    pub duration: Duration,
    /// Number of files in the selection manifest
    pub files_selected: usize,
    /// Text files emitted as a single block
    pub inline_files: usize,
    /// Text files emitted as chunks
    pub chunked_files: usize,
    /// Total chunks across chunked files
    pub total_chunks: usize,
    /// Binary files with an inline payload
    pub binary_files: usize,
    /// Binary files over the inline limit
    pub omitted_files: usize,
    /// Files annotated with an error
    pub failed_files: usize,
    /// Sum of file sizes
    pub total_bytes: u64,
    /// Aggregate digest written into the artifact
    pub aggregate_digest: String,
    /// Details of every failure
    pub failures: Vec<FileFailure>,
}

impl RunReport {
    /// Account for one processed file
    pub fn record(&mut self, outcome: FileOutcome, size_bytes: u64) {
        self.files_selected += 1;
        self.total_bytes += size_bytes;
        match outcome {
            FileOutcome::Inline => self.inline_files += 1,
            FileOutcome::Chunked(count) => {
                self.chunked_files += 1;
                self.total_chunks += count;
            }
            FileOutcome::Binary => self.binary_files += 1,
            FileOutcome::Omitted => self.omitted_files += 1,
            FileOutcome::Failed => self.failed_files += 1,
        }
    }
}

/// Format of the report output
pub enum ReportFormat {
    /// Console table output
    ConsoleTable,
}

/// Report generator for run results
pub struct Reporter {
    format: ReportFormat,
}

impl Reporter {
    /// Create a new reporter
    pub fn new(format: ReportFormat) -> Self {
        Self { format }
    }

    /// Generate a report string based on run statistics
    pub fn generate_report(&self, report: &RunReport) -> String {
        match self.format {
            ReportFormat::ConsoleTable => self.generate_console_report(report),
        }
    }

    /// Print the report to stdout
    pub fn print_report(&self, report: &RunReport) {
        println!("\n{}", self.generate_report(report));
    }

    fn create_summary_table(&self, report: &RunReport) -> String {
        #[derive(Tabled)]
        struct SummaryRow {
            #[tabled(rename = "Metric")]
            key: &'static str,

            #[tabled(rename = "Value")]
            value: String,
        }

        let rows = vec![
            SummaryRow {
                key: "Output File",
                value: report.output_file.clone(),
            },
            SummaryRow {
                key: "Process Time",
                value: format!("{:.4?}", report.duration),
            },
            SummaryRow {
                key: "Files Selected",
                value: report.files_selected.to_string(),
            },
            SummaryRow {
                key: "Inline Text",
                value: report.inline_files.to_string(),
            },
            SummaryRow {
                key: "Chunked Text",
                value: format!(
                    "{} ({} chunks)",
                    report.chunked_files, report.total_chunks
                ),
            },
            SummaryRow {
                key: "Binary (inline / omitted)",
                value: format!("{} / {}", report.binary_files, report.omitted_files),
            },
            SummaryRow {
                key: "Failed",
                value: report.failed_files.to_string(),
            },
            SummaryRow {
                key: "Total Size",
                value: format_file_size(report.total_bytes),
            },
            SummaryRow {
                key: "Digest (sha256)",
                value: report.aggregate_digest.clone(),
            },
        ];

        style(Table::new(rows))
    }

    fn create_failures_table(&self, report: &RunReport) -> String {
        #[derive(Tabled)]
        struct FailureRow<'a> {
            #[tabled(rename = "File Path")]
            path: &'a str,

            #[tabled(rename = "Error")]
            message: &'a str,
        }

        let rows: Vec<FailureRow<'_>> = report
            .failures
            .iter()
            .map(|f| FailureRow {
                path: &f.path,
                message: &f.message,
            })
            .collect();

        style(Table::new(rows))
    }

    fn generate_console_report(&self, report: &RunReport) -> String {
        let summary = self.create_summary_table(report);
        if report.failures.is_empty() {
            return format!("FLATTEN COMPLETE\n{}", summary);
        }

        format!(
            "FILES WITH ERRORS\n{}\n\nFLATTEN COMPLETE\n{}",
            self.create_failures_table(report),
            summary
        )
    }
}

fn style(mut table: Table) -> String {
    table
        .with(Style::rounded())
        .with(Padding::new(1, 1, 0, 0))
        .with(Modify::new(Columns::new(..)).with(Alignment::left()));
    table.to_string()
}
