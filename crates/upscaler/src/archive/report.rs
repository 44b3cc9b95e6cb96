use std::fmt::Write;

use crate::config::BYTES_PER_MB;
use crate::worker::job::FileTask;

pub const REPORT_FILE_NAME: &str = "_report.tsv";

pub const REPORT_HEADER: &str =
    "source_name\toutput_name\tstatus\tsrc_w\tsrc_h\tout_w\tout_h\tquality\tsize_mb\tnotes";

/// Renders the TSV report, one row per task in the given order.
pub fn render(tasks: &[FileTask]) -> String {
    let mut out = String::with_capacity(64 * (tasks.len() + 1));
    out.push_str(REPORT_HEADER);
    out.push('\n');
    for task in tasks {
        // Writing to a String cannot fail.
        let _ = writeln!(out, "{}", row(task));
    }
    out
}

fn row(task: &FileTask) -> String {
    let field = |v: Option<String>| v.unwrap_or_default();

    let fields = [
        clean(&task.source_name),
        clean(&task.output_name),
        task.status.as_str().to_string(),
        field(task.source_dims.map(|d| d.width.to_string())),
        field(task.source_dims.map(|d| d.height.to_string())),
        field(task.output_dims.map(|d| d.width.to_string())),
        field(task.output_dims.map(|d| d.height.to_string())),
        field(task.quality_used.map(|q| q.to_string())),
        field(task.size_bytes.map(|b| format!("{:.2}", b as f64 / BYTES_PER_MB))),
        clean(&task.notes.join("; ")),
    ];
    fields.join("\t")
}

/// Tabs and line breaks would break the column layout.
fn clean(value: &str) -> String {
    value
        .chars()
        .map(|c| if matches!(c, '\t' | '\n' | '\r') { ' ' } else { c })
        .collect()
}
