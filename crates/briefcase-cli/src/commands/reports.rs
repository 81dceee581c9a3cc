use std::path::Path;

use briefcase_core::db::SqliteRecordStore;

use crate::commands::common::{
    format_report_lines, open_record_database, report_to_list_item, ReportListItem,
};
use crate::error::CliError;

pub fn run_reports(limit: usize, as_json: bool, db_path: &Path) -> Result<(), CliError> {
    let db = open_record_database(db_path)?;
    let reports = SqliteRecordStore::new(db.connection()).list_reports(limit)?;

    if as_json {
        let json_items = reports
            .iter()
            .map(report_to_list_item)
            .collect::<Vec<ReportListItem>>();
        println!("{}", serde_json::to_string_pretty(&json_items)?);
        return Ok(());
    }

    if reports.is_empty() {
        println!("No reports recorded.");
        return Ok(());
    }

    for line in format_report_lines(&reports) {
        println!("{line}");
    }
    Ok(())
}
