use std::path::Path;

use briefcase_core::db::SqliteRecordStore;

use crate::commands::common::{
    form_to_list_item, format_form_lines, open_record_database, FormListItem,
};
use crate::error::CliError;

pub fn run_forms(as_json: bool, db_path: &Path) -> Result<(), CliError> {
    let db = open_record_database(db_path)?;
    let forms = SqliteRecordStore::new(db.connection()).list_forms()?;

    if as_json {
        let json_items = forms
            .iter()
            .map(form_to_list_item)
            .collect::<Vec<FormListItem>>();
        println!("{}", serde_json::to_string_pretty(&json_items)?);
        return Ok(());
    }

    if forms.is_empty() {
        println!("No forms pushed yet.");
        return Ok(());
    }

    for line in format_form_lines(&forms) {
        println!("{line}");
    }
    Ok(())
}
