use std::env;
use std::path::{Path, PathBuf};

use briefcase_core::config::{
    default_data_dir, ENV_PASSWORD, ENV_SERVER_URL, ENV_STORAGE_ROOT, ENV_USERNAME,
};
use briefcase_core::db::Database;
use briefcase_core::models::{FormRecord, OperationalReport};
use briefcase_core::sync::SyncFailure;
use briefcase_core::util::normalize_text_option;
use briefcase_core::{PushReport, SyncConfig, SyncReport};
use serde::Serialize;

use crate::cli::ConnectionArgs;
use crate::error::CliError;

pub const ENV_DB_PATH: &str = "BRIEFCASE_DB_PATH";

#[derive(Debug, Serialize)]
pub struct FormListItem {
    pub id: String,
    pub id_string: String,
    pub title: String,
    pub created_at: i64,
    pub created_at_iso: String,
}

#[derive(Debug, Serialize)]
pub struct ReportListItem {
    pub id: i64,
    pub subject: String,
    pub detail: String,
    pub created_at: i64,
    pub created_at_iso: String,
}

pub fn form_to_list_item(form: &FormRecord) -> FormListItem {
    FormListItem {
        id: form.id.clone(),
        id_string: form.id_string.clone(),
        title: form.title.clone(),
        created_at: form.created_at,
        created_at_iso: format_timestamp(form.created_at),
    }
}

pub fn report_to_list_item(report: &OperationalReport) -> ReportListItem {
    ReportListItem {
        id: report.id,
        subject: report.subject.clone(),
        detail: report.detail.clone(),
        created_at: report.created_at,
        created_at_iso: format_timestamp(report.created_at),
    }
}

pub fn format_form_lines(forms: &[FormRecord]) -> Vec<String> {
    forms
        .iter()
        .map(|form| {
            format!(
                "{}  {:<24}  {}",
                format_timestamp(form.created_at),
                form.id_string,
                form.title
            )
        })
        .collect()
}

pub fn format_report_lines(reports: &[OperationalReport]) -> Vec<String> {
    reports
        .iter()
        .map(|report| {
            format!(
                "{}  {}  {}",
                format_timestamp(report.created_at),
                report.subject,
                report.detail
            )
        })
        .collect()
}

pub fn format_pull_summary(report: &SyncReport) -> Vec<String> {
    let mut lines = vec![
        format!(
            "Forms: {} listed, {} excluded, {} downloaded, {} cached",
            report.forms_listed, report.forms_excluded, report.forms_downloaded, report.forms_cached
        ),
        format!(
            "Media: {} downloaded, {} cached, {} manifests skipped",
            report.media_downloaded, report.media_cached, report.manifests_skipped
        ),
        format!(
            "Submissions: {} pages, {} downloaded, {} cached",
            report.submission_pages, report.instances_downloaded, report.instances_cached
        ),
    ];
    lines.extend(format_failure_lines(&report.failures));
    lines
}

pub fn format_push_summary(report: &PushReport) -> Vec<String> {
    let mut lines = vec![format!(
        "Pushed {} forms and {} instances",
        report.forms_pushed,
        report.instances_pushed()
    )];
    lines.extend(
        report
            .directories
            .iter()
            .map(|directory| format!("  {}: {} instances", directory.form_dir, directory.instances)),
    );
    lines.extend(format_failure_lines(&report.failures));
    lines
}

fn format_failure_lines(failures: &[SyncFailure]) -> Vec<String> {
    if failures.is_empty() {
        return Vec::new();
    }

    let mut lines = vec![format!("{} failures:", failures.len())];
    lines.extend(
        failures
            .iter()
            .map(|failure| format!("  {}: {}", failure.resource, failure.reason)),
    );
    lines
}

pub fn format_timestamp(timestamp_ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(timestamp_ms).map_or_else(
        || timestamp_ms.to_string(),
        |date_time| date_time.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    )
}

/// Resolve the server configuration, letting command-line flags win over
/// the environment.
pub fn resolve_sync_config(args: &ConnectionArgs) -> Result<SyncConfig, CliError> {
    resolve_sync_config_with(args, |key| env::var(key).ok())
}

pub fn resolve_sync_config_with(
    args: &ConnectionArgs,
    env_lookup: impl Fn(&str) -> Option<String>,
) -> Result<SyncConfig, CliError> {
    let lookup = |key: &str| connection_override(args, key).or_else(|| env_lookup(key));
    SyncConfig::from_lookup(lookup)?.ok_or(CliError::NotConfigured)
}

/// Account whose mirror `push` ingests. Pushing never contacts the server,
/// so only the username and storage root are needed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushTarget {
    pub username: String,
    pub storage_root: PathBuf,
}

pub fn resolve_push_target(args: &ConnectionArgs) -> Result<PushTarget, CliError> {
    resolve_push_target_with(args, |key| env::var(key).ok())
}

pub fn resolve_push_target_with(
    args: &ConnectionArgs,
    env_lookup: impl Fn(&str) -> Option<String>,
) -> Result<PushTarget, CliError> {
    let lookup = |key: &str| {
        normalize_text_option(connection_override(args, key).or_else(|| env_lookup(key)))
    };
    let username = lookup(ENV_USERNAME).ok_or(CliError::UsernameRequired)?;
    let storage_root = lookup(ENV_STORAGE_ROOT).map_or_else(default_data_dir, PathBuf::from);
    Ok(PushTarget {
        username,
        storage_root,
    })
}

fn connection_override(args: &ConnectionArgs, key: &str) -> Option<String> {
    match key {
        ENV_SERVER_URL => args.server.clone(),
        ENV_USERNAME => args.username.clone(),
        ENV_PASSWORD => args.password.clone(),
        ENV_STORAGE_ROOT => args
            .storage_root
            .as_ref()
            .map(|path| path.to_string_lossy().into_owned()),
        _ => None,
    }
}

pub fn resolve_db_path(cli_db_path: Option<PathBuf>) -> PathBuf {
    cli_db_path
        .or_else(|| env::var_os(ENV_DB_PATH).map(PathBuf::from))
        .unwrap_or_else(default_db_path)
}

pub fn default_db_path() -> PathBuf {
    default_data_dir().join("briefcase.db")
}

pub fn open_record_database(db_path: &Path) -> Result<Database, CliError> {
    Ok(Database::open(db_path)?)
}
