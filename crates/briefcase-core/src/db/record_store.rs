//! Record store: publishing forms and ingesting instances

#![allow(clippy::cast_possible_wrap)] // SQLite uses i64 for LIMIT

use rusqlite::{params, Connection, OptionalExtension};

use crate::dedup::{self, StoredPayload};
use crate::error::{Error, Result};
use crate::models::{
    new_record_id, Attachment, FormRecord, FormUpload, InstanceRecord, OperationalReport,
    SubmissionRecord,
};
use crate::util::unix_timestamp_millis;
use crate::xml::{instance_form_id, FormParser, XFormParser};

/// Report detail recorded when an instance names a form the store lacks.
pub const MISSING_FORM_REPORT: &str = "missing original form";
/// Report detail recorded when the declared form of an instance cannot be read.
pub const LINKING_PROBLEM_REPORT: &str = "problem linking instance";

/// Ingestion entry points used by push
pub trait RecordStore {
    /// Publish a form definition. The error is the failure detail.
    fn ingest_form(&self, upload: FormUpload) -> Result<FormRecord>;

    /// Store an instance payload with its attachments.
    ///
    /// A payload byte-identical to a stored instance only adds a submission
    /// record to that instance.
    fn ingest_instance(
        &self,
        owner: &str,
        xml: &[u8],
        attachments: &[Attachment],
    ) -> Result<InstanceRecord>;
}

/// `SQLite` implementation of `RecordStore`
pub struct SqliteRecordStore<'a> {
    conn: &'a Connection,
    parser: Box<dyn FormParser + 'a>,
    fingerprint: fn(&[u8]) -> i64,
}

/// A stored instance together with the bytes dedup compares against.
struct StoredInstance {
    record: InstanceRecord,
    xml: Vec<u8>,
}

impl StoredPayload for StoredInstance {
    fn fingerprint(&self) -> i64 {
        self.record.fingerprint
    }

    fn bytes(&self) -> &[u8] {
        &self.xml
    }
}

impl<'a> SqliteRecordStore<'a> {
    /// Create a new store with the given connection
    pub fn new(conn: &'a Connection) -> Self {
        Self {
            conn,
            parser: Box::new(XFormParser),
            fingerprint: dedup::fingerprint,
        }
    }

    /// Use another parser for form definitions.
    #[must_use]
    pub fn with_parser(mut self, parser: impl FormParser + 'a) -> Self {
        self.parser = Box::new(parser);
        self
    }

    /// Use another fingerprint function for instance payloads.
    #[must_use]
    pub fn with_fingerprint(mut self, fingerprint: fn(&[u8]) -> i64) -> Self {
        self.fingerprint = fingerprint;
        self
    }

    /// All published forms ordered by id string
    pub fn list_forms(&self) -> Result<Vec<FormRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, id_string, title, created_at FROM forms ORDER BY id_string",
        )?;
        let forms = stmt
            .query_map([], Self::parse_form)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(forms)
    }

    /// Get a form by its id string
    pub fn get_form(&self, id_string: &str) -> Result<Option<FormRecord>> {
        let form = self
            .conn
            .query_row(
                "SELECT id, id_string, title, created_at FROM forms WHERE id_string = ?",
                params![id_string],
                Self::parse_form,
            )
            .optional()?;
        Ok(form)
    }

    /// Number of distinct stored instances
    pub fn count_instances(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM instances", [], |row| row.get(0))?;
        usize::try_from(count).map_err(|_| Error::Database(format!("invalid count {count}")))
    }

    /// Get an instance by record id
    pub fn get_instance(&self, id: &str) -> Result<Option<InstanceRecord>> {
        let instance = self
            .conn
            .query_row(
                "SELECT id, owner, form_id, fingerprint, created_at FROM instances WHERE id = ?",
                params![id],
                Self::parse_instance,
            )
            .optional()?;
        Ok(instance)
    }

    /// Submissions of one instance, oldest first
    pub fn list_submissions(&self, instance_id: &str) -> Result<Vec<SubmissionRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, instance_id, posted_at FROM submissions
             WHERE instance_id = ?
             ORDER BY posted_at, id",
        )?;
        let submissions = stmt
            .query_map(params![instance_id], |row| {
                Ok(SubmissionRecord {
                    id: row.get(0)?,
                    instance_id: row.get(1)?,
                    posted_at: row.get(2)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(submissions)
    }

    /// Attachments stored with one instance, by file name
    pub fn list_attachments(&self, instance_id: &str) -> Result<Vec<Attachment>> {
        let mut stmt = self.conn.prepare(
            "SELECT file_name, content_type, bytes FROM instance_attachments
             WHERE instance_id = ?
             ORDER BY file_name",
        )?;
        let attachments = stmt
            .query_map(params![instance_id], |row| {
                Ok(Attachment {
                    file_name: row.get(0)?,
                    content_type: row.get(1)?,
                    bytes: row.get(2)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(attachments)
    }

    /// Operational reports, newest first
    pub fn list_reports(&self, limit: usize) -> Result<Vec<OperationalReport>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, subject, detail, created_at FROM reports
             ORDER BY created_at DESC, id DESC
             LIMIT ?",
        )?;
        let reports = stmt
            .query_map(params![limit as i64], |row| {
                Ok(OperationalReport {
                    id: row.get(0)?,
                    subject: row.get(1)?,
                    detail: row.get(2)?,
                    created_at: row.get(3)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(reports)
    }

    fn parse_form(row: &rusqlite::Row<'_>) -> rusqlite::Result<FormRecord> {
        Ok(FormRecord {
            id: row.get(0)?,
            id_string: row.get(1)?,
            title: row.get(2)?,
            created_at: row.get(3)?,
        })
    }

    fn parse_instance(row: &rusqlite::Row<'_>) -> rusqlite::Result<InstanceRecord> {
        Ok(InstanceRecord {
            id: row.get(0)?,
            owner: row.get(1)?,
            form_id: row.get(2)?,
            fingerprint: row.get(3)?,
            created_at: row.get(4)?,
        })
    }

    fn instances_with_fingerprint(&self, fingerprint: i64) -> Result<Vec<StoredInstance>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, owner, form_id, fingerprint, created_at, xml FROM instances
             WHERE fingerprint = ?
             ORDER BY created_at, id",
        )?;
        let stored = stmt
            .query_map(params![fingerprint], |row| {
                Ok(StoredInstance {
                    record: Self::parse_instance(row)?,
                    xml: row.get(5)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(stored)
    }

    fn insert_submission(&self, instance_id: &str) -> Result<SubmissionRecord> {
        let submission = SubmissionRecord {
            id: new_record_id(),
            instance_id: instance_id.to_string(),
            posted_at: unix_timestamp_millis(),
        };
        self.conn.execute(
            "INSERT INTO submissions (id, instance_id, posted_at) VALUES (?, ?, ?)",
            params![submission.id, submission.instance_id, submission.posted_at],
        )?;
        Ok(submission)
    }

    fn insert_report(&self, subject: &str, detail: &str) -> Result<()> {
        self.conn.execute(
            "INSERT INTO reports (subject, detail, created_at) VALUES (?, ?, ?)",
            params![subject, detail, unix_timestamp_millis()],
        )?;
        Ok(())
    }
}

impl RecordStore for SqliteRecordStore<'_> {
    fn ingest_form(&self, upload: FormUpload) -> Result<FormRecord> {
        let metadata = self.parser.parse_form(&upload.xml)?;
        if self.get_form(&metadata.id_string)?.is_some() {
            return Err(Error::Duplicate(format!(
                "form {} is already published",
                metadata.id_string
            )));
        }

        let title = if metadata.title.trim().is_empty() {
            metadata.id_string.clone()
        } else {
            metadata.title.trim().to_string()
        };
        let form = FormRecord {
            id: new_record_id(),
            id_string: metadata.id_string,
            title,
            created_at: unix_timestamp_millis(),
        };

        self.conn.execute(
            "INSERT INTO forms (id, id_string, title, file_name, xml, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
            params![
                form.id,
                form.id_string,
                form.title,
                upload.file_name,
                upload.xml,
                form.created_at
            ],
        )?;

        tracing::debug!("Published form {} from {}", form.id_string, upload.file_name);
        Ok(form)
    }

    fn ingest_instance(
        &self,
        owner: &str,
        xml: &[u8],
        attachments: &[Attachment],
    ) -> Result<InstanceRecord> {
        if xml.iter().all(u8::is_ascii_whitespace) {
            return Err(Error::InvalidInput("instance payload is empty".to_string()));
        }

        let fingerprint = (self.fingerprint)(xml);
        let candidates = self.instances_with_fingerprint(fingerprint)?;
        if let Some(existing) = dedup::find_duplicate(xml, fingerprint, &candidates) {
            self.insert_submission(&existing.record.id)?;
            tracing::debug!(
                "Payload duplicates instance {}, recorded another submission",
                existing.record.id
            );
            return Ok(existing.record.clone());
        }

        let (form, link_problem) = match instance_form_id(xml) {
            Ok(declared) => match self.get_form(&declared)? {
                Some(form) => (Some(form), None),
                None => (None, Some(format!("{MISSING_FORM_REPORT}: {declared}"))),
            },
            Err(error) => (None, Some(format!("{LINKING_PROBLEM_REPORT}: {error}"))),
        };

        let tx = self.conn.unchecked_transaction()?;
        let instance = InstanceRecord {
            id: new_record_id(),
            owner: owner.to_string(),
            form_id: form.map(|form| form.id),
            fingerprint,
            created_at: unix_timestamp_millis(),
        };
        self.conn.execute(
            "INSERT INTO instances (id, owner, form_id, xml, fingerprint, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
            params![
                instance.id,
                instance.owner,
                instance.form_id,
                xml,
                instance.fingerprint,
                instance.created_at
            ],
        )?;

        if let Some(detail) = link_problem {
            tracing::warn!("Instance {} left unlinked: {detail}", instance.id);
            self.insert_report(&format!("instance {}", instance.id), &detail)?;
        }

        for attachment in attachments {
            self.conn.execute(
                "INSERT INTO instance_attachments
                    (id, instance_id, file_name, content_type, bytes, created_at)
                 VALUES (?, ?, ?, ?, ?, ?)",
                params![
                    new_record_id(),
                    instance.id,
                    attachment.file_name,
                    attachment.content_type,
                    attachment.bytes,
                    instance.created_at
                ],
            )?;
        }

        self.insert_submission(&instance.id)?;
        tx.commit()?;

        Ok(instance)
    }
}
