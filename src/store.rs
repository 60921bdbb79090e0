//! Record store capability and the in-memory implementation used by the
//! `--sample` mode and tests.

use crate::errors::AppError;
use crate::models::{FieldValue, Lead, OutputField};
use chrono::NaiveDate;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Mutex;

/// Which leads to fetch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LeadFilter {
    /// Only leads whose status equals this value (case-insensitive).
    pub status: Option<String>,
    /// Stop after this many leads.
    pub limit: Option<usize>,
}

impl LeadFilter {
    pub fn matches(&self, lead: &Lead) -> bool {
        match &self.status {
            None => true,
            Some(wanted) => lead
                .status
                .as_deref()
                .is_some_and(|s| s.eq_ignore_ascii_case(wanted)),
        }
    }
}

/// Outcome of one write-back.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteReport {
    /// Column names actually written.
    pub written: Vec<String>,
    /// Column names missing from the store; their values were dropped.
    pub skipped_columns: Vec<String>,
}

/// Where leads come from and where derived fields go.
#[allow(async_fn_in_trait)]
pub trait RecordStore {
    async fn query_leads(&self, filter: &LeadFilter) -> Result<Vec<Lead>, AppError>;

    async fn write_properties(
        &self,
        lead_id: &str,
        values: &[(OutputField, FieldValue)],
    ) -> Result<WriteReport, AppError>;

    /// Creates any missing output columns; returns the names created.
    async fn ensure_schema_columns(&self) -> Result<Vec<String>, AppError>;
}

impl<S: RecordStore + ?Sized> RecordStore for &S {
    async fn query_leads(&self, filter: &LeadFilter) -> Result<Vec<Lead>, AppError> {
        (**self).query_leads(filter).await
    }

    async fn write_properties(
        &self,
        lead_id: &str,
        values: &[(OutputField, FieldValue)],
    ) -> Result<WriteReport, AppError> {
        (**self).write_properties(lead_id, values).await
    }

    async fn ensure_schema_columns(&self) -> Result<Vec<String>, AppError> {
        (**self).ensure_schema_columns().await
    }
}

/// Built-in demo leads: one strong, one with nothing but a name.
pub fn sample_leads() -> Vec<Lead> {
    let mut acme = Lead::new("sample-001", "Acme SaaS Corp")
        .with_website("https://acmesaas.com")
        .with_notes(
            "Series B, 200 employees, expanding sales team. Expressed interest in \
             automation tools. VP Sales responded to outreach.",
        )
        .with_status("Qualified");
    acme.last_contacted = NaiveDate::from_ymd_opt(2025, 2, 1);

    let tiny = Lead::new("sample-002", "TinyStart LLC").with_status("New");

    vec![acme, tiny]
}

/// In-memory record store.
///
/// Columns are identified by the output field key. With no explicit column
/// set every output field exists.
#[derive(Debug, Default)]
pub struct MemoryStore {
    leads: Vec<Lead>,
    columns: Mutex<Option<BTreeSet<String>>>,
    writes: Mutex<BTreeMap<String, Vec<(OutputField, FieldValue)>>>,
    failing_writes: HashSet<String>,
    reject_auth: bool,
}

impl MemoryStore {
    pub fn new(leads: Vec<Lead>) -> Self {
        Self {
            leads,
            ..Self::default()
        }
    }

    pub fn sample() -> Self {
        Self::new(sample_leads())
    }

    /// Restricts the store to the given output columns.
    pub fn with_columns<I, S>(self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        *self.columns.lock().unwrap_or_else(|e| e.into_inner()) =
            Some(columns.into_iter().map(Into::into).collect());
        self
    }

    /// Makes every write to `lead_id` fail with an API error.
    pub fn failing_writes_for(mut self, lead_id: impl Into<String>) -> Self {
        self.failing_writes.insert(lead_id.into());
        self
    }

    /// Makes every call fail with an authentication error.
    pub fn rejecting_auth(mut self) -> Self {
        self.reject_auth = true;
        self
    }

    /// Snapshot of everything written so far, keyed by lead id.
    pub fn writes(&self) -> BTreeMap<String, Vec<(OutputField, FieldValue)>> {
        self.writes.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn written_value(&self, lead_id: &str, field: OutputField) -> Option<FieldValue> {
        self.writes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(lead_id)?
            .iter()
            .find(|(f, _)| *f == field)
            .map(|(_, v)| v.clone())
    }

    fn check_auth(&self) -> Result<(), AppError> {
        if self.reject_auth {
            return Err(AppError::Auth("record store rejected credentials".to_string()));
        }
        Ok(())
    }
}

impl RecordStore for MemoryStore {
    async fn query_leads(&self, filter: &LeadFilter) -> Result<Vec<Lead>, AppError> {
        self.check_auth()?;
        Ok(self
            .leads
            .iter()
            .filter(|lead| filter.matches(lead))
            .take(filter.limit.unwrap_or(usize::MAX))
            .cloned()
            .collect())
    }

    async fn write_properties(
        &self,
        lead_id: &str,
        values: &[(OutputField, FieldValue)],
    ) -> Result<WriteReport, AppError> {
        self.check_auth()?;
        if self.failing_writes.contains(lead_id) {
            return Err(AppError::ExternalApi(format!(
                "write to {} rejected",
                lead_id
            )));
        }

        let columns = self.columns.lock().unwrap_or_else(|e| e.into_inner()).clone();
        let mut report = WriteReport::default();
        let mut kept = Vec::with_capacity(values.len());

        for (field, value) in values {
            let column = field.key().to_string();
            let exists = columns.as_ref().map_or(true, |c| c.contains(&column));
            if exists {
                report.written.push(column);
                kept.push((*field, value.clone()));
            } else {
                report.skipped_columns.push(column);
            }
        }

        self.writes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(lead_id.to_string(), kept);
        Ok(report)
    }

    async fn ensure_schema_columns(&self) -> Result<Vec<String>, AppError> {
        self.check_auth()?;
        let mut guard = self.columns.lock().unwrap_or_else(|e| e.into_inner());
        let Some(columns) = guard.as_mut() else {
            return Ok(Vec::new());
        };

        let mut created = Vec::new();
        for field in OutputField::ALL {
            if columns.insert(field.key().to_string()) {
                created.push(field.key().to_string());
            }
        }
        Ok(created)
    }
}
