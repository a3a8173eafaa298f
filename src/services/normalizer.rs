//! Turns raw payloads into identity-keyed update records.

use std::collections::HashSet;

use chrono::{Datelike, NaiveDate};
use log::{debug, info, warn};

use crate::error::Result;
use crate::models::{CleaningConfig, Config, RawItem, RecordConfig, UpdateRecord};
use crate::services::extract::{Extractor, build_extractor};
use crate::services::fetcher::RawPayload;
use crate::services::filter::{InclusionFilter, RecordFilter};

/// Result of normalizing one payload.
#[derive(Debug, Default)]
pub struct NormalizeOutcome {
    /// Records in source order, unique by identity key
    pub records: Vec<UpdateRecord>,

    /// Items dropped because they were malformed
    pub skipped: usize,

    /// Items rejected by the inclusion filter
    pub filtered: usize,
}

impl NormalizeOutcome {
    /// Items the extractor produced, before any were skipped or filtered.
    pub fn extracted(&self) -> usize {
        self.records.len() + self.skipped + self.filtered
    }
}

/// Extraction, cleaning, derivation and filtering for one source.
pub struct Normalizer {
    extractor: Box<dyn Extractor>,
    filter: Box<dyn RecordFilter>,
    cleaning: CleaningConfig,
    record: RecordConfig,
}

impl Normalizer {
    pub fn new(
        extractor: Box<dyn Extractor>,
        filter: Box<dyn RecordFilter>,
        cleaning: CleaningConfig,
        record: RecordConfig,
    ) -> Self {
        Self {
            extractor,
            filter,
            cleaning,
            record,
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(
            build_extractor(&config.extractor, &config.source.name)?,
            Box::new(InclusionFilter::new(&config.filter, &config.record)),
            config.cleaning.clone(),
            config.record.clone(),
        ))
    }

    /// The extraction strategy, also used by the fetcher to count items per page.
    pub fn extractor(&self) -> &dyn Extractor {
        self.extractor.as_ref()
    }

    /// Normalize every page of `payload`.
    ///
    /// A page that cannot be read fails the whole payload. A single bad item
    /// is logged and skipped.
    pub fn normalize(&self, payload: &RawPayload, today: NaiveDate) -> Result<NormalizeOutcome> {
        let mut outcome = NormalizeOutcome::default();
        let mut seen = HashSet::new();
        let mut index = 0usize;

        for page in &payload.pages {
            for item in self.extractor.extract(page)? {
                index += 1;
                let raw = match item {
                    Ok(raw) => raw,
                    Err(e) => {
                        warn!("[{}] Skipping item {}: {}", payload.source_name, index, e);
                        outcome.skipped += 1;
                        continue;
                    }
                };

                let record = match self.build_record(raw, today) {
                    Ok(record) => record,
                    Err(field) => {
                        warn!(
                            "[{}] Skipping item {}: missing identity field `{}`",
                            payload.source_name, index, field
                        );
                        outcome.skipped += 1;
                        continue;
                    }
                };

                match self.filter.accept(&record, today) {
                    Ok(true) => {}
                    Ok(false) => {
                        outcome.filtered += 1;
                        continue;
                    }
                    Err(reason) => {
                        warn!("[{}] Skipping item {}: {}", payload.source_name, index, reason);
                        outcome.skipped += 1;
                        continue;
                    }
                }

                if seen.insert(record.identity_key.clone()) {
                    outcome.records.push(record);
                } else {
                    debug!("[{}] Duplicate {}", payload.source_name, record.identity_key);
                }
            }
        }

        info!(
            "[{}] Normalized {} record(s), {} skipped, {} filtered out",
            payload.source_name,
            outcome.records.len(),
            outcome.skipped,
            outcome.filtered
        );
        Ok(outcome)
    }

    fn build_record(&self, raw: RawItem, today: NaiveDate) -> std::result::Result<UpdateRecord, String> {
        let mut fields: RawItem = raw
            .into_iter()
            .map(|(name, value)| {
                let cleaned = self.cleaning.clean_field(&name, &value, &self.record.date_field);
                (name, cleaned)
            })
            .collect();

        let date = fields
            .get(&self.record.date_field)
            .and_then(|d| NaiveDate::parse_from_str(d, &self.record.date_format).ok());
        if let Some(date) = date {
            let weekday = date.weekday().num_days_from_monday() as usize;
            if let Some(name) = self.record.weekday_names.get(weekday) {
                fields.entry("weekday".to_string()).or_insert_with(|| name.clone());
            }
            fields
                .entry("is_today".to_string())
                .or_insert_with(|| (date == today).to_string());
        }

        UpdateRecord::from_fields(fields, &self.record.identity_fields)
    }
}
