//! One pipeline run: fetch, normalize, plan, notify, commit.

use chrono::{DateTime, FixedOffset, Utc};
use log::{debug, error, info};

use crate::error::{AppError, Result};
use crate::models::{Config, Message, PersistedState, SourceConfig, UpdateRecord};
use crate::pipeline::plan::{NotifyPlan, Planner, SkipReason};
use crate::pipeline::window::local_offset;
use crate::services::{
    ChatSummarizer, HttpFetcher, MessageFormatter, Normalizer, Notifier, NotifyResult, Summarizer,
    WxPusherNotifier,
};
use crate::storage::{JsonStateStore, StateStore};

/// How a run ended. Failures are returned as errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Skipped(SkipReason),
    Notified { records: usize, reset: bool },
    /// Dry run: the message that would have been sent
    DryRun(Option<Message>),
}

/// Fully wired pipeline for one source.
pub struct Pipeline {
    source: SourceConfig,
    fetcher: HttpFetcher,
    normalizer: Normalizer,
    planner: Planner,
    formatter: MessageFormatter,
    store: Box<dyn StateStore>,
    notifier: Box<dyn Notifier>,
    summarizer: Option<Box<dyn Summarizer>>,
    offset: FixedOffset,
}

impl Pipeline {
    /// Wire every component from `config`.
    pub fn from_config(config: &Config) -> Result<Self> {
        let offset = local_offset(config.timezone_offset_hours)?;
        let user_agent = &config.fetcher.user_agent;

        let summarizer: Option<Box<dyn Summarizer>> = if config.summarizer.enabled {
            Some(Box::new(ChatSummarizer::new(&config.summarizer, user_agent)?))
        } else {
            None
        };

        Ok(Self {
            source: config.source.clone(),
            fetcher: HttpFetcher::new(&config.fetcher)?,
            normalizer: Normalizer::from_config(config)?,
            planner: Planner::new(config.window, config.message.display, offset)
                .with_max_records(config.state.max_records),
            formatter: MessageFormatter::new(&config.message, &config.source.name, offset),
            store: Box::new(JsonStateStore::new(&config.state.path)),
            notifier: Box::new(WxPusherNotifier::new(&config.notifier, user_agent)?),
            summarizer,
            offset,
        })
    }

    /// Replace the state backend.
    pub fn with_store(mut self, store: Box<dyn StateStore>) -> Self {
        self.store = store;
        self
    }

    /// Replace the delivery backend.
    pub fn with_notifier(mut self, notifier: Box<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Load the committed state, pruned to the window.
    pub async fn load_state(&self, now: DateTime<Utc>) -> Result<PersistedState> {
        let mut state = match self.store.load().await? {
            Some(state) => state,
            None => {
                info!("No state at {}, starting fresh", self.store.location());
                PersistedState::empty(now)
            }
        };

        let pruned = self.planner.window().prune(&mut state, now);
        if pruned > 0 {
            debug!("Pruned {} expired key(s)", pruned);
        }
        Ok(state)
    }

    /// Run once at `now`.
    ///
    /// State is written only after the notifier confirms delivery, so a
    /// failed run is retried in full next time.
    pub async fn run(&self, now: DateTime<Utc>, dry_run: bool) -> Result<RunOutcome> {
        let name = &self.source.name;
        info!("[{}] Start{}", name, if dry_run { " (dry run)" } else { "" });

        let payload = self.fetcher.fetch(&self.source, self.normalizer.extractor()).await?;
        if payload.is_empty() {
            return Err(AppError::shape(name, "payload is empty"));
        }
        info!("[{}] Fetched {} page(s)", name, payload.pages.len());

        let today = now.with_timezone(&self.offset).date_naive();
        let outcome = self.normalizer.normalize(&payload, today)?;
        if outcome.extracted() == 0 {
            return Err(AppError::shape(name, "no items found in payload"));
        }

        let state = self.load_state(now).await?;
        let plan = self.planner.plan(&outcome.records, &state, now);

        let reset = match &plan {
            NotifyPlan::Skip(reason) => {
                info!("[{}] Nothing to send ({:?})", name, reason);
                return Ok(if dry_run {
                    RunOutcome::DryRun(None)
                } else {
                    RunOutcome::Skipped(*reason)
                });
            }
            NotifyPlan::ResetAndNotify { period_marker, records } => {
                info!(
                    "[{}] New window {} (was {:?}), announcing {} record(s)",
                    name,
                    period_marker,
                    state.period_marker,
                    records.len()
                );
                true
            }
            NotifyPlan::Notify {
                delta_keys, display, ..
            } => {
                info!(
                    "[{}] {} new key(s), displaying {} record(s)",
                    name,
                    delta_keys.len(),
                    display.len()
                );
                false
            }
        };

        let message = self.build_message(plan.display(), now).await;
        if dry_run {
            return Ok(RunOutcome::DryRun(Some(message)));
        }

        match self.notifier.notify(&message).await {
            NotifyResult::Success => {}
            NotifyResult::Failure(reason) => {
                error!("[{}] Notification failed, state left unchanged: {}", name, reason);
                return Err(AppError::notify(reason));
            }
        }

        if let Some(next) = self.planner.commit(&plan, &state, now) {
            self.store.save(&next).await?;
            info!(
                "[{}] Committed {} key(s) for {} to {}",
                name,
                next.len(),
                next.period_marker,
                self.store.location()
            );
        }

        Ok(RunOutcome::Notified {
            records: message.record_count,
            reset,
        })
    }

    async fn build_message(&self, records: &[UpdateRecord], now: DateTime<Utc>) -> Message {
        let summary = match &self.summarizer {
            Some(summarizer) => {
                let context = self.formatter.summary_context(records);
                Some(summarizer.summarize(&context).await)
            }
            None => None,
        };
        self.formatter.format(records, summary.as_deref(), now)
    }
}

/// Build a pipeline from `config` and run it once.
pub async fn run_once(config: &Config, now: DateTime<Utc>, dry_run: bool) -> Result<RunOutcome> {
    if !dry_run {
        config.validate_delivery()?;
    }
    Pipeline::from_config(config)?.run(now, dry_run).await
}
