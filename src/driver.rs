use crate::api::ListApi;
use crate::constants::LOOKUP_PAGE_SIZE;
use crate::data_structures::{Entry, EntryState, ListKind, MediaId};
use crate::errors::{AppError, AppResult};
use crate::logging::{log, LogLevel};
use crate::planner::{PlanOp, Strategy, UpdatePlan, UpdateSpec};
use async_trait::async_trait;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub struct ProgressUpdate {
    pub headline: String,
    pub title: Option<String>,
    pub cover_image: Option<String>,
    pub current: usize,
    pub total: usize,
}

/// The modal prompts a run talks to.
#[async_trait]
pub trait Dialogs: Send + Sync {
    async fn confirm(&self, title: &str, body: &str) -> bool;

    async fn progress(&self, update: &ProgressUpdate);

    async fn close_progress(&self);

    /// `true` retries the failed step, `false` aborts the run.
    async fn retry_or_cancel(&self, message: &str) -> bool;

    /// `true` asks for a reload.
    async fn completed(&self) -> bool;
}

/// Polled between steps; never interrupts a call in flight.
#[derive(Clone, Default, Debug)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Resolving,
    Executing,
    Completed,
    Cancelled,
    Failed,
}

impl RunState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RunState::Completed | RunState::Cancelled | RunState::Failed
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutionProgress {
    pub current: usize,
    pub total: usize,
    pub cancelled: bool,
    pub last_error: Option<String>,
}

#[derive(Debug)]
pub struct RunReport {
    pub state: RunState,
    pub progress: ExecutionProgress,
    /// Entries with at least one call that went through; nothing is rolled back.
    pub applied: usize,
    pub reload: bool,
}

enum Step {
    Done,
    Cancelled,
    Aborted,
}

async fn with_retry<T, F, Fut>(
    dialogs: &dyn Dialogs,
    progress: &mut ExecutionProgress,
    what: &str,
    mut call: F,
) -> Option<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = AppResult<T>>,
{
    loop {
        match call().await {
            Ok(value) => return Some(value),
            Err(e) => {
                log(LogLevel::Warning, &format!("Failed while {}. Err: {}", what, e));
                progress.last_error = Some(e.to_string());
                let message = format!(
                    "An error occurred while {}: {}. Do you want to retry or cancel the request?",
                    what, e
                );
                if !dialogs.retry_or_cancel(&message).await {
                    return None;
                }
            }
        }
    }
}

fn check_page(requested: &[MediaId], states: Vec<EntryState>) -> AppResult<Vec<EntryState>> {
    let found = requested
        .iter()
        .filter(|id| states.iter().any(|s| s.media_id == **id))
        .count();
    if found < requested.len() {
        return Err(AppError::Resolution {
            requested: requested.len(),
            resolved: found,
        });
    }
    Ok(states)
}

pub struct ExecutionDriver<'a> {
    api: &'a dyn ListApi,
    dialogs: &'a dyn Dialogs,
    user_name: &'a str,
    kind: ListKind,
    cancel: CancelFlag,
    state: RunState,
    progress: ExecutionProgress,
    resolved: HashMap<MediaId, EntryState>,
}

impl<'a> ExecutionDriver<'a> {
    pub fn new(
        api: &'a dyn ListApi,
        dialogs: &'a dyn Dialogs,
        user_name: &'a str,
        kind: ListKind,
        cancel: CancelFlag,
    ) -> Self {
        ExecutionDriver {
            api,
            dialogs,
            user_name,
            kind,
            cancel,
            state: RunState::Resolving,
            progress: ExecutionProgress::default(),
            resolved: HashMap::new(),
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub async fn run(&mut self, plan: &UpdatePlan) -> RunReport {
        self.progress = ExecutionProgress {
            total: plan.entries.len(),
            ..Default::default()
        };
        self.resolved.clear();
        let mut applied = 0;

        self.state = RunState::Resolving;
        let outcome = match self.resolve(&plan.entries).await {
            Step::Done => {
                self.state = RunState::Executing;
                match (&plan.op, plan.strategy) {
                    (PlanOp::Delete, _) => self.delete_each(&plan.entries, &mut applied).await,
                    (PlanOp::Update(spec), Strategy::PerEntry) => {
                        self.update_each(spec, &plan.entries, &mut applied).await
                    }
                    (PlanOp::Update(spec), Strategy::Batch) => {
                        self.update_batch(spec, &plan.entries, &mut applied).await
                    }
                }
            }
            other => other,
        };

        self.dialogs.close_progress().await;
        let mut reload = false;
        self.state = match outcome {
            Step::Done => {
                log(
                    LogLevel::Success,
                    &format!("Run complete. {} entries processed.", applied),
                );
                RunState::Completed
            }
            Step::Cancelled => {
                self.progress.cancelled = true;
                log(
                    LogLevel::Warning,
                    &format!("Run cancelled after {}/{} entries.", applied, plan.entries.len()),
                );
                RunState::Cancelled
            }
            Step::Aborted => {
                log(
                    LogLevel::Error,
                    &format!("Run aborted after {}/{} entries.", applied, plan.entries.len()),
                );
                RunState::Failed
            }
        };
        if self.state == RunState::Completed {
            reload = self.dialogs.completed().await;
        }

        RunReport {
            state: self.state,
            progress: self.progress.clone(),
            applied,
            reload,
        }
    }

    async fn resolve(&mut self, entries: &[Entry]) -> Step {
        let media_ids: Vec<MediaId> = entries.iter().map(|e| e.media_id).collect();
        let pages = media_ids.len().div_ceil(LOOKUP_PAGE_SIZE);
        let api = self.api;
        let user_name = self.user_name;

        for (i, chunk) in media_ids.chunks(LOOKUP_PAGE_SIZE).enumerate() {
            if self.cancel.is_cancelled() {
                return Step::Cancelled;
            }
            self.dialogs
                .progress(&ProgressUpdate {
                    headline: format!("Resolving entries (page {}/{})", i + 1, pages),
                    title: None,
                    cover_image: None,
                    current: i * LOOKUP_PAGE_SIZE,
                    total: media_ids.len(),
                })
                .await;
            let states = with_retry(
                self.dialogs,
                &mut self.progress,
                "getting the entry ids",
                move || async move {
                    let states = api.lookup_entries(user_name, chunk).await?;
                    check_page(chunk, states)
                },
            )
            .await;
            match states {
                Some(states) => {
                    for state in states {
                        self.resolved.entry(state.media_id).or_insert(state);
                    }
                }
                None => return Step::Aborted,
            }
        }
        Step::Done
    }

    fn state_of(&self, entry: &Entry) -> AppResult<&EntryState> {
        self.resolved.get(&entry.media_id).ok_or(AppError::Resolution {
            requested: 1,
            resolved: 0,
        })
    }

    /// `done` counts entries finished so far.
    fn announce(&self, headline: String, entry: &Entry, done: usize, total: usize) -> ProgressUpdate {
        let state = self.resolved.get(&entry.media_id);
        ProgressUpdate {
            headline,
            title: Some(
                state
                    .and_then(|s| s.title.clone())
                    .unwrap_or_else(|| entry.title.clone()),
            ),
            cover_image: entry
                .cover_image
                .clone()
                .or_else(|| state.and_then(|s| s.cover_image.clone())),
            current: done,
            total,
        }
    }

    async fn finish_entry(&mut self, headline: &str, entry: &Entry, index: usize, total: usize) {
        self.progress.current = index + 1;
        let update = self.announce(headline.into(), entry, index + 1, total);
        self.dialogs.progress(&update).await;
    }

    async fn delete_each(&mut self, entries: &[Entry], applied: &mut usize) -> Step {
        let api = self.api;
        for (i, entry) in entries.iter().enumerate() {
            if self.cancel.is_cancelled() {
                return Step::Cancelled;
            }
            let entry_id = match self.state_of(entry) {
                Ok(s) => s.entry_id,
                Err(_) => return Step::Aborted,
            };
            let update = self.announce("Deleting".into(), entry, i, entries.len());
            self.dialogs.progress(&update).await;
            let what = format!("deleting {}", update.title.unwrap_or_default());
            if with_retry(self.dialogs, &mut self.progress, &what, move || {
                api.delete_entry(entry_id)
            })
            .await
            .is_none()
            {
                return Step::Aborted;
            }
            *applied += 1;
            self.finish_entry("Deleted", entry, i, entries.len()).await;
        }
        Step::Done
    }

    async fn update_each(
        &mut self,
        spec: &UpdateSpec,
        entries: &[Entry],
        applied: &mut usize,
    ) -> Step {
        let api = self.api;
        let kind = self.kind;
        for (i, entry) in entries.iter().enumerate() {
            if self.cancel.is_cancelled() {
                return Step::Cancelled;
            }
            let state = match self.state_of(entry) {
                Ok(s) => s.clone(),
                Err(_) => return Step::Aborted,
            };
            let media_id = entry.media_id;
            let mut toggled = false;

            if spec.needs_toggle(&state) {
                let adding = spec.favourite == Some(true);
                let headline = if adding {
                    "Adding to favourites"
                } else {
                    "Removing from favourites"
                };
                let update = self.announce(headline.into(), entry, i, entries.len());
                self.dialogs.progress(&update).await;
                let what = format!(
                    "{} {} favourites",
                    update.title.unwrap_or_default(),
                    if adding { "was being added to" } else { "was being removed from" }
                );
                if with_retry(self.dialogs, &mut self.progress, &what, move || {
                    api.toggle_favourite(kind, media_id)
                })
                .await
                .is_none()
                {
                    return Step::Aborted;
                }
                toggled = true;
            }

            if spec.needs_update_call() {
                let values = spec.values_for(&state);
                let values = &values;
                let update = self.announce("Updating".into(), entry, i, entries.len());
                self.dialogs.progress(&update).await;
                let what = format!("updating {}", update.title.unwrap_or_default());
                let entry_id = state.entry_id;
                if with_retry(self.dialogs, &mut self.progress, &what, move || {
                    api.update_entry(entry_id, values)
                })
                .await
                .is_none()
                {
                    // The toggle already went through.
                    if toggled {
                        *applied += 1;
                    }
                    return Step::Aborted;
                }
            }

            *applied += 1;
            self.finish_entry("Updated", entry, i, entries.len()).await;
        }
        Step::Done
    }

    async fn update_batch(
        &mut self,
        spec: &UpdateSpec,
        entries: &[Entry],
        applied: &mut usize,
    ) -> Step {
        if entries.is_empty() {
            return Step::Done;
        }
        if self.cancel.is_cancelled() {
            return Step::Cancelled;
        }
        let mut ids = Vec::with_capacity(entries.len());
        for entry in entries {
            match self.state_of(entry) {
                Ok(s) => ids.push(s.entry_id),
                Err(_) => return Step::Aborted,
            }
        }
        self.dialogs
            .progress(&ProgressUpdate {
                headline: "Updating all the entries at once. Not possible to cancel.".into(),
                title: None,
                cover_image: None,
                current: 0,
                total: entries.len(),
            })
            .await;
        let api = self.api;
        let base = &spec.base;
        let ids = &ids;
        if with_retry(self.dialogs, &mut self.progress, "batch updating", move || {
            api.batch_update(ids, base)
        })
        .await
        .is_none()
        {
            return Step::Aborted;
        }
        *applied = entries.len();
        self.progress.current = entries.len();
        Step::Done
    }
}
