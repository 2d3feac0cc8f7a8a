mod api;
mod constants;
mod data_structures;
mod driver;
mod errors;
mod form;
mod logging;
mod planner;
mod prompt;
mod session;

use crate::api::{scrape_csrf_token, ApiClient, Credentials, ListApi};
use crate::constants::LOOKUP_PAGE_SIZE;
use crate::data_structures::*;
use crate::driver::{CancelFlag, Dialogs, ExecutionDriver, RunState};
use crate::errors::{AppError, AppResult};
use crate::form::{Field, FieldValue, FormSnapshot, FormState, ToggleField, TriState};
use crate::logging::{log, setup_logging, LogLevel};
use crate::planner::{plan, PlanOp, Strategy, UpdatePlan};
use crate::prompt::TerminalDialogs;
use crate::session::{entries_noun, selection_label, Selection, SessionContext};

use chrono::Utc;
use clap::Parser;
use std::path::PathBuf;
use std::time::Instant;
use tokio::fs;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Apply one set of changes to many entries of an AniList anime or manga list",
    long_about = None,
    arg_required_else_help = true
)]
struct CliArgs {
    /// List URL, e.g. https://anilist.co/user/NAME/animelist
    #[arg(short, long, value_name = "URL")]
    list: String,

    #[arg(long, env = "ANILIST_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Saved AniList page to read the session CSRF token from.
    #[arg(long, value_name = "FILE")]
    csrf_page: Option<PathBuf>,

    /// Session cookie sent along with the CSRF token.
    #[arg(long, env = "ANILIST_COOKIE", hide_env_values = true, requires = "csrf_page")]
    cookie: Option<String>,

    #[arg(required = true, num_args = 1.., value_name = "MEDIA_ID")]
    media_ids: Vec<MediaId>,

    #[arg(long)]
    status: Option<String>,

    #[arg(long)]
    score: Option<f64>,

    #[arg(long = "advanced-score", value_name = "NAME=VALUE", value_parser = parse_advanced_score)]
    advanced_scores: Vec<(String, f64)>,

    #[arg(long)]
    progress: Option<u32>,

    /// Volume progress (manga only).
    #[arg(long)]
    volumes: Option<u32>,

    #[arg(long)]
    repeat: Option<u32>,

    #[arg(long, value_name = "YYYY-MM-DD")]
    started_at: Option<String>,

    #[arg(long, value_name = "YYYY-MM-DD")]
    completed_at: Option<String>,

    #[arg(long)]
    notes: Option<String>,

    #[arg(long = "add-list", value_name = "NAME")]
    add_lists: Vec<String>,

    #[arg(long = "remove-list", value_name = "NAME")]
    remove_lists: Vec<String>,

    #[arg(long, value_name = "BOOL")]
    hide_from_status_lists: Option<bool>,

    #[arg(long, value_name = "BOOL")]
    private: Option<bool>,

    #[arg(long, value_name = "BOOL")]
    favourite: Option<bool>,

    #[arg(long)]
    delete: bool,

    /// Answer the confirmation prompt with yes.
    #[arg(short, long)]
    yes: bool,

    /// Print the plan and stop.
    #[arg(long)]
    dry_run: bool,
}

fn parse_advanced_score(raw: &str) -> Result<(String, f64), String> {
    let (name, value) = raw
        .rsplit_once('=')
        .ok_or_else(|| format!("expected NAME=VALUE, got '{}'", raw))?;
    let value = value
        .trim()
        .parse::<f64>()
        .map_err(|e| format!("bad score '{}': {}", value, e))?;
    Ok((name.trim().to_string(), value))
}

fn enable(form: &mut FormState, field: Field, value: FieldValue) -> AppResult<()> {
    form.set_field_enabled(&field, true)?;
    form.set_field_value(&field, value)
}

fn fill_form(form: &mut FormState, args: &CliArgs) -> AppResult<()> {
    let kind = form.context().kind;
    if let Some(raw) = &args.status {
        let status = MediaListStatus::parse(kind, raw).ok_or_else(|| {
            AppError::Argument(format!(
                "Unknown status '{}'. Expected one of: {}",
                raw,
                kind.status_labels().join(", ")
            ))
        })?;
        enable(form, Field::Status, FieldValue::Status(status))?;
    }
    if let Some(score) = args.score {
        enable(form, Field::Score, FieldValue::Number(score))?;
    }
    for (name, value) in &args.advanced_scores {
        enable(form, Field::AdvancedScore(name.clone()), FieldValue::Number(*value))?;
    }
    let counters = [
        (Field::Progress, args.progress),
        (Field::ProgressVolumes, args.volumes),
        (Field::Repeat, args.repeat),
    ];
    for (field, value) in counters {
        if let Some(n) = value {
            enable(form, field, FieldValue::Number(n as f64))?;
        }
    }
    for (field, input) in [
        (Field::StartedAt, &args.started_at),
        (Field::CompletedAt, &args.completed_at),
    ] {
        if let Some(input) = input {
            form.set_field_enabled(&field, true)?;
            form.set_date_input(&field, input)?;
        }
    }
    if let Some(notes) = &args.notes {
        enable(form, Field::Notes, FieldValue::Text(notes.clone()))?;
    }

    for name in &args.add_lists {
        form.set_field_state(&ToggleField::CustomList(name.clone()), TriState::Checked)?;
    }
    for name in &args.remove_lists {
        form.set_field_state(&ToggleField::CustomList(name.clone()), TriState::Unchecked)?;
    }
    let toggles = [
        (ToggleField::HiddenFromStatusLists, args.hide_from_status_lists),
        (ToggleField::Private, args.private),
        (ToggleField::Favourite, args.favourite),
    ];
    for (field, value) in toggles {
        if let Some(v) = value {
            form.set_field_state(&field, TriState::from_bool(v))?;
        }
    }
    form.set_delete(args.delete);
    Ok(())
}

async fn load_credentials(args: &CliArgs) -> AppResult<Credentials> {
    if let Some(path) = &args.csrf_page {
        let html = fs::read_to_string(path).await?;
        let token = scrape_csrf_token(&html)?;
        log(
            LogLevel::Info,
            &format!("Using CSRF token from {}", path.display()),
        );
        return Ok(Credentials::Csrf {
            token,
            cookie: args.cookie.clone(),
        });
    }
    match &args.token {
        Some(token) if !token.trim().is_empty() => Ok(Credentials::Bearer(token.trim().to_string())),
        _ => Err(AppError::MissingToken),
    }
}

fn confirmation_text(snapshot: &FormSnapshot, plan: &UpdatePlan) -> (String, String) {
    let noun = entries_noun(plan.entries.len());
    let title = match plan.op {
        PlanOp::Delete => format!("Are you sure you want to delete {}?", noun),
        PlanOp::Update(_) => format!("Are you sure you want to update {}?", noun),
    };
    let mut body = String::new();
    if snapshot.delete {
        body.push_str("This cannot be undone.\n");
    }
    for action in &plan.actions {
        body.push_str(&format!("  - {}\n", action));
    }
    if plan.strategy == Strategy::Batch {
        body.push_str("All entries are updated in one request.");
    } else {
        body.push_str("Entries are processed one at a time.");
    }
    (title, body)
}

async fn reload_entries(api: &dyn ListApi, ctx: &SessionContext, entries: &[Entry]) -> AppResult<()> {
    log(LogLevel::Step, "Reloading entries...");
    let ids: Vec<MediaId> = entries.iter().map(|e| e.media_id).collect();
    let mut states = Vec::with_capacity(ids.len());
    for chunk in ids.chunks(LOOKUP_PAGE_SIZE) {
        states.extend(api.lookup_entries(&ctx.user_name, chunk).await?);
    }
    for entry in entries {
        match states.iter().find(|s| s.media_id == entry.media_id) {
            Some(state) => {
                let lists: Vec<&str> = state
                    .custom_lists
                    .iter()
                    .filter(|(_, on)| **on)
                    .map(|(name, _)| name.as_str())
                    .collect();
                log(
                    LogLevel::Info,
                    &format!(
                        "{} (#{}, entry {}) favourite: {}, lists: {}",
                        state.title.as_deref().unwrap_or(&entry.title),
                        state.media_id,
                        state.entry_id,
                        if state.is_favourite { "yes" } else { "no" },
                        if lists.is_empty() { "-".to_string() } else { lists.join(", ") }
                    ),
                );
            }
            None => log(
                LogLevel::Warning,
                &format!("#{} is no longer on the list", entry.media_id),
            ),
        }
    }
    Ok(())
}

/// A failed reload is reported but never changes the run's outcome.
async fn reload_after_run(api: &dyn ListApi, ctx: &SessionContext, entries: &[Entry]) -> bool {
    match reload_entries(api, ctx, entries).await {
        Ok(()) => true,
        Err(e) => {
            log(LogLevel::Warning, &format!("Reload failed. Err: {}", e));
            false
        }
    }
}

fn exit_code(state: RunState) -> i32 {
    match state {
        RunState::Completed => 0,
        RunState::Cancelled => 2,
        _ => 1,
    }
}

#[tokio::main]
async fn main() {
    let exit_code = match main_async().await {
        Ok(code) => code,
        Err(e) => {
            log(LogLevel::Error, &format!("FATAL ERROR: {}", e));
            1
        }
    };
    log(LogLevel::Info, &format!("Exiting with code {}.", exit_code));
    std::process::exit(exit_code);
}

async fn main_async() -> AppResult<i32> {
    setup_logging();
    let args = CliArgs::parse();
    let start_time = Instant::now();

    let ctx = SessionContext::from_url(&args.list)?;
    log(
        LogLevel::Step,
        &format!("Editing {}'s {} list", ctx.user_name, ctx.kind),
    );

    let mut selection = Selection::new(ctx.clone());
    selection.subscribe(|change| tracing::debug!(count = change.count, "selection changed"));
    for id in &args.media_ids {
        if !selection.select(Entry::new(*id, format!("#{}", id))) {
            log(LogLevel::Warning, &format!("#{} was given twice, ignoring", id));
        }
    }
    log(LogLevel::Info, &selection_label(selection.len()));

    let client = ApiClient::new(load_credentials(&args).await?)?;
    let options = client.list_options(&ctx.user_name, ctx.kind).await?;
    tracing::debug!(?options, "list options");

    let mut form = FormState::new(ctx.clone(), options);
    fill_form(&mut form, &args)?;
    let snapshot = form.snapshot();
    let plan = plan(&snapshot, &selection.snapshot())?;

    let strategy = match plan.strategy {
        Strategy::Batch => "batch",
        Strategy::PerEntry => "per-entry",
    };
    log(
        LogLevel::Info,
        &format!("Plan: {} over {}", strategy, entries_noun(plan.entries.len())),
    );
    if args.dry_run {
        for action in &plan.actions {
            println!("  - {}", action);
        }
        return Ok(0);
    }

    let dialogs = TerminalDialogs::new(args.yes);
    let (title, body) = confirmation_text(&snapshot, &plan);
    if !dialogs.confirm(&title, &body).await {
        log(LogLevel::Warning, "Nothing was changed.");
        return Ok(2);
    }

    let cancel = CancelFlag::default();
    let ctrl_c = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            while tokio::signal::ctrl_c().await.is_ok() {
                log(
                    LogLevel::Warning,
                    "Cancelling after the current entry...",
                );
                cancel.cancel();
            }
        })
    };

    let mut driver = ExecutionDriver::new(&client, &dialogs, &ctx.user_name, ctx.kind, cancel);
    let report = driver.run(&plan).await;
    ctrl_c.abort();

    if report.reload {
        reload_after_run(&client, &ctx, &plan.entries).await;
    }

    let sep = "=".repeat(60);
    println!("{}", sep);
    println!(
        "{} {}/{} applied in {:.2?}",
        match report.state {
            RunState::Completed => "Completed:",
            RunState::Cancelled => "Cancelled:",
            _ => "Failed:",
        },
        report.applied,
        report.progress.total,
        start_time.elapsed()
    );
    if let Some(err) = &report.progress.last_error {
        println!("Last error: {}", err);
    }
    println!("{}", sep);
    log(
        LogLevel::Step,
        &format!(
            "--- Finished at {} ---",
            Utc::now().format("%Y-%m-%d %H:%M:%S %Z")
        ),
    );

    Ok(exit_code(report.state))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(extra: &[&str]) -> CliArgs {
        let mut argv = vec![
            "anilist-batch",
            "--list",
            "https://anilist.co/user/a/mangalist",
            "--token",
            "t",
            "1",
            "2",
        ];
        argv.extend_from_slice(extra);
        CliArgs::try_parse_from(argv).unwrap()
    }

    fn manga_form() -> FormState {
        let ctx = SessionContext::from_url("https://anilist.co/user/a/mangalist").unwrap();
        FormState::new(
            ctx,
            ListOptions {
                custom_lists: vec!["Owned".into(), "Digital".into()],
                advanced_scores: vec!["Story".into(), "Art".into()],
                ..Default::default()
            },
        )
    }

    #[test]
    fn parses_advanced_score_pairs() {
        assert_eq!(
            parse_advanced_score("Story=7.5").unwrap(),
            ("Story".to_string(), 7.5)
        );
        assert_eq!(
            parse_advanced_score("A=B=3").unwrap(),
            ("A=B".to_string(), 3.0)
        );
        assert!(parse_advanced_score("Story").is_err());
    }

    #[test]
    fn flags_fill_the_form() {
        let a = args(&[
            "--status",
            "plan to read",
            "--volumes",
            "3",
            "--advanced-score",
            "Art=80",
            "--add-list",
            "Owned",
            "--favourite",
            "true",
        ]);
        let mut form = manga_form();
        fill_form(&mut form, &a).unwrap();
        let snap = form.snapshot();
        assert_eq!(snap.status, Some(MediaListStatus::Planning));
        assert_eq!(snap.progress_volumes, Some(3));
        assert_eq!(
            snap.advanced_scores,
            vec![("Story".into(), None), ("Art".into(), Some(80.0))]
        );
        assert_eq!(
            snap.custom_lists,
            vec![
                ("Owned".into(), TriState::Checked),
                ("Digital".into(), TriState::Indeterminate)
            ]
        );
        assert_eq!(snap.favourite, TriState::Checked);
    }

    #[test]
    fn unknown_status_and_list_are_argument_errors() {
        let mut form = manga_form();
        let bad_status = args(&["--status", "Watching"]);
        assert!(matches!(
            fill_form(&mut form, &bad_status),
            Err(AppError::Argument(_))
        ));
        let mut form = manga_form();
        let bad_list = args(&["--remove-list", "Nope"]);
        assert!(matches!(
            fill_form(&mut form, &bad_list),
            Err(AppError::Argument(_))
        ));
    }

    #[test]
    fn confirmation_counts_entries() {
        let mut snap = FormSnapshot::empty(ListKind::Manga);
        snap.delete = true;
        let p = plan(&snap, &[Entry::new(1, "x")]).unwrap();
        let (title, body) = confirmation_text(&snap, &p);
        assert_eq!(title, "Are you sure you want to delete 1 entry?");
        assert!(body.contains("Delete."));
    }

    struct UnreachableApi;

    #[async_trait::async_trait]
    impl ListApi for UnreachableApi {
        async fn list_options(&self, _: &str, _: ListKind) -> AppResult<ListOptions> {
            Err(AppError::Timeout)
        }

        async fn lookup_entries(&self, _: &str, _: &[MediaId]) -> AppResult<Vec<EntryState>> {
            Err(AppError::GraphQl {
                status: 500,
                messages: vec!["down".into()],
            })
        }

        async fn update_entry(&self, _: EntryId, _: &UpdateValues) -> AppResult<()> {
            Err(AppError::Timeout)
        }

        async fn batch_update(&self, _: &[EntryId], _: &UpdateValues) -> AppResult<()> {
            Err(AppError::Timeout)
        }

        async fn delete_entry(&self, _: EntryId) -> AppResult<()> {
            Err(AppError::Timeout)
        }

        async fn toggle_favourite(&self, _: ListKind, _: MediaId) -> AppResult<()> {
            Err(AppError::Timeout)
        }
    }

    #[tokio::test]
    async fn failed_reload_keeps_completed_exit_code() {
        let ctx = SessionContext::from_url("https://anilist.co/user/a/animelist").unwrap();
        let entries = [Entry::new(1, "x")];
        assert!(reload_entries(&UnreachableApi, &ctx, &entries).await.is_err());
        assert!(!reload_after_run(&UnreachableApi, &ctx, &entries).await);
        assert_eq!(exit_code(RunState::Completed), 0);
        assert_eq!(exit_code(RunState::Cancelled), 2);
        assert_eq!(exit_code(RunState::Failed), 1);
    }

    #[tokio::test]
    async fn missing_token_is_reported() {
        let mut a = args(&[]);
        a.token = None;
        assert!(matches!(
            load_credentials(&a).await,
            Err(AppError::MissingToken)
        ));
    }
}
