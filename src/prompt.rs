use crate::driver::{Dialogs, ProgressUpdate};
use crate::errors::{AppError, AppResult};
use crate::logging::{log, prefix, LogLevel};
use async_trait::async_trait;
use colored::Colorize;
use std::io::{self, BufRead, Write};

pub async fn run_blocking<F, T>(func: F) -> AppResult<T>
where
    F: FnOnce() -> AppResult<T> + Send + 'static,
    T: Send + 'static,
{
    match tokio::task::spawn_blocking(func).await {
        Ok(Ok(res)) => Ok(res),
        Ok(Err(e)) => Err(e),
        Err(e) => Err(AppError::JoinError(e)),
    }
}

/// `None` once stdin is closed.
async fn ask(question: String) -> AppResult<Option<String>> {
    run_blocking(move || {
        let mut out = io::stdout().lock();
        write!(out, "{} ", question)?;
        out.flush()?;
        let mut line = String::new();
        let read = io::stdin().lock().read_line(&mut line)?;
        Ok((read > 0).then(|| line.trim().to_string()))
    })
    .await
}

pub fn parse_yes_no(input: &str) -> Option<bool> {
    match input.trim().to_lowercase().as_str() {
        "y" | "yes" => Some(true),
        "" | "n" | "no" => Some(false),
        _ => None,
    }
}

/// `Some(true)` retries, `Some(false)` cancels.
pub fn parse_retry(input: &str) -> Option<bool> {
    match input.trim().to_lowercase().as_str() {
        "r" | "retry" => Some(true),
        "c" | "cancel" => Some(false),
        _ => None,
    }
}

pub fn progress_line(update: &ProgressUpdate) -> String {
    let counter = format!("[{}/{}]", update.current, update.total);
    match &update.title {
        Some(title) => format!("{} {}: {}", counter.dimmed(), update.headline, title.bold()),
        None => format!("{} {}", counter.dimmed(), update.headline),
    }
}

/// Dialogs on stdin/stdout. Answers that cannot be read count as cancel.
pub struct TerminalDialogs {
    assume_yes: bool,
}

impl TerminalDialogs {
    pub fn new(assume_yes: bool) -> Self {
        TerminalDialogs { assume_yes }
    }

    async fn choose(&self, question: &str, parse: fn(&str) -> Option<bool>) -> bool {
        loop {
            match ask(question.to_string()).await {
                Ok(Some(answer)) => match parse(&answer) {
                    Some(choice) => return choice,
                    None => log(LogLevel::Warning, &format!("Unrecognised answer '{}'", answer)),
                },
                Ok(None) => return false,
                Err(e) => {
                    log(LogLevel::Error, &format!("Could not read answer. Err: {}", e));
                    return false;
                }
            }
        }
    }
}

#[async_trait]
impl Dialogs for TerminalDialogs {
    async fn confirm(&self, title: &str, body: &str) -> bool {
        println!("\n{}\n{}", title.bold(), body);
        if self.assume_yes {
            return true;
        }
        self.choose("Confirm? [y/N]", parse_yes_no).await
    }

    async fn progress(&self, update: &ProgressUpdate) {
        println!("{}{}", prefix(LogLevel::Step), progress_line(update));
        if let Some(cover) = &update.cover_image {
            tracing::debug!(cover = %cover, "progress cover");
        }
    }

    async fn close_progress(&self) {
        println!();
    }

    async fn retry_or_cancel(&self, message: &str) -> bool {
        log(LogLevel::Error, message);
        self.choose("[r]etry / [c]ancel?", parse_retry).await
    }

    async fn completed(&self) -> bool {
        log(LogLevel::Success, "All items have been successfully updated.");
        if self.assume_yes {
            return false;
        }
        self.choose("Reload the entries to see the changes? [y/N]", parse_yes_no)
            .await
    }
}
