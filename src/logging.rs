use chrono::Utc;
use colored::*;
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::fmt;
use tracing::Level;
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::time::FormatTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogLevel {
    Step,
    Info,
    Success,
    Warning,
    Error,
}

static LOG_LEVEL_CONFIG: Lazy<HashMap<LogLevel, (&'static str, Color)>> = Lazy::new(|| {
    HashMap::from([
        (LogLevel::Step, ("STEP", Color::Magenta)),
        (LogLevel::Info, ("INFO", Color::Blue)),
        (LogLevel::Success, ("SUCCESS", Color::Green)),
        (LogLevel::Warning, ("WARNING", Color::Yellow)),
        (LogLevel::Error, ("ERROR", Color::Red)),
    ])
});

static MAX_LEVEL_LEN: Lazy<usize> = Lazy::new(|| {
    LOG_LEVEL_CONFIG
        .values()
        .map(|(s, _)| s.len())
        .max()
        .unwrap_or(7)
});
const MIN_PADDING_AFTER_BRACKET: usize = 1;
static TARGET_TOTAL_PREFIX_WIDTH: Lazy<usize> =
    Lazy::new(|| *MAX_LEVEL_LEN + 4 + MIN_PADDING_AFTER_BRACKET);

static LOG_PREFIXES: Lazy<HashMap<LogLevel, String>> = Lazy::new(|| {
    LOG_LEVEL_CONFIG
        .iter()
        .map(|(level, (level_str, color))| {
            let padding = TARGET_TOTAL_PREFIX_WIDTH.saturating_sub(level_str.len() + 4);
            let inside = format!(" {} ", level_str);
            (
                *level,
                format!("[{}]{}", inside.color(*color).bold(), " ".repeat(padding)),
            )
        })
        .collect()
});

struct ChronoUtcTimer;
impl FormatTime for ChronoUtcTimer {
    fn format_time(&self, w: &mut Writer<'_>) -> fmt::Result {
        write!(w, "{}", Utc::now().format("%Y-%m-%d %H:%M:%S%.3f %Z"))
    }
}

pub fn setup_logging() {
    let format = tracing_subscriber::fmt::format()
        .with_timer(ChronoUtcTimer)
        .with_target(false)
        .compact();

    let _ = tracing_subscriber::fmt()
        .event_format(format)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(Level::WARN.into())
                .from_env_lossy(),
        )
        .try_init();
}

pub fn prefix(level: LogLevel) -> String {
    LOG_PREFIXES.get(&level).cloned().unwrap_or_else(|| {
        format!(
            "[ {} ]    ",
            LOG_LEVEL_CONFIG.get(&level).map_or("UNKNOWN", |(s, _)| *s)
        )
    })
}

pub fn log(level: LogLevel, message: &str) {
    match level {
        LogLevel::Error => eprintln!("{}{}", prefix(level), message),
        _ => println!("{}{}", prefix(level), message),
    }
}
