use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE, ORIGIN, REFERER, USER_AGENT};

pub const GRAPHQL_URL: &str = "https://graphql.anilist.co";
pub const SITE_URL: &str = "https://anilist.co";

// The API caps `perPage` at 50.
pub const LOOKUP_PAGE_SIZE: usize = 50;

pub const HTTP_TIMEOUT_SECONDS: u64 = 30;
pub const HTTP_CONNECT_TIMEOUT: u64 = 15;
pub const MAX_QUERY_RETRIES: u32 = 3;
pub const RETRY_BACKOFF_SECONDS: f32 = 1.0;

pub const ADVANCED_SCORE_MAX: f64 = 100.0;

pub static LIST_URL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^https://anilist\.co/user/([^/]+)/(animelist|mangalist)(/.*)?$").unwrap()
});

pub static CSRF_TOKEN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"window\.al_token\s*=\s*["']([^"']+)["']"#).unwrap());

pub static BASE_HEADERS: Lazy<HeaderMap> = Lazy::new(|| {
    let mut headers = HeaderMap::new();
    headers.insert(
        USER_AGENT,
        HeaderValue::from_static(concat!("anilist-batch/", env!("CARGO_PKG_VERSION"))),
    );
    headers.insert(ORIGIN, HeaderValue::from_static(SITE_URL));
    headers.insert(REFERER, HeaderValue::from_static("https://anilist.co/"));
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
    headers
});

pub const ANIME_STATUS_LABELS: [&str; 6] = [
    "Watching",
    "Plan to watch",
    "Completed",
    "Rewatching",
    "Paused",
    "Dropped",
];

pub const MANGA_STATUS_LABELS: [&str; 6] = [
    "Reading",
    "Plan to read",
    "Completed",
    "Rereading",
    "Paused",
    "Dropped",
];
