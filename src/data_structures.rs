use crate::constants::{ADVANCED_SCORE_MAX, ANIME_STATUS_LABELS, MANGA_STATUS_LABELS};
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

pub type MediaId = i64;
pub type EntryId = i64;

fn deserialize_null_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ListKind {
    Anime,
    Manga,
}

impl ListKind {
    pub fn status_labels(self) -> &'static [&'static str; 6] {
        match self {
            ListKind::Anime => &ANIME_STATUS_LABELS,
            ListKind::Manga => &MANGA_STATUS_LABELS,
        }
    }
}

impl fmt::Display for ListKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ListKind::Anime => f.write_str("anime"),
            ListKind::Manga => f.write_str("manga"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MediaListStatus {
    Current,
    Planning,
    Completed,
    Repeating,
    Paused,
    Dropped,
}

impl MediaListStatus {
    // Same order as the label tables in constants.
    pub const ALL: [MediaListStatus; 6] = [
        MediaListStatus::Current,
        MediaListStatus::Planning,
        MediaListStatus::Completed,
        MediaListStatus::Repeating,
        MediaListStatus::Paused,
        MediaListStatus::Dropped,
    ];

    pub fn api_name(self) -> &'static str {
        match self {
            MediaListStatus::Current => "CURRENT",
            MediaListStatus::Planning => "PLANNING",
            MediaListStatus::Completed => "COMPLETED",
            MediaListStatus::Repeating => "REPEATING",
            MediaListStatus::Paused => "PAUSED",
            MediaListStatus::Dropped => "DROPPED",
        }
    }

    pub fn label(self, kind: ListKind) -> &'static str {
        let idx = Self::ALL.iter().position(|s| *s == self).unwrap_or(0);
        kind.status_labels()[idx]
    }

    /// Accepts either the list-specific label or the API name.
    pub fn parse(kind: ListKind, input: &str) -> Option<Self> {
        let needle = input.trim();
        Self::ALL.iter().copied().find(|s| {
            s.label(kind).eq_ignore_ascii_case(needle) || s.api_name().eq_ignore_ascii_case(needle)
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ScoreFormat {
    #[serde(rename = "POINT_100")]
    Point100,
    #[serde(rename = "POINT_10_DECIMAL")]
    Point10Decimal,
    #[default]
    #[serde(rename = "POINT_10")]
    Point10,
    #[serde(rename = "POINT_5")]
    Point5,
    #[serde(rename = "POINT_3")]
    Point3,
}

impl ScoreFormat {
    pub fn range(self) -> NumberRange {
        match self {
            ScoreFormat::Point100 => NumberRange::new(0.0, Some(100.0), Some(1.0)),
            ScoreFormat::Point10Decimal => NumberRange::new(0.0, Some(10.0), Some(0.5)),
            ScoreFormat::Point10 => NumberRange::new(0.0, Some(10.0), Some(1.0)),
            ScoreFormat::Point5 => NumberRange::new(0.0, Some(5.0), Some(1.0)),
            ScoreFormat::Point3 => NumberRange::new(0.0, Some(3.0), Some(1.0)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NumberRange {
    pub min: f64,
    pub max: Option<f64>,
    pub step: Option<f64>,
}

impl NumberRange {
    pub const fn new(min: f64, max: Option<f64>, step: Option<f64>) -> Self {
        NumberRange { min, max, step }
    }

    pub const fn counter() -> Self {
        NumberRange::new(0.0, None, Some(1.0))
    }

    pub const fn advanced_score() -> Self {
        NumberRange::new(0.0, Some(ADVANCED_SCORE_MAX), None)
    }

    /// Snaps to the step grid anchored at `min`, then bounds to `[min, max]`.
    pub fn clamp(&self, value: f64) -> f64 {
        if !value.is_finite() {
            return self.min;
        }
        let mut v = value;
        if let Some(step) = self.step.filter(|s| *s > 0.0) {
            v = self.min + ((v - self.min) / step).round() * step;
        }
        if let Some(max) = self.max {
            if v > max {
                v = match self.step.filter(|s| *s > 0.0) {
                    Some(step) => self.min + ((max - self.min) / step).floor() * step,
                    None => max,
                };
            }
        }
        v.max(self.min)
    }
}

/// AniList's partial date. An empty value clears the date.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FuzzyDate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub month: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub day: Option<u32>,
}

impl FuzzyDate {
    /// Parses `YYYY-MM-DD`. Incomplete or impossible dates become the empty date.
    pub fn parse_input(input: &str) -> Self {
        let parts: Vec<&str> = input.trim().split('-').collect();
        if parts.len() != 3 {
            return FuzzyDate::default();
        }
        let parsed = (
            parts[0].parse::<i32>().ok(),
            parts[1].parse::<u32>().ok(),
            parts[2].parse::<u32>().ok(),
        );
        match parsed {
            (Some(y), Some(m), Some(d)) => match NaiveDate::from_ymd_opt(y, m, d) {
                Some(date) => FuzzyDate {
                    year: Some(date.year()),
                    month: Some(date.month()),
                    day: Some(date.day()),
                },
                None => FuzzyDate::default(),
            },
            _ => FuzzyDate::default(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.year.is_none() && self.month.is_none() && self.day.is_none()
    }
}

impl fmt::Display for FuzzyDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.year, self.month, self.day) {
            (Some(y), Some(m), Some(d)) => write!(f, "{:04}-{:02}-{:02}", y, m, d),
            _ => f.write_str("nothing"),
        }
    }
}

/// One selected list item as seen on the list page.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    pub media_id: MediaId,
    pub title: String,
    pub cover_image: Option<String>,
}

impl Entry {
    pub fn new(media_id: MediaId, title: impl Into<String>) -> Self {
        Entry {
            media_id,
            title: title.into(),
            cover_image: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ListOptions {
    pub score_format: ScoreFormat,
    pub custom_lists: Vec<String>,
    /// Empty when advanced scoring is disabled for the list kind.
    pub advanced_scores: Vec<String>,
}

/// Per-entry state read during resolution, cached for the whole run.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EntryState {
    pub entry_id: EntryId,
    pub media_id: MediaId,
    pub title: Option<String>,
    pub cover_image: Option<String>,
    pub is_favourite: bool,
    pub custom_lists: BTreeMap<String, bool>,
    pub advanced_scores: HashMap<String, f64>,
}

/// Variables shared by the single-entry and multi-entry save mutations.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateValues {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<MediaListStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress_volumes: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repeat: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub private: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hidden_from_status_lists: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_lists: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub advanced_scores: Option<Vec<f64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<FuzzyDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<FuzzyDate>,
}

impl UpdateValues {
    pub fn is_empty(&self) -> bool {
        *self == UpdateValues::default()
    }
}

#[derive(Serialize, Debug)]
pub struct GraphQlRequest<'a> {
    pub query: &'a str,
    pub variables: serde_json::Value,
}

#[derive(Deserialize, Debug, Default)]
pub struct GraphQlErrorItem {
    #[serde(default)]
    pub message: String,
}

#[derive(Deserialize, Debug, Default)]
pub struct GraphQlResponse {
    #[serde(default)]
    pub data: Option<serde_json::Value>,
    #[serde(default, deserialize_with = "deserialize_null_default")]
    pub errors: Vec<GraphQlErrorItem>,
}

#[derive(Deserialize, Debug, Default)]
pub struct RawTitle {
    #[serde(rename = "userPreferred", default)]
    pub user_preferred: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
pub struct RawCover {
    #[serde(default)]
    pub medium: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct RawMedia {
    #[serde(default)]
    pub is_favourite: bool,
    #[serde(default)]
    pub title: Option<RawTitle>,
    #[serde(default)]
    pub cover_image: Option<RawCover>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct RawMediaList {
    pub id: EntryId,
    pub media_id: MediaId,
    #[serde(default, deserialize_with = "deserialize_null_default")]
    pub custom_lists: BTreeMap<String, bool>,
    #[serde(default, deserialize_with = "deserialize_null_default")]
    pub advanced_scores: HashMap<String, f64>,
    #[serde(default)]
    pub media: Option<RawMedia>,
}

impl From<RawMediaList> for EntryState {
    fn from(raw: RawMediaList) -> Self {
        let media = raw.media.unwrap_or_default();
        EntryState {
            entry_id: raw.id,
            media_id: raw.media_id,
            title: media.title.and_then(|t| t.user_preferred),
            cover_image: media.cover_image.and_then(|c| c.medium),
            is_favourite: media.is_favourite,
            custom_lists: raw.custom_lists,
            advanced_scores: raw.advanced_scores,
        }
    }
}

#[derive(Deserialize, Debug, Default)]
pub struct LookupPage {
    #[serde(rename = "mediaList", default, deserialize_with = "deserialize_null_default")]
    pub media_list: Vec<RawMediaList>,
}

#[derive(Deserialize, Debug)]
pub struct LookupData {
    #[serde(rename = "Page")]
    pub page: LookupPage,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct RawListTypeOptions {
    #[serde(default, deserialize_with = "deserialize_null_default")]
    pub custom_lists: Vec<String>,
    #[serde(default, deserialize_with = "deserialize_null_default")]
    pub advanced_scoring: Vec<String>,
    #[serde(default)]
    pub advanced_scoring_enabled: bool,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct RawMediaListOptions {
    #[serde(default)]
    pub score_format: Option<ScoreFormat>,
    #[serde(default)]
    pub anime_list: Option<RawListTypeOptions>,
    #[serde(default)]
    pub manga_list: Option<RawListTypeOptions>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct RawUser {
    #[serde(default)]
    pub media_list_options: Option<RawMediaListOptions>,
}

#[derive(Deserialize, Debug)]
pub struct UserOptionsData {
    #[serde(rename = "User")]
    pub user: Option<RawUser>,
}

impl RawMediaListOptions {
    pub fn into_list_options(self, kind: ListKind) -> ListOptions {
        let per_kind = match kind {
            ListKind::Anime => self.anime_list,
            ListKind::Manga => self.manga_list,
        }
        .unwrap_or_default();
        ListOptions {
            score_format: self.score_format.unwrap_or_default(),
            custom_lists: per_kind.custom_lists,
            advanced_scores: if per_kind.advanced_scoring_enabled {
                per_kind.advanced_scoring
            } else {
                Vec::new()
            },
        }
    }
}

#[derive(Deserialize, Debug)]
pub struct DeletedPayload {
    #[serde(default)]
    pub deleted: bool,
}

#[derive(Deserialize, Debug)]
pub struct DeleteData {
    #[serde(rename = "DeleteMediaListEntry")]
    pub delete: Option<DeletedPayload>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn status_parses_labels_and_api_names() {
        assert_eq!(
            MediaListStatus::parse(ListKind::Anime, "watching"),
            Some(MediaListStatus::Current)
        );
        assert_eq!(
            MediaListStatus::parse(ListKind::Manga, "Plan to read"),
            Some(MediaListStatus::Planning)
        );
        assert_eq!(
            MediaListStatus::parse(ListKind::Manga, "REPEATING"),
            Some(MediaListStatus::Repeating)
        );
        assert_eq!(MediaListStatus::parse(ListKind::Manga, "Watching"), None);
        assert_eq!(MediaListStatus::Repeating.label(ListKind::Anime), "Rewatching");
    }

    #[test]
    fn score_ranges_clamp_and_snap() {
        let decimal = ScoreFormat::Point10Decimal.range();
        assert_eq!(decimal.clamp(7.3), 7.5);
        assert_eq!(decimal.clamp(12.0), 10.0);
        assert_eq!(decimal.clamp(-3.0), 0.0);
        assert_eq!(ScoreFormat::Point5.range().clamp(4.6), 5.0);
        assert_eq!(ScoreFormat::Point100.range().clamp(f64::NAN), 0.0);
        assert_eq!(NumberRange::advanced_score().clamp(33.3), 33.3);
        assert_eq!(NumberRange::counter().clamp(2.4), 2.0);
    }

    #[test]
    fn fuzzy_date_incomplete_clears() {
        assert_eq!(
            FuzzyDate::parse_input("2024-02-29"),
            FuzzyDate {
                year: Some(2024),
                month: Some(2),
                day: Some(29)
            }
        );
        assert!(FuzzyDate::parse_input("2023-02-29").is_empty());
        assert!(FuzzyDate::parse_input("2024-05-").is_empty());
        assert!(FuzzyDate::parse_input("").is_empty());
        assert_eq!(serde_json::to_value(FuzzyDate::default()).unwrap(), json!({}));
        assert_eq!(FuzzyDate::parse_input("2024-1-5").to_string(), "2024-01-05");
    }

    #[test]
    fn update_values_skip_unset_fields() {
        let values = UpdateValues {
            status: Some(MediaListStatus::Completed),
            progress_volumes: Some(3),
            custom_lists: Some(vec!["Favs".into()]),
            ..Default::default()
        };
        assert_eq!(
            serde_json::to_value(&values).unwrap(),
            json!({"status": "COMPLETED", "progressVolumes": 3, "customLists": ["Favs"]})
        );
        assert!(UpdateValues::default().is_empty());
        assert!(!values.is_empty());
    }

    #[test]
    fn raw_media_list_tolerates_nulls() {
        let raw: RawMediaList = serde_json::from_value(json!({
            "id": 5,
            "mediaId": 10,
            "customLists": null,
            "advancedScores": {"Story": 80.0},
            "media": {"isFavourite": true, "title": {"userPreferred": "Mushishi"}}
        }))
        .unwrap();
        let state = EntryState::from(raw);
        assert_eq!(state.entry_id, 5);
        assert!(state.custom_lists.is_empty());
        assert_eq!(state.advanced_scores["Story"], 80.0);
        assert!(state.is_favourite);
        assert_eq!(state.title.as_deref(), Some("Mushishi"));
    }

    #[test]
    fn list_options_hide_disabled_advanced_scores() {
        let raw: RawMediaListOptions = serde_json::from_value(json!({
            "scoreFormat": "POINT_10_DECIMAL",
            "animeList": {"customLists": ["A"], "advancedScoring": ["Story"], "advancedScoringEnabled": false},
            "mangaList": {"customLists": null, "advancedScoring": ["Art"], "advancedScoringEnabled": true}
        }))
        .unwrap();
        let anime = RawMediaListOptions {
            score_format: raw.score_format,
            anime_list: raw.anime_list,
            manga_list: None,
        }
        .into_list_options(ListKind::Anime);
        assert_eq!(anime.score_format, ScoreFormat::Point10Decimal);
        assert_eq!(anime.custom_lists, vec!["A".to_string()]);
        assert!(anime.advanced_scores.is_empty());

        let manga = RawMediaListOptions {
            score_format: None,
            anime_list: None,
            manga_list: raw.manga_list,
        }
        .into_list_options(ListKind::Manga);
        assert!(manga.custom_lists.is_empty());
        assert_eq!(manga.advanced_scores, vec!["Art".to_string()]);
    }
}
