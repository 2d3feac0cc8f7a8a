use crate::constants::LIST_URL_RE;
use crate::data_structures::{Entry, ListKind, MediaId};
use crate::errors::{AppError, AppResult};
use url::Url;

/// Which list the user is looking at. Replaces "did the page navigate" globals.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionContext {
    pub user_name: String,
    pub kind: ListKind,
    pub url: Url,
}

impl SessionContext {
    pub fn from_url(raw: &str) -> AppResult<Self> {
        let url = Url::parse(raw.trim())?;
        let normalized = format!(
            "{}://{}{}",
            url.scheme(),
            url.host_str().unwrap_or_default(),
            url.path()
        );
        let caps = LIST_URL_RE
            .captures(&normalized)
            .ok_or_else(|| AppError::InvalidListUrl(raw.to_string()))?;
        let kind = match &caps[2] {
            "animelist" => ListKind::Anime,
            _ => ListKind::Manga,
        };
        Ok(SessionContext {
            user_name: caps[1].to_string(),
            kind,
            url,
        })
    }

    /// Sub-paths such as `/completed` belong to the same list session.
    pub fn same_list(&self, other: &SessionContext) -> bool {
        self.user_name.eq_ignore_ascii_case(&other.user_name) && self.kind == other.kind
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectionChange {
    pub count: usize,
    pub media_ids: Vec<MediaId>,
}

type SelectionObserver = Box<dyn Fn(&SelectionChange) + Send>;

/// Marked entries of the current list, in selection order, unique by media id.
pub struct Selection {
    context: SessionContext,
    entries: Vec<Entry>,
    observers: Vec<SelectionObserver>,
}

impl Selection {
    pub fn new(context: SessionContext) -> Self {
        Selection {
            context,
            entries: Vec::new(),
            observers: Vec::new(),
        }
    }

    pub fn context(&self) -> &SessionContext {
        &self.context
    }

    pub fn subscribe(&mut self, observer: impl Fn(&SelectionChange) + Send + 'static) {
        self.observers.push(Box::new(observer));
    }

    /// Returns false when the media id was already selected.
    pub fn select(&mut self, entry: Entry) -> bool {
        if self.contains(entry.media_id) {
            return false;
        }
        self.entries.push(entry);
        self.notify();
        true
    }

    pub fn deselect(&mut self, media_id: MediaId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.media_id != media_id);
        let removed = self.entries.len() != before;
        if removed {
            self.notify();
        }
        removed
    }

    pub fn deselect_all(&mut self) {
        if self.entries.is_empty() {
            return;
        }
        self.entries.clear();
        self.notify();
    }

    pub fn contains(&self, media_id: MediaId) -> bool {
        self.entries.iter().any(|e| e.media_id == media_id)
    }

    pub fn selected(&self) -> &[Entry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Frozen copy handed to a run; later selection changes do not reach it.
    pub fn snapshot(&self) -> Vec<Entry> {
        self.entries.clone()
    }

    /// Leaving the list drops the selection; staying on it keeps it.
    pub fn on_navigate(&mut self, context: SessionContext) {
        let same = self.context.same_list(&context);
        self.context = context;
        if !same {
            self.deselect_all();
        }
    }

    fn notify(&self) {
        let change = SelectionChange {
            count: self.entries.len(),
            media_ids: self.entries.iter().map(|e| e.media_id).collect(),
        };
        for observer in &self.observers {
            observer(&change);
        }
    }
}

pub fn selection_label(count: usize) -> String {
    format!("You have {} selected.", entries_noun(count))
}

pub fn entries_noun(count: usize) -> String {
    if count == 1 {
        "1 entry".to_string()
    } else {
        format!("{} entries", count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn ctx(url: &str) -> SessionContext {
        SessionContext::from_url(url).unwrap()
    }

    #[test]
    fn parses_list_urls() {
        let c = ctx("https://anilist.co/user/Rtonne/mangalist/Reading?x=1");
        assert_eq!(c.user_name, "Rtonne");
        assert_eq!(c.kind, ListKind::Manga);
        assert_eq!(ctx("https://anilist.co/user/a/animelist").kind, ListKind::Anime);
        assert!(matches!(
            SessionContext::from_url("https://anilist.co/anime/1"),
            Err(AppError::InvalidListUrl(_))
        ));
        assert!(SessionContext::from_url("not a url").is_err());
    }

    #[test]
    fn reselecting_same_media_is_noop() {
        let mut sel = Selection::new(ctx("https://anilist.co/user/a/animelist"));
        assert!(sel.select(Entry::new(10, "A")));
        assert!(!sel.select(Entry::new(10, "A (other list)")));
        assert_eq!(sel.len(), 1);
        assert_eq!(sel.selected()[0].title, "A");
    }

    #[test]
    fn observers_see_each_change() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut sel = Selection::new(ctx("https://anilist.co/user/a/animelist"));
        let sink = seen.clone();
        sel.subscribe(move |c| sink.lock().unwrap().push(c.count));
        sel.select(Entry::new(1, "x"));
        sel.select(Entry::new(2, "y"));
        sel.select(Entry::new(2, "y"));
        sel.deselect(1);
        sel.deselect(99);
        sel.deselect_all();
        assert_eq!(*seen.lock().unwrap(), vec![1, 2, 1, 0]);
    }

    #[test]
    fn navigation_resets_only_on_list_change() {
        let mut sel = Selection::new(ctx("https://anilist.co/user/a/animelist"));
        sel.select(Entry::new(1, "x"));
        sel.on_navigate(ctx("https://anilist.co/user/a/animelist/Completed"));
        assert_eq!(sel.len(), 1);
        sel.on_navigate(ctx("https://anilist.co/user/a/mangalist"));
        assert!(sel.is_empty());
        assert_eq!(sel.context().kind, ListKind::Manga);
    }

    #[test]
    fn snapshot_is_frozen() {
        let mut sel = Selection::new(ctx("https://anilist.co/user/a/animelist"));
        sel.select(Entry::new(1, "x"));
        let snap = sel.snapshot();
        sel.select(Entry::new(2, "y"));
        assert_eq!(snap.len(), 1);
    }

    #[test]
    fn label_pluralizes() {
        assert_eq!(selection_label(1), "You have 1 entry selected.");
        assert_eq!(selection_label(3), "You have 3 entries selected.");
    }
}
