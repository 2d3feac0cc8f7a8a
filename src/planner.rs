use crate::data_structures::{Entry, EntryState, ListKind, UpdateValues};
use crate::errors::{AppError, AppResult};
use crate::form::{FormSnapshot, TriState};
use std::collections::{BTreeMap, HashMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// One mutation for every entry.
    Batch,
    /// One step per entry, in selection order.
    PerEntry,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PlanOp {
    Delete,
    Update(UpdateSpec),
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct UpdateSpec {
    /// Values applied identically to every entry.
    pub base: UpdateValues,
    pub favourite: Option<bool>,
    /// Present when only some custom lists were decided.
    pub partial_custom_lists: Option<Vec<(String, TriState)>>,
    /// Present when only some advanced scores were enabled.
    pub partial_advanced_scores: Option<Vec<(String, Option<f64>)>>,
}

impl UpdateSpec {
    pub fn needs_update_call(&self) -> bool {
        !self.base.is_empty()
            || self.partial_custom_lists.is_some()
            || self.partial_advanced_scores.is_some()
    }

    pub fn needs_toggle(&self, state: &EntryState) -> bool {
        self.favourite.is_some_and(|wanted| wanted != state.is_favourite)
    }

    pub fn needs_entry_state(&self) -> bool {
        self.favourite.is_some()
            || self.partial_custom_lists.is_some()
            || self.partial_advanced_scores.is_some()
    }

    /// Base values plus whatever had to be merged with the entry's current state.
    pub fn values_for(&self, state: &EntryState) -> UpdateValues {
        let mut values = self.base.clone();
        if let Some(requested) = &self.partial_custom_lists {
            values.custom_lists = Some(resolve_custom_lists(requested, &state.custom_lists));
        }
        if let Some(requested) = &self.partial_advanced_scores {
            values.advanced_scores =
                Some(resolve_advanced_scores(requested, &state.advanced_scores));
        }
        values
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdatePlan {
    pub strategy: Strategy,
    pub op: PlanOp,
    /// Deduplicated by media id, selection order kept.
    pub entries: Vec<Entry>,
    /// One line per decided field, in display order.
    pub actions: Vec<String>,
}

impl UpdatePlan {
    pub fn is_noop(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Determinate options override, indeterminate ones keep the entry's membership.
pub fn resolve_custom_lists(
    requested: &[(String, TriState)],
    current: &BTreeMap<String, bool>,
) -> Vec<String> {
    requested
        .iter()
        .filter(|(name, state)| {
            state
                .as_bool()
                .unwrap_or_else(|| current.get(name).copied().unwrap_or(false))
        })
        .map(|(name, _)| name.clone())
        .collect()
}

pub fn resolve_advanced_scores(
    requested: &[(String, Option<f64>)],
    current: &HashMap<String, f64>,
) -> Vec<f64> {
    requested
        .iter()
        .map(|(name, value)| value.unwrap_or_else(|| current.get(name).copied().unwrap_or(0.0)))
        .collect()
}

pub fn dedup_entries(entries: &[Entry]) -> Vec<Entry> {
    let mut seen = HashSet::new();
    entries
        .iter()
        .filter(|e| seen.insert(e.media_id))
        .cloned()
        .collect()
}

pub fn plan(snapshot: &FormSnapshot, entries: &[Entry]) -> AppResult<UpdatePlan> {
    if !snapshot.has_any_change() {
        return Err(AppError::NothingToDo);
    }
    let entries = dedup_entries(entries);

    if snapshot.delete {
        return Ok(UpdatePlan {
            strategy: Strategy::PerEntry,
            op: PlanOp::Delete,
            entries,
            actions: vec!["Delete.".to_string()],
        });
    }

    let mut spec = UpdateSpec {
        base: UpdateValues {
            status: snapshot.status,
            score: snapshot.score,
            progress: snapshot.progress,
            progress_volumes: snapshot.progress_volumes,
            repeat: snapshot.repeat,
            notes: snapshot.notes.clone(),
            started_at: snapshot.started_at.clone(),
            completed_at: snapshot.completed_at.clone(),
            hidden_from_status_lists: snapshot.hidden_from_status_lists.as_bool(),
            private: snapshot.private.as_bool(),
            ..Default::default()
        },
        favourite: snapshot.favourite.as_bool(),
        ..Default::default()
    };

    let scores = &snapshot.advanced_scores;
    let enabled_scores = scores.iter().filter(|(_, v)| v.is_some()).count();
    if enabled_scores > 0 && enabled_scores == scores.len() {
        spec.base.advanced_scores = Some(scores.iter().filter_map(|(_, v)| *v).collect());
    } else if enabled_scores > 0 {
        spec.partial_advanced_scores = Some(scores.clone());
    }

    let lists = &snapshot.custom_lists;
    let decided_lists = lists.iter().filter(|(_, t)| t.is_determinate()).count();
    if decided_lists > 0 && decided_lists == lists.len() {
        spec.base.custom_lists = Some(
            lists
                .iter()
                .filter(|(_, t)| *t == TriState::Checked)
                .map(|(n, _)| n.clone())
                .collect(),
        );
    } else if decided_lists > 0 {
        spec.partial_custom_lists = Some(lists.clone());
    }

    let strategy = if spec.needs_entry_state() {
        Strategy::PerEntry
    } else {
        Strategy::Batch
    };

    Ok(UpdatePlan {
        strategy,
        op: PlanOp::Update(spec),
        entries,
        actions: render_actions(snapshot),
    })
}

fn trim_number(n: f64) -> String {
    if n.fract() == 0.0 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

pub fn render_actions(snapshot: &FormSnapshot) -> Vec<String> {
    if snapshot.delete {
        return vec!["Delete.".to_string()];
    }
    let kind = snapshot.kind;
    let mut out = Vec::new();
    if let Some(status) = snapshot.status {
        out.push(format!("Set Status to {}.", status.label(kind)));
    }
    if let Some(score) = snapshot.score {
        out.push(format!("Set Score to {}.", trim_number(score)));
    }
    for (name, value) in &snapshot.advanced_scores {
        if let Some(v) = value {
            out.push(format!(
                "Set the {} Advanced Score to {}.",
                name,
                trim_number(*v)
            ));
        }
    }
    let (progress_label, repeat_label) = match kind {
        ListKind::Anime => ("Episode Progress", "Total Rewatches"),
        ListKind::Manga => ("Chapter Progress", "Total Rereads"),
    };
    if let Some(p) = snapshot.progress {
        out.push(format!("Set {} to {}.", progress_label, p));
    }
    if let Some(v) = snapshot.progress_volumes {
        out.push(format!("Set Volume Progress to {}.", v));
    }
    if let Some(r) = snapshot.repeat {
        out.push(format!("Set {} to {}.", repeat_label, r));
    }
    if let Some(d) = &snapshot.started_at {
        out.push(format!("Set Start Date to {}.", d));
    }
    if let Some(d) = &snapshot.completed_at {
        out.push(format!("Set Finish Date to {}.", d));
    }
    if let Some(n) = &snapshot.notes {
        out.push(format!("Set Notes to \"{}\".", n));
    }
    for (name, state) in &snapshot.custom_lists {
        match state {
            TriState::Checked => out.push(format!("Add to the {} Custom List.", name)),
            TriState::Unchecked => out.push(format!("Remove from the {} Custom List.", name)),
            TriState::Indeterminate => {}
        }
    }
    match snapshot.hidden_from_status_lists {
        TriState::Checked => out.push("Hide from status lists.".to_string()),
        TriState::Unchecked => out.push("Show on status lists.".to_string()),
        TriState::Indeterminate => {}
    }
    match snapshot.private {
        TriState::Checked => out.push("Set as Private.".to_string()),
        TriState::Unchecked => out.push("Set as Public.".to_string()),
        TriState::Indeterminate => {}
    }
    match snapshot.favourite {
        TriState::Checked => out.push("Add to Favourites.".to_string()),
        TriState::Unchecked => out.push("Remove from Favourites.".to_string()),
        TriState::Indeterminate => {}
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_structures::{FuzzyDate, MediaListStatus};

    fn entries() -> Vec<Entry> {
        vec![Entry::new(10, "E1"), Entry::new(20, "E2")]
    }

    fn snap() -> FormSnapshot {
        let mut s = FormSnapshot::empty(ListKind::Anime);
        s.custom_lists = vec![
            ("A".into(), TriState::Indeterminate),
            ("B".into(), TriState::Indeterminate),
        ];
        s
    }

    fn spec_of(plan: &UpdatePlan) -> &UpdateSpec {
        match &plan.op {
            PlanOp::Update(spec) => spec,
            PlanOp::Delete => panic!("expected update"),
        }
    }

    #[test]
    fn no_change_produces_no_plan() {
        assert!(matches!(plan(&snap(), &entries()), Err(AppError::NothingToDo)));
    }

    #[test]
    fn uniform_status_is_one_batch() {
        let mut s = snap();
        s.status = Some(MediaListStatus::Completed);
        let p = plan(&s, &entries()).unwrap();
        assert_eq!(p.strategy, Strategy::Batch);
        assert_eq!(
            p.entries.iter().map(|e| e.media_id).collect::<Vec<_>>(),
            vec![10, 20]
        );
        let spec = spec_of(&p);
        assert_eq!(
            serde_json::to_value(&spec.base).unwrap(),
            serde_json::json!({"status": "COMPLETED"})
        );
        assert_eq!(p.actions, vec!["Set Status to Completed.".to_string()]);
    }

    #[test]
    fn delete_excludes_every_other_field() {
        let mut s = snap();
        s.delete = true;
        s.status = Some(MediaListStatus::Dropped);
        s.favourite = TriState::Checked;
        let p = plan(&s, &entries()).unwrap();
        assert_eq!(p.strategy, Strategy::PerEntry);
        assert_eq!(p.op, PlanOp::Delete);
        assert_eq!(p.actions, vec!["Delete.".to_string()]);
    }

    #[test]
    fn fully_decided_custom_lists_stay_batch() {
        let mut s = snap();
        s.custom_lists = vec![
            ("A".into(), TriState::Unchecked),
            ("B".into(), TriState::Checked),
        ];
        let p = plan(&s, &entries()).unwrap();
        assert_eq!(p.strategy, Strategy::Batch);
        assert_eq!(spec_of(&p).base.custom_lists, Some(vec!["B".to_string()]));
        assert!(spec_of(&p).partial_custom_lists.is_none());
    }

    #[test]
    fn partial_custom_lists_merge_per_entry() {
        let mut s = snap();
        s.custom_lists[1].1 = TriState::Checked;
        let p = plan(&s, &entries()).unwrap();
        assert_eq!(p.strategy, Strategy::PerEntry);
        let spec = spec_of(&p);
        let state = EntryState {
            custom_lists: BTreeMap::from([("A".into(), true), ("B".into(), false)]),
            ..Default::default()
        };
        assert_eq!(
            spec.values_for(&state).custom_lists,
            Some(vec!["A".to_string(), "B".to_string()])
        );
    }

    #[test]
    fn favourite_escalates_and_skips_matching_entries() {
        let mut s = snap();
        s.favourite = TriState::Checked;
        let p = plan(&s, &entries()).unwrap();
        assert_eq!(p.strategy, Strategy::PerEntry);
        let spec = spec_of(&p);
        assert!(!spec.needs_update_call());
        let fav = EntryState {
            is_favourite: true,
            ..Default::default()
        };
        assert!(!spec.needs_toggle(&fav));
        assert!(spec.needs_toggle(&EntryState::default()));
    }

    #[test]
    fn partial_advanced_scores_keep_current_values() {
        let mut s = snap();
        s.advanced_scores = vec![("Story".into(), Some(90.0)), ("Art".into(), None)];
        let p = plan(&s, &entries()).unwrap();
        assert_eq!(p.strategy, Strategy::PerEntry);
        let state = EntryState {
            advanced_scores: HashMap::from([("Art".into(), 40.0), ("Story".into(), 10.0)]),
            ..Default::default()
        };
        assert_eq!(
            spec_of(&p).values_for(&state).advanced_scores,
            Some(vec![90.0, 40.0])
        );

        s.advanced_scores[1].1 = Some(50.0);
        let p = plan(&s, &entries()).unwrap();
        assert_eq!(p.strategy, Strategy::Batch);
        assert_eq!(spec_of(&p).base.advanced_scores, Some(vec![90.0, 50.0]));
    }

    #[test]
    fn duplicates_and_empty_selection() {
        let mut s = snap();
        s.private = TriState::Unchecked;
        let dup = vec![Entry::new(10, "a"), Entry::new(10, "a again"), Entry::new(5, "b")];
        let p = plan(&s, &dup).unwrap();
        assert_eq!(p.entries.len(), 2);
        assert_eq!(p.entries[0].title, "a");
        assert!(plan(&s, &[]).unwrap().is_noop());
    }

    #[test]
    fn actions_follow_display_order() {
        let mut s = FormSnapshot::empty(ListKind::Manga);
        s.favourite = TriState::Unchecked;
        s.private = TriState::Checked;
        s.hidden_from_status_lists = TriState::Checked;
        s.custom_lists = vec![("X".into(), TriState::Unchecked)];
        s.notes = Some("hi".into());
        s.completed_at = Some(FuzzyDate::default());
        s.started_at = Some(FuzzyDate::parse_input("2020-01-02"));
        s.repeat = Some(2);
        s.progress_volumes = Some(3);
        s.progress = Some(40);
        s.advanced_scores = vec![("Story".into(), Some(75.5))];
        s.score = Some(7.0);
        s.status = Some(MediaListStatus::Repeating);
        assert_eq!(
            render_actions(&s),
            vec![
                "Set Status to Rereading.",
                "Set Score to 7.",
                "Set the Story Advanced Score to 75.5.",
                "Set Chapter Progress to 40.",
                "Set Volume Progress to 3.",
                "Set Total Rereads to 2.",
                "Set Start Date to 2020-01-02.",
                "Set Finish Date to nothing.",
                "Set Notes to \"hi\".",
                "Remove from the X Custom List.",
                "Hide from status lists.",
                "Set as Private.",
                "Remove from Favourites.",
            ]
        );
    }
}
