use crate::data_structures::{FuzzyDate, ListKind, ListOptions, MediaListStatus, NumberRange};
use crate::errors::{AppError, AppResult};
use crate::session::SessionContext;

/// Three-valued checkbox: no opinion, force on, force off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TriState {
    #[default]
    Indeterminate,
    Checked,
    Unchecked,
}

impl TriState {
    pub fn from_bool(value: bool) -> Self {
        if value {
            TriState::Checked
        } else {
            TriState::Unchecked
        }
    }

    pub fn as_bool(self) -> Option<bool> {
        match self {
            TriState::Indeterminate => None,
            TriState::Checked => Some(true),
            TriState::Unchecked => Some(false),
        }
    }

    pub fn is_determinate(self) -> bool {
        self != TriState::Indeterminate
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Field {
    Status,
    Score,
    AdvancedScore(String),
    Progress,
    ProgressVolumes,
    Repeat,
    StartedAt,
    CompletedAt,
    Notes,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ToggleField {
    CustomList(String),
    HiddenFromStatusLists,
    Private,
    Favourite,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Status(MediaListStatus),
    Number(f64),
    Date(FuzzyDate),
    Text(String),
}

#[derive(Debug, Clone)]
struct UniformField {
    field: Field,
    enabled: bool,
    value: FieldValue,
    range: Option<NumberRange>,
}

impl UniformField {
    fn number(field: Field, range: NumberRange) -> Self {
        UniformField {
            field,
            enabled: false,
            value: FieldValue::Number(range.min),
            range: Some(range),
        }
    }

    fn plain(field: Field, value: FieldValue) -> Self {
        UniformField {
            field,
            enabled: false,
            value,
            range: None,
        }
    }
}

/// Immutable copy of the form taken at confirm time.
#[derive(Debug, Clone, PartialEq)]
pub struct FormSnapshot {
    pub kind: ListKind,
    pub status: Option<MediaListStatus>,
    pub score: Option<f64>,
    /// Every advanced-score category in list order; `None` means not enabled.
    pub advanced_scores: Vec<(String, Option<f64>)>,
    pub progress: Option<u32>,
    pub progress_volumes: Option<u32>,
    pub repeat: Option<u32>,
    pub started_at: Option<FuzzyDate>,
    pub completed_at: Option<FuzzyDate>,
    pub notes: Option<String>,
    pub custom_lists: Vec<(String, TriState)>,
    pub hidden_from_status_lists: TriState,
    pub private: TriState,
    pub favourite: TriState,
    pub delete: bool,
}

impl FormSnapshot {
    pub fn empty(kind: ListKind) -> Self {
        FormSnapshot {
            kind,
            status: None,
            score: None,
            advanced_scores: Vec::new(),
            progress: None,
            progress_volumes: None,
            repeat: None,
            started_at: None,
            completed_at: None,
            notes: None,
            custom_lists: Vec::new(),
            hidden_from_status_lists: TriState::Indeterminate,
            private: TriState::Indeterminate,
            favourite: TriState::Indeterminate,
            delete: false,
        }
    }

    pub fn has_any_change(&self) -> bool {
        self.delete
            || self.status.is_some()
            || self.score.is_some()
            || self.advanced_scores.iter().any(|(_, v)| v.is_some())
            || self.progress.is_some()
            || self.progress_volumes.is_some()
            || self.repeat.is_some()
            || self.started_at.is_some()
            || self.completed_at.is_some()
            || self.notes.is_some()
            || self.custom_lists.iter().any(|(_, t)| t.is_determinate())
            || self.hidden_from_status_lists.is_determinate()
            || self.private.is_determinate()
            || self.favourite.is_determinate()
    }
}

pub struct FormState {
    context: SessionContext,
    options: ListOptions,
    fields: Vec<UniformField>,
    custom_lists: Vec<(String, TriState)>,
    hidden_from_status_lists: TriState,
    private: TriState,
    favourite: TriState,
    delete: bool,
}

impl FormState {
    pub fn new(context: SessionContext, options: ListOptions) -> Self {
        let kind = context.kind;
        let mut fields = vec![
            UniformField::plain(
                Field::Status,
                FieldValue::Status(MediaListStatus::Current),
            ),
            UniformField::number(Field::Score, options.score_format.range()),
        ];
        for name in &options.advanced_scores {
            fields.push(UniformField::number(
                Field::AdvancedScore(name.clone()),
                NumberRange::advanced_score(),
            ));
        }
        fields.push(UniformField::number(Field::Progress, NumberRange::counter()));
        if kind == ListKind::Manga {
            fields.push(UniformField::number(
                Field::ProgressVolumes,
                NumberRange::counter(),
            ));
        }
        fields.push(UniformField::number(Field::Repeat, NumberRange::counter()));
        fields.push(UniformField::plain(
            Field::StartedAt,
            FieldValue::Date(FuzzyDate::default()),
        ));
        fields.push(UniformField::plain(
            Field::CompletedAt,
            FieldValue::Date(FuzzyDate::default()),
        ));
        fields.push(UniformField::plain(
            Field::Notes,
            FieldValue::Text(String::new()),
        ));

        let custom_lists = options
            .custom_lists
            .iter()
            .map(|name| (name.clone(), TriState::Indeterminate))
            .collect();

        FormState {
            context,
            options,
            fields,
            custom_lists,
            hidden_from_status_lists: TriState::Indeterminate,
            private: TriState::Indeterminate,
            favourite: TriState::Indeterminate,
            delete: false,
        }
    }

    pub fn context(&self) -> &SessionContext {
        &self.context
    }

    pub fn options(&self) -> &ListOptions {
        &self.options
    }

    /// Rebuilds the form when the list changes; its option set depends on the list.
    pub fn on_navigate(&mut self, context: SessionContext, options: ListOptions) {
        if self.context.same_list(&context) {
            self.context = context;
        } else {
            *self = FormState::new(context, options);
        }
    }

    fn field_mut(&mut self, field: &Field) -> AppResult<&mut UniformField> {
        let kind = self.context.kind;
        self.fields
            .iter_mut()
            .find(|f| &f.field == field)
            .ok_or_else(|| {
                AppError::Argument(format!("{:?} is not available on {} lists", field, kind))
            })
    }

    pub fn set_field_enabled(&mut self, field: &Field, enabled: bool) -> AppResult<()> {
        self.field_mut(field)?.enabled = enabled;
        Ok(())
    }

    /// Numbers are clamped to the field's range and step; never rejected.
    pub fn set_field_value(&mut self, field: &Field, value: FieldValue) -> AppResult<()> {
        let slot = self.field_mut(field)?;
        let value = match (&slot.value, value) {
            (FieldValue::Number(_), FieldValue::Number(n)) => {
                FieldValue::Number(slot.range.map_or(n, |r| r.clamp(n)))
            }
            (FieldValue::Status(_), v @ FieldValue::Status(_))
            | (FieldValue::Date(_), v @ FieldValue::Date(_))
            | (FieldValue::Text(_), v @ FieldValue::Text(_)) => v,
            (_, other) => {
                return Err(AppError::Argument(format!(
                    "{:?} cannot hold {:?}",
                    field, other
                )))
            }
        };
        slot.value = value;
        Ok(())
    }

    pub fn set_date_input(&mut self, field: &Field, input: &str) -> AppResult<()> {
        self.set_field_value(field, FieldValue::Date(FuzzyDate::parse_input(input)))
    }

    pub fn set_field_state(&mut self, field: &ToggleField, state: TriState) -> AppResult<()> {
        match field {
            ToggleField::CustomList(name) => {
                let slot = self
                    .custom_lists
                    .iter_mut()
                    .find(|(n, _)| n == name)
                    .ok_or_else(|| AppError::Argument(format!("Unknown custom list '{}'", name)))?;
                slot.1 = state;
            }
            ToggleField::HiddenFromStatusLists => self.hidden_from_status_lists = state,
            ToggleField::Private => self.private = state,
            ToggleField::Favourite => self.favourite = state,
        }
        Ok(())
    }

    pub fn set_delete(&mut self, delete: bool) {
        self.delete = delete;
    }

    pub fn has_any_change(&self) -> bool {
        self.snapshot().has_any_change()
    }

    pub fn snapshot(&self) -> FormSnapshot {
        let mut snap = FormSnapshot::empty(self.context.kind);
        for f in &self.fields {
            let enabled = f.enabled.then_some(&f.value);
            match (&f.field, enabled) {
                (Field::AdvancedScore(name), v) => {
                    snap.advanced_scores.push((name.clone(), v.and_then(as_number)));
                }
                (_, None) => {}
                (Field::Status, Some(FieldValue::Status(s))) => snap.status = Some(*s),
                (Field::Score, Some(v)) => snap.score = as_number(v),
                (Field::Progress, Some(v)) => snap.progress = as_count(v),
                (Field::ProgressVolumes, Some(v)) => snap.progress_volumes = as_count(v),
                (Field::Repeat, Some(v)) => snap.repeat = as_count(v),
                (Field::StartedAt, Some(FieldValue::Date(d))) => snap.started_at = Some(d.clone()),
                (Field::CompletedAt, Some(FieldValue::Date(d))) => {
                    snap.completed_at = Some(d.clone())
                }
                (Field::Notes, Some(FieldValue::Text(t))) => snap.notes = Some(t.clone()),
                _ => {}
            }
        }
        snap.custom_lists = self.custom_lists.clone();
        snap.hidden_from_status_lists = self.hidden_from_status_lists;
        snap.private = self.private;
        snap.favourite = self.favourite;
        snap.delete = self.delete;
        snap
    }
}

fn as_number(value: &FieldValue) -> Option<f64> {
    match value {
        FieldValue::Number(n) => Some(*n),
        _ => None,
    }
}

fn as_count(value: &FieldValue) -> Option<u32> {
    as_number(value).map(|n| n.max(0.0).min(u32::MAX as f64) as u32)
}
