//! In-memory scripted adapter for tests

use crate::access::AccessLevelRegistry;
use crate::adapter::{AdapterError, Created, DeleteMode, Observed, RemoteAdapter, UpdateStyle};
use crate::diff::FieldDiff;
use crate::error::{Error, Result};
use crate::field::{Field, FieldValue};
use crate::identity::{self, Identity};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

/// Test resource living under a parent
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Widget {
    pub parent: Option<String>,
    pub name: Option<String>,
    pub title: Option<String>,
    pub rank: Option<i64>,
    pub tags: Option<BTreeSet<String>>,
    pub level: Option<String>,
    pub enabled: Option<bool>,
    pub token: Option<String>,
    pub created_at: Option<String>,
}

impl Widget {
    pub fn named(parent: &str, name: &str) -> Self {
        Self {
            parent: Some(parent.to_string()),
            name: Some(name.to_string()),
            ..Default::default()
        }
    }
}

static FIELDS: [Field<Widget>; 9] = [
    Field::force_new("parent", |w: &Widget| w.parent.clone().map(FieldValue::from)),
    Field::force_new("name", |w: &Widget| w.name.clone().map(FieldValue::from)),
    Field::mutable("title", |w: &Widget| w.title.clone().map(FieldValue::from)),
    Field::mutable("rank", |w: &Widget| w.rank.map(FieldValue::from)),
    Field::mutable("tags", |w: &Widget| w.tags.clone().map(FieldValue::from)),
    Field::mutable("level", |w: &Widget| w.level.clone().map(FieldValue::from)),
    Field::mutable("enabled", |w: &Widget| w.enabled.map(FieldValue::from)),
    Field::write_only(
        "token",
        |w: &Widget| w.token.clone().map(FieldValue::from),
        |t: &mut Widget, s: &Widget| t.token.clone_from(&s.token),
    ),
    Field::computed("created_at", |w: &Widget| w.created_at.clone().map(FieldValue::from)),
];

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Adapter backed by an in-memory map, with scriptable failures
pub struct ScriptedAdapter {
    remote: Mutex<BTreeMap<Identity, Widget>>,
    calls: Mutex<Vec<&'static str>>,
    next_id: AtomicU64,
    exists_script: Mutex<VecDeque<std::result::Result<bool, AdapterError>>>,
    failures: Mutex<HashMap<&'static str, AdapterError>>,
    read_warnings: Mutex<Vec<String>>,
    lose_after_create: AtomicBool,
    delete_mode: DeleteMode,
    update_style: UpdateStyle,
}

impl Default for ScriptedAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedAdapter {
    pub fn new() -> Self {
        Self {
            remote: Mutex::new(BTreeMap::new()),
            calls: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
            exists_script: Mutex::new(VecDeque::new()),
            failures: Mutex::new(HashMap::new()),
            read_warnings: Mutex::new(Vec::new()),
            lose_after_create: AtomicBool::new(false),
            delete_mode: DeleteMode::Remove,
            update_style: UpdateStyle::Patch,
        }
    }

    /// Deletion sets `enabled = false` instead of removing.
    pub fn disabling() -> Self {
        Self {
            delete_mode: DeleteMode::Disable {
                field: "enabled",
                value: FieldValue::Bool(false),
            },
            ..Self::new()
        }
    }

    pub fn replacing() -> Self {
        Self {
            update_style: UpdateStyle::Replace,
            ..Self::new()
        }
    }

    /// Put an entity on the remote directly.
    pub fn seed(&self, identity: &str, widget: Widget) -> Identity {
        let id = Identity::new(identity);
        lock(&self.remote).insert(id.clone(), widget);
        id
    }

    /// Answers for successive `exists` calls; falls back to the map when empty.
    pub fn script_exists(
        &self,
        answers: impl IntoIterator<Item = std::result::Result<bool, AdapterError>>,
    ) {
        lock(&self.exists_script).extend(answers);
    }

    /// Make the next call of `operation` fail.
    pub fn fail_next(&self, operation: &'static str, error: AdapterError) {
        lock(&self.failures).insert(operation, error);
    }

    pub fn warn_on_read(&self, warning: &str) {
        lock(&self.read_warnings).push(warning.to_string());
    }

    /// The created entity disappears before the implicit read.
    pub fn lose_after_create(&self) {
        self.lose_after_create.store(true, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<&'static str> {
        lock(&self.calls).clone()
    }

    pub fn count(&self, operation: &str) -> usize {
        lock(&self.calls).iter().filter(|c| **c == operation).count()
    }

    pub fn remote(&self, identity: &Identity) -> Option<Widget> {
        lock(&self.remote).get(identity).cloned()
    }

    fn record(&self, operation: &'static str) -> std::result::Result<(), AdapterError> {
        lock(&self.calls).push(operation);
        match lock(&self.failures).remove(operation) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl RemoteAdapter for ScriptedAdapter {
    type State = Widget;

    fn kind(&self) -> &'static str {
        "widget"
    }

    fn fields(&self) -> &'static [Field<Widget>] {
        &FIELDS
    }

    fn describe(&self, state: &Widget) -> String {
        format!(
            "widget {} in {}",
            state.name.as_deref().unwrap_or("?"),
            state.parent.as_deref().unwrap_or("?")
        )
    }

    fn identity_arity(&self) -> usize {
        2
    }

    fn validate(&self, desired: &Widget, registry: &AccessLevelRegistry) -> Result<()> {
        let name = desired
            .name
            .as_deref()
            .ok_or_else(|| Error::validation("name", "required"))?;
        identity::check_component(name)?;
        if let Some(level) = &desired.level {
            registry.validate_name(level, &["owner"])?;
        }
        Ok(())
    }

    fn create(&self, desired: &Widget) -> std::result::Result<Created<Widget>, AdapterError> {
        self.record("create")?;
        let parent = desired
            .parent
            .as_deref()
            .ok_or_else(|| AdapterError::request("parent is required"))?;
        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        let id = identity::encode_pair(parent, &n.to_string())
            .map_err(|e| AdapterError::request(e.to_string()))?;

        let mut stored = desired.clone();
        stored.title = Some(desired.title.clone().unwrap_or_else(|| "untitled".into()));
        stored.enabled = Some(desired.enabled.unwrap_or(true));
        stored.token = None;
        stored.created_at = Some("2024-01-01T00:00:00Z".into());

        if !self.lose_after_create.load(Ordering::SeqCst) {
            lock(&self.remote).insert(id.clone(), stored);
        }

        let mut echo = desired.clone();
        echo.title = None;
        Ok(Created {
            identity: id,
            echo: Some(echo),
        })
    }

    fn read(&self, identity: &Identity) -> std::result::Result<Observed<Widget>, AdapterError> {
        self.record("read")?;
        let state = lock(&self.remote)
            .get(identity)
            .cloned()
            .ok_or(AdapterError::NotFound)?;
        let mut observed = Observed::new(state);
        for warning in lock(&self.read_warnings).iter() {
            observed = observed.warn(warning.clone());
        }
        Ok(observed)
    }

    fn update(
        &self,
        identity: &Identity,
        changes: &FieldDiff,
    ) -> std::result::Result<Observed<Widget>, AdapterError> {
        self.record("update")?;
        let mut remote = lock(&self.remote);
        let widget = remote.get_mut(identity).ok_or(AdapterError::NotFound)?;
        for (name, value) in changes.iter() {
            match (name, value) {
                ("title", FieldValue::Str(s)) => widget.title = Some(s.clone()),
                ("rank", FieldValue::Int(i)) => widget.rank = Some(*i),
                ("tags", FieldValue::Set(s)) => widget.tags = Some(s.clone()),
                ("level", FieldValue::Str(s)) => widget.level = Some(s.clone()),
                ("enabled", FieldValue::Bool(b)) => widget.enabled = Some(*b),
                ("token", _) => {}
                _ => {
                    return Err(AdapterError::Rejected {
                        status: 400,
                        message: format!("cannot update {name}"),
                    });
                }
            }
        }
        Ok(Observed::new(widget.clone()))
    }

    fn delete(&self, identity: &Identity) -> std::result::Result<(), AdapterError> {
        self.record("delete")?;
        // With an exists script the entity lingers until the script says so.
        if lock(&self.exists_script).is_empty() {
            lock(&self.remote)
                .remove(identity)
                .map(|_| ())
                .ok_or(AdapterError::NotFound)
        } else if lock(&self.remote).contains_key(identity) {
            Ok(())
        } else {
            Err(AdapterError::NotFound)
        }
    }

    fn exists(&self, identity: &Identity) -> std::result::Result<bool, AdapterError> {
        self.record("exists")?;
        if let Some(answer) = lock(&self.exists_script).pop_front() {
            if matches!(answer, Ok(false)) {
                lock(&self.remote).remove(identity);
            }
            return answer;
        }
        let remote = lock(&self.remote);
        Ok(match remote.get(identity) {
            Some(w) => {
                !matches!(self.delete_mode, DeleteMode::Disable { .. }) || w.enabled != Some(false)
            }
            None => false,
        })
    }

    fn delete_mode(&self) -> DeleteMode {
        self.delete_mode.clone()
    }

    fn update_style(&self) -> UpdateStyle {
        self.update_style
    }
}
