//! Dirty tracking shared by digital objects and datastreams.
//!
//! Each entity embeds one [`AttributeStore`] configured with its own
//! attribute table. The store owns the profile graph, the local overrides
//! and two dirty sets:
//!
//! - single-valued changes, keyed by attribute, remembering the value the
//!   attribute had before the first local write;
//! - multi-valued changes, a [`NetDiff`] per attribute describing the
//!   minimal delta from the server state to the local state.
//!
//! An attribute is in at most one of the two sets.

use std::collections::BTreeMap;

use crate::graph::Graph;
use crate::model::Attribute;
use crate::value::{Scalar, Value};

/// Where an entity's profile stands.
#[derive(Debug, Clone, Default)]
pub enum ProfileState {
    /// Never fetched.
    #[default]
    Unfetched,
    /// Fetched (or seeded from a parent graph); the entity exists.
    Fetched(Graph),
    /// The repository reported the entity missing.
    Absent(Graph),
    /// Invalidated by a save or delete; the next read refetches.
    Stale,
}

impl ProfileState {
    fn graph(&self) -> Option<&Graph> {
        match self {
            ProfileState::Fetched(g) | ProfileState::Absent(g) => Some(g),
            ProfileState::Unfetched | ProfileState::Stale => None,
        }
    }
}

/// Net additions and removals of a multi-valued attribute.
///
/// An addition cancels a pending removal of the same value and vice versa,
/// so the diff never depends on how many intermediate edits were made.
/// [`NetDiff::rebase`] then trims it to what actually differs from the
/// server.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetDiff {
    added: Vec<Scalar>,
    removed: Vec<Scalar>,
}

impl NetDiff {
    /// Values to insert.
    #[must_use]
    pub fn added(&self) -> &[Scalar] {
        &self.added
    }

    /// Values to delete.
    #[must_use]
    pub fn removed(&self) -> &[Scalar] {
        &self.removed
    }

    /// Whether the diff is a no-op.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }

    /// Records that `value` was added.
    pub fn add(&mut self, value: Scalar) {
        if let Some(pos) = self.removed.iter().position(|v| v.same(&value)) {
            self.removed.remove(pos);
        } else if !self.added.iter().any(|v| v.same(&value)) {
            self.added.push(value);
        }
    }

    /// Records that `value` was removed.
    pub fn remove(&mut self, value: Scalar) {
        if let Some(pos) = self.added.iter().position(|v| v.same(&value)) {
            self.added.remove(pos);
        } else if !self.removed.iter().any(|v| v.same(&value)) {
            self.removed.push(value);
        }
    }

    /// Merges a batch of edits.
    pub fn merge(&mut self, added: impl IntoIterator<Item = Scalar>, removed: impl IntoIterator<Item = Scalar>) {
        for v in removed {
            self.remove(v);
        }
        for v in added {
            self.add(v);
        }
    }

    /// Drops additions `server` already holds and removals it never held.
    pub fn rebase(&mut self, server: &[Scalar]) {
        let on_server = |v: &Scalar| server.iter().any(|s| s.same(v));
        self.added.retain(|v| !on_server(v));
        self.removed.retain(|v| on_server(v));
    }
}

/// A single-valued change: the value before the first local write and the
/// current local value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change<A> {
    /// The attribute.
    pub attribute: A,
    /// Value before the first local write.
    pub old: Value,
    /// Current local value.
    pub new: Value,
}

/// Profile, overrides and dirty state of one entity.
#[derive(Debug, Clone)]
pub struct AttributeStore<A: Attribute> {
    profile: ProfileState,
    defaults: BTreeMap<A, Value>,
    overrides: BTreeMap<A, Value>,
    changed: BTreeMap<A, Value>,
    multivalued: BTreeMap<A, NetDiff>,
    as_of: Option<String>,
}

impl<A: Attribute> AttributeStore<A> {
    /// A store with nothing fetched. `as_of` makes it a read-only view.
    #[must_use]
    pub fn new(as_of: Option<String>) -> Self {
        Self {
            profile: ProfileState::Unfetched,
            defaults: BTreeMap::new(),
            overrides: BTreeMap::new(),
            changed: BTreeMap::new(),
            multivalued: BTreeMap::new(),
            as_of,
        }
    }

    /// Timestamp of a historical view.
    #[must_use]
    pub fn as_of(&self) -> Option<&str> {
        self.as_of.as_deref()
    }

    /// Current profile state.
    #[must_use]
    pub fn profile(&self) -> &ProfileState {
        &self.profile
    }

    /// Whether the next read has to fetch the profile.
    #[must_use]
    pub fn needs_profile(&self) -> bool {
        matches!(self.profile, ProfileState::Unfetched | ProfileState::Stale)
    }

    /// The loaded profile graph, if any.
    #[must_use]
    pub fn graph(&self) -> Option<&Graph> {
        self.profile.graph()
    }

    /// `Some(true)` once the profile is known to exist, `Some(false)` once it
    /// is known to be missing, `None` before fetching.
    #[must_use]
    pub fn exists(&self) -> Option<bool> {
        match self.profile {
            ProfileState::Fetched(_) => Some(true),
            ProfileState::Absent(_) => Some(false),
            ProfileState::Unfetched | ProfileState::Stale => None,
        }
    }

    /// Installs a fetched (or seeded) profile.
    pub fn install(&mut self, graph: Graph) {
        self.profile = ProfileState::Fetched(graph);
    }

    /// Records that the repository has no profile; reads see `empty`.
    pub fn install_absent(&mut self, empty: Graph) {
        self.profile = ProfileState::Absent(empty);
    }

    /// Forces the next read to refetch, keeping dirty state.
    pub fn mark_stale(&mut self) {
        self.profile = ProfileState::Stale;
    }

    /// Overrides the table default of `attr` for this instance.
    pub fn set_default(&mut self, attr: A, value: impl Into<Value>) {
        self.defaults.insert(attr, value.into());
    }

    /// Default of `attr`: the instance override, else the table entry.
    #[must_use]
    pub fn default_for(&self, attr: A) -> Option<Value> {
        self.defaults
            .get(&attr)
            .cloned()
            .or_else(|| attr.spec().default.map(Value::from))
    }

    /// Reads `attr`: local override, else profile, else default.
    ///
    /// The default only applies when the profile holds no triple for the
    /// predicate; an explicit empty literal is a value.
    #[must_use]
    pub fn read(&self, attr: A) -> Value {
        match self.overrides.get(&attr) {
            Some(v) => v.clone(),
            None => self.baseline(attr),
        }
    }

    /// Value of `attr` before any local edit: profile, else default.
    fn baseline(&self, attr: A) -> Value {
        let values = match (attr.predicate(), self.graph()) {
            (Some(predicate), Some(graph)) => graph.read(predicate),
            _ => Vec::new(),
        };
        if values.is_empty() {
            if let Some(default) = self.default_for(attr) {
                return default;
            }
        }
        Value::from_strings(values)
    }

    /// Whether a local override exists for `attr`.
    #[must_use]
    pub fn is_overridden(&self, attr: A) -> bool {
        self.overrides.contains_key(&attr)
    }

    /// Writes `attr`. Returns `false` if `value` is equivalent to the current
    /// value and nothing was recorded.
    ///
    /// A whole-value write replaces any pending element edits of `attr`; the
    /// recorded original is always the value before the first local edit.
    /// Callers check writability first.
    pub fn write(&mut self, attr: A, value: Value) -> bool {
        if value.equivalent(&self.read(attr)) {
            return false;
        }
        let original = match self.changed.remove(&attr) {
            Some(original) => original,
            None => {
                self.multivalued.remove(&attr);
                self.baseline(attr)
            }
        };
        if !original.equivalent(&value) {
            self.changed.insert(attr, original);
        }
        self.overrides.insert(attr, value);
        true
    }

    /// The value `attr` would hold after appending `value`.
    #[must_use]
    pub fn with_added(&self, attr: A, value: &Scalar) -> Value {
        let mut list = self.read(attr).into_scalars();
        list.push(value.clone());
        Value::Many(list)
    }

    /// The value `attr` would hold after removing every occurrence of
    /// `value`.
    #[must_use]
    pub fn with_removed(&self, attr: A, value: &Scalar) -> Value {
        let mut list = self.read(attr).into_scalars();
        list.retain(|v| !v.same(value));
        Value::Many(list)
    }

    /// Appends `value` to a multi-valued attribute.
    pub fn add(&mut self, attr: A, value: Scalar) {
        let next = self.with_added(attr, &value);
        self.element_edit(attr, next, [value], []);
    }

    /// Removes every occurrence of `value`. Returns `false` if it was not
    /// present, in which case nothing is recorded.
    pub fn remove(&mut self, attr: A, value: &Scalar) -> bool {
        if !self.read(attr).scalars().iter().any(|v| v.same(value)) {
            return false;
        }
        let next = self.with_removed(attr, value);
        self.element_edit(attr, next, [], [value.clone()]);
        true
    }

    /// Records an add or remove. Edits on top of a pending whole-value
    /// write stay part of that write.
    fn element_edit(
        &mut self,
        attr: A,
        next: Value,
        added: impl IntoIterator<Item = Scalar>,
        removed: impl IntoIterator<Item = Scalar>,
    ) {
        match self.changed.get(&attr) {
            Some(original) if original.equivalent(&next) => {
                self.changed.remove(&attr);
            }
            Some(_) => {}
            None => self.multivalued_changed(attr, added, removed),
        }
        self.overrides.insert(attr, next);
    }

    /// Values of `attr` in the profile, ignoring overrides and defaults.
    fn server_values(&self, attr: A) -> Vec<Scalar> {
        match (attr.predicate(), self.graph()) {
            (Some(predicate), Some(graph)) => Value::from_strings(graph.read(predicate)).into_scalars(),
            _ => Vec::new(),
        }
    }

    fn multivalued_changed(
        &mut self,
        attr: A,
        added: impl IntoIterator<Item = Scalar>,
        removed: impl IntoIterator<Item = Scalar>,
    ) {
        let server = self.server_values(attr);
        let diff = self.multivalued.entry(attr).or_default();
        diff.merge(added, removed);
        diff.rebase(&server);
        if diff.is_empty() {
            self.multivalued.remove(&attr);
        }
    }

    /// Whether either dirty set is non-empty.
    #[must_use]
    pub fn is_changed(&self) -> bool {
        !self.changed.is_empty() || !self.multivalued.is_empty()
    }

    /// Attributes with pending changes.
    #[must_use]
    pub fn changed(&self) -> Vec<A> {
        let mut attrs: Vec<A> = self
            .changed
            .keys()
            .chain(self.multivalued.keys())
            .copied()
            .collect();
        attrs.sort();
        attrs.dedup();
        attrs
    }

    /// Single-valued changes, `(old, current)` per attribute.
    #[must_use]
    pub fn changes(&self) -> Vec<Change<A>> {
        self.changed
            .iter()
            .map(|(attr, old)| Change {
                attribute: *attr,
                old: old.clone(),
                new: self.read(*attr),
            })
            .collect()
    }

    /// Multi-valued net diffs.
    pub fn multivalued_changes(&self) -> impl Iterator<Item = (A, &NetDiff)> {
        self.multivalued.iter().map(|(a, d)| (*a, d))
    }

    /// Drops dirty state and overrides and invalidates the profile.
    pub fn reset(&mut self) {
        self.overrides.clear();
        self.changed.clear();
        self.multivalued.clear();
        self.profile = ProfileState::Stale;
    }
}
