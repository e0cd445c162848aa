//! The admin store: entity caches, view state and derived projections.
//!
//! ## Layout
//!
//! ```text
//! Store
//!   ├── requests   RequestTracker          (shared by every slice)
//!   ├── alerts     AlertQueue
//!   ├── location   route / params / query  → url_query
//!   ├── robots     ResourceStore<Robot>
//!   │     ├── db      EntityCache<Robot>
//!   │     ├── index   total, ids, query    → full_load, current_items, have_pending_requests
//!   │     └── item    id, status, edit, add → current_item
//!   └── monsters   ResourceStore<Monster>  (same shape)
//! ```
//!
//! Views read the derived projections only; raw caches and id lists are
//! exposed for inspection and for the actions in [`crate::actions`].
//!
//! Every slice sits behind its own `parking_lot::Mutex`.  Locks are held only
//! for synchronous reads/writes and never across an `.await`.  A slice lock
//! may take the request-tracker lock, never the other way round.

use std::collections::{BTreeMap, HashMap};
use std::ops::Range;
use std::sync::Arc;

use log::{debug, error};
use parking_lot::Mutex;
use serde_json::Value;

use crate::alerts::AlertQueue;
use crate::db::{Entities, EntityCache};
use crate::error::{ConsistencyError, ValidationError};
use crate::query::{decode, filter_by_all, sort_by_all, Filters, Query, QueryError, Sort, TransportQuery};
use crate::reactive::{Memo, Source};
use crate::requests::RequestTracker;
use crate::schema::{empty_form, to_form, validate_field, Errors, Form};
use crate::types::{AdminConfig, EntityId, Monster, Resource, Robot};

/// Positional id list: slot `i` is the record at absolute offset `i` of the
/// server's ordering, or `None` while not yet fetched.
pub type IdList = Vec<Option<EntityId>>;

// ---------------------------------------------------------------------------
// Projections (pure)
// ---------------------------------------------------------------------------

/// Is every slot implied by `total` loaded?
///
/// Errors if more slots are loaded than `total` allows.
pub fn full_load(total: usize, ids: &[Option<EntityId>]) -> Result<bool, ConsistencyError> {
    let loaded = ids.iter().filter(|id| id.is_some()).count();
    if loaded > total {
        return Err(ConsistencyError { loaded, total });
    }
    Ok(loaded == total)
}

/// The page a list view shows.
///
/// Under full load every record for the query is local, so filters and sorts
/// are re-applied client-side before windowing; otherwise the server's order
/// is trusted and the window is taken from the positional list as-is.
pub fn current_items<R: Resource>(
    db: &EntityCache<R>,
    ids: &[Option<EntityId>],
    query: &Query,
    full: bool,
) -> Vec<R> {
    let resolved = ids
        .iter()
        .map(|slot| slot.as_ref().and_then(|id| db.get(id).cloned()));

    if full {
        let loaded: Vec<R> = resolved.flatten().collect();
        let filtered = filter_by_all(&query.filters, loaded);
        sort_by_all(&query.sorts, filtered)
            .into_iter()
            .skip(query.offset)
            .take(query.limit)
            .collect()
    } else {
        resolved
            .skip(query.offset)
            .take(query.limit)
            .flatten()
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Paginated view state
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub(crate) struct IndexState {
    pub(crate) total: Source<usize>,
    pub(crate) ids: Source<IdList>,
    pub(crate) query: Source<Query>,
    /// Shape of the query whose page was last applied (`None` = never fetched).
    pub(crate) fetched_shape: Option<String>,
    /// Per query shape, the request number that last wrote each slot.
    slot_seq: HashMap<String, Vec<u64>>,
}

impl IndexState {
    fn new(query: Query) -> Self {
        Self {
            total: Source::new(0),
            ids: Source::new(Vec::new()),
            query: Source::new(query),
            fetched_shape: None,
            slot_seq: HashMap::new(),
        }
    }

    /// Write a page's ids at absolute positions `offset..`.
    ///
    /// The list is padded with empty slots up to `total`, and trailing slots
    /// beyond both `total` and the page just written are dropped.
    pub(crate) fn apply_page(&mut self, offset: usize, page: &[EntityId], total: usize) {
        self.total.set(total);
        self.ids.update(|ids| {
            let end = offset + page.len();
            if ids.len() < end {
                ids.resize(end, None);
            }
            for (i, id) in page.iter().enumerate() {
                ids[offset + i] = Some(id.clone());
            }
            let keep = total.max(end);
            if ids.len() < total {
                ids.resize(total, None);
            } else if ids.len() > keep {
                ids.truncate(keep);
            }
        });
    }

    /// Record that request `seq` writes `window` of the `shape` ordering.
    ///
    /// With `strict`, returns `false` (and records nothing) if any slot in the
    /// window was already written by a later-issued request.  Windows that do
    /// not overlap never supersede each other.
    pub(crate) fn claim_window(
        &mut self,
        shape: &str,
        window: Range<usize>,
        seq: u64,
        strict: bool,
    ) -> bool {
        let slots = self.slot_seq.entry(shape.to_string()).or_default();
        let overtaken = slots
            .get(window.start.min(slots.len())..window.end.min(slots.len()))
            .is_some_and(|written| written.iter().any(|&s| s > seq));
        if strict && overtaken {
            return false;
        }
        if slots.len() < window.end {
            slots.resize(window.end, 0);
        }
        for s in &mut slots[window] {
            *s = (*s).max(seq);
        }
        true
    }

    fn clear_ids(&mut self) {
        self.ids.set(Vec::new());
        self.total.set(0);
        self.fetched_shape = None;
    }

    /// Is the current window answerable without a network call?
    fn window_is_local(&self) -> Result<bool, ConsistencyError> {
        let query = self.query.get();
        if self.fetched_shape.as_deref() != Some(query.shape_key().as_str()) {
            return Ok(false);
        }
        let ids = self.ids.get();
        let total = *self.total.get();
        if full_load(total, ids)? {
            return Ok(true);
        }
        let end = (query.offset + query.limit).min(total);
        Ok(query.offset < end && (query.offset..end).all(|i| matches!(ids.get(i), Some(Some(_)))))
    }
}

// ---------------------------------------------------------------------------
// Item edit / add state
// ---------------------------------------------------------------------------

/// Stored stage of the item load / edit / submit cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemStatus {
    Empty,
    Loading,
    Loaded,
    /// The draft has been touched since the last load / reset.
    Editing,
    NotFound,
    LoadFailed(String),
    Submitting,
    SubmitSucceeded,
    SubmitFailed(String),
}

/// Derived view of [`ItemStatus`], splitting `Editing` by validity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemPhase {
    Empty,
    Loading,
    Loaded,
    EditingValid,
    EditingInvalid,
    NotFound,
    LoadFailed(String),
    Submitting,
    SubmitSucceeded,
    SubmitFailed(String),
}

/// What an item view should render.
///
/// Keeps "still loading" apart from "no such entity".
#[derive(Debug, Clone, PartialEq)]
pub enum ItemLookup<R> {
    Unselected,
    Pending,
    Missing,
    Found(R),
}

/// Which draft an operation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FormKind {
    Edit,
    Add,
}

#[derive(Debug)]
pub(crate) struct FormState {
    pub(crate) form: Source<Form>,
    pub(crate) errors: Source<Errors>,
}

impl FormState {
    fn new(form: Form) -> Self {
        Self {
            form: Source::new(form),
            errors: Source::new(Errors::new()),
        }
    }
}

#[derive(Debug)]
pub(crate) struct ItemState {
    pub(crate) id: Source<Option<EntityId>>,
    pub(crate) status: Source<ItemStatus>,
    pub(crate) edit: FormState,
    pub(crate) add: FormState,
}

impl ItemState {
    fn new<R: Resource>() -> Self {
        Self {
            id: Source::new(None),
            status: Source::new(ItemStatus::Empty),
            edit: FormState::new(Form::new()),
            add: FormState::new(empty_form::<R>()),
        }
    }

    pub(crate) fn form_mut(&mut self, kind: FormKind) -> &mut FormState {
        match kind {
            FormKind::Edit => &mut self.edit,
            FormKind::Add => &mut self.add,
        }
    }

    fn form(&self, kind: FormKind) -> &FormState {
        match kind {
            FormKind::Edit => &self.edit,
            FormKind::Add => &self.add,
        }
    }
}

// ---------------------------------------------------------------------------
// Resource slice
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct Memos<R> {
    full_load: Memo<bool>,
    current_items: Memo<Vec<R>>,
    current_item: Memo<Option<R>>,
    have_pending_requests: Memo<bool>,
}

impl<R> Default for Memos<R> {
    fn default() -> Self {
        Self {
            full_load: Memo::default(),
            current_items: Memo::default(),
            current_item: Memo::default(),
            have_pending_requests: Memo::default(),
        }
    }
}

#[derive(Debug)]
pub(crate) struct ResourceState<R> {
    pub(crate) db: Source<EntityCache<R>>,
    pub(crate) index: IndexState,
    pub(crate) item: ItemState,
    /// Number of validation runs, debounced or not.
    pub(crate) validation_runs: u64,
    memos: Memos<R>,
}

impl<R: Resource> ResourceState<R> {
    fn new(query: Query) -> Self {
        Self {
            db: Source::new(EntityCache::new()),
            index: IndexState::new(query),
            item: ItemState::new::<R>(),
            validation_runs: 0,
            memos: Memos::default(),
        }
    }

    pub(crate) fn merge(&mut self, entities: &Entities<R>) {
        if !entities.is_empty() {
            self.db.update(|db| db.merge(entities));
        }
    }

    fn full_load(&mut self) -> Result<bool, ConsistencyError> {
        let index = &self.index;
        let deps = [index.total.version(), index.ids.version()];
        self.memos
            .full_load
            .try_read(&deps, || full_load(*index.total.get(), index.ids.get()))
    }

    fn current_items(&mut self) -> Result<Vec<R>, ConsistencyError> {
        let full = self.full_load()?;
        let Self {
            db, index, memos, ..
        } = self;
        let deps = [
            db.version(),
            index.ids.version(),
            index.total.version(),
            index.query.version(),
        ];
        Ok(memos.current_items.read(&deps, || {
            current_items(db.get(), index.ids.get(), index.query.get(), full)
        }))
    }

    fn current_item(&mut self) -> Option<R> {
        let Self {
            db, item, memos, ..
        } = self;
        let deps = [db.version(), item.id.version()];
        memos.current_item.read(&deps, || {
            item.id
                .get()
                .as_ref()
                .and_then(|id| db.get().get(id).cloned())
        })
    }
}

/// One resource type's cache and view state.
#[derive(Debug)]
pub struct ResourceStore<R: Resource> {
    state: Mutex<ResourceState<R>>,
    requests: Arc<RequestTracker>,
    defaults: Query,
}

impl<R: Resource> ResourceStore<R> {
    pub(crate) fn new(defaults: Query, requests: Arc<RequestTracker>) -> Self {
        Self {
            state: Mutex::new(ResourceState::new(defaults.clone())),
            requests,
            defaults,
        }
    }

    pub(crate) fn with_state<T>(&self, f: impl FnOnce(&mut ResourceState<R>) -> T) -> T {
        f(&mut self.state.lock())
    }

    pub(crate) fn reset(&self) {
        *self.state.lock() = ResourceState::new(self.defaults.clone());
    }

    // -----------------------------------------------------------------------
    // Index projections
    // -----------------------------------------------------------------------

    pub fn total(&self) -> usize {
        *self.state.lock().index.total.get()
    }

    /// Active filters / sorts / offset / limit.
    pub fn query(&self) -> Query {
        self.state.lock().index.query.get().clone()
    }

    pub fn full_load(&self) -> Result<bool, ConsistencyError> {
        let result = self.state.lock().full_load();
        if let Err(e) = &result {
            error!("{}.full_load: {}", R::API.plural, e);
        }
        result
    }

    pub fn current_items(&self) -> Result<Vec<R>, ConsistencyError> {
        let result = self.state.lock().current_items();
        if let Err(e) = &result {
            error!("{}.current_items: {}", R::API.plural, e);
        }
        result
    }

    /// Busy flag: any tracked request on this resource's URLs.
    pub fn have_pending_requests(&self) -> bool {
        let mut st = self.state.lock();
        let version = self.requests.version();
        st.memos
            .have_pending_requests
            .read(&[version], || self.requests.contains_prefix(R::API.index_url))
    }

    /// Does the current window need no network call?
    pub fn window_is_local(&self) -> Result<bool, ConsistencyError> {
        self.state.lock().index.window_is_local()
    }

    // -----------------------------------------------------------------------
    // Index setters
    // -----------------------------------------------------------------------

    /// Replace the filters.  The id list is *not* cleared: its slots go stale
    /// until the next page for the new filters arrives (see [`Self::clear_ids`]).
    pub fn set_filters(&self, filters: Filters) {
        self.state.lock().index.query.update(|q| q.filters = filters);
    }

    /// Replace the sorts.  Like [`Self::set_filters`], leaves `ids` in place.
    pub fn set_sorts(&self, sorts: Vec<Sort>) {
        self.state.lock().index.query.update(|q| q.sorts = sorts);
    }

    pub fn set_offset(&self, offset: usize) {
        self.state.lock().index.query.update(|q| q.offset = offset);
    }

    /// Zero is clamped to one.
    pub fn set_limit(&self, limit: usize) {
        self.state.lock().index.query.update(|q| q.limit = limit.max(1));
    }

    pub fn set_query(&self, mut query: Query) {
        query.limit = query.limit.max(1);
        self.state.lock().index.query.set(query);
    }

    /// Forget every loaded position and the total.
    pub fn clear_ids(&self) {
        self.state.lock().index.clear_ids();
    }

    // -----------------------------------------------------------------------
    // Raw inspection
    // -----------------------------------------------------------------------

    pub fn ids(&self) -> IdList {
        self.state.lock().index.ids.get().clone()
    }

    pub fn cached(&self, id: &str) -> Option<R> {
        self.state.lock().db.get().get(id).cloned()
    }

    pub fn cache_len(&self) -> usize {
        self.state.lock().db.get().len()
    }

    // -----------------------------------------------------------------------
    // Item projections
    // -----------------------------------------------------------------------

    pub fn selected_id(&self) -> Option<EntityId> {
        self.state.lock().item.id.get().clone()
    }

    pub fn current_item(&self) -> Option<R> {
        self.state.lock().current_item()
    }

    pub fn item_status(&self) -> ItemStatus {
        self.state.lock().item.status.get().clone()
    }

    pub fn item_phase(&self) -> ItemPhase {
        let st = self.state.lock();
        let valid = st.item.edit.errors.get().is_empty();
        match st.item.status.get().clone() {
            ItemStatus::Empty => ItemPhase::Empty,
            ItemStatus::Loading => ItemPhase::Loading,
            ItemStatus::Loaded => ItemPhase::Loaded,
            ItemStatus::Editing if valid => ItemPhase::EditingValid,
            ItemStatus::Editing => ItemPhase::EditingInvalid,
            ItemStatus::NotFound => ItemPhase::NotFound,
            ItemStatus::LoadFailed(e) => ItemPhase::LoadFailed(e),
            ItemStatus::Submitting => ItemPhase::Submitting,
            ItemStatus::SubmitSucceeded => ItemPhase::SubmitSucceeded,
            ItemStatus::SubmitFailed(e) => ItemPhase::SubmitFailed(e),
        }
    }

    pub fn item_lookup(&self) -> ItemLookup<R> {
        let pending = self.have_pending_requests();
        let mut st = self.state.lock();
        if st.item.id.get().is_none() {
            return ItemLookup::Unselected;
        }
        if let Some(item) = st.current_item() {
            return ItemLookup::Found(item);
        }
        match st.item.status.get() {
            ItemStatus::Loading => ItemLookup::Pending,
            ItemStatus::Empty if pending => ItemLookup::Pending,
            _ => ItemLookup::Missing,
        }
    }

    pub fn form(&self, kind: FormKind) -> Form {
        self.state.lock().item.form(kind).form.get().clone()
    }

    pub fn errors(&self, kind: FormKind) -> Errors {
        self.state.lock().item.form(kind).errors.get().clone()
    }

    pub fn edit_form(&self) -> Form {
        self.form(FormKind::Edit)
    }

    pub fn edit_errors(&self) -> Errors {
        self.errors(FormKind::Edit)
    }

    pub fn add_form(&self) -> Form {
        self.form(FormKind::Add)
    }

    pub fn add_errors(&self) -> Errors {
        self.errors(FormKind::Add)
    }

    pub(crate) fn set_status(&self, status: ItemStatus) {
        self.state.lock().item.status.set(status);
    }

    /// Update the status only if `id` is still the selected item.
    pub(crate) fn set_status_for(&self, id: &str, status: ItemStatus) {
        let mut st = self.state.lock();
        if st.item.id.get().as_deref() == Some(id) {
            st.item.status.set(status);
        }
    }

    /// Drop a deleted entity and invalidate the index so it is refetched.
    pub(crate) fn forget(&self, id: &str) {
        let mut st = self.state.lock();
        st.db.update(|db| {
            db.remove(id);
        });
        st.index.clear_ids();
        if st.item.id.get().as_deref() == Some(id) {
            st.item.status.set(ItemStatus::NotFound);
        }
    }

    // -----------------------------------------------------------------------
    // Item / form operations (synchronous)
    // -----------------------------------------------------------------------

    /// Select an item for the detail / edit views.
    pub fn select(&self, id: Option<EntityId>) {
        let mut st = self.state.lock();
        if st.item.id.get() != &id {
            st.item.id.set(id);
            st.item.status.set(ItemStatus::Empty);
        }
    }

    /// Copy `entity`'s attributes into the edit draft and clear its errors.
    pub fn reset_edit_form(&self, entity: &R) {
        let mut st = self.state.lock();
        st.item.edit.form.set(to_form(entity));
        st.item.edit.errors.set(Errors::new());
        st.item.status.set(ItemStatus::Loaded);
    }

    /// Blank the add draft and clear its errors.
    pub fn reset_add_form(&self) {
        let mut st = self.state.lock();
        st.item.add.form.set(empty_form::<R>());
        st.item.add.errors.set(Errors::new());
    }

    /// Write one draft field.  No validation happens here.
    pub fn update_form(&self, kind: FormKind, field: &str, value: Value) {
        let mut st = self.state.lock();
        st.item
            .form_mut(kind)
            .form
            .update(|form| form.insert(field.to_string(), value));
        if kind == FormKind::Edit {
            let touched = matches!(
                st.item.status.get(),
                ItemStatus::Loaded | ItemStatus::SubmitSucceeded | ItemStatus::SubmitFailed(_)
            );
            if touched {
                st.item.status.set(ItemStatus::Editing);
            }
        }
    }

    pub fn update_edit_form(&self, field: &str, value: Value) {
        self.update_form(FormKind::Edit, field, value);
    }

    pub fn update_add_form(&self, field: &str, value: Value) {
        self.update_form(FormKind::Add, field, value);
    }

    /// Validate one field (or the whole draft for `""`) and record the outcome
    /// in the draft's error map.
    pub fn validate_form(&self, kind: FormKind, field: &str) -> Result<(), ValidationError> {
        let mut st = self.state.lock();
        st.validation_runs += 1;
        let draft = st.item.form_mut(kind);
        let result = validate_field::<R>(draft.form.get(), field);
        debug!(
            "{}.validate({:?}, {:?}) -> {}",
            R::API.singular,
            kind,
            field,
            if result.is_ok() { "ok" } else { "invalid" }
        );

        draft.errors.update(|errors| match (&result, field) {
            (Ok(()), "") => errors.clear(),
            (Ok(()), f) => {
                errors.remove(f);
            }
            (Err(e), "") => *errors = e.errors.clone(),
            (Err(e), f) => {
                if let Some(message) = e.message(f) {
                    errors.insert(f.to_string(), message.to_string());
                }
            }
        });
        result
    }

    pub fn validate_edit_form(&self, field: &str) -> Result<(), ValidationError> {
        self.validate_form(FormKind::Edit, field)
    }

    pub fn validate_add_form(&self, field: &str) -> Result<(), ValidationError> {
        self.validate_form(FormKind::Add, field)
    }

    pub fn validation_runs(&self) -> u64 {
        self.state.lock().validation_runs
    }

    /// Submit is allowed only while the draft carries no errors.
    pub fn can_submit(&self, kind: FormKind) -> bool {
        self.state.lock().item.form(kind).errors.get().is_empty()
    }
}

// ---------------------------------------------------------------------------
// Location
// ---------------------------------------------------------------------------

/// Current route as reported by the router.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Location {
    pub route: Option<String>,
    pub path: Option<String>,
    pub params: BTreeMap<String, String>,
    pub query: TransportQuery,
}

#[derive(Debug, Default)]
struct LocationState {
    location: Source<Location>,
    url_query: Memo<Query>,
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// The whole client-side state.  Build once, share by `Arc`.
#[derive(Debug)]
pub struct Store {
    config: AdminConfig,
    requests: Arc<RequestTracker>,
    alerts: Arc<AlertQueue>,
    location: Mutex<LocationState>,
    pub robots: ResourceStore<Robot>,
    pub monsters: ResourceStore<Monster>,
}

impl Store {
    pub fn new(config: AdminConfig) -> Self {
        let requests = Arc::new(RequestTracker::new());
        let alerts = Arc::new(AlertQueue::new(config.alert_ttl()));
        Self {
            robots: ResourceStore::new(Robot::index_defaults(&config).query(), requests.clone()),
            monsters: ResourceStore::new(Monster::index_defaults(&config).query(), requests.clone()),
            location: Mutex::new(LocationState::default()),
            requests,
            alerts,
            config,
        }
    }

    pub fn config(&self) -> &AdminConfig {
        &self.config
    }

    pub fn requests(&self) -> &Arc<RequestTracker> {
        &self.requests
    }

    pub fn alerts(&self) -> &Arc<AlertQueue> {
        &self.alerts
    }

    pub fn resource<R: Resource>(&self) -> &ResourceStore<R> {
        R::slice(self)
    }

    pub fn set_location(&self, location: Location) {
        self.location.lock().location.set(location);
    }

    pub fn location(&self) -> Location {
        self.location.lock().location.get().clone()
    }

    /// Index query encoded in the current URL.
    pub fn url_query(&self) -> Result<Query, QueryError> {
        let mut st = self.location.lock();
        let LocationState {
            location,
            url_query,
        } = &mut *st;
        url_query.try_read(&[location.version()], || decode(&location.get().query))
    }

    /// Restore every slice to its initial value.
    pub fn reset(&self) {
        self.robots.reset();
        self.monsters.reset();
        self.requests.clear();
        self.alerts.clear();
        *self.location.lock() = LocationState::default();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
