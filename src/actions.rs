//! Async operations against the REST service.
//!
//! [`AdminClient`] is the only code that talks to the network.  Each action
//! sends through the tracked client (so busy flags stay accurate), applies the
//! outcome to the store under the slice lock, and reports user-visible
//! outcomes to the notification sink.
//!
//! | Action            | Request                   | Store effect on success                  |
//! |-------------------|---------------------------|------------------------------------------|
//! | `fetch_index`     | `GET index?query`         | merge entities, write ids, set total     |
//! | `load_index_page` | as above, unless local    | –                                        |
//! | `load_item`       | `GET item`                | merge entity, reset edit draft           |
//! | `submit_edit`     | `PATCH item`              | merge entity, reset edit draft           |
//! | `submit_add`      | `POST index`              | merge entity, blank add draft            |
//! | `remove_item`     | `DELETE item`             | drop entity, clear index ids             |

use std::sync::Arc;

use log::{debug, info, warn};
use serde_json::{json, Value};

use crate::alerts::{AlertCategory, NotificationSink};
use crate::db::{to_entities, Entities};
use crate::debounce::Debouncer;
use crate::error::{HttpError, Result, StoreError, ValidationError};
use crate::protocol::{IndexDocument, ItemDocument, Method, Transport};
use crate::query::{encode, Filters, Query, Sort, TransportQuery};
use crate::requests::{Settled, TrackedClient};
use crate::schema::{form_to_attributes, parse_as};
use crate::state::{FormKind, ItemLookup, ItemStatus, Store};
use crate::types::{EntityId, Resource, ResponseOrdering};

/// Debounce key: resource, draft, field.
type ValidationKey = (&'static str, FormKind, String);

pub struct AdminClient {
    store: Arc<Store>,
    http: TrackedClient,
    notifications: Arc<dyn NotificationSink>,
    validators: Debouncer<ValidationKey>,
}

impl AdminClient {
    /// Client reporting to the store's own alert queue.
    pub fn new(store: Arc<Store>, transport: Arc<dyn Transport>) -> Self {
        let http = TrackedClient::new(transport, Arc::clone(store.requests()));
        let notifications: Arc<dyn NotificationSink> = store.alerts().clone();
        let validators = Debouncer::new(store.config().debounce());
        Self {
            store,
            http,
            notifications,
            validators,
        }
    }

    /// Route notifications somewhere other than the store's alert queue.
    pub fn with_notifications(mut self, sink: Arc<dyn NotificationSink>) -> Self {
        self.notifications = sink;
        self
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    fn notify(&self, message: String, category: AlertCategory) {
        self.notifications.add_item(message, category);
    }

    // -----------------------------------------------------------------------
    // Index
    // -----------------------------------------------------------------------

    /// Fetch one page and fold it into the resource's index state.
    ///
    /// A non-2xx reply leaves the store untouched and yields an empty map, as
    /// does a reply overtaken by a later-issued fetch of overlapping slots
    /// under [`ResponseOrdering::LastIssued`].  A single malformed record
    /// rejects the whole page.
    pub async fn fetch_index<R: Resource>(
        &self,
        filters: Filters,
        sorts: Vec<Sort>,
        offset: usize,
        limit: usize,
    ) -> Result<Entities<R>> {
        let api = R::API;
        let query = Query {
            filters,
            sorts,
            offset,
            limit: limit.max(1),
        };
        debug!(
            "{}.fetch_index(offset={}, limit={}, shape={:?})",
            api.plural,
            query.offset,
            query.limit,
            query.shape_key()
        );

        let settled = match self.http.get(api.index_url, encode(&query)).await {
            Ok(settled) => settled,
            Err(e) => {
                warn!("{}.fetch_index: {}", api.plural, e);
                self.notify(
                    format!("Failed to load {}: {}", api.plural, e),
                    AlertCategory::Error,
                );
                return Err(e.into());
            }
        };

        if !settled.response.is_success() {
            let e = HttpError {
                method: Method::Get,
                url: api.index_url.to_string(),
                status: settled.response.status,
            };
            warn!("{}.fetch_index: {}", api.plural, e);
            self.notify(
                format!("Failed to load {}: {}", api.plural, e),
                AlertCategory::Error,
            );
            return Ok(Entities::new());
        }

        let (records, total) = match decode_page::<R>(&settled) {
            Ok(page) => page,
            Err(e) => {
                warn!("{}.fetch_index: rejected page: {}", api.plural, e);
                self.notify(
                    format!("Failed to load {}: {}", api.plural, e),
                    AlertCategory::Error,
                );
                return Err(e);
            }
        };

        let ids: Vec<EntityId> = records.iter().map(|r| r.id().to_string()).collect();
        let entities = to_entities(records);
        let shape = query.shape_key();

        let strict = self.store.config().ordering == ResponseOrdering::LastIssued;
        let window = offset..offset + query.limit;
        let seq = settled.seq;

        let applied = R::slice(&self.store).with_state(|st| {
            if !st.index.claim_window(&shape, window, seq, strict) {
                return false;
            }
            st.merge(&entities);
            st.index.apply_page(offset, &ids, total);
            st.index.fetched_shape = Some(shape);
            true
        });

        if !applied {
            warn!("{}.fetch_index: #{} superseded, discarded", api.plural, seq);
            return Ok(Entities::new());
        }
        debug!(
            "{}.fetch_index: #{} applied {} ids at {} (total {})",
            api.plural,
            seq,
            ids.len(),
            offset,
            total
        );
        Ok(entities)
    }

    /// Make the current window available, fetching only when it is not
    /// already answerable from local state.
    pub async fn load_index_page<R: Resource>(&self) -> Result<Vec<R>> {
        let slice = R::slice(&self.store);
        if !slice.window_is_local()? {
            let q = slice.query();
            self.fetch_index::<R>(q.filters, q.sorts, q.offset, q.limit)
                .await?;
        }
        Ok(slice.current_items()?)
    }

    // -----------------------------------------------------------------------
    // Item
    // -----------------------------------------------------------------------

    /// Select `id` and make sure its entity is cached.
    pub async fn load_item<R: Resource>(&self, id: &str) -> Result<ItemLookup<R>> {
        let api = R::API;
        let slice = R::slice(&self.store);
        slice.select(Some(id.to_string()));

        if let Some(item) = slice.cached(id) {
            // No draft worth keeping unless the item was loaded before.
            let draft_missing = matches!(
                slice.item_status(),
                ItemStatus::Empty
                    | ItemStatus::Loading
                    | ItemStatus::NotFound
                    | ItemStatus::LoadFailed(_)
            );
            if draft_missing {
                slice.reset_edit_form(&item);
            }
            return Ok(ItemLookup::Found(item));
        }

        slice.set_status_for(id, ItemStatus::Loading);
        let url = api.item_url(id);
        debug!("{}.load_item({})", api.singular, id);

        let settled = match self.http.get(&url, TransportQuery::new()).await {
            Ok(settled) => settled,
            Err(e) => {
                slice.set_status_for(id, ItemStatus::LoadFailed(e.to_string()));
                self.notify(
                    format!("Failed to load {}: {}", api.title, e),
                    AlertCategory::Error,
                );
                return Err(e.into());
            }
        };

        if settled.response.status == 404 {
            debug!("{}.load_item({}): not found", api.singular, id);
            slice.set_status_for(id, ItemStatus::NotFound);
            return Ok(ItemLookup::Missing);
        }

        match decode_item::<R>(Method::Get, &url, &settled) {
            Ok(item) => {
                slice.with_state(|st| st.merge(&to_entities([item.clone()])));
                if slice.selected_id().as_deref() == Some(id) {
                    slice.reset_edit_form(&item);
                }
                Ok(ItemLookup::Found(item))
            }
            Err(e) => {
                warn!("{}.load_item({}): {}", api.singular, id, e);
                slice.set_status_for(id, ItemStatus::LoadFailed(e.to_string()));
                self.notify(
                    format!("Failed to load {}: {}", api.title, e),
                    AlertCategory::Error,
                );
                Err(e)
            }
        }
    }

    /// Refill the edit draft from the selected entity.
    pub fn reset_edit_form<R: Resource>(&self) -> Result<()> {
        let slice = R::slice(&self.store);
        let item = slice.current_item().ok_or(StoreError::NoSelection)?;
        slice.reset_edit_form(&item);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Form editing
    // -----------------------------------------------------------------------

    /// Write a draft field and schedule its validation.
    pub fn change_field<R: Resource>(&self, kind: FormKind, field: &str, value: Value) {
        R::slice(&self.store).update_form(kind, field, value);
        self.validate_debounced::<R>(kind, field);
    }

    /// Validate `field` once the debounce window passes without another
    /// change to it.  Must be called inside a Tokio runtime.
    pub fn validate_debounced<R: Resource>(&self, kind: FormKind, field: &str) {
        let store = Arc::clone(&self.store);
        let name = field.to_string();
        self.validators
            .call((R::API.plural, kind, field.to_string()), move || {
                if let Err(e) = store.resource::<R>().validate_form(kind, &name) {
                    debug!("{}.validate({}) failed: {}", R::API.singular, name, e);
                }
            });
    }

    /// Validate `field` now, dropping any scheduled run for it.
    pub fn blur_field<R: Resource>(
        &self,
        kind: FormKind,
        field: &str,
    ) -> std::result::Result<(), ValidationError> {
        self.validators
            .cancel(&(R::API.plural, kind, field.to_string()));
        R::slice(&self.store).validate_form(kind, field)
    }

    pub fn validate_edit_form<R: Resource>(
        &self,
        field: &str,
    ) -> std::result::Result<(), ValidationError> {
        self.blur_field::<R>(FormKind::Edit, field)
    }

    // -----------------------------------------------------------------------
    // Submit / remove
    // -----------------------------------------------------------------------

    /// `PATCH` the edit draft to the selected item.
    pub async fn submit_edit<R: Resource>(&self) -> Result<R> {
        self.submit::<R>(FormKind::Edit).await
    }

    /// `POST` the add draft as a new item.
    pub async fn submit_add<R: Resource>(&self) -> Result<R> {
        self.submit::<R>(FormKind::Add).await
    }

    async fn submit<R: Resource>(&self, kind: FormKind) -> Result<R> {
        let api = R::API;
        let slice = R::slice(&self.store);
        let (verb, done) = match kind {
            FormKind::Edit => ("edit", "edited"),
            FormKind::Add => ("add", "added"),
        };

        let outstanding = slice.errors(kind);
        if !outstanding.is_empty() {
            return Err(StoreError::SubmitBlocked(outstanding.len()));
        }
        let target = match kind {
            FormKind::Edit => Some(slice.selected_id().ok_or(StoreError::NoSelection)?),
            FormKind::Add => None,
        };

        if let Err(e) = slice.validate_form(kind, "") {
            self.notify(
                format!("Failed to {} {}: {}", verb, api.title, e),
                AlertCategory::Error,
            );
            return Err(e.into());
        }

        let mut attributes = form_to_attributes::<R>(&slice.form(kind));
        let (method, url) = match &target {
            Some(id) => {
                attributes.insert("id".to_string(), Value::String(id.clone()));
                slice.set_status(ItemStatus::Submitting);
                (Method::Patch, api.item_url(id))
            }
            None => (Method::Post, api.index_url.to_string()),
        };
        let body = json!({ "data": Value::Object(attributes) });
        debug!("{}.submit_{}() -> {} {}", api.singular, verb, method, url);

        let outcome = match method {
            Method::Patch => self.http.patch(&url, body).await,
            _ => self.http.post(&url, body).await,
        };
        let outcome = outcome
            .map_err(StoreError::from)
            .and_then(|settled| decode_item::<R>(method, &url, &settled));

        match outcome {
            Ok(item) => {
                slice.with_state(|st| st.merge(&to_entities([item.clone()])));
                match kind {
                    FormKind::Edit => {
                        slice.reset_edit_form(&item);
                        slice.set_status(ItemStatus::SubmitSucceeded);
                    }
                    FormKind::Add => {
                        slice.reset_add_form();
                        slice.clear_ids();
                    }
                }
                info!("{} {} with id: {}", api.title, done, item.id());
                self.notify(
                    format!("{} {} with id: {}", api.title, done, item.id()),
                    AlertCategory::Success,
                );
                Ok(item)
            }
            Err(e) => {
                warn!("{}.submit_{}(): {}", api.singular, verb, e);
                if kind == FormKind::Edit {
                    slice.set_status(ItemStatus::SubmitFailed(e.to_string()));
                }
                self.notify(
                    format!("Failed to {} {}: {}", verb, api.title, e),
                    AlertCategory::Error,
                );
                Err(e)
            }
        }
    }

    /// `DELETE` an item.  On success the entity is dropped from the cache and
    /// the index ids are cleared so the next page load refetches.
    pub async fn remove_item<R: Resource>(&self, id: &str) -> Result<()> {
        let api = R::API;
        let url = api.item_url(id);
        debug!("{}.remove_item({})", api.singular, id);

        let outcome = match self.http.delete(&url).await {
            Ok(settled) if settled.response.is_success() => Ok(()),
            Ok(settled) => Err(StoreError::from(HttpError {
                method: Method::Delete,
                url: url.clone(),
                status: settled.response.status,
            })),
            Err(e) => Err(e.into()),
        };

        match outcome {
            Ok(()) => {
                R::slice(&self.store).forget(id);
                info!("{} removed with id: {}", api.title, id);
                self.notify(
                    format!("{} removed with id: {}", api.title, id),
                    AlertCategory::Success,
                );
                Ok(())
            }
            Err(e) => {
                warn!("{}.remove_item({}): {}", api.singular, id, e);
                self.notify(
                    format!("Failed to remove {}: {}", api.title, e),
                    AlertCategory::Error,
                );
                Err(e)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Response decoding
// ---------------------------------------------------------------------------

fn decode_page<R: Resource>(settled: &Settled) -> Result<(Vec<R>, usize)> {
    let doc: IndexDocument = settled.response.decode()?;
    let records = doc
        .data
        .into_iter()
        .map(parse_as::<R>)
        .collect::<std::result::Result<Vec<R>, ValidationError>>()?;
    Ok((records, doc.meta.page.total))
}

fn decode_item<R: Resource>(method: Method, url: &str, settled: &Settled) -> Result<R> {
    if !settled.response.is_success() {
        return Err(HttpError {
            method,
            url: url.to_string(),
            status: settled.response.status,
        }
        .into());
    }
    let doc: ItemDocument = settled.response.decode()?;
    Ok(parse_as::<R>(doc.data)?)
}
