//! CRUD Admin Store
//!
//! Client-side state for an administration UI over a JSON:API service
//! exposing two resources, robots and monsters.
//!
//! ## Architecture
//!
//! ```text
//! AdminClient  (actions.rs)       ← fetch_index, load_item, submit, remove
//!   ├── TrackedClient  (requests.rs) → Transport  (protocol.rs / memory.rs)
//!   └── Store  (state.rs)
//!         ├── ResourceStore<Robot>    db, index, item
//!         ├── ResourceStore<Monster>  db, index, item
//!         ├── RequestTracker          pending requests
//!         ├── AlertQueue              notifications
//!         └── Location                → url_query
//! ```
//!
//! Views read derived projections (`current_items`, `full_load`,
//! `current_item`, `have_pending_requests`), which are memoised over the
//! versions of the state they read (`reactive.rs`).  Every mutation goes
//! through a store method or an `AdminClient` action.

pub mod actions;
pub mod alerts;
pub mod db;
pub mod debounce;
pub mod error;
pub mod memory;
pub mod protocol;
pub mod query;
pub mod reactive;
pub mod requests;
pub mod schema;
pub mod state;
pub mod types;

pub use actions::AdminClient;
pub use alerts::{Alert, AlertCategory, AlertQueue, NotificationSink};
pub use db::{Entities, EntityCache};
pub use error::{
    ConsistencyError, HttpError, Result, StoreError, TransportError, ValidationError,
};
pub use memory::{Fault, Gate, MemoryTransport};
pub use protocol::{Method, Request, ResourceApi, Response, Transport, MONSTER_API, ROBOT_API};
pub use query::{Direction, FilterOp, Filters, Predicate, Query, QueryError, Sort};
pub use state::{
    FormKind, IdList, ItemLookup, ItemPhase, ItemStatus, Location, ResourceStore, Store,
};
pub use types::{AdminConfig, EntityId, IndexDefaults, Monster, Resource, ResponseOrdering, Robot};
