//! Core admin types shared across all modules.

use std::path::Path;
use std::time::Duration;

use chrono::NaiveDate;
use config::{Config, ConfigError, Environment, File};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::protocol::{ResourceApi, MONSTER_API, ROBOT_API};
use crate::query::{Filters, Query, Sort, DEFAULT_LIMIT};
use crate::schema::FieldRule;
use crate::state::{ResourceStore, Store};

pub type EntityId = String;

// ---------------------------------------------------------------------------
// Resource trait
// ---------------------------------------------------------------------------

/// A record type the admin manages.
///
/// Ties together the wire descriptor, the validation schema, and the store
/// slice holding the type's cache and view state.
pub trait Resource:
    Clone + std::fmt::Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
    const API: ResourceApi;
    const FIELDS: &'static [FieldRule];

    fn id(&self) -> &str;

    fn slice(store: &Store) -> &ResourceStore<Self>;

    fn index_defaults(config: &AdminConfig) -> &IndexDefaults;
}

// ---------------------------------------------------------------------------
// Entities
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Robot {
    pub id: EntityId,
    pub name: String,
    #[serde(default)]
    pub manufacturer: Option<String>,
    #[serde(default)]
    pub assembly_date: Option<NaiveDate>,
}

impl Resource for Robot {
    const API: ResourceApi = ROBOT_API;
    const FIELDS: &'static [FieldRule] = &[
        FieldRule::text("name", true, 100),
        FieldRule::text("manufacturer", false, 100),
        FieldRule::date("assemblyDate", false),
    ];

    fn id(&self) -> &str {
        &self.id
    }

    fn slice(store: &Store) -> &ResourceStore<Self> {
        &store.robots
    }

    fn index_defaults(config: &AdminConfig) -> &IndexDefaults {
        &config.robots
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Monster {
    pub id: EntityId,
    pub name: String,
    #[serde(default)]
    pub citizenship: Option<String>,
    #[serde(default)]
    pub birth_date: Option<NaiveDate>,
}

impl Resource for Monster {
    const API: ResourceApi = MONSTER_API;
    const FIELDS: &'static [FieldRule] = &[
        FieldRule::text("name", true, 100),
        FieldRule::text("citizenship", false, 100),
        FieldRule::date("birthDate", false),
    ];

    fn id(&self) -> &str {
        &self.id
    }

    fn slice(store: &Store) -> &ResourceStore<Self> {
        &store.monsters
    }

    fn index_defaults(config: &AdminConfig) -> &IndexDefaults {
        &config.monsters
    }
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

/// How concurrent index responses for the same query shape are applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseOrdering {
    /// Every response applies when it arrives; the last to settle wins.
    #[default]
    LastSettled,
    /// Responses older than the last applied one (by issue order) are dropped.
    LastIssued,
}

/// Initial query of a paginated index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexDefaults {
    pub filters: Filters,
    pub sorts: Vec<Sort>,
    pub offset: usize,
    pub limit: usize,
}

impl Default for IndexDefaults {
    fn default() -> Self {
        Self {
            filters: Filters::new(),
            sorts: vec![Sort::asc("name")],
            offset: 0,
            limit: DEFAULT_LIMIT,
        }
    }
}

impl IndexDefaults {
    pub fn query(&self) -> Query {
        Query {
            filters: self.filters.clone(),
            sorts: self.sorts.clone(),
            offset: self.offset,
            limit: self.limit.max(1),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdminConfig {
    pub robots: IndexDefaults,
    pub monsters: IndexDefaults,
    /// Trailing-edge delay for change-triggered validation.
    pub debounce_ms: u64,
    /// Lifetime of a notification.
    pub alert_ttl_ms: u64,
    pub ordering: ResponseOrdering,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            robots: IndexDefaults::default(),
            monsters: IndexDefaults::default(),
            debounce_ms: 500,
            alert_ttl_ms: 5000,
            ordering: ResponseOrdering::LastSettled,
        }
    }
}

impl AdminConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn alert_ttl(&self) -> Duration {
        Duration::from_millis(self.alert_ttl_ms)
    }

    /// `ADMIN_*` variables; `__` descends into tables (`ADMIN_ROBOTS__LIMIT`).
    pub fn environment() -> Environment {
        Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true)
    }

    /// Layer an optional TOML file and `env` over the defaults.
    pub fn load(file: Option<&Path>, env: Environment) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();
        if let Some(path) = file {
            builder = builder.add_source(File::from(path));
        }
        builder.add_source(env).build()?.try_deserialize()
    }
}

pub const ENV_PREFIX: &str = "ADMIN";
