//! JSON:API wire protocol and transport boundary.
//!
//! This module owns **every shape that crosses the network boundary** between
//! the admin store and the REST service.  The store depends only on these
//! types; any HTTP library can sit behind [`Transport`].
//!
//! ## Endpoints
//!
//! | Operation    | Method   | URL                   | Body              | Reply                 |
//! |--------------|----------|-----------------------|-------------------|-----------------------|
//! | index        | `GET`    | `indexUrl` + query    | –                 | [`IndexDocument`]     |
//! | fetch item   | `GET`    | `itemUrl(id)`         | –                 | [`ItemDocument`]      |
//! | create       | `POST`   | `indexUrl`            | [`ItemDocument`]  | [`ItemDocument`]      |
//! | edit         | `PATCH`  | `itemUrl(id)`         | [`ItemDocument`]  | [`ItemDocument`]      |
//! | remove       | `DELETE` | `itemUrl(id)`         | –                 | empty                 |
//!
//! ## Design rules
//!
//! 1. Records are flat JSON objects (`id` plus attributes), camelCase keys.
//! 2. Any 2xx status is success; the body is only decoded on success.
//! 3. Transport failures (no response at all) are [`TransportError`]s, never
//!    a status code.

use std::fmt;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::TransportError;
use crate::query::TransportQuery;

// ---------------------------------------------------------------------------
// Documents
// ---------------------------------------------------------------------------

/// Reply to an index `GET`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexDocument {
    /// Raw records; parsed one by one against the resource schema.
    pub data: Vec<Value>,
    pub meta: IndexMeta,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexMeta {
    pub page: PageMeta,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PageMeta {
    /// Server-side count for the query's filters (ignores paging).
    pub total: usize,
}

/// Single-record envelope, used both as request and reply body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemDocument {
    pub data: Value,
}

// ---------------------------------------------------------------------------
// Resource descriptors
// ---------------------------------------------------------------------------

/// Static per-resource API configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceApi {
    /// Collection name, e.g. `robots`.
    pub plural: &'static str,
    /// Item name, e.g. `robot`.
    pub singular: &'static str,
    /// Human-facing name used in notifications, e.g. `Robot`.
    pub title: &'static str,
    pub index_url: &'static str,
}

impl ResourceApi {
    pub fn item_url(&self, id: &str) -> String {
        format!("{}/{}", self.index_url, id)
    }
}

pub const ROBOT_API: ResourceApi = ResourceApi {
    plural: "robots",
    singular: "robot",
    title: "Robot",
    index_url: "/api/robots",
};

pub const MONSTER_API: ResourceApi = ResourceApi {
    plural: "monsters",
    singular: "monster",
    title: "Monster",
    index_url: "/api/monsters",
};

// ---------------------------------------------------------------------------
// Requests / responses
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Post,
    Patch,
    Delete,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub method: Method,
    pub url: String,
    pub params: TransportQuery,
    pub body: Option<Value>,
}

impl Request {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            params: TransportQuery::new(),
            body: None,
        }
    }

    pub fn with_params(mut self, params: TransportQuery) -> Self {
        self.params = params;
        self
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub status: u16,
    pub body: Bytes,
}

impl Response {
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn json<T: Serialize>(status: u16, body: &T) -> Self {
        Self::new(status, serde_json::to_vec(body).unwrap_or_default())
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn decode<T: serde::de::DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_slice(&self.body)
    }
}

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

/// The network boundary.  Implementations resolve with *any* status code and
/// only fail when no response was obtained.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: Request) -> Result<Response, TransportError>;
}
