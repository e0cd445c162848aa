//! In-process JSON:API server implementing `Transport`.
//!
//! Serves any number of collections, each mounted at an index URL, with the
//! same filter / sort / paging semantics the store expects from the real
//! service.  Used by the command-line front end as a demo backend and by the
//! tests as a transport double.
//!
//! ## Fault injection
//!
//! | Call              | Effect on the next request                         |
//! |-------------------|----------------------------------------------------|
//! | `fail_next(Status(n))`   | replies with status `n`, empty body         |
//! | `fail_next(Network(..))` | rejects with a [`TransportError`]           |
//! | `fail_next(Malformed)`   | replies 200 with a non-JSON body            |
//! | `gate_next()`            | holds the reply until the [`Gate`] opens    |
//!
//! A gated request is answered from the data as it stood when the request
//! *arrived*; only delivery is delayed.

use std::collections::{BTreeMap, VecDeque};

use async_trait::async_trait;
use log::debug;
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::sync::oneshot;

use crate::error::TransportError;
use crate::protocol::{
    IndexDocument, IndexMeta, ItemDocument, Method, PageMeta, Request, Response, Transport,
    MONSTER_API, ROBOT_API,
};
use crate::query::{compare_records, decode, matches_all};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fault {
    Status(u16),
    Network(String),
    Malformed,
}

/// Releases one held reply.  Dropping the gate also releases it.
#[derive(Debug)]
pub struct Gate {
    tx: oneshot::Sender<()>,
}

impl Gate {
    pub fn open(self) {
        let _ = self.tx.send(());
    }
}

#[derive(Debug, Default)]
struct Server {
    /// Index URL → records in insertion order.
    collections: BTreeMap<String, Vec<Value>>,
    next_id: u64,
}

#[derive(Debug, Default)]
pub struct MemoryTransport {
    server: Mutex<Server>,
    faults: Mutex<VecDeque<Fault>>,
    gates: Mutex<VecDeque<oneshot::Receiver<()>>>,
    log: Mutex<Vec<Request>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// A server preloaded with sample robots and monsters.
    pub fn demo() -> Self {
        let transport = Self::new();
        transport.mount(
            ROBOT_API.index_url,
            vec![
                json!({"id": "r1", "name": "Bender", "manufacturer": "Mom's Friendly Robot Company", "assemblyDate": "2996-09-04"}),
                json!({"id": "r2", "name": "Calculon", "manufacturer": "Friendly Robot Company", "assemblyDate": "2950-01-12"}),
                json!({"id": "r3", "name": "Crushinator", "manufacturer": "Mom's Friendly Robot Company"}),
                json!({"id": "r4", "name": "Hedonismbot", "manufacturer": "Hedonism Inc."}),
                json!({"id": "r5", "name": "Roberto", "manufacturer": "Mom's Friendly Robot Company", "assemblyDate": "2970-03-03"}),
                json!({"id": "r6", "name": "Robot Devil"}),
                json!({"id": "r7", "name": "URL", "manufacturer": "Police Robotics"}),
                json!({"id": "r8", "name": "Tinny Tim"}),
            ],
        );
        transport.mount(
            MONSTER_API.index_url,
            vec![
                json!({"id": "m1", "name": "Nibbler", "citizenship": "Vergon 6"}),
                json!({"id": "m2", "name": "Zoidberg", "citizenship": "Decapod 10", "birthDate": "2900-07-14"}),
                json!({"id": "m3", "name": "Lrrr", "citizenship": "Omicron Persei 8"}),
                json!({"id": "m4", "name": "Kif", "citizenship": "Amphibios 9"}),
            ],
        );
        transport
    }

    /// Serve `records` at `index_url`, replacing any previous collection.
    pub fn mount(&self, index_url: &str, records: Vec<Value>) {
        self.server
            .lock()
            .collections
            .insert(index_url.to_string(), records);
    }

    /// Replace one stored record's attributes (server-side edit).
    pub fn put_record(&self, index_url: &str, record: Value) {
        let mut server = self.server.lock();
        let records = server.collections.entry(index_url.to_string()).or_default();
        let id = record.get("id").cloned();
        match records.iter_mut().find(|r| r.get("id") == id.as_ref()) {
            Some(slot) => *slot = record,
            None => records.push(record),
        }
    }

    pub fn fail_next(&self, fault: Fault) {
        self.faults.lock().push_back(fault);
    }

    pub fn gate_next(&self) -> Gate {
        let (tx, rx) = oneshot::channel();
        self.gates.lock().push_back(rx);
        Gate { tx }
    }

    /// Every request received so far, in arrival order.
    pub fn requests(&self) -> Vec<Request> {
        self.log.lock().clone()
    }

    pub fn record_count(&self, index_url: &str) -> usize {
        self.server
            .lock()
            .collections
            .get(index_url)
            .map_or(0, Vec::len)
    }

    fn handle(&self, request: &Request) -> Response {
        let mut server = self.server.lock();
        let Some((index_url, id)) = route(&server, &request.url) else {
            return Response::new(404, "");
        };

        match (request.method, id) {
            (Method::Get, None) => index(&server.collections[&index_url], request),
            (Method::Post, None) => {
                server.next_id += 1;
                let id = format!("new-{}", server.next_id);
                let mut record = attributes(request);
                record.insert("id".into(), Value::String(id));
                let record = Value::Object(record);
                if let Some(records) = server.collections.get_mut(&index_url) {
                    records.push(record.clone());
                }
                Response::json(201, &ItemDocument { data: record })
            }
            (method, Some(id)) => {
                let Some(records) = server.collections.get_mut(&index_url) else {
                    return Response::new(404, "");
                };
                let Some(pos) = records.iter().position(|r| r["id"] == id.as_str()) else {
                    return Response::new(404, "");
                };
                match method {
                    Method::Get => Response::json(200, &ItemDocument { data: records[pos].clone() }),
                    Method::Patch => {
                        if let Value::Object(stored) = &mut records[pos] {
                            for (k, v) in attributes(request) {
                                if k != "id" {
                                    stored.insert(k, v);
                                }
                            }
                        }
                        Response::json(200, &ItemDocument { data: records[pos].clone() })
                    }
                    Method::Delete => {
                        records.remove(pos);
                        Response::new(204, "")
                    }
                    Method::Post => Response::new(405, ""),
                }
            }
            _ => Response::new(405, ""),
        }
    }
}

/// Resolve a URL to (collection, optional item id).
fn route(server: &Server, url: &str) -> Option<(String, Option<String>)> {
    if server.collections.contains_key(url) {
        return Some((url.to_string(), None));
    }
    let (base, id) = url.rsplit_once('/')?;
    if server.collections.contains_key(base) && !id.is_empty() {
        return Some((base.to_string(), Some(id.to_string())));
    }
    None
}

fn attributes(request: &Request) -> serde_json::Map<String, Value> {
    match request.body.as_ref().and_then(|b| b.get("data")) {
        Some(Value::Object(map)) => map.clone(),
        _ => serde_json::Map::new(),
    }
}

fn index(records: &[Value], request: &Request) -> Response {
    let query = match decode(&request.params) {
        Ok(q) => q,
        Err(e) => return Response::new(400, e.to_string()),
    };
    let mut matching: Vec<&Value> = records
        .iter()
        .filter(|r| matches_all(r, &query.filters))
        .collect();
    matching.sort_by(|a, b| compare_records(a, b, &query.sorts));

    let total = matching.len();
    let data = matching
        .into_iter()
        .skip(query.offset)
        .take(query.limit)
        .cloned()
        .collect();
    Response::json(
        200,
        &IndexDocument {
            data,
            meta: IndexMeta {
                page: PageMeta { total },
            },
        },
    )
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn send(&self, request: Request) -> Result<Response, TransportError> {
        self.log.lock().push(request.clone());
        let fault = self.faults.lock().pop_front();
        let gate = self.gates.lock().pop_front();

        let result = match fault {
            Some(Fault::Network(reason)) => Err(TransportError {
                method: request.method,
                url: request.url.clone(),
                reason,
            }),
            Some(Fault::Status(status)) => Ok(Response::new(status, "")),
            Some(Fault::Malformed) => Ok(Response::new(200, "<html>oops</html>")),
            None => Ok(self.handle(&request)),
        };

        if let Some(rx) = gate {
            debug!("[memory] holding {} {}", request.method, request.url);
            let _ = rx.await;
        }
        result
    }
}
