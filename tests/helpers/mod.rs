//! An in-memory mine, served to the client through the [Opener] trait.
#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use futures::{stream, StreamExt};
use intermine::errors::TransportError;
use intermine::transport::{ByteStream, Method, OpenRequest, Opener};
use intermine::types::ServiceRoot;
use intermine::Service;
use reqwest::StatusCode;
use serde_json::{json, Value};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::{Arc, Mutex};
use tokio::time::Instant;

pub type AnyResult = Result<(), Box<dyn std::error::Error>>;

pub const ROOT: &str = "http://mine.test/fakemine";
const PREFIX: &str = "/fakemine/service";
const MODEL: &str = include_str!("../data/model.json");

/// Responses are split into chunks this small, so that lines span chunks.
const CHUNK_SIZE: usize = 7;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FakeList {
    pub list_type: String,
    pub description: String,
    pub members: BTreeSet<String>,
    pub tags: BTreeSet<String>,
}

struct CannedResults {
    format: String,
    needle: String,
    body: String,
}

#[derive(Default)]
struct State {
    version: u32,
    lists: BTreeMap<String, FakeList>,
    statuses: VecDeque<&'static str>,
    polls: Vec<Instant>,
    results: Vec<CannedResults>,
    query_members: Vec<(String, Vec<String>)>,
    requests: Vec<(Method, String)>,
    uploaded_queries: Vec<String>,
}

#[derive(Clone)]
pub struct FakeMine {
    state: Arc<Mutex<State>>,
}

impl FakeMine {
    pub fn new() -> Self {
        let state = State {
            version: 31,
            statuses: VecDeque::from(["SUCCESS"]),
            ..State::default()
        };
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    pub fn with_version(self, version: u32) -> Self {
        self.state.lock().unwrap().version = version;
        self
    }

    pub fn add_list(&self, name: &str, list_type: &str, members: &[&str]) {
        let list = FakeList {
            list_type: list_type.to_string(),
            description: String::new(),
            members: members.iter().map(|m| m.to_string()).collect(),
            tags: BTreeSet::new(),
        };
        self.state
            .lock()
            .unwrap()
            .lists
            .insert(name.to_string(), list);
    }

    pub fn list(&self, name: &str) -> Option<FakeList> {
        self.state.lock().unwrap().lists.get(name).cloned()
    }

    pub fn list_names(&self) -> Vec<String> {
        self.state.lock().unwrap().lists.keys().cloned().collect()
    }

    /// Statuses reported by successive status checks. The last one repeats.
    pub fn job_statuses(&self, statuses: &[&'static str]) {
        self.state.lock().unwrap().statuses = statuses.iter().copied().collect();
    }

    /// When each job status check arrived.
    pub fn polls(&self) -> Vec<Instant> {
        self.state.lock().unwrap().polls.clone()
    }

    /// Serve `body` to queries in `format` whose XML contains `needle`.
    pub fn respond(&self, format: &str, needle: &str, body: String) {
        self.state.lock().unwrap().results.push(CannedResults {
            format: format.to_string(),
            needle: needle.to_string(),
            body,
        });
    }

    /// Objects which queries whose XML contains `needle` turn into lists.
    pub fn query_members(&self, needle: &str, members: &[&str]) {
        let members = members.iter().map(|m| m.to_string()).collect();
        self.state
            .lock()
            .unwrap()
            .query_members
            .push((needle.to_string(), members));
    }

    pub fn requests(&self) -> Vec<(Method, String)> {
        self.state.lock().unwrap().requests.clone()
    }

    pub fn count_requests(&self, method: Method, path: &str) -> usize {
        self.requests()
            .iter()
            .filter(|(m, p)| *m == method && p == path)
            .count()
    }

    pub fn uploaded_queries(&self) -> Vec<String> {
        self.state.lock().unwrap().uploaded_queries.clone()
    }
}

#[async_trait]
impl Opener for FakeMine {
    async fn send(&self, request: OpenRequest) -> Result<ByteStream, TransportError> {
        let body = self.state.lock().unwrap().handle(&request)?;
        let chunks: Vec<Result<Bytes, TransportError>> = body
            .as_bytes()
            .chunks(CHUNK_SIZE)
            .map(|c| Ok(Bytes::copy_from_slice(c)))
            .collect();
        Ok(stream::iter(chunks).boxed())
    }
}

fn not_found(path: &str) -> TransportError {
    let body = json!({ "error": format!("no resource at {}", path) }).to_string();
    TransportError::from_status(StatusCode::NOT_FOUND, &body, false)
}

fn success(extra: Value) -> String {
    let mut response = json!({"wasSuccessful": true, "error": null, "statusCode": 200});
    if let (Some(response), Value::Object(extra)) = (response.as_object_mut(), extra) {
        response.extend(extra);
    }
    response.to_string()
}

fn failure(message: String) -> String {
    json!({"wasSuccessful": false, "error": message, "statusCode": 400}).to_string()
}

fn split(value: &str) -> Vec<String> {
    value
        .split(';')
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

fn identifiers(body: &str) -> Vec<String> {
    body.split_whitespace()
        .map(|id| id.trim_matches('"').to_string())
        .collect()
}

struct Params(Vec<(String, String)>);

impl Params {
    fn get(&self, key: &str) -> &str {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map_or("", |(_, v)| v.as_str())
    }
}

impl State {
    fn handle(&mut self, request: &OpenRequest) -> Result<String, TransportError> {
        let url = url::Url::parse(&request.url).map_err(|_| not_found(&request.url))?;
        let path = url
            .path()
            .strip_prefix(PREFIX)
            .unwrap_or(url.path())
            .to_string();
        let mut params: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        let body = request.body.clone().unwrap_or_default();
        let is_form = request
            .content_type
            .as_deref()
            .map_or(false, |c| c.starts_with("application/x-www-form-urlencoded"));
        if is_form {
            params.extend(url::form_urlencoded::parse(body.as_bytes()).into_owned());
        }
        self.requests.push((request.method, path.clone()));
        let p = Params(params);
        let response = match (request.method, path.as_str()) {
            (Method::Get, "/version/ws") => format!("{}\n", self.version),
            (Method::Get, "/version/release") => "2024.1\n".to_string(),
            (Method::Get, "/model") => MODEL.to_string(),
            (Method::Get, "/lists") => self.lists_json(),
            (Method::Post, "/lists") => {
                let members = identifiers(&body);
                self.upload(&p, p.get("name"), p.get("type"), members)
            }
            (Method::Delete, "/lists") => match self.lists.remove(p.get("name")) {
                Some(_) => success(json!({})),
                None => failure(format!("no list called {}", p.get("name"))),
            },
            (Method::Get, "/lists/intersect/json") => self.combine(&p, |sets| {
                let mut sets = sets.into_iter();
                let first = sets.next().unwrap_or_default();
                sets.fold(first, |acc, s| acc.intersection(&s).cloned().collect())
            }),
            (Method::Get, "/lists/union/json") => {
                self.combine(&p, |sets| sets.into_iter().flatten().collect())
            }
            (Method::Get, "/lists/diff/json") => self.combine(&p, |sets| {
                let mut counts: BTreeMap<String, usize> = BTreeMap::new();
                for member in sets.into_iter().flatten() {
                    *counts.entry(member).or_default() += 1;
                }
                counts
                    .into_iter()
                    .filter(|(_, n)| *n == 1)
                    .map(|(m, _)| m)
                    .collect()
            }),
            (Method::Get, "/lists/subtract/json") => self.subtract(&p),
            (Method::Get, "/lists/rename") => {
                match self.lists.remove(p.get("oldname")) {
                    Some(list) => {
                        self.lists.insert(p.get("newname").to_string(), list);
                        success(json!({"listName": p.get("newname")}))
                    }
                    None => failure(format!("no list called {}", p.get("oldname"))),
                }
            }
            (Method::Post, "/lists/append") => {
                let ids = identifiers(&body);
                self.append(p.get("name"), ids)
            }
            (Method::Post, "/query/tolist") => {
                let members = self.members_of(p.get("query"));
                self.uploaded_queries.push(p.get("query").to_string());
                self.upload(&p, p.get("listName"), "Gene", members)
            }
            (Method::Post, "/query/append/tolist") => {
                let members = self.members_of(p.get("query"));
                self.uploaded_queries.push(p.get("query").to_string());
                self.append(p.get("listName"), members)
            }
            (_, "/list/tags") => self.tags(request.method, &p),
            (Method::Post, "/query/results") => self
                .results
                .iter()
                .find(|r| r.format == p.get("format") && p.get("query").contains(&r.needle))
                .map(|r| r.body.clone())
                .ok_or_else(|| not_found(&format!("{} {}", path, p.get("query"))))?,
            (Method::Post, "/ids") => json!({"uid": "job-1"}).to_string(),
            (Method::Get, "/ids/job-1/status") => {
                self.polls.push(Instant::now());
                let status = if self.statuses.len() > 1 {
                    self.statuses.pop_front()
                } else {
                    self.statuses.front().copied()
                };
                let status = status.filter(|s| *s != "null");
                json!({ "status": status }).to_string()
            }
            (Method::Get, "/ids/job-1/result") => json!({"results": {
                "1001": {"identifiers": {"eve": ["symbol"]}, "summary": {"symbol": "eve"}}
            }})
            .to_string(),
            (Method::Delete, "/ids/job-1") => String::new(),
            _ => return Err(not_found(&path)),
        };
        Ok(response)
    }

    fn lists_json(&self) -> String {
        let lists: Vec<Value> = self
            .lists
            .iter()
            .map(|(name, list)| {
                json!({
                    "name": name,
                    "title": name,
                    "type": list.list_type,
                    "size": list.members.len(),
                    "description": list.description,
                    "dateCreated": "2024-01-01T12:00:00",
                    "authorized": true,
                    "status": "CURRENT",
                    "tags": list.tags,
                })
            })
            .collect();
        success(json!({ "lists": lists }))
    }

    fn members_of(&self, query: &str) -> Vec<String> {
        self.query_members
            .iter()
            .find(|(needle, _)| query.contains(needle.as_str()))
            .map(|(_, members)| members.clone())
            .unwrap_or_default()
    }

    fn upload(&mut self, p: &Params, name: &str, list_type: &str, ids: Vec<String>) -> String {
        if self.lists.contains_key(name) {
            return failure(format!("There is already a list called {}", name));
        }
        let (unmatched, matched): (Vec<String>, Vec<String>) =
            ids.into_iter().partition(|id| id.starts_with("bogus"));
        let list = FakeList {
            list_type: list_type.to_string(),
            description: p.get("description").to_string(),
            members: matched.into_iter().collect(),
            tags: split(p.get("tags")).into_iter().collect(),
        };
        self.lists.insert(name.to_string(), list);
        success(json!({"listName": name, "unmatchedIdentifiers": unmatched}))
    }

    fn append(&mut self, name: &str, ids: Vec<String>) -> String {
        let Some(list) = self.lists.get_mut(name) else {
            return failure(format!("no list called {}", name));
        };
        let (unmatched, matched): (Vec<String>, Vec<String>) =
            ids.into_iter().partition(|id| id.starts_with("bogus"));
        list.members.extend(matched);
        success(json!({"listName": name, "unmatchedIdentifiers": unmatched}))
    }

    fn sets_of(&self, names: &[String]) -> Result<Vec<BTreeSet<String>>, String> {
        names
            .iter()
            .map(|name| {
                self.lists
                    .get(name)
                    .map(|l| l.members.clone())
                    .ok_or_else(|| failure(format!("no list called {}", name)))
            })
            .collect()
    }

    fn store_result(&mut self, p: &Params, sources: &[String], members: BTreeSet<String>) -> String {
        let name = p.get("name");
        if self.lists.contains_key(name) {
            return failure(format!("There is already a list called {}", name));
        }
        let list_type = sources
            .first()
            .and_then(|s| self.lists.get(s))
            .map(|l| l.list_type.clone())
            .unwrap_or_default();
        let list = FakeList {
            list_type,
            description: p.get("description").to_string(),
            members,
            tags: split(p.get("tags")).into_iter().collect(),
        };
        self.lists.insert(name.to_string(), list);
        success(json!({ "listName": name }))
    }

    fn combine(
        &mut self,
        p: &Params,
        operation: impl FnOnce(Vec<BTreeSet<String>>) -> BTreeSet<String>,
    ) -> String {
        let names = split(p.get("lists"));
        match self.sets_of(&names) {
            Ok(sets) => self.store_result(p, &names, operation(sets)),
            Err(response) => response,
        }
    }

    fn subtract(&mut self, p: &Params) -> String {
        let lefts = split(p.get("references"));
        let rights = split(p.get("subtract"));
        let (left, right) = match (self.sets_of(&lefts), self.sets_of(&rights)) {
            (Ok(left), Ok(right)) => (left, right),
            (Err(response), _) | (_, Err(response)) => return response,
        };
        let right: BTreeSet<String> = right.into_iter().flatten().collect();
        let members = left
            .into_iter()
            .flatten()
            .filter(|m| !right.contains(m))
            .collect();
        self.store_result(p, &lefts, members)
    }

    fn tags(&mut self, method: Method, p: &Params) -> String {
        let name = p.get("name");
        let Some(list) = self.lists.get_mut(name) else {
            return failure(format!("no list called {}", name));
        };
        let tags = split(p.get("tags"));
        match method {
            Method::Post => list.tags.extend(tags),
            Method::Delete => list.tags.retain(|t| !tags.contains(t)),
            Method::Get => {}
        }
        success(json!({ "tags": list.tags }))
    }
}

/// A results envelope in the streaming layout: one row per line.
pub fn json_results(views: &[&str], rows: &[Value]) -> String {
    let header = json!({"modelName": "genomic", "views": views}).to_string();
    let header = header.trim_end_matches('}');
    let rows: Vec<String> = rows.iter().map(Value::to_string).collect();
    format!(
        "{},\"results\":[\n{}\n],\"wasSuccessful\":true,\"error\":null,\"statusCode\":200}}\n",
        header,
        rows.join(",\n")
    )
}

/// A results envelope whose footer reports a failure.
pub fn failed_results(rows: &[Value], error: &str) -> String {
    let rows: Vec<String> = rows.iter().map(Value::to_string).collect();
    format!(
        "{{\"modelName\":\"genomic\",\"results\":[\n{}\n],\"wasSuccessful\":false,\"error\":{},\"statusCode\":500}}\n",
        rows.join(",\n"),
        json!(error)
    )
}

pub async fn connect(mine: &FakeMine) -> Service {
    Service::build(ServiceRoot::normalize(ROOT).unwrap())
        .unwrap()
        .opener(mine.clone())
        .connect()
        .await
        .unwrap()
}
