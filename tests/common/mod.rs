//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use assessment_client::backend::{Backend, Params, RequestOptions};
use assessment_client::error::{ClientError, Result};
use assessment_client::json::JsonObject;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
}

/// One request seen by [`MockBackend`].
#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: Method,
    pub path: Vec<String>,
    pub params: Params,
    pub body: Option<JsonObject>,
}

type Handler = dyn Fn(&Recorded) -> Result<Value> + Send + Sync;

/// In-memory backend that records every request and answers from a handler.
pub struct MockBackend {
    handler: Box<Handler>,
    requests: Mutex<Vec<Recorded>>,
    /// Latency of successive GETs; later GETs answer at once.
    delays: Mutex<VecDeque<Duration>>,
}

impl MockBackend {
    pub fn new<F>(handler: F) -> Arc<Self>
    where
        F: Fn(&Recorded) -> Result<Value> + Send + Sync + 'static,
    {
        Self::with_delays(handler, Vec::<Duration>::new())
    }

    pub fn with_delays<F, D>(handler: F, delays: D) -> Arc<Self>
    where
        F: Fn(&Recorded) -> Result<Value> + Send + Sync + 'static,
        D: IntoIterator<Item = Duration>,
    {
        Arc::new(Self {
            handler: Box::new(handler),
            requests: Mutex::new(Vec::new()),
            delays: Mutex::new(delays.into_iter().collect()),
        })
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    fn answer(&self, request: Recorded) -> Result<JsonObject> {
        let response = (self.handler)(&request);
        self.requests.lock().unwrap().push(request);
        match response? {
            Value::Object(object) => Ok(object),
            other => Err(ClientError::InvalidResponse(format!("not an object: {other}"))),
        }
    }
}

#[async_trait]
impl Backend for MockBackend {
    async fn get(&self, path: &[String], options: RequestOptions) -> Result<JsonObject> {
        let delay = self.delays.lock().unwrap().pop_front();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.answer(Recorded {
            method: Method::Get,
            path: path.to_vec(),
            params: options.params,
            body: None,
        })
    }

    async fn post(
        &self,
        path: &[String],
        body: JsonObject,
        options: RequestOptions,
    ) -> Result<JsonObject> {
        self.answer(Recorded {
            method: Method::Post,
            path: path.to_vec(),
            params: options.params,
            body: Some(body),
        })
    }

    async fn put(
        &self,
        path: &[String],
        body: JsonObject,
        options: RequestOptions,
    ) -> Result<JsonObject> {
        self.answer(Recorded {
            method: Method::Put,
            path: path.to_vec(),
            params: options.params,
            body: Some(body),
        })
    }
}

pub fn not_found(path: &[String]) -> ClientError {
    ClientError::Http {
        status: 404,
        url: path.concat(),
        body: "Not found".to_string(),
    }
}

pub fn student_json(id: &str) -> Value {
    json!({
        "type": "student",
        "id": id,
        "firstName": "Student",
        "surname": id.to_uppercase(),
        "studentCode": format!("code-{id}"),
        "yearLevel": 8,
        "compassNumber": 100,
    })
}

pub fn student_ids(range: std::ops::RangeInclusive<usize>) -> Vec<String> {
    range.map(|n| format!("s{n}")).collect()
}

/// A numbered page response.
pub fn page_json(results: Vec<Value>, count: usize, page: u32, has_next: bool, has_previous: bool) -> Value {
    json!({
        "results": results,
        "count": count,
        "pageNumber": page,
        "next": if has_next { Value::from(format!("?page={}", page + 1)) } else { Value::Null },
        "previous": if has_previous { Value::from(format!("?page={}", page.saturating_sub(1))) } else { Value::Null },
    })
}

/// Answers `resolve=<ids>` queries with a student per id, except those in `missing`.
pub fn resolving_students(missing: &'static [&'static str]) -> impl Fn(&Recorded) -> Result<Value> + Send + Sync {
    move |request| {
        let ids = request.params.get("resolve").unwrap_or_default();
        let results: Vec<Value> = ids
            .split(',')
            .filter(|id| !id.is_empty() && !missing.contains(id))
            .map(student_json)
            .collect();
        let count = results.len();
        Ok(page_json(results, count, 1, false, false))
    }
}
