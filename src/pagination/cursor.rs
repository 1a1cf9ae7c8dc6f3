use tracing::debug;

use super::{read_count, Endpoint};
use crate::backend::Params;
use crate::error::Result;
use crate::json::{self, Decoder};
use crate::model::Model;

/// A cursor list that has not been fetched yet.
#[derive(Debug, Clone)]
pub struct CursorRequest<T> {
    endpoint: Endpoint<T>,
}

impl<T: Model> CursorRequest<T> {
    pub fn new(endpoint: Endpoint<T>) -> Self {
        Self { endpoint }
    }

    /// Fetch the first increment.
    pub async fn fetch(&self) -> Result<ResponseCursor<T>> {
        self.empty().more().await
    }

    /// Start from results that are already known, without a request.
    ///
    /// The result always reports `has_more`, so exhaustion is confirmed by
    /// one further [`ResponseCursor::more`].
    pub fn precached(self, count: usize, results: Vec<T>) -> ResponseCursor<T> {
        ResponseCursor {
            endpoint: self.endpoint,
            results,
            count,
            has_more: true,
        }
    }

    fn empty(&self) -> ResponseCursor<T> {
        ResponseCursor {
            endpoint: self.endpoint.clone(),
            results: Vec::new(),
            count: 0,
            has_more: true,
        }
    }
}

/// Every item seen so far of a cursor-paginated list.
#[derive(Debug, Clone)]
pub struct ResponseCursor<T> {
    endpoint: Endpoint<T>,
    results: Vec<T>,
    count: usize,
    has_more: bool,
}

impl<T: Model> ResponseCursor<T> {
    pub fn results(&self) -> &[T] {
        &self.results
    }

    pub fn into_results(self) -> Vec<T> {
        self.results
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn has_more(&self) -> bool {
        self.has_more
    }

    /// Id of the last item seen, or empty when nothing has been seen.
    pub fn cursor(&self) -> &str {
        self.results.last().map(|model| model.id()).unwrap_or("")
    }

    /// Fetch the next increment and append it.
    pub async fn more(&self) -> Result<ResponseCursor<T>> {
        let cursor = self.cursor().to_string();
        debug!(path = ?self.endpoint.path(), cursor = %cursor, "Loading cursor increment");

        let body = self.endpoint.get(Params::new().set("cursor", cursor)).await?;
        let (increment, count) = increment_decoder(self.endpoint.item.clone()).decode_object(body)?;

        let got_any = !increment.is_empty();
        let mut results = self.results.clone();
        results.extend(increment);

        Ok(ResponseCursor {
            endpoint: self.endpoint.clone(),
            has_more: got_any && results.len() < count,
            results,
            count,
        })
    }
}

fn increment_decoder<T: 'static>(item: Decoder<T>) -> Decoder<(Vec<T>, usize)> {
    let results = json::array(item);
    json::object_with(move |obj| Ok((obj.field("results", &results)?, read_count(obj)?)))
}
