use std::fmt;

use tracing::debug;

use super::{read_count, Endpoint};
use crate::backend::Params;
use crate::error::Result;
use crate::json::{self, Decoder};

/// Target of a page navigation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageIndex {
    Number(u32),
    Last,
}

impl fmt::Display for PageIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Last => f.write_str("last"),
        }
    }
}

impl From<u32> for PageIndex {
    fn from(n: u32) -> Self {
        Self::Number(n)
    }
}

/// A paged list that has not been fetched yet.
#[derive(Debug, Clone)]
pub struct PageRequest<T> {
    endpoint: Endpoint<T>,
}

impl<T: Clone + Send + Sync + 'static> PageRequest<T> {
    pub fn new(endpoint: Endpoint<T>) -> Self {
        Self { endpoint }
    }

    /// Fetch the page selected by the original params (the first page by default).
    pub async fn fetch(&self) -> Result<ResponsePage<T>> {
        load(&self.endpoint, Params::new(), None).await
    }

    /// Build the first page from results that are already known, without a request.
    pub fn precached(self, count: usize, results: Vec<T>) -> ResponsePage<T> {
        ResponsePage {
            has_next: count > results.len(),
            has_previous: false,
            page_number: 1,
            count,
            results,
            endpoint: self.endpoint,
        }
    }
}

/// One page of a list.
#[derive(Debug, Clone)]
pub struct ResponsePage<T> {
    endpoint: Endpoint<T>,
    results: Vec<T>,
    count: usize,
    page_number: u32,
    has_next: bool,
    has_previous: bool,
}

impl<T: Clone + Send + Sync + 'static> ResponsePage<T> {
    pub fn results(&self) -> &[T] {
        &self.results
    }

    pub fn into_results(self) -> Vec<T> {
        self.results
    }

    /// Total number of items across all pages.
    pub fn count(&self) -> usize {
        self.count
    }

    pub fn page_number(&self) -> u32 {
        self.page_number
    }

    pub fn has_next(&self) -> bool {
        self.has_next
    }

    pub fn has_previous(&self) -> bool {
        self.has_previous
    }

    pub fn params(&self) -> &Params {
        self.endpoint.original_params()
    }

    /// The following page, or `None` on the last page. No request is made
    /// when there is no next page or the page number cannot advance.
    pub async fn next(&self) -> Result<Option<ResponsePage<T>>> {
        let Some(next) = self.page_number.checked_add(1).filter(|_| self.has_next) else {
            return Ok(None);
        };
        self.goto_page(PageIndex::Number(next)).await.map(Some)
    }

    /// The preceding page, or `None` on the first page.
    pub async fn previous(&self) -> Result<Option<ResponsePage<T>>> {
        if !self.has_previous || self.page_number <= 1 {
            return Ok(None);
        }
        self.goto_page(PageIndex::Number(self.page_number - 1))
            .await
            .map(Some)
    }

    pub async fn first(&self) -> Result<ResponsePage<T>> {
        self.goto_page(PageIndex::Number(1)).await
    }

    pub async fn last(&self) -> Result<ResponsePage<T>> {
        self.goto_page(PageIndex::Last).await
    }

    pub async fn goto_page(&self, index: impl Into<PageIndex>) -> Result<ResponsePage<T>> {
        let index = index.into();
        load(
            &self.endpoint,
            Params::new().set("page", index.to_string()),
            Some(index),
        )
        .await
    }
}

struct PageData<T> {
    results: Vec<T>,
    count: usize,
    page_number: Option<u32>,
    next: Option<String>,
    previous: Option<String>,
}

fn page_decoder<T: 'static>(item: Decoder<T>) -> Decoder<PageData<T>> {
    let results = json::array(item);
    let page_number = json::integer().and_then(|n| {
        u32::try_from(n).map_err(|_| format!("Invalid page number {n}"))
    });
    let link = json::string();
    json::object_with(move |obj| {
        Ok(PageData {
            results: obj.field("results", &results)?,
            count: read_count(obj)?,
            page_number: obj.optional("pageNumber", &page_number)?,
            next: obj.optional("next", &link)?,
            previous: obj.optional("previous", &link)?,
        })
    })
}

async fn load<T: Clone + Send + Sync + 'static>(
    endpoint: &Endpoint<T>,
    extra: Params,
    requested: Option<PageIndex>,
) -> Result<ResponsePage<T>> {
    debug!(path = ?endpoint.path(), page = ?requested, "Loading page");
    let body = endpoint.get(extra).await?;
    let data = page_decoder(endpoint.item.clone()).decode_object(body)?;

    // Servers that omit pageNumber are trusted to have served what was asked for.
    let page_number = data.page_number.unwrap_or(match requested {
        Some(PageIndex::Number(n)) => n,
        _ => original_page(endpoint.original_params()),
    });

    Ok(ResponsePage {
        endpoint: endpoint.clone(),
        has_next: data.next.is_some(),
        has_previous: data.previous.is_some(),
        page_number,
        count: data.count,
        results: data.results,
    })
}

fn original_page(params: &Params) -> u32 {
    params
        .get("page")
        .and_then(|page| page.parse().ok())
        .unwrap_or(1)
}
