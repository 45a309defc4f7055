//! Following `links[rel = "next"]` through paged API resources.

use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::camara::{ApiError, CamaraApiClient, Record, ENVELOPE_FIELD};

#[derive(Debug, Error)]
pub enum PaginationError {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("malformed page: {0}")]
    MalformedPage(String),

    #[error("pagination exceeded {max_pages} pages")]
    Exhausted { max_pages: u32 },
}

/// Return the `href` of the `next` link, or `None` when there are no more pages.
///
/// An absent, empty or malformed `links` collection means no more pages.
#[must_use]
pub fn next_page(response: &Value) -> Option<String> {
    response
        .get("links")?
        .as_array()?
        .iter()
        .find_map(|link| {
            let rel = link.get("rel")?.as_str()?;
            let href = link.get("href")?.as_str()?;
            (rel == "next" && !href.is_empty()).then(|| href.to_string())
        })
}

/// Extract the records under the `dados` envelope of a paged response.
///
/// # Errors
///
/// Returns [`PaginationError::MalformedPage`] if `dados` is missing, is not an
/// array, or contains a non-object item.
pub fn page_records(response: &Value) -> Result<Vec<Record>, PaginationError> {
    let items = response
        .get(ENVELOPE_FIELD)
        .ok_or_else(|| PaginationError::MalformedPage(format!("missing '{ENVELOPE_FIELD}'")))?
        .as_array()
        .ok_or_else(|| {
            PaginationError::MalformedPage(format!("'{ENVELOPE_FIELD}' is not an array"))
        })?;

    items
        .iter()
        .map(|item| {
            item.as_object().cloned().ok_or_else(|| {
                PaginationError::MalformedPage(format!("'{ENVELOPE_FIELD}' item is not an object"))
            })
        })
        .collect()
}

/// Walks a paged resource to exhaustion, bounded by a page count.
#[derive(Debug, Clone, Copy)]
pub struct Paginator {
    max_pages: u32,
}

impl Paginator {
    #[must_use]
    pub const fn new(max_pages: u32) -> Self {
        Self { max_pages }
    }

    /// Accumulate the records of `first` and every page reachable from it.
    ///
    /// # Errors
    ///
    /// Fails on the first fetch error or malformed page, and with
    /// [`PaginationError::Exhausted`] if a `next` link is still present after
    /// `max_pages` pages.
    pub async fn collect<C>(&self, client: &C, first: Value) -> Result<Vec<Record>, PaginationError>
    where
        C: CamaraApiClient + ?Sized,
    {
        let mut records = page_records(&first)?;
        let mut cursor = next_page(&first);
        let mut pages = 1;

        while let Some(url) = cursor {
            if pages >= self.max_pages {
                return Err(PaginationError::Exhausted {
                    max_pages: self.max_pages,
                });
            }

            debug!(%url, page = pages + 1, "following next page");
            let page = client.follow(&url).await?;
            records.extend(page_records(&page)?);
            cursor = next_page(&page);
            pages += 1;
        }

        Ok(records)
    }
}
