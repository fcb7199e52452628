//! Pagination loop: drives one request's full result set to completion.

use aquiline_core::error::FetchError;
use aquiline_core::http::ApiError;
use aquiline_core::ledger::TimeRange;
use chrono::SecondsFormat;

use crate::page::Page;
use crate::sensors::Bbox;

/// Hard ceiling on pages per request. At the fixed page size of 1000
/// this allows 300k records per entity per period, far beyond anything
/// the upstream serves; hitting it means the loop is not converging.
pub const DEFAULT_MAX_PAGES: u32 = 300;

/// One paginated request, before page/limit parameters are attached.
#[derive(Debug, Clone)]
pub struct PageQuery {
    pub path: String,
    pub params: Vec<(String, String)>,
}

impl PageQuery {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            params: Vec::new(),
        }
    }

    pub fn with_param(mut self, name: &str, value: impl ToString) -> Self {
        self.params.push((name.to_string(), value.to_string()));
        self
    }

    /// Measurements for one sensor over a time range. Instants are sent
    /// as RFC 3339 UTC and must round-trip exactly.
    pub fn measurements(sensor_id: i64, range: &TimeRange) -> Self {
        Self::new(format!("sensors/{sensor_id}/measurements"))
            .with_param(
                "datetime_from",
                range.from.to_rfc3339_opts(SecondsFormat::Secs, true),
            )
            .with_param(
                "datetime_to",
                range.to.to_rfc3339_opts(SecondsFormat::Secs, true),
            )
    }

    /// Monitoring locations inside a bounding box.
    pub fn locations(bbox: &Bbox) -> Self {
        Self::new("locations").with_param("bbox", bbox.to_param())
    }
}

/// Source of pages — the real client, or a scripted fake in tests.
pub trait PageSource<T> {
    fn fetch_page(&mut self, query: &PageQuery, page: u32) -> Result<Page<T>, ApiError>;
}

/// Reassembles a complete result set from consecutive pages.
#[derive(Debug, Clone, Copy)]
pub struct PaginatedFetcher {
    pub max_pages: u32,
}

impl Default for PaginatedFetcher {
    fn default() -> Self {
        Self {
            max_pages: DEFAULT_MAX_PAGES,
        }
    }
}

impl PaginatedFetcher {
    pub fn new(max_pages: u32) -> Self {
        Self { max_pages }
    }

    /// Fetch every page for `query` until the total reported by the
    /// first page is satisfied.
    ///
    /// `found == 0` on the first page is a valid terminal case: an empty
    /// result, no second request. A later page with zero records does
    /// not terminate the loop (the upstream serves sparse pages), but
    /// the loop never runs past `max_pages`: exhausting that ceiling
    /// before `collected >= found` fails the entity so the orchestrator
    /// can retry it whole.
    pub fn fetch<T, S: PageSource<T>>(
        &self,
        source: &mut S,
        query: &PageQuery,
    ) -> Result<Vec<T>, FetchError> {
        let mut page = 1u32;
        let mut found: Option<u64> = None;
        let mut collected: Vec<T> = Vec::new();

        loop {
            let response = source.fetch_page(query, page)?;
            // The first page's total is authoritative for this fetch;
            // later pages may report a shifted total and are ignored.
            let total = *found.get_or_insert(response.meta.found);

            if total == 0 {
                return Ok(Vec::new());
            }

            if response.results.is_empty() {
                log::debug!(
                    "{}: page {page} empty ({}/{total} collected)",
                    query.path,
                    collected.len()
                );
            }
            collected.extend(response.results);

            // >= not ==: the upstream total can shift mid-sequence and
            // an overshoot must not raise.
            if collected.len() as u64 >= total {
                return Ok(collected);
            }

            if page >= self.max_pages {
                return Err(FetchError::Pagination {
                    pages: page,
                    collected: collected.len(),
                    found: total,
                });
            }
            page += 1;
        }
    }
}
