//! Paginators and the multi-source pagination coordinator.
//!
//! A [`Paginator`] windows one source at a time. [`AggregatePagination`]
//! wraps any paginator, tracking the largest per-source count and the
//! running total across sources so a single envelope can describe the
//! whole response.

use std::collections::BTreeMap;
use std::fmt;

use serde_json::{Value, json};
use tracing::warn;

use super::error::AggregateError;
use super::types::{PagerStyle, PaginationSettings, RequestContext};
use crate::store::QuerySet;

/// Per-source pagination.
pub trait Paginator: Send + fmt::Debug {
    /// Window a source. `None` means pagination is not in effect.
    fn paginate(&mut self, rows: &QuerySet, request: &RequestContext) -> Option<QuerySet>;

    /// Size of the most recently paginated source.
    fn count(&self) -> usize;

    /// Override the count used for link computation.
    fn set_count(&mut self, count: usize);

    fn next_link(&self) -> Option<String>;

    fn previous_link(&self) -> Option<String>;

    /// Wrap a merged result in the paginated envelope.
    ///
    /// A paginator must be wrapped in [`AggregatePagination`] (or provide
    /// its own envelope) to serve a multi-source view.
    fn format_response(&mut self, _data: Value, view: &str) -> Result<Value, AggregateError> {
        Err(AggregateError::configuration(
            view,
            "a single-source paginator cannot be used as is; wrap it in AggregatePagination or \
             override format_response",
        ))
    }
}

/// Build the paginator a view's settings describe.
pub fn paginator_from_settings(settings: &PaginationSettings) -> Box<dyn Paginator> {
    match (&settings.style, settings.aggregate) {
        (PagerStyle::LimitOffset { .. }, true) => Box::new(AggregatePagination::new(
            LimitOffsetPagination::from_style(&settings.style),
        )),
        (PagerStyle::LimitOffset { .. }, false) => {
            Box::new(LimitOffsetPagination::from_style(&settings.style))
        }
        (PagerStyle::PageNumber { .. }, true) => Box::new(AggregatePagination::new(
            PageNumberPagination::from_style(&settings.style),
        )),
        (PagerStyle::PageNumber { .. }, false) => {
            Box::new(PageNumberPagination::from_style(&settings.style))
        }
    }
}

// -------------------------------------------------------------------------
// Limit / offset
// -------------------------------------------------------------------------

/// `?limit=&offset=` pagination.
#[derive(Debug, Clone)]
pub struct LimitOffsetPagination {
    pub default_limit: usize,
    pub max_limit: Option<usize>,
    pub limit_query_param: String,
    pub offset_query_param: String,
    limit: usize,
    offset: usize,
    count: usize,
    url: String,
    query: Vec<(String, String)>,
}

impl LimitOffsetPagination {
    pub fn new(default_limit: usize) -> Self {
        Self {
            default_limit,
            max_limit: None,
            limit_query_param: "limit".to_string(),
            offset_query_param: "offset".to_string(),
            limit: default_limit,
            offset: 0,
            count: 0,
            url: String::new(),
            query: Vec::new(),
        }
    }

    pub fn with_max_limit(mut self, max_limit: usize) -> Self {
        self.max_limit = Some(max_limit);
        self
    }

    fn from_style(style: &PagerStyle) -> Self {
        match style {
            PagerStyle::LimitOffset {
                default_limit,
                max_limit,
            } => Self {
                max_limit: *max_limit,
                ..Self::new(*default_limit)
            },
            PagerStyle::PageNumber { page_size, .. } => Self::new(*page_size),
        }
    }

    fn read_limit(&self, request: &RequestContext) -> usize {
        request
            .query_param(&self.limit_query_param)
            .and_then(|raw| positive_int(raw, true, self.max_limit))
            .unwrap_or(self.default_limit)
    }

    fn read_offset(&self, request: &RequestContext) -> usize {
        request
            .query_param(&self.offset_query_param)
            .and_then(|raw| positive_int(raw, false, None))
            .unwrap_or(0)
    }
}

impl Paginator for LimitOffsetPagination {
    fn paginate(&mut self, rows: &QuerySet, request: &RequestContext) -> Option<QuerySet> {
        self.limit = self.read_limit(request);
        if self.limit == 0 {
            return None;
        }
        self.offset = self.read_offset(request);
        self.count = rows.len();
        self.url = request.url.clone();
        self.query = request.query.clone();

        if self.count == 0 || self.offset > self.count {
            return Some(rows.slice(0, 0));
        }
        Some(rows.slice(self.offset, self.limit))
    }

    fn count(&self) -> usize {
        self.count
    }

    fn set_count(&mut self, count: usize) {
        self.count = count;
    }

    fn next_link(&self) -> Option<String> {
        let next_offset = self
            .offset
            .checked_add(self.limit)
            .filter(|next| *next < self.count)?;
        let url = replace_query_param(
            &self.url,
            &self.query,
            &self.limit_query_param,
            &self.limit.to_string(),
        );
        let (url, query) = split_url(&url);
        Some(replace_query_param(
            url,
            &query,
            &self.offset_query_param,
            &next_offset.to_string(),
        ))
    }

    fn previous_link(&self) -> Option<String> {
        if self.offset == 0 {
            return None;
        }
        let url = replace_query_param(
            &self.url,
            &self.query,
            &self.limit_query_param,
            &self.limit.to_string(),
        );
        let (url, query) = split_url(&url);
        if self.offset <= self.limit {
            return Some(remove_query_param(url, &query, &self.offset_query_param));
        }
        Some(replace_query_param(
            url,
            &query,
            &self.offset_query_param,
            &(self.offset - self.limit).to_string(),
        ))
    }
}

// -------------------------------------------------------------------------
// Page number
// -------------------------------------------------------------------------

/// `?page=` pagination.
#[derive(Debug, Clone)]
pub struct PageNumberPagination {
    pub page_size: usize,
    pub page_size_query_param: Option<String>,
    pub max_page_size: Option<usize>,
    pub page_query_param: String,
    size: usize,
    page: usize,
    count: usize,
    url: String,
    query: Vec<(String, String)>,
}

impl PageNumberPagination {
    pub fn new(page_size: usize) -> Self {
        Self {
            page_size,
            page_size_query_param: None,
            max_page_size: None,
            page_query_param: "page".to_string(),
            size: page_size,
            page: 1,
            count: 0,
            url: String::new(),
            query: Vec::new(),
        }
    }

    fn from_style(style: &PagerStyle) -> Self {
        match style {
            PagerStyle::PageNumber {
                page_size,
                page_size_query_param,
                max_page_size,
            } => Self {
                page_size_query_param: page_size_query_param.clone(),
                max_page_size: *max_page_size,
                ..Self::new(*page_size)
            },
            PagerStyle::LimitOffset { default_limit, .. } => Self::new(*default_limit),
        }
    }

    fn read_page_size(&self, request: &RequestContext) -> usize {
        self.page_size_query_param
            .as_deref()
            .and_then(|param| request.query_param(param))
            .and_then(|raw| positive_int(raw, true, self.max_page_size))
            .unwrap_or(self.page_size)
    }

    fn num_pages(&self) -> usize {
        if self.count == 0 || self.size == 0 {
            return 1;
        }
        self.count.div_ceil(self.size)
    }
}

impl Paginator for PageNumberPagination {
    fn paginate(&mut self, rows: &QuerySet, request: &RequestContext) -> Option<QuerySet> {
        self.size = self.read_page_size(request);
        if self.size == 0 {
            return None;
        }
        self.count = rows.len();
        self.url = request.url.clone();
        self.query = request.query.clone();

        let raw = request.query_param(&self.page_query_param);
        self.page = match raw {
            None => 1,
            Some("last") => self.num_pages(),
            Some(raw) => raw.parse::<usize>().ok().filter(|p| *p >= 1).unwrap_or_else(|| {
                warn!(page = %raw, "invalid page number, using first page");
                1
            }),
        };

        let offset = (self.page - 1).saturating_mul(self.size);
        Some(rows.slice(offset, self.size))
    }

    fn count(&self) -> usize {
        self.count
    }

    fn set_count(&mut self, count: usize) {
        self.count = count;
    }

    fn next_link(&self) -> Option<String> {
        if self.page >= self.num_pages() {
            return None;
        }
        Some(replace_query_param(
            &self.url,
            &self.query,
            &self.page_query_param,
            &(self.page + 1).to_string(),
        ))
    }

    fn previous_link(&self) -> Option<String> {
        if self.page <= 1 {
            return None;
        }
        if self.page == 2 {
            return Some(remove_query_param(
                &self.url,
                &self.query,
                &self.page_query_param,
            ));
        }
        Some(replace_query_param(
            &self.url,
            &self.query,
            &self.page_query_param,
            &(self.page - 1).to_string(),
        ))
    }
}

// -------------------------------------------------------------------------
// Aggregate coordinator
// -------------------------------------------------------------------------

/// Running counts across the sources of one request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PaginationState {
    /// Largest single-source count seen so far.
    pub max_count: usize,
    /// Sum of all source counts.
    pub total: usize,
}

impl PaginationState {
    fn record(&mut self, count: usize) {
        self.max_count = self.max_count.max(count);
        self.total += count;
    }
}

/// Wraps a paginator to describe a multi-source response.
///
/// Links are computed against the largest source, so `next` stays
/// available while any source has more rows.
#[derive(Debug, Clone)]
pub struct AggregatePagination<P> {
    inner: P,
    state: PaginationState,
}

impl<P: Paginator> AggregatePagination<P> {
    pub fn new(inner: P) -> Self {
        Self {
            inner,
            state: PaginationState::default(),
        }
    }

    pub fn state(&self) -> PaginationState {
        self.state
    }
}

impl<P: Paginator> Paginator for AggregatePagination<P> {
    fn paginate(&mut self, rows: &QuerySet, request: &RequestContext) -> Option<QuerySet> {
        let page = self.inner.paginate(rows, request)?;
        self.state.record(self.inner.count());
        Some(page)
    }

    fn count(&self) -> usize {
        self.inner.count()
    }

    fn set_count(&mut self, count: usize) {
        self.inner.set_count(count);
    }

    fn next_link(&self) -> Option<String> {
        self.inner.next_link()
    }

    fn previous_link(&self) -> Option<String> {
        self.inner.previous_link()
    }

    fn format_response(&mut self, data: Value, _view: &str) -> Result<Value, AggregateError> {
        self.inner.set_count(self.state.max_count);
        Ok(json!({
            "highest_count": self.state.max_count,
            "overall_total": self.state.total,
            "next": self.inner.next_link(),
            "previous": self.inner.previous_link(),
            "results": data,
        }))
    }
}

// -------------------------------------------------------------------------
// Helpers
// -------------------------------------------------------------------------

/// Parse a non-negative integer parameter, optionally capped.
///
/// With `strict`, zero is rejected too.
fn positive_int(raw: &str, strict: bool, cutoff: Option<usize>) -> Option<usize> {
    let value: usize = raw.trim().parse().ok()?;
    if strict && value == 0 {
        return None;
    }
    Some(cutoff.map_or(value, |cap| value.min(cap)))
}

fn split_url(url: &str) -> (&str, Vec<(String, String)>) {
    match url.split_once('?') {
        Some((base, query)) => (
            base,
            url::form_urlencoded::parse(query.as_bytes())
                .into_owned()
                .collect(),
        ),
        None => (url, Vec::new()),
    }
}

fn group_params(query: &[(String, String)]) -> BTreeMap<String, Vec<String>> {
    let mut grouped: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (key, value) in query {
        grouped.entry(key.clone()).or_default().push(value.clone());
    }
    grouped
}

fn encode(base: &str, params: &BTreeMap<String, Vec<String>>) -> String {
    let mut serializer = url::form_urlencoded::Serializer::new(String::new());
    for (key, values) in params {
        for value in values {
            serializer.append_pair(key, value);
        }
    }
    let query = serializer.finish();
    if query.is_empty() {
        base.to_string()
    } else {
        format!("{base}?{query}")
    }
}

/// Set `key` to a single value. Parameters are re-encoded in key order.
pub fn replace_query_param(
    base: &str,
    query: &[(String, String)],
    key: &str,
    value: &str,
) -> String {
    let mut params = group_params(query);
    params.insert(key.to_string(), vec![value.to_string()]);
    encode(base, &params)
}

/// Drop every value of `key`. Parameters are re-encoded in key order.
pub fn remove_query_param(base: &str, query: &[(String, String)], key: &str) -> String {
    let mut params = group_params(query);
    params.remove(key);
    encode(base, &params)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::store::Record;

    fn rows(kind: &str, n: usize) -> QuerySet {
        let rows = (0..n)
            .map(|i| {
                let mut record = Record::new();
                record.insert("n".to_string(), Value::from(i));
                record
            })
            .collect();
        QuerySet::new(kind, rows)
    }

    fn request() -> RequestContext {
        RequestContext::new("http://testserver/")
    }

    #[test]
    fn positive_int_rules() {
        assert_eq!(positive_int("5", true, None), Some(5));
        assert_eq!(positive_int("0", true, None), None);
        assert_eq!(positive_int("0", false, None), Some(0));
        assert_eq!(positive_int("-1", false, None), None);
        assert_eq!(positive_int("50", true, Some(20)), Some(20));
        assert_eq!(positive_int("abc", true, None), None);
    }

    #[test]
    fn replace_and_remove_sort_keys() {
        let query = vec![
            ("offset".to_string(), "2".to_string()),
            ("o".to_string(), "-title".to_string()),
        ];
        assert_eq!(
            replace_query_param("http://testserver/", &query, "limit", "2"),
            "http://testserver/?limit=2&o=-title&offset=2"
        );
        assert_eq!(
            remove_query_param("http://testserver/", &query, "offset"),
            "http://testserver/?o=-title"
        );
        assert_eq!(
            remove_query_param("http://testserver/", &[], "offset"),
            "http://testserver/"
        );
    }

    #[test]
    fn limit_offset_windows_and_links() {
        let mut pager = LimitOffsetPagination::new(2);
        let page = pager.paginate(&rows("Play", 4), &request()).unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(pager.count(), 4);
        assert_eq!(
            pager.next_link().as_deref(),
            Some("http://testserver/?limit=2&offset=2")
        );
        assert!(pager.previous_link().is_none());

        let second = request().with_query("offset", "2");
        let page = pager.paginate(&rows("Play", 4), &second).unwrap();
        assert_eq!(page.rows()[0]["n"], 2);
        assert!(pager.next_link().is_none());
        assert_eq!(
            pager.previous_link().as_deref(),
            Some("http://testserver/?limit=2")
        );
    }

    #[test]
    fn limit_offset_invalid_params_fall_back() {
        let mut pager = LimitOffsetPagination::new(3).with_max_limit(5);
        let req = request().with_query("limit", "0").with_query("offset", "x");
        assert_eq!(pager.paginate(&rows("Play", 10), &req).unwrap().len(), 3);

        let capped = request().with_query("limit", "100");
        assert_eq!(pager.paginate(&rows("Play", 10), &capped).unwrap().len(), 5);
    }

    #[test]
    fn limit_offset_past_end_is_empty() {
        let mut pager = LimitOffsetPagination::new(2);
        let req = request().with_query("offset", "9");
        assert!(pager.paginate(&rows("Play", 4), &req).unwrap().is_empty());
        assert!(pager.paginate(&rows("Play", 0), &request()).unwrap().is_empty());
    }

    #[test]
    fn limit_offset_huge_offset_has_no_next_link() {
        let mut pager = LimitOffsetPagination::new(2);
        let req = request().with_query("offset", "18446744073709551615");
        assert!(pager.paginate(&rows("Play", 4), &req).unwrap().is_empty());
        assert_eq!(pager.next_link(), None);
        assert_eq!(
            pager.previous_link().as_deref(),
            Some("http://testserver/?limit=2&offset=18446744073709551613")
        );
    }

    #[test]
    fn page_number_windows_and_links() {
        let mut pager = PageNumberPagination::new(2);
        let req = request().with_query("page", "2");
        let page = pager.paginate(&rows("Play", 5), &req).unwrap();
        assert_eq!(page.rows()[0]["n"], 2);
        assert_eq!(
            pager.next_link().as_deref(),
            Some("http://testserver/?page=3")
        );
        assert_eq!(pager.previous_link().as_deref(), Some("http://testserver/"));

        let last = request().with_query("page", "last");
        assert_eq!(pager.paginate(&rows("Play", 5), &last).unwrap().len(), 1);
        assert!(pager.next_link().is_none());
    }

    #[test]
    fn page_number_out_of_range_is_empty() {
        let mut pager = PageNumberPagination::new(2);
        let req = request().with_query("page", "7");
        assert!(pager.paginate(&rows("Play", 3), &req).unwrap().is_empty());
    }

    #[test]
    fn page_number_size_parameter() {
        let mut pager = PageNumberPagination::from_style(&PagerStyle::PageNumber {
            page_size: 2,
            page_size_query_param: Some("page_size".to_string()),
            max_page_size: Some(3),
        });
        let req = request().with_query("page_size", "10");
        assert_eq!(pager.paginate(&rows("Play", 10), &req).unwrap().len(), 3);
    }

    #[test]
    fn plain_paginator_cannot_format_envelope() {
        let mut pager = LimitOffsetPagination::new(2);
        let err = pager.format_response(Value::Null, "PlayView").unwrap_err();
        assert!(matches!(err, AggregateError::Configuration { .. }));
    }

    #[test]
    fn aggregate_tracks_max_and_total() {
        let mut pager = AggregatePagination::new(LimitOffsetPagination::new(2));
        pager.paginate(&rows("Play", 4), &request()).unwrap();
        pager.paginate(&rows("Poem", 3), &request()).unwrap();
        assert_eq!(
            pager.state(),
            PaginationState {
                max_count: 4,
                total: 7
            }
        );

        let envelope = pager.format_response(json!([]), "View").unwrap();
        let keys: Vec<&String> = envelope.as_object().unwrap().keys().collect();
        assert_eq!(
            keys,
            ["highest_count", "overall_total", "next", "previous", "results"]
        );
        assert_eq!(envelope["highest_count"], 4);
        assert_eq!(envelope["overall_total"], 7);
        assert_eq!(envelope["next"], "http://testserver/?limit=2&offset=2");
        assert_eq!(envelope["previous"], Value::Null);
    }

    #[test]
    fn aggregate_next_follows_largest_source() {
        let mut pager = AggregatePagination::new(LimitOffsetPagination::new(2));
        let req = request().with_query("offset", "2");
        pager.paginate(&rows("Play", 6), &req).unwrap();
        pager.paginate(&rows("Poem", 1), &req).unwrap();

        let envelope = pager.format_response(json!([]), "View").unwrap();
        assert_eq!(envelope["next"], "http://testserver/?limit=2&offset=4");
        assert_eq!(envelope["previous"], "http://testserver/?limit=2");
    }

    #[test]
    fn paginator_from_settings_respects_aggregate_flag() {
        let mut plain = paginator_from_settings(&PaginationSettings {
            style: PagerStyle::LimitOffset {
                default_limit: 2,
                max_limit: None,
            },
            aggregate: false,
        });
        assert!(plain.format_response(json!([]), "View").is_err());

        let mut wrapped = paginator_from_settings(&PaginationSettings::new(PagerStyle::PageNumber {
            page_size: 2,
            page_size_query_param: None,
            max_page_size: None,
        }));
        assert!(wrapped.format_response(json!([]), "View").is_ok());
    }
}
