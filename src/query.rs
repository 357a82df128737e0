//! Query descriptors and CDX request URL assembly
//!
//! A [`QueryDescriptor`] describes one search against an index server. It is
//! built once per input pattern and reused unchanged for every page of that
//! query, on every configured archive source.

use url::Url;

/// One CDX search request
///
/// # Example
///
/// ```
/// use cdx_harvest::query::QueryDescriptor;
/// use url::Url;
///
/// let query = QueryDescriptor::new("example.com/*")
///     .with_filters(vec!["statuscode:200".to_string()])
///     .with_limit(100);
///
/// let endpoint = Url::parse("https://web.archive.org/cdx/search/cdx").unwrap();
/// let url = query.request_url(&endpoint, 2);
/// assert!(url.as_str().contains("limit=100"));
/// assert!(url.as_str().ends_with("page=2"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryDescriptor {
    /// URL pattern to search for, may include wildcards (`*.example.com`, `example.com/*`)
    pub pattern: String,

    /// Filter expressions in `key:value` form, sent as repeated `filter` parameters
    pub filters: Vec<String>,

    /// Maximum number of results, 0 means unbounded
    pub limit: u32,

    /// Column the index server should collapse duplicate results on
    pub collapse: Option<String>,

    /// Lower capture date bound (CDX timestamp prefix)
    pub from: Option<String>,

    /// Upper capture date bound (CDX timestamp prefix)
    pub to: Option<String>,

    /// Fetch only the first page and skip page count discovery
    pub single_page: bool,
}

impl QueryDescriptor {
    /// Creates an unbounded, unfiltered query for a pattern
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            ..Self::default()
        }
    }

    pub fn with_filters(mut self, filters: Vec<String>) -> Self {
        self.filters = filters;
        self
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_collapse(mut self, column: impl Into<String>) -> Self {
        self.collapse = Some(column.into());
        self
    }

    pub fn with_date_range(mut self, from: Option<String>, to: Option<String>) -> Self {
        self.from = from;
        self.to = to;
        self
    }

    /// Restricts the query to the first result page
    pub fn single_page(mut self) -> Self {
        self.single_page = true;
        self
    }

    /// Returns true once `fetched` records satisfy a non-zero limit
    pub fn limit_reached(&self, fetched: usize) -> bool {
        self.limit != 0 && fetched >= self.limit as usize
    }

    /// Builds the request URL for one result page against an index endpoint
    ///
    /// Parameters with zero or empty values are omitted entirely: an absent
    /// `limit` is what tells the server "no limit". The page parameter is
    /// left out in single-page mode.
    pub fn request_url(&self, endpoint: &Url, page: u32) -> Url {
        let mut url = endpoint.clone();
        {
            let mut params = url.query_pairs_mut();
            params
                .append_pair("url", &self.pattern)
                .append_pair("output", "json");

            if self.limit != 0 {
                params.append_pair("limit", &self.limit.to_string());
            }

            if let Some(column) = self.collapse.as_deref().filter(|c| !c.is_empty()) {
                params.append_pair("collapse", column);
            }

            for filter in self.filters.iter().filter(|f| !f.is_empty()) {
                params.append_pair("filter", filter);
            }

            if let Some(from) = self.from.as_deref().filter(|d| !d.is_empty()) {
                params.append_pair("from", from);
            }

            if let Some(to) = self.to.as_deref().filter(|d| !d.is_empty()) {
                params.append_pair("to", to);
            }

            if !self.single_page {
                params.append_pair("page", &page.to_string());
            }
        }
        url
    }

    /// Builds the page count discovery URL for a pattern
    pub fn num_pages_url(endpoint: &Url, pattern: &str) -> Url {
        let mut url = endpoint.clone();
        url.query_pairs_mut()
            .append_pair("url", pattern)
            .append_pair("showNumPages", "true");
        url
    }
}
