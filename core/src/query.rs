//! What a search asks for, and how a single call is shaped.

use url::form_urlencoded;

use crate::error::QueryError;

/// The search criteria of one `query` call.
///
/// Parameters, a raw search string and a full URL are mutually exclusive;
/// each gets its own variant.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Query {
    /// Every resource of the type, no criteria.
    #[default]
    All,
    /// Key-value pairs, form-encoded in insertion order.
    Params(Vec<(String, String)>),
    /// A pre-built query string such as `name=smith&_count=10`, sent as is.
    SearchString(String),
    /// A complete URL fetched verbatim with a single GET.
    FullUrl(String),
}

impl Query {
    pub fn params<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Query::Params(pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }

    /// Pick the variant from three optional inputs, rejecting more than one.
    pub fn from_parts(
        params: Option<Vec<(String, String)>>,
        search_string: Option<String>,
        full_url: Option<String>,
    ) -> Result<Self, QueryError> {
        match (params, search_string, full_url) {
            (None, None, None) => Ok(Query::All),
            (Some(params), None, None) => Ok(Query::Params(params)),
            (None, Some(search), None) => Ok(Query::SearchString(search)),
            (None, None, Some(url)) => Ok(Query::FullUrl(url)),
            _ => Err(QueryError::ConflictingQuery),
        }
    }

    /// The query string for a search, or `None` when there is nothing to send.
    ///
    /// `FullUrl` carries its own query and yields `None`.
    pub fn query_string(&self) -> Option<String> {
        match self {
            Query::Params(params) if !params.is_empty() => {
                let mut serializer = form_urlencoded::Serializer::new(String::new());
                for (key, value) in params {
                    serializer.append_pair(key, value);
                }
                Some(serializer.finish())
            }
            Query::SearchString(search) => {
                let search = search.trim_start_matches('?');
                (!search.is_empty()).then(|| search.to_string())
            }
            _ => None,
        }
    }
}

/// Per-call knobs for `FhirQueryClient::query`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryOptions {
    /// Force `POST {type}/_search` for this call.
    pub use_post: bool,
    /// Upper bound on pages fetched, the first page included.
    pub max_pages: u32,
    /// Extra headers for this call; they win over the client's defaults.
    pub headers: Vec<(String, String)>,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            use_post: false,
            max_pages: 1,
            headers: Vec::new(),
        }
    }
}

impl QueryOptions {
    pub fn pages(max_pages: u32) -> Self {
        Self {
            max_pages,
            ..Self::default()
        }
    }

    pub fn post(mut self) -> Self {
        self.use_post = true;
        self
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }
}
