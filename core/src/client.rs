//! FHIR search client: request shaping and pagination.
//!
//! # Design
//! Every step of a query is split into a `build_*` method that produces an
//! `HttpRequest` and a `parse_*` method that consumes an `HttpResponse`.
//! `query` strings them together over the client's `Transport`: search, wrap
//! the page in a `Bundle`, then follow `next` links until the page budget is
//! spent or the server stops linking. Callers that want to own the I/O can
//! use the `build_*` / `parse_*` pairs directly.

use tracing::debug;

use crate::auth::Session;
use crate::bundle::Bundle;
use crate::config::ClientConfig;
use crate::error::QueryError;
use crate::http::{
    merge_headers, HttpMethod, HttpRequest, HttpResponse, Transport, UreqTransport,
};
use crate::query::{Query, QueryOptions};
use crate::urls;

const FHIR_JSON: &str = "application/fhir+json";

/// Blocking client for FHIR search.
///
/// Owns its session (base URL, headers, auth state) and its transport. Not
/// meant to be shared between threads without external locking.
#[derive(Debug)]
pub struct FhirQueryClient<T = UreqTransport> {
    session: Session,
    transport: T,
    use_post: bool,
}

impl FhirQueryClient<UreqTransport> {
    /// Build a client that talks HTTP through `ureq`.
    pub fn new(config: ClientConfig) -> Result<Self, QueryError> {
        let mut transport = UreqTransport::with_timeout(config.timeout());
        if let Some(limit) = config.max_body_bytes {
            transport = transport.with_body_limit(limit);
        }
        Self::with_transport(config, transport)
    }
}

impl<T: Transport> FhirQueryClient<T> {
    pub fn with_transport(config: ClientConfig, transport: T) -> Result<Self, QueryError> {
        let session = Session::new(&config.base_url, config.headers, &config.auth)?;
        Ok(Self {
            session,
            transport,
            use_post: config.use_post,
        })
    }

    pub fn base_url(&self) -> &str {
        self.session.base_url()
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Run the login-exchange if it is configured and still pending.
    pub fn ensure_authenticated(&mut self) -> Result<(), QueryError> {
        self.session.ensure_authenticated(&mut self.transport)
    }

    /// Run one logical search and return every page fetched.
    ///
    /// `Query::FullUrl` is fetched once with GET and never paginated. Other
    /// queries fetch up to `options.max_pages` pages by following `next`
    /// links; a non-2xx response on any page aborts the whole call.
    pub fn query(
        &mut self,
        resource_type: &str,
        query: &Query,
        options: &QueryOptions,
    ) -> Result<Bundle, QueryError> {
        debug!(
            resource_type,
            ?query,
            use_post = options.use_post,
            max_pages = options.max_pages,
            "querying"
        );
        self.ensure_authenticated()?;

        let request = self.build_search(resource_type, query, options)?;
        let mut bundle = self.fetch(&request)?;
        if matches!(query, Query::FullUrl(_)) {
            return Ok(bundle);
        }

        let mut remaining = options.max_pages.saturating_sub(1);
        while remaining > 0 {
            let Some(link) = bundle.next_link() else {
                break;
            };
            let request = self.build_page(link, options);
            let page = self.fetch(&request)?;
            bundle.merge(page);
            remaining -= 1;
        }

        debug!(
            resource_type,
            entries = bundle.len(),
            pages = bundle.page_count(),
            "query complete"
        );
        Ok(bundle)
    }

    /// The first request of a search.
    ///
    /// GET `{base}/{type}[?query]` by default, or POST `{base}/{type}/_search`
    /// with the query string as a JSON body when POST mode is on for the
    /// client or the call.
    pub fn build_search(
        &self,
        resource_type: &str,
        query: &Query,
        options: &QueryOptions,
    ) -> Result<HttpRequest, QueryError> {
        if let Query::FullUrl(url) = query {
            return Ok(HttpRequest {
                method: HttpMethod::Get,
                url: url.clone(),
                headers: self.request_headers(&options.headers, false),
                body: None,
            });
        }

        let search = query.query_string();
        if options.use_post || self.use_post {
            let body = serde_json::to_string(&search)
                .map_err(|e| QueryError::Serialization(e.to_string()))?;
            return Ok(HttpRequest {
                method: HttpMethod::Post,
                url: urls::resolve(self.base_url(), &format!("{resource_type}/_search")),
                headers: self.request_headers(&options.headers, true),
                body: Some(body),
            });
        }

        let mut url = urls::resolve(self.base_url(), resource_type);
        if let Some(search) = search {
            url.push('?');
            url.push_str(&search);
        }
        Ok(HttpRequest {
            method: HttpMethod::Get,
            url,
            headers: self.request_headers(&options.headers, false),
            body: None,
        })
    }

    /// GET for a pagination link, resolved against the base URL if relative.
    pub fn build_page(&self, link: &str, options: &QueryOptions) -> HttpRequest {
        HttpRequest {
            method: HttpMethod::Get,
            url: urls::resolve(self.base_url(), link),
            headers: self.request_headers(&options.headers, false),
            body: None,
        }
    }

    /// Check the status and wrap the body as a search page.
    pub fn parse_page(&self, response: HttpResponse) -> Result<Bundle, QueryError> {
        check_status(&response)?;
        Bundle::from_json(&response.body)
    }

    fn fetch(&mut self, request: &HttpRequest) -> Result<Bundle, QueryError> {
        debug!(method = request.method.as_str(), url = %request.url, "sending request");
        if let Some(body) = &request.body {
            debug!(%body, "with body");
        }
        let response = self.transport.execute(request)?;
        debug!(status = response.status, "received response");
        self.parse_page(response)
    }

    fn request_headers(
        &self,
        extra: &[(String, String)],
        json_body: bool,
    ) -> Vec<(String, String)> {
        let mut headers = vec![("Accept".to_string(), FHIR_JSON.to_string())];
        merge_headers(&mut headers, &self.session.headers());
        if json_body {
            merge_headers(
                &mut headers,
                &[("Content-Type".to_string(), "application/json".to_string())],
            );
        }
        if !extra.is_empty() {
            debug!(headers = ?extra, "with custom headers");
            merge_headers(&mut headers, extra);
        }
        headers
    }
}

/// Map non-2xx status codes to `QueryError::Http`.
fn check_status(response: &HttpResponse) -> Result<(), QueryError> {
    if response.is_success() {
        return Ok(());
    }
    Err(QueryError::Http {
        status: response.status,
        body: response.body.clone(),
    })
}
