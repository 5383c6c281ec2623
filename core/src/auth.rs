//! Connection session: base URL, default headers and authentication.
//!
//! # Design
//! Basic and static-token auth are resolved once at construction and only
//! contribute an `Authorization` header. Login-exchange is a two-state
//! machine: the session starts in `NotAuthenticated` and
//! `ensure_authenticated` performs the single login round-trip, after which it
//! behaves exactly like static-token auth. Repeated calls are no-ops.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use tracing::{debug, info};

use crate::config::AuthConfig;
use crate::error::QueryError;
use crate::http::{merge_headers, HttpMethod, HttpRequest, HttpResponse, Transport};
use crate::urls;

/// Progress of a login-exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginState {
    NotAuthenticated,
    Authenticated(String),
}

#[derive(Debug, Clone)]
enum Credentials {
    None,
    Basic(String),
    Token(String),
    Login {
        login_url: String,
        username: String,
        password: String,
        state: LoginState,
    },
}

/// Per-client connection state.
#[derive(Debug, Clone)]
pub struct Session {
    base_url: String,
    headers: Vec<(String, String)>,
    credentials: Credentials,
}

impl Session {
    pub fn new(
        base_url: &str,
        headers: Vec<(String, String)>,
        auth: &AuthConfig,
    ) -> Result<Self, QueryError> {
        let base_url = base_url.trim_end_matches('/');
        if !urls::is_absolute(base_url) {
            return Err(QueryError::Config(format!(
                "base_url must be an absolute URL: {base_url:?}"
            )));
        }

        let credentials = match auth {
            AuthConfig::None => Credentials::None,
            AuthConfig::Basic { username, password } => {
                debug!("configuring basic auth");
                Credentials::Basic(basic_value(username, password))
            }
            AuthConfig::Token { token } => {
                debug!("configuring token auth");
                Credentials::Token(token.clone())
            }
            AuthConfig::Login {
                login_url,
                username,
                password,
            } => {
                let (Some(username), Some(password)) = (username, password) else {
                    return Err(QueryError::MissingCredentials);
                };
                if username.is_empty() || password.is_empty() {
                    return Err(QueryError::MissingCredentials);
                }
                let login_url = login_url
                    .as_deref()
                    .filter(|url| !url.is_empty())
                    .ok_or_else(|| {
                        QueryError::Config(
                            "login_url is required for login authentication".to_string(),
                        )
                    })?;
                debug!("configuring login auth, exchange deferred to first request");
                Credentials::Login {
                    login_url: login_url.to_string(),
                    username: username.clone(),
                    password: password.clone(),
                    state: LoginState::NotAuthenticated,
                }
            }
        };

        Ok(Self {
            base_url: base_url.to_string(),
            headers,
            credentials,
        })
    }

    /// Base URL with any trailing `/` removed.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Current login-exchange state, or `None` for other auth methods.
    pub fn login_state(&self) -> Option<&LoginState> {
        match &self.credentials {
            Credentials::Login { state, .. } => Some(state),
            _ => None,
        }
    }

    /// Default headers plus the `Authorization` header for the active
    /// credentials.
    pub fn headers(&self) -> Vec<(String, String)> {
        let mut headers = self.headers.clone();
        let authorization = match &self.credentials {
            Credentials::None => None,
            Credentials::Basic(value) => Some(value.clone()),
            Credentials::Token(token) => Some(bearer_value(token)),
            Credentials::Login { state, .. } => match state {
                LoginState::NotAuthenticated => None,
                LoginState::Authenticated(token) => Some(bearer_value(token)),
            },
        };
        if let Some(value) = authorization {
            merge_headers(&mut headers, &[("Authorization".to_string(), value)]);
        }
        headers
    }

    /// The login request, if a login-exchange is still pending.
    pub fn build_login(&self) -> Option<HttpRequest> {
        let Credentials::Login {
            login_url,
            username,
            password,
            state: LoginState::NotAuthenticated,
        } = &self.credentials
        else {
            return None;
        };

        let mut headers = self.headers.clone();
        merge_headers(
            &mut headers,
            &[("Authorization".to_string(), basic_value(username, password))],
        );
        Some(HttpRequest {
            method: HttpMethod::Get,
            url: login_url.clone(),
            headers,
            body: None,
        })
    }

    /// Record the login response; the body text becomes the bearer token.
    pub fn parse_login(&mut self, response: HttpResponse) -> Result<(), QueryError> {
        if !response.is_success() {
            return Err(QueryError::Http {
                status: response.status,
                body: response.body,
            });
        }
        let token = response.body.trim().to_string();
        if token.is_empty() {
            return Err(QueryError::Deserialization(
                "login response did not contain a token".to_string(),
            ));
        }
        if let Credentials::Login { state, .. } = &mut self.credentials {
            *state = LoginState::Authenticated(token);
        }
        Ok(())
    }

    /// Perform the pending login-exchange, if any.
    pub fn ensure_authenticated<T: Transport>(
        &mut self,
        transport: &mut T,
    ) -> Result<(), QueryError> {
        let Some(request) = self.build_login() else {
            return Ok(());
        };
        debug!(url = %request.url, "performing login exchange");
        let response = transport.execute(&request)?;
        self.parse_login(response)?;
        info!("login authentication successful");
        Ok(())
    }
}

fn basic_value(username: &str, password: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{username}:{password}")))
}

fn bearer_value(token: &str) -> String {
    format!("Bearer {token}")
}

#[cfg(test)]
mod tests {
    use super::*;

    struct LoginServer {
        calls: usize,
        status: u16,
    }

    impl Transport for LoginServer {
        fn execute(&mut self, request: &HttpRequest) -> Result<HttpResponse, QueryError> {
            self.calls += 1;
            assert_eq!(request.url, "https://h/auth/login");
            assert_eq!(request.header("authorization"), Some("Basic YWxpY2U6c2VjcmV0"));
            Ok(HttpResponse {
                status: self.status,
                headers: Vec::new(),
                body: "tok-123\n".to_string(),
            })
        }
    }

    fn login(
        login_url: Option<&str>,
        username: Option<&str>,
        password: Option<&str>,
    ) -> AuthConfig {
        AuthConfig::Login {
            login_url: login_url.map(str::to_string),
            username: username.map(str::to_string),
            password: password.map(str::to_string),
        }
    }

    #[test]
    fn no_auth_adds_no_header() {
        let session = Session::new("https://h/fhir/", Vec::new(), &AuthConfig::None).unwrap();
        assert_eq!(session.base_url(), "https://h/fhir");
        assert!(session.headers().is_empty());
        assert!(session.login_state().is_none());
    }

    #[test]
    fn basic_auth_encodes_credentials() {
        let auth = AuthConfig::Basic {
            username: "alice".to_string(),
            password: "secret".to_string(),
        };
        let session = Session::new("https://h/fhir", Vec::new(), &auth).unwrap();
        assert_eq!(
            session.headers(),
            vec![("Authorization".to_string(), "Basic YWxpY2U6c2VjcmV0".to_string())]
        );
    }

    #[test]
    fn token_auth_overrides_default_authorization() {
        let headers = vec![
            ("authorization".to_string(), "stale".to_string()),
            ("X-Tenant".to_string(), "north".to_string()),
        ];
        let auth = AuthConfig::Token {
            token: "abc".to_string(),
        };
        let session = Session::new("https://h/fhir", headers, &auth).unwrap();
        assert_eq!(
            session.headers(),
            vec![
                ("X-Tenant".to_string(), "north".to_string()),
                ("Authorization".to_string(), "Bearer abc".to_string()),
            ]
        );
    }

    #[test]
    fn relative_base_url_is_a_config_error() {
        let err = Session::new("fhir", Vec::new(), &AuthConfig::None).unwrap_err();
        assert!(matches!(err, QueryError::Config(_)));

        let err = Session::new("localhost:8080/fhir", Vec::new(), &AuthConfig::None).unwrap_err();
        assert!(matches!(err, QueryError::Config(_)));
    }

    #[test]
    fn login_without_credentials_fails() {
        let auth = login(Some("https://h/auth/login"), Some("alice"), None);
        let err = Session::new("https://h/fhir", Vec::new(), &auth).unwrap_err();
        assert!(matches!(err, QueryError::MissingCredentials));

        let auth = login(Some("https://h/auth/login"), None, Some("secret"));
        let err = Session::new("https://h/fhir", Vec::new(), &auth).unwrap_err();
        assert!(matches!(err, QueryError::MissingCredentials));
    }

    #[test]
    fn login_without_url_is_a_config_error() {
        let auth = login(None, Some("alice"), Some("secret"));
        let err = Session::new("https://h/fhir", Vec::new(), &auth).unwrap_err();
        assert!(matches!(err, QueryError::Config(_)));
    }

    #[test]
    fn login_exchange_runs_once() {
        let auth = login(Some("https://h/auth/login"), Some("alice"), Some("secret"));
        let mut session = Session::new("https://h/fhir", Vec::new(), &auth).unwrap();
        assert_eq!(session.login_state(), Some(&LoginState::NotAuthenticated));
        assert!(session.headers().is_empty());

        let mut server = LoginServer { calls: 0, status: 200 };
        session.ensure_authenticated(&mut server).unwrap();
        session.ensure_authenticated(&mut server).unwrap();

        assert_eq!(server.calls, 1);
        assert_eq!(
            session.login_state(),
            Some(&LoginState::Authenticated("tok-123".to_string()))
        );
        assert_eq!(
            session.headers(),
            vec![("Authorization".to_string(), "Bearer tok-123".to_string())]
        );
        assert!(session.build_login().is_none());
    }

    #[test]
    fn failed_login_stays_unauthenticated() {
        let auth = login(Some("https://h/auth/login"), Some("alice"), Some("secret"));
        let mut session = Session::new("https://h/fhir", Vec::new(), &auth).unwrap();

        let mut server = LoginServer { calls: 0, status: 401 };
        let err = session.ensure_authenticated(&mut server).unwrap_err();
        assert_eq!(err.status(), Some(401));
        assert_eq!(session.login_state(), Some(&LoginState::NotAuthenticated));
    }

    #[test]
    fn non_login_auth_never_calls_transport() {
        let mut session = Session::new("https://h/fhir", Vec::new(), &AuthConfig::None).unwrap();
        let mut server = LoginServer { calls: 0, status: 200 };
        session.ensure_authenticated(&mut server).unwrap();
        assert_eq!(server.calls, 0);
    }
}
