// OAuth 2.1 surface for `http` upstream sessions (spec.md §6).
//
// The browser-callback HTTP server and the actual token-storage backend are
// external collaborators (spec.md §1); this module only defines the
// `TokenStore` contract the core consumes and the provider metadata an
// authorization request is built from.

use std::sync::Arc;

use crate::config::OAuthConfig;
use crate::error::{McpManError, Result};

/// Tokens issued by an OAuth authorization server.
#[derive(Debug, Clone)]
pub struct OAuthTokens {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at_unix: Option<u64>,
}

/// The dynamically registered client identity for a given server.
#[derive(Debug, Clone)]
pub struct ClientInformation {
    pub client_id: String,
    pub client_secret: Option<String>,
}

/// Everything persisted across a server's authorization lifecycle, keyed
/// by server name in the external store.
#[derive(Debug, Clone, Default)]
pub struct OAuthRecord {
    pub tokens: Option<OAuthTokens>,
    pub client_information: Option<ClientInformation>,
    pub code_verifier: Option<String>,
}

/// External collaborator: reads and writes [`OAuthRecord`]s keyed by
/// server name. MCPMan ships no concrete implementation — callers supply
/// one (file-backed, keychain-backed, etc.) when constructing a fleet.
pub trait TokenStore: Send + Sync {
    fn load(&self, server_name: &str) -> Option<OAuthRecord>;
    fn save(&self, server_name: &str, record: OAuthRecord);
}

/// An in-memory `TokenStore`, useful for tests and as a default when no
/// external store is configured (tokens do not survive past the process).
#[derive(Default)]
pub struct InMemoryTokenStore {
    records: std::sync::Mutex<std::collections::HashMap<String, OAuthRecord>>,
}

impl TokenStore for InMemoryTokenStore {
    fn load(&self, server_name: &str) -> Option<OAuthRecord> {
        self.records.lock().unwrap().get(server_name).cloned()
    }

    fn save(&self, server_name: &str, record: OAuthRecord) {
        self.records
            .lock()
            .unwrap()
            .insert(server_name.to_string(), record);
    }
}

/// Static metadata a dynamic client-registration / authorization request
/// is built from, per spec.md §6.
pub struct AuthorizationMetadata {
    pub client_name: String,
    pub redirect_uris: Vec<String>,
    pub grant_types: Vec<&'static str>,
    pub response_type: &'static str,
    pub token_endpoint_auth_method: &'static str,
    pub scope: String,
}

/// Drives the OAuth 2.1 handshake for one `http` upstream session. The
/// redirect side channel (spec.md §9) is an injected callback so it never
/// blocks the JSON-RPC request path.
pub struct OAuthProvider {
    server_name: String,
    config: OAuthConfig,
    store: Arc<dyn TokenStore>,
    on_redirect: Arc<dyn Fn(&str, &str) + Send + Sync>,
    http: reqwest::Client,
}

impl OAuthProvider {
    pub fn new(
        server_name: impl Into<String>,
        config: OAuthConfig,
        store: Arc<dyn TokenStore>,
        on_redirect: Arc<dyn Fn(&str, &str) + Send + Sync>,
    ) -> Self {
        Self {
            server_name: server_name.into(),
            config,
            store,
            on_redirect,
            http: reqwest::Client::new(),
        }
    }

    pub fn metadata(&self) -> AuthorizationMetadata {
        AuthorizationMetadata {
            client_name: self.config.client_name.clone(),
            redirect_uris: vec![self.config.redirect_url.clone()],
            grant_types: vec!["authorization_code", "refresh_token"],
            response_type: "code",
            token_endpoint_auth_method: "client_secret_post",
            scope: self.config.scopes.join(" "),
        }
    }

    /// The current bearer token, if this server has already completed an
    /// authorization flow. `None` means the caller must initiate one.
    pub fn bearer_token(&self) -> Option<String> {
        self.store
            .load(&self.server_name)
            .and_then(|r| r.tokens)
            .map(|t| t.access_token)
    }

    /// Mint a fresh CSRF `state` and invoke the redirect callback with the
    /// authorization URL the operator must open. Returns the state so the
    /// caller can validate the eventual callback.
    pub fn begin_authorization(&self, authorization_endpoint: &str) -> String {
        let state = uuid::Uuid::new_v4().to_string();
        let meta = self.metadata();
        let client_id = self
            .store
            .load(&self.server_name)
            .and_then(|r| r.client_information)
            .map(|c| c.client_id)
            .or_else(|| self.config.client_id.clone())
            .unwrap_or_default();
        let url = format!(
            "{authorization_endpoint}?response_type={}&client_id={client_id}&redirect_uri={}&scope={}&state={state}",
            meta.response_type,
            urlencode(&meta.redirect_uris[0]),
            urlencode(&meta.scope),
        );
        (self.on_redirect)(&self.server_name, &url);
        state
    }

    /// Exchange an authorization code for tokens and persist them.
    pub async fn exchange_code(&self, token_endpoint: &str, code: &str) -> Result<()> {
        let client_secret = self.config.client_secret.clone().unwrap_or_default();
        let client_id = self.config.client_id.clone().unwrap_or_default();
        let response = self
            .http
            .post(token_endpoint)
            .form(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", self.config.redirect_url.as_str()),
                ("client_id", client_id.as_str()),
                ("client_secret", client_secret.as_str()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(McpManError::Unauthorized(
                self.server_name.clone(),
                format!("token exchange failed with status {}", response.status()),
            ));
        }

        let body: serde_json::Value = response.json().await?;
        let tokens = OAuthTokens {
            access_token: body
                .get("access_token")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
            refresh_token: body
                .get("refresh_token")
                .and_then(|v| v.as_str())
                .map(String::from),
            expires_at_unix: None,
        };
        self.store.save(
            &self.server_name,
            OAuthRecord {
                tokens: Some(tokens),
                client_information: Some(ClientInformation {
                    client_id,
                    client_secret: Some(client_secret),
                }),
                code_verifier: None,
            },
        );
        Ok(())
    }
}

fn urlencode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(b as char)
            }
            _ => out.push_str(&format!("%{b:02X}")),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_memory_store_round_trips() {
        let store = InMemoryTokenStore::default();
        assert!(store.load("srv").is_none());
        store.save(
            "srv",
            OAuthRecord {
                tokens: Some(OAuthTokens {
                    access_token: "tok".into(),
                    refresh_token: None,
                    expires_at_unix: None,
                }),
                client_information: None,
                code_verifier: None,
            },
        );
        assert_eq!(
            store.load("srv").unwrap().tokens.unwrap().access_token,
            "tok"
        );
    }

    #[test]
    fn metadata_joins_scopes_with_space() {
        let store: Arc<dyn TokenStore> = Arc::new(InMemoryTokenStore::default());
        let provider = OAuthProvider::new(
            "srv",
            OAuthConfig {
                client_name: "mcpman".into(),
                redirect_url: "http://localhost/callback".into(),
                scopes: vec!["a".into(), "b".into()],
                client_id: None,
                client_secret: None,
            },
            store,
            Arc::new(|_, _| {}),
        );
        assert_eq!(provider.metadata().scope, "a b");
    }

    #[test]
    fn begin_authorization_invokes_redirect_callback() {
        let store: Arc<dyn TokenStore> = Arc::new(InMemoryTokenStore::default());
        let seen = Arc::new(std::sync::Mutex::new(None));
        let seen2 = seen.clone();
        let provider = OAuthProvider::new(
            "srv",
            OAuthConfig {
                client_name: "mcpman".into(),
                redirect_url: "http://localhost/callback".into(),
                scopes: vec!["read".into()],
                client_id: Some("abc".into()),
                client_secret: None,
            },
            store,
            Arc::new(move |_name, url| *seen2.lock().unwrap() = Some(url.to_string())),
        );
        let state = provider.begin_authorization("https://example.com/authorize");
        let url = seen.lock().unwrap().clone().unwrap();
        assert!(url.contains("https://example.com/authorize"));
        assert!(url.contains(&state));
        assert!(url.contains("client_id=abc"));
    }
}
