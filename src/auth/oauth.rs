use oauth2::basic::{BasicClient, BasicErrorResponse, BasicTokenResponse};
use oauth2::reqwest::http_client;
use oauth2::{
    AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, PkceCodeChallenge,
    RedirectUrl, RefreshToken, RequestTokenError, Scope, TokenResponse, TokenUrl,
};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tiny_http::{Response, Server};
use url::Url;

use crate::auth::credential::{Credential, expiry_from};
use crate::config::Config;
use crate::error::{Error, Result};

pub const GOOGLE_AUTH_URI: &str = "https://accounts.google.com/o/oauth2/auth";
pub const GOOGLE_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// The two ways of obtaining a fresh credential. Implemented against
/// Google by [`GoogleOAuth`]; tests substitute their own.
pub trait OAuthFlow {
    /// Exchange the credential's refresh token for a new access token.
    fn refresh(&self, credential: &Credential) -> Result<Credential>;

    /// Run the interactive browser consent for `scope`.
    fn consent(&self, scope: &str) -> Result<Credential>;
}

/// OAuth client registration, as downloaded from the Google Cloud console.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ClientSecrets {
    pub client_id: String,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default = "default_auth_uri")]
    pub auth_uri: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_auth_uri() -> String {
    GOOGLE_AUTH_URI.to_string()
}

fn default_token_uri() -> String {
    GOOGLE_TOKEN_URI.to_string()
}

#[derive(Deserialize)]
struct ClientSecretsFile {
    installed: Option<ClientSecrets>,
    web: Option<ClientSecrets>,
}

impl ClientSecrets {
    pub fn load(path: &Path) -> Result<Self> {
        let s = fs::read_to_string(path).map_err(|e| {
            Error::auth(format!("cannot read client secrets {}: {e}", path.display()))
        })?;
        Self::parse(&s)
            .map_err(|e| Error::auth(format!("client secrets {}: {e}", path.display())))
    }

    fn parse(s: &str) -> std::result::Result<Self, String> {
        let file: ClientSecretsFile = serde_json::from_str(s).map_err(|e| e.to_string())?;
        file.installed
            .or(file.web)
            .ok_or_else(|| "expected an \"installed\" or \"web\" client".to_string())
    }
}

fn oauth_client(
    client_id: &str,
    client_secret: Option<&str>,
    auth_uri: &str,
    token_uri: &str,
) -> Result<BasicClient> {
    let auth_url = AuthUrl::new(auth_uri.to_string())
        .map_err(|e| Error::auth(format!("bad auth uri '{auth_uri}': {e}")))?;
    let token_url = TokenUrl::new(token_uri.to_string())
        .map_err(|e| Error::auth(format!("bad token uri '{token_uri}': {e}")))?;

    Ok(BasicClient::new(
        ClientId::new(client_id.to_string()),
        client_secret.map(|s| ClientSecret::new(s.to_string())),
        auth_url,
        Some(token_url),
    ))
}

fn describe_token_error<RE>(err: RequestTokenError<RE, BasicErrorResponse>) -> String
where
    RE: std::error::Error + 'static,
{
    match err {
        RequestTokenError::ServerResponse(resp) => resp.to_string(),
        other => other.to_string(),
    }
}

fn granted_scopes(token: &BasicTokenResponse) -> Option<Vec<String>> {
    token
        .scopes()
        .map(|scopes| scopes.iter().map(|s| s.as_str().to_string()).collect())
}

/// Authorization Code + PKCE against Google with a loopback redirect.
pub struct GoogleOAuth {
    client_secret_path: PathBuf,
    consent_timeout: Duration,
}

impl GoogleOAuth {
    pub fn new(client_secret_path: impl Into<PathBuf>, consent_timeout: Duration) -> Self {
        Self {
            client_secret_path: client_secret_path.into(),
            consent_timeout,
        }
    }

    pub fn from_config(cfg: &Config) -> Self {
        Self::new(cfg.client_secret_path.clone(), cfg.consent_timeout())
    }
}

impl OAuthFlow for GoogleOAuth {
    fn refresh(&self, credential: &Credential) -> Result<Credential> {
        let refresh_token = credential
            .refresh_token
            .as_deref()
            .ok_or_else(|| Error::auth("stored credential has no refresh token"))?;

        let client = oauth_client(
            &credential.client_id,
            credential.client_secret.as_deref(),
            GOOGLE_AUTH_URI,
            &credential.token_uri,
        )?;

        let token = client
            .exchange_refresh_token(&RefreshToken::new(refresh_token.to_string()))
            .request(http_client)
            .map_err(|e| {
                Error::auth(format!("token refresh failed: {}", describe_token_error(e)))
            })?;

        Ok(credential.refreshed(
            token.access_token().secret().to_string(),
            token.refresh_token().map(|r| r.secret().to_string()),
            token.expires_in().map(|d| d.as_secs()),
            granted_scopes(&token),
        ))
    }

    fn consent(&self, scope: &str) -> Result<Credential> {
        let secrets = ClientSecrets::load(&self.client_secret_path)?;

        // Listen before handing out the URL so the redirect cannot race us.
        let listener = CallbackListener::bind()?;

        let client = oauth_client(
            &secrets.client_id,
            secrets.client_secret.as_deref(),
            &secrets.auth_uri,
            &secrets.token_uri,
        )?
        .set_redirect_uri(
            RedirectUrl::new(listener.redirect_uri())
                .map_err(|e| Error::auth(format!("bad redirect uri: {e}")))?,
        );

        let (pkce_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();

        let (auth_url, csrf_token) = client
            .authorize_url(CsrfToken::new_random)
            .add_scope(Scope::new(scope.to_string()))
            .add_extra_param("access_type", "offline")
            .set_pkce_challenge(pkce_challenge)
            .url();

        println!("Please visit this URL to authorize this application:\n{auth_url}");
        if let Err(e) = open::that(auth_url.as_str()) {
            log::warn!("could not open browser automatically: {e}");
        }

        let code = listener.wait_for_code(csrf_token.secret(), self.consent_timeout)?;
        drop(listener);

        let token = client
            .exchange_code(AuthorizationCode::new(code))
            .set_pkce_verifier(pkce_verifier)
            .request(http_client)
            .map_err(|e| {
                Error::auth(format!("token exchange failed: {}", describe_token_error(e)))
            })?;

        Ok(Credential {
            token: token.access_token().secret().to_string(),
            refresh_token: token.refresh_token().map(|r| r.secret().to_string()),
            token_uri: secrets.token_uri,
            client_id: secrets.client_id,
            client_secret: secrets.client_secret,
            scopes: granted_scopes(&token).unwrap_or_else(|| vec![scope.to_string()]),
            expiry: expiry_from(token.expires_in().map(|d| d.as_secs())),
        })
    }
}

/// What the browser sent back to the redirect URI.
#[derive(Debug, PartialEq, Eq)]
enum Callback {
    Code { code: String, state: Option<String> },
    Denied(String),
    Empty,
}

fn parse_callback(port: u16, path_and_query: &str) -> Callback {
    let Ok(parsed) = Url::parse(&format!("http://127.0.0.1:{port}{path_and_query}")) else {
        return Callback::Empty;
    };

    let mut code = None;
    let mut state = None;
    let mut error = None;
    for (k, v) in parsed.query_pairs() {
        match k.as_ref() {
            "code" => code = Some(v.into_owned()),
            "state" => state = Some(v.into_owned()),
            "error" => error = Some(v.into_owned()),
            _ => {}
        }
    }

    match (code, error) {
        (_, Some(err)) => Callback::Denied(err),
        (Some(code), None) => Callback::Code { code, state },
        (None, None) => Callback::Empty,
    }
}

/// Loopback HTTP listener that lives only for the duration of one consent.
/// Dropping it closes the socket.
struct CallbackListener {
    server: Server,
    port: u16,
}

impl CallbackListener {
    fn bind() -> Result<Self> {
        let server = Server::http("127.0.0.1:0")
            .map_err(|e| Error::auth(format!("failed to bind OAuth callback listener: {e}")))?;
        let port = server.server_addr().port();
        log::debug!("OAuth callback listener on 127.0.0.1:{port}");
        Ok(Self { server, port })
    }

    fn redirect_uri(&self) -> String {
        format!("http://127.0.0.1:{}/", self.port)
    }

    fn wait_for_code(&self, expected_state: &str, timeout: Duration) -> Result<String> {
        let wait_until = Instant::now() + timeout;

        while Instant::now() < wait_until {
            let Ok(maybe_request) = self.server.recv_timeout(Duration::from_millis(500)) else {
                continue;
            };
            let Some(request) = maybe_request else {
                continue;
            };

            match parse_callback(self.port, request.url()) {
                Callback::Code { code, state } => {
                    if state.as_deref() != Some(expected_state) {
                        let _ = request.respond(Response::from_string(
                            "State mismatch. You can close this tab.",
                        ));
                        return Err(Error::auth("OAuth state mismatch in redirect"));
                    }
                    let _ = request.respond(Response::from_string(
                        "Authorization received. You can close this tab.",
                    ));
                    return Ok(code);
                }
                Callback::Denied(err) => {
                    let _ = request.respond(Response::from_string(
                        "Authorization was not granted. You can close this tab.",
                    ));
                    return Err(Error::auth(format!("consent not granted: {err}")));
                }
                Callback::Empty => {
                    let _ = request.respond(Response::from_string(
                        "No code found in redirect. You can close this tab.",
                    ));
                }
            }
        }

        Err(Error::auth(format!(
            "no authorization code received within {}s",
            timeout.as_secs()
        )))
    }
}

impl Drop for CallbackListener {
    fn drop(&mut self) {
        self.server.unblock();
        log::debug!("OAuth callback listener on port {} closed", self.port);
    }
}
