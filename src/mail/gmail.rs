use reqwest::blocking::Client;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use url::Url;

use crate::auth::credential::Credential;
use crate::auth::oauth::OAuthFlow;
use crate::auth::token_manager::CredentialManager;
use crate::config::Config;
use crate::domain::email::{MessageDetail, MessageSummary};
use crate::error::{Error, Result};
use crate::mail::mailbox::{Connector, Mailbox};

const MAX_ERROR_BODY_LENGTH: usize = 200;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListMessagesResponse {
    #[serde(default)]
    messages: Vec<MessageRef>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MessageRef {
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GmailMessage {
    id: String,
    thread_id: Option<String>,
    history_id: Option<String>,
    snippet: Option<String>,
    /// Epoch milliseconds, sent as a decimal string.
    internal_date: Option<String>,
    payload: Option<MessagePayload>,
}

#[derive(Debug, Deserialize)]
struct MessagePayload {
    #[serde(default)]
    headers: Vec<MessageHeader>,
}

#[derive(Debug, Deserialize)]
struct MessageHeader {
    name: String,
    value: String,
}

impl MessagePayload {
    fn header(&self, name: &str) -> Option<String> {
        self.headers
            .iter()
            .find(|h| h.name == name)
            .map(|h| h.value.clone())
    }
}

impl GmailMessage {
    fn into_detail(self) -> Result<MessageDetail> {
        let payload = self
            .payload
            .as_ref()
            .ok_or_else(|| Error::query(format!("message {} has no payload", self.id)))?;
        let sender = payload.header("From");
        let subject = payload.header("Subject");

        let raw_date = self
            .internal_date
            .as_deref()
            .ok_or_else(|| Error::query(format!("message {} has no internalDate", self.id)))?;
        let internal_date_ms = raw_date.trim().parse::<i64>().map_err(|e| {
            Error::query(format!(
                "message {} has bad internalDate '{raw_date}': {e}",
                self.id
            ))
        })?;

        Ok(MessageDetail {
            sender,
            subject,
            internal_date_ms,
            id: self.id,
            snippet: self.snippet,
            history_id: self.history_id,
            thread_id: self.thread_id,
        })
    }
}

fn sanitize_error_body(body: &str) -> String {
    if body.chars().count() > MAX_ERROR_BODY_LENGTH {
        let cut: String = body.chars().take(MAX_ERROR_BODY_LENGTH).collect();
        format!("{cut}... (truncated)")
    } else {
        body.to_string()
    }
}

/// Gmail REST client bound to one access token.
pub struct GmailClient {
    http: Client,
    base_url: Url,
    access_token: String,
    max_results: Option<u32>,
}

impl GmailClient {
    pub fn new(credential: &Credential, base_url: &str, max_results: Option<u32>) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| Error::query(format!("bad API base url '{base_url}': {e}")))?;
        Ok(Self {
            http: Client::new(),
            base_url,
            access_token: credential.token.clone(),
            max_results,
        })
    }

    fn messages_url(&self) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| Error::query(format!("API base url {} cannot be a base", self.base_url)))?
            .pop_if_empty()
            .extend(["gmail", "v1", "users", "me", "messages"]);
        Ok(url)
    }

    fn search_url(&self, query: &str) -> Result<Url> {
        let mut url = self.messages_url()?;
        url.query_pairs_mut().append_pair("q", query);
        if let Some(n) = self.max_results {
            url.query_pairs_mut().append_pair("maxResults", &n.to_string());
        }
        Ok(url)
    }

    fn message_url(&self, id: &str) -> Result<Url> {
        let mut url = self.messages_url()?;
        url.path_segments_mut()
            .map_err(|_| Error::query("API base url cannot be a base"))?
            .push(id);
        url.query_pairs_mut().append_pair("format", "full");
        Ok(url)
    }

    fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T> {
        log::debug!("GET {url}");
        let resp = self
            .http
            .get(url)
            .bearer_auth(&self.access_token)
            .send()?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().unwrap_or_default();
            return Err(Error::query(format!(
                "Gmail API returned {status}: {}",
                sanitize_error_body(&body)
            )));
        }

        resp.json::<T>()
            .map_err(|e| Error::query(format!("malformed Gmail response: {e}")))
    }
}

impl Mailbox for GmailClient {
    fn search(&self, query: &str) -> Result<Vec<MessageSummary>> {
        let list: ListMessagesResponse = self.get_json(self.search_url(query)?)?;
        if list.next_page_token.is_some() {
            log::debug!("more results available beyond the first page; not fetched");
        }
        Ok(list
            .messages
            .into_iter()
            .map(|m| MessageSummary { id: m.id })
            .collect())
    }

    fn fetch(&self, id: &str) -> Result<MessageDetail> {
        let msg: GmailMessage = self.get_json(self.message_url(id)?)?;
        msg.into_detail()
    }
}

/// Connects to Gmail using whatever credential the manager hands out.
pub struct GmailConnector<F> {
    credentials: CredentialManager<F>,
    base_url: String,
    max_results: Option<u32>,
}

impl<F: OAuthFlow> GmailConnector<F> {
    pub fn new(
        credentials: CredentialManager<F>,
        base_url: impl Into<String>,
        max_results: Option<u32>,
    ) -> Self {
        Self {
            credentials,
            base_url: base_url.into(),
            max_results,
        }
    }

    pub fn from_config(cfg: &Config, flow: F) -> Self {
        Self::new(
            CredentialManager::from_config(cfg, flow),
            cfg.api_base_url.clone(),
            cfg.max_results,
        )
    }
}

impl<F: OAuthFlow> Connector for GmailConnector<F> {
    type Mailbox = GmailClient;

    fn connect(&self) -> Result<GmailClient> {
        let credential = self.credentials.acquire_credential()?;
        log::debug!("connected with scope {}", self.credentials.scope());
        GmailClient::new(&credential, &self.base_url, self.max_results)
    }
}

#[cfg(test)]
mod tests {
    use std::net::TcpListener;
    use std::thread;

    use tiny_http::{Response, Server};

    use super::*;

    fn client(base: &str, max_results: Option<u32>) -> GmailClient {
        client_with_token(base, max_results, "t")
    }

    fn client_with_token(base: &str, max_results: Option<u32>, token: &str) -> GmailClient {
        let cred = Credential {
            token: token.into(),
            refresh_token: None,
            token_uri: "https://oauth2.googleapis.com/token".into(),
            client_id: "c".into(),
            client_secret: None,
            scopes: vec![],
            expiry: None,
        };
        GmailClient::new(&cred, base, max_results).unwrap()
    }

    #[test]
    fn builds_search_url() {
        let url = client("https://gmail.googleapis.com", None)
            .search_url("from:a@b.c OR to:a@b.c")
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://gmail.googleapis.com/gmail/v1/users/me/messages?q=from%3Aa%40b.c+OR+to%3Aa%40b.c"
        );
    }

    #[test]
    fn search_url_carries_max_results() {
        let url = client("http://127.0.0.1:9999/", Some(25))
            .search_url("x")
            .unwrap();
        assert_eq!(
            url.as_str(),
            "http://127.0.0.1:9999/gmail/v1/users/me/messages?q=x&maxResults=25"
        );
    }

    #[test]
    fn builds_message_url() {
        let url = client("https://gmail.googleapis.com", None)
            .message_url("18b2f0c4e5a1d3f7")
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://gmail.googleapis.com/gmail/v1/users/me/messages/18b2f0c4e5a1d3f7?format=full"
        );
    }

    #[test]
    fn empty_search_response_has_no_messages() {
        let list: ListMessagesResponse =
            serde_json::from_str(r#"{"resultSizeEstimate":0}"#).unwrap();
        assert!(list.messages.is_empty());
    }

    #[test]
    fn message_maps_to_detail() {
        let json = r#"{
            "id": "18b",
            "threadId": "18a",
            "historyId": "99123",
            "snippet": "See you tomorrow",
            "internalDate": "1700000000000",
            "payload": {"headers": [
                {"name": "Subject", "value": "Plans"},
                {"name": "From", "value": "Carol <carol@example.com>"},
                {"name": "From", "value": "second@example.com"}
            ]}
        }"#;
        let msg: GmailMessage = serde_json::from_str(json).unwrap();
        let d = msg.into_detail().unwrap();
        assert_eq!(d.sender.as_deref(), Some("Carol <carol@example.com>"));
        assert_eq!(d.subject.as_deref(), Some("Plans"));
        assert_eq!(d.internal_date_ms, 1_700_000_000_000);
        assert_eq!(d.thread_id.as_deref(), Some("18a"));
        assert_eq!(d.history_id.as_deref(), Some("99123"));
        assert_eq!(d.snippet.as_deref(), Some("See you tomorrow"));
    }

    #[test]
    fn header_lookup_is_exact() {
        let json = r#"{"id":"1","internalDate":"0",
            "payload":{"headers":[{"name":"subject","value":"lower"}]}}"#;
        let msg: GmailMessage = serde_json::from_str(json).unwrap();
        let d = msg.into_detail().unwrap();
        assert!(d.subject.is_none());
        assert!(d.sender.is_none());
        assert!(d.thread_id.is_none());
    }

    #[test]
    fn missing_or_bad_internal_date_is_query_error() {
        let msg: GmailMessage =
            serde_json::from_str(r#"{"id":"1","payload":{}}"#).unwrap();
        assert!(matches!(msg.into_detail(), Err(Error::Query(_))));

        let msg: GmailMessage =
            serde_json::from_str(r#"{"id":"1","internalDate":"soon","payload":{}}"#).unwrap();
        assert!(matches!(msg.into_detail(), Err(Error::Query(_))));
    }

    #[test]
    fn missing_payload_is_query_error() {
        let msg: GmailMessage =
            serde_json::from_str(r#"{"id":"7","internalDate":"0","snippet":"hi"}"#).unwrap();
        match msg.into_detail() {
            Err(Error::Query(m)) => assert!(m.contains("message 7 has no payload")),
            other => panic!("expected query error, got {other:?}"),
        }

        // a payload without headers still exports as placeholders
        let msg: GmailMessage =
            serde_json::from_str(r#"{"id":"7","internalDate":"0","payload":{}}"#).unwrap();
        let d = msg.into_detail().unwrap();
        assert!(d.sender.is_none() && d.subject.is_none());
    }

    #[test]
    fn long_error_bodies_are_truncated() {
        let body = "x".repeat(500);
        let s = sanitize_error_body(&body);
        assert!(s.ends_with("... (truncated)"));
        assert_eq!(sanitize_error_body("short"), "short");
    }

    /// (url, authorization header) of one request seen by the fake API.
    type Seen = (String, Option<String>);

    /// Serve the canned `(status, body)` replies in order on a loopback
    /// port, then return what each request looked like.
    fn fake_api(replies: Vec<(u16, &'static str)>) -> (String, thread::JoinHandle<Vec<Seen>>) {
        let server = Server::http("127.0.0.1:0").unwrap();
        let base = format!("http://127.0.0.1:{}/", server.server_addr().port());
        let handle = thread::spawn(move || {
            let mut seen = Vec::new();
            for (status, body) in replies {
                let request = server.recv().unwrap();
                let auth = request
                    .headers()
                    .iter()
                    .find(|h| h.field.equiv("Authorization"))
                    .map(|h| h.value.as_str().to_string());
                seen.push((request.url().to_string(), auth));
                request
                    .respond(Response::from_string(body).with_status_code(status))
                    .unwrap();
            }
            seen
        });
        (base, handle)
    }

    #[test]
    fn searches_and_fetches_over_http() {
        let (base, api) = fake_api(vec![
            (200, r#"{"messages":[{"id":"a1","threadId":"t1"},{"id":"a2","threadId":"t2"}],"resultSizeEstimate":2}"#),
            (
                200,
                r#"{"id":"a1","threadId":"t1","historyId":"7","snippet":"hello",
                    "internalDate":"1700000000000",
                    "payload":{"headers":[{"name":"From","value":"a@example.com"}]}}"#,
            ),
        ]);
        let gmail = client_with_token(&base, None, "tok");

        let hits = gmail.search("from:a OR to:a").unwrap();
        assert_eq!(
            hits,
            vec![
                MessageSummary { id: "a1".into() },
                MessageSummary { id: "a2".into() }
            ]
        );
        let detail = gmail.fetch("a1").unwrap();
        assert_eq!(detail.sender.as_deref(), Some("a@example.com"));
        assert_eq!(detail.subject, None);
        assert_eq!(detail.internal_date_ms, 1_700_000_000_000);

        let seen = api.join().unwrap();
        assert_eq!(seen[0].0, "/gmail/v1/users/me/messages?q=from%3Aa+OR+to%3Aa");
        assert_eq!(seen[1].0, "/gmail/v1/users/me/messages/a1?format=full");
        assert!(seen.iter().all(|(_, auth)| auth.as_deref() == Some("Bearer tok")));
    }

    #[test]
    fn error_status_is_query_error() {
        let (base, api) = fake_api(vec![(500, "boom")]);
        let gmail = client(&base, None);

        match gmail.search("x") {
            Err(Error::Query(m)) => {
                assert!(m.contains("500"), "{m}");
                assert!(m.ends_with(": boom"), "{m}");
            }
            other => panic!("expected query error, got {other:?}"),
        }
        api.join().unwrap();
    }

    #[test]
    fn unparseable_body_is_query_error() {
        let (base, api) = fake_api(vec![(200, "<html>not json</html>"), (200, "{\"id\":")]);
        let gmail = client(&base, None);

        assert!(matches!(gmail.search("x"), Err(Error::Query(_))));
        assert!(matches!(gmail.fetch("a1"), Err(Error::Query(_))));
        api.join().unwrap();
    }

    #[test]
    fn unreachable_api_is_query_error() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let gmail = client(&format!("http://127.0.0.1:{port}/"), None);

        assert!(matches!(gmail.search("x"), Err(Error::Query(_))));
    }
}
