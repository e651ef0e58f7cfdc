//! HTTP API for logbook
//!
//! A thin layer over [`Services`]: it resolves the session cookie, parses
//! JSON bodies and maps results to status codes. No rules live here.
//!
//! ## Public
//! - `GET /health`
//! - `GET /api/settings`
//! - `POST /api/register`, `POST /api/login`, `POST /api/logout`
//!
//! ## Signed in
//! - `GET /api/me`, `PUT /api/me/email`, `PUT /api/me/password`
//! - `GET|POST /api/logs`, `GET|PUT|DELETE /api/logs/{id}`
//! - `GET|POST /api/logs/{id}/entries`, `PUT|DELETE /api/logs/{id}/entries/{entry}`
//! - `POST|DELETE /api/logs/{id}/share-token`
//! - `GET /api/logs/{id}/shares`, `DELETE /api/logs/{id}/shares/{share}`
//! - `GET|POST /api/join/{token}`
//!
//! ## Example Usage
//!
//! ```bash
//! curl -c jar -X POST -d '{"username":"alice","password":"password123"}' \
//!      http://localhost:4000/api/login
//!
//! curl -b jar -X POST \
//!      -d '{"name":"Pushups","fields":[{"name":"count","type":"number","required":true}]}' \
//!      http://localhost:4000/api/logs
//! ```

use std::convert::Infallible;
use std::error::Error as StdError;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http_body_util::{BodyExt, LengthLimitError, Limited};
use hyper::body::{Body, Incoming};
use hyper::header::{self, HeaderMap, HeaderValue};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, StatusCode};
use hyper_util::rt::TokioIo;
use serde::de::DeserializeOwned;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use crate::auth::{Identity, Resolution};
use crate::error::LogbookError;
use crate::services::account_service::SignedIn;
use crate::services::{
    bad_request, created, error_body, error_response, from_create_result, from_delete_result,
    from_result, json_response, method_not_allowed, not_found, ok, unauthorized, HttpResponse,
    Services,
};

pub const SESSION_COOKIE: &str = "session_token";

/// Largest accepted request body
pub const MAX_BODY_BYTES: usize = 64 * 1024;

const AUTH_REQUIRED: &str = "authentication required";
const INVALID_BODY: &str = "invalid request body";

/// HTTP server state
pub struct HttpServer {
    services: Arc<Services>,
    bind_addr: SocketAddr,
}

impl HttpServer {
    pub fn new(services: Arc<Services>, bind_addr: SocketAddr) -> Self {
        Self {
            services,
            bind_addr,
        }
    }

    /// Run the HTTP server
    pub async fn run(self: Arc<Self>) -> Result<(), LogbookError> {
        let listener = TcpListener::bind(self.bind_addr).await?;
        info!(addr = %self.bind_addr, "HTTP server listening");

        loop {
            let (stream, remote_addr) = listener.accept().await?;
            let io = TokioIo::new(stream);
            let server = self.clone();

            tokio::spawn(async move {
                let service = service_fn(move |req: Request<Incoming>| {
                    let server = server.clone();
                    async move { server.handle_request(req).await }
                });

                if let Err(err) = http1::Builder::new()
                    .serve_connection(io, service)
                    .await
                {
                    warn!(addr = %remote_addr, error = %err, "Connection error");
                }
            });
        }
    }

    /// Handle one request. Generic over the body so tests can drive it
    /// with in-memory bodies.
    pub async fn handle_request<B>(&self, req: Request<B>) -> Result<HttpResponse, Infallible>
    where
        B: Body,
        B::Error: Into<Box<dyn StdError + Send + Sync>>,
    {
        let (parts, body) = req.into_parts();
        let method = parts.method;
        let path = parts.uri.path().to_string();

        debug!(method = %method, path = %path, "Incoming request");

        let body = if method == Method::POST || method == Method::PUT {
            match read_body(body).await {
                Ok(bytes) => bytes,
                Err(response) => return Ok(response),
            }
        } else {
            Bytes::new()
        };

        let credential = session_cookie(&parts.headers);
        let resolution = self.services.sessions.resolve(credential.as_deref());

        let segments: Vec<&str> = path.trim_matches('/').split('/').collect();
        let mut response = self.route(&method, &segments, &body, credential.as_deref(), &resolution);

        if resolution.clear_credential() && !response.headers().contains_key(header::SET_COOKIE) {
            response
                .headers_mut()
                .append(header::SET_COOKIE, clear_cookie());
        }

        Ok(response)
    }

    /// Public routes, then the signed-in ones
    fn route(
        &self,
        method: &Method,
        segments: &[&str],
        body: &Bytes,
        credential: Option<&str>,
        resolution: &Resolution,
    ) -> HttpResponse {
        let svc = &self.services;

        match (method, segments) {
            (&Method::GET, ["health"]) => self.handle_health(),
            (&Method::GET, ["api", "settings"]) => ok(&svc.accounts.settings()),
            (&Method::POST, ["api", "register"]) => {
                let result = parse_json(body).and_then(|input| svc.accounts.register(input));
                self.signed_in_response(result, StatusCode::CREATED)
            }
            (&Method::POST, ["api", "login"]) => {
                let result = parse_json(body).and_then(|input| svc.accounts.login(input));
                self.signed_in_response(result, StatusCode::OK)
            }
            (&Method::POST, ["api", "logout"]) => {
                svc.accounts.logout(credential);
                let mut response = ok(&serde_json::json!({ "message": "logged out" }));
                response
                    .headers_mut()
                    .append(header::SET_COOKIE, clear_cookie());
                response
            }
            (_, ["health"]) | (_, ["api", "settings" | "register" | "login" | "logout"]) => {
                method_not_allowed()
            }
            (_, ["api", ..]) => match resolution.identity() {
                Some(identity) => self.route_signed_in(method, segments, body, identity),
                None => unauthorized(AUTH_REQUIRED),
            },
            _ => not_found("not found"),
        }
    }

    fn route_signed_in(
        &self,
        method: &Method,
        segments: &[&str],
        body: &Bytes,
        identity: &Identity,
    ) -> HttpResponse {
        let svc = &self.services;

        match (method, segments) {
            // Account
            (&Method::GET, ["api", "me"]) => from_result(svc.accounts.me(identity)),
            (&Method::PUT, ["api", "me", "email"]) => from_result(
                parse_json(body).and_then(|input| svc.accounts.change_email(identity, input)),
            ),
            (&Method::PUT, ["api", "me", "password"]) => from_delete_result(
                parse_json(body).and_then(|input| svc.accounts.change_password(identity, input)),
            ),

            // Logs
            (&Method::GET, ["api", "logs"]) => from_result(svc.logs.list_logs(identity)),
            (&Method::POST, ["api", "logs"]) => from_create_result(
                parse_json(body).and_then(|input| svc.logs.create_log(identity, input)),
            ),
            (&Method::GET, ["api", "logs", log_id]) => from_result(svc.logs.get_log(identity, log_id)),
            (&Method::PUT, ["api", "logs", log_id]) => from_result(
                parse_json(body).and_then(|input| svc.logs.update_log(identity, log_id, input)),
            ),
            (&Method::DELETE, ["api", "logs", log_id]) => {
                from_delete_result(svc.logs.delete_log(identity, log_id))
            }

            // Entries
            (&Method::GET, ["api", "logs", log_id, "entries"]) => {
                from_result(svc.logs.list_entries(identity, log_id))
            }
            (&Method::POST, ["api", "logs", log_id, "entries"]) => from_create_result(
                parse_json(body).and_then(|input| svc.logs.create_entry(identity, log_id, input)),
            ),
            (&Method::PUT, ["api", "logs", log_id, "entries", entry_id]) => from_result(
                parse_json(body)
                    .and_then(|input| svc.logs.update_entry(identity, log_id, entry_id, input)),
            ),
            (&Method::DELETE, ["api", "logs", log_id, "entries", entry_id]) => {
                from_delete_result(svc.logs.delete_entry(identity, log_id, entry_id))
            }

            // Sharing
            (&Method::POST, ["api", "logs", log_id, "share-token"]) => {
                from_result(svc.shares.issue_token(identity, log_id))
            }
            (&Method::DELETE, ["api", "logs", log_id, "share-token"]) => {
                from_delete_result(svc.shares.revoke_token(identity, log_id))
            }
            (&Method::GET, ["api", "logs", log_id, "shares"]) => {
                from_result(svc.shares.list_members(identity, log_id))
            }
            (&Method::DELETE, ["api", "logs", log_id, "shares", share_id]) => {
                from_delete_result(svc.shares.remove_member(identity, log_id, share_id))
            }
            (&Method::GET, ["api", "join", token]) => {
                from_result(svc.shares.inspect_token(identity, token))
            }
            (&Method::POST, ["api", "join", token]) => match svc.shares.join(identity, token) {
                Ok(joined) if joined.created => created(&joined),
                Ok(joined) => ok(&joined),
                Err(e) => error_response(e),
            },

            (_, ["api", "me"])
            | (_, ["api", "me", "email" | "password"])
            | (_, ["api", "logs"])
            | (_, ["api", "logs", _])
            | (_, ["api", "logs", _, "entries" | "share-token" | "shares"])
            | (_, ["api", "logs", _, "entries" | "shares", _])
            | (_, ["api", "join", _]) => method_not_allowed(),

            _ => not_found("not found"),
        }
    }

    /// Liveness only; no counts leave the process
    fn handle_health(&self) -> HttpResponse {
        match self.services.db.ping() {
            Ok(()) => ok(&serde_json::json!({ "status": "ok" })),
            Err(e) => error_response(e),
        }
    }

    /// Identity body plus a fresh session cookie
    fn signed_in_response(
        &self,
        result: Result<SignedIn, LogbookError>,
        status: StatusCode,
    ) -> HttpResponse {
        match result {
            Ok(signed_in) => {
                let mut response = json_response(status, &signed_in.identity);
                let max_age = self.services.sessions.ttl().num_seconds();
                match session_cookie_header(&signed_in.session.token, max_age) {
                    Some(value) => {
                        response.headers_mut().append(header::SET_COOKIE, value);
                    }
                    None => warn!("Session token is not a valid header value"),
                }
                response
            }
            Err(e) => error_response(e),
        }
    }
}

/// Read a body up to [`MAX_BODY_BYTES`]
async fn read_body<B>(body: B) -> Result<Bytes, HttpResponse>
where
    B: Body,
    B::Error: Into<Box<dyn StdError + Send + Sync>>,
{
    match Limited::new(body, MAX_BODY_BYTES).collect().await {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => Err(error_body(
            StatusCode::PAYLOAD_TOO_LARGE,
            "request body too large",
        )),
        Err(e) => {
            warn!(error = %e, "Failed to read request body");
            Err(bad_request(INVALID_BODY))
        }
    }
}

fn parse_json<T: DeserializeOwned>(body: &Bytes) -> Result<T, LogbookError> {
    serde_json::from_slice(body).map_err(|e| {
        debug!(error = %e, "Rejecting request body");
        LogbookError::invalid_input(INVALID_BODY)
    })
}

/// Value of the session cookie, if present
pub fn session_cookie(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.to_string())
}

fn session_cookie_header(token: &str, max_age_secs: i64) -> Option<HeaderValue> {
    HeaderValue::from_str(&format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        SESSION_COOKIE, token, max_age_secs
    ))
    .ok()
}

fn clear_cookie() -> HeaderValue {
    HeaderValue::from_static("session_token=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::db::LogDb;
    use http_body_util::Full;
    use serde_json::{json, Value};

    fn server() -> HttpServer {
        let db = Arc::new(LogDb::open_in_memory().unwrap());
        let config = Config {
            allow_registration: true,
            ..Config::default()
        };
        HttpServer::new(
            Arc::new(Services::new(db, &config)),
            "127.0.0.1:0".parse().unwrap(),
        )
    }

    struct Reply {
        status: StatusCode,
        headers: HeaderMap,
        body: Value,
    }

    impl Reply {
        fn set_cookie(&self) -> Option<&str> {
            self.headers
                .get(header::SET_COOKIE)
                .and_then(|v| v.to_str().ok())
        }

        fn session_token(&self) -> String {
            let cookie = self.set_cookie().unwrap();
            let value = cookie.strip_prefix("session_token=").unwrap();
            value.split(';').next().unwrap().to_string()
        }
    }

    async fn send_raw(
        server: &HttpServer,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Bytes,
    ) -> Reply {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::COOKIE, format!("theme=dark; session_token={}", token));
        }
        let request = builder.body(Full::new(body)).unwrap();

        let response = server.handle_request(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        Reply { status, headers, body }
    }

    async fn send(
        server: &HttpServer,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> Reply {
        let bytes = body
            .map(|b| Bytes::from(serde_json::to_vec(&b).unwrap()))
            .unwrap_or_default();
        send_raw(server, method, uri, token, bytes).await
    }

    async fn register(server: &HttpServer, username: &str) -> String {
        let reply = send(
            server,
            Method::POST,
            "/api/register",
            None,
            Some(json!({ "username": username, "password": "password123" })),
        )
        .await;
        assert_eq!(reply.status, StatusCode::CREATED);
        reply.session_token()
    }

    #[tokio::test]
    async fn test_register_sets_session_cookie() {
        let server = server();
        let reply = send(
            &server,
            Method::POST,
            "/api/register",
            None,
            Some(json!({ "username": "alice", "password": "password123", "email": "a@example.com" })),
        )
        .await;

        assert_eq!(reply.status, StatusCode::CREATED);
        assert_eq!(reply.body["username"], "alice");
        let cookie = reply.set_cookie().unwrap();
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("SameSite=Lax"));
        assert!(cookie.contains("Max-Age=2592000"));

        let token = reply.session_token();
        let me = send(&server, Method::GET, "/api/me", Some(token.as_str()), None).await;
        assert_eq!(me.status, StatusCode::OK);
        assert_eq!(me.body["email"], "a@example.com");
    }

    #[tokio::test]
    async fn test_anonymous_is_rejected() {
        let server = server();
        let reply = send(&server, Method::GET, "/api/logs", None, None).await;
        assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
        assert_eq!(reply.body["error"], AUTH_REQUIRED);
        assert!(reply.set_cookie().is_none());
    }

    #[tokio::test]
    async fn test_bad_cookie_is_cleared() {
        let server = server();
        let reply = send(&server, Method::GET, "/api/settings", Some("garbage"), None).await;
        assert_eq!(reply.status, StatusCode::OK);
        assert_eq!(reply.body["allow_registration"], true);
        assert!(reply.set_cookie().unwrap().contains("Max-Age=0"));
    }

    #[tokio::test]
    async fn test_logout_ends_session() {
        let server = server();
        let token = register(&server, "alice").await;

        let reply = send(&server, Method::POST, "/api/logout", Some(token.as_str()), None).await;
        assert_eq!(reply.status, StatusCode::OK);
        assert!(reply.set_cookie().unwrap().contains("Max-Age=0"));

        let me = send(&server, Method::GET, "/api/me", Some(token.as_str()), None).await;
        assert_eq!(me.status, StatusCode::UNAUTHORIZED);
        assert!(me.set_cookie().unwrap().contains("Max-Age=0"));
    }

    #[tokio::test]
    async fn test_log_and_entry_routes() {
        let server = server();
        let token = register(&server, "alice").await;

        let log = send(
            &server,
            Method::POST,
            "/api/logs",
            Some(token.as_str()),
            Some(json!({
                "name": "Pushups",
                "fields": [
                    { "name": "count", "type": "number", "required": true },
                    { "name": "notes", "type": "text" }
                ]
            })),
        )
        .await;
        assert_eq!(log.status, StatusCode::CREATED);
        assert_eq!(log.body["is_owner"], true);
        assert!(log.body.get("share_token").is_none());
        let log_id = log.body["id"].as_str().unwrap().to_string();
        let entries_uri = format!("/api/logs/{}/entries", log_id);

        let bad = send(&server, Method::POST, &entries_uri, Some(token.as_str()), Some(json!({ "fields": { "count": "abc" } }))).await;
        assert_eq!(bad.status, StatusCode::BAD_REQUEST);
        assert_eq!(bad.body["error"], "field \"count\" must be a valid number");

        let entry = send(&server, Method::POST, &entries_uri, Some(token.as_str()), Some(json!({ "fields": { "count": "25" } }))).await;
        assert_eq!(entry.status, StatusCode::CREATED);
        assert_eq!(entry.body["username"], "alice");
        let entry_uri = format!("{}/{}", entries_uri, entry.body["id"].as_str().unwrap());

        let no_time = send(&server, Method::PUT, &entry_uri, Some(token.as_str()), Some(json!({ "fields": { "count": "30" } }))).await;
        assert_eq!(no_time.status, StatusCode::BAD_REQUEST);
        assert_eq!(no_time.body["error"], "occurred_at is required");

        let updated = send(
            &server,
            Method::PUT,
            &entry_uri,
            Some(token.as_str()),
            Some(json!({ "fields": { "count": "30" }, "occurred_at": "2024-06-01T07:00:00Z" })),
        )
        .await;
        assert_eq!(updated.status, StatusCode::OK);
        assert_eq!(updated.body["fields"]["count"], "30");

        let list = send(&server, Method::GET, &entries_uri, Some(token.as_str()), None).await;
        assert_eq!(list.body.as_array().map(Vec::len), Some(1));

        let deleted = send(&server, Method::DELETE, &entry_uri, Some(token.as_str()), None).await;
        assert_eq!(deleted.status, StatusCode::NO_CONTENT);
        let again = send(&server, Method::DELETE, &entry_uri, Some(token.as_str()), None).await;
        assert_eq!(again.status, StatusCode::NOT_FOUND);
        assert_eq!(again.body["error"], "entry not found");
    }

    #[tokio::test]
    async fn test_join_statuses() {
        let server = server();
        let alice = register(&server, "alice").await;
        let bob = register(&server, "bob").await;

        let log = send(&server, Method::POST, "/api/logs", Some(alice.as_str()), Some(json!({ "name": "Water" }))).await;
        let log_id = log.body["id"].as_str().unwrap().to_string();

        let issued = send(&server, Method::POST, &format!("/api/logs/{}/share-token", log_id), Some(alice.as_str()), None).await;
        assert_eq!(issued.status, StatusCode::OK);
        let join_uri = format!("/api/join/{}", issued.body["share_token"].as_str().unwrap());

        let info = send(&server, Method::GET, &join_uri, Some(bob.as_str()), None).await;
        assert_eq!(info.body["owner_username"], "alice");
        assert_eq!(info.body["already_member"], false);

        let first = send(&server, Method::POST, &join_uri, Some(bob.as_str()), None).await;
        assert_eq!(first.status, StatusCode::CREATED);
        assert_eq!(first.body["log_name"], "Water");
        let second = send(&server, Method::POST, &join_uri, Some(bob.as_str()), None).await;
        assert_eq!(second.status, StatusCode::OK);

        let own = send(&server, Method::POST, &join_uri, Some(alice.as_str()), None).await;
        assert_eq!(own.status, StatusCode::FORBIDDEN);
        assert_eq!(own.body["error"], "you already own this log");

        let as_member = send(&server, Method::GET, &format!("/api/logs/{}", log_id), Some(bob.as_str()), None).await;
        assert_eq!(as_member.body["is_owner"], false);
        assert!(as_member.body.get("share_token").is_none());

        let rename = send(&server, Method::PUT, &format!("/api/logs/{}", log_id), Some(bob.as_str()), Some(json!({ "name": "Mine" }))).await;
        assert_eq!(rename.status, StatusCode::NOT_FOUND);
        assert_eq!(rename.body["error"], "log not found");
    }

    #[tokio::test]
    async fn test_health_reveals_no_counts() {
        let server = server();
        register(&server, "alice").await;

        let reply = send(&server, Method::GET, "/health", None, None).await;
        assert_eq!(reply.status, StatusCode::OK);
        assert_eq!(reply.body, json!({ "status": "ok" }));
    }

    #[tokio::test]
    async fn test_unknown_route_and_method() {
        let server = server();
        let token = register(&server, "alice").await;

        let missing = send(&server, Method::GET, "/nowhere", None, None).await;
        assert_eq!(missing.status, StatusCode::NOT_FOUND);

        let wrong = send(&server, Method::GET, "/api/register", None, None).await;
        assert_eq!(wrong.status, StatusCode::METHOD_NOT_ALLOWED);

        let patch = send(&server, Method::PATCH, "/api/logs", Some(token.as_str()), None).await;
        assert_eq!(patch.status, StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn test_body_limits_and_malformed_json() {
        let server = server();
        let token = register(&server, "alice").await;

        let huge = Bytes::from(vec![b' '; MAX_BODY_BYTES + 1]);
        let reply = send_raw(&server, Method::POST, "/api/logs", Some(token.as_str()), huge).await;
        assert_eq!(reply.status, StatusCode::PAYLOAD_TOO_LARGE);

        let reply = send_raw(&server, Method::POST, "/api/logs", Some(token.as_str()), Bytes::from_static(b"{not json")).await;
        assert_eq!(reply.status, StatusCode::BAD_REQUEST);
        assert_eq!(reply.body["error"], INVALID_BODY);
    }

    #[test]
    fn test_session_cookie_parsing() {
        let mut headers = HeaderMap::new();
        headers.append(header::COOKIE, HeaderValue::from_static("a=1; session_token=abc"));
        assert_eq!(session_cookie(&headers).as_deref(), Some("abc"));

        let mut other = HeaderMap::new();
        other.append(header::COOKIE, HeaderValue::from_static("session=xyz"));
        assert_eq!(session_cookie(&other), None);
    }
}
