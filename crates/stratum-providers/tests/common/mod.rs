// crates/stratum-providers/tests/common/mod.rs
// ============================================================================
// Module: Common Test Fixtures
// Description: Scripted sigma API server shared by provider tests.
// Purpose: Replay canned API replies and record what the client sent.
// Dependencies: tiny_http
// ============================================================================

//! ## Overview
//! [`scripted_api`] binds a `tiny_http` server on an ephemeral port and
//! answers each incoming request with the next scripted `(status, body)`
//! pair. Joining the returned handle yields every request it observed.

#![allow(dead_code, reason = "Shared test helpers may be unused in some cases.")]

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io::Read;
use std::thread;

use tiny_http::Header;
use tiny_http::Response;
use tiny_http::Server;
use url::Url;

// ============================================================================
// SECTION: Scripted API
// ============================================================================

/// A request observed by the stub server.
#[derive(Debug, Clone)]
pub struct Observed {
    /// HTTP method.
    pub method: String,
    /// Request target, including the query string.
    pub url: String,
    /// Whether an `Authorization` header was present.
    pub authorized: bool,
    /// Request body.
    pub body: String,
}

/// Serves one scripted `(status, body)` reply per request, in order.
///
/// Returns the API base URL (`http://<addr>/api/2.0`) and a handle whose
/// join yields the observed requests.
pub fn scripted_api(
    replies: Vec<(u16, &'static str)>,
) -> (Url, thread::JoinHandle<Vec<Observed>>) {
    let server = Server::http("127.0.0.1:0").unwrap();
    let addr = server.server_addr().to_ip().unwrap();
    let base = Url::parse(&format!("http://{addr}/api/2.0")).unwrap();
    let handle = thread::spawn(move || {
        let mut observed = Vec::new();
        for (status, body) in replies {
            let Ok(mut request) = server.recv() else {
                break;
            };
            let mut payload = String::new();
            let _ = request.as_reader().read_to_string(&mut payload);
            observed.push(Observed {
                method: request.method().to_string(),
                url: request.url().to_string(),
                authorized: request
                    .headers()
                    .iter()
                    .any(|header| header.field.equiv("Authorization")),
                body: payload,
            });
            let content_type =
                Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..]).unwrap();
            let response =
                Response::from_string(body).with_status_code(status).with_header(content_type);
            let _ = request.respond(response);
        }
        observed
    });
    (base, handle)
}
