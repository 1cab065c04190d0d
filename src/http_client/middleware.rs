// Request/response middleware chain. Request middleware runs in
// declared order; response middleware runs in reverse (LIFO wrap),
// matching spec §4.5/§9 "avoid inheritance — composition over a sum-type
// or function-pair."

use crate::error::CoreResult;
use crate::request::{is_sensitive_header, Request, Response};
use std::collections::BTreeMap;

pub trait Middleware: Send + Sync {
    fn process_request(&self, request: Request) -> CoreResult<Request> {
        Ok(request)
    }

    fn process_response(&self, response: Response) -> CoreResult<Response> {
        Ok(response)
    }
}

/// Redacts sensitive header values before logging a request/response at
/// `tracing::debug!`. Never mutates the request/response itself.
pub struct LoggingMiddleware;

impl LoggingMiddleware {
    fn redacted(headers: &BTreeMap<String, String>) -> BTreeMap<String, String> {
        headers
            .iter()
            .map(|(k, v)| {
                if is_sensitive_header(k) {
                    (k.clone(), "<redacted>".to_string())
                } else {
                    (k.clone(), v.clone())
                }
            })
            .collect()
    }
}

impl Middleware for LoggingMiddleware {
    fn process_request(&self, request: Request) -> CoreResult<Request> {
        tracing::debug!(
            method = request.method.as_str(),
            url = %request.url,
            headers = ?Self::redacted(&request.headers),
            "dispatching request"
        );
        Ok(request)
    }

    fn process_response(&self, response: Response) -> CoreResult<Response> {
        tracing::debug!(
            status = response.status,
            headers = ?Self::redacted(&response.headers),
            "received response"
        );
        Ok(response)
    }
}

/// Applies a fixed set of headers to every request, without overwriting
/// headers the caller (or an earlier middleware) already set.
pub struct DefaultHeadersMiddleware {
    pub headers: BTreeMap<String, String>,
}

impl Middleware for DefaultHeadersMiddleware {
    fn process_request(&self, mut request: Request) -> CoreResult<Request> {
        for (k, v) in &self.headers {
            if !request.has_header(k) {
                request.set_header(k.clone(), v.clone());
            }
        }
        Ok(request)
    }
}

pub struct UserAgentMiddleware {
    pub user_agent: String,
}

impl Middleware for UserAgentMiddleware {
    fn process_request(&self, mut request: Request) -> CoreResult<Request> {
        if !request.has_header("User-Agent") {
            request.set_header("User-Agent", self.user_agent.clone());
        }
        Ok(request)
    }
}

/// Sets `Content-Type: application/json` iff a structured body is
/// present and no explicit type has been set (spec §4.5b). The
/// structured-vs-explicit check itself happens in the client before
/// middleware runs, so this middleware only needs to avoid clobbering an
/// explicit value — it never inspects the body.
pub struct ContentTypeMiddleware;

impl Middleware for ContentTypeMiddleware {
    fn process_request(&self, mut request: Request) -> CoreResult<Request> {
        if matches!(request.body, crate::request::Body::Json(_)) && !request.has_header("Content-Type") {
            request.set_header("Content-Type", "application/json");
        }
        Ok(request)
    }
}
