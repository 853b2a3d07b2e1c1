//! Route table and request dispatch.
//!
//! Routes are matched in registration order, first match wins. A matched
//! request acquires the control gate before its handler runs and releases it
//! when the handler returns, on success and failure alike.

use std::{error::Error, fmt};

use serde::Serialize;

use crate::ServerContext;

// ============================================================================
// Requests and responses
// ============================================================================

/// HTTP methods the control plane routes on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

impl Method {
    /// Parses a request line token. Anything but `GET`/`POST` is unroutable.
    pub fn parse(token: &str) -> Option<Self> {
        match token {
            "GET" => Some(Method::Get),
            "POST" => Some(Method::Post),
            _ => None,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Method::Get => write!(f, "GET"),
            Method::Post => write!(f, "POST"),
        }
    }
}

/// A parsed request, already stripped down to what handlers need.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: Method,
    pub path: String,
    pub body: Vec<u8>,
}

impl Request {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: Vec::new(),
        }
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }
}

/// A response ready for the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl Response {
    /// `200 OK` with an empty body.
    pub fn ok_empty() -> Self {
        Self {
            status: 200,
            content_type: None,
            body: Vec::new(),
        }
    }

    /// `204 No Content`.
    pub fn no_content() -> Self {
        Self {
            status: 204,
            content_type: None,
            body: Vec::new(),
        }
    }

    /// `200 OK` carrying a JSON document.
    pub fn json<T: Serialize>(value: &T) -> Result<Self, HandlerError> {
        let body = serde_json::to_vec(value)?;
        Ok(Self {
            status: 200,
            content_type: Some("application/json".to_string()),
            body,
        })
    }

    /// A plain-text response with the given status.
    pub fn text(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            content_type: Some("text/plain".to_string()),
            body: message.into().into_bytes(),
        }
    }

    /// `200 OK` carrying an encoded PNG.
    pub fn png(bytes: Vec<u8>) -> Self {
        Self {
            status: 200,
            content_type: Some("image/png".to_string()),
            body: bytes,
        }
    }

    /// `200 OK` with a caller-supplied content type, used for multipart
    /// bodies whose boundary lives in the type itself.
    pub fn with_content_type(content_type: String, body: Vec<u8>) -> Self {
        Self {
            status: 200,
            content_type: Some(content_type),
            body,
        }
    }
}

// ============================================================================
// Handler errors
// ============================================================================

/// Failure inside a handler. The router turns any of these into a 500 with
/// the message as the body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerError {
    message: String,
}

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl Error for HandlerError {}

impl From<serde_json::Error> for HandlerError {
    fn from(err: serde_json::Error) -> Self {
        HandlerError::new(format!("invalid request body: {}", err))
    }
}

impl From<vantage_render::RenderError> for HandlerError {
    fn from(err: vantage_render::RenderError) -> Self {
        HandlerError::new(format!("render failed: {}", err))
    }
}

impl From<image::ImageError> for HandlerError {
    fn from(err: image::ImageError) -> Self {
        HandlerError::new(format!("png encoding failed: {}", err))
    }
}

// ============================================================================
// Routing
// ============================================================================

/// Anchored path matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathPattern {
    /// Matches the whole path exactly.
    Exact(&'static str),
    /// Matches any path starting with the prefix.
    Prefix(&'static str),
}

impl PathPattern {
    pub fn matches(&self, path: &str) -> bool {
        match self {
            PathPattern::Exact(exact) => path == *exact,
            PathPattern::Prefix(prefix) => path.starts_with(prefix),
        }
    }
}

/// Handler signature shared by every route.
pub type Handler = fn(&ServerContext, &Request) -> Result<Response, HandlerError>;

/// One entry in the route table.
pub struct Route {
    pub method: Method,
    pub pattern: PathPattern,
    pub handler: Handler,
}

impl Route {
    pub fn new(method: Method, pattern: PathPattern, handler: Handler) -> Self {
        Self {
            method,
            pattern,
            handler,
        }
    }
}

/// Ordered route table plus the dispatch policy around it.
pub struct Router {
    routes: Vec<Route>,
}

impl Router {
    pub fn new(routes: Vec<Route>) -> Self {
        Self { routes }
    }

    /// Resolves a request to a response.
    ///
    /// Unmatched requests get a 404. Matched requests take the gate first; a
    /// gate timeout or a handler error both come back as a 500 whose body
    /// carries the failure message, so callers can tell the two apart.
    pub fn dispatch(&self, ctx: &ServerContext, request: &Request) -> Response {
        let Some(route) = self
            .routes
            .iter()
            .find(|route| route.method == request.method && route.pattern.matches(&request.path))
        else {
            tracing::debug!(method = %request.method, path = %request.path, "no route matched");
            return Response::text(
                404,
                format!("no route for {} {}", request.method, request.path),
            );
        };

        let _permit = match ctx.gate.acquire() {
            Ok(permit) => permit,
            Err(timeout) => {
                tracing::warn!(path = %request.path, "{}", timeout);
                return Response::text(500, timeout.to_string());
            }
        };

        match (route.handler)(ctx, request) {
            Ok(response) => response,
            Err(err) => {
                tracing::error!(path = %request.path, error = %err, "handler failed");
                Response::text(500, err.to_string())
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_parse() {
        assert_eq!(Method::parse("GET"), Some(Method::Get));
        assert_eq!(Method::parse("POST"), Some(Method::Post));
        assert_eq!(Method::parse("PUT"), None);
        assert_eq!(Method::parse("get"), None);
    }

    #[test]
    fn test_exact_pattern_rejects_suffixes_and_prefixes() {
        let pattern = PathPattern::Exact("/world/node");
        assert!(pattern.matches("/world/node"));
        assert!(!pattern.matches("/world/node/reset"));
        assert!(!pattern.matches("/prefix/world/node"));
    }

    #[test]
    fn test_prefix_pattern_matches_subpaths() {
        let pattern = PathPattern::Prefix("/world/");
        assert!(pattern.matches("/world/bbox"));
        assert!(pattern.matches("/world/node/reset"));
        assert!(!pattern.matches("/info"));
    }

    #[test]
    fn test_json_response_sets_content_type() {
        let response = Response::json(&serde_json::json!({"ok": true})).expect("serializable");
        assert_eq!(response.status, 200);
        assert_eq!(response.content_type.as_deref(), Some("application/json"));
        assert_eq!(response.body, br#"{"ok":true}"#.to_vec());
    }
}
