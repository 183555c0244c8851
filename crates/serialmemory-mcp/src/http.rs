use std::io::{self, BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use rustls::{ServerConfig, ServerConnection, StreamOwned};
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

use crate::auth::BearerAuth;
use crate::protocol::{JsonRpcRequest, JsonRpcResponse, Outcome, INVALID_REQUEST, PARSE_ERROR};
use crate::server::{McpServer, SERVER_NAME, SERVER_VERSION};

const MAX_HEADER_SIZE: usize = 32 * 1024;
const MAX_BODY_SIZE: usize = 1_048_576;
const MAX_HEADERS: usize = 64;
const READ_TIMEOUT: Duration = Duration::from_secs(30);
pub const MAX_CONNECTIONS: usize = 64;
const CONTINUE: &[u8] = b"HTTP/1.1 100 Continue\r\n\r\n";

#[derive(Debug, Error)]
pub enum RequestError {
    #[error("request headers too large")]
    HeadersTooLarge,

    #[error("request body too large")]
    BodyTooLarge,

    #[error("malformed request: {0}")]
    Malformed(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}

#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: String,
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl HttpRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn json<T: Serialize>(status: u16, value: &T) -> Self {
        let body = serde_json::to_vec(value).unwrap_or_else(|_| b"{}".to_vec());
        Self {
            status,
            headers: vec![("Content-Type".to_string(), "application/json".to_string())],
            body,
        }
    }

    fn error(status: u16, code: &str, message: &str) -> Self {
        Self::json(status, &json!({ "error": code, "message": message }))
    }

    fn rpc_error(id: Value, code: i64, message: impl Into<String>) -> Self {
        Self::json(400, &JsonRpcResponse::error(id, code, message))
    }

    fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn body_json(&self) -> Option<Value> {
        serde_json::from_slice(&self.body).ok()
    }
}

/// Result of routing one HTTP request.
#[derive(Debug)]
pub struct Routed {
    pub response: HttpResponse,
    pub exit: bool,
}

impl From<HttpResponse> for Routed {
    fn from(response: HttpResponse) -> Self {
        Self {
            response,
            exit: false,
        }
    }
}

type ExitHook = Arc<dyn Fn() + Send + Sync>;

/// HTTP transport: one thread per connection, one request per connection.
/// Dispatch runs on the shared tokio runtime. Connections beyond the limit
/// are answered with 503 and closed.
#[derive(Clone)]
pub struct HttpServer {
    server: Arc<McpServer>,
    runtime: Handle,
    auth: Option<BearerAuth>,
    on_exit: Option<ExitHook>,
    tls: Option<Arc<ServerConfig>>,
    connections: Arc<Semaphore>,
}

impl HttpServer {
    pub fn new(server: Arc<McpServer>, runtime: Handle, token: Option<&str>) -> Self {
        Self {
            server,
            runtime,
            auth: token.map(BearerAuth::new),
            on_exit: None,
            tls: None,
            connections: Arc::new(Semaphore::new(MAX_CONNECTIONS)),
        }
    }

    /// Serves over TLS instead of plain HTTP. Routing is unchanged.
    pub fn with_tls(mut self, config: Arc<ServerConfig>) -> Self {
        self.tls = Some(config);
        self
    }

    pub fn with_max_connections(mut self, limit: usize) -> Self {
        self.connections = Arc::new(Semaphore::new(limit));
        self
    }

    /// Hook run after the response to an `exit` request has been written.
    pub fn with_exit_hook(mut self, hook: ExitHook) -> Self {
        self.on_exit = Some(hook);
        self
    }

    pub fn serve(self, listener: TcpListener) -> io::Result<()> {
        info!(
            addr = %listener.local_addr()?,
            auth = self.auth.is_some(),
            tls = self.tls.is_some(),
            "http transport listening"
        );
        let this = Arc::new(self);
        for stream in listener.incoming() {
            match stream {
                Ok(mut stream) => {
                    let Ok(permit) = Arc::clone(&this.connections).try_acquire_owned() else {
                        warn!("connection limit reached, rejecting");
                        let busy = HttpResponse::error(503, "server_busy", "too many connections");
                        if this.tls.is_none() {
                            let _ = write_response(&mut stream, &busy);
                        }
                        continue;
                    };
                    let this = Arc::clone(&this);
                    thread::spawn(move || {
                        let _permit = permit;
                        if let Err(err) = this.handle_connection(stream) {
                            debug!(error = %err, "http connection error");
                        }
                    });
                }
                Err(err) => warn!(error = %err, "http accept error"),
            }
        }
        Ok(())
    }

    fn handle_connection(&self, stream: TcpStream) -> io::Result<()> {
        stream.set_read_timeout(Some(READ_TIMEOUT))?;
        let Some(config) = &self.tls else {
            return self.handle_stream(stream).map(drop);
        };

        let connection = ServerConnection::new(Arc::clone(config)).map_err(io::Error::other)?;
        let mut tls = self.handle_stream(StreamOwned::new(connection, stream))?;
        tls.conn.send_close_notify();
        tls.flush()
    }

    fn handle_stream<S: Read + Write>(&self, stream: S) -> io::Result<S> {
        let mut reader = BufReader::new(stream);
        let parsed = read_request_with(&mut reader, |reader| {
            let stream = reader.get_mut();
            stream.write_all(CONTINUE)?;
            stream.flush()
        });

        let routed = match parsed {
            Ok(None) => return Ok(reader.into_inner()),
            Ok(Some(request)) => self.route(&request),
            Err(RequestError::HeadersTooLarge | RequestError::BodyTooLarge) => {
                HttpResponse::error(413, "payload_too_large", "request exceeds size limit").into()
            }
            Err(RequestError::Malformed(reason)) => {
                HttpResponse::error(400, "bad_request", &reason).into()
            }
            Err(RequestError::Io(err)) => return Err(err),
        };

        let mut stream = reader.into_inner();
        write_response(&mut stream, &routed.response)?;
        if routed.exit {
            if let Some(hook) = &self.on_exit {
                hook();
            }
        }
        Ok(stream)
    }

    pub fn route(&self, request: &HttpRequest) -> Routed {
        let path = request
            .path
            .split_once('?')
            .map_or(request.path.as_str(), |(path, _)| path);

        if request.method == "GET" && is_discovery_path(path) {
            return HttpResponse::error(
                404,
                "oauth_not_supported",
                "this server does not support OAuth; use a bearer token",
            )
            .into();
        }

        if let Some(auth) = &self.auth {
            if !auth.authorize(request.header("authorization")) {
                return HttpResponse::error(401, "unauthorized", "missing or invalid bearer token")
                    .with_header("WWW-Authenticate", "Bearer")
                    .into();
            }
        }

        match (request.method.as_str(), path) {
            ("GET", "/" | "/health") => HttpResponse::json(
                200,
                &json!({ "status": "ok", "service": SERVER_NAME, "version": SERVER_VERSION }),
            )
            .into(),
            ("POST", "/mcp") => self.dispatch(&request.body),
            (_, "/mcp") => {
                HttpResponse::error(405, "method_not_allowed", "use POST /mcp").into()
            }
            _ => HttpResponse::error(404, "not_found", "unknown path").into(),
        }
    }

    fn dispatch(&self, body: &[u8]) -> Routed {
        let Ok(text) = std::str::from_utf8(body) else {
            return HttpResponse::rpc_error(Value::Null, PARSE_ERROR, "request body is not UTF-8")
                .into();
        };
        let text = text.trim();
        if text.is_empty() {
            return HttpResponse::rpc_error(Value::Null, INVALID_REQUEST, "empty request body")
                .into();
        }

        let value: Value = match serde_json::from_str(text) {
            Ok(value) => value,
            Err(err) => {
                return HttpResponse::rpc_error(
                    Value::Null,
                    PARSE_ERROR,
                    format!("parse error: {err}"),
                )
                .into();
            }
        };
        let id = value.get("id").cloned().unwrap_or(Value::Null);
        let request: JsonRpcRequest = match serde_json::from_value(value) {
            Ok(request) => request,
            Err(err) => {
                return HttpResponse::rpc_error(id, INVALID_REQUEST, format!("invalid request: {err}"))
                    .into();
            }
        };

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            self.runtime.block_on(self.server.handle_request(request))
        }));
        match outcome {
            Ok(Outcome::Reply(response)) => HttpResponse::json(200, &response).into(),
            Ok(Outcome::Silent) => HttpResponse::json(200, &json!({})).into(),
            Ok(Outcome::Exit) => Routed {
                response: HttpResponse::json(200, &json!({})),
                exit: true,
            },
            Err(_) => {
                error!("http dispatch panicked");
                HttpResponse::error(500, "internal_error", "internal server error").into()
            }
        }
    }
}

fn is_discovery_path(path: &str) -> bool {
    path == "/.well-known/oauth-authorization-server"
        || path == "/.well-known/oauth-protected-resource"
        || path.starts_with("/.well-known/oauth-authorization-server/")
        || path.starts_with("/.well-known/oauth-protected-resource/")
        || path.contains("/.well-known/openid-configuration")
}

/// Reads one request. `Ok(None)` means the peer closed before sending bytes.
pub fn read_request<R: BufRead>(reader: &mut R) -> Result<Option<HttpRequest>, RequestError> {
    read_request_with(reader, |_| Ok(()))
}

/// Like [`read_request`], calling `on_continue` before the body is read when
/// the client sent `Expect: 100-continue` and the declared body fits.
pub fn read_request_with<R, F>(
    reader: &mut R,
    on_continue: F,
) -> Result<Option<HttpRequest>, RequestError>
where
    R: BufRead,
    F: FnOnce(&mut R) -> io::Result<()>,
{
    let Some(head) = read_head(reader)? else {
        return Ok(None);
    };

    let mut parsed_headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut parsed = httparse::Request::new(&mut parsed_headers);
    match parsed.parse(&head) {
        Ok(httparse::Status::Complete(_)) => {}
        Ok(httparse::Status::Partial) => {
            return Err(RequestError::Malformed("incomplete request head".to_string()));
        }
        Err(err) => return Err(RequestError::Malformed(err.to_string())),
    }

    let method = parsed.method.unwrap_or_default().to_string();
    let path = parsed.path.unwrap_or("/").to_string();
    let headers: Vec<(String, String)> = parsed
        .headers
        .iter()
        .map(|h| (h.name.to_string(), String::from_utf8_lossy(h.value).trim().to_string()))
        .collect();

    let chunked = headers.iter().any(|(name, value)| {
        name.eq_ignore_ascii_case("transfer-encoding") && value.to_ascii_lowercase().contains("chunked")
    });
    let content_length = headers
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case("content-length"))
        .map(|(_, value)| {
            value
                .parse::<usize>()
                .map_err(|_| RequestError::Malformed(format!("invalid content-length: {value}")))
        })
        .transpose()?;

    if !chunked && content_length.is_some_and(|len| len > MAX_BODY_SIZE) {
        return Err(RequestError::BodyTooLarge);
    }
    let expects_continue = headers.iter().any(|(name, value)| {
        name.eq_ignore_ascii_case("expect") && value.eq_ignore_ascii_case("100-continue")
    });
    if expects_continue && (chunked || content_length.is_some_and(|len| len > 0)) {
        on_continue(&mut *reader)?;
    }

    let body = if chunked {
        read_chunked_body(reader)?
    } else if let Some(len) = content_length {
        read_sized_body(reader, len)?
    } else {
        Vec::new()
    };

    Ok(Some(HttpRequest {
        method,
        path,
        headers,
        body,
    }))
}

fn read_head<R: BufRead>(reader: &mut R) -> Result<Option<Vec<u8>>, RequestError> {
    let mut head = Vec::with_capacity(1024);
    loop {
        let mut line = Vec::new();
        let read = reader
            .by_ref()
            .take((MAX_HEADER_SIZE + 1) as u64)
            .read_until(b'\n', &mut line)?;
        if read == 0 {
            if head.is_empty() {
                return Ok(None);
            }
            return Err(RequestError::Malformed("connection closed mid-request".to_string()));
        }
        head.extend_from_slice(&line);
        if head.len() > MAX_HEADER_SIZE {
            return Err(RequestError::HeadersTooLarge);
        }
        if line == b"\r\n" || line == b"\n" {
            return Ok(Some(head));
        }
    }
}

fn read_sized_body<R: Read>(reader: &mut R, len: usize) -> Result<Vec<u8>, RequestError> {
    if len > MAX_BODY_SIZE {
        return Err(RequestError::BodyTooLarge);
    }
    let mut body = Vec::with_capacity(len);
    reader.take(len as u64).read_to_end(&mut body)?;
    if body.len() < len {
        return Err(RequestError::Malformed("body shorter than content-length".to_string()));
    }
    Ok(body)
}

fn read_chunked_body<R: BufRead>(reader: &mut R) -> Result<Vec<u8>, RequestError> {
    let mut body = Vec::new();
    loop {
        let mut size_line = String::new();
        reader.by_ref().take(1024).read_line(&mut size_line)?;
        let size_text = size_line
            .split(';')
            .next()
            .unwrap_or_default()
            .trim();
        let size = usize::from_str_radix(size_text, 16)
            .map_err(|_| RequestError::Malformed(format!("invalid chunk size: {size_text:?}")))?;

        if size == 0 {
            loop {
                let mut trailer = String::new();
                let read = reader.by_ref().take(1024).read_line(&mut trailer)?;
                if read == 0 || trailer.trim().is_empty() {
                    return Ok(body);
                }
            }
        }

        if body
            .len()
            .checked_add(size)
            .is_none_or(|total| total > MAX_BODY_SIZE)
        {
            return Err(RequestError::BodyTooLarge);
        }
        let start = body.len();
        reader.by_ref().take(size as u64).read_to_end(&mut body)?;
        if body.len() - start < size {
            return Err(RequestError::Malformed("truncated chunk".to_string()));
        }
        let mut crlf = String::new();
        reader.by_ref().take(2).read_line(&mut crlf)?;
    }
}

fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        400 => "Bad Request",
        401 => "Unauthorized",
        404 => "Not Found",
        405 => "Method Not Allowed",
        413 => "Payload Too Large",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        _ => "Unknown",
    }
}

pub fn write_response<W: Write>(stream: &mut W, response: &HttpResponse) -> io::Result<()> {
    let mut head = format!(
        "HTTP/1.1 {} {}\r\nContent-Length: {}\r\nConnection: close\r\n",
        response.status,
        reason(response.status),
        response.body.len()
    );
    for (name, value) in &response.headers {
        head.push_str(&format!("{name}: {value}\r\n"));
    }
    head.push_str("\r\n");

    stream.write_all(head.as_bytes())?;
    stream.write_all(&response.body)?;
    stream.flush()
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use async_trait::async_trait;
    use serialmemory_catalog::{Catalog, Route};
    use serialmemory_forward::{Backend, ToolResult};
    use tokio::runtime::Runtime;

    use super::*;
    use crate::server::CatalogMode;

    fn parse(raw: &[u8]) -> Result<Option<HttpRequest>, RequestError> {
        read_request(&mut Cursor::new(raw.to_vec()))
    }

    #[test]
    fn parses_get_request() {
        let request = parse(b"GET /health?x=1 HTTP/1.1\r\nHost: localhost\r\n\r\n")
            .expect("parse")
            .expect("request");
        assert_eq!(request.method, "GET");
        assert_eq!(request.path, "/health?x=1");
        assert_eq!(request.header("HOST"), Some("localhost"));
        assert!(request.body.is_empty());
    }

    #[test]
    fn parses_sized_body() {
        let request = parse(b"POST /mcp HTTP/1.1\r\nContent-Length: 4\r\n\r\nabcdEXTRA")
            .expect("parse")
            .expect("request");
        assert_eq!(request.body, b"abcd");
    }

    #[test]
    fn decodes_chunked_body() {
        let raw = b"POST /mcp HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n4\r\n{\"a\"\r\n4;ext=1\r\n:1}\n\r\n0\r\n\r\n";
        let request = parse(raw).expect("parse").expect("request");
        assert_eq!(request.body, b"{\"a\":1}\n");
    }

    #[test]
    fn closed_connection_is_not_an_error() {
        assert!(parse(b"").expect("parse").is_none());
    }

    #[test]
    fn rejects_oversized_requests() {
        let raw = format!("POST /mcp HTTP/1.1\r\nContent-Length: {}\r\n\r\n", MAX_BODY_SIZE + 1);
        assert!(matches!(parse(raw.as_bytes()), Err(RequestError::BodyTooLarge)));

        let mut huge = b"GET / HTTP/1.1\r\nX-Fill: ".to_vec();
        huge.extend(std::iter::repeat(b'a').take(MAX_HEADER_SIZE));
        huge.extend_from_slice(b"\r\n\r\n");
        assert!(matches!(parse(&huge), Err(RequestError::HeadersTooLarge)));
    }

    #[test]
    fn huge_chunk_size_is_rejected_before_reading_data() {
        let mut raw =
            b"POST /mcp HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n4\r\nabcd\r\nfffffffffffffffd\r\n"
                .to_vec();
        let consumed_before_filler = u64::try_from(raw.len()).expect("length");
        raw.extend(std::iter::repeat(b'x').take(2 * MAX_BODY_SIZE));

        let mut cursor = Cursor::new(raw);
        assert!(matches!(read_request(&mut cursor), Err(RequestError::BodyTooLarge)));
        assert!(cursor.position() <= consumed_before_filler);
    }

    #[test]
    fn chunks_adding_up_past_the_cap_are_rejected() {
        let half = MAX_BODY_SIZE / 2;
        let mut raw = b"POST /mcp HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n".to_vec();
        raw.extend_from_slice(format!("{half:x}\r\n").as_bytes());
        raw.extend(std::iter::repeat(b'a').take(half));
        raw.extend_from_slice(format!("\r\n{:x}\r\n", half + 1).as_bytes());
        raw.extend(std::iter::repeat(b'b').take(half + 1));
        raw.extend_from_slice(b"\r\n0\r\n\r\n");
        assert!(matches!(parse(&raw), Err(RequestError::BodyTooLarge)));
    }

    #[test]
    fn expect_continue_is_acknowledged_only_for_acceptable_bodies() {
        let raw = b"POST /mcp HTTP/1.1\r\nContent-Length: 2\r\nExpect: 100-continue\r\n\r\n{}";
        let mut acknowledged = false;
        let request = read_request_with(&mut Cursor::new(raw.to_vec()), |_| {
            acknowledged = true;
            Ok(())
        })
        .expect("parse")
        .expect("request");
        assert!(acknowledged);
        assert_eq!(request.body, b"{}");

        let too_big = format!(
            "POST /mcp HTTP/1.1\r\nContent-Length: {}\r\nExpect: 100-continue\r\n\r\n",
            MAX_BODY_SIZE + 1
        );
        let mut acknowledged = false;
        let result = read_request_with(&mut Cursor::new(too_big.into_bytes()), |_| {
            acknowledged = true;
            Ok(())
        });
        assert!(matches!(result, Err(RequestError::BodyTooLarge)));
        assert!(!acknowledged);
    }

    #[test]
    fn rejects_malformed_head_and_short_body() {
        assert!(matches!(
            parse(b"NOT A REQUEST\r\n\r\n"),
            Err(RequestError::Malformed(_))
        ));
        assert!(matches!(
            parse(b"POST /mcp HTTP/1.1\r\nContent-Length: 10\r\n\r\nabc"),
            Err(RequestError::Malformed(_))
        ));
    }

    #[test]
    fn writes_status_line_and_headers() {
        let mut out = Vec::new();
        let response = HttpResponse::error(401, "unauthorized", "no").with_header("WWW-Authenticate", "Bearer");
        write_response(&mut out, &response).expect("write");
        let text = String::from_utf8(out).expect("utf8");
        assert!(text.starts_with("HTTP/1.1 401 Unauthorized\r\n"));
        assert!(text.contains("Connection: close\r\n"));
        assert!(text.contains("WWW-Authenticate: Bearer\r\n"));
        assert!(text.ends_with(r#"{"error":"unauthorized","message":"no"}"#));
    }

    struct PanickingBackend;

    #[async_trait]
    impl Backend for PanickingBackend {
        async fn forward(&self, _route: &Route, _payload: Option<&Value>) -> ToolResult {
            panic!("backend exploded");
        }
    }

    fn http_server(runtime: &Runtime, token: Option<&str>) -> HttpServer {
        let catalog = Arc::new(Catalog::builtin().expect("embedded catalog"));
        let server = McpServer::new(catalog, Arc::new(PanickingBackend), CatalogMode::Lazy);
        HttpServer::new(Arc::new(server), runtime.handle().clone(), token)
    }

    fn request(method: &str, path: &str, body: &str, auth: Option<&str>) -> HttpRequest {
        let mut headers = vec![("Content-Type".to_string(), "application/json".to_string())];
        if let Some(value) = auth {
            headers.push(("Authorization".to_string(), value.to_string()));
        }
        HttpRequest {
            method: method.to_string(),
            path: path.to_string(),
            headers,
            body: body.as_bytes().to_vec(),
        }
    }

    #[test]
    fn routes_health_and_unknown_paths() {
        let runtime = Runtime::new().expect("runtime");
        let server = http_server(&runtime, None);
        let health = server.route(&request("GET", "/health", "", None)).response;
        assert_eq!(health.status, 200);
        assert_eq!(health.body_json().expect("json")["status"], json!("ok"));
        assert_eq!(server.route(&request("GET", "/mcp", "", None)).response.status, 405);
        assert_eq!(server.route(&request("GET", "/nope", "", None)).response.status, 404);
    }

    #[test]
    fn bad_bodies_get_structured_rpc_errors() {
        let runtime = Runtime::new().expect("runtime");
        let server = http_server(&runtime, None);

        let empty = server.route(&request("POST", "/mcp", "  ", None)).response;
        assert_eq!(empty.status, 400);
        assert_eq!(empty.body_json().expect("json")["error"]["code"], json!(-32600));

        let partial = server.route(&request("POST", "/mcp", r#"{"jsonrpc":"2.0","id":1,"meth"#, None)).response;
        assert_eq!(partial.status, 400);
        assert_eq!(partial.body_json().expect("json")["error"]["code"], json!(-32700));

        let no_method = server.route(&request("POST", "/mcp", r#"{"id":9}"#, None)).response;
        let body = no_method.body_json().expect("json");
        assert_eq!(no_method.status, 400);
        assert_eq!(body["id"], json!(9));
        assert_eq!(body["error"]["code"], json!(-32600));
    }

    #[test]
    fn silent_and_exit_reply_with_empty_object() {
        let runtime = Runtime::new().expect("runtime");
        let server = http_server(&runtime, None);
        let silent = server.route(&request("POST", "/mcp", r#"{"method":"shutdown","id":1}"#, None));
        assert_eq!(silent.response.status, 200);
        assert_eq!(silent.response.body, b"{}");
        assert!(!silent.exit);

        let exit = server.route(&request("POST", "/mcp", r#"{"method":"exit"}"#, None));
        assert_eq!(exit.response.body, b"{}");
        assert!(exit.exit);
    }

    #[test]
    fn dispatch_panic_becomes_internal_error() {
        let runtime = Runtime::new().expect("runtime");
        let server = http_server(&runtime, None);
        let body = r#"{"jsonrpc":"2.0","id":1,"method":"tools/call","params":{"name":"memory_search"}}"#;
        let response = server.route(&request("POST", "/mcp", body, None)).response;
        assert_eq!(response.status, 500);
        assert_eq!(
            response.body_json().expect("json"),
            json!({"error": "internal_error", "message": "internal server error"})
        );
    }

    #[test]
    fn token_gates_everything_but_discovery() {
        let runtime = Runtime::new().expect("runtime");
        let server = http_server(&runtime, Some("s3cret"));

        let denied = server.route(&request("GET", "/health", "", None)).response;
        assert_eq!(denied.status, 401);
        assert!(denied
            .headers
            .iter()
            .any(|(name, value)| name == "WWW-Authenticate" && value == "Bearer"));

        let wrong = server.route(&request("GET", "/health", "", Some("Bearer nope"))).response;
        assert_eq!(wrong.status, 401);

        let allowed = server.route(&request("GET", "/health", "", Some("Bearer s3cret"))).response;
        assert_eq!(allowed.status, 200);

        for path in [
            "/.well-known/oauth-authorization-server",
            "/.well-known/oauth-protected-resource/mcp",
            "/mcp/.well-known/openid-configuration",
        ] {
            let stub = server.route(&request("GET", path, "", None)).response;
            assert_eq!(stub.status, 404, "{path}");
            assert_eq!(stub.body_json().expect("json")["error"], json!("oauth_not_supported"));
        }
    }

    fn listen(server: HttpServer) -> std::net::SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let addr = listener.local_addr().expect("local addr");
        thread::spawn(move || server.serve(listener));
        addr
    }

    fn get_health(addr: std::net::SocketAddr) -> String {
        let mut stream = TcpStream::connect(addr).expect("connect");
        let _ = stream.write_all(b"GET /health HTTP/1.1\r\nHost: localhost\r\n\r\n");
        let mut text = String::new();
        let _ = stream.read_to_string(&mut text);
        text
    }

    #[test]
    fn continue_is_sent_before_the_body_over_a_socket() {
        let runtime = Runtime::new().expect("runtime");
        let addr = listen(http_server(&runtime, None));

        let body = r#"{"jsonrpc":"2.0","id":1,"method":"initialize"}"#;
        let mut stream = TcpStream::connect(addr).expect("connect");
        write!(
            stream,
            "POST /mcp HTTP/1.1\r\nHost: localhost\r\nContent-Length: {}\r\nExpect: 100-continue\r\n\r\n",
            body.len()
        )
        .expect("write head");

        let mut interim = vec![0_u8; CONTINUE.len()];
        stream.read_exact(&mut interim).expect("read interim");
        assert_eq!(interim, CONTINUE);

        stream.write_all(body.as_bytes()).expect("write body");
        let mut text = String::new();
        stream.read_to_string(&mut text).expect("read response");
        assert!(text.starts_with("HTTP/1.1 200 OK\r\n"), "{text}");
        assert!(text.contains(r#""serverInfo""#));
    }

    #[test]
    fn connections_past_the_limit_get_503_until_a_slot_frees() {
        let runtime = Runtime::new().expect("runtime");
        let addr = listen(http_server(&runtime, None).with_max_connections(1));

        let idle = TcpStream::connect(addr).expect("idle connection");
        thread::sleep(Duration::from_millis(150));
        let mut busy = String::new();
        TcpStream::connect(addr)
            .expect("connect past the limit")
            .read_to_string(&mut busy)
            .expect("read 503");
        assert!(busy.starts_with("HTTP/1.1 503 Service Unavailable\r\n"), "{busy}");
        assert!(busy.contains("server_busy"));

        drop(idle);
        let mut recovered = false;
        for _ in 0..80 {
            thread::sleep(Duration::from_millis(25));
            if get_health(addr).starts_with("HTTP/1.1 200") {
                recovered = true;
                break;
            }
        }
        assert!(recovered, "slot was never released");
    }
}
