/// MCP Server Transports
///
/// This module wires the [`Gateway`] to the outside world:
/// - HTTP server setup with Actix Web (JSON-RPC endpoint, health, discovery
///   document and REST mirrors of the tool catalogue)
/// - STDIO server implementation for line-based communication
///
/// Every HTTP response carries CORS and security headers plus an
/// `X-Request-Id`, echoed from the request or generated, which also tags the
/// log lines written while handling that request.

use std::sync::Arc;
use std::time::Duration;

use actix_web::{
    App, Error, HttpMessage, HttpRequest, HttpResponse, HttpServer, Result, guard,
    body::MessageBody,
    dev::{Service, ServiceFactory, ServiceRequest, ServiceResponse},
    http::header::{self, HeaderName, HeaderValue},
    middleware::{Compress, DefaultHeaders, Logger},
    web,
};
use bytes::BytesMut;
use futures_util::StreamExt;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, BufWriter};
use tracing::{Instrument, error, info, info_span, warn};
use uuid::Uuid;

use crate::core::config::Config;
use crate::core::gateway::{Gateway, capabilities};
use crate::core::jsonrpc::{INVALID_PARAMS, INVALID_REQUEST, JsonRpcError, JsonRpcResponse, PARSE_ERROR, RequestId};
use crate::core::mcp::DEFAULT_PROTOCOL_VERSION;

const REQUEST_ID_HEADER: &str = "x-request-id";

/// Longest client-supplied request id that is echoed back
const MAX_REQUEST_ID_LEN: usize = 128;

/// Largest request body accepted on the JSON endpoints, in bytes.
#[derive(Debug, Clone, Copy)]
struct BodyLimit(usize);

/// Correlation id of the request being handled, stored in request extensions.
#[derive(Debug, Clone)]
pub struct CorrelationId(pub String);

fn correlation_id(req: &ServiceRequest) -> String {
    req.headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|id| !id.is_empty() && id.len() <= MAX_REQUEST_ID_LEN)
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

fn request_id(req: &HttpRequest) -> String {
    req.extensions()
        .get::<CorrelationId>()
        .map(|id| id.0.clone())
        .unwrap_or_default()
}

/// Build the Actix application: middleware stack plus every route.
pub fn build_app(
    gateway: web::Data<Gateway>,
    max_body_bytes: usize,
) -> App<
    impl ServiceFactory<
        ServiceRequest,
        Config = (),
        Response = ServiceResponse<impl MessageBody>,
        Error = Error,
        InitError = (),
    >,
> {
    App::new()
        .app_data(gateway)
        .app_data(BodyLimit(max_body_bytes))
        // Tag the request with its correlation id and echo it on the response
        .wrap_fn(|req, srv| {
            let id = correlation_id(&req);
            req.extensions_mut().insert(CorrelationId(id.clone()));
            let response = srv.call(req);
            async move {
                let mut response = response.await?;
                if let Ok(value) = HeaderValue::from_str(&id) {
                    response
                        .headers_mut()
                        .insert(HeaderName::from_static(REQUEST_ID_HEADER), value);
                }
                Ok(response)
            }
        })
        // Enable compression for JSON responses (gzip/brotli)
        .wrap(Compress::default())
        // Security and CORS headers on all responses
        .wrap(
            DefaultHeaders::new()
                .add(("X-Content-Type-Options", "nosniff"))
                .add(("X-Frame-Options", "DENY"))
                .add(("X-XSS-Protection", "1; mode=block"))
                .add(("Access-Control-Allow-Origin", "*"))
                .add(("Access-Control-Allow-Methods", "GET, POST, HEAD, OPTIONS"))
                .add((
                    "Access-Control-Allow-Headers",
                    "Content-Type, Authorization, X-Request-Id, Mcp-Protocol-Version",
                ))
                .add(("Access-Control-Expose-Headers", "X-Request-Id")),
        )
        // Format: %r = request line, %s = status, %Dms = duration in milliseconds
        .wrap(Logger::new("%r %s %Dms %{x-request-id}o"))
        // CORS preflight for any path; other methods fall through to the routes below
        .service(web::resource("/{tail:.*}").guard(guard::Options()).to(preflight))
        .route("/mcp", web::post().to(mcp_endpoint))
        .service(
            web::resource("/")
                .route(web::post().to(mcp_endpoint))
                .route(web::get().to(root))
                .route(web::head().to(root)),
        )
        .route("/health", web::get().to(health))
        .route("/.well-known/mcp-config", web::get().to(mcp_config))
        .route("/.well-known/mcp.json", web::get().to(mcp_config))
        .route("/api/tools", web::get().to(api_tools))
        .route("/api/execute", web::post().to(api_execute))
        .default_service(web::to(not_found))
}

async fn preflight() -> HttpResponse {
    HttpResponse::NoContent()
        .insert_header(("Access-Control-Max-Age", "86400"))
        .finish()
}

/// Why a request body could not be read.
#[derive(Debug)]
enum BodyError {
    TooLarge(usize),
    Read(String),
}

impl BodyError {
    fn to_jsonrpc_error(&self) -> JsonRpcError {
        match self {
            BodyError::TooLarge(limit) => {
                JsonRpcError::new(INVALID_REQUEST, format!("Request body exceeds {} bytes", limit))
            }
            BodyError::Read(reason) => {
                JsonRpcError::new(INVALID_REQUEST, format!("Failed to read request body: {}", reason))
            }
        }
    }
}

/// Collect the request body, stopping as soon as it grows past the
/// configured limit.
async fn read_body(req: &HttpRequest, mut payload: web::Payload) -> std::result::Result<BytesMut, BodyError> {
    let limit = req.app_data::<BodyLimit>().map_or(usize::MAX, |limit| limit.0);
    let mut body = BytesMut::new();
    while let Some(chunk) = payload.next().await {
        let chunk = chunk.map_err(|err| BodyError::Read(err.to_string()))?;
        if body.len() + chunk.len() > limit {
            return Err(BodyError::TooLarge(limit));
        }
        body.extend_from_slice(&chunk);
    }
    Ok(body)
}

/// MCP JSON-RPC endpoint.
///
/// Notifications are answered with a bare 204. Everything else, including
/// malformed and oversized bodies, gets a 200 carrying a JSON-RPC envelope.
async fn mcp_endpoint(gateway: web::Data<Gateway>, req: HttpRequest, payload: web::Payload) -> HttpResponse {
    let span = info_span!("mcp", request_id = %request_id(&req));

    if !is_json_content(&req) {
        span.in_scope(|| warn!("rejected request with non-JSON content type"));
        return HttpResponse::Ok().json(JsonRpcResponse::failure(
            RequestId::Null,
            JsonRpcError::new(INVALID_REQUEST, "Content-Type must be application/json"),
        ));
    }

    let body = match read_body(&req, payload).await {
        Ok(body) => body,
        Err(err) => {
            span.in_scope(|| warn!("rejected request body: {:?}", err));
            return HttpResponse::Ok().json(JsonRpcResponse::failure(RequestId::Null, err.to_jsonrpc_error()));
        }
    };

    match gateway.handle(&body).instrument(span).await {
        Some(response) => HttpResponse::Ok().json(response),
        None => HttpResponse::NoContent().finish(),
    }
}

/// A missing content type is accepted; a declared one must be JSON.
fn is_json_content(req: &HttpRequest) -> bool {
    match req.headers().get(header::CONTENT_TYPE) {
        None => true,
        Some(value) => value
            .to_str()
            .map(|value| value.to_ascii_lowercase().contains("json"))
            .unwrap_or(false),
    }
}

/// Health check endpoint handler.
///
/// Used by load balancers and monitoring systems to verify server
/// availability. It does not touch the database; use the `check_health` tool
/// for that.
async fn health(gateway: web::Data<Gateway>) -> Result<HttpResponse> {
    Ok(HttpResponse::Ok().json(json!({
        "status": "healthy",
        "server": gateway.info().name,
        "version": gateway.info().version,
        "tools": gateway.registry().len(),
        "dataStore": gateway.store_mode(),
        "timestamp": chrono::Utc::now().to_rfc3339(),
    })))
}

/// Service descriptor served at `/`.
async fn root(gateway: web::Data<Gateway>) -> Result<HttpResponse> {
    Ok(HttpResponse::Ok().json(json!({
        "status": "ok",
        "server": gateway.info().name,
        "version": gateway.info().version,
        "protocol": "MCP over JSON-RPC 2.0",
        "endpoints": [
            "POST /mcp",
            "GET /health",
            "GET /.well-known/mcp-config",
            "GET /api/tools",
            "POST /api/execute",
        ],
    })))
}

/// Discovery document for MCP clients and registries.
async fn mcp_config(gateway: web::Data<Gateway>) -> Result<HttpResponse> {
    let tools: Vec<_> = gateway.registry().list().collect();
    Ok(HttpResponse::Ok().json(json!({
        "mcpServers": {
            "supabase": {
                "transport": { "type": "http", "url": "/mcp" },
                "metadata": {
                    "name": gateway.info().name,
                    "version": gateway.info().version,
                    "protocolVersion": DEFAULT_PROTOCOL_VERSION,
                    "capabilities": capabilities(),
                    "categories": ["database", "auth", "storage"],
                    "tools": tools,
                },
            },
        },
    })))
}

async fn api_tools(gateway: web::Data<Gateway>) -> Result<HttpResponse> {
    let tools: Vec<_> = gateway.registry().list().collect();
    Ok(HttpResponse::Ok().json(json!({ "tools": tools })))
}

#[derive(Debug, Deserialize)]
struct ExecuteRequest {
    #[serde(alias = "tool")]
    name: Option<String>,
    arguments: Option<Value>,
}

/// REST mirror of `tools/call`.
async fn api_execute(gateway: web::Data<Gateway>, req: HttpRequest, payload: web::Payload) -> HttpResponse {
    let span = info_span!("api_execute", request_id = %request_id(&req));

    let body = match read_body(&req, payload).await {
        Ok(body) => body,
        Err(err) => {
            let builder = match err {
                BodyError::TooLarge(_) => HttpResponse::PayloadTooLarge(),
                BodyError::Read(_) => HttpResponse::BadRequest(),
            };
            return execute_reply(builder, Err(err.to_jsonrpc_error()));
        }
    };

    let request: ExecuteRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(err) => {
            return execute_reply(
                HttpResponse::BadRequest(),
                Err(JsonRpcError::new(PARSE_ERROR, format!("Parse error: {}", err))),
            );
        }
    };
    let Some(name) = request.name else {
        return execute_reply(
            HttpResponse::BadRequest(),
            Err(JsonRpcError::new(INVALID_PARAMS, "Missing tool name")),
        );
    };
    let arguments = match request.arguments {
        None | Some(Value::Null) => json!({}),
        Some(arguments) => arguments,
    };

    let result = gateway.execute_tool(&name, arguments).instrument(span).await;
    let result = result.and_then(|output| {
        serde_json::to_value(output).map_err(|err| {
            error!("failed to serialize tool output: {}", err);
            JsonRpcError::internal_error()
        })
    });
    execute_reply(HttpResponse::Ok(), result)
}

fn execute_reply(
    mut builder: actix_web::HttpResponseBuilder,
    result: std::result::Result<Value, JsonRpcError>,
) -> HttpResponse {
    builder.json(match result {
        Ok(output) => json!({ "ok": true, "result": output, "error": null }),
        Err(err) => json!({ "ok": false, "result": null, "error": err }),
    })
}

async fn not_found(req: HttpRequest) -> HttpResponse {
    HttpResponse::NotFound().json(json!({
        "error": "Not found",
        "path": req.path(),
    }))
}

/// Run the MCP server in HTTP mode.
///
/// Configures and starts an Actix Web HTTP server with settings for
/// production deployments:
/// - Worker threads: from configuration (CPU count, max 16, by default)
/// - Max connections: 10,000 concurrent connections
/// - Connection rate limit: 1,000 connections per second
/// - Keep-alive: 30 seconds
/// - Request timeout: 30 seconds
/// - Disconnect timeout: 2 seconds
/// - Shutdown timeout: 10 seconds
pub async fn run_server_http(config: &Config, gateway: Arc<Gateway>) -> std::io::Result<()> {
    let bind_addr = config.bind_address();
    let max_body_bytes = config.max_body_bytes;
    let gateway = web::Data::from(gateway);

    info!(
        name = %gateway.info().name,
        version = %gateway.info().version,
        bind = %bind_addr,
        workers = config.workers,
        tools = gateway.registry().len(),
        data_store = ?gateway.store_mode(),
        "MCP server starting (HTTP mode)"
    );

    HttpServer::new(move || build_app(gateway.clone(), max_body_bytes))
        .workers(config.workers)
        // Connection limits for high-traffic scenarios
        .max_connections(10000)
        .max_connection_rate(1000)
        .keep_alive(Duration::from_secs(30))
        .client_request_timeout(Duration::from_secs(30))
        .client_disconnect_timeout(Duration::from_secs(2))
        .shutdown_timeout(10)
        .bind(&bind_addr)?
        .run()
        .await
}

/// Run the MCP server in STDIO mode.
///
/// Reads one JSON-RPC message per line from stdin and writes one response
/// per line to stdout. Notifications produce no output. All logging goes to
/// stderr so the protocol stream stays clean.
pub async fn run_server_stdio(gateway: Arc<Gateway>) -> std::io::Result<()> {
    info!(
        name = %gateway.info().name,
        version = %gateway.info().version,
        tools = gateway.registry().len(),
        "MCP server starting (STDIO mode)"
    );

    let stdin = BufReader::with_capacity(8192, tokio::io::stdin());
    let stdout = BufWriter::with_capacity(8192, tokio::io::stdout());
    serve_lines(&gateway, stdin, stdout).await
}

async fn serve_lines<R, W>(gateway: &Gateway, reader: R, mut writer: W) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = reader.lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }

        let span = info_span!("stdio", request_id = %Uuid::new_v4());
        let Some(response) = gateway.handle(line.as_bytes()).instrument(span).await else {
            continue;
        };

        let response_json = match serde_json::to_string(&response) {
            Ok(json) => json,
            Err(e) => {
                error!("Error serializing response: {}", e);
                continue;
            }
        };

        // One response per line, flushed immediately
        if let Err(e) = write_line(&mut writer, &response_json).await {
            error!("Error writing to stdout: {}", e);
            break;
        }
    }

    Ok(())
}

async fn write_line<W: AsyncWrite + Unpin>(writer: &mut W, line: &str) -> std::io::Result<()> {
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await
}
