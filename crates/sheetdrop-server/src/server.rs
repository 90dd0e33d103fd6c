//! Native HTTP server
//!
//! hyper HTTP/1.1 on a multi-threaded tokio runtime:
//! - one task per connection
//! - request bodies read through `Limited`, never past the configured bound
//! - graceful drain on shutdown, tracked by [`ConnectionTracker`]

use crate::config::ServerConfig;
use bytes::Bytes;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use sheetdrop_core::middleware::{RequestId, REQUEST_ID_HEADER};
use sheetdrop_core::{
    BodyLimit, CsvExport, Error, Health, Method, MiddlewareChain, Request, Response, StatusCode,
};
use socket2::{Domain, Protocol, Socket, Type};
use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio::sync::watch;

/// Liveness endpoint
pub const HEALTH_PATH: &str = "/health";

/// Request handling shared by every connection. Read-only after construction.
pub struct App {
    export_path: String,
    export: CsvExport,
    health: Health,
    body_limit: BodyLimit,
    middleware: MiddlewareChain,
}

impl App {
    pub fn new(config: &ServerConfig) -> Self {
        let mut middleware = MiddlewareChain::new();
        middleware.add(RequestId);

        Self {
            export_path: config.export_path.clone(),
            export: CsvExport::new(config.export.clone()),
            health: Health::new(),
            body_limit: BodyLimit::new(config.body_limit),
            middleware,
        }
    }

    pub fn health(&self) -> &Health {
        &self.health
    }

    pub fn body_limit(&self) -> BodyLimit {
        self.body_limit
    }

    /// Run middleware and route a fully read request
    pub fn handle(&self, req: Request) -> Response {
        self.dispatch(req, None)
    }

    /// Answer a request whose body was refused while reading. Middleware
    /// still runs, so the rejection carries a request ID like any response.
    pub fn refuse(&self, req: Request, err: Error) -> Response {
        self.dispatch(req, Some(err))
    }

    fn dispatch(&self, mut req: Request, refused: Option<Error>) -> Response {
        let early = self.middleware.run_before(&mut req);

        let request_id = req.header(REQUEST_ID_HEADER).unwrap_or("-").to_string();
        let span = tracing::info_span!(
            "request",
            id = %request_id,
            method = %req.method,
            path = %req.path
        );
        let _guard = span.enter();

        let mut res = match (refused, early) {
            (Some(err), _) => {
                tracing::warn!(error = %err, "request body refused");
                self.refusal(&err)
            }
            (None, Some(res)) => res,
            (None, None) => self.route(&req),
        };
        self.middleware.run_after(&req, &mut res);

        tracing::debug!(
            status = res.status.as_u16(),
            bytes = res.body.len(),
            "request complete"
        );
        res
    }

    fn refusal(&self, err: &Error) -> Response {
        match err {
            Error::BodyTooLarge { declared, .. } => self.body_limit.rejection(*declared),
            other => Response::from_error(other),
        }
    }

    fn route(&self, req: &Request) -> Response {
        if req.path == self.export_path {
            return match req.method {
                Method::Post => self.export.respond(req),
                _ => Response::method_not_allowed("POST"),
            };
        }

        if req.path == HEALTH_PATH {
            return match req.method {
                Method::Get | Method::Head => self.health.respond(),
                _ => Response::method_not_allowed("GET, HEAD"),
            };
        }

        Response::not_found()
    }
}

/// Bind a listener with `SO_REUSEADDR` and `TCP_NODELAY`
pub fn bind(addr: SocketAddr) -> std::io::Result<TcpListener> {
    let domain = if addr.is_ipv4() {
        Domain::IPV4
    } else {
        Domain::IPV6
    };

    let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))?;

    // SO_REUSEADDR - allow restart while old sockets sit in TIME_WAIT
    socket.set_reuse_address(true)?;
    socket.set_nodelay(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(1024)?;

    TcpListener::from_std(socket.into())
}

/// Counts open connections and tells them when to drain
#[derive(Debug)]
pub struct ConnectionTracker {
    active: AtomicU64,
    draining: watch::Sender<bool>,
}

impl Default for ConnectionTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionTracker {
    pub fn new() -> Self {
        let (draining, _) = watch::channel(false);
        Self {
            active: AtomicU64::new(0),
            draining,
        }
    }

    #[inline]
    pub fn increment(&self) {
        self.active.fetch_add(1, Ordering::SeqCst);
    }

    #[inline]
    pub fn decrement(&self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }

    #[inline]
    pub fn count(&self) -> u64 {
        self.active.load(Ordering::SeqCst)
    }

    pub fn start_shutdown(&self) {
        self.draining.send_replace(true);
    }

    /// Resolves once [`start_shutdown`](Self::start_shutdown) has been called,
    /// including when it was called before this future was created.
    pub fn draining(&self) -> impl Future<Output = ()> + Send + 'static {
        let mut rx = self.draining.subscribe();
        async move {
            let _ = rx.wait_for(|draining| *draining).await;
        }
    }

    /// Wait until no connections remain. Returns false on timeout.
    pub async fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while self.count() > 0 {
            if Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        true
    }
}

/// Accept connections until `shutdown` resolves, then drain. Connections
/// finish their in-flight request and close rather than waiting out
/// keep-alive.
pub async fn serve<F>(listener: TcpListener, app: Arc<App>, shutdown: F, drain_timeout: Duration)
where
    F: Future<Output = ()>,
{
    let tracker = Arc::new(ConnectionTracker::new());
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, peer) = match accepted {
                    Ok(conn) => conn,
                    Err(err) => {
                        tracing::warn!(error = %err, "accept failed");
                        continue;
                    }
                };

                tracker.increment();
                tokio::spawn(serve_connection(stream, peer, app.clone(), tracker.clone()));
            }
            _ = &mut shutdown => break,
        }
    }

    tracker.start_shutdown();
    app.health().set_ready(false);
    drop(listener);

    tracing::info!(active = tracker.count(), "draining connections");
    if !tracker.wait_idle(drain_timeout).await {
        tracing::warn!(active = tracker.count(), "drain timeout elapsed");
    }
}

async fn serve_connection(
    stream: tokio::net::TcpStream,
    peer: SocketAddr,
    app: Arc<App>,
    tracker: Arc<ConnectionTracker>,
) {
    tracing::debug!(%peer, "connection opened");
    let io = TokioIo::new(stream);
    let service = service_fn(move |req| {
        let app = app.clone();
        async move { Ok::<_, Infallible>(handle_request(app, req).await) }
    });

    let conn = http1::Builder::new().serve_connection(io, service);
    let draining = tracker.draining();
    tokio::pin!(conn);
    tokio::pin!(draining);

    let result = tokio::select! {
        res = conn.as_mut() => res,
        _ = &mut draining => {
            // idle connections close now, busy ones after the current response
            conn.as_mut().graceful_shutdown();
            conn.as_mut().await
        }
    };

    if let Err(err) = result {
        if !err.is_incomplete_message() {
            tracing::debug!(%peer, error = %err, "connection error");
        }
    }
    tracker.decrement();
}

/// Outcome of reading a request off the wire
enum Received {
    Complete(Request),
    /// Head parsed, body refused
    Refused(Request, Error),
}

async fn handle_request(
    app: Arc<App>,
    req: hyper::Request<Incoming>,
) -> hyper::Response<Full<Bytes>> {
    let start = Instant::now();
    let response = match read_request(app.body_limit(), req).await {
        Ok(Received::Complete(request)) => app.handle(request),
        Ok(Received::Refused(request, err)) => app.refuse(request, err),
        Err(unroutable) => unroutable,
    };
    tracing::trace!(elapsed_us = start.elapsed().as_micros() as u64, "response ready");
    to_hyper_response(response)
}

/// Convert a hyper request into ours, buffering the body up to the limit.
/// This is the only place the body limit is enforced.
async fn read_request(
    limit: BodyLimit,
    req: hyper::Request<Incoming>,
) -> Result<Received, Response> {
    let (parts, body) = req.into_parts();

    let method = Method::parse(parts.method.as_str()).map_err(|e| Response::from_error(&e))?;
    let mut request = Request::new(method, parts.uri.path());
    request.query = parts.uri.query().map(|s| s.to_string());
    for (name, value) in &parts.headers {
        if let Ok(v) = value.to_str() {
            request.headers.push((name.to_string(), v.to_string()));
        }
    }

    // GET/HEAD carry no payload
    if matches!(method, Method::Get | Method::Head) {
        return Ok(Received::Complete(request));
    }

    if let Err(err) = limit.check_declared(request.content_length()) {
        return Ok(Received::Refused(request, err));
    }

    match Limited::new(body, limit.max_size()).collect().await {
        Ok(collected) => {
            request.body = collected.to_bytes();
            Ok(Received::Complete(request))
        }
        Err(err) if err.downcast_ref::<LengthLimitError>().is_some() => {
            Ok(Received::Refused(request, limit.exceeded()))
        }
        Err(err) => {
            tracing::debug!(error = %err, "failed to read request body");
            let err = Error::MalformedInput("could not read request body".to_string());
            Ok(Received::Refused(request, err))
        }
    }
}

/// Convert our Response to a hyper Response
pub fn to_hyper_response(res: Response) -> hyper::Response<Full<Bytes>> {
    let mut builder = hyper::Response::builder().status(res.status);

    for (name, value) in &res.headers {
        builder = builder.header(name.as_str(), value.as_str());
    }

    match builder.body(Full::new(res.body)) {
        Ok(response) => response,
        Err(err) => {
            tracing::error!(error = %err, "invalid response parts");
            let body = Full::new(Bytes::from_static(b"Internal Server Error"));
            let mut fallback = hyper::Response::new(body);
            *fallback.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
            fallback
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sheetdrop_core::{BodyLimitConfig, RequestBuilder, ResponseBuilder};

    fn app() -> App {
        App::new(&ServerConfig::default())
    }

    #[test]
    fn test_export_route() {
        let req = RequestBuilder::new(Method::Post, "/export")
            .body(r#"[["Luke","Jedi"]]"#)
            .build();
        let res = app().handle(req);
        assert_eq!(res.status, StatusCode::OK);
        assert_eq!(res.body_string().unwrap(), "Luke;Jedi\n");
        assert!(res.header("x-request-id").is_some());
    }

    #[test]
    fn test_export_requires_post() {
        let res = app().handle(RequestBuilder::new(Method::Get, "/export").build());
        assert_eq!(res.status, StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(res.header("allow"), Some("POST"));
    }

    #[test]
    fn test_custom_export_path() {
        let config = ServerConfig {
            export_path: "/download".to_string(),
            ..ServerConfig::default()
        };
        let app = App::new(&config);
        let req = RequestBuilder::new(Method::Post, "/download").body("[]").build();
        assert_eq!(app.handle(req).status, StatusCode::OK);
        let req = RequestBuilder::new(Method::Post, "/export").body("[]").build();
        assert_eq!(app.handle(req).status, StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_health_route() {
        let app = app();
        let res = app.handle(RequestBuilder::new(Method::Get, "/health").build());
        assert_eq!(res.status, StatusCode::OK);

        app.health().set_ready(false);
        let res = app.handle(RequestBuilder::new(Method::Get, "/health").build());
        assert_eq!(res.status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_refused_body_goes_through_middleware() {
        let config = ServerConfig {
            body_limit: BodyLimitConfig::new(8),
            ..ServerConfig::default()
        };
        let app = App::new(&config);
        let limit = app.body_limit();

        let req = RequestBuilder::new(Method::Post, "/export")
            .header("content-length", "16")
            .build();
        let err = limit.check_declared(req.content_length()).unwrap_err();
        let res = app.refuse(req, err);
        assert_eq!(res.status, StatusCode::PAYLOAD_TOO_LARGE);
        assert!(res.header("content-disposition").is_none());
        assert!(res.header("x-request-id").is_some());
        assert!(res.body_string().unwrap().contains("\"received\":\"16B\""));

        let req = RequestBuilder::new(Method::Post, "/export")
            .header("x-request-id", "stream-1")
            .build();
        let res = app.refuse(req, limit.exceeded());
        assert_eq!(res.status, StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(res.header("x-request-id"), Some("stream-1"));
    }

    #[test]
    fn test_unreadable_body_is_400() {
        let req = RequestBuilder::new(Method::Post, "/export").build();
        let err = Error::MalformedInput("could not read request body".to_string());
        let res = app().refuse(req, err);
        assert_eq!(res.status, StatusCode::BAD_REQUEST);
        assert!(res.header("x-request-id").is_some());
    }

    #[test]
    fn test_unknown_path() {
        let res = app().handle(RequestBuilder::new(Method::Post, "/elsewhere").build());
        assert_eq!(res.status, StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_to_hyper_response() {
        let res = ResponseBuilder::new(StatusCode::OK)
            .header("content-disposition", "attachment; filename=\"data.csv\"")
            .body("a;b\n")
            .build();
        let hyper_res = to_hyper_response(res);
        assert_eq!(hyper_res.status(), http::StatusCode::OK);
        assert_eq!(
            hyper_res.headers()[http::header::CONTENT_DISPOSITION],
            "attachment; filename=\"data.csv\""
        );
    }

    #[test]
    fn test_non_ascii_filename_survives_conversion() {
        let req = RequestBuilder::new(Method::Post, "/export")
            .query("filename=%C3%A9quipe")
            .body("[]")
            .build();
        let hyper_res = to_hyper_response(app().handle(req));
        assert_eq!(hyper_res.status(), http::StatusCode::OK);
        assert_eq!(
            hyper_res.headers()[http::header::CONTENT_DISPOSITION],
            "attachment; filename=\"_quipe.csv\"; filename*=UTF-8''%C3%A9quipe.csv"
        );
    }

    #[test]
    fn test_invalid_header_falls_back_to_500() {
        let res = ResponseBuilder::new(StatusCode::OK)
            .header("bad header", "x")
            .build();
        assert_eq!(
            to_hyper_response(res).status(),
            http::StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn test_tracker_wait_idle() {
        let tracker = ConnectionTracker::new();
        assert!(tracker.wait_idle(Duration::from_millis(10)).await);
        tracker.increment();
        assert!(!tracker.wait_idle(Duration::from_millis(30)).await);
        tracker.decrement();
        assert_eq!(tracker.count(), 0);
    }

    #[tokio::test]
    async fn test_draining_signal() {
        let tracker = ConnectionTracker::new();
        let early = tracker.draining();

        let pending = tokio::time::timeout(Duration::from_millis(20), tracker.draining()).await;
        assert!(pending.is_err());

        tracker.start_shutdown();
        tokio::time::timeout(Duration::from_secs(1), early)
            .await
            .unwrap();
        // subscribers created after the signal see it as well
        tokio::time::timeout(Duration::from_secs(1), tracker.draining())
            .await
            .unwrap();
    }
}
