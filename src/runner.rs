//! Server lifecycle: listen, serve, shut down gracefully.
//!
//! ```text
//! Idle ─► Serving ─► ShuttingDown ─► Stopped
//!            │
//!            └─► Failed            (accept loop died)
//! ```
//!
//! # Graceful shutdown and Kubernetes
//!
//! When Kubernetes terminates a pod it sends **SIGTERM** and waits
//! `terminationGracePeriodSeconds` (default 30 s) before sending SIGKILL.
//!
//! The runner reacts by:
//! 1. Immediately stopping `listener.accept()`. No new connections are made.
//! 2. Asking every open connection to finish its in-flight request and close.
//! 3. Waiting up to [`Timeouts::shutdown`] for that to happen, then
//!    force-closing whatever is left.
//!
//! Keep `Timeouts::shutdown` below the pod's grace period.

use std::fs::File;
use std::future::Future;
use std::io::{self, BufReader};
use std::net::{Ipv4Addr, SocketAddr};
use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::Bytes;
use http_body::{Body as HttpBody, Frame, SizeHint};
use http_body_util::Full;
use hyper::body::Incoming;
use hyper_util::rt::{TokioExecutor, TokioIo, TokioTimer};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::Sleep;
use tokio_rustls::TlsAcceptor;
use tokio_rustls::rustls::ServerConfig;
use tracing::{debug, error, info, warn};

use crate::error::{BoxError, ServeError};
use crate::handler::{BoxFuture, RawHandler};
use crate::request::{Body, Request};

/// Port used by [`bind_from_env`] when `PORT` is unset.
pub const DEFAULT_PORT: u16 = 8080;

const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Server timeouts. Zero disables `read`, `read_header` and `write`; a zero
/// `shutdown` means the 10 s default.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Timeouts {
    /// Deadline for reading a request body, counted from when the handler
    /// receives the request.
    pub read: Duration,
    /// Deadline for reading the request head (HTTP/1). Falls back to `read`
    /// when zero.
    pub read_header: Duration,
    /// Deadline for the handler to produce its response. On expiry the
    /// connection is dropped.
    pub write: Duration,
    /// Grace period for in-flight requests once shutdown starts.
    pub shutdown: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            read: Duration::ZERO,
            read_header: Duration::ZERO,
            write: Duration::ZERO,
            shutdown: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }
}

impl Timeouts {
    fn grace_period(&self) -> Duration {
        if self.shutdown.is_zero() { DEFAULT_SHUTDOWN_TIMEOUT } else { self.shutdown }
    }

    fn header_deadline(&self) -> Duration {
        if self.read_header.is_zero() { self.read } else { self.read_header }
    }
}

/// Where a [`Runner`] is in its lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Serving,
    ShuttingDown,
    Stopped,
    Failed,
}

/// Serves a handler on a listener until a termination signal arrives.
///
/// ```rust,no_run
/// use plumb::{Config, Router, Runner, Timeouts, runner};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let router = Router::new(Config::default());
///     let listener = runner::bind_from_env().await?;
///     Runner::new(Timeouts::default()).run(listener, router).await?;
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct Runner {
    timeouts: Timeouts,
    state: watch::Sender<RunState>,
}

impl Runner {
    pub fn new(timeouts: Timeouts) -> Self {
        let (state, _) = watch::channel(RunState::Idle);
        Self { timeouts, state }
    }

    /// Observes state transitions.
    pub fn state(&self) -> watch::Receiver<RunState> {
        self.state.subscribe()
    }

    /// Serves plain HTTP until SIGINT or SIGTERM.
    pub async fn run(&self, listener: TcpListener, handler: impl Into<RawHandler>) -> Result<(), ServeError> {
        let signal = termination()?;
        self.run_until(listener, handler, signal).await
    }

    /// Serves HTTPS until SIGINT or SIGTERM.
    pub async fn run_tls(
        &self,
        listener: TcpListener,
        handler: impl Into<RawHandler>,
        tls: Arc<ServerConfig>,
    ) -> Result<(), ServeError> {
        let signal = termination()?;
        self.drive(listener, handler.into(), Some(TlsAcceptor::from(tls)), signal).await
    }

    /// Serves plain HTTP until `shutdown` resolves.
    pub async fn run_until<F>(
        &self,
        listener: TcpListener,
        handler: impl Into<RawHandler>,
        shutdown: F,
    ) -> Result<(), ServeError>
    where
        F: Future<Output = ()>,
    {
        self.drive(listener, handler.into(), None, shutdown).await
    }

    async fn drive<F>(
        &self,
        listener: TcpListener,
        handler: RawHandler,
        tls: Option<TlsAcceptor>,
        shutdown: F,
    ) -> Result<(), ServeError>
    where
        F: Future<Output = ()>,
    {
        let addr = listener.local_addr().map_err(ServeError::Bind)?;
        let (stop_tx, stop_rx) = watch::channel(false);
        let secure = tls.is_some();
        let server = Server { handler, timeouts: self.timeouts, tls };

        let mut serving = tokio::spawn(server.accept_loop(listener, stop_rx));
        self.state.send_replace(RunState::Serving);
        info!(%addr, tls = secure, "listening");

        tokio::pin!(shutdown);

        tokio::select! {
            biased;

            () = &mut shutdown => {}

            joined = &mut serving => {
                let result = joined.map_err(ServeError::from).and_then(|r| r);
                return self.finish(result);
            }
        }

        let grace = self.timeouts.grace_period();
        info!(grace = ?grace, "shutdown signal received, draining connections");
        self.state.send_replace(RunState::ShuttingDown);
        stop_tx.send_replace(true);

        let drained = tokio::time::timeout(grace, &mut serving).await;
        match drained {
            Ok(joined) => self.finish(joined.map_err(ServeError::from).and_then(|r| r)),
            Err(_) => {
                // Dropping the accept loop drops its JoinSet, which aborts
                // every connection task.
                serving.abort();
                match serving.await {
                    Err(e) if e.is_cancelled() => {
                        warn!(grace = ?grace, "graceful shutdown timed out, connections force-closed");
                        self.finish(Ok(()))
                    }
                    joined => self.finish(joined.map_err(ServeError::from).and_then(|r| r)),
                }
            }
        }
    }

    fn finish(&self, result: Result<(), ServeError>) -> Result<(), ServeError> {
        match &result {
            Ok(()) => {
                self.state.send_replace(RunState::Stopped);
                info!("server stopped");
            }
            Err(e) => {
                self.state.send_replace(RunState::Failed);
                error!(error = %e, "server failed");
            }
        }
        result
    }
}

/// [`Runner::run`] with default timeouts.
pub async fn run(listener: TcpListener, handler: impl Into<RawHandler>) -> Result<(), ServeError> {
    Runner::new(Timeouts::default()).run(listener, handler).await
}

/// [`Runner::run_tls`] with default timeouts.
pub async fn run_tls(
    listener: TcpListener,
    handler: impl Into<RawHandler>,
    tls: Arc<ServerConfig>,
) -> Result<(), ServeError> {
    Runner::new(Timeouts::default()).run_tls(listener, handler, tls).await
}

// ── Accept loop ───────────────────────────────────────────────────────────────

struct Server {
    handler: RawHandler,
    timeouts: Timeouts,
    tls: Option<TlsAcceptor>,
}

impl Server {
    async fn accept_loop(self, listener: TcpListener, mut stop: watch::Receiver<bool>) -> Result<(), ServeError> {
        let builder = self.conn_builder();
        let service = ConnService {
            handler: self.handler.clone(),
            read: self.timeouts.read,
            write: self.timeouts.write,
        };

        // Every connection task lives here, so dropping the set (on abort)
        // force-closes them all.
        let mut tasks = JoinSet::new();

        loop {
            tokio::select! {
                biased;

                _ = stop.changed() => break,

                accepted = listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(v) => v,
                        Err(e) if is_transient(&e) => {
                            warn!(error = %e, "failed to accept connection");
                            continue;
                        }
                        Err(e) => return Err(ServeError::Accept(e)),
                    };
                    self.spawn_connection(&mut tasks, stream, peer, &builder, &service, &stop);
                }

                Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
            }
        }

        drop(listener);
        info!(in_flight = tasks.len(), "stopped accepting, waiting for connections");
        while tasks.join_next().await.is_some() {}
        Ok(())
    }

    fn conn_builder(&self) -> ConnBuilder<TokioExecutor> {
        let mut builder = ConnBuilder::new(TokioExecutor::new());
        let header_deadline = self.timeouts.header_deadline();
        if !header_deadline.is_zero() {
            builder.http1().timer(TokioTimer::new()).header_read_timeout(header_deadline);
        }
        builder
    }

    fn spawn_connection(
        &self,
        tasks: &mut JoinSet<()>,
        stream: TcpStream,
        peer: SocketAddr,
        builder: &ConnBuilder<TokioExecutor>,
        service: &ConnService,
        stop: &watch::Receiver<bool>,
    ) {
        let builder = builder.clone();
        let service = service.clone();
        let stop = stop.clone();

        match &self.tls {
            None => {
                tasks.spawn(serve_conn(builder, TokioIo::new(stream), service, stop, peer));
            }
            Some(acceptor) => {
                let acceptor = acceptor.clone();
                tasks.spawn(async move {
                    match acceptor.accept(stream).await {
                        Ok(tls) => serve_conn(builder, TokioIo::new(tls), service, stop, peer).await,
                        Err(e) => debug!(%peer, error = %e, "tls handshake failed"),
                    }
                });
            }
        }
    }
}

/// Serves one connection, switching it to graceful shutdown once `stop` flips.
async fn serve_conn<I>(
    builder: ConnBuilder<TokioExecutor>,
    io: I,
    service: ConnService,
    mut stop: watch::Receiver<bool>,
    peer: SocketAddr,
) where
    I: hyper::rt::Read + hyper::rt::Write + Unpin + Send + 'static,
{
    let conn = builder.serve_connection(io, service);
    tokio::pin!(conn);

    let result = tokio::select! {
        res = conn.as_mut() => res,
        _ = stop.changed() => {
            conn.as_mut().graceful_shutdown();
            conn.as_mut().await
        }
    };

    if let Err(e) = result {
        debug!(%peer, error = %e, "connection closed with error");
    }
}

fn is_transient(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionRefused
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
            | io::ErrorKind::TimedOut
    )
}

// ── Per-request service ───────────────────────────────────────────────────────

#[derive(Clone)]
struct ConnService {
    handler: RawHandler,
    read: Duration,
    write: Duration,
}

impl hyper::service::Service<hyper::Request<Incoming>> for ConnService {
    type Response = http::Response<Full<Bytes>>;
    type Error = io::Error;
    type Future = BoxFuture<Result<Self::Response, Self::Error>>;

    fn call(&self, req: hyper::Request<Incoming>) -> Self::Future {
        let (head, body) = req.into_parts();
        let req = Request::from_parts(head, Body::new(DeadlineBody::new(body, self.read)));
        let handler = self.handler.clone();
        let write = self.write;

        Box::pin(async move {
            if write.is_zero() {
                return Ok(handler.call(req).await.into_http());
            }
            match tokio::time::timeout(write, handler.call(req)).await {
                Ok(res) => Ok(res.into_http()),
                Err(_) => {
                    warn!(timeout = ?write, "write timeout elapsed, dropping connection");
                    Err(io::Error::new(io::ErrorKind::TimedOut, "write timeout elapsed"))
                }
            }
        })
    }
}

/// A request body that fails once its read deadline passes.
struct DeadlineBody<B> {
    inner: B,
    deadline: Option<Pin<Box<Sleep>>>,
}

impl<B> DeadlineBody<B> {
    fn new(inner: B, timeout: Duration) -> Self {
        let deadline = (!timeout.is_zero()).then(|| Box::pin(tokio::time::sleep(timeout)));
        Self { inner, deadline }
    }
}

impl<B> HttpBody for DeadlineBody<B>
where
    B: HttpBody<Data = Bytes> + Unpin,
    B::Error: Into<BoxError>,
{
    type Data = Bytes;
    type Error = BoxError;

    fn poll_frame(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Result<Frame<Bytes>, BoxError>>> {
        let this = self.get_mut();
        if let Some(deadline) = this.deadline.as_mut() {
            if deadline.as_mut().poll(cx).is_ready() {
                let err = io::Error::new(io::ErrorKind::TimedOut, "request body read timed out");
                return Poll::Ready(Some(Err(err.into())));
            }
        }
        Pin::new(&mut this.inner).poll_frame(cx).map_err(Into::into)
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

// ── Signals, environment, TLS ─────────────────────────────────────────────────

/// Resolves on the first SIGINT or SIGTERM. Handlers are installed eagerly so
/// a signal arriving before the first poll is not lost.
fn termination() -> Result<impl Future<Output = ()>, ServeError> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut interrupt = signal(SignalKind::interrupt()).map_err(ServeError::Signal)?;
        let mut terminate = signal(SignalKind::terminate()).map_err(ServeError::Signal)?;
        Ok(async move {
            tokio::select! {
                _ = interrupt.recv() => info!(signal = "SIGINT", "termination signal"),
                _ = terminate.recv() => info!(signal = "SIGTERM", "termination signal"),
            }
        })
    }

    #[cfg(not(unix))]
    {
        Ok(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "cannot listen for ctrl-c, serving until killed");
                std::future::pending::<()>().await;
            }
        })
    }
}

/// Binds `0.0.0.0:$PORT`, or port 8080 when `PORT` is unset.
pub async fn bind_from_env() -> Result<TcpListener, ServeError> {
    let port = parse_port(std::env::var("PORT").ok())?;
    TcpListener::bind((Ipv4Addr::UNSPECIFIED, port)).await.map_err(ServeError::Bind)
}

fn parse_port(value: Option<String>) -> Result<u16, ServeError> {
    match value {
        None => Ok(DEFAULT_PORT),
        Some(raw) => raw.trim().parse().map_err(|_| ServeError::InvalidPort(raw)),
    }
}

/// Loads a PEM certificate chain and private key into a server config that
/// offers HTTP/2 and HTTP/1.1 over ALPN.
pub fn load_tls_config(cert: impl AsRef<Path>, key: impl AsRef<Path>) -> Result<Arc<ServerConfig>, ServeError> {
    let (cert, key) = (cert.as_ref(), key.as_ref());

    let certs = rustls_pemfile::certs(&mut open_pem(cert)?)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| tls_error(cert, e))?;
    if certs.is_empty() {
        return Err(ServeError::Tls(format!("{}: no certificates found", cert.display())));
    }

    let key = rustls_pemfile::private_key(&mut open_pem(key)?)
        .map_err(|e| tls_error(key, e))?
        .ok_or_else(|| ServeError::Tls(format!("{}: no private key found", key.display())))?;

    let mut config = ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| ServeError::Tls(e.to_string()))?;
    config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];
    Ok(Arc::new(config))
}

fn open_pem(path: &Path) -> Result<BufReader<File>, ServeError> {
    File::open(path).map(BufReader::new).map_err(|e| tls_error(path, e))
}

fn tls_error(path: &Path, e: io::Error) -> ServeError {
    ServeError::Tls(format!("{}: {e}", path.display()))
}
