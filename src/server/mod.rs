//! Listener lifecycle
//!
//! [`Server`] owns the dispatcher and the per-listener accept loops. Each
//! accepted connection gets TCP keep-alive probing, is served by hyper on
//! its own task, and is tracked so shutdown can drain in-flight requests
//! up to a deadline before forcibly closing whatever remains.

use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ConnectInfo;
use axum::Router;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper_util::rt::{TokioIo, TokioTimer};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{watch, Notify};
use tower_http::timeout::TimeoutLayer;

use crate::config::{ListenAddr, ServerConfig};
use crate::error::{Result, SiteError};
use crate::http::middleware::access_log;

/// Timeout tuning for a [`Server`]
#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// TCP keep-alive probe interval; also how long an idle keep-alive
    /// connection may wait before presenting its next request's headers
    /// (hyper runs one timer for both).
    pub idle_timeout: Duration,
    /// Per-request budget covering body read, dispatch, and response
    /// write, so a slow client cannot hold a request slot open.
    pub request_timeout: Duration,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(60),
            request_timeout: Duration::from_secs(1),
        }
    }
}

impl ServerOptions {
    pub fn from_config(config: &ServerConfig) -> Self {
        Self {
            idle_timeout: config.idle_timeout,
            request_timeout: config.request_timeout,
        }
    }
}

/// How a shutdown ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// Every in-flight request finished within the deadline
    Drained,
    /// The deadline elapsed and the remaining connections were closed
    DeadlineExceeded { forced: usize },
}

impl ShutdownOutcome {
    pub fn is_clean(&self) -> bool {
        matches!(self, ShutdownOutcome::Drained)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Running,
    Draining,
    Stopped,
}

/// HTTP server over one shared handler and any number of listeners
pub struct Server {
    app: Router,
    options: ServerOptions,
    phase: watch::Sender<Phase>,
    connections: Arc<ConnectionGauge>,
}

impl Server {
    /// Build a server around a finished dispatcher.
    ///
    /// The per-request timeout and the access-log wrapper are applied
    /// here, outermost, so every request on every listener is measured
    /// and bounded the same way.
    pub fn new(app: Router, options: ServerOptions) -> Self {
        let app = app
            .layer(TimeoutLayer::new(options.request_timeout))
            .layer(axum::middleware::from_fn(access_log));

        let (phase, _) = watch::channel(Phase::Running);

        Self {
            app,
            options,
            phase,
            connections: Arc::new(ConnectionGauge::default()),
        }
    }

    /// Bind a listener for `addr`.
    ///
    /// A bind failure is fatal to this listener and returned to the
    /// caller; listeners already serving are unaffected.
    pub async fn bind(&self, addr: &ListenAddr) -> Result<Listener> {
        let candidates = tokio::net::lookup_host((addr.host.as_str(), addr.port))
            .await
            .map_err(|source| SiteError::Bind {
                address: addr.to_string(),
                source,
            })?;

        let mut last_err = None;
        for candidate in candidates {
            if !addr.matches_family(&candidate) {
                continue;
            }
            match TcpListener::bind(candidate).await {
                Ok(listener) => return Ok(Listener { inner: listener }),
                Err(err) => last_err = Some(err),
            }
        }

        Err(SiteError::Bind {
            address: addr.to_string(),
            source: last_err.unwrap_or_else(|| {
                std::io::Error::new(
                    std::io::ErrorKind::AddrNotAvailable,
                    "no address matched the requested family",
                )
            }),
        })
    }

    /// Accept connections on `listener` until shutdown begins.
    ///
    /// Each accepted connection is served on its own task for its full
    /// lifetime. Transient accept errors are logged and the loop
    /// continues.
    pub async fn serve(&self, listener: Listener) -> Result<()> {
        let local = listener.local_addr()?;
        tracing::info!("serving HTTP requests on {}", local);

        let mut phase_rx = self.phase.subscribe();
        if *phase_rx.borrow_and_update() != Phase::Running {
            return Ok(());
        }

        loop {
            tokio::select! {
                accepted = listener.inner.accept() => {
                    match accepted {
                        Ok((stream, remote)) => self.spawn_connection(stream, remote),
                        Err(err) => tracing::error!("accept error on {}: {}", local, err),
                    }
                }
                changed = phase_rx.changed() => {
                    if changed.is_err() || *phase_rx.borrow_and_update() != Phase::Running {
                        break;
                    }
                }
            }
        }

        tracing::info!("listener on {} stopped accepting", local);
        Ok(())
    }

    /// Bind `addr` and serve it until shutdown.
    pub async fn listen(&self, addr: &ListenAddr) -> Result<()> {
        let listener = self.bind(addr).await?;
        self.serve(listener).await
    }

    fn spawn_connection(&self, stream: TcpStream, remote: SocketAddr) {
        if let Err(err) = configure_keepalive(&stream, self.options.idle_timeout) {
            tracing::debug!("failed to enable keep-alive for {}: {}", remote, err);
        }

        let service = ConnectionService {
            app: self.app.clone(),
            remote,
        };
        let guard = self.connections.add();
        let mut phase_rx = self.phase.subscribe();
        let idle_timeout = self.options.idle_timeout;

        tokio::spawn(async move {
            let _guard = guard;

            let io = TokioIo::new(stream);
            let mut builder = http1::Builder::new();
            builder
                .timer(TokioTimer::new())
                .header_read_timeout(idle_timeout)
                .keep_alive(true);
            let conn = builder.serve_connection(io, service);
            tokio::pin!(conn);

            // the phase may have advanced between accept and spawn
            match *phase_rx.borrow_and_update() {
                Phase::Stopped => return,
                Phase::Draining => conn.as_mut().graceful_shutdown(),
                Phase::Running => {}
            }

            loop {
                tokio::select! {
                    result = conn.as_mut() => {
                        if let Err(err) = result {
                            tracing::debug!("connection from {} ended with error: {}", remote, err);
                        }
                        break;
                    }
                    changed = phase_rx.changed() => {
                        if changed.is_err() {
                            if let Err(err) = conn.as_mut().await {
                                tracing::debug!("connection from {} ended with error: {}", remote, err);
                            }
                            break;
                        }
                        match *phase_rx.borrow_and_update() {
                            Phase::Draining => conn.as_mut().graceful_shutdown(),
                            // dropping the connection closes the socket
                            Phase::Stopped => break,
                            Phase::Running => {}
                        }
                    }
                }
            }
        });
    }

    /// Gracefully shut down.
    ///
    /// Stops accepting immediately, waits up to `deadline` for in-flight
    /// requests, then forcibly closes any connection still running.
    pub async fn shutdown(&self, deadline: Duration) -> ShutdownOutcome {
        tracing::info!("shutting down, draining connections for up to {:?}", deadline);
        self.phase.send_replace(Phase::Draining);

        let drained = tokio::time::timeout(deadline, self.connections.wait_idle())
            .await
            .is_ok();

        if drained {
            self.phase.send_replace(Phase::Stopped);
            tracing::info!("shutdown complete");
            return ShutdownOutcome::Drained;
        }

        let forced = self.connections.count();
        self.phase.send_replace(Phase::Stopped);
        tracing::warn!(
            "drain deadline exceeded, forcibly closing {} connection(s)",
            forced
        );
        ShutdownOutcome::DeadlineExceeded { forced }
    }

    /// Number of connections currently being served.
    pub fn active_connections(&self) -> usize {
        self.connections.count()
    }
}

/// A bound, not yet serving, listener
pub struct Listener {
    inner: TcpListener,
}

impl Listener {
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.inner.local_addr()
    }
}

/// Enable TCP keep-alive probing on an accepted socket so dead peers
/// (a client dropping off the network mid-download) are reclaimed.
fn configure_keepalive(stream: &TcpStream, interval: Duration) -> std::io::Result<()> {
    let sock = socket2::SockRef::from(stream);
    let keepalive = socket2::TcpKeepalive::new()
        .with_time(interval)
        .with_interval(interval);
    sock.set_tcp_keepalive(&keepalive)
}

#[derive(Default)]
struct ConnectionGauge {
    active: AtomicUsize,
    drained: Notify,
}

impl ConnectionGauge {
    fn add(self: &Arc<Self>) -> ConnectionGuard {
        self.active.fetch_add(1, Ordering::SeqCst);
        ConnectionGuard(Arc::clone(self))
    }

    fn count(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    async fn wait_idle(&self) {
        loop {
            let notified = self.drained.notified();
            if self.count() == 0 {
                return;
            }
            notified.await;
        }
    }
}

struct ConnectionGuard(Arc<ConnectionGauge>);

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        if self.0.active.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.0.drained.notify_waiters();
        }
    }
}

/// Per-connection hyper service: tags each request with the peer address
/// and hands it to the shared router.
#[derive(Clone)]
struct ConnectionService {
    app: Router,
    remote: SocketAddr,
}

impl hyper::service::Service<hyper::Request<Incoming>> for ConnectionService {
    type Response = axum::response::Response;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = std::result::Result<Self::Response, Self::Error>> + Send>>;

    fn call(&self, mut req: hyper::Request<Incoming>) -> Self::Future {
        req.extensions_mut().insert(ConnectInfo(self.remote));
        let req = req.map(axum::body::Body::new);
        let mut app = self.app.clone();
        Box::pin(async move {
            use tower::Service;
            app.call(req).await
        })
    }
}
