use std::{
    convert::Infallible,
    io,
    net::SocketAddr,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, OnceLock,
    },
    time::Duration,
};

use axum::body::Body;
use getset::Getters;
use hyper::{body::Incoming, server::conn::http1, service::service_fn, Request};
use hyper_util::rt::TokioIo;
use socket2::{SockRef, TcpKeepalive};
use tokio::{
    net::{TcpListener, TcpStream},
    sync::watch,
};
use tokio_util::sync::CancellationToken;

use crate::{
    config::{BindAddr, ACCEPT_ERROR_BACKOFF, CLOSE_TIMEOUT, TCP_KEEPALIVE},
    fileserver::FileServerFactory,
    mount::MountTable,
    KrakenError, KrakenResult,
};

use super::ConnectionRegistry;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The lifecycle of a [`ServerInstance`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstanceState {
    /// Created, not bound yet.
    Idle,

    /// Bound and accepting connections on the address.
    Running(SocketAddr),

    /// The bind failed.
    Failed {
        /// The kind of the bind error.
        kind: io::ErrorKind,

        /// The bind error message.
        message: String,
    },

    /// Closed; the listener has been released.
    Stopped,
}

/// One independently bound HTTP endpoint serving the mounts of its [`MountTable`].
///
/// An instance is created idle. [`ServerInstance::listen`] binds it, publishing the bound address
/// to [`ServerInstance::wait_started`] waiters, and [`ServerInstance::serve`] accepts connections
/// until [`ServerInstance::close`] is called. Closing does not drain: every accepted connection is
/// cut, whatever the state of its current request.
#[derive(Debug, Getters)]
#[getset(get = "pub with_prefix")]
pub struct ServerInstance {
    /// The address requested at creation.
    bind_addr: BindAddr,

    /// The mounts served by this instance.
    mounts: Arc<MountTable>,

    #[getset(skip)]
    local_addr: OnceLock<SocketAddr>,

    #[getset(skip)]
    state: watch::Sender<InstanceState>,

    #[getset(skip)]
    scheduled: AtomicBool,

    #[getset(skip)]
    shutdown: CancellationToken,

    #[getset(skip)]
    connections: Arc<ConnectionRegistry>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl ServerInstance {
    /// Creates an idle instance with an empty mount table.
    pub fn new(bind_addr: BindAddr, factory: Arc<dyn FileServerFactory>) -> Self {
        let (state, _) = watch::channel(InstanceState::Idle);
        Self {
            bind_addr,
            mounts: Arc::new(MountTable::new(factory)),
            local_addr: OnceLock::new(),
            state,
            scheduled: AtomicBool::new(false),
            shutdown: CancellationToken::new(),
            connections: Arc::new(ConnectionRegistry::default()),
        }
    }

    /// Returns the bound address, once bound.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr.get().copied()
    }

    /// Returns the bound port, or `0` while the instance is not bound.
    pub fn port(&self) -> u16 {
        self.local_addr().map_or(0, |addr| addr.port())
    }

    /// Returns the host the instance is bound to, or the requested host while unbound.
    pub fn bind_host(&self) -> String {
        match self.local_addr() {
            Some(addr) => addr.ip().to_string(),
            None => self.bind_addr.get_host().to_string(),
        }
    }

    /// Returns the current lifecycle state.
    pub fn state(&self) -> InstanceState {
        self.state.borrow().clone()
    }

    /// Returns true while the instance accepts connections.
    pub fn is_running(&self) -> bool {
        matches!(*self.state.borrow(), InstanceState::Running(_))
    }

    /// Returns the number of connections being served.
    pub async fn connection_count(&self) -> usize {
        self.connections.len().await
    }

    /// Marks the instance as handed to a task that will start it.
    ///
    /// Returns false if it already was.
    pub(crate) fn mark_scheduled(&self) -> bool {
        !self.scheduled.swap(true, Ordering::SeqCst)
    }

    /// Waits until the instance is bound and returns its address.
    ///
    /// ## Errors
    /// * [`KrakenError::StartTimeout`] if it is still not bound after `timeout`.
    /// * [`KrakenError::Bind`] if binding failed.
    /// * [`KrakenError::NotStarted`] if it was closed first.
    pub async fn wait_started(&self, timeout: Duration) -> KrakenResult<SocketAddr> {
        let mut state = self.state.subscribe();
        let started = tokio::time::timeout(
            timeout,
            state.wait_for(|s| !matches!(s, InstanceState::Idle)),
        )
        .await;

        let state = match started {
            Ok(Ok(state)) => state.clone(),
            Ok(Err(_)) => return Err(KrakenError::NotStarted(self.bind_addr.to_string())),
            Err(_) => return Err(KrakenError::StartTimeout(self.bind_addr.to_string())),
        };

        match state {
            InstanceState::Running(addr) => Ok(addr),
            InstanceState::Failed { kind, message } => Err(KrakenError::bind(
                &self.bind_addr,
                io::Error::new(kind, message),
            )),
            InstanceState::Idle | InstanceState::Stopped => {
                Err(KrakenError::NotStarted(self.bind_addr.to_string()))
            }
        }
    }

    /// Binds and serves until closed.
    pub async fn listen_and_serve(self: Arc<Self>) -> KrakenResult<()> {
        let listener = self.listen().await?;
        self.serve(listener).await
    }

    /// Binds the listener and signals waiters that the instance started.
    ///
    /// The started signal fires once: an instance can only be bound once. If the instance is
    /// closed before or while binding, the listener is dropped and nothing is signalled.
    pub async fn listen(&self) -> KrakenResult<TcpListener> {
        if self.shutdown.is_cancelled() {
            return Err(KrakenError::NotStarted(self.bind_addr.to_string()));
        }

        let listener = match TcpListener::bind(self.bind_addr.to_string()).await {
            Ok(listener) => listener,
            Err(e) => {
                tracing::error!("cannot bind server on {}: {}", self.bind_addr, e);
                self.state.send_replace(InstanceState::Failed {
                    kind: e.kind(),
                    message: e.to_string(),
                });
                return Err(KrakenError::bind(&self.bind_addr, e));
            }
        };

        // Closing while the bind was pending wins over starting.
        let local_addr = listener.local_addr()?;
        let mut bound_twice = false;
        let started = self.state.send_if_modified(|state| {
            if self.shutdown.is_cancelled() {
                return false;
            }
            if self.local_addr.set(local_addr).is_err() {
                bound_twice = true;
                return false;
            }
            *state = InstanceState::Running(local_addr);
            true
        });

        if bound_twice {
            return Err(KrakenError::custom(anyhow::anyhow!(
                "server {} is already bound",
                self.bind_addr
            )));
        }

        if !started {
            drop(listener);
            tracing::info!("server on {} closed before it started", self.bind_addr);
            return Err(KrakenError::NotStarted(self.bind_addr.to_string()));
        }

        tracing::info!("server listening on {}", local_addr);

        Ok(listener)
    }

    /// Accepts connections on `listener` and serves them until the instance is closed.
    ///
    /// The listener is dropped, and so closed, before the instance reports it stopped.
    pub async fn serve(&self, listener: TcpListener) -> KrakenResult<()> {
        loop {
            tokio::select! {
                biased;

                _ = self.shutdown.cancelled() => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => self.accept(stream, peer).await,
                    Err(e) => {
                        tracing::warn!("accept error on {}: {}", self.bind_addr, e);
                        tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                    }
                },
            }
        }

        drop(listener);
        self.state.send_replace(InstanceState::Stopped);
        tracing::info!("server on {} stopped accepting connections", self.bind_addr);

        Ok(())
    }

    /// Stops accepting connections and cuts every accepted connection.
    ///
    /// In-flight responses are abandoned. Closing an instance that never started only prevents
    /// it from starting.
    ///
    /// ## Errors
    /// [`KrakenError::InstanceClose`] if the accept loop does not release the listener in time or
    /// a connection task panicked. The instance is then in an indeterminate state.
    pub async fn close(&self) -> KrakenResult<()> {
        self.shutdown.cancel();

        if self.is_running() {
            let mut state = self.state.subscribe();
            let released = tokio::time::timeout(
                CLOSE_TIMEOUT,
                state.wait_for(|s| !matches!(s, InstanceState::Running(_))),
            )
            .await;
            if !matches!(released, Ok(Ok(_))) {
                return Err(KrakenError::instance_close(
                    self.local_addr(),
                    "the listener was not released",
                ));
            }
        }

        let failures = self.connections.close_all().await;
        if !failures.is_empty() {
            let reasons: Vec<_> = failures.iter().map(ToString::to_string).collect();
            return Err(KrakenError::instance_close(
                self.local_addr(),
                reasons.join("; "),
            ));
        }

        if !matches!(self.state(), InstanceState::Failed { .. }) {
            self.state.send_replace(InstanceState::Stopped);
        }

        tracing::info!("closed server on {}", self.bind_addr);
        Ok(())
    }

    async fn accept(&self, stream: TcpStream, peer: SocketAddr) {
        if let Err(e) =
            SockRef::from(&stream).set_tcp_keepalive(&TcpKeepalive::new().with_time(TCP_KEEPALIVE))
        {
            tracing::debug!("cannot enable keep-alive for {}: {}", peer, e);
        }

        let mounts = Arc::clone(&self.mounts);
        let service = service_fn(move |request: Request<Incoming>| {
            let mounts = Arc::clone(&mounts);
            async move { Ok::<_, Infallible>(mounts.dispatch(request.map(Body::new)).await) }
        });

        let spawned = self
            .connections
            .spawn(async move {
                if let Err(e) = http1::Builder::new()
                    .serve_connection(TokioIo::new(stream), service)
                    .await
                {
                    tracing::debug!("error serving connection from {}: {}", peer, e);
                }
            })
            .await;

        if spawned {
            tracing::debug!("accepted connection from {}", peer);
        } else {
            tracing::debug!("refused connection from {}: server is closing", peer);
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
