use std::sync::Arc;

use tokio::{
    net::TcpListener,
    sync::{mpsc, Mutex, RwLock},
    task::JoinSet,
};
use tokio_util::sync::CancellationToken;

use crate::{config::BindAddr, fileserver::FileServerFactory, KrakenError, KrakenResult};

use super::ServerInstance;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The registry of every server of the process.
///
/// Servers are added unstarted with [`ServerPool::add`]. [`ServerPool::run`] is the single place
/// that starts them: it starts the servers registered before it runs, then the ones handed to it
/// with [`ServerPool::start_server`], each on its own task.
pub struct ServerPool {
    /// Registered servers, in registration order.
    servers: RwLock<Vec<Arc<ServerInstance>>>,

    /// Creates the file servers of every mount of every server.
    factory: Arc<dyn FileServerFactory>,

    /// Hands servers to the run loop.
    start_tx: mpsc::UnboundedSender<Arc<ServerInstance>>,

    /// Taken by the run loop.
    start_rx: Mutex<Option<mpsc::UnboundedReceiver<Arc<ServerInstance>>>>,

    /// Stops the run loop.
    shutdown: CancellationToken,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl ServerPool {
    /// Creates an empty pool whose servers create file servers with `factory`.
    pub fn new(factory: Arc<dyn FileServerFactory>) -> Self {
        let (start_tx, start_rx) = mpsc::unbounded_channel();
        Self {
            servers: RwLock::new(Vec::new()),
            factory,
            start_tx,
            start_rx: Mutex::new(Some(start_rx)),
            shutdown: CancellationToken::new(),
        }
    }

    /// Returns the file server factory shared by the servers.
    pub fn factory(&self) -> &Arc<dyn FileServerFactory> {
        &self.factory
    }

    /// Registers a new, unstarted server for `addr`.
    ///
    /// The address is checked by binding it and releasing it immediately, so an unusable address
    /// is reported here rather than when the server starts. Callers must wait for
    /// [`ServerInstance::wait_started`] before relying on the port of the server.
    ///
    /// ## Errors
    /// * [`KrakenError::InvalidAddress`] if `addr` cannot be parsed.
    /// * [`KrakenError::PortAlreadyRegistered`] if a registered server owns the port.
    /// * [`KrakenError::Bind`] if the address cannot be bound.
    pub async fn add(&self, addr: &str) -> KrakenResult<Arc<ServerInstance>> {
        let bind_addr: BindAddr = addr.parse()?;
        let port = bind_addr.get_port();

        let mut servers = self.servers.write().await;
        if port != 0
            && servers
                .iter()
                .any(|s| s.port() == port || s.get_bind_addr().get_port() == port)
        {
            return Err(KrakenError::PortAlreadyRegistered(port));
        }

        check_addr(&bind_addr).await?;

        let server = Arc::new(ServerInstance::new(bind_addr, Arc::clone(&self.factory)));
        servers.push(Arc::clone(&server));
        tracing::info!("registered server for {}", server.get_bind_addr());

        Ok(server)
    }

    /// Returns the server bound to `port`.
    pub async fn get(&self, port: u16) -> Option<Arc<ServerInstance>> {
        if port == 0 {
            return None;
        }

        self.servers
            .read()
            .await
            .iter()
            .find(|s| s.port() == port)
            .cloned()
    }

    /// Returns the registered servers, in registration order.
    pub async fn list(&self) -> Vec<Arc<ServerInstance>> {
        self.servers.read().await.clone()
    }

    /// Closes the server bound to `port` and unregisters it.
    ///
    /// Returns false if no server is bound to `port`. If closing fails the server stays
    /// registered and the error is returned.
    pub async fn remove(&self, port: u16) -> KrakenResult<bool> {
        match self.get(port).await {
            Some(server) => self.remove_instance(&server).await,
            None => Ok(false),
        }
    }

    /// Closes and unregisters every server.
    ///
    /// Servers are closed one by one; a failure does not stop the others nor reopen the ones
    /// already closed. Returns the removed servers.
    ///
    /// ## Errors
    /// [`KrakenError::BulkOperation`] with one error per server that could not be removed.
    pub async fn remove_all(&self) -> KrakenResult<Vec<Arc<ServerInstance>>> {
        let mut removed = Vec::new();
        let mut errors = Vec::new();
        for server in self.list().await {
            match self.remove_instance(&server).await {
                Ok(true) => removed.push(server),
                Ok(false) => {}
                Err(e) => errors.push(e),
            }
        }

        if !errors.is_empty() {
            return Err(KrakenError::BulkOperation(errors));
        }

        Ok(removed)
    }

    /// Hands a registered server to the run loop, which starts it on its own task.
    ///
    /// Returns false if the server is not registered, is already running or was already handed
    /// over.
    pub async fn start_server(&self, server: &Arc<ServerInstance>) -> bool {
        if server.is_running() || !self.contains(server).await {
            return false;
        }

        if !server.mark_scheduled() {
            return false;
        }

        if self.start_tx.send(Arc::clone(server)).is_err() {
            tracing::error!(
                "cannot start server for {}: the pool is not running",
                server.get_bind_addr()
            );
            return false;
        }

        true
    }

    /// Starts every registered server, then every server handed over with
    /// [`ServerPool::start_server`], until [`ServerPool::shutdown`] is called.
    ///
    /// On shutdown every registered server is removed.
    ///
    /// ## Errors
    /// * [`KrakenError::PoolAlreadyRunning`] if called more than once.
    /// * [`KrakenError::BulkOperation`] if some servers could not be removed on shutdown.
    pub async fn run(&self) -> KrakenResult<()> {
        let mut start_rx = self
            .start_rx
            .lock()
            .await
            .take()
            .ok_or(KrakenError::PoolAlreadyRunning)?;

        let mut tasks = JoinSet::new();
        for server in self.list().await {
            if server.mark_scheduled() {
                tasks.spawn(Arc::clone(&server).listen_and_serve());
            }
        }

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                Some(server) = start_rx.recv() => {
                    tasks.spawn(server.listen_and_serve());
                }
                Some(result) = tasks.join_next(), if !tasks.is_empty() => match result {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => tracing::error!("server task failed: {}", e),
                    Err(e) => tracing::error!("server task panicked: {}", e),
                },
            }
        }

        tracing::info!("server pool shutting down");
        let result = self.remove_all().await;
        tasks.shutdown().await;

        result.map(|removed| {
            tracing::info!("server pool stopped {} servers", removed.len());
        })
    }

    /// Stops the run loop.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    async fn contains(&self, server: &Arc<ServerInstance>) -> bool {
        self.servers
            .read()
            .await
            .iter()
            .any(|s| Arc::ptr_eq(s, server))
    }

    /// Closes `server` and unregisters it.
    ///
    /// Unlike [`ServerPool::remove`] this also reaches servers that never bound. Returns false if
    /// `server` was not registered.
    pub async fn remove_instance(&self, server: &Arc<ServerInstance>) -> KrakenResult<bool> {
        server.close().await?;

        let mut servers = self.servers.write().await;
        let len = servers.len();
        servers.retain(|s| !Arc::ptr_eq(s, server));
        let removed = servers.len() != len;
        if removed {
            tracing::info!("removed server for {}", server.get_bind_addr());
        }

        Ok(removed)
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Binds `addr` and releases it at once.
async fn check_addr(addr: &BindAddr) -> KrakenResult<()> {
    let listener = TcpListener::bind(addr.to_string())
        .await
        .map_err(|e| KrakenError::bind(addr, e))?;
    drop(listener);
    Ok(())
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl std::fmt::Debug for ServerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerPool")
            .field("shutdown", &self.shutdown.is_cancelled())
            .finish_non_exhaustive()
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
