use std::{collections::HashMap, future::Future, sync::Arc};

use tokio::{
    sync::Mutex,
    task::{JoinError, JoinHandle},
};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The connections a server has accepted and not finished serving.
///
/// Each connection is served by its own task; closing the registry aborts every task, which
/// drops and so closes its socket.
#[derive(Debug, Default)]
pub(crate) struct ConnectionRegistry {
    inner: Mutex<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    closed: bool,
    next_id: u64,
    tasks: HashMap<u64, JoinHandle<()>>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl ConnectionRegistry {
    /// Spawns the task serving a connection and tracks it until it completes.
    ///
    /// Returns false, without spawning, once the registry is closed.
    pub(crate) async fn spawn<F>(self: &Arc<Self>, connection: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut inner = self.inner.lock().await;
        if inner.closed {
            return false;
        }

        let id = inner.next_id;
        inner.next_id += 1;

        // The lock is held until the handle is inserted, so the removal below always runs after.
        let registry = Arc::clone(self);
        let handle = tokio::spawn(async move {
            connection.await;
            registry.inner.lock().await.tasks.remove(&id);
        });
        inner.tasks.insert(id, handle);

        true
    }

    /// Returns the number of connections being served.
    pub(crate) async fn len(&self) -> usize {
        self.inner.lock().await.tasks.len()
    }

    /// Aborts every connection task and waits for them to finish.
    ///
    /// Connections spawned afterwards are refused. Returns the failures of tasks that panicked.
    pub(crate) async fn close_all(&self) -> Vec<JoinError> {
        let handles: Vec<_> = {
            let mut inner = self.inner.lock().await;
            inner.closed = true;
            inner.tasks.drain().map(|(_, handle)| handle).collect()
        };

        for handle in &handles {
            handle.abort();
        }

        futures::future::join_all(handles)
            .await
            .into_iter()
            .filter_map(Result::err)
            .filter(JoinError::is_panic)
            .collect()
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
