use std::{collections::BTreeMap, fmt, path::Path, sync::Arc};

use async_trait::async_trait;
use axum::{body::Body, extract::Request, response::Response};

use crate::KrakenResult;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Backend-specific parameters of a file server.
pub type Params = BTreeMap<String, String>;

//--------------------------------------------------------------------------------------------------
// Traits
//--------------------------------------------------------------------------------------------------

/// A handle able to serve HTTP requests rooted at a directory.
///
/// The request path handed to [`FileServer::serve`] is already relative to the mount target:
/// a request for `/docs/readme.txt` on a mount `/docs` reaches the backend as `/readme.txt`.
#[async_trait]
pub trait FileServer: fmt::Debug + Send + Sync + 'static {
    /// Returns the directory this file server is rooted at.
    fn root(&self) -> &Path;

    /// Serves a request.
    async fn serve(&self, request: Request) -> Response<Body>;
}

/// Creates file servers for a mount source.
pub trait FileServerFactory: Send + Sync + 'static {
    /// Creates a file server of the given backend type rooted at `root`.
    ///
    /// `root` has already been checked to be an existing directory.
    fn new_server(
        &self,
        root: &Path,
        kind: &str,
        params: &Params,
    ) -> KrakenResult<Arc<dyn FileServer>>;

    /// Returns the backend types this factory can create, in a stable order.
    fn types(&self) -> Vec<String>;
}
