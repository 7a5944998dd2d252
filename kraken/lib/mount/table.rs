use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::Arc,
};

use axum::{
    body::Body,
    extract::Request,
    http::{header, uri::PathAndQuery, StatusCode, Uri},
    response::{IntoResponse, Response},
};
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};
use tokio::sync::RwLock;

use crate::{
    fileserver::{FileServer, FileServerFactory, Params},
    KrakenError, KrakenResult,
};

use super::{validate_source, validate_target};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// Bytes escaped when a decoded path is written back into a URI.
const PATH_ESCAPES: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Maps mount targets to the file servers backing them.
///
/// Lookups take a read lock and may run concurrently; [`MountTable::put`] and
/// [`MountTable::delete`] take the write lock only for the map update itself, so a request
/// dispatched after a mutation returns sees it, and a request already in flight keeps the file
/// server it resolved.
pub struct MountTable {
    /// Mount target to file server.
    mounts: RwLock<HashMap<String, Arc<dyn FileServer>>>,

    /// Creates the file server of each new mount.
    factory: Arc<dyn FileServerFactory>,
}

/// A snapshot of one mount.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountEntry {
    /// The URL path prefix.
    pub target: String,

    /// The directory served under the target.
    pub source: PathBuf,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl MountTable {
    /// Creates an empty mount table whose file servers come from `factory`.
    pub fn new(factory: Arc<dyn FileServerFactory>) -> Self {
        Self {
            mounts: RwLock::new(HashMap::new()),
            factory,
        }
    }

    /// Mounts `source` on `target`, replacing any previous mount of `target`.
    ///
    /// Returns true if `target` was already mounted.
    ///
    /// ## Errors
    /// * [`KrakenError::InvalidMountTarget`] if `target` is not `/` and lacks a leading `/` or has
    ///   a trailing one.
    /// * [`KrakenError::InvalidMountSource`] if `source` is not absolute.
    /// * [`KrakenError::SourceUnavailable`] if `source` does not exist or is not a directory.
    /// * Any error of the file server factory.
    pub async fn put(
        &self,
        target: &str,
        source: impl AsRef<Path>,
        kind: &str,
        params: &Params,
    ) -> KrakenResult<bool> {
        let source = source.as_ref();
        validate_target(target)?;
        validate_source(source)?;

        let metadata = tokio::fs::metadata(source)
            .await
            .map_err(|e| KrakenError::SourceUnavailable {
                source_path: source.to_path_buf(),
                source: e,
            })?;
        if !metadata.is_dir() {
            return Err(KrakenError::SourceUnavailable {
                source_path: source.to_path_buf(),
                source: std::io::Error::other("not a directory"),
            });
        }

        let server = self.factory.new_server(source, kind, params)?;
        let existed = self
            .mounts
            .write()
            .await
            .insert(target.to_string(), server)
            .is_some();

        tracing::info!(
            "mounted {} on {} ({})",
            source.display(),
            target,
            if existed { "replaced" } else { "new" }
        );

        Ok(existed)
    }

    /// Removes the mount of `target`. Returns true if it existed.
    pub async fn delete(&self, target: &str) -> bool {
        let existed = self.mounts.write().await.remove(target).is_some();
        if existed {
            tracing::info!("unmounted {}", target);
        }

        existed
    }

    /// Removes every mount and returns what was removed, ordered by target.
    pub async fn clear(&self) -> Vec<MountEntry> {
        let drained: Vec<_> = self.mounts.write().await.drain().collect();
        let mut entries: Vec<_> = drained
            .into_iter()
            .map(|(target, server)| MountEntry {
                target,
                source: server.root().to_path_buf(),
            })
            .collect();
        entries.sort_by(|a, b| a.target.cmp(&b.target));

        tracing::info!("unmounted {} targets", entries.len());
        entries
    }

    /// Returns the registered mount targets, sorted.
    ///
    /// The snapshot may be stale as soon as it is returned.
    pub async fn targets(&self) -> Vec<String> {
        let mut targets: Vec<_> = self.mounts.read().await.keys().cloned().collect();
        targets.sort();
        targets
    }

    /// Returns every mount, ordered by target.
    pub async fn entries(&self) -> Vec<MountEntry> {
        let mut entries: Vec<_> = self
            .mounts
            .read()
            .await
            .iter()
            .map(|(target, server)| MountEntry {
                target: target.clone(),
                source: server.root().to_path_buf(),
            })
            .collect();
        entries.sort_by(|a, b| a.target.cmp(&b.target));
        entries
    }

    /// Returns the source mounted on `target`, if any.
    pub async fn get_source(&self, target: &str) -> Option<PathBuf> {
        self.mounts
            .read()
            .await
            .get(target)
            .map(|server| server.root().to_path_buf())
    }

    /// Finds the longest mount target that prefixes `path`.
    ///
    /// Targets are keys of a map, so two matching targets can never have the same length: both
    /// being prefixes of `path`, they would be the same string.
    pub async fn resolve(&self, path: &str) -> Option<(String, Arc<dyn FileServer>)> {
        let mounts = self.mounts.read().await;
        let mut best: Option<(&String, &Arc<dyn FileServer>)> = None;
        for (target, server) in mounts.iter() {
            if !path.starts_with(target.as_str()) {
                continue;
            }

            match best {
                Some((current, _)) if current.len() > target.len() => {}
                Some((current, _)) => {
                    debug_assert_ne!(current.len(), target.len(), "ambiguous mount targets");
                    best = Some((target, server));
                }
                None => best = Some((target, server)),
            }
        }

        best.map(|(target, server)| (target.clone(), Arc::clone(server)))
    }

    /// Routes a request to the file server of the longest matching mount target.
    ///
    /// Targets are matched against the percent-decoded request path, so a target such as
    /// `/with space` is reached by `/with%20space/...`.
    ///
    /// * No matching target: `404 Not Found`.
    /// * The path is exactly a mount target other than `/`: `301 Moved Permanently` to the target
    ///   with a trailing `/`.
    /// * Otherwise the target is stripped from the path, unless it is `/`, and the request is
    ///   forwarded with the remainder encoded again.
    pub async fn dispatch(&self, mut request: Request) -> Response<Body> {
        let path = percent_decode_str(request.uri().path())
            .decode_utf8_lossy()
            .into_owned();
        let Some((target, server)) = self.resolve(&path).await else {
            tracing::debug!("no mount target for {}", path);
            return (
                StatusCode::NOT_FOUND,
                format!("{path}: mount target or file not found"),
            )
                .into_response();
        };

        if target != "/" {
            let rest = &path[target.len()..];
            if rest.is_empty() {
                let location = format!("{}/", utf8_percent_encode(&target, PATH_ESCAPES));
                return (StatusCode::MOVED_PERMANENTLY, [(header::LOCATION, location)])
                    .into_response();
            }

            match forwarded_uri(request.uri(), rest) {
                Ok(uri) => *request.uri_mut() = uri,
                Err(e) => {
                    tracing::debug!("cannot rewrite {} for {}: {}", path, target, e);
                    return (StatusCode::BAD_REQUEST, e.to_string()).into_response();
                }
            }
        }

        tracing::debug!("{} -> {} {}", path, target, request.uri().path());
        server.serve(request).await
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Replaces the path of `uri` with the decoded `path`, encoded again, keeping its query.
///
/// Targets match as plain string prefixes, so `/docs` also matches `/docsets`; the remainder is
/// then served as `/sets`, the same way a remainder that already starts with `/` is.
fn forwarded_uri(uri: &Uri, path: &str) -> KrakenResult<Uri> {
    let path = utf8_percent_encode(path, PATH_ESCAPES).to_string();
    let path = if path.starts_with('/') {
        path
    } else {
        format!("/{path}")
    };
    let path_and_query = match uri.query() {
        Some(query) => format!("{path}?{query}"),
        None => path,
    };

    let mut parts = uri.clone().into_parts();
    parts.path_and_query = Some(
        path_and_query
            .parse::<PathAndQuery>()
            .map_err(KrakenError::custom)?,
    );

    Uri::from_parts(parts).map_err(KrakenError::custom)
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl std::fmt::Debug for MountTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MountTable").finish_non_exhaustive()
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
