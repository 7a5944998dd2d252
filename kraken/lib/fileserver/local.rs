use std::{
    path::{Component, Path, PathBuf},
    sync::Arc,
};

use async_trait::async_trait;
use axum::{
    body::Body,
    extract::Request,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tower_http::services::{ServeDir, ServeFile};

use crate::{KrakenError, KrakenResult};

use super::{FileServer, FileServerFactory, Params};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// Serves files and the `index.html` of directories.
pub const DEFAULT_FILE_SERVER: &str = "default";

/// Serves files only; directory requests are not found.
pub const RAW_FILE_SERVER: &str = "raw";

/// Whether directory requests serve their `index.html`. `true` or `false`.
pub const PARAM_INDEX: &str = "index";

/// Comma separated list of precompressed variants to look for: `gzip`, `br`, `deflate`, `zstd`.
pub const PARAM_PRECOMPRESSED: &str = "precompressed";

/// A file, relative to the mount source, served for paths that do not exist.
pub const PARAM_FALLBACK: &str = "fallback";

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Creates [`LocalFileServer`]s.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalFileServerFactory;

/// A file server for a directory of the local file system.
#[derive(Debug, Clone)]
pub struct LocalFileServer {
    root: PathBuf,
    service: LocalService,
}

#[derive(Debug, Clone)]
enum LocalService {
    Plain(ServeDir),
    WithFallback(ServeDir<ServeFile>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct LocalOptions {
    index: bool,
    precompressed: Vec<Encoding>,
    fallback: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Encoding {
    Gzip,
    Br,
    Deflate,
    Zstd,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl LocalFileServer {
    fn new(root: &Path, options: LocalOptions) -> Self {
        let mut dir = ServeDir::new(root).append_index_html_on_directories(options.index);
        for encoding in &options.precompressed {
            dir = match encoding {
                Encoding::Gzip => dir.precompressed_gzip(),
                Encoding::Br => dir.precompressed_br(),
                Encoding::Deflate => dir.precompressed_deflate(),
                Encoding::Zstd => dir.precompressed_zstd(),
            };
        }

        let service = match options.fallback {
            Some(fallback) => {
                LocalService::WithFallback(dir.fallback(ServeFile::new(root.join(fallback))))
            }
            None => LocalService::Plain(dir),
        };

        Self {
            root: root.to_path_buf(),
            service,
        }
    }
}

impl LocalOptions {
    fn from_params(kind: &str, params: &Params) -> KrakenResult<Self> {
        let mut options = match kind {
            "" | DEFAULT_FILE_SERVER => LocalOptions {
                index: true,
                precompressed: Vec::new(),
                fallback: None,
            },
            RAW_FILE_SERVER => LocalOptions {
                index: false,
                precompressed: Vec::new(),
                fallback: None,
            },
            other => return Err(KrakenError::UnknownBackendType(other.to_string())),
        };

        for (name, value) in params {
            match name.as_str() {
                PARAM_INDEX if kind != RAW_FILE_SERVER => {
                    options.index = value
                        .parse()
                        .map_err(|_| invalid_param(name, "expected `true` or `false`"))?;
                }
                PARAM_PRECOMPRESSED => {
                    options.precompressed = value
                        .split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(|s| {
                            Encoding::parse(s).ok_or_else(|| {
                                invalid_param(name, format!("unsupported encoding {s:?}"))
                            })
                        })
                        .collect::<KrakenResult<_>>()?;
                }
                PARAM_FALLBACK => options.fallback = Some(parse_fallback(name, value)?),
                _ => {
                    return Err(invalid_param(
                        name,
                        format!("not supported by {kind:?} file servers"),
                    ))
                }
            }
        }

        Ok(options)
    }
}

impl Encoding {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "gzip" => Some(Self::Gzip),
            "br" => Some(Self::Br),
            "deflate" => Some(Self::Deflate),
            "zstd" => Some(Self::Zstd),
            _ => None,
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

fn invalid_param(name: &str, reason: impl Into<String>) -> KrakenError {
    KrakenError::InvalidBackendParam {
        name: name.to_string(),
        reason: reason.into(),
    }
}

/// The fallback must stay inside the mount source.
fn parse_fallback(name: &str, value: &str) -> KrakenResult<PathBuf> {
    let path = PathBuf::from(value);
    let escapes = path
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    if value.is_empty() || escapes {
        return Err(invalid_param(
            name,
            format!("{value:?} is not a relative path inside the mount source"),
        ));
    }

    Ok(path)
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

#[async_trait]
impl FileServer for LocalFileServer {
    fn root(&self) -> &Path {
        &self.root
    }

    async fn serve(&self, request: Request) -> Response<Body> {
        let result = match self.service.clone() {
            LocalService::Plain(mut dir) => dir.try_call(request).await,
            LocalService::WithFallback(mut dir) => dir.try_call(request).await,
        };

        match result {
            Ok(response) => response.map(Body::new),
            Err(e) => {
                tracing::error!("error serving from {}: {}", self.root.display(), e);
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        }
    }
}

impl FileServerFactory for LocalFileServerFactory {
    fn new_server(
        &self,
        root: &Path,
        kind: &str,
        params: &Params,
    ) -> KrakenResult<Arc<dyn FileServer>> {
        let options = LocalOptions::from_params(kind, params)?;
        tracing::debug!(
            "creating {:?} file server for {}: {:?}",
            kind,
            root.display(),
            options
        );
        Ok(Arc::new(LocalFileServer::new(root, options)))
    }

    fn types(&self) -> Vec<String> {
        vec![DEFAULT_FILE_SERVER.to_string(), RAW_FILE_SERVER.to_string()]
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
