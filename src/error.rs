// error.rs — 各模块的错误类型

use thiserror::Error;

/// Failures while fetching or decoding a texture.
#[derive(Error, Debug)]
pub enum AssetError {
    #[error("empty asset url")]
    EmptyUrl,
    #[error("unsupported asset url: {0}")]
    UnsupportedUrl(String),
    #[error("failed to read {url}: {source}")]
    Io {
        url: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to decode {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: image::ImageError,
    },
    #[error("no loader registered for {0}")]
    Missing(String),
}

#[derive(Error, Debug)]
pub enum TourError {
    #[error("failed to read tour file: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid tour json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("tour has no scenes")]
    Empty,
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid config json: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum XrError {
    #[error("immersive sessions are not supported on this device")]
    Unsupported,
    #[error("immersive session request was denied")]
    Denied,
    #[error("xr runtime error: {0}")]
    Runtime(String),
}
