//! Hello Brno - a one-route demo HTTP server.
//!
//! The version and build date are fixed at compile time through the
//! `HELLO_BRNO_VERSION` and `HELLO_BRNO_BUILD_DATE` environment variables.

use std::ffi::OsString;
use std::future::Future;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{extract::State, response::Html, routing::any, Router};
use tokio::net::TcpListener;

/// Address the server listens on.
pub const LISTEN_ADDR: &str = "0.0.0.0:8080";

/// Version stamped in at build time.
pub const VERSION: &str = match option_env!("HELLO_BRNO_VERSION") {
    Some(version) => version,
    None => "dev",
};

/// Build date stamped in at build time.
pub const BUILD_DATE: &str = match option_env!("HELLO_BRNO_BUILD_DATE") {
    Some(date) => date,
    None => "unknown",
};

/// Build metadata shown by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildInfo {
    pub version: String,
    pub date: String,
}

impl BuildInfo {
    pub fn new(version: impl Into<String>, date: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            date: date.into(),
        }
    }

    /// Build info of the running binary.
    pub fn current() -> Self {
        Self::new(VERSION, BUILD_DATE)
    }

    /// Text printed by `-version`.
    pub fn banner(&self) -> String {
        format!(
            "Version    : {}\nBuild Date : {}\n",
            self.version, self.date
        )
    }

    /// HTML served on every request.
    pub fn greeting(&self) -> String {
        format!(
            "<h1>Hello Brno! <small>(version: {} - {})</small></h1>",
            self.version, self.date
        )
    }
}

/// Build the application router.
///
/// Every path is answered by the greeting handler.
pub fn router(info: BuildInfo) -> Router {
    Router::new()
        .route("/", any(hello))
        .fallback(hello)
        .with_state(Arc::new(info))
}

async fn hello(State(info): State<Arc<BuildInfo>>) -> Html<String> {
    Html(info.greeting())
}

/// Serve the router on `listener` until `shutdown` resolves.
///
/// Shutdown through `shutdown` is a normal exit; any other server error is
/// returned.
pub async fn serve<F>(listener: TcpListener, info: BuildInfo, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, router(info))
        .with_graceful_shutdown(shutdown)
        .await
        .context("Server error")
}

/// Accept Go-style single-dash long flags (`-version`).
pub fn normalize_args<I>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = OsString>,
{
    args.into_iter()
        .map(|arg| {
            if arg == "-version" {
                OsString::from("--version")
            } else {
                arg
            }
        })
        .collect()
}
