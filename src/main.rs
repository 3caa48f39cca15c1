//! hashdrop server binary.
//!
//! A small content-addressed upload server: files arrive as multipart form
//! fields or base64 image payloads, are deduplicated by their SHA-256 digest,
//! and are served back through a static file route under the configured URL
//! prefix. The main entry point builds the Axum router and starts the HTTP
//! listener.

mod auth;
mod config;
mod dataurl;
mod error;
mod http;
mod logging;
mod storage;
mod upload;
mod version;

use axum::extract::{DefaultBodyLimit, Extension, connect_info::ConnectInfo};
use axum::http::Request;
use axum::routing::{get, post};
use axum::{Router, middleware};
use axum_server::Handle;
use clap::Parser;
use shadow_rs::shadow;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tower_http::services::ServeDir;
use tower_http::trace::{DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::{Level, info, info_span};

use crate::config::Args;
use crate::http::build_cors_layer;
use crate::storage::Storage;
use crate::upload::UploadOptions;

shadow!(build);

/// Starts the hashdrop server and blocks until shutdown.
#[tokio::main]
async fn main() -> Result<(), std::io::Error> {
    logging::init_logging();

    let args = Args::parse();
    let storage = Arc::new(Storage::new(
        PathBuf::from(&args.storage_dir),
        args.uri_prefix.clone(),
    ));
    storage.ensure_base().await?;
    let upload_options = Arc::new(UploadOptions {
        default_sub_dir: args.sub_dir.clone(),
    });

    let mut app = Router::new()
        .route("/v1/upload", post(upload::upload_multipart))
        .route("/v1/upload/base64", post(upload::upload_base64))
        .route("/v1/version", get(version::get_version_info));

    // Stored files are retrievable under the same prefix that publicPath uses.
    let static_prefix = format!("/{}", args.uri_prefix.trim_matches('/'));
    if static_prefix.len() > 1 {
        app = app.nest_service(
            &static_prefix,
            ServeDir::new(storage.base_path().to_path_buf()),
        );
    }

    let mut app = app
        .layer(middleware::from_fn(auth::auth_middleware))
        .layer(middleware::from_fn(http::add_security_headers))
        .layer(DefaultBodyLimit::max(args.upload_max_size as usize))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &Request<_>| {
                    let forwarded_ip = request
                        .headers()
                        .get("x-forwarded-for")
                        .and_then(|v| v.to_str().ok())
                        .map(|s| s.split(',').next().unwrap_or("").trim().to_string());
                    let connect_ip = request
                        .extensions()
                        .get::<ConnectInfo<SocketAddr>>()
                        .map(|ConnectInfo(addr)| addr.to_string());
                    let client_ip = forwarded_ip
                        .or(connect_ip)
                        .unwrap_or_else(|| "unknown".to_string());

                    info_span!(
                        env!("CARGO_CRATE_NAME"),
                        client_ip,
                        method = ?request.method(),
                        path = ?request.uri().path(),
                    )
                })
                .on_request(DefaultOnRequest::new().level(Level::DEBUG))
                .on_response(DefaultOnResponse::new().level(Level::DEBUG)),
        )
        .layer(Extension(storage))
        .layer(Extension(upload_options));

    if let Some(cors_layer) = build_cors_layer(args.cors_origins.as_deref()) {
        app = app.layer(cors_layer);
    }

    let host = args
        .host
        .parse::<IpAddr>()
        .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidInput, err.to_string()))?;
    let http_addr = SocketAddr::new(host, args.http_port);
    let handle = Handle::new();

    info!("starting HTTP server at {}", http_addr);

    let server = axum_server::bind(http_addr)
        .handle(handle.clone())
        .serve(app.into_make_service_with_connect_info::<SocketAddr>());

    tokio::select! {
        result = server => result?,
        _ = shutdown_signal(handle) => {}
    }

    Ok(())
}

async fn shutdown_signal(handle: Handle) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Received termination signal shutting down");
    handle.graceful_shutdown(Some(Duration::from_secs(10)));
}
