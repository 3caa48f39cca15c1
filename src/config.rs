//! CLI arguments and server configuration defaults.

use clap::Parser;
use shadow_rs::formatcp;

use crate::build;

const VERSION_INFO: &str = formatcp!(
    r#"{}\ncommit_hash: {}\nbuild_time: {}\nbuild_env: {},{}"#,
    build::PKG_VERSION,
    build::SHORT_COMMIT,
    build::BUILD_TIME,
    build::RUST_VERSION,
    build::RUST_CHANNEL
);

pub const SUB_DIRECTORY_HEADER: &str = "x-sub-directory";
pub const MULTIPART_FIELD_SINGLE: &str = "file";
pub const MULTIPART_FIELD_MULTIPLE: &str = "files";
pub const DEFAULT_STORAGE_DIR: &str = "uploads";
pub const DEFAULT_URI_PREFIX: &str = "/static";
pub const DEFAULT_SUB_DIR: &str = "default";
pub const DEFAULT_UPLOAD_MAX_SIZE: u64 = 32 * 1024 * 1024;

/// CLI arguments and environment configuration for the server.
#[derive(Parser, Debug)]
#[command(name = "hashdrop", version = VERSION_INFO, about = "Content-addressed upload server")]
pub struct Args {
    #[arg(
        short = 's',
        long,
        env = "HASHDROP_STORAGE_DIR",
        default_value = DEFAULT_STORAGE_DIR,
        help = "Base storage directory for uploaded files"
    )]
    pub storage_dir: String,
    #[arg(
        short = 'u',
        long,
        env = "HASHDROP_URI_PREFIX",
        default_value = DEFAULT_URI_PREFIX,
        help = "Public URL prefix under which stored files are served"
    )]
    pub uri_prefix: String,
    #[arg(
        long,
        env = "HASHDROP_SUB_DIR",
        default_value = DEFAULT_SUB_DIR,
        help = "Default sub directory when the request carries none"
    )]
    pub sub_dir: String,
    #[arg(
        short = 'b',
        long,
        env = "HASHDROP_BIND",
        default_value = "0.0.0.0",
        help = "Bind address for HTTP"
    )]
    pub host: String,
    #[arg(
        short = 'p',
        long,
        env = "HASHDROP_HTTP_PORT",
        default_value_t = 7878,
        help = "HTTP port"
    )]
    pub http_port: u16,
    #[arg(
        long,
        env = "HASHDROP_UPLOAD_MAX_SIZE",
        default_value_t = DEFAULT_UPLOAD_MAX_SIZE,
        help = "Max upload body size in bytes"
    )]
    pub upload_max_size: u64,
    #[arg(long, env = "HASHDROP_CORS_ORIGINS", help = "Comma separated CORS origins")]
    pub cors_origins: Option<String>,
}
