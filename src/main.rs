//! s3-multer - stream local files into S3 through the storage engine

use anyhow::Context;
use clap::{Parser, Subcommand};
use s3_multer::{
    config::Config,
    detect::auto_content_type,
    metrics,
    options::{RequestParts, StorageConfig},
    s3::S3Client,
    storage::{FileInfo, IncomingFile, ObjectRef, S3Storage, StorageEngine},
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// s3-multer - streaming S3 uploads with content sniffing
#[derive(Parser, Debug)]
#[command(name = "s3-multer")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Upload files and print one JSON result per file
    Upload {
        /// Form field name reported for each file
        #[arg(long, default_value = "file")]
        field: String,

        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Delete a previously uploaded object
    Remove {
        #[arg(long)]
        bucket: String,

        #[arg(long)]
        key: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // RUST_LOG wins over --log-level
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_writer(std::io::stderr)
        .json()
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting s3-multer v{}", s3_multer::VERSION);

    let config = Config::load(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    info!("Loaded configuration from {:?}", args.config);
    metrics::set_enabled(config.metrics.enabled);

    let client = Arc::new(S3Client::new(config.s3_client_config()).await?);
    let mut options = config.storage_options()?;
    // Local files carry no trustworthy type, so sniff unless configured.
    if options.content_type.is_none() {
        options.content_type = Some(auto_content_type());
    }
    let storage = S3Storage::new(StorageConfig::new(options)?, client);
    let req = cli_request(&args.command)?;

    match args.command {
        Command::Upload { field, files } => {
            for path in files {
                let info = file_info(&field, &path);
                let file = tokio::fs::File::open(&path)
                    .await
                    .with_context(|| format!("opening {}", path.display()))?;

                let outcome = storage
                    .handle_file(&req, IncomingFile::from_reader(info, file))
                    .await
                    .with_context(|| format!("uploading {}", path.display()))?;
                println!("{}", serde_json::to_string(&outcome)?);
            }
        }
        Command::Remove { bucket, key } => {
            storage
                .remove_file(&req, &ObjectRef { bucket, key })
                .await?;
            info!("Removed object");
        }
    }

    Ok(())
}

/// Request context handed to resolvers for CLI invocations.
fn cli_request(command: &Command) -> anyhow::Result<RequestParts> {
    let method = match command {
        Command::Upload { .. } => http::Method::POST,
        Command::Remove { .. } => http::Method::DELETE,
    };
    let (parts, ()) = http::Request::builder()
        .method(method)
        .uri("/")
        .header(http::header::USER_AGENT, format!("s3-multer/{}", s3_multer::VERSION))
        .body(())?
        .into_parts();
    Ok(parts)
}

/// The declared type is never trusted; it is reported as generic binary.
fn file_info(field: &str, path: &Path) -> FileInfo {
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned());
    FileInfo::new(field, name, s3_multer::options::DEFAULT_CONTENT_TYPE)
}
