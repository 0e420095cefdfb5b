//! S3 Uploadr - push objects, files and directory trees into S3 buckets
//!
//! Progress lines go to stdout, logs go to stderr.

use anyhow::Context;
use clap::{Parser, Subcommand};
use s3_uploadr::{config::Config, metrics, Uploader};
use std::io::Read;
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// S3 Uploadr - upload helper for S3-compatible object stores
#[derive(Parser, Debug)]
#[command(name = "s3-uploadr")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (defaults are used when omitted)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON
    #[arg(long)]
    json: bool,

    /// Fail when the bucket does not exist instead of skipping the upload
    #[arg(long)]
    should_raise: bool,

    /// Print a progress line for every file
    #[arg(short, long)]
    verbose: bool,

    /// Print upload metrics in Prometheus text format when done
    #[arg(long)]
    print_metrics: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Upload an in-memory payload under a key
    Object {
        bucket: String,
        key: String,
        /// Payload given inline
        #[arg(long, conflicts_with = "input")]
        data: Option<String>,
        /// Read the payload from a file (stdin when neither is given)
        #[arg(long)]
        input: Option<PathBuf>,
    },
    /// Upload a single file
    File {
        bucket: String,
        path: PathBuf,
        /// Destination key (file name when omitted)
        #[arg(long)]
        key: Option<String>,
    },
    /// Upload every visible file below a directory
    Dir {
        bucket: String,
        path: PathBuf,
        /// Key prefix for every uploaded file
        #[arg(long)]
        prefix: Option<String>,
        /// Drop the directory layout and put every file directly under the prefix
        #[arg(long)]
        flat: bool,
    },
}

fn init_logging(log_level: &str, json: bool) -> anyhow::Result<()> {
    let level = match log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    // RUST_LOG wins over --log-level
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.to_string().to_lowercase()));

    let builder = FmtSubscriber::builder()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_writer(std::io::stderr);

    if json {
        tracing::subscriber::set_global_default(builder.json().finish())?;
    } else {
        tracing::subscriber::set_global_default(builder.finish())?;
    }
    Ok(())
}

fn read_payload(data: Option<String>, input: Option<PathBuf>) -> anyhow::Result<Vec<u8>> {
    if let Some(data) = data {
        return Ok(data.into_bytes());
    }
    if let Some(input) = input {
        return std::fs::read(&input).with_context(|| format!("Failed to read {:?}", input));
    }

    let mut buf = Vec::new();
    std::io::stdin()
        .read_to_end(&mut buf)
        .context("Failed to read payload from stdin")?;
    Ok(buf)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level, args.json)?;

    info!("Starting S3 Uploadr v{}", s3_uploadr::VERSION);

    let mut config = match &args.config {
        Some(path) => {
            let config = Config::load(path)?;
            info!("Loaded configuration from {:?}", path);
            config
        }
        None => Config::default(),
    };
    config.should_raise |= args.should_raise;
    config.verbose |= args.verbose;
    config.validate()?;

    let uploader = Uploader::from_config(&config).await?;

    match args.command {
        Command::Object {
            bucket,
            key,
            data,
            input,
        } => {
            let payload = read_payload(data, input)?;
            match uploader.upload_object(&bucket, payload, &key).await? {
                Some(receipt) => println!("Uploaded {} bytes to s3://{}/{}", receipt.bytes, bucket, receipt.key),
                None => println!("Bucket {} does not exist, nothing uploaded", bucket),
            }
        }
        Command::File { bucket, path, key } => {
            let result = uploader.upload_file(&bucket, &path, key.as_deref()).await?;
            if uploader.verbose() {
                println!();
            }
            match result {
                Some(receipt) => println!("Uploaded {} bytes to s3://{}/{}", receipt.bytes, bucket, receipt.key),
                None => println!("Bucket {} does not exist, nothing uploaded", bucket),
            }
        }
        Command::Dir {
            bucket,
            path,
            prefix,
            flat,
        } => {
            let result = uploader
                .upload_directory(&bucket, &path, prefix.as_deref(), !flat)
                .await?;
            if uploader.verbose() {
                println!();
            }
            match result {
                Some(summary) => {
                    for key in summary.keys() {
                        println!("s3://{}/{}", bucket, key);
                    }
                    println!(
                        "Uploaded {} files ({} bytes) to s3://{}",
                        summary.len(),
                        summary.total_bytes(),
                        bucket
                    );
                }
                None => println!("Bucket {} does not exist, nothing uploaded", bucket),
            }
        }
    }

    if args.print_metrics {
        print!("{}", metrics::render());
    }

    Ok(())
}
