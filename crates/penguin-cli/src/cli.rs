//! Command-line and environment configuration.

use std::path::PathBuf;
use std::time::Duration;

use clap::builder::FalseyValueParser;
use clap::{ArgAction, Args, Parser, Subcommand};
use penguin_store::{RemoteConfig, StoreConfig};
use penguin_sync::{Credentials, DEFAULT_ENDPOINT, FetchConfig};

/// Cloud Run only allows writes under `/tmp`.
const CLOUD_RUN_MODEL_DIR: &str = "/tmp/model_cache";
const CLOUD_RUN_WRITABLE_DIR: &str = "/tmp";
const DEFAULT_LOG_FILE: &str = "prediction.log";

/// Cloud Run sets `K_SERVICE` on every instance.
pub fn on_cloud_run() -> bool {
    std::env::var_os("K_SERVICE").is_some_and(|v| !v.is_empty())
}

fn default_model_dir() -> PathBuf {
    model_dir_default(on_cloud_run())
}

fn model_dir_default(cloud_run: bool) -> PathBuf {
    if cloud_run {
        PathBuf::from(CLOUD_RUN_MODEL_DIR)
    } else {
        PathBuf::from("data")
    }
}

#[derive(Parser, Debug)]
#[command(name = "penguin", version, about = "Penguin species prediction service")]
pub struct Cli {
    #[command(flatten)]
    pub artifacts: ArtifactArgs,

    #[command(flatten)]
    pub fetch: FetchArgs,

    #[command(flatten)]
    pub log: LogArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve the prediction API over HTTP.
    Serve {
        #[arg(long, env = "HOST", default_value = "0.0.0.0")]
        host: String,
        #[arg(long, env = "PORT", default_value_t = 8080)]
        port: u16,
    },
    /// Predict the species for a single feature record.
    Predict {
        /// Feature record as inline JSON.
        #[arg(long, conflicts_with = "file", required_unless_present = "file")]
        json: Option<String>,
        /// Read the feature record from a JSON file.
        #[arg(long)]
        file: Option<PathBuf>,
    },
    /// Load (downloading if needed) the model artifacts and report where they came from.
    Fetch,
}

#[derive(Args, Debug)]
pub struct ArtifactArgs {
    /// Directory holding the model and metadata files.
    /// Defaults to `/tmp/model_cache` on Cloud Run.
    #[arg(long, env = "MODEL_DIR", default_value_os_t = default_model_dir(), global = true)]
    pub model_dir: PathBuf,

    #[arg(long, env = "MODEL_FILE", default_value = "model.json", global = true)]
    pub model_file: String,

    #[arg(long, env = "ENCODER_FILE", default_value = "encoder_info.json", global = true)]
    pub encoder_file: String,

    /// Download from object storage even when local copies exist.
    #[arg(long, global = true)]
    pub force_remote: bool,

    /// `FORCE_GCS` from the environment, read with the lenient flag syntax.
    #[arg(
        long = "force-gcs",
        env = "FORCE_GCS",
        hide = true,
        global = true,
        action = ArgAction::Set,
        default_value = "false",
        value_parser = parse_flag,
    )]
    pub force_gcs: bool,

    #[arg(long, env = "GCS_BUCKET_NAME", global = true)]
    pub bucket: Option<String>,

    #[arg(long, env = "GCS_MODEL_BLOB_NAME", global = true)]
    pub model_object: Option<String>,

    #[arg(long, env = "GCS_ENCODER_BLOB_NAME", global = true)]
    pub encoder_object: Option<String>,
}

#[derive(Args, Debug)]
pub struct FetchArgs {
    #[arg(long, env = "GCS_ENDPOINT", default_value = DEFAULT_ENDPOINT, global = true)]
    pub gcs_endpoint: String,

    /// Static OAuth bearer token. Without one, Application Default
    /// Credentials are used.
    #[arg(long, env = "GCS_ACCESS_TOKEN", hide_env_values = true, global = true)]
    pub gcs_token: Option<String>,

    /// Send no credentials at all (public buckets, emulators).
    #[arg(long, env = "GCS_ANONYMOUS", global = true, value_parser = FalseyValueParser::new())]
    pub gcs_anonymous: bool,

    #[arg(long, env = "FETCH_TIMEOUT_SECS", default_value_t = 30, global = true)]
    pub fetch_timeout_secs: u64,

    #[arg(long, env = "FETCH_ATTEMPTS", default_value_t = 3, global = true)]
    pub fetch_attempts: u32,
}

#[derive(Args, Debug)]
pub struct LogArgs {
    /// Also write logs to this file. Relative paths land under `/tmp` on Cloud Run.
    #[arg(long, env = "LOG_FILE_PATH", global = true)]
    pub log_file: Option<PathBuf>,

    /// Log to stderr only, overriding `--log-file`.
    #[arg(long, global = true)]
    pub no_log_file: bool,
}

impl LogArgs {
    /// Where the file sink writes, if anywhere.
    pub fn file_path(&self) -> Option<PathBuf> {
        self.resolve(on_cloud_run())
    }

    fn resolve(&self, cloud_run: bool) -> Option<PathBuf> {
        if self.no_log_file {
            return None;
        }
        let path = self
            .log_file
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_FILE));
        if cloud_run && path.is_relative() {
            Some(PathBuf::from(CLOUD_RUN_WRITABLE_DIR).join(path))
        } else {
            Some(path)
        }
    }
}

/// `1`, `true` and `yes` (any case) switch the flag on; anything else is off.
fn parse_flag(s: &str) -> Result<bool, String> {
    Ok(matches!(
        s.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes"
    ))
}

impl From<ArtifactArgs> for StoreConfig {
    fn from(args: ArtifactArgs) -> Self {
        StoreConfig {
            model_dir: args.model_dir,
            model_file: args.model_file,
            encoder_file: args.encoder_file,
            force_remote: args.force_remote || args.force_gcs,
            remote: RemoteConfig {
                bucket: args.bucket,
                model_object: args.model_object,
                encoder_object: args.encoder_object,
            },
        }
    }
}

impl From<FetchArgs> for FetchConfig {
    fn from(args: FetchArgs) -> Self {
        FetchConfig {
            endpoint: args.gcs_endpoint,
            credentials: credentials(args.gcs_token, args.gcs_anonymous),
            timeout: Duration::from_secs(args.fetch_timeout_secs),
            attempts: args.fetch_attempts,
            ..FetchConfig::default()
        }
    }
}

fn credentials(token: Option<String>, anonymous: bool) -> Credentials {
    match token.filter(|t| !t.is_empty()) {
        Some(token) => Credentials::Token(token),
        None if anonymous => Credentials::Anonymous,
        None => Credentials::Default,
    }
}
