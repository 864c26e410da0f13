//! REWIND CLI
//!
//! Key management and offline inspection of captures.

#![warn(missing_docs)]
#![warn(clippy::all)]

use clap::{Parser, Subcommand};
use color_eyre::Result;
use color_eyre::eyre::{WrapErr, eyre};
use rewind_capture::{Capture, CaptureTransport, DEFAULT_CACHE_DIR, RewindConfig, StoreTransport};
use rewind_core::CaptureId;
use rewind_crypto::{KeyPair, PrivateKey, PublicKey, decrypt, encrypt};
use rewind_replay::DecodedCapture;
use rewind_storage::{Budget, CaptureStore, FsCaptureStore};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "rewind")]
#[command(about = "REWIND - capture and replay production failures", long_about = None)]
struct Cli {
    /// Config file; ignored if it does not exist
    #[arg(short, long, global = true, default_value = "rewind.json")]
    config: PathBuf,
    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a pk_/sk_ key pair
    Keygen,
    /// Encrypt text with a public key
    Encrypt {
        /// `pk_…` key; defaults to the configured one
        #[arg(short, long)]
        key: Option<String>,
        /// Input file; stdin if absent
        #[arg(short, long)]
        input: Option<PathBuf>,
    },
    /// Decrypt ciphertext with a private key
    Decrypt {
        /// `sk_…` key; defaults to the configured one
        #[arg(short, long)]
        key: Option<String>,
        /// Input file; stdin if absent
        #[arg(short, long)]
        input: Option<PathBuf>,
    },
    /// Parse a capture limit
    Budget {
        /// Limit such as `"3 files"` or `"512kb"`
        limit: String,
    },
    /// List cached captures
    List,
    /// Decrypt a capture and print it
    Inspect {
        /// Capture file, or the id of a cached capture
        capture: String,
        /// `sk_…` key; defaults to the configured one
        #[arg(short, long)]
        key: Option<String>,
    },
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_config(path: &Path) -> Result<Option<RewindConfig>> {
    if !path.exists() {
        tracing::debug!(path = %path.display(), "no config file");
        return Ok(None);
    }
    Ok(Some(RewindConfig::load(path)?))
}

fn public_key(flag: Option<&str>, config: Option<&RewindConfig>) -> Result<PublicKey> {
    match (flag, config) {
        (Some(text), _) => Ok(PublicKey::parse(text)?),
        (None, Some(config)) => Ok(config.public_key()?),
        (None, None) => Err(eyre!("no public key: pass --key or set public_key in the config")),
    }
}

fn private_key(flag: Option<&str>, config: Option<&RewindConfig>) -> Result<PrivateKey> {
    match (flag, config) {
        (Some(text), _) => Ok(PrivateKey::parse(text)?),
        (None, Some(config)) => Ok(config.private_key()?),
        (None, None) => Err(eyre!("no private key: pass --key or set private_key in the config")),
    }
}

fn read_input(input: Option<&Path>) -> Result<String> {
    match input {
        Some(path) => std::fs::read_to_string(path)
            .wrap_err_with(|| format!("cannot read {}", path.display())),
        None => {
            let mut text = String::new();
            std::io::stdin().read_to_string(&mut text)?;
            Ok(text)
        }
    }
}

fn cache_dir(config: Option<&RewindConfig>) -> PathBuf {
    config.map_or_else(|| PathBuf::from(DEFAULT_CACHE_DIR), |c| c.cache_dir.clone())
}

async fn load_capture(reference: &str, config: Option<&RewindConfig>) -> Result<Capture> {
    if let Ok(id) = reference.parse::<CaptureId>() {
        let store = FsCaptureStore::open(cache_dir(config))?;
        return Ok(StoreTransport::new(Arc::new(store)).fetch(&id).await?);
    }
    let text = read_input(Some(Path::new(reference)))?;
    Ok(Capture::from_json(&text)?)
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    init_tracing(cli.json_logs);
    let config = load_config(&cli.config)?;

    match cli.command {
        Commands::Keygen => {
            let pair = KeyPair::generate()?;
            let keys = serde_json::json!({
                "public_key": pair.public_key_string()?,
                "private_key": pair.private_key_string()?.as_str(),
            });
            println!("{}", serde_json::to_string_pretty(&keys)?);
            Ok(())
        }
        Commands::Encrypt { key, input } => {
            let key = public_key(key.as_deref(), config.as_ref())?;
            let text = read_input(input.as_deref())?;
            println!("{}", encrypt(&key, &text)?);
            Ok(())
        }
        Commands::Decrypt { key, input } => {
            let key = private_key(key.as_deref(), config.as_ref())?;
            let text = read_input(input.as_deref())?;
            println!("{}", decrypt(&key, text.trim())?);
            Ok(())
        }
        Commands::Budget { limit } => {
            let budget = Budget::parse(&limit)?;
            println!("{budget}");
            Ok(())
        }
        Commands::List => {
            let store = FsCaptureStore::open(cache_dir(config.as_ref()))?;
            for id in store.list()? {
                println!("{id}");
            }
            Ok(())
        }
        Commands::Inspect { capture, key } => {
            let key = private_key(key.as_deref(), config.as_ref())?;
            let capture = load_capture(&capture, config.as_ref()).await?;
            let decoded = DecodedCapture::decode(&capture, &key)?;
            tracing::info!(
                capture_id = %capture.capture_id,
                invocations = capture.invocation_count(),
                "inspecting capture"
            );
            let report = serde_json::json!({
                "captureId": capture.capture_id.to_string(),
                "projectId": capture.project_id,
                "buildId": capture.build_id,
                "createdAt": capture.created_at.to_rfc3339(),
                "capture": decoded,
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use tempfile::TempDir;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_inspect() {
        let cli = Cli::try_parse_from(["rewind", "inspect", "cap.json", "--key", "sk_x"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Inspect { ref capture, key: Some(ref key) } if capture == "cap.json" && key == "sk_x"
        ));
        assert_eq!(cli.config, PathBuf::from("rewind.json"));
    }

    #[test]
    fn test_missing_config_is_none() {
        let dir = TempDir::new().unwrap();
        assert!(load_config(&dir.path().join("rewind.json")).unwrap().is_none());
        assert_eq!(cache_dir(None), PathBuf::from(DEFAULT_CACHE_DIR));
    }

    #[test]
    fn test_key_needs_flag_or_config() {
        assert!(public_key(None, None).is_err());
        assert!(private_key(Some("pk_wrong"), None).is_err());
        let config = RewindConfig::new("shop");
        assert!(public_key(None, Some(&config)).is_err());
    }

    #[tokio::test]
    async fn test_load_capture_from_cache() {
        let dir = TempDir::new().unwrap();
        let mut config = RewindConfig::new("shop");
        config.cache_dir = dir.path().to_path_buf();

        let err = load_capture(&CaptureId::new().to_string(), Some(&config)).await;
        assert!(err.is_err());
    }
}
