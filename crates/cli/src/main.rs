//! VDR registry command line interface
//!
//! Manages encrypted key files, reads and writes registry records through a
//! ledger node, and converts records between JSON and their wire encoding.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;
use tracing_subscriber::EnvFilter;
use vdr_registry::{
    decode_record, encode_record, ClientConfig, Did, KeyHandle, KeyManager, Record,
    RecordContent, RecordKind, Registry,
};

const PASSWORD_ENV: &str = "VDR_KEY_PASSWORD";

#[derive(Parser)]
#[command(name = "vdr-cli")]
#[command(about = "VDR registry command line interface", long_about = None)]
#[command(version)]
struct Cli {
    /// Client configuration file (TOML, YAML or JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// JSON-RPC endpoint URL, overrides the configuration
    #[arg(long, alias = "rpc", global = true)]
    rpc_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Key file operations
    Key {
        #[command(subcommand)]
        action: KeyCommands,
    },
    /// Registry record operations
    Did {
        #[command(subcommand)]
        action: DidCommands,
    },
    /// Offline record encoding
    Record {
        #[command(subcommand)]
        action: RecordCommands,
    },
    /// Show the chain id and block height of the node
    Node,
}

#[derive(Subcommand)]
enum KeyCommands {
    /// Generate a new key and write it to an encrypted key file
    Generate {
        /// Destination path; must not exist
        #[arg(long, value_name = "PATH")]
        out: PathBuf,
        /// Key file password (can also be provided via VDR_KEY_PASSWORD)
        #[arg(long)]
        password: Option<String>,
    },
    /// Print the address controlled by a key file
    Address(KeyArgs),
}

#[derive(Args)]
struct KeyArgs {
    /// Encrypted key file
    #[arg(long, value_name = "PATH")]
    key: PathBuf,
    /// Key file password (can also be provided via VDR_KEY_PASSWORD)
    #[arg(long)]
    password: Option<String>,
}

#[derive(Args)]
struct ContentArgs {
    /// Record content as inline JSON
    #[arg(long, conflicts_with = "content_file")]
    content: Option<String>,
    /// Path to a JSON file holding the record content
    #[arg(long, value_name = "PATH")]
    content_file: Option<PathBuf>,
}

#[derive(Subcommand)]
enum DidCommands {
    /// Register a new record owned by the key
    Register {
        did: Did,
        #[arg(long, value_enum, default_value = "did-document")]
        kind: KindArg,
        #[command(flatten)]
        content: ContentArgs,
        #[command(flatten)]
        key: KeyArgs,
    },
    /// Resolve the current version of a record
    Resolve {
        did: Did,
        /// Fail with a stale read unless the node has reached this block
        #[arg(long)]
        min_block: Option<u64>,
    },
    /// Replace the content of a record
    Update {
        did: Did,
        #[command(flatten)]
        content: ContentArgs,
        #[command(flatten)]
        key: KeyArgs,
    },
    /// Revoke a record
    Revoke {
        did: Did,
        #[command(flatten)]
        key: KeyArgs,
    },
}

#[derive(Subcommand)]
enum RecordCommands {
    /// Encode a JSON record into hex wire bytes
    Encode {
        /// Record JSON, or `-` to read standard input
        json: String,
    },
    /// Decode hex wire bytes into a JSON record
    Decode {
        /// Hex-encoded record, with or without `0x`
        hex: String,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum KindArg {
    DidDocument,
    Schema,
    CredentialDefinition,
    RevocationRegistryEntry,
}

impl From<KindArg> for RecordKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::DidDocument => RecordKind::DidDocument,
            KindArg::Schema => RecordKind::Schema,
            KindArg::CredentialDefinition => RecordKind::CredentialDefinition,
            KindArg::RevocationRegistryEntry => RecordKind::RevocationRegistryEntry,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    let cli = Cli::parse();
    match cli.command {
        Commands::Key { action } => handle_key_commands(action),
        Commands::Record { action } => handle_record_commands(action),
        Commands::Did { action } => {
            let config = load_config(cli.config.as_deref(), cli.rpc_url)?;
            handle_did_commands(action, &config).await
        }
        Commands::Node => {
            let config = load_config(cli.config.as_deref(), cli.rpc_url)?;
            handle_node_command(&config).await
        }
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: Option<&Path>, rpc_url: Option<String>) -> Result<ClientConfig> {
    let mut config = ClientConfig::load(path).context("failed to load client configuration")?;
    if let Some(url) = rpc_url {
        config.endpoint_url = url;
    }
    config.validate()?;
    debug!(endpoint = %config.endpoint_url, chain_id = config.chain_id, "client configured");
    Ok(config)
}

fn handle_key_commands(cmd: KeyCommands) -> Result<()> {
    let keys = KeyManager::new();
    match cmd {
        KeyCommands::Generate { out, password } => {
            let password = resolve_password(password)?;
            let handle = keys
                .generate_to_file(&out, &password)
                .with_context(|| format!("failed to write key file {}", out.display()))?;
            println!("{}", keys.address(&handle)?);
        }
        KeyCommands::Address(args) => {
            let handle = unlock(&keys, args)?;
            println!("{}", keys.address(&handle)?);
        }
    }
    Ok(())
}

async fn handle_did_commands(cmd: DidCommands, config: &ClientConfig) -> Result<()> {
    let registry = Registry::new(config, KeyManager::new())?;

    let record = match cmd {
        DidCommands::Register {
            did,
            kind,
            content,
            key,
        } => {
            let signer = unlock(registry.keys(), key)?;
            let content = read_content(content)?;
            registry.register(&did, kind.into(), content, &signer).await?
        }
        DidCommands::Resolve { did, min_block } => match min_block {
            Some(block) => registry.resolve_at(&did, block).await?,
            None => registry.resolve(&did).await?,
        },
        DidCommands::Update { did, content, key } => {
            let signer = unlock(registry.keys(), key)?;
            let content = read_content(content)?;
            registry.update(&did, content, &signer).await?
        }
        DidCommands::Revoke { did, key } => {
            let signer = unlock(registry.keys(), key)?;
            registry.revoke(&did, &signer).await?
        }
    };

    print_record(&record)
}

async fn handle_node_command(config: &ClientConfig) -> Result<()> {
    let registry = Registry::new(config, KeyManager::new())?;
    let client = registry.client();
    let info = serde_json::json!({
        "endpoint": config.endpoint_url,
        "chain_id": client.chain_id().await?,
        "block_number": client.block_number().await?,
    });
    println!("{}", serde_json::to_string_pretty(&info)?);
    Ok(())
}

fn handle_record_commands(cmd: RecordCommands) -> Result<()> {
    match cmd {
        RecordCommands::Encode { json } => {
            let raw = if json == "-" {
                std::io::read_to_string(std::io::stdin()).context("failed to read stdin")?
            } else {
                json
            };
            let record: Record = serde_json::from_str(&raw).context("invalid record JSON")?;
            println!("0x{}", hex::encode(encode_record(&record)?));
        }
        RecordCommands::Decode { hex } => {
            let bytes = hex::decode(hex.trim().trim_start_matches("0x"))
                .context("record bytes are not valid hex")?;
            print_record(&decode_record(&bytes)?)?;
        }
    }
    Ok(())
}

fn resolve_password(password: Option<String>) -> Result<String> {
    match password.or_else(|| std::env::var(PASSWORD_ENV).ok()) {
        Some(password) if !password.is_empty() => Ok(password),
        _ => bail!("a key file password is required (--password or {PASSWORD_ENV})"),
    }
}

fn unlock(keys: &KeyManager, args: KeyArgs) -> Result<KeyHandle> {
    let password = resolve_password(args.password)?;
    keys.import_file(&args.key, &password)
        .with_context(|| format!("failed to unlock key file {}", args.key.display()))
}

fn read_content(args: ContentArgs) -> Result<RecordContent> {
    let raw = match (args.content, args.content_file) {
        (Some(inline), _) => inline,
        (None, Some(path)) => fs::read_to_string(&path)
            .with_context(|| format!("failed to read content file {}", path.display()))?,
        (None, None) => bail!("either --content or --content-file must be provided"),
    };
    parse_content(&raw)
}

fn parse_content(raw: &str) -> Result<RecordContent> {
    let value: Value = serde_json::from_str(raw).context("record content must be JSON")?;
    Ok(RecordContent::json(&value))
}

/// Print a record as JSON, showing JSON content inline instead of as hex.
fn print_record(record: &Record) -> Result<()> {
    let mut json = serde_json::to_value(record)?;
    if let Ok(document) = serde_json::from_slice::<Value>(&record.content.data) {
        json["document"] = document;
    }
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
