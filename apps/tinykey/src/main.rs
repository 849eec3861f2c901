use std::io::{Read as _, Write as _};
use std::path::{Path, PathBuf};

use anyhow::Context as _;
use base64::Engine as _;
use clap::{Parser, Subcommand};
use directories::ProjectDirs;
use tinykey_core::Sensitive;
use tinykey_secrets::{BackendKind, BackendOptions, DEFAULT_SERVICE, SecretStore, open_backend};
use tracing::info;

/// Largest value accepted on stdin.
const MAX_STDIN_BYTES: usize = 1024 * 1024;

#[derive(Debug, Parser)]
#[command(name = "tinykey", version, about = "Save and read named secrets")]
struct Args {
    /// Where secrets live: `keyring`, `file` or `memory`.
    #[arg(long, env = "TINYKEY_BACKEND", default_value = "keyring")]
    backend: BackendKind,

    /// Namespace for entries; stores with different services are isolated.
    #[arg(long, env = "TINYKEY_SERVICE", default_value = DEFAULT_SERVICE)]
    service: String,

    /// Directory for the file backend's vault.
    #[arg(long, env = "TINYKEY_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Passphrase for the file backend.
    #[arg(long, env = "TINYKEY_PASSPHRASE", hide_env_values = true, value_parser = parse_sensitive)]
    passphrase: Option<Sensitive<String>>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Store a secret, replacing any previous value. Reads stdin if VALUE is omitted.
    Save { key: String, value: Option<String> },
    /// Print a secret.
    Read {
        key: String,
        /// Print base64 instead of text (for binary payloads).
        #[arg(long)]
        base64: bool,
    },
    /// Delete a secret. Succeeds if nothing was stored.
    Remove { key: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    // Only the file backend touches the data dir.
    let data_dir = match args.backend {
        BackendKind::File => resolve_data_dir(args.data_dir.as_deref())?,
        _ => args.data_dir.unwrap_or_default(),
    };
    let backend = open_backend(BackendOptions {
        kind: args.backend,
        service: args.service,
        data_dir,
        passphrase: args.passphrase,
    })
    .await
    .context("open secret backend")?;
    let store = SecretStore::new(backend);

    match args.command {
        Command::Save { key, value } => {
            let value: Sensitive<Vec<u8>> = match value {
                Some(v) => v.into_bytes().into(),
                None => read_stdin()?,
            };
            store
                .try_save(&key, value)
                .await
                .with_context(|| format!("save secret {key:?}"))?;
            info!(key = %key, "saved");
        }
        Command::Read { key, base64 } => {
            let Some(secret) = store
                .try_read(&key)
                .await
                .with_context(|| format!("read secret {key:?}"))?
            else {
                anyhow::bail!("no secret stored for {key:?}");
            };
            let out = if base64 {
                base64::engine::general_purpose::STANDARD.encode(secret.expose())
            } else {
                secret
                    .into_utf8()
                    .context("secret is not utf-8 (use --base64)")?
                    .into_inner()
            };
            let mut stdout = std::io::stdout();
            writeln!(stdout, "{out}").context("write stdout")?;
        }
        Command::Remove { key } => {
            store
                .try_remove(&key)
                .await
                .with_context(|| format!("remove secret {key:?}"))?;
            info!(key = %key, "removed");
        }
    }
    Ok(())
}

fn parse_sensitive(s: &str) -> Result<Sensitive<String>, std::convert::Infallible> {
    Ok(Sensitive::from(s.to_string()))
}

fn read_stdin() -> anyhow::Result<Sensitive<Vec<u8>>> {
    let mut input = Vec::new();
    std::io::stdin()
        .take(MAX_STDIN_BYTES as u64 + 1)
        .read_to_end(&mut input)
        .context("read stdin")?;
    if input.len() > MAX_STDIN_BYTES {
        anyhow::bail!("secret too large");
    }
    if input.ends_with(b"\n") {
        input.pop();
        if input.ends_with(b"\r") {
            input.pop();
        }
    }
    Ok(Sensitive(input))
}

fn resolve_data_dir(cli: Option<&Path>) -> anyhow::Result<PathBuf> {
    if let Some(p) = cli {
        return Ok(p.to_path_buf());
    }
    let proj = ProjectDirs::from("dev", "tinykey", "tinykey").context("resolve data dir")?;
    Ok(proj.data_local_dir().to_path_buf())
}
