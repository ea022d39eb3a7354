//! certkeeper - TLS certificate rotation for host-local management consoles

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use certkeeper_engine::RotationEngine;
use certkeeper_pki::{pair, UrgencyTier};
use certkeeper_source::local::{SelectKind, Selector};
use certkeeper_source::store::{API_TOKEN, CERT_FILE, CERT_NAME, CERT_PATH, KEY_FILE, REMOTE_SERVER};
use certkeeper_source::{
    is_valid_cert_name, is_valid_server, is_valid_token, CredentialStore, LocalSource,
    MaterialSource, RemoteCredentials, RemoteSource,
};

mod introspect;
mod profiles;
mod prompt;

use profiles::ServiceKind;

/// Certificate lifecycle automation for the host's management consoles
#[derive(Parser, Debug)]
#[command(name = "certkeeper")]
#[command(about = "Rotate TLS certificates for host-local management consoles", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show pairing and expiry status of a console's installed certificate
    Status {
        /// Which console to inspect
        #[arg(value_enum)]
        service: ServiceKind,
    },
    /// Rotate a console's certificate
    Rotate {
        /// Which console to rotate
        #[arg(value_enum)]
        service: ServiceKind,

        /// Where replacement material comes from
        #[arg(long, value_enum, default_value_t = SourceArg::Local)]
        source: SourceArg,

        /// Directory holding replacement files (local source)
        #[arg(long)]
        dir: Option<PathBuf>,

        /// 1-indexed certificate selection (local source)
        #[arg(long)]
        index: Option<usize>,

        /// 1-indexed key selection (local source)
        #[arg(long)]
        key_index: Option<usize>,

        /// Remote certificate API server address
        #[arg(long)]
        server: Option<String>,

        /// Bearer token for the remote certificate API
        #[arg(long, env = "CERTKEEPER_API_TOKEN")]
        token: Option<String>,

        /// Certificate name on the remote API
        #[arg(long)]
        cert_name: Option<String>,

        /// Skip confirmation and selection prompts
        #[arg(short = 'y', long)]
        yes: bool,
    },
    /// Inspect or update stored remote credentials
    Creds {
        #[command(subcommand)]
        command: CredsCommands,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum SourceArg {
    /// Operator-provided files in a local directory
    Local,
    /// The remote certificate API
    Remote,
}

#[derive(Subcommand, Debug)]
enum CredsCommands {
    /// Show stored credential values (token redacted)
    Show,
    /// Store a credential value
    Set {
        /// One of REMOTE_SERVER, API_TOKEN, CERT_NAME, CERT_PATH, CERT_FILE, KEY_FILE
        key: String,
        value: String,
    },
}

const KNOWN_KEYS: &[&str] = &[
    REMOTE_SERVER,
    API_TOKEN,
    CERT_NAME,
    CERT_PATH,
    CERT_FILE,
    KEY_FILE,
];

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(e) = run(cli).await {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Status { service } => run_status(service),
        Commands::Rotate {
            service,
            source,
            dir,
            index,
            key_index,
            server,
            token,
            cert_name,
            yes,
        } => {
            run_rotate(
                service, source, dir, index, key_index, server, token, cert_name, yes,
            )
            .await
        }
        Commands::Creds { command } => run_creds(command),
    }
}

fn run_status(service: ServiceKind) -> Result<()> {
    let store = CredentialStore::open_default()?;
    let built = profiles::build(service, &store)?;
    let profile = &built.profile;

    let cert = std::fs::read(&profile.cert_path)
        .with_context(|| format!("could not read {}", profile.cert_path.display()))?;
    let key = std::fs::read(&profile.key_path)
        .with_context(|| format!("could not read {}", profile.key_path.display()))?;

    let paired = pair::matches(&cert, &key)?;
    let status = certkeeper_pki::classify(&cert, Utc::now(), &profile.thresholds)?;

    println!("service:        {}", profile.name);
    println!("certificate:    {}", profile.cert_path.display());
    println!("key paired:     {}", if paired { "yes" } else { "NO" });
    println!(
        "expires:        {} ({} days, {})",
        status.not_after.format("%Y-%m-%d"),
        status.days_remaining,
        status.tier
    );

    if !paired {
        anyhow::bail!("installed certificate and key do not match");
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn run_rotate(
    service: ServiceKind,
    source: SourceArg,
    dir: Option<PathBuf>,
    index: Option<usize>,
    key_index: Option<usize>,
    server: Option<String>,
    token: Option<String>,
    cert_name: Option<String>,
    yes: bool,
) -> Result<()> {
    ensure_root()?;

    let store = CredentialStore::open_default()?;
    let built = profiles::build(service, &store)?;
    let engine = RotationEngine::new(&built.profile, built.controller.as_ref());

    let status = engine.status(Utc::now())?;
    info!(
        service = service.name(),
        days_remaining = status.days_remaining,
        tier = %status.tier,
        "installed certificate status"
    );

    if status.tier == UrgencyTier::Safe && !yes {
        let question = format!(
            "Certificate is not near expiry ({} days remaining). Rotate anyway?",
            status.days_remaining
        );
        if !prompt::confirm(&question, false)? {
            println!("Nothing to do.");
            return Ok(());
        }
    }

    let source: Box<dyn MaterialSource> = match source {
        SourceArg::Local => {
            let dir = dir.unwrap_or_else(|| PathBuf::from("."));
            Box::new(LocalSource::new(dir).with_selector(make_selector(index, key_index, yes)))
        }
        SourceArg::Remote => {
            let credentials = gather_credentials(&store, server, token, cert_name, yes)?;
            let remote = RemoteSource::new(
                &credentials,
                built.profile.fetch_profile,
                &built.profile.staging_dir,
            )?;
            remote
                .verify_reachable()
                .await
                .context("remote certificate API liveness check failed")?;
            Box::new(remote)
        }
    };

    let report = engine.rotate(source.as_ref(), Utc::now()).await?;
    println!(
        "Rotated {} certificate; previous pair saved as {} / {}",
        report.service,
        report.backups.certificate.display(),
        report.backups.key.display()
    );
    Ok(())
}

/// Forward preset indices, prompt interactively otherwise. With `--yes`
/// (or a single candidate) the default first entry is taken silently.
fn make_selector(index: Option<usize>, key_index: Option<usize>, yes: bool) -> Selector {
    Box::new(move |candidates, kind| {
        let preset = match kind {
            SelectKind::Certificate => index,
            SelectKind::Key => key_index,
        };
        if preset.is_some() {
            return preset;
        }
        if yes || candidates.len() == 1 {
            return None;
        }
        let label = match kind {
            SelectKind::Certificate => "certificate",
            SelectKind::Key => "key",
        };
        prompt::select_index(label, candidates)
    })
}

/// Assemble remote credentials from flags, the store, and (last) prompts.
/// Values captured interactively are persisted for the next run.
fn gather_credentials(
    store: &CredentialStore,
    server: Option<String>,
    token: Option<String>,
    cert_name: Option<String>,
    yes: bool,
) -> Result<RemoteCredentials> {
    let server = gather_value(
        store,
        REMOTE_SERVER,
        server,
        "Remote server address",
        is_valid_server,
        yes,
    )?;
    let token = gather_value(
        store,
        API_TOKEN,
        token,
        "API token (min 20 characters)",
        is_valid_token,
        yes,
    )?;
    let cert_name = gather_value(
        store,
        CERT_NAME,
        cert_name,
        "Certificate name",
        is_valid_cert_name,
        yes,
    )?;

    Ok(RemoteCredentials {
        server,
        token,
        cert_name,
    })
}

fn gather_value(
    store: &CredentialStore,
    key: &str,
    flag: Option<String>,
    label: &str,
    valid: impl Fn(&str) -> bool,
    yes: bool,
) -> Result<String> {
    if let Some(value) = flag {
        if !valid(&value) {
            anyhow::bail!("invalid value for {}: {:?}", key, value);
        }
        return Ok(value);
    }
    if let Some(value) = store.get(key)? {
        if valid(&value) {
            return Ok(value);
        }
        warn!(key, "stored credential is invalid, prompting for a new one");
    }
    if yes {
        anyhow::bail!(
            "{} is not configured; set it with `certkeeper creds set {} <value>`",
            key,
            key
        );
    }
    let value = prompt::line_until_valid(label, valid)?;
    store.append(key, &value)?;
    Ok(value)
}

fn run_creds(command: CredsCommands) -> Result<()> {
    let store = CredentialStore::open_default()?;
    match command {
        CredsCommands::Show => {
            for key in KNOWN_KEYS {
                let rendered = match store.get(key)? {
                    Some(value) if *key == API_TOKEN => format!("<set, {} chars>", value.len()),
                    Some(value) => value,
                    None => "<unset>".to_string(),
                };
                println!("{:<14} {}", key, rendered);
            }
            Ok(())
        }
        CredsCommands::Set { key, value } => {
            let key = key.to_uppercase();
            if !KNOWN_KEYS.contains(&key.as_str()) {
                anyhow::bail!(
                    "unknown credential key {:?}; expected one of {}",
                    key,
                    KNOWN_KEYS.join(", ")
                );
            }
            store.append(&key, &value)?;
            println!("Stored {}.", key);
            Ok(())
        }
    }
}

/// Rotating certificates under /etc and restarting services needs root.
fn ensure_root() -> Result<()> {
    // SAFETY: geteuid has no failure modes and touches no memory.
    let euid = unsafe { libc::geteuid() };
    if euid != 0 {
        anyhow::bail!("certkeeper rotate must be run as root");
    }
    Ok(())
}
