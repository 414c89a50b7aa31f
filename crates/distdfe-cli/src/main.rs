mod cursor_file;
mod display;

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Context;
use clap::{Args, Parser, Subcommand, ValueEnum};
use distdfe_core::{Cursor, Environment, PollOutcome, TaxId};
use distdfe_sync::{ClientConfig, ClientIdentity, DistClient, DistError, HttpTransport};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::cursor_file::CursorFile;

#[derive(Parser, Debug)]
#[command(
    name = "distdfe",
    version,
    about = "Poll the NF-e distribution service for documents addressed to a taxpayer"
)]
struct Cli {
    /// File holding the last consumed NSU between runs.
    #[arg(long, env = "DISTDFE_CURSOR_FILE", default_value = ".distdfe-cursor", global = true)]
    cursor_file: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch the next batch of documents and advance the stored cursor.
    Poll(PollArgs),
    /// Print the persisted cursor.
    Cursor,
    /// Decode a saved SOAP response offline.
    Decode {
        file: PathBuf,
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args, Debug)]
struct PollArgs {
    #[command(flatten)]
    conn: ConnectionArgs,

    /// Start from this NSU instead of the stored one.
    #[arg(long)]
    cursor: Option<Cursor>,

    /// Write each document's XML to `<access key>.xml` in this directory.
    #[arg(long)]
    out_dir: Option<PathBuf>,

    #[arg(long)]
    json: bool,
}

#[derive(Args, Debug)]
struct ConnectionArgs {
    /// Client certificate (A1 `.pfx` or PEM bundle).
    #[arg(long = "cert", env = "DISTDFE_CERT_PATH")]
    cert_path: PathBuf,

    #[arg(long, env = "DISTDFE_CERT_PASSWORD", default_value = "", hide_env_values = true)]
    cert_password: String,

    #[arg(long, env = "DISTDFE_CERT_FORMAT", value_enum, default_value = "pkcs12")]
    cert_format: CertFormat,

    /// CNPJ or CPF of the interested party.
    #[arg(long, env = "DISTDFE_TAX_ID")]
    tax_id: TaxId,

    /// IBGE code of the taxpayer's state.
    #[arg(long, env = "DISTDFE_UF", default_value = "43")]
    uf: String,

    #[arg(long, env = "DISTDFE_ENVIRONMENT", default_value = "production")]
    environment: Environment,

    /// Override the national endpoint for the chosen environment.
    #[arg(long, env = "DISTDFE_ENDPOINT")]
    endpoint: Option<String>,

    #[arg(long, env = "DISTDFE_TIMEOUT_SECS", default_value_t = 30)]
    timeout_secs: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum CertFormat {
    Pkcs12,
    Pem,
}

impl ConnectionArgs {
    fn client(&self) -> anyhow::Result<DistClient<HttpTransport>> {
        let identity = match self.cert_format {
            CertFormat::Pkcs12 => ClientIdentity::pkcs12_file(&self.cert_path, &self.cert_password),
            CertFormat::Pem => ClientIdentity::pem_file(&self.cert_path),
        }
        .with_context(|| format!("loading certificate {}", self.cert_path.display()))?;
        let transport = HttpTransport::new(identity).context("building HTTPS client")?;

        let mut config = ClientConfig::new(self.tax_id.clone(), self.uf.clone());
        config.environment = self.environment;
        config.endpoint = self.endpoint.clone();
        config.timeout = Duration::from_secs(self.timeout_secs);
        Ok(DistClient::new(transport, config)?)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("distdfe=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cursor_file = CursorFile::new(cli.cursor_file);

    let result = match cli.command {
        Command::Poll(args) => poll(args, &cursor_file).await,
        Command::Cursor => cursor_file.load().map(|cursor| {
            info!(path = %cursor_file.path().display(), "read cursor file");
            println!("{cursor}");
        }),
        Command::Decode { file, json } => decode(&file, json),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => report(&err),
    }
}

async fn poll(args: PollArgs, cursor_file: &CursorFile) -> anyhow::Result<()> {
    let last = match args.cursor {
        Some(cursor) => cursor,
        None => cursor_file.load()?,
    };
    let client = args.conn.client()?;
    info!(endpoint = client.endpoint(), environment = %client.environment(), "polling");

    let outcome = match client.poll_documents(last).await {
        Ok(outcome) => outcome,
        Err(err) => {
            if let Some(cursor) = err.last_valid_cursor().filter(|c| !c.is_zero()) {
                cursor_file.save(cursor)?;
            }
            return Err(err.into());
        }
    };

    if let Some(dir) = &args.out_dir {
        display::export_xml(&outcome.documents, dir)?;
    }
    if !outcome.new_cursor.is_zero() {
        cursor_file.save(outcome.new_cursor)?;
    }
    print(&outcome, args.json)
}

fn decode(file: &std::path::Path, json: bool) -> anyhow::Result<()> {
    let raw = std::fs::read(file).with_context(|| format!("reading {}", file.display()))?;
    let outcome = distdfe_sync::decode_response(&raw)?;
    print(&outcome, json)
}

fn print(outcome: &PollOutcome, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(outcome)?);
    } else {
        display::print_outcome(outcome);
    }
    Ok(())
}

/// Print the failure for a human and pick the exit status.
fn report(err: &anyhow::Error) -> ExitCode {
    match err.downcast_ref::<DistError>() {
        Some(DistError::Transport(cause)) => {
            error!(error = %cause, "transport failure");
            eprintln!(
                "could not reach the distribution service; check network access and the client certificate"
            );
            ExitCode::FAILURE
        }
        Some(dist) => {
            eprintln!("{dist}");
            if matches!(dist, DistError::Lockout { .. }) {
                ExitCode::from(2)
            } else {
                ExitCode::FAILURE
            }
        }
        None => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}
