use clap::{Parser, Subcommand};
use derive_more::{Display, Error};
use exn::ResultExt;
use repodata_checksum::Algorithm;
use repodata_compress::Compression;
use repodata_config::Config;
use repodata_metadata::{MetadataKind, Naming, UpdateMode};
use repodata_repository::{UpdateOptions, UpdateReport, Updater};
use repodata_rpm::StorageHeaderReader;
use repodata_storage::BackendHandle;
use repodata_storage::backend::{LocalBackend, ReadOnlyBackend};
use std::path::PathBuf;
use std::process::ExitCode;
use std::str::FromStr;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

type Result<T> = std::result::Result<T, exn::Exn<ErrorKind>>;

#[derive(Debug, Display, Error)]
enum ErrorKind {
    #[display("invalid configuration")]
    Config,
    #[display("cannot open repository")]
    Storage,
    #[display("update failed")]
    Update,
}

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Configuration file; defaults to `repodata.toml` in the user config directory.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Log debug events (twice for trace).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Bring the metadata of a repository in line with its archives.
    Update {
        /// Repository root directory.
        root: PathBuf,
        /// `incremental` or `rebuild`.
        #[arg(long, value_parser = parse_arg::<UpdateMode>)]
        mode: Option<UpdateMode>,
        /// `plain` or `checksum`.
        #[arg(long, value_parser = parse_arg::<Naming>)]
        naming: Option<Naming>,
        /// Compression of the published documents.
        #[arg(long, value_parser = parse_arg::<Compression>)]
        compression: Option<Compression>,
        /// Digest for package identifiers and document checksums.
        #[arg(long, value_parser = parse_arg::<Algorithm>)]
        digest: Option<Algorithm>,
        /// Read everything, write nothing.
        #[arg(long)]
        dry_run: bool,
    },
}

fn parse_arg<T: FromStr>(value: &str) -> std::result::Result<T, String> {
    value.parse().map_err(|_| format!("unsupported value {value:?}"))
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

fn print_report(report: &UpdateReport) {
    println!("{} run: {} added, {} removed, {} skipped", report.mode, report.added.len(), report.removed.len(), report.invalid.len());
    for path in &report.invalid {
        println!("  skipped {path}");
    }
    for kind in MetadataKind::ALL {
        if let Some(publication) = report.publications.iter().find(|p| p.kind == kind) {
            println!("  {:<9} {:>6} packages  {}", kind.name(), publication.count, publication.key.display());
        }
    }
}

async fn update(mut config: Config, root: PathBuf) -> Result<UpdateReport> {
    let local: BackendHandle = Arc::new(LocalBackend::new("local", &root).or_raise(|| ErrorKind::Storage)?);
    let backend: BackendHandle = match config.dry_run {
        true => Arc::new(ReadOnlyBackend::new(local)),
        false => local,
    };
    let reader = Arc::new(StorageHeaderReader::new(backend.clone(), config.digest));
    let options = UpdateOptions {
        mode: config.mode,
        naming: config.naming,
        compression: config.compression,
        algorithm: config.digest,
        packages_prefix: config.packages_prefix.take(),
        skip_invalid: config.skip_invalid,
    };
    Updater::new(backend, reader, options).run().await.or_raise(|| ErrorKind::Update)
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = Config::load(cli.config.as_deref()).or_raise(|| ErrorKind::Config)?;
    match cli.command {
        Command::Update { root, mode, naming, compression, digest, dry_run } => {
            if let Some(compression) = compression {
                if compression == Compression::None {
                    exn::bail!(ErrorKind::Config);
                }
                config.compression = compression;
            }
            config.mode = mode.unwrap_or(config.mode);
            config.naming = naming.unwrap_or(config.naming);
            config.digest = digest.unwrap_or(config.digest);
            config.dry_run |= dry_run;
            let report = update(config, root).await?;
            print_report(&report);
        },
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!("{err:?}");
            ExitCode::FAILURE
        },
    }
}
