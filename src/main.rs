use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{debug, error};
use tracing_subscriber::EnvFilter;

use thumbcache::{SizeClass, Store};

/// Query and fill the shared thumbnail cache
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Use this directory instead of $XDG_CACHE_HOME/thumbnails
    #[arg(long, global = true, value_name = "DIR")]
    cache_root: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the path of a fresh thumbnail, generating it if needed
    Get {
        /// Local path or URI of the source image
        source: String,
        /// normal, large, or a pixel size (any existing size if omitted)
        #[arg(long)]
        size: Option<SizeClass>,
        /// Honour and record failures under this application name
        #[arg(long, value_name = "APP")]
        fail_app: Option<String>,
    },
    /// Print where the thumbnail of a source is stored
    Path {
        source: String,
        #[arg(long)]
        size: SizeClass,
    },
    /// Print the metadata embedded in a thumbnail as JSON
    Info { thumbnail: PathBuf },
    /// Create the cache directories with private permissions
    Init,
    /// Record that an application failed to thumbnail a source
    Fail {
        source: String,
        app: String,
        /// Source modification time (required for non-local sources)
        #[arg(long)]
        mtime: Option<i64>,
    },
    /// Store a thumbnail rendered elsewhere (the file is moved)
    Put {
        source: String,
        built: PathBuf,
        #[arg(long)]
        size: SizeClass,
        /// Source modification time (required for non-local sources)
        #[arg(long)]
        mtime: Option<i64>,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    match run(args) {
        Ok(code) => code,
        Err(e) => {
            error!("{e}");
            ExitCode::from(2)
        }
    }
}

fn run(args: Args) -> thumbcache::Result<ExitCode> {
    let store = match args.cache_root {
        Some(root) => Store::new(thumbcache::StoreConfig::new(root)),
        None => Store::from_env()?,
    };
    debug!(?store, "Opened thumbnail store");

    match args.command {
        Commands::Get {
            source,
            size,
            fail_app,
        } => match store.get(&source, size, fail_app.as_deref())? {
            Some(thumb) => println!("{}", thumb.display()),
            None => return Ok(ExitCode::FAILURE),
        },
        Commands::Path { source, size } => {
            println!("{}", store.thumbnail_path(&source, size)?.display());
        }
        Commands::Info { thumbnail } => {
            let metadata = store.thumbnail_info(&thumbnail)?;
            let json = metadata
                .to_json()
                .map_err(|e| thumbcache::Error::Io(e.into()))?;
            println!("{json}");
        }
        Commands::Init => {
            store.ensure_layout()?;
            println!("{}", store.cache_root().display());
        }
        Commands::Fail { source, app, mtime } => {
            println!("{}", store.put_fail(&source, &app, mtime, None)?.display());
        }
        Commands::Put {
            source,
            built,
            size,
            mtime,
        } => {
            println!("{}", store.put(&source, size, &built, mtime, None)?.display());
        }
    }

    Ok(ExitCode::SUCCESS)
}
