//! Command line front end over the `cardshell` engine.
//!
//! - `cardshell readers` lists the PC/SC readers
//! - `cardshell identify` tells which driver claims the inserted card
//! - `cardshell run <command> [args...]` runs one command of the driver
//! - `cardshell shell` reads commands interactively
//! - `cardshell decode` and `cardshell status` work offline, without a reader

mod shell;

use cardshell::pcsc::{self, PcscReader, ReaderOptions};
use cardshell::tlv::Context;
use cardshell::{Driver, Registry, Reply, Session, StatusWord, TransportError};
use clap::{Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Debug, thiserror::Error)]
enum Error {
    #[error(transparent)]
    Card(#[from] cardshell::Error),

    #[error("Error occurred while communicating with the reader: {0}")]
    Transport(#[from] TransportError),

    #[error("Invalid hex input: {0}")]
    Hex(#[from] hex::FromHexError),

    #[error("A status word is 4 hex digits, got {0:?}")]
    StatusWord(String),

    #[error("Could not render JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

type Result<T> = std::result::Result<T, Error>;

#[derive(Parser)]
#[command(name = "cardshell")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Use the first reader whose name starts with this prefix.
    #[arg(long, global = true)]
    reader: Option<String>,

    /// Talk in this dialect instead of the one claiming the card's ATR.
    #[arg(long, global = true)]
    driver: Option<String>,

    /// Print replies as JSON.
    #[arg(long, global = true)]
    json: bool,

    /// Log every frame sent and received.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the PC/SC readers.
    Readers,

    /// List the built-in drivers with their ATRs and commands.
    Drivers,

    /// Print the card's ATR and the driver claiming it.
    Identify,

    /// Run one command of the driver.
    Run {
        name: String,
        args: Vec<String>,
    },

    /// Read commands from the terminal until `exit`.
    Shell,

    /// Decode BER-TLV octets with the driver's tag table.
    Decode {
        octets: String,

        /// Template the octets appear in: top, fcp, fci or fmd.
        #[arg(long, default_value = "top")]
        context: Context,
    },

    /// Explain a status word, e.g. `9804`.
    Status { sw: String },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        true => "debug",
        _ => "warn",
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)),
        )
        .init();

    let registry = Registry::builtin()?;

    match &cli.command {
        Commands::Readers => {
            for reader in pcsc::list_readers()? {
                println!("{}", reader);
            }
        }
        Commands::Drivers => print_drivers(&registry),
        Commands::Identify => {
            let session = open_session(&cli, &registry)?;

            println!("ATR: {}", hex::encode_upper(session.announcement()));
            println!("Driver: {}", session.driver().name);
        }
        Commands::Run { name, args } => {
            let mut session = open_session(&cli, &registry)?;
            let args: Vec<&str> = args.iter().map(String::as_str).collect();

            print_replies(&session.run(name, &args)?, cli.json)?;
        }
        Commands::Shell => {
            let session = open_session(&cli, &registry)?;

            shell::run(session, cli.json)?;
        }
        Commands::Decode { octets, context } => {
            let driver = offline_driver(&cli, &registry)?;
            let bytes = hex::decode(octets.split_whitespace().collect::<String>())?;
            let decoding = driver.decode_tlv(&bytes, *context);

            match cli.json {
                true => println!("{}", serde_json::to_string_pretty(&decoding)?),
                _ => print!("{}", decoding),
            }
        }
        Commands::Status { sw } => {
            let driver = offline_driver(&cli, &registry)?;
            let sw = parse_status_word(sw)?;

            println!("{}: {}", sw, driver.resolve(sw));
        }
    }

    Ok(())
}

fn open_session<'r>(cli: &Cli, registry: &'r Registry) -> Result<Session<'r, PcscReader>> {
    let reader = PcscReader::open(ReaderOptions {
        reader: cli.reader.clone(),
        ..Default::default()
    })?;

    debug!("Opened reader {}", reader.name());

    let session = match &cli.driver {
        Some(name) => Session::with_driver(reader, registry.by_name(name)?)?,
        None => Session::open(reader, registry)?,
    };

    Ok(session)
}

/// Without a card there is no ATR to go by; the ISO driver is the default.
fn offline_driver<'r>(cli: &Cli, registry: &'r Registry) -> Result<&'r Driver> {
    let name = cli.driver.as_deref().unwrap_or(cardshell::drivers::iso::NAME);

    Ok(registry.by_name(name)?)
}

fn parse_status_word(text: &str) -> Result<StatusWord> {
    let digits: String = text.split_whitespace().collect();
    if digits.len() != 4 {
        return Err(Error::StatusWord(text.to_string()));
    }

    u16::from_str_radix(&digits, 16)
        .map(StatusWord::from)
        .map_err(|_| Error::StatusWord(text.to_string()))
}

fn print_drivers(registry: &Registry) {
    for driver in registry.drivers() {
        println!("{}", driver.name);
        for atr in driver.atrs() {
            println!("  ATR {}", atr);
        }
        for operation in driver.operations() {
            println!(
                "  {:<24} {:<36} {}",
                operation.name, operation.usage, operation.summary
            );
        }
        println!();
    }
}

fn print_replies(replies: &[Reply], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(replies)?);
        return Ok(());
    }

    for reply in replies {
        println!("{}\n", reply);
    }

    Ok(())
}
