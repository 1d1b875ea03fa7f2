mod consume;
mod produce;
mod utils;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use consume::Consume;
use produce::Produce;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "kpipe")]
#[command(about = "Stream messages between a Kafka topic and standard I/O, transcoding payloads on the way")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(long, global = true, help = "Enable verbose (debug) logging")]
    verbose: bool,

    #[arg(
        long,
        global = true,
        value_enum,
        default_value = "plain",
        help = "Log format (default: plain)"
    )]
    log_format: LogFormatArg,
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Read messages from stdin and produce them to a topic")]
    Produce(Produce),

    #[command(about = "Consume messages from a topic and write them to stdout")]
    Consume(Consume),
}

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq)]
enum LogFormatArg {
    Plain,
    Json,
}

// Logs go to stderr; stdout carries nothing but the data stream.
fn init_logging(verbose: bool, format: LogFormatArg) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "info" }));
    match format {
        LogFormatArg::Plain => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init(),
        LogFormatArg::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.log_format);

    match cli.command {
        Commands::Produce(produce) => produce::handle_produce(produce).await?,
        Commands::Consume(consume) => consume::handle_consume(consume).await?,
    }

    Ok(())
}
