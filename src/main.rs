use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use serde_json::Value;

use socket_worker::cli::{self, EndpointArgs};

/// Run or call a single-connection command worker over a Unix socket.
#[derive(Parser, Debug)]
#[command(name = "socket-worker", version, about)]
struct Cli {
    /// Log at debug level (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run an echo worker; the `shutdown` command stops it
    Serve {
        #[command(flatten)]
        endpoint: EndpointOpts,

        /// Keep an existing socket file and leave it in place on shutdown
        #[arg(long)]
        reuse: bool,

        /// Serve a single command, then exit
        #[arg(long)]
        once: bool,
    },

    /// Send one command and print the response
    Call {
        /// Command name
        name: String,

        /// Argument as key=value; the value is parsed as JSON when possible
        #[arg(short, long = "arg", value_parser = cli::parse_key_value)]
        args: Vec<(String, Value)>,

        /// Correlation id
        #[arg(long)]
        id: Option<String>,

        /// Give up immediately unless the worker is waiting
        #[arg(long)]
        no_block: bool,

        #[command(flatten)]
        endpoint: EndpointOpts,
    },

    /// Print the worker status
    Status {
        #[command(flatten)]
        endpoint: EndpointOpts,
    },
}

#[derive(Args, Debug)]
struct EndpointOpts {
    /// YAML configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Socket path
    #[arg(short, long, env = "SOCKET_WORKER_SOCKET", value_name = "PATH")]
    socket: Option<PathBuf>,

    /// Status record path (default: socket path + .status)
    #[arg(long = "status-path", value_name = "PATH")]
    status: Option<PathBuf>,
}

impl From<EndpointOpts> for EndpointArgs {
    fn from(opts: EndpointOpts) -> Self {
        Self {
            config: opts.config,
            socket: opts.socket,
            status: opts.status,
        }
    }
}

fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "warn" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!("socket_worker={level}"))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Cli::parse();
    init_logging(args.verbose);

    match args.command {
        Command::Serve {
            endpoint,
            reuse,
            once,
        } => cli::serve::run_serve(&endpoint.into(), reuse, once).await?,
        Command::Call {
            name,
            args: arguments,
            id,
            no_block,
            endpoint,
        } => {
            let answered =
                cli::call::run_call(&endpoint.into(), &name, arguments, id.as_deref(), !no_block)
                    .await?;
            if !answered {
                std::process::exit(2);
            }
        }
        Command::Status { endpoint } => cli::status::run_status(&endpoint.into(), args.verbose)?,
    }

    Ok(())
}
