#![deny(unsafe_code)]

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use sfap_client::{Client, Credentials};
use tracing_subscriber::EnvFilter;

/// Thin SFAP client CLI: one connection, one authenticated command, then exit.
#[derive(Parser)]
#[command(name = "sfap", version, about)]
struct Args {
    /// Server address, e.g. `127.0.0.1:9045`.
    #[arg(long)]
    server: String,

    /// Username to authenticate with.
    #[arg(long)]
    user: String,

    /// Password to authenticate with.
    #[arg(long, default_value = "")]
    password: String,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// List the contents of a remote directory.
    Ls {
        #[arg(default_value = "/")]
        path: String,
    },
    /// Print the session's current working directory.
    Pwd,
    /// Print the session's home directory.
    Home,
    /// Print the server's key/value info table.
    Info,
    /// Print the server's registered command table.
    Commands,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let args = Args::parse();

    if let Err(err) = run(&args) {
        tracing::error!(error = %err, "command failed");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

fn run(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let mut client = Client::connect(&args.server)?;
    client.authorize(&Credentials {
        username: args.user.clone(),
        password: args.password.clone(),
    })?;

    match &args.command {
        Cmd::Ls { path } => {
            for entry in client.ls(path)? {
                println!("{:?}\t{}\t{}", entry.file_type, entry.size, entry.path);
            }
        }
        Cmd::Pwd => println!("{}", client.pwd(false)?),
        Cmd::Home => println!("{}", client.home(false)?),
        Cmd::Info => {
            for (key, value) in client.server_info()? {
                println!("{key}={value}");
            }
        }
        Cmd::Commands => {
            for (id, name) in client.server_commands()? {
                println!("{id:#06x}\t{name}");
            }
        }
    }

    client.close()?;
    Ok(())
}
