#![deny(unsafe_code)]

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use sfap_server::{AuthGrant, Credentials, Server, ServerConfig};
use tracing_subscriber::EnvFilter;

/// SFAP server daemon.
#[derive(Parser)]
#[command(name = "sfapd", version, about)]
struct Args {
    /// Address to listen on, e.g. `0.0.0.0:9045`.
    #[arg(long, default_value = "127.0.0.1:9045")]
    bind: String,

    /// Host directory every authenticated session is sandboxed to.
    #[arg(long)]
    root: PathBuf,

    /// Log level filter, overridden by `RUST_LOG` if set.
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let root = match args.root.canonicalize() {
        Ok(root) => root,
        Err(err) => {
            tracing::error!(root = %args.root.display(), error = %err, "failed to resolve root directory");
            return ExitCode::FAILURE;
        }
    };

    let config = ServerConfig {
        auth_middleware: Box::new(move |credentials: &Credentials| {
            (
                sfap_protocol::AuthResult::Ok,
                Some(AuthGrant {
                    username: credentials.username.clone(),
                    root: root.clone(),
                    home: None,
                }),
            )
        }),
        ..ServerConfig::default()
    };

    let server = match Server::bind(&args.bind, config) {
        Ok(server) => server,
        Err(err) => {
            tracing::error!(bind = %args.bind, error = %err, "failed to bind server");
            return ExitCode::FAILURE;
        }
    };

    tracing::info!(bind = %args.bind, root = %args.root.display(), "sfapd listening");
    server.hang_on();

    ExitCode::SUCCESS
}
