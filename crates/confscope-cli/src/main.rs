mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Commands};
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let ctx = commands::Context::from_cli(&cli)?;

    match &cli.command {
        Commands::Sshd { path, field } => {
            commands::Sshd::execute(&ctx, path.as_deref(), *field)?;
        }
        Commands::Sudoers {
            path,
            hostname,
            field,
        } => {
            commands::Sudoers::execute(&ctx, path.as_deref(), hostname.as_deref(), *field)?;
        }
        Commands::Modprobe { path, field } => {
            commands::Modprobe::execute(&ctx, path.as_deref(), *field)?;
        }
        Commands::Pam {
            path,
            service,
            field,
        } => {
            commands::Pam::execute(&ctx, path.as_deref(), service.as_deref(), *field)?;
        }
        Commands::Settings => {
            commands::Settings::execute(&ctx)?;
        }
    }

    Ok(())
}

/// Log to stderr; `-v` forces debug, otherwise `RUST_LOG` or warn
fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
