//! hyprink CLI

use std::process::ExitCode;

use clap::Parser;
use hyprink_core::{Context, ErrorKind};
use tracing_subscriber::EnvFilter;

use hyprink_cli::cmd;
use hyprink_cli::{Cli, Commands};

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Commands::Completions { shell } = cli.command {
        cmd::completions::completions(shell);
        return ExitCode::SUCCESS;
    }

    tracing::debug!("Command: {:?}", cli.command);

    let mut ctx = Context::new();
    if let Some(name) = &cli.app_name {
        ctx.set_app_name(name);
    }

    let result = match cli.command {
        Commands::Pack { src, output } => cmd::pack::pack(&mut ctx, &src, output.as_deref()),
        Commands::Unpack { package, target } => cmd::unpack::unpack(&mut ctx, &package, &target),
        Commands::Install { path } => cmd::install::install(&mut ctx, &path),
        Commands::List { package, json } => cmd::list::list(&mut ctx, &package, json),
        Commands::Verify { package } => cmd::verify::verify(&mut ctx, &package),
        Commands::Log {
            level,
            scope,
            message,
        } => {
            cmd::log::log(&ctx, &level, &scope, &message);
            Ok(())
        }
        Commands::Preset { name, message } => {
            cmd::log::preset(&mut ctx, &name, message.as_deref());
            Ok(())
        }
        Commands::Completions { .. } => Ok(()),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            // Core failures were already logged by the context.
            let code = match err.downcast_ref::<hyprink_core::Error>() {
                Some(core) => core.status_code(),
                None => {
                    eprintln!("error: {err:#}");
                    ErrorKind::Unknown.status_code()
                }
            };
            ExitCode::from(u8::try_from(code).unwrap_or(u8::MAX))
        }
    }
}
