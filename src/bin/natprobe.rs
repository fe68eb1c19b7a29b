use clap::{CommandFactory, Parser};
use natprobe::{Args, Config, Error, TerminalPrompt, probe};
use std::process::ExitCode;
use tracing::debug;

#[tokio::main]
async fn main() -> ExitCode {
    // Parse args
    let args = Args::parse();

    // Logs go to stderr so stdout only carries the result
    let level = if args.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    let config = match Config::try_from(args) {
        Ok(config) => config,
        Err(Error::MissingServerArgument) => {
            // printing help only fails if stdout is gone
            let _ = Args::command().print_help();
            return ExitCode::FAILURE;
        }
        Err(e) => {
            println!("{e}");
            return ExitCode::FAILURE;
        }
    };

    debug!(
        "probing {} (tcp={}, tls={}, rfc3489={})",
        config.server, config.tcp, config.tls, config.rfc3489
    );

    match probe::run(&config, &mut TerminalPrompt::new()).await {
        Ok(report) => {
            println!("{report}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            match e.downcast_ref::<Error>() {
                Some(usage) if usage.is_usage() => println!("{usage}"),
                _ => eprintln!("{e:#}"),
            }
            ExitCode::FAILURE
        }
    }
}
