use std::process::ExitCode;

use clap::Parser;

use waymark::cli::{run, Cli};

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("error: {error:#}");
            // argument and IO problems exit 1, runtime faults exit 2
            if error.downcast_ref::<std::io::Error>().is_some()
                || error.to_string().contains("failed to open")
            {
                ExitCode::from(1)
            } else {
                ExitCode::from(2)
            }
        }
    }
}
