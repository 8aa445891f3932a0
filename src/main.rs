use clap::Parser;
use redmine2gitlab::cli::{self, Cli};
use redmine2gitlab::logging::init_logging;

fn main() {
    let cli = Cli::parse();

    if let Err(err) = init_logging(cli.verbose, cli.quiet, cli.log_file.as_deref()) {
        eprintln!("Failed to initialize logging: {err}");
    }

    if let Err(err) = cli::run(&cli) {
        tracing::error!(error = %err, "Migration aborted");
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
