//! `changeset` binary.
//!
//! ```bash
//! changeset --workspace ./project apply response.txt
//! changeset diff before.rs after.rs --path src/lib.rs
//! RUST_LOG=changeset=debug changeset parse response.txt
//! ```

use clap::Parser;
use tracing_subscriber::EnvFilter;

use changeset_runner::{run, Cli, EXIT_INVALID_INPUT};

fn main() {
    let cli = Cli::parse();

    let mut filter = EnvFilter::from_default_env();
    for directive in ["changeset=info", "changeset_runner=info"] {
        if let Ok(directive) = directive.parse() {
            filter = filter.add_directive(directive);
        }
    }
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let stdout = std::io::stdout();
    let code = match run(&cli, &mut stdout.lock()) {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("{e:#}");
            EXIT_INVALID_INPUT
        }
    };
    std::process::exit(code);
}
