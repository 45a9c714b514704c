//! CLI command implementations.
//!
//! Each submodule implements one `alertdedup` subcommand. Argument parsing
//! and terminal rendering live in the binary; the commands here only touch
//! files and the engine, so they can be driven from tests.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `run` | Classify an event file and write classification records |
//! | `score` | Print the similarity score of two messages |
//! | `config` | Print the effective configuration |
//!
//! # Example Usage
//!
//! ```bash
//! # Classify a CSV export, keeping one window per host
//! alertdedup run events.csv --output results.csv --partition-by host
//!
//! # Keep only the novel events of an NDJSON stream
//! cat events.ndjson | alertdedup run - --output /dev/null --novel-out novel.ndjson
//!
//! # Check how two messages compare
//! alertdedup score "disk full on host1" "Disk full on host-1"
//! ```

mod config;
mod run;
mod score;

pub use config::ConfigCommand;
pub use run::RunCommand;
pub use score::ScoreCommand;
