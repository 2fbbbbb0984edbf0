//! CLI command implementations.
//!
//! Each command is a `cmd_*` function returning a serialisable report plus
//! a `print_*` helper for human output, so `--json` can serialise the same
//! struct the console view renders.

mod generate;
mod ingest;
mod init;
mod query;
mod remove;
mod sources;
mod status;

pub use generate::{cmd_generate, print_generate_report, GenerateOptions, GenerateReport};
pub use ingest::{cmd_ingest, print_ingest_report, IngestCmdOptions, IngestReport};
pub use init::{cmd_init, InitReport};
pub use query::{cmd_query, print_query_results, QueryOptions, QueryReport};
pub use remove::{cmd_remove, print_remove_report, RemoveReport};
pub use sources::{cmd_list_sources, print_sources};
pub use status::{cmd_status, print_status, StatusReport};

use std::io::Write;

/// Ask a yes/no question on stderr and read the answer from stdin.
pub fn confirm(question: &str, default_yes: bool) -> bool {
    let suffix = if default_yes { "[Y/n]" } else { "[y/N]" };
    eprint!("{question} {suffix}: ");
    let _ = std::io::stderr().flush();

    let mut answer = String::new();
    if std::io::stdin().read_line(&mut answer).is_err() {
        return false;
    }
    match answer.trim().to_ascii_lowercase().as_str() {
        "" => default_yes,
        "y" | "yes" => true,
        _ => false,
    }
}
