//! accessreport CLI: export Jira and Confluence user access reports.
//!
//! Collects the users of a Jira project or of the Confluence wiki groups,
//! enriches them with last-active dates, group memberships and project
//! roles, and writes one CSV report.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    // Before parsing, so `.env` can supply PROJECT_KEY as well.
    let env_file = std::env::current_dir()
        .ok()
        .and_then(|dir| commands::load_env_file(&dir.join(".env")));
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    if let Some(path) = env_file {
        tracing::debug!(path = %path.display(), "loaded environment file");
    }
    commands::run(cli).await
}
