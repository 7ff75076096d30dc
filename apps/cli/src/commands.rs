//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};

use accessreport_client::AtlassianClient;
use accessreport_core::enrichment::EnrichmentSteps;
use accessreport_core::pipeline::{ExportPlan, ExportResult, ProgressReporter, run_export};
use accessreport_shared::{
    AppConfig, Overrides, Settings, Variant, config_file_path, init_config, load_config,
    validate_project_key,
};
use clap::{Args, Parser, Subcommand};
use color_eyre::eyre::Result;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// accessreport: who can use your Jira project or Confluence site, and when
/// were they last seen.
#[derive(Parser)]
#[command(
    name = "accessreport",
    version,
    about = "Export Jira and Confluence user access reports to CSV.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Export a user access report.
    Export {
        #[command(subcommand)]
        target: ExportTarget,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Which report to export.
#[derive(Subcommand)]
pub(crate) enum ExportTarget {
    /// Users assignable to a Jira project (jira_users.csv).
    Jira {
        /// Jira project key, e.g. PROJ.
        #[arg(long, env = "PROJECT_KEY")]
        project: String,

        /// Skip the per-user group lookup.
        #[arg(long)]
        no_groups: bool,

        /// Skip project role resolution.
        #[arg(long)]
        no_roles: bool,

        #[command(flatten)]
        common: CommonArgs,
    },

    /// Members of the Confluence wiki groups (confluence_users.csv).
    Confluence {
        /// Only export members of this group.
        #[arg(long)]
        group: Option<String>,

        #[command(flatten)]
        common: CommonArgs,
    },
}

/// Flags shared by every export.
#[derive(Args, Debug, Default)]
pub(crate) struct CommonArgs {
    /// Site base URL (overrides ATLASSIAN_BASE_URL and [site].base_url).
    #[arg(long)]
    pub base_url: Option<String>,

    /// Site account email (overrides ATLASSIAN_USER_EMAIL).
    #[arg(long)]
    pub user_email: Option<String>,

    /// Organization id for the admin API (overrides ORG_ID).
    #[arg(long)]
    pub org_id: Option<String>,

    /// Directory the report is written to.
    #[arg(short, long)]
    pub output_dir: Option<String>,

    /// Product whose activity counts as "last active": a product key, or `all`.
    #[arg(long)]
    pub last_active_scope: Option<String>,

    /// Skip the last-active lookup (no admin credentials needed).
    #[arg(long)]
    pub no_last_active: bool,
}

impl CommonArgs {
    fn overrides(&self) -> Overrides {
        Overrides {
            base_url: self.base_url.clone(),
            user_email: self.user_email.clone(),
            org_id: self.org_id.clone(),
            output_dir: self.output_dir.clone(),
            last_active_scope: self.last_active_scope.clone(),
        }
    }
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show the config file contents (token variable names, never values).
    Show,
}

// ---------------------------------------------------------------------------
// Environment
// ---------------------------------------------------------------------------

/// Load `KEY=value` lines from `path` into the process environment.
/// Variables already set keep their value. Returns the path if it was read.
pub(crate) fn load_env_file(path: &Path) -> Option<PathBuf> {
    dotenvy::from_path(path).ok().map(|()| path.to_path_buf())
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "accessreport=info",
        1 => "accessreport=debug",
        _ => "accessreport=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    // Logs go to stderr so the summary on stdout stays clean.
    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Export { target } => cmd_export(target).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(),
        },
    }
}

// ---------------------------------------------------------------------------
// Export
// ---------------------------------------------------------------------------

/// Turn the parsed target into an export plan.
fn build_plan(target: ExportTarget, scope_setting: &str) -> Result<ExportPlan> {
    let plan = match target {
        ExportTarget::Jira {
            project,
            no_groups,
            no_roles,
            common,
        } => {
            validate_project_key(&project)?;
            let defaults = EnrichmentSteps::for_variant(Variant::Jira);
            ExportPlan::jira(project, scope_setting).with_steps(EnrichmentSteps {
                last_active: defaults.last_active && !common.no_last_active,
                groups: defaults.groups && !no_groups,
                roles: defaults.roles && !no_roles,
            })
        }
        ExportTarget::Confluence { group, common } => {
            let defaults = EnrichmentSteps::for_variant(Variant::Confluence);
            ExportPlan::confluence(group, scope_setting).with_steps(EnrichmentSteps {
                last_active: defaults.last_active && !common.no_last_active,
                ..defaults
            })
        }
    };
    Ok(plan)
}

async fn cmd_export(target: ExportTarget) -> Result<()> {
    let common = match &target {
        ExportTarget::Jira { common, .. } | ExportTarget::Confluence { common, .. } => common,
    };

    let config = load_config()?;
    let settings = Settings::from_env(&config, &common.overrides())?;
    let plan = build_plan(target, &settings.last_active_scope)?;

    if plan.steps.last_active {
        settings.require_admin(&config)?;
    }

    let client = AtlassianClient::new(&settings)?;

    info!(
        variant = %plan.variant,
        site = %settings.site.base_url,
        scope = %plan.scope,
        last_active = plan.steps.last_active,
        groups = plan.steps.groups,
        roles = plan.steps.roles,
        "exporting user report"
    );

    let reporter = CliProgress::new();
    let result = run_export(&client, &plan, &settings.output_dir, &reporter).await?;

    print_summary(&result);
    Ok(())
}

fn print_summary(result: &ExportResult) {
    let summary = &result.summary;

    println!();
    println!("  {} report written", result.variant);
    println!("  File:       {}", display_path(&summary.path));
    println!("  Rows:       {}", summary.rows);
    println!("  Skipped:    {}", result.skipped);
    println!(
        "  N/A dates:  {} ({} unauthorized)",
        result.last_active_fallbacks, result.last_active_unauthorized
    );
    println!("  SHA-256:    {}", summary.sha256);
    println!("  Time:       {:.1}s", result.elapsed.as_secs_f64());
    println!(
        "  Finished:   {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S %Z")
    );
    println!();
}

fn display_path(path: &Path) -> String {
    std::fs::canonicalize(path)
        .unwrap_or_else(|_| path.to_path_buf())
        .display()
        .to_string()
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        spinner.set_style(style);
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn user_enriched(&self, account_id: &str, current: usize, total: usize) {
        self.spinner
            .set_message(format!("Enriching [{current}/{total}] {account_id}"));
    }

    fn done(&self, _result: &ExportResult) {
        self.spinner.finish_and_clear();
    }
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("# {}", config_file_path()?.display());
    println!("{toml_str}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use accessreport_core::seed::SeedStrategy;
    use accessreport_shared::LastActiveScope;
    use clap::CommandFactory;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(args).unwrap()
    }

    fn target_of(cli: Cli) -> ExportTarget {
        match cli.command {
            Command::Export { target } => target,
            Command::Config { .. } => panic!("expected export command"),
        }
    }

    #[test]
    fn env_file_fills_unset_variables_only() {
        let dir = std::env::temp_dir().join(format!(
            "accessreport-dotenv-{}",
            std::process::id()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(".env");
        std::fs::write(
            &path,
            "ACCESSREPORT_DOTENV_CHECK=from-file\nPATH=from-file\n",
        )
        .unwrap();

        assert_eq!(load_env_file(&path), Some(path.clone()));
        assert_eq!(
            std::env::var("ACCESSREPORT_DOTENV_CHECK").as_deref(),
            Ok("from-file")
        );
        assert_ne!(std::env::var("PATH").as_deref(), Ok("from-file"));

        assert_eq!(load_env_file(&dir.join("missing.env")), None);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn jira_flags_disable_steps() {
        let cli = parse(&[
            "accessreport",
            "export",
            "jira",
            "--project",
            "PROJ",
            "--no-roles",
            "--last-active-scope",
            "all",
        ]);
        let plan = build_plan(target_of(cli), "all").unwrap();

        assert_eq!(plan.variant, Variant::Jira);
        assert_eq!(plan.scope, LastActiveScope::AllProducts);
        assert!(plan.steps.last_active && plan.steps.groups);
        assert!(!plan.steps.roles);
    }

    #[test]
    fn jira_rejects_bad_project_key() {
        let cli = parse(&["accessreport", "export", "jira", "--project", "proj-1"]);
        assert!(build_plan(target_of(cli), "product").is_err());
    }

    #[test]
    fn confluence_group_filter() {
        let cli = parse(&[
            "accessreport",
            "-v",
            "export",
            "confluence",
            "--group",
            "site-admins",
            "--no-last-active",
        ]);
        assert_eq!(cli.verbose, 1);

        let plan = build_plan(target_of(cli), "product").unwrap();
        assert_eq!(
            plan.seed,
            SeedStrategy::Groups {
                only: Some("site-admins".into())
            }
        );
        assert_eq!(plan.steps, EnrichmentSteps::none());
        assert_eq!(plan.scope, LastActiveScope::Product("confluence".into()));
    }

    #[test]
    fn common_flags_become_overrides() {
        let cli = parse(&[
            "accessreport",
            "export",
            "confluence",
            "--base-url",
            "https://acme.atlassian.net",
            "--org-id",
            "org-9",
            "-o",
            "reports",
        ]);
        let ExportTarget::Confluence { common, .. } = target_of(cli) else {
            panic!("expected confluence target");
        };
        let overrides = common.overrides();
        assert_eq!(overrides.base_url.as_deref(), Some("https://acme.atlassian.net"));
        assert_eq!(overrides.org_id.as_deref(), Some("org-9"));
        assert_eq!(overrides.output_dir.as_deref(), Some("reports"));
        assert!(overrides.user_email.is_none());
    }
}
