//! End-to-end export pipeline: seed → enrich → merge → project → write.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use accessreport_client::AtlassianClient;
use accessreport_export::ExportSummary;
use accessreport_shared::{
    AccessReportError, LastActive, LastActiveScope, Result, UserRecord, Variant, millis,
    validate_project_key,
};

use crate::enrichment::{Enricher, Enrichment, EnrichmentSteps, RoleDirectory};
use crate::projection;
use crate::seed::{self, SeedStrategy};

/// What a run exports and how.
#[derive(Debug, Clone)]
pub struct ExportPlan {
    pub variant: Variant,
    pub seed: SeedStrategy,
    pub steps: EnrichmentSteps,
    pub scope: LastActiveScope,
    /// Project whose roles are resolved; required when `steps.roles` is set.
    pub project_key: Option<String>,
    /// Maximum accounts enriched at once; `None` uses the client's policy.
    pub concurrency: Option<usize>,
}

impl ExportPlan {
    /// Jira export: assignable users of `project_key`, fully enriched.
    pub fn jira(project_key: impl Into<String>, scope_setting: &str) -> Self {
        let key = project_key.into();
        Self {
            variant: Variant::Jira,
            seed: SeedStrategy::Project { key: key.clone() },
            steps: EnrichmentSteps::for_variant(Variant::Jira),
            scope: LastActiveScope::from_setting(scope_setting, Variant::Jira),
            project_key: Some(key),
            concurrency: None,
        }
    }

    /// Confluence export: members of every wiki group, or of `group` only.
    pub fn confluence(group: Option<String>, scope_setting: &str) -> Self {
        Self {
            variant: Variant::Confluence,
            seed: SeedStrategy::Groups { only: group },
            steps: EnrichmentSteps::for_variant(Variant::Confluence),
            scope: LastActiveScope::from_setting(scope_setting, Variant::Confluence),
            project_key: None,
            concurrency: None,
        }
    }

    pub fn with_steps(mut self, steps: EnrichmentSteps) -> Self {
        self.steps = steps;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = Some(concurrency.max(1));
        self
    }

    /// Check the plan against the client before any request is made.
    pub fn validate(&self, client: &AtlassianClient) -> Result<()> {
        if let SeedStrategy::Project { key } = &self.seed {
            validate_project_key(key)?;
        }
        if self.steps.roles {
            match &self.project_key {
                Some(key) => validate_project_key(key)?,
                None => {
                    return Err(AccessReportError::validation(
                        "role lookup needs a project key",
                    ));
                }
            }
        }
        if self.steps.last_active && !client.has_admin() {
            return Err(AccessReportError::config(
                "last-active lookup needs organization admin credentials",
            ));
        }
        Ok(())
    }
}

/// Result of a completed export.
#[derive(Debug, Clone)]
pub struct ExportResult {
    pub variant: Variant,
    pub summary: ExportSummary,
    /// Seed entries excluded for lacking an account id.
    pub skipped: usize,
    /// Rows whose last-active cell holds the N/A sentinel.
    pub last_active_fallbacks: usize,
    /// Rows whose last-active lookup was refused (subset of the fallbacks).
    pub last_active_unauthorized: usize,
    pub elapsed: Duration,
}

/// Merged records ready for projection.
#[derive(Debug, Clone, Default)]
pub struct CollectedRecords {
    pub records: Vec<UserRecord>,
    pub skipped: usize,
}

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called when one account's enrichment has been merged.
    fn user_enriched(&self, account_id: &str, current: usize, total: usize);
    /// Called when the pipeline completes.
    fn done(&self, result: &ExportResult);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn user_enriched(&self, _account_id: &str, _current: usize, _total: usize) {}
    fn done(&self, _result: &ExportResult) {}
}

/// Run the full export and write the report into `output_dir`.
///
/// 1. Seed: fetch the user list
/// 2. Roles: load the role directory once (if enabled)
/// 3. Enrich: one bounded task per distinct account
/// 4. Project onto the variant's columns
/// 5. Write the CSV atomically
///
/// Nothing is written unless every step before the write succeeds.
#[instrument(skip_all, fields(run_id = %Uuid::now_v7(), variant = %plan.variant, scope = %plan.scope))]
pub async fn run_export(
    client: &AtlassianClient,
    plan: &ExportPlan,
    output_dir: &Path,
    progress: &dyn ProgressReporter,
) -> Result<ExportResult> {
    let start = Instant::now();
    plan.validate(client)?;

    info!(dir = %output_dir.display(), "starting export");

    let collected = collect_records(client, plan, progress).await?;

    progress.phase("Writing report");
    let columns = plan.variant.columns();
    let headers = projection::headers(columns);
    let rows = projection::project(&collected.records, columns);
    let summary =
        accessreport_export::write_csv(output_dir, plan.variant.file_name(), &headers, &rows)?;

    let last_active_fallbacks = collected
        .records
        .iter()
        .filter(|r| r.last_active.as_ref().is_some_and(|la| la.is_fallback()))
        .count();
    let last_active_unauthorized = collected
        .records
        .iter()
        .filter(|r| {
            matches!(r.last_active, Some(LastActive::Unauthorized { .. }))
        })
        .count();

    let result = ExportResult {
        variant: plan.variant,
        summary,
        skipped: collected.skipped,
        last_active_fallbacks,
        last_active_unauthorized,
        elapsed: start.elapsed(),
    };

    info!(
        rows = result.summary.rows,
        skipped = result.skipped,
        fallbacks = result.last_active_fallbacks,
        elapsed_ms = millis(result.elapsed),
        "export complete"
    );

    progress.done(&result);
    Ok(result)
}

/// Seed, enrich, and merge, without writing anything.
pub async fn collect_records(
    client: &AtlassianClient,
    plan: &ExportPlan,
    progress: &dyn ProgressReporter,
) -> Result<CollectedRecords> {
    progress.phase("Fetching users");
    let seed = seed::acquire(client, &plan.seed).await?;
    let mut records = seed.records;

    if plan.steps == EnrichmentSteps::none() || records.is_empty() {
        return Ok(CollectedRecords {
            records,
            skipped: seed.skipped,
        });
    }

    let roles = match (&plan.project_key, plan.steps.roles) {
        (Some(key), true) => {
            progress.phase("Loading project roles");
            let directory = RoleDirectory::fetch(client, key).await?;
            if directory.is_empty() {
                warn!(project = %key, "project defines no roles, roles column will be empty");
            }
            Some(Arc::new(directory))
        }
        _ => None,
    };

    progress.phase("Enriching users");
    let enricher = Arc::new(Enricher::new(
        client.clone(),
        plan.steps,
        plan.scope.clone(),
        roles,
    ));

    let concurrency = plan.concurrency.unwrap_or_else(|| client.concurrency());
    let enrichments =
        enrich_all(enricher, unique_account_ids(&records), concurrency, progress).await?;

    for record in &mut records {
        if let Some(enrichment) = enrichments.get(&record.account_id) {
            enrichment.clone().apply_to(record);
        }
    }

    Ok(CollectedRecords {
        records,
        skipped: seed.skipped,
    })
}

/// Distinct account ids in first-seen order. An account seeded from several
/// groups is looked up once.
fn unique_account_ids(records: &[UserRecord]) -> Vec<String> {
    let mut seen = HashSet::new();
    records
        .iter()
        .filter(|r| seen.insert(r.account_id.as_str()))
        .map(|r| r.account_id.clone())
        .collect()
}

/// Enrich every account on a bounded set of tasks. The first failure aborts
/// the remaining tasks and is returned.
async fn enrich_all(
    enricher: Arc<Enricher>,
    account_ids: Vec<String>,
    concurrency: usize,
    progress: &dyn ProgressReporter,
) -> Result<HashMap<String, Enrichment>> {
    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
    let total = account_ids.len();

    let handles: Vec<_> = account_ids
        .into_iter()
        .map(|account_id| {
            let enricher = enricher.clone();
            let sem = semaphore.clone();
            tokio::spawn(async move {
                let _permit = sem
                    .acquire_owned()
                    .await
                    .map_err(|e| AccessReportError::Task(format!("worker pool closed: {e}")))?;
                let enrichment = enricher.enrich(&account_id).await?;
                Ok::<_, AccessReportError>((account_id, enrichment))
            })
        })
        .collect();

    let mut enrichments = HashMap::with_capacity(total);
    let mut handles = handles.into_iter();

    while let Some(handle) = handles.next() {
        let outcome = match handle.await {
            Ok(outcome) => outcome,
            Err(e) => Err(AccessReportError::Task(e.to_string())),
        };

        match outcome {
            Ok((account_id, enrichment)) => {
                progress.user_enriched(&account_id, enrichments.len() + 1, total);
                enrichments.insert(account_id, enrichment);
            }
            Err(e) => {
                for pending in handles {
                    pending.abort();
                }
                return Err(e);
            }
        }
    }

    Ok(enrichments)
}
