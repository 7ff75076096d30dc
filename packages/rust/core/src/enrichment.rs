//! Per-user enrichment steps.
//!
//! Each step fills exactly one [`UserRecord`] slot and reads nothing another
//! step writes, so the steps can run in any order and any number of times.
//! The role table is fetched once per run and shared read-only by every
//! worker.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use accessreport_client::{AtlassianClient, ProductAccess};
use accessreport_shared::{LastActive, LastActiveScope, Result, UserRecord, Variant};

/// Separator used when a list attribute is flattened into one cell.
pub const LIST_SEPARATOR: &str = ", ";

// ---------------------------------------------------------------------------
// Step selection
// ---------------------------------------------------------------------------

/// Which enrichment steps a run performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnrichmentSteps {
    pub last_active: bool,
    pub groups: bool,
    pub roles: bool,
}

impl EnrichmentSteps {
    /// The step set each export variant runs by default.
    pub fn for_variant(variant: Variant) -> Self {
        match variant {
            Variant::Jira => Self {
                last_active: true,
                groups: true,
                roles: true,
            },
            Variant::Confluence => Self {
                last_active: true,
                groups: false,
                roles: false,
            },
        }
    }

    pub fn none() -> Self {
        Self {
            last_active: false,
            groups: false,
            roles: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Pure resolution helpers
// ---------------------------------------------------------------------------

/// Pick the most recent `last_active` within `scope`.
///
/// Timestamps are ISO-8601, so the lexicographic maximum is the latest.
pub fn resolve_last_active(entries: &[ProductAccess], scope: &LastActiveScope) -> LastActive {
    entries
        .iter()
        .filter(|entry| match scope {
            LastActiveScope::Product(key) => &entry.key == key,
            LastActiveScope::AllProducts => true,
        })
        .map(|entry| entry.last_active.as_str())
        .max()
        .map_or(LastActive::NoActivity, |date| LastActive::Seen(date.to_string()))
}

/// Join names for a single cell, keeping their order.
pub fn join_names<S: AsRef<str>>(names: &[S]) -> String {
    names
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join(LIST_SEPARATOR)
}

// ---------------------------------------------------------------------------
// RoleDirectory
// ---------------------------------------------------------------------------

/// Project roles with the account ids holding each, in API order.
#[derive(Debug, Clone, Default)]
pub struct RoleDirectory {
    roles: Vec<(String, HashSet<String>)>,
}

impl RoleDirectory {
    /// Fetch the role table and every role's actor list for `project_key`.
    #[instrument(skip(client))]
    pub async fn fetch(client: &AtlassianClient, project_key: &str) -> Result<Self> {
        let table = client.project_roles(project_key).await?;
        let mut roles = Vec::with_capacity(table.len());

        for role in &table {
            let actors = client.role_actors(role).await?;
            debug!(role = %role.name, actors = actors.len(), "role actors fetched");
            roles.push((role.name.clone(), actors.into_iter().collect()));
        }

        info!(roles = roles.len(), "role directory loaded");
        Ok(Self { roles })
    }

    /// Build a directory from already-known memberships.
    pub fn from_memberships<I, S>(memberships: I) -> Self
    where
        I: IntoIterator<Item = (S, Vec<S>)>,
        S: Into<String>,
    {
        Self {
            roles: memberships
                .into_iter()
                .map(|(name, ids)| (name.into(), ids.into_iter().map(Into::into).collect()))
                .collect(),
        }
    }

    /// Names of the roles `account_id` holds, in directory order.
    pub fn roles_for(&self, account_id: &str) -> Vec<String> {
        self.roles
            .iter()
            .filter(|(_, members)| members.contains(account_id))
            .map(|(name, _)| name.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.roles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Enrichment
// ---------------------------------------------------------------------------

/// Attributes gathered for one account.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Enrichment {
    pub last_active: Option<LastActive>,
    pub groups: Option<Vec<String>>,
    pub roles: Option<Vec<String>>,
}

impl Enrichment {
    /// Fill the record's empty slots. Slots that already hold a value keep it.
    pub fn apply_to(self, record: &mut UserRecord) {
        fill(&mut record.last_active, self.last_active);
        fill(&mut record.groups, self.groups);
        fill(&mut record.roles, self.roles);
    }
}

fn fill<T>(slot: &mut Option<T>, value: Option<T>) {
    if slot.is_none() {
        *slot = value;
    }
}

/// Runs the selected steps for one account at a time.
#[derive(Debug, Clone)]
pub struct Enricher {
    client: AtlassianClient,
    steps: EnrichmentSteps,
    scope: LastActiveScope,
    roles: Option<Arc<RoleDirectory>>,
}

impl Enricher {
    pub fn new(
        client: AtlassianClient,
        steps: EnrichmentSteps,
        scope: LastActiveScope,
        roles: Option<Arc<RoleDirectory>>,
    ) -> Self {
        Self {
            client,
            steps,
            scope,
            roles,
        }
    }

    /// Gather every selected attribute for `account_id`.
    pub async fn enrich(&self, account_id: &str) -> Result<Enrichment> {
        let mut enrichment = Enrichment::default();

        if self.steps.last_active {
            enrichment.last_active = Some(self.last_active(account_id).await?);
        }

        if self.steps.groups {
            let groups = self.client.user_groups(account_id).await?;
            enrichment.groups = Some(groups.into_iter().map(|g| g.name).collect());
        }

        if let Some(directory) = self.roles.as_deref().filter(|_| self.steps.roles) {
            enrichment.roles = Some(directory.roles_for(account_id));
        }

        Ok(enrichment)
    }

    /// A 401 for this one user becomes a fallback value; any other failure
    /// aborts the run.
    async fn last_active(&self, account_id: &str) -> Result<LastActive> {
        match self.client.last_active_dates(account_id).await {
            Ok(entries) => Ok(resolve_last_active(&entries, &self.scope)),
            Err(e) if e.is_unauthorized() => {
                warn!(
                    account_id,
                    error = %e,
                    "last-active lookup unauthorized, recording N/A"
                );
                Ok(LastActive::Unauthorized {
                    reason: e.to_string(),
                })
            }
            Err(e) => Err(e),
        }
    }
}
