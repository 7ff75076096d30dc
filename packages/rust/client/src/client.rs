//! Authenticated JSON client for the site and organization admin APIs.
//!
//! Every call is an idempotent GET. Transient failures (5xx, timeouts,
//! connection errors) are retried a bounded number of times; client errors
//! are returned immediately.

use std::time::Duration;

use reqwest::Client;
use serde::de::DeserializeOwned;
use tracing::{debug, instrument, warn};
use url::Url;

use accessreport_shared::{
    AccessReportError, AdminCredentials, HttpPolicy, Result, Settings, SiteCredentials,
    UserProfile, millis,
};

use crate::models::{
    Group, GroupPage, LastActiveResponse, MemberPage, ProductAccess, ProjectRole, RoleDetail,
};

/// User-Agent string for API requests.
const USER_AGENT: &str = concat!("accessreport/", env!("CARGO_PKG_VERSION"));

/// Which credential a request carries.
#[derive(Debug, Clone, Copy)]
enum Auth {
    Site,
    Admin,
}

// ---------------------------------------------------------------------------
// AtlassianClient
// ---------------------------------------------------------------------------

/// Client bound to one site and, optionally, one organization.
///
/// Cheap to clone; clones share the underlying connection pool.
#[derive(Debug, Clone)]
pub struct AtlassianClient {
    http: Client,
    site: SiteCredentials,
    admin: Option<AdminCredentials>,
    policy: HttpPolicy,
}

impl AtlassianClient {
    /// Build a client from resolved run settings.
    pub fn new(settings: &Settings) -> Result<Self> {
        Self::with_parts(
            settings.site.clone(),
            settings.admin.clone(),
            settings.http.clone(),
        )
    }

    /// Build a client from explicit credentials and policy.
    pub fn with_parts(
        site: SiteCredentials,
        admin: Option<AdminCredentials>,
        policy: HttpPolicy,
    ) -> Result<Self> {
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(policy.timeout)
            .build()
            .map_err(|e| AccessReportError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            site,
            admin,
            policy,
        })
    }

    /// Whether admin credentials were configured.
    pub fn has_admin(&self) -> bool {
        self.admin.is_some()
    }

    /// Concurrent per-user lookups allowed by the HTTP policy.
    pub fn concurrency(&self) -> usize {
        self.policy.concurrency.max(1)
    }

    // -----------------------------------------------------------------------
    // Seed endpoints
    // -----------------------------------------------------------------------

    /// `GET /rest/api/3/user/assignable/search?project={key}`
    #[instrument(skip(self))]
    pub async fn assignable_users(&self, project_key: &str) -> Result<Vec<UserProfile>> {
        let mut url = self.site_url(&["rest", "api", "3", "user", "assignable", "search"])?;
        url.query_pairs_mut().append_pair("project", project_key);
        self.get_json(url, Auth::Site).await
    }

    /// `GET /wiki/rest/api/group`
    #[instrument(skip(self))]
    pub async fn wiki_groups(&self) -> Result<Vec<Group>> {
        let url = self.site_url(&["wiki", "rest", "api", "group"])?;
        let page: GroupPage = self.get_json(url, Auth::Site).await?;
        Ok(page.results)
    }

    /// `GET /wiki/rest/api/group/{name}/member`
    #[instrument(skip(self))]
    pub async fn group_members(&self, group_name: &str) -> Result<Vec<UserProfile>> {
        let url = self.site_url(&["wiki", "rest", "api", "group", group_name, "member"])?;
        let page: MemberPage = self.get_json(url, Auth::Site).await?;
        Ok(page.results)
    }

    // -----------------------------------------------------------------------
    // Enrichment endpoints
    // -----------------------------------------------------------------------

    /// `GET {admin}/admin/v1/orgs/{org}/directory/users/{id}/last-active-dates`
    pub async fn last_active_dates(&self, account_id: &str) -> Result<Vec<ProductAccess>> {
        let admin = self.admin.as_ref().ok_or_else(|| {
            AccessReportError::config("admin credentials are required for last-active lookups")
        })?;
        let url = extend_url(
            &admin.base_url,
            &[
                "admin",
                "v1",
                "orgs",
                &admin.org_id,
                "directory",
                "users",
                account_id,
                "last-active-dates",
            ],
        )?;
        let response: LastActiveResponse = self.get_json(url, Auth::Admin).await?;
        Ok(response.data.product_access)
    }

    /// `GET /rest/api/3/user/groups?accountId={id}`
    pub async fn user_groups(&self, account_id: &str) -> Result<Vec<Group>> {
        let mut url = self.site_url(&["rest", "api", "3", "user", "groups"])?;
        url.query_pairs_mut().append_pair("accountId", account_id);
        self.get_json(url, Auth::Site).await
    }

    /// `GET /rest/api/3/project/{key}/role`, in the order the API lists them.
    #[instrument(skip(self))]
    pub async fn project_roles(&self, project_key: &str) -> Result<Vec<ProjectRole>> {
        let url = self.site_url(&["rest", "api", "3", "project", project_key, "role"])?;
        let map: serde_json::Map<String, serde_json::Value> =
            self.get_json(url.clone(), Auth::Site).await?;

        map.into_iter()
            .map(|(name, value)| {
                let raw = value.as_str().ok_or_else(|| {
                    AccessReportError::malformed(
                        url.as_str(),
                        format!("role '{name}' does not map to a URL"),
                    )
                })?;
                let role_url = Url::parse(raw).map_err(|e| {
                    AccessReportError::malformed(url.as_str(), format!("role '{name}': {e}"))
                })?;
                Ok(ProjectRole {
                    name,
                    url: role_url,
                })
            })
            .collect()
    }

    /// Follow a role detail URL and return the account ids of its user actors.
    ///
    /// The URL must point at the configured site; site credentials are never
    /// sent to another origin.
    pub async fn role_actors(&self, role: &ProjectRole) -> Result<Vec<String>> {
        if role.url.origin() != self.site.base_url.origin() {
            return Err(AccessReportError::validation(format!(
                "role '{}' points outside the site: {}",
                role.name, role.url
            )));
        }
        let detail: RoleDetail = self.get_json(role.url.clone(), Auth::Site).await?;
        Ok(detail.account_ids())
    }

    // -----------------------------------------------------------------------
    // Transport
    // -----------------------------------------------------------------------

    fn site_url(&self, segments: &[&str]) -> Result<Url> {
        extend_url(&self.site.base_url, segments)
    }

    /// GET and decode, retrying transient failures.
    async fn get_json<T: DeserializeOwned>(&self, url: Url, auth: Auth) -> Result<T> {
        let mut attempt: u32 = 0;
        loop {
            match self.get_once(&url, auth).await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < self.policy.max_retries && is_transient(&e) => {
                    let delay = backoff_delay(self.policy.retry_backoff, attempt);
                    attempt += 1;
                    warn!(
                        %url,
                        attempt,
                        delay_ms = millis(delay),
                        error = %e,
                        "transient failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn get_once<T: DeserializeOwned>(&self, url: &Url, auth: Auth) -> Result<T> {
        debug!(%url, "GET");

        let request = self
            .http
            .get(url.as_str())
            .header(reqwest::header::ACCEPT, "application/json");
        let request = match auth {
            Auth::Site => request.basic_auth(&self.site.user_email, Some(&self.site.api_token)),
            Auth::Admin => match &self.admin {
                Some(admin) => request.bearer_auth(&admin.api_token),
                None => {
                    return Err(AccessReportError::config(
                        "admin credentials are required for this request",
                    ));
                }
            },
        };

        let response = request
            .send()
            .await
            .map_err(|e| AccessReportError::Network(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            debug!(%url, status = status.as_u16(), "request failed");
            return Err(AccessReportError::from_status(url.as_str(), status.as_u16()));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| AccessReportError::Network(format!("{url}: body read failed: {e}")))?;

        serde_json::from_slice(&body)
            .map_err(|e| AccessReportError::malformed(url.as_str(), e.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Append percent-encoded path segments to a base URL.
fn extend_url(base: &Url, segments: &[&str]) -> Result<Url> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| AccessReportError::config(format!("'{base}' cannot be used as a base URL")))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

fn is_transient(err: &AccessReportError) -> bool {
    matches!(
        err,
        AccessReportError::Server { .. } | AccessReportError::Network(_)
    )
}

/// `base * 2^attempt`, saturating.
fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(1u32 << attempt.min(16))
}
