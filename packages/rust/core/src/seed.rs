//! Seed acquisition: the initial user list for a run.

use tracing::{debug, info, instrument, warn};

use accessreport_client::AtlassianClient;
use accessreport_shared::{AccessReportError, Result, UserProfile, UserRecord};

/// Where the run's users come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SeedStrategy {
    /// Users assignable to a Jira project.
    Project { key: String },
    /// Members of wiki groups, each tagged with its group. `only` restricts
    /// the listing to one named group.
    Groups { only: Option<String> },
}

/// Skeleton records plus the count of seed entries dropped for lacking an
/// account id.
#[derive(Debug, Clone, Default)]
pub struct SeedOutcome {
    pub records: Vec<UserRecord>,
    pub skipped: usize,
}

impl SeedOutcome {
    fn push(&mut self, profile: UserProfile, group: Option<&str>) {
        match UserRecord::from_profile(profile, group.map(str::to_string)) {
            Some(record) => self.records.push(record),
            None => {
                warn!(group, "seed entry has no accountId, excluding it");
                self.skipped += 1;
            }
        }
    }
}

/// Fetch the seed list for `strategy`.
#[instrument(skip_all, fields(strategy = ?strategy))]
pub async fn acquire(client: &AtlassianClient, strategy: &SeedStrategy) -> Result<SeedOutcome> {
    let mut outcome = SeedOutcome::default();

    match strategy {
        SeedStrategy::Project { key } => {
            let users = client.assignable_users(key).await?;
            debug!(project = %key, users = users.len(), "assignable users fetched");
            for profile in users {
                outcome.push(profile, None);
            }
        }
        SeedStrategy::Groups { only } => {
            let groups = client.wiki_groups().await?;
            let selected: Vec<String> = match only {
                Some(name) => {
                    if !groups.iter().any(|g| &g.name == name) {
                        return Err(AccessReportError::validation(format!(
                            "group '{name}' not found ({} groups listed)",
                            groups.len()
                        )));
                    }
                    vec![name.clone()]
                }
                None => groups.into_iter().map(|g| g.name).collect(),
            };

            for group in &selected {
                let members = client.group_members(group).await?;
                debug!(%group, members = members.len(), "group members fetched");
                for profile in members {
                    outcome.push(profile, Some(group));
                }
            }
        }
    }

    info!(
        records = outcome.records.len(),
        skipped = outcome.skipped,
        "seed acquired"
    );

    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use accessreport_shared::{HttpPolicy, SiteCredentials};
    use url::Url;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> AtlassianClient {
        let site = SiteCredentials {
            base_url: Url::parse(&server.uri()).unwrap(),
            user_email: "admin@example.com".into(),
            api_token: "token".into(),
        };
        let policy = HttpPolicy {
            timeout: Duration::from_secs(5),
            concurrency: 2,
            max_retries: 0,
            retry_backoff: Duration::from_millis(1),
        };
        AtlassianClient::with_parts(site, None, policy).unwrap()
    }

    async fn mount_groups(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/wiki/rest/api/group"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"results": [{"name": "admins"}, {"name": "writers"}]}"#,
            ))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/wiki/rest/api/group/admins/member"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"results": [{"accountId": "u-1"}, {"publicName": "ghost"}]}"#,
            ))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/wiki/rest/api/group/writers/member"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"results": [{"accountId": "u-2"}, {"accountId": "u-1"}]}"#,
            ))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_groups_seed_tags_members() {
        let server = MockServer::start().await;
        mount_groups(&server).await;

        let outcome = acquire(&client_for(&server), &SeedStrategy::Groups { only: None })
            .await
            .unwrap();

        let pairs: Vec<(&str, Option<&str>)> = outcome
            .records
            .iter()
            .map(|r| (r.account_id.as_str(), r.group.as_deref()))
            .collect();
        assert_eq!(
            pairs,
            [
                ("u-1", Some("admins")),
                ("u-2", Some("writers")),
                ("u-1", Some("writers"))
            ]
        );
        assert_eq!(outcome.skipped, 1);
    }

    #[tokio::test]
    async fn test_single_group_filter() {
        let server = MockServer::start().await;
        mount_groups(&server).await;

        let strategy = SeedStrategy::Groups {
            only: Some("writers".into()),
        };
        let outcome = acquire(&client_for(&server), &strategy).await.unwrap();
        assert_eq!(outcome.records.len(), 2);
        assert!(outcome
            .records
            .iter()
            .all(|r| r.group.as_deref() == Some("writers")));
    }

    #[tokio::test]
    async fn test_unknown_group_is_rejected() {
        let server = MockServer::start().await;
        mount_groups(&server).await;

        let strategy = SeedStrategy::Groups {
            only: Some("nobody".into()),
        };
        let err = acquire(&client_for(&server), &strategy).await.unwrap_err();
        assert!(matches!(err, AccessReportError::Validation { .. }));
    }
}
