//! Response shapes for the site and admin endpoints.
//!
//! User objects deserialize straight into [`UserProfile`]; everything else
//! lives here. Required keys stay required so that a response missing them
//! surfaces as a malformed-response error.

use serde::Deserialize;
use url::Url;

use accessreport_shared::UserProfile;

/// A group as listed by the wiki or returned for a user.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Group {
    pub name: String,
}

/// `GET /wiki/rest/api/group` response.
#[derive(Debug, Deserialize)]
pub(crate) struct GroupPage {
    pub results: Vec<Group>,
}

/// `GET /wiki/rest/api/group/{name}/member` response.
#[derive(Debug, Deserialize)]
pub(crate) struct MemberPage {
    pub results: Vec<UserProfile>,
}

/// One product the user has accessed, from the admin directory.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProductAccess {
    pub key: String,
    pub last_active: String,
}

/// `GET .../last-active-dates` response. Absent `data` or `product_access`
/// means "no activity", not a malformed body.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct LastActiveResponse {
    #[serde(default)]
    pub data: LastActiveData,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct LastActiveData {
    #[serde(default)]
    pub product_access: Vec<ProductAccess>,
}

/// A project role name and the URL of its detail resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectRole {
    pub name: String,
    pub url: Url,
}

/// Role detail resource; only the actor list is read.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct RoleDetail {
    #[serde(default)]
    pub actors: Vec<RoleActor>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RoleActor {
    #[serde(rename = "actorUser", default)]
    pub actor_user: Option<ActorUser>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ActorUser {
    #[serde(rename = "accountId", default)]
    pub account_id: Option<String>,
}

impl RoleDetail {
    /// Account ids of the user actors; group actors carry no `actorUser`.
    pub fn account_ids(self) -> Vec<String> {
        self.actors
            .into_iter()
            .filter_map(|actor| actor.actor_user.and_then(|user| user.account_id))
            .collect()
    }
}
