//! Core domain types for user access reports.

use serde::{Deserialize, Serialize};

/// Placeholder written for an attribute that could not be determined.
pub const NOT_AVAILABLE: &str = "N/A";

// ---------------------------------------------------------------------------
// Variant
// ---------------------------------------------------------------------------

/// Which product an export describes. Each variant fixes its seed source,
/// its output file name, and its column allow-list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Variant {
    /// Users assignable to one Jira project.
    Jira,
    /// Members of Confluence groups.
    Confluence,
}

impl Variant {
    /// Output file name, written under the configured output directory.
    pub fn file_name(self) -> &'static str {
        match self {
            Self::Jira => "jira_users.csv",
            Self::Confluence => "confluence_users.csv",
        }
    }

    /// Ordered output columns. The header row equals this list.
    pub fn columns(self) -> &'static [Column] {
        match self {
            Self::Jira => JIRA_COLUMNS,
            Self::Confluence => CONFLUENCE_COLUMNS,
        }
    }

    /// Product key used by the admin directory's `product_access` entries.
    pub fn product_key(self) -> &'static str {
        match self {
            Self::Jira => "jira-software",
            Self::Confluence => "confluence",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Jira => "jira",
            Self::Confluence => "confluence",
        }
    }
}

impl std::fmt::Display for Variant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Column
// ---------------------------------------------------------------------------

/// A single output column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Column {
    Type,
    AccountId,
    AccountType,
    EmailAddress,
    Email,
    PublicName,
    DisplayName,
    Active,
    TimeZone,
    Locale,
    IsExternalCollaborator,
    Group,
    LastActiveDate,
    Groups,
    Roles,
}

const JIRA_COLUMNS: &[Column] = &[
    Column::AccountId,
    Column::AccountType,
    Column::EmailAddress,
    Column::DisplayName,
    Column::Active,
    Column::TimeZone,
    Column::Locale,
    Column::LastActiveDate,
    Column::Groups,
    Column::Roles,
];

const CONFLUENCE_COLUMNS: &[Column] = &[
    Column::Type,
    Column::AccountId,
    Column::AccountType,
    Column::Email,
    Column::PublicName,
    Column::DisplayName,
    Column::IsExternalCollaborator,
    Column::Group,
    Column::LastActiveDate,
];

impl Column {
    /// Header cell text.
    pub fn header(self) -> &'static str {
        match self {
            Self::Type => "type",
            Self::AccountId => "accountId",
            Self::AccountType => "accountType",
            Self::EmailAddress => "emailAddress",
            Self::Email => "email",
            Self::PublicName => "publicName",
            Self::DisplayName => "displayName",
            Self::Active => "active",
            Self::TimeZone => "timeZone",
            Self::Locale => "locale",
            Self::IsExternalCollaborator => "isExternalCollaborator",
            Self::Group => "group",
            Self::LastActiveDate => "last_active_date",
            Self::Groups => "groups",
            Self::Roles => "roles",
        }
    }
}

// ---------------------------------------------------------------------------
// UserProfile
// ---------------------------------------------------------------------------

/// Raw user object as returned by a seed endpoint.
///
/// Fields outside this set (`avatarUrls`, `self`, `profilePicture`, ...)
/// are ignored on deserialization.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    #[serde(rename = "type", default)]
    pub user_type: Option<String>,
    #[serde(default)]
    pub account_id: Option<String>,
    #[serde(default)]
    pub account_type: Option<String>,
    #[serde(default)]
    pub email_address: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub public_name: Option<String>,
    #[serde(default)]
    pub active: Option<bool>,
    #[serde(default)]
    pub time_zone: Option<String>,
    #[serde(default)]
    pub locale: Option<String>,
    #[serde(default)]
    pub is_external_collaborator: Option<bool>,
}

// ---------------------------------------------------------------------------
// LastActive
// ---------------------------------------------------------------------------

/// Outcome of the last-active lookup for one user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LastActive {
    /// Most recent `last_active` timestamp within the lookup scope.
    Seen(String),
    /// No product-access entry matched the scope.
    NoActivity,
    /// The admin directory refused the lookup for this user.
    Unauthorized { reason: String },
}

impl LastActive {
    /// Cell text: the timestamp, or [`NOT_AVAILABLE`].
    pub fn as_cell(&self) -> &str {
        match self {
            Self::Seen(date) => date,
            Self::NoActivity | Self::Unauthorized { .. } => NOT_AVAILABLE,
        }
    }

    pub fn is_fallback(&self) -> bool {
        !matches!(self, Self::Seen(_))
    }
}

/// Which product-access entries the last-active lookup considers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LastActiveScope {
    /// Only entries whose `key` equals this product key.
    Product(String),
    /// Every entry regardless of product.
    AllProducts,
}

impl LastActiveScope {
    /// Interpret a configured scope setting for a variant.
    ///
    /// `"product"` (or empty) selects the variant's own product, `"all"`
    /// selects every product, anything else is taken as a product key.
    pub fn from_setting(setting: &str, variant: Variant) -> Self {
        match setting.trim() {
            "" | "product" => Self::Product(variant.product_key().to_string()),
            "all" => Self::AllProducts,
            key => Self::Product(key.to_string()),
        }
    }
}

impl std::fmt::Display for LastActiveScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Product(key) => write!(f, "product:{key}"),
            Self::AllProducts => f.write_str("all"),
        }
    }
}

// ---------------------------------------------------------------------------
// UserRecord
// ---------------------------------------------------------------------------

/// One user moving through the export pipeline.
///
/// Enrichment slots start empty and are filled at most once.
#[derive(Debug, Clone, PartialEq)]
pub struct UserRecord {
    /// Non-empty account identifier; the batch key.
    pub account_id: String,
    /// Profile attributes from the seed endpoint.
    pub profile: UserProfile,
    /// Source group, for group-seeded exports.
    pub group: Option<String>,
    pub last_active: Option<LastActive>,
    pub groups: Option<Vec<String>>,
    pub roles: Option<Vec<String>>,
}

impl UserRecord {
    /// Build a skeleton record. Returns `None` when the profile has no
    /// usable account id.
    pub fn from_profile(profile: UserProfile, group: Option<String>) -> Option<Self> {
        let account_id = profile
            .account_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())?
            .to_string();

        Some(Self {
            account_id,
            profile,
            group,
            last_active: None,
            groups: None,
            roles: None,
        })
    }
}
