//! Projection of merged records onto a variant's fixed column list.

use accessreport_shared::{Column, UserRecord};

use crate::enrichment::join_names;

/// Header cells for `columns`.
pub fn headers(columns: &[Column]) -> Vec<&'static str> {
    columns.iter().map(|c| c.header()).collect()
}

/// One output row per record, cells in column order.
pub fn project(records: &[UserRecord], columns: &[Column]) -> Vec<Vec<String>> {
    records
        .iter()
        .map(|record| columns.iter().map(|&column| cell(column, record)).collect())
        .collect()
}

/// Render a single cell. Absent values render empty; booleans render as
/// `True`/`False`.
pub fn cell(column: Column, record: &UserRecord) -> String {
    let profile = &record.profile;
    match column {
        Column::Type => text(&profile.user_type),
        Column::AccountId => record.account_id.clone(),
        Column::AccountType => text(&profile.account_type),
        Column::EmailAddress => text(&profile.email_address),
        Column::Email => text(&profile.email),
        Column::PublicName => text(&profile.public_name),
        Column::DisplayName => text(&profile.display_name),
        Column::Active => flag(profile.active),
        Column::TimeZone => text(&profile.time_zone),
        Column::Locale => text(&profile.locale),
        Column::IsExternalCollaborator => flag(profile.is_external_collaborator),
        Column::Group => text(&record.group),
        Column::LastActiveDate => record
            .last_active
            .as_ref()
            .map(|la| la.as_cell().to_string())
            .unwrap_or_default(),
        Column::Groups => record.groups.as_deref().map(join_names).unwrap_or_default(),
        Column::Roles => record.roles.as_deref().map(join_names).unwrap_or_default(),
    }
}

fn text(value: &Option<String>) -> String {
    value.clone().unwrap_or_default()
}

fn flag(value: Option<bool>) -> String {
    match value {
        Some(true) => "True".into(),
        Some(false) => "False".into(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use accessreport_shared::{LastActive, UserProfile, Variant};

    fn jira_record() -> UserRecord {
        let profile = UserProfile {
            account_id: Some("u-1".into()),
            account_type: Some("atlassian".into()),
            email_address: Some("ada@example.com".into()),
            display_name: Some("Ada".into()),
            active: Some(true),
            time_zone: Some("Europe/London".into()),
            locale: Some("en_GB".into()),
            public_name: Some("not exported for jira".into()),
            ..Default::default()
        };
        let mut record = UserRecord::from_profile(profile, None).unwrap();
        record.last_active = Some(LastActive::Seen("2024-01-01".into()));
        record.groups = Some(vec!["Admins".into(), "Developers".into()]);
        record.roles = Some(vec!["Developers".into()]);
        record
    }

    #[test]
    fn jira_projection_follows_allow_list() {
        let row = &project(&[jira_record()], Variant::Jira.columns())[0];
        assert_eq!(
            row,
            &[
                "u-1",
                "atlassian",
                "ada@example.com",
                "Ada",
                "True",
                "Europe/London",
                "en_GB",
                "2024-01-01",
                "Admins, Developers",
                "Developers"
            ]
        );
    }

    #[test]
    fn confluence_projection_with_missing_fields() {
        let profile = UserProfile {
            user_type: Some("known".into()),
            account_id: Some("c-1".into()),
            is_external_collaborator: Some(false),
            ..Default::default()
        };
        let mut record = UserRecord::from_profile(profile, Some("writers".into())).unwrap();
        record.last_active = Some(LastActive::NoActivity);

        let row = &project(&[record], Variant::Confluence.columns())[0];
        assert_eq!(
            row,
            &["known", "c-1", "", "", "", "", "False", "writers", "N/A"]
        );
    }

    #[test]
    fn unenriched_slots_render_empty() {
        let profile = UserProfile {
            account_id: Some("u-2".into()),
            ..Default::default()
        };
        let record = UserRecord::from_profile(profile, None).unwrap();
        assert_eq!(cell(Column::LastActiveDate, &record), "");
        assert_eq!(cell(Column::Roles, &record), "");
    }

    #[test]
    fn headers_match_columns() {
        assert_eq!(
            headers(Variant::Confluence.columns()),
            [
                "type",
                "accountId",
                "accountType",
                "email",
                "publicName",
                "displayName",
                "isExternalCollaborator",
                "group",
                "last_active_date"
            ]
        );
    }
}
