//! Card-facing membership details derived from provider metadata and groups.

use chrono::{DateTime, Months, NaiveDate, TimeZone, Utc};
use common_auth::IdentityRecord;
use common_security::AccessLevel;
use serde::Serialize;
use tracing::warn;

const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MembershipStatus {
    Inactive,
    Active,
    Suspended,
    Expired,
}

impl MembershipStatus {
    /// Case-insensitive; unknown values yield `None`.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "active" => Some(Self::Active),
            "suspended" => Some(Self::Suspended),
            "expired" => Some(Self::Expired),
            "inactive" => Some(Self::Inactive),
            _ => None,
        }
    }

    fn from_group(group: &str) -> Option<Self> {
        match group {
            "suspended-members" | "account-suspended" => Some(Self::Suspended),
            "expired-members" | "account-expired" => Some(Self::Expired),
            "inactive-members" => Some(Self::Inactive),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Inactive => "Inactive",
            Self::Active => "Active",
            Self::Suspended => "Suspended",
            Self::Expired => "Expired",
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }
}

impl std::fmt::Display for MembershipStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MembershipInfo {
    pub membership_type: String,
    pub status: MembershipStatus,
    pub access_level: AccessLevel,
    pub access_description: &'static str,
    pub access_permissions: &'static [&'static str],
    pub join_date: DateTime<Utc>,
    pub expiry_date: DateTime<Utc>,
}

pub fn derive_membership(
    record: &IdentityRecord,
    level: AccessLevel,
    now: DateTime<Utc>,
) -> MembershipInfo {
    MembershipInfo {
        membership_type: membership_type(record, level),
        status: membership_status(record, level),
        access_level: level,
        access_description: level.description(),
        access_permissions: level.permissions(),
        join_date: join_date(record, now),
        expiry_date: expiry_date(record, now),
    }
}

fn membership_type(record: &IdentityRecord, level: AccessLevel) -> String {
    if let Some(kind) = record
        .membership
        .membership_type
        .as_deref()
        .filter(|kind| !kind.is_empty())
    {
        return kind.to_string();
    }
    match level {
        AccessLevel::NoAccess => "No Access",
        AccessLevel::LimitedVolunteer => "Limited Volunteer",
        AccessLevel::FullMember => "Full Member",
        AccessLevel::Staff => "Staff Member",
        AccessLevel::Admin => "Administrator",
    }
    .to_string()
}

fn membership_status(record: &IdentityRecord, level: AccessLevel) -> MembershipStatus {
    if let Some(status) = record
        .membership
        .status
        .as_deref()
        .and_then(MembershipStatus::parse)
    {
        return status;
    }
    if let Some(status) = record
        .groups
        .iter()
        .find_map(|group| MembershipStatus::from_group(group))
    {
        return status;
    }
    if level > AccessLevel::NoAccess {
        MembershipStatus::Active
    } else {
        MembershipStatus::Inactive
    }
}

fn join_date(record: &IdentityRecord, now: DateTime<Utc>) -> DateTime<Utc> {
    record
        .membership
        .member_since
        .as_deref()
        .and_then(|raw| parse_date(raw, "member_since"))
        .unwrap_or_else(|| shift_months(now, -12))
}

fn expiry_date(record: &IdentityRecord, now: DateTime<Utc>) -> DateTime<Utc> {
    if let Some(date) = record
        .membership
        .expiry_date
        .as_deref()
        .and_then(|raw| parse_date(raw, "expiry_date"))
    {
        return date;
    }

    let in_group = |name: &str| record.groups.iter().any(|group| group == name);
    if in_group("annual-members") {
        return shift_months(now, 12);
    }
    if in_group("lifetime-members") {
        return shift_months(now, 1200);
    }
    if in_group("monthly-members") {
        return shift_months(now, 1);
    }
    if let Some(end_of_year) = record.groups.iter().find_map(|group| expires_group_year(group)) {
        return end_of_year;
    }

    shift_months(now, 12)
}

fn expires_group_year(group: &str) -> Option<DateTime<Utc>> {
    let year = group.strip_prefix("expires-")?;
    if year.len() != 4 || !year.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let year: i32 = year.parse().ok()?;
    Utc.with_ymd_and_hms(year, 12, 31, 23, 59, 59).single()
}

fn parse_date(raw: &str, field: &'static str) -> Option<DateTime<Utc>> {
    match NaiveDate::parse_from_str(raw.trim(), DATE_FORMAT) {
        Ok(date) => date
            .and_hms_opt(0, 0, 0)
            .map(|naive| Utc.from_utc_datetime(&naive)),
        Err(err) => {
            warn!(field, value = %raw, error = %err, "membership_date_unparseable");
            None
        }
    }
}

fn shift_months(now: DateTime<Utc>, months: i32) -> DateTime<Utc> {
    let shifted = if months >= 0 {
        now.checked_add_months(Months::new(months.unsigned_abs()))
    } else {
        now.checked_sub_months(Months::new(months.unsigned_abs()))
    };
    shifted.unwrap_or(now)
}
