//! User identities.
//!
//! An [`Identity`] is the merged view of a user: status and permissions come
//! from the local `users` and `permissions` tables, profile fields may be
//! supplied by the user's home database. Identities are built by the
//! [`IdentityResolver`] and are immutable once cached.

mod resolver;

pub use resolver::IdentityResolver;

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use scopedb_proto::Record;

use crate::error::Error;

/// Permission that restricts a submitter to private records.
pub const ONLY_PRIVATE: &str = "only_private";

/// Account status, as stored in `users.status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UserStatus {
    User,
    Submitter,
    Curator,
    Admin,
}

impl UserStatus {
    /// Name as stored in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            UserStatus::User => "user",
            UserStatus::Submitter => "submitter",
            UserStatus::Curator => "curator",
            UserStatus::Admin => "admin",
        }
    }

    /// Check if the status carries curator rights.
    pub fn is_curator(&self) -> bool {
        matches!(self, UserStatus::Curator | UserStatus::Admin)
    }
}

impl fmt::Display for UserStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UserStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(UserStatus::User),
            "submitter" => Ok(UserStatus::Submitter),
            "curator" => Ok(UserStatus::Curator),
            "admin" => Ok(UserStatus::Admin),
            other => Err(Error::UnknownAccessStatus(other.to_string())),
        }
    }
}

/// Profile fields. A home database is authoritative for these.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Profile {
    pub first_name: Option<String>,
    pub surname: Option<String>,
    pub email: Option<String>,
    pub affiliation: Option<String>,
}

impl Profile {
    fn from_record(record: &Record) -> Self {
        Self {
            first_name: record.get_string("first_name"),
            surname: record.get_string("surname"),
            email: record.get_string("email"),
            affiliation: record.get_string("affiliation"),
        }
    }

    /// Overwrite every field that `other` supplies.
    fn merge(&mut self, other: Profile) {
        overwrite(&mut self.first_name, other.first_name);
        overwrite(&mut self.surname, other.surname);
        overwrite(&mut self.email, other.email);
        overwrite(&mut self.affiliation, other.affiliation);
    }

    /// "First Surname", or whichever part is known.
    pub fn full_name(&self) -> Option<String> {
        match (&self.first_name, &self.surname) {
            (Some(first), Some(last)) => Some(format!("{} {}", first, last)),
            (Some(only), None) | (None, Some(only)) => Some(only.clone()),
            (None, None) => None,
        }
    }
}

/// Curator notification preferences.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CuratorPrefs {
    pub submission_digests: Option<bool>,
    pub submission_email_cc: Option<bool>,
    pub absent_until: Option<String>,
}

impl CuratorPrefs {
    fn from_record(record: &Record) -> Self {
        Self {
            submission_digests: record.get_bool("submission_digests"),
            submission_email_cc: record.get_bool("submission_email_cc"),
            absent_until: record.get_string("absent_until"),
        }
    }

    fn merge(&mut self, other: CuratorPrefs) {
        overwrite(&mut self.submission_digests, other.submission_digests);
        overwrite(&mut self.submission_email_cc, other.submission_email_cc);
        overwrite(&mut self.absent_until, other.absent_until);
    }
}

fn overwrite<T>(field: &mut Option<T>, value: Option<T>) {
    if value.is_some() {
        *field = value;
    }
}

/// Permission flags granted to a user.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Permissions(BTreeSet<String>);

impl Permissions {
    /// Check for a permission.
    pub fn has(&self, permission: &str) -> bool {
        self.0.contains(permission)
    }

    /// Iterate over the granted permissions in name order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for Permissions {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

/// A resolved user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub username: String,
    /// Local numeric id, bound into visibility predicates.
    pub id: i64,
    pub status: UserStatus,
    /// Home database, if the local record defers to one.
    pub user_db: Option<i64>,
    pub profile: Profile,
    pub prefs: CuratorPrefs,
    pub permissions: Permissions,
}

impl Identity {
    /// Create an identity with an empty profile.
    pub fn new(username: impl Into<String>, id: i64, status: UserStatus) -> Self {
        Self {
            username: username.into(),
            id,
            status,
            user_db: None,
            profile: Profile::default(),
            prefs: CuratorPrefs::default(),
            permissions: Permissions::default(),
        }
    }

    /// Set the permission flags.
    pub fn with_permissions<S: Into<String>>(mut self, permissions: impl IntoIterator<Item = S>) -> Self {
        self.permissions = permissions.into_iter().collect();
        self
    }

    /// Check if the identity carries curator rights.
    pub fn is_curator(&self) -> bool {
        self.status.is_curator()
    }

    /// Check if the identity is restricted to private records.
    pub fn only_private(&self) -> bool {
        self.permissions.has(ONLY_PRIVATE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scopedb_proto::Value;

    #[test]
    fn test_status_parsing() {
        assert_eq!("admin".parse::<UserStatus>().unwrap(), UserStatus::Admin);
        assert_eq!("submitter".parse::<UserStatus>().unwrap(), UserStatus::Submitter);
        let err = "guest".parse::<UserStatus>().unwrap_err();
        assert!(matches!(err, Error::UnknownAccessStatus(ref s) if s == "guest"));
    }

    #[test]
    fn test_curator_statuses() {
        assert!(UserStatus::Admin.is_curator());
        assert!(UserStatus::Curator.is_curator());
        assert!(!UserStatus::Submitter.is_curator());
        assert!(!UserStatus::User.is_curator());
    }

    #[test]
    fn test_profile_merge_skips_empty_values() {
        let mut local = Profile::from_record(&Record::from_pairs([
            ("first_name", Value::from("Alice")),
            ("surname", Value::from("Local")),
            ("email", Value::from("alice@old.example")),
            ("affiliation", Value::Null),
        ]));
        let remote = Profile::from_record(&Record::from_pairs([
            ("first_name", Value::from("")),
            ("surname", Value::from("Remote")),
            ("email", Value::from("alice@example.org")),
            ("affiliation", Value::from("University of Oxford")),
        ]));
        local.merge(remote);

        assert_eq!(local.first_name.as_deref(), Some("Alice"));
        assert_eq!(local.surname.as_deref(), Some("Remote"));
        assert_eq!(local.email.as_deref(), Some("alice@example.org"));
        assert_eq!(local.affiliation.as_deref(), Some("University of Oxford"));
        assert_eq!(local.full_name().as_deref(), Some("Alice Remote"));
    }

    #[test]
    fn test_only_private_flag() {
        let alice = Identity::new("alice", 1, UserStatus::Submitter).with_permissions([ONLY_PRIVATE]);
        assert!(alice.only_private());
        assert!(!Identity::new("bob", 2, UserStatus::Submitter).only_private());
    }
}
