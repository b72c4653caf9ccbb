//! Who sees which rows.

use crate::connection::Connection;
use crate::error::{Error, Result};
use crate::identity::{Identity, UserStatus};
use crate::query::QueryExecutor;

use super::context::{AccessContext, AccessMode};
use super::predicate::{
    Predicate, PredicateBuilder, ALL, EMBARGOED, OWN_PRIVATE, OWN_SUBMITTED, PRIVATE_FROM_GROUP,
    PROJECT, PUBLIC, PUBLICATION_REQUESTED, PUBLIC_FROM_GROUP,
};

/// Role an identity curates with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CurationRole {
    Admin,
    Curator,
    Submitter,
    /// A submitter holding the `only_private` permission.
    PrivateSubmitter,
}

impl CurationRole {
    /// Curation role of an identity.
    ///
    /// Plain users have no curation rights; asking for theirs is an
    /// [`Error::UnknownAccessStatus`].
    pub fn for_identity(identity: &Identity) -> Result<Self> {
        match identity.status {
            UserStatus::Admin => Ok(CurationRole::Admin),
            UserStatus::Curator => Ok(CurationRole::Curator),
            UserStatus::Submitter if identity.only_private() => Ok(CurationRole::PrivateSubmitter),
            UserStatus::Submitter => Ok(CurationRole::Submitter),
            UserStatus::User => Err(Error::UnknownAccessStatus(identity.status.to_string())),
        }
    }
}

/// Whether an identity has any rows for the optional clauses.
///
/// Clauses that can never match are left out of the view definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Memberships {
    pub owns_private: bool,
    pub has_projects: bool,
}

impl Memberships {
    /// Include every optional clause without checking.
    pub fn assume_all() -> Self {
        Self {
            owns_private: true,
            has_projects: true,
        }
    }

    /// Check the identity's private records and project memberships.
    pub fn load(conn: &mut dyn Connection, identity_id: i64) -> Result<Self> {
        let mut exec = QueryExecutor::new(conn);
        let has_projects = exec.fetch_exists(
            "SELECT EXISTS(SELECT * FROM merged_project_users WHERE user_id=?)",
            identity_id,
        )?;
        let owns_private = exec.fetch_exists(
            "SELECT EXISTS(SELECT * FROM private_isolates WHERE user_id=?)",
            identity_id,
        )?;
        Ok(Self {
            owns_private,
            has_projects,
        })
    }
}

/// Visibility predicate for an access context.
pub fn predicate(context: &AccessContext, memberships: &Memberships) -> Result<Predicate> {
    let Some(identity) = context.identity.as_deref() else {
        return PredicateBuilder::anonymous().or(PUBLIC).build();
    };
    let builder = PredicateBuilder::for_identity(identity.id);

    let builder = match context.mode {
        AccessMode::Ordinary => builder
            .or(PUBLIC)
            .or_if(memberships.owns_private, OWN_PRIVATE)
            .or_if(memberships.has_projects, PROJECT),
        AccessMode::Curate => match CurationRole::for_identity(identity)? {
            CurationRole::Admin => builder.or(ALL),
            CurationRole::Curator => builder
                .or(PUBLIC)
                .or(OWN_PRIVATE)
                .or(EMBARGOED)
                .or(PUBLICATION_REQUESTED)
                .or_if(memberships.has_projects, PROJECT),
            CurationRole::Submitter => builder
                .or(OWN_SUBMITTED)
                .or(OWN_PRIVATE)
                .or(PUBLIC_FROM_GROUP)
                .or(PRIVATE_FROM_GROUP),
            CurationRole::PrivateSubmitter => builder.or(OWN_PRIVATE).or(PRIVATE_FROM_GROUP),
        },
    };

    builder.build()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::identity::ONLY_PRIVATE;

    fn context(identity: Identity, mode: AccessMode) -> AccessContext {
        AccessContext::new(Some(Arc::new(identity)), mode)
    }

    fn none() -> Memberships {
        Memberships {
            owns_private: false,
            has_projects: false,
        }
    }

    #[test]
    fn test_roles() {
        let role = |status, perms: &[&str]| {
            CurationRole::for_identity(&Identity::new("x", 1, status).with_permissions(perms.iter().copied()))
        };
        assert_eq!(role(UserStatus::Admin, &[]).unwrap(), CurationRole::Admin);
        assert_eq!(role(UserStatus::Curator, &[ONLY_PRIVATE]).unwrap(), CurationRole::Curator);
        assert_eq!(role(UserStatus::Submitter, &[]).unwrap(), CurationRole::Submitter);
        assert_eq!(
            role(UserStatus::Submitter, &[ONLY_PRIVATE]).unwrap(),
            CurationRole::PrivateSubmitter
        );
        assert!(matches!(
            role(UserStatus::User, &[]),
            Err(Error::UnknownAccessStatus(ref s)) if s == "user"
        ));
    }

    #[test]
    fn test_anonymous_sees_public_only() {
        let p = predicate(&AccessContext::anonymous(), &Memberships::assume_all()).unwrap();
        assert_eq!(p.clauses, vec!["public"]);
        assert!(p.params.is_empty());
    }

    #[test]
    fn test_ordinary_optional_clauses() {
        let ctx = context(Identity::new("alice", 7, UserStatus::User), AccessMode::Ordinary);
        assert_eq!(predicate(&ctx, &none()).unwrap().clauses, vec!["public"]);

        let all = predicate(&ctx, &Memberships::assume_all()).unwrap();
        assert_eq!(all.clauses, vec!["public", "own_private", "project"]);
        assert_eq!(all.params.len(), 2);
    }

    #[test]
    fn test_curate_dispatch() {
        let clauses = |identity: Identity| {
            predicate(&context(identity, AccessMode::Curate), &none())
                .unwrap()
                .clauses
        };
        assert_eq!(clauses(Identity::new("root", 1, UserStatus::Admin)), vec!["all"]);
        assert_eq!(
            clauses(Identity::new("cur", 2, UserStatus::Curator)),
            vec!["public", "own_private", "embargoed", "publication_requested"]
        );
        assert_eq!(
            clauses(Identity::new("sub", 3, UserStatus::Submitter)),
            vec!["own_submitted", "own_private", "public_from_group", "private_from_group"]
        );
        assert_eq!(
            clauses(Identity::new("priv", 4, UserStatus::Submitter).with_permissions([ONLY_PRIVATE])),
            vec!["own_private", "private_from_group"]
        );
    }

    #[test]
    fn test_curator_project_clause() {
        let ctx = context(Identity::new("cur", 2, UserStatus::Curator), AccessMode::Curate);
        let p = predicate(&ctx, &Memberships::assume_all()).unwrap();
        assert_eq!(p.clauses.last(), Some(&"project"));
        assert_eq!(p.params, vec![scopedb_proto::Value::Int64(2); 2]);
    }

    #[test]
    fn test_plain_user_cannot_curate() {
        let ctx = context(Identity::new("u", 5, UserStatus::User), AccessMode::Curate);
        assert!(matches!(
            predicate(&ctx, &none()),
            Err(Error::UnknownAccessStatus(_))
        ));
    }
}
