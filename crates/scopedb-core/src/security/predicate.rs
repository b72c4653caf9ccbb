//! Visibility predicate fragments and the builder that composes them.
//!
//! Each fragment is a boolean SQL expression over the base table (alias `v`)
//! left-joined to `private_isolates` (alias `p`), together with the number of
//! identity-id parameters it consumes. The builder OR-joins fragments and
//! binds the acting identity's id once per parameter, so the bound values
//! always line up with the placeholders.

use scopedb_proto::Value;

use crate::error::{Error, Result};
use crate::query::count_placeholders;

/// A named, parameterised boolean SQL fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fragment {
    name: &'static str,
    sql: &'static str,
    params: usize,
}

impl Fragment {
    const fn new(name: &'static str, sql: &'static str, params: usize) -> Self {
        Self { name, sql, params }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn sql(&self) -> &'static str {
        self.sql
    }

    /// Number of identity-id parameters the fragment consumes.
    pub fn params(&self) -> usize {
        self.params
    }
}

/// Records the identity submitted.
pub const OWN_SUBMITTED: Fragment = Fragment::new("own_submitted", "v.sender=?", 1);

/// Records the identity privately owns.
pub const OWN_PRIVATE: Fragment = Fragment::new("own_private", "p.user_id=?", 1);

/// Public records submitted by a member of a group the identity co-curates with.
pub const PUBLIC_FROM_GROUP: Fragment = Fragment::new(
    "public_from_group",
    "(EXISTS(SELECT 1 FROM user_group_members ugm JOIN user_groups ug ON ugm.user_group=ug.id \
     WHERE ug.co_curate AND ugm.user_id=v.sender AND EXISTS(SELECT 1 FROM user_group_members \
     WHERE (user_group,user_id)=(ug.id,?))) AND p.user_id IS NULL)",
    1,
);

/// Private records submitted by a member of a group the identity privately co-curates with.
pub const PRIVATE_FROM_GROUP: Fragment = Fragment::new(
    "private_from_group",
    "(EXISTS(SELECT 1 FROM user_group_members ugm JOIN user_groups ug ON ugm.user_group=ug.id \
     WHERE ug.co_curate_private AND ugm.user_id=v.sender AND EXISTS(SELECT 1 FROM user_group_members \
     WHERE (user_group,user_id)=(ug.id,?))) AND p.user_id IS NOT NULL)",
    1,
);

/// Embargoed records.
pub const EMBARGOED: Fragment = Fragment::new("embargoed", "p.embargo IS NOT NULL", 0);

/// Records nobody owns privately.
pub const PUBLIC: Fragment = Fragment::new("public", "p.user_id IS NULL", 0);

/// Records in a project the identity is a member of.
pub const PROJECT: Fragment = Fragment::new(
    "project",
    "EXISTS(SELECT 1 FROM project_members pm JOIN merged_project_users mpu \
     ON pm.project_id=mpu.project_id WHERE (mpu.user_id,pm.isolate_id)=(?,v.id))",
    1,
);

/// Records whose owner asked for help publishing them.
pub const PUBLICATION_REQUESTED: Fragment =
    Fragment::new("publication_requested", "p.request_publish", 0);

/// Every record.
pub const ALL: Fragment = Fragment::new("all", "EXISTS(SELECT 1)", 0);

/// Every fragment, for exhaustive checks.
pub const FRAGMENTS: [Fragment; 9] = [
    OWN_SUBMITTED,
    OWN_PRIVATE,
    PUBLIC_FROM_GROUP,
    PRIVATE_FROM_GROUP,
    EMBARGOED,
    PUBLIC,
    PROJECT,
    PUBLICATION_REQUESTED,
    ALL,
];

/// A composed predicate with its bound values in placeholder order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Predicate {
    pub sql: String,
    pub params: Vec<Value>,
    /// Names of the composed fragments, in order.
    pub clauses: Vec<&'static str>,
}

/// OR-joins fragments, binding the identity id for each parameter.
#[derive(Debug, Clone, Default)]
pub struct PredicateBuilder {
    identity_id: Option<i64>,
    clauses: Vec<Fragment>,
}

impl PredicateBuilder {
    /// Builder for anonymous access; only parameterless fragments are allowed.
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Builder binding `identity_id`.
    pub fn for_identity(identity_id: i64) -> Self {
        Self {
            identity_id: Some(identity_id),
            clauses: Vec::new(),
        }
    }

    /// Add a clause.
    pub fn or(mut self, fragment: Fragment) -> Self {
        self.clauses.push(fragment);
        self
    }

    /// Add a clause when `condition` holds.
    pub fn or_if(self, condition: bool, fragment: Fragment) -> Self {
        if condition {
            self.or(fragment)
        } else {
            self
        }
    }

    /// Compose the predicate.
    ///
    /// Fails when a clause needs the identity id and there is none, or when
    /// the composed text and the bound values disagree.
    pub fn build(self) -> Result<Predicate> {
        let mut params = Vec::new();
        for fragment in &self.clauses {
            if fragment.params == 0 {
                continue;
            }
            let id = self.identity_id.ok_or_else(|| {
                Error::query_failed(fragment.sql, "clause needs an identity but access is anonymous")
            })?;
            params.extend(std::iter::repeat(Value::Int64(id)).take(fragment.params));
        }

        let sql = if self.clauses.is_empty() {
            "1=0".to_string()
        } else {
            self.clauses
                .iter()
                .map(|f| f.sql)
                .collect::<Vec<_>>()
                .join(" OR ")
        };

        let placeholders = count_placeholders(&sql);
        if placeholders != params.len() {
            return Err(Error::query_failed(
                &sql,
                format!(
                    "predicate has {} placeholders but {} values were bound",
                    placeholders,
                    params.len()
                ),
            ));
        }

        Ok(Predicate {
            sql,
            params,
            clauses: self.clauses.iter().map(|f| f.name).collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fragment_param_counts_match_text() {
        for fragment in FRAGMENTS {
            assert_eq!(
                count_placeholders(fragment.sql()),
                fragment.params(),
                "fragment {}",
                fragment.name()
            );
        }
    }

    #[test]
    fn test_build_binds_identity_per_parameter() {
        let predicate = PredicateBuilder::for_identity(42)
            .or(PUBLIC)
            .or(OWN_PRIVATE)
            .or(PROJECT)
            .build()
            .unwrap();
        assert_eq!(predicate.params, vec![Value::Int64(42), Value::Int64(42)]);
        assert_eq!(predicate.clauses, vec!["public", "own_private", "project"]);
        assert!(predicate.sql.starts_with("p.user_id IS NULL OR p.user_id=? OR EXISTS("));
    }

    #[test]
    fn test_parameterless_clauses_bind_nothing() {
        let predicate = PredicateBuilder::for_identity(1).or(ALL).build().unwrap();
        assert_eq!(predicate.sql, "EXISTS(SELECT 1)");
        assert!(predicate.params.is_empty());
    }

    #[test]
    fn test_anonymous_cannot_use_identity_clauses() {
        assert!(PredicateBuilder::anonymous().or(PUBLIC).build().is_ok());
        assert!(PredicateBuilder::anonymous().or(OWN_PRIVATE).build().is_err());
    }

    #[test]
    fn test_or_if() {
        let predicate = PredicateBuilder::for_identity(3)
            .or(PUBLIC)
            .or_if(false, OWN_PRIVATE)
            .or_if(true, PROJECT)
            .build()
            .unwrap();
        assert_eq!(predicate.clauses, vec!["public", "project"]);
        assert_eq!(predicate.params.len(), 1);
    }

    #[test]
    fn test_empty_predicate_matches_nothing() {
        let predicate = PredicateBuilder::anonymous().build().unwrap();
        assert_eq!(predicate.sql, "1=0");
    }
}
