//! DependencyResolver: decide which rules are skipped for a record.
//!
//! A rule with `depends_on` is evaluated only when its dependency condition
//! holds for the record. Dependencies are resolved against the record, never
//! against other rules' outcomes, so they are evaluated once up front and the
//! rest of the pipeline only consults the resulting [`SkipSet`].
//!
//! A dependency on an absent field is unmet, which skips the rule.

use std::collections::HashSet;

use crate::criteria::CompiledRule;
use crate::record::Record;

/// Ids of rules that must be skipped for the current record.
pub type SkipSet = HashSet<String>;

#[derive(Debug, Default)]
pub struct DependencyResolver;

impl DependencyResolver {
    pub fn new() -> Self {
        Self
    }

    pub fn resolve<'a, I>(&self, rules: I, record: &Record) -> SkipSet
    where
        I: IntoIterator<Item = &'a CompiledRule>,
    {
        rules
            .into_iter()
            .filter(|rule| match &rule.dependency {
                Some(dependency) => !dependency.check(record).1.is_match(),
                None => false,
            })
            .map(|rule| {
                tracing::trace!(rule = %rule.id, "Dependency not met");
                rule.id.clone()
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::criteria::{Criteria, Rule};

    fn criteria() -> crate::criteria::CompiledCriteria {
        Criteria::new("deps")
            .rule(Rule::new("loan.type", "==", "personal").with_id("type"))
            .rule(
                Rule::new("loan.amount", "<=", 50000)
                    .with_id("personal_cap")
                    .depends_on("loan.type", "==", "personal"),
            )
            .compile()
            .unwrap()
    }

    #[test]
    fn test_met_dependency_is_not_skipped() {
        let compiled = criteria();
        let record = Record::from_json(r#"{"loan": {"type": "personal", "amount": 10}}"#).unwrap();
        let skip = DependencyResolver::new().resolve(compiled.all_rules(), &record);
        assert!(skip.is_empty());
    }

    #[test]
    fn test_unmet_dependency_is_skipped() {
        let compiled = criteria();
        let record = Record::from_json(r#"{"loan": {"type": "mortgage"}}"#).unwrap();
        let skip = DependencyResolver::new().resolve(compiled.all_rules(), &record);
        assert!(skip.contains("personal_cap"));
        assert_eq!(skip.len(), 1);
    }

    #[test]
    fn test_absent_dependency_field_skips() {
        let compiled = criteria();
        let skip = DependencyResolver::new().resolve(compiled.all_rules(), &Record::new());
        assert!(skip.contains("personal_cap"));
    }
}
