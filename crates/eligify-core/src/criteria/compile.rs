//! Compilation of criteria definitions into evaluation-ready snapshots.
//!
//! Compiling does every check that can be done without a record: operator
//! names, value shapes, regexes, id uniqueness and group nesting. The result
//! is immutable; editing a criteria means compiling a new snapshot, which
//! also yields a new fingerprint.

use std::collections::HashMap;

use super::parser::{Criteria, CriteriaError, Rule, RuleGroup};
use crate::comparator::Condition;
use crate::decision::DecisionThreshold;
use crate::fingerprint;
use crate::group::CombinationLogic;
use crate::scoring::ScoringMethod;

/// Id given to the implicit ALL-group that collects ungrouped rules when a
/// criteria also declares groups.
pub const IMPLICIT_GROUP_ID: &str = "ungrouped";

/// An active rule ready for evaluation.
#[derive(Debug, Clone)]
pub struct CompiledRule {
    pub id: String,
    pub condition: Condition,
    pub weight: f64,
    pub dependency: Option<Condition>,
    pub description: Option<String>,
}

/// A group with its rules and nested groups resolved into a tree.
#[derive(Debug, Clone)]
pub struct CompiledGroup {
    pub id: String,
    pub name: String,
    pub logic: CombinationLogic,
    pub weight: f64,
    pub rules: Vec<CompiledRule>,
    pub groups: Vec<CompiledGroup>,
}

impl CompiledGroup {
    fn collect_rules<'a>(&'a self, into: &mut Vec<&'a CompiledRule>) {
        into.extend(self.rules.iter());
        for group in &self.groups {
            group.collect_rules(into);
        }
    }
}

/// Immutable snapshot of a criteria, the only form the engine evaluates.
#[derive(Debug, Clone)]
pub struct CompiledCriteria {
    pub(crate) id: String,
    pub(crate) name: String,
    pub(crate) version: Option<u32>,
    pub(crate) active: bool,
    pub(crate) pass_threshold: f64,
    pub(crate) scoring_method: ScoringMethod,
    pub(crate) thresholds: Vec<DecisionThreshold>,
    pub(crate) default_decision: Option<String>,
    pub(crate) group_logic: CombinationLogic,
    pub(crate) rules: Vec<CompiledRule>,
    pub(crate) groups: Vec<CompiledGroup>,
    pub(crate) fingerprint: String,
}

impl CompiledCriteria {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> Option<u32> {
        self.version
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn pass_threshold(&self) -> f64 {
        self.pass_threshold
    }

    pub fn scoring_method(&self) -> ScoringMethod {
        self.scoring_method
    }

    pub fn thresholds(&self) -> &[DecisionThreshold] {
        &self.thresholds
    }

    pub fn default_decision(&self) -> Option<&str> {
        self.default_decision.as_deref()
    }

    pub fn group_logic(&self) -> CombinationLogic {
        self.group_logic
    }

    /// Ungrouped rules. Empty whenever [`groups`](Self::groups) is not.
    pub fn rules(&self) -> &[CompiledRule] {
        &self.rules
    }

    /// Top-level groups, including the implicit ungrouped-rules group.
    pub fn groups(&self) -> &[CompiledGroup] {
        &self.groups
    }

    pub fn is_grouped(&self) -> bool {
        !self.groups.is_empty()
    }

    /// Every active rule, ungrouped first, then groups depth-first.
    pub fn all_rules(&self) -> Vec<&CompiledRule> {
        let mut rules: Vec<&CompiledRule> = self.rules.iter().collect();
        for group in &self.groups {
            group.collect_rules(&mut rules);
        }
        rules
    }

    /// Structural content hash of every active definition.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }
}

pub(crate) fn compile(criteria: &Criteria) -> Result<CompiledCriteria, CriteriaError> {
    let mut ids = RuleIds::default();

    let ungrouped = compile_rules(&criteria.rules, &mut ids)?;

    let mut groups = compile_groups(&criteria.groups, &mut ids)?;
    let rules = if groups.is_empty() || ungrouped.is_empty() {
        ungrouped
    } else {
        if groups.iter().any(|g| g.id == IMPLICIT_GROUP_ID) {
            return Err(CriteriaError::DuplicateId {
                kind: "group",
                id: IMPLICIT_GROUP_ID.to_string(),
            });
        }
        groups.push(CompiledGroup {
            id: IMPLICIT_GROUP_ID.to_string(),
            name: "Ungrouped rules".to_string(),
            logic: CombinationLogic::All,
            weight: 1.0,
            rules: ungrouped,
            groups: Vec::new(),
        });
        Vec::new()
    };

    let mut compiled = CompiledCriteria {
        id: criteria.id().to_string(),
        name: criteria.name.clone(),
        version: criteria.version,
        active: criteria.active,
        pass_threshold: criteria.pass_threshold,
        scoring_method: criteria.scoring_method,
        thresholds: criteria.decision_thresholds.clone(),
        default_decision: criteria.default_decision.clone(),
        group_logic: criteria.group_logic.unwrap_or_default(),
        rules,
        groups,
        fingerprint: String::new(),
    };
    compiled.fingerprint = fingerprint::criteria_fingerprint(&compiled);

    tracing::debug!(
        criteria = %compiled.id,
        rules = compiled.all_rules().len(),
        groups = compiled.groups.len(),
        fingerprint = %compiled.fingerprint,
        "Compiled criteria"
    );

    Ok(compiled)
}

/// Positional rule ids, unique across the whole criteria.
#[derive(Default)]
struct RuleIds {
    position: usize,
    seen: std::collections::HashSet<String>,
}

impl RuleIds {
    fn assign(&mut self, rule: &Rule) -> Result<String, CriteriaError> {
        self.position += 1;
        let id = rule
            .id
            .clone()
            .unwrap_or_else(|| format!("rule-{}", self.position));
        if !self.seen.insert(id.clone()) {
            return Err(CriteriaError::DuplicateId { kind: "rule", id });
        }
        Ok(id)
    }
}

fn compile_rules(rules: &[Rule], ids: &mut RuleIds) -> Result<Vec<CompiledRule>, CriteriaError> {
    let mut compiled = Vec::with_capacity(rules.len());

    for rule in rules {
        // Ids are assigned to inactive rules too, so toggling one does not
        // renumber the rest.
        let id = ids.assign(rule)?;
        if !rule.active {
            continue;
        }

        let condition = Condition::new(rule.field.clone(), &rule.operator, rule.value.clone())
            .map_err(|source| CriteriaError::InvalidCondition {
                location: format!("rule '{}'", id),
                source,
            })?;

        let dependency = rule
            .depends_on
            .as_ref()
            .map(|dep| Condition::new(dep.field.clone(), &dep.operator, dep.value.clone()))
            .transpose()
            .map_err(|source| CriteriaError::InvalidCondition {
                location: format!("dependency of rule '{}'", id),
                source,
            })?;

        compiled.push((
            rule.order,
            CompiledRule {
                id,
                condition,
                weight: rule.weight,
                dependency,
                description: rule.description.clone(),
            },
        ));
    }

    // Stable: equal `order` keeps declaration order.
    compiled.sort_by_key(|(order, _)| *order);
    Ok(compiled.into_iter().map(|(_, rule)| rule).collect())
}

fn compile_groups(
    groups: &[RuleGroup],
    ids: &mut RuleIds,
) -> Result<Vec<CompiledGroup>, CriteriaError> {
    let group_ids: Vec<String> = groups
        .iter()
        .enumerate()
        .map(|(i, g)| g.id.clone().unwrap_or_else(|| format!("group-{}", i + 1)))
        .collect();

    let mut index: HashMap<&str, usize> = HashMap::new();
    for (i, id) in group_ids.iter().enumerate() {
        if index.insert(id.as_str(), i).is_some() {
            return Err(CriteriaError::DuplicateId {
                kind: "group",
                id: id.clone(),
            });
        }
    }

    let mut parent: HashMap<usize, usize> = HashMap::new();
    for (i, group) in groups.iter().enumerate() {
        for child_id in &group.subgroups {
            let child = *index
                .get(child_id.as_str())
                .ok_or_else(|| CriteriaError::UnknownGroup {
                    group: group_ids[i].clone(),
                    subgroup: child_id.clone(),
                })?;
            if child == i {
                return Err(CriteriaError::CircularGroup(group_ids[i].clone()));
            }
            if let Some(previous) = parent.insert(child, i) {
                return Err(CriteriaError::MultipleParents {
                    group: group_ids[child].clone(),
                    first: group_ids[previous].clone(),
                    second: group_ids[i].clone(),
                });
            }
        }
    }

    // With at most one parent each, a cycle shows up as a parent chain that
    // returns to where it started.
    for start in 0..groups.len() {
        let mut current = start;
        for _ in 0..groups.len() {
            match parent.get(&current) {
                Some(&up) if up == start => {
                    return Err(CriteriaError::CircularGroup(group_ids[start].clone()))
                }
                Some(&up) => current = up,
                None => break,
            }
        }
    }

    // Compile every group's rules in declaration order so positional rule ids
    // follow the document, not the tree.
    let mut compiled_rules: Vec<Option<Vec<CompiledRule>>> = Vec::with_capacity(groups.len());
    for group in groups {
        compiled_rules.push(Some(compile_rules(&group.rules, ids)?));
    }

    let mut top_level: Vec<usize> = (0..groups.len())
        .filter(|i| !parent.contains_key(i))
        .collect();
    top_level.sort_by_key(|&i| groups[i].order);

    Ok(top_level
        .into_iter()
        .map(|i| build_group(i, groups, &group_ids, &index, &mut compiled_rules))
        .collect())
}

fn build_group(
    i: usize,
    groups: &[RuleGroup],
    group_ids: &[String],
    index: &HashMap<&str, usize>,
    compiled_rules: &mut [Option<Vec<CompiledRule>>],
) -> CompiledGroup {
    let definition = &groups[i];

    let mut children: Vec<usize> = definition
        .subgroups
        .iter()
        .filter_map(|id| index.get(id.as_str()).copied())
        .collect();
    children.sort_by_key(|&c| groups[c].order);

    let nested = children
        .into_iter()
        .map(|c| build_group(c, groups, group_ids, index, compiled_rules))
        .collect();

    CompiledGroup {
        id: group_ids[i].clone(),
        name: definition.name.clone(),
        logic: definition.logic,
        weight: definition.weight,
        rules: compiled_rules[i].take().unwrap_or_default(),
        groups: nested,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::group::CombinationLogic;

    fn grouped() -> Criteria {
        Criteria::new("grouped")
            .group(
                RuleGroup::new("Financial", CombinationLogic::All)
                    .with_id("financial")
                    .rule(Rule::new("income", ">=", 3000))
                    .subgroup("assets"),
            )
            .group(
                RuleGroup::new("Assets", CombinationLogic::Any)
                    .with_id("assets")
                    .rule(Rule::new("savings", ">=", 10000)),
            )
    }

    #[test]
    fn test_nested_groups_form_a_tree() {
        let compiled = grouped().compile().unwrap();
        assert_eq!(compiled.groups().len(), 1);
        let financial = &compiled.groups()[0];
        assert_eq!(financial.id, "financial");
        assert_eq!(financial.groups.len(), 1);
        assert_eq!(financial.groups[0].id, "assets");
        assert_eq!(compiled.all_rules().len(), 2);
    }

    #[test]
    fn test_positional_rule_ids() {
        let compiled = Criteria::new("ids")
            .rule(Rule::new("a", "==", 1))
            .rule(Rule::new("b", "==", 2).inactive())
            .rule(Rule::new("c", "==", 3))
            .compile()
            .unwrap();
        let ids: Vec<&str> = compiled.rules().iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["rule-1", "rule-3"]);
    }

    #[test]
    fn test_rules_sorted_by_order() {
        let compiled = Criteria::new("ordered")
            .rule(Rule::new("late", "==", 1).with_order(2))
            .rule(Rule::new("early", "==", 1).with_order(1))
            .rule(Rule::new("also_late", "==", 1).with_order(2))
            .compile()
            .unwrap();
        let fields: Vec<&str> = compiled
            .rules()
            .iter()
            .map(|r| r.condition.field())
            .collect();
        assert_eq!(fields, vec!["early", "late", "also_late"]);
    }

    #[test]
    fn test_ungrouped_rules_become_implicit_group() {
        let compiled = grouped()
            .rule(Rule::new("age", ">=", 18))
            .compile()
            .unwrap();
        assert!(compiled.rules().is_empty());
        let implicit = compiled.groups().last().unwrap();
        assert_eq!(implicit.id, IMPLICIT_GROUP_ID);
        assert_eq!(implicit.logic, CombinationLogic::All);
        assert_eq!(implicit.rules.len(), 1);
    }

    #[test]
    fn test_unknown_operator_is_configuration_error() {
        let result = Criteria::new("bad")
            .rule(Rule::new("a", "roughly", 1))
            .compile();
        assert!(matches!(result, Err(CriteriaError::InvalidCondition { .. })));
    }

    #[test]
    fn test_scalar_for_multi_value_operator_is_rejected() {
        let result = Criteria::new("bad")
            .rule(Rule::new("country", "in", "US"))
            .compile();
        assert!(matches!(result, Err(CriteriaError::InvalidCondition { .. })));
    }

    #[test]
    fn test_bad_dependency_is_rejected() {
        let result = Criteria::new("bad")
            .rule(Rule::new("a", "==", 1).depends_on("b", "~", 1))
            .compile();
        match result {
            Err(CriteriaError::InvalidCondition { location, .. }) => {
                assert!(location.contains("dependency"));
            }
            other => panic!("expected InvalidCondition, got {:?}", other),
        }
    }

    #[test]
    fn test_self_nesting_is_circular() {
        let result = Criteria::new("loop")
            .group(RuleGroup::new("A", CombinationLogic::All).with_id("a").subgroup("a"))
            .compile();
        assert!(matches!(result, Err(CriteriaError::CircularGroup(id)) if id == "a"));
    }

    #[test]
    fn test_indirect_cycle_is_circular() {
        let result = Criteria::new("loop")
            .group(RuleGroup::new("A", CombinationLogic::All).with_id("a").subgroup("b"))
            .group(RuleGroup::new("B", CombinationLogic::All).with_id("b").subgroup("c"))
            .group(RuleGroup::new("C", CombinationLogic::All).with_id("c").subgroup("a"))
            .compile();
        assert!(matches!(result, Err(CriteriaError::CircularGroup(_))));
    }

    #[test]
    fn test_unknown_subgroup() {
        let result = Criteria::new("dangling")
            .group(RuleGroup::new("A", CombinationLogic::All).with_id("a").subgroup("zzz"))
            .compile();
        assert!(matches!(result, Err(CriteriaError::UnknownGroup { .. })));
    }

    #[test]
    fn test_two_parents_rejected() {
        let result = Criteria::new("dag")
            .group(RuleGroup::new("A", CombinationLogic::All).with_id("a").subgroup("c"))
            .group(RuleGroup::new("B", CombinationLogic::All).with_id("b").subgroup("c"))
            .group(RuleGroup::new("C", CombinationLogic::All).with_id("c"))
            .compile();
        assert!(matches!(result, Err(CriteriaError::MultipleParents { .. })));
    }

    #[test]
    fn test_duplicate_rule_ids() {
        let result = Criteria::new("dupes")
            .rule(Rule::new("a", "==", 1).with_id("x"))
            .group(
                RuleGroup::new("G", CombinationLogic::All)
                    .rule(Rule::new("b", "==", 1).with_id("x")),
            )
            .compile();
        assert!(matches!(
            result,
            Err(CriteriaError::DuplicateId { kind: "rule", .. })
        ));
    }
}
