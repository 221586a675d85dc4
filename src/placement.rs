//! Placement expression grammar (§6): `Label{key,op,values}` combined with
//! `All`/`Any`/`Not`, evaluated against a cluster-identity label set.
//!
//! `Ne`/`NotIn` with an empty `values` list fail closed — they match
//! nothing, mirroring Kubernetes label-selector convention.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub type LabelSet = BTreeMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum Op {
    Eq,
    Ne,
    In,
    NotIn,
    Exists,
    NotExists,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Label {
    pub key: String,
    pub op: Op,
    #[serde(default)]
    pub values: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type")]
pub enum Condition {
    Label(Label),
    All(Vec<Condition>),
    Any(Vec<Condition>),
    Not(Box<Condition>),
}

impl Condition {
    /// Evaluate this condition against a cluster's identity labels.
    pub fn matches(&self, labels: &LabelSet) -> bool {
        match self {
            Condition::Label(label) => eval_label(label, labels),
            Condition::All(conds) => conds.iter().all(|c| c.matches(labels)),
            Condition::Any(conds) => conds.iter().any(|c| c.matches(labels)),
            Condition::Not(inner) => !inner.matches(labels),
        }
    }

    /// True if every label set that satisfies `self` also satisfies
    /// `other`. Used only to detect an unsatisfiable runOn ⊆ notRunOn
    /// pairing for the exact single-label shape the spec calls out; this
    /// is a conservative syntactic check, not a full SAT solver.
    pub fn implies(&self, other: &Condition) -> bool {
        match (self, other) {
            (Condition::Label(a), Condition::Label(b)) => a.key == b.key && a.subsumes(b),
            (Condition::All(parts), other) => parts.iter().any(|p| p.implies(other)),
            _ => false,
        }
    }
}

impl Label {
    fn subsumes(&self, other: &Label) -> bool {
        if self.op != other.op {
            return false;
        }
        match self.op {
            Op::Eq => self.values == other.values,
            Op::In => !self.values.is_empty()
                && self.values.iter().all(|v| other.values.contains(v)),
            _ => false,
        }
    }
}

fn eval_label(label: &Label, labels: &LabelSet) -> bool {
    match label.op {
        Op::Eq => labels
            .get(&label.key)
            .is_some_and(|v| label.values.first().is_some_and(|want| want == v)),
        Op::Ne => {
            if label.values.is_empty() {
                return false; // fail closed
            }
            let want = &label.values[0];
            labels.get(&label.key).is_none_or(|v| v != want)
        }
        Op::In => {
            if label.values.is_empty() {
                return false; // fail closed
            }
            labels
                .get(&label.key)
                .is_some_and(|v| label.values.contains(v))
        }
        Op::NotIn => {
            if label.values.is_empty() {
                return false; // fail closed
            }
            labels
                .get(&label.key)
                .is_none_or(|v| !label.values.contains(v))
        }
        Op::Exists => labels.contains_key(&label.key),
        Op::NotExists => !labels.contains_key(&label.key),
    }
}

/// Validate a placement pair for the unsatisfiable shapes called out in
/// §4.1: identical condition in both slots, or runOn ⊆ notRunOn.
pub fn validate_placement(
    run_on: Option<&Condition>,
    not_run_on: Option<&Condition>,
) -> Result<(), String> {
    if let (Some(run), Some(not)) = (run_on, not_run_on) {
        if run == not {
            return Err("runOn and notRunOn express the identical condition".to_string());
        }
        if run.implies(not) {
            return Err("runOn is a subset of notRunOn; constraint is unsatisfiable".to_string());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(pairs: &[(&str, &str)]) -> LabelSet {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn ne_with_empty_values_fails_closed() {
        let cond = Condition::Label(Label {
            key: "provider".into(),
            op: Op::Ne,
            values: vec![],
        });
        assert!(!cond.matches(&labels(&[("provider", "aws")])));
        assert!(!cond.matches(&labels(&[])));
    }

    #[test]
    fn not_in_with_empty_values_fails_closed() {
        let cond = Condition::Label(Label {
            key: "provider".into(),
            op: Op::NotIn,
            values: vec![],
        });
        assert!(!cond.matches(&labels(&[("provider", "aws")])));
    }

    #[test]
    fn run_on_aws_rejects_gcp_cluster() {
        let cond = Condition::Label(Label {
            key: "provider".into(),
            op: Op::Eq,
            values: vec!["aws".into()],
        });
        assert!(!cond.matches(&labels(&[("provider", "gcp")])));
        assert!(cond.matches(&labels(&[("provider", "aws")])));
    }

    #[test]
    fn all_and_any_and_not_compose() {
        let cond = Condition::All(vec![
            Condition::Label(Label {
                key: "provider".into(),
                op: Op::In,
                values: vec!["aws".into(), "gcp".into()],
            }),
            Condition::Not(Box::new(Condition::Label(Label {
                key: "region".into(),
                op: Op::Eq,
                values: vec!["eu-west-1".into()],
            }))),
        ]);
        assert!(cond.matches(&labels(&[("provider", "aws"), ("region", "us-east-1")])));
        assert!(!cond.matches(&labels(&[("provider", "aws"), ("region", "eu-west-1")])));
        assert!(!cond.matches(&labels(&[("provider", "azure")])));
    }

    #[test]
    fn identical_condition_is_unsatisfiable_pair() {
        let cond = Condition::Label(Label {
            key: "provider".into(),
            op: Op::Eq,
            values: vec!["aws".into()],
        });
        assert!(validate_placement(Some(&cond), Some(&cond)).is_err());
    }

    #[test]
    fn run_on_subset_of_not_run_on_is_rejected() {
        let run_on = Condition::Label(Label {
            key: "provider".into(),
            op: Op::In,
            values: vec!["aws".into()],
        });
        let not_run_on = Condition::Label(Label {
            key: "provider".into(),
            op: Op::In,
            values: vec!["aws".into(), "gcp".into()],
        });
        assert!(validate_placement(Some(&run_on), Some(&not_run_on)).is_err());
    }
}
