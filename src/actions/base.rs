use crate::browser::{ElementHandle, Page};
use crate::errors::Result;
use crate::types::FieldValue;
use ego_tree::NodeId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The element operations resolved through the behaviour registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    GetValue,
    SetValue,
    GetChecked,
    SetChecked,
    SubmitContribution,
    GetForm,
    Submit,
    Click,
}

impl Operation {
    pub const ALL: [Operation; 8] = [
        Operation::GetValue,
        Operation::SetValue,
        Operation::GetChecked,
        Operation::SetChecked,
        Operation::SubmitContribution,
        Operation::GetForm,
        Operation::Submit,
        Operation::Click,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::GetValue => "get_value",
            Operation::SetValue => "set_value",
            Operation::GetChecked => "get_checked",
            Operation::SetChecked => "set_checked",
            Operation::SubmitContribution => "submit_contribution",
            Operation::GetForm => "get_form",
            Operation::Submit => "submit",
            Operation::Click => "click",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Passed to submit-contribution behaviours.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubmitContext {
    /// The button the submission is being made with, if any.
    pub clicked: Option<NodeId>,
}

impl SubmitContext {
    pub fn clicked(node: NodeId) -> Self {
        Self {
            clicked: Some(node),
        }
    }

    pub fn is_clicked(&self, node: NodeId) -> bool {
        self.clicked == Some(node)
    }
}

pub type GetValueFn = dyn Fn(&ElementHandle) -> Result<FieldValue>;
pub type SetValueFn = dyn Fn(&ElementHandle, FieldValue) -> Result<()>;
pub type GetCheckedFn = dyn Fn(&ElementHandle) -> Result<bool>;
pub type SetCheckedFn = dyn Fn(&ElementHandle, bool) -> Result<()>;
pub type ContributionFn = dyn Fn(&ElementHandle, &SubmitContext) -> Result<Vec<(String, String)>>;
pub type GetFormFn = dyn Fn(&ElementHandle) -> Result<ElementHandle>;
pub type NavigateFn = dyn Fn(&ElementHandle) -> Result<Page>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_names() {
        let names: Vec<_> = Operation::ALL.iter().map(|op| op.to_string()).collect();
        assert_eq!(names[0], "get_value");
        assert_eq!(names[4], "submit_contribution");
        assert_eq!(
            serde_json::to_string(&Operation::SetChecked).unwrap(),
            "\"set_checked\""
        );
    }
}
