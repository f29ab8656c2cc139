use crate::actions::base::{
    ContributionFn, GetCheckedFn, GetFormFn, GetValueFn, NavigateFn, Operation, SetCheckedFn,
    SetValueFn,
};
use crate::actions::builtin;
use crate::actions::predicates::Predicate;
use crate::browser::ElementHandle;
use crate::errors::{AgentError, Result};
use std::fmt;
use tracing::trace;

/// Ordered (predicate, implementation) entries for one operation.
pub struct BehaviorTable<F: ?Sized> {
    operation: Operation,
    entries: Vec<(Predicate, Box<F>)>,
}

impl<F: ?Sized> BehaviorTable<F> {
    pub fn new(operation: Operation) -> Self {
        Self {
            operation,
            entries: Vec::new(),
        }
    }

    /// Append an entry. Earlier entries take precedence.
    pub fn register(&mut self, predicate: Predicate, implementation: Box<F>) -> &mut Self {
        self.entries.push((predicate, implementation));
        self
    }

    pub fn operation(&self) -> Operation {
        self.operation
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<F: ?Sized> fmt::Debug for BehaviorTable<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BehaviorTable")
            .field("operation", &self.operation)
            .field("entries", &self.entries.len())
            .finish()
    }
}

/// Per-operation behaviour tables.
///
/// Built once and then shared read-only by every page of an agent. Extend it
/// before handing it to [`crate::Agent::with_registry`]; entries registered
/// later only apply to elements no earlier predicate claims.
#[derive(Debug)]
pub struct BehaviorRegistry {
    pub get_value: BehaviorTable<GetValueFn>,
    pub set_value: BehaviorTable<SetValueFn>,
    pub get_checked: BehaviorTable<GetCheckedFn>,
    pub set_checked: BehaviorTable<SetCheckedFn>,
    pub submit_contribution: BehaviorTable<ContributionFn>,
    pub get_form: BehaviorTable<GetFormFn>,
    pub submit: BehaviorTable<NavigateFn>,
    pub click: BehaviorTable<NavigateFn>,
}

impl BehaviorRegistry {
    /// A registry with no behaviours at all.
    pub fn new() -> Self {
        Self {
            get_value: BehaviorTable::new(Operation::GetValue),
            set_value: BehaviorTable::new(Operation::SetValue),
            get_checked: BehaviorTable::new(Operation::GetChecked),
            set_checked: BehaviorTable::new(Operation::SetChecked),
            submit_contribution: BehaviorTable::new(Operation::SubmitContribution),
            get_form: BehaviorTable::new(Operation::GetForm),
            submit: BehaviorTable::new(Operation::Submit),
            click: BehaviorTable::new(Operation::Click),
        }
    }

    /// The standard HTML form semantics.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        builtin::install(&mut registry);
        registry
    }

    /// Finds the implementation for `handle` in `table`.
    ///
    /// The document is only borrowed while predicates run, so the returned
    /// implementation is free to read and edit the page.
    pub fn dispatch<'t, F: ?Sized>(
        table: &'t BehaviorTable<F>,
        handle: &ElementHandle,
    ) -> Result<&'t F> {
        let (index, element) = handle.with_view(|view| {
            let index = table
                .entries
                .iter()
                .position(|(predicate, _)| predicate(&view));
            (index, view.describe())
        })?;

        match index {
            Some(index) => {
                trace!("{} on {} -> entry {}", table.operation, element, index);
                Ok(&*table.entries[index].1)
            }
            None => Err(AgentError::Unsupported {
                operation: table.operation,
                element,
            }),
        }
    }
}

impl Default for BehaviorRegistry {
    fn default() -> Self {
        Self::new()
    }
}
