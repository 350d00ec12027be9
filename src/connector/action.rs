//! Action expansion.
//!
//! An action is a named list of primitive `put` steps. Expansion resolves
//! each step lazily, so a missing argument surfaces at the step that needs
//! it and every earlier step has already been issued by the caller.

// ============================================================================
// Imports
// ============================================================================

use serde_json::Value;

use crate::component::Arguments;
use crate::config::{ActionMap, ActionStep};
use crate::error::{Error, Result};

// ============================================================================
// ResolvedStep
// ============================================================================

/// One primitive `put` ready to issue.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedStep {
    /// Component kind the step targets.
    pub kind: String,
    /// Variable to write.
    pub variable: String,
    /// Value to write; the command definition's default when `None`.
    pub value: Option<Value>,
}

impl ResolvedStep {
    /// Arguments for the step's `put`: `{variable: value}`, or none.
    #[must_use]
    pub fn arguments(&self) -> Arguments {
        match &self.value {
            Some(value) => Arguments::new().with(self.variable.clone(), value.clone()),
            None => Arguments::new(),
        }
    }
}

// ============================================================================
// ActionExpander
// ============================================================================

/// Expands action names into primitive steps.
#[derive(Debug, Clone, Default)]
pub struct ActionExpander {
    actions: ActionMap,
}

impl ActionExpander {
    /// Creates an expander over `actions`.
    #[inline]
    #[must_use]
    pub fn new(actions: ActionMap) -> Self {
        Self { actions }
    }

    /// Starts expanding `name`.
    ///
    /// `default_kind` is used for steps without their own component.
    /// Returns `None` for an unknown action.
    #[must_use]
    pub fn plan<'a>(
        &'a self,
        name: &'a str,
        default_kind: &'a str,
        args: &'a Arguments,
    ) -> Option<ActionPlan<'a>> {
        let steps = self.actions.get(name)?;
        Some(ActionPlan {
            name,
            default_kind,
            args,
            steps: steps.iter(),
        })
    }
}

// ============================================================================
// ActionPlan
// ============================================================================

/// Lazy step iterator for one action invocation.
///
/// Yields `Err(MissingArgument)` for a placeholder the caller did not
/// supply; callers stop there.
#[derive(Debug)]
pub struct ActionPlan<'a> {
    name: &'a str,
    default_kind: &'a str,
    args: &'a Arguments,
    steps: std::slice::Iter<'a, ActionStep>,
}

impl ActionPlan<'_> {
    /// Action name.
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        self.name
    }

    fn resolve(&self, step: &ActionStep) -> Result<ResolvedStep> {
        let value = match (&step.value, step.placeholder()) {
            (_, Some(argument)) => Some(
                self.args
                    .get(argument)
                    .cloned()
                    .ok_or_else(|| Error::missing_argument(argument, self.name))?,
            ),
            (literal, None) => literal.clone(),
        };

        Ok(ResolvedStep {
            kind: step
                .component
                .clone()
                .unwrap_or_else(|| self.default_kind.to_string()),
            variable: step.variable.clone(),
            value,
        })
    }
}

impl Iterator for ActionPlan<'_> {
    type Item = Result<ResolvedStep>;

    fn next(&mut self) -> Option<Self::Item> {
        let step = self.steps.next()?;
        Some(self.resolve(step))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.steps.size_hint()
    }
}

// ============================================================================
// Tests
// ============================================================================
