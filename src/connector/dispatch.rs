//! Command building and failure settlement shared by the wire connectors.
//!
//! A [`Dispatcher`] maps semantic verbs to [`WireCommand`]s and runs them
//! over whatever [`Exchange`] the connector provides. Failures other than
//! [`Error::NotConnected`] are logged here and folded into `None` or a
//! failed [`CommandStatus`].

// ============================================================================
// Imports
// ============================================================================

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, error, trace, warn};

use crate::component::{Arguments, Component};
use crate::config::{ActionMap, CommandDefinition, CommandMap, placeholder_name};
use crate::error::{Error, Result};
use crate::protocol::{CommandStatus, WireCommand};

use super::action::ActionExpander;

// ============================================================================
// Exchange
// ============================================================================

/// One request/response round trip on a connector's transport.
#[async_trait]
pub(crate) trait Exchange: Send + Sync {
    /// Sends `command` and returns the peer's reply text.
    async fn exchange(&self, command: &WireCommand) -> Result<String>;
}

// ============================================================================
// Value Resolution
// ============================================================================

/// Picks the value a `put` writes.
///
/// Order: the argument named by a `{placeholder}` default, then the first
/// caller argument, then a literal default.
pub(crate) fn resolve_set_value(
    definition: &CommandDefinition,
    args: &Arguments,
    target: &str,
) -> Result<Value> {
    let placeholder = definition.value.as_ref().and_then(placeholder_name);

    if let Some(value) = placeholder.and_then(|name| args.get(name)) {
        return Ok(value.clone());
    }
    if let Some(value) = args.first() {
        return Ok(value.clone());
    }
    match (&definition.value, placeholder) {
        (Some(literal), None) => Ok(literal.clone()),
        (_, Some(name)) => Err(Error::missing_argument(name, target)),
        (None, None) => Err(Error::missing_argument("value", target)),
    }
}

// ============================================================================
// Dispatcher
// ============================================================================

/// Verb handling for one protocol's command and action tables.
#[derive(Debug)]
pub(crate) struct Dispatcher {
    protocol: &'static str,
    commands: CommandMap,
    expander: ActionExpander,
}

impl Dispatcher {
    pub(crate) fn new(protocol: &'static str, commands: CommandMap, actions: ActionMap) -> Self {
        Self {
            protocol,
            commands,
            expander: ActionExpander::new(actions),
        }
    }

    /// Builds `GET <command>` for `component.variable`.
    pub(crate) fn get_command(&self, component: &Component, variable: &str) -> Result<WireCommand> {
        let definition = self.commands.lookup(&component.kind, variable)?;
        Ok(WireCommand::get(definition))
    }

    /// Builds `SET <command>=<value>` and returns the value written.
    pub(crate) fn put_command(
        &self,
        component: &Component,
        variable: &str,
        args: &Arguments,
    ) -> Result<(WireCommand, Value)> {
        let definition = self.commands.lookup(&component.kind, variable)?;
        let target = format!("{}.{variable}", component.kind);
        let value = resolve_set_value(definition, args, &target)?;
        Ok((WireCommand::set(definition, &value), value))
    }

    pub(crate) async fn get(
        &self,
        link: &dyn Exchange,
        component: &Component,
        variable: &str,
        kind: Option<&str>,
    ) -> Result<Option<Value>> {
        trace!(protocol = self.protocol, component = %component, variable, kind, "get");

        let outcome = async {
            let command = self.get_command(component, variable)?;
            link.exchange(&command).await
        }
        .await;

        match outcome {
            Ok(response) => Ok(Some(Value::String(response))),
            Err(Error::NotConnected) => Err(Error::NotConnected),
            Err(e) => {
                error!(
                    protocol = self.protocol,
                    component = %component,
                    variable,
                    error = %e,
                    "Error getting value"
                );
                Ok(None)
            }
        }
    }

    pub(crate) async fn put(
        &self,
        link: &dyn Exchange,
        component: &Component,
        variable: &str,
        args: &Arguments,
    ) -> Result<CommandStatus> {
        let outcome = async {
            let (command, value) = self.put_command(component, variable, args)?;
            let response = link.exchange(&command).await?;
            Ok::<_, Error>(CommandStatus::ok(value, response))
        }
        .await;

        match outcome {
            Ok(status) => {
                debug!(protocol = self.protocol, component = %component, variable, "Value set");
                Ok(status)
            }
            Err(Error::NotConnected) => Err(Error::NotConnected),
            Err(e) => {
                error!(
                    protocol = self.protocol,
                    component = %component,
                    variable,
                    error = %e,
                    "Error setting value"
                );
                Ok(CommandStatus::failed(e))
            }
        }
    }

    pub(crate) async fn call(
        &self,
        link: &dyn Exchange,
        component: &Component,
        function: &str,
        args: &Arguments,
    ) -> Result<CommandStatus> {
        let Some(plan) = self.expander.plan(function, &component.kind, args) else {
            let e = Error::unknown_action(function);
            warn!(protocol = self.protocol, component = %component, error = %e, "Action rejected");
            return Ok(CommandStatus::unknown_function(function));
        };

        let mut last_response = None;
        for step in plan {
            let step = match step {
                Ok(step) => step,
                Err(e) => {
                    error!(
                        protocol = self.protocol,
                        component = %component,
                        function,
                        error = %e,
                        "Action aborted"
                    );
                    return Ok(CommandStatus::failed(e).for_action(function));
                }
            };

            let target = Component::new(step.kind.clone(), component.name.clone());
            let status = self
                .put(link, &target, &step.variable, &step.arguments())
                .await?;
            if status.is_failure() {
                warn!(
                    protocol = self.protocol,
                    function,
                    variable = %step.variable,
                    "Action step failed, continuing"
                );
            }
            last_response = status.response;
        }

        debug!(protocol = self.protocol, component = %component, function, "Action completed");
        Ok(CommandStatus::completed(function, last_response))
    }
}

// ============================================================================
// Tests
// ============================================================================
