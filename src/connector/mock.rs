//! In-memory mount (`dummy`).
//!
//! Answers mount variables from local state and logs every command. Useful
//! for exercising callers without hardware.

// ============================================================================
// Imports
// ============================================================================

use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tracing::{info, warn};

use crate::component::{Arguments, Component, kinds};
use crate::error::{Error, Result};
use crate::protocol::CommandStatus;

use super::{ConnectionState, Connector, Endpoint, StateCell, SubscriptionCallback};

// ============================================================================
// MountState
// ============================================================================

/// Simulated mount.
#[derive(Debug, Clone, PartialEq)]
pub struct MountState {
    /// Device-level `connected` flag, independent of the connector state.
    pub connected: bool,
    /// Slew in progress.
    pub slewing: bool,
    /// Sidereal tracking on.
    pub tracking: bool,
    /// Hours.
    pub ra: f64,
    /// Degrees.
    pub dec: f64,
    /// Degrees.
    pub azimuth: f64,
    /// Degrees.
    pub altitude: f64,
}

impl Default for MountState {
    fn default() -> Self {
        Self {
            connected: false,
            slewing: false,
            tracking: true,
            ra: 15.5,
            dec: -24.5,
            azimuth: 180.0,
            altitude: 45.0,
        }
    }
}

// ============================================================================
// MockConnector
// ============================================================================

/// Connector backed by a [`MountState`].
#[derive(Debug, Default)]
pub struct MockConnector {
    state: StateCell,
    mount: Mutex<MountState>,
}

impl MockConnector {
    /// Registered protocol name.
    pub const PROTOCOL: &'static str = "dummy";

    /// Creates a disconnected mock with the default mount.
    #[must_use]
    pub fn new() -> Self {
        info!(protocol = Self::PROTOCOL, "Mock connector created");
        Self::default()
    }

    /// Snapshot of the simulated mount.
    #[must_use]
    pub fn mount(&self) -> MountState {
        self.mount.lock().clone()
    }

    fn ensure_connected(&self) -> Result<()> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(Error::NotConnected)
        }
    }

    fn mount_value(&self, variable: &str) -> Option<Value> {
        let mount = self.mount.lock();
        let value = match variable {
            "connected" => Value::from(mount.connected),
            "slewing" => Value::from(mount.slewing),
            "tracking" => Value::from(mount.tracking),
            "rightascension" => Value::from(mount.ra),
            "declination" => Value::from(mount.dec),
            "azimuth" => Value::from(mount.azimuth),
            "altitude" => Value::from(mount.altitude),
            "athome" | "atpark" => Value::from(false),
            "canfindhome" | "canpark" | "canslew" | "cantrack" => Value::from(true),
            "siderealtime" => Value::from(sidereal_hours()),
            _ => return None,
        };
        Some(value)
    }

    fn generic_value(component: &Component, variable: &str) -> Option<Value> {
        match variable {
            "connected" => Some(Value::from(true)),
            "name" => Some(Value::from(format!("Dummy {}", component.name))),
            "description" => Some(Value::from(format!("Dummy {} for testing", component.kind))),
            _ => None,
        }
    }

    /// Applies a mount write; `alias` is the capitalized argument name.
    fn write_mount(&self, variable: &str, args: &Arguments) -> Result<Option<Value>> {
        let alias = match variable {
            "connected" => "Connected",
            "tracking" => "Tracking",
            "rightascension" => "RightAscension",
            "declination" => "Declination",
            _ => return Ok(None),
        };
        let Some(value) = args.get("value").or_else(|| args.get(alias)).cloned() else {
            return Ok(None);
        };

        let mut mount = self.mount.lock();
        match variable {
            "connected" => mount.connected = as_bool(&value, variable)?,
            "tracking" => mount.tracking = as_bool(&value, variable)?,
            "rightascension" => mount.ra = as_f64(&value, variable)?,
            _ => mount.dec = as_f64(&value, variable)?,
        }
        info!(variable, value = %value, "Mock mount updated");
        Ok(Some(value))
    }

    fn run_mount_function(&self, function: &str, args: &Arguments) {
        let mut mount = self.mount.lock();
        match function {
            "slewtocoordinates" => {
                let ra = args.get("RightAscension").or_else(|| args.get("ra"));
                let dec = args.get("Declination").or_else(|| args.get("dec"));
                if let Some(ra) = ra.and_then(Value::as_f64) {
                    mount.ra = ra;
                }
                if let Some(dec) = dec.and_then(Value::as_f64) {
                    mount.dec = dec;
                }
                mount.slewing = true;
                info!(ra = mount.ra, dec = mount.dec, "Mock slew started");
            }
            "abortslew" | "park" | "findhome" => {
                mount.slewing = false;
                info!(function, "Mock mount stopped");
            }
            "unpark" | "setpark" => info!(function, "Mock mount"),
            _ => warn!(function, "Mock mount ignores function"),
        }
    }
}

fn sidereal_hours() -> f64 {
    let seconds = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0.0, |d| d.as_secs_f64());
    (seconds / 3600.0) % 24.0
}

fn as_bool(value: &Value, variable: &str) -> Result<bool> {
    value
        .as_bool()
        .ok_or_else(|| Error::invalid_argument(format!("{variable} expects a boolean, got {value}")))
}

fn as_f64(value: &Value, variable: &str) -> Result<f64> {
    value
        .as_f64()
        .ok_or_else(|| Error::invalid_argument(format!("{variable} expects a number, got {value}")))
}

// ============================================================================
// Connector
// ============================================================================

#[async_trait]
impl Connector for MockConnector {
    fn protocol(&self) -> &'static str {
        Self::PROTOCOL
    }

    fn state(&self) -> ConnectionState {
        self.state.get()
    }

    async fn connect(&self, endpoint: &Endpoint) -> Result<()> {
        self.state.set(ConnectionState::Connected);
        info!(protocol = Self::PROTOCOL, endpoint = %endpoint, "Connected");
        Ok(())
    }

    async fn disconnect(&self) {
        self.state.set(ConnectionState::Disconnected);
    }

    async fn get(
        &self,
        component: &Component,
        variable: &str,
        kind: Option<&str>,
        _args: &Arguments,
    ) -> Result<Option<Value>> {
        self.ensure_connected()?;
        info!(component = %component, variable, kind, "Mock GET");

        let mount_value = if component.kind == kinds::MOUNT {
            self.mount_value(&variable.to_ascii_lowercase())
        } else {
            None
        };
        let value = mount_value.or_else(|| Self::generic_value(component, variable));

        if value.is_none() {
            warn!(component = %component, variable, "Mock GET: unknown variable");
        }
        Ok(value)
    }

    async fn put(
        &self,
        component: &Component,
        variable: &str,
        kind: Option<&str>,
        args: &Arguments,
    ) -> Result<CommandStatus> {
        self.ensure_connected()?;
        info!(component = %component, variable, kind, "Mock PUT");

        if component.kind != kinds::MOUNT {
            return Ok(CommandStatus::ok(
                args.first().cloned().unwrap_or(Value::Null),
                "OK",
            ));
        }
        match self.write_mount(variable, args) {
            Ok(value) => Ok(CommandStatus::ok(value.unwrap_or(Value::Null), "OK")),
            Err(e) => {
                warn!(component = %component, variable, error = %e, "Mock PUT rejected");
                Ok(CommandStatus::failed(e))
            }
        }
    }

    async fn call(
        &self,
        component: &Component,
        function: &str,
        args: &Arguments,
    ) -> Result<CommandStatus> {
        self.ensure_connected()?;
        info!(component = %component, function, "Mock CALL");

        if component.kind == kinds::MOUNT {
            self.run_mount_function(function, args);
        }
        Ok(CommandStatus::completed(function, None))
    }

    async fn subscribe(
        &self,
        variables: &[(String, String)],
        _callback: SubscriptionCallback,
    ) -> Result<()> {
        info!(count = variables.len(), "Mock SUBSCRIBE");
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use crate::protocol::StatusKind;

    async fn connected() -> MockConnector {
        let mock = MockConnector::new();
        mock.connect(&Endpoint::new("localhost", 0)).await.expect("connect");
        mock
    }

    fn mount() -> Component {
        Component::telescope("mount")
    }

    #[tokio::test]
    async fn test_requires_connect() {
        let mock = MockConnector::new();
        let err = mock
            .get(&mount(), "rightascension", None, &Arguments::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotConnected));
    }

    #[tokio::test]
    async fn test_mount_defaults() {
        let mock = connected().await;
        let args = Arguments::new();

        let ra = mock.get(&mount(), "rightascension", None, &args).await.expect("get");
        let tracking = mock.get(&mount(), "tracking", None, &args).await.expect("get");
        let home = mock.get(&mount(), "canFindHome", None, &args).await.expect("get");
        let lst = mock.get(&mount(), "siderealtime", None, &args).await.expect("get");

        assert_eq!(ra, Some(Value::from(15.5)));
        assert_eq!(tracking, Some(Value::from(true)));
        assert_eq!(home, Some(Value::from(true)));
        let lst = lst.and_then(|v| v.as_f64()).expect("lst");
        assert!((0.0..24.0).contains(&lst));
    }

    #[tokio::test]
    async fn test_generic_component() {
        let mock = connected().await;
        let dome = Component::new(kinds::DOME, "main");
        let args = Arguments::new();

        assert_eq!(
            mock.get(&dome, "name", None, &args).await.expect("get"),
            Some(Value::from("Dummy main"))
        );
        assert_eq!(
            mock.get(&dome, "description", None, &args).await.expect("get"),
            Some(Value::from("Dummy dome for testing"))
        );
        assert!(mock.get(&dome, "shutter", None, &args).await.expect("get").is_none());
    }

    #[tokio::test]
    async fn test_put_updates_mount() {
        let mock = connected().await;

        let status = mock
            .put(&mount(), "rightascension", None, &Arguments::new().with("value", 3.25))
            .await
            .expect("put");
        mock.put(&mount(), "tracking", None, &Arguments::new().with("Tracking", false))
            .await
            .expect("put");

        assert_eq!(status.status, StatusKind::Ok);
        assert_eq!(status.value_set, Some(Value::from(3.25)));
        let state = mock.mount();
        assert_eq!(state.ra, 3.25);
        assert!(!state.tracking);
    }

    #[tokio::test]
    async fn test_put_wrong_type_fails() {
        let mock = connected().await;
        let status = mock
            .put(&mount(), "declination", None, &Arguments::new().with("value", "north"))
            .await
            .expect("put");

        assert_eq!(status.status, StatusKind::Failed);
        assert_eq!(mock.mount().dec, -24.5);
    }

    #[tokio::test]
    async fn test_slew_and_abort() {
        let mock = connected().await;

        let status = mock
            .call(
                &mount(),
                "slewtocoordinates",
                &Arguments::new().with("RightAscension", 6.0).with("dec", 10.0),
            )
            .await
            .expect("call");
        assert_eq!(status.status, StatusKind::Completed);
        assert_eq!(status.action.as_deref(), Some("slewtocoordinates"));

        let state = mock.mount();
        assert!(state.slewing);
        assert_eq!((state.ra, state.dec), (6.0, 10.0));

        mock.call(&mount(), "abortslew", &Arguments::new())
            .await
            .expect("call");
        assert!(!mock.mount().slewing);
    }
}
