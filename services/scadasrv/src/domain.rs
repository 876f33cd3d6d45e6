//! Domain model
//!
//! Immutable values shared between the scan cycle, the snapshot store and the
//! HTTP adapter. Constructors validate; there are no setters.

use std::collections::HashMap;

use serde::Serialize;
use utoipa::ToSchema;

use crate::error::{Result, ScadaError};

/// Map key used for a unit in snapshots and on the wire (`u1`, `u2`, ...)
pub fn unit_key(unit_number: u32) -> String {
    format!("u{}", unit_number)
}

/// Parse a `u<N>` key back into the unit number
pub fn parse_unit_key(key: &str) -> Result<u32> {
    let digits = key
        .strip_prefix('u')
        .ok_or_else(|| ScadaError::data(format!("invalid unit key '{}': expected u<N>", key)))?;

    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ScadaError::data(format!(
            "invalid unit key '{}': expected u<N>",
            key
        )));
    }

    match digits.parse::<u32>() {
        Ok(n) if n >= 1 => Ok(n),
        _ => Err(ScadaError::data(format!(
            "invalid unit key '{}': unit number must be a positive integer",
            key
        ))),
    }
}

// ============================================================================
// Unit properties
// ============================================================================

/// The 23 optional per-unit properties PrintSrv reports
///
/// Every field may be absent. Serialized names are the ones PrintSrv uses, so
/// the HTTP adapter can hand these out unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct UnitProperties {
    #[serde(rename = "command", skip_serializing_if = "Option::is_none")]
    pub command: Option<i32>,
    #[serde(rename = "message", skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(rename = "Error", skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(rename = "ErrorMessage", skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(rename = "cmdsuccess", skip_serializing_if = "Option::is_none")]
    pub cmd_success: Option<String>,
    #[serde(rename = "ST", skip_serializing_if = "Option::is_none")]
    pub st: Option<String>,
    #[serde(rename = "batchId", skip_serializing_if = "Option::is_none")]
    pub batch_id: Option<String>,
    #[serde(rename = "CurItem", skip_serializing_if = "Option::is_none")]
    pub cur_item: Option<String>,
    #[serde(rename = "batchIdCodesQueue", skip_serializing_if = "Option::is_none")]
    pub batch_id_codes_queue: Option<String>,
    #[serde(rename = "setBatchID", skip_serializing_if = "Option::is_none")]
    pub set_batch_id: Option<String>,
    #[serde(rename = "devChangeBatch", skip_serializing_if = "Option::is_none")]
    pub dev_change_batch: Option<String>,
    #[serde(
        rename = "devsChangeBatchIDQueueControl",
        skip_serializing_if = "Option::is_none"
    )]
    pub devs_change_batch_id_queue_control: Option<String>,
    #[serde(rename = "devType", skip_serializing_if = "Option::is_none")]
    pub dev_type: Option<String>,
    #[serde(rename = "LineID", skip_serializing_if = "Option::is_none")]
    pub line_id: Option<String>,
    #[serde(rename = "OnChangeBatchPrinters", skip_serializing_if = "Option::is_none")]
    pub on_change_batch_printers: Option<String>,
    #[serde(rename = "Level1Printers", skip_serializing_if = "Option::is_none")]
    pub level1_printers: Option<String>,
    #[serde(rename = "Level2Printers", skip_serializing_if = "Option::is_none")]
    pub level2_printers: Option<String>,
    #[serde(rename = "OnChangeBatchCams", skip_serializing_if = "Option::is_none")]
    pub on_change_batch_cams: Option<String>,
    #[serde(rename = "Level1Cams", skip_serializing_if = "Option::is_none")]
    pub level1_cams: Option<String>,
    #[serde(rename = "Level2Cams", skip_serializing_if = "Option::is_none")]
    pub level2_cams: Option<String>,
    #[serde(rename = "SignalCams", skip_serializing_if = "Option::is_none")]
    pub signal_cams: Option<String>,
    #[serde(rename = "LineDevices", skip_serializing_if = "Option::is_none")]
    pub line_devices: Option<String>,
    #[serde(rename = "enableErrors", skip_serializing_if = "Option::is_none")]
    pub enable_errors: Option<String>,
}

impl UnitProperties {
    /// Properties carrying only a command value
    pub fn with_command(command: i32) -> Self {
        Self {
            command: Some(command),
            ..Self::default()
        }
    }
}

// ============================================================================
// Unit snapshot
// ============================================================================

/// State of one unit at the time of a QueryAll
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitSnapshot {
    unit_number: u32,
    state: String,
    task: String,
    counter: Option<i64>,
    properties: UnitProperties,
}

impl UnitSnapshot {
    /// Build a unit snapshot. Absent state/task are passed as empty strings.
    pub fn new(
        unit_number: u32,
        state: impl Into<String>,
        task: impl Into<String>,
        counter: Option<i64>,
        properties: UnitProperties,
    ) -> Result<Self> {
        if unit_number < 1 {
            return Err(ScadaError::validation(format!(
                "unit number must be >= 1, got {}",
                unit_number
            )));
        }

        Ok(Self {
            unit_number,
            state: state.into(),
            task: task.into(),
            counter,
            properties,
        })
    }

    pub fn unit_number(&self) -> u32 {
        self.unit_number
    }

    pub fn state(&self) -> &str {
        &self.state
    }

    pub fn task(&self) -> &str {
        &self.task
    }

    pub fn counter(&self) -> Option<i64> {
        self.counter
    }

    pub fn properties(&self) -> &UnitProperties {
        &self.properties
    }
}

// ============================================================================
// Device snapshot
// ============================================================================

/// Complete device state from one successful read
///
/// Owns its unit map outright; once constructed nothing can change it, so an
/// `Arc<DeviceSnapshot>` can be handed to any number of readers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceSnapshot {
    device_name: String,
    units: HashMap<String, UnitSnapshot>,
}

impl DeviceSnapshot {
    pub fn new(device_name: impl Into<String>, units: HashMap<String, UnitSnapshot>) -> Result<Self> {
        let device_name = device_name.into();
        if device_name.trim().is_empty() {
            return Err(ScadaError::validation("device name must not be empty"));
        }

        Ok(Self { device_name, units })
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    pub fn units(&self) -> &HashMap<String, UnitSnapshot> {
        &self.units
    }

    /// Look up a unit by its key (`u1`, `u2`, ...)
    pub fn unit(&self, key: &str) -> Option<&UnitSnapshot> {
        self.units.get(key)
    }

    /// Look up a unit by number
    pub fn unit_by_number(&self, unit_number: u32) -> Option<&UnitSnapshot> {
        self.units.get(&unit_key(unit_number))
    }

    pub fn unit_count(&self) -> usize {
        self.units.len()
    }
}

// ============================================================================
// Write command
// ============================================================================

/// A pending "set command value" request for one unit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteCommand {
    timestamp_ms: i64,
    unit_number: u32,
    command_value: i32,
}

impl WriteCommand {
    /// Create a command stamped with the current wall-clock time
    pub fn new(unit_number: u32, command_value: i32) -> Result<Self> {
        Self::with_timestamp(chrono::Utc::now().timestamp_millis(), unit_number, command_value)
    }

    /// Create a command with an explicit timestamp (milliseconds since epoch)
    pub fn with_timestamp(timestamp_ms: i64, unit_number: u32, command_value: i32) -> Result<Self> {
        if timestamp_ms < 0 {
            return Err(ScadaError::validation(format!(
                "timestamp must be >= 0, got {}",
                timestamp_ms
            )));
        }
        if unit_number < 1 {
            return Err(ScadaError::validation(format!(
                "unit number must be >= 1, got {}",
                unit_number
            )));
        }

        Ok(Self {
            timestamp_ms,
            unit_number,
            command_value,
        })
    }

    pub fn timestamp_ms(&self) -> i64 {
        self.timestamp_ms
    }

    pub fn unit_number(&self) -> u32 {
        self.unit_number
    }

    pub fn command_value(&self) -> i32 {
        self.command_value
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // unwrap is acceptable in tests
mod tests {
    use super::*;

    #[test]
    fn test_unit_key_round_trip() {
        assert_eq!(unit_key(7), "u7");
        assert_eq!(parse_unit_key("u7").unwrap(), 7);
        assert_eq!(parse_unit_key("u120").unwrap(), 120);
    }

    #[test]
    fn test_parse_unit_key_rejects_bad_keys() {
        for key in ["", "u", "x1", "u0", "u-1", "u1a", "U1", "1"] {
            assert!(
                matches!(parse_unit_key(key), Err(ScadaError::Data(_))),
                "key {:?} should be rejected",
                key
            );
        }
    }

    #[test]
    fn test_unit_snapshot_validation() {
        assert!(UnitSnapshot::new(0, "", "", None, UnitProperties::default()).is_err());
        let unit = UnitSnapshot::new(1, "", "", Some(5), UnitProperties::with_command(3)).unwrap();
        assert_eq!(unit.state(), "");
        assert_eq!(unit.counter(), Some(5));
        assert_eq!(unit.properties().command, Some(3));
    }

    #[test]
    fn test_device_snapshot_requires_name() {
        assert!(DeviceSnapshot::new("", HashMap::new()).is_err());
        assert!(DeviceSnapshot::new("   ", HashMap::new()).is_err());

        let mut units = HashMap::new();
        units.insert(
            unit_key(2),
            UnitSnapshot::new(2, "run", "t", None, UnitProperties::default()).unwrap(),
        );
        let snapshot = DeviceSnapshot::new("Line", units).unwrap();
        assert_eq!(snapshot.device_name(), "Line");
        assert_eq!(snapshot.unit_count(), 1);
        assert_eq!(snapshot.unit_by_number(2).unwrap().state(), "run");
        assert!(snapshot.unit("u1").is_none());
    }

    #[test]
    fn test_write_command_validation() {
        assert!(WriteCommand::new(0, 1).is_err());
        assert!(WriteCommand::with_timestamp(-1, 1, 1).is_err());

        let cmd = WriteCommand::with_timestamp(0, 3, -5).unwrap();
        assert_eq!(cmd.unit_number(), 3);
        assert_eq!(cmd.command_value(), -5);

        let now = WriteCommand::new(1, 1).unwrap();
        assert!(now.timestamp_ms() > 0);
    }

    #[test]
    fn test_properties_serialize_with_legacy_names() {
        let props = UnitProperties {
            error: Some("1".into()),
            line_id: Some("L2".into()),
            ..UnitProperties::with_command(4)
        };
        let value = serde_json::to_value(&props).unwrap();
        assert_eq!(value["command"], 4);
        assert_eq!(value["Error"], "1");
        assert_eq!(value["LineID"], "L2");
        assert!(value.get("message").is_none());
    }
}
