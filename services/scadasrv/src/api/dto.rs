//! HTTP request/response models
//!
//! Field names match what existing SCADA clients already read
//! (`DeviceName`, `Units`, `State`, ...).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::domain::{unit_key, DeviceSnapshot, UnitProperties, UnitSnapshot};
use crate::printsrv::dto::SET_UNIT_VARS;

// === Query Parameters ===

/// Parameters of `POST /api/v1/commands/setUnitVars`
#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct SetUnitVarsParams {
    /// Unit number, 1-based (1 = u1)
    #[param(minimum = 1, example = 1)]
    pub unit: i64,
    /// New command value
    #[param(minimum = 1, example = 128)]
    pub value: i64,
}

// === Responses ===

/// State of one unit as served to clients
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct UnitStateDto {
    #[serde(rename = "State", skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(rename = "Task", skip_serializing_if = "Option::is_none")]
    pub task: Option<String>,
    #[serde(rename = "Counter", skip_serializing_if = "Option::is_none")]
    pub counter: Option<i64>,
    #[serde(rename = "Properties", skip_serializing_if = "Option::is_none")]
    pub properties: Option<UnitProperties>,
}

impl From<&UnitSnapshot> for UnitStateDto {
    fn from(unit: &UnitSnapshot) -> Self {
        Self {
            state: Some(unit.state().to_string()),
            task: Some(unit.task().to_string()),
            counter: unit.counter(),
            properties: Some(unit.properties().clone()),
        }
    }
}

/// `GET /api/v1/commands/queryAll` body
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct QueryStateResponse {
    #[serde(rename = "DeviceName")]
    pub device_name: String,
    #[serde(rename = "Units")]
    pub units: BTreeMap<String, UnitStateDto>,
}

impl From<&DeviceSnapshot> for QueryStateResponse {
    fn from(snapshot: &DeviceSnapshot) -> Self {
        Self {
            device_name: snapshot.device_name().to_string(),
            units: snapshot
                .units()
                .iter()
                .map(|(key, unit)| (key.clone(), UnitStateDto::from(unit)))
                .collect(),
        }
    }
}

/// Acknowledgement that a command was queued
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CommandAcceptedResponse {
    #[serde(rename = "DeviceName")]
    pub device_name: String,
    #[serde(rename = "Command")]
    pub command: String,
    #[serde(rename = "Units")]
    pub units: BTreeMap<String, UnitStateDto>,
}

impl CommandAcceptedResponse {
    pub fn set_unit_vars(device_name: &str, unit_number: u32, value: i32) -> Self {
        let mut units = BTreeMap::new();
        units.insert(
            unit_key(unit_number),
            UnitStateDto {
                state: None,
                task: None,
                counter: None,
                properties: Some(UnitProperties::with_command(value)),
            },
        );
        Self {
            device_name: device_name.to_string(),
            command: SET_UNIT_VARS.to_string(),
            units,
        }
    }
}

/// Liveness/readiness probe body
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ProbeResponse {
    /// `UP` or `DOWN`
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ready: Option<bool>,
    pub timestamp: String,
}

impl ProbeResponse {
    pub fn new(up: bool, ready: Option<bool>) -> Self {
        Self {
            status: if up { "UP" } else { "DOWN" }.to_string(),
            ready,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}
