//! PrintSrv wire DTOs
//!
//! Field names follow PrintSrv's JSON exactly. Inbound types are lenient
//! about scalar types because PrintSrv sends numbers and numeric strings
//! interchangeably.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use common::serde_helpers::{
    deserialize_optional_i32, deserialize_optional_i64, deserialize_optional_string_lenient,
};

use crate::domain::{parse_unit_key, DeviceSnapshot, UnitProperties, UnitSnapshot};
use crate::error::{Result, ScadaError};

pub const QUERY_ALL: &str = "QueryAll";
pub const SET_UNIT_VARS: &str = "SetUnitVars";

// ============================================================================
// Requests
// ============================================================================

#[derive(Debug, Serialize)]
pub struct QueryAllRequest<'a> {
    #[serde(rename = "DeviceName")]
    pub device_name: &'a str,
    #[serde(rename = "Command")]
    pub command: &'static str,
}

impl<'a> QueryAllRequest<'a> {
    pub fn new(device_name: &'a str) -> Self {
        Self {
            device_name,
            command: QUERY_ALL,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SetUnitVarsParameters {
    pub command: i32,
}

#[derive(Debug, Serialize)]
pub struct SetUnitVarsRequest<'a> {
    #[serde(rename = "DeviceName")]
    pub device_name: &'a str,
    /// 1-based unit number (`1` addresses `u1`)
    #[serde(rename = "Unit")]
    pub unit: u32,
    #[serde(rename = "Command")]
    pub command: &'static str,
    #[serde(rename = "Parameters")]
    pub parameters: SetUnitVarsParameters,
}

impl<'a> SetUnitVarsRequest<'a> {
    pub fn new(device_name: &'a str, unit: u32, command_value: i32) -> Self {
        Self {
            device_name,
            unit,
            command: SET_UNIT_VARS,
            parameters: SetUnitVarsParameters {
                command: command_value,
            },
        }
    }
}

// ============================================================================
// Responses
// ============================================================================

/// Per-unit properties as PrintSrv reports them
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct PropertiesDto {
    #[serde(rename = "command", deserialize_with = "deserialize_optional_i32")]
    pub command: Option<i32>,
    #[serde(rename = "message", deserialize_with = "deserialize_optional_string_lenient")]
    pub message: Option<String>,
    #[serde(rename = "Error", deserialize_with = "deserialize_optional_string_lenient")]
    pub error: Option<String>,
    #[serde(rename = "ErrorMessage", deserialize_with = "deserialize_optional_string_lenient")]
    pub error_message: Option<String>,
    #[serde(rename = "cmdsuccess", deserialize_with = "deserialize_optional_string_lenient")]
    pub cmd_success: Option<String>,
    #[serde(rename = "ST", deserialize_with = "deserialize_optional_string_lenient")]
    pub st: Option<String>,
    #[serde(rename = "batchId", deserialize_with = "deserialize_optional_string_lenient")]
    pub batch_id: Option<String>,
    #[serde(rename = "CurItem", deserialize_with = "deserialize_optional_string_lenient")]
    pub cur_item: Option<String>,
    #[serde(
        rename = "batchIdCodesQueue",
        deserialize_with = "deserialize_optional_string_lenient"
    )]
    pub batch_id_codes_queue: Option<String>,
    #[serde(rename = "setBatchID", deserialize_with = "deserialize_optional_string_lenient")]
    pub set_batch_id: Option<String>,
    #[serde(rename = "devChangeBatch", deserialize_with = "deserialize_optional_string_lenient")]
    pub dev_change_batch: Option<String>,
    #[serde(
        rename = "devsChangeBatchIDQueueControl",
        deserialize_with = "deserialize_optional_string_lenient"
    )]
    pub devs_change_batch_id_queue_control: Option<String>,
    #[serde(rename = "devType", deserialize_with = "deserialize_optional_string_lenient")]
    pub dev_type: Option<String>,
    #[serde(rename = "LineID", deserialize_with = "deserialize_optional_string_lenient")]
    pub line_id: Option<String>,
    #[serde(
        rename = "OnChangeBatchPrinters",
        deserialize_with = "deserialize_optional_string_lenient"
    )]
    pub on_change_batch_printers: Option<String>,
    #[serde(rename = "Level1Printers", deserialize_with = "deserialize_optional_string_lenient")]
    pub level1_printers: Option<String>,
    #[serde(rename = "Level2Printers", deserialize_with = "deserialize_optional_string_lenient")]
    pub level2_printers: Option<String>,
    #[serde(
        rename = "OnChangeBatchCams",
        deserialize_with = "deserialize_optional_string_lenient"
    )]
    pub on_change_batch_cams: Option<String>,
    #[serde(rename = "Level1Cams", deserialize_with = "deserialize_optional_string_lenient")]
    pub level1_cams: Option<String>,
    #[serde(rename = "Level2Cams", deserialize_with = "deserialize_optional_string_lenient")]
    pub level2_cams: Option<String>,
    #[serde(rename = "SignalCams", deserialize_with = "deserialize_optional_string_lenient")]
    pub signal_cams: Option<String>,
    #[serde(rename = "LineDevices", deserialize_with = "deserialize_optional_string_lenient")]
    pub line_devices: Option<String>,
    #[serde(rename = "enableErrors", deserialize_with = "deserialize_optional_string_lenient")]
    pub enable_errors: Option<String>,
}

impl From<PropertiesDto> for UnitProperties {
    fn from(dto: PropertiesDto) -> Self {
        UnitProperties {
            command: dto.command,
            message: dto.message,
            error: dto.error,
            error_message: dto.error_message,
            cmd_success: dto.cmd_success,
            st: dto.st,
            batch_id: dto.batch_id,
            cur_item: dto.cur_item,
            batch_id_codes_queue: dto.batch_id_codes_queue,
            set_batch_id: dto.set_batch_id,
            dev_change_batch: dto.dev_change_batch,
            devs_change_batch_id_queue_control: dto.devs_change_batch_id_queue_control,
            dev_type: dto.dev_type,
            line_id: dto.line_id,
            on_change_batch_printers: dto.on_change_batch_printers,
            level1_printers: dto.level1_printers,
            level2_printers: dto.level2_printers,
            on_change_batch_cams: dto.on_change_batch_cams,
            level1_cams: dto.level1_cams,
            level2_cams: dto.level2_cams,
            signal_cams: dto.signal_cams,
            line_devices: dto.line_devices,
            enable_errors: dto.enable_errors,
        }
    }
}

/// One unit in a QueryAll or SetUnitVars response
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct UnitDto {
    #[serde(rename = "State", deserialize_with = "deserialize_optional_string_lenient")]
    pub state: Option<String>,
    #[serde(rename = "Task", deserialize_with = "deserialize_optional_string_lenient")]
    pub task: Option<String>,
    /// Absent in SetUnitVars responses
    #[serde(rename = "Counter", deserialize_with = "deserialize_optional_i64")]
    pub counter: Option<i64>,
    #[serde(rename = "Properties")]
    pub properties: Option<PropertiesDto>,
}

#[derive(Debug, Deserialize)]
pub struct QueryAllResponse {
    #[serde(rename = "DeviceName")]
    pub device_name: String,
    #[serde(rename = "Command", default)]
    pub command: Option<String>,
    #[serde(rename = "Units", default)]
    pub units: HashMap<String, UnitDto>,
}

/// SetUnitVars acknowledgement; carries only the fields that changed
#[derive(Debug, Deserialize)]
pub struct SetUnitVarsResponse {
    #[serde(rename = "DeviceName", default)]
    pub device_name: Option<String>,
    #[serde(rename = "Command", default)]
    pub command: Option<String>,
    #[serde(rename = "Units", default)]
    pub units: HashMap<String, UnitDto>,
}

// ============================================================================
// Mapping
// ============================================================================

/// Parse a QueryAll response body
pub fn parse_query_all(body: &str) -> Result<QueryAllResponse> {
    serde_json::from_str(body)
        .map_err(|e| ScadaError::data(format!("invalid QueryAll response: {}", e)))
}

/// Parse a SetUnitVars response body
pub fn parse_set_unit_vars(body: &str) -> Result<SetUnitVarsResponse> {
    serde_json::from_str(body)
        .map_err(|e| ScadaError::data(format!("invalid SetUnitVars response: {}", e)))
}

/// Map a QueryAll response to a domain snapshot
///
/// Every unit key must be `u<N>`; one bad key rejects the whole response.
/// Absent state and task become empty strings, absent properties become
/// all-absent properties.
pub fn to_device_snapshot(response: QueryAllResponse) -> Result<DeviceSnapshot> {
    let mut units = HashMap::with_capacity(response.units.len());

    for (key, dto) in response.units {
        let unit_number = parse_unit_key(&key)?;
        let unit = UnitSnapshot::new(
            unit_number,
            dto.state.unwrap_or_default(),
            dto.task.unwrap_or_default(),
            dto.counter,
            dto.properties.map(UnitProperties::from).unwrap_or_default(),
        )?;
        units.insert(key, unit);
    }

    DeviceSnapshot::new(response.device_name, units)
        .map_err(|e| ScadaError::data(format!("invalid QueryAll response: {}", e)))
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // unwrap is acceptable in tests
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "DeviceName": "Line",
        "Command": "QueryAll",
        "Units": {
            "u1": {
                "State": "Run",
                "Task": "Batch-7",
                "Counter": 1520,
                "Properties": {
                    "command": "3",
                    "Error": 0,
                    "LineID": "L1",
                    "batchIdCodesQueue": "",
                    "enableErrors": true
                }
            },
            "u2": {
                "Counter": "17",
                "Properties": null
            }
        }
    }"#;

    #[test]
    fn test_query_all_request_json() {
        let json = serde_json::to_string(&QueryAllRequest::new("Line")).unwrap();
        assert_eq!(json, r#"{"DeviceName":"Line","Command":"QueryAll"}"#);
    }

    #[test]
    fn test_set_unit_vars_request_json() {
        let json = serde_json::to_string(&SetUnitVarsRequest::new("Line", 2, 5)).unwrap();
        assert_eq!(
            json,
            r#"{"DeviceName":"Line","Unit":2,"Command":"SetUnitVars","Parameters":{"command":5}}"#
        );
    }

    #[test]
    fn test_maps_query_all_response() {
        let snapshot = to_device_snapshot(parse_query_all(SAMPLE).unwrap()).unwrap();
        assert_eq!(snapshot.device_name(), "Line");
        assert_eq!(snapshot.unit_count(), 2);

        let u1 = snapshot.unit("u1").unwrap();
        assert_eq!(u1.unit_number(), 1);
        assert_eq!(u1.state(), "Run");
        assert_eq!(u1.task(), "Batch-7");
        assert_eq!(u1.counter(), Some(1520));
        assert_eq!(u1.properties().command, Some(3));
        assert_eq!(u1.properties().error.as_deref(), Some("0"));
        assert_eq!(u1.properties().line_id.as_deref(), Some("L1"));
        assert_eq!(u1.properties().batch_id_codes_queue.as_deref(), Some(""));
        assert_eq!(u1.properties().enable_errors.as_deref(), Some("true"));
        assert!(u1.properties().message.is_none());

        let u2 = snapshot.unit_by_number(2).unwrap();
        assert_eq!(u2.state(), "");
        assert_eq!(u2.task(), "");
        assert_eq!(u2.counter(), Some(17));
        assert_eq!(u2.properties(), &UnitProperties::default());
    }

    #[test]
    fn test_bad_unit_key_rejects_response() {
        let body = r#"{"DeviceName":"Line","Units":{"u1":{},"unit2":{}}}"#;
        let err = to_device_snapshot(parse_query_all(body).unwrap()).unwrap_err();
        assert!(matches!(err, ScadaError::Data(_)));
    }

    #[test]
    fn test_empty_device_name_is_data_error() {
        let body = r#"{"DeviceName":"","Units":{}}"#;
        let err = to_device_snapshot(parse_query_all(body).unwrap()).unwrap_err();
        assert!(matches!(err, ScadaError::Data(_)));
    }

    #[test]
    fn test_non_json_is_data_error() {
        assert!(matches!(
            parse_query_all("<html>"),
            Err(ScadaError::Data(_))
        ));
        assert!(matches!(
            parse_set_unit_vars("not json"),
            Err(ScadaError::Data(_))
        ));
    }

    #[test]
    fn test_set_unit_vars_response_without_counter() {
        let body = r#"{"DeviceName":"Line","Command":"SetUnitVars","Units":{"u1":{"Properties":{"command":5}}}}"#;
        let response = parse_set_unit_vars(body).unwrap();
        let unit = &response.units["u1"];
        assert!(unit.counter.is_none());
        assert_eq!(unit.properties.as_ref().unwrap().command, Some(5));
    }
}
