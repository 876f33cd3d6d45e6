//! PrintSrv operations
//!
//! QueryAll and SetUnitVars on top of the request executor. The scan cycle
//! talks to PrintSrv only through [`DeviceGateway`].

use async_trait::async_trait;
use tracing::debug;

use super::dto::{self, QueryAllRequest, SetUnitVarsRequest};
use super::executor::RequestExecutor;
use super::pool::{ConnectionFactory, PoolStats};
use crate::domain::{DeviceSnapshot, WriteCommand};
use crate::error::Result;

/// Device-level operations the scan cycle needs
#[async_trait]
pub trait DeviceGateway: Send + Sync + 'static {
    /// Read the complete state of every unit
    async fn query_all(&self) -> Result<DeviceSnapshot>;

    /// Set the command value of one unit
    async fn set_unit_vars(&self, command: &WriteCommand) -> Result<()>;
}

/// PrintSrv client for one device
pub struct PrintSrvClient<F: ConnectionFactory> {
    executor: RequestExecutor<F>,
    device_name: String,
}

impl<F: ConnectionFactory> PrintSrvClient<F> {
    pub fn new(executor: RequestExecutor<F>, device_name: impl Into<String>) -> Self {
        Self {
            executor,
            device_name: device_name.into(),
        }
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    pub fn pool_stats(&self) -> PoolStats {
        self.executor.pool().stats()
    }
}

#[async_trait]
impl<F: ConnectionFactory> DeviceGateway for PrintSrvClient<F> {
    async fn query_all(&self) -> Result<DeviceSnapshot> {
        let device_name = self.device_name.as_str();
        self.executor
            .execute(
                dto::QUERY_ALL,
                || Ok(serde_json::to_string(&QueryAllRequest::new(device_name))?),
                |body| dto::to_device_snapshot(dto::parse_query_all(body)?),
            )
            .await
    }

    async fn set_unit_vars(&self, command: &WriteCommand) -> Result<()> {
        let device_name = self.device_name.as_str();
        let unit = command.unit_number();
        let value = command.command_value();

        let response = self
            .executor
            .execute(
                dto::SET_UNIT_VARS,
                || {
                    Ok(serde_json::to_string(&SetUnitVarsRequest::new(
                        device_name,
                        unit,
                        value,
                    ))?)
                },
                dto::parse_set_unit_vars,
            )
            .await?;

        debug!(
            "SetUnitVars u{}={} acknowledged for {} unit(s)",
            unit,
            value,
            response.units.len()
        );
        Ok(())
    }
}
