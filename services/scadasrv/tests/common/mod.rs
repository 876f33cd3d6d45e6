//! Common test utilities and helpers

#![allow(dead_code)]
#![allow(clippy::disallowed_methods)] // unwrap is acceptable in tests

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;

use scadasrv::domain::{DeviceSnapshot, UnitProperties, UnitSnapshot, WriteCommand};
use scadasrv::error::{Result, ScadaError};
use scadasrv::printsrv::{DeviceGateway, FrameCodec, TcpConnectionFactory};
use scadasrv::runtime::{ConnectionHealthPolicy, HealthPolicyConfig};
use scadasrv::store::{PendingWriteBuffer, SnapshotStore};

// ============================================================================
// In-process PrintSrv
// ============================================================================

pub type Responder = Arc<dyn Fn(&str) -> String + Send + Sync>;

pub const QUERY_ALL_BODY: &str = r#"{
    "DeviceName": "Line",
    "Command": "QueryAll",
    "Units": {
        "u1": {
            "State": "Run",
            "Task": "Batch-7",
            "Counter": 1520,
            "Properties": {"command": 3, "LineID": "L1", "Error": 0}
        },
        "u2": {
            "State": "Stop",
            "Task": "",
            "Counter": "17",
            "Properties": {"command": "1"}
        }
    }
}"#;

/// Answers QueryAll with [`QUERY_ALL_BODY`] and acknowledges SetUnitVars
pub fn line_responder() -> Responder {
    Arc::new(|request: &str| {
        let json: serde_json::Value = serde_json::from_str(request).unwrap();
        match json["Command"].as_str() {
            Some("QueryAll") => QUERY_ALL_BODY.to_string(),
            Some("SetUnitVars") => {
                let unit = json["Unit"].as_u64().unwrap();
                let value = json["Parameters"]["command"].as_i64().unwrap();
                serde_json::json!({
                    "DeviceName": json["DeviceName"],
                    "Command": "SetUnitVars",
                    "Units": { format!("u{}", unit): { "Properties": { "command": value } } }
                })
                .to_string()
            },
            _ => "Fail".to_string(),
        }
    })
}

/// TCP server speaking the PrintSrv framing on an ephemeral port
pub struct FakePrintSrv {
    pub port: u16,
    requests: Arc<Mutex<Vec<String>>>,
    accepted: Arc<Mutex<u32>>,
    handle: JoinHandle<()>,
}

impl FakePrintSrv {
    pub async fn start(responder: Responder) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let accepted = Arc::new(Mutex::new(0));

        let recorded = Arc::clone(&requests);
        let counter = Arc::clone(&accepted);
        let handle = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                *counter.lock() += 1;
                let responder = Arc::clone(&responder);
                let recorded = Arc::clone(&recorded);
                tokio::spawn(async move {
                    let mut framed = Framed::new(stream, FrameCodec::default());
                    while let Some(Ok(request)) = framed.next().await {
                        let response = responder(&request);
                        recorded.lock().push(request);
                        if framed.send(response.as_str()).await.is_err() {
                            break;
                        }
                    }
                });
            }
        });

        Self {
            port,
            requests,
            accepted,
            handle,
        }
    }

    pub fn factory(&self) -> TcpConnectionFactory {
        TcpConnectionFactory::new(
            "127.0.0.1",
            self.port,
            FrameCodec::default(),
            Duration::from_secs(1),
        )
    }

    /// Request bodies received so far, in arrival order
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().clone()
    }

    pub fn accepted_connections(&self) -> u32 {
        *self.accepted.lock()
    }
}

impl Drop for FakePrintSrv {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

// ============================================================================
// Scripted gateway
// ============================================================================

pub fn line_snapshot(counter: i64) -> DeviceSnapshot {
    let mut units = HashMap::new();
    units.insert(
        "u1".to_string(),
        UnitSnapshot::new(1, "Run", "Batch-7", Some(counter), UnitProperties::with_command(3))
            .unwrap(),
    );
    units.insert(
        "u2".to_string(),
        UnitSnapshot::new(2, "Stop", "", Some(17), UnitProperties::default()).unwrap(),
    );
    DeviceSnapshot::new("Line", units).unwrap()
}

/// Gateway whose reads and writes are driven by the test
#[derive(Default)]
pub struct ScriptedGateway {
    /// Queued read results; an empty queue answers with `line_snapshot(0)`
    reads: Mutex<VecDeque<Result<DeviceSnapshot>>>,
    failing_units: Mutex<HashSet<u32>>,
    written: Mutex<Vec<WriteCommand>>,
    attempted: Mutex<Vec<u32>>,
}

impl ScriptedGateway {
    pub fn push_read(&self, result: Result<DeviceSnapshot>) {
        self.reads.lock().push_back(result);
    }

    pub fn fail_writes_for(&self, unit: u32) {
        self.failing_units.lock().insert(unit);
    }

    /// Commands PrintSrv acknowledged
    pub fn written(&self) -> Vec<WriteCommand> {
        self.written.lock().clone()
    }

    /// Units a write was attempted for, including failed ones
    pub fn attempted(&self) -> Vec<u32> {
        self.attempted.lock().clone()
    }
}

#[async_trait]
impl DeviceGateway for ScriptedGateway {
    async fn query_all(&self) -> Result<DeviceSnapshot> {
        self.reads
            .lock()
            .pop_front()
            .unwrap_or_else(|| Ok(line_snapshot(0)))
    }

    async fn set_unit_vars(&self, command: &WriteCommand) -> Result<()> {
        self.attempted.lock().push(command.unit_number());
        if self.failing_units.lock().contains(&command.unit_number()) {
            return Err(ScadaError::io("connection reset by peer"));
        }
        self.written.lock().push(*command);
        Ok(())
    }
}

// ============================================================================
// Wiring
// ============================================================================

pub fn fast_health_policy() -> Arc<ConnectionHealthPolicy> {
    let config = HealthPolicyConfig {
        max_attempts: 1,
        initial_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(10),
        recovery_check_interval: Duration::from_millis(50),
    };
    Arc::new(ConnectionHealthPolicy::new(config, CancellationToken::new()))
}

/// Buffer, store and health policy shared by a scan cycle and a service
pub struct Parts {
    pub buffer: Arc<PendingWriteBuffer>,
    pub store: Arc<SnapshotStore>,
    pub health: Arc<ConnectionHealthPolicy>,
}

impl Parts {
    pub fn new() -> Self {
        Self {
            buffer: Arc::new(PendingWriteBuffer::new()),
            store: Arc::new(SnapshotStore::new()),
            health: fast_health_policy(),
        }
    }

    pub fn with_buffer_capacity(capacity: usize) -> Self {
        Self {
            buffer: Arc::new(PendingWriteBuffer::with_capacity(capacity)),
            ..Self::new()
        }
    }
}
