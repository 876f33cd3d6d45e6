//! SCADA bridge service library
//!
//! Bridges a PrintSrv marking-line controller, which speaks a framed JSON
//! protocol over TCP, to HTTP clients.
//!
//! # Architecture
//!
//! ```text
//! HTTP clients ──► api ──► service ──► PendingWriteBuffer ─┐
//!                             │                            │ drain
//!                             └──── SnapshotStore ◄─┐      ▼
//!                                                   └── ScanCycle ──► ConnectionHealthPolicy
//!                                                                         │
//!                                    PrintSrv ◄── pool ◄── executor ◄── PrintSrvClient
//! ```
//!
//! Only the scan cycle talks to PrintSrv. HTTP callers touch nothing but the
//! write buffer and the snapshot store.

pub mod api;
pub mod bootstrap;
pub mod config;
pub mod domain;
pub mod error;
pub mod printsrv;
pub mod runtime;
pub mod service;
pub mod store;

pub use config::AppConfig;
pub use domain::{DeviceSnapshot, UnitProperties, UnitSnapshot, WriteCommand};
pub use error::{Result, ScadaError};
pub use service::ScadaService;
