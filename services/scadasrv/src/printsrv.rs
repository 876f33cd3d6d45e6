//! PrintSrv integration
//!
//! Everything that speaks the PrintSrv TCP protocol: framing, sockets, the
//! connection pool, retrying execution and the two device operations.

pub mod client;
pub mod codec;
pub mod connection;
pub mod dto;
pub mod executor;
pub mod pool;

pub use client::{DeviceGateway, PrintSrvClient};
pub use codec::FrameCodec;
pub use connection::{PrintSrvConnection, TcpConnectionFactory};
pub use executor::RequestExecutor;
pub use pool::{ConnectionFactory, ConnectionPool, PoolStats, PooledConnection};
