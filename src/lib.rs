//! # ZModSim - Modbus TCP Slave Simulator
//!
//! A Modbus TCP slave (server) simulator built on Tokio. It answers the
//! standard data-access function codes against four in-memory register
//! banks and can periodically mutate configured holding/input registers
//! to simulate live sensor values.
//!
//! ## Supported Function Codes
//!
//! | Code | Function |
//! |------|----------|
//! | 0x01 | Read Coils |
//! | 0x02 | Read Discrete Inputs |
//! | 0x03 | Read Holding Registers |
//! | 0x04 | Read Input Registers |
//! | 0x05 | Write Single Coil |
//! | 0x06 | Write Single Register |
//! | 0x0F | Write Multiple Coils |
//! | 0x10 | Write Multiple Registers |
//!
//! Unsupported codes are answered with exception 0x01; out-of-range
//! accesses with 0x02; malformed quantities and values with 0x03.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use zmodsim::{ModbusSlave, ModbusTcpSlave, SlaveConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut config = SlaveConfig::default();
//!     config.port = 1502;
//!
//!     let mut slave = ModbusTcpSlave::new(config);
//!     slave.start().await?;
//!
//!     tokio::signal::ctrl_c().await?;
//!     slave.stop().await?;
//!     Ok(())
//! }
//! ```

/// Error types and result handling
pub mod error;

/// MBAP framing for Modbus TCP
pub mod frame;

/// Function and exception code definitions
pub mod protocol;

/// Shared register storage
pub mod store;

/// Request dispatch and response construction
pub mod engine;

/// Background register mutators
pub mod autoinc;

/// Slave configuration record
pub mod config;

/// TCP listener, client handlers and supervisor
pub mod server;

/// Formatting helpers
pub mod utils;

pub use autoinc::AutoIncrementConfig;
pub use config::{parse_register_list, BankSizes, SlaveConfig};
pub use engine::ProtocolEngine;
pub use error::{ModsimError, ModsimResult};
pub use frame::MbapHeader;
pub use protocol::{ExceptionCode, FunctionCode};
pub use server::{ModbusSlave, ModbusTcpSlave};
pub use store::{RegisterStore, WordBank};

/// Maximum bits per read request (FC 0x01/0x02)
pub const MAX_READ_BITS: u16 = 2000;

/// Maximum words per read request (FC 0x03/0x04)
pub const MAX_READ_WORDS: u16 = 125;

/// Maximum bits per write request (FC 0x0F)
pub const MAX_WRITE_BITS: u16 = 1968;

/// Maximum words per write request (FC 0x10)
pub const MAX_WRITE_WORDS: u16 = 123;

/// Modbus TCP default port
pub const DEFAULT_TCP_PORT: u16 = 502;

/// Per-connection receive buffer size; any legal Modbus TCP frame fits
pub const RECV_BUFFER_LEN: usize = 512;
