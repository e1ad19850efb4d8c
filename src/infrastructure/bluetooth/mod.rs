//! Bluetooth Module
//!
//! Provides BLE communication with the laser distance meter.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                  domain::session::Session                │
//! │        (state machine, generic over BleTransport)        │
//! └─────────────────────┬───────────────────────────────────┘
//!                       │
//!              ┌────────┴────────┐
//!              │                 │
//!              ▼                 ▼
//!       ┌────────────┐    ┌──────────┐
//!       │ Connection │    │ Protocol │
//!       │            │    │          │
//!       │ - WinRT    │    │ - UUIDs  │
//!       │   GATT     │    │ - Command│
//!       │ - Events   │    │ - Frames │
//!       └────────────┘    └──────────┘
//! ```
//!
//! ## Modules
//!
//! - [`protocol`] - Frame codec and protocol constants
//! - `connection` - WinRT GATT transport (Windows only)

#[cfg(windows)]
pub mod connection;
pub mod protocol;

#[cfg(windows)]
pub use connection::WinRtTransport;
