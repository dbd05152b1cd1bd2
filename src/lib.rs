//! # hs1xx
//!
//! Asynchronous client for the TP-Link Smart Home Protocol, used to switch
//! HS100/HS105/HS110 plugs and read their energy telemetry on the local network.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use hs1xx::{CallContext, Plug, PlugApi, RpcResult};
//!
//! # async fn run() -> hs1xx::Result<()> {
//! let plug = Plug::new("192.168.1.50");
//! let ctx = CallContext::new();
//!
//! plug.turn_on(&ctx).await.err()?;
//! let info = plug.meter_info(&ctx, false).await;
//! info.err()?;
//! println!("{} W", info.realtime.power());
//! # Ok(())
//! # }
//! ```
//!
#[macro_use]
mod macros;
pub mod client;
pub mod crypto;
pub mod device;
pub mod emeter;
pub mod error;
pub mod plug;
pub mod protocol;
pub mod transport;
pub mod types;

pub use client::{CallContext, Client, ClientBuilder, Pending};
pub use device::{Device, DeviceApi};
pub use emeter::{Emeter, EmeterApi};
pub use error::{Result, RpcResult, RpcStatus, ShpError};
pub use plug::{Plug, PlugApi};
pub use protocol::{Namespaces, Reply, Request, Target};
pub use transport::{TcpTransport, Transport};
pub use types::{
    AccessPoint, DailyStats, DayStat, GainInfo, MeterInfo, MonthStat, MonthlyStats, RawReply,
    RealtimeInfo, RelayState, SysInfo, WiFiScanResult,
};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub fn version() -> &'static str {
    VERSION
}
