//! Operations common to TP-Link smart home devices.
//! Identity, naming, location, power cycling and WiFi survey.

use crate::client::{CallContext, Client, Pending};
use crate::error::RpcStatus;
use crate::types::{SysInfo, WiFiScanResult};
use serde_json::json;
use tokio::time::Duration;

/// General device control.
pub trait DeviceApi {
    /// Queries identity, relay state and feature flags.
    fn get_sysinfo(&self, ctx: &CallContext) -> Pending<SysInfo>;

    fn set_alias(&self, ctx: &CallContext, alias: &str) -> Pending<RpcStatus>;

    /// Stores the device location in degrees.
    fn set_location(&self, ctx: &CallContext, latitude: f64, longitude: f64) -> Pending<RpcStatus>;

    /// Reboots after `delay`.
    fn reboot(&self, ctx: &CallContext, delay: Duration) -> Pending<RpcStatus>;

    /// Restores factory defaults after `delay`.
    fn reset(&self, ctx: &CallContext, delay: Duration) -> Pending<RpcStatus>;

    /// Lists wireless networks seen by the device.
    ///
    /// With `refresh` the device rescans for up to `timeout` before
    /// answering, so the call deadline has to cover the scan. A context
    /// without its own timeout is extended accordingly.
    fn get_wifi_scan_info(&self, ctx: &CallContext, refresh: bool, timeout: Duration) -> Pending<WiFiScanResult>;
}

/// [`DeviceApi`] over the Smart Home Protocol.
#[derive(Clone)]
pub struct Device {
    client: Client,
}

impl Device {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }
}

// -------------------------------------------------------------------------
// Device Control API
// -------------------------------------------------------------------------
impl DeviceApi for Device {
    fn get_sysinfo(&self, ctx: &CallContext) -> Pending<SysInfo> {
        let ns = &self.client.namespaces().system;
        self.client.query(ctx, ns, "get_sysinfo", json!({}))
    }

    fn set_alias(&self, ctx: &CallContext, alias: &str) -> Pending<RpcStatus> {
        let ns = &self.client.namespaces().system;
        self.client
            .query(ctx, ns, "set_dev_alias", json!({ "alias": alias }))
    }

    fn set_location(&self, ctx: &CallContext, latitude: f64, longitude: f64) -> Pending<RpcStatus> {
        let ns = &self.client.namespaces().system;
        let params = json!({
            "latitude": latitude,
            "longitude": longitude,
            "latitude_i": (latitude * 10000.0).round() as i64,
            "longitude_i": (longitude * 10000.0).round() as i64,
        });
        self.client.query(ctx, ns, "set_dev_location", params)
    }

    fn reboot(&self, ctx: &CallContext, delay: Duration) -> Pending<RpcStatus> {
        let ns = &self.client.namespaces().system;
        self.client
            .query(ctx, ns, "reboot", json!({ "delay": delay.as_secs() }))
    }

    fn reset(&self, ctx: &CallContext, delay: Duration) -> Pending<RpcStatus> {
        let ns = &self.client.namespaces().system;
        self.client
            .query(ctx, ns, "reset", json!({ "delay": delay.as_secs() }))
    }

    fn get_wifi_scan_info(&self, ctx: &CallContext, refresh: bool, timeout: Duration) -> Pending<WiFiScanResult> {
        let ns = &self.client.namespaces().netif;
        let params = json!({
            "refresh": u8::from(refresh),
            "timeout": timeout.as_secs(),
        });

        let ctx = match ctx.timeout() {
            Some(_) => ctx.clone(),
            None => ctx
                .clone()
                .with_timeout(timeout + self.client.default_timeout()),
        };
        self.client.query(&ctx, ns, "get_scaninfo", params)
    }
}
