//! Reply payloads returned by plug operations.

use crate::error::{Result, RpcResult, RpcStatus};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// State of the plug relay. Sent and received as the integers 1 and 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RelayState {
    #[default]
    Off,
    On,
}

impl RelayState {
    pub fn is_on(self) -> bool {
        self == RelayState::On
    }
}

impl From<bool> for RelayState {
    fn from(on: bool) -> Self {
        if on { RelayState::On } else { RelayState::Off }
    }
}

impl fmt::Display for RelayState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelayState::On => f.write_str("ON"),
            RelayState::Off => f.write_str("OFF"),
        }
    }
}

impl Serialize for RelayState {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_u8(u8::from(self.is_on()))
    }
}

impl<'de> Deserialize<'de> for RelayState {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = i64::deserialize(deserializer)?;
        Ok(if raw == 1 { RelayState::On } else { RelayState::Off })
    }
}

/// Reply of `system.get_sysinfo`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SysInfo {
    pub sw_ver: String,
    pub hw_ver: String,
    #[serde(rename = "type", alias = "mic_type")]
    pub device_type: String,
    pub model: String,
    #[serde(alias = "mic_mac")]
    pub mac: String,
    pub dev_name: String,
    pub alias: String,
    pub relay_state: RelayState,
    pub on_time: i64,
    pub active_mode: String,
    pub feature: String,
    pub updating: i64,
    pub icon_hash: String,
    pub rssi: i64,
    pub led_off: i64,
    #[serde(rename = "longitude_i")]
    pub longitude: i64,
    #[serde(rename = "latitude_i")]
    pub latitude: i64,
    #[serde(rename = "hwId")]
    pub hw_id: String,
    #[serde(rename = "fwId")]
    pub fw_id: String,
    #[serde(rename = "deviceId")]
    pub device_id: String,
    #[serde(rename = "oemId", alias = "oemID")]
    pub oem_id: String,
    #[serde(flatten)]
    pub status: RpcStatus,
}

impl SysInfo {
    /// Feature flags, e.g. `TIM` and `ENE` for a plug with timer and energy meter.
    pub fn features(&self) -> impl Iterator<Item = &str> {
        self.feature.split(':').filter(|f| !f.is_empty())
    }

    pub fn has_emeter(&self) -> bool {
        self.features().any(|f| f == "ENE")
    }

    pub fn led_enabled(&self) -> bool {
        self.led_off == 0
    }
}

/// Reply of `emeter.get_realtime`.
///
/// Current hardware reports milli-units; first generation plugs report
/// `voltage`, `current`, `power` and `total` in V, A, W and kWh.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RealtimeInfo {
    pub voltage_mv: i64,
    pub current_ma: i64,
    pub power_mw: i64,
    pub total_wh: i64,
    #[serde(rename = "voltage", skip_serializing_if = "Option::is_none")]
    pub voltage_v: Option<f64>,
    #[serde(rename = "current", skip_serializing_if = "Option::is_none")]
    pub current_a: Option<f64>,
    #[serde(rename = "power", skip_serializing_if = "Option::is_none")]
    pub power_w: Option<f64>,
    #[serde(rename = "total", skip_serializing_if = "Option::is_none")]
    pub total_kwh: Option<f64>,
    #[serde(flatten)]
    pub status: RpcStatus,
}

impl RealtimeInfo {
    /// Voltage in V.
    pub fn voltage(&self) -> f64 {
        self.voltage_v.unwrap_or(self.voltage_mv as f64 / 1000.0)
    }

    /// Current in A.
    pub fn current(&self) -> f64 {
        self.current_a.unwrap_or(self.current_ma as f64 / 1000.0)
    }

    /// Power in W.
    pub fn power(&self) -> f64 {
        self.power_w.unwrap_or(self.power_mw as f64 / 1000.0)
    }

    /// Energy consumed in Wh.
    pub fn total(&self) -> f64 {
        self.total_kwh
            .map_or(self.total_wh as f64, |kwh| kwh * 1000.0)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DayStat {
    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub energy_wh: i64,
    #[serde(rename = "energy", skip_serializing_if = "Option::is_none")]
    pub energy_kwh: Option<f64>,
}

impl DayStat {
    /// Energy in Wh.
    pub fn energy(&self) -> f64 {
        self.energy_kwh
            .map_or(self.energy_wh as f64, |kwh| kwh * 1000.0)
    }
}

/// Reply of `emeter.get_daystat`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DailyStats {
    pub day_list: Vec<DayStat>,
    #[serde(flatten)]
    pub status: RpcStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonthStat {
    pub year: i32,
    pub month: u32,
    pub energy_wh: i64,
    #[serde(rename = "energy", skip_serializing_if = "Option::is_none")]
    pub energy_kwh: Option<f64>,
}

impl MonthStat {
    /// Energy in Wh.
    pub fn energy(&self) -> f64 {
        self.energy_kwh
            .map_or(self.energy_wh as f64, |kwh| kwh * 1000.0)
    }
}

/// Reply of `emeter.get_monthstat`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonthlyStats {
    pub month_list: Vec<MonthStat>,
    #[serde(flatten)]
    pub status: RpcStatus,
}

/// Reply of `emeter.get_vgain_igain`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GainInfo {
    pub vgain: i64,
    pub igain: i64,
    #[serde(flatten)]
    pub status: RpcStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccessPoint {
    pub ssid: String,
    pub key_type: i64,
}

/// Reply of `netif.get_scaninfo`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WiFiScanResult {
    pub ap_list: Vec<AccessPoint>,
    #[serde(flatten)]
    pub status: RpcStatus,
}

/// System information and live telemetry fetched in one round trip.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MeterInfo {
    pub sysinfo: SysInfo,
    pub realtime: RealtimeInfo,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gain: Option<GainInfo>,
    #[serde(flatten)]
    pub status: RpcStatus,
}

impl RpcResult for MeterInfo {
    fn status(&self) -> &RpcStatus {
        &self.status
    }

    fn status_mut(&mut self) -> &mut RpcStatus {
        &mut self.status
    }

    /// Fails on a transport failure of the batch, then on the first command
    /// the device rejected.
    fn err(&self) -> Result<()> {
        self.status.check()?;
        self.sysinfo.err()?;
        self.realtime.err()?;
        match &self.gain {
            Some(gain) => gain.err(),
            None => Ok(()),
        }
    }
}

/// Undecoded reply of an arbitrary request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawReply {
    pub payload: Vec<u8>,
    pub status: RpcStatus,
}

impl RawReply {
    pub fn as_json(&self) -> Result<serde_json::Value> {
        Ok(serde_json::from_slice(&self.payload)?)
    }
}

impl_rpc_result!(
    SysInfo,
    RealtimeInfo,
    DailyStats,
    MonthlyStats,
    GainInfo,
    WiFiScanResult,
    RawReply,
);
