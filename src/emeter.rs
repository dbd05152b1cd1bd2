//! Energy meter built into telemetry-capable plugs such as the HS110.

use crate::client::{CallContext, Client, Pending};
use crate::error::RpcStatus;
use crate::types::{DailyStats, GainInfo, MonthlyStats, RealtimeInfo};
use serde_json::json;

/// Energy meter queries.
pub trait EmeterApi {
    /// Live voltage, current, power and accumulated energy.
    fn get_realtime(&self, ctx: &CallContext) -> Pending<RealtimeInfo>;

    /// Per-day energy for `month` (1-12) of `year`.
    fn get_day_stats(&self, ctx: &CallContext, month: u32, year: i32) -> Pending<DailyStats>;

    /// Per-month energy for `year`.
    fn get_month_stats(&self, ctx: &CallContext, year: i32) -> Pending<MonthlyStats>;

    /// Clears the statistics memory.
    fn erase_stats(&self, ctx: &CallContext) -> Pending<RpcStatus>;

    /// Calibration gains of the voltage and current sensors.
    fn get_gain(&self, ctx: &CallContext) -> Pending<GainInfo>;
}

/// [`EmeterApi`] over the Smart Home Protocol.
#[derive(Clone)]
pub struct Emeter {
    client: Client,
}

impl Emeter {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn ns(&self) -> &str {
        &self.client.namespaces().emeter
    }
}

impl EmeterApi for Emeter {
    fn get_realtime(&self, ctx: &CallContext) -> Pending<RealtimeInfo> {
        self.client.query(ctx, self.ns(), "get_realtime", json!({}))
    }

    fn get_day_stats(&self, ctx: &CallContext, month: u32, year: i32) -> Pending<DailyStats> {
        let params = json!({ "month": month, "year": year });
        self.client.query(ctx, self.ns(), "get_daystat", params)
    }

    fn get_month_stats(&self, ctx: &CallContext, year: i32) -> Pending<MonthlyStats> {
        self.client
            .query(ctx, self.ns(), "get_monthstat", json!({ "year": year }))
    }

    fn erase_stats(&self, ctx: &CallContext) -> Pending<RpcStatus> {
        self.client
            .query(ctx, self.ns(), "erase_emeter_stat", json!({}))
    }

    fn get_gain(&self, ctx: &CallContext) -> Pending<GainInfo> {
        self.client
            .query(ctx, self.ns(), "get_vgain_igain", json!({}))
    }
}
