//! HS1xx smart plug facade.
//! Combines relay control with the general device and energy meter groups.

use crate::client::{CallContext, Client, ClientBuilder, Pending};
use crate::device::{Device, DeviceApi};
use crate::emeter::Emeter;
use crate::error::{Result, RpcResult, RpcStatus, ShpError};
use crate::protocol::{Request, Target};
use crate::types::{GainInfo, MeterInfo, RawReply, RealtimeInfo, RelayState, SysInfo};
use futures_util::future::BoxFuture;
use serde_json::{Value, json};

/// Operations of an HS100/HS105/HS110 plug.
pub trait PlugApi {
    fn turn_on(&self, ctx: &CallContext) -> Pending<RpcStatus>;

    fn turn_off(&self, ctx: &CallContext) -> Pending<RpcStatus>;

    fn set_relay_state(&self, ctx: &CallContext, state: RelayState) -> Pending<RpcStatus>;

    /// Reads the relay state from the system information.
    fn get_relay_state(&self, ctx: &CallContext) -> BoxFuture<'static, Result<RelayState>>;

    fn sys_info(&self, ctx: &CallContext) -> Pending<SysInfo>;

    /// Switches the status LED on or off.
    fn set_led_state(&self, ctx: &CallContext, on: bool) -> Pending<RpcStatus>;

    /// System information and live telemetry in one round trip, optionally
    /// with the meter calibration gains.
    fn meter_info(&self, ctx: &CallContext, with_gain: bool) -> Pending<MeterInfo>;

    /// Sends an arbitrary `{namespace: {command: params}}` document and
    /// returns the decrypted reply undecoded.
    fn send_raw(&self, ctx: &CallContext, document: Value) -> Pending<RawReply>;
}

/// A TP-Link HS1xx smart plug.
#[derive(Clone)]
pub struct Plug {
    client: Client,
    device: Device,
    emeter: Emeter,
}

impl Plug {
    /// Plug at `address` on the default port.
    pub fn new<A: Into<String>>(address: A) -> Self {
        Self::from_client(Client::new(address))
    }

    pub fn builder<A: Into<String>>(address: A) -> ClientBuilder {
        ClientBuilder::new(address)
    }

    pub fn from_client(client: Client) -> Self {
        Self {
            device: Device::new(client.clone()),
            emeter: Emeter::new(client.clone()),
            client,
        }
    }

    /// General device operations.
    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Energy meter of HS110 plugs.
    pub fn emeter(&self) -> &Emeter {
        &self.emeter
    }

    pub fn client(&self) -> &Client {
        &self.client
    }
}

impl From<Client> for Plug {
    fn from(client: Client) -> Self {
        Self::from_client(client)
    }
}

// -------------------------------------------------------------------------
// Relay & LED
// -------------------------------------------------------------------------
impl PlugApi for Plug {
    fn turn_on(&self, ctx: &CallContext) -> Pending<RpcStatus> {
        self.set_relay_state(ctx, RelayState::On)
    }

    fn turn_off(&self, ctx: &CallContext) -> Pending<RpcStatus> {
        self.set_relay_state(ctx, RelayState::Off)
    }

    fn set_relay_state(&self, ctx: &CallContext, state: RelayState) -> Pending<RpcStatus> {
        let ns = &self.client.namespaces().system;
        self.client
            .query(ctx, ns, "set_relay_state", json!({ "state": state }))
    }

    fn get_relay_state(&self, ctx: &CallContext) -> BoxFuture<'static, Result<RelayState>> {
        let pending = self.sys_info(ctx);
        Box::pin(async move {
            let info = pending.await;
            info.err()?;
            Ok(info.relay_state)
        })
    }

    fn sys_info(&self, ctx: &CallContext) -> Pending<SysInfo> {
        self.device.get_sysinfo(ctx)
    }

    fn set_led_state(&self, ctx: &CallContext, on: bool) -> Pending<RpcStatus> {
        let ns = &self.client.namespaces().system;
        // The device stores the inverse flag.
        self.client
            .query(ctx, ns, "set_led_off", json!({ "off": u8::from(!on) }))
    }

    fn meter_info(&self, ctx: &CallContext, with_gain: bool) -> Pending<MeterInfo> {
        let ns = self.client.namespaces().clone();

        let mut request =
            Request::new().add_command(&ns.emeter, "get_realtime", json!({}), Target::Json);
        if with_gain {
            request = request.add_command(&ns.emeter, "get_vgain_igain", json!({}), Target::Json);
        }
        let request = request.add_command(&ns.system, "get_sysinfo", json!({}), Target::Json);

        self.client
            .dispatch(ctx, request, move |reply, info: &mut MeterInfo| {
                info.realtime = reply.decode::<RealtimeInfo>(&ns.emeter, "get_realtime")?;
                if with_gain {
                    info.gain = Some(reply.decode::<GainInfo>(&ns.emeter, "get_vgain_igain")?);
                }
                info.sysinfo = reply.decode::<SysInfo>(&ns.system, "get_sysinfo")?;
                Ok(())
            })
    }

    fn send_raw(&self, ctx: &CallContext, document: Value) -> Pending<RawReply> {
        let request = match raw_request(document) {
            Ok(request) => request,
            Err(e) => {
                let mut reply = RawReply::default();
                reply.status.transport_error = Some(e);
                return Pending::ready(reply);
            }
        };

        self.client.dispatch(ctx, request, |reply, raw: &mut RawReply| {
            raw.payload = reply.raw().to_vec();
            Ok(())
        })
    }
}

/// Turns a `{namespace: {command: params}}` document into a request whose
/// reply is handed over verbatim.
fn raw_request(document: Value) -> Result<Request> {
    let Value::Object(namespaces) = document else {
        return Err(ShpError::InvalidPayload("request is not a JSON object".into()));
    };

    let mut request = Request::new();
    for (namespace, commands) in namespaces {
        let Value::Object(commands) = commands else {
            return Err(ShpError::InvalidPayload(format!(
                "namespace '{}' is not an object",
                namespace
            )));
        };
        for (name, params) in commands {
            request = request.add_command(namespace.as_str(), name, params, Target::Raw);
        }
    }
    Ok(request)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_request_keeps_shape() {
        let request = raw_request(json!({"system": {"get_sysinfo": {}, "set_led_off": {"off": 1}}})).unwrap();
        assert_eq!(request.commands().count(), 2);
        assert!(request.expects_reply());
        let body: Value = serde_json::from_slice(&request.to_json().unwrap()).unwrap();
        assert_eq!(body, json!({"system": {"get_sysinfo": {}, "set_led_off": {"off": 1}}}));
    }

    #[test]
    fn raw_request_rejects_non_objects() {
        assert!(raw_request(json!([1])).is_err());
        assert!(raw_request(json!({"system": 1})).is_err());
    }
}
