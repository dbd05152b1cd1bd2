//! Smart Home Protocol wire format.
//! Handles frame encoding, request batching and reply demultiplexing.

use crate::crypto;
use crate::error::{Result, ShpError};
use byteorder::{BigEndian, ByteOrder};
use log::debug;
use serde::de::DeserializeOwned;
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::Value;
use std::collections::HashMap;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// TCP port every plug listens on.
pub const DEFAULT_PORT: u16 = 9999;

/// Upper bound accepted for a reply length prefix.
pub const MAX_FRAME_LEN: usize = 1 << 20;

const HEADER_LEN: usize = 4;
const KEY_ERR_CODE: &str = "err_code";

/// Namespace names used to address the capability groups of a device.
///
/// Plugs use the plain names; other device families prefix them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Namespaces {
    pub system: String,
    pub netif: String,
    pub emeter: String,
}

impl Namespaces {
    /// Namespaces understood by HS1xx plugs.
    pub fn plug() -> Self {
        Self {
            system: "system".to_string(),
            netif: "netif".to_string(),
            emeter: "emeter".to_string(),
        }
    }
}

impl Default for Namespaces {
    fn default() -> Self {
        Self::plug()
    }
}

/// Writes one encrypted frame, failing if the socket stops accepting bytes.
///
/// A partial write is resumed from where it stopped; only a write that
/// accepts nothing ends the frame early.
pub async fn write_frame<W: AsyncWrite + Unpin>(stream: &mut W, payload: &[u8]) -> Result<()> {
    let frame = crypto::encrypt(payload);
    let expected = frame.len();
    let mut written = 0;
    while written < expected {
        let n = stream.write(&frame[written..]).await?;
        if n == 0 {
            return Err(ShpError::ShortWrite { written, expected });
        }
        written += n;
    }
    stream.flush().await?;
    debug!("Sent frame: payload_len={}", payload.len());
    Ok(())
}

/// Reads one frame and returns its decrypted payload.
///
/// A single read may deliver only part of the payload, so reads are repeated
/// until the declared length has been collected.
pub async fn read_frame<R: AsyncRead + Unpin>(stream: &mut R) -> Result<Vec<u8>> {
    let mut header = [0u8; HEADER_LEN];
    read_full(stream, &mut header).await?;

    let len = BigEndian::read_u32(&header) as usize;
    if len > MAX_FRAME_LEN {
        return Err(ShpError::FrameTooLarge {
            len,
            max: MAX_FRAME_LEN,
        });
    }

    let mut body = vec![0u8; len];
    read_full(stream, &mut body).await?;
    debug!("Received frame (hex): {}", hex::encode(&body));
    crypto::decrypt_in_place(&mut body);
    Ok(body)
}

async fn read_full<R: AsyncRead + Unpin>(stream: &mut R, buf: &mut [u8]) -> Result<()> {
    let mut received = 0;
    while received < buf.len() {
        let n = stream.read(&mut buf[received..]).await?;
        if n == 0 {
            return Err(ShpError::IncompleteRead {
                expected: buf.len(),
                received,
            });
        }
        received += n;
    }
    Ok(())
}

/// Where the reply to a command goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Target {
    /// No reply is read for this command.
    #[default]
    Discard,
    /// The `[namespace][command]` sub-value is kept for structured decoding.
    Json,
    /// The whole decrypted reply is handed over verbatim.
    Raw,
}

/// A named operation within a namespace.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub namespace: String,
    pub name: String,
    pub params: Value,
    pub target: Target,
}

/// One or more commands exchanged in a single round trip.
///
/// Namespaces keep the order in which they were first introduced and
/// commands added to the same namespace are merged into its object.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Request {
    namespaces: Vec<(String, Vec<Command>)>,
}

impl Request {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a command. A command with the same name in the same namespace
    /// replaces the earlier one.
    pub fn add_command<N, C>(mut self, namespace: N, name: C, params: Value, target: Target) -> Self
    where
        N: Into<String>,
        C: Into<String>,
    {
        let command = Command {
            namespace: namespace.into(),
            name: name.into(),
            params,
            target,
        };

        let slot = match self
            .namespaces
            .iter()
            .position(|(ns, _)| *ns == command.namespace)
        {
            Some(i) => &mut self.namespaces[i].1,
            None => {
                self.namespaces.push((command.namespace.clone(), Vec::new()));
                let last = self.namespaces.len() - 1;
                &mut self.namespaces[last].1
            }
        };

        match slot.iter_mut().find(|c| c.name == command.name) {
            Some(existing) => *existing = command,
            None => slot.push(command),
        }
        self
    }

    /// All commands, namespace by namespace.
    pub fn commands(&self) -> impl Iterator<Item = &Command> {
        self.namespaces.iter().flat_map(|(_, cmds)| cmds.iter())
    }

    pub fn is_empty(&self) -> bool {
        self.namespaces.is_empty()
    }

    /// Whether the exchange has to wait for a reply frame.
    pub fn expects_reply(&self) -> bool {
        self.commands().any(|c| c.target != Target::Discard)
    }

    fn wants_json(&self) -> bool {
        self.commands().any(|c| c.target == Target::Json)
    }

    pub fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}

struct NamespaceBody<'a>(&'a [Command]);

impl Serialize for NamespaceBody<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for command in self.0 {
            map.serialize_entry(&command.name, &command.params)?;
        }
        map.end()
    }
}

impl Serialize for Request {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.namespaces.len()))?;
        for (namespace, commands) in &self.namespaces {
            map.serialize_entry(namespace, &NamespaceBody(commands))?;
        }
        map.end()
    }
}

/// A decrypted reply split into per-command values.
#[derive(Debug, Clone, Default)]
pub struct Reply {
    raw: Vec<u8>,
    entries: HashMap<(String, String), Value>,
}

impl Reply {
    /// Routes every `Target::Json` command of `request` to its sub-value of
    /// the reply. The decrypted bytes are always kept for `Target::Raw`
    /// commands; parsing is skipped when no command asks for JSON.
    pub fn demultiplex(request: &Request, raw: Vec<u8>) -> Result<Self> {
        let mut reply = Reply {
            raw,
            entries: HashMap::new(),
        };
        if !request.wants_json() {
            return Ok(reply);
        }

        let doc: Value = serde_json::from_slice(&reply.raw)?;
        let doc = doc
            .as_object()
            .ok_or_else(|| ShpError::InvalidPayload("reply is not a JSON object".into()))?;

        for command in request.commands().filter(|c| c.target == Target::Json) {
            let missing = || ShpError::MissingReply {
                namespace: command.namespace.clone(),
                command: command.name.clone(),
            };

            let ns_value = doc.get(&command.namespace).ok_or_else(missing)?;
            let ns_obj = ns_value.as_object().ok_or_else(|| {
                ShpError::InvalidPayload(format!(
                    "namespace '{}' is not an object",
                    command.namespace
                ))
            })?;

            // Unsupported namespaces answer with a single error object
            // instead of one entry per command.
            let leaf = match ns_obj.get(&command.name) {
                Some(v) => v.clone(),
                None if ns_obj.contains_key(KEY_ERR_CODE) => ns_value.clone(),
                None => return Err(missing()),
            };

            reply
                .entries
                .insert((command.namespace.clone(), command.name.clone()), leaf);
        }
        Ok(reply)
    }

    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    pub fn into_raw(self) -> Vec<u8> {
        self.raw
    }

    pub fn value(&self, namespace: &str, command: &str) -> Option<&Value> {
        self.entries
            .get(&(namespace.to_string(), command.to_string()))
    }

    /// Deserializes the reply of one command.
    pub fn decode<T: DeserializeOwned>(&self, namespace: &str, command: &str) -> Result<T> {
        let value = self
            .value(namespace, command)
            .ok_or_else(|| ShpError::MissingReply {
                namespace: namespace.to_string(),
                command: command.to_string(),
            })?;
        Ok(serde_json::from_value(value.clone())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn batched_namespaces_serialize_in_order() {
        let req = Request::new()
            .add_command("emeter", "get_realtime", json!({}), Target::Json)
            .add_command("system", "get_sysinfo", json!({}), Target::Json);
        assert_eq!(
            String::from_utf8(req.to_json().unwrap()).unwrap(),
            r#"{"emeter":{"get_realtime":{}},"system":{"get_sysinfo":{}}}"#
        );
    }

    #[test]
    fn same_namespace_merges() {
        let req = Request::new()
            .add_command("emeter", "get_realtime", json!({}), Target::Json)
            .add_command("system", "get_sysinfo", json!({}), Target::Json)
            .add_command("emeter", "get_vgain_igain", json!({}), Target::Json);
        assert_eq!(
            String::from_utf8(req.to_json().unwrap()).unwrap(),
            r#"{"emeter":{"get_realtime":{},"get_vgain_igain":{}},"system":{"get_sysinfo":{}}}"#
        );
    }

    #[test]
    fn repeated_command_overwrites() {
        let req = Request::new()
            .add_command("system", "set_relay_state", json!({"state": 1}), Target::Json)
            .add_command("system", "set_relay_state", json!({"state": 0}), Target::Json);
        assert_eq!(req.commands().count(), 1);
        assert_eq!(
            String::from_utf8(req.to_json().unwrap()).unwrap(),
            r#"{"system":{"set_relay_state":{"state":0}}}"#
        );
    }

    #[test]
    fn expects_reply_only_with_targets() {
        let req = Request::new().add_command("system", "reboot", json!({"delay": 1}), Target::Discard);
        assert!(!req.expects_reply());
        let req = req.add_command("system", "get_sysinfo", json!({}), Target::Json);
        assert!(req.expects_reply());
    }

    #[test]
    fn demultiplex_routes_each_command() {
        let req = Request::new()
            .add_command("emeter", "get_realtime", json!({}), Target::Json)
            .add_command("system", "get_sysinfo", json!({}), Target::Json)
            .add_command("system", "set_led_off", json!({"off": 0}), Target::Discard);
        let raw = br#"{"emeter":{"get_realtime":{"power_mw":1000,"err_code":0}},
            "system":{"get_sysinfo":{"alias":"desk","err_code":0},"set_led_off":{"err_code":0}}}"#;

        let reply = Reply::demultiplex(&req, raw.to_vec()).unwrap();
        assert_eq!(reply.value("emeter", "get_realtime").unwrap()["power_mw"], 1000);
        assert_eq!(reply.value("system", "get_sysinfo").unwrap()["alias"], "desk");
        assert!(reply.value("system", "set_led_off").is_none());
    }

    #[test]
    fn namespace_error_reaches_every_command() {
        let req = Request::new().add_command("emeter", "get_realtime", json!({}), Target::Json);
        let raw = br#"{"emeter":{"err_code":-1,"err_msg":"module not support"}}"#;
        let reply = Reply::demultiplex(&req, raw.to_vec()).unwrap();
        assert_eq!(reply.value("emeter", "get_realtime").unwrap()["err_code"], -1);
    }

    #[test]
    fn missing_namespace_is_decoding_error() {
        let req = Request::new().add_command("netif", "get_scaninfo", json!({}), Target::Json);
        let err = Reply::demultiplex(&req, br#"{"system":{}}"#.to_vec()).unwrap_err();
        assert!(matches!(err, ShpError::MissingReply { .. }));
        assert!(err.is_decoding());

        let err = Reply::demultiplex(&req, b"[1,2]".to_vec()).unwrap_err();
        assert!(matches!(err, ShpError::InvalidPayload(_)));

        let err = Reply::demultiplex(&req, b"{not json".to_vec()).unwrap_err();
        assert!(matches!(err, ShpError::Json(_)));
    }

    #[test]
    fn raw_target_skips_parsing() {
        let req = Request::new().add_command("system", "get_sysinfo", json!({}), Target::Raw);
        let reply = Reply::demultiplex(&req, b"not even json".to_vec()).unwrap();
        assert_eq!(reply.raw(), b"not even json");
    }

    #[test]
    fn raw_and_json_targets_share_one_reply() {
        let req = Request::new()
            .add_command("system", "get_sysinfo", json!({}), Target::Json)
            .add_command("emeter", "get_realtime", json!({}), Target::Raw);
        let raw = br#"{"system":{"get_sysinfo":{"alias":"desk","err_code":0}},
            "emeter":{"get_realtime":{"power_mw":1000,"err_code":0}}}"#;

        let reply = Reply::demultiplex(&req, raw.to_vec()).unwrap();
        let info: Value = reply.decode("system", "get_sysinfo").unwrap();
        assert_eq!(info["alias"], "desk");
        assert!(reply.value("emeter", "get_realtime").is_none());
        assert_eq!(reply.raw(), &raw[..]);
    }

    /// Accepts at most `chunk` bytes per write and stops after `capacity`.
    struct StallingWriter {
        accepted: usize,
        chunk: usize,
        capacity: usize,
    }

    impl AsyncWrite for StallingWriter {
        fn poll_write(
            mut self: std::pin::Pin<&mut Self>,
            _cx: &mut std::task::Context<'_>,
            buf: &[u8],
        ) -> std::task::Poll<std::io::Result<usize>> {
            let n = buf.len().min(self.chunk).min(self.capacity - self.accepted);
            self.accepted += n;
            std::task::Poll::Ready(Ok(n))
        }

        fn poll_flush(
            self: std::pin::Pin<&mut Self>,
            _cx: &mut std::task::Context<'_>,
        ) -> std::task::Poll<std::io::Result<()>> {
            std::task::Poll::Ready(Ok(()))
        }

        fn poll_shutdown(
            self: std::pin::Pin<&mut Self>,
            _cx: &mut std::task::Context<'_>,
        ) -> std::task::Poll<std::io::Result<()>> {
            std::task::Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn stalled_socket_is_short_write() {
        let mut sink = StallingWriter {
            accepted: 0,
            chunk: 4,
            capacity: 6,
        };
        let err = write_frame(&mut sink, b"0123456789").await.unwrap_err();
        assert_eq!(
            err,
            ShpError::ShortWrite {
                written: 6,
                expected: 14
            }
        );
        assert!(err.is_transport());
    }

    #[tokio::test]
    async fn partial_writes_are_resumed() {
        let mut sink = StallingWriter {
            accepted: 0,
            chunk: 3,
            capacity: 64,
        };
        write_frame(&mut sink, b"0123456789").await.unwrap();
        assert_eq!(sink.accepted, 14);
    }

    #[tokio::test]
    async fn frame_round_trip_over_stream() {
        let (mut client, mut server) = tokio::io::duplex(64);
        let payload = br#"{"system":{"get_sysinfo":{}}}"#;
        write_frame(&mut client, payload).await.unwrap();
        assert_eq!(read_frame(&mut server).await.unwrap(), payload);
    }

    #[tokio::test]
    async fn read_frame_collects_split_payload() {
        let frame = crypto::encrypt(br#"{"emeter":{"get_realtime":{}}}"#);
        let (mut tx, mut rx) = tokio::io::duplex(8);
        let writer = tokio::spawn(async move {
            for chunk in frame.chunks(3) {
                tx.write_all(chunk).await.unwrap();
                tokio::task::yield_now().await;
            }
        });
        let body = read_frame(&mut rx).await.unwrap();
        writer.await.unwrap();
        assert_eq!(body, br#"{"emeter":{"get_realtime":{}}}"#);
    }

    #[tokio::test]
    async fn truncated_frame_is_incomplete_read() {
        let mut frame = crypto::encrypt(b"0123456789");
        frame.truncate(8);
        let err = read_frame(&mut &frame[..]).await.unwrap_err();
        assert_eq!(
            err,
            ShpError::IncompleteRead {
                expected: 10,
                received: 4
            }
        );
    }

    #[tokio::test]
    async fn oversized_prefix_is_rejected() {
        let frame = [0xFFu8, 0xFF, 0xFF, 0xFF];
        let err = read_frame(&mut &frame[..]).await.unwrap_err();
        assert!(matches!(err, ShpError::FrameTooLarge { .. }));
    }
}
