//! Request dispatch.
//! Runs requests against a transport, either awaited in place or on a
//! spawned task that publishes its result exactly once.

use crate::error::{Result, RpcResult, ShpError};
use crate::protocol::{DEFAULT_PORT, Namespaces, Reply, Request, Target};
use crate::transport::{DEFAULT_CONNECT_TIMEOUT, TcpTransport, Transport};
use log::{debug, error, warn};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::oneshot;
use tokio::time::{Duration, timeout};
use tokio_util::sync::CancellationToken;

const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(10);

/// Cancellation and deadline for one call.
///
/// Clones share the same cancellation token, so cancelling any clone aborts
/// every call started with it.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    cancel: CancellationToken,
    timeout: Option<Duration>,
}

impl CallContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses an existing token, e.g. a child of an application-wide token.
    pub fn from_token(cancel: CancellationToken) -> Self {
        Self {
            cancel,
            timeout: None,
        }
    }

    /// Bounds each call made with this context. Without it the client's
    /// default applies.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn token(&self) -> &CancellationToken {
        &self.cancel
    }
}

/// The result of a dispatched call.
///
/// Resolves to the published value once the background task finishes.
/// The value always carries its status, so `err()` tells device failures,
/// transport failures and success apart.
#[must_use = "a pending call does nothing unless awaited"]
pub struct Pending<T> {
    rx: oneshot::Receiver<T>,
}

impl<T: RpcResult + Default> Pending<T> {
    /// A call that is already resolved, e.g. rejected before dispatch.
    pub fn ready(value: T) -> Self {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(value);
        Self { rx }
    }

    /// Blocks the current thread until the result is published.
    ///
    /// Must not be called from within an async context.
    pub fn blocking_wait(self) -> T {
        self.rx.blocking_recv().unwrap_or_else(|_| dropped())
    }
}

impl<T: RpcResult + Default> Future for Pending<T> {
    type Output = T;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<T> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|res| res.unwrap_or_else(|_| dropped()))
    }
}

fn dropped<T: RpcResult + Default>() -> T {
    let mut result = T::default();
    result.status_mut().transport_error = Some(ShpError::TaskDropped);
    result
}

/// Builder for [`Client`].
pub struct ClientBuilder {
    address: String,
    port: u16,
    connect_timeout: Duration,
    timeout: Duration,
    namespaces: Namespaces,
}

impl ClientBuilder {
    pub fn new<A: Into<String>>(address: A) -> Self {
        Self {
            address: address.into(),
            port: DEFAULT_PORT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            timeout: DEFAULT_CALL_TIMEOUT,
            namespaces: Namespaces::plug(),
        }
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    /// Deadline for calls whose context sets none.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn namespaces(mut self, namespaces: Namespaces) -> Self {
        self.namespaces = namespaces;
        self
    }

    pub fn build(self) -> Client {
        let transport = TcpTransport::new(self.address)
            .port(self.port)
            .connect_timeout(self.connect_timeout);
        Client {
            transport: Arc::new(transport),
            namespaces: Arc::new(self.namespaces),
            default_timeout: self.timeout,
        }
    }
}

/// Executes requests against one device.
///
/// Cheap to clone; clones share the transport and hold no per-call state.
#[derive(Clone)]
pub struct Client {
    transport: Arc<dyn Transport>,
    namespaces: Arc<Namespaces>,
    default_timeout: Duration,
}

impl Client {
    /// Client for the device at `address` with default settings.
    pub fn new<A: Into<String>>(address: A) -> Self {
        ClientBuilder::new(address).build()
    }

    pub fn builder<A: Into<String>>(address: A) -> ClientBuilder {
        ClientBuilder::new(address)
    }

    /// Client over a custom transport, e.g. a tunnel or a test double.
    pub fn with_transport<T: Transport + 'static>(transport: T) -> Self {
        Self {
            transport: Arc::new(transport),
            namespaces: Arc::new(Namespaces::plug()),
            default_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    pub fn set_namespaces(mut self, namespaces: Namespaces) -> Self {
        self.namespaces = Arc::new(namespaces);
        self
    }

    pub fn namespaces(&self) -> &Namespaces {
        &self.namespaces
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// Runs `request` to completion and returns the demultiplexed reply.
    ///
    /// Fails on transport and decoding errors; errors the device reports for
    /// individual commands stay inside the reply.
    pub async fn call(&self, ctx: &CallContext, request: &Request) -> Result<Reply> {
        let payload = request.to_json()?;
        debug!("request: {}", String::from_utf8_lossy(&payload));

        let deadline = ctx.timeout.unwrap_or(self.default_timeout);
        let exchange = self.transport.exchange(payload, request.expects_reply());

        // Dropping the exchange future closes its connection.
        let outcome = tokio::select! {
            _ = ctx.cancel.cancelled() => Err(ShpError::Cancelled),
            res = timeout(deadline, exchange) => res.unwrap_or(Err(ShpError::Timeout)),
        };

        match outcome {
            Ok(Some(raw)) => Reply::demultiplex(request, raw),
            Ok(None) => Ok(Reply::default()),
            Err(e) => {
                error!("Call failed: {}", e);
                Err(e)
            }
        }
    }

    /// Runs `request` on a spawned task and publishes the result once.
    ///
    /// `fill` copies the reply into the result. If the call or `fill` fails,
    /// the error lands in the result's transport error and whatever `fill`
    /// already populated is kept. Must be called within a Tokio runtime.
    pub fn dispatch<T, F>(&self, ctx: &CallContext, request: Request, fill: F) -> Pending<T>
    where
        T: RpcResult + Default + Send + 'static,
        F: FnOnce(&Reply, &mut T) -> Result<()> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let client = self.clone();
        let ctx = ctx.clone();

        tokio::spawn(async move {
            let mut result = T::default();
            let outcome = match client.call(&ctx, &request).await {
                Ok(reply) => fill(&reply, &mut result),
                Err(e) => Err(e),
            };
            if let Err(e) = outcome {
                result.status_mut().transport_error = Some(e);
            } else if let Err(e) = result.err() {
                warn!("Device rejected request: {}", e);
            }
            let _ = tx.send(result);
        });

        Pending { rx }
    }

    /// Dispatches a single command and decodes its reply into `T`.
    pub fn query<T>(&self, ctx: &CallContext, namespace: &str, command: &str, params: Value) -> Pending<T>
    where
        T: RpcResult + Default + DeserializeOwned + Send + 'static,
    {
        let request = Request::new().add_command(namespace, command, params, Target::Json);
        let (namespace, command) = (namespace.to_string(), command.to_string());
        self.dispatch(ctx, request, move |reply, result: &mut T| {
            *result = reply.decode(&namespace, &command)?;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RpcStatus;
    use futures_util::future::BoxFuture;
    use serde_json::json;
    use std::sync::Mutex;

    /// Replies with a fixed document and records what was sent.
    struct Canned {
        reply: &'static str,
        sent: Mutex<Vec<String>>,
    }

    impl Transport for Canned {
        fn exchange(&self, payload: Vec<u8>, expect_reply: bool) -> BoxFuture<'_, Result<Option<Vec<u8>>>> {
            self.sent
                .lock()
                .unwrap()
                .push(String::from_utf8(payload).unwrap());
            let reply = expect_reply.then(|| self.reply.as_bytes().to_vec());
            Box::pin(async move { Ok(reply) })
        }
    }

    struct Stalled;

    impl Transport for Stalled {
        fn exchange(&self, _: Vec<u8>, _: bool) -> BoxFuture<'_, Result<Option<Vec<u8>>>> {
            Box::pin(std::future::pending())
        }
    }

    #[tokio::test]
    async fn query_decodes_reply() {
        let client = Client::with_transport(Canned {
            reply: r#"{"system":{"set_dev_alias":{"err_code":0}}}"#,
            sent: Mutex::new(Vec::new()),
        });
        let status: RpcStatus = client
            .query(&CallContext::new(), "system", "set_dev_alias", json!({"alias": "x"}))
            .await;
        assert!(status.err().is_ok());
    }

    #[tokio::test]
    async fn device_error_stays_in_result() {
        let client = Client::with_transport(Canned {
            reply: r#"{"system":{"set_dev_alias":{"err_code":5}}}"#,
            sent: Mutex::new(Vec::new()),
        });
        let status: RpcStatus = client
            .query(&CallContext::new(), "system", "set_dev_alias", json!({}))
            .await;
        assert_eq!(status.err().unwrap_err().device_code(), Some(5));
        assert!(status.transport_error.is_none());
    }

    #[tokio::test]
    async fn call_without_targets_skips_reply() {
        let canned = Canned {
            reply: "unused",
            sent: Mutex::new(Vec::new()),
        };
        let client = Client::with_transport(canned);
        let request = Request::new().add_command("system", "reboot", json!({"delay": 1}), Target::Discard);
        let reply = client.call(&CallContext::new(), &request).await.unwrap();
        assert!(reply.raw().is_empty());
    }

    #[tokio::test]
    async fn cancellation_aborts_outstanding_call() {
        let client = Client::with_transport(Stalled);
        let ctx = CallContext::new();
        let pending: Pending<RpcStatus> = client.query(&ctx, "system", "get_sysinfo", json!({}));
        ctx.cancel();
        let status = pending.await;
        assert_eq!(status.err(), Err(ShpError::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_expires() {
        let client = Client::with_transport(Stalled);
        let ctx = CallContext::new().with_timeout(Duration::from_secs(3));
        let status: RpcStatus = client.query(&ctx, "system", "get_sysinfo", json!({})).await;
        assert_eq!(status.err(), Err(ShpError::Timeout));
    }
}
