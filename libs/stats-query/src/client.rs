//! Transport for the stats request
use std::{collections::HashMap, fmt, sync::Arc, time::Duration};

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt, Shared};
use hickory_proto::{
    ProtoError,
    op::Message,
    runtime::TokioRuntimeProvider,
    udp::UdpClientStream,
    xfer::{DnsRequest, DnsRequestOptions, DnsRequestSender, FirstAnswer},
};
use parking_lot::Mutex;
use tokio::net::lookup_host;
use tracing::{debug, trace};

/// A synchronous request/response DNS exchange with dnsmasq
#[async_trait]
pub trait StatsClient: fmt::Debug + Send + Sync + 'static {
    /// send `msg` and wait for the single response
    async fn exchange(&self, msg: Message) -> Result<Message, ProtoError>;
}

type Flight = Shared<BoxFuture<'static, Result<Message, ProtoError>>>;

/// Sends stats requests over UDP.
///
/// Requests asking the same questions while another one is outstanding are
/// not sent again, they share the response of the request already on the
/// wire. Nothing is kept once that response arrives.
#[derive(Clone)]
pub struct UdpStatsClient {
    addr: String,
    timeout: Duration,
    inflight: Arc<Mutex<HashMap<String, Flight>>>,
}

impl fmt::Debug for UdpStatsClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UdpStatsClient")
            .field("addr", &self.addr)
            .field("timeout", &self.timeout)
            .field("inflight", &self.inflight.lock().len())
            .finish()
    }
}

impl UdpStatsClient {
    /// `addr` is a `host:port` pair, resolved again for every exchange
    pub fn new(addr: impl Into<String>, timeout: Duration) -> Self {
        Self {
            addr: addr.into(),
            timeout,
            inflight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    async fn send(addr: String, timeout: Duration, msg: Message) -> Result<Message, ProtoError> {
        let dst = lookup_host(addr.as_str())
            .await?
            .next()
            .ok_or_else(|| ProtoError::from(format!("no address found for {addr}")))?;
        trace!(%dst, "sending stats request");
        let mut stream = UdpClientStream::builder(dst, TokioRuntimeProvider::default())
            .with_timeout(Some(timeout))
            .build()
            .await?;
        let request = DnsRequest::new(msg, DnsRequestOptions::default());
        let resp = stream.send_message(request).first_answer().await?;
        Ok(resp.into_message())
    }
}

/// requests with the same question set share a flight
fn flight_key(msg: &Message) -> String {
    msg.queries()
        .iter()
        .map(|q| q.to_string())
        .collect::<Vec<_>>()
        .join(";")
}

#[async_trait]
impl StatsClient for UdpStatsClient {
    async fn exchange(&self, msg: Message) -> Result<Message, ProtoError> {
        let key = flight_key(&msg);
        let flight = {
            let mut inflight = self.inflight.lock();
            match inflight.get(&key) {
                Some(flight) => {
                    debug!("joining in-flight stats request");
                    flight.clone()
                }
                None => {
                    let flight = Self::send(self.addr.clone(), self.timeout, msg)
                        .boxed()
                        .shared();
                    inflight.insert(key.clone(), flight.clone());
                    flight
                }
            }
        };

        let resp = flight.clone().await;

        let mut inflight = self.inflight.lock();
        if inflight
            .get(&key)
            .is_some_and(|current| current.ptr_eq(&flight))
        {
            inflight.remove(&key);
        }
        resp
    }
}
