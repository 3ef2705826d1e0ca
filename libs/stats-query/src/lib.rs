//! # stats-query
//!
//! Polls dnsmasq for its cache statistics. All seven statistics are asked for
//! in one DNS message (class CHAOS, type TXT) and every TXT answer naming a
//! known statistic is written to its gauge.
#![warn(
    missing_debug_implementations,
    rust_2018_idioms,
    non_snake_case,
    non_upper_case_globals
)]
use std::sync::Arc;

use exporter_core::metrics::{MetricSink, SERVERS_RECORD, Stat};
use hickory_proto::{
    ProtoError,
    op::{Message, MessageType, OpCode, Query},
    rr::{DNSClass, Name, RData, RecordType},
};
use tracing::{debug, trace};

pub mod client;
pub mod error;

pub use crate::client::{StatsClient, UdpStatsClient};
pub use crate::error::{Result, StatsError};

/// Build the stats request: one TXT/CHAOS question per statistic, in
/// [`Stat::ALL`] order, followed by `servers.bind.`
pub fn build_query() -> std::result::Result<Message, ProtoError> {
    let mut message = Message::new();
    message
        .set_id(rand::random())
        .set_message_type(MessageType::Query)
        .set_op_code(OpCode::Query)
        .set_recursion_desired(true);

    let names = Stat::ALL
        .iter()
        .map(|stat| stat.record_name())
        .chain(std::iter::once(SERVERS_RECORD));
    for name in names {
        let mut query = Query::query(Name::from_ascii(name)?, RecordType::TXT);
        query.set_query_class(DNSClass::CH);
        message.add_query(query);
    }
    Ok(message)
}

/// Write every statistic answered in `response` to `sink`.
///
/// Answers that are not TXT, or whose name is not a known statistic, are
/// skipped. A known statistic must carry exactly one value that parses as a
/// float; anything else fails the whole response. Gauges set before the
/// failing record keep their new value.
pub fn decode(response: &Message, sink: &dyn MetricSink) -> Result<()> {
    for record in response.answers() {
        let RData::TXT(txt) = record.data() else {
            continue;
        };
        let name = record.name().to_string();
        if name.eq_ignore_ascii_case(SERVERS_RECORD) {
            // TODO: parse "<server> <successes> <errors>" per upstream into a labeled gauge
            trace!(values = txt.txt_data().len(), "skipping servers.bind. answer");
            continue;
        }
        let Some(stat) = Stat::from_record(&name) else {
            trace!(%name, "ignoring unexpected answer from dnsmasq");
            continue;
        };
        let [value] = txt.txt_data() else {
            return Err(StatsError::ValueCount {
                name,
                count: txt.txt_data().len(),
            });
        };
        let value = String::from_utf8_lossy(value);
        let parsed = value
            .parse::<f64>()
            .map_err(|source| StatsError::ParseValue {
                name: name.clone(),
                value: value.clone().into_owned(),
                source,
            })?;
        sink.set_stat(stat, parsed);
    }
    Ok(())
}

/// Runs one stats exchange per [`collect`](StatsCollector::collect)
#[derive(Debug, Clone)]
pub struct StatsCollector {
    client: Arc<dyn StatsClient>,
    sink: Arc<dyn MetricSink>,
}

impl StatsCollector {
    pub fn new(client: Arc<dyn StatsClient>, sink: Arc<dyn MetricSink>) -> Self {
        Self { client, sink }
    }

    /// Query dnsmasq and update the statistic gauges
    pub async fn collect(&self) -> Result<()> {
        let query = build_query().map_err(StatsError::Query)?;
        let response = self.client.exchange(query).await?;
        debug!(answers = response.answers().len(), "got stats response");
        decode(&response, self.sink.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use exporter_core::{DnsmasqMetrics, async_trait};
    use hickory_proto::rr::{Record, rdata::TXT};
    use tracing_test::traced_test;

    use super::*;

    pub(crate) fn txt_record(name: &str, values: &[&str]) -> Record {
        let mut record = Record::from_rdata(
            Name::from_ascii(name).unwrap(),
            0,
            RData::TXT(TXT::new(values.iter().map(|v| v.to_string()).collect())),
        );
        record.set_dns_class(DNSClass::CH);
        record
    }

    fn response(answers: Vec<Record>) -> Message {
        let mut msg = build_query().unwrap();
        msg.set_message_type(MessageType::Response);
        msg.add_answers(answers);
        msg
    }

    #[derive(Debug)]
    struct Canned(std::result::Result<Message, ProtoError>);

    #[async_trait]
    impl StatsClient for Canned {
        async fn exchange(&self, _msg: Message) -> std::result::Result<Message, ProtoError> {
            self.0.clone()
        }
    }

    fn canned(
        answer: std::result::Result<Message, ProtoError>,
    ) -> (StatsCollector, Arc<DnsmasqMetrics>) {
        let metrics = Arc::new(DnsmasqMetrics::new().unwrap());
        let collector = StatsCollector::new(Arc::new(Canned(answer)), metrics.clone());
        (collector, metrics)
    }

    #[test]
    fn query_shape() {
        let msg = build_query().unwrap();
        assert!(msg.recursion_desired());
        assert_eq!(msg.op_code(), OpCode::Query);
        let names = msg
            .queries()
            .iter()
            .map(|q| q.name().to_string())
            .collect::<Vec<_>>();
        assert_eq!(
            names,
            [
                "cachesize.bind.",
                "insertions.bind.",
                "evictions.bind.",
                "misses.bind.",
                "hits.bind.",
                "auth.bind.",
                "servers.bind.",
            ]
        );
        for q in msg.queries() {
            assert_eq!(q.query_type(), RecordType::TXT);
            assert_eq!(q.query_class(), DNSClass::CH);
        }
    }

    #[tokio::test]
    async fn cachesize() {
        let (collector, metrics) = canned(Ok(response(vec![txt_record(
            "cachesize.bind.",
            &["150"],
        )])));
        collector.collect().await.unwrap();
        assert_eq!(metrics.stat(Stat::CacheSize), 150.);
    }

    #[tokio::test]
    async fn every_stat() {
        let answers = Stat::ALL
            .iter()
            .enumerate()
            .map(|(i, stat)| txt_record(stat.record_name(), &[&(i * 10 + 1).to_string()]))
            .collect();
        let (collector, metrics) = canned(Ok(response(answers)));
        collector.collect().await.unwrap();
        for (i, stat) in Stat::ALL.iter().enumerate() {
            assert_eq!(metrics.stat(*stat), (i * 10 + 1) as f64, "{stat:?}");
        }
    }

    #[tokio::test]
    #[traced_test]
    async fn unknown_and_servers_ignored() {
        let (collector, metrics) = canned(Ok(response(vec![
            txt_record("servers.bind.", &["10.0.0.1#53 12 0", "10.0.0.2#53 3 1"]),
            txt_record("uptime.bind.", &["not a number", "twice"]),
            txt_record("hits.bind.", &["7"]),
        ])));
        collector.collect().await.unwrap();
        assert_eq!(metrics.stat(Stat::Hits), 7.);
        assert!(logs_contain("ignoring unexpected answer from dnsmasq"));
    }

    #[tokio::test]
    async fn last_duplicate_wins() {
        let (collector, metrics) = canned(Ok(response(vec![
            txt_record("misses.bind.", &["1"]),
            txt_record("misses.bind.", &["2"]),
        ])));
        collector.collect().await.unwrap();
        assert_eq!(metrics.stat(Stat::Misses), 2.);
    }

    #[tokio::test]
    async fn wrong_value_count() {
        let (collector, metrics) =
            canned(Ok(response(vec![txt_record("evictions.bind.", &["1", "2"])])));
        let err = collector.collect().await.unwrap_err();
        assert!(
            matches!(&err, StatsError::ValueCount { name, count: 2 } if name == "evictions.bind."),
            "{err:?}"
        );
        assert_eq!(metrics.stat(Stat::Evictions), 0.);

        let (collector, _) = canned(Ok(response(vec![txt_record("auth.bind.", &[])])));
        let err = collector.collect().await.unwrap_err();
        assert!(matches!(err, StatsError::ValueCount { count: 0, .. }), "{err:?}");
    }

    #[tokio::test]
    async fn unparsable_value() {
        let (collector, metrics) = canned(Ok(response(vec![
            txt_record("insertions.bind.", &["12"]),
            txt_record("hits.bind.", &["lots"]),
        ])));
        let err = collector.collect().await.unwrap_err();
        assert!(
            matches!(&err, StatsError::ParseValue { name, value, .. } if name == "hits.bind." && value == "lots"),
            "{err:?}"
        );
        assert_eq!(
            err.to_string(),
            r#"stats DNS record "hits.bind.": invalid value "lots": invalid float literal"#
        );
        // earlier records already landed
        assert_eq!(metrics.stat(Stat::Insertions), 12.);
        assert_eq!(metrics.stat(Stat::Hits), 0.);
    }

    #[tokio::test]
    async fn transport_error() {
        let (collector, metrics) = canned(Err(ProtoError::from("connection refused")));
        let err = collector.collect().await.unwrap_err();
        assert!(matches!(err, StatsError::Transport(_)), "{err:?}");
        assert!(err.to_string().contains("connection refused"), "{err}");
        assert_eq!(metrics.stat(Stat::CacheSize), 0.);
    }
}
