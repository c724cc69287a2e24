// plantpulse-ingest-core/src/streaming/publisher.rs
// Low-latency stream publishing with a bounded fire-and-forget queue

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::message::{Header, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::StreamConfig;
use crate::errors::{IngestError, IngestResult};
use crate::observability::MetricsSink;

/// One message bound for the stream bus
#[derive(Debug, Clone)]
pub struct OutgoingMessage {
    pub topic: String,
    pub key: String,
    pub payload: Vec<u8>,
    /// Carried as message headers for consumer-side filtering
    pub headers: Vec<(String, String)>,
}

/// Broker transport seam; production uses Kafka, tests capture
#[async_trait]
pub trait MessageTransport: Send + Sync {
    async fn send(&self, message: &OutgoingMessage, timeout: Duration) -> Result<(), String>;
}

/// Kafka transport with the low-latency producer profile: no linger,
/// batch of one, leader-only acks, no compression, idempotence off
pub struct KafkaTransport {
    producer: FutureProducer,
}

impl KafkaTransport {
    pub fn new(config: &StreamConfig) -> Result<Self, String> {
        let mut client_config = ClientConfig::new();
        client_config
            .set("bootstrap.servers", &config.brokers)
            .set("linger.ms", "0")
            .set("batch.num.messages", "1")
            .set("acks", "1")
            .set("compression.type", "none")
            .set("enable.idempotence", "false")
            .set("message.timeout.ms", "5000");
        if config.require_tls {
            client_config.set("security.protocol", "ssl");
        }
        let producer = client_config
            .create()
            .map_err(|e| format!("failed to create stream producer: {}", e))?;
        Ok(Self { producer })
    }
}

#[async_trait]
impl MessageTransport for KafkaTransport {
    async fn send(&self, message: &OutgoingMessage, timeout: Duration) -> Result<(), String> {
        let mut headers = OwnedHeaders::new();
        for (key, value) in &message.headers {
            headers = headers.insert(Header {
                key,
                value: Some(value.as_str()),
            });
        }
        let record = FutureRecord::to(&message.topic)
            .key(&message.key)
            .payload(&message.payload)
            .headers(headers);
        self.producer
            .send(record, timeout)
            .await
            .map(|_| ())
            .map_err(|(e, _)| format!("publish to {} failed: {}", message.topic, e))
    }
}

/// Process-wide stream publisher.
///
/// Awaited publishes go straight to the transport with the caller's
/// deadline. Critical alerts are enqueued on a bounded queue drained by a
/// dedicated worker; a full queue is the only backpressure signal the
/// ingestion path honors. Errors surface in logs, never to HTTP callers.
pub struct StreamPublisher {
    transport: Arc<dyn MessageTransport>,
    critical_tx: Mutex<Option<mpsc::Sender<OutgoingMessage>>>,
    queue_depth: Arc<AtomicI64>,
    worker: Mutex<Option<JoinHandle<()>>>,
    metrics: Arc<MetricsSink>,
}

/// Deadline applied by the drain worker to each critical publish
const CRITICAL_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

impl StreamPublisher {
    pub fn new(
        transport: Arc<dyn MessageTransport>,
        queue_capacity: usize,
        metrics: Arc<MetricsSink>,
    ) -> Self {
        let (tx, mut rx) = mpsc::channel::<OutgoingMessage>(queue_capacity);
        let queue_depth = Arc::new(AtomicI64::new(0));
        let worker_transport = transport.clone();
        let worker_metrics = metrics.clone();
        let worker_depth = queue_depth.clone();
        let worker = tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                let depth = worker_depth.fetch_sub(1, Ordering::SeqCst) - 1;
                worker_metrics.set_publisher_queue_depth(depth.max(0));
                if let Err(e) = worker_transport.send(&message, CRITICAL_DRAIN_TIMEOUT).await {
                    log::warn!("stream publisher: critical drain failed: {}", e);
                }
            }
            worker_metrics.set_publisher_queue_depth(0);
        });

        Self {
            transport,
            critical_tx: Mutex::new(Some(tx)),
            queue_depth,
            worker: Mutex::new(Some(worker)),
            metrics,
        }
    }

    /// Publish and wait for broker submission within the given deadline
    pub async fn publish(&self, message: OutgoingMessage, timeout: Duration) -> IngestResult<()> {
        self.transport
            .send(&message, timeout)
            .await
            .map_err(IngestError::Dependency)
    }

    /// Submit without waiting for acknowledgement; fails closed when the
    /// outgoing queue is full
    pub fn publish_fire_and_forget(&self, message: OutgoingMessage) -> IngestResult<()> {
        let tx = {
            let guard = self
                .critical_tx
                .lock()
                .map_err(|_| IngestError::Internal("publisher queue lock poisoned".to_string()))?;
            guard
                .as_ref()
                .cloned()
                .ok_or_else(|| IngestError::Dependency("publisher is shut down".to_string()))?
        };
        tx.try_send(message).map_err(|e| match e {
            mpsc::error::TrySendError::Full(m) => {
                log::warn!(
                    "stream publisher: critical queue full, dropping message for {}",
                    m.topic
                );
                IngestError::Dependency("critical publish queue full".to_string())
            }
            mpsc::error::TrySendError::Closed(_) => {
                IngestError::Dependency("publisher is shut down".to_string())
            }
        })?;
        let depth = self.queue_depth.fetch_add(1, Ordering::SeqCst) + 1;
        self.metrics.set_publisher_queue_depth(depth);
        Ok(())
    }

    /// Close the queue and wait for the drain worker to flush it
    pub async fn shutdown(&self) {
        let tx = self.critical_tx.lock().ok().and_then(|mut guard| guard.take());
        drop(tx);
        let worker = self.worker.lock().ok().and_then(|mut guard| guard.take());
        if let Some(worker) = worker {
            if let Err(e) = worker.await {
                log::warn!("stream publisher: drain worker join failed: {}", e);
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::Mutex as StdMutex;

    /// Transport that records every message it is asked to send
    #[derive(Default)]
    pub struct CaptureTransport {
        pub sent: StdMutex<Vec<OutgoingMessage>>,
        pub fail: bool,
    }

    #[async_trait]
    impl MessageTransport for CaptureTransport {
        async fn send(&self, message: &OutgoingMessage, _timeout: Duration) -> Result<(), String> {
            if self.fail {
                return Err("transport down".to_string());
            }
            self.sent.lock().unwrap().push(message.clone());
            Ok(())
        }
    }
}
