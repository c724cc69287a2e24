// plantpulse-ingest-core/src/streaming/mod.rs
// Stream bus publishing

pub mod publisher;

pub use publisher::{KafkaTransport, MessageTransport, OutgoingMessage, StreamPublisher};
