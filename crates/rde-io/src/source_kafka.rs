use rdkafka::ClientConfig;
use rdkafka::Message;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::error::KafkaError;
use rdkafka::message::BorrowedMessage;

use async_trait::async_trait;
use datafusion::arrow::datatypes::{Schema, SchemaRef};
use datafusion::arrow::json::ReaderBuilder;
use futures::StreamExt;
use rde_core::{BatchTx, KafkaSourceSpec, Message as PipelineMessage, Operator, Source};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Represents a stream of incoming Kafka messages.
/// For now, we assume JSON payloads (common in data engineering),
/// but this can be generic over Avro/Protobuf/etc.
pub struct KafkaSource {
    pub brokers: String,
    pub group_id: String,
    pub topic: String,
}

impl KafkaSource {
    pub fn new(brokers: &str, group_id: &str, topic: &str) -> Self {
        KafkaSource {
            brokers: brokers.to_string(),
            group_id: group_id.to_string(),
            topic: topic.to_string(),
        }
    }

    // start consuming messages and yield them as serde_json::Value
    pub async fn stream(&self) -> Result<impl futures::Stream<Item = Value>, KafkaError> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.server", &self.brokers)
            .set("group.id", &self.group_id)
            .set("enable.partition.eof", "false")
            .set("session.timeout.ms", "6000")
            .set("enable.auto.commit", "true")
            .create()?;

        consumer.subscribe(&[&self.topic])?;

        let (tx, rx) = mpsc::channel(100);

        // Spawn consumer task
        let consumer_task = consumer;
        tokio::spawn(async move {
            let mut stream = consumer_task.stream();
            while let Some(result) = stream.next().await {
                let value = match result {
                    Ok(m) => parse_message(&m).ok(),
                    Err(e) => {
                        warn!("kafka error on consuming message from broker: {:?}", e);
                        None
                    }
                };
                if let Some(val) = value {
                    if tx.send(val).await.is_err() {
                        break;
                    }
                }
            }
        });

        Ok(ReceiverStream::new(rx))
    }
}

// helper function to parse payload as JSON
// TODO: add transformation logic for the messages
fn parse_message(m: &BorrowedMessage) -> Result<Value, serde_json::Error> {
    if let Some(payload) = m.payload() {
        serde_json::from_slice(payload)
    } else {
        Ok(Value::Null)
    }
}

impl KafkaSource {
    /// Stream raw, unparsed payload bytes tagged with the logical stream
    /// name the mapper was compiled against, the bypass path's feed for
    /// `rde_tx::MapperTransform`, which coerces and appends the bytes
    /// itself rather than consuming a pre-parsed `serde_json::Value`.
    pub async fn stream_raw(
        &self,
        stream_name: String,
    ) -> Result<impl futures::Stream<Item = (String, Vec<u8>)>, KafkaError> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.server", &self.brokers)
            .set("group.id", &self.group_id)
            .set("enable.partition.eof", "false")
            .set("session.timeout.ms", "6000")
            .set("enable.auto.commit", "true")
            .create()?;

        consumer.subscribe(&[&self.topic])?;

        let (tx, rx) = mpsc::channel(100);
        let consumer_task = consumer;
        tokio::spawn(async move {
            let mut stream = consumer_task.stream();
            while let Some(result) = stream.next().await {
                let payload = match result {
                    Ok(m) => m.payload().map(|p| p.to_vec()),
                    Err(e) => {
                        warn!("kafka error on consuming message from broker: {:?}", e);
                        None
                    }
                };
                if let Some(bytes) = payload {
                    if tx.send((stream_name.clone(), bytes)).await.is_err() {
                        break;
                    }
                }
            }
        });

        Ok(ReceiverStream::new(rx))
    }
}

/// Drives a [`KafkaSource`] as an `Operator`/`Source` for the YAML DAG
/// pipeline mode: decodes each JSON payload into the pipeline's Arrow
/// schema via `arrow-json` and emits one-row `RecordBatch`es, mirroring
/// how [`crate::source_csv::CsvSource`] drives its file reader.
pub struct KafkaPipelineSource {
    pub spec: KafkaSourceSpec,
    pub schema: SchemaRef,
    source: KafkaSource,
}

impl KafkaPipelineSource {
    pub fn new(spec: KafkaSourceSpec) -> Self {
        let source = KafkaSource::new(&spec.brokers, &spec.group_id, &spec.topic);
        Self {
            spec,
            schema: Arc::new(Schema::empty()),
            source,
        }
    }

    pub fn with_schema(mut self, schema: SchemaRef) -> Self {
        self.schema = schema;
        self
    }
}

#[async_trait]
impl Operator for KafkaPipelineSource {
    fn name(&self) -> &str {
        &self.spec.id
    }

    fn schema(&self) -> SchemaRef {
        self.schema.clone()
    }
}

#[async_trait]
impl Source for KafkaPipelineSource {
    async fn run(&mut self, tx: BatchTx, cancel: CancellationToken) -> anyhow::Result<()> {
        let mut values = self.source.stream().await?;
        let mut decoder = ReaderBuilder::new(self.schema.clone()).build_decoder()?;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                item = values.next() => {
                    let Some(value) = item else {
                        info!(source = %self.spec.id, "kafka stream ended");
                        break;
                    };
                    if value.is_null() {
                        continue;
                    }
                    if let Err(e) = decoder.serialize(&[value]) {
                        warn!(source = %self.spec.id, error = ?e, "failed to decode kafka message against pipeline schema");
                        continue;
                    }
                    if let Some(batch) = decoder.flush()? {
                        if tx.send(PipelineMessage::Batch(batch)).await.is_err() {
                            break;
                        }
                    }
                }
            }
        }

        let _ = tx.send(PipelineMessage::Eos).await;
        Ok(())
    }
}
