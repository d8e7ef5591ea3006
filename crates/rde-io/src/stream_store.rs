//! Wires a compiled mapper to a live Kafka source and a [`ColumnSink`]
//! (replaces `topic_mapping.rs`'s Iceberg-specific glue). Same shape as
//! `TopicMappingManager`: own a compiled artefact plus whatever backing
//! client it needs, initialize once, then drive it per message, except the
//! compiled artefact is now `rde_core::mapper::Mapper` and the backing
//! store is `rde_core::store::PipelineStore` rather than an Iceberg
//! `SchemaRef`/`AmazonS3Builder`.

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::Result;
use futures::StreamExt;
use rde_core::batch::ColumnSink;
use rde_core::mapper::Mapper;
use rde_core::store::PipelineStore;
use rde_tx::{MapperMessage, MapperTransform};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::source_kafka::KafkaSource;

/// Owns the compiled mapper for one pipeline id and drives it against a
/// live Kafka source.
pub struct StreamPipelineManager {
    pipeline_id: String,
    store: Arc<dyn PipelineStore>,
    sink: Arc<dyn ColumnSink>,
    mapper: Option<Arc<Mapper>>,
}

impl StreamPipelineManager {
    pub fn new(pipeline_id: String, store: Arc<dyn PipelineStore>, sink: Arc<dyn ColumnSink>) -> Self {
        Self {
            pipeline_id,
            store,
            sink,
            mapper: None,
        }
    }

    /// Load the pipeline's mapper config from the store and compile it.
    pub async fn initialize(&mut self) -> Result<()> {
        let cfg = self.store.load_mapper_config(&self.pipeline_id).await?;
        let mapper = Mapper::compile(&cfg)
            .map_err(|e| anyhow::anyhow!("mapper compile failed for {}: {e}", self.pipeline_id))?;
        self.mapper = Some(Arc::new(mapper));
        info!(pipeline = %self.pipeline_id, "stream pipeline manager initialized");
        Ok(())
    }

    /// Run the bypass path: raw Kafka bytes → `MapperTransform` →
    /// `ColumnSink`, until the source ends or `cancel` fires.
    pub async fn run(
        &self,
        kafka: &KafkaSource,
        stream_name: String,
        uuid_as_string_columns: HashSet<String>,
        flush_rows: usize,
        cancel: CancellationToken,
    ) -> Result<()> {
        let mapper = self
            .mapper
            .clone()
            .ok_or_else(|| anyhow::anyhow!("StreamPipelineManager::initialize was not called"))?;

        let transform = MapperTransform::new(
            self.pipeline_id.clone(),
            mapper,
            self.sink.clone(),
            uuid_as_string_columns,
            flush_rows,
        );

        let (tx, rx) = mpsc::channel(256);
        let mut raw = kafka.stream_raw(stream_name.clone()).await?;
        let forward_cancel = cancel.clone();
        let forward = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = forward_cancel.cancelled() => break,
                    item = raw.next() => {
                        match item {
                            Some((stream, bytes)) => {
                                if tx.send(MapperMessage::Row { stream, bytes }).await.is_err() {
                                    break;
                                }
                            }
                            None => {
                                let _ = tx.send(MapperMessage::Eos).await;
                                break;
                            }
                        }
                    }
                }
            }
        });

        transform.run(rx, cancel).await?;
        let _ = forward.await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use rde_core::batch::ColumnarBatch;
    use rde_core::schema::{FieldSpec, MapperConfig, SinkMappingEntry, StreamSchema};
    use rde_core::store::InMemoryPipelineStore;
    use rde_core::types::SourceFieldType;
    use std::collections::HashMap;

    struct NoopSink;

    #[async_trait]
    impl ColumnSink for NoopSink {
        async fn send(&self, _batch: &ColumnarBatch, _cancel: &CancellationToken) -> Result<()> {
            Ok(())
        }
    }

    fn config() -> MapperConfig {
        let mut streams = HashMap::new();
        streams.insert(
            "S".to_string(),
            StreamSchema {
                fields: vec![FieldSpec {
                    field_name: "id".to_string(),
                    field_type: SourceFieldType::Int,
                }],
                join_key_field: None,
                join_orientation: None,
                join_window: None,
            },
        );
        MapperConfig {
            r#type: "jsonToClickhouse".to_string(),
            streams,
            sink_mapping: vec![SinkMappingEntry {
                column_name: "id".to_string(),
                stream_name: "S".to_string(),
                field_name: "id".to_string(),
                column_type: "Int32".to_string(),
            }],
        }
    }

    #[tokio::test]
    async fn initialize_compiles_mapper_from_store() {
        let store: Arc<dyn PipelineStore> = Arc::new(InMemoryPipelineStore::new());
        store.save_mapper_config("p1", &config()).await.unwrap();
        let mut manager = StreamPipelineManager::new("p1".to_string(), store, Arc::new(NoopSink));
        manager.initialize().await.unwrap();
        assert!(manager.mapper.is_some());
    }

    #[tokio::test]
    async fn run_without_initialize_errors() {
        let store: Arc<dyn PipelineStore> = Arc::new(InMemoryPipelineStore::new());
        let manager = StreamPipelineManager::new("p1".to_string(), store, Arc::new(NoopSink));
        let kafka = KafkaSource::new("localhost:9092", "g", "t");
        let err = manager
            .run(&kafka, "S".to_string(), HashSet::new(), 100, CancellationToken::new())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("initialize"));
    }
}
