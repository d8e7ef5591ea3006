//! The mapper's bypass runtime path (spec.md §4.4, §5): drives
//! `rde_core::mapper::Mapper` directly against raw per-stream JSON bytes,
//! the same way the teacher's `TopicMapping` "bypasses the need for
//! separate transform and sink operators" for direct Kafka-to-Iceberg
//! streaming (`rde-core/src/lib.rs`). The run-loop shape, an mpsc
//! receiver drained under a `CancellationToken`-gated `tokio::select!`
//! with `tracing` on every boundary, follows [`crate::Passthrough`]'s run
//! loop; the message type differs because the mapper never touches an
//! Arrow `RecordBatch`.

use std::sync::Arc;

use anyhow::Result;
use rde_core::batch::ColumnSink;
use rde_core::mapper::Mapper;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// One inbound event for the mapper: raw bytes tagged with the logical
/// stream they were declared under. A multi-stream (joined) mapper
/// expects `bytes` to already be the combined payload from
/// [`rde_core::mapper::join_data`].
#[derive(Debug, Clone)]
pub enum MapperMessage {
    Row { stream: String, bytes: Vec<u8> },
    Eos,
}

/// Runs a compiled [`Mapper`] against an inbound [`MapperMessage`]
/// stream, flushing the columnar batch to `sink` every `flush_rows` rows
/// or on `Eos`/cancellation.
pub struct MapperTransform {
    id: String,
    mapper: Arc<Mapper>,
    sink: Arc<dyn ColumnSink>,
    uuid_as_string_columns: std::collections::HashSet<String>,
    flush_rows: usize,
}

impl MapperTransform {
    pub fn new(
        id: String,
        mapper: Arc<Mapper>,
        sink: Arc<dyn ColumnSink>,
        uuid_as_string_columns: std::collections::HashSet<String>,
        flush_rows: usize,
    ) -> Self {
        Self {
            id,
            mapper,
            sink,
            uuid_as_string_columns,
            flush_rows: flush_rows.max(1),
        }
    }

    pub fn name(&self) -> &str {
        &self.id
    }

    /// Run the transform: drain `rx` until `Eos` or cancellation,
    /// appending each row to a columnar batch and flushing it to `sink`
    /// every `flush_rows` rows. On cancellation the current batch is
    /// flushed best-effort (spec.md §5: "flush the current batch
    /// (best-effort, bounded by a shutdown timeout)... failures on
    /// terminating paths are logged but do not veto the transition").
    pub async fn run(&self, mut rx: mpsc::Receiver<MapperMessage>, cancel: CancellationToken) -> Result<()> {
        let mut batch = self.mapper.new_batch(&self.uuid_as_string_columns, false);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!(transform = %self.id, "mapper transform cancelled, flushing best-effort");
                    if batch.size() > 0 {
                        if let Err(e) = self.sink.send(&batch, &cancel).await {
                            warn!(transform = %self.id, error = %e, "flush on cancellation failed");
                        }
                    }
                    return Ok(());
                }
                msg = rx.recv() => {
                    match msg {
                        None | Some(MapperMessage::Eos) => {
                            if batch.size() > 0 {
                                self.sink.send(&batch, &cancel).await?;
                            }
                            info!(transform = %self.id, "mapper transform reached end of stream");
                            return Ok(());
                        }
                        Some(MapperMessage::Row { stream, bytes }) => {
                            match self.mapper.append_to_columns(&stream, &bytes, &mut batch) {
                                Ok(()) => {}
                                Err(e) => {
                                    error!(transform = %self.id, stream = %stream, error = %e, "row rejected");
                                    continue;
                                }
                            }
                            if batch.size() >= self.flush_rows {
                                self.sink.send(&batch, &cancel).await?;
                                batch.reset();
                            }
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use rde_core::batch::ColumnarBatch;
    use rde_core::schema::{FieldSpec, MapperConfig, SinkMappingEntry, StreamSchema};
    use rde_core::types::SourceFieldType;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSink {
        rows: AtomicUsize,
    }

    #[async_trait]
    impl ColumnSink for CountingSink {
        async fn send(&self, batch: &ColumnarBatch, _cancel: &CancellationToken) -> Result<()> {
            self.rows.fetch_add(batch.size(), Ordering::SeqCst);
            Ok(())
        }
    }

    fn test_mapper() -> Mapper {
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
        let cfg = MapperConfig {
            r#type: "jsonToClickhouse".to_string(),
            streams,
            sink_mapping: vec![SinkMappingEntry {
                column_name: "id".to_string(),
                stream_name: "S".to_string(),
                field_name: "id".to_string(),
                column_type: "Int32".to_string(),
            }],
        };
        Mapper::compile(&cfg).unwrap()
    }

    #[tokio::test]
    async fn flushes_on_eos() {
        let sink = Arc::new(CountingSink { rows: AtomicUsize::new(0) });
        let transform = MapperTransform::new(
            "t1".to_string(),
            Arc::new(test_mapper()),
            sink.clone(),
            Default::default(),
            10,
        );
        let (tx, rx) = mpsc::channel(8);
        tx.send(MapperMessage::Row {
            stream: "S".to_string(),
            bytes: br#"{"id": 1}"#.to_vec(),
        })
        .await
        .unwrap();
        tx.send(MapperMessage::Eos).await.unwrap();
        drop(tx);
        transform.run(rx, CancellationToken::new()).await.unwrap();
        assert_eq!(sink.rows.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn flushes_at_threshold() {
        let sink = Arc::new(CountingSink { rows: AtomicUsize::new(0) });
        let transform = MapperTransform::new(
            "t1".to_string(),
            Arc::new(test_mapper()),
            sink.clone(),
            Default::default(),
            2,
        );
        let (tx, rx) = mpsc::channel(8);
        for i in 0..3 {
            tx.send(MapperMessage::Row {
                stream: "S".to_string(),
                bytes: format!(r#"{{"id": {i}}}"#).into_bytes(),
            })
            .await
            .unwrap();
        }
        tx.send(MapperMessage::Eos).await.unwrap();
        drop(tx);
        transform.run(rx, CancellationToken::new()).await.unwrap();
        assert_eq!(sink.rows.load(Ordering::SeqCst), 3);
    }
}
