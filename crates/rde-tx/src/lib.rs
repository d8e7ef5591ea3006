//! # RDE Transformations - Data Processing Operators
//!
//! Transform operators for the YAML-DAG pipeline mode's `Operator` chain.
//! The JSON-to-columnar mapper bypass path (see [`mapper_transform`]) does
//! not route through this chain at all.
//!
//! ## Available Transformations
//!
//! - **Passthrough**: no-op transform, forwards every message unmodified.
//!   Useful for testing pipeline connectivity and as a placeholder while a
//!   pipeline's sources/sinks are wired up.
//!
//! ## Example Usage
//!
//! ```rust
//! use rde_tx::Passthrough;
//! use rde_core::{Transform, Operator};
//! use datafusion::arrow::datatypes::{Schema, Field, DataType};
//! use std::sync::Arc;
//!
//! let schema = Arc::new(Schema::new(vec![
//!     Field::new("id", DataType::Int64, false),
//!     Field::new("name", DataType::Utf8, true),
//! ]));
//!
//! let transform = Passthrough::new("passthrough-1".to_string(), schema);
//! println!("Transform name: {}", transform.name());
//! ```

use datafusion::arrow::datatypes::SchemaRef;
use async_trait::async_trait;
use rde_core::{BatchRx, BatchTx, Message, Operator, Transform};
use tokio_util::sync::CancellationToken;
use tracing::info;

pub mod mapper_transform;
pub use mapper_transform::{MapperMessage, MapperTransform};

/// Passthrough transformation operator
///
/// This is a no-op transformation that simply passes data through without modification.
/// It's useful for testing pipeline connectivity, debugging data flow, and as a placeholder
/// during pipeline development.
///
/// The passthrough operator forwards all messages (batches, watermarks, and end-of-stream)
/// to downstream operators without any processing or modification.
pub struct Passthrough {
    /// Unique identifier for this transform operator
    id: String,
    /// Schema of the data passing through this operator
    schema: SchemaRef,
}

impl Passthrough {
    /// Create a new passthrough transformation
    ///
    /// # Arguments
    /// * `id` - Unique identifier for this operator instance
    /// * `schema` - Arrow schema describing the data structure
    ///
    /// # Returns
    /// A new Passthrough instance ready for use in a pipeline
    ///
    /// # Example
    /// ```rust
    /// use rde_tx::Passthrough;
    /// use datafusion::arrow::datatypes::{Schema, Field, DataType};
    /// use std::sync::Arc;
    ///
    /// let schema = Arc::new(Schema::new(vec![
    ///     Field::new("id", DataType::Int64, false),
    ///     Field::new("name", DataType::Utf8, true),
    /// ]));
    ///
    /// let passthrough = Passthrough::new("test-passthrough".to_string(), schema);
    /// ```
    pub fn new(id: String, schema: SchemaRef) -> Self {
        Self { id, schema }
    }
}

#[async_trait]
impl Operator for Passthrough {
    fn name(&self) -> &str {
        &self.id
    }
    fn schema(&self) -> SchemaRef {
        self.schema.clone()
    }
}
#[async_trait]
impl Transform for Passthrough {
    async fn run(
        &mut self,
        mut rx: BatchRx,
        tx: BatchTx,
        _cancel: CancellationToken,
    ) -> anyhow::Result<()> {
        info!("Passthrough transform started");
        while let Some(msg) = rx.recv().await {
            match &msg {
                Message::Batch(batch) => {
                    info!("Passthrough: received batch with {} rows", batch.num_rows());
                }
                Message::Watermark(_) => {
                    info!("Passthrough: received watermark");
                }
                Message::Eos => {
                    info!("Passthrough: received EOS");
                }
            }
            if tx.send(msg).await.is_err() {
                info!("Passthrough: failed to send message to sink");
                break;
            }
            info!("Passthrough: successfully forwarded message");
        }
        info!("Passthrough transform finished");
        Ok(())
    }
}

/// Build a transform operator from its YAML spec. The only variant today
/// is [`rde_core::TransformSpec::Passthrough`]; the richer Arrow/DataFusion
/// transform kinds the teacher's config format once named (schema
/// inference, JSON flattening, partitioning, SQL, data cleaning) are out
/// of scope here and have been removed from the wire enum itself.
pub fn create_transform(
    spec: &rde_core::TransformSpec,
    input_schema: SchemaRef,
) -> anyhow::Result<Box<dyn Transform + Send>> {
    match spec {
        rde_core::TransformSpec::Passthrough { id } => {
            Ok(Box::new(Passthrough::new(id.clone(), input_schema)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use datafusion::arrow::datatypes::{DataType, Field, Schema};
    use std::sync::Arc;

    fn test_schema() -> SchemaRef {
        Arc::new(Schema::new(vec![Field::new("id", DataType::Int64, false)]))
    }

    #[test]
    fn create_transform_builds_passthrough() {
        let spec = rde_core::TransformSpec::Passthrough { id: "t1".to_string() };
        let transform = create_transform(&spec, test_schema()).unwrap();
        assert_eq!(transform.name(), "t1");
    }

    #[tokio::test]
    async fn passthrough_forwards_eos() {
        let mut transform = Passthrough::new("t1".to_string(), test_schema());
        let (tx, rx) = tokio::sync::mpsc::channel(1);
        let (out_tx, mut out_rx) = tokio::sync::mpsc::channel(1);
        tx.send(Message::Eos).await.unwrap();
        drop(tx);
        transform.run(rx, out_tx, CancellationToken::new()).await.unwrap();
        assert!(matches!(out_rx.recv().await, Some(Message::Eos)));
    }
}
