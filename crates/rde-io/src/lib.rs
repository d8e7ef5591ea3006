//! # RDE I/O - Data Source and Sink Implementations
//!
//! This crate provides the concrete implementations of data sources and sinks for the RDE pipeline.
//! It includes connectors for various data systems including Kafka, CSV files, Parquet files,
//! Apache Iceberg tables, and more.
//!
//! ## Features
//!
//! ### Data Sources
//! - **Kafka**: High-performance streaming data ingestion with JSON parsing and schema evolution
//! - **CSV**: Batch file processing with automatic schema inference
//! 
//! ### Data Sinks  
//! - **Apache Iceberg**: Production-grade data lake tables with ACID guarantees
//! - **Parquet**: High-performance columnar file format
//! - **Stdout**: Development and debugging output
//!
//! ### Advanced Features
//! - **JSON→Columnar Mapping**: Compiled-mapper bypass path straight from a
//!   Kafka stream to a [`rde_core::batch::ColumnSink`], skipping the
//!   transform/sink operator DAG entirely.
//! - **Dynamic Schema Management**: Automatic schema inference and evolution
//! - **SQL Transformations**: Topic-specific data transformations using DataFusion
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use rde_io::source_kafka::KafkaSource;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let source = KafkaSource::new("localhost:9092", "my-group", "input-topic");
//! let _stream = source.stream_raw("input-topic".to_string()).await?;
//! # Ok(())
//! # }
//! ```

#![allow(unused)]

/// Parquet file sink implementation
pub mod sink_parquet;

/// Standard output sink for debugging
pub mod sink_stdout;

/// Apache Iceberg table sink implementation
pub mod sink_iceberg;

/// HTTP insert sink for a ClickHouse-shaped analytical database
pub mod sink_clickhouse;

/// CSV file source implementation
pub mod source_csv;

/// Apache Kafka source implementation
pub mod source_kafka;

/// Compiled-mapper-to-sink pipeline management (JSON→columnar bypass mode)
pub mod stream_store;
