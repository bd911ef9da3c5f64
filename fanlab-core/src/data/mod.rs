//! Data layer: dataset storage, market context, partitioning, validation,
//! synthetic generation and live ingestion.

pub mod context;
pub mod frame;
pub mod ingest;
pub mod partition;
pub mod provider;
pub mod quality;
pub mod retry;
pub mod store;
pub mod synthetic;
pub mod validate;
pub mod yahoo;

pub use context::{ContextError, DatasetLayout, MarketContextStore};
pub use frame::FrameError;
pub use ingest::{ingest_market_data, IngestError, IngestRequest, IngestSummary};
pub use partition::{Partition, PartitionError, Partitioner};
pub use provider::{ClosePoint, Interval, MarketDataProvider, ProviderError};
pub use quality::DataQualityError;
pub use retry::RetryPolicy;
pub use store::{DatasetStore, ParquetStore, StoreError};
pub use synthetic::{SyntheticConfig, SyntheticMarket};
pub use validate::{ValidationConfig, ValidationReport, ValidationStatus, Validator};
pub use yahoo::YahooProvider;
