//! Domain types shared by every stage of the pipeline.

pub mod instrument;
pub mod observation;
pub mod signal;

pub use instrument::Instrument;
pub use observation::{millis_to_timestamp, MarketObservation, Timestamp};
pub use signal::{ParseLabelError, Signal, SignalRecord, TradeQuality};
