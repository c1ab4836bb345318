//! Radio message parsing and per-cycle reading aggregation

pub mod aggregator;
pub mod parser;

pub use aggregator::{
    AggregatorState, CompletedCycle, IngestError, IngestOutcome, ReadingAggregator,
    SharedAggregator,
};
pub use parser::{MessageParser, ParseError, RadioMessage};
