//! Quarry Merge - Streaming ordered merge operator
//!
//! Consumes columnar pages arriving asynchronously from multiple remote
//! producers, each locally sorted, and emits a single globally-sorted
//! page stream under memory accounting, cooperative yielding, and
//! backpressure.

pub mod memory;
pub mod merge;
pub mod operator;
pub mod page;
pub mod sort;
pub mod source;
pub mod stats;

pub use memory::MemoryContext;
pub use merge::{MergeEngine, YieldSignal};
pub use operator::{MergeOperator, OperatorState};
pub use page::{Column, ColumnType, Page, PageBuilder, SerializedPage, ValueRef};
pub use sort::{SortChannel, SortKey, SortOrder};
pub use source::{
    ExchangeClient, ExchangeClientFactory, FailureCallback, PageSource, RemoteSplit,
};
pub use stats::OperatorStats;
