//! K-way ordered merge engine
//!
//! A tournament over per-source page cursors. The heap keys are
//! `(row, source index)` so that rows comparing equal under the sort key
//! are emitted in ascending source order, which makes the merge stable.
//! Blocking is expressed through the task waker: a source that is not
//! ready parks the engine as `Poll::Pending`, and any parked source
//! advancing wakes the task.
//!
//! The engine retains at most one page per source plus the output builder,
//! and reports every retained byte to the memory context.

use crate::page::{ColumnType, Page, PageBuilder, validate_page};
use crate::memory::MemoryContext;
use crate::sort::SortKey;
use crate::source::PageSource;
use crate::stats::OperatorStats;
use futures::stream::{Stream, StreamExt};
use quarry_common::config::MergeConfig;
use quarry_common::{Error, Result};
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::task::{Context, Poll};

/// Cooperative yield signal checked between row appends
///
/// The driver raises the signal to reclaim its thread; the engine returns
/// control at the next row boundary and resumes from the same state once
/// polled again.
#[derive(Debug, Default)]
pub struct YieldSignal(AtomicBool);

impl YieldSignal {
    /// Create an unraised signal
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the signal
    pub fn set(&self) {
        self.0.store(true, AtomicOrdering::Relaxed);
    }

    /// Clear the signal
    pub fn clear(&self) {
        self.0.store(false, AtomicOrdering::Relaxed);
    }

    /// Whether the signal is raised
    #[must_use]
    pub fn is_set(&self) -> bool {
        self.0.load(AtomicOrdering::Relaxed)
    }
}

/// One source's position in the tournament
struct SourceCursor {
    source: PageSource,
    /// Page currently contributing rows; `None` means the next page must
    /// be pulled before the merge can continue
    page: Option<Arc<Page>>,
    finished: bool,
}

/// Heap element: one candidate row
struct HeapEntry {
    page: Arc<Page>,
    position: usize,
    source: usize,
    key: Arc<SortKey>,
}

impl HeapEntry {
    fn compare(&self, other: &Self) -> Ordering {
        self.key
            .compare_rows(&self.page, self.position, &other.page, other.position)
            .then(self.source.cmp(&other.source))
    }
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.compare(other) == Ordering::Equal
    }
}

impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.compare(other)
    }
}

/// Streaming k-way merge of sorted page sources
///
/// Produced pages form a stable total order under the sort key. The
/// engine is a [`Stream`]; a single-threaded cooperative driver polls it
/// through the operator shell.
pub struct MergeEngine {
    schema: Vec<ColumnType>,
    sort_key: Arc<SortKey>,
    output_channels: Vec<usize>,
    cursors: Vec<SourceCursor>,
    heap: BinaryHeap<Reverse<HeapEntry>>,
    builder: PageBuilder,
    builder_reserved: u64,
    fullness: Option<Box<dyn Fn(&PageBuilder) -> bool + Send>>,
    memory: Arc<MemoryContext>,
    yield_signal: Arc<YieldSignal>,
    stats: Arc<OperatorStats>,
    done: bool,
}

impl MergeEngine {
    /// Create a merge over `sources`, all sorted under `sort_key`
    ///
    /// `output_channels` projects input channels into the emitted pages.
    /// Channel indices are validated against `schema` here; every page a
    /// source yields is validated against `schema` as it arrives.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        sources: Vec<PageSource>,
        schema: Vec<ColumnType>,
        sort_key: SortKey,
        output_channels: Vec<usize>,
        config: &MergeConfig,
        memory: Arc<MemoryContext>,
        yield_signal: Arc<YieldSignal>,
        stats: Arc<OperatorStats>,
    ) -> Result<Self> {
        sort_key.validate(&schema)?;
        if output_channels.is_empty() {
            return Err(Error::configuration("output projection is empty"));
        }
        for &channel in &output_channels {
            if channel >= schema.len() {
                return Err(Error::configuration(format!(
                    "output channel {channel} out of bounds for {} columns",
                    schema.len()
                )));
            }
        }

        let output_types = output_channels.iter().map(|&c| schema[c]).collect();
        let builder = PageBuilder::new(output_types, config.max_page_bytes, config.max_page_rows);
        let cursors = sources
            .into_iter()
            .map(|source| SourceCursor {
                source,
                page: None,
                finished: false,
            })
            .collect();

        Ok(Self {
            schema,
            sort_key: Arc::new(sort_key),
            output_channels,
            cursors,
            heap: BinaryHeap::new(),
            builder,
            builder_reserved: 0,
            fullness: None,
            memory,
            yield_signal,
            stats,
            done: false,
        })
    }

    /// Replace the default byte/row fullness threshold with a custom
    /// predicate over the output builder
    #[must_use]
    pub fn with_fullness(
        mut self,
        predicate: impl Fn(&PageBuilder) -> bool + Send + 'static,
    ) -> Self {
        self.fullness = Some(Box::new(predicate));
        self
    }

    fn builder_is_full(&self) -> bool {
        self.fullness
            .as_ref()
            .map_or_else(|| self.builder.is_full(), |full| full(&self.builder))
    }

    /// Pull pages for every cursor that needs one. Returns `true` when at
    /// least one unfinished source is still pending.
    fn fill_cursors(&mut self, cx: &mut Context<'_>) -> Result<bool> {
        let mut pending = false;
        for index in 0..self.cursors.len() {
            loop {
                if self.cursors[index].finished || self.cursors[index].page.is_some() {
                    break;
                }
                match self.cursors[index].source.poll_next_unpin(cx) {
                    Poll::Ready(Some(Ok(page))) => {
                        // Empty pages carry no rows; pull again
                        if page.row_count() == 0 {
                            continue;
                        }
                        validate_page(&page, &self.schema)?;
                        self.memory.reserve(page.byte_size() as u64);
                        let page = Arc::new(page);
                        self.cursors[index].page = Some(Arc::clone(&page));
                        self.heap.push(Reverse(HeapEntry {
                            page,
                            position: 0,
                            source: index,
                            key: Arc::clone(&self.sort_key),
                        }));
                    }
                    Poll::Ready(Some(Err(e))) => return Err(e),
                    Poll::Ready(None) => self.cursors[index].finished = true,
                    Poll::Pending => {
                        pending = true;
                        break;
                    }
                }
            }
        }
        Ok(pending)
    }

    /// Emit the accumulated builder contents as one output page
    fn emit(&mut self) -> Result<Page> {
        let page = self.builder.build()?;
        self.memory.release(self.builder_reserved);
        self.builder_reserved = 0;
        self.stats
            .record_output(page.byte_size() as u64, page.row_count() as u64);
        Ok(page)
    }

    fn sync_builder_reservation(&mut self) {
        let bytes = self.builder.byte_size() as u64;
        if bytes > self.builder_reserved {
            self.memory.reserve(bytes - self.builder_reserved);
            self.builder_reserved = bytes;
        }
    }
}

impl Stream for MergeEngine {
    type Item = Result<Page>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.done {
            return Poll::Ready(None);
        }

        loop {
            match this.fill_cursors(cx) {
                Ok(false) => {}
                Ok(true) => return Poll::Pending,
                Err(e) => {
                    this.done = true;
                    return Poll::Ready(Some(Err(e)));
                }
            }

            loop {
                if this.heap.is_empty() {
                    if this.cursors.iter().all(|c| c.finished) {
                        this.done = true;
                        if this.builder.is_empty() {
                            return Poll::Ready(None);
                        }
                        return Poll::Ready(Some(this.emit()));
                    }
                    // A source exhausted its page mid-merge; refill
                    break;
                }

                if this.yield_signal.is_set() {
                    cx.waker().wake_by_ref();
                    return Poll::Pending;
                }

                let Some(Reverse(entry)) = this.heap.pop() else {
                    break;
                };
                if let Err(e) =
                    this.builder
                        .append_row(&entry.page, entry.position, &this.output_channels)
                {
                    this.done = true;
                    return Poll::Ready(Some(Err(e)));
                }
                this.sync_builder_reservation();

                let next_position = entry.position + 1;
                let source = entry.source;
                if next_position < entry.page.row_count() {
                    this.heap.push(Reverse(HeapEntry {
                        page: entry.page,
                        position: next_position,
                        source,
                        key: Arc::clone(&this.sort_key),
                    }));
                } else {
                    this.memory.release(entry.page.byte_size() as u64);
                    this.cursors[source].page = None;
                }

                if this.builder_is_full() {
                    return Poll::Ready(Some(this.emit()));
                }

                // The popped source ran out of rows; pull its next page
                // before comparing further candidates
                if !this.cursors[source].finished && this.cursors[source].page.is_none() {
                    break;
                }
            }
        }
    }
}

impl Drop for MergeEngine {
    fn drop(&mut self) {
        for cursor in &mut self.cursors {
            if let Some(page) = cursor.page.take() {
                self.memory.release(page.byte_size() as u64);
            }
        }
        self.memory.release(self.builder_reserved);
        self.builder_reserved = 0;
    }
}
