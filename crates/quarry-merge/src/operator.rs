//! Merge operator shell
//!
//! Presents the merge engine as a pipeline source stage with the driver
//! lifecycle `AcceptingSplits → Merging → Finished → Closed`. The
//! operator accepts remote splits, wires one exchange client per split,
//! and once the split set closes, drives the k-way merge over the
//! accumulated sources. It takes no input pages; output is pulled with
//! `get_output` after `poll_blocked` reports readiness.

use crate::memory::MemoryContext;
use crate::merge::{MergeEngine, YieldSignal};
use crate::page::{ColumnType, Page};
use crate::sort::SortKey;
use crate::source::{ExchangeClient, ExchangeClientFactory, FailureCallback, PageSource, RemoteSplit};
use crate::stats::OperatorStats;
use futures::stream::StreamExt;
use quarry_common::config::MergeConfig;
use quarry_common::{Error, Result};
use std::sync::Arc;
use std::task::{Context, Poll, Waker};
use tracing::debug;

/// Lifecycle state of a merge operator
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OperatorState {
    /// Accepting `add_split`; blocked until the split set closes
    AcceptingSplits,
    /// Engine materialized; producing output
    Merging,
    /// Engine exhausted; no further output
    Finished,
    /// Resources released
    Closed,
}

/// Pipeline source stage producing a globally-sorted page stream from
/// remote sorted producers
pub struct MergeOperator {
    state: OperatorState,
    factory: Arc<dyn ExchangeClientFactory>,
    schema: Vec<ColumnType>,
    sort_key: SortKey,
    output_channels: Vec<usize>,
    config: MergeConfig,
    memory: Arc<MemoryContext>,
    yield_signal: Arc<YieldSignal>,
    stats: Arc<OperatorStats>,
    on_failure: FailureCallback,
    /// Clients in registration order; released in reverse on close
    clients: Vec<Arc<dyn ExchangeClient>>,
    sources: Vec<PageSource>,
    engine: Option<MergeEngine>,
    splits_waker: Option<Waker>,
    pending: Option<Result<Page>>,
}

impl MergeOperator {
    /// Create an operator; sort and projection channels are validated
    /// against `schema` immediately
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        factory: Arc<dyn ExchangeClientFactory>,
        schema: Vec<ColumnType>,
        sort_key: SortKey,
        output_channels: Vec<usize>,
        config: MergeConfig,
        yield_signal: Arc<YieldSignal>,
        on_failure: FailureCallback,
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
        Ok(Self {
            state: OperatorState::AcceptingSplits,
            factory,
            schema,
            sort_key,
            output_channels,
            config,
            memory: Arc::new(MemoryContext::new()),
            yield_signal,
            stats: Arc::new(OperatorStats::default()),
            on_failure,
            clients: Vec::new(),
            sources: Vec::new(),
            engine: None,
            splits_waker: None,
            pending: None,
        })
    }

    /// Current lifecycle state
    #[must_use]
    pub const fn state(&self) -> OperatorState {
        self.state
    }

    /// Operator statistics
    #[must_use]
    pub fn stats(&self) -> Arc<OperatorStats> {
        Arc::clone(&self.stats)
    }

    /// Memory context charged by retained pages
    #[must_use]
    pub fn memory(&self) -> Arc<MemoryContext> {
        Arc::clone(&self.memory)
    }

    /// Register one remote producer
    ///
    /// Creates an exchange client for the split and subscribes to its
    /// page sequence. Permitted only while accepting splits.
    pub fn add_split(&mut self, split: &RemoteSplit) -> Result<()> {
        if self.state != OperatorState::AcceptingSplits {
            return Err(Error::internal(format!(
                "split added in state {:?}",
                self.state
            )));
        }
        let client = self.factory.create(
            split,
            Arc::clone(&self.memory),
            Arc::clone(&self.on_failure),
        )?;
        self.clients.push(Arc::clone(&client));
        self.sources.push(PageSource::from_client(
            client,
            self.schema.clone(),
            Arc::clone(&self.stats),
        ));
        debug!(task = %split.task_id, uri = %split.uri, "registered merge split");
        Ok(())
    }

    /// Close the split set and materialize the merge engine
    pub fn no_more_splits(&mut self) -> Result<()> {
        match self.state {
            OperatorState::AcceptingSplits => {}
            OperatorState::Merging => return Ok(()),
            other => {
                return Err(Error::internal(format!(
                    "split set closed in state {other:?}"
                )));
            }
        }

        let sources = std::mem::take(&mut self.sources);
        let engine = MergeEngine::new(
            sources,
            self.schema.clone(),
            self.sort_key.clone(),
            self.output_channels.clone(),
            &self.config,
            Arc::clone(&self.memory),
            Arc::clone(&self.yield_signal),
            Arc::clone(&self.stats),
        )?;
        self.engine = Some(engine);
        self.state = OperatorState::Merging;
        if let Some(waker) = self.splits_waker.take() {
            waker.wake();
        }
        Ok(())
    }

    /// Poll the operator's blocked state
    ///
    /// While accepting splits this is the splits gate; while merging it
    /// delegates to the engine and stashes the next output; otherwise it
    /// is ready.
    pub fn poll_blocked(&mut self, cx: &mut Context<'_>) -> Poll<()> {
        match self.state {
            OperatorState::AcceptingSplits => {
                self.splits_waker = Some(cx.waker().clone());
                Poll::Pending
            }
            OperatorState::Merging => {
                if self.pending.is_some() {
                    return Poll::Ready(());
                }
                let Some(engine) = self.engine.as_mut() else {
                    return Poll::Ready(());
                };
                match engine.poll_next_unpin(cx) {
                    Poll::Ready(Some(item)) => {
                        self.pending = Some(item);
                        Poll::Ready(())
                    }
                    Poll::Ready(None) => {
                        self.state = OperatorState::Finished;
                        Poll::Ready(())
                    }
                    Poll::Pending => Poll::Pending,
                }
            }
            OperatorState::Finished | OperatorState::Closed => Poll::Ready(()),
        }
    }

    /// Take the next output page if one is ready
    ///
    /// Returns `Ok(None)` when no output is available yet; safe to call
    /// repeatedly.
    pub fn get_output(&mut self) -> Result<Option<Page>> {
        match self.pending.take() {
            Some(Ok(page)) => Ok(Some(page)),
            Some(Err(e)) => Err(e),
            None => Ok(None),
        }
    }

    /// This is a source stage; it never takes input
    #[must_use]
    pub const fn needs_input(&self) -> bool {
        false
    }

    /// Always an invariant violation on a source stage
    pub fn add_input(&mut self, _page: Page) -> Result<()> {
        Err(Error::internal("merge operator does not accept input pages"))
    }

    /// Whether the operator has produced all output
    #[must_use]
    pub fn is_finished(&self) -> bool {
        matches!(self.state, OperatorState::Finished | OperatorState::Closed)
    }

    /// Mark the operator finished and release resources
    pub fn finish(&mut self) -> Result<()> {
        self.close()
    }

    /// Release every registered exchange client, in reverse order of
    /// registration, aggregating failures into one I/O error
    pub fn close(&mut self) -> Result<()> {
        if self.state == OperatorState::Closed {
            return Ok(());
        }
        self.state = OperatorState::Closed;
        self.pending = None;

        // Dropping the engine releases its retained-page reservations;
        // in-flight deserializations are abandoned with it
        self.engine = None;
        self.sources.clear();

        let mut failures = Vec::new();
        for client in self.clients.drain(..).rev() {
            if let Err(e) = client.close() {
                failures.push(e.to_string());
            }
        }
        if let Some(waker) = self.splits_waker.take() {
            waker.wake();
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(Error::Io(std::io::Error::other(format!(
                "failed to close {} exchange client(s): {}",
                failures.len(),
                failures.join("; ")
            ))))
        }
    }
}

impl Drop for MergeOperator {
    fn drop(&mut self) {
        if self.state != OperatorState::Closed {
            let _ = self.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::{Column, SerializedPage, ValueRef};
    use crate::sort::{SortChannel, SortOrder};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use quarry_common::TaskId;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn int64_page(values: &[i64]) -> Page {
        Page::new(vec![Column::Int64(values.iter().map(|v| Some(*v)).collect())]).unwrap()
    }

    fn int64_values(page: &Page) -> Vec<i64> {
        (0..page.row_count())
            .map(|pos| match page.value(0, pos) {
                Some(ValueRef::Int64(v)) => v,
                other => panic!("unexpected cell {other:?}"),
            })
            .collect()
    }

    struct TestClient {
        id: usize,
        pages: Mutex<Vec<SerializedPage>>,
        closed: AtomicBool,
        close_log: Arc<Mutex<Vec<usize>>>,
    }

    #[async_trait]
    impl ExchangeClient for TestClient {
        async fn next_page(&self) -> Result<Option<SerializedPage>> {
            if self.closed.load(Ordering::Relaxed) {
                return Ok(None);
            }
            Ok(self.pages.lock().pop())
        }

        fn close(&self) -> Result<()> {
            self.closed.store(true, Ordering::Relaxed);
            self.close_log.lock().push(self.id);
            Ok(())
        }
    }

    struct TestFactory {
        pages_by_uri: HashMap<String, Vec<Page>>,
        created: Mutex<usize>,
        close_log: Arc<Mutex<Vec<usize>>>,
    }

    impl TestFactory {
        fn new(pages_by_uri: HashMap<String, Vec<Page>>) -> Self {
            Self {
                pages_by_uri,
                created: Mutex::new(0),
                close_log: Arc::new(Mutex::new(Vec::new())),
            }
        }
    }

    impl ExchangeClientFactory for TestFactory {
        fn create(
            &self,
            split: &RemoteSplit,
            _memory: Arc<MemoryContext>,
            _on_failure: FailureCallback,
        ) -> Result<Arc<dyn ExchangeClient>> {
            let pages = self
                .pages_by_uri
                .get(&split.uri)
                .ok_or_else(|| Error::transport(format!("unknown exchange uri {}", split.uri)))?;
            let serialized: Vec<SerializedPage> = pages
                .iter()
                .map(|p| SerializedPage::serialize(p).unwrap())
                .rev()
                .collect();
            let mut created = self.created.lock();
            let client = Arc::new(TestClient {
                id: *created,
                pages: Mutex::new(serialized),
                closed: AtomicBool::new(false),
                close_log: Arc::clone(&self.close_log),
            });
            *created += 1;
            Ok(client)
        }
    }

    fn operator_over(factory: Arc<TestFactory>, max_page_rows: usize) -> MergeOperator {
        MergeOperator::new(
            factory,
            vec![ColumnType::Int64],
            SortKey::new(vec![SortChannel::new(0, SortOrder::AscNullsFirst)]).unwrap(),
            vec![0],
            MergeConfig {
                max_page_bytes: usize::MAX,
                max_page_rows,
            },
            Arc::new(YieldSignal::new()),
            Arc::new(|_| {}),
        )
        .unwrap()
    }

    async fn drain(operator: &mut MergeOperator) -> Vec<Page> {
        let mut out = Vec::new();
        loop {
            futures::future::poll_fn(|cx| operator.poll_blocked(cx)).await;
            if let Some(page) = operator.get_output().unwrap() {
                out.push(page);
                continue;
            }
            if operator.is_finished() {
                return out;
            }
        }
    }

    #[tokio::test]
    async fn test_lifecycle_and_sorted_output() {
        let factory = Arc::new(TestFactory::new(HashMap::from([
            ("exchange://a".to_string(), vec![int64_page(&[1, 3, 5])]),
            ("exchange://b".to_string(), vec![int64_page(&[2, 4, 6])]),
        ])));
        let mut operator = operator_over(Arc::clone(&factory), 3);

        assert_eq!(operator.state(), OperatorState::AcceptingSplits);
        operator
            .add_split(&RemoteSplit::new(TaskId::new("t.0"), "exchange://a"))
            .unwrap();
        operator
            .add_split(&RemoteSplit::new(TaskId::new("t.1"), "exchange://b"))
            .unwrap();
        operator.no_more_splits().unwrap();
        assert_eq!(operator.state(), OperatorState::Merging);

        let pages = drain(&mut operator).await;
        assert_eq!(pages.len(), 2);
        assert_eq!(int64_values(&pages[0]), vec![1, 2, 3]);
        assert_eq!(int64_values(&pages[1]), vec![4, 5, 6]);
        assert_eq!(operator.state(), OperatorState::Finished);

        operator.close().unwrap();
        assert_eq!(operator.state(), OperatorState::Closed);
        assert_eq!(operator.memory().reserved_bytes(), 0);
    }

    #[tokio::test]
    async fn test_blocked_until_splits_close() {
        let factory = Arc::new(TestFactory::new(HashMap::new()));
        let mut operator = operator_over(factory, 1024);

        let waker = futures::task::noop_waker();
        let mut cx = Context::from_waker(&waker);
        assert!(operator.poll_blocked(&mut cx).is_pending());
        assert_eq!(operator.get_output().unwrap(), None);

        operator.no_more_splits().unwrap();
        assert!(operator.poll_blocked(&mut cx).is_ready());

        // Zero splits: the engine exhausts immediately
        let pages = drain(&mut operator).await;
        assert!(pages.is_empty());
        assert_eq!(operator.state(), OperatorState::Finished);
    }

    #[tokio::test]
    async fn test_add_split_rejected_after_close_of_split_set() {
        let factory = Arc::new(TestFactory::new(HashMap::from([(
            "exchange://a".to_string(),
            vec![int64_page(&[1])],
        )])));
        let mut operator = operator_over(factory, 1024);

        operator.no_more_splits().unwrap();
        let err = operator
            .add_split(&RemoteSplit::new(TaskId::new("t.0"), "exchange://a"))
            .unwrap_err();
        assert!(matches!(err, Error::Internal(_)));
    }

    #[tokio::test]
    async fn test_source_stage_takes_no_input() {
        let factory = Arc::new(TestFactory::new(HashMap::new()));
        let mut operator = operator_over(factory, 1024);

        assert!(!operator.needs_input());
        assert!(operator.add_input(int64_page(&[1])).is_err());
    }

    #[tokio::test]
    async fn test_close_releases_clients_in_reverse_order() {
        let factory = Arc::new(TestFactory::new(HashMap::from([
            ("exchange://a".to_string(), vec![int64_page(&[1])]),
            ("exchange://b".to_string(), vec![int64_page(&[2])]),
            ("exchange://c".to_string(), vec![int64_page(&[3])]),
        ])));
        let mut operator = operator_over(Arc::clone(&factory), 1024);

        for (task, uri) in [
            ("t.0", "exchange://a"),
            ("t.1", "exchange://b"),
            ("t.2", "exchange://c"),
        ] {
            operator
                .add_split(&RemoteSplit::new(TaskId::new(task), uri))
                .unwrap();
        }
        operator.close().unwrap();

        assert_eq!(*factory.close_log.lock(), vec![2, 1, 0]);
        assert_eq!(operator.state(), OperatorState::Closed);
        // Idempotent
        operator.close().unwrap();
    }

    #[tokio::test]
    async fn test_close_aggregates_client_failures() {
        struct FailingClient;

        #[async_trait]
        impl ExchangeClient for FailingClient {
            async fn next_page(&self) -> Result<Option<SerializedPage>> {
                Ok(None)
            }

            fn close(&self) -> Result<()> {
                Err(Error::transport("socket already gone"))
            }
        }

        struct FailingFactory;

        impl ExchangeClientFactory for FailingFactory {
            fn create(
                &self,
                _split: &RemoteSplit,
                _memory: Arc<MemoryContext>,
                _on_failure: FailureCallback,
            ) -> Result<Arc<dyn ExchangeClient>> {
                Ok(Arc::new(FailingClient))
            }
        }

        let mut operator = MergeOperator::new(
            Arc::new(FailingFactory),
            vec![ColumnType::Int64],
            SortKey::new(vec![SortChannel::new(0, SortOrder::AscNullsFirst)]).unwrap(),
            vec![0],
            MergeConfig::default(),
            Arc::new(YieldSignal::new()),
            Arc::new(|_| {}),
        )
        .unwrap();

        for task in ["t.0", "t.1"] {
            operator
                .add_split(&RemoteSplit::new(TaskId::new(task), "exchange://x"))
                .unwrap();
        }
        let err = operator.close().unwrap_err();
        assert!(matches!(err, Error::Io(_)), "got {err}");
        assert!(err.to_string().contains("2 exchange client(s)"));
    }

    #[tokio::test]
    async fn test_projection_applies_to_output() {
        // Source sorted ascending on channel 0
        let sorted = Page::new(vec![
            Column::Int64(vec![Some(1), Some(2)]),
            Column::Utf8(vec![Some("one".into()), Some("two".into())]),
        ])
        .unwrap();

        struct OneShotFactory {
            page: Page,
        }

        impl ExchangeClientFactory for OneShotFactory {
            fn create(
                &self,
                _split: &RemoteSplit,
                _memory: Arc<MemoryContext>,
                _on_failure: FailureCallback,
            ) -> Result<Arc<dyn ExchangeClient>> {
                struct OneShotClient {
                    pages: Mutex<Vec<SerializedPage>>,
                }

                #[async_trait]
                impl ExchangeClient for OneShotClient {
                    async fn next_page(&self) -> Result<Option<SerializedPage>> {
                        Ok(self.pages.lock().pop())
                    }

                    fn close(&self) -> Result<()> {
                        Ok(())
                    }
                }

                Ok(Arc::new(OneShotClient {
                    pages: Mutex::new(vec![SerializedPage::serialize(&self.page).unwrap()]),
                }))
            }
        }

        let mut operator = MergeOperator::new(
            Arc::new(OneShotFactory { page: sorted }),
            vec![ColumnType::Int64, ColumnType::Utf8],
            SortKey::new(vec![SortChannel::new(0, SortOrder::AscNullsFirst)]).unwrap(),
            vec![1],
            MergeConfig::default(),
            Arc::new(YieldSignal::new()),
            Arc::new(|_| {}),
        )
        .unwrap();

        operator
            .add_split(&RemoteSplit::new(TaskId::new("t.0"), "exchange://a"))
            .unwrap();
        operator.no_more_splits().unwrap();

        let pages = drain(&mut operator).await;
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].column_count(), 1);
        assert_eq!(pages[0].value(0, 0), Some(ValueRef::Utf8("one")));
        assert_eq!(pages[0].value(0, 1), Some(ValueRef::Utf8("two")));
    }
}
