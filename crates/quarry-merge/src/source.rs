//! Remote page sources
//!
//! An [`ExchangeClient`] pulls serialized pages from one remote task; a
//! [`PageSource`] adapts that into a lazy stream of decoded pages,
//! validating each page against the declared schema and recording
//! network-input counts. Transport details (framing, retries) live behind
//! the client trait.

use crate::page::{ColumnType, Page, SerializedPage, validate_page};
use crate::stats::OperatorStats;
use async_trait::async_trait;
use futures::stream::{self, BoxStream, Stream, StreamExt};
use quarry_common::{Error, Result, TaskId};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

/// Callback invoked when an exchange client fails; wired to the
/// surrounding task so transport failures surface to the driver
pub type FailureCallback = Arc<dyn Fn(&Error) + Send + Sync>;

/// Location of one remote producer
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RemoteSplit {
    /// Task producing the data
    pub task_id: TaskId,
    /// Exchange endpoint of that task
    pub uri: String,
}

impl RemoteSplit {
    /// Create a new remote split
    #[must_use]
    pub fn new(task_id: TaskId, uri: impl Into<String>) -> Self {
        Self {
            task_id,
            uri: uri.into(),
        }
    }
}

/// Client pulling the serialized-page sequence of one remote task
///
/// Implementations are internally synchronized: `next_page` may be called
/// from a stream adapter while `close` is called by the operator shell.
#[async_trait]
pub trait ExchangeClient: Send + Sync {
    /// Pull the next serialized page, or `None` once the remote task has
    /// produced its last page
    async fn next_page(&self) -> Result<Option<SerializedPage>>;

    /// Release the client's resources; subsequent `next_page` calls
    /// return `None`
    fn close(&self) -> Result<()>;
}

/// Creates one exchange client per remote split
pub trait ExchangeClientFactory: Send + Sync {
    /// Create a client for `split`, charging its buffers to `memory` and
    /// reporting transport failures through `on_failure`
    fn create(
        &self,
        split: &RemoteSplit,
        memory: Arc<crate::memory::MemoryContext>,
        on_failure: FailureCallback,
    ) -> Result<Arc<dyn ExchangeClient>>;
}

/// Lazy, finite, non-restartable sequence of pages from one producer
pub struct PageSource {
    stream: BoxStream<'static, Result<Page>>,
}

impl PageSource {
    /// Adapt an exchange client into a page source
    ///
    /// Every decoded page is validated against `schema`; its envelope
    /// byte and row counts are recorded into `stats`.
    #[must_use]
    pub fn from_client(
        client: Arc<dyn ExchangeClient>,
        schema: Vec<ColumnType>,
        stats: Arc<OperatorStats>,
    ) -> Self {
        let stream = stream::try_unfold(
            (client, schema, stats),
            |(client, schema, stats)| async move {
                match client.next_page().await? {
                    Some(serialized) => {
                        let page = serialized.deserialize()?;
                        validate_page(&page, &schema)?;
                        stats.record_input(serialized.uncompressed_bytes as u64, page.row_count() as u64);
                        Ok(Some((page, (client, schema, stats))))
                    }
                    None => Ok(None),
                }
            },
        )
        .boxed();
        Self { stream }
    }

    /// Wrap an arbitrary page stream as a source
    #[must_use]
    pub fn from_stream(stream: BoxStream<'static, Result<Page>>) -> Self {
        Self { stream }
    }

    /// Source over an in-memory sequence of pages
    #[must_use]
    pub fn from_pages(pages: Vec<Page>) -> Self {
        Self {
            stream: stream::iter(pages.into_iter().map(Ok)).boxed(),
        }
    }
}

impl Stream for PageSource {
    type Item = Result<Page>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.stream.poll_next_unpin(cx)
    }
}
