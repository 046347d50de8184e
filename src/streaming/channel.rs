//! Both directions of the perception channel, independent of transport.

use crate::error::ChannelError;
use crate::state::{PerceptionUpdate, PerceptionWriter};
use futures::{Stream, StreamExt};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

static NEXT_SINK_ID: AtomicU64 = AtomicU64::new(1);

/// A compressed still ready to go out.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedFrame {
    pub jpeg: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Sent,
    /// Previous frame still in flight; this one was dropped.
    Busy,
    Closed,
}

/// Outbound half of the channel. Capacity is one frame: when the transport
/// has not picked up the previous frame, new ones are dropped, never queued.
#[derive(Debug, Clone)]
pub struct FrameSink {
    id: u64,
    tx: mpsc::Sender<EncodedFrame>,
}

impl FrameSink {
    pub fn pair() -> (FrameSink, mpsc::Receiver<EncodedFrame>) {
        let (tx, rx) = mpsc::channel(1);
        let id = NEXT_SINK_ID.fetch_add(1, Ordering::Relaxed);
        (FrameSink { id, tx }, rx)
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_open(&self) -> bool {
        !self.tx.is_closed()
    }

    pub fn try_send(&self, frame: EncodedFrame) -> SendOutcome {
        match self.tx.try_send(frame) {
            Ok(()) => SendOutcome::Sent,
            Err(TrySendError::Full(_)) => SendOutcome::Busy,
            Err(TrySendError::Closed(_)) => SendOutcome::Closed,
        }
    }

    pub async fn closed(&self) {
        self.tx.closed().await
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InboundStats {
    pub applied: u64,
    pub unchanged: u64,
    pub malformed: u64,
}

/// Applies inbound documents to the shared state in delivery order until
/// the stream ends or fails. Malformed documents are dropped.
pub async fn consume_updates<S>(inbound: S, writer: PerceptionWriter) -> InboundStats
where
    S: Stream<Item = Result<String, ChannelError>>,
{
    let mut inbound = std::pin::pin!(inbound);
    let mut stats = InboundStats::default();

    while let Some(item) = inbound.next().await {
        let document = match item {
            Ok(document) => document,
            Err(e) => {
                warn!("perception channel failed: {e}");
                break;
            }
        };

        match PerceptionUpdate::parse(&document) {
            Ok(update) => {
                if writer.apply(update) {
                    stats.applied += 1;
                } else {
                    stats.unchanged += 1;
                }
            }
            Err(e) => {
                debug!("dropping malformed perception message: {e}");
                stats.malformed += 1;
            }
        }
    }

    info!(
        applied = stats.applied,
        unchanged = stats.unchanged,
        malformed = stats.malformed,
        "perception channel closed"
    );
    stats
}

/// Runs [`consume_updates`] on its own task. The writer lives and dies with it.
pub fn spawn_inbound<S>(inbound: S, writer: PerceptionWriter) -> JoinHandle<InboundStats>
where
    S: Stream<Item = Result<String, ChannelError>> + Send + 'static,
{
    tokio::spawn(consume_updates(inbound, writer))
}
