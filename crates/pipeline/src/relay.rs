//! Audio relay queue
//!
//! Per-call FIFO between the producing turn task and the single consumer
//! serving audio to the telephony side. The queue lives for the whole call;
//! turns are delimited by `EndOfTurn` and the call by `EndOfCall`.

use futures::Stream;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc;
use trifivend_core::AudioChunk;

/// Item carried by the relay queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayItem {
    Audio(AudioChunk),
    /// No more audio for the current turn; the queue stays open
    EndOfTurn,
    /// No more audio for the call
    EndOfCall,
}

#[derive(Debug)]
struct ProducerState {
    /// `None` once the call has ended
    tx: Option<mpsc::UnboundedSender<RelayItem>>,
    /// A turn has pushed or may push audio without its sentinel yet
    turn_open: bool,
}

/// Unbounded per-call audio queue
///
/// Producer operations never block. Ordering between turns is guaranteed by
/// the orchestrator's cancel-then-replace protocol, not by the queue.
#[derive(Debug)]
pub struct AudioRelayQueue {
    producer: Mutex<ProducerState>,
    rx: Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<RelayItem>>>,
}

impl Default for AudioRelayQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioRelayQueue {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            producer: Mutex::new(ProducerState {
                tx: Some(tx),
                turn_open: false,
            }),
            rx: Arc::new(tokio::sync::Mutex::new(rx)),
        }
    }

    /// Start a new turn, closing a previous turn that never got its sentinel
    pub fn begin_turn(&self) {
        let mut producer = self.producer.lock();
        if producer.turn_open {
            Self::send(&producer, RelayItem::EndOfTurn);
        }
        producer.turn_open = producer.tx.is_some();
    }

    /// Append an audio chunk to the current turn
    ///
    /// Returns false when the call has already ended.
    pub fn push_audio(&self, chunk: AudioChunk) -> bool {
        let mut producer = self.producer.lock();
        if producer.tx.is_none() {
            return false;
        }
        producer.turn_open = true;
        Self::send(&producer, RelayItem::Audio(chunk))
    }

    /// Close the current turn; repeated calls push a single sentinel
    pub fn end_turn(&self) -> bool {
        let mut producer = self.producer.lock();
        if !producer.turn_open {
            return false;
        }
        producer.turn_open = false;
        Self::send(&producer, RelayItem::EndOfTurn)
    }

    /// Close the queue for good, unblocking any waiting consumer
    pub fn end_call(&self) {
        let mut producer = self.producer.lock();
        Self::send(&producer, RelayItem::EndOfCall);
        producer.turn_open = false;
        producer.tx = None;
    }

    pub fn is_closed(&self) -> bool {
        self.producer.lock().tx.is_none()
    }

    fn send(producer: &ProducerState, item: RelayItem) -> bool {
        match &producer.tx {
            Some(tx) => tx.send(item).is_ok(),
            None => false,
        }
    }

    /// Wait for the next item
    ///
    /// Once the call has ended and the queue is drained this keeps returning
    /// `EndOfCall` instead of blocking.
    pub async fn pop(&self) -> RelayItem {
        let mut rx = self.rx.lock().await;
        rx.recv().await.unwrap_or(RelayItem::EndOfCall)
    }

    /// Audio for one turn, ending at the next `EndOfTurn` or `EndOfCall`
    ///
    /// Holds the consumer side for as long as the stream is alive, so a
    /// second concurrent poll waits for the first to finish.
    pub fn poll_audio(&self) -> impl Stream<Item = AudioChunk> + Send + 'static {
        let rx = self.rx.clone();
        async_stream::stream! {
            let mut rx = rx.lock_owned().await;
            while let Some(item) = rx.recv().await {
                match item {
                    RelayItem::Audio(chunk) => yield chunk,
                    RelayItem::EndOfTurn | RelayItem::EndOfCall => break,
                }
            }
        }
    }
}
