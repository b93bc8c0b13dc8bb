//! Single-writer ingest actor.
//!
//! All book mutation happens here: receipt sequencing, the matching pass,
//! settlement registration and proof-queue dispatch. Queries receive
//! copies over oneshot replies, so readers never observe a book mid-sort.

use std::collections::VecDeque;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::book::{BookSnapshot, OrderBook};
use crate::events::{EventBus, OrderMatched, OrderSubmitted, PoolEvent};
use crate::order::{now_ms, Match, PrivateOrder};
use crate::settlement::SettlementCoordinator;
use crate::telemetry::Telemetry;

pub enum IngestCommand {
    Submit {
        order: PrivateOrder,
        reply: oneshot::Sender<SubmitOutcome>,
    },
    Snapshot {
        asset: String,
        reply: oneshot::Sender<BookSnapshot>,
    },
    CompletedMatches {
        reply: oneshot::Sender<Vec<Match>>,
    },
    /// Administrative drain of matches still waiting for a proof worker
    /// slot; replies with the number dispatched.
    ProcessPending {
        reply: oneshot::Sender<usize>,
    },
    SweepExpired,
}

#[derive(Debug)]
pub struct SubmitOutcome {
    pub matches: Vec<Match>,
    pub no_match_reason: Option<String>,
    pub book: BookSnapshot,
}

pub struct IngestActor {
    book: OrderBook,
    completed: Vec<Match>,
    pending: VecDeque<Match>,
    sequence: u64,
    match_tx: mpsc::Sender<Match>,
    coordinator: Arc<SettlementCoordinator>,
    bus: Arc<EventBus>,
    telemetry: Telemetry,
}

impl IngestActor {
    pub fn spawn(
        queue_depth: usize,
        match_tx: mpsc::Sender<Match>,
        coordinator: Arc<SettlementCoordinator>,
        bus: Arc<EventBus>,
        telemetry: Telemetry,
    ) -> (mpsc::Sender<IngestCommand>, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(queue_depth);
        let actor = Self {
            book: OrderBook::default(),
            completed: Vec::new(),
            pending: VecDeque::new(),
            sequence: 0,
            match_tx,
            coordinator,
            bus,
            telemetry,
        };
        let task = tokio::spawn(actor.run(rx));
        (tx, task)
    }

    async fn run(mut self, mut rx: mpsc::Receiver<IngestCommand>) {
        while let Some(command) = rx.recv().await {
            match command {
                IngestCommand::Submit { order, reply } => {
                    let outcome = self.submit(order);
                    let _ = reply.send(outcome);
                }
                IngestCommand::Snapshot { asset, reply } => {
                    let _ = reply.send(self.book.snapshot(&asset));
                }
                IngestCommand::CompletedMatches { reply } => {
                    let _ = reply.send(self.completed.clone());
                }
                IngestCommand::ProcessPending { reply } => {
                    let dispatched = self.flush_pending();
                    let _ = reply.send(dispatched);
                }
                IngestCommand::SweepExpired => {
                    let removed = self.book.sweep_expired(now_ms());
                    if removed > 0 {
                        info!(removed, "swept expired orders");
                        self.telemetry.set_book_depth(self.book.depth());
                    }
                }
            }
        }
        debug!("ingest actor stopped");
    }

    fn submit(&mut self, mut order: PrivateOrder) -> SubmitOutcome {
        self.sequence += 1;
        order.timestamp = self.sequence;
        self.telemetry.record_order(true);
        self.bus.publish(&PoolEvent::OrderSubmitted(OrderSubmitted {
            asset: order.asset_address.clone(),
            trader: order.trader.clone(),
            side: order.side.into(),
            quantity: order.quantity.to_string(),
            price: order.price.to_string(),
            timestamp: now_ms(),
        }));

        let asset = order.asset_address.clone();
        self.book.insert(order);
        let outcome = self.book.match_asset(&asset, now_ms());
        for matched in &outcome.matches {
            self.coordinator.register(matched);
            self.bus.publish(&PoolEvent::OrderMatched(OrderMatched {
                match_id: matched.match_id.clone(),
                buyer_address: matched.buyer().to_string(),
                seller_address: matched.seller().to_string(),
                asset: matched.asset().to_string(),
                execution_price: matched.execution_price.to_string(),
                execution_quantity: matched.execution_quantity.to_string(),
                timestamp: matched.timestamp,
            }));
            self.telemetry.record_match();
            self.completed.push(matched.clone());
            self.dispatch(matched.clone());
        }
        self.flush_pending();
        self.telemetry.set_book_depth(self.book.depth());

        SubmitOutcome {
            matches: outcome.matches,
            no_match_reason: outcome.no_match_reason,
            book: self.book.snapshot(&asset),
        }
    }

    fn dispatch(&mut self, matched: Match) {
        match self.match_tx.try_send(matched) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(matched)) => {
                debug!(match_id = %matched.match_id, "proof queue full; match parked");
                self.pending.push_back(matched);
            }
            Err(mpsc::error::TrySendError::Closed(matched)) => {
                warn!(match_id = %matched.match_id, "proof queue closed; match dropped");
            }
        }
        self.telemetry.set_pending_matches(self.pending.len());
    }

    fn flush_pending(&mut self) -> usize {
        let mut dispatched = 0;
        while let Some(matched) = self.pending.pop_front() {
            match self.match_tx.try_send(matched) {
                Ok(()) => dispatched += 1,
                Err(mpsc::error::TrySendError::Full(matched)) => {
                    self.pending.push_front(matched);
                    break;
                }
                Err(mpsc::error::TrySendError::Closed(matched)) => {
                    warn!(match_id = %matched.match_id, "proof queue closed; match dropped");
                    break;
                }
            }
        }
        self.telemetry.set_pending_matches(self.pending.len());
        dispatched
    }
}
