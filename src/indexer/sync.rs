//! Chain sync orchestration: walks the chain from a durable cursor,
//! prepares blocks concurrently, commits them in order and survives
//! restarts, node hiccups and chain reorganizations.

use anyhow::{anyhow, bail};
use futures::stream::{self, StreamExt};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;

use super::event::{self, TransferOp};
use super::ledger::TokenLedger;
use super::{block, transaction};
use crate::config::IndexerConfig;
use crate::db::{self, IndexStore};
use crate::node::{ChainClient, NodeRole, RawTransactionInfo};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SyncState {
    Stopped,
    Starting,
    CatchingUp,
    Polling,
    Stopping,
}

impl SyncState {
    fn from_u8(v: u8) -> SyncState {
        match v {
            1 => SyncState::Starting,
            2 => SyncState::CatchingUp,
            3 => SyncState::Polling,
            4 => SyncState::Stopping,
            _ => SyncState::Stopped,
        }
    }
}

/// A fully fetched and normalized block, ready to commit.
struct PreparedBlock {
    block: db::Block,
    txs: Vec<db::Transaction>,
    events: Vec<(db::Event, Option<TransferOp>)>,
}

pub struct SyncEngine {
    node: Arc<dyn ChainClient>,
    store: Arc<dyn IndexStore>,
    ledger: Arc<TokenLedger>,
    cfg: IndexerConfig,
    state: AtomicU8,
}

impl SyncEngine {
    pub fn new(
        node: Arc<dyn ChainClient>,
        store: Arc<dyn IndexStore>,
        ledger: Arc<TokenLedger>,
        cfg: IndexerConfig,
    ) -> Self {
        SyncEngine {
            node,
            store,
            ledger,
            cfg,
            state: AtomicU8::new(SyncState::Stopped as u8),
        }
    }

    pub fn state(&self) -> SyncState {
        SyncState::from_u8(self.state.load(Ordering::SeqCst))
    }

    fn set_state(&self, state: SyncState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }

    pub async fn run(&self, stop_signal: CancellationToken) {
        self.set_state(SyncState::Starting);
        info!("starting chain sync");

        let mut cursor = match self.load_cursor(&stop_signal).await {
            Some(c) => c,
            None => {
                self.set_state(SyncState::Stopped);
                return;
            }
        };

        while !stop_signal.is_cancelled() {
            let head = match self.node.head_number(NodeRole::Fast).await {
                Ok(h) => h,
                Err(err) => {
                    warn!("head lookup failed: {}", err);
                    if !self.pause(self.cfg.retry_backoff(), &stop_signal).await {
                        break;
                    }
                    continue;
                }
            };

            let next = cursor.map_or(self.cfg.start_height, |c| c + 1);
            if next <= head {
                self.set_state(SyncState::CatchingUp);

                let upto = (next + self.cfg.batch_size - 1).min(head);
                match self.index_range(next, upto, &stop_signal).await {
                    Ok(Some(committed)) => cursor = Some(committed),
                    Ok(None) => {}
                    Err(err) => {
                        error!(
                            "indexing failed: from={} to={} err={}",
                            next, upto, err
                        );
                        if !self.pause(self.cfg.retry_backoff(), &stop_signal).await {
                            break;
                        }
                        // re-read the cursor in case part of the range landed
                        cursor = self.store.get_cursor().await.ok().flatten().or(cursor);
                    }
                }
            } else {
                self.set_state(SyncState::Polling);
                if let Err(err) = self.upgrade_unconfirmed(&stop_signal).await {
                    warn!("confirmation upgrade failed: {}", err);
                }
                if !self.pause(self.cfg.poll_interval(), &stop_signal).await {
                    break;
                }
            }
        }

        info!("chain sync finished");
        self.set_state(SyncState::Stopped);
    }

    /// Load the durable cursor, retrying until storage answers or shutdown
    /// is requested. `None` only on shutdown.
    async fn load_cursor(&self, stop_signal: &CancellationToken) -> Option<Option<i64>> {
        loop {
            match self.store.get_cursor().await {
                Ok(cursor) => return Some(cursor),
                Err(err) => {
                    error!("cursor load failed: {}", err);
                    if !self.pause(self.cfg.retry_backoff(), stop_signal).await {
                        return None;
                    }
                }
            }
        }
    }

    /// Sleep, returning false when shutdown interrupts the wait.
    async fn pause(&self, d: Duration, stop_signal: &CancellationToken) -> bool {
        tokio::select! {
            _ = sleep(d) => true,
            _ = stop_signal.cancelled() => false,
        }
    }

    /// Index `[from, to]`: blocks are fetched and normalized with bounded
    /// concurrency but committed strictly in height order, the cursor
    /// advancing after each commit. Returns the last committed height, or
    /// `None` when shutdown preempted the first commit.
    async fn index_range(
        &self,
        from: i64,
        to: i64,
        stop_signal: &CancellationToken,
    ) -> anyhow::Result<Option<i64>> {
        let workers = self.cfg.workers.max(1);
        let mut prepared = stream::iter(
            (from..=to).map(|height| self.prepare_block(height, stop_signal.clone())),
        )
        .buffered(workers);

        let mut committed = None;
        while let Some(next) = prepared.next().await {
            let block = match next {
                Some(b) => b,
                None => break,
            };

            // ancestry check against what we already committed
            if let Some(prev) = self.store.get_block(block.block.number - 1).await? {
                if prev.hash != block.block.parent_hash {
                    warn!(
                        "parent hash mismatch: height={} stored={} parent={}",
                        block.block.number, prev.hash, block.block.parent_hash
                    );
                    drop(prepared);
                    let rewound = self.recover_reorg(block.block.number).await?;
                    return Ok(Some(rewound));
                }
            }

            self.commit_block(&block).await?;
            self.store.set_cursor(block.block.number).await?;
            committed = Some(block.block.number);
        }
        Ok(committed)
    }

    /// Fetch and normalize one block, retrying transient node failures
    /// until shutdown. `None` only on shutdown.
    async fn prepare_block(
        &self,
        height: i64,
        stop_signal: CancellationToken,
    ) -> Option<PreparedBlock> {
        loop {
            if stop_signal.is_cancelled() {
                return None;
            }
            match self.fetch_block(height).await {
                Ok(block) => return Some(block),
                Err(err) => {
                    warn!("block fetch failed: height={} err={}", height, err);
                    tokio::select! {
                        _ = sleep(self.cfg.retry_backoff()) => {}
                        _ = stop_signal.cancelled() => return None,
                    }
                }
            }
        }
    }

    /// Confirmed node first; when the height is not finalized yet, fall
    /// back to the fast node and mark everything unconfirmed.
    async fn fetch_block(&self, height: i64) -> anyhow::Result<PreparedBlock> {
        let (raw, infos, unconfirmed) =
            match self.node.block_by_num(NodeRole::Confirmed, height).await? {
                Some(raw) => {
                    let infos = self
                        .node
                        .transaction_infos(NodeRole::Confirmed, height)
                        .await?;
                    (raw, infos, false)
                }
                None => {
                    let raw = self
                        .node
                        .block_by_num(NodeRole::Fast, height)
                        .await?
                        .ok_or_else(|| anyhow!("block not available: height={}", height))?;
                    let infos = self.node.transaction_infos(NodeRole::Fast, height).await?;
                    (raw, infos, true)
                }
            };

        let info_map: HashMap<String, RawTransactionInfo> =
            infos.iter().map(|i| (i.id.clone(), i.clone())).collect();

        let block = block::build_block(&raw);
        let txs = transaction::build_transactions(&raw, &info_map);
        let mut events = Vec::new();
        for info in &infos {
            events.extend(event::build_events(
                info,
                block.number,
                block.timestamp,
                unconfirmed,
            ));
        }

        Ok(PreparedBlock { block, txs, events })
    }

    /// Persist one block. Re-running over already indexed data is safe:
    /// every write is an upsert and the ledger records a marker on the
    /// event row in the same store transaction as the balance deltas, so
    /// a retried commit never applies a transfer twice.
    async fn commit_block(&self, prepared: &PreparedBlock) -> anyhow::Result<()> {
        self.store.upsert_block(&prepared.block).await?;
        for tx in &prepared.txs {
            self.store.upsert_transaction(tx).await?;
        }
        for (event, op) in &prepared.events {
            self.store.upsert_event(event).await?;
            if let Some(op) = op {
                self.ledger
                    .apply(
                        op,
                        event.block_timestamp,
                        Some((&event.transaction_id, event.event_index)),
                    )
                    .await?;
            }
        }
        debug!(
            "block committed: height={} txs={} events={}",
            prepared.block.number,
            prepared.txs.len(),
            prepared.events.len()
        );
        Ok(())
    }

    /// A block's ancestry disagreed with what we stored. Walk back to the
    /// last height where stored and chain hashes agree, discard everything
    /// above it, reverse the discarded transfers and rewind the cursor.
    async fn recover_reorg(&self, detected_at: i64) -> anyhow::Result<i64> {
        let mut height = detected_at - 1;
        while height >= 0 {
            let stored = match self.store.get_block(height).await? {
                Some(b) => b,
                None => break,
            };
            if stored.hash == self.chain_hash(height).await? {
                break;
            }
            height -= 1;
        }
        let divergence = height;

        let removed = self.store.delete_blocks_from(divergence + 1).await?;
        for event in removed.iter().rev() {
            if let Some(op) = event::transfer_op_from_event(event) {
                self.ledger.revert(&op, event.block_timestamp).await?;
            }
        }
        self.store.set_cursor(divergence).await?;

        error!(
            "chain reorganization handled: detected_at={} rewound_to={} events_reversed={}",
            detected_at,
            divergence,
            removed.len()
        );
        Ok(divergence)
    }

    async fn chain_hash(&self, height: i64) -> anyhow::Result<String> {
        let raw = match self.node.block_by_num(NodeRole::Confirmed, height).await? {
            Some(raw) => Some(raw),
            None => self.node.block_by_num(NodeRole::Fast, height).await?,
        };
        raw.map(|b| b.block_id)
            .ok_or_else(|| anyhow!("block not available: height={}", height))
    }

    /// Re-check blocks indexed from the fast node against the confirmed
    /// node, flipping their events to confirmed once the height finalizes.
    /// A hash disagreement at this point is a reorg of the fast tail.
    async fn upgrade_unconfirmed(&self, stop_signal: &CancellationToken) -> anyhow::Result<()> {
        let confirmed_head = match self.node.head_number(NodeRole::Confirmed).await {
            Ok(h) => h,
            Err(err) => {
                warn!("confirmed head lookup failed: {}", err);
                return Ok(());
            }
        };

        let heights = self
            .store
            .unconfirmed_blocks(confirmed_head, self.cfg.batch_size)
            .await?;
        for height in heights {
            if stop_signal.is_cancelled() {
                break;
            }
            let raw = match self.node.block_by_num(NodeRole::Confirmed, height).await? {
                Some(raw) => raw,
                None => break,
            };
            if let Some(stored) = self.store.get_block(height).await? {
                if stored.hash != raw.block_id {
                    self.recover_reorg(height + 1).await?;
                    break;
                }
            }

            let infos = self
                .node
                .transaction_infos(NodeRole::Confirmed, height)
                .await?;
            let info_map: HashMap<String, RawTransactionInfo> =
                infos.iter().map(|i| (i.id.clone(), i.clone())).collect();

            let block = block::build_block(&raw);
            let txs = transaction::build_transactions(&raw, &info_map);
            let mut events = Vec::new();
            for info in &infos {
                events.extend(event::build_events(info, block.number, block.timestamp, false));
            }
            self.commit_block(&PreparedBlock { block, txs, events })
                .await?;
            debug!("block confirmed: height={}", height);
        }
        Ok(())
    }
}

/// Owns the sync task lifecycle: single running instance, cooperative
/// shutdown with a hard deadline.
pub struct SyncOrchestrator {
    engine: Arc<SyncEngine>,
    deadline: Duration,
    running: tokio::sync::Mutex<Option<(CancellationToken, JoinHandle<()>)>>,
}

impl SyncOrchestrator {
    pub fn new(
        node: Arc<dyn ChainClient>,
        store: Arc<dyn IndexStore>,
        ledger: Arc<TokenLedger>,
        cfg: IndexerConfig,
    ) -> Self {
        let deadline = cfg.shutdown_deadline();
        SyncOrchestrator {
            engine: Arc::new(SyncEngine::new(node, store, ledger, cfg)),
            deadline,
            running: tokio::sync::Mutex::new(None),
        }
    }

    pub fn state(&self) -> SyncState {
        self.engine.state()
    }

    pub async fn start(&self) -> anyhow::Result<()> {
        let mut running = self.running.lock().await;
        if running.is_some() {
            bail!("sync is already running");
        }
        let cancel = CancellationToken::new();
        let engine = self.engine.clone();
        let token = cancel.clone();
        let handle = tokio::spawn(async move { engine.run(token).await });
        *running = Some((cancel, handle));
        Ok(())
    }

    /// Request shutdown and wait for the sync task. The task gets the
    /// configured deadline to finish its current block before it is
    /// aborted.
    pub async fn stop(&self) -> anyhow::Result<()> {
        let Some((cancel, mut handle)) = self.running.lock().await.take() else {
            return Ok(());
        };
        self.engine.set_state(SyncState::Stopping);
        cancel.cancel();
        match timeout(self.deadline, &mut handle).await {
            Ok(res) => res?,
            Err(_) => {
                error!("sync task missed the shutdown deadline, aborting");
                handle.abort();
                self.engine.set_state(SyncState::Stopped);
            }
        }
        Ok(())
    }
}
