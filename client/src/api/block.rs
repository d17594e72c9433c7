//! # Block Finishing
//!
//! Turning a payload into an accepted block:
//!
//! 1. parents: the caller's, or fresh tips from the node,
//! 2. proof of work: local, or remote with optional local fallback,
//! 3. post.
//!
//! Local mining runs on the blocking pool. When the parents came from tips
//! and mining outlasts the tips interval, the tips are fetched again and
//! mining restarts on the new parents, so the block does not attach to a
//! stale part of the tangle.

use std::sync::atomic::Ordering;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::transaction::{tagged_data, TransactionPipeline};
use super::types::BlockOptions;
use crate::block::id::BlockId;
use crate::block::payload::Payload;
use crate::block::pow::Miner;
use crate::block::{Block, Parents};
use crate::client::Client;
use crate::config::MAX_PARENTS;
use crate::error::{Error, Result};
use crate::network_info::NetworkInfo;
use crate::secret::SecretManager;

enum Mined {
    Done(Block),
    TipsExpired,
}

impl Client {
    /// Parents for a new block: sorted, deduplicated, at most
    /// [`MAX_PARENTS`].
    async fn fetch_parents(&self) -> Result<Parents> {
        let mut tips = self.get_tips().await?;
        tips.sort();
        tips.dedup();
        tips.truncate(MAX_PARENTS);
        Parents::from_vec(tips)
    }

    async fn mine_once(
        &self,
        block: Block,
        min_pow_score: u32,
        deadline: Option<Duration>,
    ) -> Result<Mined> {
        let miner = Miner::new(self.inner.pow_workers);
        let cancel = miner.cancel_handle();
        let bytes = block.bytes_without_nonce();
        let mut task = tokio::task::spawn_blocking(move || miner.mine(&bytes, min_pow_score));

        let joined = match deadline {
            Some(deadline) => tokio::select! {
                joined = &mut task => joined,
                _ = tokio::time::sleep(deadline) => {
                    cancel.store(true, Ordering::Relaxed);
                    let _ = task.await;
                    return Ok(Mined::TipsExpired);
                }
            },
            None => task.await,
        };
        let nonce = joined
            .map_err(|e| Error::Validation(format!("proof of work task failed: {e}")))?
            .ok_or_else(|| Error::Validation("proof of work was cancelled".into()))?;
        Ok(Mined::Done(block.with_nonce(nonce)))
    }

    /// Mines locally. Parents from tips are refreshed every tips interval.
    async fn mine_locally(
        &self,
        info: &NetworkInfo,
        payload: Option<Payload>,
        parents: Option<Parents>,
    ) -> Result<Block> {
        let refresh = parents.is_none() && info.tips_interval > 0;
        let deadline = refresh.then(|| Duration::from_secs(info.tips_interval));
        let mut parents = match parents {
            Some(parents) => parents,
            None => self.fetch_parents().await?,
        };
        loop {
            let block = Block::new(info.protocol_version, parents, payload.clone())?;
            match self.mine_once(block, info.min_pow_score, deadline).await? {
                Mined::Done(block) => return Ok(block),
                Mined::TipsExpired => {
                    debug!("tips expired while mining, refreshing parents");
                    parents = self.fetch_parents().await?;
                }
            }
        }
    }

    /// Asks the node to mine and post. Returns the block as the node
    /// stored it.
    async fn post_remote_pow(
        &self,
        info: &NetworkInfo,
        payload: Option<Payload>,
        parents: Option<Parents>,
    ) -> Result<(BlockId, Block)> {
        let parents = match parents {
            Some(parents) => parents,
            None => self.fetch_parents().await?,
        };
        let unmined = Block::new(info.protocol_version, parents, payload)?;
        // One node, no failover: slow proof of work says nothing about sync.
        let node = self.get_node()?;
        let timeout = info.remote_pow_timeout;
        let block_id = tokio::time::timeout(
            timeout,
            self.node_manager().api().post_block_remote_pow(&node, &unmined, timeout),
        )
        .await
        .unwrap_or(Err(Error::Timeout(timeout)))?;
        let block = self.get_block(&block_id).await?;
        Ok((block_id, block))
    }

    /// Attaches `payload` to the tangle and returns the accepted block.
    pub async fn finish_block(
        &self,
        payload: Option<Payload>,
        parents: Option<Vec<BlockId>>,
    ) -> Result<(BlockId, Block)> {
        let info = self.get_network_info().await?;
        let parents = parents.map(Parents::from_vec).transpose()?;

        if !info.local_pow {
            match self.post_remote_pow(&info, payload.clone(), parents.clone()).await {
                Err(Error::Timeout(after)) if info.fallback_to_local_pow => {
                    warn!(?after, "remote proof of work timed out, mining locally");
                }
                other => return other,
            }
        }

        let block = self.mine_locally(&info, payload, parents).await?;
        let block_id = self.post_block(&block).await?;
        info!(%block_id, "block posted");
        Ok((block_id, block))
    }

    /// Builds a block from `options` and posts it: a transaction when
    /// outputs are given, otherwise a tagged-data (or empty) block.
    pub async fn build_and_post_block(
        &self,
        secret_manager: Option<&SecretManager>,
        options: BlockOptions,
    ) -> Result<(BlockId, Block)> {
        if options.outputs.is_empty() && options.inputs.is_none() {
            let payload = tagged_data(&options)?.map(Payload::from);
            return self.finish_block(payload, options.parents).await;
        }
        let secret_manager = secret_manager.ok_or_else(|| {
            Error::Validation("sending outputs needs a secret manager".into())
        })?;
        TransactionPipeline::new(self, secret_manager, options).run().await
    }

    /// Posts an already built payload.
    pub async fn submit_payload(&self, payload: Payload) -> Result<(BlockId, Block)> {
        self.finish_block(Some(payload), None).await
    }
}
