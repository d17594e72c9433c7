//! # Retry, Promote, Reattach
//!
//! A block the tangle has left behind gets a second chance in one of two
//! ways. A *promotion* is an empty block that approves it, pulling it back
//! into the tips. A *reattachment* posts its payload again under fresh
//! parents. The node says which one it wants through the block metadata.

use std::time::Duration;

use tracing::{debug, info};

use crate::block::id::BlockId;
use crate::block::Block;
use crate::client::Client;
use crate::config::{
    DEFAULT_RETRY_UNTIL_INCLUDED_INTERVAL, DEFAULT_RETRY_UNTIL_INCLUDED_MAX_AMOUNT, MAX_PARENTS,
};
use crate::error::{Error, Result};

impl Client {
    /// Promotes or reattaches `block_id`, whichever the node asks for.
    pub async fn retry(&self, block_id: &BlockId) -> Result<(BlockId, Block)> {
        let metadata = self.get_block_metadata(block_id).await?;
        if metadata.should_reattach() {
            self.reattach_unchecked(block_id).await
        } else if metadata.should_promote() {
            self.promote_unchecked(block_id).await
        } else {
            Err(Error::NoNeedPromoteOrReattach(block_id.to_string()))
        }
    }

    /// Retries `block_id` until one of its attachments is included.
    ///
    /// Checks every `interval` seconds, at most `max_attempts` times. The
    /// included block comes first in the result, followed by the other
    /// attachments made along the way.
    pub async fn retry_until_included(
        &self,
        block_id: &BlockId,
        interval: Option<u64>,
        max_attempts: Option<u64>,
    ) -> Result<Vec<(BlockId, Block)>> {
        let interval = Duration::from_secs(interval.unwrap_or(DEFAULT_RETRY_UNTIL_INCLUDED_INTERVAL));
        let max_attempts = max_attempts.unwrap_or(DEFAULT_RETRY_UNTIL_INCLUDED_MAX_AMOUNT);
        let mut attachments = vec![*block_id];
        let mut blocks: Vec<(BlockId, Block)> = Vec::new();

        for attempt in 1..=max_attempts {
            tokio::time::sleep(interval).await;

            for id in &attachments {
                let metadata = self.get_block_metadata(id).await?;
                if !metadata.is_included() {
                    continue;
                }
                info!(%id, attempt, "block included");
                let included = match blocks.iter().position(|(b, _)| b == id) {
                    Some(i) => blocks.remove(i),
                    None => (*id, self.get_block(id).await?),
                };
                let mut result = vec![included];
                result.extend(blocks);
                return Ok(result);
            }

            // Only the newest attachment is worth another push.
            let latest = attachments[attachments.len() - 1];
            let metadata = self.get_block_metadata(&latest).await?;
            let retried = if metadata.should_reattach() {
                Some(self.reattach_unchecked(&latest).await?)
            } else if metadata.should_promote() {
                self.promote_unchecked(&latest).await?;
                None
            } else {
                None
            };
            if let Some((id, block)) = retried {
                debug!(%latest, reattached = %id, "reattached");
                attachments.push(id);
                blocks.push((id, block));
            }
        }

        Err(Error::NotIncluded {
            block_id: block_id.to_string(),
            attempts: max_attempts,
        })
    }

    /// Reattaches `block_id` if the node says it should be.
    pub async fn reattach(&self, block_id: &BlockId) -> Result<(BlockId, Block)> {
        if self.get_block_metadata(block_id).await?.should_reattach() {
            self.reattach_unchecked(block_id).await
        } else {
            Err(Error::NoNeedPromoteOrReattach(block_id.to_string()))
        }
    }

    /// Posts the payload of `block_id` again under fresh tips.
    pub async fn reattach_unchecked(&self, block_id: &BlockId) -> Result<(BlockId, Block)> {
        let block = self.get_block(block_id).await?;
        self.finish_block(block.payload().cloned(), None).await
    }

    /// Promotes `block_id` if the node says it should be.
    pub async fn promote(&self, block_id: &BlockId) -> Result<(BlockId, Block)> {
        if self.get_block_metadata(block_id).await?.should_promote() {
            self.promote_unchecked(block_id).await
        } else {
            Err(Error::NoNeedPromoteOrReattach(block_id.to_string()))
        }
    }

    /// Posts an empty block whose parents are fresh tips plus `block_id`.
    pub async fn promote_unchecked(&self, block_id: &BlockId) -> Result<(BlockId, Block)> {
        let mut parents = self.get_tips().await?;
        parents.retain(|tip| tip != block_id);
        parents.sort();
        parents.dedup();
        parents.truncate(MAX_PARENTS - 1);
        parents.push(*block_id);
        self.finish_block(None, Some(parents)).await
    }
}
