// Places records into the open block, pulling fresh blocks from the pool as blocks fill.
use std::sync::Arc;

use crate::core::block::{Block, BlockChain, BlockId};
use crate::core::error::{Error, ErrorKind};
use crate::core::monitor::{PoolMonitor, PoolStats};
use crate::core::pool::{ObjectPool, PoolOptions};
use crate::core::record::EventRecord;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct BlockRef {
    pub id: BlockId,
    /// Set when this allocation linked a new block at the head of the chain.
    pub linked: bool,
}

#[derive(Debug)]
enum OpenBlock {
    None,
    // Checked out from the pool but not linked until its first record lands.
    Staged(Block),
    Linked(BlockId),
}

#[derive(Debug)]
pub struct BlockPool {
    pool: ObjectPool<Block>,
    open: OpenBlock,
}

impl BlockPool {
    pub fn new(block_capacity: usize) -> Self {
        Self {
            pool: ObjectPool::new("blocks", PoolOptions::unbounded(), move || {
                Block::new(block_capacity)
            }),
            open: OpenBlock::None,
        }
    }

    pub fn set_monitor(&mut self, monitor: Option<Arc<dyn PoolMonitor>>) {
        self.pool.set_monitor(monitor);
    }

    pub fn allocate_record(
        &mut self,
        chain: &mut BlockChain,
        record: EventRecord,
    ) -> Result<BlockRef, Error> {
        let open = std::mem::replace(&mut self.open, OpenBlock::None);
        let (id, linked) = match open {
            OpenBlock::Linked(id) => {
                let block = chain.get_mut(id).ok_or_else(|| {
                    Error::new(ErrorKind::Internal).with_message("open block is no longer linked")
                })?;
                block.push(record)?;
                (id, false)
            }
            OpenBlock::Staged(mut block) => {
                block.push(record)?;
                (chain.link_newest(block), true)
            }
            OpenBlock::None => {
                let mut block = self.pool.allocate()?;
                block.push(record)?;
                (chain.link_newest(block), true)
            }
        };

        let full = chain.get(id).is_some_and(|block| !block.has_capacity());
        self.open = if full {
            // Full blocks become purge candidates; never keep one as the write target.
            OpenBlock::Staged(self.pool.allocate()?)
        } else {
            OpenBlock::Linked(id)
        };
        Ok(BlockRef { id, linked })
    }

    pub fn free(&mut self, block: Block) {
        self.pool.free(block);
    }

    pub fn stats(&self) -> PoolStats {
        self.pool.stats()
    }

    pub fn report_statistics(&self) {
        self.pool.report_statistics();
    }
}
