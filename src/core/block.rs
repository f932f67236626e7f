// Bounded FIFO blocks of event records and the id-addressed chain that links them.
use std::collections::VecDeque;

use crate::core::error::{Error, ErrorKind};
use crate::core::pool::Pooled;
use crate::core::record::{EventRecord, SequenceToken, StreamId};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct BlockId(pub(crate) u64);

#[derive(Debug)]
pub struct Block {
    id: BlockId,
    capacity: usize,
    records: Vec<EventRecord>,
    read_offset: usize,
}

impl Block {
    pub fn new(capacity: usize) -> Self {
        Self {
            id: BlockId(0),
            capacity,
            records: Vec::with_capacity(capacity),
            read_offset: 0,
        }
    }

    pub fn id(&self) -> BlockId {
        self.id
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn write_offset(&self) -> usize {
        self.records.len()
    }

    pub fn has_capacity(&self) -> bool {
        self.write_offset() < self.capacity
    }

    pub fn is_empty(&self) -> bool {
        self.read_offset >= self.write_offset()
    }

    /// No live records and no room for more; only drained blocks go back to the pool.
    pub fn is_drained(&self) -> bool {
        self.is_empty() && !self.has_capacity()
    }

    pub fn len(&self) -> usize {
        self.write_offset() - self.read_offset
    }

    pub fn push(&mut self, record: EventRecord) -> Result<(), Error> {
        if !self.has_capacity() {
            return Err(Error::new(ErrorKind::BlockFull)
                .with_message(format!("block holds {} records", self.capacity)));
        }
        self.records.push(record);
        Ok(())
    }

    /// Drops the oldest live record; returns whether live records remain.
    pub fn pop_oldest(&mut self) -> bool {
        if self.is_empty() {
            return false;
        }
        self.read_offset += 1;
        !self.is_empty()
    }

    pub fn record_at(&self, index: usize) -> Result<&EventRecord, Error> {
        if index < self.read_offset || index >= self.write_offset() {
            return Err(Error::new(ErrorKind::OutOfRange).with_message(format!(
                "index {index} outside live range {}..{}",
                self.read_offset,
                self.write_offset()
            )));
        }
        Ok(&self.records[index])
    }

    pub fn oldest_index(&self) -> usize {
        self.read_offset
    }

    /// Index of the newest record; only meaningful when the block is non-empty.
    pub fn newest_index(&self) -> usize {
        self.write_offset().saturating_sub(1)
    }

    pub fn oldest(&self) -> Option<&EventRecord> {
        if self.is_empty() {
            return None;
        }
        self.records.get(self.read_offset)
    }

    pub fn newest(&self) -> Option<&EventRecord> {
        if self.is_empty() {
            return None;
        }
        self.records.last()
    }

    /// Index of the next record on `stream_id` at or after `start`.
    pub fn find_first(&self, stream_id: StreamId, start: usize) -> Option<usize> {
        let start = start.max(self.read_offset);
        self.records
            .get(start..)?
            .iter()
            .position(|record| record.stream_id == stream_id)
            .map(|offset| start + offset)
    }

    /// Scans backward from the newest record for the first one ordered at or before `token`.
    pub fn index_of_first_at_or_before(&self, token: SequenceToken) -> Result<usize, Error> {
        (self.read_offset..self.write_offset())
            .rev()
            .find(|&index| self.records[index].token() <= token)
            .ok_or_else(|| {
                Error::new(ErrorKind::OutOfRange)
                    .with_message("no record at or before token in block")
                    .with_token(token)
            })
    }

    pub fn live(&self) -> &[EventRecord] {
        &self.records[self.read_offset..]
    }
}

impl Pooled for Block {
    fn reset(&mut self) {
        self.id = BlockId(0);
        self.records.clear();
        self.read_offset = 0;
    }
}

/// Blocks in arrival order, addressed by monotonically increasing ids.
///
/// The back of the deque is the newest block. Ids are contiguous because
/// blocks are only linked at the head and unlinked at the tail.
#[derive(Debug, Default)]
pub struct BlockChain {
    blocks: VecDeque<Block>,
    next_id: u64,
}

impl BlockChain {
    pub fn new() -> Self {
        Self {
            blocks: VecDeque::new(),
            next_id: 1,
        }
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn link_newest(&mut self, mut block: Block) -> BlockId {
        let id = BlockId(self.next_id);
        self.next_id += 1;
        block.id = id;
        self.blocks.push_back(block);
        id
    }

    pub fn unlink_oldest(&mut self) -> Option<Block> {
        self.blocks.pop_front()
    }

    fn position(&self, id: BlockId) -> Option<usize> {
        let front = self.blocks.front()?;
        let idx = usize::try_from(id.0.checked_sub(front.id.0)?).ok()?;
        (idx < self.blocks.len()).then_some(idx)
    }

    pub fn get(&self, id: BlockId) -> Option<&Block> {
        self.position(id).and_then(|idx| self.blocks.get(idx))
    }

    pub fn get_mut(&mut self, id: BlockId) -> Option<&mut Block> {
        let idx = self.position(id)?;
        self.blocks.get_mut(idx)
    }

    pub fn newest(&self) -> Option<&Block> {
        self.blocks.back()
    }

    pub fn oldest(&self) -> Option<&Block> {
        self.blocks.front()
    }

    pub fn oldest_mut(&mut self) -> Option<&mut Block> {
        self.blocks.front_mut()
    }

    /// The block linked right after `id`, if any.
    pub fn newer(&self, id: BlockId) -> Option<&Block> {
        self.get(BlockId(id.0 + 1))
    }

    pub fn iter_newest_first(&self) -> impl Iterator<Item = &Block> {
        self.blocks.iter().rev()
    }
}
