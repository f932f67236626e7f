// Per-consumer replay position over the shared block chain.
use crate::core::block::BlockId;
use crate::core::record::{SequenceToken, StreamId};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CursorState {
    /// Nothing to position against yet; retried on the next read.
    Unset,
    /// Points at a live record that has not been delivered.
    Set,
    /// Caught up; points at the last record seen.
    Idle,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) struct Position {
    pub block: BlockId,
    pub index: usize,
}

/// Cursors are owned by consumers, never by the cache.
#[derive(Clone, Debug)]
pub struct Cursor {
    stream_id: StreamId,
    pub(crate) state: CursorState,
    pub(crate) position: Option<Position>,
    pub(crate) token: Option<SequenceToken>,
}

impl Cursor {
    pub(crate) fn new(stream_id: StreamId, token: Option<SequenceToken>) -> Self {
        Self {
            stream_id,
            state: CursorState::Unset,
            position: None,
            token,
        }
    }

    pub fn stream_id(&self) -> StreamId {
        self.stream_id
    }

    pub fn state(&self) -> CursorState {
        self.state
    }

    /// Token at the cursor's current position, or the requested start while unset.
    pub fn token(&self) -> Option<SequenceToken> {
        self.token
    }

    pub fn is_idle(&self) -> bool {
        self.state == CursorState::Idle
    }

    pub(crate) fn set(&mut self, position: Position, token: SequenceToken) {
        self.state = CursorState::Set;
        self.position = Some(position);
        self.token = Some(token);
    }

    pub(crate) fn idle(&mut self, position: Position, token: SequenceToken) {
        self.state = CursorState::Idle;
        self.position = Some(position);
        self.token = Some(token);
    }

    pub(crate) fn unset(&mut self, token: Option<SequenceToken>) {
        self.state = CursorState::Unset;
        self.position = None;
        self.token = token;
    }
}
