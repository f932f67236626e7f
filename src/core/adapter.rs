// Boundary between cached records and the delivery values consumers receive.
use bytes::Bytes;

use crate::core::error::Error;
use crate::core::record::{EventRecord, SequenceToken, StreamId, Timestamp};

/// Builds delivery values from cached records.
///
/// This is the only place that knows the payload format; the cache treats
/// payload bytes as opaque.
pub trait DataAdapter {
    type Delivery;

    fn to_delivery(&self, record: &EventRecord, payload: &[u8]) -> Result<Self::Delivery, Error>;

    fn sequence_token_of(&self, record: &EventRecord) -> SequenceToken {
        record.token()
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Delivery {
    pub stream_id: StreamId,
    pub token: SequenceToken,
    pub enqueue_time: Timestamp,
    pub payload: Bytes,
}

/// Copies payload bytes out of the arena into an owned `Bytes`.
#[derive(Clone, Copy, Debug, Default)]
pub struct BytesAdapter;

impl DataAdapter for BytesAdapter {
    type Delivery = Delivery;

    fn to_delivery(&self, record: &EventRecord, payload: &[u8]) -> Result<Delivery, Error> {
        Ok(Delivery {
            stream_id: record.stream_id,
            token: self.sequence_token_of(record),
            enqueue_time: record.enqueue_time,
            payload: Bytes::copy_from_slice(payload),
        })
    }
}
