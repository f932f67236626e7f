// Error kinds and the single error type shared by every cache component.
use std::error::Error as StdError;
use std::fmt;

use crate::core::record::{SequenceToken, StreamId};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    Internal,
    Usage,
    StaleCursor,
    RecordTooLarge,
    BlockFull,
    OutOfRange,
    PoolExhausted,
    Adapter,
    Io,
}

#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
    message: Option<String>,
    hint: Option<String>,
    stream: Option<StreamId>,
    token: Option<SequenceToken>,
    oldest: Option<SequenceToken>,
    newest: Option<SequenceToken>,
    source: Option<Box<dyn StdError + Send + Sync>>,
}

impl Error {
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            message: None,
            hint: None,
            stream: None,
            token: None,
            oldest: None,
            newest: None,
            source: None,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn hint(&self) -> Option<&str> {
        self.hint.as_deref()
    }

    pub fn stream(&self) -> Option<StreamId> {
        self.stream
    }

    /// Token the caller asked for when a cursor could not be positioned.
    pub fn token(&self) -> Option<SequenceToken> {
        self.token
    }

    /// Oldest and newest tokens retained at the time of the failure.
    pub fn bounds(&self) -> (Option<SequenceToken>, Option<SequenceToken>) {
        (self.oldest, self.newest)
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    pub fn with_stream(mut self, stream: StreamId) -> Self {
        self.stream = Some(stream);
        self
    }

    pub fn with_token(mut self, token: SequenceToken) -> Self {
        self.token = Some(token);
        self
    }

    pub fn with_bounds(
        mut self,
        oldest: Option<SequenceToken>,
        newest: Option<SequenceToken>,
    ) -> Self {
        self.oldest = oldest;
        self.newest = newest;
        self
    }

    pub fn with_source(mut self, source: impl StdError + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.kind)?;
        if let Some(message) = &self.message {
            write!(f, ": {message}")?;
        }
        if let Some(stream) = self.stream {
            write!(f, " (stream: {stream})")?;
        }
        if let Some(token) = self.token {
            write!(f, " (token: {token})")?;
        }
        match (self.oldest, self.newest) {
            (Some(oldest), Some(newest)) => write!(f, " (cached: {oldest}..={newest})")?,
            (Some(oldest), None) => write!(f, " (oldest: {oldest})")?,
            (None, Some(newest)) => write!(f, " (newest: {newest})")?,
            (None, None) => {}
        }
        Ok(())
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|source| source.as_ref() as &(dyn StdError + 'static))
    }
}

pub fn to_exit_code(kind: ErrorKind) -> i32 {
    match kind {
        ErrorKind::Internal => 1,
        ErrorKind::Usage => 2,
        ErrorKind::StaleCursor => 3,
        ErrorKind::RecordTooLarge => 4,
        ErrorKind::BlockFull => 5,
        ErrorKind::OutOfRange => 6,
        ErrorKind::PoolExhausted => 7,
        ErrorKind::Adapter => 8,
        ErrorKind::Io => 9,
    }
}
