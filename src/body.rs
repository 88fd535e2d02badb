//! Single-read response bodies.
//!
//! A network body is a one-shot stream. [`ResponseBody`] puts a buffer in
//! front of it so the body can be peeked any number of times and then
//! drained exactly once.

use std::{collections::VecDeque, fmt, future::Future, pin::Pin};

use bytes::{Bytes, BytesMut};

use crate::{error::BodyError, TransportError};

/// Future returned by [`BodyStream::next_chunk`].
pub type ChunkFuture<'a> =
    Pin<Box<dyn Future<Output = Result<Option<Bytes>, TransportError>> + Send + 'a>>;

/// Source of body chunks. `Ok(None)` marks the end of the body.
pub trait BodyStream: Send {
    fn next_chunk(&mut self) -> ChunkFuture<'_>;
}

impl BodyStream for reqwest::Response {
    fn next_chunk(&mut self) -> ChunkFuture<'_> {
        Box::pin(async move { self.chunk().await.map_err(TransportError::from) })
    }
}

/// In-memory chunk sequence, optionally ending in a read failure.
struct ScriptedChunks(VecDeque<Result<Bytes, TransportError>>);

impl BodyStream for ScriptedChunks {
    fn next_chunk(&mut self) -> ChunkFuture<'_> {
        let next = self.0.pop_front().transpose();
        Box::pin(async move { next })
    }
}

/// What has been done to a body so far.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BodyState {
    Unread,
    /// Inspected without consuming; a drain is still possible.
    Peeked,
    /// Consumed; further reads fail with [`BodyError::Closed`].
    Drained,
}

/// Response body with peek/drain tracking.
pub struct ResponseBody {
    buffer: BytesMut,
    source: Option<Box<dyn BodyStream>>,
    failure: Option<TransportError>,
    state: BodyState,
    absent: bool,
}

impl fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseBody")
            .field("buffered", &self.buffer.len())
            .field("streaming", &self.source.is_some())
            .field("state", &self.state)
            .field("absent", &self.absent)
            .finish()
    }
}

impl ResponseBody {
    /// A response without a body.
    pub fn empty() -> Self {
        Self {
            buffer: BytesMut::new(),
            source: None,
            failure: None,
            state: BodyState::Unread,
            absent: true,
        }
    }

    /// A fully buffered body.
    pub fn buffered(bytes: impl Into<Bytes>) -> Self {
        let bytes: Bytes = bytes.into();
        Self {
            buffer: BytesMut::from(&bytes[..]),
            source: None,
            failure: None,
            state: BodyState::Unread,
            absent: false,
        }
    }

    /// A body backed by a one-shot stream.
    pub fn streaming(source: impl BodyStream + 'static) -> Self {
        Self {
            buffer: BytesMut::new(),
            source: Some(Box::new(source)),
            failure: None,
            state: BodyState::Unread,
            absent: false,
        }
    }

    /// A streaming body fed from a fixed list of chunks.
    pub fn from_chunks<I>(chunks: I) -> Self
    where
        I: IntoIterator<Item = Result<Bytes, TransportError>>,
    {
        Self::streaming(ScriptedChunks(chunks.into_iter().collect()))
    }

    pub fn state(&self) -> BodyState {
        self.state
    }

    /// True when the response carried no body at all.
    pub fn is_absent(&self) -> bool {
        self.absent
    }

    /// Returns the whole body without consuming it.
    ///
    /// Fails with [`BodyError::TooLarge`] once more than `limit` bytes are
    /// buffered; whatever was read stays buffered for a later drain.
    pub async fn peek(&mut self, limit: usize) -> Result<Bytes, BodyError> {
        if self.state == BodyState::Drained {
            return Err(BodyError::Closed);
        }
        self.fill(Some(limit)).await?;
        if self.buffer.len() > limit {
            return Err(BodyError::TooLarge { limit });
        }
        self.state = BodyState::Peeked;
        Ok(Bytes::copy_from_slice(&self.buffer))
    }

    /// Reads the whole body and closes it.
    pub async fn drain(&mut self) -> Result<Bytes, BodyError> {
        if self.state == BodyState::Drained {
            return Err(BodyError::Closed);
        }
        let filled = self.fill(None).await;
        self.state = BodyState::Drained;
        filled?;
        Ok(std::mem::take(&mut self.buffer).freeze())
    }

    /// Pulls chunks into the buffer until the stream ends or the buffer
    /// grows past `limit`.
    async fn fill(&mut self, limit: Option<usize>) -> Result<(), BodyError> {
        if let Some(err) = &self.failure {
            return Err(BodyError::Read(err.clone()));
        }
        while let Some(source) = self.source.as_mut() {
            if limit.is_some_and(|limit| self.buffer.len() > limit) {
                return Ok(());
            }
            match source.next_chunk().await {
                Ok(Some(chunk)) => self.buffer.extend_from_slice(&chunk),
                Ok(None) => self.source = None,
                Err(err) => {
                    self.source = None;
                    self.failure = Some(err.clone());
                    return Err(BodyError::Read(err));
                }
            }
        }
        Ok(())
    }
}
