//! Request bodies and the replay buffer.
//!
//! A request body arrives as a single-use, forward-only stream. Anything that
//! wants to look at the bytes *and* let the handler read them afterwards has
//! to buffer the stream once and hand on a copy that starts again at offset 0.
//! That copy is a [`ReplayBody`]:
//!
//! ```text
//! Body::Stream ──capture()──▶ (Bytes, ReplayBody)
//!                                 │         │
//!                         inspect/log    swapped back into the request
//! ```
//!
//! Both halves share one immutable allocation; `Bytes::clone` is a refcount
//! bump, not a copy.
//!
//! Captures are bounded. A body longer than the limit fails with
//! [`BodyError::TooLarge`] instead of growing memory without bound.

use std::convert::Infallible;
use std::fmt;
use std::io::{self, Read};
use std::mem;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use http_body::{Frame, SizeHint};
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, LengthLimitError, Limited};

use crate::handler::BoxFuture;

/// Default capture limit: 16 MiB.
pub const DEFAULT_BODY_LIMIT: usize = 16 * 1024 * 1024;

/// Type-erased error produced by a streaming body.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

// ── BodyError ─────────────────────────────────────────────────────────────────

/// Failure while buffering a request body.
#[derive(Debug, thiserror::Error)]
pub enum BodyError {
    /// The body is longer than the capture limit.
    #[error("request body exceeds the {limit}-byte capture limit")]
    TooLarge { limit: usize },

    /// The underlying stream failed mid-body (e.g. connection reset).
    #[error("failed to read request body: {0}")]
    Read(#[from] io::Error),

    /// The original stream was consumed by an earlier failed capture.
    #[error("request body was already consumed")]
    Spent,
}

impl BodyError {
    fn from_collect(err: BoxError, limit: usize) -> Self {
        if err.is::<LengthLimitError>() {
            Self::TooLarge { limit }
        } else {
            Self::Read(io::Error::other(err))
        }
    }
}

// ── capture ───────────────────────────────────────────────────────────────────

/// Reads `source` to exhaustion and returns its bytes plus an independent
/// replay of them.
///
/// The source is polled until it ends; it is never read again afterwards.
/// Read failures are returned as-is and not retried.
pub async fn capture<B>(source: B, limit: usize) -> Result<(Bytes, ReplayBody), BodyError>
where
    B: http_body::Body,
    B::Error: Into<BoxError>,
{
    let collected = Limited::new(source, limit)
        .collect()
        .await
        .map_err(|e| BodyError::from_collect(e, limit))?;

    let bytes = collected.to_bytes();
    Ok((bytes.clone(), ReplayBody::new(bytes)))
}

/// [`capture`] for a request's own stream, as a boxed `Send` future that
/// gates and handlers can await.
pub fn capture_stream(
    stream: UnsyncBoxBody<Bytes, BoxError>,
    limit: usize,
) -> BoxFuture<'static, Result<(Bytes, ReplayBody), BodyError>> {
    Box::pin(capture(stream, limit))
}

/// Blocking counterpart of [`capture`] for any [`std::io::Read`] source.
pub fn capture_reader<R: Read>(source: R, limit: usize) -> Result<(Bytes, ReplayBody), BodyError> {
    let mut buf = Vec::new();
    // One byte past the limit is enough to tell "exactly at" from "over".
    source
        .take((limit as u64).saturating_add(1))
        .read_to_end(&mut buf)?;

    if buf.len() > limit {
        return Err(BodyError::TooLarge { limit });
    }

    let bytes = Bytes::from(buf);
    Ok((bytes.clone(), ReplayBody::new(bytes)))
}

// ── ReplayBody ────────────────────────────────────────────────────────────────

/// Captured body bytes plus a read cursor.
///
/// Readable synchronously through [`Read`] and asynchronously as an
/// [`http_body::Body`]. The data is already resident, so it is always
/// ready: `poll_frame` never returns `Pending` and never stores a waker.
#[derive(Clone, Debug, Default)]
pub struct ReplayBody {
    data: Bytes,
    pos: usize,
}

impl ReplayBody {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self { data: data.into(), pos: 0 }
    }

    /// All captured bytes, regardless of the cursor.
    pub fn as_bytes(&self) -> &Bytes { &self.data }

    /// Bytes not yet read.
    pub fn remaining(&self) -> &[u8] { &self.data[self.pos..] }

    pub fn len(&self) -> usize { self.data.len() }
    pub fn is_empty(&self) -> bool { self.data.is_empty() }

    /// `true` once every byte has been read.
    pub fn is_finished(&self) -> bool { self.pos >= self.data.len() }

    /// Always `true`.
    pub fn is_ready(&self) -> bool { true }

    /// Moves the cursor back to offset 0.
    pub fn rewind(&mut self) { self.pos = 0; }
}

impl Read for ReplayBody {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let rest = self.remaining();
        let n = rest.len().min(buf.len());
        buf[..n].copy_from_slice(&rest[..n]);
        self.pos += n;
        Ok(n)
    }
}

impl http_body::Body for ReplayBody {
    type Data = Bytes;
    type Error = Infallible;

    fn poll_frame(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Bytes>, Infallible>>> {
        let this = self.get_mut();
        if this.is_finished() {
            return Poll::Ready(None);
        }
        let chunk = this.data.slice(this.pos..);
        this.pos = this.data.len();
        Poll::Ready(Some(Ok(Frame::data(chunk))))
    }

    fn is_end_stream(&self) -> bool {
        self.is_finished()
    }

    fn size_hint(&self) -> SizeHint {
        SizeHint::with_exact(self.remaining().len() as u64)
    }
}

// ── Body ──────────────────────────────────────────────────────────────────────

/// The body source of a [`Request`](crate::Request).
pub enum Body {
    /// No body was sent.
    Empty,
    /// The original single-use stream, not yet read.
    Stream(UnsyncBoxBody<Bytes, BoxError>),
    /// A buffered body, readable from the start.
    Replay(ReplayBody),
    /// The original stream failed part-way through a capture.
    Spent,
}

impl Body {
    pub fn empty() -> Self { Self::Empty }

    /// Wraps any streaming body.
    pub fn stream<B>(body: B) -> Self
    where
        B: http_body::Body<Data = Bytes> + Send + 'static,
        B::Error: Into<BoxError>,
    {
        Self::Stream(body.map_err(Into::<BoxError>::into).boxed_unsync())
    }

    /// `true` if there is something to read.
    pub fn is_present(&self) -> bool {
        matches!(self, Self::Stream(_) | Self::Replay(_))
    }

    /// Moves the body out, leaving [`Body::Spent`] behind.
    pub fn take(&mut self) -> Body {
        mem::replace(self, Self::Spent)
    }

    /// Returns the whole body as bytes.
    ///
    /// A stream is captured on first call and replaced by its replay, so the
    /// body stays readable. A replay always yields its full contents.
    pub async fn to_bytes(&mut self, limit: usize) -> Result<Bytes, BodyError> {
        match self.take() {
            Self::Empty => {
                *self = Self::Empty;
                Ok(Bytes::new())
            }
            Self::Replay(replay) => {
                let bytes = replay.as_bytes().clone();
                *self = Self::Replay(replay);
                Ok(bytes)
            }
            Self::Stream(stream) => {
                let (bytes, replay) = capture_stream(stream, limit).await?;
                *self = Self::Replay(replay);
                Ok(bytes)
            }
            Self::Spent => Err(BodyError::Spent),
        }
    }
}

impl Default for Body {
    fn default() -> Self { Self::Empty }
}

impl From<Bytes> for Body {
    fn from(bytes: Bytes) -> Self { Self::Replay(ReplayBody::new(bytes)) }
}

impl From<Vec<u8>> for Body {
    fn from(bytes: Vec<u8>) -> Self { Self::Replay(ReplayBody::new(bytes)) }
}

impl From<&'static str> for Body {
    fn from(text: &'static str) -> Self { Self::Replay(ReplayBody::new(text)) }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty     => f.write_str("Body::Empty"),
            Self::Stream(_) => f.write_str("Body::Stream(..)"),
            Self::Replay(r) => f.debug_tuple("Body::Replay").field(&r.len()).finish(),
            Self::Spent     => f.write_str("Body::Spent"),
        }
    }
}
