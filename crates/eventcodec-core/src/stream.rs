//! Streaming session runtime shared by reference codecs (spec §4.F, §4.H).
//!
//! A session is a small state machine (`Idle` -> `Encoding`/`Decoding` ->
//! `Idle`) guarded by a `tokio::sync::Mutex` so session methods can hold it
//! across `.await` points, the same shape `gauss_engine::bootstrap::Engine`
//! uses for its `ProcessorSlot` state. Cancellation is observed between
//! records, never mid-write, so a cancelled stream always ends on a frame
//! boundary (spec §4.H invariant).

use tokio::sync::Mutex;

use crate::error::{codes, StreamingError};
use crate::interfaces::{Ctx, DynAsyncRead, DynAsyncWrite};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    Idle,
    Encoding,
    Decoding,
}

/// Holds the half of a stream session currently open, if any. Reference
/// codecs embed this and delegate `StreamSessionManager`/`StreamEventProcessor`
/// to its helpers instead of reimplementing the state machine.
pub struct Session {
    state: Mutex<SessionState>,
    writer: Mutex<Option<DynAsyncWrite>>,
    reader: Mutex<Option<DynAsyncRead>>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SessionState::Idle),
            writer: Mutex::new(None),
            reader: Mutex::new(None),
        }
    }

    pub async fn start_encoding(&self, writer: DynAsyncWrite) -> Result<(), StreamingError> {
        let mut state = self.state.lock().await;
        if *state != SessionState::Idle {
            return Err(StreamingError::new(codes::STREAM_ALREADY_ACTIVE, "a session is already active"));
        }
        *self.writer.lock().await = Some(writer);
        *state = SessionState::Encoding;
        Ok(())
    }

    pub async fn start_decoding(&self, reader: DynAsyncRead) -> Result<(), StreamingError> {
        let mut state = self.state.lock().await;
        if *state != SessionState::Idle {
            return Err(StreamingError::new(codes::STREAM_ALREADY_ACTIVE, "a session is already active"));
        }
        *self.reader.lock().await = Some(reader);
        *state = SessionState::Decoding;
        Ok(())
    }

    pub async fn end(&self) -> Result<(), StreamingError> {
        let mut state = self.state.lock().await;
        self.writer.lock().await.take();
        self.reader.lock().await.take();
        *state = SessionState::Idle;
        Ok(())
    }

    /// Runs `op` with the active writer, failing with `STREAM_NOT_INITIALIZED`
    /// if no encoding session is open.
    pub async fn with_writer<F, T>(&self, ctx: &Ctx, op: F) -> Result<T, StreamingError>
    where
        F: for<'a> FnOnce(&'a mut DynAsyncWrite) -> crate::interfaces::BoxFuture<'a, Result<T, StreamingError>>,
    {
        if ctx.is_cancelled() {
            return Err(StreamingError::cancelled());
        }
        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or_else(|| StreamingError::new(codes::STREAM_NOT_INITIALIZED, "no active encoding session"))?;
        op(writer).await
    }

    /// Runs `op` with the active reader, failing with `STREAM_NOT_INITIALIZED`
    /// if no decoding session is open.
    pub async fn with_reader<F, T>(&self, ctx: &Ctx, op: F) -> Result<T, StreamingError>
    where
        F: for<'a> FnOnce(&'a mut DynAsyncRead) -> crate::interfaces::BoxFuture<'a, Result<T, StreamingError>>,
    {
        if ctx.is_cancelled() {
            return Err(StreamingError::cancelled());
        }
        let mut guard = self.reader.lock().await;
        let reader = guard.as_mut().ok_or_else(|| StreamingError::new(codes::STREAM_NOT_INITIALIZED, "no active decoding session"))?;
        op(reader).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    #[tokio::test]
    async fn second_start_while_active_is_rejected() {
        let session = Session::new();
        let sink: DynAsyncWrite = Box::new(tokio::io::sink());
        session.start_encoding(sink).await.unwrap();
        let sink2: DynAsyncWrite = Box::new(tokio::io::sink());
        let err = session.start_encoding(sink2).await.unwrap_err();
        assert_eq!(err.code, codes::STREAM_ALREADY_ACTIVE);
    }

    #[tokio::test]
    async fn end_returns_session_to_idle() {
        let session = Session::new();
        let sink: DynAsyncWrite = Box::new(tokio::io::sink());
        session.start_encoding(sink).await.unwrap();
        session.end().await.unwrap();
        let sink2: DynAsyncWrite = Box::new(tokio::io::sink());
        assert!(session.start_encoding(sink2).await.is_ok());
    }

    #[tokio::test]
    async fn cancelled_context_short_circuits_writer_access() {
        let session = Session::new();
        let sink: DynAsyncWrite = Box::new(tokio::io::sink());
        session.start_encoding(sink).await.unwrap();
        let ctx = Ctx::new();
        ctx.cancel();
        let result = session
            .with_writer(&ctx, |w| Box::pin(async move { w.write_all(b"x").await.map_err(|e| StreamingError::new(codes::UNEXPECTED_EOF, e.to_string())) }))
            .await;
        assert_eq!(result.unwrap_err().code, codes::STREAM_CANCELLED);
    }
}
