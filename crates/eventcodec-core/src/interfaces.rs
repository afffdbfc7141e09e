//! Minimal role interfaces and their composites (spec §4.C, §9).
//!
//! Small traits compose into `Codec`/`StreamCodec` via blanket impls, the
//! same "interface segregation over monoliths" shape `server_api::pipeline`
//! uses for `Framing`/`Codec`/`Middleware`. Stream operations return boxed
//! futures by hand (no `async-trait`), mirroring
//! `gauss_api::topic::TopicStorage` — traits that must stay `dyn`-compatible
//! across an FFI-free, in-process registry.

use std::future::Future;
use std::pin::Pin;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::{codes, DecodingError, EncodingError, StreamingError};
use crate::event::Event;
use crate::options::{DecodingOptions, EncodingOptions};

/// Cancellation token threaded through every exported operation (spec §5).
pub type Ctx = CancellationToken;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

// ════════════════════════════════════════════════════════════════
//  Non-streaming roles
// ════════════════════════════════════════════════════════════════

pub trait Encoder: Send + Sync {
    fn encode(&self, ctx: &Ctx, event: &Event, opts: &EncodingOptions) -> Result<Vec<u8>, EncodingError>;
    fn encode_multiple(&self, ctx: &Ctx, events: &[Event], opts: &EncodingOptions) -> Result<Vec<u8>, EncodingError>;
}

pub trait Decoder: Send + Sync {
    fn decode(&self, ctx: &Ctx, data: &[u8], opts: &DecodingOptions) -> Result<Event, DecodingError>;
    fn decode_multiple(&self, ctx: &Ctx, data: &[u8], opts: &DecodingOptions) -> Result<Vec<Event>, DecodingError>;
}

pub trait ContentTypeProvider: Send + Sync {
    fn content_type(&self) -> &str;
}

pub trait StreamingCapabilityProvider: Send + Sync {
    fn supports_streaming(&self) -> bool;
}

/// `Codec = Encoder + Decoder + ContentTypeProvider + StreamingCapabilityProvider`.
pub trait Codec: Encoder + Decoder + ContentTypeProvider + StreamingCapabilityProvider {}
impl<T: Encoder + Decoder + ContentTypeProvider + StreamingCapabilityProvider + ?Sized> Codec for T {}

// ════════════════════════════════════════════════════════════════
//  Streaming roles
// ════════════════════════════════════════════════════════════════

pub type DynAsyncWrite = Box<dyn AsyncWrite + Unpin + Send>;
pub type DynAsyncRead = Box<dyn AsyncRead + Unpin + Send>;

pub trait StreamEncoder: Send + Sync {
    /// Reads events from `events` until the channel closes or `ctx` cancels,
    /// invoking `write_event` for each (spec §4.F "channel-based stream I/O").
    fn encode_stream<'a>(
        &'a self,
        ctx: &'a Ctx,
        events: mpsc::Receiver<Event>,
        writer: DynAsyncWrite,
    ) -> BoxFuture<'a, Result<(), StreamingError>>;
}

pub trait StreamDecoder: Send + Sync {
    /// Calls `read_event` in a loop, publishing onto `out` and closing it on
    /// EOF or error (spec §4.F).
    fn decode_stream<'a>(
        &'a self,
        ctx: &'a Ctx,
        reader: DynAsyncRead,
        out: mpsc::Sender<Event>,
    ) -> BoxFuture<'a, Result<(), StreamingError>>;
}

pub trait StreamSessionManager: Send + Sync {
    fn start_encoding_session<'a>(&'a self, ctx: &'a Ctx, writer: DynAsyncWrite) -> BoxFuture<'a, Result<(), StreamingError>>;
    fn start_decoding_session<'a>(&'a self, ctx: &'a Ctx, reader: DynAsyncRead) -> BoxFuture<'a, Result<(), StreamingError>>;
    fn end_session<'a>(&'a self, ctx: &'a Ctx) -> BoxFuture<'a, Result<(), StreamingError>>;
}

pub trait StreamEventProcessor: Send + Sync {
    fn write_event<'a>(&'a self, ctx: &'a Ctx, event: &'a Event) -> BoxFuture<'a, Result<(), StreamingError>>;
    /// `Ok(None)` is a clean EOF observed before any partial record (spec §4.F/§6).
    fn read_event<'a>(&'a self, ctx: &'a Ctx) -> BoxFuture<'a, Result<Option<Event>, StreamingError>>;
}

/// `StreamCodec = Codec + StreamEncoder + StreamDecoder + StreamSessionManager
/// + StreamEventProcessor`. Per the Open Question resolved in SPEC_FULL.md
/// §9, a `StreamCodec` is also a `Codec` — stream-capable implementations
/// always expose the plain single-event operations too.
pub trait StreamCodec: Codec + StreamEncoder + StreamDecoder + StreamSessionManager + StreamEventProcessor {}
impl<T> StreamCodec for T where
    T: Codec + StreamEncoder + StreamDecoder + StreamSessionManager + StreamEventProcessor + ?Sized
{
}

// ════════════════════════════════════════════════════════════════
//  Adapters for partial implementations (spec §9)
// ════════════════════════════════════════════════════════════════

/// Exposes an encode-only implementation as a full `Codec`; the decode side
/// returns `OPERATION_NOT_SUPPORTED`. Stateless, shareable.
pub struct EncodeOnlyAdapter<T> {
    inner: T,
}

impl<T> EncodeOnlyAdapter<T> {
    pub fn new(inner: T) -> Self {
        Self { inner }
    }
}

impl<T: Encoder> Encoder for EncodeOnlyAdapter<T> {
    fn encode(&self, ctx: &Ctx, event: &Event, opts: &EncodingOptions) -> Result<Vec<u8>, EncodingError> {
        self.inner.encode(ctx, event, opts)
    }

    fn encode_multiple(&self, ctx: &Ctx, events: &[Event], opts: &EncodingOptions) -> Result<Vec<u8>, EncodingError> {
        self.inner.encode_multiple(ctx, events, opts)
    }
}

impl<T: Send + Sync> Decoder for EncodeOnlyAdapter<T> {
    fn decode(&self, _ctx: &Ctx, _data: &[u8], _opts: &DecodingOptions) -> Result<Event, DecodingError> {
        Err(not_supported_decode())
    }

    fn decode_multiple(&self, _ctx: &Ctx, _data: &[u8], _opts: &DecodingOptions) -> Result<Vec<Event>, DecodingError> {
        Err(not_supported_decode())
    }
}

impl<T: ContentTypeProvider> ContentTypeProvider for EncodeOnlyAdapter<T> {
    fn content_type(&self) -> &str {
        self.inner.content_type()
    }
}

impl<T> StreamingCapabilityProvider for EncodeOnlyAdapter<T> {
    fn supports_streaming(&self) -> bool {
        false
    }
}

/// Exposes a decode-only implementation as a full `Codec`; the encode side
/// returns `OPERATION_NOT_SUPPORTED`.
pub struct DecodeOnlyAdapter<T> {
    inner: T,
}

impl<T> DecodeOnlyAdapter<T> {
    pub fn new(inner: T) -> Self {
        Self { inner }
    }
}

impl<T: Send + Sync> Encoder for DecodeOnlyAdapter<T> {
    fn encode(&self, _ctx: &Ctx, _event: &Event, _opts: &EncodingOptions) -> Result<Vec<u8>, EncodingError> {
        Err(not_supported_encode())
    }

    fn encode_multiple(&self, _ctx: &Ctx, _events: &[Event], _opts: &EncodingOptions) -> Result<Vec<u8>, EncodingError> {
        Err(not_supported_encode())
    }
}

impl<T: Decoder> Decoder for DecodeOnlyAdapter<T> {
    fn decode(&self, ctx: &Ctx, data: &[u8], opts: &DecodingOptions) -> Result<Event, DecodingError> {
        self.inner.decode(ctx, data, opts)
    }

    fn decode_multiple(&self, ctx: &Ctx, data: &[u8], opts: &DecodingOptions) -> Result<Vec<Event>, DecodingError> {
        self.inner.decode_multiple(ctx, data, opts)
    }
}

impl<T: ContentTypeProvider> ContentTypeProvider for DecodeOnlyAdapter<T> {
    fn content_type(&self) -> &str {
        self.inner.content_type()
    }
}

impl<T> StreamingCapabilityProvider for DecodeOnlyAdapter<T> {
    fn supports_streaming(&self) -> bool {
        false
    }
}

fn not_supported_encode() -> EncodingError {
    EncodingError::new("adapter", "n/a", "encode not supported by this adapter").with_code(codes::OPERATION_NOT_SUPPORTED)
}

fn not_supported_decode() -> DecodingError {
    DecodingError::new("adapter", "n/a", "decode not supported by this adapter").with_code(codes::OPERATION_NOT_SUPPORTED)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StubEncoder;
    impl Encoder for StubEncoder {
        fn encode(&self, _ctx: &Ctx, _event: &Event, _opts: &EncodingOptions) -> Result<Vec<u8>, EncodingError> {
            Ok(vec![1, 2, 3])
        }
        fn encode_multiple(&self, _ctx: &Ctx, _events: &[Event], _opts: &EncodingOptions) -> Result<Vec<u8>, EncodingError> {
            Ok(vec![])
        }
    }
    impl ContentTypeProvider for StubEncoder {
        fn content_type(&self) -> &str {
            "test/stub"
        }
    }

    #[test]
    fn encode_only_adapter_rejects_decode() {
        let adapter = EncodeOnlyAdapter::new(StubEncoder);
        let ctx = Ctx::new();
        let err = adapter.decode(&ctx, b"x", &DecodingOptions::default()).unwrap_err();
        assert_eq!(err.code, codes::OPERATION_NOT_SUPPORTED);
        assert!(!adapter.supports_streaming());
    }

    #[test]
    fn encode_only_adapter_passes_through_encode() {
        let adapter = EncodeOnlyAdapter::new(StubEncoder);
        let ctx = Ctx::new();
        let event = Event::StepStarted { step_name: "a".into() };
        assert_eq!(adapter.encode(&ctx, &event, &EncodingOptions::default()).unwrap(), vec![1, 2, 3]);
    }
}
