//! Reference text codec: self-describing JSON wire format (spec §4.G).
//!
//! Single events serialize as one JSON object; a multi-event blob is
//! newline-delimited JSON, one record per line, with no trailing separator
//! after the last record. Streaming uses the same line framing so a decode
//! session can resume exactly where text-mode `decode_multiple` would have
//! split.

use std::sync::Arc;

use eventcodec_core::error::{codes, DecodingError, EncodingError, StreamingError};
use eventcodec_core::interfaces::{
    BoxFuture, Codec, ContentTypeProvider, Ctx, Decoder, DynAsyncRead, DynAsyncWrite, Encoder, StreamDecoder, StreamEncoder,
    StreamEventProcessor, StreamSessionManager, StreamingCapabilityProvider,
};
use eventcodec_core::pool::BufferPool;
use eventcodec_core::sizing::{hint_for_event, text_hint};
use eventcodec_core::{DecodingOptions, EncodingOptions, Event, Session};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::mpsc;

pub const CONTENT_TYPE: &str = "application/vnd.eventcodec+json";

/// Per-record streaming ceiling (spec §4.F/§6): a length prefix or
/// newline-delimited line past this is `RECORD_TOO_LARGE`, never a direct
/// allocation attempt.
pub const MAX_STREAM_RECORD_SIZE: usize = 10 * 1024 * 1024;

pub struct TextCodec {
    session: Session,
    pool: BufferPool,
}

impl Default for TextCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl TextCodec {
    pub fn new() -> Self {
        Self { session: Session::new(), pool: BufferPool::default() }
    }

    pub fn arc() -> Arc<dyn Codec> {
        Arc::new(Self::new())
    }

    /// Acquires a pool buffer sized from the event-type hint (spec §4.I),
    /// serializes into it, copies into a freshly-allocated result, and
    /// releases the buffer on every exit path — never panics even when the
    /// pool is saturated (spec §4.A, §4.F, §5).
    fn to_bytes(&self, event: &Event, opts: &EncodingOptions) -> Result<Vec<u8>, EncodingError> {
        let hint = text_hint(hint_for_event(event), opts.pretty);
        let mut scratch = self
            .pool
            .acquire_safe(hint)
            .map_err(|e| EncodingError::new(CONTENT_TYPE, event.kind().to_string(), e.to_string()).with_code(codes::POOL_EXHAUSTED))?;

        let write_result = if opts.pretty { serde_json::to_writer_pretty(&mut *scratch, event) } else { serde_json::to_writer(&mut *scratch, event) };

        if let Err(e) = write_result {
            self.pool.release(Some(scratch));
            return Err(EncodingError::new(CONTENT_TYPE, event.kind().to_string(), e.to_string()).with_cause(e));
        }
        if opts.max_size != 0 && scratch.len() > opts.max_size {
            self.pool.release(Some(scratch));
            return Err(EncodingError::new(CONTENT_TYPE, event.kind().to_string(), "encoded size exceeds max_size").with_code(codes::OVER_LIMIT));
        }
        if opts.validate_output {
            if let Err(e) = event.validate() {
                self.pool.release(Some(scratch));
                return Err(EncodingError::new(CONTENT_TYPE, event.kind().to_string(), e.to_string()));
            }
        }
        let bytes = scratch.to_vec();
        self.pool.release(Some(scratch));
        Ok(bytes)
    }
}

fn from_bytes(data: &[u8], opts: &DecodingOptions) -> Result<Event, DecodingError> {
    if data.is_empty() {
        return Err(DecodingError::new(CONTENT_TYPE, "<empty>", "input is empty").with_code(codes::DECODING_EMPTY_INPUT));
    }
    if opts.max_size != 0 && data.len() > opts.max_size {
        return Err(DecodingError::new(CONTENT_TYPE, "<input>", "input exceeds max_size").with_code(codes::OVER_LIMIT));
    }
    let event: Event = serde_json::from_slice(data).map_err(|e| DecodingError::new(CONTENT_TYPE, preview(data), e.to_string()))?;
    if opts.strict && has_unknown_fields(data, &event)? {
        return Err(DecodingError::new(CONTENT_TYPE, preview(data), "input contains fields not recognized by this event kind"));
    }
    if opts.validate_events {
        event.validate().map_err(|e| DecodingError::new(CONTENT_TYPE, preview(data), e.to_string()))?;
    }
    Ok(event)
}

fn preview(data: &[u8]) -> String {
    String::from_utf8_lossy(&data[..data.len().min(64)]).into_owned()
}

/// Strict mode has no `deny_unknown_fields` on `Event` because variants share
/// a tag and arbitrary-JSON payloads (`Custom`, `Raw`). Instead, re-serialize
/// the decoded event and diff the object's key set against the input's.
fn has_unknown_fields(data: &[u8], event: &Event) -> Result<bool, DecodingError> {
    let input: serde_json::Value = serde_json::from_slice(data).map_err(|e| DecodingError::new(CONTENT_TYPE, preview(data), e.to_string()))?;
    let roundtrip = serde_json::to_value(event).map_err(|e| DecodingError::new(CONTENT_TYPE, preview(data), e.to_string()))?;
    let (Some(input_obj), Some(roundtrip_obj)) = (input.as_object(), roundtrip.as_object()) else {
        return Ok(false);
    };
    Ok(input_obj.keys().any(|k| !roundtrip_obj.contains_key(k)))
}

impl Encoder for TextCodec {
    fn encode(&self, _ctx: &Ctx, event: &Event, opts: &EncodingOptions) -> Result<Vec<u8>, EncodingError> {
        self.to_bytes(event, opts)
    }

    fn encode_multiple(&self, _ctx: &Ctx, events: &[Event], opts: &EncodingOptions) -> Result<Vec<u8>, EncodingError> {
        let mut out = Vec::with_capacity(eventcodec_core::sizing::hint_for_batch(events));
        for (i, event) in events.iter().enumerate() {
            if i > 0 {
                out.push(b'\n');
            }
            out.extend_from_slice(&self.to_bytes(event, opts)?);
        }
        Ok(out)
    }
}

impl Decoder for TextCodec {
    fn decode(&self, _ctx: &Ctx, data: &[u8], opts: &DecodingOptions) -> Result<Event, DecodingError> {
        from_bytes(data, opts)
    }

    fn decode_multiple(&self, _ctx: &Ctx, data: &[u8], opts: &DecodingOptions) -> Result<Vec<Event>, DecodingError> {
        data.split(|&b| b == b'\n')
            .filter(|line| !line.is_empty())
            .map(|line| from_bytes(line, opts))
            .collect()
    }
}

impl ContentTypeProvider for TextCodec {
    fn content_type(&self) -> &str {
        CONTENT_TYPE
    }
}

impl StreamingCapabilityProvider for TextCodec {
    fn supports_streaming(&self) -> bool {
        true
    }
}

/// Reads one newline-delimited record. `Ok(None)` is a clean EOF at a record
/// boundary; an EOF mid-record is `UNEXPECTED_EOF`.
async fn read_line(reader: &mut DynAsyncRead, max_size: usize) -> Result<Option<Vec<u8>>, StreamingError> {
    let mut line = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        let n = reader.read(&mut byte).await.map_err(|e| StreamingError::new(codes::UNEXPECTED_EOF, e.to_string()).with_cause(e))?;
        if n == 0 {
            if line.is_empty() {
                return Ok(None);
            }
            return Err(StreamingError::new(codes::UNEXPECTED_EOF, "stream ended mid-record"));
        }
        if byte[0] == b'\n' {
            return Ok(Some(line));
        }
        line.push(byte[0]);
        if max_size != 0 && line.len() > max_size {
            return Err(StreamingError::new(codes::RECORD_TOO_LARGE, "record exceeds max_size before a newline was seen"));
        }
    }
}

impl StreamEncoder for TextCodec {
    fn encode_stream<'a>(&'a self, ctx: &'a Ctx, mut events: mpsc::Receiver<Event>, mut writer: DynAsyncWrite) -> BoxFuture<'a, Result<(), StreamingError>> {
        Box::pin(async move {
            loop {
                tokio::select! {
                    _ = ctx.cancelled() => return Err(StreamingError::cancelled()),
                    received = events.recv() => {
                        let Some(event) = received else { return writer.flush().await.map_err(|e| StreamingError::new(codes::UNEXPECTED_EOF, e.to_string())) };
                        let bytes = self.to_bytes(&event, &EncodingOptions::default())
                            .map_err(|e| StreamingError::new(codes::STREAM_NOT_INITIALIZED, e.to_string()).with_cause(e))?;
                        writer.write_all(&bytes).await.map_err(|e| StreamingError::new(codes::UNEXPECTED_EOF, e.to_string()))?;
                        writer.write_all(b"\n").await.map_err(|e| StreamingError::new(codes::UNEXPECTED_EOF, e.to_string()))?;
                    }
                }
            }
        })
    }
}

impl StreamDecoder for TextCodec {
    fn decode_stream<'a>(&'a self, ctx: &'a Ctx, mut reader: DynAsyncRead, out: mpsc::Sender<Event>) -> BoxFuture<'a, Result<(), StreamingError>> {
        Box::pin(async move {
            loop {
                if ctx.is_cancelled() {
                    return Err(StreamingError::cancelled());
                }
                let Some(line) = read_line(&mut reader, MAX_STREAM_RECORD_SIZE).await? else { return Ok(()) };
                let event = from_bytes(&line, &DecodingOptions::default()).map_err(|e| StreamingError::new(codes::UNEXPECTED_EOF, e.to_string()).with_cause(e))?;
                if out.send(event).await.is_err() {
                    return Ok(());
                }
            }
        })
    }
}

impl StreamSessionManager for TextCodec {
    fn start_encoding_session<'a>(&'a self, _ctx: &'a Ctx, writer: DynAsyncWrite) -> BoxFuture<'a, Result<(), StreamingError>> {
        Box::pin(async move { self.session.start_encoding(writer).await })
    }

    fn start_decoding_session<'a>(&'a self, _ctx: &'a Ctx, reader: DynAsyncRead) -> BoxFuture<'a, Result<(), StreamingError>> {
        Box::pin(async move { self.session.start_decoding(reader).await })
    }

    fn end_session<'a>(&'a self, _ctx: &'a Ctx) -> BoxFuture<'a, Result<(), StreamingError>> {
        Box::pin(async move { self.session.end().await })
    }
}

impl StreamEventProcessor for TextCodec {
    fn write_event<'a>(&'a self, ctx: &'a Ctx, event: &'a Event) -> BoxFuture<'a, Result<(), StreamingError>> {
        Box::pin(async move {
            self.session
                .with_writer(ctx, move |writer| {
                    Box::pin(async move {
                        let bytes = self.to_bytes(event, &EncodingOptions::default()).map_err(|e| StreamingError::new(codes::UNEXPECTED_EOF, e.to_string()).with_cause(e))?;
                        writer.write_all(&bytes).await.map_err(|e| StreamingError::new(codes::UNEXPECTED_EOF, e.to_string()))?;
                        writer.write_all(b"\n").await.map_err(|e| StreamingError::new(codes::UNEXPECTED_EOF, e.to_string()))
                    })
                })
                .await
        })
    }

    fn read_event<'a>(&'a self, ctx: &'a Ctx) -> BoxFuture<'a, Result<Option<Event>, StreamingError>> {
        Box::pin(async move {
            self.session
                .with_reader(ctx, |reader| {
                    Box::pin(async move {
                        let Some(line) = read_line(reader, MAX_STREAM_RECORD_SIZE).await? else { return Ok(None) };
                        from_bytes(&line, &DecodingOptions::default())
                            .map(Some)
                            .map_err(|e| StreamingError::new(codes::UNEXPECTED_EOF, e.to_string()).with_cause(e))
                    })
                })
                .await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> Ctx {
        Ctx::new()
    }

    #[test]
    fn single_event_round_trips() {
        let codec = TextCodec::new();
        let event = Event::TextMessageContent { message_id: "m1".into(), delta: "hi".into() };
        let bytes = codec.encode(&ctx(), &event, &EncodingOptions::default()).unwrap();
        let decoded = codec.decode(&ctx(), &bytes, &DecodingOptions::default()).unwrap();
        assert_eq!(decoded, event);
    }

    #[test]
    fn multiple_events_round_trip_with_no_trailing_newline() {
        let codec = TextCodec::new();
        let events = vec![
            Event::StepStarted { step_name: "a".into() },
            Event::StepFinished { step_name: "a".into() },
        ];
        let bytes = codec.encode_multiple(&ctx(), &events, &EncodingOptions::default()).unwrap();
        assert!(!bytes.ends_with(b"\n"));
        let decoded = codec.decode_multiple(&ctx(), &bytes, &DecodingOptions::default()).unwrap();
        assert_eq!(decoded, events);
    }

    #[test]
    fn strict_mode_rejects_unknown_fields() {
        let codec = TextCodec::new();
        let data = br#"{"kind":"step_started","step_name":"a","bogus":true}"#;
        let lenient = codec.decode(&ctx(), data, &DecodingOptions::default());
        assert!(lenient.is_ok());
        let strict_opts = DecodingOptions { strict: true, ..DecodingOptions::default() };
        let err = codec.decode(&ctx(), data, &strict_opts).unwrap_err();
        assert!(err.message.contains("not recognized"));
    }

    #[test]
    fn empty_input_is_a_decoding_error() {
        let codec = TextCodec::new();
        let err = codec.decode(&ctx(), b"", &DecodingOptions::default()).unwrap_err();
        assert_eq!(err.code, codes::DECODING_EMPTY_INPUT);
    }

    #[tokio::test]
    async fn streaming_round_trips_a_batch_through_channels() {
        let codec = Arc::new(TextCodec::new());
        let (tx, rx) = mpsc::channel(8);
        let (out_tx, mut out_rx) = mpsc::channel(8);
        let events = vec![
            Event::RunStarted { thread_id: "t".into(), run_id: "r".into() },
            Event::RunFinished { thread_id: "t".into(), run_id: "r".into() },
        ];
        for e in events.clone() {
            tx.send(e).await.unwrap();
        }
        drop(tx);

        let (client, server) = tokio::io::duplex(4096);
        let (read_half, write_half) = tokio::io::split(client);
        let encoder = codec.clone();
        let encode_ctx = ctx();
        let write_task = tokio::spawn(async move { encoder.encode_stream(&encode_ctx, rx, Box::new(write_half)).await });

        let (server_read, _server_write) = tokio::io::split(server);
        let decoder = codec.clone();
        let decode_ctx = ctx();
        let decode_task = tokio::spawn(async move { decoder.decode_stream(&decode_ctx, Box::new(server_read), out_tx).await });

        write_task.await.unwrap().unwrap();
        drop(read_half);
        decode_task.await.unwrap().unwrap();

        let mut received = Vec::new();
        while let Some(event) = out_rx.recv().await {
            received.push(event);
        }
        assert_eq!(received, events);
    }
}
