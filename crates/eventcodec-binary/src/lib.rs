//! Reference binary codec: length-prefixed framing around a JSON payload
//! (spec §4.G).
//!
//! Single record: `[u32 BE length][payload]`. A multi-event blob is
//! `[u32 BE count][[u32 BE length][payload]] * count`. Per the redesigned
//! behavior in SPEC_FULL.md §9 (spec's REDESIGN FLAG), `decode_multiple`
//! never falls back to single-event parsing on a framing mismatch — a count
//! prefix that doesn't account for every byte is a hard decoding error, not
//! a silent reinterpretation.

use std::sync::Arc;

use eventcodec_core::error::{codes, DecodingError, EncodingError, StreamingError};
use eventcodec_core::interfaces::{
    BoxFuture, Codec, ContentTypeProvider, Ctx, Decoder, DynAsyncRead, DynAsyncWrite, Encoder, StreamDecoder, StreamEncoder,
    StreamEventProcessor, StreamSessionManager, StreamingCapabilityProvider,
};
use eventcodec_core::pool::BufferPool;
use eventcodec_core::sizing::{binary_hint, hint_for_event};
use eventcodec_core::{DecodingOptions, EncodingOptions, Event, Session};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::mpsc;

pub const CONTENT_TYPE: &str = "application/vnd.eventcodec+binary";

const LEN_PREFIX: usize = 4;

/// Per-record streaming ceiling (spec §4.F/§6): a length prefix past this is
/// `RECORD_TOO_LARGE`, never a direct allocation attempt.
pub const MAX_STREAM_RECORD_SIZE: usize = 10 * 1024 * 1024;

pub struct BinaryCodec {
    session: Session,
    pool: BufferPool,
}

impl Default for BinaryCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl BinaryCodec {
    pub fn new() -> Self {
        Self { session: Session::new(), pool: BufferPool::default() }
    }

    pub fn arc() -> Arc<dyn Codec> {
        Arc::new(Self::new())
    }

    /// Acquires a pool buffer sized from the event-type hint (spec §4.I),
    /// serializes the JSON payload into it, copies into a freshly-allocated
    /// result, and releases the buffer on every exit path — never panics even
    /// when the pool is saturated (spec §4.A, §4.F, §5).
    fn payload_of(&self, event: &Event, opts: &EncodingOptions) -> Result<Vec<u8>, EncodingError> {
        let hint = binary_hint(hint_for_event(event));
        let mut scratch = self
            .pool
            .acquire_safe(hint)
            .map_err(|e| EncodingError::new(CONTENT_TYPE, event.kind().to_string(), e.to_string()).with_code(codes::POOL_EXHAUSTED))?;

        if let Err(e) = serde_json::to_writer(&mut *scratch, event) {
            self.pool.release(Some(scratch));
            return Err(EncodingError::new(CONTENT_TYPE, event.kind().to_string(), e.to_string()).with_cause(e));
        }
        if opts.validate_output {
            if let Err(e) = event.validate() {
                self.pool.release(Some(scratch));
                return Err(EncodingError::new(CONTENT_TYPE, event.kind().to_string(), e.to_string()));
            }
        }
        let payload = scratch.to_vec();
        self.pool.release(Some(scratch));
        Ok(payload)
    }
}

fn frame(payload: &[u8], out: &mut Vec<u8>) {
    out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    out.extend_from_slice(payload);
}

fn event_of(payload: &[u8], opts: &DecodingOptions) -> Result<Event, DecodingError> {
    let event: Event = serde_json::from_slice(payload).map_err(|e| DecodingError::new(CONTENT_TYPE, preview(payload), e.to_string()))?;
    if opts.validate_events {
        event.validate().map_err(|e| DecodingError::new(CONTENT_TYPE, preview(payload), e.to_string()))?;
    }
    Ok(event)
}

fn preview(data: &[u8]) -> String {
    format!("{} bytes", data.len())
}

fn read_u32(data: &[u8], at: usize) -> Result<u32, DecodingError> {
    let end = at + 4;
    if end > data.len() {
        return Err(DecodingError::new(CONTENT_TYPE, preview(data), "truncated length prefix"));
    }
    Ok(u32::from_be_bytes(data[at..end].try_into().unwrap()))
}

impl Encoder for BinaryCodec {
    fn encode(&self, _ctx: &Ctx, event: &Event, opts: &EncodingOptions) -> Result<Vec<u8>, EncodingError> {
        let payload = self.payload_of(event, opts)?;
        if opts.max_size != 0 && payload.len() + LEN_PREFIX > opts.max_size {
            return Err(EncodingError::new(CONTENT_TYPE, event.kind().to_string(), "encoded size exceeds max_size").with_code(codes::OVER_LIMIT));
        }
        let mut out = Vec::with_capacity(payload.len() + LEN_PREFIX);
        frame(&payload, &mut out);
        Ok(out)
    }

    fn encode_multiple(&self, _ctx: &Ctx, events: &[Event], opts: &EncodingOptions) -> Result<Vec<u8>, EncodingError> {
        let mut out = Vec::with_capacity(LEN_PREFIX + eventcodec_core::sizing::hint_for_batch(events));
        out.extend_from_slice(&(events.len() as u32).to_be_bytes());
        for event in events {
            let payload = self.payload_of(event, opts)?;
            frame(&payload, &mut out);
        }
        if opts.max_size != 0 && out.len() > opts.max_size {
            return Err(EncodingError::new(CONTENT_TYPE, "batch", "encoded size exceeds max_size").with_code(codes::OVER_LIMIT));
        }
        Ok(out)
    }
}

impl Decoder for BinaryCodec {
    fn decode(&self, _ctx: &Ctx, data: &[u8], opts: &DecodingOptions) -> Result<Event, DecodingError> {
        if data.is_empty() {
            return Err(DecodingError::new(CONTENT_TYPE, "<empty>", "input is empty").with_code(codes::DECODING_EMPTY_INPUT));
        }
        if opts.max_size != 0 && data.len() > opts.max_size {
            return Err(DecodingError::new(CONTENT_TYPE, "<input>", "input exceeds max_size").with_code(codes::OVER_LIMIT));
        }
        let len = read_u32(data, 0)? as usize;
        if LEN_PREFIX + len != data.len() {
            return Err(DecodingError::new(CONTENT_TYPE, preview(data), "length prefix does not match input size"));
        }
        event_of(&data[LEN_PREFIX..], opts)
    }

    fn decode_multiple(&self, _ctx: &Ctx, data: &[u8], opts: &DecodingOptions) -> Result<Vec<Event>, DecodingError> {
        if data.is_empty() {
            return Err(DecodingError::new(CONTENT_TYPE, "<empty>", "input is empty").with_code(codes::DECODING_EMPTY_INPUT));
        }
        let count = read_u32(data, 0)? as usize;
        let mut offset = LEN_PREFIX;
        let mut events = Vec::with_capacity(count);
        for _ in 0..count {
            let len = read_u32(data, offset)? as usize;
            let payload_start = offset + LEN_PREFIX;
            let payload_end = payload_start + len;
            if payload_end > data.len() {
                return Err(DecodingError::new(CONTENT_TYPE, preview(data), "record length prefix runs past end of input"));
            }
            events.push(event_of(&data[payload_start..payload_end], opts)?);
            offset = payload_end;
        }
        // Strict framing: the count prefix must account for every byte. A
        // mismatch is an error, never a silent fallback to single-event decode.
        if offset != data.len() {
            return Err(DecodingError::new(CONTENT_TYPE, preview(data), "trailing bytes after the declared record count"));
        }
        Ok(events)
    }
}

impl ContentTypeProvider for BinaryCodec {
    fn content_type(&self) -> &str {
        CONTENT_TYPE
    }
}

impl StreamingCapabilityProvider for BinaryCodec {
    fn supports_streaming(&self) -> bool {
        true
    }
}

/// Reads one `[len][payload]` record. `Ok(None)` is a clean EOF before any
/// byte of a new record was read.
async fn read_record(reader: &mut DynAsyncRead, max_size: usize) -> Result<Option<Vec<u8>>, StreamingError> {
    let mut len_buf = [0u8; 4];
    let mut read = 0;
    while read < 4 {
        let n = reader.read(&mut len_buf[read..]).await.map_err(|e| StreamingError::new(codes::UNEXPECTED_EOF, e.to_string()).with_cause(e))?;
        if n == 0 {
            if read == 0 {
                return Ok(None);
            }
            return Err(StreamingError::new(codes::UNEXPECTED_EOF, "stream ended mid length-prefix"));
        }
        read += n;
    }
    let len = u32::from_be_bytes(len_buf) as usize;
    if max_size != 0 && len > max_size {
        return Err(StreamingError::new(codes::RECORD_TOO_LARGE, "record length prefix exceeds max_size"));
    }
    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await.map_err(|e| StreamingError::new(codes::UNEXPECTED_EOF, e.to_string()).with_cause(e))?;
    Ok(Some(payload))
}

fn write_record(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + LEN_PREFIX);
    frame(payload, &mut out);
    out
}

impl StreamEncoder for BinaryCodec {
    fn encode_stream<'a>(&'a self, ctx: &'a Ctx, mut events: mpsc::Receiver<Event>, mut writer: DynAsyncWrite) -> BoxFuture<'a, Result<(), StreamingError>> {
        Box::pin(async move {
            loop {
                tokio::select! {
                    _ = ctx.cancelled() => return Err(StreamingError::cancelled()),
                    received = events.recv() => {
                        let Some(event) = received else { return writer.flush().await.map_err(|e| StreamingError::new(codes::UNEXPECTED_EOF, e.to_string())) };
                        let payload = self.payload_of(&event, &EncodingOptions::default())
                            .map_err(|e| StreamingError::new(codes::STREAM_NOT_INITIALIZED, e.to_string()).with_cause(e))?;
                        writer.write_all(&write_record(&payload)).await.map_err(|e| StreamingError::new(codes::UNEXPECTED_EOF, e.to_string()))?;
                    }
                }
            }
        })
    }
}

impl StreamDecoder for BinaryCodec {
    fn decode_stream<'a>(&'a self, ctx: &'a Ctx, mut reader: DynAsyncRead, out: mpsc::Sender<Event>) -> BoxFuture<'a, Result<(), StreamingError>> {
        Box::pin(async move {
            loop {
                if ctx.is_cancelled() {
                    return Err(StreamingError::cancelled());
                }
                let Some(payload) = read_record(&mut reader, MAX_STREAM_RECORD_SIZE).await? else { return Ok(()) };
                let event = event_of(&payload, &DecodingOptions::default()).map_err(|e| StreamingError::new(codes::UNEXPECTED_EOF, e.to_string()).with_cause(e))?;
                if out.send(event).await.is_err() {
                    return Ok(());
                }
            }
        })
    }
}

impl StreamSessionManager for BinaryCodec {
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

impl StreamEventProcessor for BinaryCodec {
    fn write_event<'a>(&'a self, ctx: &'a Ctx, event: &'a Event) -> BoxFuture<'a, Result<(), StreamingError>> {
        Box::pin(async move {
            self.session
                .with_writer(ctx, move |writer| {
                    Box::pin(async move {
                        let payload = self.payload_of(event, &EncodingOptions::default()).map_err(|e| StreamingError::new(codes::UNEXPECTED_EOF, e.to_string()).with_cause(e))?;
                        writer.write_all(&write_record(&payload)).await.map_err(|e| StreamingError::new(codes::UNEXPECTED_EOF, e.to_string()))
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
                        let Some(payload) = read_record(reader, MAX_STREAM_RECORD_SIZE).await? else { return Ok(None) };
                        event_of(&payload, &DecodingOptions::default())
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
        let codec = BinaryCodec::new();
        let event = Event::ToolCallStart { tool_call_id: "tc1".into(), tool_name: "search".into() };
        let bytes = codec.encode(&ctx(), &event, &EncodingOptions::default()).unwrap();
        assert_eq!(codec.decode(&ctx(), &bytes, &DecodingOptions::default()).unwrap(), event);
    }

    #[test]
    fn batch_round_trips_and_reports_count() {
        let codec = BinaryCodec::new();
        let events = vec![
            Event::MessageStart { message_id: "m".into(), role: "assistant".into() },
            Event::TextMessageContent { message_id: "m".into(), delta: "hi".into() },
            Event::MessageEnd { message_id: "m".into() },
        ];
        let bytes = codec.encode_multiple(&ctx(), &events, &EncodingOptions::default()).unwrap();
        assert_eq!(u32::from_be_bytes(bytes[0..4].try_into().unwrap()), 3);
        assert_eq!(codec.decode_multiple(&ctx(), &bytes, &DecodingOptions::default()).unwrap(), events);
    }

    #[test]
    fn corrupted_count_prefix_is_rejected_without_fallback() {
        let codec = BinaryCodec::new();
        let events = vec![Event::StepStarted { step_name: "a".into() }];
        let mut bytes = codec.encode_multiple(&ctx(), &events, &EncodingOptions::default()).unwrap();
        // Claim two records when only one is present.
        bytes[3] = 2;
        let err = codec.decode_multiple(&ctx(), &bytes, &DecodingOptions::default()).unwrap_err();
        assert!(err.message.contains("past end") || err.message.contains("trailing") || err.message.contains("truncated"));
    }

    #[test]
    fn mismatched_length_prefix_on_single_record_is_rejected() {
        let codec = BinaryCodec::new();
        let event = Event::StepStarted { step_name: "a".into() };
        let mut bytes = codec.encode(&ctx(), &event, &EncodingOptions::default()).unwrap();
        bytes.push(0xFF);
        let err = codec.decode(&ctx(), &bytes, &DecodingOptions::default()).unwrap_err();
        assert!(err.message.contains("does not match"));
    }

    #[tokio::test]
    async fn streaming_round_trips_through_channels() {
        let codec = Arc::new(BinaryCodec::new());
        let (tx, rx) = mpsc::channel(8);
        let (out_tx, mut out_rx) = mpsc::channel(8);
        let events = vec![
            Event::Custom { name: "ping".into(), value: serde_json::json!({"n": 1}) },
            Event::Raw { data: serde_json::json!({"raw": true}) },
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
