//! Core runtime for the pluggable event codec system: error taxonomy, the
//! event domain type, trait interfaces, pooled buffers, the format registry,
//! codec factories, and the streaming session primitive. Reference wire
//! formats live in `eventcodec-text` and `eventcodec-binary`.

pub mod config;
pub mod error;
pub mod event;
pub mod factory;
pub mod interfaces;
pub mod options;
pub mod pool;
pub mod registry;
pub mod sizing;
pub mod stream;

pub use error::{CodecError, DecodingError, EncodingError};
pub use event::{Event, EventKind};
pub use interfaces::{
    Codec, ContentTypeProvider, Ctx, Decoder, DecodeOnlyAdapter, DynAsyncRead, DynAsyncWrite, Encoder, EncodeOnlyAdapter,
    StreamCodec, StreamDecoder, StreamEncoder, StreamEventProcessor, StreamSessionManager, StreamingCapabilityProvider,
};
pub use options::{DecodingOptions, EncodingOptions};
pub use registry::{FormatCapabilities, FormatInfo, FormatRegistry, PerformanceProfile, RegistryConfig};
pub use stream::Session;
