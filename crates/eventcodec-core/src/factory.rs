//! Codec factories (spec §4.E): construct a `Codec`/`StreamCodec` from a
//! content-type name plus options, without the caller needing to know the
//! concrete implementation type.
//!
//! Three flavors, each grounded in a different corner of the pack:
//! - [`DefaultFactory`] — constructor-registration map, the `TopicRegistry`
//!   shape applied to constructors instead of topics.
//! - [`CachingFactory`] — wraps any factory, memoizing non-streaming codecs
//!   by `(content_type, options)`.
//! - [`PluginFactory`] — name -> constructor map populated at runtime rather
//!   than at compile time. The spec's "plugin factory" is an in-process
//!   registration API, not `libloading`/dylib loading — the teacher's own
//!   dynamic-plugin machinery is FFI-based and has no counterpart here, so
//!   it was deliberately not carried over (see DESIGN.md).

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::error::{codes, CodecError, ConfigurationError, RegistryError};
use crate::interfaces::{Codec, Ctx, StreamCodec};
use crate::options::{DecodingOptions, EncodingOptions};

pub type CodecConstructor = Arc<dyn Fn() -> Arc<dyn Codec> + Send + Sync>;
pub type StreamCodecConstructor = Arc<dyn Fn() -> Arc<dyn StreamCodec> + Send + Sync>;

/// `CreateCodec`/`CreateStreamCodec`/`SupportedTypes`/`SupportsStreaming`
/// (spec §4.E). A content type of `""` (after trimming) is always rejected
/// with a `ConfigurationError` before a factory ever looks it up.
pub trait CodecFactory: Send + Sync {
    fn create_codec(
        &self,
        ctx: &Ctx,
        content_type: &str,
        enc_opts: &EncodingOptions,
        dec_opts: &DecodingOptions,
    ) -> Result<Arc<dyn Codec>, CodecError>;

    fn create_stream_codec(
        &self,
        ctx: &Ctx,
        content_type: &str,
        enc_opts: &EncodingOptions,
        dec_opts: &DecodingOptions,
    ) -> Result<Arc<dyn StreamCodec>, CodecError>;

    fn supported_types(&self) -> Vec<String>;

    fn supports_streaming(&self, content_type: &str) -> bool;
}

fn require_content_type(content_type: &str) -> Result<(), CodecError> {
    if content_type.trim().is_empty() {
        return Err(ConfigurationError::new("factory", "content_type", "content type must not be empty", content_type).into());
    }
    Ok(())
}

fn require_not_cancelled(ctx: &Ctx) -> Result<(), CodecError> {
    if ctx.is_cancelled() {
        return Err(RegistryError::new("create", "", "operation cancelled", codes::STREAM_CANCELLED).into());
    }
    Ok(())
}

fn poisoned_warn<T>(what: &str, r: std::sync::LockResult<T>) -> T {
    match r {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(what, "factory lock poisoned, recovering");
            e.into_inner()
        }
    }
}

struct Registration {
    codec: CodecConstructor,
    stream: Option<StreamCodecConstructor>,
}

/// Name -> constructor map, built up via [`DefaultFactory::register`] /
/// [`DefaultFactory::register_streamable`].
pub struct DefaultFactory {
    registrations: RwLock<HashMap<String, Registration>>,
}

impl Default for DefaultFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl DefaultFactory {
    pub fn new() -> Self {
        Self { registrations: RwLock::new(HashMap::new()) }
    }

    /// Registers a non-streaming-only constructor for `content_type`.
    pub fn register(&self, content_type: impl Into<String>, constructor: CodecConstructor) {
        let mut map = poisoned_warn("default_factory", self.registrations.write());
        map.insert(content_type.into(), Registration { codec: constructor, stream: None });
    }

    /// Registers both a plain and a stream-capable constructor for
    /// `content_type` (typically two closures over the same concrete type).
    pub fn register_streamable(&self, content_type: impl Into<String>, codec: CodecConstructor, stream: StreamCodecConstructor) {
        let mut map = poisoned_warn("default_factory", self.registrations.write());
        map.insert(content_type.into(), Registration { codec, stream: Some(stream) });
    }
}

impl CodecFactory for DefaultFactory {
    fn create_codec(&self, ctx: &Ctx, content_type: &str, _enc_opts: &EncodingOptions, _dec_opts: &DecodingOptions) -> Result<Arc<dyn Codec>, CodecError> {
        require_content_type(content_type)?;
        require_not_cancelled(ctx)?;
        let map = poisoned_warn("default_factory", self.registrations.read());
        match map.get(content_type) {
            Some(reg) => Ok((reg.codec)()),
            None => Err(RegistryError::new("create_codec", content_type, "no constructor registered for content type", codes::NOT_REGISTERED).into()),
        }
    }

    fn create_stream_codec(&self, ctx: &Ctx, content_type: &str, _enc_opts: &EncodingOptions, _dec_opts: &DecodingOptions) -> Result<Arc<dyn StreamCodec>, CodecError> {
        require_content_type(content_type)?;
        require_not_cancelled(ctx)?;
        let map = poisoned_warn("default_factory", self.registrations.read());
        match map.get(content_type).and_then(|reg| reg.stream.as_ref()) {
            Some(ctor) => Ok(ctor()),
            None => Err(RegistryError::new("create_stream_codec", content_type, "no stream-capable constructor registered for content type", codes::NOT_REGISTERED).into()),
        }
    }

    fn supported_types(&self) -> Vec<String> {
        let mut types: Vec<String> = poisoned_warn("default_factory", self.registrations.read()).keys().cloned().collect();
        types.sort();
        types
    }

    fn supports_streaming(&self, content_type: &str) -> bool {
        poisoned_warn("default_factory", self.registrations.read())
            .get(content_type)
            .is_some_and(|reg| reg.stream.is_some())
    }
}

/// Cache key: a canonicalized view of the options that affect codec identity.
/// Streaming codecs are never cached (spec §4.E: "stream state is per-call,
/// caching would leak session state across callers").
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    content_type: String,
    pretty: bool,
    cross_sdk_compatibility: bool,
    strict: bool,
}

impl CacheKey {
    fn from_options(content_type: &str, enc: &EncodingOptions, dec: &DecodingOptions) -> Self {
        Self {
            content_type: content_type.to_string(),
            pretty: enc.pretty,
            cross_sdk_compatibility: enc.cross_sdk_compatibility,
            strict: dec.strict,
        }
    }
}

/// Wraps any `CodecFactory`, memoizing codecs it creates by content type plus
/// the option fields that affect codec identity. Idempotent: repeated calls
/// with an equivalent key return the same `Arc`. Stream codecs bypass the
/// cache entirely (their session state is per-call).
pub struct CachingFactory<F> {
    inner: F,
    cache: RwLock<HashMap<CacheKey, Arc<dyn Codec>>>,
}

impl<F: CodecFactory> CachingFactory<F> {
    pub fn new(inner: F) -> Self {
        Self { inner, cache: RwLock::new(HashMap::new()) }
    }
}

impl<F: CodecFactory> CodecFactory for CachingFactory<F> {
    fn create_codec(&self, ctx: &Ctx, content_type: &str, enc_opts: &EncodingOptions, dec_opts: &DecodingOptions) -> Result<Arc<dyn Codec>, CodecError> {
        require_content_type(content_type)?;
        let key = CacheKey::from_options(content_type, enc_opts, dec_opts);
        if let Some(codec) = poisoned_warn("caching_factory", self.cache.read()).get(&key) {
            return Ok(codec.clone());
        }
        let codec = self.inner.create_codec(ctx, content_type, enc_opts, dec_opts)?;
        if !codec.supports_streaming() {
            poisoned_warn("caching_factory", self.cache.write()).insert(key, codec.clone());
        }
        Ok(codec)
    }

    fn create_stream_codec(&self, ctx: &Ctx, content_type: &str, enc_opts: &EncodingOptions, dec_opts: &DecodingOptions) -> Result<Arc<dyn StreamCodec>, CodecError> {
        require_content_type(content_type)?;
        self.inner.create_stream_codec(ctx, content_type, enc_opts, dec_opts)
    }

    fn supported_types(&self) -> Vec<String> {
        self.inner.supported_types()
    }

    fn supports_streaming(&self, content_type: &str) -> bool {
        self.inner.supports_streaming(content_type)
    }
}

/// Runtime-registerable factory: plugins register their supported content
/// types and constructors; lookups never touch the filesystem or dynamic
/// linker (spec §4.E, §1 "Non-goals: no dynamic module loading").
pub struct PluginFactory {
    plugins: RwLock<HashMap<String, Registration>>,
}

impl Default for PluginFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl PluginFactory {
    pub fn new() -> Self {
        Self { plugins: RwLock::new(HashMap::new()) }
    }

    /// Registers a plugin's constructor(s) under every content type it
    /// claims to support. Rejects an empty name or a content type already
    /// claimed by a different plugin.
    pub fn register_plugin(
        &self,
        name: &str,
        supported_content_types: &[&str],
        codec: CodecConstructor,
        stream: Option<StreamCodecConstructor>,
    ) -> Result<(), RegistryError> {
        if name.trim().is_empty() {
            return Err(RegistryError::new("register_plugin", "", "plugin name must not be empty", codes::PLUGIN_NAME_EMPTY));
        }
        let mut plugins = poisoned_warn("plugin_factory", self.plugins.write());
        for content_type in supported_content_types {
            if plugins.contains_key(*content_type) {
                return Err(RegistryError::new(
                    "register_plugin",
                    *content_type,
                    format!("content type already claimed by another plugin (registering {name})"),
                    codes::PLUGIN_NAME_CONFLICT,
                ));
            }
        }
        for content_type in supported_content_types {
            plugins.insert(content_type.to_string(), Registration { codec: codec.clone(), stream: stream.clone() });
        }
        Ok(())
    }
}

impl CodecFactory for PluginFactory {
    fn create_codec(&self, ctx: &Ctx, content_type: &str, _enc_opts: &EncodingOptions, _dec_opts: &DecodingOptions) -> Result<Arc<dyn Codec>, CodecError> {
        require_content_type(content_type)?;
        require_not_cancelled(ctx)?;
        let plugins = poisoned_warn("plugin_factory", self.plugins.read());
        match plugins.get(content_type) {
            Some(reg) => Ok((reg.codec)()),
            None => Err(RegistryError::new("create_codec", content_type, "no plugin registered for content type", codes::NOT_REGISTERED).into()),
        }
    }

    fn create_stream_codec(&self, ctx: &Ctx, content_type: &str, _enc_opts: &EncodingOptions, _dec_opts: &DecodingOptions) -> Result<Arc<dyn StreamCodec>, CodecError> {
        require_content_type(content_type)?;
        require_not_cancelled(ctx)?;
        let plugins = poisoned_warn("plugin_factory", self.plugins.read());
        match plugins.get(content_type).and_then(|reg| reg.stream.as_ref()) {
            Some(ctor) => Ok(ctor()),
            None => Err(RegistryError::new("create_stream_codec", content_type, "no stream-capable plugin registered for content type", codes::NOT_REGISTERED).into()),
        }
    }

    fn supported_types(&self) -> Vec<String> {
        let mut types: Vec<String> = poisoned_warn("plugin_factory", self.plugins.read()).keys().cloned().collect();
        types.sort();
        types
    }

    fn supports_streaming(&self, content_type: &str) -> bool {
        poisoned_warn("plugin_factory", self.plugins.read())
            .get(content_type)
            .is_some_and(|reg| reg.stream.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{DecodingError, EncodingError};
    use crate::event::Event;
    use crate::interfaces::{ContentTypeProvider, Decoder, Encoder, StreamingCapabilityProvider};

    struct Stub;
    impl Encoder for Stub {
        fn encode(&self, _ctx: &Ctx, _e: &Event, _o: &EncodingOptions) -> Result<Vec<u8>, EncodingError> {
            Ok(vec![])
        }
        fn encode_multiple(&self, _ctx: &Ctx, _e: &[Event], _o: &EncodingOptions) -> Result<Vec<u8>, EncodingError> {
            Ok(vec![])
        }
    }
    impl Decoder for Stub {
        fn decode(&self, _ctx: &Ctx, _d: &[u8], _o: &DecodingOptions) -> Result<Event, DecodingError> {
            Err(DecodingError::new("stub", "", "stub"))
        }
        fn decode_multiple(&self, _ctx: &Ctx, _d: &[u8], _o: &DecodingOptions) -> Result<Vec<Event>, DecodingError> {
            Ok(vec![])
        }
    }
    impl ContentTypeProvider for Stub {
        fn content_type(&self) -> &str {
            "test/stub"
        }
    }
    impl StreamingCapabilityProvider for Stub {
        fn supports_streaming(&self) -> bool {
            false
        }
    }

    fn ctx() -> Ctx {
        Ctx::new()
    }

    #[test]
    fn default_factory_creates_registered_codec() {
        let factory = DefaultFactory::new();
        factory.register("test/stub", Arc::new(|| Arc::new(Stub) as Arc<dyn Codec>));
        assert!(factory.create_codec(&ctx(), "test/stub", &EncodingOptions::default(), &DecodingOptions::default()).is_ok());
        assert!(factory.create_codec(&ctx(), "missing", &EncodingOptions::default(), &DecodingOptions::default()).is_err());
    }

    #[test]
    fn empty_content_type_is_a_configuration_error() {
        let factory = DefaultFactory::new();
        let err = factory.create_codec(&ctx(), "  ", &EncodingOptions::default(), &DecodingOptions::default()).unwrap_err();
        assert_eq!(err.code(), codes::CONFIGURATION_INVALID);
    }

    #[test]
    fn supported_types_and_supports_streaming_reflect_registrations() {
        let factory = DefaultFactory::new();
        factory.register("test/stub", Arc::new(|| Arc::new(Stub) as Arc<dyn Codec>));
        assert_eq!(factory.supported_types(), vec!["test/stub".to_string()]);
        assert!(!factory.supports_streaming("test/stub"));
        assert!(!factory.supports_streaming("missing"));
    }

    #[test]
    fn caching_factory_reuses_same_instance() {
        let inner = DefaultFactory::new();
        inner.register("test/stub", Arc::new(|| Arc::new(Stub) as Arc<dyn Codec>));
        let caching = CachingFactory::new(inner);
        let a = caching.create_codec(&ctx(), "test/stub", &EncodingOptions::default(), &DecodingOptions::default()).unwrap();
        let b = caching.create_codec(&ctx(), "test/stub", &EncodingOptions::default(), &DecodingOptions::default()).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn plugin_registration_rejects_content_type_conflicts() {
        let factory = PluginFactory::new();
        factory.register_plugin("p1", &["test/stub"], Arc::new(|| Arc::new(Stub) as Arc<dyn Codec>), None).unwrap();
        let err = factory.register_plugin("p2", &["test/stub"], Arc::new(|| Arc::new(Stub) as Arc<dyn Codec>), None).unwrap_err();
        assert_eq!(err.code, codes::PLUGIN_NAME_CONFLICT);
    }
}
