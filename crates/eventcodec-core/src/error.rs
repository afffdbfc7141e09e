//! Structured error taxonomy (spec §4.B, §6, §7).
//!
//! Every failure in the runtime is exactly one of these kinds. Kinds carry a
//! stable `code()` for programmatic matching and a cause chain via
//! `#[source]`/`#[from]`, following `gauss_engine::error::EngineError`'s
//! `thiserror` + `with_context` convention.

/// `EncodingError` — failure while turning an event into bytes.
#[derive(Debug, thiserror::Error)]
#[error("encoding error in {format} for {event}: {message}")]
pub struct EncodingError {
    pub format: String,
    pub event: String,
    pub message: String,
    pub code: &'static str,
    #[source]
    pub cause: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl EncodingError {
    pub fn new(format: impl Into<String>, event: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            format: format.into(),
            event: event.into(),
            message: message.into(),
            code: codes::ENCODING_FAILED,
            cause: None,
        }
    }

    pub fn with_code(mut self, code: &'static str) -> Self {
        self.code = code;
        self
    }

    pub fn with_cause(mut self, cause: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }
}

/// `DecodingError` — failure while turning bytes into an event.
#[derive(Debug, thiserror::Error)]
#[error("decoding error in {format} for {data}: {message}")]
pub struct DecodingError {
    pub format: String,
    /// Short description of the offending data (never the full payload).
    pub data: String,
    pub message: String,
    pub code: &'static str,
    #[source]
    pub cause: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl DecodingError {
    pub fn new(format: impl Into<String>, data: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            format: format.into(),
            data: data.into(),
            message: message.into(),
            code: codes::DECODING_FAILED,
            cause: None,
        }
    }

    pub fn with_code(mut self, code: &'static str) -> Self {
        self.code = code;
        self
    }

    pub fn with_cause(mut self, cause: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }
}

/// `ValidationError` — an event or wire value failed `Validate()`.
#[derive(Debug, thiserror::Error, Clone)]
#[error("validation error for field {field}: {message} (value: {value})")]
pub struct ValidationError {
    pub field: String,
    pub value: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, value: impl Into<String>, message: impl Into<String>) -> Self {
        Self { field: field.into(), value: value.into(), message: message.into() }
    }
}

/// `ConfigurationError` — a component was misconfigured.
#[derive(Debug, thiserror::Error, Clone)]
#[error("configuration error in {component} for {setting}: {message} (value: {value})")]
pub struct ConfigurationError {
    pub component: String,
    pub setting: String,
    pub message: String,
    pub value: String,
}

impl ConfigurationError {
    pub fn new(
        component: impl Into<String>,
        setting: impl Into<String>,
        message: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            component: component.into(),
            setting: setting.into(),
            message: message.into(),
            value: value.into(),
        }
    }
}

/// `RegistryError` — format registry lookup/mutation failure.
#[derive(Debug, thiserror::Error)]
#[error("registry error in {component} for {key}: {message}")]
pub struct RegistryError {
    pub component: String,
    pub operation: String,
    pub key: String,
    pub message: String,
    pub code: &'static str,
    #[source]
    pub cause: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl RegistryError {
    pub fn new(operation: impl Into<String>, key: impl Into<String>, message: impl Into<String>, code: &'static str) -> Self {
        Self {
            component: "registry".into(),
            operation: operation.into(),
            key: key.into(),
            message: message.into(),
            code,
            cause: None,
        }
    }
}

/// `ResourceError` — a bounded resource (pool tier, record ceiling) was exceeded.
#[derive(Debug, thiserror::Error)]
#[error("resource error for {resource}: limit {limit}, actual {actual}")]
pub struct ResourceError {
    pub resource: String,
    pub limit: usize,
    pub actual: usize,
    pub code: &'static str,
    #[source]
    pub cause: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl ResourceError {
    pub fn new(resource: impl Into<String>, limit: usize, actual: usize) -> Self {
        Self { resource: resource.into(), limit, actual, code: codes::POOL_EXHAUSTED, cause: None }
    }

    pub fn with_code(mut self, code: &'static str) -> Self {
        self.code = code;
        self
    }
}

/// `StreamingError` — stream session misuse, framing failure, or cancellation.
#[derive(Debug, thiserror::Error)]
#[error("streaming error [{code}]: {message}")]
pub struct StreamingError {
    pub code: &'static str,
    pub message: String,
    #[source]
    pub cause: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl StreamingError {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self { code, message: message.into(), cause: None }
    }

    pub fn with_cause(mut self, cause: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    /// Wrap a cancellation so the frame-boundary guarantee (§4.H) is documented at the call site.
    pub fn cancelled() -> Self {
        Self::new(codes::STREAM_CANCELLED, "operation cancelled")
    }
}

/// Closed taxonomy — every exported fallible operation returns this.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error(transparent)]
    Encoding(#[from] EncodingError),
    #[error(transparent)]
    Decoding(#[from] DecodingError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Resource(#[from] ResourceError),
    #[error(transparent)]
    Streaming(#[from] StreamingError),
}

impl CodecError {
    /// Stable code for programmatic matching, independent of message text.
    pub fn code(&self) -> &'static str {
        match self {
            CodecError::Encoding(e) => e.code,
            CodecError::Decoding(e) => e.code,
            CodecError::Validation(_) => codes::VALIDATION_FAILED,
            CodecError::Configuration(_) => codes::CONFIGURATION_INVALID,
            CodecError::Registry(e) => e.code,
            CodecError::Resource(e) => e.code,
            CodecError::Streaming(e) => e.code,
        }
    }
}

/// Stable, programmatically-matchable error codes (spec §6).
pub mod codes {
    pub const NOT_REGISTERED: &str = "NOT_REGISTERED";
    pub const ALIAS_CONFLICT: &str = "ALIAS_CONFLICT";
    pub const NIL_FORMAT_INFO: &str = "NIL_FORMAT_INFO";
    pub const EMPTY_MIME_TYPE: &str = "EMPTY_MIME_TYPE";
    pub const DEFAULT_NOT_REGISTERED: &str = "DEFAULT_NOT_REGISTERED";
    pub const NO_FORMAT_SATISFIES_CAPABILITIES: &str = "NO_FORMAT_SATISFIES_CAPABILITIES";
    pub const LRU_DISABLED_AT_CAPACITY: &str = "LRU_DISABLED_AT_CAPACITY";

    pub const CODEC_NIL: &str = "CODEC_NIL";
    pub const CODEC_NOT_FOUND: &str = "CODEC_NOT_FOUND";
    pub const CONTEXT_NIL: &str = "CONTEXT_NIL";
    pub const CONTENT_TYPE_EMPTY: &str = "CONTENT_TYPE_EMPTY";
    pub const PLUGIN_NAME_CONFLICT: &str = "PLUGIN_NAME_CONFLICT";
    pub const PLUGIN_NAME_EMPTY: &str = "PLUGIN_NAME_EMPTY";

    pub const POOL_EXHAUSTED: &str = "POOL_EXHAUSTED";
    pub const OVER_LIMIT: &str = "OVER_LIMIT";

    pub const STREAM_NOT_INITIALIZED: &str = "STREAM_NOT_INITIALIZED";
    pub const STREAM_ALREADY_ACTIVE: &str = "STREAM_ALREADY_ACTIVE";
    pub const RECORD_TOO_LARGE: &str = "RECORD_TOO_LARGE";
    pub const UNEXPECTED_EOF: &str = "UNEXPECTED_EOF";
    pub const STREAM_CANCELLED: &str = "STREAM_CANCELLED";

    pub const ENCODING_FAILED: &str = "ENCODING_FAILED";
    pub const DECODING_FAILED: &str = "DECODING_FAILED";
    pub const DECODING_EMPTY_INPUT: &str = "DECODING_EMPTY_INPUT";
    pub const VALIDATION_FAILED: &str = "VALIDATION_FAILED";
    pub const CONFIGURATION_INVALID: &str = "CONFIGURATION_INVALID";
    pub const OPERATION_NOT_SUPPORTED: &str = "OPERATION_NOT_SUPPORTED";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_format_matches_spec() {
        let e = RegistryError::new("lookup", "text/x-missing", "not registered", codes::NOT_REGISTERED);
        assert_eq!(
            e.to_string(),
            "registry error in registry for text/x-missing: not registered"
        );
    }

    #[test]
    fn code_is_stable_independent_of_message() {
        let e = StreamingError::cancelled();
        assert_eq!(e.code, codes::STREAM_CANCELLED);
        let wrapped: CodecError = e.into();
        assert_eq!(wrapped.code(), codes::STREAM_CANCELLED);
    }
}
