//! `EncodingOptions` / `DecodingOptions` (spec §3).

/// Default streaming I/O buffer size when `buffer_size == 0`.
pub const DEFAULT_BUFFER_SIZE: usize = 8 * 1024;

#[derive(Debug, Clone, PartialEq)]
pub struct EncodingOptions {
    /// Produce indented textual output.
    pub pretty: bool,
    /// Informational only in the core; unused.
    pub compression: Option<String>,
    /// Hint for streaming I/O buffers; 0 = default (8 KiB).
    pub buffer_size: usize,
    /// Hard limit on encoded bytes for a single operation; 0 = unlimited.
    pub max_size: usize,
    /// Run `Validate()` after encode.
    pub validate_output: bool,
    /// Emit only the portable subset.
    pub cross_sdk_compatibility: bool,
}

impl Default for EncodingOptions {
    fn default() -> Self {
        Self {
            pretty: false,
            compression: None,
            buffer_size: 0,
            max_size: 0,
            validate_output: false,
            cross_sdk_compatibility: false,
        }
    }
}

impl EncodingOptions {
    pub fn effective_buffer_size(&self) -> usize {
        if self.buffer_size == 0 { DEFAULT_BUFFER_SIZE } else { self.buffer_size }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DecodingOptions {
    /// Hint for streaming I/O buffers; 0 = default (8 KiB).
    pub buffer_size: usize,
    /// Hard limit on decoded bytes for a single operation; 0 = unlimited.
    pub max_size: usize,
    /// Run `Validate()` on decoded events.
    pub validate_events: bool,
    /// Reject unknown fields.
    pub strict: bool,
    /// Mirror of the permissive path; `!strict` when unset.
    pub allow_unknown_fields: bool,
}

impl Default for DecodingOptions {
    fn default() -> Self {
        Self {
            buffer_size: 0,
            max_size: 0,
            validate_events: false,
            strict: false,
            allow_unknown_fields: true,
        }
    }
}

impl DecodingOptions {
    pub fn effective_buffer_size(&self) -> usize {
        if self.buffer_size == 0 { DEFAULT_BUFFER_SIZE } else { self.buffer_size }
    }
}
