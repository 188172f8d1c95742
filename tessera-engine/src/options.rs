use std::fmt::{Display, Formatter};

use tessera_error::{TesseraResult, tessera_bail};
use tessera_program::MEMCPY_THRESHOLD;

/// Byte representation of the packed stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Representation {
    /// The host's own layout, byte for byte.
    #[default]
    Native,
    /// The portable big-endian representation. Not supported by this engine.
    External32,
}

impl Display for Representation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Native => write!(f, "native"),
            Self::External32 => write!(f, "external32"),
        }
    }
}

/// Options for a pack or unpack session.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Runs of at least this many bytes are moved with one bulk copy.
    pub memcpy_threshold: usize,
    /// Whether span variants merge a span into the previous one when they abut.
    pub merge_spans: bool,
    /// Representation of the packed stream.
    pub representation: Representation,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            memcpy_threshold: MEMCPY_THRESHOLD,
            merge_spans: false,
            representation: Representation::Native,
        }
    }
}

impl EngineOptions {
    /// Set the bulk-copy threshold.
    pub fn with_memcpy_threshold(mut self, memcpy_threshold: usize) -> Self {
        self.memcpy_threshold = memcpy_threshold;
        self
    }

    /// Set whether span variants merge abutting spans.
    pub fn with_merge_spans(mut self, merge_spans: bool) -> Self {
        self.merge_spans = merge_spans;
        self
    }

    /// Set the stream representation.
    pub fn with_representation(mut self, representation: Representation) -> Self {
        self.representation = representation;
        self
    }

    /// Span options with at most `ceiling` spans per call and this session's merge setting.
    pub fn span_options(&self, ceiling: usize) -> SpanOptions {
        SpanOptions {
            ceiling,
            merge: self.merge_spans,
        }
    }

    pub(crate) fn validate(&self) -> TesseraResult<()> {
        if self.representation != Representation::Native {
            tessera_bail!("{} representation is not supported", self.representation);
        }
        Ok(())
    }
}

/// Limits for one call of a span variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpanOptions {
    /// Maximum number of spans appended by one call.
    pub ceiling: usize,
    /// Also merge the first span of a call into the last span already in the vector when
    /// they abut. Spans appended by the same call always merge. A merged span does not count
    /// against the ceiling.
    pub merge: bool,
}

impl Default for SpanOptions {
    fn default() -> Self {
        Self {
            ceiling: usize::MAX,
            merge: false,
        }
    }
}

impl SpanOptions {
    /// At most `ceiling` spans per call, without merging.
    pub fn new(ceiling: usize) -> Self {
        Self {
            ceiling,
            merge: false,
        }
    }

    /// Set whether abutting spans merge.
    pub fn with_merge(mut self, merge: bool) -> Self {
        self.merge = merge;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let options = EngineOptions::default();
        assert_eq!(options.memcpy_threshold, 1024);
        assert!(!options.merge_spans);
        assert!(options.validate().is_ok());
        assert_eq!(
            options.with_merge_spans(true).span_options(4),
            SpanOptions::new(4).with_merge(true)
        );
    }

    #[test]
    fn external32_rejected() {
        let options = EngineOptions::default().with_representation(Representation::External32);
        let err = options.validate().unwrap_err();
        assert!(err.to_string().contains("external32"));
    }
}
