//! Decode context
//!
//! Tracks the position of the value currently being decoded, relative to the
//! root of the document, so that errors can report a JSON-pointer-like path
//! such as `/results/[3]/subject`.
//!
//! The context is threaded explicitly through every decoder call. Decoders
//! themselves hold no state, so the same decoder may be used from several
//! tasks at once.

use std::fmt;

use super::DecodeError;

/// One component of a decode path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    /// An object key
    Key(String),
    /// A position in an array or tuple
    Index(usize),
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Key(key) => write!(f, "{}", escape_pointer(key)),
            Self::Index(index) => write!(f, "[{}]", index),
        }
    }
}

impl From<&str> for PathSegment {
    fn from(key: &str) -> Self {
        Self::Key(key.to_string())
    }
}

impl From<String> for PathSegment {
    fn from(key: String) -> Self {
        Self::Key(key)
    }
}

impl From<usize> for PathSegment {
    fn from(index: usize) -> Self {
        Self::Index(index)
    }
}

/// Position of the decoder within the document being decoded.
#[derive(Debug, Clone, Default)]
pub struct DecodeContext {
    segments: Vec<PathSegment>,
}

impl DecodeContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `action` with `segment` appended to the current path.
    ///
    /// The segment is removed again before this returns, whatever `action`
    /// returned.
    pub fn with_segment<R>(
        &mut self,
        segment: impl Into<PathSegment>,
        action: impl FnOnce(&mut Self) -> R,
    ) -> R {
        self.segments.push(segment.into());
        let depth = self.segments.len();
        let result = action(self);
        debug_assert_eq!(self.segments.len(), depth, "unbalanced decode context");
        self.segments.truncate(depth - 1);
        result
    }

    /// Current nesting depth
    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    /// Render the current path as a pointer string.
    ///
    /// Consecutive duplicate segments are collapsed. The root renders as `""`.
    pub fn pointer(&self) -> String {
        let mut out = String::new();
        let mut previous: Option<&PathSegment> = None;
        for segment in &self.segments {
            if previous == Some(segment) {
                continue;
            }
            out.push('/');
            out.push_str(&segment.to_string());
            previous = Some(segment);
        }
        out
    }

    /// Build an error located at the current path.
    pub fn error(&self, message: impl Into<String>) -> DecodeError {
        DecodeError::new(self.pointer(), message)
    }
}

/// RFC 6901 escaping of a single reference token
fn escape_pointer(token: &str) -> String {
    token.replace('~', "~0").replace('/', "~1")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_pointer_is_empty() {
        let ctx = DecodeContext::new();
        assert_eq!(ctx.pointer(), "");
    }

    #[test]
    fn test_nested_pointer() {
        let mut ctx = DecodeContext::new();
        let pointer = ctx.with_segment("results", |ctx| {
            ctx.with_segment(3usize, |ctx| ctx.with_segment("subject", |ctx| ctx.pointer()))
        });
        assert_eq!(pointer, "/results/[3]/subject");
        assert_eq!(ctx.depth(), 0);
    }

    #[test]
    fn test_consecutive_duplicates_collapse() {
        let mut ctx = DecodeContext::new();
        let pointer = ctx.with_segment("a", |ctx| ctx.with_segment("a", |ctx| ctx.pointer()));
        assert_eq!(pointer, "/a");
    }

    #[test]
    fn test_segment_popped_on_error() {
        let mut ctx = DecodeContext::new();
        let result: Result<(), DecodeError> =
            ctx.with_segment("outer", |ctx| Err(ctx.error("Expected a string")));
        let err = result.unwrap_err();
        assert_eq!(err.path(), "/outer");
        assert_eq!(ctx.depth(), 0);
    }

    #[test]
    fn test_keys_are_escaped() {
        let mut ctx = DecodeContext::new();
        let pointer = ctx.with_segment("a/b~c", |ctx| ctx.pointer());
        assert_eq!(pointer, "/a~1b~0c");
    }
}
