use std::fmt;

/// Byte range in the source text
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Smallest span covering both `self` and `other`
    pub fn to(self, other: Span) -> Span {
        Span::new(self.start.min(other.start), self.end.max(other.end))
    }
}

/// Errors raised while turning source text into a syntax tree
///
/// The display form is the bare message, matching what script authors see
/// from a browser console. Use [`ErrorContext`] for a positioned report.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ScriptError {
    #[error("{message}")]
    LexerError { span: Span, message: String },

    #[error("{message}")]
    ParserError { span: Span, message: String },
}

impl ScriptError {
    pub fn lexer(span: Span, message: impl Into<String>) -> Self {
        ScriptError::LexerError {
            span,
            message: message.into(),
        }
    }

    pub fn parser(span: Span, message: impl Into<String>) -> Self {
        ScriptError::ParserError {
            span,
            message: message.into(),
        }
    }

    pub fn span(&self) -> Span {
        match self {
            ScriptError::LexerError { span, .. } => *span,
            ScriptError::ParserError { span, .. } => *span,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            ScriptError::LexerError { message, .. } => message,
            ScriptError::ParserError { message, .. } => message,
        }
    }
}

pub type Result<T> = std::result::Result<T, ScriptError>;

/// Line and column (both 1-indexed) of a byte offset, counted from `origin`
///
/// Offsets before `origin` clamp to line 1, column 1.
pub fn line_col(source: &str, offset: usize, origin: usize) -> (usize, usize) {
    let offset = offset.min(source.len());
    let origin = origin.min(offset);
    let region = &source[origin..offset];

    let line = region.matches('\n').count() + 1;
    let col = match region.rfind('\n') {
        Some(pos) => offset - (origin + pos + 1) + 1,
        None => offset - origin + 1,
    };
    (line, col)
}

/// Display context for better error messages
///
/// `origin` is the byte offset where the author's text begins; positions are
/// reported relative to it so that injected prelude lines are not counted.
pub struct ErrorContext<'a> {
    pub source: &'a str,
    pub error: &'a ScriptError,
    pub origin: usize,
}

impl<'a> ErrorContext<'a> {
    pub fn new(source: &'a str, error: &'a ScriptError) -> Self {
        Self {
            source,
            error,
            origin: 0,
        }
    }

    pub fn with_origin(mut self, origin: usize) -> Self {
        self.origin = origin;
        self
    }

    /// Get the source line containing the error
    pub fn source_line(&self) -> Option<&'a str> {
        let start = self.error.span().start.min(self.source.len());

        let line_start = self.source[..start]
            .rfind('\n')
            .map(|pos| pos + 1)
            .unwrap_or(0);
        let line_end = self.source[start..]
            .find('\n')
            .map(|pos| start + pos)
            .unwrap_or(self.source.len());

        Some(&self.source[line_start..line_end])
    }

    /// Get line and column numbers (1-indexed)
    pub fn line_col(&self) -> (usize, usize) {
        line_col(self.source, self.error.span().start, self.origin)
    }
}

impl<'a> fmt::Display for ErrorContext<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (line, col) = self.line_col();
        writeln!(f, "SyntaxError: {} ({}:{})", self.error, line, col)?;

        if let Some(source_line) = self.source_line() {
            writeln!(f)?;
            writeln!(f, "  {}", source_line)?;
            let col_start = self.error.span().start - self.line_start();
            let width = self
                .error
                .span()
                .len()
                .min(source_line.len().saturating_sub(col_start))
                .max(1);
            writeln!(f, "  {}{}", " ".repeat(col_start), "^".repeat(width))?;
        }

        Ok(())
    }
}

impl<'a> ErrorContext<'a> {
    fn line_start(&self) -> usize {
        let start = self.error.span().start.min(self.source.len());
        self.source[..start]
            .rfind('\n')
            .map(|pos| pos + 1)
            .unwrap_or(0)
    }
}
