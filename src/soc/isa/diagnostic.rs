//! Phased diagnostics with stable codes and source spans. Lexer and parser
//! failures collect; validator findings aggregate until the whole document
//! has been checked.

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DiagnosticPhase {
    Lexer,
    Parser,
    Validator,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DiagnosticLevel {
    Warning,
    Error,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SourcePos {
    /// 1-based line.
    pub line: usize,
    /// 1-based column.
    pub column: usize,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceSpan {
    pub start: SourcePos,
    pub end: SourcePos,
}

impl SourceSpan {
    pub fn point(line: usize, column: usize) -> Self {
        let pos = SourcePos { line, column };
        Self {
            start: pos,
            end: pos,
        }
    }
}

#[derive(Clone, Debug)]
pub struct IsaDiagnostic {
    pub phase: DiagnosticPhase,
    pub level: DiagnosticLevel,
    /// Stable machine-readable code, e.g. `validation.duplicate-field`.
    pub code: &'static str,
    pub message: String,
    pub span: Option<SourceSpan>,
}

impl IsaDiagnostic {
    pub fn new(
        phase: DiagnosticPhase,
        level: DiagnosticLevel,
        code: &'static str,
        message: impl Into<String>,
        span: Option<SourceSpan>,
    ) -> Self {
        Self {
            phase,
            level,
            code,
            message: message.into(),
            span,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self.level, DiagnosticLevel::Error)
    }
}

impl std::fmt::Display for IsaDiagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let level = match self.level {
            DiagnosticLevel::Warning => "warning",
            DiagnosticLevel::Error => "error",
        };
        match &self.span {
            Some(span) => write!(
                f,
                "{level} [{code}] {msg} at {line}:{col}",
                code = self.code,
                msg = self.message,
                line = span.start.line,
                col = span.start.column,
            ),
            None => write!(f, "{level} [{}] {}", self.code, self.message),
        }
    }
}
