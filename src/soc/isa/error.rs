use std::fmt;

use super::diagnostic::{DiagnosticPhase, IsaDiagnostic};

/// Any failure while loading, parsing, validating, or assembling ISA
/// artifacts.
#[derive(Debug)]
pub enum IsaError {
    Io(std::io::Error),
    Diagnostics {
        phase: DiagnosticPhase,
        diagnostics: Vec<IsaDiagnostic>,
    },
    IncludeLoop {
        chain: Vec<String>,
    },
    FileKind {
        path: String,
        reason: &'static str,
    },
    Machine(String),
}

impl IsaError {
    pub fn diagnostics(&self) -> &[IsaDiagnostic] {
        match self {
            IsaError::Diagnostics { diagnostics, .. } => diagnostics,
            _ => &[],
        }
    }
}

impl From<std::io::Error> for IsaError {
    fn from(err: std::io::Error) -> Self {
        IsaError::Io(err)
    }
}

impl fmt::Display for IsaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IsaError::Io(err) => write!(f, "I/O error: {err}"),
            IsaError::Diagnostics { phase, diagnostics } => {
                let phase = match phase {
                    DiagnosticPhase::Lexer => "lexer",
                    DiagnosticPhase::Parser => "parser",
                    DiagnosticPhase::Validator => "validation",
                };
                write!(f, "{phase} reported {} finding(s):", diagnostics.len())?;
                for diagnostic in diagnostics {
                    write!(f, "\n  {diagnostic}")?;
                }
                Ok(())
            }
            IsaError::IncludeLoop { chain } => {
                write!(f, "cyclic include detected: {}", chain.join(" -> "))
            }
            IsaError::FileKind { path, reason } => write!(f, "cannot load '{path}': {reason}"),
            IsaError::Machine(msg) => write!(f, "machine construction error: {msg}"),
        }
    }
}

impl std::error::Error for IsaError {}
