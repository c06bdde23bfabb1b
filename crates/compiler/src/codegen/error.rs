//! Code generation error types.
//!
//! Codegen failures split into three kinds: invariant violations pinned to a
//! position in the original file (carrying the offending variable's original
//! spelling and the quoted source line), generator misuse with no useful
//! position, and formatting errors so IR emission can use `?` on `writeln!`.

/// A positioned codegen diagnostic. Coordinates are 1-based and refer to the
/// original file; `variable` holds the original (pre-rewrite) spelling when
/// the failure involves a named binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub line: u32,
    pub column: u32,
    pub length: u32,
    pub variable: Option<String>,
    pub message: String,
    /// The original source line, quoted under the message when available.
    pub source_line: Option<String>,
}

impl Diagnostic {
    /// A diagnostic with no recoverable position (the construct came from a
    /// synthetic region of the normalized text).
    pub fn unpositioned(message: impl Into<String>) -> Self {
        Diagnostic {
            line: 0,
            column: 0,
            length: 0,
            variable: None,
            message: message.into(),
            source_line: None,
        }
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.line == 0 {
            write!(f, "Error: {}", self.message)?;
        } else {
            write!(
                f,
                "Error at line {}, column {}: {}",
                self.line, self.column, self.message
            )?;
        }
        if let Some(variable) = &self.variable {
            write!(f, " ('{variable}')")?;
        }
        if let Some(source_line) = &self.source_line {
            write!(f, "\n  {}", source_line.trim_end())?;
        }
        Ok(())
    }
}

/// Error type for code generation operations.
#[derive(Debug)]
pub enum CodeGenError {
    /// An invariant violation at a known source position: a duplicate
    /// declaration in the same scope, `++`/`--` on a non-identifier, an
    /// undefined loop label, a wrong-arity builtin call.
    Diagnostic(Diagnostic),
    /// Generator misuse or an unlowerable construct with no position to
    /// point at (generator consumed twice, unsupported assignment target).
    Invalid(String),
    /// A formatting error when writing IR.
    Format(std::fmt::Error),
}

impl CodeGenError {
    pub fn invalid(message: impl Into<String>) -> Self {
        CodeGenError::Invalid(message.into())
    }
}

impl std::fmt::Display for CodeGenError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CodeGenError::Diagnostic(diagnostic) => write!(f, "{}", diagnostic),
            CodeGenError::Invalid(message) => write!(f, "Error: {}", message),
            CodeGenError::Format(e) => write!(f, "IR generation error: {}", e),
        }
    }
}

impl std::error::Error for CodeGenError {}

impl From<Diagnostic> for CodeGenError {
    fn from(diagnostic: Diagnostic) -> Self {
        CodeGenError::Diagnostic(diagnostic)
    }
}

impl From<std::fmt::Error> for CodeGenError {
    fn from(e: std::fmt::Error) -> Self {
        CodeGenError::Format(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diagnostic_display_with_position_and_variable() {
        let diagnostic = Diagnostic {
            line: 3,
            column: 5,
            length: 6,
            variable: Some("变量".to_string()),
            message: "Variable already declared in current scope".to_string(),
            source_line: Some("变量 := 2".to_string()),
        };
        let rendered = CodeGenError::from(diagnostic).to_string();
        assert_eq!(
            rendered,
            "Error at line 3, column 5: Variable already declared in current scope ('变量')\n  变量 := 2"
        );
    }

    #[test]
    fn test_diagnostic_display_unpositioned() {
        let diagnostic = Diagnostic::unpositioned("Break statement outside of loop");
        assert_eq!(
            diagnostic.to_string(),
            "Error: Break statement outside of loop"
        );
    }

    #[test]
    fn test_invalid_display() {
        let err = CodeGenError::invalid("code generator already consumed");
        assert_eq!(err.to_string(), "Error: code generator already consumed");
    }

    #[test]
    fn test_format_wraps_fmt_error() {
        let err = CodeGenError::from(std::fmt::Error);
        assert!(err.to_string().contains("IR generation error"));
    }
}
