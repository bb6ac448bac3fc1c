use thiserror::Error;

/// Represents errors that can occur while compiling or executing a template.
#[derive(Error, Debug)]
pub enum TemplateError {
    #[error("\"else\" at offset {offset} should be inside of \"if\" or \"loop\"")]
    UnexpectedElse { offset: usize },
    #[error("\"else\" at offset {offset} follows another \"else\" of the same block")]
    DuplicateElse { offset: usize },
    #[error("\"end\" at offset {offset} should close \"if\" or \"loop\"")]
    UnexpectedEnd { offset: usize },
    #[error("block opened at offset {offset} was not closed properly")]
    Unclosed { offset: usize },
    #[error("Invalid marker pattern: {0}")]
    Pattern(#[from] regex::Error),
    #[error("Unknown filter: {0}")]
    UnknownFilter(String),
    #[error("Invalid literal {literal}: {reason}")]
    LiteralParse { literal: String, reason: String },
    #[error("Serialize error: {0}")]
    Serialize(String),
}

impl TemplateError {
    /// True for every error `compile` can raise because of block structure or pattern.
    pub fn is_compile_error(&self) -> bool {
        matches!(
            self,
            TemplateError::UnexpectedElse { .. }
                | TemplateError::DuplicateElse { .. }
                | TemplateError::UnexpectedEnd { .. }
                | TemplateError::Unclosed { .. }
                | TemplateError::Pattern(_)
        )
    }
}

impl serde::ser::Error for TemplateError {
    fn custom<T: std::fmt::Display>(msg: T) -> Self {
        TemplateError::Serialize(msg.to_string())
    }
}

pub type Result<T> = std::result::Result<T, TemplateError>;
