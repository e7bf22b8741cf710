use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Machine-readable error codes surfaced by the CLI and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    CorpusInvalid,
    ConfigParseError,
    IndexUnavailable,
    EmbeddingModelFailed,
    QueryParseError,
    GenerationFailed,
    Timeout,
}

impl ErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::CorpusInvalid => "E1001",
            Self::ConfigParseError => "E1002",
            Self::IndexUnavailable => "E2001",
            Self::EmbeddingModelFailed => "E3001",
            Self::QueryParseError => "E4001",
            Self::GenerationFailed => "E5001",
            Self::Timeout => "E5002",
        }
    }

    /// Short human-facing summary for logs and terminal output.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::CorpusInvalid => "Article corpus invalid",
            Self::ConfigParseError => "Config file parse error",
            Self::IndexUnavailable => "Search index unavailable",
            Self::EmbeddingModelFailed => "Embedding model failed",
            Self::QueryParseError => "Query could not be parsed",
            Self::GenerationFailed => "Answer generation failed",
            Self::Timeout => "Operation timed out",
        }
    }

    /// Optional remediation hint for the person at the terminal.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::CorpusInvalid => {
                Some("Check the corpus is a JSON array of articles with unique numbers.")
            }
            Self::ConfigParseError => Some("Fix syntax in the katiba config.toml and retry."),
            Self::IndexUnavailable => {
                Some("Run `katiba index --rebuild` to recreate the index directories.")
            }
            Self::EmbeddingModelFailed => {
                Some("Verify the embedding backend settings under [search] in config.toml.")
            }
            Self::QueryParseError => Some("Rephrase the question using plain words."),
            Self::GenerationFailed => {
                Some("Check LLM_API_KEY, LLM_MODEL_NAME and LLM_BASE_URL, then retry.")
            }
            Self::Timeout => Some("Retry later or raise the timeout in config.toml."),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Errors returned by the public katiba API.
#[derive(Debug, thiserror::Error)]
pub enum KatibaError {
    /// The article corpus could not be read or failed validation.
    #[error("corpus {}: {reason}", path.display())]
    Corpus { path: PathBuf, reason: String },

    /// The configuration file could not be parsed.
    #[error("config {}: {reason}", path.display())]
    Config { path: PathBuf, reason: String },

    /// Index location inaccessible, corrupted, or the build failed partway.
    #[error("index unavailable at {}: {reason}", location.display())]
    IndexUnavailable { location: PathBuf, reason: String },

    /// The embedding model failed to load or run.
    #[error("embedding model error: {0}")]
    EmbeddingModel(String),

    /// The lexical query parser rejected the query.
    #[error("could not parse query '{query}': {reason}")]
    QueryParse { query: String, reason: String },

    /// The remote completion call failed.
    #[error("generation error: {0}")]
    Generation(String),

    /// A blocking operation exceeded its deadline.
    #[error("{operation} timed out after {waited:?}")]
    Timeout {
        operation: &'static str,
        waited: Duration,
    },
}

impl KatibaError {
    /// Wrap an internal error chain as [`KatibaError::IndexUnavailable`].
    pub fn index_unavailable(location: &Path, err: &anyhow::Error) -> Self {
        Self::IndexUnavailable {
            location: location.to_path_buf(),
            reason: format!("{err:#}"),
        }
    }

    /// Machine-readable code associated with this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Corpus { .. } => ErrorCode::CorpusInvalid,
            Self::Config { .. } => ErrorCode::ConfigParseError,
            Self::IndexUnavailable { .. } => ErrorCode::IndexUnavailable,
            Self::EmbeddingModel(_) => ErrorCode::EmbeddingModelFailed,
            Self::QueryParse { .. } => ErrorCode::QueryParseError,
            Self::Generation(_) => ErrorCode::GenerationFailed,
            Self::Timeout { .. } => ErrorCode::Timeout,
        }
    }

    /// Optional remediation hint.
    #[must_use]
    pub const fn hint(&self) -> Option<&'static str> {
        self.code().hint()
    }
}

pub type Result<T, E = KatibaError> = std::result::Result<T, E>;

/// True when `err` or anything in its source chain is an I/O timeout.
///
/// HTTP clients wrap socket timeouts several layers deep; the message check
/// catches transports that flatten the cause into text.
#[must_use]
pub fn is_timeout(err: &(dyn std::error::Error + 'static)) -> bool {
    let mut current = Some(err);
    while let Some(err) = current {
        let io_timeout = err.downcast_ref::<std::io::Error>().is_some_and(|io| {
            matches!(
                io.kind(),
                std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock
            )
        });
        if io_timeout || err.to_string().contains("timed out") {
            return true;
        }
        current = err.source();
    }
    false
}

#[cfg(test)]
mod tests {
    use super::{ErrorCode, KatibaError, is_timeout};
    use std::collections::HashSet;
    use std::path::Path;

    const ALL: [ErrorCode; 7] = [
        ErrorCode::CorpusInvalid,
        ErrorCode::ConfigParseError,
        ErrorCode::IndexUnavailable,
        ErrorCode::EmbeddingModelFailed,
        ErrorCode::QueryParseError,
        ErrorCode::GenerationFailed,
        ErrorCode::Timeout,
    ];

    #[test]
    fn all_codes_are_unique() {
        let mut seen = HashSet::new();
        for code in ALL {
            assert!(seen.insert(code.code()), "duplicate code {}", code.code());
        }
    }

    #[test]
    fn code_format_is_machine_friendly() {
        for code in ALL {
            let code = code.code();
            assert_eq!(code.len(), 5);
            assert!(code.starts_with('E'));
            assert!(code.chars().skip(1).all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn index_unavailable_keeps_context_chain() {
        let inner = anyhow::anyhow!("disk on fire").context("open lexical index");
        let err = KatibaError::index_unavailable(Path::new("/tmp/idx"), &inner);
        let msg = err.to_string();
        assert!(msg.contains("/tmp/idx"));
        assert!(msg.contains("open lexical index"));
        assert!(msg.contains("disk on fire"));
        assert_eq!(err.code(), ErrorCode::IndexUnavailable);
        assert!(err.hint().is_some());
    }

    #[derive(Debug, thiserror::Error)]
    #[error("request failed")]
    struct Wrapper(#[source] std::io::Error);

    #[test]
    fn timeout_found_in_source_chain() {
        let wrapped = Wrapper(std::io::Error::new(std::io::ErrorKind::TimedOut, "socket"));
        assert!(is_timeout(&wrapped));

        let refused = Wrapper(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "refused",
        ));
        assert!(!is_timeout(&refused));
    }
}
