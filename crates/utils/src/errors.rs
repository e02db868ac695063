use thiserror::Error;

/// Error type for turning JavaScript source into an AST.
#[derive(Debug, Error)]
pub enum ParseError {
    /// The parser rejected the input.
    #[error("syntax error at {line}:{col}: {msg}")]
    Syntax {
        /// 1-based line of the offending token.
        line: usize,
        /// 0-based display column of the offending token.
        col: usize,
        /// Parser diagnostic.
        msg: String,
    },

    #[error("could not read file '{path}': {source}")]
    FileRead {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Error type for printing an AST back to JavaScript.
#[derive(Debug, Error)]
pub enum CodegenError {
    #[error("emitter failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("emitter produced invalid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

/// Error type for the source-snippet template engine.
#[derive(Debug, Error)]
pub enum TemplateError {
    /// The template text itself does not parse.
    #[error("template `{source_text}` does not parse: {msg}")]
    Parse { source_text: String, msg: String },
    /// A `$name` placeholder was left without a binding.
    #[error("no binding supplied for placeholder `{0}`")]
    MissingBinding(String),
    /// The template parsed, but not into the node kind the caller asked for.
    #[error("template produced an unexpected node: expected {0}")]
    UnexpectedShape(&'static str),
}

/// Error type for obfuscation options.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A probability outside of `[0, 1]`.
    #[error("probability {value} for `{key}` is outside [0, 1]")]
    InvalidProbability { key: String, value: f64 },
    #[error("state range must be positive, got {0}")]
    InvalidStateRange(i64),
    #[error("invalid options JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("could not read options file '{path}': {source}")]
    FileRead {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Error type for metrics computation.
#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("program has no statements")]
    EmptyProgram,
    #[error("could not print program: {0}")]
    Codegen(#[from] CodegenError),
}

/// Error type for transform operations.
#[derive(Debug, Error)]
pub enum TransformError {
    #[error("template error: {0}")]
    Template(#[from] TemplateError),
    #[error("metrics computation failed: {0}")]
    MetricsError(#[from] MetricsError),
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("generic error: {0}")]
    Generic(String),
}

/// Errors that can occur during obfuscation.
#[derive(Debug, Error)]
pub enum ObfuscateError {
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),
    #[error("codegen error: {0}")]
    Codegen(#[from] CodegenError),
    /// File read/write error.
    #[error("file error: {0}")]
    File(#[from] std::io::Error),
    /// Transform application failed.
    #[error("transform error: {0}")]
    Transform(#[from] TransformError),
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    /// Invalid transform pass specified.
    #[error("invalid pass: {0}")]
    InvalidPass(String),
    /// JSON serialization error.
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}
