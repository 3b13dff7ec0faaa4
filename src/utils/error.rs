use thiserror::Error;

/// 工作簿解碼失敗的原因
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("malformed workbook: {reason}")]
    Malformed { reason: String },

    #[error("no usable sheets (every sheet has a blank header row)")]
    NoUsableSheets,

    #[error("input is {size} bytes, limit is {limit} bytes")]
    TooLarge { size: usize, limit: usize },
}

#[derive(Error, Debug)]
pub enum ReconcileError {
    #[error("Failed to decode workbook '{name}': {source}")]
    Decode {
        name: String,
        #[source]
        source: DecodeError,
    },

    #[error("No field mappings defined; map at least one field before generating")]
    NoMapping,

    #[error("Generation produced no output in {mode} mode")]
    EmptyResult { mode: String },

    #[error("Limit exceeded for {what}: {actual} > {limit}")]
    LimitExceeded {
        what: String,
        limit: usize,
        actual: usize,
    },

    #[error("Unknown source workbook: {id}")]
    UnknownSource { id: String },

    #[error("Source workbook already loaded: {id}")]
    DuplicateSource { id: String },

    #[error("No source workbooks could be loaded")]
    NoSources,

    #[error("Invalid key '{value}': {reason}")]
    InvalidKey { value: String, reason: String },

    #[error("Storage error at '{location}': {message}")]
    Storage { location: String, message: String },

    #[error("Workbook encoding failed: {0}")]
    EncodeError(#[from] rust_xlsxwriter::XlsxError),

    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Configuration validation failed for '{field}': {message}")]
    ConfigValidationError { field: String, message: String },

    #[error("Invalid value '{value}' for '{field}': {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Missing required configuration: {field}")]
    MissingConfigError { field: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Input,
    Mapping,
    Output,
    Storage,
    Configuration,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl ReconcileError {
    pub fn decode(name: impl Into<String>, source: DecodeError) -> Self {
        Self::Decode {
            name: name.into(),
            source,
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Decode { .. }
            | Self::NoSources
            | Self::LimitExceeded { .. } => ErrorCategory::Input,
            Self::NoMapping
            | Self::EmptyResult { .. }
            | Self::UnknownSource { .. }
            | Self::DuplicateSource { .. }
            | Self::InvalidKey { .. } => ErrorCategory::Mapping,
            Self::EncodeError(_) | Self::SerializationError(_) => ErrorCategory::Output,
            Self::Storage { .. } | Self::HttpError(_) => ErrorCategory::Storage,
            Self::ConfigError { .. }
            | Self::ConfigValidationError { .. }
            | Self::InvalidConfigValueError { .. }
            | Self::MissingConfigError { .. } => ErrorCategory::Configuration,
            Self::IoError(_) => ErrorCategory::System,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self {
            // 空結果不是系統故障，使用者修正映射後即可重試
            Self::EmptyResult { .. } | Self::HttpError(_) | Self::Storage { .. } => {
                ErrorSeverity::Medium
            }
            Self::IoError(_) => ErrorSeverity::Critical,
            _ => ErrorSeverity::High,
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self {
            Self::Decode {
                source: DecodeError::NoUsableSheets,
                ..
            } => "Make sure the first row of at least one sheet contains column headers",
            Self::Decode {
                source: DecodeError::TooLarge { .. },
                ..
            } => "Split the workbook or raise --max-input-bytes",
            Self::Decode { .. } => "Check that the file is a valid .xlsx/.xls/.ods/.csv workbook",
            Self::NoMapping => "Map at least one template field with --map or a mapping file",
            Self::EmptyResult { .. } => {
                "The mapped source columns contain no data; check the mapping or the source files"
            }
            Self::LimitExceeded { .. } => "Reduce the input size or raise the configured limit",
            Self::UnknownSource { .. } | Self::DuplicateSource { .. } => {
                "Check the source file list for typos and duplicates"
            }
            Self::NoSources => "Provide at least one readable source workbook",
            Self::InvalidKey { .. } => "Keys are written as 'Sheet|Field'",
            Self::Storage { .. } | Self::HttpError(_) => {
                "Check the template location and network connectivity, then retry"
            }
            Self::EncodeError(_) => {
                "Template sheet names must be valid Excel sheet names (max 31 characters)"
            }
            Self::SerializationError(_) => "Check the mapping file is valid JSON",
            Self::ConfigError { .. }
            | Self::ConfigValidationError { .. }
            | Self::InvalidConfigValueError { .. }
            | Self::MissingConfigError { .. } => "Fix the configuration and run again",
            Self::IoError(_) => "Check file paths and permissions",
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self {
            Self::Decode { name, source } => format!("Could not read '{}': {}", name, source),
            Self::NoMapping => {
                "Please map at least one field before generating the workbook".to_string()
            }
            Self::EmptyResult { .. } => "No data to write: every mapped column is empty".to_string(),
            other => other.to_string(),
        }
    }

    /// 讀取或解碼失敗只影響單一檔案，批次中的其他檔案繼續處理
    pub fn is_per_file(&self) -> bool {
        matches!(
            self,
            Self::Decode { .. }
                | Self::IoError(_)
                | Self::Storage { .. }
                | Self::HttpError(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, ReconcileError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_result_is_retryable() {
        let err = ReconcileError::EmptyResult {
            mode: "columnar-merge".to_string(),
        };
        assert_eq!(err.severity(), ErrorSeverity::Medium);
        assert_eq!(err.category(), ErrorCategory::Mapping);
    }

    #[test]
    fn test_no_usable_sheets_is_a_decode_error() {
        let err = ReconcileError::decode("blank.xlsx", DecodeError::NoUsableSheets);
        assert_eq!(err.category(), ErrorCategory::Input);
        assert!(err.is_per_file());
        assert!(err.user_friendly_message().contains("blank.xlsx"));
        assert!(err.recovery_suggestion().contains("headers"));
    }

    #[test]
    fn test_no_mapping_is_not_per_file() {
        assert!(!ReconcileError::NoMapping.is_per_file());
    }
}
