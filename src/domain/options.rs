use serde::{Deserialize, Serialize};
use std::fmt;

/// 產生輸出工作簿的方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
#[serde(rename_all = "kebab-case")]
pub enum GenerationMode {
    /// Mode A：每個模板工作表一份輸出，列依序號對齊主要來源工作表
    #[default]
    PerSheet,
    /// Mode B：跨多個來源檔逐欄壓縮合併到單一工作表
    ColumnarMerge,
}

impl fmt::Display for GenerationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GenerationMode::PerSheet => f.write_str("per-sheet"),
            GenerationMode::ColumnarMerge => f.write_str("columnar-merge"),
        }
    }
}

/// 自動配對時同一個來源欄可否同時對應多個模板欄
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
#[serde(rename_all = "kebab-case")]
pub enum UniquenessPolicy {
    /// 一次配對過程中已被佔用的來源欄會被跳過
    #[default]
    Exclusive,
    /// 同一個來源欄可以餵給多個模板欄
    Shared,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Limits {
    pub max_input_bytes: Option<usize>,
    pub max_source_rows: Option<usize>,
}

pub const DEFAULT_MERGED_SHEET_NAME: &str = "Output";
