use crate::domain::model::WorkbookId;
use crate::utils::error::{ReconcileError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const FIELD_SEPARATOR: char = '|';
const SCOPE_SEPARATOR: &str = "::";

fn split_sheet_field(value: &str) -> Result<(String, String)> {
    let (sheet, field) =
        value
            .split_once(FIELD_SEPARATOR)
            .ok_or_else(|| ReconcileError::InvalidKey {
                value: value.to_string(),
                reason: "expected 'Sheet|Field'".to_string(),
            })?;

    if sheet.is_empty() || field.trim().is_empty() {
        return Err(ReconcileError::InvalidKey {
            value: value.to_string(),
            reason: "sheet and field must be non-empty".to_string(),
        });
    }

    Ok((sheet.to_string(), field.to_string()))
}

/// 輸出欄位槽：`sheet|field`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TemplateKey {
    pub sheet: String,
    pub field: String,
}

impl TemplateKey {
    pub fn new(sheet: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            sheet: sheet.into(),
            field: field.into(),
        }
    }
}

impl fmt::Display for TemplateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.sheet, FIELD_SEPARATOR, self.field)
    }
}

impl FromStr for TemplateKey {
    type Err = ReconcileError;

    fn from_str(value: &str) -> Result<Self> {
        let (sheet, field) = split_sheet_field(value)?;
        Ok(Self { sheet, field })
    }
}

/// 輸入欄：`sheet|field`，可選擇限定在某個來源工作簿 (`workbook::sheet|field`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SourceKey {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workbook: Option<WorkbookId>,
    pub sheet: String,
    pub field: String,
}

impl SourceKey {
    pub fn new(sheet: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            workbook: None,
            sheet: sheet.into(),
            field: field.into(),
        }
    }

    pub fn scoped(mut self, workbook: impl Into<WorkbookId>) -> Self {
        self.workbook = Some(workbook.into());
        self
    }

    /// 未限定的鍵適用於任何來源工作簿
    pub fn applies_to(&self, workbook: &str) -> bool {
        self.workbook.as_deref().is_none_or(|scope| scope == workbook)
    }
}

impl fmt::Display for SourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(workbook) = &self.workbook {
            write!(f, "{}{}", workbook, SCOPE_SEPARATOR)?;
        }
        write!(f, "{}{}{}", self.sheet, FIELD_SEPARATOR, self.field)
    }
}

impl FromStr for SourceKey {
    type Err = ReconcileError;

    fn from_str(value: &str) -> Result<Self> {
        // 限定範圍只在 `::` 出現在第一個 `|` 之前時成立
        let scope_end = value
            .find(SCOPE_SEPARATOR)
            .filter(|pos| value.find(FIELD_SEPARATOR).is_none_or(|bar| *pos < bar));

        match scope_end {
            Some(pos) => {
                let (sheet, field) = split_sheet_field(&value[pos + SCOPE_SEPARATOR.len()..])?;
                Ok(Self::new(sheet, field).scoped(&value[..pos]))
            }
            None => {
                let (sheet, field) = split_sheet_field(value)?;
                Ok(Self::new(sheet, field))
            }
        }
    }
}

/// 一筆映射綁定，映射檔 (JSON) 的序列化格式
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingEntry {
    pub template: TemplateKey,
    pub source: SourceKey,
}

/// 命令列寫法：`Template|Field=Source|Field`，以第一個 `=` 分隔
impl FromStr for MappingEntry {
    type Err = ReconcileError;

    fn from_str(value: &str) -> Result<Self> {
        let (template, source) = value.split_once('=').ok_or_else(|| ReconcileError::InvalidKey {
            value: value.to_string(),
            reason: "expected 'Sheet|Field=Sheet|Field'".to_string(),
        })?;

        Ok(Self {
            template: template.trim().parse()?,
            source: source.trim().parse()?,
        })
    }
}
