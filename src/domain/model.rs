use crate::domain::keys::MappingEntry;
use crate::domain::options::GenerationMode;
use serde::{Deserialize, Serialize};
use std::fmt;

pub type WorkbookId = String;

/// 儲存格的值。解碼後不可變，重新產生時重新推導而不是就地修改。
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    #[default]
    Empty,
    Bool(bool),
    Number(f64),
    Text(String),
}

static EMPTY_CELL: CellValue = CellValue::Empty;

impl CellValue {
    /// `Empty` 與空字串都算空；只有空白的字串是使用者輸入的值，不算空
    pub fn is_empty(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Text(text) => text.is_empty(),
            _ => false,
        }
    }

    pub fn text(value: impl Into<String>) -> Self {
        let value = value.into();
        if value.is_empty() {
            CellValue::Empty
        } else {
            CellValue::Text(value)
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Empty => Ok(()),
            CellValue::Bool(value) => write!(f, "{}", value),
            CellValue::Number(value) => write!(f, "{}", value),
            CellValue::Text(value) => f.write_str(value),
        }
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        CellValue::text(value)
    }
}

impl From<String> for CellValue {
    fn from(value: String) -> Self {
        CellValue::text(value)
    }
}

impl From<f64> for CellValue {
    fn from(value: f64) -> Self {
        CellValue::Number(value)
    }
}

impl From<bool> for CellValue {
    fn from(value: bool) -> Self {
        CellValue::Bool(value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
}

impl Field {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

pub type Row = Vec<CellValue>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sheet {
    pub name: String,
    pub headers: Vec<Field>,
    pub rows: Vec<Row>,
    pub source_id: WorkbookId,
}

impl Sheet {
    pub fn new(name: impl Into<String>, source_id: impl Into<WorkbookId>) -> Self {
        Self {
            name: name.into(),
            headers: Vec::new(),
            rows: Vec::new(),
            source_id: source_id.into(),
        }
    }

    pub fn with_headers<I, S>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.headers = headers.into_iter().map(Field::new).collect();
        self
    }

    pub fn with_rows<R, C>(mut self, rows: R) -> Self
    where
        R: IntoIterator<Item = C>,
        C: IntoIterator<Item = CellValue>,
    {
        self.rows = rows
            .into_iter()
            .map(|row| row.into_iter().collect())
            .collect();
        self
    }

    /// 欄位名稱（區分大小寫）的欄索引；重複的標題以第一個為準
    pub fn column_index(&self, field: &str) -> Option<usize> {
        self.headers.iter().position(|header| header.name == field)
    }

    /// 列可能比標題短，缺少的尾端儲存格視為空
    pub fn cell(&self, row: usize, column: usize) -> &CellValue {
        self.rows
            .get(row)
            .and_then(|cells| cells.get(column))
            .unwrap_or(&EMPTY_CELL)
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workbook {
    pub id: WorkbookId,
    pub name: Option<String>,
    pub sheets: Vec<Sheet>,
}

impl Workbook {
    pub fn new(id: impl Into<WorkbookId>) -> Self {
        Self {
            id: id.into(),
            name: None,
            sheets: Vec::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// 加入工作表並把它的 `source_id` 設為本工作簿
    pub fn with_sheet(mut self, mut sheet: Sheet) -> Self {
        sheet.source_id = self.id.clone();
        self.sheets.push(sheet);
        self
    }

    pub fn sheet(&self, name: &str) -> Option<&Sheet> {
        self.sheets.iter().find(|sheet| sheet.name == name)
    }

    pub fn total_rows(&self) -> usize {
        self.sheets.iter().map(Sheet::row_count).sum()
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }
}

/// 因讀取或解碼失敗而被略過的來源檔
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedSource {
    pub id: WorkbookId,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct ExtractedInputs {
    pub template: Workbook,
    pub sources: Vec<Workbook>,
    pub skipped: Vec<SkippedSource>,
}

#[derive(Debug, Clone)]
pub struct TransformResult {
    pub workbook: Workbook,
    pub mapping: Vec<MappingEntry>,
    pub mode: GenerationMode,
    /// 依選取順序排列的來源檔名稱，用來決定輸出檔名
    pub source_names: Vec<String>,
    pub skipped: Vec<SkippedSource>,
}
