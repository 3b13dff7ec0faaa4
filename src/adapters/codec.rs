use crate::domain::model::{CellValue, Row, Sheet, Workbook};
use crate::domain::ports::WorkbookCodec;
use crate::utils::error::{DecodeError, ReconcileError, Result};
use calamine::{open_workbook_auto_from_rs, Data, Reader};
use std::io::Cursor;
use std::path::Path;

const CSV_EXTENSION: &str = "csv";
const MAX_SHEET_NAME_CHARS: usize = 31;
const FORBIDDEN_SHEET_NAME_CHARS: [char; 7] = ['[', ']', ':', '*', '?', '/', '\\'];
const FALLBACK_SHEET_NAME: &str = "Sheet1";

/// xlsx/xls/xlsb/ods 由 calamine 讀取，`.csv` 由 csv crate 讀取；輸出一律寫成 xlsx
#[derive(Debug, Clone, Copy, Default)]
pub struct SpreadsheetCodec {
    max_input_bytes: Option<usize>,
}

impl SpreadsheetCodec {
    pub fn new(max_input_bytes: Option<usize>) -> Self {
        Self { max_input_bytes }
    }

    fn read_spreadsheet(&self, name: &str, bytes: &[u8]) -> Result<Vec<(String, Vec<Row>)>> {
        let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec())).map_err(|e| {
            ReconcileError::decode(
                name,
                DecodeError::Malformed {
                    reason: e.to_string(),
                },
            )
        })?;

        let mut grids = Vec::new();
        for sheet_name in workbook.sheet_names() {
            let range = workbook.worksheet_range(&sheet_name).map_err(|e| {
                ReconcileError::decode(
                    name,
                    DecodeError::Malformed {
                        reason: format!("sheet '{}': {}", sheet_name, e),
                    },
                )
            })?;

            let grid: Vec<Row> = range
                .rows()
                .map(|row| row.iter().map(cell_from_data).collect())
                .collect();
            grids.push((sheet_name, grid));
        }

        Ok(grids)
    }

    fn read_csv(&self, name: &str, bytes: &[u8]) -> Result<Vec<(String, Vec<Row>)>> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(bytes);

        let mut grid: Vec<Row> = Vec::new();
        // 逐欄以 lossy 方式解碼，非 UTF-8 (例如 cp1252) 的檔案仍可讀取
        for record in reader.byte_records() {
            let record = record.map_err(|e| {
                ReconcileError::decode(
                    name,
                    DecodeError::Malformed {
                        reason: e.to_string(),
                    },
                )
            })?;
            grid.push(
                record
                    .iter()
                    .map(|field| CellValue::text(String::from_utf8_lossy(field)))
                    .collect(),
            );
        }

        let sheet_name = Path::new(name)
            .file_stem()
            .and_then(|stem| stem.to_str())
            .filter(|stem| !stem.is_empty())
            .unwrap_or(FALLBACK_SHEET_NAME)
            .to_string();

        Ok(vec![(sheet_name, grid)])
    }
}

/// 依 Excel 規則整理工作表名稱：最多 31 字元，`[]:*?/\` 換成 `_`，
/// 前後不得為單引號，且不可為保留字 `History`。
pub fn excel_sheet_name(name: &str) -> String {
    let replaced: String = name
        .chars()
        .map(|c| if FORBIDDEN_SHEET_NAME_CHARS.contains(&c) { '_' } else { c })
        .collect();
    let truncated: String = replaced
        .trim_matches('\'')
        .chars()
        .take(MAX_SHEET_NAME_CHARS)
        .collect();
    let cleaned = truncated.trim_end_matches('\'');

    if cleaned.is_empty() {
        FALLBACK_SHEET_NAME.to_string()
    } else if cleaned.eq_ignore_ascii_case("history") {
        format!("{}_", cleaned)
    } else {
        cleaned.to_string()
    }
}

/// 整理後與已使用的名稱 (不分大小寫) 重複時，加上 `_2`、`_3`… 後綴
fn unique_sheet_name(name: &str, taken: &[&str]) -> String {
    let is_taken = |candidate: &str| taken.iter().any(|used| used.eq_ignore_ascii_case(candidate));
    let base = excel_sheet_name(name);
    if !is_taken(&base) {
        return base;
    }

    let mut n = 2;
    loop {
        let suffix = format!("_{}", n);
        let stem: String = base
            .chars()
            .take(MAX_SHEET_NAME_CHARS - suffix.chars().count())
            .collect();
        let candidate = format!("{}{}", stem, suffix);
        if !is_taken(&candidate) {
            return candidate;
        }
        n += 1;
    }
}

fn is_csv(name: &str) -> bool {
    Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(CSV_EXTENSION))
}

fn cell_from_data(data: &Data) -> CellValue {
    match data {
        Data::Empty => CellValue::Empty,
        Data::String(text) => CellValue::text(text.as_str()),
        Data::Float(value) => CellValue::Number(*value),
        Data::Int(value) => CellValue::Number(*value as f64),
        Data::Bool(value) => CellValue::Bool(*value),
        Data::DateTime(value) => CellValue::Number(value.as_f64()),
        Data::DateTimeIso(text) | Data::DurationIso(text) => CellValue::text(text.as_str()),
        Data::Error(error) => CellValue::text(error.to_string()),
    }
}

/// 第一列為標題列。標題空白的欄連同資料一起丟棄，讓每一列仍與 `headers` 依位置對齊；
/// 丟棄後沒有任何標題的工作表回傳 None。
fn sheet_from_grid(name: String, source_id: &str, grid: Vec<Row>) -> Option<Sheet> {
    let mut rows = grid.into_iter();
    let header_row = rows.next()?;

    let (kept, headers): (Vec<usize>, Vec<String>) = header_row
        .iter()
        .enumerate()
        .map(|(index, cell)| (index, cell.to_string()))
        .filter(|(_, header)| !header.trim().is_empty())
        .unzip();

    if headers.is_empty() {
        return None;
    }

    let rows: Vec<Row> = rows
        .map(|row| {
            let mut cells: Row = kept
                .iter()
                .map(|&index| row.get(index).cloned().unwrap_or_default())
                .collect();
            while cells.last().is_some_and(CellValue::is_empty) {
                cells.pop();
            }
            cells
        })
        .collect();

    Some(
        Sheet::new(name, source_id)
            .with_headers(headers)
            .with_rows(rows),
    )
}

fn grid_position(row: usize, column: usize) -> Result<(u32, u16)> {
    let row = u32::try_from(row).map_err(|_| ReconcileError::LimitExceeded {
        what: "output rows".to_string(),
        limit: u32::MAX as usize,
        actual: row,
    })?;
    let column = u16::try_from(column).map_err(|_| ReconcileError::LimitExceeded {
        what: "output columns".to_string(),
        limit: u16::MAX as usize,
        actual: column,
    })?;
    Ok((row, column))
}

impl WorkbookCodec for SpreadsheetCodec {
    fn decode(&self, id: &str, name: &str, bytes: &[u8]) -> Result<Workbook> {
        if let Some(limit) = self.max_input_bytes {
            if bytes.len() > limit {
                return Err(ReconcileError::decode(
                    name,
                    DecodeError::TooLarge {
                        size: bytes.len(),
                        limit,
                    },
                ));
            }
        }

        let grids = if is_csv(name) {
            self.read_csv(name, bytes)?
        } else {
            self.read_spreadsheet(name, bytes)?
        };

        let sheet_count = grids.len();
        let mut workbook = Workbook::new(id).with_name(name);
        for (sheet_name, grid) in grids {
            let taken: Vec<&str> = workbook.sheets.iter().map(|sheet| sheet.name.as_str()).collect();
            let cleaned = unique_sheet_name(&sheet_name, &taken);
            if cleaned != sheet_name {
                tracing::debug!("✏️ Sheet '{}' in '{}' renamed to '{}'", sheet_name, name, cleaned);
            }
            if let Some(sheet) = sheet_from_grid(cleaned, id, grid) {
                workbook = workbook.with_sheet(sheet);
            }
        }

        if workbook.sheets.is_empty() {
            return Err(ReconcileError::decode(name, DecodeError::NoUsableSheets));
        }

        tracing::debug!(
            "📖 Decoded '{}': {} of {} sheet(s) usable, {} data rows",
            name,
            workbook.sheets.len(),
            sheet_count,
            workbook.total_rows()
        );
        Ok(workbook)
    }

    fn encode(&self, workbook: &Workbook) -> Result<Vec<u8>> {
        let mut book = rust_xlsxwriter::Workbook::new();

        let mut written: Vec<String> = Vec::new();
        for sheet in &workbook.sheets {
            let taken: Vec<&str> = written.iter().map(String::as_str).collect();
            let sheet_name = unique_sheet_name(&sheet.name, &taken);
            if sheet_name != sheet.name {
                tracing::warn!("⚠️ Output sheet '{}' written as '{}'", sheet.name, sheet_name);
            }

            let worksheet = book.add_worksheet();
            worksheet.set_name(&sheet_name)?;
            written.push(sheet_name);

            for (index, header) in sheet.headers.iter().enumerate() {
                let (row, column) = grid_position(0, index)?;
                worksheet.write_string(row, column, &header.name)?;
            }

            for (row_index, cells) in sheet.rows.iter().enumerate() {
                for (column_index, cell) in cells.iter().enumerate() {
                    let (row, column) = grid_position(row_index + 1, column_index)?;
                    match cell {
                        CellValue::Empty => {}
                        CellValue::Text(text) => {
                            worksheet.write_string(row, column, text)?;
                        }
                        CellValue::Number(value) => {
                            worksheet.write_number(row, column, *value)?;
                        }
                        CellValue::Bool(value) => {
                            worksheet.write_boolean(row, column, *value)?;
                        }
                    }
                }
            }
        }

        Ok(book.save_to_buffer()?)
    }
}
