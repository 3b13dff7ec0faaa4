use crate::core::mapping::MappingStore;
use crate::domain::keys::{SourceKey, TemplateKey};
use crate::domain::model::{CellValue, Row, Sheet, Workbook};
use crate::domain::options::{GenerationMode, Limits, DEFAULT_MERGED_SHEET_NAME};
use crate::utils::error::{ReconcileError, Result};

pub const OUTPUT_WORKBOOK_ID: &str = "output";

/// 由最終映射與來源工作簿產生輸出工作簿。純函式，不做 I/O。
#[derive(Debug, Clone)]
pub struct SynthesisEngine {
    limits: Limits,
    merged_sheet_name: String,
}

impl Default for SynthesisEngine {
    fn default() -> Self {
        Self::new(Limits::default())
    }
}

/// 一個已解析的欄：來源工作表 + 欄索引
struct ResolvedColumn<'a> {
    sheet: &'a Sheet,
    column: usize,
}

impl SynthesisEngine {
    pub fn new(limits: Limits) -> Self {
        Self {
            limits,
            merged_sheet_name: DEFAULT_MERGED_SHEET_NAME.to_string(),
        }
    }

    pub fn with_merged_sheet_name(mut self, name: impl Into<String>) -> Self {
        self.merged_sheet_name = name.into();
        self
    }

    pub fn synthesize(
        &self,
        mode: GenerationMode,
        template: &Workbook,
        mapping: &MappingStore,
        sources: &[&Workbook],
    ) -> Result<Workbook> {
        if mapping.is_empty() {
            return Err(ReconcileError::NoMapping);
        }
        self.check_row_ceiling(sources)?;

        tracing::info!(
            "🧮 Synthesizing in {} mode: {} mapping entries, {} source workbook(s)",
            mode,
            mapping.len(),
            sources.len()
        );

        match mode {
            GenerationMode::PerSheet => self.per_sheet(template, mapping, sources),
            GenerationMode::ColumnarMerge => self.columnar_merge(template, mapping, sources),
        }
    }

    /// 在合成前檢查來源列數上限，避免無上限的記憶體使用
    fn check_row_ceiling(&self, sources: &[&Workbook]) -> Result<()> {
        if let Some(limit) = self.limits.max_source_rows {
            let actual: usize = sources.iter().map(|workbook| workbook.total_rows()).sum();
            if actual > limit {
                return Err(ReconcileError::LimitExceeded {
                    what: "source rows".to_string(),
                    limit,
                    actual,
                });
            }
        }
        Ok(())
    }

    /// Mode A：每個模板工作表產生一個輸出工作表，列依序號對齊主要來源工作表
    fn per_sheet(
        &self,
        template: &Workbook,
        mapping: &MappingStore,
        sources: &[&Workbook],
    ) -> Result<Workbook> {
        let mut output = Workbook::new(OUTPUT_WORKBOOK_ID);

        for template_sheet in &template.sheets {
            let keys: Vec<TemplateKey> = template_sheet
                .headers
                .iter()
                .map(|header| TemplateKey::new(&template_sheet.name, &header.name))
                .collect();

            // 每個模板欄解析到的來源欄；未映射或解析不到的為 None
            let columns: Vec<Option<ResolvedColumn>> = keys
                .iter()
                .map(|key| {
                    mapping
                        .get(key)
                        .and_then(|source| resolve_single(source, sources))
                })
                .collect();

            if !keys.iter().any(|key| mapping.get(key).is_some()) {
                tracing::debug!("⏭️ Template sheet '{}' has no mappings, skipped", template_sheet.name);
                continue;
            }

            // 主要來源工作表：依模板標題順序第一個可解析的映射
            let Some(primary) = columns.iter().flatten().next().map(|column| column.sheet) else {
                tracing::warn!(
                    "⏭️ Template sheet '{}' maps only to missing source sheets, skipped",
                    template_sheet.name
                );
                continue;
            };

            let rows: Vec<Row> = (0..primary.row_count())
                .map(|index| {
                    columns
                        .iter()
                        .map(|column| match column {
                            Some(column) => column.sheet.cell(index, column.column).clone(),
                            None => CellValue::Empty,
                        })
                        .collect()
                })
                .collect();

            tracing::info!(
                "📄 '{}': {} rows from primary source sheet '{}'",
                template_sheet.name,
                rows.len(),
                primary.name
            );

            output = output.with_sheet(
                Sheet::new(&template_sheet.name, OUTPUT_WORKBOOK_ID)
                    .with_headers(template_sheet.headers.iter().map(|header| header.name.clone()))
                    .with_rows(rows),
            );
        }

        if output.sheets.is_empty() {
            return Err(ReconcileError::EmptyResult {
                mode: GenerationMode::PerSheet.to_string(),
            });
        }
        Ok(output)
    }

    /// Mode B：每個映射欄獨立壓縮（丟棄空值）後再依位置重組成列。
    /// 壓縮後的列與原始來源列之間不保留對應關係。
    fn columnar_merge(
        &self,
        template: &Workbook,
        mapping: &MappingStore,
        sources: &[&Workbook],
    ) -> Result<Workbook> {
        let entries: Vec<(&TemplateKey, &SourceKey)> = mapping
            .iter()
            .filter(|(key, _)| {
                let present = template_has_field(template, key);
                if !present {
                    tracing::warn!("🗑️ Ignoring stale mapping entry for removed template field {}", key);
                }
                present
            })
            .collect();

        if entries.is_empty() {
            return Err(ReconcileError::NoMapping);
        }

        let buffers: Vec<Vec<CellValue>> = entries
            .iter()
            .map(|(_, source)| column_buffer(source, sources))
            .collect();

        let max_length = buffers.iter().map(Vec::len).max().unwrap_or(0);

        let rows: Vec<Row> = (0..max_length)
            .map(|index| {
                buffers
                    .iter()
                    .map(|buffer| buffer.get(index).cloned().unwrap_or_default())
                    .collect::<Row>()
            })
            .filter(|row| row.iter().any(|cell| !cell.is_empty()))
            .collect();

        if rows.is_empty() {
            return Err(ReconcileError::EmptyResult {
                mode: GenerationMode::ColumnarMerge.to_string(),
            });
        }

        tracing::info!(
            "📄 '{}': {} merged rows across {} columns",
            self.merged_sheet_name,
            rows.len(),
            entries.len()
        );

        Ok(Workbook::new(OUTPUT_WORKBOOK_ID).with_sheet(
            Sheet::new(&self.merged_sheet_name, OUTPUT_WORKBOOK_ID)
                .with_headers(entries.iter().map(|(key, _)| key.field.clone()))
                .with_rows(rows),
        ))
    }
}

fn template_has_field(template: &Workbook, key: &TemplateKey) -> bool {
    template
        .sheet(&key.sheet)
        .is_some_and(|sheet| sheet.column_index(&key.field).is_some())
}

/// Mode A 的解析：第一個符合範圍且含有該工作表與欄位的來源
fn resolve_single<'a>(source: &SourceKey, sources: &[&'a Workbook]) -> Option<ResolvedColumn<'a>> {
    sources
        .iter()
        .copied()
        .filter(|workbook| source.applies_to(&workbook.id))
        .filter_map(|workbook| workbook.sheet(&source.sheet))
        .find_map(|sheet| {
            sheet
                .column_index(&source.field)
                .map(|column| ResolvedColumn { sheet, column })
        })
}

/// Mode B 的欄緩衝：依檔案順序掃描每個來源，只收集非空值
fn column_buffer(source: &SourceKey, sources: &[&Workbook]) -> Vec<CellValue> {
    let mut buffer = Vec::new();

    for workbook in sources.iter().filter(|workbook| source.applies_to(&workbook.id)) {
        let Some(sheet) = workbook.sheet(&source.sheet) else {
            continue;
        };
        let Some(column) = sheet.column_index(&source.field) else {
            continue;
        };

        buffer.extend(
            (0..sheet.row_count())
                .map(|index| sheet.cell(index, column))
                .filter(|cell| !cell.is_empty())
                .cloned(),
        );
    }

    buffer
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_rows(rows: &[&[&str]]) -> Vec<Vec<CellValue>> {
        rows.iter()
            .map(|row| row.iter().map(|value| CellValue::from(*value)).collect())
            .collect()
    }

    fn workbook(id: &str, sheets: Vec<Sheet>) -> Workbook {
        sheets
            .into_iter()
            .fold(Workbook::new(id), |workbook, sheet| workbook.with_sheet(sheet))
    }

    fn sheet(name: &str, headers: &[&str], rows: &[&[&str]]) -> Sheet {
        Sheet::new(name, "")
            .with_headers(headers.iter().copied())
            .with_rows(text_rows(rows))
    }

    fn mapping(pairs: &[(&str, &str)]) -> MappingStore {
        let mut store = MappingStore::new();
        for (template, source) in pairs {
            store.set(template.parse().unwrap(), source.parse().unwrap());
        }
        store
    }

    #[test]
    fn test_per_sheet_uses_template_names_and_source_values() {
        let template = workbook("t", vec![sheet("Contacts", &["Name"], &[])]);
        let source = workbook("s", vec![sheet("People", &["FullName"], &[&["Alice"], &["Bob"]])]);
        let mapping = mapping(&[("Contacts|Name", "People|FullName")]);

        let output = SynthesisEngine::default()
            .synthesize(GenerationMode::PerSheet, &template, &mapping, &[&source])
            .unwrap();

        assert_eq!(output.sheets.len(), 1);
        let sheet = &output.sheets[0];
        assert_eq!(sheet.name, "Contacts");
        assert_eq!(sheet.headers, vec![crate::domain::model::Field::new("Name")]);
        assert_eq!(sheet.rows, text_rows(&[&["Alice"], &["Bob"]]));
    }

    #[test]
    fn test_per_sheet_skips_unmapped_template_sheets() {
        let template = workbook(
            "t",
            vec![sheet("S1", &["A"], &[]), sheet("S2", &["B"], &[])],
        );
        let source = workbook("s", vec![sheet("Data", &["A"], &[&["1"]])]);
        let mapping = mapping(&[("S1|A", "Data|A")]);

        let output = SynthesisEngine::default()
            .synthesize(GenerationMode::PerSheet, &template, &mapping, &[&source])
            .unwrap();

        let names: Vec<_> = output.sheets.iter().map(|sheet| sheet.name.as_str()).collect();
        assert_eq!(names, vec!["S1"]);
    }

    #[test]
    fn test_per_sheet_skips_first_sheet_silently_when_others_are_mapped() {
        let template = workbook(
            "t",
            vec![sheet("S1", &["A"], &[]), sheet("S2", &["B"], &[])],
        );
        let source = workbook("s", vec![sheet("Data", &["B"], &[&["1"]])]);
        let mapping = mapping(&[("S2|B", "Data|B")]);

        let output = SynthesisEngine::default()
            .synthesize(GenerationMode::PerSheet, &template, &mapping, &[&source])
            .unwrap();

        assert_eq!(output.sheets.len(), 1);
        assert_eq!(output.sheets[0].name, "S2");
    }

    #[test]
    fn test_per_sheet_aligns_secondary_sheet_by_ordinal() {
        let template = workbook("t", vec![sheet("Out", &["Name", "Blank", "City"], &[])]);
        let source = workbook(
            "s",
            vec![
                sheet("People", &["Name"], &[&["Alice"], &["Bob"], &["Cara"]]),
                sheet("Places", &["City"], &[&["Oslo"]]),
            ],
        );
        let mapping = mapping(&[("Out|City", "Places|City"), ("Out|Name", "People|Name")]);

        let output = SynthesisEngine::default()
            .synthesize(GenerationMode::PerSheet, &template, &mapping, &[&source])
            .unwrap();

        // 主要來源依模板標題順序決定（Name 在 City 之前），而非映射插入順序
        assert_eq!(
            output.sheets[0].rows,
            vec![
                vec!["Alice".into(), CellValue::Empty, "Oslo".into()],
                vec!["Bob".into(), CellValue::Empty, CellValue::Empty],
                vec!["Cara".into(), CellValue::Empty, CellValue::Empty],
            ]
        );
    }

    #[test]
    fn test_per_sheet_empty_mapping_is_no_mapping_error() {
        let template = workbook("t", vec![sheet("S1", &["A"], &[])]);
        let source = workbook("s", vec![sheet("Data", &["A"], &[&["1"]])]);

        let err = SynthesisEngine::default()
            .synthesize(GenerationMode::PerSheet, &template, &MappingStore::new(), &[&source])
            .unwrap_err();
        assert!(matches!(err, ReconcileError::NoMapping));
    }

    #[test]
    fn test_per_sheet_unresolvable_sources_yield_empty_result() {
        let template = workbook("t", vec![sheet("S1", &["A"], &[])]);
        let source = workbook("s", vec![sheet("Data", &["A"], &[&["1"]])]);
        let mapping = mapping(&[("S1|A", "Gone|A")]);

        let err = SynthesisEngine::default()
            .synthesize(GenerationMode::PerSheet, &template, &mapping, &[&source])
            .unwrap_err();
        assert!(matches!(err, ReconcileError::EmptyResult { .. }));
    }

    #[test]
    fn test_per_sheet_stale_entries_are_not_surfaced() {
        let template = workbook("t", vec![sheet("S1", &["A"], &[])]);
        let source = workbook("s", vec![sheet("Data", &["A", "B"], &[&["1", "2"]])]);
        let mapping = mapping(&[("S1|A", "Data|A"), ("S1|Removed", "Data|B")]);

        let output = SynthesisEngine::default()
            .synthesize(GenerationMode::PerSheet, &template, &mapping, &[&source])
            .unwrap();
        assert_eq!(output.sheets[0].rows, text_rows(&[&["1"]]));
    }

    #[test]
    fn test_per_sheet_scoped_key_reads_named_workbook() {
        let template = workbook("t", vec![sheet("Out", &["Name"], &[])]);
        let first = workbook("a.xlsx", vec![sheet("People", &["Name"], &[&["from a"]])]);
        let second = workbook("b.xlsx", vec![sheet("People", &["Name"], &[&["from b"]])]);
        let mapping = mapping(&[("Out|Name", "b.xlsx::People|Name")]);

        let output = SynthesisEngine::default()
            .synthesize(GenerationMode::PerSheet, &template, &mapping, &[&first, &second])
            .unwrap();
        assert_eq!(output.sheets[0].rows, text_rows(&[&["from b"]]));
    }

    #[test]
    fn test_columnar_merge_compacts_sparse_columns_in_file_order() {
        let template = workbook("t", vec![sheet("T", &["Code"], &[])]);
        let first = workbook("1", vec![sheet("Data", &["Code"], &[&["X"], &[""], &["Y"]])]);
        let second = workbook("2", vec![sheet("Data", &["Code"], &[&[""], &["Z"]])]);
        let mapping = mapping(&[("T|Code", "Data|Code")]);

        let output = SynthesisEngine::default()
            .synthesize(GenerationMode::ColumnarMerge, &template, &mapping, &[&first, &second])
            .unwrap();

        let sheet = &output.sheets[0];
        assert_eq!(sheet.name, DEFAULT_MERGED_SHEET_NAME);
        assert_eq!(sheet.rows, text_rows(&[&["X"], &["Y"], &["Z"]]));
    }

    #[test]
    fn test_columnar_merge_realigns_columns_by_position() {
        let template = workbook("t", vec![sheet("T", &["Name", "Phone"], &[])]);
        let first = workbook(
            "1",
            vec![sheet(
                "Data",
                &["Name", "Phone"],
                &[&["Ann", ""], &["", "555"], &["Ben", ""]],
            )],
        );
        let second = workbook("2", vec![sheet("Data", &["Phone"], &[&["777"]])]);
        let mapping = mapping(&[("T|Phone", "Data|Phone"), ("T|Name", "Data|Name")]);

        let output = SynthesisEngine::default()
            .synthesize(GenerationMode::ColumnarMerge, &template, &mapping, &[&first, &second])
            .unwrap();

        let sheet = &output.sheets[0];
        // 標題依映射的迭代順序
        let headers: Vec<_> = sheet.headers.iter().map(|field| field.name.as_str()).collect();
        assert_eq!(headers, vec!["Phone", "Name"]);
        assert_eq!(sheet.rows, text_rows(&[&["555", "Ann"], &["777", "Ben"]]));
    }

    #[test]
    fn test_columnar_merge_emits_at_most_max_length_rows() {
        let template = workbook("t", vec![sheet("T", &["A", "B"], &[])]);
        let source = workbook(
            "1",
            vec![sheet("Data", &["A", "B"], &[&["1", ""], &["2", ""], &["3", "x"]])],
        );
        let mapping = mapping(&[("T|A", "Data|A"), ("T|B", "Data|B")]);

        let output = SynthesisEngine::default()
            .synthesize(GenerationMode::ColumnarMerge, &template, &mapping, &[&source])
            .unwrap();

        assert_eq!(
            output.sheets[0].rows,
            vec![
                vec!["1".into(), "x".into()],
                vec!["2".into(), CellValue::Empty],
                vec!["3".into(), CellValue::Empty],
            ]
        );
    }

    #[test]
    fn test_columnar_merge_all_empty_is_empty_result() {
        let template = workbook("t", vec![sheet("T", &["A"], &[])]);
        let source = workbook("1", vec![sheet("Data", &["A"], &[&[""], &[""]])]);
        let mapping = mapping(&[("T|A", "Data|A")]);

        let err = SynthesisEngine::default()
            .synthesize(GenerationMode::ColumnarMerge, &template, &mapping, &[&source])
            .unwrap_err();
        assert!(matches!(err, ReconcileError::EmptyResult { .. }));
    }

    #[test]
    fn test_columnar_merge_only_stale_entries_is_no_mapping() {
        let template = workbook("t", vec![sheet("T", &["A"], &[])]);
        let source = workbook("1", vec![sheet("Data", &["A"], &[&["1"]])]);
        let mapping = mapping(&[("T|Removed", "Data|A")]);

        let err = SynthesisEngine::default()
            .synthesize(GenerationMode::ColumnarMerge, &template, &mapping, &[&source])
            .unwrap_err();
        assert!(matches!(err, ReconcileError::NoMapping));
    }

    #[test]
    fn test_columnar_merge_uses_configured_sheet_name() {
        let template = workbook("t", vec![sheet("T", &["A"], &[])]);
        let source = workbook("1", vec![sheet("Data", &["A"], &[&["1"]])]);
        let mapping = mapping(&[("T|A", "Data|A")]);

        let output = SynthesisEngine::default()
            .with_merged_sheet_name("Merged")
            .synthesize(GenerationMode::ColumnarMerge, &template, &mapping, &[&source])
            .unwrap();
        assert_eq!(output.sheets[0].name, "Merged");
    }

    #[test]
    fn test_row_ceiling_enforced_before_synthesis() {
        let template = workbook("t", vec![sheet("T", &["A"], &[])]);
        let source = workbook("1", vec![sheet("Data", &["A"], &[&["1"], &["2"], &["3"]])]);
        let mapping = mapping(&[("T|A", "Data|A")]);
        let engine = SynthesisEngine::new(Limits {
            max_source_rows: Some(2),
            ..Limits::default()
        });

        let err = engine
            .synthesize(GenerationMode::PerSheet, &template, &mapping, &[&source])
            .unwrap_err();
        assert!(matches!(
            err,
            ReconcileError::LimitExceeded { limit: 2, actual: 3, .. }
        ));
    }
}
