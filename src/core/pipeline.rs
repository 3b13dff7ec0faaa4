use crate::adapters::codec::SpreadsheetCodec;
use crate::core::matcher::FieldMatcher;
use crate::core::session::{ReconcileSession, SessionOptions};
use crate::core::synthesis::SynthesisEngine;
use crate::core::{ConfigProvider, Pipeline, Storage};
use crate::domain::keys::MappingEntry;
use crate::domain::model::{ExtractedInputs, SkippedSource, TransformResult, Workbook};
use crate::domain::options::GenerationMode;
use crate::domain::ports::WorkbookCodec;
use crate::utils::error::{ReconcileError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const TEMPLATE_WORKBOOK_ID: &str = "template";
const OUTPUT_SUFFIX: &str = "_mapped.xlsx";
const FALLBACK_OUTPUT_STEM: &str = "template";

/// 與輸出檔一起寫出的映射紀錄；編輯後可以當作下一次執行的映射檔
#[derive(Debug, Serialize, Deserialize)]
pub struct MappingReport {
    pub generated_at: String,
    pub mode: GenerationMode,
    pub mapping: Vec<MappingEntry>,
    #[serde(default)]
    pub skipped: Vec<SkippedSource>,
}

/// 映射檔可以是完整的紀錄，也可以只是綁定陣列
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum MappingFile {
    Report { mapping: Vec<MappingEntry> },
    Entries(Vec<MappingEntry>),
}

impl MappingFile {
    fn into_entries(self) -> Vec<MappingEntry> {
        match self {
            MappingFile::Report { mapping } => mapping,
            MappingFile::Entries(entries) => entries,
        }
    }
}

/// `<stem>_mapped.xlsx`，stem 取自第一個來源檔的檔名
pub fn output_file_name(first_source: Option<&str>) -> String {
    let stem = first_source
        .and_then(|name| Path::new(name).file_stem())
        .and_then(|stem| stem.to_str())
        .filter(|stem| !stem.is_empty())
        .unwrap_or(FALLBACK_OUTPUT_STEM);
    format!("{}{}", stem, OUTPUT_SUFFIX)
}

/// 來源檔與輸出透過 `storage` 存取，模板透過 `template_storage`（可能是遠端）
pub struct ReconcilePipeline<S: Storage, T: Storage, C: ConfigProvider> {
    storage: S,
    template_storage: T,
    template_path: String,
    config: C,
    codec: SpreadsheetCodec,
}

impl<S: Storage, T: Storage, C: ConfigProvider> ReconcilePipeline<S, T, C> {
    pub fn new(storage: S, template_storage: T, template_path: impl Into<String>, config: C) -> Self {
        let codec = SpreadsheetCodec::new(config.limits().max_input_bytes);
        Self {
            storage,
            template_storage,
            template_path: template_path.into(),
            config,
            codec,
        }
    }

    async fn load_source(&self, path: &str) -> Result<Workbook> {
        let bytes = self.storage.read_file(path).await?;
        self.codec.decode(path, path, &bytes)
    }

    async fn load_mapping_file(&self, path: &str) -> Result<Vec<MappingEntry>> {
        let bytes = self.storage.read_file(path).await?;
        let file: MappingFile = serde_json::from_slice(&bytes)?;
        Ok(file.into_entries())
    }

    fn synthesis_engine(&self) -> SynthesisEngine {
        SynthesisEngine::new(self.config.limits())
            .with_merged_sheet_name(self.config.merged_sheet_name())
    }
}

#[async_trait::async_trait]
impl<S: Storage, T: Storage, C: ConfigProvider> Pipeline for ReconcilePipeline<S, T, C> {
    async fn extract(&self) -> Result<ExtractedInputs> {
        tracing::debug!("📋 Reading template from: {}", self.template_path);
        let bytes = self.template_storage.read_file(&self.template_path).await?;
        let template = self
            .codec
            .decode(TEMPLATE_WORKBOOK_ID, &self.template_path, &bytes)?;

        let mut sources = Vec::new();
        let mut skipped = Vec::new();

        for path in self.config.source_paths() {
            match self.load_source(path).await {
                Ok(workbook) => sources.push(workbook),
                Err(e) if e.is_per_file() => {
                    tracing::warn!("⚠️ Skipping source '{}': {}", path, e);
                    skipped.push(SkippedSource {
                        id: path.clone(),
                        reason: e.to_string(),
                    });
                }
                Err(e) => return Err(e),
            }
        }

        if sources.is_empty() {
            return Err(ReconcileError::NoSources);
        }

        Ok(ExtractedInputs {
            template,
            sources,
            skipped,
        })
    }

    async fn transform(&self, inputs: ExtractedInputs) -> Result<TransformResult> {
        let mut session = ReconcileSession::new(
            FieldMatcher::new(self.config.uniqueness_policy()),
            SessionOptions {
                reset_on_source_switch: self.config.reset_on_source_switch(),
            },
        );

        session.set_template(inputs.template);
        for source in inputs.sources {
            session.add_source(source)?;
        }

        if let Some(active) = self.config.active_source() {
            if inputs.skipped.iter().any(|skipped| skipped.id == active) {
                tracing::warn!(
                    "⚠️ Configured active source '{}' was skipped, keeping the first loaded source",
                    active
                );
            } else {
                session.set_active_source(active)?;
            }
        }
        session.auto_match();

        if let Some(path) = self.config.mapping_file() {
            let entries = self.load_mapping_file(path).await?;
            tracing::info!("📑 Applying {} mapping(s) from {}", entries.len(), path);
            for entry in entries {
                session.set_mapping(entry.template, entry.source);
            }
        }

        for entry in self.config.mapping_overrides()? {
            tracing::debug!("✏️ Override {} -> {}", entry.template, entry.source);
            session.set_mapping(entry.template, entry.source);
        }

        for key in self.config.unmapped_fields()? {
            tracing::debug!("✂️ Unmapped {}", key);
            session.clear_mapping(&key);
        }

        let mode = self.config.generation_mode();
        let workbook = session.generate(&self.synthesis_engine(), mode)?;

        // 作用中的來源排第一，決定輸出檔名
        let active_name = session.active_source().map(|source| source.display_name().to_string());
        let source_names: Vec<String> = active_name
            .iter()
            .cloned()
            .chain(
                session
                    .selected_sources()
                    .into_iter()
                    .map(|source| source.display_name().to_string())
                    .filter(|name| Some(name) != active_name.as_ref()),
            )
            .collect();

        Ok(TransformResult {
            workbook,
            mapping: session.mapping().entries(),
            mode,
            source_names,
            skipped: inputs.skipped,
        })
    }

    async fn load(&self, result: TransformResult) -> Result<String> {
        let file_name = match self.config.output_name() {
            Some(name) => name.to_string(),
            None => output_file_name(result.source_names.first().map(String::as_str)),
        };
        let output_path = Path::new(self.config.output_path()).join(&file_name);
        let output_path = output_path.to_string_lossy().into_owned();

        let bytes = self.codec.encode(&result.workbook)?;
        tracing::debug!("💾 Writing {} bytes to {}", bytes.len(), output_path);
        self.storage.write_file(&output_path, &bytes).await?;

        if self.config.emit_mapping() {
            let stem = Path::new(&file_name)
                .file_stem()
                .and_then(|stem| stem.to_str())
                .unwrap_or(FALLBACK_OUTPUT_STEM);
            let report_path = Path::new(self.config.output_path())
                .join(format!("{}.mapping.json", stem))
                .to_string_lossy()
                .into_owned();

            let report = MappingReport {
                generated_at: chrono::Utc::now().to_rfc3339(),
                mode: result.mode,
                mapping: result.mapping,
                skipped: result.skipped,
            };
            let json = serde_json::to_string_pretty(&report)?;
            self.storage.write_file(&report_path, json.as_bytes()).await?;
            tracing::info!("📑 Mapping written to {}", report_path);
        }

        Ok(output_path)
    }
}
