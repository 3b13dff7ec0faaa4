use crate::core::ConfigProvider;
use crate::domain::keys::{MappingEntry, TemplateKey};
use crate::domain::options::{GenerationMode, Limits, UniquenessPolicy, DEFAULT_MERGED_SHEET_NAME};
use crate::utils::error::{ReconcileError, Result};
use crate::utils::validation::{self, Validate};
use clap::Parser;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, Parser)]
#[command(name = "sheet-reconcile")]
#[command(about = "Map source spreadsheet columns onto a template workbook and generate the filled-in result")]
pub struct CliConfig {
    /// 模板工作簿：本機路徑或 http(s) URL
    #[arg(long)]
    pub template: String,

    /// 來源工作簿，逗號分隔；順序即 Mode B 的檔案順序
    #[arg(long, value_delimiter = ',', required = true)]
    pub sources: Vec<String>,

    /// 作用中的來源檔（預設為第一個）
    #[arg(long)]
    pub active: Option<String>,

    #[arg(long, value_enum, default_value_t = GenerationMode::PerSheet)]
    pub mode: GenerationMode,

    #[arg(long, default_value = "./output")]
    pub output_path: String,

    /// 輸出檔名（預設 `<第一個來源>_mapped.xlsx`）
    #[arg(long)]
    pub output_name: Option<String>,

    /// Mode B 輸出工作表名稱
    #[arg(long, default_value = DEFAULT_MERGED_SHEET_NAME)]
    pub sheet_name: String,

    #[arg(long, value_enum, default_value_t = UniquenessPolicy::Exclusive)]
    pub uniqueness: UniquenessPolicy,

    /// 切換作用中的來源時保留既有映射
    #[arg(long)]
    pub keep_mapping_on_switch: bool,

    /// 手動映射，`Sheet|Field=Sheet|Field`，可重複
    #[arg(long = "map")]
    pub map: Vec<String>,

    /// 移除模板欄位的映射，`Sheet|Field`，可重複
    #[arg(long = "unmap")]
    pub unmap: Vec<String>,

    /// 先前輸出的映射 JSON，在自動配對後套用
    #[arg(long)]
    pub mapping_file: Option<String>,

    /// 在輸出檔旁寫出 `<name>.mapping.json`
    #[arg(long)]
    pub emit_mapping: bool,

    #[arg(long)]
    pub max_source_rows: Option<usize>,

    #[arg(long)]
    pub max_input_bytes: Option<usize>,

    #[arg(long, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(long, help = "Emit logs as JSON")]
    pub log_json: bool,
}

impl ConfigProvider for CliConfig {
    fn template_location(&self) -> &str {
        &self.template
    }

    fn source_paths(&self) -> &[String] {
        &self.sources
    }

    fn active_source(&self) -> Option<&str> {
        self.active.as_deref()
    }

    fn output_path(&self) -> &str {
        &self.output_path
    }

    fn output_name(&self) -> Option<&str> {
        self.output_name.as_deref()
    }

    fn generation_mode(&self) -> GenerationMode {
        self.mode
    }

    fn merged_sheet_name(&self) -> &str {
        &self.sheet_name
    }

    fn uniqueness_policy(&self) -> UniquenessPolicy {
        self.uniqueness
    }

    fn reset_on_source_switch(&self) -> bool {
        !self.keep_mapping_on_switch
    }

    fn mapping_overrides(&self) -> Result<Vec<MappingEntry>> {
        validation::validate_mapping_flags(&self.map)
    }

    fn unmapped_fields(&self) -> Result<Vec<TemplateKey>> {
        validation::validate_key_flags(&self.unmap)
    }

    fn mapping_file(&self) -> Option<&str> {
        self.mapping_file.as_deref()
    }

    fn emit_mapping(&self) -> bool {
        self.emit_mapping
    }

    fn limits(&self) -> Limits {
        Limits {
            max_input_bytes: self.max_input_bytes,
            max_source_rows: self.max_source_rows,
        }
    }
}

impl Validate for CliConfig {
    fn validate(&self) -> Result<()> {
        validation::validate_location("template", &self.template)?;
        validation::validate_non_empty_list("sources", &self.sources)?;
        validation::validate_file_extensions("sources", &self.sources, validation::SUPPORTED_EXTENSIONS)?;
        validation::validate_unique("sources", &self.sources)?;
        validation::validate_path("output_path", &self.output_path)?;
        validation::validate_non_empty_string("sheet_name", &self.sheet_name)?;

        if let Some(active) = &self.active {
            if !self.sources.contains(active) {
                return Err(ReconcileError::ConfigValidationError {
                    field: "active".to_string(),
                    message: format!("'{}' is not one of the sources", active),
                });
            }
        }
        if let Some(name) = &self.output_name {
            validation::validate_non_empty_string("output_name", name)?;
        }
        if let Some(path) = &self.mapping_file {
            validation::validate_path("mapping_file", path)?;
        }
        if let Some(rows) = self.max_source_rows {
            validation::validate_positive_number("max_source_rows", rows, 1)?;
        }
        if let Some(bytes) = self.max_input_bytes {
            validation::validate_positive_number("max_input_bytes", bytes, 1)?;
        }

        self.mapping_overrides()?;
        self.unmapped_fields()?;
        Ok(())
    }
}
