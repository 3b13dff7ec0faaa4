use crate::core::ConfigProvider;
use crate::domain::keys::{MappingEntry, TemplateKey};
use crate::domain::options::{GenerationMode, Limits, UniquenessPolicy, DEFAULT_MERGED_SHEET_NAME};
use crate::utils::error::{ReconcileError, Result};
use crate::utils::validation::{self, Validate};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TomlConfig {
    pub job: JobConfig,
    pub template: TemplateConfig,
    pub sources: SourcesConfig,
    #[serde(default)]
    pub matching: MatchingConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    pub output: OutputConfig,
    /// 手動映射：`"Template|Field" = "Source|Field"`
    #[serde(default)]
    pub mapping: IndexMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobConfig {
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateConfig {
    /// 本機路徑或 http(s) URL
    pub location: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourcesConfig {
    pub paths: Vec<String>,
    pub active: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MatchingConfig {
    pub uniqueness: Option<UniquenessPolicy>,
    pub reset_on_source_switch: Option<bool>,
    pub mapping_file: Option<String>,
    #[serde(default)]
    pub unmap: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerationConfig {
    pub mode: Option<GenerationMode>,
    pub merged_sheet_name: Option<String>,
    pub max_source_rows: Option<usize>,
    pub max_input_bytes: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    pub path: String,
    pub file_name: Option<String>,
    pub emit_mapping: Option<bool>,
}

impl TomlConfig {
    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(ReconcileError::IoError)?;
        Self::from_toml_str(&content)
    }

    /// 從 TOML 字串解析配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content)?;

        toml::from_str(&processed_content).map_err(|e| ReconcileError::ConfigValidationError {
            field: "toml_parsing".to_string(),
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// 替換環境變數 (例如 ${TEMPLATE_BASE})；未設定的變數保留原樣
    fn substitute_env_vars(content: &str) -> Result<String> {
        use regex::Regex;
        let re = Regex::new(r"\$\{([^}]+)\}").map_err(|e| ReconcileError::ConfigError {
            message: e.to_string(),
        })?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }

    /// 驗證配置的合理性
    pub fn validate_config(&self) -> Result<()> {
        validation::validate_non_empty_string("job.name", &self.job.name)?;
        validation::validate_location("template.location", &self.template.location)?;

        validation::validate_non_empty_list("sources.paths", &self.sources.paths)?;
        validation::validate_file_extensions(
            "sources.paths",
            &self.sources.paths,
            validation::SUPPORTED_EXTENSIONS,
        )?;
        validation::validate_unique("sources.paths", &self.sources.paths)?;

        if let Some(active) = &self.sources.active {
            if !self.sources.paths.contains(active) {
                return Err(ReconcileError::ConfigValidationError {
                    field: "sources.active".to_string(),
                    message: format!("'{}' is not listed in sources.paths", active),
                });
            }
        }

        validation::validate_path("output.path", &self.output.path)?;
        if let Some(name) = &self.output.file_name {
            validation::validate_non_empty_string("output.file_name", name)?;
        }
        if let Some(path) = &self.matching.mapping_file {
            validation::validate_path("matching.mapping_file", path)?;
        }
        if let Some(name) = &self.generation.merged_sheet_name {
            validation::validate_non_empty_string("generation.merged_sheet_name", name)?;
        }
        if let Some(rows) = self.generation.max_source_rows {
            validation::validate_positive_number("generation.max_source_rows", rows, 1)?;
        }
        if let Some(bytes) = self.generation.max_input_bytes {
            validation::validate_positive_number("generation.max_input_bytes", bytes, 1)?;
        }

        self.mapping_overrides()?;
        self.unmapped_fields()?;
        Ok(())
    }
}

impl ConfigProvider for TomlConfig {
    fn template_location(&self) -> &str {
        &self.template.location
    }

    fn source_paths(&self) -> &[String] {
        &self.sources.paths
    }

    fn active_source(&self) -> Option<&str> {
        self.sources.active.as_deref()
    }

    fn output_path(&self) -> &str {
        &self.output.path
    }

    fn output_name(&self) -> Option<&str> {
        self.output.file_name.as_deref()
    }

    fn generation_mode(&self) -> GenerationMode {
        self.generation.mode.unwrap_or_default()
    }

    fn merged_sheet_name(&self) -> &str {
        self.generation
            .merged_sheet_name
            .as_deref()
            .unwrap_or(DEFAULT_MERGED_SHEET_NAME)
    }

    fn uniqueness_policy(&self) -> UniquenessPolicy {
        self.matching.uniqueness.unwrap_or_default()
    }

    fn reset_on_source_switch(&self) -> bool {
        self.matching.reset_on_source_switch.unwrap_or(true)
    }

    fn mapping_overrides(&self) -> Result<Vec<MappingEntry>> {
        self.mapping
            .iter()
            .map(|(template, source)| {
                Ok(MappingEntry {
                    template: template.parse()?,
                    source: source.parse()?,
                })
            })
            .collect()
    }

    fn unmapped_fields(&self) -> Result<Vec<TemplateKey>> {
        validation::validate_key_flags(&self.matching.unmap)
    }

    fn mapping_file(&self) -> Option<&str> {
        self.matching.mapping_file.as_deref()
    }

    fn emit_mapping(&self) -> bool {
        self.output.emit_mapping.unwrap_or(false)
    }

    fn limits(&self) -> Limits {
        Limits {
            max_input_bytes: self.generation.max_input_bytes,
            max_source_rows: self.generation.max_source_rows,
        }
    }
}

impl Validate for TomlConfig {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::keys::SourceKey;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const MINIMAL: &str = r#"
[job]
name = "contacts"

[template]
location = "templates/business.xlsx"

[sources]
paths = ["q1.xlsx"]

[output]
path = "./output"
"#;

    #[test]
    fn test_parse_minimal_config_uses_defaults() {
        let config = TomlConfig::from_toml_str(MINIMAL).unwrap();

        assert_eq!(config.job.name, "contacts");
        assert_eq!(config.generation_mode(), GenerationMode::PerSheet);
        assert_eq!(config.uniqueness_policy(), UniquenessPolicy::Exclusive);
        assert_eq!(config.merged_sheet_name(), "Output");
        assert!(config.reset_on_source_switch());
        assert!(!config.emit_mapping());
        assert!(config.mapping_overrides().unwrap().is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_full_config() {
        let toml_content = r#"
[job]
name = "quarterly-merge"
description = "Merge quarterly exports"

[template]
location = "https://example.com/freetemplate/business/business.xlsx"

[sources]
paths = ["q1.xlsx", "q2.csv"]
active = "q2.csv"

[matching]
uniqueness = "shared"
reset_on_source_switch = false
unmap = ["Contacts|Fax"]

[generation]
mode = "columnar-merge"
merged_sheet_name = "Merged"
max_source_rows = 50000

[output]
path = "./output"
file_name = "merged.xlsx"
emit_mapping = true

[mapping]
"Contacts|Phone" = "People|Mobile"
"Contacts|Name" = "q1.xlsx::People|Full Name"
"#;

        let config = TomlConfig::from_toml_str(toml_content).unwrap();

        assert_eq!(config.active_source(), Some("q2.csv"));
        assert_eq!(config.generation_mode(), GenerationMode::ColumnarMerge);
        assert_eq!(config.uniqueness_policy(), UniquenessPolicy::Shared);
        assert_eq!(config.merged_sheet_name(), "Merged");
        assert!(!config.reset_on_source_switch());
        assert!(config.emit_mapping());
        assert_eq!(config.limits().max_source_rows, Some(50000));
        assert_eq!(config.unmapped_fields().unwrap(), vec![TemplateKey::new("Contacts", "Fax")]);

        let overrides = config.mapping_overrides().unwrap();
        assert_eq!(overrides[0].template, TemplateKey::new("Contacts", "Phone"));
        assert_eq!(
            overrides[1].source,
            SourceKey::new("People", "Full Name").scoped("q1.xlsx")
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_var_substitution() {
        std::env::set_var("RECONCILE_TEST_TEMPLATE", "https://cdn.example.com/edu.xlsx");

        let toml_content = r#"
[job]
name = "env"

[template]
location = "${RECONCILE_TEST_TEMPLATE}"

[sources]
paths = ["a.xlsx"]

[output]
path = "./output"
"#;

        let config = TomlConfig::from_toml_str(toml_content).unwrap();
        assert_eq!(config.template_location(), "https://cdn.example.com/edu.xlsx");

        std::env::remove_var("RECONCILE_TEST_TEMPLATE");
    }

    #[test]
    fn test_config_validation() {
        let bad_active = MINIMAL.replace(
            "paths = [\"q1.xlsx\"]",
            "paths = [\"q1.xlsx\"]\nactive = \"q9.xlsx\"",
        );
        let config = TomlConfig::from_toml_str(&bad_active).unwrap();
        assert!(config.validate().is_err());

        let bad_mapping = format!("{}\n[mapping]\n\"NoBar\" = \"People|Name\"\n", MINIMAL);
        let config = TomlConfig::from_toml_str(&bad_mapping).unwrap();
        assert!(config.validate().is_err());

        let bad_template = MINIMAL.replace("templates/business.xlsx", "ftp://example.com/t.xlsx");
        let config = TomlConfig::from_toml_str(&bad_template).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unknown_mode_is_a_parse_error() {
        let content = format!("{}\n[generation]\nmode = \"sideways\"\n", MINIMAL);
        assert!(matches!(
            TomlConfig::from_toml_str(&content),
            Err(ReconcileError::ConfigValidationError { .. })
        ));
    }

    #[test]
    fn test_config_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(MINIMAL.as_bytes()).unwrap();

        let config = TomlConfig::from_file(temp_file.path()).unwrap();
        assert_eq!(config.job.name, "contacts");
        assert_eq!(config.source_paths(), &["q1.xlsx".to_string()]);
    }
}
