use crate::domain::keys::{MappingEntry, TemplateKey};
use crate::domain::model::{ExtractedInputs, TransformResult, Workbook};
use crate::domain::options::{GenerationMode, Limits, UniquenessPolicy};
use crate::utils::error::Result;
use async_trait::async_trait;

pub trait Storage: Send + Sync {
    fn read_file(&self, path: &str) -> impl std::future::Future<Output = Result<Vec<u8>>> + Send;
    fn write_file(
        &self,
        path: &str,
        data: &[u8],
    ) -> impl std::future::Future<Output = Result<()>> + Send;
    fn list_files(
        &self,
        prefix: &str,
    ) -> impl std::future::Future<Output = Result<Vec<String>>> + Send;
}

/// 工作簿位元組與 Workbook Model 之間的轉換
pub trait WorkbookCodec: Send + Sync {
    /// `name` 是檔名（決定 CSV 或試算表格式，也用於錯誤訊息）
    fn decode(&self, id: &str, name: &str, bytes: &[u8]) -> Result<Workbook>;
    fn encode(&self, workbook: &Workbook) -> Result<Vec<u8>>;
}

pub trait ConfigProvider: Send + Sync {
    fn template_location(&self) -> &str;
    fn source_paths(&self) -> &[String];
    fn active_source(&self) -> Option<&str>;
    fn output_path(&self) -> &str;
    fn output_name(&self) -> Option<&str>;
    fn generation_mode(&self) -> GenerationMode;
    fn merged_sheet_name(&self) -> &str;
    fn uniqueness_policy(&self) -> UniquenessPolicy;
    fn reset_on_source_switch(&self) -> bool;
    fn mapping_overrides(&self) -> Result<Vec<MappingEntry>>;
    fn unmapped_fields(&self) -> Result<Vec<TemplateKey>>;
    fn mapping_file(&self) -> Option<&str>;
    fn emit_mapping(&self) -> bool;
    fn limits(&self) -> Limits;
}

#[async_trait]
pub trait Pipeline: Send + Sync {
    async fn extract(&self) -> Result<ExtractedInputs>;
    async fn transform(&self, inputs: ExtractedInputs) -> Result<TransformResult>;
    async fn load(&self, result: TransformResult) -> Result<String>;
}
