use crate::core::Pipeline;
use crate::utils::error::Result;

pub struct ReconcileEngine<P: Pipeline> {
    pipeline: P,
}

impl<P: Pipeline> ReconcileEngine<P> {
    pub fn new(pipeline: P) -> Self {
        Self { pipeline }
    }

    pub async fn run(&self) -> Result<String> {
        tracing::info!("🚀 Starting reconciliation...");

        tracing::info!("📥 Loading template and sources...");
        let inputs = self.pipeline.extract().await?;
        tracing::info!(
            "📥 Loaded {} source workbook(s), {} skipped",
            inputs.sources.len(),
            inputs.skipped.len()
        );

        tracing::info!("🔄 Matching fields and synthesizing output...");
        let result = self.pipeline.transform(inputs).await?;
        tracing::info!(
            "🔄 {} mapping entries, {} output sheet(s), {} rows",
            result.mapping.len(),
            result.workbook.sheets.len(),
            result.workbook.total_rows()
        );

        tracing::info!("💾 Writing output...");
        let output_path = self.pipeline.load(result).await?;
        tracing::info!("✅ Output saved to: {}", output_path);

        Ok(output_path)
    }
}
