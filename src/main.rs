use clap::Parser;
use sheet_reconcile::core::ConfigProvider;
use sheet_reconcile::utils::error::{ErrorSeverity, ReconcileError};
use sheet_reconcile::utils::{logger, validation::Validate};
use sheet_reconcile::{AnyStorage, CliConfig, LocalStorage, ReconcileEngine, ReconcilePipeline};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = CliConfig::parse();

    // 初始化日誌
    if config.log_json {
        logger::init_json_logger(config.verbose);
    } else {
        logger::init_cli_logger(config.verbose);
    }

    tracing::info!("Starting sheet-reconcile CLI");
    if config.verbose {
        tracing::debug!("CLI config: {:?}", config);
    }

    // 驗證配置
    if let Err(e) = config.validate() {
        tracing::error!("❌ Configuration validation failed: {}", e);
        tracing::error!("💡 Suggestion: {}", e.recovery_suggestion());
        eprintln!("❌ {}", e.user_friendly_message());
        std::process::exit(1);
    }

    let (template_storage, template_path) = match AnyStorage::for_location(config.template_location()) {
        Ok(resolved) => resolved,
        Err(e) => exit_with(e),
    };

    // 來源與輸出路徑都相對於目前目錄
    let storage = LocalStorage::new(".".to_string());
    let pipeline = ReconcilePipeline::new(storage, template_storage, template_path, config);
    let engine = ReconcileEngine::new(pipeline);

    match engine.run().await {
        Ok(output_path) => {
            tracing::info!("✅ Reconciliation completed successfully!");
            println!("✅ Reconciliation completed successfully!");
            println!("📁 Output saved to: {}", output_path);
        }
        Err(e) => exit_with(e),
    }

    Ok(())
}

fn exit_with(e: ReconcileError) -> ! {
    tracing::error!(
        "❌ Reconciliation failed: {} (Category: {:?}, Severity: {:?})",
        e,
        e.category(),
        e.severity()
    );
    tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());

    eprintln!("❌ {}", e.user_friendly_message());
    eprintln!("💡 建議: {}", e.recovery_suggestion());

    // 根據錯誤嚴重程度決定退出碼
    let exit_code = match e.severity() {
        ErrorSeverity::Low => 0,      // 警告，但成功
        ErrorSeverity::Medium => 2,   // 可重試
        ErrorSeverity::High => 1,     // 處理錯誤
        ErrorSeverity::Critical => 3, // 系統錯誤
    };
    std::process::exit(exit_code)
}
