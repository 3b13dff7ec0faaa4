use clap::Parser;
use sheet_reconcile::config::toml_config::TomlConfig;
use sheet_reconcile::core::{ConfigProvider, Pipeline};
use sheet_reconcile::domain::options::GenerationMode;
use sheet_reconcile::utils::error::{ErrorSeverity, ReconcileError};
use sheet_reconcile::utils::{logger, validation::Validate};
use sheet_reconcile::adapters::storage::list_templates;
use sheet_reconcile::{AnyStorage, LocalStorage, ReconcileEngine, ReconcilePipeline};

#[derive(Parser)]
#[command(name = "toml-reconcile")]
#[command(about = "Run a spreadsheet reconciliation job described by a TOML file")]
struct Args {
    /// Path to TOML job file
    #[arg(short, long, default_value = "reconcile.toml")]
    config: String,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,

    /// Override generation mode from config
    #[arg(long, value_enum)]
    mode: Option<GenerationMode>,

    /// Dry run - match fields and synthesize without writing output
    #[arg(long)]
    dry_run: bool,

    /// List the templates available next to the configured template, then exit
    #[arg(long)]
    list_templates: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // 初始化日誌
    if args.log_json {
        logger::init_json_logger(args.verbose);
    } else {
        logger::init_cli_logger(args.verbose);
    }

    tracing::info!("🚀 Starting TOML-based reconciliation");
    tracing::info!("📁 Loading configuration from: {}", args.config);

    // 載入 TOML 配置
    let mut config = match TomlConfig::from_file(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ Failed to load config file '{}': {}", args.config, e);
            eprintln!("💡 Make sure the file exists and is valid TOML format");
            std::process::exit(1);
        }
    };

    // 應用命令列覆蓋設定
    if let Some(mode) = args.mode {
        config.generation.mode = Some(mode);
        tracing::info!("🔧 Generation mode overridden to: {}", mode);
    }

    // 驗證配置
    if let Err(e) = config.validate() {
        tracing::error!("❌ Configuration validation failed: {}", e);
        tracing::error!("💡 Suggestion: {}", e.recovery_suggestion());
        eprintln!("❌ {}", e.user_friendly_message());
        std::process::exit(1);
    }

    tracing::info!("✅ Configuration loaded and validated successfully");
    display_config_summary(&config, &args);

    if args.list_templates {
        match list_templates(config.template_location()).await {
            Ok(names) => {
                println!("📂 Templates available next to {}:", config.template_location());
                for name in names {
                    println!("  {}", name);
                }
            }
            Err(e) => exit_with(e),
        }
        return Ok(());
    }

    let (template_storage, template_path) = match AnyStorage::for_location(config.template_location()) {
        Ok(resolved) => resolved,
        Err(e) => exit_with(e),
    };
    let storage = LocalStorage::new(".".to_string());
    let pipeline = ReconcilePipeline::new(storage, template_storage, template_path, config);

    if args.dry_run {
        tracing::info!("🔍 DRY RUN MODE - No output will be written");
        if let Err(e) = perform_dry_run(&pipeline).await {
            exit_with(e);
        }
        return Ok(());
    }

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

    let exit_code = match e.severity() {
        ErrorSeverity::Low => 0,
        ErrorSeverity::Medium => 2,
        ErrorSeverity::High => 1,
        ErrorSeverity::Critical => 3,
    };
    std::process::exit(exit_code)
}

fn display_config_summary(config: &TomlConfig, args: &Args) {
    println!("📋 Configuration Summary:");
    println!("  Job: {}", config.job.name);
    if let Some(description) = &config.job.description {
        println!("  Description: {}", description);
    }
    println!("  Template: {}", config.template_location());
    println!("  Sources: {}", config.source_paths().join(", "));
    if let Some(active) = config.active_source() {
        println!("  Active Source: {}", active);
    }
    println!("  Mode: {}", config.generation_mode());
    println!("  Uniqueness: {:?}", config.uniqueness_policy());
    println!("  Reset On Switch: {}", config.reset_on_source_switch());
    println!("  Output: {}", config.output_path());
    if !config.mapping.is_empty() {
        println!("  Manual Mappings: {}", config.mapping.len());
    }

    if args.dry_run {
        println!("  🔍 DRY RUN MODE ENABLED");
    }

    println!();
}

/// 執行讀取與合成，但不寫出任何檔案
async fn perform_dry_run<P: Pipeline>(pipeline: &P) -> Result<(), ReconcileError> {
    println!("🔍 Dry Run Analysis:");
    println!();

    let inputs = pipeline.extract().await?;
    println!("📥 Inputs:");
    println!(
        "  Template sheets: {}",
        inputs
            .template
            .sheets
            .iter()
            .map(|sheet| sheet.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    );
    for source in &inputs.sources {
        println!("  ✅ {} ({} rows)", source.display_name(), source.total_rows());
    }
    for skipped in &inputs.skipped {
        println!("  ⚠️ {} skipped: {}", skipped.id, skipped.reason);
    }

    let result = pipeline.transform(inputs).await?;

    println!();
    println!("🔄 Field Mapping:");
    for entry in &result.mapping {
        println!("  {} <- {}", entry.template, entry.source);
    }

    println!();
    println!("💾 Output Preview ({} mode):", result.mode);
    for sheet in &result.workbook.sheets {
        println!(
            "  {}: {} columns, {} rows",
            sheet.name,
            sheet.headers.len(),
            sheet.row_count()
        );
    }

    println!();
    println!("✅ Dry run analysis complete. Use --verbose for matching details.");

    Ok(())
}
