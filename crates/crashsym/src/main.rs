use std::fs;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use crashsym_core::cache::MemoryCache;
use crashsym_core::minidump::reprocess_minidump;
use crashsym_core::processor::{NativeProcessor, Services};
use crashsym_core::symbolicator::HttpSymbolicator;
use crashsym_core::symbolizer::{DwarfSymbolizer, MatchSymbolizer, Symbolizer};
use crashsym_core::system_symbols::HttpSystemSymbols;
use crashsym_core::{CrashReport, Result, SymbolicationConfig};
use crashsym_utils::{info, init_logging, warn};

/// Symbolicate native crash reports.
#[derive(Parser, Debug)]
#[command(name = "crashsym")]
#[command(version)]
#[command(about = "Symbolicate native crash reports", long_about = None)]
struct Cli
{
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands
{
    /// Symbolicate a crash report and print the result as JSON
    Process
    {
        /// Path to the crash report (JSON)
        event: PathBuf,
        /// Configuration file (JSON)
        #[arg(long)]
        config: Option<PathBuf>,
        /// Base URL of the symbolication service
        #[arg(long, env = "CRASHSYM_SYMBOLICATOR_URL")]
        symbolicator_url: Option<String>,
        /// Base URL of the system symbol lookup service; enables system symbols
        #[arg(long, env = "CRASHSYM_SYMBOLSERVER_URL")]
        symbolserver_url: Option<String>,
        /// Directory with local debug files, named by debug id or file name
        #[arg(long)]
        debug_files: Option<PathBuf>,
        /// Minidump the report was created from
        #[arg(long)]
        minidump: Option<PathBuf>,
        /// Write the result here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Show how frames resolve to images without contacting any service
    Inspect
    {
        /// Path to the crash report (JSON)
        event: PathBuf,
    },
}

fn main()
{
    // Reads RUST_LOG, CRASHSYM_LOG_FORMAT and CRASHSYM_LOG_FILE
    let _guard = match init_logging() {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {e}");
            process::exit(1);
        }
    };

    let cli = Cli::parse();
    if let Err(e) = run_command(cli) {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run_command(cli: Cli) -> Result<()>
{
    match cli.command {
        Commands::Process {
            event,
            config,
            symbolicator_url,
            symbolserver_url,
            debug_files,
            minidump,
            output,
        } => {
            let mut config = match config {
                Some(path) => SymbolicationConfig::load(&path)?,
                None => {
                    let mut config = SymbolicationConfig::default();
                    config.apply_env();
                    config
                }
            };
            if symbolicator_url.is_some() {
                config.symbolicator_url = symbolicator_url;
            }
            if symbolserver_url.is_some() {
                config.symbolserver_url = symbolserver_url;
                config.system_symbols_enabled = true;
            }
            config.validate()?;

            let mut report = read_report(&event)?;
            if let Some(path) = minidump {
                report = report.with_minidump(fs::read(path)?);
            }

            let processed = process_report(report, &config, debug_files)?;
            let json = serde_json::to_string_pretty(&processed)?;
            match output {
                Some(path) => {
                    fs::write(&path, json)?;
                    info!(path = %path.display(), "wrote processed report");
                }
                None => println!("{json}"),
            }
            Ok(())
        }
        Commands::Inspect { event } => {
            let report = read_report(&event)?;
            print_inspection(&report);
            Ok(())
        }
    }
}

fn read_report(path: &Path) -> Result<CrashReport>
{
    let text = fs::read_to_string(path)?;
    CrashReport::from_json(&text)
}

fn process_report(mut report: CrashReport, config: &SymbolicationConfig, debug_files: Option<PathBuf>)
    -> Result<CrashReport>
{
    let symbolizer: Arc<dyn Symbolizer> = match debug_files {
        Some(root) => Arc::new(DwarfSymbolizer::new(root, Box::new(MatchSymbolizer::new()))),
        None => Arc::new(MatchSymbolizer::new()),
    };
    let cache = Arc::new(MemoryCache::new());
    let mut services = Services::new(cache.clone(), symbolizer);

    let symbolicator = config
        .symbolicator_url
        .as_deref()
        .map(|url| Arc::new(HttpSymbolicator::new(url, config.request_timeout_secs)));
    if let Some(client) = &symbolicator {
        services = services.with_symbolicator(client.clone());
    }
    if let Some(url) = config.symbolserver_url.as_deref() {
        let timeout = Duration::from_secs(config.request_timeout_secs);
        services = services.with_system_symbols(Arc::new(HttpSystemSymbols::new(url, timeout)));
    }

    if report.is_minidump_event() {
        match &symbolicator {
            Some(client) => {
                if let Some(updated) = reprocess_minidump(&report, cache.as_ref(), client.as_ref(), config) {
                    report = updated;
                }
            }
            None => warn!(event_id = %report.event_id, "minidump event without a symbolication service"),
        }
    }

    let processor = NativeProcessor::new(&report, config, &services);
    if !processor.is_available() {
        info!(event_id = %report.event_id, "nothing to symbolicate");
        return Ok(report);
    }
    let result = processor.process()?;
    result.apply(&mut report);
    Ok(report)
}

fn print_inspection(report: &CrashReport)
{
    let services = Services::new(Arc::new(MemoryCache::new()), Arc::new(MatchSymbolizer::new()));
    let config = SymbolicationConfig::default();
    let processor = NativeProcessor::new(report, &config, &services);

    println!("\nEvent {}:", report.event_id);
    println!("  Platform: {}", report.platform.as_deref().unwrap_or("unknown"));
    println!("  CPU: {}", report.cpu_name().unwrap_or("unknown"));
    println!("  Architecture: {:?}", processor.resolver().architecture());
    println!("  Signal: {}", report.signal().map_or_else(|| "none".to_string(), |signal| signal.to_string()));
    if let Some(sdk) = report.sdk_info() {
        println!("  SDK: {}", sdk.sdk_id().unwrap_or_else(|| sdk.sdk_name.clone()));
    }
    println!("  Symbolication available: {}", processor.is_available());

    println!("\nImages ({}):", processor.images().len());
    for image in processor.images().images() {
        println!(
            "  [{}] {}..{} {} {} {}",
            image.index(),
            image.start(),
            image.end(),
            image.image_type(),
            image.debug_id(),
            image.code_file().unwrap_or("<unknown>"),
        );
    }

    let prepared = processor.prepare(None);
    println!("\nFrames ({}):", prepared.resolved.len());
    for frame in &prepared.resolved {
        let raw_addr = frame
            .raw
            .address()
            .map_or_else(String::new, |addr| format!("{:#x}", addr.value()));
        let image = frame
            .image
            .as_ref()
            .map_or("<no image>", |image| image.code_file().unwrap_or("<unknown>"));
        let key = frame
            .cache_key
            .as_ref()
            .map_or_else(|| "-".to_string(), |key| key.digest());
        println!(
            "  {:?} #{} (crash +{}) {} -> {} in {} key {}",
            frame.location, frame.frame_index, frame.crash_index, raw_addr, frame.instruction_addr, image, key,
        );
    }
}
