//! Main entry point for the kernel pointer scanner
use anyhow::{Context, Result};
use clap::Parser;
use log::{debug, info, warn};
use std::os::unix::fs::FileTypeExt;
use std::path::Path;

use kptrscan::analysis::{
    evaluate, joined_offsets, read_report, relabel_symbols, rows_for_frame, write_report,
};
use kptrscan::cli::args::{Cli, Command, ReportFormatArg, ScanArgs, SourceKindArg, SummaryFormatArg};
use kptrscan::core::classifier::AddressClassifier;
use kptrscan::core::layout::{AddressLayout, KaslrMode};
use kptrscan::formats::text::TextFormatter;
use kptrscan::formats::{EvaluationFormat, ReportFormat, ReportWriter};
use kptrscan::memory::{DeviceMemory, DumpMemory, PhysicalMemory};
use kptrscan::paging::{PageTableWalker, PagingRoot, WalkScope};
use kptrscan::scanner::{LeafPageScanner, ScanContext};
use kptrscan::symbols::SymbolResolver;

const LIVE_KALLSYMS: &str = "/proc/kallsyms";

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.debug, cli.verbose);

    match cli.command {
        Command::Scan(args) => run_scan(&args),
        Command::Evaluate {
            report,
            kallsyms,
            output,
            format,
        } => run_evaluate(&report, kallsyms.as_deref(), output.as_deref(), format),
        Command::Offsets { report, pfn } => run_offsets(&report, pfn),
    }
}

fn init_logging(debug: bool, verbose: bool) {
    let default_filter = if debug {
        "debug"
    } else if verbose {
        "info"
    } else {
        "warn"
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();
}

/// Open the memory source. The returned handle releases the device or
/// mapping when dropped.
fn open_source(args: &ScanArgs, root: PagingRoot) -> Result<(Box<dyn PhysicalMemory>, bool)> {
    let is_device = match args.source_kind {
        SourceKindArg::Device => true,
        SourceKindArg::Dump => false,
        SourceKindArg::Auto => std::fs::metadata(&args.source)
            .map(|m| m.file_type().is_char_device())
            .unwrap_or(false),
    };

    let hint = "is the memory device available and readable by this user?";
    if is_device {
        let device = DeviceMemory::open(&args.source, root).context(hint)?;
        Ok((Box::new(device), true))
    } else {
        let dump = DumpMemory::open(&args.source, root).context(hint)?;
        Ok((Box::new(dump), false))
    }
}

fn build_classifier(args: &ScanArgs) -> Result<AddressClassifier> {
    let layout = match &args.layout {
        Some(path) => AddressLayout::load_from_file(path)
            .with_context(|| format!("loading address layout {}", path.display()))?,
        None => {
            let mode = if args.nokaslr {
                KaslrMode::Disabled
            } else {
                KaslrMode::Enabled
            };
            AddressLayout::new(mode, args.kernel_text_mapping)
        }
    };

    info!(
        "Direct map 0x{:x}-0x{:x}, kernel text 0x{:x}-0x{:x}, modules 0x{:x}-0x{:x}",
        layout.direct_map.start,
        layout.direct_map.end,
        layout.kernel_text.start,
        layout.kernel_text.end,
        layout.modules.start,
        layout.modules.end
    );
    Ok(AddressClassifier::new(layout))
}

fn load_symbols(path: Option<&Path>, is_device: bool) -> Result<SymbolResolver> {
    let mut resolver = SymbolResolver::new();
    match path {
        Some(path) => {
            resolver
                .load_symbol_file(path)
                .with_context(|| format!("loading symbols from {}", path.display()))?;
        }
        None if is_device => {
            if let Err(e) = resolver.load_symbol_file(Path::new(LIVE_KALLSYMS)) {
                warn!("Could not read {}: {}; symbols will be empty", LIVE_KALLSYMS, e);
            }
        }
        None => info!("No symbol file given; the Symbol column will be empty"),
    }

    if path.is_some() && resolver.is_empty() {
        warn!("Symbol file contained no usable symbols");
    }
    Ok(resolver)
}

fn run_scan(args: &ScanArgs) -> Result<()> {
    let root = PagingRoot::new(args.paging_root);
    let (memory, is_device) = open_source(args, root)?;
    let classifier = build_classifier(args)?;
    let symbols = load_symbols(args.symbols.as_deref(), is_device)?;

    let format = match args.format {
        ReportFormatArg::Csv => ReportFormat::Csv,
        ReportFormatArg::Jsonl => ReportFormat::Jsonl,
    };
    let mut writer = ReportWriter::create(&args.output, format)?;

    let scope = if args.full_walk {
        WalkScope::Full
    } else {
        WalkScope::Anchored(args.kernel_text_mapping)
    };

    info!(
        "Scan of {} started at {} (paging root 0x{:x})",
        args.source.display(),
        chrono::Utc::now().to_rfc3339(),
        root.address()
    );

    let mut context = ScanContext::new(classifier);
    let stats = {
        let mut scanner =
            LeafPageScanner::new(memory.as_ref(), &symbols, &mut context, &mut writer);
        PageTableWalker::new(memory.as_ref(), scope).walk(&mut scanner)?
    };

    debug!(
        "Tables read: {}, PGD entries skipped: {}, symbol cache hits/misses: {}/{}",
        stats.tables_read,
        stats.pgd_skipped,
        context.symbols.hits(),
        context.symbols.misses()
    );
    writer.finish(&stats, &context)?;
    Ok(())
}

fn run_evaluate(
    report: &Path,
    kallsyms: Option<&Path>,
    output: Option<&Path>,
    format: SummaryFormatArg,
) -> Result<()> {
    let mut rows =
        read_report(report).with_context(|| format!("reading report {}", report.display()))?;

    if let Some(path) = kallsyms {
        let mut resolver = SymbolResolver::new();
        resolver
            .load_symbol_file(path)
            .with_context(|| format!("loading symbols from {}", path.display()))?;
        relabel_symbols(&mut rows, &resolver.exact_names())?;
    }

    if let Some(path) = output {
        write_report(path, &rows)?;
        println!("Wrote {} rows to {}", rows.len(), path.display());
        return Ok(());
    }

    let evaluation = evaluate(rows)?;
    let format = match format {
        SummaryFormatArg::Text => EvaluationFormat::Text,
        SummaryFormatArg::Json => EvaluationFormat::Json,
    };
    println!("{}", format.formatter().format_evaluation(&evaluation)?);
    Ok(())
}

fn run_offsets(report: &Path, pfn: u64) -> Result<()> {
    let rows =
        read_report(report).with_context(|| format!("reading report {}", report.display()))?;
    let selected = rows_for_frame(&rows, pfn)?;
    if selected.is_empty() {
        println!("No rows recorded for PFN 0x{:x}", pfn);
        return Ok(());
    }

    print!("{}", TextFormatter::format_rows(&selected));
    println!("{}", joined_offsets(&selected));
    Ok(())
}
