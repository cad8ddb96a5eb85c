//! Command-line argument parsing for the kernel pointer scanner
use crate::core::layout::{parse_address, DEFAULT_KERNEL_TEXT_MAPPING};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "kptrscan")]
#[command(about = "Scan physical memory for kernel and module pointers", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable debug output
    #[arg(short, long, global = true)]
    pub debug: bool,

    /// Enable verbose output (warnings, status messages)
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Command {
    /// Walk the page tables and report pointer-like values in every 4 KiB page
    Scan(ScanArgs),

    /// Categorise the frames of an existing report
    Evaluate {
        /// Report written by `scan` (CSV)
        #[arg(value_name = "REPORT")]
        report: PathBuf,

        /// Replace symbols with exact matches from this kallsyms file
        #[arg(long, value_name = "FILE")]
        kallsyms: Option<PathBuf>,

        /// Write the (relabelled) report here instead of printing a summary
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Summary format
        #[arg(short, long, value_enum, default_value = "text")]
        format: SummaryFormatArg,
    },

    /// List the rows and offsets recorded for one frame
    Offsets {
        #[arg(value_name = "REPORT")]
        report: PathBuf,

        /// Frame number (hex with 0x prefix, or decimal)
        #[arg(value_name = "PFN", value_parser = parse_address)]
        pfn: u64,
    },
}

#[derive(Args)]
pub struct ScanArgs {
    /// Physical memory image (raw or LiME) or device such as /dev/mem
    #[arg(value_name = "SOURCE")]
    pub source: PathBuf,

    /// How to open SOURCE
    #[arg(long, value_enum, default_value = "auto")]
    pub source_kind: SourceKindArg,

    /// Physical address of the top-level page table (CR3)
    #[arg(long, value_name = "ADDR", value_parser = parse_address)]
    pub paging_root: u64,

    /// Kernel text mapping base
    #[arg(short = 't', long, value_name = "ADDR", value_parser = parse_address,
          default_value_t = DEFAULT_KERNEL_TEXT_MAPPING)]
    pub kernel_text_mapping: u64,

    /// Use the fixed non-KASLR address layout
    #[arg(short = 'k', long)]
    pub nokaslr: bool,

    /// JSON file overriding every classification range
    #[arg(long, value_name = "FILE")]
    pub layout: Option<PathBuf>,

    /// Report file
    #[arg(short, long, value_name = "FILE", default_value = "log.csv")]
    pub output: PathBuf,

    /// Report format
    #[arg(short, long, value_enum, default_value = "csv")]
    pub format: ReportFormatArg,

    /// Symbol file (kallsyms or System.map); defaults to /proc/kallsyms for devices
    #[arg(short, long, value_name = "FILE")]
    pub symbols: Option<PathBuf>,

    /// Follow every PGD entry instead of only the one mapping kernel text
    #[arg(long)]
    pub full_walk: bool,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
pub enum SourceKindArg {
    /// Device if SOURCE is a character device, image otherwise
    Auto,
    Dump,
    Device,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
pub enum ReportFormatArg {
    Csv,
    Jsonl,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
pub enum SummaryFormatArg {
    Text,
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_scan_defaults() {
        let cli = Cli::try_parse_from(["kptrscan", "scan", "mem.raw", "--paging-root", "0x1000"])
            .unwrap();
        let Command::Scan(args) = cli.command else {
            panic!("expected scan");
        };
        assert_eq!(args.paging_root, 0x1000);
        assert_eq!(args.kernel_text_mapping, DEFAULT_KERNEL_TEXT_MAPPING);
        assert_eq!(args.output, PathBuf::from("log.csv"));
        assert_eq!(args.source_kind, SourceKindArg::Auto);
        assert!(!args.nokaslr);
    }

    #[test]
    fn test_scan_overrides() {
        let cli = Cli::try_parse_from([
            "kptrscan", "-v", "scan", "/dev/mem", "--paging-root", "4096", "-t",
            "0xffffffff81000000", "-k", "-o", "out.jsonl", "-f", "jsonl", "--full-walk",
        ])
        .unwrap();
        assert!(cli.verbose);
        let Command::Scan(args) = cli.command else {
            panic!("expected scan");
        };
        assert_eq!(args.paging_root, 4096);
        assert_eq!(args.kernel_text_mapping, 0xffff_ffff_8100_0000);
        assert!(args.nokaslr);
        assert!(args.full_walk);
        assert_eq!(args.format, ReportFormatArg::Jsonl);
    }

    #[test]
    fn test_bad_address_rejected() {
        assert!(Cli::try_parse_from(["kptrscan", "scan", "m", "--paging-root", "0xnope"]).is_err());
        assert!(Cli::try_parse_from(["kptrscan", "offsets", "log.csv", "0x10"]).is_ok());
    }
}
