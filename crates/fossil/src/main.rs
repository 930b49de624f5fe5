use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use fossil_core::error::{FossilError, Result};
use fossil_core::memory::MemoryReader;
use fossil_core::runtime::Goroutine;
use fossil_core::search::find_first;
use fossil_core::target::{CoreProcess, Target};
use fossil_core::types::{Address, ThreadId};
use fossil_utils::{info, init_logging, init_logging_with_level, LogFormat, LogLevel};

/// A post-mortem debugger for Go core dumps.
#[derive(Parser, Debug)]
#[command(name = "fossil")]
#[command(version)]
#[command(about = "Inspect threads, goroutines and memory of a Go core dump", long_about = None)]
struct Cli
{
    /// Core dump to open
    #[arg(long, env = "FOSSIL_CORE")]
    core: PathBuf,
    /// Executable that produced the core
    #[arg(long, env = "FOSSIL_EXE")]
    exe: PathBuf,
    /// Log level (overrides RUST_LOG)
    #[arg(long, env = "FOSSIL_LOG_LEVEL")]
    log_level: Option<LogLevel>,
    /// Log format: pretty or json
    #[arg(long, env = "FOSSIL_LOG_FORMAT", default_value = "pretty")]
    log_format: LogFormat,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands
{
    /// Show process, architecture and selection
    Info,
    /// List threads and where they stopped
    Threads,
    /// List live goroutines
    Goroutines,
    /// List mapped memory regions
    Regions,
    /// Dump memory
    Memory
    {
        /// Address to read from (hex with 0x prefix, or decimal)
        #[arg(value_parser = parse_address)]
        address: Address,
        /// Number of bytes to read (at most 1 MiB)
        #[arg(short, long, default_value_t = 64, value_parser = parse_dump_length)]
        length: usize,
    },
    /// Search memory for a byte pattern
    Find
    {
        /// Pattern as hex bytes, e.g. `deadbeef` or `de:ad:be:ef`
        #[arg(value_parser = parse_hex_bytes)]
        pattern: HexBytes,
    },
    /// Resolve a source location to an address
    Location
    {
        /// `file:line` or a function name
        spec: String,
        /// For a function, stop after its prologue
        #[arg(long, default_value_t = false)]
        first_line: bool,
        /// For a function, the line this many lines after its entry
        #[arg(long, default_value_t = 0)]
        offset: u32,
    },
    /// Select a goroutine and show where it is
    Goroutine
    {
        #[arg(allow_negative_numbers = true)]
        id: i64,
    },
    /// Select a thread and show where it is
    Thread
    {
        id: u64,
    },
}

/// Byte pattern given on the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
struct HexBytes(Vec<u8>);

/// Where `location` should resolve.
#[derive(Debug, Clone, PartialEq, Eq)]
enum LocationSpec
{
    Line
    {
        file: String,
        line: u32,
    },
    Function(String),
}

fn main()
{
    let cli = Cli::parse();

    let logging = match cli.log_level {
        Some(level) => init_logging_with_level(level, cli.log_format),
        None => init_logging(),
    };
    let _guard = match logging {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {e}");
            process::exit(1);
        }
    };

    if let Err(e) = run(cli) {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()>
{
    info!(core = %cli.core.display(), exe = %cli.exe.display(), "opening core");
    let mut process = CoreProcess::open(&cli.core, &cli.exe)?;

    match cli.command {
        Commands::Info => print_info(&process),
        Commands::Threads => print_threads(&process),
        Commands::Goroutines => print_goroutines(&process),
        Commands::Regions => {
            for region in process.memory_regions() {
                println!(
                    "{}-{} {} {:<10} {}",
                    region.start,
                    region.end,
                    region.permissions,
                    region.source,
                    region.name.as_deref().unwrap_or("")
                );
            }
            Ok(())
        }
        Commands::Memory { address, length } => dump_memory(&process, address, length),
        Commands::Find { pattern } => {
            let runtime = tokio::runtime::Runtime::new()?;
            let chunk = process.config().search_chunk_size;
            match runtime.block_on(find_first(process.core().memory(), &pattern.0, chunk))? {
                Some(address) => println!("found at {address}"),
                None => println!("not found"),
            }
            Ok(())
        }
        Commands::Location {
            spec,
            first_line,
            offset,
        } => {
            let address = match parse_location_spec(&spec) {
                LocationSpec::Line { file, line } => process.find_file_location(&file, line)?,
                LocationSpec::Function(name) => process.find_function_location(&name, first_line, offset)?,
            };
            println!("{}", process.bin_info().location(address));
            Ok(())
        }
        Commands::Goroutine { id } => {
            process.switch_goroutine(id)?;
            match process.selected_goroutine() {
                Some(goroutine) => println!("{}", describe_goroutine(goroutine)),
                None => println!("no goroutine selected"),
            }
            print_current_thread(&process)
        }
        Commands::Thread { id } => {
            process.switch_thread(ThreadId(id))?;
            print_current_thread(&process)?;
            if let Some(goroutine) = process.selected_goroutine() {
                println!("{}", describe_goroutine(goroutine));
            }
            Ok(())
        }
    }
}

fn print_info(process: &CoreProcess) -> Result<()>
{
    let core = process.core();
    println!("Core Information:");
    println!("  PID: {}", process.pid());
    println!("  Architecture: {}", core.architecture());
    if let Some(command) = core.command() {
        println!("  Command: {command}");
    }
    println!("  Threads: {}", core.thread_count());
    println!("  Memory Regions: {}", process.memory_regions().len());
    if let Some(thread) = process.current_thread() {
        println!("  Current Thread: {}", thread.thread_id());
    }
    match process.selected_goroutine() {
        Some(goroutine) => println!("  Selected Goroutine: {}", goroutine.id),
        None => println!("  Selected Goroutine: none"),
    }
    Ok(())
}

fn print_threads(process: &CoreProcess) -> Result<()>
{
    let current = process.current_thread().map(|t| t.thread_id());
    for thread in process.threads() {
        let marker = if Some(thread.thread_id()) == current { '*' } else { ' ' };
        println!("{marker} Thread {} at {}", thread.thread_id(), thread.location()?);
    }
    Ok(())
}

fn print_goroutines(process: &CoreProcess) -> Result<()>
{
    let selected = process.selected_goroutine().map(|g| g.id);
    let goroutines = process.goroutines()?;
    for goroutine in goroutines {
        let marker = if Some(goroutine.id) == selected { '*' } else { ' ' };
        println!("{marker} {}", describe_goroutine(goroutine));
    }
    println!("[{} goroutines]", goroutines.len());
    Ok(())
}

fn print_current_thread(process: &CoreProcess) -> Result<()>
{
    let thread = process
        .current_thread()
        .ok_or_else(|| FossilError::InvalidCore("no thread selected".to_string()))?;
    println!("Thread {} at {}", thread.thread_id(), thread.location()?);
    Ok(())
}

fn describe_goroutine(goroutine: &Goroutine) -> String
{
    let location = goroutine
        .location
        .as_ref()
        .map_or_else(|| goroutine.pc.to_string(), ToString::to_string);
    match goroutine.thread {
        Some(thread) => format!("Goroutine {} ({}, thread {thread}) {location}", goroutine.id, goroutine.status),
        None => format!("Goroutine {} ({}) {location}", goroutine.id, goroutine.status),
    }
}

/// Hex dump of `length` bytes at `address`; bytes read before an unmapped
/// area are printed before the error is returned.
fn dump_memory(process: &CoreProcess, address: Address, length: usize) -> Result<()>
{
    let mut buf = vec![0u8; length];
    let (read, failure) = match process.core().read_memory(&mut buf, address) {
        Ok(read) => (read, None),
        Err(err) => (err.bytes_read(), Some(err)),
    };
    for (row, chunk) in buf[..read].chunks(16).enumerate() {
        let hex: Vec<String> = chunk.iter().map(|b| format!("{b:02x}")).collect();
        let ascii: String = chunk
            .iter()
            .map(|&b| if b.is_ascii_graphic() || b == b' ' { b as char } else { '.' })
            .collect();
        println!("{}: {:<47}  |{ascii}|", address + (row as u64) * 16, hex.join(" "));
    }
    failure.map_or(Ok(()), Err)
}

/// Upper bound on a single `memory` dump.
const MAX_DUMP_LENGTH: usize = 1 << 20;

fn parse_dump_length(text: &str) -> std::result::Result<usize, String>
{
    let length: usize = text
        .trim()
        .parse()
        .map_err(|e| format!("invalid length {text:?}: {e}"))?;
    if length > MAX_DUMP_LENGTH {
        return Err(format!("length {length} exceeds the {MAX_DUMP_LENGTH} byte limit"));
    }
    Ok(length)
}

fn parse_address(text: &str) -> std::result::Result<Address, String>
{
    let text = text.trim();
    let value = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(&hex.replace('_', ""), 16),
        None => text.replace('_', "").parse(),
    };
    value
        .map(Address::from)
        .map_err(|e| format!("invalid address {text:?}: {e}"))
}

fn parse_hex_bytes(text: &str) -> std::result::Result<HexBytes, String>
{
    let digits: String = text
        .trim()
        .trim_start_matches("0x")
        .chars()
        .filter(|c| !matches!(c, ' ' | ':' | '_'))
        .collect();
    if digits.is_empty() {
        return Err("empty pattern".to_string());
    }
    if !digits.is_ascii() {
        return Err(format!("invalid hex in {text:?}"));
    }
    if digits.len() % 2 != 0 {
        return Err(format!("odd number of hex digits in {text:?}"));
    }
    (0..digits.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&digits[i..i + 2], 16).map_err(|e| format!("invalid hex in {text:?}: {e}")))
        .collect::<std::result::Result<Vec<u8>, String>>()
        .map(HexBytes)
}

/// `path/file.go:42` is a line; anything else names a function.
fn parse_location_spec(spec: &str) -> LocationSpec
{
    if let Some((file, line)) = spec.rsplit_once(':') {
        if let Ok(line) = line.parse() {
            if !file.is_empty() {
                return LocationSpec::Line {
                    file: file.to_string(),
                    line,
                };
            }
        }
    }
    LocationSpec::Function(spec.to_string())
}
