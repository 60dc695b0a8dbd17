// Command-line front end for svndelta.
//
// Explicit subcommands over the file helpers in `io`, plus a `print`
// command that dumps window headers (and optionally instructions) of an
// svndiff stream.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::process;

use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum, ValueHint};

use crate::engine::EncodeOptions;
use crate::hash::config::{DEFAULT_MAX_CHAIN, DEFAULT_WINDOW_SIZE, MATCH_BLOCKSIZE, MIN_MATCH};
use crate::hash::{Algorithm, MatcherConfig};
use crate::io::{self as file_io, IoError};
use crate::stream::{MAX_WINDOW_SIZE, StreamConfig};
use crate::svndiff::decoder::{DecoderOptions, read_stream_header, read_window};
use crate::svndiff::header::{HARD_MAX_WINSIZE, SvndiffVersion};
use crate::svndiff::secondary::DEFAULT_COMPRESSION_LEVEL;
use crate::window::Instruction;

const BUF_SIZE: usize = 64 * 1024;

// ---------------------------------------------------------------------------
// Byte size parsing (supports K, M, G suffixes)
// ---------------------------------------------------------------------------

fn parse_byte_size(s: &str) -> Result<u64, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty size string".into());
    }
    let (num_part, multiplier) = match s.as_bytes().last() {
        Some(b'k' | b'K') => (&s[..s.len() - 1], 1024u64),
        Some(b'm' | b'M') => (&s[..s.len() - 1], 1024 * 1024),
        Some(b'g' | b'G') => (&s[..s.len() - 1], 1024 * 1024 * 1024),
        _ => (s, 1u64),
    };
    let num: u64 = num_part
        .trim()
        .parse()
        .map_err(|e| format!("invalid size '{s}': {e}"))?;
    num.checked_mul(multiplier)
        .ok_or_else(|| format!("size overflow: '{s}'"))
}

fn parse_version(s: &str) -> Result<SvndiffVersion, String> {
    s.trim()
        .parse::<u8>()
        .ok()
        .and_then(SvndiffVersion::from_byte)
        .ok_or_else(|| format!("unsupported svndiff version '{s}' (expected 0, 1 or 2)"))
}

// ---------------------------------------------------------------------------
// Clap CLI definition
// ---------------------------------------------------------------------------

/// svndiff binary delta encoder/decoder.
#[derive(Parser, Debug)]
#[command(
    name = "svndelta",
    version,
    about = "svndiff binary delta encoder/decoder",
    arg_required_else_help = true
)]
struct Cli {
    #[command(subcommand)]
    command: Cmd,

    /// Force overwrite existing output files.
    #[arg(short = 'f', long, global = true)]
    force: bool,

    /// Quiet mode (suppress non-error output).
    #[arg(short = 'q', long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// Verbose mode (use multiple times for more detail).
    #[arg(short = 'v', long, global = true, action = ArgAction::Count)]
    verbose: u8,

    /// Output stats as JSON to stderr.
    #[arg(long = "json", global = true)]
    json_output: bool,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Compute a delta from SOURCE to TARGET.
    Encode(EncodeArgs),
    /// Apply a delta to SOURCE.
    Decode(DecodeArgs),
    /// Combine two consecutive deltas into one.
    Compose(ComposeArgs),
    /// Print the windows of a delta.
    Print(PrintArgs),
    /// Print build/configuration details.
    Config,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum AlgorithmArg {
    Xdelta,
    Vdelta,
}

impl From<AlgorithmArg> for Algorithm {
    fn from(arg: AlgorithmArg) -> Self {
        match arg {
            AlgorithmArg::Xdelta => Algorithm::Xdelta,
            AlgorithmArg::Vdelta => Algorithm::Vdelta,
        }
    }
}

#[derive(Args, Debug)]
struct EncodeArgs {
    /// Source file the delta copies from.
    #[arg(long, short = 's', value_hint = ValueHint::FilePath)]
    source: PathBuf,

    /// svndiff version: 0 (plain), 1 (zlib), 2 (lz4).
    #[arg(long = "svndiff-version", value_parser = parse_version, default_value = "0")]
    svndiff_version: SvndiffVersion,

    /// Compression level for zlib sections (0-9).
    #[arg(long, short = 'l', value_parser = clap::value_parser!(u32).range(0..=9), default_value_t = DEFAULT_COMPRESSION_LEVEL)]
    level: u32,

    /// Target bytes per window (supports K/M/G suffix).
    #[arg(long = "window-size", value_parser = parse_byte_size, default_value_t = DEFAULT_WINDOW_SIZE as u64)]
    window_size: u64,

    /// Matching strategy.
    #[arg(long, value_enum, default_value_t = AlgorithmArg::Xdelta)]
    algorithm: AlgorithmArg,

    #[arg(value_hint = ValueHint::FilePath)]
    target: PathBuf,

    #[arg(value_hint = ValueHint::FilePath)]
    delta: PathBuf,
}

#[derive(Args, Debug)]
struct DecodeArgs {
    /// Source file the delta was computed against.
    #[arg(long, short = 's', value_hint = ValueHint::FilePath)]
    source: PathBuf,

    /// Accept a delta that ends in the middle of a window.
    #[arg(long = "allow-truncated")]
    allow_truncated: bool,

    #[arg(value_hint = ValueHint::FilePath)]
    delta: PathBuf,

    #[arg(value_hint = ValueHint::FilePath)]
    output: PathBuf,
}

#[derive(Args, Debug)]
struct ComposeArgs {
    /// svndiff version of the composed delta.
    #[arg(long = "svndiff-version", value_parser = parse_version, default_value = "0")]
    svndiff_version: SvndiffVersion,

    /// Delta from the base text to the intermediate text.
    #[arg(value_hint = ValueHint::FilePath)]
    first: PathBuf,

    /// Delta from the intermediate text to the final text.
    #[arg(value_hint = ValueHint::FilePath)]
    second: PathBuf,

    #[arg(value_hint = ValueHint::FilePath)]
    output: PathBuf,
}

#[derive(Args, Debug)]
struct PrintArgs {
    /// Also list each window's instructions.
    #[arg(long)]
    ops: bool,

    #[arg(value_hint = ValueHint::FilePath)]
    delta: PathBuf,
}

// ---------------------------------------------------------------------------
// Resolved options
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Encode,
    Decode,
    Compose,
    Print,
    Config,
}

#[derive(Debug)]
struct Options {
    command: Command,
    force: bool,
    quiet: bool,
    verbose: u8,
    json_output: bool,
    version: SvndiffVersion,
    level: u32,
    window_size: u64,
    algorithm: Algorithm,
    allow_truncated: bool,
    print_ops: bool,
    source_file: Option<PathBuf>,
    /// Delta inputs, in application order.
    inputs: Vec<PathBuf>,
    output_file: Option<PathBuf>,
}

fn resolve_options(cli: Cli) -> Options {
    let mut opts = Options {
        command: Command::Config,
        force: cli.force,
        quiet: cli.quiet,
        verbose: cli.verbose.min(2),
        json_output: cli.json_output,
        version: SvndiffVersion::V0,
        level: DEFAULT_COMPRESSION_LEVEL,
        window_size: DEFAULT_WINDOW_SIZE as u64,
        algorithm: Algorithm::default(),
        allow_truncated: false,
        print_ops: false,
        source_file: None,
        inputs: Vec::new(),
        output_file: None,
    };

    match cli.command {
        Cmd::Encode(args) => {
            opts.command = Command::Encode;
            opts.version = args.svndiff_version;
            opts.level = args.level;
            opts.window_size = args.window_size;
            opts.algorithm = args.algorithm.into();
            opts.source_file = Some(args.source);
            opts.inputs = vec![args.target];
            opts.output_file = Some(args.delta);
        }
        Cmd::Decode(args) => {
            opts.command = Command::Decode;
            opts.allow_truncated = args.allow_truncated;
            opts.source_file = Some(args.source);
            opts.inputs = vec![args.delta];
            opts.output_file = Some(args.output);
        }
        Cmd::Compose(args) => {
            opts.command = Command::Compose;
            opts.version = args.svndiff_version;
            opts.inputs = vec![args.first, args.second];
            opts.output_file = Some(args.output);
        }
        Cmd::Print(args) => {
            opts.command = Command::Print;
            opts.print_ops = args.ops;
            opts.inputs = vec![args.delta];
        }
        Cmd::Config => {}
    }
    opts
}

#[cfg(any(test, feature = "fuzzing"))]
pub fn fuzz_try_parse_args(args: &[String]) {
    let argv: Vec<String> = std::iter::once("svndelta".to_string())
        .chain(args.iter().cloned())
        .collect();
    if let Ok(cli) = Cli::try_parse_from(argv) {
        let _ = resolve_options(cli);
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn emit_json(value: serde_json::Value) {
    match serde_json::to_string_pretty(&value) {
        Ok(text) => eprintln!("{text}"),
        Err(e) => eprintln!("svndelta: json: {e}"),
    }
}

/// Refuse to clobber an existing output unless `--force` was given.
fn check_output(path: &Path, force: bool) -> Result<(), i32> {
    if path.exists() && !force {
        eprintln!(
            "svndelta: output file exists, use -f to overwrite: {}",
            path.display()
        );
        return Err(1);
    }
    Ok(())
}

fn report_error(context: &str, err: &IoError) -> i32 {
    eprintln!("svndelta: {context}: {err}");
    1
}

fn build_encode_options(opts: &Options) -> EncodeOptions {
    EncodeOptions {
        version: opts.version,
        compression_level: opts.level,
        stream: StreamConfig {
            window_size: opts.window_size as usize,
            algorithm: opts.algorithm,
            matcher: MatcherConfig::default(),
        },
    }
}

// ---------------------------------------------------------------------------
// Config command
// ---------------------------------------------------------------------------

fn cmd_config() -> i32 {
    let version = env!("CARGO_PKG_VERSION");
    eprintln!("svndelta version {version} (Rust)");

    let zlib = cfg!(feature = "zlib") as u8;
    let lz4 = cfg!(feature = "lz4") as u8;
    let ptr_size = std::mem::size_of::<*const ()>();

    eprintln!("SVNDIFF1_ZLIB={zlib}");
    eprintln!("SVNDIFF2_LZ4={lz4}");
    eprintln!("DEFAULT_WINDOW_SIZE={DEFAULT_WINDOW_SIZE}");
    eprintln!("MAX_WINDOW_SIZE={MAX_WINDOW_SIZE}");
    eprintln!("HARD_MAX_WINSIZE={HARD_MAX_WINSIZE}");
    eprintln!("MATCH_BLOCKSIZE={MATCH_BLOCKSIZE}");
    eprintln!("MIN_MATCH={MIN_MATCH}");
    eprintln!("DEFAULT_MAX_CHAIN={DEFAULT_MAX_CHAIN}");
    eprintln!("DEFAULT_COMPRESSION_LEVEL={DEFAULT_COMPRESSION_LEVEL}");
    eprintln!("sizeof(usize)={ptr_size}");

    0
}

// ---------------------------------------------------------------------------
// Encode command
// ---------------------------------------------------------------------------

fn cmd_encode(opts: &Options) -> i32 {
    let (Some(source), [target], Some(delta)) =
        (&opts.source_file, opts.inputs.as_slice(), &opts.output_file)
    else {
        eprintln!("svndelta: encode requires --source, TARGET and DELTA");
        return 1;
    };
    if let Err(code) = check_output(delta, opts.force) {
        return code;
    }

    let stats = match file_io::encode_file(source, target, delta, &build_encode_options(opts)) {
        Ok(stats) => stats,
        Err(e) => return report_error("encode", &e),
    };

    if opts.verbose > 0 && !opts.quiet {
        eprintln!(
            "svndelta: encoder: source size: {}, target size: {}, delta size: {}, windows: {}",
            stats.source_size, stats.target_size, stats.delta_size, stats.windows
        );
    }

    if opts.json_output {
        emit_json(serde_json::json!({
            "command": "encode",
            "version": opts.version.byte(),
            "algorithm": opts.algorithm.name(),
            "source_size": stats.source_size,
            "target_size": stats.target_size,
            "delta_size": stats.delta_size,
            "windows": stats.windows,
            "source_sha256": hex(&stats.source_sha256),
            "target_sha256": hex(&stats.target_sha256),
        }));
    }

    0
}

// ---------------------------------------------------------------------------
// Decode command
// ---------------------------------------------------------------------------

fn cmd_decode(opts: &Options) -> i32 {
    let (Some(source), [delta], Some(output)) =
        (&opts.source_file, opts.inputs.as_slice(), &opts.output_file)
    else {
        eprintln!("svndelta: decode requires --source, DELTA and OUTPUT");
        return 1;
    };
    if let Err(code) = check_output(output, opts.force) {
        return code;
    }

    let options = DecoderOptions {
        error_on_early_close: !opts.allow_truncated,
    };
    let stats = match file_io::decode_file(source, delta, output, options) {
        Ok(stats) => stats,
        Err(e) => return report_error("decode", &e),
    };

    if opts.verbose > 0 && !opts.quiet {
        eprintln!(
            "svndelta: decoder: output size: {}, windows: {}",
            stats.output_size, stats.windows
        );
    }

    if opts.json_output {
        emit_json(serde_json::json!({
            "command": "decode",
            "source_size": stats.source_size,
            "delta_size": stats.delta_size,
            "output_size": stats.output_size,
            "windows": stats.windows,
            "output_sha256": hex(&stats.output_sha256),
        }));
    }

    0
}

// ---------------------------------------------------------------------------
// Compose command
// ---------------------------------------------------------------------------

fn cmd_compose(opts: &Options) -> i32 {
    let ([first, second], Some(output)) = (opts.inputs.as_slice(), &opts.output_file) else {
        eprintln!("svndelta: compose requires DELTA_A, DELTA_B and OUTPUT");
        return 1;
    };
    if let Err(code) = check_output(output, opts.force) {
        return code;
    }

    let stats = match file_io::compose_files(first, second, output, opts.version) {
        Ok(stats) => stats,
        Err(e) => return report_error("compose", &e),
    };

    if opts.verbose > 0 && !opts.quiet {
        eprintln!(
            "svndelta: compose: {} + {} windows -> {} windows, {} bytes",
            stats.windows_a, stats.windows_b, stats.windows, stats.delta_size
        );
    }

    if opts.json_output {
        emit_json(serde_json::json!({
            "command": "compose",
            "version": opts.version.byte(),
            "windows_a": stats.windows_a,
            "windows_b": stats.windows_b,
            "windows": stats.windows,
            "delta_size": stats.delta_size,
        }));
    }

    0
}

// ---------------------------------------------------------------------------
// Print command
// ---------------------------------------------------------------------------

fn cmd_print(opts: &Options) -> i32 {
    let [input] = opts.inputs.as_slice() else {
        eprintln!("svndelta: print requires a delta file");
        return 1;
    };

    let file = match File::open(input) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("svndelta: {}: {e}", input.display());
            return 1;
        }
    };
    let mut reader = BufReader::with_capacity(BUF_SIZE, file);

    let version = match read_stream_header(&mut reader) {
        Ok(v) => v,
        Err(e) => {
            eprintln!("svndelta: invalid svndiff header: {e}");
            return 1;
        }
    };
    println!("svndiff version:              {}", version.byte());

    let mut window_num: u64 = 0;
    let mut target_offset: u64 = 0;

    loop {
        let window = match read_window(&mut reader, version) {
            Ok(Some(w)) => w,
            Ok(None) => break,
            Err(e) => {
                eprintln!("svndelta: window {window_num}: {e}");
                return 1;
            }
        };

        println!();
        println!("window number:                {window_num}");
        println!("source view offset:           {}", window.source_view_offset());
        println!("source view length:           {}", window.source_view_len());
        println!("target window offset:         {target_offset}");
        println!("target window length:         {}", window.target_view_len());
        println!("instruction count:            {}", window.ops().len());
        println!("new data length:              {}", window.new_data().len());

        if opts.print_ops {
            let mut pos = 0usize;
            for op in window.ops() {
                match *op {
                    Instruction::CopyFromSource { offset, length } => {
                        println!("  {pos:>10}  source  {length:>8} @ {offset}");
                    }
                    Instruction::CopyFromTarget { offset, length } => {
                        println!("  {pos:>10}  target  {length:>8} @ {offset}");
                    }
                    Instruction::Insert { length, .. } => {
                        println!("  {pos:>10}  new     {length:>8}");
                    }
                }
                pos += op.length();
            }
        }

        target_offset += window.target_view_len() as u64;
        window_num += 1;
    }

    if opts.json_output {
        emit_json(serde_json::json!({
            "command": "print",
            "version": version.byte(),
            "windows": window_num,
            "target_size": target_offset,
        }));
    }

    0
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

/// Main CLI entry point. Parses arguments via clap, dispatches commands.
pub fn run() -> ! {
    let cli = Cli::parse();
    let opts = resolve_options(cli);

    let default_filter = match (opts.quiet, opts.verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, _) => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .format_timestamp(None)
        .format_target(false)
        .init();

    if opts.command == Command::Encode
        && (opts.window_size == 0 || opts.window_size > MAX_WINDOW_SIZE as u64)
    {
        eprintln!(
            "svndelta: --window-size: {} must be between 1 and {MAX_WINDOW_SIZE}",
            opts.window_size
        );
        process::exit(1);
    }

    let exit_code = match opts.command {
        Command::Encode => cmd_encode(&opts),
        Command::Decode => cmd_decode(&opts),
        Command::Compose => cmd_compose(&opts),
        Command::Print => cmd_print(&opts),
        Command::Config => cmd_config(),
    };

    process::exit(exit_code);
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
