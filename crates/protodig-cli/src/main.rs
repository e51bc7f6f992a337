//! protodig - Recover .proto definitions embedded in compiled binaries
//!
//! Scans executables and raw memory dumps for serialized
//! `FileDescriptorProto` data and writes the reconstructed `.proto` files.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, ValueEnum};
use protodig_core::scanner::{DEFAULT_BACKWARD_WINDOW, DEFAULT_SIZE_SLACK, MAX_PROTOBUF_SIZE};
use protodig_core::{HighlightedLine, Presenter, RenderConfig, ScanReport, ScannerConfig, SpanKind};
use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Component, Path, PathBuf};
use tracing::{debug, error, info, trace, warn, Level};
use tracing_subscriber::EnvFilter;
use walkdir::{DirEntry, WalkDir};

/// Recover .proto definitions embedded in compiled binaries
#[derive(Parser, Debug)]
#[command(name = "protodig")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(flatten)]
    input: InputMode,

    /// Directory that receives reconstructed .proto files
    #[arg(short, long, default_value = ".")]
    output: PathBuf,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Print highlighted definitions to the terminal instead of writing files
    #[arg(long)]
    stdout: bool,

    /// Stop after this many candidates per input (0 = unlimited)
    #[arg(long, default_value_t = 0)]
    max_descriptors: usize,

    /// Bytes before each `.proto` match searched for a descriptor start
    #[arg(long, default_value_t = DEFAULT_BACKWARD_WINDOW)]
    backward_window: usize,

    /// Largest number of bytes read for one descriptor
    #[arg(long, default_value_t = MAX_PROTOBUF_SIZE)]
    max_size: usize,

    /// Bytes added to the estimated descriptor size before decoding
    #[arg(long, default_value_t = DEFAULT_SIZE_SLACK)]
    slack: usize,

    /// Address of the first input byte (decimal or 0x-prefixed hex)
    #[arg(long, default_value = "0", value_parser = parse_address)]
    base_address: u64,

    /// Spaces per nesting level in rendered output
    #[arg(long, default_value_t = 1)]
    indent: usize,

    /// Report what would be written without touching the output directory
    #[arg(long)]
    dry_run: bool,

    /// Replace files that already exist
    #[arg(long)]
    force: bool,

    /// Print recovered file names only
    #[arg(long)]
    list_only: bool,

    /// What to do when two inputs hold different files with the same name
    #[arg(long, value_enum, default_value = "hash-suffix")]
    conflict_strategy: ConflictStrategy,
}

#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
struct InputMode {
    /// A single binary or memory dump
    #[arg(short, long)]
    file: Option<PathBuf>,

    /// A directory searched recursively for binaries
    #[arg(short, long)]
    directory: Option<PathBuf>,
}

/// Naming of a same-name, different-content file
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ConflictStrategy {
    /// Insert a short content hash: name~a1b2c3d4.proto
    HashSuffix,
    /// Insert the source binary name: name~from-server.proto
    SourceSuffix,
    /// Keep only the first variant
    SkipConflicts,
}

impl Cli {
    fn scanner_config(&self) -> ScannerConfig {
        ScannerConfig::new()
            .backward_window(self.backward_window)
            .max_protobuf_size(self.max_size)
            .size_slack(self.slack)
            .max_results(self.max_descriptors)
    }

    fn render_config(&self) -> RenderConfig {
        RenderConfig::new().indent_str(" ".repeat(self.indent))
    }

    /// Whether the run ends with a summary line
    fn summarize(&self) -> bool {
        !self.list_only && !self.stdout
    }
}

fn parse_address(s: &str) -> std::result::Result<u64, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("invalid address '{}': {}", s, e))
}

/// Where a reconstructed file should go
#[derive(Debug, PartialEq, Eq)]
enum Placement {
    /// First variant of this name
    Canonical(PathBuf),
    /// A different variant, renamed by the conflict strategy
    Renamed(PathBuf),
    /// Identical content was already placed
    Duplicate,
    /// A different variant dropped by `SkipConflicts`
    Skipped,
}

impl Placement {
    fn path(&self) -> Option<&Path> {
        match self {
            Placement::Canonical(path) | Placement::Renamed(path) => Some(path),
            Placement::Duplicate | Placement::Skipped => None,
        }
    }
}

#[derive(Debug, Default)]
struct RunStats {
    inputs: usize,
    recovered: usize,
    duplicates: usize,
    renamed: usize,
    rejected: usize,
    written: usize,
}

/// Content variants per file name, across all inputs of one run
#[derive(Default)]
struct OutputRegistry {
    variants: HashMap<String, Vec<blake3::Hash>>,
    stats: RunStats,
}

impl OutputRegistry {
    fn new() -> Self {
        Self::default()
    }

    /// Eight hex digits of a content hash
    fn short_hash(hash: &blake3::Hash) -> String {
        hash.to_hex()[..8].to_string()
    }

    /// `name.proto` -> `name{suffix}.proto`
    fn suffixed(name: &str, suffix: &str) -> String {
        match name.strip_suffix(".proto") {
            Some(stem) => format!("{stem}{suffix}.proto"),
            None => format!("{name}{suffix}"),
        }
    }

    fn place(
        &mut self,
        name: &str,
        content: &str,
        output_dir: &Path,
        source: &Path,
        strategy: ConflictStrategy,
    ) -> Placement {
        let hash = blake3::hash(content.as_bytes());
        let known = self.variants.entry(name.to_string()).or_default();

        if known.contains(&hash) {
            debug!("{} already placed with identical content", name);
            self.stats.duplicates += 1;
            return Placement::Duplicate;
        }

        if known.is_empty() {
            known.push(hash);
            return Placement::Canonical(output_dir.join(name));
        }

        let suffix = match strategy {
            ConflictStrategy::SkipConflicts => {
                debug!("Dropping variant {} of {}", Self::short_hash(&hash), name);
                self.stats.duplicates += 1;
                return Placement::Skipped;
            }
            ConflictStrategy::HashSuffix => format!("~{}", Self::short_hash(&hash)),
            ConflictStrategy::SourceSuffix => {
                let stem = source
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .unwrap_or("unknown");
                format!("~from-{stem}")
            }
        };

        known.push(hash);
        let renamed = Self::suffixed(name, &suffix);
        info!("{} differs from an earlier variant, using {}", name, renamed);
        self.stats.renamed += 1;
        Placement::Renamed(output_dir.join(renamed))
    }

    fn print_summary(&self) {
        let s = &self.stats;
        eprintln!(
            "Summary: {} input(s), {} recovered, {} duplicate(s), {} renamed, {} rejected, {} written",
            s.inputs, s.recovered, s.duplicates, s.renamed, s.rejected, s.written
        );
    }
}

/// Sends the files recovered from one input to disk or the terminal
struct CliPresenter<'a> {
    cli: &'a Cli,
    registry: &'a mut OutputRegistry,
    source: &'a Path,
    /// Prefix notices with the source path
    show_source: bool,
}

impl CliPresenter<'_> {
    fn print_highlighted(&self, name: &str, lines: &[HighlightedLine]) {
        println!("// {}", name);
        for line in lines {
            println!("{}", colorize(line));
        }
    }

    fn save(&mut self, name: &str, content: &str) {
        if let Err(e) = check_relative(name) {
            warn!("Refusing to write {}: {:#}", name, e);
            self.registry.stats.rejected += 1;
            return;
        }

        let placement = self.registry.place(
            name,
            content,
            &self.cli.output,
            self.source,
            self.cli.conflict_strategy,
        );
        let Some(path) = placement.path() else {
            return;
        };

        if self.cli.dry_run {
            println!("Would write: {}", path.display());
            if self.cli.verbose > 0 {
                println!("---\n{}\n---", content);
            }
            return;
        }

        match write_output(path, content, self.cli.force) {
            Ok(()) => {
                println!("Wrote {}", path.display());
                self.registry.stats.written += 1;
            }
            Err(e) => error!("{:#}", e),
        }
    }
}

impl Presenter for CliPresenter<'_> {
    fn present(&mut self, name: &str, lines: Vec<HighlightedLine>) {
        self.registry.stats.recovered += 1;

        if self.cli.list_only {
            println!("{}", name);
        } else if self.cli.stdout {
            self.print_highlighted(name, &lines);
        } else {
            let content = lines
                .iter()
                .map(|line| line.text.as_str())
                .collect::<Vec<_>>()
                .join("\n");
            self.save(name, &content);
        }
    }

    fn notify(&mut self, message: &str) {
        if self.show_source {
            println!("{}: {}", self.source.display(), message);
        } else {
            println!("{}", message);
        }
    }
}

/// ANSI SGR parameters per span kind
fn ansi_code(kind: SpanKind) -> &'static str {
    match kind {
        SpanKind::StringLiteral => "32",
        SpanKind::Identifier => "36",
        SpanKind::Declaration => "1;33",
        SpanKind::Number => "35",
    }
}

fn colorize(line: &HighlightedLine) -> String {
    let mut out = String::with_capacity(line.text.len());
    let mut pos = 0;
    for span in &line.spans {
        out.push_str(&line.text[pos..span.range.start]);
        out.push_str(&format!("\x1b[{}m{}\x1b[0m", ansi_code(span.kind), line.slice(span)));
        pos = span.range.end;
    }
    out.push_str(&line.text[pos..]);
    out
}

/// Reject names that would escape the output directory
fn check_relative(name: &str) -> Result<()> {
    for component in Path::new(name).components() {
        match component {
            Component::Normal(_) | Component::CurDir => {}
            Component::ParentDir => bail!("path contains '..'"),
            Component::RootDir | Component::Prefix(_) => bail!("path is absolute"),
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    let mut registry = OutputRegistry::new();
    match (&cli.input.file, &cli.input.directory) {
        (Some(file), _) => scan_input_file(&cli, file, &mut registry)?,
        (None, Some(directory)) => scan_directory(&cli, directory, &mut registry)?,
        (None, None) => bail!("Either --file or --directory must be specified"),
    }

    if cli.summarize() {
        registry.print_summary();
    }
    Ok(())
}

fn scan_input_file(cli: &Cli, file: &Path, registry: &mut OutputRegistry) -> Result<()> {
    if !file.is_file() {
        bail!("Not a readable file: {}", file.display());
    }
    scan_binary(cli, file, registry, false)?;
    Ok(())
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry
            .file_name()
            .to_str()
            .is_some_and(|name| name.starts_with('.'))
}

fn scan_directory(cli: &Cli, directory: &Path, registry: &mut OutputRegistry) -> Result<()> {
    if !directory.is_dir() {
        bail!("Not a directory: {}", directory.display());
    }
    info!("Scanning directory: {}", directory.display());

    let files = WalkDir::new(directory)
        .into_iter()
        .filter_entry(|entry| !is_hidden(entry))
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file());

    for entry in files {
        let path = entry.path();
        if !looks_like_binary(path) {
            trace!("Skipping {}", path.display());
            continue;
        }
        if let Err(e) = scan_binary(cli, path, registry, true) {
            warn!("Skipping {}: {:#}", path.display(), e);
        }
    }
    Ok(())
}

/// Extensions never worth scanning
const TEXT_EXTENSIONS: &[&str] = &[
    "txt", "md", "json", "yaml", "yml", "xml", "html", "css", "js", "ts", "py", "rb", "go", "rs",
    "c", "h", "cpp", "hpp", "java", "proto", "toml", "ini", "cfg", "conf", "log", "csv", "svg",
    "png", "jpg", "jpeg", "gif", "pdf", "zip", "tar", "gz", "bz2", "xz", "7z", "rar", "sh",
    "bash", "zsh", "fish", "ps1", "bat", "cmd",
];

/// Extensions commonly used for raw memory dumps
const DUMP_EXTENSIONS: &[&str] = &["bin", "dmp", "core", "raw", "mem"];

/// Executable headers: Mach-O (both byte orders, both widths), fat Mach-O, ELF, PE
const EXECUTABLE_MAGIC: &[&[u8]] = &[
    &[0xCF, 0xFA, 0xED, 0xFE],
    &[0xCE, 0xFA, 0xED, 0xFE],
    &[0xFE, 0xED, 0xFA, 0xCF],
    &[0xFE, 0xED, 0xFA, 0xCE],
    &[0xCA, 0xFE, 0xBA, 0xBE],
    b"\x7fELF",
    b"MZ",
];

/// Inputs outside this size range are not scanned in directory mode
const SCANNABLE_SIZE: std::ops::RangeInclusive<u64> = 1024..=500 * 1024 * 1024;

/// Cheap filter for directory mode: extension, size, then header magic
fn looks_like_binary(path: &Path) -> bool {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);

    if let Some(ext) = &extension {
        if TEXT_EXTENSIONS.contains(&ext.as_str()) {
            return false;
        }
    }

    match fs::metadata(path) {
        Ok(metadata) if SCANNABLE_SIZE.contains(&metadata.len()) => {}
        _ => return false,
    }

    let mut header = Vec::with_capacity(4);
    if let Ok(file) = fs::File::open(path) {
        let _ = file.take(4).read_to_end(&mut header);
    }
    if EXECUTABLE_MAGIC.iter().any(|magic| header.starts_with(magic)) {
        return true;
    }

    match &extension {
        None => true,
        Some(ext) => DUMP_EXTENSIONS.contains(&ext.as_str()),
    }
}

/// Map one input into an image and run a session over it
fn scan_binary(
    cli: &Cli,
    path: &Path,
    registry: &mut OutputRegistry,
    show_source: bool,
) -> Result<ScanReport> {
    let mut presenter = CliPresenter {
        cli,
        registry,
        source: path,
        show_source,
    };
    let report = protodig_core::scan_file(
        path,
        cli.base_address,
        cli.scanner_config(),
        cli.render_config(),
        &mut presenter,
    )?;
    registry.stats.inputs += 1;

    debug!(
        "{}: {} candidate(s), {} decoded, {} duplicate(s), {} reconstructed",
        path.display(),
        report.candidates,
        report.decoded,
        report.duplicates,
        report.files.len()
    );
    Ok(report)
}

/// Write `content` to `path`, creating parent directories.
/// Existing files are only replaced when `force` is set.
fn write_output(path: &Path, content: &str, force: bool) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    let mut options = OpenOptions::new();
    options.write(true);
    if force {
        options.create(true).truncate(true);
    } else {
        options.create_new(true);
    }

    let mut file = match options.open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
            bail!("{} already exists (use --force to overwrite)", path.display())
        }
        Err(e) => return Err(e).with_context(|| format!("Failed to open {}", path.display())),
    };
    file.write_all(content.as_bytes())
        .with_context(|| format!("Failed to write {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use protodig_core::Span;
    use tempfile::TempDir;

    /// A name-only descriptor between runs of noise
    fn image_with(name: &str) -> Vec<u8> {
        let mut data = vec![0x00; 8];
        data.push(0x0A);
        data.push(name.len() as u8);
        data.extend_from_slice(name.as_bytes());
        data.extend_from_slice(&[0xFF; 32]);
        data
    }

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("protodig").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_identical_content_is_placed_once() {
        let out = Path::new("/out");
        let src = Path::new("/bin/app");
        let mut registry = OutputRegistry::new();

        let first = registry.place("a.proto", "package a;\n", out, src, ConflictStrategy::HashSuffix);
        assert_eq!(first, Placement::Canonical(out.join("a.proto")));

        let again = registry.place("a.proto", "package a;\n", out, src, ConflictStrategy::HashSuffix);
        assert_eq!(again, Placement::Duplicate);
        assert_eq!(registry.stats.duplicates, 1);
    }

    #[test]
    fn test_conflict_strategies() {
        let out = Path::new("/out");
        let src = Path::new("/bin/server");
        let hash = OutputRegistry::short_hash(&blake3::hash(b"package b;\n"));

        let mut registry = OutputRegistry::new();
        registry.place("x/a.proto", "package a;\n", out, src, ConflictStrategy::HashSuffix);
        let renamed = registry.place("x/a.proto", "package b;\n", out, src, ConflictStrategy::HashSuffix);
        assert_eq!(renamed, Placement::Renamed(out.join(format!("x/a~{hash}.proto"))));
        assert_eq!(registry.stats.renamed, 1);

        let mut registry = OutputRegistry::new();
        registry.place("a.proto", "package a;\n", out, src, ConflictStrategy::SourceSuffix);
        let renamed = registry.place("a.proto", "package b;\n", out, src, ConflictStrategy::SourceSuffix);
        assert_eq!(renamed, Placement::Renamed(out.join("a~from-server.proto")));

        let mut registry = OutputRegistry::new();
        registry.place("a.proto", "package a;\n", out, src, ConflictStrategy::SkipConflicts);
        let skipped = registry.place("a.proto", "package b;\n", out, src, ConflictStrategy::SkipConflicts);
        assert_eq!(skipped, Placement::Skipped);
        assert!(skipped.path().is_none());
    }

    #[test]
    fn test_suffixed() {
        assert_eq!(OutputRegistry::suffixed("test.proto", "~abc"), "test~abc.proto");
        assert_eq!(OutputRegistry::suffixed("a/b/test.proto", "~abc"), "a/b/test~abc.proto");
        assert_eq!(OutputRegistry::suffixed("odd", "~abc"), "odd~abc");
    }

    #[test]
    fn test_short_hash() {
        let a = OutputRegistry::short_hash(&blake3::hash(b"hello"));
        assert_eq!(a, OutputRegistry::short_hash(&blake3::hash(b"hello")));
        assert_ne!(a, OutputRegistry::short_hash(&blake3::hash(b"world")));
        assert_eq!(a.len(), 8);
    }

    #[test]
    fn test_looks_like_binary() {
        let dir = TempDir::new().unwrap();

        let text = dir.path().join("notes.txt");
        fs::write(&text, vec![b'a'; 2048]).unwrap();
        assert!(!looks_like_binary(&text));

        let small = dir.path().join("tiny");
        fs::write(&small, b"\x7fELF").unwrap();
        assert!(!looks_like_binary(&small));

        let mut elf = b"\x7fELF".to_vec();
        elf.resize(2048, 0);
        let exe = dir.path().join("server.so");
        fs::write(&exe, &elf).unwrap();
        assert!(looks_like_binary(&exe));

        let dump = dir.path().join("heap.dmp");
        fs::write(&dump, vec![0u8; 2048]).unwrap();
        assert!(looks_like_binary(&dump));
    }

    #[test]
    fn test_check_relative() {
        assert!(check_relative("google/protobuf/any.proto").is_ok());
        assert!(check_relative("./a.proto").is_ok());
        assert!(check_relative("../../evil.proto").is_err());
        assert!(check_relative("a/../../evil.proto").is_err());
        assert!(check_relative("/etc/evil.proto").is_err());
    }

    #[test]
    fn test_parse_address() {
        assert_eq!(parse_address("0x400000"), Ok(0x40_0000));
        assert_eq!(parse_address("4096"), Ok(4096));
        assert!(parse_address("0xzz").is_err());
    }

    #[test]
    fn test_colorize() {
        let line = HighlightedLine {
            text: " int32 id = 1;".to_string(),
            spans: vec![
                Span { range: 7..9, kind: SpanKind::Identifier },
                Span { range: 12..13, kind: SpanKind::Number },
            ],
        };
        assert_eq!(colorize(&line), " int32 \x1b[36mid\x1b[0m = \x1b[35m1\x1b[0m;");

        let plain = HighlightedLine {
            text: "}".to_string(),
            spans: Vec::new(),
        };
        assert_eq!(colorize(&plain), "}");
    }

    #[test]
    fn test_write_output_respects_force() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/a.proto");

        write_output(&path, "first", false).unwrap();
        assert!(write_output(&path, "second", false).is_err());
        assert_eq!(fs::read_to_string(&path).unwrap(), "first");

        write_output(&path, "third", true).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "third");
    }

    #[test]
    fn test_scan_binary_writes_files() {
        let input = TempDir::new().unwrap();
        let output = TempDir::new().unwrap();
        let binary = input.path().join("app.bin");
        fs::write(&binary, image_with("svc/api.proto")).unwrap();

        let cli = parse(&[
            "--file",
            binary.to_str().unwrap(),
            "--output",
            output.path().to_str().unwrap(),
            "--base-address",
            "0x1000",
        ]);
        let mut registry = OutputRegistry::new();
        let report = scan_binary(&cli, &binary, &mut registry, false).unwrap();

        assert_eq!(report.files.len(), 1);
        assert_eq!(report.files[0].window.start, 0x1000 + 8);
        let written = fs::read_to_string(output.path().join("svc/api.proto")).unwrap();
        assert_eq!(written, "package ;\n\n");
        assert_eq!(registry.stats.written, 1);
        assert_eq!(registry.stats.inputs, 1);
    }

    #[test]
    fn test_scan_binary_missing_input() {
        let input = TempDir::new().unwrap();
        let missing = input.path().join("gone.bin");
        let cli = parse(&["--file", missing.to_str().unwrap()]);

        let mut registry = OutputRegistry::new();
        let err = scan_binary(&cli, &missing, &mut registry, false).unwrap_err();
        assert!(err.to_string().contains("gone.bin"));
        assert_eq!(registry.stats.inputs, 0);
    }

    #[test]
    fn test_scan_binary_rejects_traversal() {
        let input = TempDir::new().unwrap();
        let output = TempDir::new().unwrap();
        let binary = input.path().join("app.bin");
        fs::write(&binary, image_with("../../evil.proto")).unwrap();

        let cli = parse(&[
            "--file",
            binary.to_str().unwrap(),
            "--output",
            output.path().to_str().unwrap(),
        ]);
        let mut registry = OutputRegistry::new();
        let report = scan_binary(&cli, &binary, &mut registry, false).unwrap();

        assert_eq!(report.files.len(), 1);
        assert_eq!(registry.stats.rejected, 1);
        assert_eq!(registry.stats.written, 0);
    }

    #[test]
    fn test_config_overrides() {
        let cli = parse(&[
            "--file",
            "dump",
            "--backward-window",
            "8",
            "--slack",
            "16",
            "--max-size",
            "4096",
            "--indent",
            "2",
        ]);
        let config = cli.scanner_config();
        assert_eq!(config.backward_window, 8);
        assert_eq!(config.size_slack, 16);
        assert_eq!(config.max_protobuf_size, 4096);
        assert_eq!(cli.render_config().indent_str, "  ");
        assert!(cli.summarize());
    }

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
