//! tome - ebook and comic ingestion

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use log::LevelFilter;
use serde::Serialize;

use tome::import::pdf;
use tome::{
    BookRecord, BookSource, Config, CoverRef, FileSource, Imported, Pipeline, Request, TextBlock,
};

#[derive(Parser)]
#[command(name = "tome")]
#[command(version, about = "Ebook and comic ingestion", long_about = None)]
#[command(after_help = "EXAMPLES:
    tome book.epub                       Show book metadata
    tome -b story.fb2                    Dump the text block sequence
    tome --hash --json library/*.cbz     Content hashes as JSON lines
    tome -s whale paper.pdf              Search a PDF
    tome --cover cover.png book.epub     Write the cover image")]
struct Cli {
    /// Input files (EPUB, PDF, FB2, FODT, HTML, TXT, CBZ, CBR, CB7, CBT)
    #[arg(value_name = "INPUT", required = true)]
    inputs: Vec<PathBuf>,

    /// Show book metadata (default when nothing else is asked for)
    #[arg(short, long)]
    info: bool,

    /// Dump the text block sequence
    #[arg(short, long)]
    blocks: bool,

    /// Print the content hash
    #[arg(long)]
    hash: bool,

    /// Search PDF text for QUERY
    #[arg(short, long, value_name = "QUERY")]
    search: Option<String>,

    /// Write the cover as PNG (a directory when there are several inputs)
    #[arg(long, value_name = "OUT")]
    cover: Option<PathBuf>,

    /// Print results as JSON lines
    #[arg(long)]
    json: bool,

    /// JSON configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Suppress output messages
    #[arg(short, long)]
    quiet: bool,

    /// Log parser decisions
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.quiet {
        LevelFilter::Error
    } else if cli.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Warn
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();

    let config = match &cli.config {
        Some(path) => match Config::from_json_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("error: {}: {e}", path.display());
                return ExitCode::FAILURE;
            }
        },
        None => Config::default(),
    };
    let pipeline = Pipeline::new(config);
    let sources: Vec<FileSource> = cli.inputs.iter().map(FileSource::new).collect();

    let failures = match &cli.search {
        Some(query) => search(&pipeline, &sources, query, &cli),
        None => import(&pipeline, &sources, &cli),
    };

    if failures == 0 {
        ExitCode::SUCCESS
    } else {
        if !cli.quiet {
            eprintln!("skipped {failures} of {} file(s)", sources.len());
        }
        ExitCode::FAILURE
    }
}

#[derive(Serialize)]
struct Output<'a> {
    source: &'a str,
    #[serde(flatten)]
    imported: &'a Imported,
}

fn import(pipeline: &Pipeline, sources: &[FileSource], cli: &Cli) -> usize {
    let show_info = cli.info || !(cli.blocks || cli.hash || cli.cover.is_some());
    let request = Request {
        metadata: show_info || cli.cover.is_some(),
        content: cli.blocks,
        hash: cli.hash,
    };
    let report = pipeline.import_batch(sources, request);
    let mut failures = report.skipped();

    for (name, error) in &report.failed {
        eprintln!("error: {name}: {error}");
    }

    for (name, imported) in &report.imported {
        if cli.json {
            match serde_json::to_string(&Output {
                source: name,
                imported,
            }) {
                Ok(line) => println!("{line}"),
                Err(e) => eprintln!("error: {name}: {e}"),
            }
        } else {
            print_text(name, imported, show_info);
        }

        if let (Some(out), Some(record)) = (&cli.cover, &imported.record) {
            let target = cover_path(out, record, sources.len() > 1);
            if let Err(e) = write_cover(pipeline, record, &target, cli.quiet) {
                eprintln!("error: {}: {e}", target.display());
                failures += 1;
            }
        }
    }
    failures
}

fn print_text(name: &str, imported: &Imported, show_info: bool) {
    println!("File: {name}");
    if let Some(record) = imported.record.as_ref().filter(|_| show_info) {
        println!("Title: {}", record.title);
        if !record.authors.is_empty() {
            println!("Authors: {}", record.authors.join(", "));
        }
        println!("Format: {}", record.format);
        if let Some(desc) = &record.description {
            let desc = desc.trim();
            match desc.char_indices().nth(200) {
                Some((cut, _)) => println!("Description: {}...", &desc[..cut]),
                None => println!("Description: {desc}"),
            }
        }
    }
    if let Some(hash) = &imported.hash {
        println!("Hash: {hash}");
    }
    if let Some(blocks) = &imported.blocks {
        for block in blocks {
            match block {
                TextBlock::Chapter { title, level } => {
                    println!("{} {title}", "#".repeat(usize::from(*level) + 1));
                }
                TextBlock::Paragraph { .. } => println!("{}", block.text()),
                TextBlock::Separator => println!("* * *"),
                TextBlock::Image { target } => match target {
                    CoverRef::Entry(name) => println!("[image {name}]"),
                    CoverRef::Embedded(bytes) => println!("[image: {} embedded bytes]", bytes.len()),
                    CoverRef::Page(page) => println!("[image: page {}]", page + 1),
                },
            }
        }
    }
}

fn cover_path(out: &Path, record: &BookRecord, many: bool) -> PathBuf {
    if !many {
        return out.to_path_buf();
    }
    let stem = Path::new(&record.source_path)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| record.title.clone());
    out.join(format!("{stem}.png"))
}

fn write_cover(pipeline: &Pipeline, record: &BookRecord, target: &Path, quiet: bool) -> Result<(), String> {
    let source = FileSource::new(&record.source_path);
    let cover = pipeline.cover(&source, record);
    if let Some(dir) = target.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).map_err(|e| e.to_string())?;
    }
    cover.write_png(target).map_err(|e| e.to_string())?;
    if !quiet {
        eprintln!(
            "{}: {:?} cover {}x{} -> {}",
            source.name(),
            cover.strategy,
            cover.width(),
            cover.height(),
            target.display()
        );
    }
    Ok(())
}

fn search(pipeline: &Pipeline, sources: &[FileSource], query: &str, cli: &Cli) -> usize {
    let mut failures = 0;
    for source in sources {
        let hits = match pdf::search(source, query, pipeline.config(), pipeline.cancel_token()) {
            Ok(hits) => hits,
            Err(e) => {
                eprintln!("error: {}: {e}", source.name());
                failures += 1;
                continue;
            }
        };
        for hit in &hits {
            if cli.json {
                let line = serde_json::json!({
                    "source": source.name(),
                    "page": hit.page,
                    "offset": hit.offset,
                    "excerpt": hit.excerpt,
                });
                println!("{line}");
            } else {
                println!("{}:{}:{}: {}", source.name(), hit.page + 1, hit.offset, hit.excerpt);
            }
        }
        if !cli.quiet && !cli.json {
            eprintln!("{}: {} match(es)", source.name(), hits.len());
        }
    }
    failures
}
