//! CLI binary for sheet-split.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `SplitConfig` and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use sheet_split::{
    inspect, process, process_to_file, BatchProgressCallback, ProcessingReport, ProgressCallback,
    SplitConfig,
};
use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress bar with one log line per finished group.
struct CliProgressCallback {
    bar: ProgressBar,
    start_times: Mutex<HashMap<String, Instant>>,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    /// Spinner until `on_batch_start` reports the group count.
    fn new_dynamic() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Reading spreadsheet…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
            errors: AtomicUsize::new(0),
        })
    }

    fn activate_bar(&self, total: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} groups  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Rendering");
        self.bar.reset_eta();
    }

    fn elapsed_secs(&self, key: &str) -> f64 {
        self.start_times
            .lock()
            .unwrap()
            .remove(key)
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl BatchProgressCallback for CliProgressCallback {
    fn on_batch_start(&self, total_groups: usize, skipped_rows: usize) {
        self.activate_bar(total_groups);
        let skipped = if skipped_rows > 0 {
            dim(&format!(" ({skipped_rows} rows without a serial skipped)"))
        } else {
            String::new()
        };
        self.bar.println(format!(
            "{} {}{}",
            cyan("◆"),
            bold(&format!("Splitting into {total_groups} groups…")),
            skipped
        ));
    }

    fn on_group_start(&self, _index: usize, _total: usize, key: &str) {
        self.start_times
            .lock()
            .unwrap()
            .insert(key.to_string(), Instant::now());
        self.bar.set_message(format!("serial {key}"));
    }

    fn on_group_complete(&self, index: usize, total: usize, key: &str, renderer: &str) {
        let secs = self.elapsed_secs(key);
        self.bar.println(format!(
            "  {} {:>4}/{:<4} {:<16} {:<9} {}",
            green("✓"),
            index,
            total,
            key,
            dim(renderer),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_group_error(&self, index: usize, total: usize, key: &str, error: &str) {
        let secs = self.elapsed_secs(key);
        self.errors.fetch_add(1, Ordering::SeqCst);

        // Truncate very long error messages to keep output tidy.
        let msg: String = if error.chars().count() > 80 {
            format!("{}\u{2026}", error.chars().take(79).collect::<String>())
        } else {
            error.to_string()
        };

        self.bar.println(format!(
            "  {} {:>4}/{:<4} {:<16} {}  {}",
            red("✗"),
            index,
            total,
            key,
            red(&msg),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_batch_complete(&self, total_groups: usize, success_count: usize) {
        let failed = total_groups.saturating_sub(success_count);
        self.bar.finish_and_clear();

        if failed == 0 {
            eprintln!(
                "{} {} documents created",
                green("✔"),
                bold(&success_count.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} documents created  ({} failed)",
                if failed == total_groups {
                    red("✘")
                } else {
                    cyan("⚠")
                },
                bold(&success_count.to_string()),
                total_groups,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # One PDF per delivery challan, written under ./output
  sheet-split challans.xlsx

  # Different key column, workbooks too, 4 groups at a time
  sheet-split -s "Invoice No" --xlsx -c 4 invoices.xlsx -o out

  # See how the sheet would be split without rendering anything
  sheet-split --inspect challans.xlsx

  # Machine-readable report, fail the command if any group failed
  sheet-split --json --strict challans.xlsx > report.json

  # No browser on this machine: plain-text PDFs only
  sheet-split --no-chrome challans.csv

  # Friendlier printed headers, plus one ZIP with every PDF
  sheet-split --header "Del.Challan=Challan No" --header "Qty=Quantity" --zip challans.xlsx

OUTPUT LAYOUT:
  <output-dir>/processed-pdfs/<prefix>_<timestamp>_Serial_<key>.pdf
  <output-dir>/processed-xlsx/<prefix>_<timestamp>_Serial_<key>.xlsx   (--xlsx)
  <output-dir>/processed-bundles/<prefix>_<timestamp>_grouped_pdfs.zip (--zip)
  Keys that map to the same safe name get _2, _3, … suffixes.

ENVIRONMENT VARIABLES:
  CHROME_PATH          Browser executable to use (skips discovery)
  CHROME_LOCATE_SKIP   Set to disable browser discovery entirely
  RUST_LOG             Override log filtering (e.g. sheet_split=debug)
"#;

/// Split a spreadsheet into one PDF per serial value.
#[derive(Parser, Debug)]
#[command(
    name = "sheet-split",
    version,
    about = "Split a spreadsheet into one PDF per serial value",
    long_about = "Group the rows of an XLSX/XLS/ODS/CSV file by a key column and render each \
group as a single-page table PDF, using headless Chrome when available and a built-in \
text renderer otherwise.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local spreadsheet path or HTTP/HTTPS URL.
    input: String,

    /// Directory that receives processed-pdfs/ and processed-xlsx/.
    #[arg(short, long, env = "SHEET_SPLIT_OUTPUT_DIR", default_value = "output")]
    output_dir: PathBuf,

    /// Column whose value groups rows.
    #[arg(short, long, env = "SHEET_SPLIT_SERIAL_COLUMN", default_value = "Del.Challan")]
    serial_column: String,

    /// Worksheet name (default: first sheet).
    #[arg(long, env = "SHEET_SPLIT_SHEET")]
    sheet: Option<String>,

    /// Also write each group as an XLSX workbook.
    #[arg(long, env = "SHEET_SPLIT_XLSX")]
    xlsx: bool,

    /// Also store one ZIP holding every PDF.
    #[arg(long, env = "SHEET_SPLIT_ZIP")]
    zip: bool,

    /// Print a source header under another name (repeatable).
    #[arg(long = "header", value_name = "OLD=NEW", value_parser = parse_header_label)]
    headers: Vec<(String, String)>,

    /// Groups rendered at once.
    #[arg(short, long, env = "SHEET_SPLIT_CONCURRENCY", default_value_t = 1)]
    concurrency: usize,

    /// Skip the browser and use the text renderer for every group.
    #[arg(long, env = "SHEET_SPLIT_NO_CHROME")]
    no_chrome: bool,

    /// Browser executable (overrides discovery).
    #[arg(long, env = "SHEET_SPLIT_CHROME_PATH")]
    chrome_path: Option<PathBuf>,

    /// First component of artifact names.
    #[arg(long, env = "SHEET_SPLIT_PREFIX", default_value = "batch")]
    prefix: String,

    /// Write the JSON report to this file.
    #[arg(long, env = "SHEET_SPLIT_REPORT")]
    report: Option<PathBuf>,

    /// Print the JSON report (or inspection summary) to stdout.
    #[arg(long, env = "SHEET_SPLIT_JSON")]
    json: bool,

    /// Exit non-zero when any group failed.
    #[arg(long, env = "SHEET_SPLIT_STRICT")]
    strict: bool,

    /// Show groups and counts only; render nothing.
    #[arg(long)]
    inspect: bool,

    /// Disable progress bar.
    #[arg(long, env = "SHEET_SPLIT_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "SHEET_SPLIT_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "SHEET_SPLIT_QUIET")]
    quiet: bool,

    /// Per-browser-operation timeout in seconds.
    #[arg(long, env = "SHEET_SPLIT_RENDER_TIMEOUT", default_value_t = 30)]
    render_timeout: u64,

    /// Whole-run timeout in seconds.
    #[arg(long, env = "SHEET_SPLIT_TIMEOUT")]
    timeout: Option<u64>,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "SHEET_SPLIT_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Largest accepted source, in MiB.
    #[arg(long, env = "SHEET_SPLIT_MAX_SIZE_MB", default_value_t = 10)]
    max_size_mb: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Suppress INFO-level library logs when the progress bar is active.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && !cli.inspect;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let progress_cb: Option<ProgressCallback> = if show_progress {
        let cb = CliProgressCallback::new_dynamic();
        Some(cb as Arc<dyn BatchProgressCallback>)
    } else {
        None
    };

    let config = build_config(&cli, progress_cb)?;

    // ── Inspect mode ─────────────────────────────────────────────────────
    if cli.inspect {
        let summary = inspect(&cli.input, &config)
            .await
            .context("Failed to inspect spreadsheet")?;

        if cli.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&summary).context("Failed to serialise summary")?
            );
        } else {
            println!("File:          {}", cli.input);
            println!("Rows:          {}", summary.total_rows);
            println!("Columns:       {}", summary.columns.join(", "));
            println!("Serial column: {}", summary.serial_column);
            println!("Skipped rows:  {}", summary.skipped_rows);
            println!("Ordering:      {:?}", summary.ordering);
            if let Some(r) = summary.key_range {
                println!("Key range:     {} – {}", r.min, r.max);
            }
            println!("Groups:        {}", summary.groups.len());
            for g in &summary.groups {
                println!("  {:<20} {:>5} rows", g.group_key, g.row_count);
            }
        }
        return Ok(());
    }

    // ── Run ──────────────────────────────────────────────────────────────
    let report = match cli.report {
        Some(ref path) => process_to_file(&cli.input, path, &config).await,
        None => process(&cli.input, &config).await,
    }
    .context("Processing failed")?;

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("Failed to serialise report")?
        );
    } else if !cli.quiet {
        print_summary(&report, &cli, show_progress);
    }

    if cli.strict {
        report.into_result().context("Some groups failed")?;
    }

    Ok(())
}

fn print_summary(report: &ProcessingReport, cli: &Cli, show_progress: bool) {
    if !show_progress {
        for r in &report.results {
            match (&r.document_url, &r.error) {
                (Some(url), _) => println!("{}  {}", r.group_key, url),
                (None, Some(e)) => eprintln!("{}  {}", r.group_key, red(&e.to_string())),
                (None, None) => {}
            }
        }
    }

    eprintln!(
        "{}  {}/{} documents  {} rows ({} skipped)  {}ms  →  {}",
        if report.failed_count() == 0 {
            green("✔")
        } else {
            cyan("⚠")
        },
        report.documents_created,
        report.total_groups,
        report.total_rows,
        report.skipped_rows,
        report.duration_ms,
        bold(&cli.output_dir.display().to_string()),
    );
    if report.fallback_documents > 0 {
        eprintln!(
            "   {}",
            dim(&format!(
                "{} documents used the text renderer",
                report.fallback_documents
            ))
        );
    }
    if let Some(n) = report.tabular_artifacts_created {
        eprintln!("   {}", dim(&format!("{n} workbooks created")));
    }
    match report.bundle_url {
        Some(ref url) => eprintln!("   bundle: {}", bold(url)),
        None if cli.zip => eprintln!("   {}", red("bundle was not created (see log)")),
        None => {}
    }
    if let Some(ref path) = cli.report {
        eprintln!("   report: {}", bold(&path.display().to_string()));
    }
}

/// Map CLI args to `SplitConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<SplitConfig> {
    let mut builder = SplitConfig::builder()
        .serial_column(cli.serial_column.clone())
        .also_produce_tabular_artifacts(cli.xlsx)
        .bundle_documents(cli.zip)
        .concurrency(cli.concurrency)
        .use_browser(!cli.no_chrome)
        .render_timeout_secs(cli.render_timeout)
        .download_timeout_secs(cli.download_timeout)
        .max_source_bytes(cli.max_size_mb.saturating_mul(1024 * 1024))
        .artifact_prefix(cli.prefix.clone())
        .output_dir(cli.output_dir.clone());

    if let Some(ref sheet) = cli.sheet {
        builder = builder.sheet(sheet.clone());
    }
    if let Some(ref path) = cli.chrome_path {
        builder = builder.browser_path(path.clone());
    }
    if let Some(secs) = cli.timeout {
        builder = builder.run_timeout_secs(secs);
    }
    for (from, to) in &cli.headers {
        builder = builder.header_label(from.clone(), to.clone());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

/// Parse `OLD=NEW` for `--header`. Only the first `=` splits.
fn parse_header_label(s: &str) -> std::result::Result<(String, String), String> {
    match s.split_once('=') {
        Some((from, to)) if !from.is_empty() && !to.trim().is_empty() => {
            Ok((from.to_string(), to.to_string()))
        }
        _ => Err(format!("expected OLD=NEW, got '{s}'")),
    }
}
