mod crawler;
mod db;
mod export;
mod geo;
mod loader;
mod model;
mod parser;
mod report;
mod settings;
mod wiki;

use std::path::PathBuf;
use std::time::Instant;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use tracing::info;

use settings::{Mode, Settings, Step};

#[derive(Parser)]
#[command(
    name = "gemellaggi",
    about = "Italian comuni and their twin towns, from Wikipedia and Wikidata"
)]
struct Cli {
    #[command(flatten)]
    overrides: Overrides,

    #[command(subcommand)]
    command: Commands,
}

/// Command-line overrides, applied on top of file and environment settings.
#[derive(Args)]
struct Overrides {
    /// Settings file (default: ./gemellaggi.toml if present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Starting letters to crawl, e.g. "TUV"
    #[arg(short, long, global = true)]
    letters: Option<String>,

    /// Pipeline used by `run`
    #[arg(short, long, value_enum, global = true)]
    mode: Option<Mode>,

    /// Keep the existing database instead of rebuilding it
    #[arg(long, global = true)]
    no_regenerate: bool,

    /// Count pages without a linked entity as unresolved
    #[arg(long, global = true)]
    strict_claims: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Crawl the configured letters into result_<L>.json files
    Crawl,
    /// Rebuild the database from the JSON results
    Load,
    /// Write the HTML reports from the database
    Report,
    /// Write the success and failure CSV files
    Export,
    /// Run the whole pipeline for the configured mode
    Run,
    /// Show database row counts
    Stats,
}

impl Overrides {
    fn apply(&self, mut s: Settings) -> Settings {
        if let Some(letters) = &self.letters {
            s.letters = letters.clone();
        }
        if let Some(mode) = self.mode {
            s.mode = mode;
        }
        if self.no_regenerate {
            s.regenerate = false;
        }
        if self.strict_claims {
            s.strict_claims = true;
        }
        s
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let settings = cli
        .overrides
        .apply(Settings::load(cli.overrides.config.as_deref())?);

    let result = match cli.command {
        Commands::Crawl => crawl(&settings).await,
        Commands::Load => load(&settings),
        Commands::Report => report(&settings),
        Commands::Export => export(&settings),
        Commands::Run => {
            info!("Pipeline: {:?}", settings.mode);
            for step in settings.pipeline() {
                match step {
                    Step::Crawl => crawl(&settings).await?,
                    Step::Load => load(&settings)?,
                    Step::Report => report(&settings)?,
                    Step::Export => export(&settings)?,
                }
            }
            Ok(())
        }
        Commands::Stats => {
            let conn = db::connect(&settings.paths.db_path)?;
            db::init_schema(&conn)?;
            let s = db::get_stats(&conn)?;
            println!("Comuni:        {}", s.comuni);
            println!("Twins:         {}", s.twins);
            println!("  w/ distance: {}", s.with_distance);
            println!("  unresolved:  {}", s.unresolved_twins);
            println!("Main cities:   {}", s.main_cities);
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

async fn crawl(settings: &Settings) -> Result<()> {
    let letters = settings.letters()?;
    let client = wiki::WikiClient::new(&settings.api)?;
    let crawler = crawler::Crawler::new(client, settings.strict_claims);

    println!("Crawling {} letter(s): {}", letters.len(), letters.iter().collect::<String>());
    for letter in letters {
        let t = Instant::now();
        let stats = crawler
            .crawl_letter(letter, &settings.paths.results_dir)
            .await?;
        println!(
            "{}: {} comuni, {} twins ({} unresolved) in {} -> {}",
            stats.letter,
            stats.comuni,
            stats.twins,
            stats.unresolved_twins,
            format_duration(t.elapsed()),
            stats.path.display()
        );
    }
    Ok(())
}

fn load(settings: &Settings) -> Result<()> {
    let conn = db::connect(&settings.paths.db_path)?;
    if !settings.regenerate {
        println!("Regeneration disabled; keeping {}", settings.paths.db_path.display());
        return db::init_schema(&conn);
    }
    let summary = loader::load(
        &conn,
        &settings.paths.results_dir,
        settings.paths.provinces_path.as_deref(),
    )?;
    if summary.files == 0 {
        println!(
            "No result_*.json files in {}. Run 'crawl' first.",
            settings.paths.results_dir.display()
        );
    }
    println!(
        "Loaded {} files: {} comuni, {} twins ({} with distance), {} main cities.",
        summary.files,
        summary.counts.comuni,
        summary.counts.twins,
        summary.counts.with_distance,
        summary.main_cities
    );
    Ok(())
}

fn report(settings: &Settings) -> Result<()> {
    let conn = db::connect(&settings.paths.db_path)?;
    db::init_schema(&conn)?;
    let written = report::write_all(&conn, &settings.paths.reports_dir)?;
    println!(
        "Wrote {} reports to {}",
        written.len(),
        settings.paths.reports_dir.display()
    );
    Ok(())
}

fn export(settings: &Settings) -> Result<()> {
    let comuni = model::read_results(&settings.paths.results_dir)?;
    let counts = export::export(
        &comuni,
        &settings.paths.csv_path,
        &settings.paths.fails_csv_path,
    )?;
    println!(
        "CSV: {} rows -> {}",
        counts.ok,
        settings.paths.csv_path.display()
    );
    println!(
        "CSV fails: {} rows -> {}",
        counts.failed,
        settings.paths.fails_csv_path.display()
    );
    Ok(())
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("gemellaggi").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn flags_override_settings() {
        let cli = parse(&[
            "run",
            "-l",
            "tu",
            "--mode",
            "report-only",
            "--no-regenerate",
            "--strict-claims",
        ]);
        assert!(matches!(cli.command, Commands::Run));
        let s = cli.overrides.apply(Settings::default());
        assert_eq!(s.letters().unwrap(), vec!['T', 'U']);
        assert_eq!(s.mode, Mode::ReportOnly);
        assert!(!s.regenerate);
        assert!(s.strict_claims);
    }

    #[test]
    fn absent_flags_keep_settings() {
        let base = Settings {
            letters: "XYZ".into(),
            mode: Mode::ReportOnly,
            strict_claims: true,
            ..Settings::default()
        };
        let s = parse(&["export"]).overrides.apply(base);
        assert_eq!(s.letters, "XYZ");
        assert_eq!(s.mode, Mode::ReportOnly);
        assert!(s.regenerate);
        assert!(s.strict_claims);
    }
}
