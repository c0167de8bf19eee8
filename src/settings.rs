use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::Deserialize;

const CONFIG_FILE: &str = "gemellaggi";
const ENV_PREFIX: &str = "GEMELLAGGI";

/// What `run` does end to end.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Mode {
    /// Crawl, load, report and export.
    #[default]
    FullCrawl,
    /// Reuse existing JSON results: (re)load if enabled, report and export.
    ReportOnly,
}

/// One stage of `run`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Crawl,
    Load,
    Report,
    Export,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub mode: Mode,
    /// Starting letters, e.g. "ABC". Case-insensitive.
    pub letters: String,
    /// Drop and recreate the tables before loading.
    pub regenerate: bool,
    /// Report `found_claims = false` when a page has no linked entity.
    pub strict_claims: bool,
    pub paths: Paths,
    pub api: ApiSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Paths {
    pub results_dir: PathBuf,
    pub db_path: PathBuf,
    pub reports_dir: PathBuf,
    pub csv_path: PathBuf,
    pub fails_csv_path: PathBuf,
    pub provinces_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiSettings {
    pub wiki_api: String,
    /// Entity data URL, `{}` is replaced by the entity id.
    pub wikidata_entity: String,
    pub user_agent: String,
    pub timeout_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            mode: Mode::default(),
            letters: ('A'..='Z').collect(),
            regenerate: true,
            strict_claims: false,
            paths: Paths::default(),
            api: ApiSettings::default(),
        }
    }
}

impl Default for Paths {
    fn default() -> Self {
        Self {
            results_dir: PathBuf::from("results"),
            db_path: PathBuf::from("db/twinings.db"),
            reports_dir: PathBuf::from("docs/reports"),
            csv_path: PathBuf::from("docs/data/twinings.csv"),
            fails_csv_path: PathBuf::from("docs/data/twinings_fails.csv"),
            provinces_path: None,
        }
    }
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            wiki_api: "https://it.wikipedia.org/w/api.php".into(),
            wikidata_entity: "https://www.wikidata.org/wiki/Special:EntityData/{}.json".into(),
            user_agent: concat!("gemellaggi/", env!("CARGO_PKG_VERSION"), " (twin towns survey)")
                .into(),
            timeout_secs: 10,
        }
    }
}

impl Settings {
    /// Defaults, then `gemellaggi.toml` (or `path`), then `GEMELLAGGI_*` env vars.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with_env(path, None)
    }

    /// Like [`Settings::load`], reading variables from `env` instead of the
    /// process environment when given.
    fn load_with_env(path: Option<&Path>, env: Option<HashMap<String, String>>) -> Result<Self> {
        let file = match path {
            Some(p) => config::File::from(p).required(true),
            None => config::File::with_name(CONFIG_FILE).required(false),
        };
        let settings = config::Config::builder()
            .add_source(file)
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .source(env),
            )
            .build()
            .context("Failed to read configuration")?
            .try_deserialize::<Settings>()
            .context("Invalid configuration")?;
        Ok(settings)
    }

    /// Stages executed by `run`. With regeneration off, report-only mode
    /// reads the existing store as is.
    pub fn pipeline(&self) -> Vec<Step> {
        match (self.mode, self.regenerate) {
            (Mode::FullCrawl, _) => vec![Step::Crawl, Step::Load, Step::Report, Step::Export],
            (Mode::ReportOnly, true) => vec![Step::Load, Step::Report, Step::Export],
            (Mode::ReportOnly, false) => vec![Step::Report, Step::Export],
        }
    }

    /// Normalized starting letters: uppercase, deduplicated, in the given order.
    pub fn letters(&self) -> Result<Vec<char>> {
        let mut out = Vec::new();
        for c in self.letters.chars().filter(|c| !c.is_whitespace() && *c != ',') {
            if !c.is_alphabetic() {
                bail!("Invalid starting letter {:?}", c);
            }
            let upper = c.to_uppercase().next().unwrap_or(c);
            if !out.contains(&upper) {
                out.push(upper);
            }
        }
        if out.is_empty() {
            bail!("No starting letters configured");
        }
        Ok(out)
    }
}
