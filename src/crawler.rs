use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info};

use crate::model::{self, Comune};
use crate::parser::{titles, twins};
use crate::wiki::WikiClient;

/// Country every starting comune is expected to belong to.
const HOME_COUNTRY: &str = "Italia";
const SEARCH_SUFFIX: &str = "comune";
const SEARCH_LIMIT: usize = 10;

/// Crawl stats for one letter.
pub struct CrawlStats {
    pub letter: char,
    pub comuni: usize,
    pub twins: usize,
    pub unresolved_twins: usize,
    pub path: PathBuf,
}

pub struct Crawler {
    wiki: WikiClient,
    strict_claims: bool,
}

impl Crawler {
    pub fn new(wiki: WikiClient, strict_claims: bool) -> Self {
        Self { wiki, strict_claims }
    }

    /// Crawl one letter and write `result_<L>.json` under `results_dir`.
    /// Any request failure aborts the letter; nothing is written then.
    pub async fn crawl_letter(&self, letter: char, results_dir: &Path) -> Result<CrawlStats> {
        let names = self
            .wiki
            .letter_titles(letter)
            .await
            .with_context(|| format!("Failed to list comuni for letter {}", letter))?;
        info!("Comuni starting with '{}': {}", letter, names.len());

        let pb = ProgressBar::new(names.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] {bar:40} {pos}/{len} {msg}")?
                .progress_chars("=> "),
        );

        let mut comuni = Vec::with_capacity(names.len());
        for name in &names {
            pb.set_message(name.clone());
            let comune = self
                .comune(name)
                .await
                .with_context(|| format!("Failed to crawl {}", name))?;
            comuni.push(comune);
            pb.inc(1);
        }
        pb.finish_and_clear();

        let twins = comuni.iter().map(|c| c.gemelli.len()).sum();
        let unresolved_twins = comuni
            .iter()
            .flat_map(|c| &c.gemelli)
            .filter(|t| !t.is_resolved())
            .count();
        let path = model::write_results(results_dir, letter, &comuni)?;
        info!(
            "Letter {}: {} comuni, {} twins ({} unresolved) -> {:?}",
            letter,
            comuni.len(),
            twins,
            unresolved_twins,
            path
        );

        Ok(CrawlStats {
            letter,
            comuni: comuni.len(),
            twins,
            unresolved_twins,
            path,
        })
    }

    /// A starting comune with its twins resolved one level deep.
    pub async fn comune(&self, name: &str) -> Result<Comune> {
        let (title, mut comune) = self.place(name, HOME_COUNTRY).await?;

        let refs = match self.wiki.wikitext(&title).await? {
            Some(text) => twins::extract(&text),
            None => Vec::new(),
        };
        for twin_ref in refs {
            let (_, mut twin) = self.place(&twin_ref.name, &twin_ref.country).await?;
            if twin.stato.is_empty() {
                twin.stato = twin_ref.country;
            }
            comune.gemelli.push(twin);
        }

        info!(
            comune = %comune.comune,
            lat = ?comune.lat,
            lon = ?comune.log,
            stato = %comune.stato,
            regione = %comune.regione,
            found_coords = comune.found_coords,
            found_claims = comune.found_claims,
            gemelli = comune.gemelli.len(),
            "Crawled"
        );
        Ok(comune)
    }

    /// Resolve a place without looking at its twins. Returns the page title
    /// it resolved to alongside the record.
    async fn place(&self, name: &str, country: &str) -> Result<(String, Comune)> {
        let title = self.resolve_title(name, country).await?;
        let coords = self.wiki.coordinates(&title).await?;

        let (stato, regione, found_claims) = match self.wiki.wikibase_item(&title).await? {
            Some(qid) => {
                let (stato, regione) = self.wiki.claim_labels(&qid).await?;
                (stato, regione, true)
            }
            // No linked entity still counts as found unless strict_claims is
            // set; downstream exports rely on the historical behaviour.
            None => (String::new(), String::new(), !self.strict_claims),
        };

        let comune = Comune {
            comune: name.to_string(),
            lat: coords.map(|c| c.0),
            log: coords.map(|c| c.1),
            stato,
            regione,
            found_coords: coords.is_some(),
            found_claims,
            gemelli: Vec::new(),
        };
        Ok((title, comune))
    }

    /// Canonical page title for `name`, retrying once on a disambiguation page.
    pub async fn resolve_title(&self, name: &str, country: &str) -> Result<String> {
        let resolved = self.search_title(name, country).await?;
        if !titles::is_disambiguation(&resolved) {
            return Ok(resolved);
        }

        let base = titles::strip_disambiguation(&resolved);
        let qualified = titles::qualify(&base, country);
        debug!("{} is a disambiguation page, retrying as {}", resolved, qualified);
        let retried = self.search_title(&qualified, country).await?;
        if titles::is_disambiguation(&retried) {
            Ok(base)
        } else {
            Ok(retried)
        }
    }

    async fn search_title(&self, name: &str, country: &str) -> Result<String> {
        let term = format!("{} {}", name, SEARCH_SUFFIX);
        let hits = self.wiki.search(&term, SEARCH_LIMIT).await?;
        Ok(titles::best_match(name, &hits, country)
            .unwrap_or(name)
            .to_string())
    }
}
