use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::Connection;
use serde::Deserialize;
use tracing::info;

use crate::db;
use crate::model;

/// A province entry: either a bare name or an object carrying one.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Province {
    Name(String),
    Record {
        #[serde(alias = "name")]
        nome: String,
    },
}

impl Province {
    fn name(&self) -> &str {
        match self {
            Province::Name(n) => n,
            Province::Record { nome } => nome,
        }
    }
}

/// Main city names from province names: "Pesaro-Urbino" → Pesaro, Urbino.
pub fn main_cities(provinces_json: &str) -> Result<Vec<String>> {
    let provinces: Vec<Province> =
        serde_json::from_str(provinces_json).context("Malformed province list")?;
    Ok(provinces
        .iter()
        .flat_map(|p| p.name().split('-'))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect())
}

pub struct LoadSummary {
    pub files: usize,
    pub counts: db::LoadCounts,
    pub main_cities: usize,
}

/// Rebuild the store from the results directory and the optional province list.
pub fn load(conn: &Connection, results_dir: &Path, provinces: Option<&Path>) -> Result<LoadSummary> {
    db::reset_schema(conn)?;

    let files = model::result_files(results_dir)?;
    let mut comuni = Vec::new();
    for path in &files {
        let batch = model::read_file(path)?;
        info!("{:?}: {} comuni", path, batch.len());
        comuni.extend(batch);
    }
    let counts = db::insert_comuni(conn, &comuni)?;

    let main_cities = match provinces {
        Some(path) => {
            let text =
                fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))?;
            db::insert_main_cities(conn, &main_cities(&text)?)?
        }
        None => 0,
    };

    Ok(LoadSummary {
        files: files.len(),
        counts,
        main_cities,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provinces_split_on_hyphen() {
        let json = r#"["Torino", {"nome": "Pesaro-Urbino"}, {"name": "Barletta-Andria-Trani"}, " - "]"#;
        assert_eq!(
            main_cities(json).unwrap(),
            vec!["Torino", "Pesaro", "Urbino", "Barletta", "Andria", "Trani"]
        );
    }

    #[test]
    fn malformed_provinces_fail() {
        assert!(main_cities("{\"nome\": 1}").is_err());
    }

    #[test]
    fn load_reads_every_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("result_E.json"),
            r#"[{"comune":"Esempio","lat":45.0,"log":7.0,"stato":"Italia",
                "gemelli":[{"comune":"Ejemplo","stato":"Spagna"}]}]"#,
        )
        .unwrap();
        fs::write(
            dir.path().join("result_B.json"),
            r#"[{"comune":"Bra","gemelli":[]},{"comune":"Bari","gemelli":[{"comune":"Bar"},{"comune":"Sharm"}]}]"#,
        )
        .unwrap();
        let provinces = dir.path().join("province.json");
        fs::write(&provinces, r#"["Bari", "Forlì-Cesena"]"#).unwrap();

        let conn = Connection::open_in_memory().unwrap();
        let summary = load(&conn, dir.path(), Some(&provinces)).unwrap();
        assert_eq!(summary.files, 2);
        assert_eq!(summary.counts.comuni, 3);
        assert_eq!(summary.counts.twins, 3);
        assert_eq!(summary.main_cities, 3);

        let distance: Option<f64> = conn
            .query_row(
                "SELECT distance FROM twins WHERE comune = 'Ejemplo'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(distance, None);

        // loading again starts from scratch
        let again = load(&conn, dir.path(), None).unwrap();
        assert_eq!(again.counts.comuni, 3);
        assert_eq!(db::get_stats(&conn).unwrap().comuni, 3);
    }
}
