use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

const RESULT_PATTERN: &str = "result_*.json";

/// A municipality as written to `result_<L>.json`. Twins share the shape, one
/// level deep: their own `gemelli` list is always empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Comune {
    pub comune: String,
    pub lat: Option<f64>,
    pub log: Option<f64>,
    pub stato: String,
    pub regione: String,
    pub found_coords: bool,
    pub found_claims: bool,
    pub gemelli: Vec<Comune>,
}

impl Comune {
    /// (lat, lon) when both coordinates are known.
    pub fn point(&self) -> Option<(f64, f64)> {
        Some((self.lat?, self.log?))
    }

    pub fn is_resolved(&self) -> bool {
        self.found_coords && self.found_claims
    }
}

pub fn result_path(dir: &Path, letter: char) -> PathBuf {
    dir.join(format!("result_{}.json", letter))
}

/// Write one letter's results, pretty-printed with 4-space indentation.
pub fn write_results(dir: &Path, letter: char, comuni: &[Comune]) -> Result<PathBuf> {
    fs::create_dir_all(dir).with_context(|| format!("Failed to create {:?}", dir))?;
    let path = result_path(dir, letter);

    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    comuni.serialize(&mut ser)?;

    fs::write(&path, buf).with_context(|| format!("Failed to write {:?}", path))?;
    Ok(path)
}

/// Paths of every `result_*.json` under `dir`, sorted.
pub fn result_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let pattern = dir.join(RESULT_PATTERN);
    let pattern = pattern.to_string_lossy();
    let mut files = glob::glob(&pattern)
        .with_context(|| format!("Bad results pattern {}", pattern))?
        .collect::<Result<Vec<_>, _>>()?;
    files.sort();
    Ok(files)
}

pub fn read_file(path: &Path) -> Result<Vec<Comune>> {
    let text = fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))?;
    serde_json::from_str(&text).with_context(|| format!("Malformed results file {:?}", path))
}

/// Every comune from every results file, in file order.
pub fn read_results(dir: &Path) -> Result<Vec<Comune>> {
    let mut all = Vec::new();
    for path in result_files(dir)? {
        all.extend(read_file(&path)?);
    }
    Ok(all)
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXAMPLE: &str = r#"[{"comune":"Esempio","lat":45.0,"log":7.0,"stato":"Italia",
        "gemelli":[{"comune":"Ejemplo","stato":"Spagna"}]}]"#;

    #[test]
    fn partial_objects_fill_defaults() {
        let comuni: Vec<Comune> = serde_json::from_str(EXAMPLE).unwrap();
        assert_eq!(comuni.len(), 1);
        let c = &comuni[0];
        assert_eq!(c.point(), Some((45.0, 7.0)));
        assert_eq!(c.regione, "");
        assert!(!c.found_coords);

        let twin = &c.gemelli[0];
        assert_eq!(twin.comune, "Ejemplo");
        assert_eq!(twin.stato, "Spagna");
        assert_eq!(twin.point(), None);
        assert!(!twin.is_resolved());
        assert!(twin.gemelli.is_empty());
    }

    #[test]
    fn point_needs_both_coordinates() {
        let c = Comune {
            lat: Some(1.0),
            ..Comune::default()
        };
        assert_eq!(c.point(), None);
    }

    #[test]
    fn written_files_are_found_and_read_back_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let b = vec![Comune {
            comune: "Bra".into(),
            ..Comune::default()
        }];
        let a = vec![Comune {
            comune: "Àgliè".into(),
            lat: Some(45.36),
            log: Some(7.77),
            ..Comune::default()
        }];
        write_results(dir.path(), 'B', &b).unwrap();
        let path = write_results(dir.path(), 'A', &a).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("\n        \"comune\": \"Àgliè\""));
        assert!(text.contains("\"lat\": 45.36"));

        let files = result_files(dir.path()).unwrap();
        assert_eq!(files.len(), 2);
        let all = read_results(dir.path()).unwrap();
        let names: Vec<&str> = all.iter().map(|c| c.comune.as_str()).collect();
        assert_eq!(names, vec!["Àgliè", "Bra"]);
    }

    #[test]
    fn unrelated_files_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("notes.json"), "not json").unwrap();
        assert!(read_results(dir.path()).unwrap().is_empty());
    }
}
