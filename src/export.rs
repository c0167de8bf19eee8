use std::fs;
use std::io::{self, Write};
use std::path::Path;

use anyhow::{Context, Result};

use crate::model::Comune;

pub const FIELDNAMES: [&str; 13] = [
    "comune_start_id",
    "comune_start_name",
    "comune_start_lat",
    "comune_start_log",
    "comune_start_regione",
    "comune_end_id",
    "comune_end_name",
    "comune_end_lat",
    "comune_end_log",
    "comune_end_stato",
    "comune_end_found_coords",
    "comune_end_found_claims",
    "gemelli_names",
];

pub const SUCCESS_SEP: char = '|';
pub const FAILURE_SEP: char = ',';
/// Row terminator of the CSV files published so far.
pub const LINE_END: &str = "\r\n";

/// One row per (comune, twin) pair, split by whether the twin resolved.
#[derive(Debug, Default)]
pub struct Split {
    pub ok: Vec<Vec<String>>,
    pub failed: Vec<Vec<String>>,
}

pub fn flatten(comuni: &[Comune]) -> Split {
    let mut split = Split::default();
    for start in comuni {
        let gemelli_names = start
            .gemelli
            .iter()
            .map(|g| format!("{} ({})", g.comune, g.stato))
            .collect::<Vec<_>>()
            .join(", ");

        for end in &start.gemelli {
            let row = vec![
                format!("s_{}", start.comune),
                start.comune.clone(),
                float(start.lat),
                float(start.log),
                start.regione.clone(),
                format!("e_{}", end.comune),
                end.comune.clone(),
                float(end.lat),
                float(end.log),
                end.stato.clone(),
                flag(end.found_coords),
                flag(end.found_claims),
                gemelli_names.clone(),
            ];
            if end.is_resolved() {
                split.ok.push(row);
            } else {
                split.failed.push(row);
            }
        }
    }
    split
}

/// `45.0` stays `45.0`; missing values are empty.
fn float(v: Option<f64>) -> String {
    v.map(|f| format!("{:?}", f)).unwrap_or_default()
}

/// Booleans as earlier published files spell them.
fn flag(b: bool) -> String {
    if b { "True" } else { "False" }.to_string()
}

fn needs_quotes(field: &str, sep: char) -> bool {
    field.contains(sep) || field.contains('"') || field.contains('\n') || field.contains('\r')
}

/// Write a single row, quoting fields that need it.
pub fn write_row<W: Write>(mut w: W, row: &[impl AsRef<str>], sep: char) -> io::Result<()> {
    let mut first = true;
    for cell in row {
        let cell = cell.as_ref();
        if !first {
            write!(w, "{}", sep)?;
        } else {
            first = false;
        }
        if needs_quotes(cell, sep) {
            write!(w, "\"{}\"", cell.replace('"', "\"\""))?;
        } else {
            write!(w, "{}", cell)?;
        }
    }
    w.write_all(LINE_END.as_bytes())
}

pub fn to_csv(rows: &[Vec<String>], sep: char) -> Vec<u8> {
    let mut buf: Vec<u8> = Vec::new();
    // writes into a Vec cannot fail
    let _ = write_row(&mut buf, &FIELDNAMES, sep);
    for r in rows {
        let _ = write_row(&mut buf, r, sep);
    }
    buf
}

fn write_file(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir).with_context(|| format!("Failed to create {:?}", dir))?;
    }
    fs::write(path, bytes).with_context(|| format!("Failed to write {:?}", path))
}

pub struct ExportCounts {
    pub ok: usize,
    pub failed: usize,
}

/// Write the success (`|`) and failure (`,`) files.
pub fn export(comuni: &[Comune], csv_path: &Path, fails_path: &Path) -> Result<ExportCounts> {
    let split = flatten(comuni);
    write_file(csv_path, &to_csv(&split.ok, SUCCESS_SEP))?;
    write_file(fails_path, &to_csv(&split.failed, FAILURE_SEP))?;
    Ok(ExportCounts {
        ok: split.ok.len(),
        failed: split.failed.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolved(name: &str, stato: &str) -> Comune {
        Comune {
            comune: name.into(),
            stato: stato.into(),
            lat: Some(1.5),
            log: Some(2.0),
            found_coords: true,
            found_claims: true,
            ..Comune::default()
        }
    }

    fn sample() -> Vec<Comune> {
        let example: Vec<Comune> = serde_json::from_str(
            r#"[{"comune":"Esempio","lat":45.0,"log":7.0,"stato":"Italia",
                "gemelli":[{"comune":"Ejemplo","stato":"Spagna"}]}]"#,
        )
        .unwrap();
        let mut all = example;
        all.push(Comune {
            comune: "Bra".into(),
            regione: "Piemonte".into(),
            lat: Some(44.7),
            log: Some(7.85),
            gemelli: vec![
                resolved("Ploufragan", "Francia"),
                resolved("Sant Adrià, de Besòs", "Spagna"),
                Comune {
                    comune: "Nowhere".into(),
                    found_coords: true,
                    ..Comune::default()
                },
            ],
            ..Comune::default()
        });
        all
    }

    #[test]
    fn example_twin_is_a_failure_only() {
        let split = flatten(&sample()[..1]);
        assert!(split.ok.is_empty());
        assert_eq!(split.failed.len(), 1);
        let row = &split.failed[0];
        assert_eq!(row[0], "s_Esempio");
        assert_eq!(row[2], "45.0");
        assert_eq!(row[5], "e_Ejemplo");
        assert_eq!(row[7], "");
        assert_eq!(row[10], "False");
        assert_eq!(row[12], "Ejemplo (Spagna)");
    }

    #[test]
    fn every_twin_lands_in_exactly_one_file() {
        let comuni = sample();
        let split = flatten(&comuni);
        let total: usize = comuni.iter().map(|c| c.gemelli.len()).sum();
        assert_eq!(split.ok.len() + split.failed.len(), total);
        assert!(split.ok.iter().all(|r| r[10] == "True" && r[11] == "True"));
        assert_eq!(split.failed.len(), 2);
        assert_eq!(
            split.ok[0][12],
            "Ploufragan (Francia), Sant Adrià, de Besòs (Spagna), Nowhere ()"
        );
    }

    #[test]
    fn fields_with_separator_are_quoted() {
        let mut buf = Vec::new();
        write_row(&mut buf, &["a|b", "say \"hi\"", "plain"], '|').unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), "\"a|b\"|\"say \"\"hi\"\"\"|plain\r\n");

        let mut buf = Vec::new();
        write_row(&mut buf, &["a|b", "x,y"], ',').unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), "a|b,\"x,y\"\r\n");
    }

    #[test]
    fn header_matches_columns() {
        let csv = String::from_utf8(to_csv(&[], '|')).unwrap();
        assert_eq!(csv, format!("{}\r\n", FIELDNAMES.join("|")));
    }

    #[test]
    fn export_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let ok = dir.path().join("data/twinings.csv");
        let fails = dir.path().join("data/twinings_fails.csv");

        let counts = export(&sample(), &ok, &fails).unwrap();
        assert_eq!((counts.ok, counts.failed), (2, 2));
        let first = (fs::read(&ok).unwrap(), fs::read(&fails).unwrap());

        export(&sample(), &ok, &fails).unwrap();
        let second = (fs::read(&ok).unwrap(), fs::read(&fails).unwrap());
        assert_eq!(first, second);

        let fails_text = String::from_utf8(first.1).unwrap();
        assert!(fails_text.starts_with("comune_start_id,comune_start_name,"));
        assert!(fails_text.contains("e_Ejemplo"));
        assert!(!String::from_utf8(first.0).unwrap().contains("e_Ejemplo"));
    }
}
