use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::Connection;

use crate::geo;
use crate::model::Comune;

pub fn connect(path: &Path) -> Result<Connection> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).with_context(|| format!("Failed to create {:?}", dir))?;
    }
    let conn = Connection::open(path).with_context(|| format!("Failed to open {:?}", path))?;
    conn.execute_batch("PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS comuni (
        id           INTEGER PRIMARY KEY AUTOINCREMENT,
        comune       TEXT,
        lat          REAL,
        log          REAL,
        stato        TEXT,
        provincia    TEXT,
        found_coords INTEGER,
        found_claims INTEGER
    );

    CREATE TABLE IF NOT EXISTS twins (
        id           INTEGER PRIMARY KEY AUTOINCREMENT,
        idParent     INTEGER NOT NULL REFERENCES comuni(id),
        comune       TEXT,
        lat          REAL,
        log          REAL,
        distance     REAL,
        stato        TEXT,
        provincia    TEXT,
        found_coords INTEGER,
        found_claims INTEGER
    );
    CREATE INDEX IF NOT EXISTS idx_twins_parent ON twins(idParent);

    CREATE TABLE IF NOT EXISTS main_cities (
        id   INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL
    );
";

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA)?;
    Ok(())
}

/// Drop every table and recreate the schema.
pub fn reset_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        DROP TABLE IF EXISTS twins;
        DROP TABLE IF EXISTS comuni;
        DROP TABLE IF EXISTS main_cities;
        ",
    )?;
    init_schema(conn)
}

pub struct LoadCounts {
    pub comuni: usize,
    pub twins: usize,
    pub with_distance: usize,
}

/// Insert all comuni in one transaction, then all their twins in another.
/// Parents are always committed before any twin refers to them.
pub fn insert_comuni(conn: &Connection, comuni: &[Comune]) -> Result<LoadCounts> {
    let mut parent_ids = Vec::with_capacity(comuni.len());

    let tx = conn.unchecked_transaction()?;
    {
        let mut stmt = tx.prepare(
            "INSERT INTO comuni (comune, lat, log, stato, provincia, found_coords, found_claims)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )?;
        for c in comuni {
            stmt.execute(rusqlite::params![
                c.comune, c.lat, c.log, c.stato, c.regione, c.found_coords, c.found_claims,
            ])?;
            parent_ids.push(tx.last_insert_rowid());
        }
    }
    tx.commit()?;

    let mut twins = 0;
    let mut with_distance = 0;
    let tx = conn.unchecked_transaction()?;
    {
        let mut stmt = tx.prepare(
            "INSERT INTO twins
             (idParent, comune, lat, log, distance, stato, provincia, found_coords, found_claims)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        )?;
        for (c, parent_id) in comuni.iter().zip(&parent_ids) {
            for t in &c.gemelli {
                let distance = geo::distance_km(c.point(), t.point());
                stmt.execute(rusqlite::params![
                    parent_id, t.comune, t.lat, t.log, distance, t.stato, t.regione,
                    t.found_coords, t.found_claims,
                ])?;
                twins += 1;
                with_distance += distance.is_some() as usize;
            }
        }
    }
    tx.commit()?;

    Ok(LoadCounts {
        comuni: comuni.len(),
        twins,
        with_distance,
    })
}

pub fn insert_main_cities(conn: &Connection, names: &[String]) -> Result<usize> {
    let tx = conn.unchecked_transaction()?;
    let mut count = 0;
    {
        let mut stmt = tx.prepare("INSERT INTO main_cities (name) VALUES (?1)")?;
        for name in names {
            count += stmt.execute([name])?;
        }
    }
    tx.commit()?;
    Ok(count)
}

// ── Stats ──

pub struct Stats {
    pub comuni: usize,
    pub twins: usize,
    pub with_distance: usize,
    pub unresolved_twins: usize,
    pub main_cities: usize,
}

pub fn get_stats(conn: &Connection) -> Result<Stats> {
    let comuni: usize = conn.query_row("SELECT COUNT(*) FROM comuni", [], |r| r.get(0))?;
    let twins: usize = conn.query_row("SELECT COUNT(*) FROM twins", [], |r| r.get(0))?;
    let with_distance: usize = conn.query_row(
        "SELECT COUNT(*) FROM twins WHERE distance IS NOT NULL",
        [],
        |r| r.get(0),
    )?;
    let unresolved_twins: usize = conn.query_row(
        "SELECT COUNT(*) FROM twins WHERE NOT (found_coords AND found_claims)",
        [],
        |r| r.get(0),
    )?;
    let main_cities: usize =
        conn.query_row("SELECT COUNT(*) FROM main_cities", [], |r| r.get(0))?;
    Ok(Stats {
        comuni,
        twins,
        with_distance,
        unresolved_twins,
        main_cities,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys=ON;").unwrap();
        init_schema(&conn).unwrap();
        conn
    }

    fn twin(name: &str, point: Option<(f64, f64)>) -> Comune {
        Comune {
            comune: name.into(),
            lat: point.map(|p| p.0),
            log: point.map(|p| p.1),
            found_coords: point.is_some(),
            found_claims: true,
            ..Comune::default()
        }
    }

    fn sample() -> Vec<Comune> {
        vec![
            Comune {
                comune: "Esempio".into(),
                lat: Some(45.0),
                log: Some(7.0),
                stato: "Italia".into(),
                gemelli: vec![twin("Ejemplo", None), twin("Beispiel", Some((48.0, 11.0)))],
                ..Comune::default()
            },
            Comune {
                comune: "Senza".into(),
                ..Comune::default()
            },
            Comune {
                comune: "Lontano".into(),
                gemelli: vec![Comune {
                    found_claims: false,
                    ..twin("Far", Some((0.0, 0.0)))
                }],
                ..Comune::default()
            },
        ]
    }

    #[test]
    fn row_counts_match_json() {
        let conn = memory();
        let counts = insert_comuni(&conn, &sample()).unwrap();
        assert_eq!(counts.comuni, 3);
        assert_eq!(counts.twins, 3);
        assert_eq!(counts.with_distance, 1);

        let s = get_stats(&conn).unwrap();
        assert_eq!(s.comuni, 3);
        assert_eq!(s.twins, 3);
        assert_eq!(s.with_distance, 1);
        assert_eq!(s.unresolved_twins, 2);
    }

    #[test]
    fn distance_null_unless_both_points_known() {
        let conn = memory();
        insert_comuni(&conn, &sample()).unwrap();

        let rows: Vec<(String, Option<f64>)> = conn
            .prepare("SELECT comune, distance FROM twins ORDER BY id")
            .unwrap()
            .query_map([], |r| Ok((r.get(0)?, r.get(1)?)))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(rows[0], ("Ejemplo".to_string(), None));
        assert!(rows[1].1.unwrap() > 0.0);
        // parent "Lontano" has no coordinates
        assert_eq!(rows[2], ("Far".to_string(), None));
    }

    #[test]
    fn twins_point_at_their_parent() {
        let conn = memory();
        insert_comuni(&conn, &sample()).unwrap();
        let parents: Vec<String> = conn
            .prepare(
                "SELECT C.comune FROM twins T JOIN comuni C ON C.id = T.idParent ORDER BY T.id",
            )
            .unwrap()
            .query_map([], |r| r.get(0))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(parents, vec!["Esempio", "Esempio", "Lontano"]);
    }

    #[test]
    fn reset_empties_tables() {
        let dir = tempfile::tempdir().unwrap();
        let conn = connect(&dir.path().join("nested/twinings.db")).unwrap();
        init_schema(&conn).unwrap();
        insert_comuni(&conn, &sample()).unwrap();
        insert_main_cities(&conn, &["Torino".to_string()]).unwrap();

        reset_schema(&conn).unwrap();
        let s = get_stats(&conn).unwrap();
        assert_eq!((s.comuni, s.twins, s.main_cities), (0, 0, 0));
    }
}
