use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rusqlite::types::Value;
use rusqlite::Connection;
use tracing::info;

pub struct Report {
    pub file: &'static str,
    pub sql: &'static str,
}

/// The fixed report battery, one HTML file each.
pub const REPORTS: &[Report] = &[
    Report {
        file: "count-comuni.html",
        sql: "SELECT count(*) AS comuni_total FROM comuni",
    },
    Report {
        file: "count-twins.html",
        sql: "SELECT count(*) AS twins_total FROM twins",
    },
    Report {
        file: "top-20-distance.html",
        sql: "SELECT C.comune, C.provincia, T.comune AS twin, T.stato, round(T.distance) AS distance
              FROM comuni C INNER JOIN twins T ON C.id = T.idParent
              WHERE T.distance IS NOT NULL
              ORDER BY T.distance DESC, C.comune
              LIMIT 20",
    },
    Report {
        file: "top-20-distance-local.html",
        sql: "SELECT C.comune, C.provincia, T.comune AS twin, T.provincia, round(T.distance) AS distance
              FROM comuni C INNER JOIN twins T ON C.id = T.idParent
              WHERE lower(T.stato) = 'italia' AND T.distance IS NOT NULL
              ORDER BY T.distance DESC, C.comune
              LIMIT 20",
    },
    Report {
        file: "top-20-twinings.html",
        sql: "SELECT C.comune, C.provincia, count(T.id) AS twins_count
              FROM comuni C INNER JOIN twins T ON C.id = T.idParent
              GROUP BY C.comune, C.provincia
              ORDER BY twins_count DESC, C.comune
              LIMIT 20",
    },
    Report {
        file: "top-20-twining-states.html",
        sql: "SELECT CASE WHEN T.stato = '' OR T.stato IS NULL THEN 'not-found' ELSE T.stato END AS stato,
                     count(T.id) AS stati_count
              FROM twins T
              GROUP BY 1
              ORDER BY stati_count DESC, stato
              LIMIT 20",
    },
    Report {
        file: "single-twin-states.html",
        sql: "SELECT C.comune, T.stato, TT.stati_count
              FROM comuni C
              INNER JOIN twins T ON C.id = T.idParent
              INNER JOIN (
                  SELECT stato, count(id) AS stati_count
                  FROM twins
                  WHERE stato <> ''
                  GROUP BY stato
                  HAVING count(id) = 1
              ) TT ON T.stato = TT.stato
              ORDER BY T.stato",
    },
    Report {
        file: "top-20-twinned-cities.html",
        sql: "SELECT T.comune AS twin, T.stato, count(T.id) AS comuni_count
              FROM twins T
              WHERE lower(T.stato) <> 'italia'
              GROUP BY T.comune, T.stato
              ORDER BY comuni_count DESC, T.comune
              LIMIT 20",
    },
    Report {
        file: "comuni-without-twins.html",
        sql: "SELECT C.comune, C.provincia
              FROM comuni C
              WHERE NOT EXISTS (SELECT 1 FROM twins T WHERE T.idParent = C.id)
              ORDER BY C.comune",
    },
    Report {
        file: "missing-main-cities.html",
        sql: "SELECT M.name AS main_city
              FROM main_cities M
              WHERE NOT EXISTS (SELECT 1 FROM comuni C WHERE lower(C.comune) = lower(M.name))
              ORDER BY M.name",
    },
];

pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

pub fn query_table(conn: &Connection, sql: &str) -> Result<Table> {
    let mut stmt = conn.prepare(sql)?;
    let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
    let n = columns.len();
    let rows = stmt
        .query_map([], |row| (0..n).map(|i| row.get::<_, Value>(i)).collect())?
        .collect::<Result<Vec<Vec<Value>>, _>>()?;
    Ok(Table { columns, rows })
}

/// Run every report and write it under `dir`.
pub fn write_all(conn: &Connection, dir: &Path) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(dir).with_context(|| format!("Failed to create {:?}", dir))?;
    let generated = chrono::Local::now().format("%Y-%m-%d %H:%M").to_string();

    let mut written = Vec::with_capacity(REPORTS.len());
    for report in REPORTS {
        let table = query_table(conn, report.sql)
            .with_context(|| format!("Report {} failed", report.file))?;
        let path = dir.join(report.file);
        fs::write(&path, render_html(&title_of(report.file), &table, &generated))
            .with_context(|| format!("Failed to write {:?}", path))?;
        info!("{}: {} rows", report.file, table.rows.len());
        written.push(path);
    }
    Ok(written)
}

/// "top-20-distance.html" → "top 20 distance".
pub fn title_of(file: &str) -> String {
    file.trim_end_matches(".html").replace('-', " ")
}

pub fn render_html(title: &str, table: &Table, generated: &str) -> String {
    let title = escape(title);
    let mut html = String::new();
    html.push_str("<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n");
    html.push_str(&format!("<title>{}</title>\n", title));
    html.push_str(
        "<style>\n\
         table { border-collapse: collapse; font-family: sans-serif; font-size: 0.9em; }\n\
         th, td { border: 1px solid #999; padding: 2px 8px; }\n\
         th.title { background: #ddd; text-transform: capitalize; }\n\
         td.num { text-align: right; }\n\
         p.generated { color: #777; font-size: 0.8em; }\n\
         </style>\n</head>\n<body>\n",
    );

    html.push_str("<table border='1'>\n");
    html.push_str(&format!(
        "  <tr><th class='title' colspan={}>{}</th></tr>\n",
        table.columns.len() + 1,
        title
    ));
    html.push_str("  <tr><th>#</th>");
    for col in &table.columns {
        html.push_str(&format!("<th>{}</th>", escape(col)));
    }
    html.push_str("</tr>\n");

    for (i, row) in table.rows.iter().enumerate() {
        html.push_str(&format!("  <tr><td class='num'>{}</td>", thousands(i as i64 + 1)));
        for val in row {
            let class = match val {
                Value::Integer(_) | Value::Real(_) => " class='num'",
                _ => "",
            };
            html.push_str(&format!("<td{}>{}</td>", class, cell_text(val)));
        }
        html.push_str("</tr>\n");
    }
    html.push_str("</table>\n");
    html.push_str(&format!("<p class='generated'>Generated {}</p>\n", generated));
    html.push_str("</body>\n</html>\n");
    html
}

/// Numbers rounded with `.` thousands separators, NULL empty, text escaped.
pub fn cell_text(val: &Value) -> String {
    match val {
        Value::Null => String::new(),
        Value::Integer(i) => thousands(*i),
        Value::Real(r) => thousands(r.round() as i64),
        Value::Text(s) => escape(s),
        Value::Blob(b) => format!("[{} bytes]", b.len()),
    }
}

/// 1234567 → "1.234.567".
pub fn thousands(n: i64) -> String {
    let digits = n.unsigned_abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    if n < 0 {
        out.push('-');
    }
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push('.');
        }
        out.push(ch);
    }
    out
}

fn escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
