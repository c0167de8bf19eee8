use crate::wiki::SearchHit;

/// Suffix carried by disambiguation page titles.
pub const DISAMBIGUATION_MARKER: &str = "(disambigua)";

pub fn is_disambiguation(title: &str) -> bool {
    title.to_ascii_lowercase().contains(DISAMBIGUATION_MARKER)
}

/// `"Castro (disambigua)"` → `"Castro"`.
pub fn strip_disambiguation(title: &str) -> String {
    // ASCII lowercasing keeps byte offsets aligned with `title`
    match title.to_ascii_lowercase().find(DISAMBIGUATION_MARKER) {
        Some(pos) => title[..pos].trim_end().to_string(),
        None => title.trim().to_string(),
    }
}

/// `"Castro"`, `"Italia"` → `"Castro (Italia)"`.
pub fn qualify(base: &str, country: &str) -> String {
    if country.is_empty() {
        base.to_string()
    } else {
        format!("{} ({})", base, country)
    }
}

/// Best search hit for `title`:
/// 1. exact case-insensitive title match,
/// 2. prefix match whose snippet mentions `country` and is not a
///    disambiguation page,
/// 3. the first hit.
pub fn best_match<'a>(title: &str, hits: &'a [SearchHit], country: &str) -> Option<&'a str> {
    let wanted = title.to_lowercase();
    let country = country.to_lowercase();

    hits.iter()
        .find(|h| h.title.to_lowercase() == wanted)
        .or_else(|| {
            hits.iter().find(|h| {
                h.title.to_lowercase().starts_with(&wanted)
                    && h.snippet.to_lowercase().contains(&country)
                    && !is_disambiguation(&h.title)
            })
        })
        .or_else(|| hits.first())
        .map(|h| h.title.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(title: &str, snippet: &str) -> SearchHit {
        SearchHit {
            title: title.into(),
            snippet: snippet.into(),
        }
    }

    #[test]
    fn exact_match_wins_case_insensitively() {
        let hits = vec![
            hit("Val Pellice", "valle del Piemonte, Italia"),
            hit("torre pellice", "comune italiano"),
            hit("Torre Pellice", "comune italiano"),
        ];
        assert_eq!(
            best_match("Torre Pellice", &hits, "Italia"),
            Some("torre pellice")
        );
    }

    #[test]
    fn prefix_match_needs_country_and_no_disambiguation() {
        let hits = vec![
            hit("Stazione di Castro", "stazione ferroviaria"),
            hit("Castro (disambigua)", "Castro, Italia"),
            hit("Castro (Lecce)", "comune italiano della provincia di Lecce, in <span>Italia</span>"),
        ];
        assert_eq!(best_match("Castro", &hits, "Italia"), Some("Castro (Lecce)"));
    }

    #[test]
    fn falls_back_to_first_hit_then_none() {
        let hits = vec![hit("Castro (disambigua)", "..."), hit("Fidel Castro", "Cuba")];
        assert_eq!(best_match("Castro", &hits, "Italia"), Some("Castro (disambigua)"));
        assert_eq!(best_match("Castro", &[], "Italia"), None);
    }

    #[test]
    fn empty_country_matches_any_snippet() {
        let hits = vec![hit("Nizza Monferrato", "comune"), hit("Nizza (Francia)", "")];
        // "Nizza" is a prefix of both; the first non-disambiguation hit wins
        assert_eq!(best_match("Nizza", &hits, ""), Some("Nizza Monferrato"));
    }

    #[test]
    fn disambiguation_helpers() {
        assert!(is_disambiguation("Castro (disambigua)"));
        assert!(!is_disambiguation("Castro (Lecce)"));
        assert_eq!(strip_disambiguation("Castro (disambigua)"), "Castro");
        assert_eq!(strip_disambiguation("Castro"), "Castro");
        assert_eq!(qualify("Castro", "Italia"), "Castro (Italia)");
        assert_eq!(qualify("Castro", ""), "Castro");
    }

    #[test]
    fn strip_keeps_non_ascii_base_intact() {
        let base = strip_disambiguation("İstanbul (disambigua)");
        assert_eq!(base, "İstanbul");
        assert_eq!(qualify(&base, "Turchia"), "İstanbul (Turchia)");
        assert_eq!(strip_disambiguation("Forlì (Disambigua)"), "Forlì");
    }
}
