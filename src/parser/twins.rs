use tracing::warn;

use super::wikitext::{scan_templates, Template};

/// Matched case-insensitively anywhere in the template name.
const TWIN_KEYWORD: &str = "gemellaggio";

const CITY_PARAMS: &[&str] = &["città", "citta", "city"];
const COUNTRY_PARAMS: &[&str] = &["paese", "stato", "nazione", "country"];

/// A twin city named by the page, before resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct TwinRef {
    pub name: String,
    /// Country as written in the template; may be a code, may be empty.
    pub country: String,
}

/// The parameter layouts a twinning template is known to use.
#[derive(Debug, Clone, PartialEq)]
pub enum TwinShape {
    /// `{{Gemellaggio|<country>|<comune>}}`, country also accepted by name.
    PositionalPair {
        comune: String,
        country: Option<String>,
    },
    /// `{{Gemellaggio|città=<name>}}`.
    NamedCity {
        city: String,
        country: Option<String>,
    },
    Unrecognized,
}

impl TwinShape {
    pub fn classify(t: &Template) -> Self {
        let named_country = t.named(COUNTRY_PARAMS).map(str::to_string);
        if let Some(comune) = t.positional(2) {
            return TwinShape::PositionalPair {
                comune: comune.to_string(),
                country: t.positional(1).map(str::to_string).or(named_country),
            };
        }
        if let Some(city) = t.named(CITY_PARAMS) {
            return TwinShape::NamedCity {
                city: city.to_string(),
                country: named_country.or_else(|| t.positional(1).map(str::to_string)),
            };
        }
        TwinShape::Unrecognized
    }

    pub fn into_ref(self) -> Option<TwinRef> {
        match self {
            TwinShape::PositionalPair { comune, country } => Some(TwinRef {
                name: comune,
                country: country.unwrap_or_default(),
            }),
            TwinShape::NamedCity { city, country } => Some(TwinRef {
                name: city,
                country: country.unwrap_or_default(),
            }),
            TwinShape::Unrecognized => None,
        }
    }
}

pub fn is_twin_template(t: &Template) -> bool {
    t.name.to_lowercase().contains(TWIN_KEYWORD)
}

/// Twin cities declared in the page's twinning templates, in page order.
/// Templates of unknown shape are logged and skipped.
pub fn extract(wikitext: &str) -> Vec<TwinRef> {
    scan_templates(wikitext)
        .iter()
        .filter(|t| is_twin_template(t))
        .filter_map(|t| {
            let twin = TwinShape::classify(t).into_ref();
            if twin.is_none() {
                warn!("Incomplete twinning template skipped: {}", t.raw);
            }
            twin
        })
        .collect()
}
