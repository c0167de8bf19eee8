use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::settings::ApiSettings;

const LABEL_LANGUAGE: &str = "it";
const PROP_COUNTRY: &str = "P17";
const PROP_REGION: &str = "P131";

#[derive(Error, Debug)]
pub enum WikiError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unexpected response from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },
}

pub type Result<T> = std::result::Result<T, WikiError>;

/// One `list=search` hit.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchHit {
    pub title: String,
    #[serde(default)]
    pub snippet: String,
}

// ── MediaWiki response shapes (formatversion=2) ──

#[derive(Debug, Default, Deserialize)]
struct ApiResponse {
    #[serde(default, rename = "continue")]
    cont: Option<serde_json::Map<String, Value>>,
    #[serde(default)]
    query: Query,
}

#[derive(Debug, Default, Deserialize)]
struct Query {
    #[serde(default)]
    pages: Vec<Page>,
    #[serde(default)]
    search: Vec<SearchHit>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Page {
    links: Vec<Link>,
    coordinates: Vec<Coordinate>,
    pageprops: Option<PageProps>,
    revisions: Vec<Revision>,
}

#[derive(Debug, Deserialize)]
struct Link {
    title: String,
}

#[derive(Debug, Deserialize)]
struct Coordinate {
    lat: f64,
    lon: f64,
}

#[derive(Debug, Default, Deserialize)]
struct PageProps {
    wikibase_item: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Revision {
    slots: Slots,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Slots {
    main: Slot,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Slot {
    content: String,
}

/// Client over the encyclopedia query API and the entity API.
/// Callers await one request at a time; any non-2xx status is an error.
pub struct WikiClient {
    http: reqwest::Client,
    api_url: String,
    entity_url: String,
}

impl WikiClient {
    pub fn new(api: &ApiSettings) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(api.user_agent.clone())
            .timeout(Duration::from_secs(api.timeout_secs))
            .build()?;
        Ok(Self {
            http,
            api_url: api.wiki_api.clone(),
            entity_url: api.wikidata_entity.clone(),
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str, params: &[(String, String)]) -> Result<T> {
        let response = self
            .http
            .get(url)
            .query(params)
            .send()
            .await?
            .error_for_status()?;
        let final_url = response.url().to_string();
        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|source| WikiError::Decode {
            url: final_url,
            source,
        })
    }

    async fn query(&self, params: &[(&str, &str)]) -> Result<ApiResponse> {
        let params = with_defaults(params);
        self.get_json(&self.api_url, &params).await
    }

    async fn single_page(&self, params: &[(&str, &str)]) -> Result<Page> {
        let mut response = self.query(params).await?;
        Ok(if response.query.pages.is_empty() {
            Page::default()
        } else {
            response.query.pages.swap_remove(0)
        })
    }

    /// Titles linked from `Comuni_d'Italia_(<L>)` starting with `letter`,
    /// following continuation tokens until exhausted.
    pub async fn letter_titles(&self, letter: char) -> Result<Vec<String>> {
        let index = format!("Comuni_d'Italia_({})", letter.to_uppercase());
        let mut params = with_defaults(&[
            ("titles", index.as_str()),
            ("prop", "links"),
            ("pllimit", "max"),
        ]);
        let mut titles = Vec::new();

        loop {
            let response: ApiResponse = self.get_json(&self.api_url, &params).await?;
            for page in response.query.pages {
                titles.extend(
                    page.links
                        .into_iter()
                        .map(|l| l.title)
                        .filter(|t| t.starts_with(letter)),
                );
            }
            match response.cont {
                Some(cont) => {
                    debug!("{}: continuing after {} titles", index, titles.len());
                    merge_params(&mut params, &cont);
                }
                None => break,
            }
        }
        Ok(titles)
    }

    pub async fn search(&self, term: &str, limit: usize) -> Result<Vec<SearchHit>> {
        let limit = limit.to_string();
        let response = self
            .query(&[("list", "search"), ("srsearch", term), ("srlimit", &limit)])
            .await?;
        Ok(response.query.search)
    }

    /// First geo-point of the page, if any.
    pub async fn coordinates(&self, title: &str) -> Result<Option<(f64, f64)>> {
        let page = self
            .single_page(&[("titles", title), ("prop", "coordinates")])
            .await?;
        Ok(page.coordinates.first().map(|c| (c.lat, c.lon)))
    }

    /// Linked structured-data entity id (e.g. `Q1234`).
    pub async fn wikibase_item(&self, title: &str) -> Result<Option<String>> {
        let page = self
            .single_page(&[("titles", title), ("prop", "pageprops")])
            .await?;
        Ok(page.pageprops.and_then(|p| p.wikibase_item))
    }

    /// Current wikitext of the page; `None` for missing pages.
    pub async fn wikitext(&self, title: &str) -> Result<Option<String>> {
        let page = self
            .single_page(&[
                ("titles", title),
                ("prop", "revisions"),
                ("rvprop", "content"),
                ("rvslots", "main"),
            ])
            .await?;
        Ok(page.revisions.into_iter().next().map(|r| r.slots.main.content))
    }

    async fn entity(&self, qid: &str) -> Result<Value> {
        let url = self.entity_url.replace("{}", qid);
        let data: Value = self.get_json(&url, &[]).await?;
        Ok(entity_of(data, qid))
    }

    /// (country, region) labels of the entity. The entity itself must be
    /// fetchable; anything going wrong past that yields an empty label.
    pub async fn claim_labels(&self, qid: &str) -> Result<(String, String)> {
        let entity = self.entity(qid).await?;
        let country = self.claim_label(&entity, PROP_COUNTRY).await;
        let region = self.claim_label(&entity, PROP_REGION).await;
        Ok((country, region))
    }

    async fn claim_label(&self, entity: &Value, prop: &str) -> String {
        let Some(target) = claim_target(entity, prop) else {
            return String::new();
        };
        match self.entity(target).await {
            Ok(value) => label(&value, LABEL_LANGUAGE).unwrap_or_default(),
            Err(e) => {
                debug!("Label lookup for {} ({}) failed: {}", target, prop, e);
                String::new()
            }
        }
    }
}

fn with_defaults(params: &[(&str, &str)]) -> Vec<(String, String)> {
    let mut out: Vec<(String, String)> = vec![
        ("action".into(), "query".into()),
        ("format".into(), "json".into()),
        ("formatversion".into(), "2".into()),
    ];
    out.extend(params.iter().map(|(k, v)| (k.to_string(), v.to_string())));
    out
}

/// Overwrite or append every continuation key.
fn merge_params(params: &mut Vec<(String, String)>, cont: &serde_json::Map<String, Value>) {
    for (key, value) in cont {
        let value = match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        match params.iter_mut().find(|(k, _)| k == key) {
            Some(slot) => slot.1 = value,
            None => params.push((key.clone(), value)),
        }
    }
}

/// The entity object inside an EntityData payload. Redirected ids come back
/// under their new key, so fall back to the only entity present.
fn entity_of(mut data: Value, qid: &str) -> Value {
    let Some(entities) = data.get_mut("entities").and_then(Value::as_object_mut) else {
        return Value::Null;
    };
    if let Some(e) = entities.remove(qid) {
        return e;
    }
    match entities.len() {
        1 => entities.values().next().cloned().unwrap_or(Value::Null),
        _ => Value::Null,
    }
}

fn claim_target<'a>(entity: &'a Value, prop: &str) -> Option<&'a str> {
    entity
        .get("claims")?
        .get(prop)?
        .get(0)?
        .pointer("/mainsnak/datavalue/value/id")?
        .as_str()
}

fn label(entity: &Value, lang: &str) -> Option<String> {
    entity
        .get("labels")?
        .get(lang)?
        .get("value")?
        .as_str()
        .map(str::to_string)
}
