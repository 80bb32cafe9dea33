//! DEKALB (Bayer) Ukraine product catalog
//!
//! Crawl shape: start page → crop listing pages
//! (`/Products/Dekalb/<Crop>`) → product pages
//! (`/Products/Dekalb/<Crop>/<Product>`). Each product page is reduced to
//! text and scanned for labelled fields. A field that is not on the page
//! is not emitted.

use super::text::{clean, first_heading, html_to_text, links};
use super::{AdapterOutput, Candidate, SourceAdapter};
use crate::error::AdapterError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt, TryStreamExt};
use once_cell::sync::Lazy;
use parostok_provenance::{Attribute, AttributeValue, HybridDraft, Market, Source, SourceId};
use regex::Regex;
use reqwest::header::{ACCEPT_LANGUAGE, USER_AGENT};
use reqwest::Client;
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;
use tracing::instrument;
use url::Url;

/// Registry id served by [`DekalbUaAdapter`]
pub const DEKALB_UA_SOURCE: &str = "bayer_ua_dekalb";
/// Selector recorded on every attribute this adapter extracts
pub const SELECTOR_PAGE_TEXT: &str = "regex_on_page_text";

const START_URL: &str = "https://www.cropscience.bayer.ua/Products/Dekalb";
const BRAND: &str = "DEKALB (Bayer)";
const CATALOG_MARKER: &str = "/Products/Dekalb/";
const BOT_AGENT: &str = "Mozilla/5.0 (compatible; ParostokBot/1.0)";
/// Product pages fetched in parallel
const PRODUCT_FETCH_CONCURRENCY: usize = 4;

const HEADING_ADVANTAGES: &str = "ОСНОВНІ ПЕРЕВАГИ";
const HEADING_POSITIONING: &str = "ПОЗИЦІОНУВАННЯ ГІБРИДА";
const HEADING_DENSITY: &str = "ГУСТОТА НА ЧАС ЗБИРАННЯ";
const HEADING_CHARACTERISTICS: &str = "ХАРАКТЕРИСТИКА ГІБРИДА";

static FAO: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?im)ФАО:\s*([0-9]{2,4})").expect("static regex"));
static GRAIN_TYPE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?im)Тип зерна:[ \t]*([^\n]+)").expect("static regex"));
static MATURITY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?im)Група стиглості:[ \t]*([^\n]+)").expect("static regex"));
static RATING_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(.*?)(\d{1,2})$").expect("static regex"));
static RATING_MARKS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[●○•.\-]+").expect("static regex"));
static SECTION_HEADING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-ZА-ЯІЇЄҐ0-9 \-]{5,}$").expect("static regex")
});

/// Scraper for `www.cropscience.bayer.ua`
#[derive(Debug, Clone)]
pub struct DekalbUaAdapter {
    client: Client,
    start_url: Url,
    market: Market,
}

impl DekalbUaAdapter {
    /// Create adapter with a per-request timeout
    ///
    /// # Errors
    /// `Network` if the HTTP client cannot be built
    pub fn new(request_timeout: Duration) -> Result<Self, AdapterError> {
        let client = Client::builder().timeout(request_timeout).build()?;
        Ok(Self {
            client,
            start_url: Url::parse(START_URL)?,
            market: Market::new("UA"),
        })
    }

    /// Point the crawl at another start page (mirrors, tests)
    ///
    /// # Errors
    /// `Parse` if `url` is not absolute
    pub fn with_start_url(mut self, url: &str) -> Result<Self, AdapterError> {
        self.start_url = Url::parse(url)?;
        Ok(self)
    }

    async fn get(&self, url: &Url) -> Result<String, AdapterError> {
        get_page(&self.client, url).await
    }
}

async fn get_page(client: &Client, url: &Url) -> Result<String, AdapterError> {
    tracing::debug!("GET {}", url);
    let body = client
        .get(url.clone())
        .header(USER_AGENT, BOT_AGENT)
        .header(ACCEPT_LANGUAGE, "uk-UA,uk;q=0.9,en;q=0.8")
        .send()
        .await?
        .error_for_status()?
        .text()
        .await?;
    Ok(body)
}

#[async_trait]
impl SourceAdapter for DekalbUaAdapter {
    fn source_id(&self) -> SourceId {
        SourceId::new(DEKALB_UA_SOURCE)
    }

    #[instrument(skip(self, source), fields(source = %source.id))]
    async fn fetch(&self, source: &Source) -> Result<AdapterOutput, AdapterError> {
        let start = self.get(&self.start_url).await?;
        let catalog_pages = discover_catalog_pages(&start, &self.start_url);
        if catalog_pages.is_empty() {
            return Err(AdapterError::Parse(format!(
                "no catalog pages linked from {}",
                self.start_url
            )));
        }

        let mut product_pages = BTreeSet::new();
        for page in &catalog_pages {
            let html = self.get(page).await?;
            product_pages.extend(discover_product_pages(&html, page));
        }
        tracing::info!(
            catalog_pages = catalog_pages.len(),
            product_pages = product_pages.len(),
            "discovered DEKALB pages"
        );

        let market = if source.market.is_blank() {
            self.market.clone()
        } else {
            source.market.clone()
        };
        let client = self.client.clone();
        let pages: Vec<(Url, String)> = stream::iter(product_pages.iter().cloned())
            .map(move |page| {
                let client = client.clone();
                async move {
                    let html = get_page(&client, &page).await?;
                    Ok::<_, AdapterError>((page, html))
                }
            })
            .buffered(PRODUCT_FETCH_CONCURRENCY)
            .try_collect()
            .await?;

        let mut candidates = Vec::with_capacity(pages.len());
        for (page, html) in pages {
            match parse_product(&html, &page, &market, Utc::now()) {
                Some(candidate) => candidates.push(candidate),
                None => tracing::debug!("no product name on {}", page),
            }
        }

        Ok(AdapterOutput {
            catalog_pages: catalog_pages.len(),
            discovered: product_pages.len(),
            candidates,
        })
    }
}

/// Crop listing pages linked from the start page
#[must_use]
pub fn discover_catalog_pages(html: &str, start: &Url) -> Vec<Url> {
    let root = start.path().trim_end_matches('/');
    let found: BTreeSet<Url> = links(html, start)
        .into_iter()
        .filter(|u| u.host_str() == start.host_str())
        .filter(|u| u.path().contains(CATALOG_MARKER))
        .filter(|u| u.path().trim_end_matches('/') != root)
        .filter(|u| u.path().matches('/').count() == 3)
        .map(strip_query)
        .collect();
    found.into_iter().collect()
}

/// Product pages linked from a crop listing page
#[must_use]
pub fn discover_product_pages(html: &str, catalog: &Url) -> Vec<Url> {
    let prefix = format!("{}/", catalog.path().trim_end_matches('/'));
    let found: BTreeSet<Url> = links(html, catalog)
        .into_iter()
        .map(strip_query)
        .filter(|u| u.host_str() == catalog.host_str())
        .filter(|u| u.path().starts_with(&prefix))
        .filter(|u| u.path().trim_end_matches('/') != prefix.trim_end_matches('/'))
        .filter(|u| u.path().matches('/').count() >= 4)
        .collect();
    found.into_iter().collect()
}

/// Extract one product from its page
///
/// Returns `None` when the page has no `<h1>` name or the crop cannot be
/// read from the URL.
#[must_use]
pub fn parse_product(
    html: &str,
    product_url: &Url,
    market: &Market,
    extracted_at: DateTime<Utc>,
) -> Option<Candidate> {
    let name = first_heading(html)?;
    let crop = crop_from_url(product_url)?;
    let url = product_url.as_str();
    let text = html_to_text(html);
    let lines: Vec<&str> = text.lines().collect();

    let mut attributes = Vec::new();
    let mut add = |key: String, value: AttributeValue, evidence: String| {
        let blank = matches!(&value, AttributeValue::Text(t) if t.trim().is_empty());
        if !blank {
            attributes.push(
                Attribute::observed(key, value, url, evidence, extracted_at)
                    .with_selector(SELECTOR_PAGE_TEXT),
            );
        }
    };

    if let Some(fao) = first_capture(&FAO, &text) {
        add("fao".into(), fao.clone().into(), format!("ФАО: {fao}"));
    }
    if let Some(grain) = first_capture(&GRAIN_TYPE, &text) {
        add("grain_type".into(), grain.clone().into(), format!("Тип зерна: {grain}"));
    }
    if let Some(group) = first_capture(&MATURITY, &text) {
        add(
            "maturity_group".into(),
            group.clone().into(),
            format!("Група стиглості: {group}"),
        );
    }
    if let Some(block) = section(&lines, HEADING_ADVANTAGES) {
        let advantages = clean(&block.join(" "));
        add("advantages_text".into(), advantages.clone().into(), advantages);
    }
    if let Some(block) = section(&lines, HEADING_POSITIONING) {
        for (k, v) in key_values(&block) {
            add(format!("positioning.{k}"), v.clone().into(), format!("{k}: {v}"));
        }
    }
    if let Some(block) = section(&lines, HEADING_DENSITY) {
        for (k, v) in key_values(&block) {
            add(format!("density.{k}"), v.clone().into(), format!("{k}: {v}"));
        }
    }
    if let Some(block) = section(&lines, HEADING_CHARACTERISTICS) {
        for (label, score) in ratings(&block) {
            add(format!("rating.{label}"), score.into(), format!("{label} {score}"));
        }
    }

    let draft = HybridDraft::new(name, market.clone(), crop, url).with_brand(BRAND);
    Some(Candidate::new(draft, attributes))
}

fn strip_query(mut url: Url) -> Url {
    url.set_query(None);
    url.set_fragment(None);
    url
}

fn crop_from_url(url: &Url) -> Option<String> {
    let rest = url.path().split_once(CATALOG_MARKER)?.1;
    let crop = rest.split('/').next()?.trim();
    (!crop.is_empty()).then(|| crop.to_lowercase())
}

fn first_capture(re: &Regex, text: &str) -> Option<String> {
    let value = re.captures(text)?.get(1)?.as_str().trim().to_string();
    (!value.is_empty()).then_some(value)
}

/// Lines following `heading` up to the next all-caps section heading
fn section<'a>(lines: &[&'a str], heading: &str) -> Option<Vec<&'a str>> {
    let start = lines.iter().position(|l| l.starts_with(heading))?;
    let mut block = Vec::new();
    let tail = lines[start][heading.len()..].trim();
    if !tail.is_empty() {
        block.push(tail);
    }
    block.extend(
        lines[start + 1..]
            .iter()
            .take_while(|l| !SECTION_HEADING.is_match(l))
            .copied(),
    );
    (!block.is_empty()).then_some(block)
}

/// `Label: value` pairs, first occurrence of a label wins
fn key_values(block: &[&str]) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    for line in block {
        let Some((k, v)) = line.split_once(':') else {
            continue;
        };
        let (k, v) = (clean(k), clean(v));
        if !k.is_empty() && !v.is_empty() {
            out.entry(k).or_insert(v);
        }
    }
    out
}

/// `Label ● ● ● 7` lines
fn ratings(block: &[&str]) -> BTreeMap<String, i64> {
    let mut out = BTreeMap::new();
    for line in block {
        let line = clean(line);
        let Some(caps) = RATING_LINE.captures(&line) else {
            continue;
        };
        let label = clean(&RATING_MARKS.replace_all(&caps[1], " "));
        if label.is_empty() {
            continue;
        }
        if let Ok(score) = caps[2].parse::<i64>() {
            out.insert(label, score);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const PRODUCT_URL: &str = "https://www.cropscience.bayer.ua/Products/Dekalb/Corn/DKS3747";

    const PRODUCT_PAGE: &str = "<html><body>
      <h1>ДКС 3747</h1>
      <div>ФАО: 260</div>
      <div>Тип зерна: зубовидний</div>
      <div>Група стиглості: середньорання</div>
      <div>ОСНОВНІ ПЕРЕВАГИ\nСтабільний врожай</div>
      <div>ПОЗИЦІОНУВАННЯ ГІБРИДА\nЗона вирощування: усі зони\nРівень мінерального живлення: середній, високий</div>
      <div>ГУСТОТА НА ЧАС ЗБИРАННЯ\nПосушливі умови: 50 000–55 000 шт./га</div>
      <div>ХАРАКТЕРИСТИКА ГІБРИДА\nХолодостійкість ● ● ● ● ● ● ● ● ● 9</div>
    </body></html>";

    fn parsed() -> Candidate {
        let url = Url::parse(PRODUCT_URL).unwrap();
        parse_product(PRODUCT_PAGE, &url, &Market::new("UA"), Utc::now()).unwrap()
    }

    #[test]
    fn product_page_fields() {
        let candidate = parsed();
        let values: HashMap<_, _> = candidate
            .attributes
            .iter()
            .map(|a| (a.key.as_str(), a.value.clone().unwrap()))
            .collect();

        assert_eq!(candidate.draft.name, "ДКС 3747");
        assert_eq!(candidate.draft.crop, "corn");
        assert_eq!(candidate.draft.brand.as_deref(), Some(BRAND));
        assert_eq!(values["fao"], AttributeValue::from("260"));
        assert_eq!(values["grain_type"], AttributeValue::from("зубовидний"));
        assert_eq!(values["maturity_group"], AttributeValue::from("середньорання"));
        assert_eq!(values["advantages_text"], AttributeValue::from("Стабільний врожай"));
        assert_eq!(values["positioning.Зона вирощування"], AttributeValue::from("усі зони"));
        assert_eq!(
            values["positioning.Рівень мінерального живлення"],
            AttributeValue::from("середній, високий")
        );
        assert_eq!(
            values["density.Посушливі умови"],
            AttributeValue::from("50 000–55 000 шт./га")
        );
        assert_eq!(values["rating.Холодостійкість"], AttributeValue::Integer(9));
    }

    #[test]
    fn every_attribute_carries_provenance() {
        for attr in parsed().attributes {
            assert_eq!(attr.selector.as_deref(), Some(SELECTOR_PAGE_TEXT));
            assert_eq!(attr.source_url.as_deref(), Some(PRODUCT_URL));
            assert!(attr.evidence.as_deref().is_some_and(|e| !e.is_empty()));
            assert!(attr.clone().verified().is_ok(), "{attr:?}");
        }
    }

    #[test]
    fn absent_fields_are_not_emitted() {
        let url = Url::parse(PRODUCT_URL).unwrap();
        let html = "<h1>ДКС 4014</h1><p>Опис відсутній</p>";
        let candidate = parse_product(html, &url, &Market::new("UA"), Utc::now()).unwrap();
        assert!(candidate.attributes.is_empty());

        assert!(parse_product("<p>no name</p>", &url, &Market::new("UA"), Utc::now()).is_none());
    }

    #[test]
    fn page_discovery_follows_path_depth() {
        let start = Url::parse(START_URL).unwrap();
        let html = r#"
            <a href="/Products/Dekalb">self</a>
            <a href="/Products/Dekalb/Corn?utm=1">Corn</a>
            <a href="https://www.cropscience.bayer.ua/Products/Dekalb/Sunflower">Sun</a>
            <a href="/Products/Dekalb/Corn/DKS3747">too deep</a>
            <a href="https://example.com/Products/Dekalb/Rapeseed">foreign</a>"#;
        let pages: Vec<String> = discover_catalog_pages(html, &start)
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(
            pages,
            [
                "https://www.cropscience.bayer.ua/Products/Dekalb/Corn",
                "https://www.cropscience.bayer.ua/Products/Dekalb/Sunflower",
            ]
        );

        let corn = Url::parse("https://www.cropscience.bayer.ua/Products/Dekalb/Corn").unwrap();
        let html = r#"
            <a href="/Products/Dekalb/Corn/DKS3747#top">A</a>
            <a href="/Products/Dekalb/Corn/DKC3730">B</a>
            <a href="/Products/Dekalb/Corn/">listing</a>
            <a href="/Products/Dekalb/Sunflower/DKF3333">other crop</a>"#;
        let products: Vec<String> = discover_product_pages(html, &corn)
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(
            products,
            [
                "https://www.cropscience.bayer.ua/Products/Dekalb/Corn/DKC3730",
                "https://www.cropscience.bayer.ua/Products/Dekalb/Corn/DKS3747",
            ]
        );
    }
}
