//! Rendered-DOM fallback extraction
//!
//! When interception yields nothing for an item, the same list-view subset
//! is derived from the rendered card markup: currency-marked price tokens,
//! the discount badge, decimal rating with review count, brand/delivery
//! elements, and first-party seller markers. Detail pages get an analogous
//! text-pattern pass. Fallback output never outranks intercepted data; the
//! merge rules downstream guarantee that.

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use tracing::warn;

use crate::domain::product::{PartialProduct, SourceFidelity};

use super::characteristics::{self, CharacteristicEntry};
use super::config::CardSelectors;
use super::error::{ParseError, ParseResult};
use super::field_resolver::SchemaFieldResolver;
use super::units::parse_locale_number;

static PRICE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([\d\s\u{a0}]+(?:[.,]\d+)?)\s*₽").unwrap());

static DISCOUNT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[−-](\d+)\s*%").unwrap());

static RATING_REVIEWS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d+[.,]\d+)\s*[•·]?\s*([\d\s\u{a0},]+)\s*(?:отзыв|оценк)").unwrap()
});

static SIMPLE_RATING_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d+[.,]\d)\s*(?:★|⭐)").unwrap());

static STOCK_LEFT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)остал[ао]сь\s+(\d+)\s*(?:шт|товар)").unwrap());

static OUT_OF_STOCK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)нет в наличии|закончился|распродан").unwrap());

static OTHER_SELLERS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)друг(?:их|ие)\s+продавц.{0,200}?от\s+([\d\s\u{a0}]+(?:[.,]\d+)?)\s*₽\s*(\d+)?")
        .unwrap()
});

static INTERSTITIAL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)доступ ограничен|подтвердите,? что вы не робот|challenge-form|captcha")
        .unwrap()
});

/// Card extraction result: parsed cards plus the count of product links
/// whose SKU could not be derived
#[derive(Debug, Default)]
pub struct CardExtraction {
    pub cards: Vec<PartialProduct>,
    pub discarded: usize,
}

/// Extracts the canonical list-view subset from rendered page markup
pub struct DomFallbackParser {
    link_selectors: Vec<Selector>,
    title_selectors: Vec<Selector>,
    image_selectors: Vec<Selector>,
    brand_selectors: Vec<Selector>,
    delivery_selectors: Vec<Selector>,
    card_markers: Vec<String>,
}

impl DomFallbackParser {
    pub fn new() -> ParseResult<Self> {
        Self::with_config(&CardSelectors::default())
    }

    pub fn with_config(config: &CardSelectors) -> ParseResult<Self> {
        Ok(Self {
            link_selectors: compile_selectors(&config.product_link)?,
            title_selectors: compile_selectors(&config.title)?,
            image_selectors: compile_selectors(&config.image)?,
            brand_selectors: compile_selectors(&config.brand)?,
            delivery_selectors: compile_selectors(&config.delivery)?,
            card_markers: config.card_container_markers.clone(),
        })
    }

    /// Detect an anti-bot challenge page before trying to extract anything.
    pub fn detect_interstitial(html: &str) -> bool {
        INTERSTITIAL_RE.is_match(html)
    }

    /// Extract one partial per distinct product link currently in the
    /// rendered listing. Links without a derivable SKU are counted as
    /// discarded.
    pub fn parse_cards(&self, html: &str, base_url: &str) -> ParseResult<CardExtraction> {
        if Self::detect_interstitial(html) {
            return Err(ParseError::InterstitialDetected);
        }
        let document = Html::parse_document(html);
        let mut seen_hrefs = HashSet::new();
        let mut extraction = CardExtraction::default();

        for selector in &self.link_selectors {
            for link in document.select(selector) {
                let Some(href) = link.value().attr("href") else {
                    continue;
                };
                if !href.contains("/product/") || !seen_hrefs.insert(href.to_string()) {
                    continue;
                }
                let Some(sku) = SchemaFieldResolver::sku_from_url(href) else {
                    extraction.discarded += 1;
                    continue;
                };
                let card = self.card_container(link);
                extraction
                    .cards
                    .push(self.parse_card(sku, href, link, card, base_url));
            }
        }
        Ok(extraction)
    }

    fn parse_card(
        &self,
        sku: String,
        href: &str,
        link: ElementRef<'_>,
        card: Option<ElementRef<'_>>,
        base_url: &str,
    ) -> PartialProduct {
        let mut partial = PartialProduct::new(SourceFidelity::DomFallback);
        partial.sku = sku;
        partial.product_url = if href.starts_with("http") {
            href.to_string()
        } else {
            format!("{}{}", base_url.trim_end_matches('/'), href)
        };

        let Some(card) = card else {
            partial.title = element_text(link);
            return partial;
        };

        partial.title = self
            .select_text(card, &self.title_selectors)
            .unwrap_or_else(|| element_text(link));
        partial.image_url = self
            .select_attr(card, &self.image_selectors, "src")
            .unwrap_or_default();
        partial.brand = self.select_text(card, &self.brand_selectors).unwrap_or_default();
        partial.delivery_info = self
            .select_text(card, &self.delivery_selectors)
            .unwrap_or_default();

        let text = card_text(card);
        let mut prices = PRICE_RE
            .captures_iter(&text)
            .filter_map(|caps| parse_locale_number(&caps[1]));
        partial.price = prices.next().unwrap_or(0.0);
        partial.original_price = prices.next().unwrap_or(0.0);
        if let Some(caps) = DISCOUNT_RE.captures(&text) {
            partial.discount_percent = caps[1].parse().unwrap_or(0);
        }

        if let Some(caps) = RATING_REVIEWS_RE.captures(&text) {
            partial.rating = parse_locale_number(&caps[1]).unwrap_or(0.0);
            partial.review_count = parse_locale_number(&caps[2]).map_or(0, |n| n as u32);
        } else if let Some(caps) = SIMPLE_RATING_RE.captures(&text) {
            partial.rating = parse_locale_number(&caps[1]).unwrap_or(0.0);
        }

        // First-party storefront marker doubles as the seller type
        let card_html = card.html();
        if text.contains("Ozon") && (text.contains("Express") || card_html.contains("ozon-badge")) {
            partial.seller_type = "Ozon".to_string();
        }

        partial
    }

    /// Detail-page fallback: seller, breadcrumb trail, characteristics
    /// rows, competing offers, and the stock counter from visible text.
    pub fn parse_detail(&self, html: &str, product_url: &str) -> ParseResult<PartialProduct> {
        if Self::detect_interstitial(html) {
            return Err(ParseError::InterstitialDetected);
        }
        let document = Html::parse_document(html);
        let mut partial = PartialProduct::new(SourceFidelity::DomFallback);
        partial.product_url = product_url.to_string();
        partial.sku = SchemaFieldResolver::sku_from_url(product_url).unwrap_or_default();
        if partial.sku.is_empty() {
            return Err(ParseError::identity_missing(Some(product_url)));
        }

        if let Some(seller) = select_first_text(
            &document,
            &["[data-widget='webCurrentSeller'] a", "[class*='seller'] a"],
        ) {
            partial.seller_name = seller;
        }

        let crumbs = select_all_text(
            &document,
            &["ol[class*='breadcrumb'] a", "nav a[href*='/category/']"],
        );
        if !crumbs.is_empty() {
            partial.category = crumbs.join(" > ");
        }

        let entries = self.characteristic_rows(&document);
        characteristics::apply_entries(&mut partial, &entries);

        let body_text = document.root_element().text().collect::<Vec<_>>().join(" ");
        if let Some(caps) = OTHER_SELLERS_RE.captures(&body_text) {
            partial.follower_min_price = parse_locale_number(&caps[1]).unwrap_or(0.0);
            if let Some(count) = caps.get(2) {
                partial.follower_count = count.as_str().parse().unwrap_or(0);
            }
        }
        if let Some(caps) = STOCK_LEFT_RE.captures(&body_text) {
            partial.stock_quantity = caps[1].parse().ok();
        } else if OUT_OF_STOCK_RE.is_match(&body_text) {
            partial.stock_quantity = Some(0);
        }

        Ok(partial)
    }

    fn characteristic_rows(&self, document: &Html) -> Vec<CharacteristicEntry> {
        let mut entries = Vec::new();
        for selector_str in [
            "[data-widget='webCharacteristics'] dl",
            "[class*='characteristics'] tr",
        ] {
            let Ok(selector) = Selector::parse(selector_str) else {
                continue;
            };
            let Ok(key_sel) = Selector::parse("dt, td:first-child") else {
                continue;
            };
            let Ok(value_sel) = Selector::parse("dd, td:last-child") else {
                continue;
            };
            for row in document.select(&selector) {
                let name = row.select(&key_sel).next().map(element_text);
                let value = row.select(&value_sel).next().map(element_text);
                if let (Some(name), Some(value)) = (name, value) {
                    if !name.is_empty() && !value.is_empty() {
                        entries.push(CharacteristicEntry { name, value });
                    }
                }
            }
            if !entries.is_empty() {
                break;
            }
        }
        entries
    }

    /// Innermost ancestor whose class list carries a card marker
    fn card_container<'a>(&self, link: ElementRef<'a>) -> Option<ElementRef<'a>> {
        let mut fallback = None;
        for (depth, ancestor) in link.ancestors().enumerate() {
            let Some(element) = ElementRef::wrap(ancestor) else {
                continue;
            };
            if depth < 3 {
                fallback = Some(element);
            }
            let classes = element.value().attr("class").unwrap_or_default();
            if self
                .card_markers
                .iter()
                .any(|marker| classes.contains(marker.as_str()))
            {
                return Some(element);
            }
        }
        fallback
    }

    fn select_text(&self, scope: ElementRef<'_>, selectors: &[Selector]) -> Option<String> {
        selectors.iter().find_map(|selector| {
            scope
                .select(selector)
                .next()
                .map(element_text)
                .filter(|text| !text.is_empty())
        })
    }

    fn select_attr(
        &self,
        scope: ElementRef<'_>,
        selectors: &[Selector],
        attr: &str,
    ) -> Option<String> {
        selectors.iter().find_map(|selector| {
            scope
                .select(selector)
                .next()
                .and_then(|el| el.value().attr(attr))
                .map(str::to_string)
        })
    }
}

fn compile_selectors(selector_strings: &[String]) -> ParseResult<Vec<Selector>> {
    let mut selectors = Vec::new();
    for selector_str in selector_strings {
        match Selector::parse(selector_str) {
            Ok(selector) => selectors.push(selector),
            Err(e) => warn!("failed to compile selector '{}': {}", selector_str, e),
        }
    }
    if selectors.is_empty() {
        return Err(ParseError::InvalidSelector {
            selector: selector_strings.join(", "),
            reason: "no valid selectors compiled".to_string(),
        });
    }
    Ok(selectors)
}

fn element_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn card_text(card: ElementRef<'_>) -> String {
    element_text(card)
}

fn select_first_text(document: &Html, selector_strings: &[&str]) -> Option<String> {
    selector_strings.iter().find_map(|selector_str| {
        let selector = Selector::parse(selector_str).ok()?;
        document
            .select(&selector)
            .next()
            .map(element_text)
            .filter(|text| !text.is_empty())
    })
}

fn select_all_text(document: &Html, selector_strings: &[&str]) -> Vec<String> {
    for selector_str in selector_strings {
        let Ok(selector) = Selector::parse(selector_str) else {
            continue;
        };
        let texts: Vec<String> = document
            .select(&selector)
            .map(element_text)
            .filter(|text| !text.is_empty())
            .collect();
        if !texts.is_empty() {
            return texts;
        }
    }
    Vec::new()
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING_HTML: &str = r#"
        <div class="widget-search-result">
          <div class="tile-root j5t">
            <a href="/product/wireless-headphones-1681720585/" class="tile-hover-target">
              <span class="tsBody500Medium">Беспроводные наушники XB-500</span>
            </a>
            <img src="https://cdn1.ozone.ru/s3/multimedia/headphones.jpg"/>
            <div>1 999 ₽ <s>3 299 ₽</s> −39%</div>
            <div>4.8 • 2 704 отзыва</div>
            <button class="delivery-info">Послезавтра</button>
          </div>
          <div class="tile-root k2m">
            <a href="/product/wireless-headphones-1681720585/">duplicate link</a>
          </div>
          <div class="tile-root m1x">
            <a href="/collection/headphones/">not a product</a>
          </div>
        </div>
    "#;

    #[test]
    fn cards_parse_with_dedup_by_href() {
        let parser = DomFallbackParser::new().unwrap();
        let extraction = parser.parse_cards(LISTING_HTML, "https://www.ozon.ru").unwrap();
        let cards = extraction.cards;
        assert_eq!(cards.len(), 1);

        let card = &cards[0];
        assert_eq!(card.sku, "1681720585");
        assert_eq!(card.title, "Беспроводные наушники XB-500");
        assert_eq!(card.price, 1999.0);
        assert_eq!(card.original_price, 3299.0);
        assert_eq!(card.discount_percent, 39);
        assert_eq!(card.rating, 4.8);
        assert_eq!(card.review_count, 2704);
        assert_eq!(card.delivery_info, "Послезавтра");
        assert_eq!(
            card.product_url,
            "https://www.ozon.ru/product/wireless-headphones-1681720585/"
        );
        assert_eq!(card.source, SourceFidelity::DomFallback);
    }

    #[test]
    fn missing_fields_stay_empty_without_failing() {
        let parser = DomFallbackParser::new().unwrap();
        let html = r#"<div class="tile-root"><a href="/product/bare-item-9999911/">Bare</a></div>"#;
        let extraction = parser.parse_cards(html, "https://www.ozon.ru").unwrap();
        assert_eq!(extraction.cards.len(), 1);
        assert_eq!(extraction.cards[0].price, 0.0);
        assert_eq!(extraction.cards[0].rating, 0.0);
    }

    #[test]
    fn product_link_without_sku_counts_as_discarded() {
        let parser = DomFallbackParser::new().unwrap();
        let html = r#"<div class="tile-root"><a href="/product/mystery-item/">No SKU</a></div>"#;
        let extraction = parser.parse_cards(html, "https://www.ozon.ru").unwrap();
        assert!(extraction.cards.is_empty());
        assert_eq!(extraction.discarded, 1);
    }

    #[test]
    fn interstitial_page_is_fatal() {
        let parser = DomFallbackParser::new().unwrap();
        let html = "<html><body>Доступ ограничен. Подтвердите, что вы не робот.</body></html>";
        assert!(matches!(
            parser.parse_cards(html, "https://www.ozon.ru"),
            Err(ParseError::InterstitialDetected)
        ));
    }

    #[test]
    fn detail_fallback_reads_stock_and_breadcrumbs() {
        let parser = DomFallbackParser::new().unwrap();
        let html = r#"
            <nav><ol class="breadcrumbs"><li><a href="/category/electronics/">Электроника</a></li>
            <li><a href="/category/headphones/">Наушники</a></li></ol></nav>
            <div data-widget="webCurrentSeller"><a>SoundHub</a></div>
            <div>Осталось 5 шт</div>
        "#;
        let partial = parser
            .parse_detail(html, "https://www.ozon.ru/product/xb-500-1681720585/")
            .unwrap();
        assert_eq!(partial.seller_name, "SoundHub");
        assert_eq!(partial.category, "Электроника > Наушники");
        assert_eq!(partial.stock_quantity, Some(5));
    }

    #[test]
    fn detail_without_sku_is_discarded() {
        let parser = DomFallbackParser::new().unwrap();
        let result = parser.parse_detail("<html></html>", "https://www.ozon.ru/product/x-42/");
        assert!(matches!(result, Err(ParseError::IdentityMissing { .. })));
    }
}
