//! Schema-agnostic field resolution over decoded widget payloads
//!
//! The page-composition API ships a bag of independently-serialized widgets
//! under heterogeneous, instance-suffixed keys. Nothing here deserializes
//! into fixed structs; each canonical field is resolved through an ordered
//! list of candidate rules (widget-key substring probe, JSON pointer
//! fallbacks, numeric-pattern match over the stringified payload) until one
//! produces a non-empty value. A field that resolves nowhere stays at its
//! zero value; only a missing SKU fails an item.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tracing::debug;

use crate::domain::product::{PartialProduct, SourceFidelity};

use super::characteristics;
use super::config::ResolverConfig;
use super::units::parse_locale_number;

/// Decoded widget map of one intercepted response: `(widget key, payload)`
pub type WidgetMap = Vec<(String, Value)>;

/// Stock/review fields resolvable for the tracking job
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StockObservation {
    pub stock_quantity: Option<u32>,
    pub review_count: Option<u32>,
}

/// List-phase resolution result: the resolved items plus the count of
/// items that had to be discarded for missing identity
#[derive(Debug, Default)]
pub struct ListResolution {
    pub items: Vec<PartialProduct>,
    pub discarded: usize,
}

static SKU_IN_URL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"-(\d{5,})(?:/|\?|$)").unwrap());

static CURRENCY_PRICE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([\d\s\u{a0}]+(?:[.,]\d+)?)\s*₽").unwrap());

static DISCOUNT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[−-](\d+)\s*%").unwrap());

static RATING_REVIEWS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d+[.,]\d+)\s*[•·]?\s*([\d\s\u{a0},]+)\s*(?:отзыв|оценк|review)").unwrap()
});

static STOCK_LEFT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)остал[ао]сь\s+(\d+)\s*(?:шт|товар)").unwrap());

static OUT_OF_STOCK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)нет в наличии|закончился|распродан|out_of_stock").unwrap());

/// Resolves canonical fields from heterogeneous widget payloads
pub struct SchemaFieldResolver {
    config: ResolverConfig,
}

impl Default for SchemaFieldResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl SchemaFieldResolver {
    pub fn new() -> Self {
        Self::with_config(ResolverConfig::default())
    }

    pub fn with_config(config: ResolverConfig) -> Self {
        Self { config }
    }

    /// Extract the marketplace SKU from a product URL tail
    /// (`.../product/some-slug-1681720585/` → `1681720585`).
    pub fn sku_from_url(url: &str) -> Option<String> {
        SKU_IN_URL_RE
            .captures(url)
            .map(|caps| caps[1].to_string())
    }

    /// Resolve the detail-phase canonical subset from one widget map.
    /// `product_url` anchors identity; the returned partial has no SKU when
    /// neither the URL nor any widget carries one.
    pub fn resolve_detail(&self, widgets: &WidgetMap, product_url: &str) -> PartialProduct {
        let mut partial = PartialProduct::new(SourceFidelity::DetailApi);
        partial.product_url = product_url.to_string();
        partial.sku = Self::sku_from_url(product_url)
            .or_else(|| self.probe_sku(widgets))
            .unwrap_or_default();

        if let Some(widget) = self.find_widget(widgets, &self.config.heading_widgets) {
            if let Some(title) = string_at(widget, &self.config.pointers.title) {
                partial.title = title;
            }
        }
        if let Some(widget) = self.find_widget(widgets, &self.config.gallery_widgets) {
            if let Some(image) = string_at(widget, &self.config.pointers.image) {
                partial.image_url = image;
            }
        }

        self.resolve_price_into(widgets, &mut partial);
        self.resolve_reviews_into(widgets, &mut partial);
        self.resolve_seller_into(widgets, &mut partial);
        self.resolve_breadcrumbs_into(widgets, &mut partial);
        self.resolve_other_offers_into(widgets, &mut partial);

        for (_, widget) in self.find_widgets(widgets, &self.config.characteristics_widgets) {
            let entries = characteristics::parse_sections(widget);
            characteristics::apply_entries(&mut partial, &entries);
        }

        let observation = self.resolve_stock_observation(widgets);
        partial.stock_quantity = observation.stock_quantity;
        if partial.review_count == 0 {
            partial.review_count = observation.review_count.unwrap_or(0);
        }

        partial
    }

    /// Resolve list-phase partials from a search-results widget map.
    /// Items without a derivable SKU are counted as discarded, never
    /// silently dropped.
    pub fn resolve_list_items(&self, widgets: &WidgetMap, base_url: &str) -> ListResolution {
        let mut resolution = ListResolution::default();
        for (key, widget) in self.find_widgets(widgets, &self.config.list_widgets) {
            let Some(raw_items) = widget
                .pointer("/items")
                .or_else(|| widget.pointer("/tiles"))
                .and_then(Value::as_array)
            else {
                debug!("list widget '{}' carried no item array", key);
                continue;
            };
            for raw in raw_items {
                match self.resolve_list_item(raw, base_url) {
                    Some(item) => resolution.items.push(item),
                    None => resolution.discarded += 1,
                }
            }
        }
        resolution
    }

    fn resolve_list_item(&self, raw: &Value, base_url: &str) -> Option<PartialProduct> {
        let mut partial = PartialProduct::new(SourceFidelity::ListApi);

        let link = first_string(
            raw,
            &["/action/link", "/link", "/url", "/action/behavior/link"],
        );
        if let Some(link) = link {
            partial.product_url = absolutize(&link, base_url);
            partial.sku = Self::sku_from_url(&partial.product_url).unwrap_or_default();
        }
        if partial.sku.is_empty() {
            if let Some(sku) = first_uint(raw, &["/sku", "/skuId", "/id"]) {
                partial.sku = sku.to_string();
            }
        }
        if partial.sku.is_empty() {
            return None;
        }

        partial.title = first_string(raw, &["/title", "/name"])
            .or_else(|| first_atom_text(raw, "textAtom"))
            .unwrap_or_default();
        partial.image_url = first_string(raw, &["/mainImage", "/image", "/images/0"])
            .unwrap_or_default();

        // Currency-marked tokens anywhere in the tile cover the price pair:
        // first token is the current price, second the struck-through one
        let text = raw.to_string();
        let text_prices: Vec<f64> = CURRENCY_PRICE_RE
            .captures_iter(&text)
            .filter_map(|caps| parse_locale_number(&caps[1]))
            .collect();
        partial.price = first_number(raw, &["/price", "/priceV2/price/0/price"])
            .or_else(|| text_prices.first().copied())
            .unwrap_or(0.0);
        partial.original_price =
            first_number(raw, &["/originalPrice", "/priceV2/price/1/price"])
                .or_else(|| text_prices.get(1).copied())
                .unwrap_or(0.0);
        if let Some(caps) = DISCOUNT_RE.captures(&text) {
            partial.discount_percent = caps[1].parse().unwrap_or(0);
        }

        partial.rating = first_number(raw, &["/rating", "/ratingValue"]).unwrap_or(0.0);
        partial.review_count =
            first_uint(raw, &["/commentsCount", "/reviewsCount"]).unwrap_or(0) as u32;
        if partial.rating == 0.0 {
            if let Some(caps) = RATING_REVIEWS_RE.captures(&text) {
                partial.rating = parse_locale_number(&caps[1]).unwrap_or(0.0);
                partial.review_count = parse_locale_number(&caps[2])
                    .map_or(0, |n| n as u32);
            }
        }

        partial.brand = first_string(raw, &["/brand", "/brandName"]).unwrap_or_default();
        partial.delivery_info =
            first_string(raw, &["/deliveryInfo", "/delivery/text"]).unwrap_or_default();

        Some(partial)
    }

    /// Resolve the stock/review observation subset, in source priority:
    /// stock-number text, add-to-cart quantity limit, availability status.
    pub fn resolve_stock_observation(&self, widgets: &WidgetMap) -> StockObservation {
        let mut observation = StockObservation::default();

        for (_, widget) in self.find_widgets(widgets, &self.config.stock_widgets) {
            let text = widget.to_string();
            if observation.stock_quantity.is_none() {
                if let Some(caps) = STOCK_LEFT_RE.captures(&text) {
                    observation.stock_quantity = caps[1].parse().ok();
                }
            }
            if observation.stock_quantity.is_none() {
                observation.stock_quantity = number_at(widget, &self.config.pointers.max_cart_quantity)
                    .map(|n| n as u32);
            }
            if observation.stock_quantity.is_none() {
                let unavailable = string_at(widget, &self.config.pointers.availability)
                    .is_some_and(|s| OUT_OF_STOCK_RE.is_match(&s))
                    || OUT_OF_STOCK_RE.is_match(&text);
                if unavailable {
                    observation.stock_quantity = Some(0);
                }
            }
        }

        if let Some(widget) = self.find_widget(widgets, &self.config.review_widgets) {
            observation.review_count = number_at(widget, &self.config.pointers.review_count)
                .map(|n| n as u32);
        }

        observation
    }

    /// Resolve a companion-attributes payload (sales/ops data service shape:
    /// flat fields plus a numeric-keyed dimension attribute list).
    pub fn resolve_companion(&self, payload: &Value, sku: &str) -> PartialProduct {
        let mut partial = PartialProduct::new(SourceFidelity::DetailApi);
        partial.sku = sku.to_string();
        partial.brand = first_string(payload, &["/brand"]).unwrap_or_default();
        partial.category = first_string(payload, &["/catname", "/categoryName"]).unwrap_or_default();
        partial.seller_type = first_string(payload, &["/sources", "/sellerType"]).unwrap_or_default();
        partial.volume_liters = first_number(payload, &["/volume", "/volumeLiters"]).unwrap_or(0.0);
        partial.price = first_number(payload, &["/avgprice", "/avgPrice"]).unwrap_or(0.0);
        if let Some(date) = first_string(payload, &["/createDate", "/creationDate"]) {
            partial.creation_date = characteristics::parse_creation_date(&date);
        }
        characteristics::apply_dimension_attributes(&mut partial, payload);
        partial
    }

    fn resolve_price_into(&self, widgets: &WidgetMap, partial: &mut PartialProduct) {
        let Some(widget) = self.find_widget(widgets, &self.config.price_widgets) else {
            return;
        };
        partial.price = number_at(widget, &self.config.pointers.price).unwrap_or(0.0);
        partial.original_price =
            number_at(widget, &self.config.pointers.original_price).unwrap_or(0.0);
        if let Some(discount) = string_at(widget, &self.config.pointers.discount) {
            if let Some(caps) = DISCOUNT_RE.captures(&discount) {
                partial.discount_percent = caps[1].parse().unwrap_or(0);
            }
        }
        if partial.price == 0.0 {
            // Fall back to the first currency-marked token in the payload
            if let Some(caps) = CURRENCY_PRICE_RE.captures(&widget.to_string()) {
                partial.price = parse_locale_number(&caps[1]).unwrap_or(0.0);
            }
        }
    }

    fn resolve_reviews_into(&self, widgets: &WidgetMap, partial: &mut PartialProduct) {
        let Some(widget) = self.find_widget(widgets, &self.config.review_widgets) else {
            return;
        };
        partial.rating = number_at(widget, &self.config.pointers.rating).unwrap_or(0.0);
        partial.review_count = number_at(widget, &self.config.pointers.review_count)
            .map_or(0, |n| n as u32);
    }

    fn resolve_seller_into(&self, widgets: &WidgetMap, partial: &mut PartialProduct) {
        let Some(widget) = self.find_widget(widgets, &self.config.seller_widgets) else {
            return;
        };
        partial.seller_name = string_at(widget, &self.config.pointers.seller_name)
            .unwrap_or_default();
        partial.seller_type = string_at(widget, &self.config.pointers.seller_type)
            .map(|s| s.to_uppercase())
            .unwrap_or_default();
    }

    fn resolve_breadcrumbs_into(&self, widgets: &WidgetMap, partial: &mut PartialProduct) {
        let Some(widget) = self.find_widget(widgets, &self.config.breadcrumb_widgets) else {
            return;
        };
        let Some(crumbs) = widget.pointer("/breadcrumbs").and_then(Value::as_array) else {
            return;
        };
        let labels: Vec<&str> = crumbs
            .iter()
            .filter_map(|crumb| {
                crumb
                    .pointer("/text")
                    .or_else(|| crumb.pointer("/name"))
                    .and_then(Value::as_str)
            })
            .collect();
        if !labels.is_empty() {
            partial.category = labels.join(&self.config.category_separator);
        }
    }

    fn resolve_other_offers_into(&self, widgets: &WidgetMap, partial: &mut PartialProduct) {
        let Some(widget) = self.find_widget(widgets, &self.config.other_offers_widgets) else {
            return;
        };
        partial.follower_count = number_at(widget, &self.config.pointers.follower_count)
            .map_or(0, |n| n as u32);
        partial.follower_min_price =
            number_at(widget, &self.config.pointers.follower_min_price).unwrap_or(0.0);
        partial.follower_min_url = string_at(widget, &self.config.pointers.follower_min_url)
            .unwrap_or_default();
    }

    fn probe_sku(&self, widgets: &WidgetMap) -> Option<String> {
        widgets
            .iter()
            .find_map(|(_, widget)| first_uint(widget, &["/sku", "/skuId"]))
            .map(|sku| sku.to_string())
    }

    fn find_widget<'a>(&self, widgets: &'a WidgetMap, probes: &[String]) -> Option<&'a Value> {
        self.find_widgets(widgets, probes).into_iter().next().map(|(_, v)| v)
    }

    /// All widgets whose key contains any probe substring, in probe order.
    fn find_widgets<'a>(
        &self,
        widgets: &'a WidgetMap,
        probes: &[String],
    ) -> Vec<(&'a str, &'a Value)> {
        let mut found = Vec::new();
        for probe in probes {
            for (key, value) in widgets {
                if key.contains(probe.as_str()) {
                    found.push((key.as_str(), value));
                }
            }
        }
        found
    }
}

/// First non-empty string at any of the given JSON pointers
fn first_string(value: &Value, pointers: &[&str]) -> Option<String> {
    pointers.iter().find_map(|pointer| {
        value
            .pointer(pointer)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    })
}

fn string_at(value: &Value, pointers: &[String]) -> Option<String> {
    let refs: Vec<&str> = pointers.iter().map(String::as_str).collect();
    first_string(value, &refs)
}

/// First parseable number at any pointer; locale strings accepted
fn first_number(value: &Value, pointers: &[&str]) -> Option<f64> {
    pointers.iter().find_map(|pointer| {
        let v = value.pointer(pointer)?;
        match v {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => parse_locale_number(s),
            _ => None,
        }
    })
}

fn number_at(value: &Value, pointers: &[String]) -> Option<f64> {
    let refs: Vec<&str> = pointers.iter().map(String::as_str).collect();
    first_number(value, &refs)
}

fn first_uint(value: &Value, pointers: &[&str]) -> Option<u64> {
    pointers.iter().find_map(|pointer| {
        let v = value.pointer(pointer)?;
        match v {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    })
}

/// First `{"type": "<atom>", "text": ...}`-shaped text in a state array
fn first_atom_text(value: &Value, atom: &str) -> Option<String> {
    let states = value
        .pointer("/mainState")
        .or_else(|| value.pointer("/state"))?
        .as_array()?;
    states.iter().find_map(|state| {
        let is_atom = state
            .pointer("/atom/type")
            .or_else(|| state.pointer("/type"))
            .and_then(Value::as_str)
            .is_some_and(|t| t.contains(atom));
        if !is_atom {
            return None;
        }
        state
            .pointer("/atom/textAtom/text")
            .or_else(|| state.pointer("/textAtom/text"))
            .or_else(|| state.pointer("/text"))
            .and_then(Value::as_str)
            .map(str::to_string)
    })
}

fn absolutize(link: &str, base_url: &str) -> String {
    if link.starts_with("http") {
        link.to_string()
    } else {
        format!("{}{}", base_url.trim_end_matches('/'), link)
    }
}
