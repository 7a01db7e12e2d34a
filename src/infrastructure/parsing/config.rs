//! Parsing configuration for widget resolution and DOM fallback
//!
//! Centralized configuration for widget-key probes, JSON pointer fallbacks,
//! and card selectors. Widget keys on the wire carry opaque instance
//! suffixes (`webPrice-3121879-default-1`), so every probe is a substring
//! match; new widget shapes stay additive by appending probes.

use serde::{Deserialize, Serialize};

/// Main resolver configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Widget-key substrings carrying the list-phase item grid
    pub list_widgets: Vec<String>,

    /// Widget-key substrings for the price container
    pub price_widgets: Vec<String>,

    /// Widget-key substrings for the rating/review score container
    pub review_widgets: Vec<String>,

    /// Widget-key substrings for the current-seller container
    pub seller_widgets: Vec<String>,

    /// Widget-key substrings for the breadcrumb trail
    pub breadcrumb_widgets: Vec<String>,

    /// Widget-key substrings for the characteristics containers
    pub characteristics_widgets: Vec<String>,

    /// Widget-key substrings that can carry stock information
    pub stock_widgets: Vec<String>,

    /// Widget-key substrings for competing-offer ("other sellers") data
    pub other_offers_widgets: Vec<String>,

    /// Widget-key substrings for the image gallery
    pub gallery_widgets: Vec<String>,

    /// Widget-key substrings for the product heading
    pub heading_widgets: Vec<String>,

    /// JSON pointer fallbacks inside a decoded widget, per canonical field
    pub pointers: PointerConfig,

    /// Separator for the joined breadcrumb path
    pub category_separator: String,
}

/// Ordered JSON pointer fallbacks per canonical field
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PointerConfig {
    pub price: Vec<String>,
    pub original_price: Vec<String>,
    pub discount: Vec<String>,
    pub rating: Vec<String>,
    pub review_count: Vec<String>,
    pub seller_name: Vec<String>,
    pub seller_type: Vec<String>,
    pub title: Vec<String>,
    pub image: Vec<String>,
    pub follower_count: Vec<String>,
    pub follower_min_price: Vec<String>,
    pub follower_min_url: Vec<String>,
    pub max_cart_quantity: Vec<String>,
    pub availability: Vec<String>,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            list_widgets: vec![
                "searchResultsV2".to_string(),
                "tileGrid".to_string(),
                "skuGrid".to_string(),
            ],
            price_widgets: vec!["webPrice".to_string(), "webSale".to_string()],
            review_widgets: vec![
                "webReviewProductScore".to_string(),
                "webSingleProductScore".to_string(),
            ],
            seller_widgets: vec!["webCurrentSeller".to_string()],
            breadcrumb_widgets: vec!["breadCrumbs".to_string()],
            characteristics_widgets: vec![
                "webCharacteristics".to_string(),
                "webShortCharacteristics".to_string(),
            ],
            stock_widgets: vec![
                "webStockNumber".to_string(),
                "webAddToCart".to_string(),
                "webAvailability".to_string(),
                "webOutOfStock".to_string(),
            ],
            other_offers_widgets: vec![
                "webOtherSellers".to_string(),
                "otherOffersFromSellers".to_string(),
            ],
            gallery_widgets: vec!["webGallery".to_string()],
            heading_widgets: vec!["webProductHeading".to_string()],
            pointers: PointerConfig::default(),
            category_separator: " > ".to_string(),
        }
    }
}

impl Default for PointerConfig {
    fn default() -> Self {
        Self {
            price: vec![
                "/price".to_string(),
                "/cardPrice".to_string(),
                "/priceText".to_string(),
                "/offer/price".to_string(),
            ],
            original_price: vec![
                "/originalPrice".to_string(),
                "/crossedPrice".to_string(),
                "/offer/originalPrice".to_string(),
            ],
            discount: vec!["/discount".to_string(), "/discountText".to_string()],
            rating: vec![
                "/totalScore".to_string(),
                "/score".to_string(),
                "/rating".to_string(),
            ],
            review_count: vec![
                "/count".to_string(),
                "/totalCount".to_string(),
                "/reviewsCount".to_string(),
            ],
            seller_name: vec![
                "/name".to_string(),
                "/seller/name".to_string(),
                "/title".to_string(),
            ],
            seller_type: vec![
                "/deliverySchema".to_string(),
                "/seller/deliverySchema".to_string(),
                "/fulfillment".to_string(),
            ],
            title: vec!["/title".to_string(), "/header".to_string()],
            image: vec![
                "/coverImage".to_string(),
                "/images/0/src".to_string(),
                "/image".to_string(),
            ],
            follower_count: vec![
                "/sellersCount".to_string(),
                "/offersCount".to_string(),
            ],
            follower_min_price: vec!["/minPrice".to_string(), "/minOfferPrice".to_string()],
            follower_min_url: vec!["/link".to_string(), "/minOfferLink".to_string()],
            max_cart_quantity: vec!["/maxQuantity".to_string(), "/limit".to_string()],
            availability: vec!["/status".to_string(), "/state".to_string()],
        }
    }
}

/// CSS selectors and text patterns for the rendered-card fallback
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CardSelectors {
    /// Selectors for product detail page links
    pub product_link: Vec<String>,

    /// Class substrings that mark a card container, tried innermost-first
    pub card_container_markers: Vec<String>,

    /// Selectors for the card title element
    pub title: Vec<String>,

    /// Selectors for the card image
    pub image: Vec<String>,

    /// Selectors for the brand element
    pub brand: Vec<String>,

    /// Selectors for delivery text
    pub delivery: Vec<String>,
}

impl Default for CardSelectors {
    fn default() -> Self {
        Self {
            product_link: vec!["a[href*='/product/']".to_string()],
            card_container_markers: vec![
                "tile".to_string(),
                "card".to_string(),
                "product".to_string(),
            ],
            title: vec![
                "span[class*='tsBody500Medium']".to_string(),
                "a[class*='tile-hover-target']".to_string(),
            ],
            image: vec![
                "img[src*='cdn']".to_string(),
                "img[src*='ozon']".to_string(),
                "img".to_string(),
            ],
            brand: vec![
                "[class*='brand']".to_string(),
                "[class*='tsBodyControl']".to_string(),
            ],
            delivery: vec![
                "button[class*='delivery']".to_string(),
                "[class*='tsBodyControl400Small']".to_string(),
            ],
        }
    }
}
