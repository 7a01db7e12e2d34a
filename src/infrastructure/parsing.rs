//! Extraction infrastructure for widget payloads and rendered markup
//!
//! This module provides the schema-agnostic field resolver over decoded
//! widget maps, unit-aware characteristics parsing, and the rendered-DOM
//! fallback extractor, with comprehensive error isolation per field.

pub mod card_parser;
pub mod characteristics;
pub mod config;
pub mod error;
pub mod field_resolver;
pub mod units;

// Re-export public types
pub use card_parser::{CardExtraction, DomFallbackParser};
pub use config::{CardSelectors, ResolverConfig};
pub use error::{ParseError, ParseResult};
pub use field_resolver::{ListResolution, SchemaFieldResolver, StockObservation, WidgetMap};
