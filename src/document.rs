//! Normalized product document assembly.
//!
//! The legacy source duplicated this logic per product category; here a
//! single synthesizer is parameterized by [`CategoryConfig`] (slug prefix,
//! featured threshold, description handling) so both engine categories run
//! through one code path.

use serde::Serialize;
use serde_json::{json, Value};

use crate::extract::{self, ExtractedFields, FuelType};
use crate::migrate::LegacyRecord;

/// Currency is fixed; the legacy export carries CZK prices only.
pub const CURRENCY: &str = "CZK";
/// Used-engine descriptions are cut to the first line or this many
/// characters, whichever is shorter; the full text moves to
/// `detailedDescription`.
pub const DESCRIPTION_CHAR_BUDGET: usize = 300;

/// Per-category pipeline parameters.
#[derive(Debug, Clone, Copy)]
pub struct CategoryConfig {
    /// Human-facing name used in logs and the CLI.
    pub label: &'static str,
    /// Document `_type` in the content store.
    pub doc_type: &'static str,
    /// Prefix applied to legacy slugs to keep categories collision-free.
    pub slug_prefix: Option<&'static str>,
    /// Listings priced at or above this are flagged `featured`.
    pub featured_price_threshold: f64,
    /// Truncate `description` and keep the full text in a rich-text block.
    pub truncate_description: bool,
    /// Scan the listing name for bare uppercase engine-code tokens.
    pub scan_name_tokens: bool,
    /// Fixed warranty label, where the category carries one.
    pub warranty_period: Option<&'static str>,
    /// Fixed condition label overriding the keyword classifier.
    pub fixed_condition_label: Option<&'static str>,
}

/// Professionally refurbished engines: original slugs, higher featured bar,
/// fixed condition/warranty labels.
pub const REFURBISHED_MOTORS: CategoryConfig = CategoryConfig {
    label: "refurbished motors",
    doc_type: "repasovanyMotor",
    slug_prefix: None,
    featured_price_threshold: 60_000.0,
    truncate_description: false,
    scan_name_tokens: false,
    warranty_period: Some("12 měsíců"),
    fixed_condition_label: Some("Po profesionální renovaci"),
};

/// Used engines pulled from the old listings dump: prefixed slugs, bare
/// engine codes in titles, classifier-driven condition.
pub const OLD_MOTORS: CategoryConfig = CategoryConfig {
    label: "old motors",
    doc_type: "staryMotor",
    slug_prefix: Some("stary-"),
    featured_price_threshold: 20_000.0,
    truncate_description: true,
    scan_name_tokens: true,
    warranty_period: None,
    fixed_condition_label: None,
};

impl CategoryConfig {
    /// Final document slug, namespaced per category so a used engine derived
    /// from the same source name as a refurbished one cannot collide.
    pub fn target_slug(&self, legacy_slug: &str) -> String {
        match self.slug_prefix {
            Some(prefix) => format!("{prefix}{legacy_slug}"),
            None => legacy_slug.to_string(),
        }
    }
}

/// Reference to another store document.
#[derive(Debug, Clone, Serialize)]
pub struct Reference {
    #[serde(rename = "_type")]
    pub ref_type: &'static str,
    #[serde(rename = "_ref")]
    pub id: String,
}

impl Reference {
    pub fn to_document(id: impl Into<String>) -> Self {
        Self {
            ref_type: "reference",
            id: id.into(),
        }
    }
}

/// Image entry: asset reference plus generated alt text.
#[derive(Debug, Clone, Serialize)]
pub struct ProductImage {
    #[serde(rename = "_type")]
    pub image_type: &'static str,
    pub asset: Reference,
    pub alt: String,
}

impl ProductImage {
    pub fn new(asset_id: impl Into<String>, alt: impl Into<String>) -> Self {
        Self {
            image_type: "image",
            asset: Reference::to_document(asset_id),
            alt: alt.into(),
        }
    }
}

/// One label/value row of the specification table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Specification {
    pub label: String,
    pub value: String,
}

/// The normalized product document in store schema shape.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedProduct {
    #[serde(rename = "_type")]
    pub doc_type: &'static str,
    pub name: String,
    pub slug: Value,
    pub brand: Reference,
    pub engine_codes: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub displacement: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub power: Option<String>,
    pub fuel_type: FuelType,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detailed_description: Option<Value>,
    pub price: f64,
    pub currency: &'static str,
    pub in_stock: bool,
    pub featured: bool,
    pub images: Vec<ProductImage>,
    pub specifications: Vec<Specification>,
    pub compatibility: Vec<String>,
    pub mileage: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year: Option<String>,
    pub condition: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub damage_description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warranty_period: Option<&'static str>,
}

/// Assemble the output document from the legacy record, the resolved brand
/// id and the ingested image references. Pure; all extraction is
/// deterministic over the record's text fields.
pub fn synthesize(
    record: &LegacyRecord,
    category: &CategoryConfig,
    brand_id: &str,
    images: Vec<ProductImage>,
) -> NormalizedProduct {
    let fields = extract::extract_all(&record.name, &record.description, category.scan_name_tokens);
    let slug = category.target_slug(&record.slug);

    let (description, detailed_description) = if category.truncate_description {
        (
            truncate_description(&record.description),
            Some(rich_text_block(&record.description)),
        )
    } else {
        (record.description.clone(), None)
    };

    let condition = match category.fixed_condition_label {
        Some(label) => label.to_string(),
        None => fields.condition.as_str().to_string(),
    };

    NormalizedProduct {
        doc_type: category.doc_type,
        name: record.name.clone(),
        slug: json!({ "_type": "slug", "current": slug }),
        brand: Reference::to_document(brand_id),
        specifications: build_specifications(&fields),
        engine_codes: fields.engine_codes,
        displacement: fields.displacement,
        power: fields.power,
        fuel_type: fields.fuel_type,
        description,
        detailed_description,
        price: record.price,
        currency: CURRENCY,
        // The export has no stock signal; everything listed is assumed
        // available until an editor says otherwise.
        in_stock: true,
        featured: record.price >= category.featured_price_threshold,
        images,
        compatibility: fields.compatibility,
        mileage: fields.mileage,
        year: fields.year,
        condition,
        damage_description: fields.damage_description,
        warranty_period: category.warranty_period,
    }
}

/// First line, or the fixed character budget, whichever is shorter.
fn truncate_description(description: &str) -> String {
    let first_line = description.lines().next().unwrap_or(description);
    if first_line.is_empty() {
        let cut = description
            .char_indices()
            .take(DESCRIPTION_CHAR_BUDGET)
            .last()
            .map(|(i, c)| i + c.len_utf8())
            .unwrap_or(0);
        return description[..cut].to_string();
    }
    if first_line.chars().count() <= DESCRIPTION_CHAR_BUDGET {
        first_line.to_string()
    } else {
        first_line.chars().take(DESCRIPTION_CHAR_BUDGET).collect()
    }
}

/// Specification rows in fixed display order, one per present attribute.
/// Fuel type and mileage always appear (mileage carries its sentinel).
pub fn build_specifications(fields: &ExtractedFields) -> Vec<Specification> {
    let mut specs = Vec::new();
    let mut push = |label: &str, value: String| {
        specs.push(Specification {
            label: label.to_string(),
            value,
        });
    };

    if let Some(displacement) = fields.displacement {
        push("Objem motoru", format!("{displacement}L"));
    }
    if let Some(power) = &fields.power {
        push("Výkon", power.clone());
    }
    push("Typ paliva", fields.fuel_type.display().to_string());
    push("Nájezd", fields.mileage.clone());
    if let Some(year) = &fields.year {
        push("Rok", year.clone());
    }
    if !fields.engine_codes.is_empty() {
        push("Kód motoru", fields.engine_codes.join(", "));
    }
    specs
}

/// Full original text preserved as a single rich-text block.
fn rich_text_block(text: &str) -> Value {
    json!([
        {
            "_type": "block",
            "style": "normal",
            "children": [
                { "_type": "span", "text": text, "marks": [] }
            ],
            "markDefs": []
        }
    ])
}
