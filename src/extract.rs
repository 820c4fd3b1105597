//! Heuristic attribute extraction from legacy listing free text.
//!
//! The legacy export carries most of the interesting structure inside Czech
//! `name`/`description` strings ("kód motoru: AKL", "nájezdem 150 000 km",
//! "rok výroby 2004", ...). Every extractor here is a total function over
//! arbitrary text: malformed input degrades to an absent/empty/default value,
//! never an error, so one garbled listing cannot abort a batch.

use itertools::Itertools;
use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;

/// Shortest engine code we accept; single characters are regex noise.
const MIN_ENGINE_CODE_LEN: usize = 2;
/// Longest engine code we accept from the labeled CSV list.
const MAX_ENGINE_CODE_LEN: usize = 10;
/// Compatibility mentions are capped to keep documents display-sized.
const MAX_COMPATIBILITY_ENTRIES: usize = 10;

/// Plausible manufacture-year window; 4-digit tokens outside it are discarded.
const YEAR_MIN: i32 = 1990;
const YEAR_MAX: i32 = 2025;

static ENGINE_CODE_LABEL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)kód motoru[-:\s]*([A-Z0-9,\s]+)").expect("engine code label pattern")
});
static ENGINE_CODE_TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[A-Z0-9]{3,8}\b").expect("engine code token pattern"));
static DISPLACEMENT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(\d+(?:\.\d+)?)\s*l?(?:\s|i|TDI|HDI|CDI|MPI|V)")
        .expect("displacement pattern")
});
static POWER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(\d+(?:[-\s]*\d+)?)\s*kW").expect("power pattern"));
static DIESEL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)TDI|HDI|CDI|JTD|dCI|CRDI").expect("diesel marker pattern"));
static PETROL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)TSI|TFSI|MPI|GDI|FSI|16V|8V").expect("petrol marker pattern")
});
static MILEAGE_LABELED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)nájezdem?\s*(\d+[.\s]*\d*[xk]*\s*km)").expect("labeled mileage pattern")
});
static MILEAGE_BARE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(\d+[xk]+\s*km)").expect("bare mileage pattern"));
static YEAR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{4})").expect("year pattern"));
static DAMAGE_RES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)demontované?\s+(.+?)(?:\n|\.)",
        r"(?i)chybí\s+(.+?)(?:\n|\.)",
        r"(?i)bez\s+(.+?)(?:\n|\.)",
        r"(?i)POZOR\s+(.+?)(?:\n|\.)",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("damage lead pattern"))
    .collect()
});
static COMPAT_NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(Škoda|Skoda|Volkswagen|Audi|BMW|Mercedes|Ford|Opel|Peugeot|Fiat|Seat|Dacia|Alfa Romeo|Hyundai|Kia)\s+([A-Za-z0-9\s]+)",
    )
    .expect("compatibility name pattern")
});
static COMPAT_DESC_RES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)pasuje do[:\s]*(.+?)(?:\n|\.)",
        r"(?i)kompatibilní[:\s]*(.+?)(?:\n|\.)",
        r"(?i)vozidel[:\s]*(.+?)(?:\n|\.)",
        // Refurbished-export descriptions list models behind "modely aut-",
        // running up to the line end or the year clause.
        r"(?i)modely aut[-\s]*(.+?)(?:\n|rok výroby)",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("compatibility lead pattern"))
    .collect()
});

/// Fuel type classified from the listing name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FuelType {
    Diesel,
    Benzin,
}

impl FuelType {
    /// Czech display label for the specification table.
    pub fn display(&self) -> &'static str {
        match self {
            FuelType::Diesel => "Diesel",
            FuelType::Benzin => "Benzín",
        }
    }
}

/// Mechanical condition classified from keywords.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Condition {
    #[serde(rename = "kompletni")]
    Kompletni,
    #[serde(rename = "nekompletni")]
    Nekompletni,
    #[serde(rename = "funkcni")]
    Funkcni,
}

impl Condition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Condition::Kompletni => "kompletni",
            Condition::Nekompletni => "nekompletni",
            Condition::Funkcni => "funkcni",
        }
    }
}

/// Engine codes from the labeled "kód motoru" CSV in either input, plus
/// (for the old-motor export, where codes sit bare in the title) uppercase
/// alphanumeric tokens of length 3-8 from `name`.
///
/// The result preserves first-seen order, drops duplicates and entries
/// shorter than two characters.
pub fn extract_engine_codes(name: &str, description: &str, scan_name_tokens: bool) -> Vec<String> {
    let mut codes: Vec<String> = Vec::new();

    if scan_name_tokens {
        for m in ENGINE_CODE_TOKEN_RE.find_iter(name) {
            codes.push(m.as_str().trim().to_string());
        }
    }

    for input in [name, description] {
        if let Some(caps) = ENGINE_CODE_LABEL_RE.captures(input) {
            codes.extend(
                caps[1]
                    .split(',')
                    .map(|code| code.trim().to_string())
                    .filter(|code| !code.is_empty() && code.len() <= MAX_ENGINE_CODE_LEN),
            );
        }
    }

    codes
        .into_iter()
        .filter(|code| code.len() >= MIN_ENGINE_CODE_LEN)
        .unique()
        .collect()
}

/// Displacement in litres: a decimal number followed by a unit marker or a
/// known fuel-system suffix ("1.9 TDI", "1,9" is not in the data).
pub fn extract_displacement(name: &str) -> Option<f64> {
    DISPLACEMENT_RE
        .captures(name)
        .and_then(|caps| caps[1].parse::<f64>().ok())
}

/// Power as "<n> kW", checking `name` first and falling back to
/// `description`. Ranges like "66-81 kW" are kept verbatim.
pub fn extract_power(name: &str, description: &str) -> Option<String> {
    for input in [name, description] {
        if let Some(caps) = POWER_RE.captures(input) {
            return Some(format!("{} kW", caps[1].trim()));
        }
    }
    None
}

/// Fuel type from injection-system markers in the name.
///
/// Defaults to petrol when neither marker family matches; this mirrors the
/// legacy data where unlabeled listings are mostly petrol engines.
pub fn extract_fuel_type(name: &str) -> FuelType {
    if DIESEL_RE.is_match(name) {
        FuelType::Diesel
    } else if PETROL_RE.is_match(name) {
        FuelType::Benzin
    } else {
        FuelType::Benzin
    }
}

/// Sentinel returned when no mileage is found; mileage is always present in
/// the output document.
pub const MILEAGE_UNSPECIFIED: &str = "Neuvedeno";

/// Mileage from the labeled "nájezdem ... km" phrase, falling back to a bare
/// "<n>xxx km" token. Inner whitespace is collapsed to single spaces.
pub fn extract_mileage(description: &str) -> String {
    if let Some(caps) = MILEAGE_LABELED_RE.captures(description) {
        return caps[1].split_whitespace().join(" ");
    }
    if let Some(caps) = MILEAGE_BARE_RE.captures(description) {
        return caps[1].to_string();
    }
    MILEAGE_UNSPECIFIED.to_string()
}

/// First 4-digit token in `name`, then `description`, accepted only when it
/// falls inside the plausible manufacture window. Out-of-range matches are
/// discarded silently.
pub fn extract_year(name: &str, description: &str) -> Option<String> {
    let caps = YEAR_RE
        .captures(name)
        .or_else(|| YEAR_RE.captures(description))?;
    let year: i32 = caps[1].parse().ok()?;
    if (YEAR_MIN..=YEAR_MAX).contains(&year) {
        Some(caps[1].to_string())
    } else {
        None
    }
}

/// Keyword classifier: "kompletní" wins, then "holý" (bare block), then
/// "funkční". Defaults to functional when no keyword matches.
pub fn determine_condition(name: &str, description: &str) -> Condition {
    let name_lower = name.to_lowercase();
    let desc_lower = description.to_lowercase();
    if name_lower.contains("kompletní") || desc_lower.contains("kompletní") {
        Condition::Kompletni
    } else if name_lower.contains("holý") || desc_lower.contains("holý") {
        Condition::Nekompletni
    } else if desc_lower.contains("funkční") {
        Condition::Funkcni
    } else {
        Condition::Funkcni
    }
}

/// Damage note from lead phrases ("demontované ...", "chybí ...", "bez ...",
/// "POZOR ..."), first capture wins.
pub fn extract_damage_description(description: &str) -> Option<String> {
    for re in DAMAGE_RES.iter() {
        if let Some(caps) = re.captures(description) {
            return Some(caps[1].trim().to_string());
        }
    }
    None
}

/// Vehicle compatibility mentions: known brand + trailing model words from
/// `name`, plus comma-separated segments behind the lead phrases in the
/// description. Deduplicated, capped at ten entries.
pub fn extract_compatibility(name: &str, description: &str) -> Vec<String> {
    let mut models: Vec<String> = Vec::new();

    for m in COMPAT_NAME_RE.find_iter(name) {
        models.push(m.as_str().trim().to_string());
    }

    for re in COMPAT_DESC_RES.iter() {
        if let Some(caps) = re.captures(description) {
            models.extend(
                caps[1]
                    .split(',')
                    .map(|v| v.trim().to_string())
                    .filter(|v| !v.is_empty()),
            );
        }
    }

    models
        .into_iter()
        .unique()
        .take(MAX_COMPATIBILITY_ENTRIES)
        .collect()
}

/// All extracted attributes for one listing, produced in one pass so the
/// synthesizer never re-runs a pattern.
#[derive(Debug, Clone)]
pub struct ExtractedFields {
    pub engine_codes: Vec<String>,
    pub displacement: Option<f64>,
    pub power: Option<String>,
    pub fuel_type: FuelType,
    pub mileage: String,
    pub year: Option<String>,
    pub condition: Condition,
    pub damage_description: Option<String>,
    pub compatibility: Vec<String>,
}

/// Run every extractor over one listing's text pair.
pub fn extract_all(name: &str, description: &str, scan_name_tokens: bool) -> ExtractedFields {
    ExtractedFields {
        engine_codes: extract_engine_codes(name, description, scan_name_tokens),
        displacement: extract_displacement(name),
        power: extract_power(name, description),
        fuel_type: extract_fuel_type(name),
        mileage: extract_mileage(description),
        year: extract_year(name, description),
        condition: determine_condition(name, description),
        damage_description: extract_damage_description(description),
        compatibility: extract_compatibility(name, description),
    }
}
