//! Seasonal storage pricing resolver
//!
//! Offers are scoped to a season and a set of vehicle types. A request is
//! priced by resolving its season (including legacy free-text values),
//! finding the offers that support its vehicle type, picking the first
//! offer whose length range matches, and applying the offer's price mode
//! plus any selected add-ons.

use crate::error::CoreError;
use rust_decimal::Decimal;
use serde::de::Deserializer;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Scope key used for add-on prices that apply to every season
pub const GLOBAL_ADDON_PRICE_SCOPE: &str = "__global__";

/// English/French label pair; historical documents may carry only one
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Localized {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub en: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fr: Option<String>,
}

impl Localized {
    pub fn new(en: &str, fr: &str) -> Self {
        Self {
            en: Some(en.to_string()),
            fr: Some(fr.to_string()),
        }
    }

    /// English first, French as fallback
    pub fn best(&self) -> &str {
        self.en
            .as_deref()
            .or(self.fr.as_deref())
            .unwrap_or_default()
    }
}

/// Amounts arrive as JSON numbers or free-text strings depending on which
/// client wrote the document
fn lenient_decimal<'de, D>(deserializer: D) -> Result<Option<Decimal>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(decimal_from_value))
}

fn decimal_from_value(value: &serde_json::Value) -> Option<Decimal> {
    match value {
        serde_json::Value::Number(n) => n.to_string().parse().ok(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Storage season document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Season {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: Localized,
    #[serde(default)]
    pub label: Localized,
    /// "winter" or "summer"
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub season_type: Option<String>,
    #[serde(default)]
    pub order: i64,
}

/// Vehicle type document; legacy values keep requests saved before the
/// catalog was normalized resolvable
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VehicleType {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub label: Localized,
    #[serde(default)]
    pub legacy_values: Vec<String>,
    #[serde(default)]
    pub order: i64,
}

/// Reusable offer template: label and vehicle-type scope shared by the
/// per-season offers referencing it
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OfferTemplate {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub label: Localized,
    #[serde(default)]
    pub vehicle_types: Vec<String>,
    #[serde(default)]
    pub hide_in_table: Option<bool>,
    #[serde(default)]
    pub order: i64,
}

/// Inclusive-by-default length bounds, in feet
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LengthRange {
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub min: Option<Decimal>,
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub max: Option<Decimal>,
    #[serde(default)]
    pub exclusive_min: bool,
    #[serde(default)]
    pub exclusive_max: bool,
}

/// How an offer prices a vehicle
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "camelCase")]
pub enum PriceSpec {
    /// Fixed amount regardless of vehicle
    Flat {
        #[serde(default, deserialize_with = "lenient_decimal")]
        amount: Option<Decimal>,
    },
    /// Length times rate, floored at a minimum charge
    PerFoot {
        #[serde(default, deserialize_with = "lenient_decimal")]
        rate: Option<Decimal>,
        #[serde(default, deserialize_with = "lenient_decimal")]
        minimum: Option<Decimal>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        unit: Option<Localized>,
    },
    /// No automatic price; staff quote manually
    Contact,
}

/// Per-season storage offer
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageOffer {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub season_id: Option<String>,
    #[serde(default)]
    pub template_id: Option<String>,
    #[serde(default)]
    pub label: Localized,
    /// Overrides the template's scope when non-empty
    #[serde(default)]
    pub vehicle_types: Vec<String>,
    #[serde(default)]
    pub length_range: Option<LengthRange>,
    #[serde(default)]
    pub price: Option<PriceSpec>,
    #[serde(default)]
    pub hide_in_table: bool,
    #[serde(default)]
    pub order: i64,
}

/// Add-on price document; `season_id = None` means the global fallback
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddOn {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub name: Localized,
    #[serde(default)]
    pub season_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub price: Option<Decimal>,
    #[serde(default)]
    pub order: i64,
}

/// Vehicle details on a storage request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VehicleInfo {
    #[serde(default, rename = "type")]
    pub vehicle_type: Option<String>,
    #[serde(default)]
    pub brand: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub colour: Option<String>,
    /// May be stored as a number or free text
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub length_feet: Option<Decimal>,
    #[serde(default)]
    pub year: Option<String>,
    #[serde(default)]
    pub plate: Option<String>,
    #[serde(default)]
    pub province: Option<String>,
}

/// Selected add-ons on a storage request
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddonSelection {
    #[serde(default)]
    pub battery: bool,
    #[serde(default)]
    pub propane: bool,
}

/// Seasonal storage request document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageRequest {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub client_id: Option<String>,
    /// Season id, or legacy free-text season label
    #[serde(default)]
    pub season: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub vehicle: VehicleInfo,
    #[serde(default)]
    pub addons: AddonSelection,
    /// Negotiated amount; overrides the estimate when present
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub contract_amount: Option<Decimal>,
    #[serde(default)]
    pub insurance_company: Option<String>,
    #[serde(default)]
    pub policy_number: Option<String>,
    #[serde(default)]
    pub insurance_expiration: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// True when pricing the offer needs a numeric vehicle length
fn offer_requires_length(offer: &StorageOffer) -> bool {
    if matches!(offer.price, Some(PriceSpec::PerFoot { .. })) {
        return true;
    }
    offer.length_range.is_some()
}

/// A missing range matches any vehicle; a missing length matches nothing
pub fn length_matches_range(length: Option<Decimal>, range: Option<&LengthRange>) -> bool {
    let range = match range {
        Some(range) => range,
        None => return true,
    };
    let length = match length {
        Some(length) => length,
        None => return false,
    };
    if let Some(min) = range.min {
        let ok = if range.exclusive_min {
            length > min
        } else {
            length >= min
        };
        if !ok {
            return false;
        }
    }
    if let Some(max) = range.max {
        let ok = if range.exclusive_max {
            length < max
        } else {
            length <= max
        };
        if !ok {
            return false;
        }
    }
    true
}

/// Price an offer for a vehicle length. `None` means no automatic price
/// (contact mode, missing amount, or per-foot with no length).
pub fn offer_price_value(offer: &StorageOffer, length: Option<Decimal>) -> Option<Decimal> {
    match offer.price.as_ref()? {
        PriceSpec::Contact => None,
        PriceSpec::Flat { amount } => *amount,
        PriceSpec::PerFoot { rate, minimum, .. } => {
            let length = length?;
            let rate = rate.unwrap_or(Decimal::ZERO);
            let minimum = minimum.unwrap_or(Decimal::ZERO);
            Some((length * rate).max(minimum))
        }
    }
}

fn addon_price_key(season_id: Option<&str>, code: &str) -> String {
    format!("{}::{}", season_id.unwrap_or(GLOBAL_ADDON_PRICE_SCOPE), code)
}

/// In-memory pricing catalog assembled from store snapshots
#[derive(Debug, Default)]
pub struct PricingCatalog {
    seasons: Vec<Season>,
    vehicle_types: Vec<VehicleType>,
    templates: Vec<OfferTemplate>,
    offers: Vec<StorageOffer>,
    addon_prices: HashMap<String, Decimal>,
}

impl PricingCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seasons(&self) -> &[Season] {
        &self.seasons
    }

    pub fn vehicle_types(&self) -> &[VehicleType] {
        &self.vehicle_types
    }

    pub fn offers(&self) -> &[StorageOffer] {
        &self.offers
    }

    pub fn apply_seasons_snapshot(&mut self, seasons: Vec<Season>) {
        log::debug!("seasons snapshot: {} documents", seasons.len());
        self.seasons = seasons;
    }

    pub fn apply_vehicle_types_snapshot(&mut self, vehicle_types: Vec<VehicleType>) {
        self.vehicle_types = vehicle_types;
    }

    pub fn apply_templates_snapshot(&mut self, templates: Vec<OfferTemplate>) {
        self.templates = templates;
    }

    pub fn apply_offers_snapshot(&mut self, offers: Vec<StorageOffer>) {
        log::debug!("offers snapshot: {} documents", offers.len());
        self.offers = offers;
    }

    /// Rebuild the `<scope>::<code>` price lookup from an add-ons snapshot
    pub fn apply_addons_snapshot(&mut self, addons: Vec<AddOn>) {
        self.addon_prices = addons
            .iter()
            .map(|addon| {
                (
                    addon_price_key(addon.season_id.as_deref(), &addon.code),
                    addon.price.unwrap_or(Decimal::ZERO),
                )
            })
            .collect();
    }

    pub fn season_by_id(&self, id: &str) -> Option<&Season> {
        self.seasons.iter().find(|season| season.id == id)
    }

    /// Resolve a stored season value to a season id. Accepts the id itself
    /// or a legacy free-text label matched case-insensitively against
    /// either language of the season's name or label.
    pub fn resolve_season_id(&self, season_value: &str) -> Option<&str> {
        if season_value.is_empty() {
            return None;
        }
        if let Some(season) = self.season_by_id(season_value) {
            return Some(&season.id);
        }
        let normalized = season_value.to_lowercase();
        let matches_text = |text: &Option<String>| {
            text.as_deref()
                .map_or(false, |t| t.to_lowercase() == normalized)
        };
        self.seasons
            .iter()
            .find(|season| {
                matches_text(&season.name.en)
                    || matches_text(&season.name.fr)
                    || matches_text(&season.label.en)
                    || matches_text(&season.label.fr)
            })
            .map(|season| season.id.as_str())
    }

    fn vehicle_type_entry(&self, identifier: &str) -> Option<&VehicleType> {
        self.vehicle_types.iter().find(|entry| {
            entry.id == identifier
                || entry.value.as_deref() == Some(identifier)
                || entry.slug.as_deref() == Some(identifier)
                || entry.legacy_values.iter().any(|v| v == identifier)
        })
    }

    /// All identifiers that mean the same vehicle type: the stored value
    /// plus the catalog entry's id, value, slug, and legacy values
    pub fn vehicle_type_candidates(&self, identifier: &str) -> Vec<String> {
        if identifier.is_empty() {
            return Vec::new();
        }
        let mut candidates = vec![identifier.to_string()];
        if let Some(entry) = self.vehicle_type_entry(identifier) {
            let mut push = |value: Option<&str>| {
                if let Some(value) = value {
                    if !value.is_empty() && !candidates.iter().any(|c| c == value) {
                        candidates.push(value.to_string());
                    }
                }
            };
            push(Some(&entry.id));
            push(entry.value.as_deref());
            push(entry.slug.as_deref());
            for legacy in &entry.legacy_values {
                push(Some(legacy));
            }
        }
        candidates
    }

    fn template_for(&self, offer: &StorageOffer) -> Option<&OfferTemplate> {
        offer
            .template_id
            .as_deref()
            .and_then(|id| self.templates.iter().find(|t| t.id == id))
    }

    /// The offer's own vehicle-type scope, falling back to its template's
    pub fn offer_vehicle_types<'a>(&'a self, offer: &'a StorageOffer) -> &'a [String] {
        if !offer.vehicle_types.is_empty() {
            return &offer.vehicle_types;
        }
        if let Some(template) = self.template_for(offer) {
            if !template.vehicle_types.is_empty() {
                return &template.vehicle_types;
            }
        }
        &[]
    }

    fn offer_supports_vehicle(&self, offer: &StorageOffer, vehicle_type: &str) -> bool {
        let supported = self.offer_vehicle_types(offer);
        if supported.is_empty() {
            return false;
        }
        self.vehicle_type_candidates(vehicle_type)
            .iter()
            .any(|candidate| supported.iter().any(|s| s == candidate))
    }

    /// Offers applicable to a request: same season, supporting its vehicle
    /// type, in display order
    pub fn offers_for_request(&self, request: &StorageRequest) -> Vec<&StorageOffer> {
        let season = match request.season.as_deref() {
            Some(season) => season,
            None => return Vec::new(),
        };
        let vehicle_type = match request.vehicle.vehicle_type.as_deref() {
            Some(vehicle_type) => vehicle_type,
            None => return Vec::new(),
        };
        let season_id = match self.resolve_season_id(season) {
            Some(id) => id,
            None => return Vec::new(),
        };
        let mut matched: Vec<&StorageOffer> = self
            .offers
            .iter()
            .filter(|offer| {
                offer.season_id.as_deref() == Some(season_id)
                    && self.offer_supports_vehicle(offer, vehicle_type)
            })
            .collect();
        matched.sort_by_key(|offer| offer.order);
        matched
    }

    /// Season-scoped add-on price, falling back to the global scope, then 0
    pub fn addon_price(&self, code: &str, season_id: Option<&str>) -> Decimal {
        if code.is_empty() {
            return Decimal::ZERO;
        }
        if let Some(season_id) = season_id {
            if let Some(price) = self.addon_prices.get(&addon_price_key(Some(season_id), code)) {
                return *price;
            }
        }
        self.addon_prices
            .get(&addon_price_key(None, code))
            .copied()
            .unwrap_or(Decimal::ZERO)
    }

    /// Suggested amount for a request, or `None` when it cannot be priced
    /// automatically (unknown season, no matching offers, per-foot pricing
    /// with no usable length, or a contact-mode offer).
    pub fn estimate_amount(&self, request: &StorageRequest) -> Option<Decimal> {
        let season_id = request
            .season
            .as_deref()
            .and_then(|s| self.resolve_season_id(s))
            .map(|s| s.to_string());
        let offers = self.offers_for_request(request);
        if offers.is_empty() {
            return None;
        }
        let length = request.vehicle.length_feet;
        let needs_length = offers.iter().any(|offer| offer_requires_length(offer));
        if needs_length && length.is_none() {
            return None;
        }
        let matched = offers
            .iter()
            .find(|offer| length_matches_range(length, offer.length_range.as_ref()));
        // No range matched: the widest bracket is conventionally last.
        let selected = matched.copied().or_else(|| offers.last().copied())?;
        let base = offer_price_value(selected, length)?;
        let mut total = base;
        if request.addons.battery {
            total += self.addon_price("battery", season_id.as_deref());
        }
        if request.addons.propane {
            total += self.addon_price("propane", season_id.as_deref());
        }
        Some(total)
    }

    /// Effective amount: the negotiated contract amount when present,
    /// otherwise the automatic estimate
    pub fn resolve_amount(&self, request: &StorageRequest) -> Option<Decimal> {
        if let Some(amount) = request.contract_amount {
            return Some(amount);
        }
        self.estimate_amount(request)
    }

    pub fn estimate_for(&self, request: &StorageRequest) -> Result<Decimal, CoreError> {
        self.estimate_amount(request).ok_or_else(|| {
            CoreError::validation("request cannot be priced automatically")
        })
    }
}
