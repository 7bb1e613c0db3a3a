use log::info;
use std::collections::HashSet;

use crate::config::FeatureSettings;
use crate::core::domain::{
    DerivedFeatures, EnrichedSale, PriceCategory, PropertySale, SalesPeriod, Season,
};
use crate::parsing::values::{parse_quarter_label, parse_transaction_date, period_from_date};

/// Rupees in one crore
const RUPEES_PER_CRORE: f64 = 10_000_000.0;

/// Enricher for adding derived features to cleaned sale records
pub struct FeatureEnricher {
    settings: FeatureSettings,
    booked_statuses: HashSet<String>,
}

impl FeatureEnricher {
    pub fn new(settings: FeatureSettings) -> Self {
        let booked_statuses = settings
            .booked_statuses
            .iter()
            .map(|s| s.trim().to_lowercase())
            .collect();

        Self {
            settings,
            booked_statuses,
        }
    }

    /// Enrich every row, keeping input order.
    pub fn enrich(&self, rows: Vec<PropertySale>) -> Vec<EnrichedSale> {
        let enriched: Vec<EnrichedSale> = rows
            .into_iter()
            .map(|sale| {
                let features = self.derive(&sale);
                EnrichedSale { sale, features }
            })
            .collect();

        let booked = enriched.iter().filter(|e| e.features.is_booked()).count();
        let unknown_period = enriched.iter().filter(|e| e.features.period.is_none()).count();
        info!(
            "Feature engineering complete: {} rows, {} booked, {} without a sales period",
            enriched.len(),
            booked,
            unknown_period
        );

        enriched
    }

    /// Derive the features of a single record. Pure and deterministic.
    pub fn derive(&self, sale: &PropertySale) -> DerivedFeatures {
        let carpet_area_sqft = self.carpet_area(sale);
        let period = resolve_period(sale);

        DerivedFeatures {
            booking_flag: self.booking_flag(sale.booking_status.as_deref()),
            carpet_area_sqft,
            price_per_sqft: round2(sale.ticket_price_cr * RUPEES_PER_CRORE / carpet_area_sqft),
            period,
            price_category: PriceCategory::from_price(sale.ticket_price_cr),
            season: period.and_then(|p| p.quarter).and_then(Season::from_quarter),
        }
    }

    /// 1 when the status is one of the booked statuses, else 0.
    pub fn booking_flag(&self, status: Option<&str>) -> u8 {
        match status {
            Some(s) if self.booked_statuses.contains(&s.trim().to_lowercase()) => 1,
            _ => 0,
        }
    }

    /// Source carpet area, else the configuration estimate, else the default.
    ///
    /// An exact configuration match wins; otherwise the longest known
    /// configuration contained in the value is used (`3BHK DUPLEX` -> `3BHK`).
    pub fn carpet_area(&self, sale: &PropertySale) -> f64 {
        if let Some(area) = sale.carpet_area_sqft.filter(|a| *a > 0.0) {
            return area;
        }

        let table = &self.settings.carpet_area_by_configuration;
        let Some(config) = sale.configuration.as_deref().map(str::to_uppercase) else {
            return self.settings.default_carpet_area_sqft;
        };

        if let Some(area) = table.get(&config) {
            return *area;
        }

        table
            .iter()
            .filter(|(pattern, _)| config.contains(pattern.as_str()))
            .max_by_key(|(pattern, _)| pattern.len())
            .map(|(_, area)| *area)
            .unwrap_or(self.settings.default_carpet_area_sqft)
    }
}

/// Derive features for cleaned rows with the given settings.
pub fn derive_features(rows: Vec<PropertySale>, settings: &FeatureSettings) -> Vec<EnrichedSale> {
    FeatureEnricher::new(settings.clone()).enrich(rows)
}

/// Quarter label first; a transaction date fills in when the label is absent
/// or lacks a quarter.
fn resolve_period(sale: &PropertySale) -> Option<SalesPeriod> {
    let from_label = sale.purchase_quarter.as_deref().and_then(parse_quarter_label);
    if matches!(from_label, Some(SalesPeriod { quarter: Some(_), .. })) {
        return from_label;
    }

    let from_date = sale
        .transaction_date
        .as_deref()
        .and_then(parse_transaction_date)
        .map(period_from_date);

    from_date.or(from_label)
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
