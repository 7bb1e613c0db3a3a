use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::core::domain::{EnrichedSale, UNKNOWN_PERIOD};

/// Booking figures for one segment (micro market, developer or period)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SegmentMeasures {
    pub projects: usize,
    pub bookings: usize,
    pub revenue_cr: f64,
    pub conversion_rate: f64,
}

impl SegmentMeasures {
    fn add(&mut self, row: &EnrichedSale) {
        self.projects += 1;
        if row.features.is_booked() {
            self.bookings += 1;
            self.revenue_cr += row.sale.ticket_price_cr;
        }
    }

    fn finish(&mut self) {
        self.revenue_cr = round2(self.revenue_cr);
        self.conversion_rate = rate(self.bookings, self.projects);
    }
}

/// Dataset-level conversion measures over the exported rows
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DashboardMeasures {
    pub total_projects: usize,
    pub total_bookings: usize,
    /// Sum of ticket prices of booked rows only
    pub total_revenue_cr: f64,
    /// `total_bookings / total_projects`, 0 when there are no rows
    pub conversion_rate: f64,
    pub avg_ticket_price_cr: Option<f64>,
    pub min_ticket_price_cr: Option<f64>,
    pub max_ticket_price_cr: Option<f64>,
    pub avg_amenity_score: Option<f64>,
    pub unique_micro_markets: usize,
    pub unique_developers: usize,
    pub by_micro_market: BTreeMap<String, SegmentMeasures>,
    pub by_developer: BTreeMap<String, SegmentMeasures>,
    pub by_period: BTreeMap<String, SegmentMeasures>,
}

/// Compute dashboard measures over enriched rows
///
/// # Arguments
/// * `rows` - Rows as they are exported
///
/// # Returns
/// DashboardMeasures with totals and per-segment breakdowns
pub fn compute_measures(rows: &[EnrichedSale]) -> DashboardMeasures {
    let mut measures = DashboardMeasures {
        total_projects: rows.len(),
        ..Default::default()
    };

    let mut markets = BTreeSet::new();
    let mut developers = BTreeSet::new();
    let mut price_sum = 0.0;
    let mut amenity_sum = 0.0;
    let mut amenity_count = 0usize;

    for row in rows {
        let sale = &row.sale;
        let price = sale.ticket_price_cr;

        if row.features.is_booked() {
            measures.total_bookings += 1;
            measures.total_revenue_cr += price;
        }

        price_sum += price;
        measures.min_ticket_price_cr = Some(measures.min_ticket_price_cr.map_or(price, |m| m.min(price)));
        measures.max_ticket_price_cr = Some(measures.max_ticket_price_cr.map_or(price, |m| m.max(price)));

        if let Some(score) = sale.amenity_score {
            amenity_sum += score;
            amenity_count += 1;
        }

        if let Some(market) = &sale.micro_market {
            markets.insert(market.as_str());
        }
        if let Some(developer) = &sale.developer_name {
            developers.insert(developer.as_str());
        }

        segment(&mut measures.by_micro_market, sale.micro_market.as_deref()).add(row);
        segment(&mut measures.by_developer, sale.developer_name.as_deref()).add(row);
        measures
            .by_period
            .entry(row.features.period_label())
            .or_default()
            .add(row);
    }

    measures.total_revenue_cr = round2(measures.total_revenue_cr);
    measures.conversion_rate = rate(measures.total_bookings, measures.total_projects);
    if !rows.is_empty() {
        measures.avg_ticket_price_cr = Some(round2(price_sum / rows.len() as f64));
    }
    if amenity_count > 0 {
        measures.avg_amenity_score = Some(round2(amenity_sum / amenity_count as f64));
    }
    measures.unique_micro_markets = markets.len();
    measures.unique_developers = developers.len();

    for segments in [
        &mut measures.by_micro_market,
        &mut measures.by_developer,
        &mut measures.by_period,
    ] {
        segments.values_mut().for_each(SegmentMeasures::finish);
    }

    measures
}

fn segment<'a>(
    segments: &'a mut BTreeMap<String, SegmentMeasures>,
    key: Option<&str>,
) -> &'a mut SegmentMeasures {
    segments
        .entry(key.unwrap_or(UNKNOWN_PERIOD).to_string())
        .or_default()
}

fn rate(part: usize, total: usize) -> f64 {
    if total > 0 {
        part as f64 / total as f64
    } else {
        0.0
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FeatureSettings;
    use crate::core::domain::PropertySale;
    use crate::preprocessing::enricher::FeatureEnricher;

    fn row(id: &str, market: &str, price: f64, status: &str, quarter: &str) -> EnrichedSale {
        let mut sale = PropertySale::new(2, id, price);
        sale.micro_market = Some(market.to_string());
        sale.developer_name = Some("Prestige".to_string());
        sale.booking_status = Some(status.to_string());
        sale.purchase_quarter = Some(quarter.to_string());
        sale.amenity_score = Some(8.0);

        let features = FeatureEnricher::new(FeatureSettings::default()).derive(&sale);
        EnrichedSale { sale, features }
    }

    #[test]
    fn test_compute_measures_empty() {
        let measures = compute_measures(&[]);
        assert_eq!(measures.total_projects, 0);
        assert_eq!(measures.conversion_rate, 0.0);
        assert_eq!(measures.avg_ticket_price_cr, None);
        assert!(measures.by_period.is_empty());
    }

    #[test]
    fn test_revenue_counts_booked_rows_only() {
        let rows = vec![
            row("P1", "Whitefield", 4.0, "Booked", "Q1 2024"),
            row("P2", "Whitefield", 6.0, "Not Booked", "Q1 2024"),
            row("P3", "Hebbal", 10.0, "Sold", "Q2 2024"),
        ];
        let measures = compute_measures(&rows);

        assert_eq!(measures.total_projects, 3);
        assert_eq!(measures.total_bookings, 2);
        assert_eq!(measures.total_revenue_cr, 14.0);
        assert!((measures.conversion_rate - 2.0 / 3.0).abs() < 1e-12);
        assert_eq!(measures.avg_ticket_price_cr, Some(6.67));
        assert_eq!(measures.min_ticket_price_cr, Some(4.0));
        assert_eq!(measures.max_ticket_price_cr, Some(10.0));
        assert_eq!(measures.unique_micro_markets, 2);
        assert_eq!(measures.unique_developers, 1);
    }

    #[test]
    fn test_segment_breakdowns_are_sorted_by_key() {
        let rows = vec![
            row("P1", "Whitefield", 4.0, "Booked", "Q2 2024"),
            row("P2", "Hebbal", 6.0, "Not Booked", "Q1 2024"),
        ];
        let measures = compute_measures(&rows);

        let markets: Vec<&str> = measures.by_micro_market.keys().map(String::as_str).collect();
        assert_eq!(markets, vec!["Hebbal", "Whitefield"]);

        let periods: Vec<&str> = measures.by_period.keys().map(String::as_str).collect();
        assert_eq!(periods, vec!["2024-Q1", "2024-Q2"]);

        let whitefield = &measures.by_micro_market["Whitefield"];
        assert_eq!(whitefield.bookings, 1);
        assert_eq!(whitefield.conversion_rate, 1.0);
        assert_eq!(whitefield.revenue_cr, 4.0);
    }

    #[test]
    fn test_missing_segment_key_groups_as_unknown() {
        let mut r = row("P1", "Whitefield", 4.0, "Booked", "Q2 2024");
        r.sale.micro_market = None;
        let measures = compute_measures(&[r]);

        assert_eq!(measures.unique_micro_markets, 0);
        assert_eq!(measures.by_micro_market["Unknown"].projects, 1);
    }
}
