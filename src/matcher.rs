// 🎯 Matcher - join addresses to reference rows and validate
//
// An address is validated when at least one reference row with the same
// postcode string was in force on the registration date AND sits within
// the distance tolerance of the address coordinates.
//
// Join: hash index postcode → reference rows, then a per-address lookup.
// Output keeps input order and cardinality exactly.

use crate::normalizer::AddressRecord;
use crate::reference::PostcodeReference;
use chrono::NaiveDate;
use geo::{GeodesicDistance, Point};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Default coordinate tolerance in meters.
pub const DEFAULT_TOLERANCE_METERS: f64 = 1_000.0;

// ============================================================================
// PREDICATES
// ============================================================================

/// Half-open validity check: `introduced <= date < terminated`.
///
/// A missing registration or introduced date never matches. A missing
/// terminated date means the period is open-ended.
pub fn within_date_range(
    registration: Option<NaiveDate>,
    introduced: Option<NaiveDate>,
    terminated: Option<NaiveDate>,
) -> bool {
    let (Some(date), Some(start)) = (registration, introduced) else {
        return false;
    };

    match terminated {
        None => date >= start,
        Some(stop) => start <= date && date < stop,
    }
}

/// Geodesic distance in meters between two `(lat, lon)` pairs on the WGS84
/// ellipsoid.
pub fn geodesic_distance_meters(from: (f64, f64), to: (f64, f64)) -> f64 {
    let from = Point::new(from.1, from.0);
    let to = Point::new(to.1, to.0);
    from.geodesic_distance(&to)
}

/// Distance predicate. Any missing coordinate means not close.
pub fn coordinates_close(
    address: Option<(f64, f64)>,
    reference: Option<(f64, f64)>,
    tolerance_meters: f64,
) -> bool {
    match (address, reference) {
        (Some(a), Some(r)) => geodesic_distance_meters(a, r) <= tolerance_meters,
        _ => false,
    }
}

// ============================================================================
// POSTCODE INDEX
// ============================================================================

/// Postcode string → reference rows sharing it, in file order.
pub struct PostcodeIndex<'a> {
    by_postcode: HashMap<&'a str, Vec<&'a PostcodeReference>>,
}

impl<'a> PostcodeIndex<'a> {
    pub fn build(references: &'a [PostcodeReference]) -> Self {
        let mut by_postcode: HashMap<&'a str, Vec<&'a PostcodeReference>> = HashMap::new();
        for reference in references {
            by_postcode
                .entry(reference.postcode.as_str())
                .or_default()
                .push(reference);
        }

        PostcodeIndex { by_postcode }
    }

    /// Exact, case-sensitive lookup.
    pub fn lookup(&self, postcode: &str) -> &[&'a PostcodeReference] {
        self.by_postcode
            .get(postcode)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Number of distinct postcodes
    pub fn len(&self) -> usize {
        self.by_postcode.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_postcode.is_empty()
    }
}

// ============================================================================
// MATCH CANDIDATES
// ============================================================================

/// One address paired with one reference row of the same postcode.
#[derive(Debug, Clone)]
pub struct MatchCandidate<'a> {
    pub address: &'a AddressRecord,
    pub reference: &'a PostcodeReference,
    pub within_date_range: bool,
    pub coordinates_close: bool,
}

impl MatchCandidate<'_> {
    pub fn is_validating(&self) -> bool {
        self.within_date_range && self.coordinates_close
    }
}

/// Result of matching a single address.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchOutcome {
    pub validated: bool,
    /// Postcode of the chosen validating reference row
    pub postcode: Option<String>,
    /// Start of the chosen row's period
    pub introduced: Option<NaiveDate>,
    pub failure: Option<FailureReason>,
}

/// Why an address did not validate. Only used for run diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureReason {
    NoPostcode,
    NoReference,
    /// No candidate passed the date check
    OutOfDateRange,
    /// Some candidate had missing coordinates and none passed both checks
    MissingCoordinates,
    TooDistant,
}

// ============================================================================
// MATCHER
// ============================================================================

pub struct Matcher {
    /// Maximum geodesic distance in meters
    pub tolerance_meters: f64,
}

impl Matcher {
    pub fn new() -> Self {
        Matcher {
            tolerance_meters: DEFAULT_TOLERANCE_METERS,
        }
    }

    pub fn with_tolerance(tolerance_meters: f64) -> Self {
        Matcher { tolerance_meters }
    }

    /// Every reference row sharing the address postcode token, annotated
    /// with both predicates.
    pub fn candidates<'a>(
        &self,
        address: &'a AddressRecord,
        index: &PostcodeIndex<'a>,
    ) -> Vec<MatchCandidate<'a>> {
        let Some(postcode) = address.postcode.as_deref() else {
            return Vec::new();
        };

        index
            .lookup(postcode)
            .iter()
            .copied()
            .map(|reference| MatchCandidate {
                address,
                reference,
                within_date_range: within_date_range(
                    address.registration_date,
                    reference.introduced,
                    reference.terminated,
                ),
                coordinates_close: coordinates_close(
                    address.coordinates(),
                    reference.coordinates(),
                    self.tolerance_meters,
                ),
            })
            .collect()
    }

    /// Decide one address.
    ///
    /// When several reference rows validate, the earliest introduced one is
    /// reported (file order breaks ties). `min_by_key` keeps the first of
    /// equal keys.
    pub fn outcome(&self, address: &AddressRecord, index: &PostcodeIndex<'_>) -> MatchOutcome {
        if address.postcode.is_none() {
            return MatchOutcome::failed(FailureReason::NoPostcode);
        }

        let candidates = self.candidates(address, index);
        if candidates.is_empty() {
            return MatchOutcome::failed(FailureReason::NoReference);
        }

        let best = candidates
            .iter()
            .filter(|c| c.is_validating())
            .min_by_key(|c| c.reference.introduced);

        if let Some(candidate) = best {
            return MatchOutcome {
                validated: true,
                postcode: Some(candidate.reference.postcode.clone()),
                introduced: candidate.reference.introduced,
                failure: None,
            };
        }

        let reason = if !candidates.iter().any(|c| c.within_date_range) {
            FailureReason::OutOfDateRange
        } else if address.coordinates().is_none()
            || candidates
                .iter()
                .any(|c| c.within_date_range && c.reference.coordinates().is_none())
        {
            FailureReason::MissingCoordinates
        } else {
            FailureReason::TooDistant
        };

        MatchOutcome::failed(reason)
    }

    /// Validate every address against the reference table.
    ///
    /// Returns the records in input order with `validated` set and
    /// `postcode` replaced by the validating reference postcode (or `None`),
    /// plus a summary of outcomes.
    pub fn validate(
        &self,
        addresses: Vec<AddressRecord>,
        references: &[PostcodeReference],
    ) -> (Vec<AddressRecord>, ValidationSummary) {
        let index = PostcodeIndex::build(references);
        tracing::debug!(
            references = references.len(),
            postcodes = index.len(),
            "built postcode index"
        );

        let mut summary = ValidationSummary::default();
        let validated = addresses
            .into_iter()
            .map(|mut address| {
                let outcome = self.outcome(&address, &index);
                tracing::trace!(
                    row = address.row_index,
                    validated = outcome.validated,
                    failure = ?outcome.failure,
                    "matched address"
                );
                summary.record(&outcome);

                address.validated = outcome.validated;
                address.postcode = outcome.postcode;
                address
            })
            .collect();

        (validated, summary)
    }
}

impl Default for Matcher {
    fn default() -> Self {
        Self::new()
    }
}

impl MatchOutcome {
    fn failed(reason: FailureReason) -> Self {
        MatchOutcome {
            validated: false,
            postcode: None,
            introduced: None,
            failure: Some(reason),
        }
    }
}

/// Validate addresses with the given tolerance, keeping order and count.
pub fn validate(
    addresses: Vec<AddressRecord>,
    references: &[PostcodeReference],
    coordinate_tolerance_meters: f64,
) -> Vec<AddressRecord> {
    Matcher::with_tolerance(coordinate_tolerance_meters)
        .validate(addresses, references)
        .0
}

// ============================================================================
// SUMMARY
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationSummary {
    pub total: usize,
    pub validated: usize,
    pub no_postcode: usize,
    pub no_reference: usize,
    pub out_of_date_range: usize,
    pub missing_coordinates: usize,
    pub too_distant: usize,
}

impl ValidationSummary {
    fn record(&mut self, outcome: &MatchOutcome) {
        self.total += 1;
        match outcome.failure {
            None => self.validated += 1,
            Some(FailureReason::NoPostcode) => self.no_postcode += 1,
            Some(FailureReason::NoReference) => self.no_reference += 1,
            Some(FailureReason::OutOfDateRange) => self.out_of_date_range += 1,
            Some(FailureReason::MissingCoordinates) => self.missing_coordinates += 1,
            Some(FailureReason::TooDistant) => self.too_distant += 1,
        }
    }

    pub fn rejected(&self) -> usize {
        self.total - self.validated
    }

    pub fn summary(&self) -> String {
        format!(
            "{} addresses: {} validated, {} rejected (no postcode {}, unknown postcode {}, out of date range {}, missing coordinates {}, too distant {})",
            self.total,
            self.validated,
            self.rejected(),
            self.no_postcode,
            self.no_reference,
            self.out_of_date_range,
            self.missing_coordinates,
            self.too_distant
        )
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(y, m, d)
    }

    fn address(
        row_index: usize,
        postcode: Option<&str>,
        registered: Option<NaiveDate>,
        lat: Option<f64>,
        lon: Option<f64>,
    ) -> AddressRecord {
        AddressRecord {
            row_index,
            identifier: Some(row_index as i64 + 1),
            registration_date: registered,
            latitude: lat,
            longitude: lon,
            location: String::new(),
            postcode: postcode.map(str::to_string),
            validated: false,
        }
    }

    fn reference(
        postcode: &str,
        introduced: Option<NaiveDate>,
        terminated: Option<NaiveDate>,
        lat: f64,
        lon: f64,
    ) -> PostcodeReference {
        PostcodeReference {
            postcode: postcode.to_string(),
            introduced,
            terminated,
            latitude: Some(lat),
            longitude: Some(lon),
        }
    }

    #[test]
    fn test_date_boundary_open_ended() {
        let start = date(2002, 7, 1);

        assert!(within_date_range(date(2002, 7, 1), start, None));
        assert!(within_date_range(date(2030, 1, 1), start, None));
        assert!(!within_date_range(date(2002, 6, 30), start, None));
    }

    #[test]
    fn test_half_open_termination() {
        let start = date(1990, 1, 1);
        let stop = date(2010, 1, 1);

        assert!(within_date_range(date(1990, 1, 1), start, stop));
        assert!(within_date_range(date(2009, 12, 31), start, stop));
        assert!(!within_date_range(date(2010, 1, 1), start, stop));
        assert!(!within_date_range(date(2012, 4, 24), start, stop));
        assert!(!within_date_range(date(1989, 12, 31), start, stop));
    }

    #[test]
    fn test_missing_dates_never_in_range() {
        assert!(!within_date_range(None, date(1990, 1, 1), None));
        assert!(!within_date_range(date(2000, 1, 1), None, None));
        assert!(!within_date_range(date(2000, 1, 1), None, date(2010, 1, 1)));
    }

    #[test]
    fn test_geodesic_distance() {
        let d = geodesic_distance_meters((51.6155, 0.032659), (51.615593, 0.032658));
        assert!(d > 9.0 && d < 12.0, "distance was {}", d);

        let far = geodesic_distance_meters((51.5958, 0.074697), (51.598833, 0.013584));
        assert!(far > 4_000.0 && far < 4_500.0, "distance was {}", far);

        assert!(geodesic_distance_meters((51.5, 0.1), (51.5, 0.1)) < 1e-9);
    }

    #[test]
    fn test_distance_threshold_is_inclusive() {
        let a = (51.6155, 0.032659);
        let b = (51.615593, 0.032658);
        let d = geodesic_distance_meters(a, b);

        assert!(coordinates_close(Some(a), Some(b), d));
        assert!(!coordinates_close(Some(a), Some(b), d - 1e-6));
        assert!(coordinates_close(Some(a), Some(a), 0.0));
    }

    #[test]
    fn test_missing_coordinates_never_close() {
        let a = (51.6155, 0.032659);

        assert!(!coordinates_close(None, Some(a), f64::MAX));
        assert!(!coordinates_close(Some(a), None, f64::MAX));
        assert!(!coordinates_close(None, None, f64::MAX));
    }

    #[test]
    fn test_index_groups_duplicate_postcodes() {
        let references = vec![
            reference("IG4 1PU", date(1990, 1, 1), date(2010, 1, 1), 51.51, 0.03),
            reference("IG3 2PU", date(2010, 1, 1), None, 51.51, 0.03),
            reference("IG4 1PU", date(2010, 1, 1), None, 51.52, 0.03),
        ];
        let index = PostcodeIndex::build(&references);

        assert_eq!(index.len(), 2);
        assert_eq!(index.lookup("IG4 1PU").len(), 2);
        assert_eq!(index.lookup("IG4 1PU")[0].introduced, date(1990, 1, 1));
        assert!(index.lookup("ig4 1pu").is_empty());
        assert!(index.lookup("E18 2PP").is_empty());
    }

    #[test]
    fn test_valid_current_match() {
        let references = vec![
            reference("IG8 1NS", date(1980, 1, 1), date(2002, 7, 1), 51.615593, 0.032658),
            reference("IG8 0NS", date(2002, 7, 1), None, 51.615593, 0.032658),
        ];
        let addresses = vec![address(
            0,
            Some("IG8 0NS"),
            date(2012, 4, 24),
            Some(51.6155),
            Some(0.032659),
        )];

        let result = validate(addresses, &references, DEFAULT_TOLERANCE_METERS);

        assert!(result[0].validated);
        assert_eq!(result[0].postcode.as_deref(), Some("IG8 0NS"));
    }

    #[test]
    fn test_unknown_postcode_is_rejected_and_blanked() {
        let references = vec![reference("IG8 0NS", date(2002, 7, 1), None, 51.6, 0.03)];
        let addresses = vec![address(0, Some("Ilford"), date(2012, 4, 24), Some(51.6), Some(0.03))];

        let matcher = Matcher::new();
        let (result, summary) = matcher.validate(addresses, &references);

        assert!(!result[0].validated);
        assert_eq!(result[0].postcode, None);
        assert_eq!(summary.no_reference, 1);
    }

    #[test]
    fn test_out_of_date_range() {
        let references = vec![reference(
            "E18 2PP",
            date(1980, 1, 1),
            date(2002, 7, 1),
            51.598833,
            0.013584,
        )];
        let addresses = vec![address(0, Some("E18 2PP"), date(2012, 4, 24), Some(51.5988), Some(0.013589))];

        let (result, summary) = Matcher::new().validate(addresses, &references);

        assert!(!result[0].validated);
        assert_eq!(result[0].postcode, None);
        assert_eq!(summary.out_of_date_range, 1);
    }

    #[test]
    fn test_too_distant() {
        let references = vec![reference("E11 1PD", date(2002, 7, 1), None, 51.598833, 0.013584)];
        let addresses = vec![address(0, Some("E11 1PD"), date(2012, 4, 24), Some(51.5958), Some(0.074697))];

        let (result, summary) = Matcher::new().validate(addresses, &references);

        assert!(!result[0].validated);
        assert_eq!(summary.too_distant, 1);
    }

    #[test]
    fn test_missing_coordinate_cannot_validate() {
        let references = vec![
            reference("IG4 5PU", date(1980, 1, 1), None, 51.594421, 0.047404),
            PostcodeReference {
                latitude: None,
                ..reference("IG4 5PV", date(1980, 1, 1), None, 0.0, 0.047404)
            },
        ];
        let addresses = vec![
            address(0, Some("IG4 5PU"), date(2012, 4, 23), None, Some(0.047408)),
            address(1, Some("IG4 5PV"), date(2012, 4, 23), Some(51.594421), Some(0.047404)),
        ];

        let (result, summary) = Matcher::with_tolerance(f64::MAX).validate(addresses, &references);

        assert!(!result[0].validated);
        assert!(!result[1].validated);
        assert_eq!(summary.missing_coordinates, 2);
    }

    #[test]
    fn test_missing_postcode_token() {
        let references = vec![reference("IG8 0NS", date(2002, 7, 1), None, 51.6, 0.03)];
        let addresses = vec![address(0, None, date(2012, 4, 24), Some(51.6), Some(0.03))];

        let (result, summary) = Matcher::new().validate(addresses, &references);

        assert!(!result[0].validated);
        assert_eq!(summary.no_postcode, 1);
    }

    #[test]
    fn test_historic_match_among_several_periods() {
        let references = vec![
            reference("IG4 1PU", date(1990, 1, 1), date(2010, 1, 1), 51.511765, 0.035402),
            reference("IG4 1PU", date(2010, 1, 1), None, 51.511765, 0.035402),
        ];
        let addresses = vec![address(0, Some("IG4 1PU"), date(2000, 4, 23), Some(51.5117), Some(0.035408))];

        let matcher = Matcher::new();
        let index = PostcodeIndex::build(&references);
        let candidates = matcher.candidates(&addresses[0], &index);

        assert_eq!(candidates.len(), 2);
        assert!(candidates[0].is_validating());
        assert!(!candidates[1].within_date_range);
        assert!(candidates[1].coordinates_close);

        let outcome = matcher.outcome(&addresses[0], &index);
        assert!(outcome.validated);
        assert_eq!(outcome.postcode.as_deref(), Some("IG4 1PU"));
    }

    #[test]
    fn test_multiple_validating_rows_pick_earliest_introduced() {
        let references = vec![
            reference("N1 9GU", date(2001, 1, 1), None, 51.53, -0.12),
            reference("N1 9GU", date(1995, 1, 1), None, 51.53, -0.12),
        ];
        let addresses = vec![address(0, Some("N1 9GU"), date(2012, 1, 1), Some(51.53), Some(-0.12))];

        let index = PostcodeIndex::build(&references);
        let outcome = Matcher::new().outcome(&addresses[0], &index);
        assert!(outcome.validated);
        assert_eq!(outcome.introduced, date(1995, 1, 1));
        assert_eq!(outcome.postcode.as_deref(), Some("N1 9GU"));

        // One output row regardless of how many rows validated
        let (result, summary) = Matcher::new().validate(addresses, &references);
        assert_eq!(result.len(), 1);
        assert!(result[0].validated);
        assert_eq!(summary.validated, 1);
    }

    #[test]
    fn test_cardinality_and_order_preserved() {
        let references = vec![reference("IG8 0NS", date(2002, 7, 1), None, 51.615593, 0.032658)];
        let addresses: Vec<AddressRecord> = (0..5)
            .map(|i| address(i, Some("IG8 0NS"), date(2012, 4, 24), Some(51.6155), Some(0.032659)))
            .collect();

        let (result, summary) = Matcher::new().validate(addresses, &references);

        assert_eq!(result.len(), 5);
        assert!(result.iter().enumerate().all(|(i, r)| r.row_index == i));
        assert_eq!(summary.total, 5);
        assert_eq!(summary.validated, 5);
        assert_eq!(summary.rejected(), 0);
    }

    #[test]
    fn test_summary_text() {
        let summary = ValidationSummary {
            total: 6,
            validated: 2,
            no_postcode: 0,
            no_reference: 1,
            out_of_date_range: 1,
            missing_coordinates: 1,
            too_distant: 1,
        };

        assert_eq!(summary.rejected(), 4);
        assert!(summary.summary().starts_with("6 addresses: 2 validated, 4 rejected"));
    }
}
