//! Map markers from IP geolocation records
//!
//! Records are grouped by exact coordinate equality: two records whose
//! coordinates differ by a single ulp land on different markers. There is
//! no proximity clustering.

use crate::models::LocationRecord;
use serde::Serialize;
use std::collections::HashMap;

/// One map marker: every valid record sharing a coordinate pair
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LocationMarker {
    pub latitude: f64,
    pub longitude: f64,
    members: Vec<LocationRecord>,
}

impl LocationMarker {
    pub fn members(&self) -> &[LocationRecord] {
        &self.members
    }

    pub fn count(&self) -> usize {
        self.members.len()
    }

    /// More than one record at this location
    pub fn is_clustered(&self) -> bool {
        self.members.len() > 1
    }

    /// Popup heading
    pub fn title(&self) -> String {
        if self.is_clustered() {
            format!("{} IPs at this Location", self.count())
        } else {
            "IP Location".to_string()
        }
    }

    /// Popup detail, one block per member
    pub fn member_lines(&self) -> Vec<String> {
        self.members
            .iter()
            .map(|m| {
                let mut line = format!("IP: {} - {}", m.ip_address, m.display_place());
                if let Some(ref isp) = m.isp {
                    line.push_str(&format!(" (ISP: {})", isp));
                }
                line
            })
            .collect()
    }

    /// Coordinates in `[lon, lat]` order, as map libraries expect
    pub fn lng_lat(&self) -> [f64; 2] {
        [self.longitude, self.latitude]
    }
}

/// Result of one aggregation pass
#[derive(Debug, Clone, Default, Serialize)]
pub struct Aggregation {
    pub markers: Vec<LocationMarker>,
    /// Records dropped for invalid coordinates
    pub skipped: usize,
}

impl Aggregation {
    pub fn total_records(&self) -> usize {
        self.markers.iter().map(|m| m.count()).sum()
    }
}

/// Drop invalid records and group the rest into markers, in order of first
/// appearance.
pub fn aggregate<I>(records: I) -> Aggregation
where
    I: IntoIterator<Item = LocationRecord>,
{
    let mut markers: Vec<LocationMarker> = Vec::new();
    // f64 bit patterns: valid coordinates exclude NaN and zero, so bit
    // equality and value equality agree
    let mut index: HashMap<(u64, u64), usize> = HashMap::new();
    let mut skipped = 0;

    for record in records {
        let (latitude, longitude) = match record.coordinates() {
            Some(coords) => coords,
            None => {
                log::debug!(
                    "Skipping location for {}: invalid coordinates ({:?}, {:?})",
                    record.ip_address,
                    record.latitude,
                    record.longitude
                );
                skipped += 1;
                continue;
            }
        };

        let key = (latitude.to_bits(), longitude.to_bits());
        match index.get(&key) {
            Some(&i) => markers[i].members.push(record),
            None => {
                index.insert(key, markers.len());
                markers.push(LocationMarker {
                    latitude,
                    longitude,
                    members: vec![record],
                });
            }
        }
    }

    if skipped > 0 {
        log::debug!("Filtered out {} invalid location(s)", skipped);
    }

    Aggregation { markers, skipped }
}

/// Markers only, for callers that do not need diagnostics
pub fn aggregate_locations<I>(records: I) -> Vec<LocationMarker>
where
    I: IntoIterator<Item = LocationRecord>,
{
    aggregate(records).markers
}

/// Bounding box of a set of markers, used to fit a map view
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MarkerBounds {
    pub min_latitude: f64,
    pub min_longitude: f64,
    pub max_latitude: f64,
    pub max_longitude: f64,
}

impl MarkerBounds {
    pub fn from_markers(markers: &[LocationMarker]) -> Option<Self> {
        let first = markers.first()?;
        let start = MarkerBounds {
            min_latitude: first.latitude,
            min_longitude: first.longitude,
            max_latitude: first.latitude,
            max_longitude: first.longitude,
        };
        Some(markers[1..].iter().fold(start, |b, m| MarkerBounds {
            min_latitude: b.min_latitude.min(m.latitude),
            min_longitude: b.min_longitude.min(m.longitude),
            max_latitude: b.max_latitude.max(m.latitude),
            max_longitude: b.max_longitude.max(m.longitude),
        }))
    }

    pub fn center(&self) -> (f64, f64) {
        (
            (self.min_latitude + self.max_latitude) / 2.0,
            (self.min_longitude + self.max_longitude) / 2.0,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(ip: &str, lat: f64, lon: f64) -> LocationRecord {
        LocationRecord::new(ip, lat, lon)
    }

    #[test]
    fn test_groups_by_exact_coordinates() {
        let records = vec![
            rec("1.1.1.1", 1.0, 2.0),
            rec("1.1.1.2", 1.0, 2.0),
            rec("3.3.3.3", 3.0, 4.0),
            rec("0.0.0.0", 0.0, 0.0),
        ];

        let result = aggregate(records);
        assert_eq!(result.markers.len(), 2);
        assert_eq!(result.skipped, 1);

        let first = &result.markers[0];
        assert_eq!((first.latitude, first.longitude), (1.0, 2.0));
        assert_eq!(first.count(), 2);
        assert!(first.is_clustered());

        let second = &result.markers[1];
        assert_eq!((second.latitude, second.longitude), (3.0, 4.0));
        assert_eq!(second.count(), 1);
        assert!(!second.is_clustered());
        assert_eq!(result.total_records(), 3);
    }

    #[test]
    fn test_one_ulp_apart_is_distinct() {
        let lat = 48.8566_f64;
        let next = f64::from_bits(lat.to_bits() + 1);
        let markers = aggregate_locations(vec![rec("a", lat, 2.35), rec("b", next, 2.35)]);
        assert_eq!(markers.len(), 2);
    }

    #[test]
    fn test_drops_missing_and_non_finite() {
        let mut missing = rec("x", 10.0, 10.0);
        missing.longitude = None;
        let result = aggregate(vec![missing, rec("y", f64::NAN, 1.0), rec("z", 5.0, 6.0)]);
        assert_eq!(result.skipped, 2);
        assert_eq!(result.markers.len(), 1);
    }

    #[test]
    fn test_marker_keys_unique() {
        let records: Vec<_> = (0..50)
            .map(|i| rec(&format!("10.0.0.{}", i), 1.0 + (i % 7) as f64, 2.0))
            .collect();
        let markers = aggregate_locations(records);
        assert_eq!(markers.len(), 7);
        for (i, a) in markers.iter().enumerate() {
            for b in &markers[i + 1..] {
                assert!(a.latitude != b.latitude || a.longitude != b.longitude);
            }
        }
    }

    #[test]
    fn test_popup_text() {
        let mut with_isp = rec("8.8.8.8", 37.4, -122.1);
        with_isp.city = Some("Mountain View".to_string());
        with_isp.country = Some("United States".to_string());
        with_isp.isp = Some("Google LLC".to_string());
        let markers = aggregate_locations(vec![with_isp, rec("8.8.4.4", 37.4, -122.1)]);

        let marker = &markers[0];
        assert_eq!(marker.title(), "2 IPs at this Location");
        assert_eq!(
            marker.member_lines(),
            vec![
                "IP: 8.8.8.8 - Mountain View, United States (ISP: Google LLC)".to_string(),
                "IP: 8.8.4.4 - Unknown City, Unknown Country".to_string(),
            ]
        );
        assert_eq!(marker.lng_lat(), [-122.1, 37.4]);
    }

    #[test]
    fn test_bounds() {
        assert!(MarkerBounds::from_markers(&[]).is_none());

        let markers = aggregate_locations(vec![
            rec("a", 10.0, -20.0),
            rec("b", -5.0, 40.0),
            rec("c", 30.0, 5.0),
        ]);
        let bounds = MarkerBounds::from_markers(&markers).unwrap();
        assert_eq!(bounds.min_latitude, -5.0);
        assert_eq!(bounds.max_latitude, 30.0);
        assert_eq!(bounds.min_longitude, -20.0);
        assert_eq!(bounds.max_longitude, 40.0);
        assert_eq!(bounds.center(), (12.5, 10.0));
    }
}
