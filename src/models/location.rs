use serde::{Deserialize, Deserializer, Serialize};

/// IP-derived geolocation as reported by the location endpoint
///
/// Coordinates that are not JSON numbers deserialize as missing, so a
/// malformed record is kept and later rejected by [`LocationRecord::is_valid`]
/// instead of failing the whole response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationRecord {
    #[serde(default)]
    pub ip_address: String,
    #[serde(default, deserialize_with = "numeric_only")]
    pub latitude: Option<f64>,
    #[serde(default, deserialize_with = "numeric_only")]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub isp: Option<String>,
}

impl LocationRecord {
    pub fn new(ip_address: impl Into<String>, latitude: f64, longitude: f64) -> Self {
        LocationRecord {
            ip_address: ip_address.into(),
            latitude: Some(latitude),
            longitude: Some(longitude),
            city: None,
            country: None,
            isp: None,
        }
    }

    /// Both coordinates present and finite, and neither equal to the zero
    /// sentinel the geolocation backend uses for "unknown".
    pub fn is_valid(&self) -> bool {
        self.coordinates().is_some()
    }

    /// The coordinate pair, if the record is valid
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lon))
                if lat.is_finite() && lon.is_finite() && lat != 0.0 && lon != 0.0 =>
            {
                Some((lat, lon))
            }
            _ => None,
        }
    }

    /// "City, Country" with placeholders for missing parts
    pub fn display_place(&self) -> String {
        format!(
            "{}, {}",
            self.city.as_deref().unwrap_or("Unknown City"),
            self.country.as_deref().unwrap_or("Unknown Country")
        )
    }
}

fn numeric_only<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| v.as_f64()))
}
