use chrono::{Datelike, Utc};
use std::fmt::{Display, Formatter};
use std::time::Duration;

/// Declination lookup failures. None of these are fatal: the caller keeps
/// the declination it already has.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchError {
    Timeout,
    Http(u16),
    Parse(String),
    NoPosition,
    Other(String),
}

impl Display for FetchError {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            FetchError::Timeout => write!(f, "Declination service timed out"),
            FetchError::Http(code) => write!(f, "HTTP error: {}", code),
            FetchError::Parse(msg) => write!(f, "Parse error: {}", msg),
            FetchError::NoPosition => write!(f, "No fresh position to look up"),
            FetchError::Other(msg) => write!(f, "Unknown error: {}", msg),
        }
    }
}

impl std::error::Error for FetchError {}

/// Magnetic declination from the NOAA geomagnetic calculator (CSV output).
pub struct DeclinationFetcher {
    client: reqwest::Client,
    base_url: String,
    key: Option<String>,
}

impl DeclinationFetcher {
    pub fn new(base_url: &str, key: Option<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("marine_nav/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        DeclinationFetcher {
            client,
            base_url: base_url.to_string(),
            key,
        }
    }

    fn build_url(&self, lat: f64, lon: f64, month: u32, year: i32) -> String {
        let mut url = format!(
            "{}?lat1={:.6}&lon1={:.6}&resultFormat=csv&startMonth={}&startYear={}",
            self.base_url, lat, lon, month, year
        );
        if let Some(key) = &self.key {
            url.push_str("&key=");
            url.push_str(key);
        }
        url
    }

    /// Declination in degrees for `position` (signed decimal degrees) today.
    pub async fn fetch(&self, position: Option<(f64, f64)>) -> Result<f64, FetchError> {
        let (lat, lon) = position.ok_or(FetchError::NoPosition)?;
        let today = Utc::now();
        let url = self.build_url(lat, lon, today.month(), today.year());

        let response = match self.client.get(&url).send().await {
            Ok(resp) => resp,
            Err(e) => {
                if e.is_timeout() {
                    return Err(FetchError::Timeout);
                }
                return Err(FetchError::Other(e.to_string()));
            }
        };

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Http(status.as_u16()));
        }

        let body = response.text().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout
            } else {
                FetchError::Other(format!("Failed to read response: {}", e))
            }
        })?;

        parse_declination_csv(&body)
    }

    /// Look up declination, falling back to `stored` on any failure.
    pub async fn resolve(&self, position: Option<(f64, f64)>, stored: f64) -> f64 {
        match self.fetch(position).await {
            Ok(declination) => {
                log::info!("[calibration] declination {:.2}° from lookup", declination);
                declination
            }
            Err(e) => {
                log::warn!(
                    "[calibration] declination lookup failed ({}), keeping {:.2}°",
                    e,
                    stored
                );
                stored
            }
        }
    }
}

/// Fifth column of the last data line. Comment lines start with `#`.
pub fn parse_declination_csv(body: &str) -> Result<f64, FetchError> {
    let line = body
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .last()
        .ok_or_else(|| FetchError::Parse("empty response".to_string()))?;

    let column = line
        .split(',')
        .nth(4)
        .ok_or_else(|| FetchError::Parse(format!("too few columns in '{}'", line)))?;

    let value: f64 = column
        .trim()
        .parse()
        .map_err(|_| FetchError::Parse(format!("not a number: '{}'", column.trim())))?;

    if !value.is_finite() || value.abs() > 180.0 {
        return Err(FetchError::Parse(format!("declination out of range: {}", value)));
    }
    Ok(value)
}
