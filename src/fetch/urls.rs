// src/fetch/urls.rs
use url::Url;

/// Release prefix under which the monthly yellow-taxi files are published.
pub const TRIP_DATA_PREFIX: &str =
    "https://github.com/DataTalksClub/nyc-tlc-data/releases/download/yellow/";

pub const ZONE_LOOKUP_URL: &str =
    "https://github.com/DataTalksClub/nyc-tlc-data/releases/download/misc/taxi_zone_lookup.csv";

/// URL of the gzipped trip file for one month.
pub fn trip_data_url(year: u16, month: u8) -> String {
    format!(
        "{}yellow_tripdata_{}-{:02}.csv.gz",
        TRIP_DATA_PREFIX, year, month
    )
}

/// True if `location` is an http(s) URL rather than a local path.
pub fn is_remote(location: &str) -> bool {
    Url::parse(location)
        .map(|u| matches!(u.scheme(), "http" | "https"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trip_url_is_month_padded() {
        assert_eq!(
            trip_data_url(2021, 3),
            "https://github.com/DataTalksClub/nyc-tlc-data/releases/download/yellow/yellow_tripdata_2021-03.csv.gz"
        );
    }

    #[test]
    fn remote_detection() {
        assert!(is_remote(ZONE_LOOKUP_URL));
        assert!(is_remote("http://localhost:8080/zones.csv"));
        assert!(!is_remote("/data/zones.csv"));
        assert!(!is_remote("zones.csv"));
        assert!(!is_remote("file:///data/zones.csv"));
    }
}
