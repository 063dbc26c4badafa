pub mod archive_kind;
pub mod forecast;
pub mod into_utc_trait;
pub mod quantity;
pub mod station;
pub mod timeseries;
