pub mod error;
pub mod schema;
pub mod config;
pub mod ingestion;
pub mod units;
pub mod error_codes;
pub mod geo_distance;
pub mod trips;
pub mod trip_filters;
pub mod summary;
pub mod identity;
pub mod pipeline;
