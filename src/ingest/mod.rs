/// Data-source ingestion: delimited-text parsing of daily meter and weather
/// files, plus representative fixture payloads for tests.

pub mod fixtures;
pub mod readings;
