// Core types shared by every binding: errors, records, properties, outcomes.
pub mod error;
pub mod props;
pub mod record;
pub mod status;
