// Domain layer: records, matches, enrichment results and the ports the core talks through.

pub mod model;
pub mod ports;
