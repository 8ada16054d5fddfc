// ---------------------------------------------------------------------------
// Clair v1 advisory source
// ---------------------------------------------------------------------------
//
// Streams normalized advisories for one platform out of the two-phase Clair
// API: paginated summary listings, then a detail lookup per vulnerability.

mod clair;

pub use clair::{ClairApiV1, ClairStream};
