/// Router Module Index
///
/// The gateway serves very few routes itself; everything else falls through to
/// the page application. Access control is not attached per module: the access
/// gate wraps the whole router and decides before any of these handlers run.

/// Routes served to browsers (home redirect, health).
pub mod public;

/// JSON routes under `/api`, which the exclusion list keeps out of the gate.
pub mod api;
