// handlers/mod.rs - Handler tiers
//
// Public (no token) → Protected (user or API token) → Elevated (global admin).
// The auth middleware resolves the caller for every tier; each handler checks
// the roles it needs.
pub mod elevated; // global admin endpoints
pub mod protected; // organization, user, token, notification and log endpoints
pub mod public; // token acquisition, account recovery and diagnostics
