// handlers/public/mod.rs - Public handlers (no authentication required)
//
// Token acquisition, account recovery and diagnostics. Handlers in this tier
// still receive the RequestContext; a signed in caller changes the behavior of
// signup and the OAuth callbacks, but nothing here demands one.
//
// Route Prefix: /api/v1/auth/*, /api/v1/{version,notfound,boom}

pub mod auth; // Session tokens and password recovery
pub mod utility; // Version and error diagnostics
