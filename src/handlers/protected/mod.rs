// handlers/protected/mod.rs - Handlers for signed in callers
//
// Security Level: user or client token required (checked per handler)
// Route Prefix: /api/v1
//
// Every handler receives the RequestContext resolved by the auth middleware and
// enforces its own role and organization requirements before touching storage.

pub mod account; // /auth endpoints that act on the signed in account
pub mod logs; // GET /logs
pub mod notifications; // /notifications
pub mod organizations; // /organizations and invites
pub mod tokens; // /tokens
pub mod users; // /users
