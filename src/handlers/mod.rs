// handlers/mod.rs - three security tiers
//
// Public (no auth) → Protected (Bearer access token) → Elevated (organization admin)

pub mod elevated;
pub mod protected;
pub mod public;
