// TabKeeper shared type definitions
// Each submodule defines types used across the engine.

pub mod errors;
pub mod session;
pub mod settings;
pub mod tab;
