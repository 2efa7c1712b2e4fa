// TabKeeper state managers
// Managers own persisted state and the pure logic that decides how it changes.

pub mod session_store;
pub mod tab_matcher;
