/// Adapters - external-collaborator implementations
///
/// Reference implementations of the port traits, kept outside the core
/// coordinator boundary (§1, §6).
pub mod services;
