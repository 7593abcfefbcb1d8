// Adapters layer: concrete implementations for external systems (files, storage, provider APIs).

pub mod export;
pub mod loader;
pub mod providers;
pub mod storage;
