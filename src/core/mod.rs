pub mod buyer_seller;
pub mod cache;
pub mod cancel;
pub mod cascade;
pub mod connector;
pub mod matcher;
pub mod normalizer;
pub mod semantic;

pub use crate::domain::ports::{EmailProvider, RecordSource, Storage};
pub use crate::utils::error::Result;
