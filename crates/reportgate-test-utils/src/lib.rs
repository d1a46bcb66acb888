pub mod helpers;
pub mod mock_provider;

pub use helpers::*;
pub use mock_provider::{MockFailure, MockOutcome, MockProvider};
