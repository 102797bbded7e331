pub mod use_cases;

pub use use_cases::query_service::{AskRequest, QueryService};
pub use use_cases::understander::QueryUnderstander;
