// ============================================================================
// Validation Module
// Inbound order requests and the rules they must pass before matching
// ============================================================================

mod request;
mod validator;

pub use request::OrderRequest;
pub use validator::{is_time_in_force_legal, OrderValidator};
