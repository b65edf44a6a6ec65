pub mod auth_stage;
pub mod backend_identity;
pub mod ready_status;

pub use auth_stage::AuthStage;
pub use backend_identity::BackendIdentity;
pub use ready_status::ReadyStatus;
