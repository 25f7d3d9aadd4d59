pub mod dtos;
pub mod handlers;
pub mod ops;
pub mod routes;
pub mod service;
pub mod step_up;

pub use ops::AdminOp;
pub use service::AccessGate;
pub use step_up::StepUpService;
