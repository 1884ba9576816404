pub mod audit;
pub mod balance;
pub mod error;
pub mod guards;
pub mod leave_type;
pub mod policy;
pub mod request;
pub mod service;
pub mod store;
pub mod time;
pub mod units;
pub mod utils;

pub use error::{EngineError, ErrorKind};
pub use service::LeaveService;
