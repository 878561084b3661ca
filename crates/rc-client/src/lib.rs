pub mod cache;
pub mod config;
pub mod error;
pub mod gateway;
pub mod generate;
pub mod identity;
pub mod session;
pub mod store;

pub use error::{GatewayError, SessionError};
pub use gateway::{HttpGateway, PipelineGateway};
pub use session::{GenerationSession, SessionPhase, SessionSnapshot};
