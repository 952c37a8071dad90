pub mod error;
pub mod lifecycle;
pub mod order_id;
pub mod provider;
pub mod providers;
pub mod target;
pub mod types;
pub mod utils;

pub use error::{GatewayError, GatewayResult};
pub use lifecycle::{LifecycleEvent, TransitionError, TransitionPolicy};
pub use order_id::OrderIdGenerator;
pub use provider::UpiGateway;
pub use types::{GatewayFields, GatewayStatus, PaymentRecord, PaymentStatus};
