pub mod upi_gateway;

pub use upi_gateway::{UpiGatewayClient, UpiGatewayConfig};
