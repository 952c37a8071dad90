use crate::payments::error::GatewayResult;
use crate::payments::types::{CreateOrderRequest, CreateOrderResponse, OrderStatusReport};
use async_trait::async_trait;
use chrono::NaiveDate;

/// Outbound side of the UPI gateway. Implementations perform network I/O and
/// must never be called while a store record is locked.
#[async_trait]
pub trait UpiGateway: Send + Sync {
    /// Register an order so the donor can pay through the gateway's page.
    async fn create_order(&self, request: CreateOrderRequest) -> GatewayResult<CreateOrderResponse>;

    /// Query the gateway's view of `order_id`, created on `txn_date`.
    async fn check_order_status(
        &self,
        order_id: &str,
        txn_date: NaiveDate,
    ) -> GatewayResult<OrderStatusReport>;

    fn name(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payments::types::{GatewayFields, GatewayStatus};

    struct MockGateway;

    #[async_trait]
    impl UpiGateway for MockGateway {
        async fn create_order(
            &self,
            request: CreateOrderRequest,
        ) -> GatewayResult<CreateOrderResponse> {
            Ok(CreateOrderResponse {
                gateway_order_id: Some("g-1".to_string()),
                payment_url: format!("https://pay.example/{}", request.client_txn_id),
            })
        }

        async fn check_order_status(
            &self,
            _order_id: &str,
            _txn_date: NaiveDate,
        ) -> GatewayResult<OrderStatusReport> {
            Ok(OrderStatusReport::Found {
                status: GatewayStatus::Success,
                fields: GatewayFields::default(),
            })
        }

        fn name(&self) -> &'static str {
            "mock"
        }
    }

    #[tokio::test]
    async fn trait_can_be_used_as_object() {
        let gateway: Box<dyn UpiGateway> = Box::new(MockGateway);
        let created = gateway
            .create_order(CreateOrderRequest {
                client_txn_id: "IIMT1".to_string(),
                amount: "500".to_string(),
                p_info: "Donation".to_string(),
                customer_name: "Asha Rao".to_string(),
                customer_email: String::new(),
                customer_mobile: "9876543210".to_string(),
            })
            .await
            .expect("order creation should succeed");
        assert_eq!(created.payment_url, "https://pay.example/IIMT1");

        let report = gateway
            .check_order_status("IIMT1", NaiveDate::from_ymd_opt(2024, 1, 5).unwrap())
            .await
            .unwrap();
        assert!(matches!(report, OrderStatusReport::Found { .. }));
    }
}
