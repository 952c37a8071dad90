use crate::payments::error::{GatewayError, GatewayResult};
use crate::payments::provider::UpiGateway;
use crate::payments::types::{
    CreateOrderRequest, CreateOrderResponse, GatewayFields, GatewayStatus, OrderStatusReport,
};
use crate::payments::utils::PaymentHttpClient;
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::Value as JsonValue;
use std::time::Duration;
use tracing::{debug, info};

const PROVIDER: &str = "upi_gateway";

pub const DEFAULT_GATEWAY_BASE_URL: &str = "https://api.ekqr.in/api";

#[derive(Debug, Clone)]
pub struct UpiGatewayConfig {
    pub api_key: String,
    pub base_url: String,
    /// Where the gateway sends the donor's browser after payment.
    pub redirect_url: Option<String>,
    /// Passed as `udf1`; the gateway posts status callbacks there.
    pub webhook_url: Option<String>,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

impl Default for UpiGatewayConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: DEFAULT_GATEWAY_BASE_URL.to_string(),
            redirect_url: None,
            webhook_url: None,
            timeout_secs: 15,
            max_retries: 2,
        }
    }
}

/// Client for the hosted UPI collection gateway (`/create_order`,
/// `/check_order_status`).
pub struct UpiGatewayClient {
    config: UpiGatewayConfig,
    http: PaymentHttpClient,
}

impl UpiGatewayClient {
    pub fn new(config: UpiGatewayConfig) -> GatewayResult<Self> {
        if config.api_key.trim().is_empty() {
            return Err(GatewayError::NotConfigured {
                message: "gateway API key is empty".to_string(),
            });
        }
        let http =
            PaymentHttpClient::new(Duration::from_secs(config.timeout_secs), config.max_retries)?;
        Ok(Self { config, http })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }
}

/// Gateway's `DD-MM-YYYY` date format for status queries.
pub fn format_txn_date(date: NaiveDate) -> String {
    date.format("%d-%m-%Y").to_string()
}

#[async_trait]
impl UpiGateway for UpiGatewayClient {
    async fn create_order(
        &self,
        request: CreateOrderRequest,
    ) -> GatewayResult<CreateOrderResponse> {
        let payload = serde_json::json!({
            "key": self.config.api_key,
            "client_txn_id": request.client_txn_id,
            "amount": request.amount,
            "p_info": request.p_info,
            "customer_name": request.customer_name,
            "customer_email": request.customer_email,
            "customer_mobile": request.customer_mobile,
            "redirect_url": self.config.redirect_url.clone().unwrap_or_default(),
            "udf1": self.config.webhook_url.clone().unwrap_or_default(),
        });

        let raw: GatewayEnvelope<CreateOrderData> = self
            .http
            .post_json(PROVIDER, &self.endpoint("/create_order"), &payload)
            .await?;

        let response = interpret_create_response(raw)?;
        info!(
            order_id = %request.client_txn_id,
            gateway_order_id = ?response.gateway_order_id,
            "gateway order registered"
        );
        Ok(response)
    }

    async fn check_order_status(
        &self,
        order_id: &str,
        txn_date: NaiveDate,
    ) -> GatewayResult<OrderStatusReport> {
        let payload = serde_json::json!({
            "key": self.config.api_key,
            "client_txn_id": order_id,
            "txn_date": format_txn_date(txn_date),
        });

        let raw: GatewayEnvelope<OrderStatusData> = self
            .http
            .post_json(PROVIDER, &self.endpoint("/check_order_status"), &payload)
            .await?;

        let report = interpret_status_response(raw)?;
        debug!(order_id, report = ?report, "gateway status fetched");
        Ok(report)
    }

    fn name(&self) -> &'static str {
        PROVIDER
    }
}

#[derive(Debug, Deserialize)]
struct GatewayEnvelope<T> {
    status: bool,
    #[serde(default)]
    msg: Option<String>,
    data: Option<T>,
    /// Some gateway versions return the URL at the top level.
    #[serde(default)]
    payment_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CreateOrderData {
    #[serde(default)]
    order_id: Option<JsonValue>,
    #[serde(default)]
    payment_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OrderStatusData {
    #[serde(default)]
    id: Option<JsonValue>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    gateway_txn_id: Option<String>,
    #[serde(default)]
    upi_txn_id: Option<String>,
    #[serde(default)]
    customer_vpa: Option<String>,
    #[serde(default)]
    remark: Option<String>,
}

fn json_to_string(value: Option<JsonValue>) -> Option<String> {
    match value? {
        JsonValue::String(s) if !s.trim().is_empty() => Some(s),
        JsonValue::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn interpret_create_response(
    raw: GatewayEnvelope<CreateOrderData>,
) -> GatewayResult<CreateOrderResponse> {
    if !raw.status {
        return Err(GatewayError::ProviderError {
            provider: PROVIDER.to_string(),
            message: raw
                .msg
                .unwrap_or_else(|| "gateway refused the order".to_string()),
            provider_code: None,
            retryable: false,
        });
    }

    let (gateway_order_id, nested_url) = match raw.data {
        Some(data) => (json_to_string(data.order_id), data.payment_url),
        None => (None, None),
    };
    let payment_url = non_blank(nested_url)
        .or_else(|| non_blank(raw.payment_url))
        .ok_or_else(|| GatewayError::InvalidResponse {
            message: "gateway response carried no payment_url".to_string(),
        })?;

    Ok(CreateOrderResponse {
        gateway_order_id,
        payment_url,
    })
}

fn interpret_status_response(
    raw: GatewayEnvelope<OrderStatusData>,
) -> GatewayResult<OrderStatusReport> {
    // `status: false` is how the gateway says it has no such order yet.
    if !raw.status {
        return Ok(OrderStatusReport::NotFound {
            message: raw.msg.unwrap_or_else(|| "order not found".to_string()),
        });
    }

    let data = raw.data.ok_or_else(|| GatewayError::InvalidResponse {
        message: "status response carried no data".to_string(),
    })?;
    let status = data
        .status
        .as_deref()
        .map(GatewayStatus::from_gateway)
        .unwrap_or_else(|| GatewayStatus::Pending("unknown".to_string()));

    Ok(OrderStatusReport::Found {
        status,
        fields: GatewayFields {
            gateway_payment_id: json_to_string(data.id),
            gateway_txn_id: non_blank(data.gateway_txn_id).or_else(|| non_blank(data.upi_txn_id)),
            customer_vpa: non_blank(data.customer_vpa),
            remark: non_blank(data.remark),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse<T: serde::de::DeserializeOwned>(body: &str) -> GatewayEnvelope<T> {
        serde_json::from_str(body).unwrap()
    }

    #[test]
    fn txn_date_uses_day_month_year() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 7).unwrap();
        assert_eq!(format_txn_date(date), "07-03-2024");
    }

    #[test]
    fn client_requires_api_key() {
        let err = UpiGatewayClient::new(UpiGatewayConfig::default()).err();
        assert!(matches!(err, Some(GatewayError::NotConfigured { .. })));
    }

    #[test]
    fn create_response_reads_nested_or_top_level_url() {
        let nested = parse::<CreateOrderData>(
            r#"{"status":true,"msg":"ok","data":{"order_id":9912,"payment_url":"https://pay.example/x"}}"#,
        );
        let response = interpret_create_response(nested).unwrap();
        assert_eq!(response.payment_url, "https://pay.example/x");
        assert_eq!(response.gateway_order_id.as_deref(), Some("9912"));

        let top = parse::<CreateOrderData>(
            r#"{"status":true,"msg":"ok","payment_url":"https://pay.example/y"}"#,
        );
        assert_eq!(
            interpret_create_response(top).unwrap().payment_url,
            "https://pay.example/y"
        );
    }

    #[test]
    fn create_response_failure_is_provider_error() {
        let refused =
            parse::<CreateOrderData>(r#"{"status":false,"msg":"Duplicate client_txn_id"}"#);
        match interpret_create_response(refused) {
            Err(GatewayError::ProviderError { message, .. }) => {
                assert_eq!(message, "Duplicate client_txn_id")
            }
            other => panic!("unexpected: {:?}", other),
        }

        let missing_url = parse::<CreateOrderData>(r#"{"status":true,"data":{}}"#);
        assert!(matches!(
            interpret_create_response(missing_url),
            Err(GatewayError::InvalidResponse { .. })
        ));
    }

    #[test]
    fn status_false_means_not_found_yet() {
        let raw = parse::<OrderStatusData>(r#"{"status":false,"msg":"Record not found"}"#);
        assert_eq!(
            interpret_status_response(raw).unwrap(),
            OrderStatusReport::NotFound {
                message: "Record not found".to_string()
            }
        );
    }

    #[test]
    fn envelope_data_may_be_absent_or_null() {
        let absent = parse::<OrderStatusData>(r#"{"status":true}"#);
        assert!(absent.data.is_none());
        let null = parse::<CreateOrderData>(r#"{"status":true,"data":null}"#);
        assert!(null.data.is_none());
        assert!(interpret_create_response(null).is_err());
    }

    #[test]
    fn status_data_maps_to_gateway_fields() {
        let raw = parse::<OrderStatusData>(
            r#"{"status":true,"msg":"ok","data":{"id":551,"status":"success","gateway_txn_id":"UTR1","customer_vpa":"donor@upi","remark":"","amount":"500"}}"#,
        );
        match interpret_status_response(raw).unwrap() {
            OrderStatusReport::Found { status, fields } => {
                assert_eq!(status, GatewayStatus::Success);
                assert_eq!(fields.gateway_payment_id.as_deref(), Some("551"));
                assert_eq!(fields.gateway_txn_id.as_deref(), Some("UTR1"));
                assert_eq!(fields.customer_vpa.as_deref(), Some("donor@upi"));
                assert_eq!(fields.remark, None);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }
}
