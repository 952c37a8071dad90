//! UPI deep links for a donation record.

use crate::payments::types::PaymentRecord;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayeeConfig {
    pub vpa: String,
    pub name: String,
    pub currency: String,
    /// Leading text of the `tn` note; donor name and order id are appended.
    pub note_prefix: String,
}

impl Default for PayeeConfig {
    fn default() -> Self {
        Self {
            vpa: String::new(),
            name: String::new(),
            currency: "INR".to_string(),
            note_prefix: "Donation".to_string(),
        }
    }
}

/// UPI apps that accept the generic link under their own scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpiApp {
    Paytm,
    Phonepe,
    Googlepay,
    Bhim,
    Amazonpay,
    Mobikwik,
    Freecharge,
}

impl UpiApp {
    pub const ALL: [UpiApp; 7] = [
        UpiApp::Paytm,
        UpiApp::Phonepe,
        UpiApp::Googlepay,
        UpiApp::Bhim,
        UpiApp::Amazonpay,
        UpiApp::Mobikwik,
        UpiApp::Freecharge,
    ];

    fn scheme(&self) -> &'static str {
        match self {
            UpiApp::Paytm => "paytmmp://",
            UpiApp::Phonepe => "phonepe://",
            UpiApp::Googlepay => "tez://upi/",
            UpiApp::Bhim => "bhim://",
            UpiApp::Amazonpay => "amazonpay://",
            UpiApp::Mobikwik => "mobikwik://",
            UpiApp::Freecharge => "freecharge://",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppLink {
    pub app: UpiApp,
    pub url: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentTarget {
    pub order_id: String,
    pub upi_link: String,
    pub app_links: Vec<AppLink>,
}

/// `upi://pay?pa=..&pn=..&am=..&cu=..&tn=..&tr=<orderId>`
pub fn upi_link(payee: &PayeeConfig, record: &PaymentRecord) -> String {
    let note = format!(
        "{} - {} - Order {}",
        payee.note_prefix, record.donor_name, record.order_id
    );
    let query = url::form_urlencoded::Serializer::new(String::new())
        .append_pair("pa", &payee.vpa)
        .append_pair("pn", &payee.name)
        .append_pair("am", &record.amount.to_string())
        .append_pair("cu", &payee.currency)
        .append_pair("tn", &note)
        .append_pair("tr", &record.order_id)
        .finish();
    format!("upi://pay?{}", query)
}

pub fn app_link(app: UpiApp, base_link: &str) -> String {
    match base_link.strip_prefix("upi://") {
        Some(rest) => format!("{}{}", app.scheme(), rest),
        None => base_link.to_string(),
    }
}

pub fn payment_target(payee: &PayeeConfig, record: &PaymentRecord) -> PaymentTarget {
    let link = upi_link(payee, record);
    PaymentTarget {
        order_id: record.order_id.clone(),
        app_links: UpiApp::ALL
            .iter()
            .map(|app| AppLink {
                app: *app,
                url: app_link(*app, &link),
            })
            .collect(),
        upi_link: link,
    }
}
