use rust_decimal::Decimal;
use serde_json::json;
use tracing::{error, info};

/// Best-effort outbound mail.
///
/// Transport is an external relay reached over HTTP; when no relay is
/// configured every message degrades to a log line. Callers must treat
/// delivery as fire-and-forget: nothing here returns an error, and nothing
/// here may run inside a database transaction.
#[derive(Clone)]
pub struct Mailer {
    client: reqwest::Client,
    relay_url: Option<String>,
    admin_email: String,
}

impl Mailer {
    pub fn new(relay_url: Option<String>, admin_email: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            relay_url,
            admin_email,
        }
    }

    pub async fn send_order_confirmation(
        &self,
        to: &str,
        name: &str,
        order_number: &str,
        total: Decimal,
    ) {
        let subject = "Order Confirmation - Scentrise".to_string();
        let body = format!(
            "Thank you for your order, {}! Order ID: {}. Total: ₹{}",
            name, order_number, total
        );
        self.deliver(to, &subject, &body).await;
    }

    pub async fn send_low_stock_alert(&self, product_title: &str, stock: i32) {
        let subject = format!("Low Stock Alert: {}", product_title);
        let body = format!(
            "{} is running low with only {} units remaining.",
            product_title, stock
        );
        let to = self.admin_email.clone();
        self.deliver(&to, &subject, &body).await;
    }

    async fn deliver(&self, to: &str, subject: &str, body: &str) {
        let Some(url) = &self.relay_url else {
            info!(%to, %subject, "Email relay not configured; message logged only");
            return;
        };

        let payload = json!({
            "from": "Scentrise <no-reply@scentrise.com>",
            "to": to,
            "subject": subject,
            "text": body,
        });

        match self.client.post(url).json(&payload).send().await {
            Ok(resp) if resp.status().is_success() => {
                info!(%to, %subject, "Email dispatched");
            }
            Ok(resp) => {
                error!(%to, %subject, status = %resp.status(), "Email relay rejected message");
            }
            Err(e) => {
                error!(%to, %subject, error = %e, "Email sending failed");
            }
        }
    }
}
