use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::models::NotificationMethod;
use crate::normalizer::round2;
use crate::utils::error::AppError;

/// A threshold crossing, ready to be rendered for any channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceAlert {
    pub subject_id: String,
    pub product_name: String,
    pub url: String,
    /// Previous known price, or the new price on a first reading.
    pub old_price: f64,
    pub new_price: f64,
    pub target_price: f64,
}

impl PriceAlert {
    pub fn savings(&self) -> f64 {
        round2(self.old_price - self.new_price)
    }

    pub fn savings_percent(&self) -> f64 {
        if self.old_price > 0.0 {
            round2(self.savings() / self.old_price * 100.0)
        } else {
            0.0
        }
    }

    pub fn subject_line(&self) -> String {
        format!("Price drop: {}", self.product_name)
    }

    pub fn html_body(&self) -> String {
        format!(
            r#"<html>
<body style="font-family: Arial, sans-serif;">
  <div style="max-width: 600px; margin: 0 auto; padding: 20px;">
    <h2>Price drop detected</h2>
    <p><strong>Product:</strong> {name}</p>
    <p><strong>Previous price:</strong> €{old:.2}</p>
    <p style="font-size: 24px; font-weight: bold; color: #4CAF50;">Current price: €{new:.2}</p>
    <p><strong>Savings:</strong> €{savings:.2} ({percent}%)</p>
    <p><strong>Your target:</strong> €{target:.2}</p>
    <a href="{url}">View product</a>
  </div>
</body>
</html>"#,
            name = self.product_name,
            old = self.old_price,
            new = self.new_price,
            savings = self.savings(),
            percent = self.savings_percent(),
            target = self.target_price,
            url = self.url,
        )
    }

    /// Telegram-flavoured HTML (no block elements).
    pub fn telegram_text(&self) -> String {
        format!(
            "<b>Price drop detected</b>\n{}\nPrevious: €{:.2}\nNow: <b>€{:.2}</b>\nSavings: €{:.2} ({}%)\n{}",
            self.product_name,
            self.old_price,
            self.new_price,
            self.savings(),
            self.savings_percent(),
            self.url
        )
    }

    pub fn plain_text(&self) -> String {
        format!(
            "Price drop detected\nProduct: {}\nPrevious price: €{:.2}\nCurrent price: €{:.2}\nSavings: €{:.2} ({}%)\n{}",
            self.product_name,
            self.old_price,
            self.new_price,
            self.savings(),
            self.savings_percent(),
            self.url
        )
    }

    /// Single-segment SMS body.
    pub fn short_text(&self) -> String {
        format!(
            "Price drop: {} now €{:.2} (was €{:.2})",
            self.product_name, self.new_price, self.old_price
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NotificationResult {
    pub success: bool,
    pub message_id: Option<String>,
    pub error: Option<String>,
}

impl NotificationResult {
    pub fn delivered(message_id: Option<String>) -> Self {
        Self {
            success: true,
            message_id,
            error: None,
        }
    }

    pub fn rejected(error: impl Into<String>) -> Self {
        Self {
            success: false,
            message_id: None,
            error: Some(error.into()),
        }
    }
}

/// Delivery transport for one notification method.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NotifierPlugin: Send + Sync {
    fn method(&self) -> NotificationMethod;
    fn is_configured(&self) -> bool;

    async fn notify(&self, contact: &str, alert: &PriceAlert) -> Result<NotificationResult, AppError>;
}
