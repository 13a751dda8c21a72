//! Payment provider contract. Both providers are stubs that never leave
//! the process; they only shape references and messages the way a real
//! gateway integration would.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentProvider {
    /// MyNita mobile wallet.
    MobileWallet,
    BankCard,
}

impl FromStr for PaymentProvider {
    type Err = Error;

    fn from_str(name: &str) -> Result<Self> {
        match name {
            "mynita" | "mobile_wallet" => Ok(PaymentProvider::MobileWallet),
            "bank_card" | "card" => Ok(PaymentProvider::BankCard),
            other => Err(Error::validation(format!("unknown payment provider '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProviderFields {
    pub phone_number: Option<String>,
    pub card_number: Option<String>,
    pub card_expiry: Option<String>,
    pub card_cvv: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaymentResult {
    pub success: bool,
    pub transaction_id: String,
    pub provider_reference: Option<String>,
    pub redirect_url: Option<String>,
    pub message: String,
    pub error_code: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PaymentRequest {
    pub amount: f64,
    pub currency: String,
    pub transaction_id: String,
    pub description: String,
    pub fields: ProviderFields,
}

fn reference(prefix: &str) -> String {
    let hex = Uuid::new_v4().simple().to_string().to_uppercase();
    format!("{prefix}-{}", &hex[..12])
}

impl PaymentProvider {
    pub fn name(&self) -> &'static str {
        match self {
            PaymentProvider::MobileWallet => "mynita",
            PaymentProvider::BankCard => "bank_card",
        }
    }

    pub fn initiate(&self, request: &PaymentRequest) -> Result<PaymentResult> {
        if !request.amount.is_finite() || request.amount <= 0.0 {
            return Err(Error::validation("payment amount must be positive"));
        }
        if request.currency.trim().is_empty() {
            return Err(Error::validation("currency is required"));
        }
        info!(
            provider = self.name(),
            transaction_id = %request.transaction_id,
            amount = request.amount,
            currency = %request.currency,
            description = %request.description,
            "initiating payment"
        );

        match self {
            PaymentProvider::MobileWallet => {
                let phone = request
                    .fields
                    .phone_number
                    .as_deref()
                    .filter(|phone| !phone.trim().is_empty())
                    .ok_or_else(|| Error::validation("phone_number is required for mynita"))?;
                let provider_reference = reference("MYNITA");
                Ok(PaymentResult {
                    success: true,
                    transaction_id: request.transaction_id.clone(),
                    redirect_url: Some(format!(
                        "https://pay.mynita.ne/checkout/{provider_reference}"
                    )),
                    provider_reference: Some(provider_reference),
                    message: format!("payment request sent to {phone}"),
                    error_code: None,
                })
            }
            PaymentProvider::BankCard => {
                let fields = &request.fields;
                let number = fields
                    .card_number
                    .as_deref()
                    .filter(|number| number.len() >= 12 && number.bytes().all(|b| b.is_ascii_digit()))
                    .ok_or_else(|| Error::validation("a valid card_number is required"))?;
                if fields.card_expiry.as_deref().map_or(true, str::is_empty) {
                    return Err(Error::validation("card_expiry is required"));
                }
                if !fields
                    .card_cvv
                    .as_deref()
                    .is_some_and(|cvv| (3..=4).contains(&cvv.len()) && cvv.bytes().all(|b| b.is_ascii_digit()))
                {
                    return Err(Error::validation("card_cvv must be 3 or 4 digits"));
                }
                let last_four = &number[number.len() - 4..];
                Ok(PaymentResult {
                    success: true,
                    transaction_id: request.transaction_id.clone(),
                    provider_reference: Some(reference("CARD")),
                    redirect_url: None,
                    message: format!("card payment ****{last_four} processed"),
                    error_code: None,
                })
            }
        }
    }

    pub fn verify(&self, provider_reference: &str) -> PaymentResult {
        PaymentResult {
            success: true,
            transaction_id: String::new(),
            provider_reference: Some(provider_reference.to_string()),
            redirect_url: None,
            message: format!("{} payment verified", self.name()),
            error_code: None,
        }
    }

    pub fn refund(&self, provider_reference: &str, amount: Option<f64>) -> Result<PaymentResult> {
        if let Some(amount) = amount {
            if !amount.is_finite() || amount <= 0.0 {
                return Err(Error::validation("refund amount must be positive"));
            }
        }
        let scope = match amount {
            Some(amount) => format!("partial refund of {amount:.2}"),
            None => "full refund".to_string(),
        };
        Ok(PaymentResult {
            success: true,
            transaction_id: String::new(),
            provider_reference: Some(provider_reference.to_string()),
            redirect_url: None,
            message: format!("{} {scope} issued", self.name()),
            error_code: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(fields: ProviderFields) -> PaymentRequest {
        PaymentRequest {
            amount: 25_000.0,
            currency: "XOF".to_string(),
            transaction_id: "TX-1".to_string(),
            description: "Tuition".to_string(),
            fields,
        }
    }

    #[test]
    fn providers_resolve_by_name() {
        assert_eq!("mynita".parse::<PaymentProvider>().ok(), Some(PaymentProvider::MobileWallet));
        assert_eq!("card".parse::<PaymentProvider>().ok(), Some(PaymentProvider::BankCard));
        assert!("paypal".parse::<PaymentProvider>().is_err());
    }

    #[test]
    fn card_payments_mask_all_but_last_four() {
        let result = PaymentProvider::BankCard
            .initiate(&request(ProviderFields {
                card_number: Some("4111111111111111".to_string()),
                card_expiry: Some("12/28".to_string()),
                card_cvv: Some("123".to_string()),
                ..ProviderFields::default()
            }))
            .unwrap();
        assert!(result.success);
        assert!(result.message.contains("****1111"));
        assert!(!result.message.contains("4111111111111111"));
        let reference = result.provider_reference.unwrap();
        assert!(reference.starts_with("CARD-"));
        assert_eq!(reference.len(), "CARD-".len() + 12);
    }

    #[test]
    fn mobile_wallet_needs_a_phone_number() {
        let missing = PaymentProvider::MobileWallet.initiate(&request(ProviderFields::default()));
        assert!(matches!(missing, Err(Error::Validation(_))));

        let result = PaymentProvider::MobileWallet
            .initiate(&request(ProviderFields {
                phone_number: Some("+22790000000".to_string()),
                ..ProviderFields::default()
            }))
            .unwrap();
        assert_eq!(result.transaction_id, "TX-1");
        assert!(result.redirect_url.is_some());
    }

    #[test]
    fn non_positive_amounts_are_rejected() {
        let mut bad = request(ProviderFields::default());
        bad.amount = 0.0;
        assert!(PaymentProvider::BankCard.initiate(&bad).is_err());
        let no_cvv = request(ProviderFields {
            card_number: Some("4111111111111111".to_string()),
            card_expiry: Some("12/28".to_string()),
            ..ProviderFields::default()
        });
        assert!(PaymentProvider::BankCard.initiate(&no_cvv).is_err());
        assert!(PaymentProvider::BankCard.refund("CARD-X", Some(-1.0)).is_err());
        assert!(PaymentProvider::BankCard.refund("CARD-X", None).unwrap().success);
    }
}
