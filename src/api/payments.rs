use axum::{extract::State, Json};
use serde::Deserialize;
use uuid::Uuid;

use super::extract::{ApiJson, ApiPath};
use super::{AppState, CurrentUser};
use crate::error::Result;
use crate::payments::{PaymentProvider, PaymentRequest, PaymentResult, ProviderFields};

#[derive(Debug, Deserialize)]
pub struct InitiateBody {
    pub provider: String,
    pub amount: f64,
    pub currency: String,
    pub description: String,
    pub transaction_id: Option<String>,
    #[serde(flatten)]
    pub fields: ProviderFields,
}

#[derive(Debug, Default, Deserialize)]
pub struct RefundBody {
    pub amount: Option<f64>,
}

/// POST /payments
pub async fn initiate(
    State(_state): State<AppState>,
    CurrentUser(_user): CurrentUser,
    ApiJson(body): ApiJson<InitiateBody>,
) -> Result<Json<PaymentResult>> {
    let provider: PaymentProvider = body.provider.parse()?;
    let request = PaymentRequest {
        amount: body.amount,
        currency: body.currency,
        transaction_id: body
            .transaction_id
            .unwrap_or_else(|| format!("TXN-{}", Uuid::new_v4())),
        description: body.description,
        fields: body.fields,
    };
    Ok(Json(provider.initiate(&request)?))
}

/// GET /payments/:provider/:reference
pub async fn verify(
    State(_state): State<AppState>,
    CurrentUser(_user): CurrentUser,
    ApiPath((provider, reference)): ApiPath<(String, String)>,
) -> Result<Json<PaymentResult>> {
    let provider: PaymentProvider = provider.parse()?;
    Ok(Json(provider.verify(&reference)))
}

/// POST /payments/:provider/:reference/refund
pub async fn refund(
    State(_state): State<AppState>,
    CurrentUser(_user): CurrentUser,
    ApiPath((provider, reference)): ApiPath<(String, String)>,
    ApiJson(body): ApiJson<RefundBody>,
) -> Result<Json<PaymentResult>> {
    let provider: PaymentProvider = provider.parse()?;
    Ok(Json(provider.refund(&reference, body.amount)?))
}
