use serde::Deserialize;
use utoipa::ToSchema;

use crate::entity::payments::PaymentProvider;

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdatePaymentProviderRequest {
    pub provider: PaymentProvider,
}
