use crate::domain::ports::{
    CreateOrderRequest, CreatedOrder, ReceiptService, ValidateReceiptRequest, ValidationVerdict,
};
use crate::error::RemoteError;
use async_trait::async_trait;

/// Receipt service used when no transport is configured.
///
/// Every call fails with a connectivity error, so tasks stay retryable and
/// records are never touched beyond their attempt counters.
#[derive(Debug, Default, Clone, Copy)]
pub struct OfflineReceiptService;

#[async_trait]
impl ReceiptService for OfflineReceiptService {
    async fn create_order(&self, _request: CreateOrderRequest) -> Result<CreatedOrder, RemoteError> {
        Err(RemoteError::Connectivity("no receipt service configured".to_string()))
    }

    async fn validate_receipt(
        &self,
        _request: ValidateReceiptRequest,
    ) -> Result<ValidationVerdict, RemoteError> {
        Err(RemoteError::Connectivity("no receipt service configured".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_offline_service_always_fails() {
        let service = OfflineReceiptService;
        let result = service
            .create_order(CreateOrderRequest {
                product_identifier: "p".to_string(),
                transaction_identifier: "t".to_string(),
                fingerprint: "F".to_string(),
            })
            .await;
        assert!(matches!(result, Err(RemoteError::Connectivity(_))));
    }
}
