//! Mock transfer service for testing
//!
//! Scripted results per attempt, a default result, an optional delay, and a
//! record of every call made.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use super::traits::{TokenTransferService, TransferRequest};
use crate::settlement::types::{AttemptId, TransferOutcome};

type OnCall = Box<dyn Fn(&TransferRequest) + Send + Sync>;

pub struct MockTransferService {
    name: String,
    /// Map of attempt id -> scripted result
    results: Mutex<HashMap<AttemptId, TransferOutcome>>,
    /// Result when nothing is scripted; `None` means succeed with a generated receipt
    default_result: Mutex<Option<TransferOutcome>>,
    calls: Mutex<Vec<TransferRequest>>,
    delay: Mutex<Option<Duration>>,
    on_call: Mutex<Option<OnCall>>,
}

impl MockTransferService {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            results: Mutex::new(HashMap::new()),
            default_result: Mutex::new(None),
            calls: Mutex::new(Vec::new()),
            delay: Mutex::new(None),
            on_call: Mutex::new(None),
        }
    }

    /// Set expected result for a specific attempt
    pub fn set_result(&self, attempt_id: AttemptId, result: TransferOutcome) {
        self.results.lock().unwrap().insert(attempt_id, result);
    }

    /// Set default result for all transfers
    pub fn set_default_result(&self, result: TransferOutcome) {
        *self.default_result.lock().unwrap() = Some(result);
    }

    /// Sleep this long inside every call
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    /// Run `hook` at the moment each transfer is submitted
    pub fn set_on_call(&self, hook: impl Fn(&TransferRequest) + Send + Sync + 'static) {
        *self.on_call.lock().unwrap() = Some(Box::new(hook));
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn calls(&self) -> Vec<TransferRequest> {
        self.calls.lock().unwrap().clone()
    }

    fn get_result(&self, request: &TransferRequest) -> TransferOutcome {
        if let Some(result) = self.results.lock().unwrap().get(&request.reference) {
            return result.clone();
        }
        self.default_result
            .lock()
            .unwrap()
            .clone()
            .unwrap_or_else(|| TransferOutcome::Success(format!("mock-sig-{}", request.reference)))
    }
}

#[async_trait]
impl TokenTransferService for MockTransferService {
    async fn transfer(&self, request: &TransferRequest) -> TransferOutcome {
        log::debug!(
            "[{}] transfer({}, mint={}, dest={}, amount={})",
            self.name, request.reference, request.mint, request.destination, request.amount_minor
        );
        self.calls.lock().unwrap().push(request.clone());
        if let Some(hook) = self.on_call.lock().unwrap().as_ref() {
            hook(request);
        }

        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.get_result(request)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(id: u64) -> TransferRequest {
        TransferRequest {
            reference: AttemptId::new(id),
            mint: "mint".into(),
            destination: "dest".into(),
            amount_minor: 1_000_000,
        }
    }

    #[tokio::test]
    async fn test_mock_default_success() {
        let mock = MockTransferService::new("test");
        let result = mock.transfer(&request(1)).await;
        assert!(matches!(result, TransferOutcome::Success(sig) if sig.starts_with("mock-sig-")));
        assert_eq!(mock.call_count(), 1);
    }

    #[tokio::test]
    async fn test_mock_set_result() {
        let mock = MockTransferService::new("test");
        mock.set_result(AttemptId::new(2), TransferOutcome::Failed("blockhash expired".into()));

        assert!(matches!(mock.transfer(&request(2)).await, TransferOutcome::Failed(_)));
        assert!(matches!(mock.transfer(&request(3)).await, TransferOutcome::Success(_)));
    }

    #[tokio::test]
    async fn test_mock_set_default() {
        let mock = MockTransferService::new("test");
        mock.set_default_result(TransferOutcome::Failed("down".into()));
        assert_eq!(mock.transfer(&request(1)).await, TransferOutcome::Failed("down".into()));
        assert_eq!(mock.calls()[0].amount_minor, 1_000_000);
    }
}
