#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use http::StatusCode;

use service_discovery::{BackendError, HealthSignal, RegistryBackend, ServiceRegistration};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Register(ServiceRegistration),
    Deregister(String),
    ReportHealth(String, HealthSignal),
}

/// Backend stub that records calls and behaves like an agent keeping a set
/// of registered ids: deregistering an unknown id is rejected with a 404.
#[derive(Default)]
pub struct RecordingBackend {
    calls: Mutex<Vec<Call>>,
    registered: Mutex<HashSet<String>>,
    fail_with: Mutex<Option<StatusCode>>,
}

impl RecordingBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Make every following call fail with `status`, or succeed again with `None`.
    pub fn fail_with(&self, status: Option<StatusCode>) {
        *self.fail_with.lock().unwrap() = status;
    }

    fn record(&self, call: Call) -> Result<(), BackendError> {
        self.calls.lock().unwrap().push(call);
        match *self.fail_with.lock().unwrap() {
            Some(status) => Err(BackendError::Rejected {
                status,
                body: "injected failure".to_owned(),
            }),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl RegistryBackend for RecordingBackend {
    async fn register(&self, registration: &ServiceRegistration) -> Result<(), BackendError> {
        self.record(Call::Register(registration.clone()))?;
        self.registered
            .lock()
            .unwrap()
            .insert(registration.id.clone());
        Ok(())
    }

    async fn deregister(&self, service_id: &str) -> Result<(), BackendError> {
        self.record(Call::Deregister(service_id.to_owned()))?;
        if self.registered.lock().unwrap().remove(service_id) {
            Ok(())
        } else {
            Err(BackendError::Rejected {
                status: StatusCode::NOT_FOUND,
                body: format!("Unknown service ID {:?}", service_id),
            })
        }
    }

    async fn report_health(
        &self,
        service_id: &str,
        signal: &HealthSignal,
    ) -> Result<(), BackendError> {
        self.record(Call::ReportHealth(service_id.to_owned(), signal.clone()))
    }
}
