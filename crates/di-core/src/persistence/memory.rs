use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;

use crate::collaborators::{ClientError, RelationalStore};
use crate::model::{
    CustomerFieldUpdate, CustomerStatus, PersistedDocument, UpsertOutcome, ValidationFailure,
};

#[derive(Default)]
struct StoreState {
    documents: Vec<PersistedDocument>,
    customers: HashMap<i64, CustomerFieldUpdate>,
    statuses: HashMap<i64, CustomerStatus>,
    validation_failures: HashMap<i64, Vec<ValidationFailure>>,
    validation_runs: HashMap<i64, usize>,
}

/// In-memory relational store for tests and local runs.
#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<StoreState>,
    fail_writes: AtomicBool,
    fail_validations: AtomicBool,
}

impl InMemoryStore {
    fn lock(&self) -> std::sync::MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn documents(&self) -> Vec<PersistedDocument> {
        self.lock().documents.clone()
    }

    pub fn customer(&self, request_id: i64) -> CustomerFieldUpdate {
        self.lock().customers.get(&request_id).cloned().unwrap_or_default()
    }

    pub fn status(&self, request_id: i64) -> Option<CustomerStatus> {
        self.lock().statuses.get(&request_id).copied()
    }

    /// Validation attempts for `request_id`, failed ones included.
    pub fn validation_runs(&self, request_id: i64) -> usize {
        self.lock().validation_runs.get(&request_id).copied().unwrap_or(0)
    }

    /// Failures the next validation run reports for `request_id`.
    pub fn set_validation_failures(&self, request_id: i64, failures: Vec<ValidationFailure>) {
        self.lock().validation_failures.insert(request_id, failures);
    }

    /// Fail document and customer-field writes. Status writes still succeed.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_validations(&self, fail: bool) {
        self.fail_validations.store(fail, Ordering::SeqCst);
    }

    fn check_writes(&self) -> Result<(), ClientError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err("relational store rejected write".into());
        }
        Ok(())
    }
}

#[async_trait]
impl RelationalStore for InMemoryStore {
    async fn upsert_document(&self, row: &PersistedDocument) -> Result<UpsertOutcome, ClientError> {
        self.check_writes()?;
        let mut state = self.lock();
        let existing = state.documents.iter_mut().find(|doc| {
            doc.request_id == row.request_id && doc.document_type_code == row.document_type_code
        });
        match existing {
            Some(doc) => {
                *doc = row.clone();
                Ok(UpsertOutcome::Updated)
            }
            None => {
                state.documents.push(row.clone());
                Ok(UpsertOutcome::Inserted)
            }
        }
    }

    async fn update_customer_fields(
        &self,
        request_id: i64,
        updates: &CustomerFieldUpdate,
    ) -> Result<u64, ClientError> {
        self.check_writes()?;
        let mut state = self.lock();
        let customer = state.customers.entry(request_id).or_default();
        for (column, value) in updates {
            customer.insert(column.clone(), value.clone());
        }
        Ok(1)
    }

    async fn set_status(&self, request_id: i64, status: CustomerStatus) -> Result<(), ClientError> {
        self.lock().statuses.insert(request_id, status);
        Ok(())
    }

    async fn run_customer_validations(
        &self,
        request_id: i64,
    ) -> Result<Vec<ValidationFailure>, ClientError> {
        let mut state = self.lock();
        *state.validation_runs.entry(request_id).or_default() += 1;
        if self.fail_validations.load(Ordering::SeqCst) {
            return Err("customer validation procedure failed".into());
        }
        Ok(state
            .validation_failures
            .get(&request_id)
            .cloned()
            .unwrap_or_default())
    }
}
