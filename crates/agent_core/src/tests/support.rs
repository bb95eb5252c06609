//! Scripted backend shared by the driver and session tests.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use shared::{
    protocol::{BacklogResponse, ReconciliationResponse},
    sanitize::{SanitizePolicy, Sanitizer},
};

use crate::{data_source::DataSource, error::DataSourceError};

#[derive(Clone)]
pub(crate) enum Reply {
    Body(Value),
    Fail(&'static str),
    /// Never answers; used to observe cancellation of an in-flight call.
    Hang,
}

pub(crate) type CallLog = Arc<Mutex<Vec<&'static str>>>;

pub(crate) struct ScriptedDataSource {
    backlog: Reply,
    reconciled: Reply,
    reconcile: Reply,
    calls: CallLog,
}

impl ScriptedDataSource {
    pub(crate) fn new() -> Self {
        Self {
            backlog: Reply::Body(sample_backlog()),
            reconciled: Reply::Body(sample_reconciled_backlog()),
            reconcile: Reply::Body(sample_reconciliation()),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub(crate) fn backlog(mut self, reply: Reply) -> Self {
        self.backlog = reply;
        self
    }

    pub(crate) fn reconciled(mut self, reply: Reply) -> Self {
        self.reconciled = reply;
        self
    }

    pub(crate) fn reconcile(mut self, reply: Reply) -> Self {
        self.reconcile = reply;
        self
    }

    pub(crate) fn calls(&self) -> CallLog {
        Arc::clone(&self.calls)
    }

    async fn answer<T: DeserializeOwned>(
        &self,
        call: &'static str,
        reply: &Reply,
    ) -> Result<T, DataSourceError> {
        self.calls.lock().expect("call log").push(call);
        match reply {
            Reply::Body(body) => {
                serde_json::from_value(body.clone()).map_err(|error| DataSourceError::Decode {
                    endpoint: call.to_string(),
                    message: error.to_string(),
                })
            }
            Reply::Fail(message) => Err(DataSourceError::Unavailable(message.to_string())),
            Reply::Hang => std::future::pending().await,
        }
    }
}

#[async_trait]
impl DataSource for ScriptedDataSource {
    async fn fetch_backlog(&self) -> Result<BacklogResponse, DataSourceError> {
        self.answer("fetch_backlog", &self.backlog).await
    }

    async fn fetch_reconciled_backlog(&self) -> Result<Value, DataSourceError> {
        self.answer("fetch_reconciled_backlog", &self.reconciled).await
    }

    async fn submit_reconciliation(&self) -> Result<ReconciliationResponse, DataSourceError> {
        self.answer("submit_reconciliation", &self.reconcile).await
    }
}

pub(crate) fn recorded(calls: &CallLog) -> Vec<&'static str> {
    calls.lock().expect("call log").clone()
}

pub(crate) fn sanitizer() -> Sanitizer {
    Sanitizer::new(SanitizePolicy::ExtractScalar)
}

pub(crate) fn sample_backlog() -> Value {
    json!({
        "failed_records": [
            {
                "_id": {"$oid": "65a1f0c2"},
                "idocNumber": "0000100",
                "status": "51",
                "message": "Sales order not found"
            },
            {
                "_id": {"$oid": "65a1f0c3"},
                "idocNumber": "0000020",
                "status": "51",
                "message": "Material 5002858 blocked"
            }
        ],
        "success_count": 5,
        "failure_count": "2"
    })
}

pub(crate) fn sample_reconciled_backlog() -> Value {
    json!({
        "data": [
            {"_id": {"$oid": "65a1f0c2"}, "idocNumber": "0000100", "status": "53"},
            {"_id": {"$oid": "65a1f0c3"}, "idocNumber": "0000020", "status": "53"}
        ]
    })
}

pub(crate) fn sample_reconciliation() -> Value {
    json!({
        "results": [
            {
                "idocNumber": "0000100",
                "updates": [
                    {"field": "status", "value": "53", "oldValue": "51", "status": "updated"},
                    {"field": "message", "value": "Sales order not found", "status": "unchanged"}
                ]
            },
            {"idocNumber": 20, "updates": []}
        ]
    })
}
