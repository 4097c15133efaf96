//! Recording ServiceRecords for testing.
//!
//! Records every update_record()/clear_network() call and keeps a real
//! ServiceRecordTable underneath so tests can also assert resolved state.

use network_store::model::{Endpoint, NetworkRef};
use network_store::{ServiceRecordTable, ServiceRecords};
use std::sync::Mutex;

/// A recorded update_record() call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordCall {
    pub network_id: String,
    pub endpoint_id: String,
    pub name: String,
    pub is_add: bool,
    /// Local endpoint ids passed along with the call, sorted.
    pub local_ids: Vec<String>,
}

/// Mock implementation of ServiceRecords that records all calls.
#[derive(Default)]
pub struct RecordingServiceRecords {
    calls: Mutex<Vec<RecordCall>>,
    clears: Mutex<Vec<String>>,
    table: ServiceRecordTable,
}

#[allow(dead_code)]
impl RecordingServiceRecords {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<RecordCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Calls touching `endpoint_id`.
    pub fn calls_for(&self, endpoint_id: &str) -> Vec<RecordCall> {
        self.calls()
            .into_iter()
            .filter(|c| c.endpoint_id == endpoint_id)
            .collect()
    }

    pub fn clears(&self) -> Vec<String> {
        self.clears.lock().unwrap().clone()
    }

    /// Sorted names currently registered in `network_id`.
    pub fn names(&self, network_id: &str) -> Vec<String> {
        self.table.names(network_id)
    }

    pub fn table(&self) -> &ServiceRecordTable {
        &self.table
    }
}

impl ServiceRecords for RecordingServiceRecords {
    fn update_record(
        &self,
        network: &NetworkRef,
        endpoint: &Endpoint,
        local_endpoints: &[Endpoint],
        is_add: bool,
    ) {
        let mut local_ids: Vec<String> = local_endpoints.iter().map(|e| e.id().to_string()).collect();
        local_ids.sort();
        self.calls.lock().unwrap().push(RecordCall {
            network_id: network.id.clone(),
            endpoint_id: endpoint.id().to_string(),
            name: endpoint.name().to_string(),
            is_add,
            local_ids,
        });
        self.table.update_record(network, endpoint, local_endpoints, is_add);
    }

    fn clear_network(&self, network_id: &str) {
        self.clears.lock().unwrap().push(network_id.to_string());
        self.table.clear_network(network_id);
    }
}
