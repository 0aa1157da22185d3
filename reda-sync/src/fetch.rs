//! Source retrieval: inventory and funding collections per project.

use std::time::Duration;

use serde::de::DeserializeOwned;

use reda_core::config::ApiConfig;
use reda_core::types::{FundingRecord, InventoryRecord, ProjectRef};

use crate::error::SyncError;
use crate::http::{self, CallError};

const INVENTORY_PATH: &str = "recupera-inventario-proyecto";
const FUNDING_PATH: &str = "recupera-ventas-proyecto";

/// The two collections a project needs before it can be reconciled.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProjectData {
    pub inventory: Vec<InventoryRecord>,
    pub funding: Vec<FundingRecord>,
}

/// Where inventory and funding collections come from.
///
/// `Sync` so both collections can be fetched from one source concurrently.
pub trait SourceApi: Sync {
    fn inventory(&self, project_id: u32) -> Result<Vec<InventoryRecord>, SyncError>;
    fn funding(&self, project_id: u32) -> Result<Vec<FundingRecord>, SyncError>;
}

/// Fetch both collections for `project` concurrently.
///
/// Waits for both requests; if either fails the whole fetch fails and no
/// partial data is returned. When both fail, the inventory error is reported.
pub fn fetch_project<S>(source: &S, project: &ProjectRef) -> Result<ProjectData, SyncError>
where
    S: SourceApi + ?Sized,
{
    std::thread::scope(|scope| {
        let inventory = scope.spawn(|| source.inventory(project.id));
        let funding = scope.spawn(|| source.funding(project.id));

        let inventory = inventory
            .join()
            .unwrap_or_else(|panic| std::panic::resume_unwind(panic));
        let funding = funding
            .join()
            .unwrap_or_else(|panic| std::panic::resume_unwind(panic));

        Ok(ProjectData {
            inventory: inventory?,
            funding: funding?,
        })
    })
}

// ---------------------------------------------------------------------------
// REDA HTTP client
// ---------------------------------------------------------------------------

/// [`SourceApi`] over the REDA integration endpoints (`x-api-key` auth).
pub struct RedaClient {
    agent: ureq::Agent,
    base_url: String,
    api_key: String,
}

impl RedaClient {
    pub fn new(config: &ApiConfig) -> Self {
        Self {
            agent: http::agent(Duration::from_secs(config.timeout_secs)),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        }
    }

    fn endpoint_url(&self, path: &str, project_id: u32) -> String {
        format!("{}/{path}?IdProyecto={project_id}", self.base_url)
    }

    fn get_collection<T: DeserializeOwned>(
        &self,
        path: &str,
        project_id: u32,
    ) -> Result<Vec<T>, SyncError> {
        let url = self.endpoint_url(path, project_id);
        let request = self
            .agent
            .get(&url)
            .set("x-api-key", &self.api_key)
            .set("Content-Type", "application/json");

        let response = http::call(request, None).map_err(|err| match err {
            CallError::Status { code, .. } => SyncError::Transport {
                url: url.clone(),
                status: code,
            },
            CallError::Transport(message) => SyncError::Network {
                url: url.clone(),
                message,
            },
        })?;

        let records: Vec<T> = response.into_json().map_err(|e| SyncError::Decode {
            url: url.clone(),
            message: e.to_string(),
        })?;
        tracing::debug!("fetched {} records from {url}", records.len());
        Ok(records)
    }
}

impl SourceApi for RedaClient {
    fn inventory(&self, project_id: u32) -> Result<Vec<InventoryRecord>, SyncError> {
        self.get_collection(INVENTORY_PATH, project_id)
    }

    fn funding(&self, project_id: u32) -> Result<Vec<FundingRecord>, SyncError> {
        self.get_collection(FUNDING_PATH, project_id)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn client(server: &MockServer) -> RedaClient {
        RedaClient::new(&ApiConfig {
            base_url: server.base_url(),
            api_key: "test-key".into(),
            timeout_secs: 5,
        })
    }

    #[test]
    fn fetches_both_collections_with_api_key() {
        let server = MockServer::start();
        let inventory_mock = server.mock(|when, then| {
            when.method(GET)
                .path("/recupera-inventario-proyecto")
                .query_param("IdProyecto", "35")
                .header("x-api-key", "test-key");
            then.status(200).json_body(serde_json::json!([
                {"nombreUnidad": "A-101", "estatus": "Disponible", "m2": 45, "precio": 1000000}
            ]));
        });
        let funding_mock = server.mock(|when, then| {
            when.method(GET)
                .path("/recupera-ventas-proyecto")
                .query_param("IdProyecto", "35")
                .header("x-api-key", "test-key");
            then.status(200)
                .json_body(serde_json::json!([{"unidad": "a-101", "cobrado": 50000}]));
        });

        let data = fetch_project(&client(&server), &ProjectRef::new("LAGRAND", 35)).expect("fetch");
        inventory_mock.assert();
        funding_mock.assert();
        assert_eq!(data.inventory.len(), 1);
        assert_eq!(data.funding[0].amount_collected, Some(50_000.0));
    }

    #[test]
    fn non_success_status_is_a_transport_error() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/recupera-inventario-proyecto");
            then.status(200).json_body(serde_json::json!([]));
        });
        server.mock(|when, then| {
            when.method(GET).path("/recupera-ventas-proyecto");
            then.status(403).body("Forbidden");
        });

        let err = fetch_project(&client(&server), &ProjectRef::new("LAGRAND", 35)).unwrap_err();
        match err {
            SyncError::Transport { status, url } => {
                assert_eq!(status, 403);
                assert!(url.contains("recupera-ventas-proyecto"));
            }
            other => panic!("expected transport error, got {other}"),
        }
    }

    #[test]
    fn non_array_body_is_a_decode_error() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/recupera-inventario-proyecto");
            then.status(200).json_body(serde_json::json!({"message": "no data"}));
        });
        let err = client(&server).inventory(35).unwrap_err();
        assert!(matches!(err, SyncError::Decode { .. }), "got: {err}");
    }

    #[test]
    fn unreachable_host_is_a_network_error() {
        let client = RedaClient::new(&ApiConfig {
            base_url: "http://127.0.0.1:9".into(),
            api_key: "k".into(),
            timeout_secs: 2,
        });
        let err = client.funding(1).unwrap_err();
        assert!(matches!(err, SyncError::Network { .. }), "got: {err}");
    }

    #[test]
    fn slow_server_is_cut_off_at_the_timeout() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/recupera-ventas-proyecto");
            then.status(200)
                .json_body(serde_json::json!([]))
                .delay(std::time::Duration::from_secs(4));
        });
        let client = RedaClient::new(&ApiConfig {
            base_url: server.base_url(),
            api_key: "k".into(),
            timeout_secs: 1,
        });

        let started = std::time::Instant::now();
        let err = client.funding(1).unwrap_err();
        let elapsed = started.elapsed();
        assert!(matches!(err, SyncError::Network { .. }), "got: {err}");
        assert!(
            elapsed < std::time::Duration::from_secs(3),
            "request outlived its timeout: {elapsed:?}"
        );
    }

    struct CountingSource {
        calls: AtomicUsize,
        fail_inventory: bool,
    }

    impl SourceApi for CountingSource {
        fn inventory(&self, project_id: u32) -> Result<Vec<InventoryRecord>, SyncError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_inventory {
                return Err(SyncError::Transport {
                    url: format!("inventory/{project_id}"),
                    status: 500,
                });
            }
            Ok(vec![InventoryRecord::default()])
        }

        fn funding(&self, _project_id: u32) -> Result<Vec<FundingRecord>, SyncError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![])
        }
    }

    #[test]
    fn either_failure_discards_partial_data_but_both_requests_run() {
        let source = CountingSource {
            calls: AtomicUsize::new(0),
            fail_inventory: true,
        };
        let err = fetch_project(&source, &ProjectRef::new("X", 7)).unwrap_err();
        assert!(matches!(err, SyncError::Transport { status: 500, .. }));
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn trailing_slash_in_base_url_is_ignored() {
        let client = RedaClient::new(&ApiConfig {
            base_url: "https://api.example/integracion/".into(),
            api_key: "k".into(),
            timeout_secs: 1,
        });
        assert_eq!(
            client.endpoint_url(INVENTORY_PATH, 10),
            "https://api.example/integracion/recupera-inventario-proyecto?IdProyecto=10"
        );
    }
}
