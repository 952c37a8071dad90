pub mod reconciliation_poller;

pub use reconciliation_poller::{ReconciliationWorker, ReconciliationWorkerConfig};
