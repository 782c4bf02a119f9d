pub mod reconciliation_poller;
