pub mod audit;
pub mod cli;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod metrics;
pub mod middleware;
pub mod mutation;
pub mod reconcile;
pub mod reference;
pub mod rest;
