//! pangolin-ingress-operator: Kubernetes Ingress controller for Pangolin

pub mod cache;
pub mod client;
pub mod cluster;
pub mod config;
pub mod controllers;
pub mod deletion;
pub mod filter;
pub mod health;
pub mod host;
pub mod leader;
pub mod resolver;
pub mod settings;
pub mod status;
pub mod types;
pub mod workqueue;

pub use client::{ClientError, PangolinClient, PangolinClientTrait};
pub use config::OperatorArgs;
