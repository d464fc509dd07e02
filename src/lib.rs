// Site description and loading
pub mod site;

// Sensor table and per-node observer fan-out
pub mod node;

// Place graph
pub mod place;

// Command model, storages and goal tracking
pub mod command;

// Overlap arbitration policies
pub mod strategy;

// Command registry and routing
pub mod manager;

// Multi-step scenarios
pub mod scenario;

// Catalog lookups into command requests
pub mod exec;

// Device-control boundary
pub mod device;

// Engine facade and runtime actor
pub mod engine;

// Configuration
pub mod config;

pub mod error;
