pub mod actuators;
pub mod app;
pub mod changes;
pub mod config;
pub mod errors;
pub mod highlight;
pub mod metrics;
pub mod model;
pub mod notifications;
pub mod render;
pub mod rest;
pub mod rtdb;
pub mod sse;
pub mod state;
pub mod subscriber;
