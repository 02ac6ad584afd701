// Alexa Smart Home protocol: capabilities, directives, proactive reports
pub mod alexa;

// Settings, exposure filter, persisted authorization
pub mod config;

// Backend entity-state provider and in-memory store
pub mod state;

// Inbound bearer tokens and event gateway access tokens
pub mod auth;

// HTTP API
pub mod api;
