// Outbound Google Ads calls with managed tokens
pub mod ads;

// HTTP API
pub mod api;

// File and environment configuration
pub mod config;

// Durable credential and state stores
pub mod credentials;

// OAuth handshake and token lifecycle
pub mod oauth;
