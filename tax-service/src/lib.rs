//! Tax Service - Tax computation and fiscal compliance as a microservice.

pub mod config;
pub mod engine;
pub mod fiscal;
pub mod models;
pub mod services;
pub mod startup;
