#![allow(dead_code)]

pub mod cache;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod exchange;
pub mod models;
pub mod risk;
pub mod scoring;
pub mod telemetry;
