pub mod gate;

pub use gate::{AdmissionSession, CacheReport, TradeGate};
