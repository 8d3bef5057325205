pub mod bankroll;
pub mod correlation;
pub mod dedup;
pub mod position_manager;
pub mod risk_manager;
pub mod sizing;
pub mod spend_limiter;
pub mod trading_lock;
