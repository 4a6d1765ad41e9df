pub mod capture_provider;
pub mod clock;
pub mod engine_observer;
