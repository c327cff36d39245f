pub mod control;
pub mod parser;
pub mod report;
pub mod runner;
pub mod server;
pub mod simulator;
pub mod utils;
pub mod verify;

// Re-export common items
pub use report::generate_report;
pub use runner::{run_booking_flow, BookingRun, RunContext, ScenarioDriver};
pub use simulator::{Messenger, WebhookClient};
pub use utils::config::HarnessConfig;
