pub mod fatal;
pub mod telemetry;

pub use fatal::*;
pub use telemetry::*;
