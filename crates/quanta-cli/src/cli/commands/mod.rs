pub mod analyze;
pub mod board;
pub mod dispatch;
pub mod history;

pub use dispatch::dispatch;
