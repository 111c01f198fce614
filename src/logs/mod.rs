mod store;
mod window;

pub use store::{LogStore, ViewingUser, WorkStats};
pub use window::{monday_of, week_start, Clock, FixedClock, MonthWindow, SystemClock};
