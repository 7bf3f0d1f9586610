// User settings: the singleton calorie-range row and its streak columns.

pub mod handlers;
pub mod store;
