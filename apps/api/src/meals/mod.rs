// Meal history: persistence and live day views over saved meals.

pub mod handlers;
pub mod store;
