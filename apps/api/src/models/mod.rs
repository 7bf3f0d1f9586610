pub mod food;
pub mod meal;
pub mod settings;
