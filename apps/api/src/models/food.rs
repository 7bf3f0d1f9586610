use serde::{Deserialize, Serialize};

/// Nutrition block for a single product or a whole dish.
/// Calories are kcal; proteins, fats and carbs are grams.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct NutritionInfo {
    pub calories: f64,
    pub proteins: f64,
    pub fats: f64,
    pub carbs: f64,
}

/// One ingredient of a dish. Products have no ids; identity is the position
/// inside `Food::products`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub name: String,
    /// Estimated weight in grams.
    pub weight: f64,
    /// `None` until the nutrition pass has run (or for manually added rows).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nutrition: Option<NutritionInfo>,
}

/// An in-flight dish as it moves through the analysis workflow.
/// This is a transient value; only `SavedMealRow` is persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Food {
    pub name: String,
    pub products: Vec<Product>,
    /// Whole-dish nutrition, filled in by the second analysis stage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nutrition: Option<NutritionInfo>,
}
