use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;

use super::food::Product;

/// A persisted meal. Totals are the whole-dish numbers reported by the
/// analyzer at save time; they are never recomputed from `products`.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SavedMealRow {
    pub id: i64,
    pub name: String,
    /// Epoch milliseconds of the moment the meal was saved.
    pub eaten_at_ms: i64,
    pub total_calories: f64,
    pub total_proteins: f64,
    pub total_fats: f64,
    pub total_carbs: f64,
    /// Ordered product snapshot, stored as JSONB.
    pub products: Json<Vec<Product>>,
}

/// Insert payload for `MealStore::insert`; the id is assigned by the database.
#[derive(Debug, Clone, PartialEq)]
pub struct NewMeal {
    pub name: String,
    pub eaten_at_ms: i64,
    pub total_calories: f64,
    pub total_proteins: f64,
    pub total_fats: f64,
    pub total_carbs: f64,
    pub products: Vec<Product>,
}

/// Aggregate nutrition over a list of meals (e.g. one calendar day).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct DayTotals {
    pub calories: f64,
    pub proteins: f64,
    pub fats: f64,
    pub carbs: f64,
}

impl DayTotals {
    pub fn accumulate(meals: &[SavedMealRow]) -> Self {
        meals.iter().fold(Self::default(), |acc, meal| Self {
            calories: acc.calories + meal.total_calories,
            proteins: acc.proteins + meal.total_proteins,
            fats: acc.fats + meal.total_fats,
            carbs: acc.carbs + meal.total_carbs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::food::NutritionInfo;

    fn make_meal(calories: f64, proteins: f64, fats: f64, carbs: f64) -> SavedMealRow {
        SavedMealRow {
            id: 0,
            name: "test meal".to_string(),
            eaten_at_ms: 0,
            total_calories: calories,
            total_proteins: proteins,
            total_fats: fats,
            total_carbs: carbs,
            products: Json(vec![]),
        }
    }

    #[test]
    fn accumulate_sums_all_components() {
        let meals = vec![
            make_meal(500.0, 25.0, 15.0, 60.0),
            make_meal(300.0, 10.0, 5.0, 40.0),
        ];
        let totals = DayTotals::accumulate(&meals);
        assert_eq!(totals.calories, 800.0);
        assert_eq!(totals.proteins, 35.0);
        assert_eq!(totals.fats, 20.0);
        assert_eq!(totals.carbs, 100.0);
    }

    #[test]
    fn accumulate_of_empty_list_is_zero() {
        assert_eq!(DayTotals::accumulate(&[]), DayTotals::default());
    }

    #[test]
    fn product_snapshot_round_trips_through_its_stored_form() {
        let products = vec![
            Product {
                name: "Beetroot".to_string(),
                weight: 150.0,
                nutrition: Some(NutritionInfo {
                    calories: 65.0,
                    proteins: 2.4,
                    fats: 0.3,
                    carbs: 14.0,
                }),
            },
            Product {
                name: "Sour cream".to_string(),
                weight: 30.0,
                nutrition: None,
            },
        ];

        let stored = serde_json::to_string(&Json(&products)).unwrap();
        let Json(restored): Json<Vec<Product>> = serde_json::from_str(&stored).unwrap();
        assert_eq!(restored, products);
    }
}
