//! The analysis state machine: photo → identify → user edits → nutrition →
//! save. One `AnalysisPipeline` drives exactly one meal; the struct owns no
//! I/O except the provider calls handed to it, so every transition is
//! directly testable.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::llm_client::{AnalysisError, FoodAnalyzer};
use crate::models::food::{Food, Product};
use crate::models::meal::NewMeal;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    /// No dish yet; `identify` is the only legal operation.
    Idle,
    Identifying,
    /// Stage 1 done; the product list is editable and `finalize` is legal.
    AwaitingUserEdit,
    AnalyzingNutrition,
    /// Stage 2 done; the dish carries nutrition and can be saved.
    Ready,
    /// Persisted. Further saves return the same meal id.
    Saved,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineState::Idle => "idle",
            PipelineState::Identifying => "identifying",
            PipelineState::AwaitingUserEdit => "awaiting_user_edit",
            PipelineState::AnalyzingNutrition => "analyzing_nutrition",
            PipelineState::Ready => "ready",
            PipelineState::Saved => "saved",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("{0}")]
    Validation(String),

    #[error("operation '{operation}' is not allowed in state '{state}'")]
    InvalidState {
        operation: &'static str,
        state: PipelineState,
    },

    #[error(transparent)]
    Analysis(#[from] AnalysisError),
}

/// Outcome of `begin_save`: either the meal was already persisted, or the
/// caller must insert `NewMeal` and report back via `confirm_saved`.
#[derive(Debug, Clone, PartialEq)]
pub enum SaveDisposition {
    AlreadySaved(i64),
    Pending(NewMeal),
}

#[derive(Debug)]
pub struct AnalysisPipeline {
    state: PipelineState,
    food: Option<Food>,
    saved_meal_id: Option<i64>,
    /// Message of the most recent failed provider call, kept for snapshots.
    last_error: Option<String>,
}

impl AnalysisPipeline {
    pub fn new() -> Self {
        Self {
            state: PipelineState::Idle,
            food: None,
            saved_meal_id: None,
            last_error: None,
        }
    }

    pub fn state(&self) -> &PipelineState {
        &self.state
    }

    pub fn food(&self) -> Option<&Food> {
        self.food.as_ref()
    }

    pub fn saved_meal_id(&self) -> Option<i64> {
        self.saved_meal_id
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Stage 1: identify the dish on a photo. Only legal from `Idle`.
    /// On failure the machine returns to `Idle` so the caller can retry
    /// with a new image; the provider error is recorded in `last_error`.
    pub async fn identify(
        &mut self,
        analyzer: &dyn FoodAnalyzer,
        image_jpeg: &[u8],
    ) -> Result<&Food, PipelineError> {
        if self.state != PipelineState::Idle {
            return Err(PipelineError::InvalidState {
                operation: "identify",
                state: self.state.clone(),
            });
        }

        self.state = PipelineState::Identifying;
        self.last_error = None;
        match analyzer.identify(image_jpeg).await {
            Ok(food) => {
                self.state = PipelineState::AwaitingUserEdit;
                Ok(self.food.insert(food))
            }
            Err(e) => {
                self.state = PipelineState::Idle;
                self.last_error = Some(e.to_string());
                Err(e.into())
            }
        }
    }

    /// Appends a manually entered product (no nutrition until the next
    /// analysis pass). Pure mutation; never calls the provider.
    pub fn add_product(&mut self, name: &str, weight: f64) -> Result<(), PipelineError> {
        let food = self.edit_guard("add_product")?;
        let product = validated_product(name, weight)?;
        food.products.push(product);
        Ok(())
    }

    /// Replaces the product at `index`. Any stale nutrition on that slot is
    /// dropped, same as for a freshly added product.
    pub fn edit_product(
        &mut self,
        index: usize,
        name: &str,
        weight: f64,
    ) -> Result<(), PipelineError> {
        let food = self.edit_guard("edit_product")?;
        let product = validated_product(name, weight)?;
        let slot = food
            .products
            .get_mut(index)
            .ok_or_else(|| PipelineError::Validation(format!("no product at index {index}")))?;
        *slot = product;
        Ok(())
    }

    /// Removes and returns the product at `index`; the remaining products
    /// keep their relative order.
    pub fn remove_product(&mut self, index: usize) -> Result<Product, PipelineError> {
        let food = self.edit_guard("remove_product")?;
        if index >= food.products.len() {
            return Err(PipelineError::Validation(format!(
                "no product at index {index}"
            )));
        }
        Ok(food.products.remove(index))
    }

    /// Renames the dish. Blank names are rejected.
    pub fn rename(&mut self, name: &str) -> Result<(), PipelineError> {
        let food = self.edit_guard("rename")?;
        let name = name.trim();
        if name.is_empty() {
            return Err(PipelineError::Validation(
                "dish name must not be empty".to_string(),
            ));
        }
        food.name = name.to_string();
        Ok(())
    }

    /// Stage 2: nutrition analysis over the (possibly edited) product list.
    /// On failure the machine returns to `AwaitingUserEdit` with every edit
    /// preserved, so the user can adjust and retry.
    pub async fn finalize(
        &mut self,
        analyzer: &dyn FoodAnalyzer,
    ) -> Result<&Food, PipelineError> {
        if self.state != PipelineState::AwaitingUserEdit {
            return Err(PipelineError::InvalidState {
                operation: "finalize",
                state: self.state.clone(),
            });
        }
        let Some(current) = self.food.clone() else {
            return Err(PipelineError::InvalidState {
                operation: "finalize",
                state: self.state.clone(),
            });
        };

        self.state = PipelineState::AnalyzingNutrition;
        self.last_error = None;
        match analyzer.analyze_nutrition(&current).await {
            Ok(analyzed) => {
                self.state = PipelineState::Ready;
                Ok(self.food.insert(analyzed))
            }
            Err(e) => {
                self.state = PipelineState::AwaitingUserEdit;
                self.last_error = Some(e.to_string());
                Err(e.into())
            }
        }
    }

    /// First half of the idempotent save. In `Ready` it yields the insert
    /// payload; in `Saved` it yields the id of the already-persisted row, so
    /// a double save can never create a second record. The whole-dish totals
    /// are taken verbatim from the analyzer output, never recomputed from
    /// the per-product numbers.
    pub fn begin_save(&self, saved_at_ms: i64) -> Result<SaveDisposition, PipelineError> {
        match self.state {
            PipelineState::Saved => match self.saved_meal_id {
                Some(id) => Ok(SaveDisposition::AlreadySaved(id)),
                None => Err(PipelineError::InvalidState {
                    operation: "save",
                    state: self.state.clone(),
                }),
            },
            PipelineState::Ready => {
                let food = self.food.as_ref().ok_or_else(|| PipelineError::InvalidState {
                    operation: "save",
                    state: self.state.clone(),
                })?;
                let nutrition = food.nutrition.as_ref().ok_or_else(|| {
                    PipelineError::InvalidState {
                        operation: "save",
                        state: self.state.clone(),
                    }
                })?;
                Ok(SaveDisposition::Pending(NewMeal {
                    name: food.name.clone(),
                    eaten_at_ms: saved_at_ms,
                    total_calories: nutrition.calories,
                    total_proteins: nutrition.proteins,
                    total_fats: nutrition.fats,
                    total_carbs: nutrition.carbs,
                    products: food.products.clone(),
                }))
            }
            _ => Err(PipelineError::InvalidState {
                operation: "save",
                state: self.state.clone(),
            }),
        }
    }

    /// Second half of the save: records the database id and pins the machine
    /// in `Saved`.
    pub fn confirm_saved(&mut self, meal_id: i64) {
        self.saved_meal_id = Some(meal_id);
        self.state = PipelineState::Saved;
    }

    /// Mutable access to the dish, legal only while edits are allowed.
    fn edit_guard(&mut self, operation: &'static str) -> Result<&mut Food, PipelineError> {
        if self.state != PipelineState::AwaitingUserEdit {
            return Err(PipelineError::InvalidState {
                operation,
                state: self.state.clone(),
            });
        }
        self.food.as_mut().ok_or(PipelineError::InvalidState {
            operation,
            state: PipelineState::AwaitingUserEdit,
        })
    }
}

impl Default for AnalysisPipeline {
    fn default() -> Self {
        Self::new()
    }
}

/// Manual product entry rules: non-blank name, strictly positive weight.
fn validated_product(name: &str, weight: f64) -> Result<Product, PipelineError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(PipelineError::Validation(
            "product name must not be empty".to_string(),
        ));
    }
    if !(weight > 0.0) {
        return Err(PipelineError::Validation(
            "product weight must be a positive number of grams".to_string(),
        ));
    }
    Ok(Product {
        name: name.to_string(),
        weight,
        nutrition: None,
    })
}
