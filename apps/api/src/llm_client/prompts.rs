// Prompt constants and builders for both analysis stages.
// Both stages demand JSON-only output so that response extraction stays a
// dumb "strip fences, parse" step.

use crate::models::food::Food;

/// Stage-1 prompt: identify the dish and its products from a photo.
/// Sent together with the image part.
pub const IDENTIFY_PROMPT: &str = r#"Analyze this photo of a dish and determine:
1. The name of the dish
2. The list of products the dish is made of
3. The approximate weight of each product in grams

Use reliable nutrition sources and be as accurate as possible.

Return the result as JSON in EXACTLY this format:
{
  "name": "Dish name",
  "products": [
    {"name": "Product 1", "weight": 100},
    {"name": "Product 2", "weight": 50}
  ]
}

Respond with ONLY valid JSON and no additional text."#;

/// Stage-2 prompt template. Replace `{food_name}` and `{product_lines}`
/// before sending.
pub const NUTRITION_PROMPT_TEMPLATE: &str = r#"Analyze the nutritional value of the dish "{food_name}" made of the following products:
{product_lines}

For EACH product and for the WHOLE dish determine:
- Calories (kcal)
- Proteins (g)
- Fats (g)
- Carbohydrates (g)

Use reliable nutrition sources and be as accurate as possible.

Return the result as JSON in EXACTLY this format:
{
  "name": "{food_name}",
  "nutrition": {
    "calories": 500.0,
    "proteins": 25.0,
    "fats": 15.0,
    "carbs": 60.0
  },
  "products": [
    {
      "name": "Product 1",
      "weight": 100,
      "nutrition": {
        "calories": 200.0,
        "proteins": 10.0,
        "fats": 5.0,
        "carbs": 25.0
      }
    }
  ]
}

Respond with ONLY valid JSON and no additional text."#;

/// Builds the stage-2 prompt, listing every product as `- name: weight g`.
pub fn build_nutrition_prompt(food: &Food) -> String {
    let product_lines = food
        .products
        .iter()
        .map(|p| format!("- {}: {} g", p.name, p.weight))
        .collect::<Vec<_>>()
        .join("\n");
    NUTRITION_PROMPT_TEMPLATE
        .replace("{food_name}", &food.name)
        .replace("{product_lines}", &product_lines)
}
