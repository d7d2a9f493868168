//! Structured-output tools for the dinner advisor.
//!
//! Each advisor operation hands the model exactly one tool and reads the
//! tool input back as the answer, so replies arrive as JSON with a known
//! shape instead of prose.

use super::types::Tool;

pub const RECORD_DISHES: &str = "record_dishes";
pub const RECORD_INGREDIENTS: &str = "record_ingredients";
pub const RECORD_DISH_INFO: &str = "record_dish_info";

/// Tool for returning dinner candidates.
#[must_use]
pub fn record_dishes_tool() -> Tool {
    Tool {
        name: RECORD_DISHES.into(),
        description: "Record the dinner dishes you suggest.".into(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {
                "dishes": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "name": { "type": "string", "description": "Short dish name" },
                            "cuisine": { "type": "string", "description": "Cuisine the dish belongs to" },
                            "description": { "type": "string", "description": "One or two sentences" }
                        },
                        "required": ["name", "cuisine", "description"]
                    }
                }
            },
            "required": ["dishes"]
        }),
    }
}

/// Tool for returning a list of ingredient names.
#[must_use]
pub fn record_ingredients_tool() -> Tool {
    Tool {
        name: RECORD_INGREDIENTS.into(),
        description: "Record the distinct food ingredients you identified.".into(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {
                "ingredients": {
                    "type": "array",
                    "items": { "type": "string", "description": "Ingredient name, capitalized, singular" }
                }
            },
            "required": ["ingredients"]
        }),
    }
}

/// Tool for returning details about one dish.
#[must_use]
pub fn record_dish_info_tool() -> Tool {
    Tool {
        name: RECORD_DISH_INFO.into(),
        description: "Record what you know about the requested dish.".into(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {
                "name": { "type": "string", "description": "Canonical dish name" },
                "cuisine": { "type": "string" },
                "description": { "type": "string" },
                "ingredients_needed": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Main ingredients required to cook it"
                }
            },
            "required": ["name", "cuisine", "description", "ingredients_needed"]
        }),
    }
}
