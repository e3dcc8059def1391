//! HTTP handlers for kitchen endpoints (ingredients and recipes)

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use shared::{AvailabilityReport, Ingredient, Recipe};

use crate::error::AppResult;
use crate::services::kitchen::{
    CreateIngredientInput, CreateRecipeInput, KitchenService, PrepareInput, PrepareOutcome,
    RecipeWithLines, UpdateIngredientInput, UpdateRecipeInput,
};
use crate::AppState;

/// Query parameters for listing ingredients
#[derive(Debug, Default, Deserialize)]
pub struct IngredientListQuery {
    pub low_stock: Option<bool>,
}

/// Query parameters for listing recipes
#[derive(Debug, Default, Deserialize)]
pub struct RecipeListQuery {
    pub active: Option<bool>,
}

/// Create an ingredient
pub async fn create_ingredient(
    State(state): State<AppState>,
    Json(input): Json<CreateIngredientInput>,
) -> AppResult<Json<Ingredient>> {
    let service = KitchenService::new(state.db);
    let ingredient = service.create_ingredient(input).await?;
    Ok(Json(ingredient))
}

/// List ingredients
pub async fn list_ingredients(
    State(state): State<AppState>,
    Query(query): Query<IngredientListQuery>,
) -> AppResult<Json<Vec<Ingredient>>> {
    let service = KitchenService::new(state.db);
    let ingredients = service
        .list_ingredients(query.low_stock.unwrap_or(false))
        .await?;
    Ok(Json(ingredients))
}

/// Get an ingredient
pub async fn get_ingredient(
    State(state): State<AppState>,
    Path(ingredient_id): Path<Uuid>,
) -> AppResult<Json<Ingredient>> {
    let service = KitchenService::new(state.db);
    let ingredient = service.get_ingredient(ingredient_id).await?;
    Ok(Json(ingredient))
}

/// Update an ingredient
pub async fn update_ingredient(
    State(state): State<AppState>,
    Path(ingredient_id): Path<Uuid>,
    Json(input): Json<UpdateIngredientInput>,
) -> AppResult<Json<Ingredient>> {
    let service = KitchenService::new(state.db);
    let ingredient = service.update_ingredient(ingredient_id, input).await?;
    Ok(Json(ingredient))
}

/// Create a recipe
pub async fn create_recipe(
    State(state): State<AppState>,
    Json(input): Json<CreateRecipeInput>,
) -> AppResult<Json<RecipeWithLines>> {
    let service = KitchenService::new(state.db);
    let recipe = service.create_recipe(input).await?;
    Ok(Json(recipe))
}

/// List recipes
pub async fn list_recipes(
    State(state): State<AppState>,
    Query(query): Query<RecipeListQuery>,
) -> AppResult<Json<Vec<Recipe>>> {
    let service = KitchenService::new(state.db);
    let recipes = service.list_recipes(query.active.unwrap_or(true)).await?;
    Ok(Json(recipes))
}

/// Get a recipe with its lines
pub async fn get_recipe(
    State(state): State<AppState>,
    Path(recipe_id): Path<Uuid>,
) -> AppResult<Json<RecipeWithLines>> {
    let service = KitchenService::new(state.db);
    let recipe = service.get_recipe(recipe_id).await?;
    Ok(Json(recipe))
}

/// Update a recipe
pub async fn update_recipe(
    State(state): State<AppState>,
    Path(recipe_id): Path<Uuid>,
    Json(input): Json<UpdateRecipeInput>,
) -> AppResult<Json<RecipeWithLines>> {
    let service = KitchenService::new(state.db);
    let recipe = service.update_recipe(recipe_id, input).await?;
    Ok(Json(recipe))
}

/// Check whether a recipe can be prepared
pub async fn check_recipe_availability(
    State(state): State<AppState>,
    Path(recipe_id): Path<Uuid>,
    Json(input): Json<PrepareInput>,
) -> AppResult<Json<AvailabilityReport>> {
    let service = KitchenService::new(state.db);
    let report = service
        .check_availability(recipe_id, input.quantity.unwrap_or(1))
        .await?;
    Ok(Json(report))
}

/// Prepare a recipe, consuming ingredients
pub async fn prepare_recipe(
    State(state): State<AppState>,
    Path(recipe_id): Path<Uuid>,
    Json(input): Json<PrepareInput>,
) -> AppResult<Json<PrepareOutcome>> {
    let service = KitchenService::new(state.db);
    let outcome = service.prepare(recipe_id, input).await?;
    Ok(Json(outcome))
}
