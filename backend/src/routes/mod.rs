//! Route definitions for BarStockWise

use axum::{
    routing::{get, post, put},
    Router,
};

use crate::{handlers, AppState};

/// Create API routes
pub fn api_routes() -> Router<AppState> {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Product catalog
        .nest("/products", product_routes())
        .nest("/categories", category_routes())
        // Sales and tables
        .nest("/sales", sale_routes())
        .nest("/tables", table_routes())
        // Credit accounts
        .nest("/credits", credit_routes())
        // Kitchen (ingredients and recipes)
        .nest("/kitchen", kitchen_routes())
        // Stock movements and alerts
        .nest("/inventory", inventory_routes())
}

/// Product catalog routes
fn product_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::list_products).post(handlers::create_product))
        .route("/low-stock", get(handlers::low_stock_products))
        .route(
            "/:product_id",
            get(handlers::get_product).put(handlers::update_product),
        )
}

/// Category routes
fn category_routes() -> Router<AppState> {
    Router::new().route(
        "/",
        get(handlers::list_categories).post(handlers::create_category),
    )
}

/// Sale routes
fn sale_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::list_sales).post(handlers::create_sale))
        .route("/:sale_id", get(handlers::get_sale))
        .route("/:sale_id/status", post(handlers::update_sale_status))
        .route("/:sale_id/pay", post(handlers::mark_sale_paid))
        .route("/:sale_id/cancel", post(handlers::cancel_sale))
}

/// Table routes
fn table_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::list_tables).post(handlers::create_table))
        .route("/:table_id", get(handlers::get_table))
        .route("/:table_id/occupy", post(handlers::occupy_table))
        .route("/:table_id/release", post(handlers::release_table))
}

/// Credit account routes
fn credit_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/accounts",
            get(handlers::list_accounts).post(handlers::create_account),
        )
        .route(
            "/accounts/:account_id",
            get(handlers::get_account)
                .put(handlers::update_account)
                .delete(handlers::close_account),
        )
        .route("/accounts/:account_id/payments", post(handlers::add_payment))
        .route(
            "/accounts/:account_id/adjustments",
            post(handlers::add_adjustment),
        )
        .route(
            "/accounts/:account_id/reconcile",
            get(handlers::reconcile_account),
        )
        .route("/transactions", get(handlers::list_credit_transactions))
        .route("/statistics", get(handlers::credit_statistics))
}

/// Kitchen routes
fn kitchen_routes() -> Router<AppState> {
    Router::new()
        // Ingredients
        .route(
            "/ingredients",
            get(handlers::list_ingredients).post(handlers::create_ingredient),
        )
        .route(
            "/ingredients/:ingredient_id",
            get(handlers::get_ingredient).put(handlers::update_ingredient),
        )
        // Recipes
        .route(
            "/recipes",
            get(handlers::list_recipes).post(handlers::create_recipe),
        )
        .route(
            "/recipes/:recipe_id",
            get(handlers::get_recipe).put(handlers::update_recipe),
        )
        .route(
            "/recipes/:recipe_id/availability",
            post(handlers::check_recipe_availability),
        )
        .route("/recipes/:recipe_id/prepare", post(handlers::prepare_recipe))
}

/// Stock movement and alert routes
fn inventory_routes() -> Router<AppState> {
    Router::new()
        // Finished goods
        .route(
            "/products/:product_id/movements",
            get(handlers::list_product_movements),
        )
        .route(
            "/products/:product_id/restock",
            post(handlers::restock_product),
        )
        .route(
            "/products/:product_id/adjust",
            post(handlers::adjust_product_stock),
        )
        .route(
            "/products/:product_id/verify",
            get(handlers::verify_product_log),
        )
        // Ingredients
        .route(
            "/ingredients/:ingredient_id/movements",
            get(handlers::list_ingredient_movements),
        )
        .route(
            "/ingredients/:ingredient_id/restock",
            post(handlers::restock_ingredient),
        )
        .route(
            "/ingredients/:ingredient_id/adjust",
            post(handlers::adjust_ingredient_stock),
        )
        .route(
            "/ingredients/:ingredient_id/verify",
            get(handlers::verify_ingredient_log),
        )
        // Alerts
        .route("/alerts", get(handlers::list_stock_alerts))
        .route(
            "/alerts/:alert_id/acknowledge",
            put(handlers::acknowledge_stock_alert),
        )
}
