//! Product, branch and inventory endpoints.

mod common;

use axum::http::{Method, StatusCode};
use common::{status_and_data, TestApp};
use serde_json::{json, Value};

async fn create_product(app: &TestApp, body: Value) -> Value {
    let response = app.admin(Method::POST, "/api/products", Some(body)).await;
    let (status, data) = status_and_data(response).await;
    assert_eq!(status, StatusCode::CREATED, "unexpected body {data}");
    data
}

async fn create_branch(app: &TestApp, name: &str, state: &str) -> Value {
    let response = app
        .admin(
            Method::POST,
            "/api/branches",
            Some(json!({"name": name, "state": state, "market_share": 12.5, "penetration": 40.0})),
        )
        .await;
    let (status, data) = status_and_data(response).await;
    assert_eq!(status, StatusCode::CREATED, "unexpected body {data}");
    data
}

fn inverter(material: &str) -> Value {
    json!({
        "material": material,
        "tonnage": 1.5,
        "star_rating": 5,
        "technology": "Inverter",
        "price": 42990,
        "factory_stock": 120
    })
}

// ==================== Products ====================

#[tokio::test]
async fn product_crud_round_trip() {
    let app = TestApp::new().await;

    let created = create_product(&app, inverter(" ac-15-inv ")).await;
    assert_eq!(created["material"], "AC-15-INV");
    let id = created["id"].as_i64().unwrap();

    let response = app.get(&format!("/api/products/{id}"), app.user_token()).await;
    let (status, detail) = status_and_data(response).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(detail["material"], "AC-15-INV");
    assert_eq!(detail["factory_stock"], 120);
    assert_eq!(detail["inventory"], json!([]));

    let response = app
        .admin(
            Method::PUT,
            &format!("/api/products/{id}"),
            Some(json!({"star_rating": 4, "technology": "Dual Inverter"})),
        )
        .await;
    let (status, updated) = status_and_data(response).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["star_rating"], 4);
    assert_eq!(updated["technology"], "Dual Inverter");
    assert_eq!(updated["material"], "AC-15-INV");

    let response = app
        .admin(Method::DELETE, &format!("/api/products/{id}"), None)
        .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app.get(&format!("/api/products/{id}"), app.user_token()).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .admin(Method::DELETE, &format!("/api/products/{id}"), None)
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn duplicate_material_conflicts_regardless_of_case() {
    let app = TestApp::new().await;

    create_product(&app, inverter("AC-15-INV")).await;
    let response = app
        .admin(Method::POST, "/api/products", Some(inverter("ac-15-inv")))
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let other = create_product(&app, inverter("AC-20-INV")).await;
    let response = app
        .admin(
            Method::PUT,
            &format!("/api/products/{}", other["id"]),
            Some(json!({"material": "ac-15-inv"})),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn invalid_products_are_rejected() {
    let app = TestApp::new().await;

    let cases = [
        json!({"material": "  ", "tonnage": 1.0, "star_rating": 3, "price": 100}),
        json!({"material": "AC-X", "tonnage": 0.0, "star_rating": 3, "price": 100}),
        json!({"material": "AC-X", "tonnage": 1.0, "star_rating": 6, "price": 100}),
        json!({"material": "AC-X", "tonnage": 1.0, "star_rating": 3, "price": -5}),
        json!({"material": "AC-X", "tonnage": 1.0, "star_rating": 3, "price": 100, "factory_stock": -1}),
    ];
    for body in cases {
        let response = app.admin(Method::POST, "/api/products", Some(body.clone())).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "accepted {body}");
    }
}

#[tokio::test]
async fn product_listing_filters_and_paginates() {
    let app = TestApp::new().await;

    create_product(&app, inverter("AC-15-INV")).await;
    create_product(&app, inverter("AC-20-INV")).await;
    create_product(
        &app,
        json!({"material": "AC-10-FIX", "tonnage": 1.0, "star_rating": 3, "technology": "Fixed Speed", "price": 29990}),
    )
    .await;

    let response = app
        .get("/api/products?page=1&per_page=2", app.user_token())
        .await;
    let (status, page) = status_and_data(response).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["total"], 3);
    assert_eq!(page["total_pages"], 2);
    assert_eq!(page["items"].as_array().unwrap().len(), 2);
    assert_eq!(page["items"][0]["material"], "AC-10-FIX");

    let response = app
        .get("/api/products?technology=Inverter", app.user_token())
        .await;
    let (_, page) = status_and_data(response).await;
    assert_eq!(page["total"], 2);

    let response = app.get("/api/products?search=20", app.user_token()).await;
    let (_, page) = status_and_data(response).await;
    assert_eq!(page["total"], 1);
    assert_eq!(page["items"][0]["material"], "AC-20-INV");

    let response = app.get("/api/products?star_rating=3", app.user_token()).await;
    let (_, page) = status_and_data(response).await;
    assert_eq!(page["total"], 1);

    let response = app.get("/api/products/filters", app.user_token()).await;
    let (status, filters) = status_and_data(response).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(filters["technologies"], json!(["Fixed Speed", "Inverter"]));
    assert_eq!(filters["star_ratings"], json!([3, 5]));
    assert_eq!(filters["tonnages"], json!([1.0, 1.5]));
}

#[tokio::test]
async fn search_terms_match_literally() {
    let app = TestApp::new().await;

    create_product(&app, inverter("AC_15")).await;
    create_product(&app, inverter("AC-15")).await;
    let chennai = create_branch(&app, "Chennai", "Tamil Nadu").await;

    for (uri, expected) in [
        ("/api/products?search=c_1", 1),
        ("/api/products?search=%25", 0),
        ("/api/products?search=_", 1),
        ("/api/products?search=", 2),
    ] {
        let response = app.get(uri, app.user_token()).await;
        let (status, page) = status_and_data(response).await;
        assert_eq!(status, StatusCode::OK, "{uri}");
        assert_eq!(page["total"], expected, "{uri}");
    }

    let response = app.get("/api/products?search=c_1", app.user_token()).await;
    let (_, page) = status_and_data(response).await;
    let product_id = page["items"][0]["id"].clone();
    assert_eq!(page["items"][0]["material"], "AC_15");

    let response = app
        .admin(
            Method::POST,
            "/api/inventory",
            Some(json!({"product_id": product_id, "branch_id": chennai["id"], "billing": 1})),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    for (uri, expected) in [
        ("/api/inventory?material=c_1", 1),
        ("/api/inventory?material=%25", 0),
        ("/api/inventory?technology=", 1),
        ("/api/inventory?technology=&material=", 1),
    ] {
        let response = app.get(uri, app.user_token()).await;
        let (status, page) = status_and_data(response).await;
        assert_eq!(status, StatusCode::OK, "{uri}");
        assert_eq!(page["total"], expected, "{uri}");
    }
}

// ==================== Branches ====================

#[tokio::test]
async fn branch_crud_and_state_filter() {
    let app = TestApp::new().await;

    let pune = create_branch(&app, "Pune", "Maharashtra").await;
    create_branch(&app, "Chennai", "Tamil Nadu").await;
    create_branch(&app, "Coimbatore", "Tamil Nadu").await;

    let response = app.get("/api/branches", app.user_token()).await;
    let (status, branches) = status_and_data(response).await;
    assert_eq!(status, StatusCode::OK);
    let names: Vec<&str> = branches
        .as_array()
        .unwrap()
        .iter()
        .map(|b| b["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["Chennai", "Coimbatore", "Pune"]);

    let response = app
        .get("/api/branches?state=Tamil%20Nadu", app.user_token())
        .await;
    let (_, branches) = status_and_data(response).await;
    assert_eq!(branches.as_array().unwrap().len(), 2);

    let response = app
        .admin(
            Method::POST,
            "/api/branches",
            Some(json!({"name": "Pune", "state": "Maharashtra"})),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = app
        .admin(
            Method::PUT,
            &format!("/api/branches/{}", pune["id"]),
            Some(json!({"penetration": 55.0})),
        )
        .await;
    let (status, updated) = status_and_data(response).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["penetration"], 55.0);
    assert_eq!(updated["market_share"], 12.5);

    let response = app
        .admin(
            Method::PUT,
            &format!("/api/branches/{}", pune["id"]),
            Some(json!({"market_share": 140.0})),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .admin(Method::DELETE, &format!("/api/branches/{}", pune["id"]), None)
        .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app
        .get(&format!("/api/branches/{}", pune["id"]), app.user_token())
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

// ==================== Inventory ====================

#[tokio::test]
async fn inventory_upsert_update_and_low_stock() {
    let app = TestApp::new().await;

    let product = create_product(&app, inverter("AC-15-INV")).await;
    let chennai = create_branch(&app, "Chennai", "Tamil Nadu").await;
    let pune = create_branch(&app, "Pune", "Maharashtra").await;

    let response = app
        .admin(
            Method::POST,
            "/api/inventory",
            Some(json!({
                "product_id": product["id"],
                "branch_id": chennai["id"],
                "opening_stock": 50,
                "available_stock": 4,
                "billing": 30,
                "monthly_plan": 40
            })),
        )
        .await;
    let (status, row) = status_and_data(response).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(row["material"], "AC-15-INV");
    assert_eq!(row["branch_name"], "Chennai");
    assert_eq!(row["achievement_pct"], 75.0);
    let chennai_row = row["id"].as_i64().unwrap();

    let response = app
        .admin(
            Method::POST,
            "/api/inventory",
            Some(json!({
                "product_id": product["id"],
                "branch_id": chennai["id"],
                "billing": 40
            })),
        )
        .await;
    let (status, row) = status_and_data(response).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(row["id"].as_i64().unwrap(), chennai_row);
    assert_eq!(row["billing"], 40);
    assert_eq!(row["available_stock"], 4);

    let response = app
        .admin(
            Method::POST,
            "/api/inventory",
            Some(json!({
                "product_id": product["id"],
                "branch_id": pune["id"],
                "available_stock": 25
            })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = app
        .admin(
            Method::PUT,
            &format!("/api/inventory/{chennai_row}"),
            Some(json!({"in_transit_stock": 12})),
        )
        .await;
    let (status, row) = status_and_data(response).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(row["in_transit_stock"], 12);

    let response = app
        .admin(
            Method::PUT,
            &format!("/api/inventory/{chennai_row}"),
            Some(json!({"available_stock": -1})),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app.get("/api/inventory/low-stock", app.user_token()).await;
    let (status, rows) = status_and_data(response).await;
    assert_eq!(status, StatusCode::OK);
    let rows = rows.as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["branch_name"], "Chennai");

    let response = app
        .get("/api/inventory/low-stock?threshold=30", app.user_token())
        .await;
    let (_, rows) = status_and_data(response).await;
    assert_eq!(rows.as_array().unwrap().len(), 2);

    let response = app
        .get("/api/inventory/low-stock?threshold=-1", app.user_token())
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .get(
            &format!("/api/inventory?branch_id={}", pune["id"]),
            app.user_token(),
        )
        .await;
    let (_, page) = status_and_data(response).await;
    assert_eq!(page["total"], 1);
    assert_eq!(page["items"][0]["available_stock"], 25);

    let response = app
        .get("/api/inventory?low_stock=true", app.user_token())
        .await;
    let (_, page) = status_and_data(response).await;
    assert_eq!(page["total"], 1);

    let response = app
        .get(&format!("/api/products/{}", product["id"]), app.user_token())
        .await;
    let (_, detail) = status_and_data(response).await;
    assert_eq!(detail["inventory"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn inventory_for_unknown_product_is_not_found() {
    let app = TestApp::new().await;

    let branch = create_branch(&app, "Chennai", "Tamil Nadu").await;
    let response = app
        .admin(
            Method::POST,
            "/api/inventory",
            Some(json!({"product_id": 999, "branch_id": branch["id"], "billing": 1})),
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app.get("/api/inventory/999", app.user_token()).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn deleting_a_product_removes_its_inventory() {
    let app = TestApp::new().await;

    let product = create_product(&app, inverter("AC-15-INV")).await;
    let branch = create_branch(&app, "Chennai", "Tamil Nadu").await;
    let response = app
        .admin(
            Method::POST,
            "/api/inventory",
            Some(json!({"product_id": product["id"], "branch_id": branch["id"], "billing": 3})),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = app
        .admin(Method::DELETE, &format!("/api/products/{}", product["id"]), None)
        .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app.get("/api/inventory", app.user_token()).await;
    let (_, page) = status_and_data(response).await;
    assert_eq!(page["total"], 0);

    let response = app
        .get(&format!("/api/branches/{}", branch["id"]), app.user_token())
        .await;
    let (status, detail) = status_and_data(response).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(detail["summary"]["product_count"], 0);
}
