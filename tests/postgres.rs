//! Database-backed tests.
//!
//! Run with: DATABASE_URL=postgres://... cargo test --test postgres --features postgres-tests
//!
//! `sqlx::test` creates a fresh database per test and applies `migrations/`.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::{json, Value};
use sqlx::PgPool;
use tower::ServiceExt;

use storeops::db;
use storeops::domain::value_objects::{ErrorStrategy, ImportMode, ImportStatus, Role};
use storeops::import::{self, ImportOptions, ImportTarget, Sheet};
use storeops::models::User;
use storeops::{AppState, Config};

const SECRET: &str = "0123456789abcdef0123456789abcdef";

fn app_state(pool: PgPool) -> AppState {
    let config = Config::from_lookup(|key| match key {
        "DATABASE_URL" => Some("postgres://unused".into()),
        "JWT_SECRET" => Some(SECRET.into()),
        _ => None,
    })
    .unwrap();
    AppState::new(config, pool, None)
}

async fn seed_user(pool: &PgPool, username: &str, role: Role) -> User {
    let new = serde_json::from_value(json!({
        "username": username, "password": "secret1", "name": username, "role": role.as_str()
    }))
    .unwrap();
    db::users::insert(pool, &new, "unused-hash").await.unwrap()
}

async fn seed_shop(pool: &PgPool, name: &str) -> i64 {
    let platform_id: i64 = sqlx::query_scalar("SELECT id FROM platforms WHERE code = 'taobao'").fetch_one(pool).await.unwrap();
    let new = serde_json::from_value(json!({"name": name, "platform_id": platform_id})).unwrap();
    db::shops::insert(pool, &new).await.unwrap().id
}

async fn seed_table(pool: &PgPool, shop_id: i64) -> i64 {
    let new = serde_json::from_value(json!({
        "shop_id": shop_id, "name": "Stock", "table_type": "inventory",
        "fields": [{"name": "sku", "type": "text", "required": true}, {"name": "stock", "type": "number"}]
    }))
    .unwrap();
    db::data_tables::insert(pool, &new).await.unwrap().id
}

async fn send(state: &AppState, method: &str, uri: &str, user: &User, body: Option<Value>) -> (StatusCode, Value) {
    let token = state.jwt.issue(user).unwrap();
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("Authorization", format!("Bearer {token}"))
        .header("Content-Type", "application/json")
        .body(body.map(|b| Body::from(b.to_string())).unwrap_or_else(Body::empty))
        .unwrap();
    let response = storeops::api::router(state.clone()).oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

fn csv(text: &str) -> Sheet {
    Sheet::parse("upload.csv", text.as_bytes().to_vec()).unwrap()
}

fn options(mode: ImportMode, strategy: ErrorStrategy) -> ImportOptions {
    ImportOptions { file_name: "upload.csv".into(), mode, strategy, user_id: None }
}

async fn count(pool: &PgPool, sql: &str, id: i64) -> i64 {
    sqlx::query_scalar(sql).bind(id).fetch_one(pool).await.unwrap()
}

async fn history_count(pool: &PgPool) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM import_history").fetch_one(pool).await.unwrap()
}

const SALES_OF_SHOP: &str = "SELECT COUNT(*) FROM sales WHERE shop_id = $1";

// ---------------------------------------------------------------------------
// Authorization follows the stored account
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "./migrations")]
async fn test_demoted_admin_loses_admin_routes(pool: PgPool) {
    let state = app_state(pool.clone());
    let admin = seed_user(&pool, "boss", Role::Admin).await;

    let (status, _) = send(&state, "GET", "/api/menus/all", &admin, None).await;
    assert_eq!(status, StatusCode::OK);

    db::users::set_role_many(&pool, &[admin.id], Role::Operator).await.unwrap();
    let (status, _) = send(&state, "GET", "/api/menus/all", &admin, None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[sqlx::test(migrations = "./migrations")]
async fn test_deleted_user_token_is_rejected(pool: PgPool) {
    let state = app_state(pool.clone());
    let user = seed_user(&pool, "leaver", Role::Operator).await;

    let (status, body) = send(&state, "GET", "/api/auth/me", &user, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["username"], "leaver");

    db::users::delete(&pool, user.id).await.unwrap();
    let (status, body) = send(&state, "GET", "/api/auth/me", &user, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "User no longer exists");
}

#[sqlx::test(migrations = "./migrations")]
async fn test_admin_routes_reject_operators(pool: PgPool) {
    let state = app_state(pool.clone());
    let operator = seed_user(&pool, "clerk", Role::Operator).await;
    for (method, uri) in [("GET", "/api/menus/all"), ("DELETE", "/api/platforms/1"), ("POST", "/api/users/batch-delete")] {
        let (status, _) = send(&state, method, uri, &operator, Some(json!({"ids": [3]}))).await;
        assert_eq!(status, StatusCode::FORBIDDEN, "{method} {uri}");
    }
}

#[sqlx::test(migrations = "./migrations")]
async fn test_invalid_body_is_bad_request(pool: PgPool) {
    let state = app_state(pool.clone());
    let admin = seed_user(&pool, "boss", Role::Admin).await;
    let (status, body) = send(&state, "POST", "/api/platforms", &admin, Some(json!({"name": "", "code": "x"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "validation_error");
}

#[sqlx::test(migrations = "./migrations")]
async fn test_dashboard_rejects_bad_ranges(pool: PgPool) {
    let state = app_state(pool.clone());
    let operator = seed_user(&pool, "clerk", Role::Operator).await;
    for uri in [
        "/api/dashboard-data/summary?start_date=2024-05-02&end_date=2024-05-01",
        "/api/dashboard-data/summary?end_date=-262143-01-01",
        "/api/logs?end_date=%2B262143-12-31",
    ] {
        let (status, _) = send(&state, "GET", uri, &operator, None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
    }
    let (status, body) = send(&state, "GET", "/api/logs?page=9223372036854775807", &operator, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([]));
}

// ---------------------------------------------------------------------------
// Import transactions
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "./migrations")]
async fn test_skip_reports_rows_the_database_refuses(pool: PgPool) {
    let shop_id = seed_shop(&pool, "Main").await;
    sqlx::query("ALTER TABLE sales ADD CONSTRAINT sales_sku_not_blocked CHECK (sku IS DISTINCT FROM 'BLOCKED')")
        .execute(&pool)
        .await
        .unwrap();
    let long_title = "x".repeat(300);
    let sheet = csv(&format!(
        "sku,product_title,quantity,amount,sale_date\n\
         A-1,Mug,2,19.90,2024-03-01\n\
         BLOCKED,Cup,1,5,2024-03-02\n\
         A-3,{long_title},1,5,2024-03-03\n\
         A-4,Plate,1,7.5,2024-03-04\n"
    ));

    let target = ImportTarget::Sales { shop_id };
    let report = import::execute(&pool, &target, &sheet, &options(ImportMode::Append, ErrorStrategy::Skip)).await.unwrap();

    assert_eq!(report.total_rows, 4);
    assert_eq!(report.success_rows, 2);
    assert_eq!(report.status, ImportStatus::PartialSuccess);
    let rows: Vec<usize> = report.errors.iter().map(|e| e.row).collect();
    assert_eq!(rows, vec![3, 4]);
    assert!(report.errors[0].message.starts_with("rejected by the database"));
    assert_eq!(report.errors[1].field.as_deref(), Some("product_title"));

    assert_eq!(count(&pool, SALES_OF_SHOP, shop_id).await, 2);
    assert_eq!(history_count(&pool).await, 1);
}

#[sqlx::test(migrations = "./migrations")]
async fn test_overwrite_replaces_existing_rows(pool: PgPool) {
    let shop_id = seed_shop(&pool, "Main").await;
    let target = ImportTarget::Sales { shop_id };
    let old = csv("product_title,quantity,amount,sale_date\nOld,1,1,2024-01-01\n");
    import::execute(&pool, &target, &old, &options(ImportMode::Append, ErrorStrategy::Skip)).await.unwrap();

    let new = csv("product_title,quantity,amount,sale_date\nNew A,1,2,2024-02-01\nNew B,3,4,2024-02-02\n");
    let report = import::execute(&pool, &target, &new, &options(ImportMode::Overwrite, ErrorStrategy::Abort)).await.unwrap();
    assert_eq!(report.status, ImportStatus::Success);

    let titles: Vec<String> = sqlx::query_scalar("SELECT product_title FROM sales WHERE shop_id = $1 ORDER BY product_title")
        .bind(shop_id)
        .fetch_all(&pool)
        .await
        .unwrap();
    assert_eq!(titles, vec!["New A", "New B"]);
    assert_eq!(history_count(&pool).await, 2);
}

#[sqlx::test(migrations = "./migrations")]
async fn test_aborted_overwrite_keeps_old_rows_and_records_history(pool: PgPool) {
    let shop_id = seed_shop(&pool, "Main").await;
    let target = ImportTarget::Sales { shop_id };
    let old = csv("product_title,quantity,amount,sale_date\nOld,1,1,2024-01-01\n");
    import::execute(&pool, &target, &old, &options(ImportMode::Append, ErrorStrategy::Skip)).await.unwrap();

    let broken = csv("product_title,quantity,amount,sale_date\nNew,1,2,2024-02-01\nBad,many,2,2024-02-02\n");
    let report = import::execute(&pool, &target, &broken, &options(ImportMode::Overwrite, ErrorStrategy::Abort)).await.unwrap();
    assert_eq!(report.status, ImportStatus::Failed);
    assert_eq!(report.success_rows, 0);
    assert_eq!(report.error_count, 1);

    assert_eq!(count(&pool, SALES_OF_SHOP, shop_id).await, 1);
    let (status, message): (String, Option<String>) =
        sqlx::query_as("SELECT status, error_message FROM import_history WHERE id = $1").bind(report.import_id).fetch_one(&pool).await.unwrap();
    assert_eq!(status, "failed");
    assert!(message.unwrap_or_default().starts_with("aborted, nothing imported: row 3 quantity"));
}

#[sqlx::test(migrations = "./migrations")]
async fn test_skip_with_no_good_rows_changes_nothing(pool: PgPool) {
    let shop_id = seed_shop(&pool, "Main").await;
    let target = ImportTarget::Sales { shop_id };
    let old = csv("product_title,quantity,amount,sale_date\nOld,1,1,2024-01-01\n");
    import::execute(&pool, &target, &old, &options(ImportMode::Append, ErrorStrategy::Skip)).await.unwrap();

    let broken = csv("product_title,quantity,amount,sale_date\n,1,2,2024-02-01\nBad,1,2,someday\n");
    let report = import::execute(&pool, &target, &broken, &options(ImportMode::Overwrite, ErrorStrategy::Skip)).await.unwrap();
    assert_eq!(report.status, ImportStatus::Failed);
    assert_eq!(report.error_count, 2);
    assert_eq!(count(&pool, SALES_OF_SHOP, shop_id).await, 1);
    assert_eq!(history_count(&pool).await, 2);
}

#[sqlx::test(migrations = "./migrations")]
async fn test_data_table_import_skips_nul_cells(pool: PgPool) {
    let shop_id = seed_shop(&pool, "Main").await;
    let table_id = seed_table(&pool, shop_id).await;
    let table = db::data_tables::find(&pool, table_id).await.unwrap().unwrap();
    let target = ImportTarget::DataTable { id: table_id, fields: table.fields.0 };

    let sheet = csv("sku,stock\nA,1\nB\u{0000} 2,3\nC,\"1,200\"\n");
    let report = import::execute(&pool, &target, &sheet, &options(ImportMode::Append, ErrorStrategy::Skip)).await.unwrap();
    assert_eq!(report.success_rows, 2);
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].row, 3);
    assert_eq!(count(&pool, "SELECT COUNT(*) FROM table_data WHERE data_table_id = $1", table_id).await, 2);

    let stock: Value = sqlx::query_scalar("SELECT data -> 'stock' FROM table_data WHERE data ->> 'sku' = 'C'").fetch_one(&pool).await.unwrap();
    assert_eq!(stock, json!(1200));
}

// ---------------------------------------------------------------------------
// Row queries
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "./migrations")]
async fn test_row_query_filters_and_sorts(pool: PgPool) {
    let state = app_state(pool.clone());
    let user = seed_user(&pool, "clerk", Role::Operator).await;
    let shop_id = seed_shop(&pool, "Main").await;
    let table_id = seed_table(&pool, shop_id).await;
    let rows_uri = format!("/api/data-table-data/{table_id}/data");

    let (status, created) = send(&state, "POST", &rows_uri, &user, Some(json!({"data": {"sku": "A-1", "stock": "1,200"}}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(created["stock"], json!(1200));
    let (status, _) = send(&state, "POST", &rows_uri, &user, Some(json!({"data": {"sku": "B-2", "stock": 5}}))).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&state, "POST", &rows_uri, &user, Some(json!({"data": {"sku": "C-3", "stock": "lots"}}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Rows stored before number normalization keep their text.
    let mut conn = pool.acquire().await.unwrap();
    for (sku, stock) in [("D-4", "+3"), ("E-5", ".5"), ("F-6", "n/a")] {
        let data = json!({"sku": sku, "stock": stock}).as_object().cloned().unwrap();
        db::table_data::insert(&mut *conn, table_id, &data).await.unwrap();
    }
    drop(conn);

    let skus = |body: &Value| -> Vec<String> {
        body["items"].as_array().unwrap().iter().map(|item| item["sku"].as_str().unwrap_or_default().to_string()).collect()
    };
    let query = |filters: Value| {
        json!({"table_type": "inventory", "data_table_id": table_id, "filters": filters, "sort_by": "stock", "sort_order": "asc"})
    };

    let (status, body) = send(&state, "POST", "/api/data-table-data/query", &user, Some(query(json!({"stock": {"op": "gte", "value": "4"}})))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(skus(&body), vec!["B-2", "A-1"]);
    assert_eq!(body["total"], 2);

    let (_, body) = send(&state, "POST", "/api/data-table-data/query", &user, Some(query(json!({"stock": {"op": "lt", "value": "4"}})))).await;
    assert_eq!(skus(&body), vec!["E-5", "D-4"]);

    let (_, body) = send(&state, "POST", "/api/data-table-data/query", &user, Some(query(json!({"sku": {"op": "contains", "value": "a-"}})))).await;
    assert_eq!(skus(&body), vec!["A-1"]);

    let (_, body) = send(&state, "POST", "/api/data-table-data/query", &user, Some(query(json!({})))).await;
    assert_eq!(skus(&body), vec!["E-5", "D-4", "B-2", "A-1", "F-6"]);

    let (status, _) = send(&state, "POST", "/api/data-table-data/query", &user, Some(query(json!({"stock": {"op": "gt", "value": "many"}})))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
