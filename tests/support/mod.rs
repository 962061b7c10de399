#![allow(dead_code)]

use reqwest::{header::HeaderValue, RequestBuilder, StatusCode};
use sea_orm::{ActiveModelTrait, DatabaseConnection, Set};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;

use voicecart::api::{create_api_router, AppState};
use voicecart::config::AppConfig;
use voicecart::core::gateway::{PaymentGateway, SimulatedGateway};
use voicecart::database;
use voicecart::entities::{product, setup_schema};

pub const SESSION_HEADER: &str = "x-session-key";

pub struct TestApp {
    pub address: String,
    pub client: reqwest::Client,
    pub db: Arc<DatabaseConnection>,
    file: Option<TempDatabase>,
}

/// A SQLite file under the temp dir, removed with its journal files on drop.
struct TempDatabase {
    path: PathBuf,
}

impl TempDatabase {
    fn new() -> Self {
        let path = std::env::temp_dir().join(format!("voicecart-{}.db", uuid::Uuid::new_v4()));
        Self { path }
    }

    fn url(&self) -> String {
        format!("sqlite://{}?mode=rwc", self.path.display())
    }
}

impl Drop for TempDatabase {
    fn drop(&mut self) {
        for suffix in ["", "-wal", "-shm", "-journal"] {
            let mut file = self.path.clone().into_os_string();
            file.push(suffix);
            let _ = std::fs::remove_file(file);
        }
    }
}

impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.address, path)
    }

    pub fn get(&self, path: &str) -> RequestBuilder {
        self.client.get(self.url(path))
    }

    pub fn post(&self, path: &str) -> RequestBuilder {
        self.client.post(self.url(path))
    }

    pub fn put(&self, path: &str) -> RequestBuilder {
        self.client.put(self.url(path))
    }

    pub fn delete(&self, path: &str) -> RequestBuilder {
        self.client.delete(self.url(path))
    }
}

pub async fn spawn_app() -> TestApp {
    spawn_app_with_gateway(Arc::new(SimulatedGateway)).await
}

/// Serves the real router over an in-memory database on an ephemeral port.
pub async fn spawn_app_with_gateway(gateway: Arc<dyn PaymentGateway>) -> TestApp {
    let config = AppConfig::in_memory("integration-secret");
    serve(config, gateway, None).await
}

/// Like `spawn_app`, but over a fresh database file with a full connection pool, so
/// requests run on separate connections.
pub async fn spawn_app_on_file() -> TestApp {
    let file = TempDatabase::new();
    let mut config = AppConfig::in_memory("integration-secret");
    config.database_url = file.url();
    serve(config, Arc::new(SimulatedGateway), Some(file)).await
}

async fn serve(
    config: AppConfig,
    gateway: Arc<dyn PaymentGateway>,
    file: Option<TempDatabase>,
) -> TestApp {

    let db = database::connect(&config.database_url)
        .await
        .expect("Failed to open database");
    setup_schema(&db).await.expect("Failed to create schema");
    let db = Arc::new(db);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("Failed to bind listener");
    let address = format!("http://{}", listener.local_addr().expect("No local address"));

    let app = create_api_router(AppState {
        db: db.clone(),
        gateway,
        config: Arc::new(config),
    });
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("Server failed");
    });

    TestApp {
        address,
        client: reqwest::Client::new(),
        db,
        file,
    }
}

/// Inserts an in-stock product priced in minor units and returns its id.
pub async fn seed_product(app: &TestApp, name: &str, price: i64) -> i32 {
    let product = product::ActiveModel {
        name: Set(name.to_owned()),
        description: Set(String::new()),
        price: Set(price),
        in_stock: Set(true),
        ..Default::default()
    }
    .insert(&*app.db)
    .await
    .expect("Failed to insert product");

    product.id
}

pub async fn register_and_login(app: &TestApp, username: &str) -> String {
    let credentials = json!({
        "username": username,
        "password": "correct horse battery"
    });

    let register = app
        .post("/api/accounts/register/")
        .json(&credentials)
        .send()
        .await
        .expect("Failed to send register request");
    assert_eq!(register.status(), StatusCode::CREATED);

    let login = app
        .post("/api/accounts/login/")
        .json(&credentials)
        .send()
        .await
        .expect("Failed to send login request");
    assert_eq!(login.status(), StatusCode::OK);

    let body = login
        .json::<Value>()
        .await
        .expect("Failed to parse login response JSON");
    body["token"]
        .as_str()
        .expect("Token not found in login response")
        .to_owned()
}

pub fn checkout_body(payment_method: &str) -> Value {
    json!({
        "full_name": "Asha Rao",
        "phone": "9876543210",
        "email": "asha@example.com",
        "address": "12 MG Road",
        "city": "Pune",
        "pincode": "411001",
        "payment_method": payment_method
    })
}

/// Adds `quantity` of `product_id` to the session's cart and checks out.
pub async fn place_order(
    app: &TestApp,
    session: &str,
    product_id: i32,
    quantity: u32,
    payment_method: &str,
) -> Value {
    let add = app
        .post("/api/cart/add/")
        .header(SESSION_HEADER, session)
        .json(&json!({ "product_id": product_id, "quantity": quantity }))
        .send()
        .await
        .expect("Failed to send add to cart request");
    assert_eq!(add.status(), StatusCode::CREATED);

    let order = app
        .post("/api/checkout/create/")
        .header(SESSION_HEADER, session)
        .json(&checkout_body(payment_method))
        .send()
        .await
        .expect("Failed to send checkout request");
    assert_eq!(order.status(), StatusCode::CREATED);

    order
        .json::<Value>()
        .await
        .expect("Failed to parse order response JSON")
}

pub fn session_key(response: &reqwest::Response) -> Option<String> {
    response
        .headers()
        .get(SESSION_HEADER)
        .and_then(|value: &HeaderValue| value.to_str().ok())
        .map(str::to_owned)
}
