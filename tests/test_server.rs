use std::sync::Arc;

use actix_web::{http::StatusCode, test, web, App};
use serde_json::Value;

use index_controller::resource::index::Index;
use index_controller::state::{Observation, StateStore};
use index_controller::{views, Controller};

mod helpers;
use helpers::*;

async fn app_data() -> web::Data<Controller> {
    let client = FakeControlPlane::new();
    let store = Arc::new(RecordingStore::default());
    store
        .persist(&Observation::Index(index("widget", "Ready", true)))
        .await
        .unwrap();
    web::Data::new(Controller::new(context(&client, &store)))
}

#[actix_web::test]
async fn test_view_health() {
    let req = test::TestRequest::default().to_http_request();
    let resp = views::health(req).await;
    assert_eq!(resp.status(), StatusCode::OK);
}

#[actix_web::test]
async fn test_view_indexes() {
    let app = test::init_service(App::new().app_data(app_data().await).configure(views::configure)).await;

    let req = test::TestRequest::get().uri("/indexes").to_request();
    let indexes: Vec<Index> = test::call_and_read_body_json(&app, req).await;
    assert_eq!(indexes.len(), 1);
    assert_eq!(indexes[0].name, "widget");

    let req = test::TestRequest::get().uri("/indexes/widget").to_request();
    let index: Index = test::call_and_read_body_json(&app, req).await;
    assert!(index.status.ready);
}

#[actix_web::test]
async fn test_view_unknown_resources() {
    let app = test::init_service(App::new().app_data(app_data().await).configure(views::configure)).await;

    let req = test::TestRequest::get().uri("/indexes/gadget").to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);

    // An index name is not a collection name.
    let req = test::TestRequest::get().uri("/collections/widget").to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);

    let req = test::TestRequest::get().uri("/collections").to_request();
    let collections: Vec<Value> = test::call_and_read_body_json(&app, req).await;
    assert!(collections.is_empty());
}

#[actix_web::test]
async fn test_view_schema() {
    let app = test::init_service(App::new().configure(views::configure)).await;

    let req = test::TestRequest::get().uri("/schema").to_request();
    let schema: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(schema["title"], "DesiredState");
}
