use actix_web::{http::StatusCode, web, HttpRequest, HttpResponse};
use log::error;

use crate::errors::Error;
use crate::manifest::desired_state_schema;
use crate::state::{Observation, StateKey};
use crate::Controller;

// Simple health check endpoint
pub async fn health(_req: HttpRequest) -> HttpResponse {
    HttpResponse::new(StatusCode::OK)
}

// List last observed indexes
pub async fn indexes(data: web::Data<Controller>, _req: HttpRequest) -> HttpResponse {
    match data.index_state().await {
        Ok(indexes) => HttpResponse::Ok().json(indexes),
        Err(err) => state_error(err),
    }
}

// Last observed state of one index
pub async fn get_index(data: web::Data<Controller>, name: web::Path<String>) -> HttpResponse {
    match data.state.get(&StateKey::index(name.as_str())).await {
        Ok(Some(Observation::Index(index))) => HttpResponse::Ok().json(index),
        Ok(_) => HttpResponse::NotFound().finish(),
        Err(err) => state_error(err.into()),
    }
}

// List last observed collections
pub async fn collections(data: web::Data<Controller>, _req: HttpRequest) -> HttpResponse {
    match data.collection_state().await {
        Ok(collections) => HttpResponse::Ok().json(collections),
        Err(err) => state_error(err),
    }
}

// Last observed state of one collection
pub async fn get_collection(data: web::Data<Controller>, name: web::Path<String>) -> HttpResponse {
    match data.state.get(&StateKey::collection(name.as_str())).await {
        Ok(Some(Observation::Collection(collection))) => HttpResponse::Ok().json(collection),
        Ok(_) => HttpResponse::NotFound().finish(),
        Err(err) => state_error(err.into()),
    }
}

// JSON schema of the manifest format
pub async fn schema(_req: HttpRequest) -> HttpResponse {
    HttpResponse::Ok().json(desired_state_schema())
}

fn state_error(err: Error) -> HttpResponse {
    error!("Failed to read state: {}", err);
    HttpResponse::InternalServerError().body(err.to_string())
}

/// Routes served by the controller, minus `/metrics`.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/health").to(health))
        .service(web::resource("/indexes").to(indexes))
        .service(web::resource("/indexes/{name}").to(get_index))
        .service(web::resource("/collections").to(collections))
        .service(web::resource("/collections/{name}").to(get_collection))
        .service(web::resource("/schema").to(schema));
}
