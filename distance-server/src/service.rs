//! HTTP API of the distance service

use actix_web::web::{Data, Json, ReqData, ServiceConfig};
use actix_web::{HttpResponse, Result, get, middleware, post, web};
use chrono::{DateTime, Utc};
use derivative::Derivative;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, instrument};

mod error;
mod session;


use crate::model::Model;
use crate::model::auth::Session;
use crate::model::cache::DistanceRecord;
use crate::model::distance::DistanceQuery;
use crate::model::users::{User, UserId};
use session::Credentials;

/// Username and password pair sent on signup and login
#[derive(Derivative, Deserialize)]
#[derivative(Debug)]
struct UserCredentials {
    username: String,
    #[derivative(Debug = "ignore")]
    password: String,
}

/// Distance request body
#[derive(Debug, Deserialize)]
struct FindDistance {
    #[serde(rename = "Place1")]
    place1: String,
    #[serde(rename = "Place2")]
    place2: String,
    #[serde(rename = "Type")]
    unit: String,
}

/// Single history entry
#[derive(Debug, Serialize)]
struct HistoryEntry {
    #[serde(rename = "Place1")]
    place1: String,
    #[serde(rename = "Place2")]
    place2: String,
    #[serde(rename = "Miles")]
    miles: f64,
    #[serde(rename = "Kilometers")]
    kilometers: f64,
    searched_at: DateTime<Utc>,
    id: i64,
    user_id: UserId,
}

impl From<DistanceRecord> for HistoryEntry {
    fn from(record: DistanceRecord) -> Self {
        Self {
            place1: record.place_a,
            place2: record.place_b,
            miles: record.miles,
            kilometers: record.kilometers,
            searched_at: record.computed_at,
            id: record.id,
            user_id: record.user_id,
        }
    }
}

/// Liveness probe
#[get("/health")]
async fn health() -> &'static str {
    "ok"
}

/// Registers a new user
#[post("/signup")]
#[instrument(skip(model))]
async fn signup(model: Data<Model>, body: Json<UserCredentials>) -> Result<HttpResponse> {
    let UserCredentials { username, password } = body.into_inner();
    User::signup(model.db(), model.hasher(), &username, &password).await?;

    Ok(HttpResponse::Created().json(json!({
        "error": false,
        "Message": "User Created Successfully.",
    })))
}

/// Opens a new session, invalidating the previous one
#[post("/login")]
#[instrument(skip(model))]
async fn login(model: Data<Model>, body: Json<UserCredentials>) -> Result<HttpResponse> {
    let UserCredentials { username, password } = body.into_inner();
    let (token, session) = Session::login(model.db(), model.hasher(), &username, &password).await?;

    Ok(HttpResponse::Ok().json(json!({
        "message": "Login successful",
        "access_code": token,
        "logged_in_at": session.issued_at,
        "user_id": session.user_id,
    })))
}

/// Computes distance between two places
#[post("/finddistances", wrap = "middleware::from_fn(session::middleware)")]
#[instrument(skip(model, credentials))]
async fn find_distances(
    model: Data<Model>,
    credentials: ReqData<Credentials>,
    body: Json<FindDistance>,
) -> Result<HttpResponse> {
    let user_id = credentials.validate(&model).await?;

    let FindDistance {
        place1,
        place2,
        unit,
    } = body.into_inner();
    let query = DistanceQuery::new(place1, place2, &unit)?;
    let result = query.compute(model.db(), model.geocoder(), user_id).await?;
    info!(%user_id, cached = result.cached, "Distance served");

    Ok(HttpResponse::Ok().json(json!({
        "error": false,
        "ErrorMessage": "",
        "data": { "result": result.to_string() },
    })))
}

/// Lists distances requested by the user
#[get("/history", wrap = "middleware::from_fn(session::middleware)")]
#[instrument(skip_all)]
async fn history(model: Data<Model>, credentials: ReqData<Credentials>) -> Result<HttpResponse> {
    let user_id = credentials.validate(&model).await?;

    let entries: Vec<HistoryEntry> = DistanceRecord::history(model.db(), user_id)
        .await?
        .into_iter()
        .map(Into::into)
        .collect();
    info!(%user_id, entries = entries.len(), "History fetched");

    Ok(HttpResponse::Ok().json(json!({ "data": entries })))
}

/// Confirms the credentials are valid
#[get("/users/me", wrap = "middleware::from_fn(session::middleware)")]
#[instrument(skip_all)]
async fn me(model: Data<Model>, credentials: ReqData<Credentials>) -> Result<HttpResponse> {
    let user_id = credentials.authenticate(&model).await?;

    Ok(HttpResponse::Ok().json(json!({
        "message": "You are authorized!",
        "user_id": user_id,
    })))
}

/// Closes the session of the token
#[post("/logout", wrap = "middleware::from_fn(session::middleware)")]
#[instrument(skip_all)]
async fn logout(model: Data<Model>, credentials: ReqData<Credentials>) -> Result<HttpResponse> {
    Session::logout(model.db(), &credentials.token).await?;

    Ok(HttpResponse::Ok().json(json!({
        "message": "Successfully logged out. Access token has been invalidated.",
    })))
}

/// Returns configuration function for the ActixWeb services
pub async fn configure(
    context: Model,
) -> color_eyre::Result<impl Fn(&mut web::ServiceConfig) + Clone> {
    let cfg = move |cfg: &mut ServiceConfig| {
        // Protected resources carry the credentials middleware themselves
        let api = web::scope("/api")
            .service(signup)
            .service(login)
            .service(find_distances)
            .service(history)
            .service(me)
            .service(logout);

        cfg.app_data(Data::new(context.clone()))
            .service(health)
            .service(api);
    };

    Ok(cfg)
}
