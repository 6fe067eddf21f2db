use actix_web::{web, HttpResponse};
use serde::Deserialize;

use crate::error::RpcError;
use crate::services::control;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct ProcessRequest {
    /// `group:process`. A bare `name` means `name:name`, the usual case for
    /// a single-process program.
    pub name: String,
}

pub async fn start_process(
    data: web::Data<AppState>,
    req: web::Json<ProcessRequest>,
) -> Result<HttpResponse, RpcError> {
    let info = control::start_process(&data, &req.name)?;
    Ok(HttpResponse::Ok().json(info))
}

pub async fn stop_process(
    data: web::Data<AppState>,
    req: web::Json<ProcessRequest>,
) -> Result<HttpResponse, RpcError> {
    let info = control::stop_process(&data, &req.name).await?;
    Ok(HttpResponse::Ok().json(info))
}

/// `{name}` is an identity as in `ProcessRequest`
pub async fn get_process_info(
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, RpcError> {
    let info = control::process_info(&data, &path.into_inner())?;
    Ok(HttpResponse::Ok().json(info))
}

pub async fn get_all_process_info(data: web::Data<AppState>) -> Result<HttpResponse, RpcError> {
    Ok(HttpResponse::Ok().json(control::all_process_info(&data)?))
}
