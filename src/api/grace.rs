use actix_web::{web, HttpResponse};
use serde::Deserialize;

use crate::config::options_from_json;
use crate::error::RpcError;
use crate::services::grace as service;
use crate::services::LogLevel;
use crate::state::{lock_state, AppState};

#[derive(Deserialize)]
pub struct LogRequest {
    pub message: String,
    #[serde(default)]
    pub level: LogLevel,
}

#[derive(Deserialize)]
pub struct AddProgramRequest {
    pub group_name: String,
    pub program_name: String,
    #[serde(default)]
    pub program_options: serde_json::Map<String, serde_json::Value>,
}

#[derive(Deserialize)]
pub struct GroupRequest {
    pub group_name: String,
}

#[derive(Deserialize)]
pub struct RemoveProcessRequest {
    pub group_name: String,
    pub process_name: String,
}

pub async fn get_api_version(data: web::Data<AppState>) -> Result<HttpResponse, RpcError> {
    let supervisord = lock_state(&data)?;
    Ok(HttpResponse::Ok().json(supervisord.get_api_version()?))
}

pub async fn get_group_names(data: web::Data<AppState>) -> Result<HttpResponse, RpcError> {
    let supervisord = lock_state(&data)?;
    Ok(HttpResponse::Ok().json(supervisord.get_group_names()?))
}

pub async fn log_message(
    data: web::Data<AppState>,
    req: web::Json<LogRequest>,
) -> Result<HttpResponse, RpcError> {
    let supervisord = lock_state(&data)?;
    Ok(HttpResponse::Ok().json(supervisord.log(&req.message, &req.level)?))
}

pub async fn add_program_to_group(
    data: web::Data<AppState>,
    req: web::Json<AddProgramRequest>,
) -> Result<HttpResponse, RpcError> {
    let mut supervisord = lock_state(&data)?;
    // access is checked before the options are looked at
    supervisord.check_access("addProgramToGroup")?;
    let options = options_from_json(&req.program_options)?;
    let added = supervisord.add_program_to_group(&req.group_name, &req.program_name, &options)?;
    Ok(HttpResponse::Ok().json(added))
}

pub async fn update_numprocs(
    data: web::Data<AppState>,
    req: web::Json<GroupRequest>,
) -> Result<HttpResponse, RpcError> {
    let result = service::update_numprocs(&data, &req.group_name).await?;
    Ok(HttpResponse::Ok().json(result))
}

pub async fn remove_process_from_group(
    data: web::Data<AppState>,
    req: web::Json<RemoveProcessRequest>,
) -> Result<HttpResponse, RpcError> {
    let mut supervisord = lock_state(&data)?;
    let removed = supervisord.remove_process_from_group(&req.group_name, &req.process_name)?;
    Ok(HttpResponse::Ok().json(removed))
}
