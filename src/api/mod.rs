pub mod error;
pub mod grace;
pub mod metrics;
pub mod supervisor;

pub use metrics::get_metrics;

use actix_web::{web, HttpResponse, Responder};

pub async fn health() -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy"
    }))
}

/// Register every RPC route. The shared `AppState` is added by the caller.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/grace")
            .route("/getAPIVersion", web::get().to(grace::get_api_version))
            .route("/getGroupNames", web::get().to(grace::get_group_names))
            .route("/log", web::post().to(grace::log_message))
            .route("/addProgramToGroup", web::post().to(grace::add_program_to_group))
            .route("/UpdateNumprocs", web::post().to(grace::update_numprocs))
            .route(
                "/removeProcessFromGroup",
                web::post().to(grace::remove_process_from_group),
            ),
    )
    .service(
        web::scope("/supervisor")
            .route("/startProcess", web::post().to(supervisor::start_process))
            .route("/stopProcess", web::post().to(supervisor::stop_process))
            .route("/getProcessInfo/{name}", web::get().to(supervisor::get_process_info))
            .route("/getAllProcessInfo", web::get().to(supervisor::get_all_process_info)),
    )
    .route("/metrics", web::get().to(get_metrics))
    .route("/health", web::get().to(health));
}
