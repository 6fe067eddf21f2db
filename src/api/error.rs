use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};

use crate::error::{Fault, RpcError};

impl ResponseError for RpcError {
    fn status_code(&self) -> StatusCode {
        match self {
            RpcError::IncorrectParameters(_) => StatusCode::BAD_REQUEST,
            RpcError::ShutdownState => StatusCode::SERVICE_UNAVAILABLE,
            RpcError::BadName(_) => StatusCode::NOT_FOUND,
            RpcError::NotInWhitelist(_) => StatusCode::FORBIDDEN,
            RpcError::AlreadyStarted(_) | RpcError::NotRunning(_) | RpcError::StillRunning(_) => {
                StatusCode::CONFLICT
            }
            RpcError::Failed(_) | RpcError::SpawnError(_) | RpcError::CantReread(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(Fault::from(self))
    }
}
