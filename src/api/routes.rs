use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;

use super::http::HttpRequest;
use crate::camera::{CameraConfig, CameraUpdate};
use crate::error::CameraError;
use crate::service::CrowdService;

pub(crate) enum Reply {
    Json(u16, Vec<u8>),
    Jpeg { camera_id: String, body: Vec<u8> },
    NoContent,
    Stream {
        camera_id: Option<String>,
        with_boxes: bool,
    },
}

pub(crate) fn route(request: &HttpRequest, service: &CrowdService) -> Reply {
    let segments = request.segments();
    let segments: Vec<&str> = segments.iter().map(String::as_str).collect();
    let camera_id = request.query_param("camera_id");
    let manager = service.manager();

    match (request.method.as_str(), segments.as_slice()) {
        ("OPTIONS", _) => Reply::NoContent,
        ("GET", ["health"]) => json_reply(
            200,
            &json!({"status": "ok", "cameras": manager.list_cameras().len()}),
        ),

        ("GET", ["cameras"]) => json_reply(200, &manager.list_cameras()),
        ("POST", ["cameras"]) => match parse_body::<CameraConfig>(request) {
            Ok(config) => camera_reply(201, manager.add_camera(config)),
            Err(reply) => reply,
        },
        ("GET", ["cameras", id]) => camera_reply(200, manager.get_camera(id)),
        ("PATCH" | "PUT", ["cameras", id]) => match parse_body::<CameraUpdate>(request) {
            Ok(update) => camera_reply(200, manager.update_camera(id, update)),
            Err(reply) => reply,
        },
        ("DELETE", ["cameras", id]) => match manager.delete_camera(id) {
            Ok(config) => json_reply(200, &json!({"deleted": config.id})),
            Err(err) => error_reply(err.into()),
        },
        (_, ["cameras"]) | (_, ["cameras", _]) => json_error(405, "method_not_allowed"),

        ("GET", ["frame"]) => match service.frame_jpeg(camera_id) {
            Ok((camera_id, body)) => Reply::Jpeg { camera_id, body },
            Err(err) => error_reply(err),
        },
        ("GET", ["get-frame"]) => result_reply(service.snapshot(camera_id)),
        ("GET", ["get-image-with-boxes"]) => result_reply(service.frame_report(camera_id)),
        ("GET", ["detect"]) => result_reply(service.detect(camera_id)),
        ("GET", ["coordinates"]) => result_reply(service.coordinates(camera_id)),
        ("GET", ["analytics"]) => result_reply(service.analytics(camera_id)),
        ("GET", ["analytics", "all"]) => json_reply(200, &service.analytics_all()),
        ("GET", ["stream"]) | ("GET", ["stream-with-boxes"]) => {
            if let Some(id) = camera_id {
                if let Err(err) = manager.get_camera(id) {
                    return error_reply(err.into());
                }
            }
            Reply::Stream {
                camera_id: camera_id.map(str::to_string),
                with_boxes: segments == ["stream-with-boxes"],
            }
        }
        (_, [
            "frame" | "get-frame" | "get-image-with-boxes" | "detect" | "coordinates" | "analytics"
            | "stream" | "stream-with-boxes",
        ]) => json_error(405, "method_not_allowed"),
        _ => json_error(404, "not_found"),
    }
}

fn parse_body<T: DeserializeOwned>(request: &HttpRequest) -> Result<T, Reply> {
    serde_json::from_slice(&request.body)
        .map_err(|err| json_error(400, &format!("invalid JSON body: {}", err)))
}

fn camera_reply<T: Serialize>(status: u16, result: Result<T, CameraError>) -> Reply {
    match result {
        Ok(value) => json_reply(status, &value),
        Err(err) => error_reply(err.into()),
    }
}

fn result_reply<T: Serialize>(result: anyhow::Result<T>) -> Reply {
    match result {
        Ok(value) => json_reply(200, &value),
        Err(err) => error_reply(err),
    }
}

fn json_reply<T: Serialize + ?Sized>(status: u16, value: &T) -> Reply {
    match serde_json::to_vec(value) {
        Ok(body) => Reply::Json(status, body),
        Err(err) => {
            log::error!("api: failed to serialize response: {}", err);
            json_error(500, "internal_error")
        }
    }
}

pub(crate) fn json_error(status: u16, message: &str) -> Reply {
    Reply::Json(status, json!({ "error": message }).to_string().into_bytes())
}

fn error_reply(err: anyhow::Error) -> Reply {
    match err.downcast_ref::<CameraError>() {
        Some(camera_err) => json_error(camera_err.http_status(), &camera_err.to_string()),
        None => {
            log::warn!("api: request failed: {:#}", err);
            json_error(500, "internal_error")
        }
    }
}
