/// Control-plane and frame-read failures surfaced to callers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CameraError {
    NotFound(String),
    AlreadyExists(String),
    InvalidInput(String),
    /// No frame is available: the named camera (or, for `None`, every camera)
    /// has nothing in its slot.
    SourceUnavailable(Option<String>),
}

impl CameraError {
    pub fn code(&self) -> &'static str {
        match self {
            CameraError::NotFound(_) => "CAMERA_NOT_FOUND",
            CameraError::AlreadyExists(_) => "CAMERA_ALREADY_EXISTS",
            CameraError::InvalidInput(_) => "INVALID_INPUT",
            CameraError::SourceUnavailable(_) => "SOURCE_UNAVAILABLE",
        }
    }

    pub fn http_status(&self) -> u16 {
        match self {
            CameraError::NotFound(_) => 404,
            CameraError::AlreadyExists(_) => 409,
            CameraError::InvalidInput(_) => 400,
            CameraError::SourceUnavailable(_) => 503,
        }
    }
}

impl std::fmt::Display for CameraError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CameraError::NotFound(id) => write!(f, "camera '{}' not found", id),
            CameraError::AlreadyExists(id) => write!(f, "camera '{}' already exists", id),
            CameraError::InvalidInput(msg) => write!(f, "invalid input: {}", msg),
            CameraError::SourceUnavailable(_) => write!(f, "No frame available"),
        }
    }
}

impl std::error::Error for CameraError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_to_http_statuses() {
        assert_eq!(CameraError::NotFound("a".into()).http_status(), 404);
        assert_eq!(CameraError::AlreadyExists("a".into()).http_status(), 409);
        assert_eq!(CameraError::InvalidInput("x".into()).http_status(), 400);
        assert_eq!(CameraError::SourceUnavailable(None).http_status(), 503);
    }

    #[test]
    fn converts_into_anyhow() {
        let err: anyhow::Error = CameraError::NotFound("cam-9".into()).into();
        assert_eq!(err.to_string(), "camera 'cam-9' not found");
        assert!(err.downcast_ref::<CameraError>().is_some());
    }
}
