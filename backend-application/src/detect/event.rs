use serde_json::Value;

use backend_domain::DetectionEvent;

use crate::AppError;

/// Reads a detection event either bare or wrapped in a scheduler envelope
/// (`{"source": ..., "detail-type": ..., "detail": {...}}`).
pub fn parse_detection_event(payload: Value) -> Result<DetectionEvent, AppError> {
    let body = match payload {
        Value::Null => return Ok(DetectionEvent::default()),
        Value::Object(mut map) => match map.remove("detail") {
            Some(Value::Object(detail)) => Value::Object(detail),
            Some(Value::Null) => return Ok(DetectionEvent::default()),
            Some(_) => {
                return Err(AppError::BadRequest(
                    "event detail must be an object".to_string(),
                ))
            }
            None => Value::Object(map),
        },
        _ => {
            return Err(AppError::BadRequest(
                "detection event must be a JSON object".to_string(),
            ))
        }
    };
    serde_json::from_value(body)
        .map_err(|err| AppError::BadRequest(format!("invalid detection event: {}", err)))
}
