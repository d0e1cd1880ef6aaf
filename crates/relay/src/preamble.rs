use axum::http::HeaderMap;
use localchat_core::llm::ChatRequest;
use serde_json::{json, Map, Value};

pub const USER_NAME_HEADER: &str = "x-user-name";

/// Display name for the system instruction: header, then body, then the
/// configured default. Blank values are skipped.
pub fn display_name(headers: &HeaderMap, req: &ChatRequest, default: &str) -> String {
    let from_header = headers
        .get(USER_NAME_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty());
    let from_body = req
        .user_name
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty());
    from_header.or(from_body).unwrap_or(default).to_string()
}

pub fn system_instruction(name: &str) -> String {
    format!(
        "You are a helpful assistant. The user's name is {}.\n\
         Address them by name when natural, and do not invent a different name.",
        name
    )
}

pub fn wrap_prompt(name: &str, prompt: &str) -> String {
    format!("{}\n\nUSER: {}\nASSISTANT:", system_instruction(name), prompt)
}

/// Upstream body: the caller's fields unchanged, with `stream`,
/// `keep_alive` and the wrapped `prompt` set by the relay.
pub fn upstream_body(req: &ChatRequest, name: &str, stream: bool, keep_alive: u64) -> Value {
    let mut body: Map<String, Value> = req.extra.clone();
    if let Some(user_name) = &req.user_name {
        body.insert("userName".to_string(), json!(user_name));
    }
    body.insert("stream".to_string(), json!(stream));
    body.insert("keep_alive".to_string(), json!(keep_alive));
    body.insert("prompt".to_string(), json!(wrap_prompt(name, &req.prompt)));
    Value::Object(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn req(json: &str) -> ChatRequest {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn header_beats_body_beats_default() {
        let mut headers = HeaderMap::new();
        let r = req(r#"{"prompt":"Hi","userName":"Bob"}"#);
        assert_eq!(display_name(&headers, &r, "Friend"), "Bob");

        headers.insert(USER_NAME_HEADER, HeaderValue::from_static("Alice"));
        assert_eq!(display_name(&headers, &r, "Friend"), "Alice");

        let plain = req(r#"{"prompt":"Hi"}"#);
        assert_eq!(display_name(&HeaderMap::new(), &plain, "Friend"), "Friend");
    }

    #[test]
    fn blank_names_fall_through() {
        let mut headers = HeaderMap::new();
        headers.insert(USER_NAME_HEADER, HeaderValue::from_static("  "));
        let r = req(r#"{"prompt":"Hi","userName":""}"#);
        assert_eq!(display_name(&headers, &r, "Friend"), "Friend");
    }

    #[test]
    fn body_keeps_caller_fields_and_wraps_prompt() {
        let r = req(r#"{"prompt":"Hi","model":"x","max_tokens":64,"stream":false}"#);
        let body = upstream_body(&r, "Alice", true, 6000);
        assert_eq!(body["model"], "x");
        assert_eq!(body["max_tokens"], 64);
        assert_eq!(body["stream"], true);
        assert_eq!(body["keep_alive"], 6000);
        let prompt = body["prompt"].as_str().unwrap();
        assert!(prompt.starts_with("You are a helpful assistant. The user's name is Alice."));
        assert!(prompt.ends_with("\n\nUSER: Hi\nASSISTANT:"));
        assert_eq!(body.as_object().unwrap().len(), 5);
    }
}
