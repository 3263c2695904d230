// ctx-assist-cli/src/input.rs
use ctx_assist_core::ChatRequest;

/// Turns a line typed at the prompt into a request.
///
/// `/name rest` names a command explicitly; anything else is free text for
/// keyword matching. Unknown command names are passed through as-is and
/// the router falls back to the keywords in `rest`.
pub fn parse_line(line: &str) -> ChatRequest {
    let line = line.trim();
    match line.strip_prefix('/') {
        Some(body) => {
            let (name, rest) = body.split_once(char::is_whitespace).unwrap_or((body, ""));
            ChatRequest::command(name, rest.trim())
        }
        None => ChatRequest::freeform(line),
    }
}

/// Builds the request for one-shot mode from `--command` and `--prompt`.
pub fn one_shot_request(command: Option<&str>, prompt: Option<&str>) -> ChatRequest {
    match command {
        Some(command) => {
            ChatRequest::command(command.trim_start_matches('/'), prompt.unwrap_or("").trim())
        }
        None => parse_line(prompt.unwrap_or("")),
    }
}
