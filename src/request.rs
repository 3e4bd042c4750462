use serde::Serialize;

use crate::error::ChatError;
use crate::session::Role;
use crate::settings::EffectiveSettings;

#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub model: String,
    pub system_prompt: String,
    pub user_turn: String,
    pub temperature: f32,
    pub top_p: f32,
    pub max_tokens: u32,
    pub stream: bool,
}

impl GenerationRequest {
    /// Validates sampling parameters and assembles a streaming request.
    pub fn build(
        model: &str,
        system_prompt: &str,
        user_turn: &str,
        temperature: f32,
        top_p: f32,
        max_tokens: u32,
    ) -> Result<Self, ChatError> {
        check_not_blank("model", model)?;
        check_not_blank("message", user_turn)?;
        check_unit_interval("temperature", temperature)?;
        check_unit_interval("top_p", top_p)?;
        check_max_tokens(max_tokens)?;
        Ok(Self {
            model: model.to_string(),
            system_prompt: system_prompt.to_string(),
            user_turn: user_turn.to_string(),
            temperature,
            top_p,
            max_tokens,
            stream: true,
        })
    }

    pub fn from_settings(settings: &EffectiveSettings, user_turn: &str) -> Result<Self, ChatError> {
        Self::build(
            &settings.model,
            &settings.system_prompt,
            user_turn,
            settings.temperature,
            settings.top_p,
            settings.max_tokens,
        )
    }

    /// Body for the chat endpoint. Only the system prompt and the current
    /// turn are sent; earlier turns stay local.
    pub fn to_body(&self) -> ChatBody<'_> {
        ChatBody {
            model: &self.model,
            messages: vec![
                WireMessage { role: Role::System.as_str(), content: &self.system_prompt },
                WireMessage { role: Role::User.as_str(), content: &self.user_turn },
            ],
            temperature: self.temperature,
            top_p: self.top_p,
            max_tokens: self.max_tokens,
            stream: self.stream,
        }
    }
}

pub(crate) fn check_not_blank(name: &'static str, value: &str) -> Result<(), ChatError> {
    if value.trim().is_empty() {
        return Err(ChatError::invalid(name, "must not be empty"));
    }
    Ok(())
}

pub(crate) fn check_max_tokens(value: u32) -> Result<(), ChatError> {
    if value == 0 {
        return Err(ChatError::invalid("max_tokens", "must be greater than 0"));
    }
    Ok(())
}

pub(crate) fn check_unit_interval(name: &'static str, value: f32) -> Result<(), ChatError> {
    // NaN fails the range check too
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ChatError::invalid(name, format!("must lie in [0, 1], got {value}")))
    }
}

#[derive(Debug, Serialize)]
pub struct ChatBody<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    temperature: f32,
    top_p: f32,
    max_tokens: u32,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_always_streams() {
        let req = GenerationRequest::build("llama3.2:1b", "sys", "hello", 0.7, 0.9, 500).unwrap();
        assert!(req.stream);
        assert_eq!(req.max_tokens, 500);
    }

    #[test]
    fn rejects_out_of_range_sampling_parameters() {
        let err = GenerationRequest::build("m", "s", "u", 1.5, 0.9, 10).unwrap_err();
        assert!(matches!(err, ChatError::InvalidParameter { name: "temperature", .. }));
        let err = GenerationRequest::build("m", "s", "u", 0.5, -0.1, 10).unwrap_err();
        assert!(matches!(err, ChatError::InvalidParameter { name: "top_p", .. }));
        let err = GenerationRequest::build("m", "s", "u", f32::NAN, 0.5, 10).unwrap_err();
        assert!(matches!(err, ChatError::InvalidParameter { name: "temperature", .. }));
        let err = GenerationRequest::build("m", "s", "u", 0.5, 0.5, 0).unwrap_err();
        assert!(matches!(err, ChatError::InvalidParameter { name: "max_tokens", .. }));
    }

    #[test]
    fn interval_bounds_are_inclusive() {
        assert!(GenerationRequest::build("m", "s", "u", 0.0, 1.0, 1).is_ok());
        assert!(GenerationRequest::build("m", "s", "u", 1.0, 0.0, 1).is_ok());
    }

    #[test]
    fn rejects_blank_turn() {
        let err = GenerationRequest::build("m", "s", "   ", 0.5, 0.5, 10).unwrap_err();
        assert!(matches!(err, ChatError::InvalidParameter { name: "message", .. }));
    }

    #[test]
    fn body_sends_system_then_current_turn_only() {
        let req = GenerationRequest::build("m", "be nice", "hi", 0.5, 0.25, 42).unwrap();
        let v = serde_json::to_value(req.to_body()).unwrap();
        assert_eq!(
            v,
            serde_json::json!({
                "model": "m",
                "messages": [
                    {"role": "system", "content": "be nice"},
                    {"role": "user", "content": "hi"}
                ],
                "temperature": 0.5,
                "top_p": 0.25,
                "max_tokens": 42,
                "stream": true
            })
        );
    }
}
