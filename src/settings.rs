use serde::{Deserialize, Serialize};

use crate::error::ChatError;
use crate::request::{check_max_tokens, check_not_blank, check_unit_interval};

pub const DEFAULT_MODEL: &str = "llama3.2:1b";
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful AI assistant.";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ModelParams {
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub top_p: Option<f32>,
}

/// What the user picked in the sidebar for this session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct SessionSettings {
    pub model: Option<String>,
    pub system_prompt: Option<String>,
    pub model_params: Option<ModelParams>,
    pub theme: Option<Theme>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct SessionSettingsPatch {
    pub model: Option<String>,
    pub system_prompt: Option<String>,
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub max_tokens: Option<u32>,
    pub theme: Option<Theme>,
}

impl SessionSettingsPatch {
    /// Rejects values a chat request built from them would fail on.
    pub fn validate(&self) -> Result<(), ChatError> {
        if let Some(model) = &self.model {
            check_not_blank("model", model)?;
        }
        if let Some(t) = self.temperature {
            check_unit_interval("temperature", t)?;
        }
        if let Some(p) = self.top_p {
            check_unit_interval("top_p", p)?;
        }
        if let Some(n) = self.max_tokens {
            check_max_tokens(n)?;
        }
        Ok(())
    }
}

impl SessionSettings {
    pub fn apply_patch(&mut self, patch: SessionSettingsPatch) {
        if let Some(model) = patch.model {
            self.model = Some(model);
        }
        if let Some(prompt) = patch.system_prompt {
            self.system_prompt = Some(prompt);
        }
        if patch.temperature.is_some() || patch.top_p.is_some() || patch.max_tokens.is_some() {
            let params = self.model_params.get_or_insert_with(ModelParams::default);
            params.temperature = patch.temperature.or(params.temperature);
            params.top_p = patch.top_p.or(params.top_p);
            params.max_tokens = patch.max_tokens.or(params.max_tokens);
        }
        if let Some(theme) = patch.theme {
            self.theme = Some(theme);
        }
    }
}

/// Process-wide fallbacks, taken from the command line.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GlobalConfigDefaults {
    pub default_model: String,
    pub system_prompt: String,
    pub temperature: f32,
    pub top_p: f32,
    pub max_tokens: u32,
    pub theme: Theme,
}

impl Default for GlobalConfigDefaults {
    fn default() -> Self {
        Self {
            default_model: DEFAULT_MODEL.into(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.into(),
            temperature: 0.7,
            top_p: 0.9,
            max_tokens: 500,
            theme: Theme::Light,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct RequestOverrides {
    pub model: Option<String>,
    pub system_prompt: Option<String>,
    pub model_params: Option<ModelParams>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EffectiveSettings {
    pub model: String,
    pub system_prompt: String,
    pub temperature: f32,
    pub top_p: f32,
    pub max_tokens: u32,
    pub theme: Theme,
}

pub fn resolve_effective_settings(
    global: &GlobalConfigDefaults,
    session: &SessionSettings,
    request: &RequestOverrides,
) -> EffectiveSettings {
    let model = request
        .model
        .clone()
        .or_else(|| session.model.clone())
        .unwrap_or_else(|| global.default_model.clone());

    let system_prompt = request
        .system_prompt
        .clone()
        .or_else(|| session.system_prompt.clone())
        .unwrap_or_else(|| global.system_prompt.clone());

    let temperature = request
        .model_params
        .as_ref()
        .and_then(|p| p.temperature)
        .or_else(|| session.model_params.as_ref().and_then(|p| p.temperature))
        .unwrap_or(global.temperature);
    let top_p = request
        .model_params
        .as_ref()
        .and_then(|p| p.top_p)
        .or_else(|| session.model_params.as_ref().and_then(|p| p.top_p))
        .unwrap_or(global.top_p);
    let max_tokens = request
        .model_params
        .as_ref()
        .and_then(|p| p.max_tokens)
        .or_else(|| session.model_params.as_ref().and_then(|p| p.max_tokens))
        .unwrap_or(global.max_tokens);

    EffectiveSettings {
        model,
        system_prompt,
        temperature,
        top_p,
        max_tokens,
        theme: session.theme.unwrap_or(global.theme),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn precedence_request_over_session_over_global() {
        let global = GlobalConfigDefaults::default();

        let session = SessionSettings {
            model: Some("session-model".into()),
            system_prompt: Some("Be terse.".into()),
            model_params: Some(ModelParams {
                temperature: Some(0.2),
                max_tokens: None,
                top_p: None,
            }),
            theme: Some(Theme::Dark),
        };

        let request = RequestOverrides {
            model: Some("request-model".into()),
            system_prompt: None,
            model_params: Some(ModelParams {
                temperature: None,
                max_tokens: Some(200),
                top_p: None,
            }),
        };

        let eff = resolve_effective_settings(&global, &session, &request);

        assert_eq!(eff.model, "request-model");
        assert_eq!(eff.system_prompt, "Be terse."); // from session
        assert_eq!(eff.temperature, 0.2); // from session
        assert_eq!(eff.max_tokens, 200); // from request
        assert_eq!(eff.top_p, 0.9); // from global
        assert_eq!(eff.theme, Theme::Dark);
    }

    #[test]
    fn empty_layers_fall_back_to_defaults() {
        let eff = resolve_effective_settings(
            &GlobalConfigDefaults::default(),
            &SessionSettings::default(),
            &RequestOverrides::default(),
        );
        assert_eq!(eff.model, DEFAULT_MODEL);
        assert_eq!(eff.system_prompt, DEFAULT_SYSTEM_PROMPT);
        assert_eq!(eff.max_tokens, 500);
        assert_eq!(eff.theme, Theme::Light);
    }

    #[test]
    fn patch_only_touches_present_fields() {
        let mut s = SessionSettings {
            model: Some("a".into()),
            model_params: Some(ModelParams { temperature: Some(0.1), max_tokens: Some(50), top_p: None }),
            ..Default::default()
        };
        s.apply_patch(SessionSettingsPatch {
            top_p: Some(0.5),
            theme: Some(Theme::Dark),
            ..Default::default()
        });
        assert_eq!(s.model.as_deref(), Some("a"));
        let p = s.model_params.unwrap();
        assert_eq!(p.temperature, Some(0.1));
        assert_eq!(p.max_tokens, Some(50));
        assert_eq!(p.top_p, Some(0.5));
        assert_eq!(s.theme, Some(Theme::Dark));
    }

    #[test]
    fn patch_values_are_checked_like_a_request() {
        let ok = SessionSettingsPatch {
            model: Some("qwen2:7b".into()),
            temperature: Some(0.0),
            top_p: Some(1.0),
            max_tokens: Some(10),
            ..Default::default()
        };
        assert!(ok.validate().is_ok());
        assert!(SessionSettingsPatch::default().validate().is_ok());

        let bad = [
            (SessionSettingsPatch { temperature: Some(5.0), ..Default::default() }, "temperature"),
            (SessionSettingsPatch { top_p: Some(-0.1), ..Default::default() }, "top_p"),
            (SessionSettingsPatch { max_tokens: Some(0), ..Default::default() }, "max_tokens"),
            (SessionSettingsPatch { model: Some("  ".into()), ..Default::default() }, "model"),
        ];
        for (patch, field) in bad {
            let err = patch.validate().unwrap_err();
            assert!(matches!(err, ChatError::InvalidParameter { name, .. } if name == field));
        }
    }
}
