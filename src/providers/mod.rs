//! Uniform interface over the upstream text-generation providers.

pub mod adapter;
pub mod gemini;
pub mod groq;
pub mod sse;
pub mod think;

pub use adapter::{
    prepare_history, GenerateRequest, LiveProviderAdapter, ProviderAdapter, ScriptedAdapter,
    TokenStream,
};
pub use think::{strip_think_spans, ThinkSplitter};

/// Closed set of model ids accepted on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelId {
    GeminiPro25,
    Llama4Scout,
    DeepseekR1,
    GptOss120b,
}

/// Which upstream API family a model talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderFamily {
    Gemini,
    Groq,
}

/// Per-model capabilities, resolved once instead of string-branching at
/// every call site.
#[derive(Debug, Clone, Copy)]
pub struct ProviderCaps {
    pub family: ProviderFamily,
    /// Maximum number of whole history messages sent as context.
    pub history_cap: usize,
    /// Whether output is paced through the rate smoother.
    pub smoothed: bool,
    /// Automatic retry target on quota exhaustion.
    pub fallback: Option<ModelId>,
}

impl ModelId {
    pub const ALL: [ModelId; 4] = [
        ModelId::GeminiPro25,
        ModelId::Llama4Scout,
        ModelId::DeepseekR1,
        ModelId::GptOss120b,
    ];

    pub fn parse(s: &str) -> Option<ModelId> {
        match s {
            "gemini-pro-2-5" => Some(ModelId::GeminiPro25),
            "llama-4-scout" => Some(ModelId::Llama4Scout),
            "deepseek-r1" => Some(ModelId::DeepseekR1),
            "openai/gpt-oss-120b" => Some(ModelId::GptOss120b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ModelId::GeminiPro25 => "gemini-pro-2-5",
            ModelId::Llama4Scout => "llama-4-scout",
            ModelId::DeepseekR1 => "deepseek-r1",
            ModelId::GptOss120b => "openai/gpt-oss-120b",
        }
    }

    pub fn caps(&self) -> ProviderCaps {
        match self {
            ModelId::GeminiPro25 => ProviderCaps {
                family: ProviderFamily::Gemini,
                history_cap: 40,
                smoothed: true,
                fallback: None,
            },
            ModelId::Llama4Scout => ProviderCaps {
                family: ProviderFamily::Groq,
                history_cap: 20,
                smoothed: false,
                fallback: None,
            },
            ModelId::DeepseekR1 => ProviderCaps {
                family: ProviderFamily::Groq,
                history_cap: 20,
                smoothed: false,
                fallback: Some(ModelId::GeminiPro25),
            },
            ModelId::GptOss120b => ProviderCaps {
                family: ProviderFamily::Groq,
                history_cap: 20,
                smoothed: false,
                fallback: None,
            },
        }
    }

    /// The concrete upstream model name. The think toggle selects a
    /// different upstream variant for some models.
    pub fn upstream_name(&self, think: bool) -> &'static str {
        match self {
            ModelId::GeminiPro25 => {
                if think {
                    "gemini-2.5-pro"
                } else {
                    "gemini-2.5-flash"
                }
            }
            ModelId::Llama4Scout => {
                if think {
                    "qwen/qwen3-32b"
                } else {
                    "meta-llama/llama-4-scout-17b-16e-instruct"
                }
            }
            ModelId::DeepseekR1 => "deepseek-r1-distill-llama-70b",
            ModelId::GptOss120b => "openai/gpt-oss-120b",
        }
    }
}

/// Upstream failure with enough structure for the orchestrator to decide
/// between fallback and rollback.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct GenerateError {
    pub code: Option<String>,
    pub message: String,
}

impl GenerateError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: message.into(),
        }
    }

    pub fn with_code(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: Some(code.into()),
            message: message.into(),
        }
    }

    /// Quota/"tokens per minute" exhaustion is the only failure class
    /// eligible for the automatic provider fallback.
    pub fn is_quota_exhausted(&self) -> bool {
        self.code.as_deref() == Some("rate_limit_exceeded")
            || self.message.contains("tokens per minute")
    }
}

/// One normalized streaming item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenEvent {
    Content(String),
    Thought(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_round_trips_all_models() {
        for model in ModelId::ALL {
            assert_eq!(ModelId::parse(model.as_str()), Some(model));
        }
        assert_eq!(ModelId::parse("gpt-5"), None);
    }

    #[test]
    fn quota_classification() {
        let quota = GenerateError::with_code("rate_limit_exceeded", "Request too large for model");
        assert!(quota.is_quota_exhausted());

        let quota_by_text = GenerateError::new("Limit reached: 6000 tokens per minute");
        assert!(quota_by_text.is_quota_exhausted());

        let fatal = GenerateError::new("upstream connection reset");
        assert!(!fatal.is_quota_exhausted());
    }

    #[test]
    fn only_deepseek_carries_a_fallback() {
        for model in ModelId::ALL {
            let caps = model.caps();
            if model == ModelId::DeepseekR1 {
                assert_eq!(caps.fallback, Some(ModelId::GeminiPro25));
            } else {
                assert_eq!(caps.fallback, None);
            }
        }
    }
}
