//! The static provider capability matrix: which provider handles which task
//! type, in what fallback order, and at what price.

use corvus_types::{CostRate, LocalTier, Provider, ProviderConfig, TaskType};

/// The routing policy for one task type. Every [`TaskType`] variant has an
/// entry; completeness is asserted by `capability_matrix_is_complete` in
/// tests rather than enforced by the type system, since the match below is
/// the one place that can exhaustively enumerate them.
pub fn capability_for(task_type: TaskType) -> ProviderConfig {
    use Provider::*;
    match task_type {
        TaskType::CodeGeneration => ProviderConfig {
            primary: Claude,
            fallbacks: &[Openai, Ollama],
            rationale: "Claude leads on multi-file code generation; GPT is close behind, Ollama covers an offline fallback",
        },
        TaskType::CodeReview => ProviderConfig {
            primary: Claude,
            fallbacks: &[Openai, Ollama],
            rationale: "review quality tracks code generation quality",
        },
        TaskType::CodeDebugging => ProviderConfig {
            primary: Claude,
            fallbacks: &[Openai, Ollama],
            rationale: "long-context reasoning over stack traces favors Claude",
        },
        TaskType::ComplexReasoning => ProviderConfig {
            primary: Openai,
            fallbacks: &[Claude, Gemini],
            rationale: "reserved for the router's highest-confidence complex-task classification; GPT's reasoning models lead here",
        },
        TaskType::MathAnalysis => ProviderConfig {
            primary: Openai,
            fallbacks: &[Claude, Gemini],
            rationale: "GPT's structured step-by-step output suits numeric work",
        },
        TaskType::LongDocument => ProviderConfig {
            primary: Gemini,
            fallbacks: &[Claude, Openai],
            rationale: "1M-token context window dwarfs the other two remote providers",
        },
        TaskType::Summarization => ProviderConfig {
            primary: Gemini,
            fallbacks: &[Claude, Ollama],
            rationale: "cheapest provider adequate for a low-risk task",
        },
        TaskType::CreativeWriting => ProviderConfig {
            primary: Claude,
            fallbacks: &[Openai, Gemini],
            rationale: "tone and style consistency favors Claude",
        },
        TaskType::SimpleQa => ProviderConfig {
            primary: Ollama,
            fallbacks: &[Gemini, Claude],
            rationale: "local inference is free and fast enough for simple answers",
        },
        TaskType::Classification => ProviderConfig {
            primary: Ollama,
            fallbacks: &[Gemini, Claude],
            rationale: "high call volume, low per-call stakes",
        },
        TaskType::DataExtraction => ProviderConfig {
            primary: Ollama,
            fallbacks: &[Gemini, Openai],
            rationale: "lightweight structured extraction; local inference is free and adequate",
        },
        TaskType::Conversation => ProviderConfig {
            primary: Claude,
            fallbacks: &[Openai, Ollama],
            rationale: "default conversational voice",
        },
        TaskType::ProfileExtraction => ProviderConfig {
            primary: Ollama,
            fallbacks: &[Gemini, Openai],
            rationale: "lightweight structured extraction from chat history; local inference is free and adequate",
        },
        TaskType::TaskParsing => ProviderConfig {
            primary: Ollama,
            fallbacks: &[Gemini, Claude],
            rationale: "high volume, low stakes, same tier as classification",
        },
        TaskType::HeartbeatDecision => ProviderConfig {
            primary: Ollama,
            fallbacks: &[Gemini],
            rationale: "runs every beat; must stay free or near-free",
        },
    }
}

/// USD cost per million input/output tokens. Ollama is always free since
/// it runs locally.
pub fn cost_rate(provider: Provider) -> CostRate {
    match provider {
        Provider::Claude => CostRate::new(3.0, 15.0),
        Provider::Openai => CostRate::new(2.5, 10.0),
        Provider::Gemini => CostRate::new(0.075, 0.30),
        Provider::Ollama => CostRate::FREE,
    }
}

/// Static description of a locally hosted model, used to decide whether a
/// heavier Ollama model is worth selecting for a given task.
#[derive(Debug, Clone, Copy)]
pub struct LocalModelInfo {
    pub name: &'static str,
    pub tier: LocalTier,
    pub context_tokens: u32,
}

pub const LOCAL_MODELS: &[LocalModelInfo] = &[
    LocalModelInfo {
        name: "llama3.2:3b",
        tier: LocalTier::Small,
        context_tokens: 8_192,
    },
    LocalModelInfo {
        name: "llama3.1:8b",
        tier: LocalTier::Medium,
        context_tokens: 32_768,
    },
    LocalModelInfo {
        name: "llama3.1:70b",
        tier: LocalTier::Large,
        context_tokens: 32_768,
    },
    LocalModelInfo {
        name: "qwen2.5:32b",
        tier: LocalTier::Large,
        context_tokens: 32_768,
    },
];

pub fn local_model_by_name(name: &str) -> Option<&'static LocalModelInfo> {
    LOCAL_MODELS.iter().find(|m| m.name == name)
}

/// Best-effort tier for a model name we don't have a static entry for.
/// Unknown names default to `Small` since that's the safe (least-capable)
/// assumption for deciding whether local inference is good enough.
pub fn tier_of(model_name: &str) -> LocalTier {
    if let Some(info) = local_model_by_name(model_name) {
        return info.tier;
    }
    if model_name.starts_with("llama3.1:70b") || model_name.starts_with("qwen2.5:32b") {
        LocalTier::Large
    } else if model_name.starts_with("llama3.1:8b") || model_name.starts_with("mixtral") {
        LocalTier::Medium
    } else {
        LocalTier::Small
    }
}

/// Task types a given local tier is trusted to handle unsupervised. Lower
/// tiers only cover cheap, low-stakes work; `Large` additionally covers
/// everything `Medium` does, and so on.
fn tier_capabilities(tier: LocalTier) -> &'static [TaskType] {
    const SMALL: &[TaskType] = &[
        TaskType::SimpleQa,
        TaskType::Classification,
        TaskType::TaskParsing,
        TaskType::HeartbeatDecision,
    ];
    const MEDIUM: &[TaskType] = &[
        TaskType::SimpleQa,
        TaskType::Classification,
        TaskType::TaskParsing,
        TaskType::HeartbeatDecision,
        TaskType::Summarization,
        TaskType::Conversation,
        TaskType::DataExtraction,
        TaskType::ProfileExtraction,
    ];
    const LARGE: &[TaskType] = &[
        TaskType::SimpleQa,
        TaskType::Classification,
        TaskType::TaskParsing,
        TaskType::HeartbeatDecision,
        TaskType::Summarization,
        TaskType::Conversation,
        TaskType::DataExtraction,
        TaskType::ProfileExtraction,
        TaskType::CodeGeneration,
        TaskType::CodeReview,
        TaskType::CodeDebugging,
    ];
    match tier {
        LocalTier::Small => SMALL,
        LocalTier::Medium => MEDIUM,
        LocalTier::Large => LARGE,
    }
}

/// Whether a locally hosted model of the given name is trusted to handle
/// this task type on its own, without falling through to a remote provider.
pub fn can_local_handle(task_type: TaskType, model_name: &str) -> bool {
    tier_capabilities(tier_of(model_name)).contains(&task_type)
}

/// Picks the provider to use for a task, given which providers currently
/// have usable credentials/health.
///
/// Order of decision (matrix order is authoritative — a capable `Ollama` is
/// never preferred over the matrix's primary for a code/reasoning/
/// long-document task just because it happens to be available):
/// 1. `force_local` returns `Ollama` unconditionally (the caller is expected
///    to have already confirmed Ollama is reachable).
/// 2. Take `(primary, fallbacks)` from the matrix. If `force_cloud`, drop
///    `Ollama` from the candidate list.
/// 3. Walk `[primary] ++ fallbacks` in order. For each candidate: if it's
///    `Ollama`, additionally require `can_local_handle`; otherwise require
///    membership in `available_providers`. Return the first match.
/// 4. If none match, return any member of `available_providers`, falling
///    back further to the bare primary if `available_providers` is empty
///    (the caller's retry/fallback layer will surface the resulting
///    connection failure).
pub fn provider_for_task(
    task_type: TaskType,
    available_providers: &[corvus_types::Provider],
    local_model: Option<&str>,
    force_local: bool,
    force_cloud: bool,
) -> corvus_types::Provider {
    use corvus_types::Provider;

    if force_local {
        return Provider::Ollama;
    }

    let config = capability_for(task_type);
    let candidates: Vec<Provider> = std::iter::once(config.primary)
        .chain(config.fallbacks.iter().copied())
        .filter(|p| !force_cloud || *p != Provider::Ollama)
        .collect();

    let matched = candidates.iter().copied().find(|&candidate| {
        let present = available_providers.contains(&candidate);
        if candidate == Provider::Ollama {
            present && local_model.is_some_and(|name| can_local_handle(task_type, name))
        } else {
            present
        }
    });
    if let Some(provider) = matched {
        return provider;
    }

    available_providers
        .first()
        .copied()
        .unwrap_or(config.primary)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capability_matrix_is_complete_and_well_formed() {
        for &task_type in TaskType::ALL {
            let config = capability_for(task_type);
            assert!(
                config.is_well_formed(),
                "task type {:?} has an empty fallback list",
                task_type
            );
        }
    }

    #[test]
    fn fallback_order_never_repeats_the_primary() {
        for &task_type in TaskType::ALL {
            let config = capability_for(task_type);
            assert!(!config.fallbacks.contains(&config.primary));
        }
    }

    #[test]
    fn ollama_is_always_free() {
        assert_eq!(cost_rate(Provider::Ollama).cost_usd(1_000_000, 1_000_000), 0.0);
    }

    #[test]
    fn remote_providers_have_nonzero_cost() {
        assert!(cost_rate(Provider::Claude).cost_usd(1_000_000, 0) > 0.0);
        assert!(cost_rate(Provider::Openai).cost_usd(1_000_000, 0) > 0.0);
        assert!(cost_rate(Provider::Gemini).cost_usd(1_000_000, 0) > 0.0);
    }

    #[test]
    fn unknown_model_defaults_to_small_tier() {
        assert_eq!(tier_of("some-unreleased-model:1b"), LocalTier::Small);
    }

    #[test]
    fn large_tier_subsumes_medium_and_small_capabilities() {
        let small = tier_capabilities(LocalTier::Small);
        let medium = tier_capabilities(LocalTier::Medium);
        let large = tier_capabilities(LocalTier::Large);
        for t in small {
            assert!(medium.contains(t));
            assert!(large.contains(t));
        }
        for t in medium {
            assert!(large.contains(t));
        }
    }

    #[test]
    fn can_local_handle_respects_tier_ceiling() {
        assert!(can_local_handle(TaskType::SimpleQa, "llama3.2:3b"));
        assert!(!can_local_handle(TaskType::CodeGeneration, "llama3.2:3b"));
        assert!(can_local_handle(TaskType::CodeGeneration, "llama3.1:70b"));
        assert!(!can_local_handle(TaskType::ComplexReasoning, "qwen2.5:32b"));
    }

    #[test]
    fn force_local_always_returns_ollama() {
        let provider = provider_for_task(TaskType::ComplexReasoning, &[], None, true, false);
        assert_eq!(provider, Provider::Ollama);
    }

    #[test]
    fn force_cloud_skips_ollama_even_when_available() {
        let available = [Provider::Ollama, Provider::Claude];
        let provider =
            provider_for_task(TaskType::SimpleQa, &available, Some("llama3.1:8b"), false, true);
        assert_eq!(provider, Provider::Claude);
    }

    #[test]
    fn falls_through_capability_matrix_when_primary_unavailable() {
        let available = [Provider::Openai, Provider::Ollama];
        let provider = provider_for_task(TaskType::CodeGeneration, &available, None, false, false);
        assert_eq!(provider, Provider::Openai);
    }

    #[test]
    fn prefers_local_when_model_is_trusted_for_task() {
        let available = [Provider::Ollama, Provider::Claude];
        let provider = provider_for_task(
            TaskType::Classification,
            &available,
            Some("llama3.1:8b"),
            false,
            false,
        );
        assert_eq!(provider, Provider::Ollama);
    }

    #[test]
    fn reasoning_and_math_tasks_use_openai() {
        assert_eq!(capability_for(TaskType::ComplexReasoning).primary, Provider::Openai);
        assert_eq!(capability_for(TaskType::MathAnalysis).primary, Provider::Openai);
    }

    #[test]
    fn long_document_uses_gemini_for_its_context_window() {
        assert_eq!(capability_for(TaskType::LongDocument).primary, Provider::Gemini);
    }

    #[test]
    fn lightweight_extraction_tasks_use_ollama() {
        assert_eq!(capability_for(TaskType::DataExtraction).primary, Provider::Ollama);
        assert_eq!(capability_for(TaskType::ProfileExtraction).primary, Provider::Ollama);
    }
}
