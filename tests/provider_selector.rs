use kaia::config::ProviderSettings;
use kaia::llm::{ChatModel, LlmClient, Provider};

fn no_env(_: &str) -> Option<String> {
    None
}

#[test]
fn every_provider_builds_a_client_without_credentials() {
    for provider in Provider::ALL {
        let settings = ProviderSettings::resolve(provider, None, None, no_env);
        let client = LlmClient::from_settings(settings, 256).unwrap();
        assert_eq!(client.provider(), provider);
        assert_eq!(client.model(), provider.default_model());
        assert_eq!(client.base_url(), provider.default_base_url());
    }
}

#[test]
fn github_client_with_token_and_custom_model() {
    let settings = ProviderSettings::resolve(Provider::Github, None, None, |key| match key {
        "GITHUB_TOKEN" => Some("fake-token".into()),
        "GITHUB_MODEL_NAME" => Some("custom-model".into()),
        _ => None,
    });
    assert_eq!(settings.api_key.as_deref(), Some("fake-token"));
    let client = LlmClient::from_settings(settings, 256).unwrap();
    assert_eq!(client.model(), "custom-model");
}

#[test]
fn cli_model_override_wins_for_every_provider() {
    for provider in Provider::ALL {
        let settings = ProviderSettings::resolve(provider, Some("mistral"), None, |key| {
            (key == provider.model_env()).then(|| "from-env".to_string())
        });
        assert_eq!(settings.model, "mistral");
    }
}

#[test]
fn unknown_provider_string_is_a_config_error() {
    let err = "azure".parse::<Provider>().unwrap_err();
    assert!(err.to_string().contains("azure"));
    assert!(err.to_string().starts_with("Config error"));
}
