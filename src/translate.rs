use crate::{
    domain::{Language, Translation, Translator},
    errors::TranslateError,
};
use anyhow::Context;
use async_trait::async_trait;
use aws_sdk_translate::{types::DisplayLanguageCode, Client as TranslateClient};
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct AwsTranslator {
    client: TranslateClient,
}

impl AwsTranslator {
    pub fn new(client: TranslateClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Translator for AwsTranslator {
    /// TranslateText with source language detection.
    async fn translate(&self, text: &str, target_language_code: &str) -> Result<Translation, TranslateError> {
        let output = self.client
            .translate_text()
            .text(text)
            .source_language_code("auto")
            .target_language_code(target_language_code)
            .send()
            .await
            .context(format!("Translate: Failed to translate into '{}'", target_language_code))?;

        tracing::debug!(
            source = %output.source_language_code(),
            target = %output.target_language_code(),
            "Translate: Text translated"
        );

        Ok(Translation {
            translated_text: output.translated_text().to_string(),
            detected_language_code: output.source_language_code().to_string(),
        })
    }

    async fn languages(&self) -> Result<Vec<Language>, TranslateError> {
        let mut languages = Vec::new();
        let mut next_token: Option<String> = None;

        loop {
            let output = self.client
                .list_languages()
                .display_language_code(DisplayLanguageCode::En)
                .set_next_token(next_token.take())
                .send()
                .await
                .context("Translate: Failed to list supported languages")?;

            languages.extend(output.languages().iter().map(|l| Language {
                code: l.language_code().to_string(),
                display_name: l.language_name().to_string(),
            }));

            match output.next_token() {
                Some(token) => next_token = Some(token.to_string()),
                None => break,
            }
        }

        tracing::info!(count = languages.len(), "Translate: Loaded supported languages");
        Ok(languages)
    }
}

/// Code -> display name lookup, built once at startup.
#[derive(Debug, Clone, Default)]
pub struct DisplayLanguages {
    by_code: HashMap<String, String>,
    ordered: Vec<Language>,
}

impl DisplayLanguages {
    pub fn new(mut languages: Vec<Language>) -> Self {
        languages.sort_by(|a, b| a.display_name.cmp(&b.display_name));
        let by_code = languages
            .iter()
            .map(|l| (l.code.clone(), l.display_name.clone()))
            .collect();
        Self { by_code, ordered: languages }
    }

    /// Falls back to the code itself for languages the service did not list
    /// (e.g. `auto` detection results such as regional variants).
    pub fn display_name(&self, code: &str) -> String {
        self.by_code.get(code).cloned().unwrap_or_else(|| code.to_string())
    }

    pub fn all(&self) -> &[Language] {
        &self.ordered
    }
}
