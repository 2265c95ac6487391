//! Question and reason synthesis.
//!
//! [`QuestionSynthesizer`] is the single capability the engine depends on.
//! [`TemplateSynthesizer`] is deterministic and always available;
//! [`ExternalSynthesizer`] delegates to a [`TextGenerator`] under a bounded
//! timeout and reports failure so the caller can fall back to templates.

use crate::anonymizer::AnonymizedFinding;
use crate::error::{BalanceAnalysisError, Result};
use crate::materiality::{BalanceAnomaly, ClassifiedVariation};
use crate::rules::match_rule;
use crate::schema::{inline_json_schema, AccountType, AnalysisConfig, Language, LocalizedText, Priority};
use crate::templates::{Intensity, SpecialTemplate, TemplateContext, TemplateKey, TemplateTable, VariationDirection};
use crate::utils::{format_amount, format_pct, format_signed_amount};
use crate::variation::{VariationTag, REVENUE_SHARE_PP_THRESHOLD};
use futures::future::BoxFuture;
use log::debug;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::OnceLock;
use std::time::Duration;
use tokio::runtime::{Handle, Runtime, RuntimeFlavor};

/// Everything known about one reportable account, with its included
/// variations in comparison order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountFinding {
    pub account_code: String,
    pub description: String,
    pub account_type: AccountType,
    pub variations: Vec<ClassifiedVariation>,
    /// Credit balance on an asset account not already caught by a pair.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub balance_anomaly: Option<BalanceAnomaly>,
}

impl AccountFinding {
    pub fn priority(&self) -> Priority {
        if self.balance_anomaly.is_some() {
            return Priority::Alta;
        }
        self.variations
            .iter()
            .map(|v| v.priority)
            .min()
            .unwrap_or(Priority::Baja)
    }

    pub fn tags(&self) -> BTreeSet<VariationTag> {
        let mut tags: BTreeSet<VariationTag> = self
            .variations
            .iter()
            .flat_map(|v| v.variation.tags.iter().copied())
            .collect();
        if self.balance_anomaly.is_some() {
            tags.insert(VariationTag::SignAnomaly);
        }
        tags
    }

    pub fn latest(&self) -> Option<&ClassifiedVariation> {
        self.variations.last()
    }
}

#[derive(Debug, Clone, Copy)]
pub enum SynthesisInput<'a> {
    Raw(&'a AccountFinding),
    Anonymized(&'a AnonymizedFinding),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GeneratedBy {
    Template,
    External,
    /// External generation was requested but failed or timed out.
    TemplateFallback,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynthesizedText {
    pub question: LocalizedText,
    pub reason: LocalizedText,
    pub generated_by: GeneratedBy,
}

pub trait QuestionSynthesizer: Send + Sync {
    fn synthesize(&self, input: &SynthesisInput<'_>) -> Result<SynthesizedText>;

    /// External synthesizers receive anonymized facts unless anonymization is off.
    fn is_external(&self) -> bool {
        false
    }
}

fn roman(n: usize) -> String {
    const NUMERALS: [&str; 12] = ["i", "ii", "iii", "iv", "v", "vi", "vii", "viii", "ix", "x", "xi", "xii"];
    NUMERALS
        .get(n.wrapping_sub(1))
        .map(|s| s.to_string())
        .unwrap_or_else(|| n.to_string())
}

fn number_parts(parts: Vec<String>) -> String {
    if parts.len() == 1 {
        return parts.into_iter().next().unwrap_or_default();
    }
    parts
        .into_iter()
        .enumerate()
        .map(|(i, part)| format!("({}) {}", roman(i + 1), part))
        .collect::<Vec<_>>()
        .join("\n")
}

fn tag_label(tag: VariationTag, language: Language) -> &'static str {
    let english = language == Language::En;
    match tag {
        VariationTag::NewAccount if english => "new account",
        VariationTag::NewAccount => "nueva cuenta",
        VariationTag::DisappearedAccount if english => "account no longer present",
        VariationTag::DisappearedAccount => "cuenta sin saldo",
        VariationTag::SignAnomaly if english => "balance sign contrary to account nature",
        VariationTag::SignAnomaly => "signo contrario a la naturaleza de la cuenta",
        VariationTag::TrendReversal if english => "trend reversal",
        VariationTag::TrendReversal => "inversión de tendencia",
        VariationTag::Acceleration if english => "acceleration",
        VariationTag::Acceleration => "aceleración",
        VariationTag::Deceleration if english => "deceleration",
        VariationTag::Deceleration => "desaceleración",
        VariationTag::Forced if english => "included by focus override",
        VariationTag::Forced => "incluida por foco",
    }
}

fn tags_sentence(tags: &BTreeSet<VariationTag>, language: Language) -> Option<String> {
    if tags.is_empty() {
        return None;
    }
    let labels: Vec<&str> = tags.iter().map(|t| tag_label(*t, language)).collect();
    Some(if language == Language::En {
        format!("Detected: {}.", labels.join(", "))
    } else {
        format!("Se detecta: {}.", labels.join(", "))
    })
}

fn join_sentences(first: String, second: Option<String>) -> String {
    match second {
        Some(second) => format!("{} {}", first, second),
        None => first,
    }
}

pub struct TemplateSynthesizer {
    language: Language,
    table: &'static TemplateTable,
}

impl TemplateSynthesizer {
    pub fn new(language: Language) -> Self {
        Self {
            language,
            table: TemplateTable::standard(),
        }
    }

    fn variation_part(
        &self,
        account_type: AccountType,
        description: &str,
        item: &ClassifiedVariation,
        language: Language,
    ) -> String {
        let variation = &item.variation;
        let ctx = TemplateContext {
            description,
            pct: format_pct(variation.variation_pct),
            base: &variation.base_period,
            compare: &variation.compare_period,
        };

        let template = if variation.has_tag(VariationTag::NewAccount) {
            self.table.special(SpecialTemplate::NewAccount)
        } else if variation.has_tag(VariationTag::DisappearedAccount) {
            self.table.special(SpecialTemplate::DisappearedAccount)
        } else {
            self.table.get(&TemplateKey {
                account_type,
                direction: VariationDirection::from_pct(variation.variation_pct),
                intensity: Intensity::from_pct(variation.variation_pct),
            })
        };

        template
            .map(|t| t.render(language, &ctx).primary().to_string())
            .unwrap_or_default()
    }

    fn raw_question(&self, finding: &AccountFinding, language: Language) -> String {
        let mut parts: Vec<String> = finding
            .variations
            .iter()
            .map(|v| self.variation_part(finding.account_type, &finding.description, v, language))
            .filter(|p| !p.is_empty())
            .collect();

        let anomaly_ctx = finding
            .variations
            .iter()
            .rev()
            .find(|v| v.variation.has_tag(VariationTag::SignAnomaly))
            .map(|anomaly| TemplateContext {
                description: &finding.description,
                pct: format_pct(anomaly.variation.variation_pct),
                base: &anomaly.variation.base_period,
                compare: &anomaly.variation.compare_period,
            })
            .or_else(|| {
                finding.balance_anomaly.as_ref().map(|anomaly| TemplateContext {
                    description: &finding.description,
                    compare: &anomaly.period,
                    ..TemplateContext::default()
                })
            });
        if let (Some(ctx), Some(t)) = (anomaly_ctx, self.table.special(SpecialTemplate::SignAnomaly)) {
            parts.push(t.render(language, &ctx).primary().to_string());
        }

        if let (Some(latest), Some(rule)) = (
            finding.latest(),
            match_rule(&finding.account_code, &finding.description),
        ) {
            let direction = VariationDirection::from_pct(latest.variation.variation_pct);
            parts.push(
                rule.rule
                    .question(direction)
                    .localized(language)
                    .primary()
                    .to_string(),
            );
        }

        number_parts(parts)
    }

    fn raw_reason(&self, finding: &AccountFinding, language: Language) -> String {
        let magnitudes: Vec<String> = finding
            .variations
            .iter()
            .map(|item| {
                let v = &item.variation;
                let magnitude = if language == Language::En {
                    format!(
                        "{} from {} ({}) to {} ({}), {}",
                        format_pct(v.variation_pct),
                        v.base_period,
                        format_amount(v.value_base, language),
                        v.compare_period,
                        format_amount(v.value_compare, language),
                        format_signed_amount(v.variation_abs, language)
                    )
                } else {
                    format!(
                        "{} entre {} ({}) y {} ({}), {}",
                        format_pct(v.variation_pct),
                        v.base_period,
                        format_amount(v.value_base, language),
                        v.compare_period,
                        format_amount(v.value_compare, language),
                        format_signed_amount(v.variation_abs, language)
                    )
                };
                match item.revenue_share_pp.filter(|pp| pp.abs() >= REVENUE_SHARE_PP_THRESHOLD) {
                    Some(pp) if language == Language::En => format!("{} ({:+.1} pp of revenue)", magnitude, pp),
                    Some(pp) => format!("{} ({:+.1} pp sobre ventas)", magnitude, pp),
                    None => magnitude,
                }
            })
            .collect();

        let lead = match (&finding.balance_anomaly, magnitudes.is_empty()) {
            (Some(anomaly), true) if language == Language::En => format!(
                "Credit balance of {} in {} on an asset account.",
                format_amount(anomaly.value, language),
                anomaly.period
            ),
            (Some(anomaly), true) => format!(
                "Saldo acreedor de {} en {} en una cuenta de activo.",
                format_amount(anomaly.value, language),
                anomaly.period
            ),
            _ if language == Language::En => format!("Change of {}.", magnitudes.join("; ")),
            _ => format!("Variación de {}.", magnitudes.join("; ")),
        };
        join_sentences(lead, tags_sentence(&finding.tags(), language))
    }

    fn anonymized_question(&self, finding: &AnonymizedFinding, language: Language) -> String {
        let description = finding.account_type.generic_label(language);
        let mut parts: Vec<String> = finding
            .facts
            .iter()
            .filter_map(|fact| {
                let ctx = TemplateContext {
                    description,
                    pct: format_pct(fact.variation_percentage),
                    base: &fact.base_period,
                    compare: &fact.compare_period,
                };
                let template = if fact.tags.contains(&VariationTag::NewAccount) {
                    self.table.special(SpecialTemplate::NewAccount)
                } else if fact.tags.contains(&VariationTag::DisappearedAccount) {
                    self.table.special(SpecialTemplate::DisappearedAccount)
                } else {
                    self.table.get(&TemplateKey {
                        account_type: fact.account_type,
                        direction: fact.variation_direction,
                        intensity: fact.variation_magnitude,
                    })
                };
                template.map(|t| t.render(language, &ctx).primary().to_string())
            })
            .collect();

        if let (Some(period), Some(t)) = (
            &finding.sign_anomaly_period,
            self.table.special(SpecialTemplate::SignAnomaly),
        ) {
            let ctx = TemplateContext {
                description,
                compare: period,
                ..TemplateContext::default()
            };
            parts.push(t.render(language, &ctx).primary().to_string());
        }
        number_parts(parts)
    }

    fn anonymized_reason(&self, finding: &AnonymizedFinding, language: Language) -> String {
        let magnitudes: Vec<String> = finding
            .facts
            .iter()
            .map(|f| {
                format!(
                    "{} {} {} → {}",
                    format_pct(f.variation_percentage),
                    if language == Language::En { "between" } else { "entre" },
                    f.base_period,
                    f.compare_period
                )
            })
            .collect();
        let lead = match (&finding.sign_anomaly_period, magnitudes.is_empty()) {
            (Some(period), true) if language == Language::En => {
                format!("Credit balance in {} on an asset account.", period)
            }
            (Some(period), true) => format!("Saldo acreedor en {} en una cuenta de activo.", period),
            _ if language == Language::En => format!("Change of {}.", magnitudes.join("; ")),
            _ => format!("Variación de {}.", magnitudes.join("; ")),
        };
        let mut tags: BTreeSet<VariationTag> = finding.facts.iter().flat_map(|f| f.tags.iter().copied()).collect();
        if finding.sign_anomaly_period.is_some() {
            tags.insert(VariationTag::SignAnomaly);
        }
        join_sentences(lead, tags_sentence(&tags, language))
    }

    /// Deterministic rendering; never fails.
    pub fn render(&self, input: &SynthesisInput<'_>) -> SynthesizedText {
        let (question, reason) = match input {
            SynthesisInput::Raw(finding) => (
                LocalizedText::build(
                    self.language,
                    || self.raw_question(finding, Language::Es),
                    || self.raw_question(finding, Language::En),
                ),
                LocalizedText::build(
                    self.language,
                    || self.raw_reason(finding, Language::Es),
                    || self.raw_reason(finding, Language::En),
                ),
            ),
            SynthesisInput::Anonymized(finding) => (
                LocalizedText::build(
                    self.language,
                    || self.anonymized_question(finding, Language::Es),
                    || self.anonymized_question(finding, Language::En),
                ),
                LocalizedText::build(
                    self.language,
                    || self.anonymized_reason(finding, Language::Es),
                    || self.anonymized_reason(finding, Language::En),
                ),
            ),
        };

        SynthesizedText {
            question,
            reason,
            generated_by: GeneratedBy::Template,
        }
    }
}

impl QuestionSynthesizer for TemplateSynthesizer {
    fn synthesize(&self, input: &SynthesisInput<'_>) -> Result<SynthesizedText> {
        Ok(self.render(input))
    }
}

/// A prompt for an external text generator.
#[derive(Debug, Clone, Serialize)]
pub struct GenerationRequest {
    pub system: String,
    pub user: String,
    pub response_schema: serde_json::Value,
}

/// Any backend able to turn a prompt into a JSON string matching
/// `response_schema`.
pub trait TextGenerator: Send + Sync {
    fn generate<'a>(&'a self, request: &'a GenerationRequest) -> BoxFuture<'a, Result<String>>;
}

/// Expected shape of the generator's answer.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct GeneratedText {
    #[schemars(description = "Audit question to send to the company's management")]
    pub question: LocalizedText,
    #[schemars(description = "One or two sentences explaining why the question is raised")]
    pub reason: LocalizedText,
}

const SYSTEM_PROMPT: &str = "You are a senior financial due diligence analyst. \
You receive facts about a variation detected in a company's trial balance and write \
one concise audit question for management plus a short reason of at most two sentences. \
Do not invent figures that are not in the facts. Return only JSON matching the schema.";

/// Removes a surrounding Markdown code fence, if any.
fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

pub struct ExternalSynthesizer<G> {
    generator: G,
    language: Language,
    timeout: Duration,
    /// Private runtime for synchronous callers, built on first use.
    runtime: OnceLock<Runtime>,
}

impl<G: TextGenerator> ExternalSynthesizer<G> {
    pub fn new(generator: G, config: &AnalysisConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            generator,
            language: config.language,
            timeout: config.external_timeout(),
            runtime: OnceLock::new(),
        })
    }

    fn runtime(&self) -> Result<&Runtime> {
        if let Some(runtime) = self.runtime.get() {
            return Ok(runtime);
        }
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        Ok(self.runtime.get_or_init(|| runtime))
    }

    pub fn build_request(&self, input: &SynthesisInput<'_>) -> Result<GenerationRequest> {
        let facts = match input {
            SynthesisInput::Raw(finding) => serde_json::to_string_pretty(finding)?,
            SynthesisInput::Anonymized(finding) => serde_json::to_string_pretty(finding)?,
        };
        let language_instruction = match self.language {
            Language::Es => "Fill only the `es` fields, in Spanish.",
            Language::En => "Fill only the `en` fields, in English.",
            Language::Both => "Fill both the `es` (Spanish) and `en` (English) fields.",
        };

        Ok(GenerationRequest {
            system: SYSTEM_PROMPT.to_string(),
            user: format!("{}\n\nFacts:\n{}", language_instruction, facts),
            response_schema: inline_json_schema::<GeneratedText>()?,
        })
    }

    fn parse_response(&self, raw: &str) -> Result<GeneratedText> {
        let parsed: GeneratedText = serde_json::from_str(strip_code_fence(raw)).map_err(|e| {
            BalanceAnalysisError::ExternalGeneratorFailure(format!("unparseable response: {}", e))
        })?;

        let covered = |text: &LocalizedText| {
            (!self.language.wants_spanish() || text.es.as_deref().is_some_and(|s| !s.trim().is_empty()))
                && (!self.language.wants_english() || text.en.as_deref().is_some_and(|s| !s.trim().is_empty()))
        };
        if !covered(&parsed.question) || !covered(&parsed.reason) {
            return Err(BalanceAnalysisError::ExternalGeneratorFailure(
                "response is missing text for the requested language".to_string(),
            ));
        }
        Ok(parsed)
    }
}

impl<G: TextGenerator> QuestionSynthesizer for ExternalSynthesizer<G> {
    fn synthesize(&self, input: &SynthesisInput<'_>) -> Result<SynthesizedText> {
        let request = self.build_request(input)?;
        debug!("Requesting external synthesis ({} prompt bytes)", request.user.len());

        let call = async { tokio::time::timeout(self.timeout, self.generator.generate(&request)).await };
        let outcome = match Handle::try_current() {
            Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
                tokio::task::block_in_place(|| handle.block_on(call))
            }
            Ok(_) => {
                return Err(BalanceAnalysisError::ExternalGeneratorFailure(
                    "cannot block on the generator from a current-thread runtime".to_string(),
                ))
            }
            Err(_) => self.runtime()?.block_on(call),
        };
        let raw = outcome.map_err(|_| BalanceAnalysisError::ExternalGeneratorTimeout(self.timeout))??;

        let generated = self.parse_response(&raw)?;
        Ok(SynthesizedText {
            question: generated.question,
            reason: generated.reason,
            generated_by: GeneratedBy::External,
        })
    }

    fn is_external(&self) -> bool {
        true
    }
}
