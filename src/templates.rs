//! Question templates keyed by account type, direction of change and intensity.
//!
//! Placeholders: `{description}`, `{pct}`, `{base}`, `{compare}`.

use crate::schema::{AccountType, Language, LocalizedText};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum VariationDirection {
    Increment,
    Decrement,
}

impl VariationDirection {
    pub const ALL: [VariationDirection; 2] = [VariationDirection::Increment, VariationDirection::Decrement];

    /// Zero counts as an increment.
    pub fn from_pct(pct: f64) -> Self {
        if pct < 0.0 {
            VariationDirection::Decrement
        } else {
            VariationDirection::Increment
        }
    }
}

/// Wording bucket, independent of materiality thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Intensity {
    Leve,
    Moderado,
    Significativo,
}

impl Intensity {
    pub const ALL: [Intensity; 3] = [Intensity::Leve, Intensity::Moderado, Intensity::Significativo];

    pub fn from_pct(pct: f64) -> Self {
        let pct = pct.abs();
        if pct > 50.0 {
            Intensity::Significativo
        } else if pct > 20.0 {
            Intensity::Moderado
        } else {
            Intensity::Leve
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TemplateKey {
    pub account_type: AccountType,
    pub direction: VariationDirection,
    pub intensity: Intensity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SpecialTemplate {
    NewAccount,
    DisappearedAccount,
    SignAnomaly,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    pub es: String,
    pub en: String,
}

#[derive(Debug, Clone, Default)]
pub struct TemplateContext<'a> {
    pub description: &'a str,
    pub pct: String,
    pub base: &'a str,
    pub compare: &'a str,
}

impl Template {
    fn fill(text: &str, ctx: &TemplateContext) -> String {
        text.replace("{description}", ctx.description)
            .replace("{pct}", &ctx.pct)
            .replace("{base}", ctx.base)
            .replace("{compare}", ctx.compare)
    }

    pub fn render(&self, language: Language, ctx: &TemplateContext) -> LocalizedText {
        LocalizedText::build(language, || Self::fill(&self.es, ctx), || Self::fill(&self.en, ctx))
    }
}

pub struct TemplateTable {
    variations: BTreeMap<TemplateKey, Template>,
    special: BTreeMap<SpecialTemplate, Template>,
}

fn topic(account_type: AccountType, direction: VariationDirection) -> (&'static str, &'static str) {
    use AccountType::*;
    use VariationDirection::*;
    match (account_type, direction) {
        (Revenue, Increment) => ("del crecimiento de ingresos", "behind the revenue growth"),
        (Revenue, Decrement) => ("de la disminución de ingresos", "behind the revenue decline"),
        (OtherIncome, Increment) => ("del aumento de otros ingresos", "behind the increase in other income"),
        (OtherIncome, Decrement) => ("de la caída de otros ingresos", "behind the decrease in other income"),
        (CostOfSales, Increment) => ("del incremento del coste de ventas", "behind the higher cost of sales"),
        (CostOfSales, Decrement) => ("de la reducción del coste de ventas", "behind the lower cost of sales"),
        (OperatingExpense, Increment) => ("del incremento de gastos", "behind the expense increase"),
        (OperatingExpense, Decrement) => ("de la reducción de gastos", "behind the expense reduction"),
        (Asset, Increment) => ("del aumento del saldo de activo", "behind the higher asset balance"),
        (Asset, Decrement) => ("de la disminución del saldo de activo", "behind the lower asset balance"),
        (Liability, Increment) => ("del aumento del pasivo", "behind the higher liability balance"),
        (Liability, Decrement) => ("de la reducción del pasivo", "behind the lower liability balance"),
        (Equity, Increment) => ("del aumento del patrimonio neto", "behind the increase in equity"),
        (Equity, Decrement) => ("de la disminución del patrimonio neto", "behind the decrease in equity"),
        (Unclassified, _) => ("de la variación del saldo", "behind the change in balance"),
    }
}

fn closing(intensity: Intensity) -> (&'static str, &'static str) {
    match intensity {
        Intensity::Leve => ("", ""),
        Intensity::Moderado => (
            " ¿Se trata de un efecto recurrente o puntual?",
            " Is this a recurring or a one-off effect?",
        ),
        Intensity::Significativo => (
            " Detallar las operaciones que explican la variación y aportar soporte documental.",
            " Please detail the transactions behind the change and provide supporting documents.",
        ),
    }
}

impl TemplateTable {
    fn build() -> Self {
        let mut variations = BTreeMap::new();
        for account_type in AccountType::ALL {
            for direction in VariationDirection::ALL {
                for intensity in Intensity::ALL {
                    let (topic_es, topic_en) = topic(account_type, direction);
                    let (closing_es, closing_en) = closing(intensity);
                    variations.insert(
                        TemplateKey {
                            account_type,
                            direction,
                            intensity,
                        },
                        Template {
                            es: format!(
                                "Comentar de manera general los principales \"drivers\" {} en '{{description}}' entre {{base}} y {{compare}} ({{pct}}).{}",
                                topic_es, closing_es
                            ),
                            en: format!(
                                "Please comment on the main drivers {} in '{{description}}' between {{base}} and {{compare}} ({{pct}}).{}",
                                topic_en, closing_en
                            ),
                        },
                    );
                }
            }
        }

        let special = BTreeMap::from([
            (
                SpecialTemplate::NewAccount,
                Template {
                    es: "Se observa un nuevo concepto '{description}' en {compare}. ¿Cuál es el origen de este item?".to_string(),
                    en: "A new item '{description}' appears in {compare}. What is its origin?".to_string(),
                },
            ),
            (
                SpecialTemplate::DisappearedAccount,
                Template {
                    es: "El concepto '{description}' presente en {base} no aparece en {compare}. ¿Cuál es la razón?".to_string(),
                    en: "The item '{description}' present in {base} no longer appears in {compare}. What is the reason?".to_string(),
                },
            ),
            (
                SpecialTemplate::SignAnomaly,
                Template {
                    es: "El saldo de '{description}' en {compare} es acreedor, contrario a su naturaleza de activo. ¿Cuál es el motivo?".to_string(),
                    en: "The balance of '{description}' in {compare} is in credit, contrary to its asset nature. What is the cause?".to_string(),
                },
            ),
        ]);

        Self { variations, special }
    }

    /// Process-wide table, built on first use.
    pub fn standard() -> &'static TemplateTable {
        static TABLE: OnceLock<TemplateTable> = OnceLock::new();
        TABLE.get_or_init(TemplateTable::build)
    }

    pub fn get(&self, key: &TemplateKey) -> Option<&Template> {
        self.variations.get(key)
    }

    pub fn special(&self, kind: SpecialTemplate) -> Option<&Template> {
        self.special.get(&kind)
    }

    pub fn len(&self) -> usize {
        self.variations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variations.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_combination_has_a_template() {
        let table = TemplateTable::standard();
        for account_type in AccountType::ALL {
            for direction in VariationDirection::ALL {
                for intensity in Intensity::ALL {
                    let key = TemplateKey {
                        account_type,
                        direction,
                        intensity,
                    };
                    let template = table
                        .get(&key)
                        .unwrap_or_else(|| panic!("missing template for {:?}", key));
                    for text in [&template.es, &template.en] {
                        assert!(text.contains("{description}"), "{:?}", key);
                        assert!(text.contains("{pct}"), "{:?}", key);
                    }
                }
            }
        }
        assert_eq!(table.len(), AccountType::ALL.len() * 2 * 3);

        for kind in [
            SpecialTemplate::NewAccount,
            SpecialTemplate::DisappearedAccount,
            SpecialTemplate::SignAnomaly,
        ] {
            assert!(table.special(kind).is_some());
        }
    }

    #[test]
    fn test_intensity_buckets() {
        assert_eq!(Intensity::from_pct(5.0), Intensity::Leve);
        assert_eq!(Intensity::from_pct(20.0), Intensity::Leve);
        assert_eq!(Intensity::from_pct(-20.1), Intensity::Moderado);
        assert_eq!(Intensity::from_pct(50.0), Intensity::Moderado);
        assert_eq!(Intensity::from_pct(50.1), Intensity::Significativo);
    }

    #[test]
    fn test_zero_variation_is_increment() {
        assert_eq!(VariationDirection::from_pct(0.0), VariationDirection::Increment);
        assert_eq!(VariationDirection::from_pct(-0.1), VariationDirection::Decrement);
    }

    #[test]
    fn test_render_interpolates_literal_values() {
        let table = TemplateTable::standard();
        let key = TemplateKey {
            account_type: AccountType::Revenue,
            direction: VariationDirection::Increment,
            intensity: Intensity::Moderado,
        };
        let ctx = TemplateContext {
            description: "Ventas de mercaderías",
            pct: "+35.0%".to_string(),
            base: "FY23",
            compare: "FY24",
        };
        let text = table.get(&key).unwrap().render(Language::Both, &ctx);
        let es = text.es.unwrap();
        assert!(es.contains("'Ventas de mercaderías' entre FY23 y FY24 (+35.0%)"));
        assert!(es.contains("crecimiento de ingresos"));
        assert!(text.en.unwrap().contains("between FY23 and FY24"));
    }
}
