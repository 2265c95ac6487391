//! Account-specific follow-up questions keyed by code prefix and description keywords.

use crate::schema::{Language, LocalizedText};
use crate::templates::VariationDirection;

#[derive(Debug, Clone, Copy)]
pub struct BilingualText {
    pub es: &'static str,
    pub en: &'static str,
}

impl BilingualText {
    pub fn localized(&self, language: Language) -> LocalizedText {
        LocalizedText::build(language, || self.es.to_string(), || self.en.to_string())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FollowUpRule {
    pub code_prefixes: &'static [&'static str],
    /// Lowercase fragments, any of which must appear in the description.
    /// Empty means the rule applies to every account under the prefixes.
    pub keywords: &'static [&'static str],
    pub priority: u8,
    pub on_increase: BilingualText,
    pub on_decrease: BilingualText,
}

impl FollowUpRule {
    pub fn question(&self, direction: VariationDirection) -> &BilingualText {
        match direction {
            VariationDirection::Increment => &self.on_increase,
            VariationDirection::Decrement => &self.on_decrease,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RuleMatch {
    pub rule: &'static FollowUpRule,
    pub prefix: &'static str,
    pub keyword: Option<&'static str>,
}

const fn text(es: &'static str, en: &'static str) -> BilingualText {
    BilingualText { es, en }
}

pub static FOLLOW_UP_RULES: &[FollowUpRule] = &[
    // Group 1: financing
    FollowUpRule {
        code_prefixes: &["100", "101", "102", "103", "104", "105", "106", "107", "108", "109"],
        keywords: &["capital", "acciones", "participaciones"],
        priority: 3,
        on_increase: text(
            "¿Se ha realizado alguna ampliación de capital durante el período? ¿En qué términos?",
            "Was there a capital increase during the period? On what terms?",
        ),
        on_decrease: text(
            "¿Ha habido alguna reducción de capital? ¿Por pérdidas o devolución a los socios?",
            "Was share capital reduced? Due to losses or a return to shareholders?",
        ),
    },
    FollowUpRule {
        code_prefixes: &["11"],
        keywords: &["reserva"],
        priority: 2,
        on_increase: text(
            "¿Se han dotado reservas con cargo a resultados? ¿Cuál es el origen del incremento?",
            "Were reserves allocated from profits? What is the origin of the increase?",
        ),
        on_decrease: text(
            "¿Se han utilizado reservas para compensar pérdidas o distribuir dividendos?",
            "Were reserves used to offset losses or to pay dividends?",
        ),
    },
    FollowUpRule {
        code_prefixes: &["13"],
        keywords: &["subvenci", "donaci", "ayuda"],
        priority: 2,
        on_increase: text(
            "¿Se han recibido nuevas subvenciones? ¿De qué organismo y con qué finalidad?",
            "Were new grants received? From which body and for what purpose?",
        ),
        on_decrease: text(
            "¿Se ha imputado la subvención a resultados? ¿Se cumplen las condiciones de concesión?",
            "Was the grant released to profit and loss? Are the grant conditions met?",
        ),
    },
    FollowUpRule {
        code_prefixes: &["14"],
        keywords: &[],
        priority: 2,
        on_increase: text(
            "¿Qué riesgo u obligación cubren las nuevas provisiones a largo plazo?",
            "Which risk or obligation do the new long-term provisions cover?",
        ),
        on_decrease: text(
            "¿Se ha revertido o aplicado la provisión? ¿Cómo se ha resuelto el riesgo?",
            "Was the provision reversed or used? How was the risk resolved?",
        ),
    },
    FollowUpRule {
        code_prefixes: &["16", "17"],
        keywords: &[],
        priority: 2,
        on_increase: text(
            "¿Se ha obtenido nueva financiación a largo plazo? Indicar tipo de interés, plazo y garantías.",
            "Was new long-term financing obtained? Please state rate, maturity and guarantees.",
        ),
        on_decrease: text(
            "¿Se ha amortizado deuda a largo plazo? ¿Con qué fondos?",
            "Was long-term debt repaid? With which funds?",
        ),
    },
    // Group 2: fixed assets
    FollowUpRule {
        code_prefixes: &["20"],
        keywords: &[],
        priority: 2,
        on_increase: text(
            "¿Qué activos intangibles se han incorporado? ¿Se han activado costes internos?",
            "Which intangible assets were added? Were internal costs capitalised?",
        ),
        on_decrease: text(
            "¿Se han dado de baja o deteriorado activos intangibles?",
            "Were intangible assets derecognised or impaired?",
        ),
    },
    FollowUpRule {
        code_prefixes: &["21", "23"],
        keywords: &[],
        priority: 2,
        on_increase: text(
            "¿Cuáles han sido las principales inversiones en inmovilizado? Aportar detalle de altas.",
            "What were the main capital expenditures? Please provide the additions schedule.",
        ),
        on_decrease: text(
            "¿Se han vendido o dado de baja elementos del inmovilizado? ¿Con qué resultado?",
            "Were fixed assets sold or retired? With what gain or loss?",
        ),
    },
    FollowUpRule {
        code_prefixes: &["28"],
        keywords: &[],
        priority: 1,
        on_increase: text(
            "¿Se ha modificado la política de amortización o las vidas útiles?",
            "Did the depreciation policy or useful lives change?",
        ),
        on_decrease: text(
            "¿La reducción de la amortización acumulada se debe a bajas de activos?",
            "Is the lower accumulated depreciation due to asset disposals?",
        ),
    },
    // Group 3: inventory
    FollowUpRule {
        code_prefixes: &["3"],
        keywords: &[],
        priority: 1,
        on_increase: text(
            "¿Ha aumentado el nivel de existencias? ¿Existe stock obsoleto o de lenta rotación?",
            "Did inventory levels increase? Is there obsolete or slow-moving stock?",
        ),
        on_decrease: text(
            "¿Ha disminuido el inventario por ventas, consumo o deterioro?",
            "Did inventory fall due to sales, consumption or impairment?",
        ),
    },
    // Group 4: trade
    FollowUpRule {
        code_prefixes: &["400", "401", "403", "404", "405", "406", "407", "41"],
        keywords: &[],
        priority: 2,
        on_increase: text(
            "¿Se han alargado los plazos de pago a proveedores? Aportar antigüedad de saldos.",
            "Have supplier payment terms lengthened? Please provide an ageing report.",
        ),
        on_decrease: text(
            "¿Se ha reducido la deuda con proveedores por pagos anticipados o menores compras?",
            "Did trade payables fall due to early payments or lower purchases?",
        ),
    },
    FollowUpRule {
        code_prefixes: &["430", "431", "432", "433", "434", "435", "436"],
        keywords: &[],
        priority: 2,
        on_increase: text(
            "¿Ha aumentado el saldo de clientes por mayores ventas o por retrasos en el cobro?",
            "Did receivables grow because of higher sales or slower collection?",
        ),
        on_decrease: text(
            "¿Se han cobrado saldos antiguos o se han dado de baja créditos incobrables?",
            "Were old balances collected or bad debts written off?",
        ),
    },
    FollowUpRule {
        code_prefixes: &["436", "490"],
        keywords: &["dudoso", "insolvencia", "deterioro", "moroso"],
        priority: 3,
        on_increase: text(
            "¿Qué clientes están en situación de riesgo? ¿Cuál es el criterio de provisión?",
            "Which customers are at risk? What is the provisioning policy?",
        ),
        on_decrease: text(
            "¿Se han recuperado o dado de baja créditos provisionados?",
            "Were provisioned receivables recovered or written off?",
        ),
    },
    FollowUpRule {
        code_prefixes: &["46"],
        keywords: &[],
        priority: 1,
        on_increase: text(
            "¿Han aumentado los anticipos o remuneraciones pendientes con el personal?",
            "Did advances or accrued wages with employees increase?",
        ),
        on_decrease: text(
            "¿Se han liquidado saldos con el personal?",
            "Were employee balances settled?",
        ),
    },
    FollowUpRule {
        code_prefixes: &["47"],
        keywords: &[],
        priority: 2,
        on_increase: text(
            "¿Por qué impuesto o concepto han aumentado los saldos con administraciones públicas? ¿Existen aplazamientos?",
            "Which tax caused the higher balances with public authorities? Are there deferral agreements?",
        ),
        on_decrease: text(
            "¿Se han pagado o compensado saldos con administraciones públicas?",
            "Were balances with public authorities paid or offset?",
        ),
    },
    FollowUpRule {
        code_prefixes: &["476"],
        keywords: &["seguridad social"],
        priority: 3,
        on_increase: text(
            "¿Hay cuotas de Seguridad Social pendientes o aplazadas? ¿Están al corriente?",
            "Are social security contributions outstanding or deferred? Are payments up to date?",
        ),
        on_decrease: text(
            "¿Se han regularizado cuotas de Seguridad Social pendientes?",
            "Were outstanding social security contributions settled?",
        ),
    },
    // Group 5: financial accounts
    FollowUpRule {
        code_prefixes: &["52"],
        keywords: &[],
        priority: 2,
        on_increase: text(
            "¿Se ha dispuesto de nueva financiación a corto plazo? Aportar cuadro de deuda con vencimientos.",
            "Was new short-term financing drawn? Please provide the debt schedule with maturities.",
        ),
        on_decrease: text(
            "¿Se ha reducido la deuda a corto plazo por amortización o reclasificación?",
            "Did short-term debt fall through repayment or reclassification?",
        ),
    },
    FollowUpRule {
        code_prefixes: &["55"],
        keywords: &[],
        priority: 2,
        on_increase: text(
            "¿Con qué partes vinculadas se han generado los saldos? ¿Están documentados?",
            "Which related parties do these balances relate to? Are they documented?",
        ),
        on_decrease: text(
            "¿Se han liquidado saldos con partes vinculadas?",
            "Were related-party balances settled?",
        ),
    },
    FollowUpRule {
        code_prefixes: &["57"],
        keywords: &[],
        priority: 2,
        on_increase: text(
            "Aportar conciliación bancaria al cierre. ¿Existen saldos restringidos o pignorados?",
            "Please provide the closing bank reconciliation. Are any balances restricted or pledged?",
        ),
        on_decrease: text(
            "Aportar conciliación bancaria al cierre. ¿A qué pagos se ha destinado la tesorería?",
            "Please provide the closing bank reconciliation. Which payments used the cash?",
        ),
    },
    // Group 6: expenses
    FollowUpRule {
        code_prefixes: &["60"],
        keywords: &[],
        priority: 2,
        on_increase: text(
            "¿El aumento de compras responde a volumen, precio o cambios de proveedor?",
            "Is the purchase increase driven by volume, price or a change of supplier?",
        ),
        on_decrease: text(
            "¿La reducción de compras responde a menor actividad o mejores condiciones?",
            "Is the lower spend due to lower activity or better terms?",
        ),
    },
    FollowUpRule {
        code_prefixes: &["621"],
        keywords: &[],
        priority: 2,
        on_increase: text(
            "¿Se han firmado nuevos contratos de arrendamiento? Aportar detalle.",
            "Were new lease contracts signed? Please detail.",
        ),
        on_decrease: text(
            "¿Se han cancelado o renegociado arrendamientos?",
            "Were leases cancelled or renegotiated?",
        ),
    },
    FollowUpRule {
        code_prefixes: &["623"],
        keywords: &[],
        priority: 2,
        on_increase: text(
            "¿Qué servicios profesionales explican el aumento? ¿Son recurrentes?",
            "Which professional services explain the increase? Are they recurring?",
        ),
        on_decrease: text(
            "¿Se han internalizado servicios profesionales anteriormente externos?",
            "Were previously outsourced professional services brought in-house?",
        ),
    },
    FollowUpRule {
        code_prefixes: &["640"],
        keywords: &[],
        priority: 3,
        on_increase: text(
            "¿Se debe a nuevas contrataciones, subidas salariales o bonus? Aportar evolución de plantilla.",
            "Is it due to new hires, pay rises or bonuses? Please provide the headcount evolution.",
        ),
        on_decrease: text(
            "¿Se debe a bajas, jubilaciones o reducción de plantilla?",
            "Is it due to leavers, retirements or a headcount reduction?",
        ),
    },
    FollowUpRule {
        code_prefixes: &["641"],
        keywords: &[],
        priority: 3,
        on_increase: text(
            "¿Se han pagado indemnizaciones por despidos o reestructuración?",
            "Were severance payments made for dismissals or a restructuring?",
        ),
        on_decrease: text(
            "¿Han disminuido las indemnizaciones respecto al periodo anterior?",
            "Did severance costs decrease compared with the prior period?",
        ),
    },
    FollowUpRule {
        code_prefixes: &["642"],
        keywords: &[],
        priority: 2,
        on_increase: text(
            "¿Ha aumentado la Seguridad Social por más plantilla o subida de bases?",
            "Did social security costs rise because of more staff or higher contribution bases?",
        ),
        on_decrease: text(
            "¿Ha disminuido la Seguridad Social por reducción de plantilla o bonificaciones?",
            "Did social security costs fall because of fewer staff or rebates?",
        ),
    },
    FollowUpRule {
        code_prefixes: &["66"],
        keywords: &[],
        priority: 2,
        on_increase: text(
            "¿El aumento de gastos financieros se debe a más deuda o a mayores tipos de interés?",
            "Are higher finance costs due to more debt or higher interest rates?",
        ),
        on_decrease: text(
            "¿La reducción de gastos financieros se debe a amortización de deuda o refinanciación?",
            "Are lower finance costs due to debt repayment or refinancing?",
        ),
    },
    FollowUpRule {
        code_prefixes: &["68"],
        keywords: &[],
        priority: 1,
        on_increase: text(
            "¿Se debe a nuevas inversiones o a un cambio de vidas útiles?",
            "Is it due to new investments or a change in useful lives?",
        ),
        on_decrease: text(
            "¿Hay activos totalmente amortizados que sigan en uso?",
            "Are fully depreciated assets still in use?",
        ),
    },
    // Group 7: income
    FollowUpRule {
        code_prefixes: &["700", "701", "702", "703", "704", "705"],
        keywords: &[],
        priority: 2,
        on_increase: text(
            "¿El crecimiento se debe a volumen, precio o nuevos clientes? Aportar ventas por cliente.",
            "Is growth driven by volume, price or new customers? Please provide sales by customer.",
        ),
        on_decrease: text(
            "¿Se han perdido clientes relevantes o ha habido presión en precios?",
            "Were key customers lost or was there pricing pressure?",
        ),
    },
    FollowUpRule {
        code_prefixes: &["74"],
        keywords: &[],
        priority: 2,
        on_increase: text(
            "¿Qué subvenciones de explotación se han reconocido? ¿Son recurrentes?",
            "Which operating grants were recognised? Are they recurring?",
        ),
        on_decrease: text(
            "¿Han finalizado programas de subvenciones?",
            "Have grant programmes ended?",
        ),
    },
    FollowUpRule {
        code_prefixes: &["76"],
        keywords: &[],
        priority: 1,
        on_increase: text(
            "¿Qué inversiones financieras han generado los ingresos?",
            "Which financial investments generated the income?",
        ),
        on_decrease: text(
            "¿Se han liquidado inversiones financieras?",
            "Were financial investments liquidated?",
        ),
    },
    // Generic group rules
    FollowUpRule {
        code_prefixes: &["1"],
        keywords: &[],
        priority: 0,
        on_increase: text(
            "¿Cuál es el origen del incremento en esta partida de financiación?",
            "What explains the increase in this financing line?",
        ),
        on_decrease: text(
            "¿Por qué ha disminuido esta partida de financiación?",
            "Why did this financing line decrease?",
        ),
    },
    FollowUpRule {
        code_prefixes: &["2"],
        keywords: &[],
        priority: 0,
        on_increase: text(
            "¿Se han realizado inversiones en esta partida de inmovilizado? Por favor detalle.",
            "Were investments made in this fixed asset line? Please detail.",
        ),
        on_decrease: text(
            "¿Ha habido bajas o deterioro en esta partida de inmovilizado?",
            "Were there disposals or impairment in this fixed asset line?",
        ),
    },
    FollowUpRule {
        code_prefixes: &["4"],
        keywords: &[],
        priority: 0,
        on_increase: text(
            "¿Cuál es el origen del incremento en esta cuenta? Por favor detalle.",
            "What explains the increase in this account? Please detail.",
        ),
        on_decrease: text(
            "¿Por qué ha disminuido el saldo de esta cuenta?",
            "Why did the balance of this account decrease?",
        ),
    },
    FollowUpRule {
        code_prefixes: &["5"],
        keywords: &[],
        priority: 0,
        on_increase: text(
            "¿Cuál es el origen del incremento en esta partida financiera?",
            "What explains the increase in this financial line?",
        ),
        on_decrease: text(
            "¿Por qué ha disminuido esta partida financiera?",
            "Why did this financial line decrease?",
        ),
    },
    FollowUpRule {
        code_prefixes: &["6"],
        keywords: &[],
        priority: 0,
        on_increase: text(
            "¿Por qué han aumentado estos gastos? Por favor justifique el incremento.",
            "Why did these expenses increase? Please justify the increase.",
        ),
        on_decrease: text(
            "¿A qué se debe la reducción de estos gastos?",
            "What explains the reduction in these expenses?",
        ),
    },
    FollowUpRule {
        code_prefixes: &["7"],
        keywords: &[],
        priority: 0,
        on_increase: text(
            "¿Cuál es el origen del incremento en estos ingresos?",
            "What explains the increase in this income?",
        ),
        on_decrease: text(
            "¿Por qué han disminuido estos ingresos? Por favor explique.",
            "Why did this income decrease? Please explain.",
        ),
    },
];

/// Most specific applicable rule: highest priority, then longest matching
/// prefix, then declaration order.
pub fn match_rule(account_code: &str, description: &str) -> Option<RuleMatch> {
    let code = account_code.trim();
    let description = description.to_lowercase();

    let mut best: Option<RuleMatch> = None;
    for rule in FOLLOW_UP_RULES {
        let Some(prefix) = rule
            .code_prefixes
            .iter()
            .copied()
            .filter(|p| code.starts_with(p))
            .max_by_key(|p| p.len())
        else {
            continue;
        };

        let keyword = if rule.keywords.is_empty() {
            None
        } else {
            match rule.keywords.iter().copied().find(|k| description.contains(k)) {
                Some(k) => Some(k),
                None => continue,
            }
        };

        let candidate = RuleMatch { rule, prefix, keyword };
        best = match best {
            Some(current)
                if (current.rule.priority, current.prefix.len())
                    >= (candidate.rule.priority, candidate.prefix.len()) =>
            {
                Some(current)
            }
            _ => Some(candidate),
        };
    }

    best
}
