use crate::schema::{Language, LocalizedText, Priority, Status};
use serde::{Deserialize, Serialize};

/// Bumped whenever a topic is added, removed or reworded.
pub const CHECKLIST_VERSION: &str = "2025.1";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChecklistItem {
    pub id: String,
    pub topic: LocalizedText,
    pub question: LocalizedText,
    pub priority: Priority,
    pub status: Status,
}

struct Topic {
    id: &'static str,
    topic: (&'static str, &'static str),
    question: (&'static str, &'static str),
    priority: Priority,
}

const TOPICS: &[Topic] = &[
    Topic {
        id: "bank-reconciliation",
        topic: ("Conciliación bancaria", "Bank reconciliation"),
        question: (
            "Aportar las conciliaciones bancarias al cierre de cada periodo analizado y explicar las partidas en conciliación con antigüedad superior a 30 días.",
            "Please provide the bank reconciliations at each period end and explain reconciling items older than 30 days.",
        ),
        priority: Priority::Alta,
    },
    Topic {
        id: "financial-debt",
        topic: ("Deuda financiera", "Financial debt"),
        question: (
            "Aportar el detalle de la deuda financiera (entidad, importe dispuesto, límite, tipo de interés, vencimiento y garantías) y confirmar el cumplimiento de covenants.",
            "Please provide the financial debt schedule (lender, drawn amount, limit, interest rate, maturity and guarantees) and confirm covenant compliance.",
        ),
        priority: Priority::Alta,
    },
    Topic {
        id: "tax-social-security",
        topic: ("Impuestos y Seguridad Social", "Taxes and social security"),
        question: (
            "Indicar en qué periodos se liquidan los distintos impuestos (IVA, IS, IRPF) y las cuotas de Seguridad Social, y si existen aplazamientos, inspecciones o deudas vencidas.",
            "Please explain when each tax (VAT, CIT, PIT) and social security contribution is settled, and whether there are deferrals, inspections or overdue amounts.",
        ),
        priority: Priority::Media,
    },
    Topic {
        id: "sales-customers",
        topic: ("Ventas y clientes", "Sales and customers"),
        question: (
            "Aportar las ventas por cliente de cada periodo e indicar la concentración en los diez principales clientes y los clientes en riesgo de cobro.",
            "Please provide sales by customer for each period, the concentration in the top ten customers and any customers at collection risk.",
        ),
        priority: Priority::Alta,
    },
    Topic {
        id: "personnel",
        topic: ("Gastos de personal", "Personnel costs"),
        question: (
            "Comentar la evolución de la plantilla media y los costes de personal, incluyendo bonus, indemnizaciones y retribuciones de la Dirección.",
            "Please comment on average headcount and personnel costs, including bonuses, severance and management remuneration.",
        ),
        priority: Priority::Alta,
    },
    Topic {
        id: "finance-function",
        topic: ("Departamento financiero", "Finance function"),
        question: (
            "Describir la estructura del departamento financiero, el sistema contable utilizado y el calendario de cierre mensual.",
            "Please describe the finance team structure, the accounting system and the monthly close calendar.",
        ),
        priority: Priority::Media,
    },
    Topic {
        id: "working-capital",
        topic: ("Periodos medios de cobro, pago y existencias", "Collection, payment and inventory periods"),
        question: (
            "Indicar la política de cobro a clientes (DSO), pago a proveedores (DPO) y rotación de existencias (DIO), y cualquier desviación en los periodos analizados.",
            "Please state the policy for customer collection (DSO), supplier payment (DPO) and inventory turnover (DIO), and any deviation in the periods analysed.",
        ),
        priority: Priority::Media,
    },
    Topic {
        id: "inventory",
        topic: ("Existencias", "Inventory"),
        question: (
            "Explicar el método de valoración de existencias, la frecuencia de los recuentos físicos y el criterio de provisión por obsolescencia.",
            "Please explain the inventory valuation method, the frequency of physical counts and the obsolescence provision policy.",
        ),
        priority: Priority::Media,
    },
    Topic {
        id: "revenue-recognition",
        topic: ("Criterio contable de ingresos y gastos", "Revenue and expense recognition"),
        question: (
            "Comentar el criterio contable de reconocimiento de ingresos y gastos, incluyendo procedimientos de corte de operaciones.",
            "Please describe the revenue and expense recognition policy, including cut-off procedures.",
        ),
        priority: Priority::Alta,
    },
    Topic {
        id: "grants",
        topic: ("Subvenciones", "Grants"),
        question: (
            "Confirmar si existen subvenciones pendientes de recibir o de reintegrar y las condiciones asociadas.",
            "Please confirm whether any grants are pending receipt or repayment and the related conditions.",
        ),
        priority: Priority::Media,
    },
    Topic {
        id: "shareholders",
        topic: ("Operaciones con accionistas", "Shareholder transactions"),
        question: (
            "Indicar los dividendos pagados, los costes personales de los accionistas imputados a la Compañía y los servicios prestados por socios no retribuidos.",
            "Please list dividends paid, shareholders' personal costs borne by the Company and any unpaid services provided by shareholders.",
        ),
        priority: Priority::Alta,
    },
    Topic {
        id: "off-balance-sheet",
        topic: ("Compromisos fuera de balance", "Off-balance sheet commitments"),
        question: (
            "Detallar avales, garantías, litigios y otros compromisos no registrados en balance.",
            "Please detail guarantees, litigation and any other commitments not recorded on the balance sheet.",
        ),
        priority: Priority::Media,
    },
    Topic {
        id: "fx-derivatives",
        topic: ("Divisa y derivados", "FX and derivatives"),
        question: (
            "Indicar si la Compañía opera en moneda extranjera o mantiene coberturas o instrumentos derivados.",
            "Please state whether the Company trades in foreign currency or holds hedges or derivative instruments.",
        ),
        priority: Priority::Baja,
    },
];

/// The fixed baseline topics, in their declared order, all `Abierto`.
pub fn standard_checklist(language: Language) -> Vec<ChecklistItem> {
    TOPICS
        .iter()
        .map(|t| ChecklistItem {
            id: t.id.to_string(),
            topic: LocalizedText::build(language, || t.topic.0.to_string(), || t.topic.1.to_string()),
            question: LocalizedText::build(language, || t.question.0.to_string(), || t.question.1.to_string()),
            priority: t.priority,
            status: Status::default(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    #[test]
    fn test_core_topics_present() {
        let checklist = standard_checklist(Language::Es);
        let ids: BTreeSet<&str> = checklist.iter().map(|c| c.id.as_str()).collect();
        for required in [
            "bank-reconciliation",
            "financial-debt",
            "tax-social-security",
            "sales-customers",
            "personnel",
        ] {
            assert!(ids.contains(required), "missing {}", required);
        }
        assert_eq!(ids.len(), checklist.len(), "ids must be unique");
        assert!(checklist.iter().all(|c| c.status == Status::Abierto));
    }

    #[test]
    fn test_language_selection() {
        let english = standard_checklist(Language::En);
        assert!(english.iter().all(|c| c.question.es.is_none() && c.question.en.is_some()));

        let both = standard_checklist(Language::Both);
        assert!(both.iter().all(|c| c.topic.es.is_some() && c.topic.en.is_some()));
    }
}
