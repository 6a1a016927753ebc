//! Technician report generation
//!
//! Validates the fields of a repair ("reparo") or installation ("instalação")
//! report and renders them into the fixed text block pasted into the ticketing
//! system. Labels and messages are in Portuguese because that is what ends up
//! in the ticket.

use std::fmt;

use chrono::{DateTime, Local};
use thiserror::Error;

/// Minimum length of the two free-text fields, in `char`s after trimming
const MIN_TEXT_LENGTH: usize = 5;

/// Value rendered for an empty field
const NOT_AVAILABLE: &str = "N/A";

/// Which report is being filled in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportKind {
    Reparo,
    Instalacao,
}

impl ReportKind {
    /// Parses a report kind from a string (case-insensitive)
    ///
    /// Supports aliases:
    /// - "reparo", "repair" -> Reparo
    /// - "instalacao", "instalação", "inst", "install", "installation" -> Instalacao
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "reparo" | "repair" => Some(ReportKind::Reparo),
            "instalacao" | "instalação" | "inst" | "install" | "installation" => {
                Some(ReportKind::Instalacao)
            }
            _ => None,
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            ReportKind::Reparo => "RELATÓRIO DE REPARO",
            ReportKind::Instalacao => "RELATÓRIO DE INSTALAÇÃO",
        }
    }

    /// Label used in validation messages
    ///
    /// The first two fields carry a different label per kind instead of one
    /// combined "reparo / instalação" label.
    fn label(&self, field: Field) -> &'static str {
        match (self, field) {
            (ReportKind::Reparo, Field::Cliente) => "Reclamação do cliente",
            (ReportKind::Reparo, Field::Endereco) => "O que foi feito para corrigir",
            (ReportKind::Instalacao, Field::Cliente) => "Todos os produtos funcionando",
            (ReportKind::Instalacao, Field::Endereco) => "Local do modem",
            (_, Field::Produto) => "Orientação ao cliente",
            (_, Field::Tecnico) => "Código do Mapa de Calor",
            (_, Field::Test) => "ID do Speed Test",
            (_, Field::Power) => "Potência Fibra PowerMeter",
        }
    }
}

/// The validated fields, in form order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Cliente,
    Endereco,
    Produto,
    Tecnico,
    Test,
    Power,
}

impl Field {
    const ALL: [Field; 6] = [
        Field::Cliente,
        Field::Endereco,
        Field::Produto,
        Field::Tecnico,
        Field::Test,
        Field::Power,
    ];

    fn min_length(&self) -> Option<usize> {
        match self {
            Field::Cliente | Field::Endereco => Some(MIN_TEXT_LENGTH),
            _ => None,
        }
    }

    fn is_numeric(&self) -> bool {
        matches!(self, Field::Test | Field::Power)
    }
}

/// Raw form input
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportFields {
    /// Customer complaint (reparo) / all products working (instalação)
    pub cliente: String,
    /// What was done to fix it (reparo) / where the modem is (instalação)
    pub endereco: String,
    pub produto: String,
    pub tecnico: String,
    pub test: String,
    pub power: String,
    pub obs: String,
}

impl ReportFields {
    fn value(&self, field: Field) -> &str {
        match field {
            Field::Cliente => &self.cliente,
            Field::Endereco => &self.endereco,
            Field::Produto => &self.produto,
            Field::Tecnico => &self.tecnico,
            Field::Test => &self.test,
            Field::Power => &self.power,
        }
    }
}

/// What is wrong with a field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Problem {
    Required,
    TooShort(usize),
    NotNumeric,
}

/// One field that failed validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub label: &'static str,
    pub problem: Problem,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.problem {
            Problem::Required => write!(f, "O campo \"{}\" é obrigatório.", self.label),
            Problem::TooShort(min) => write!(
                f,
                "O campo \"{}\" deve ter no mínimo {} caracteres.",
                self.label, min
            ),
            Problem::NotNumeric => {
                write!(f, "O campo \"{}\" deve conter apenas números.", self.label)
            }
        }
    }
}

/// Errors that can occur when generating a report
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("{}", join_lines(.0))]
    Invalid(Vec<ValidationError>),
}

fn join_lines(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Checks every field and collects all problems, one per field at most
pub fn validate(kind: ReportKind, fields: &ReportFields) -> Vec<ValidationError> {
    Field::ALL
        .iter()
        .filter_map(|&field| {
            let value = fields.value(field).trim();
            let problem = if value.is_empty() {
                Some(Problem::Required)
            } else if let Some(min) = field.min_length().filter(|&min| value.chars().count() < min) {
                Some(Problem::TooShort(min))
            } else if field.is_numeric() && !is_numeric(value) {
                Some(Problem::NotNumeric)
            } else {
                None
            };
            problem.map(|problem| ValidationError {
                label: kind.label(field),
                problem,
            })
        })
        .collect()
}

/// Accepts digits with an optional sign and a `.` or `,` decimal separator
fn is_numeric(value: &str) -> bool {
    let normalized = value.replacen(',', ".", 1);
    normalized
        .chars()
        .all(|c| c.is_ascii_digit() || c == '.' || c == '-')
        && normalized.parse::<f64>().is_ok()
}

fn or_na(value: &str) -> &str {
    match value.trim() {
        "" => NOT_AVAILABLE,
        trimmed => trimmed,
    }
}

/// Renders the report text for the given timestamp
pub fn render(kind: ReportKind, fields: &ReportFields, at: DateTime<Local>) -> String {
    let timestamp = at.format("%d/%m/%Y, %H:%M:%S");
    let cliente = or_na(&fields.cliente);
    let endereco = or_na(&fields.endereco);
    let produto = or_na(&fields.produto);
    let tecnico = or_na(&fields.tecnico);
    let test = or_na(&fields.test);
    let power = or_na(&fields.power);
    let obs = or_na(&fields.obs);

    match kind {
        ReportKind::Reparo => format!(
            "{}\n\n\
             ;DATA HORA: {};\n\
             ;Reclamação do cliente: {};\n\
             ;O que foi feito para corrigir: {};\n\
             ;Orientação ao cliente: {};\n\
             ;Código do Mapa de Calor: {};\n\
             ;ID do Speed Test: {};\n\
             ;Potência Fibra PowerMeter: {};\n\
             ;OBSERVAÇÕES: {};",
            kind.title(),
            timestamp,
            cliente,
            endereco,
            produto,
            tecnico,
            test,
            power,
            obs
        ),
        ReportKind::Instalacao => format!(
            "{}\n\n\
             ;DATA HORA:; {};\n\
             ;Todos os produtos funcionando corretamente:: {};\n\
             ;Informe o local onde o modem está instalado:: {};\n\
             ;Orientação ao cliente: {};\n\
             ;Código do Mapa de Calor: {};\n\
             ;ID do Speed Test: {};\n\
             ;Potência Fibra PowerMeter: {};\n\
             ;OBSERVAÇÕES: {};",
            kind.title(),
            timestamp,
            cliente,
            endereco,
            produto,
            tecnico,
            test,
            power,
            obs
        ),
    }
}

/// Validates and renders with the current local time
pub fn generate(kind: ReportKind, fields: &ReportFields) -> Result<String, ReportError> {
    let errors = validate(kind, fields);
    if !errors.is_empty() {
        return Err(ReportError::Invalid(errors));
    }
    Ok(render(kind, fields, Local::now()))
}
