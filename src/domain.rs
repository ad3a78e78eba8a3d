// 🗂️ Domains - which export is which, and what its canonical schema looks like
// Every source file belongs to exactly one domain, detected from its filename.

use chrono::Datelike;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

// ============================================================================
// DOMAIN
// ============================================================================

/// Domain - Identifica de qué reporte viene el archivo
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Domain {
    Recaudo,
    Cartera,
    Pipeline,
    Colocacion,
}

impl Domain {
    pub const ALL: [Domain; 4] = [
        Domain::Recaudo,
        Domain::Cartera,
        Domain::Pipeline,
        Domain::Colocacion,
    ];

    /// Human-readable name for display
    pub fn name(&self) -> &'static str {
        match self {
            Domain::Recaudo => "Recaudo",
            Domain::Cartera => "Cartera",
            Domain::Pipeline => "Pipeline",
            Domain::Colocacion => "Colocación",
        }
    }

    /// Short code: directory name and filename prefix
    pub fn code(&self) -> &'static str {
        match self {
            Domain::Recaudo => "recaudo",
            Domain::Cartera => "cartera",
            Domain::Pipeline => "pipeline",
            Domain::Colocacion => "colocacion",
        }
    }

    /// `<data_dir>/<domain>/raw`
    pub fn raw_dir(&self, data_dir: &Path) -> PathBuf {
        data_dir.join(self.code()).join("raw")
    }

    /// `<data_dir>/<domain>/cache`
    pub fn cache_dir(&self, data_dir: &Path) -> PathBuf {
        data_dir.join(self.code()).join("cache")
    }

    /// Detect the domain from a filename prefix ("recaudo-2024-10.xlsx" → Recaudo)
    pub fn detect(file_path: &Path) -> Option<Domain> {
        let stem = file_path.file_stem()?.to_str()?.to_lowercase();
        Domain::ALL.into_iter().find(|d| {
            stem.strip_prefix(d.code())
                .map(|rest| rest.starts_with('-'))
                .unwrap_or(false)
        })
    }

    pub fn schema(&self) -> DomainSchema {
        match self {
            Domain::Recaudo => DomainSchema {
                domain: *self,
                header_row: 0,
                header_style: HeaderStyle::UpperSnake,
                columns: RECAUDO_COLUMNS,
                dedup_key: &[],
                update_date_hints: &[],
                fill_missing_numbers: false,
            },
            Domain::Cartera => DomainSchema {
                domain: *self,
                // El reporte de cartera trae 7 filas de encabezado del sistema contable
                header_row: 7,
                header_style: HeaderStyle::Trimmed,
                columns: CARTERA_COLUMNS,
                dedup_key: &["Vencimiento", "Razon Social", "Placa"],
                update_date_hints: &[
                    "fecha actualiz",
                    "date actualiz",
                    "corte",
                    "fecha corte",
                    "fecha modif",
                ],
                fill_missing_numbers: true,
            },
            Domain::Pipeline => DomainSchema {
                domain: *self,
                header_row: 0,
                header_style: HeaderStyle::UpperSnake,
                columns: PIPELINE_COLUMNS,
                dedup_key: &[],
                update_date_hints: &[],
                fill_missing_numbers: false,
            },
            Domain::Colocacion => DomainSchema {
                domain: *self,
                header_row: 0,
                header_style: HeaderStyle::UpperSnake,
                columns: COLOCACION_COLUMNS,
                dedup_key: &[],
                update_date_hints: &[],
                fill_missing_numbers: false,
            },
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Domain {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "recaudo" => Ok(Domain::Recaudo),
            "cartera" => Ok(Domain::Cartera),
            "pipeline" => Ok(Domain::Pipeline),
            "colocacion" | "colocación" => Ok(Domain::Colocacion),
            other => Err(format!(
                "unknown domain '{}' (expected recaudo, cartera, pipeline or colocacion)",
                other
            )),
        }
    }
}

// ============================================================================
// CANONICAL SCHEMA
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    /// Categorical dimension (zone, client, advisor, product...)
    Text,
    /// Calendar date, null when unparseable
    Date,
    /// Money amount: non-negative or null
    Money,
    /// Plain number, may be negative (days overdue, year, month)
    Number,
}

#[derive(Debug, Clone, Copy)]
pub struct ColumnSpec {
    pub name: &'static str,
    pub kind: ColumnKind,
    /// Alternative headers seen in real exports, matched after folding
    pub aliases: &'static [&'static str],
    /// Missing required columns produce a schema warning
    pub required: bool,
}

const fn col(name: &'static str, kind: ColumnKind, required: bool) -> ColumnSpec {
    ColumnSpec {
        name,
        kind,
        aliases: &[],
        required,
    }
}

const fn aliased(
    name: &'static str,
    kind: ColumnKind,
    required: bool,
    aliases: &'static [&'static str],
) -> ColumnSpec {
    ColumnSpec {
        name,
        kind,
        aliases,
        required,
    }
}

/// How unmatched headers are rewritten
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderStyle {
    /// Keep the header, only trimmed ("Total Cuota")
    Trimmed,
    /// UPPER_SNAKE without accents ("Centro de Costo" → "CENTRO_DE_COSTO")
    UpperSnake,
}

#[derive(Debug, Clone, Copy)]
pub struct DomainSchema {
    pub domain: Domain,
    /// 0-based sheet row holding the headers
    pub header_row: usize,
    pub header_style: HeaderStyle,
    pub columns: &'static [ColumnSpec],
    /// Composite key for deduplication; empty = no dedup for this domain
    pub dedup_key: &'static [&'static str],
    /// Lowercase fragments identifying an "updated at" column
    pub update_date_hints: &'static [&'static str],
    /// Fill null numeric cells with 0 after cleaning
    pub fill_missing_numbers: bool,
}

impl DomainSchema {
    pub fn spec(&self, name: &str) -> Option<&ColumnSpec> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn required_columns(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.columns.iter().filter(|c| c.required).map(|c| c.name)
    }
}

const RECAUDO_COLUMNS: &[ColumnSpec] = &[
    col("FECHA_VENCIMIENTO", ColumnKind::Date, true),
    col("FECHA_RECAUDO", ColumnKind::Date, true),
    col("POR_VENCER", ColumnKind::Money, true),
    aliased("TREINTA_DIAS", ColumnKind::Money, true, &["DIAS_30", "30_DIAS"]),
    aliased("SESENTA_DIAS", ColumnKind::Money, true, &["DIAS_60", "60_DIAS"]),
    aliased("NOVENTA_DIAS", ColumnKind::Money, true, &["DIAS_90", "90_DIAS"]),
    aliased("MAS_NOVENTA", ColumnKind::Money, true, &["MAS_DE_NOVENTA", "MAS_90"]),
    col("DIAS_VENCIDOS", ColumnKind::Number, true),
    col("FUENTE", ColumnKind::Text, false),
    col("NOMBRE_FUENTE", ColumnKind::Text, false),
    col("ZONA", ColumnKind::Text, false),
    col("CLIENTE", ColumnKind::Text, false),
];

const CARTERA_COLUMNS: &[ColumnSpec] = &[
    aliased("Cuenta", ColumnKind::Text, true, &["Numero Cuenta", "Cuenta Contable"]),
    aliased(
        "Razon Social",
        ColumnKind::Text,
        true,
        &[
            "Nombre",
            "Nombre Cliente",
            "Cliente",
            "Nombre Completo",
            "Razon",
            "Social",
            "Nombre de Cliente",
        ],
    ),
    aliased(
        "Placa",
        ColumnKind::Text,
        true,
        &[
            "Placa Vehiculo",
            "Placa del Vehiculo",
            "Numero Placa",
            "Numero de Placa",
        ],
    ),
    col("Vencimiento", ColumnKind::Date, true),
    col("Por Vencer", ColumnKind::Money, true),
    col("Dias30", ColumnKind::Money, true),
    col("Dias60", ColumnKind::Money, true),
    col("Dias90", ColumnKind::Money, true),
    aliased("Dias Mas90", ColumnKind::Money, true, &["Dias Mas 90", "Mas90"]),
    col("Total Cuota", ColumnKind::Money, true),
    col("Mora", ColumnKind::Money, false),
    col("Dias Vencidos", ColumnKind::Number, false),
    col("Zona", ColumnKind::Text, false),
];

const PIPELINE_COLUMNS: &[ColumnSpec] = &[
    aliased("FECHA", ColumnKind::Date, true, &["FECHA_SOLICITUD", "FECHA_CREACION"]),
    aliased("ESTADO", ColumnKind::Text, true, &["ESTADO_CREDITO", "ESTADO_SOLICITUD"]),
    col("CLIENTE", ColumnKind::Text, false),
    col("ASESOR", ColumnKind::Text, false),
    col("PRODUCTO", ColumnKind::Text, false),
    col("ESTACION", ColumnKind::Text, false),
    col("CONSECUTIVO", ColumnKind::Text, false),
    col("IDENTIFICACION", ColumnKind::Text, false),
];

const COLOCACION_COLUMNS: &[ColumnSpec] = &[
    aliased("TOTALFAC", ColumnKind::Money, true, &["TOTAL_FACTURA", "VALOR_FACTURA"]),
    aliased("ANIO", ColumnKind::Number, false, &["AÑO", "YEAR"]),
    col("MES", ColumnKind::Number, false),
    aliased("FECHA_DOCUMENTO", ColumnKind::Date, false, &["FECHA_DOC", "FECHA"]),
    aliased("CENTRO_COSTO", ColumnKind::Text, false, &["CENTRO_DE_COSTO"]),
    col("VENDEDOR", ColumnKind::Text, false),
    col("MODALIDAD_VENTA", ColumnKind::Text, false),
    col("BODEGA", ColumnKind::Text, false),
];

// ============================================================================
// PERIOD
// ============================================================================

pub const MONTH_NAMES: [&str; 12] = [
    "Enero",
    "Febrero",
    "Marzo",
    "Abril",
    "Mayo",
    "Junio",
    "Julio",
    "Agosto",
    "Septiembre",
    "Octubre",
    "Noviembre",
    "Diciembre",
];

lazy_static! {
    static ref PERIOD_IN_NAME: Regex =
        Regex::new(r"(?:^|\D)(\d{4})(?:-(\d{1,2}))?(?:[^\d-]|-\D|$)").expect("valid period pattern");
}

/// Reporting period of a source file: a year, optionally narrowed to a month
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Period {
    pub year: i32,
    pub month: Option<u32>,
}

impl Period {
    pub fn month(year: i32, month: u32) -> Option<Period> {
        (1..=12).contains(&month).then_some(Period {
            year,
            month: Some(month),
        })
    }

    pub fn year(year: i32) -> Period {
        Period { year, month: None }
    }

    pub fn of_date(date: chrono::NaiveDate) -> Period {
        Period {
            year: date.year(),
            month: Some(date.month()),
        }
    }

    /// Extract the period from a file stem: "recaudo-2024-10" → 2024-10
    ///
    /// Months outside 1..=12, or longer than two digits, make the whole name invalid.
    pub fn from_file_stem(stem: &str) -> Option<Period> {
        let caps = PERIOD_IN_NAME.captures(stem)?;
        let year: i32 = caps.get(1)?.as_str().parse().ok()?;
        match caps.get(2) {
            Some(m) => Period::month(year, m.as_str().parse().ok()?),
            None => Some(Period::year(year)),
        }
    }

    /// Previous calendar month; January rolls back to December of the prior year
    pub fn previous_month(&self) -> Option<Period> {
        let month = self.month?;
        if month == 1 {
            Period::month(self.year - 1, 12)
        } else {
            Period::month(self.year, month - 1)
        }
    }

    /// Spanish label: "Octubre 2024", or just "2024"
    pub fn label(&self) -> String {
        match self.month {
            Some(m) => format!("{} {}", MONTH_NAMES[(m - 1) as usize], self.year),
            None => self.year.to_string(),
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.month {
            Some(m) => write!(f, "{}-{:02}", self.year, m),
            None => write!(f, "{}", self.year),
        }
    }
}

impl FromStr for Period {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let parsed = match s.split_once('-') {
            Some((y, m)) => match (y.parse::<i32>(), m.parse::<u32>()) {
                (Ok(y), Ok(m)) => Period::month(y, m),
                _ => None,
            },
            None => s.parse::<i32>().ok().map(Period::year),
        };
        parsed.ok_or_else(|| format!("invalid period '{}' (expected YYYY-MM or YYYY)", s))
    }
}

// ============================================================================
// TESTS
// ============================================================================
