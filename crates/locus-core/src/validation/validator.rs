//! Location validator.

use std::sync::LazyLock;

use chrono::{DateTime, Duration, Utc};
use regex::Regex;
use tracing::debug;

use super::{Severity, ValidationIssue, ValidationResult};
use crate::types::{
    Coordinates, Facility, LocationPatch, LocationRecord, LocationStatus, OperatingHours,
    WeeklySchedule,
};

static PHONE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\(\d{2}\)\s\d{4,5}-\d{4}$").expect("valid phone regex"));
static EMAIL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid email regex"));
static CEP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{5}-?\d{3}$").expect("valid cep regex"));
static TIME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([01]?[0-9]|2[0-3]):[0-5][0-9]$").expect("valid time regex"));

pub(crate) const REQUIRED_FIELDS: [&str; 4] = ["nome_local", "endereco_completo", "cidade", "estado"];
const MIN_NAME_LEN: usize = 2;
const MIN_ADDRESS_LEN: usize = 10;
const STALE_DATA_DAYS: i64 = 30;
const STALE_VERIFICATION_DAYS: i64 = 90;

/// Whether absent required fields count as missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Completeness {
    Full,
    Partial,
}

/// Validates full records and partial updates.
///
/// # Example
///
/// ```
/// use locus_core::{LocationPatch, LocationValidator};
///
/// let patch = LocationPatch {
///     name: Some(String::new()),
///     ..LocationPatch::default()
/// };
///
/// let result = LocationValidator::new().validate_patch(&patch);
/// assert!(!result.is_valid);
/// assert!(result.has_error_for("nome_local"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct LocationValidator;

impl LocationValidator {
    pub fn new() -> Self {
        Self
    }

    /// Validates a complete record. Required fields must be present.
    pub fn validate_record(&self, record: &LocationRecord) -> ValidationResult {
        self.run(&LocationPatch::from(record), Completeness::Full, Utc::now())
    }

    /// Validates a partial update. Only the fields it carries are checked,
    /// but a carried required field must not be empty.
    pub fn validate_patch(&self, patch: &LocationPatch) -> ValidationResult {
        self.run(patch, Completeness::Partial, Utc::now())
    }

    /// Like [`validate_record`](Self::validate_record) with an explicit clock,
    /// for the freshness checks.
    pub fn validate_record_at(&self, record: &LocationRecord, now: DateTime<Utc>) -> ValidationResult {
        self.run(&LocationPatch::from(record), Completeness::Full, now)
    }

    fn run(&self, loc: &LocationPatch, mode: Completeness, now: DateTime<Utc>) -> ValidationResult {
        let mut issues = Vec::new();
        let mut warnings = Vec::new();

        check_required(loc, mode, &mut issues);
        check_fields(loc, &mut issues);
        check_cross_fields(loc, &mut issues);
        if mode == Completeness::Full {
            check_business_rules(loc, &mut issues);
            check_consistency(loc, now, &mut warnings);
        }

        let result = ValidationResult::from_parts(issues, warnings);
        debug!(
            location_id = loc.id.as_ref().map(|id| id.as_str()).unwrap_or("-"),
            is_valid = result.is_valid,
            issues = result.issues.len(),
            "Location validated"
        );
        result
    }
}

fn required_value<'a>(loc: &'a LocationPatch, field: &str) -> Option<&'a str> {
    match field {
        "nome_local" => loc.name.as_deref(),
        "endereco_completo" => loc.address.as_deref(),
        "cidade" => loc.city.as_deref(),
        "estado" => loc.state.as_deref(),
        _ => None,
    }
}

fn display_name(field: &str) -> &str {
    match field {
        "nome_local" => "location name",
        "endereco_completo" => "full address",
        "cidade" => "city",
        "estado" => "state",
        other => other,
    }
}

fn check_required(loc: &LocationPatch, mode: Completeness, issues: &mut Vec<ValidationIssue>) {
    for field in REQUIRED_FIELDS {
        let missing = match required_value(loc, field) {
            Some(value) => value.trim().is_empty(),
            None => mode == Completeness::Full,
        };
        if missing {
            issues.push(ValidationIssue::new(
                field,
                format!("required field is empty: {}", display_name(field)),
                Severity::Error,
            ));
        }
    }
}

fn check_fields(loc: &LocationPatch, issues: &mut Vec<ValidationIssue>) {
    // Empty required values were already reported; length rules only apply
    // to non-empty values.
    if let Some(name) = non_empty(&loc.name)
        && name.chars().count() < MIN_NAME_LEN
    {
        issues.push(ValidationIssue::new(
            "nome_local",
            format!("location name must have at least {MIN_NAME_LEN} characters"),
            Severity::Error,
        ));
    }

    if let Some(address) = non_empty(&loc.address)
        && address.chars().count() < MIN_ADDRESS_LEN
    {
        issues.push(ValidationIssue::new(
            "endereco_completo",
            format!("address must have at least {MIN_ADDRESS_LEN} characters"),
            Severity::Error,
        ));
    }

    if let Some(phone) = non_empty(&loc.phone)
        && !PHONE.is_match(phone)
    {
        issues.push(ValidationIssue::new(
            "telefone",
            "phone must match (XX) XXXXX-XXXX",
            Severity::Warning,
        ));
    }

    if let Some(email) = non_empty(&loc.email)
        && !EMAIL.is_match(email)
    {
        issues.push(ValidationIssue::new("email", "email is malformed", Severity::Warning));
    }

    if let Some(cep) = non_empty(&loc.postal_code)
        && !CEP.is_match(cep)
    {
        issues.push(ValidationIssue::new("cep", "CEP must match XXXXX-XXX", Severity::Warning));
    }

    if let Some(coordinates) = &loc.coordinates
        && !coordinates_in_range(coordinates)
    {
        issues.push(ValidationIssue::new(
            "coordenadas",
            "latitude must be within [-90, 90] and longitude within [-180, 180]",
            Severity::Error,
        ));
    }

    if let Some(hours) = &loc.hours {
        check_schedule(hours, issues);
    }

    if let Some(facilities) = &loc.facilities {
        check_facilities(facilities, issues);
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn coordinates_in_range(c: &Coordinates) -> bool {
    c.lat.is_finite()
        && c.lng.is_finite()
        && (-90.0..=90.0).contains(&c.lat)
        && (-180.0..=180.0).contains(&c.lng)
}

fn minutes(time: &str) -> Option<u32> {
    if !TIME.is_match(time) {
        return None;
    }
    let (h, m) = time.split_once(':')?;
    Some(h.parse::<u32>().ok()? * 60 + m.parse::<u32>().ok()?)
}

fn check_schedule(schedule: &WeeklySchedule, issues: &mut Vec<ValidationIssue>) {
    for (day, hours) in schedule.days() {
        if let Some(problem) = day_problem(hours) {
            issues.push(ValidationIssue::new(
                "horario_funcionamento",
                format!("{day}: {problem}"),
                Severity::Error,
            ));
            continue;
        }

        if let Some(lunch) = &hours.lunch
            && !hours.closed
        {
            let fits = match (
                minutes(&lunch.starts),
                minutes(&lunch.ends),
                minutes(&hours.opens),
                minutes(&hours.closes),
            ) {
                (Some(s), Some(e), Some(o), Some(c)) => o <= s && s < e && e <= c,
                _ => false,
            };
            if !fits {
                issues.push(ValidationIssue::new(
                    "horario_funcionamento",
                    format!("{day}: lunch break must fall inside opening hours"),
                    Severity::Warning,
                ));
            }
        }
    }
}

fn day_problem(hours: &OperatingHours) -> Option<&'static str> {
    if hours.closed {
        return None;
    }
    match (minutes(&hours.opens), minutes(&hours.closes)) {
        (Some(open), Some(close)) if open < close => None,
        (Some(_), Some(_)) => Some("opening time must be before closing time"),
        _ => Some("times must use the HH:MM format"),
    }
}

fn check_facilities(facilities: &[Facility], issues: &mut Vec<ValidationIssue>) {
    for facility in facilities {
        if facility.facility_type().is_none() {
            issues.push(ValidationIssue::new(
                "facilidades",
                format!("unknown facility type '{}'", facility.kind),
                Severity::Error,
            ));
        }
    }
}

fn check_cross_fields(loc: &LocationPatch, issues: &mut Vec<ValidationIssue>) {
    match loc.status {
        Some(LocationStatus::TemporarilyClosed) if non_empty(&loc.closure_reason).is_none() => {
            issues.push(ValidationIssue::new(
                "motivo_fechamento",
                "temporarily closed locations must state a reason",
                Severity::Warning,
            ));
        },
        Some(LocationStatus::Maintenance) if non_empty(&loc.reopening_forecast).is_none() => {
            issues.push(ValidationIssue::new(
                "previsao_reabertura",
                "locations under maintenance should state a reopening forecast",
                Severity::Info,
            ));
        },
        _ => {},
    }

    if let (Some(address), Some(city)) = (non_empty(&loc.address), non_empty(&loc.city))
        && !address.to_lowercase().contains(&city.to_lowercase())
    {
        issues.push(ValidationIssue::new(
            "endereco_completo",
            "address should mention the city",
            Severity::Warning,
        ));
    }
}

fn check_business_rules(loc: &LocationPatch, issues: &mut Vec<ValidationIssue>) {
    let has_contact = [&loc.phone, &loc.whatsapp, &loc.email]
        .into_iter()
        .any(|c| non_empty(c).is_some());
    if !has_contact {
        issues.push(ValidationIssue::new(
            "telefone",
            "location should have at least one contact (phone, WhatsApp or email)",
            Severity::Warning,
        ));
    }

    if let Some(hours) = &loc.hours
        && hours.days().iter().all(|(_, h)| h.closed)
    {
        issues.push(ValidationIssue::new(
            "horario_funcionamento",
            "location should open at least one day a week",
            Severity::Warning,
        ));
    }
}

fn check_consistency(loc: &LocationPatch, now: DateTime<Utc>, warnings: &mut Vec<String>) {
    if let Some(updated) = loc.updated_at {
        let age = now - updated;
        if age > Duration::days(STALE_DATA_DAYS) {
            warnings.push(format!("data not updated for {} days", age.num_days()));
        }
    }

    if let Some(verified) = loc.verified_at {
        let age = now - verified;
        if age > Duration::days(STALE_VERIFICATION_DAYS) {
            warnings.push(format!("data not verified for {} days", age.num_days()));
        }
    }

    let mut missing = Vec::new();
    if loc.coordinates.is_none() {
        missing.push("coordenadas");
    }
    if non_empty(&loc.website).is_none() {
        missing.push("website");
    }
    if loc.facilities.as_ref().is_none_or(Vec::is_empty) {
        missing.push("facilidades");
    }
    if !missing.is_empty() {
        warnings.push(format!("important optional fields missing: {}", missing.join(", ")));
    }
}
