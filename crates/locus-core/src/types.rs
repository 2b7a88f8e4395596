//! Location data model.
//!
//! Wire names follow the backend schema (Portuguese snake_case), Rust names
//! are English. Records are owned by the backend; the cache only keeps
//! read-optimized copies of them.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Location identifier.
///
/// # Example
///
/// ```
/// use locus_core::LocationId;
///
/// let id = LocationId::new("loc-1");
/// assert_eq!(id.as_str(), "loc-1");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LocationId(String);

impl LocationId {
    /// Creates a new location identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LocationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for LocationId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for LocationId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Lifecycle status of a location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LocationStatus {
    #[serde(rename = "ativo")]
    Active,
    #[serde(rename = "fechado")]
    Closed,
    #[serde(rename = "temporariamente_fechado")]
    TemporarilyClosed,
    #[serde(rename = "manutencao")]
    Maintenance,
}

impl LocationStatus {
    /// Wire name of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "ativo",
            Self::Closed => "fechado",
            Self::TemporarilyClosed => "temporariamente_fechado",
            Self::Maintenance => "manutencao",
        }
    }

    /// Parses a wire name.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "ativo" => Some(Self::Active),
            "fechado" => Some(Self::Closed),
            "temporariamente_fechado" => Some(Self::TemporarilyClosed),
            "manutencao" => Some(Self::Maintenance),
            _ => None,
        }
    }
}

impl fmt::Display for LocationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Origin of a record's data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DataSource {
    #[default]
    Manual,
    Api,
    Scraping,
    UserReport,
}

/// Facility types a location can advertise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FacilityType {
    Parking,
    Accessibility,
    Pharmacy,
    Laboratory,
    Wifi,
    AirConditioning,
    Elevator,
    Cafe,
    AdaptedRestroom,
    KidsWaitingRoom,
}

impl FacilityType {
    /// All known facility types.
    pub const ALL: [FacilityType; 10] = [
        Self::Parking,
        Self::Accessibility,
        Self::Pharmacy,
        Self::Laboratory,
        Self::Wifi,
        Self::AirConditioning,
        Self::Elevator,
        Self::Cafe,
        Self::AdaptedRestroom,
        Self::KidsWaitingRoom,
    ];

    /// Wire name of the facility type.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Parking => "estacionamento",
            Self::Accessibility => "acessibilidade",
            Self::Pharmacy => "farmacia",
            Self::Laboratory => "laboratorio",
            Self::Wifi => "wifi",
            Self::AirConditioning => "ar_condicionado",
            Self::Elevator => "elevador",
            Self::Cafe => "cafe",
            Self::AdaptedRestroom => "banheiro_adaptado",
            Self::KidsWaitingRoom => "sala_espera_criancas",
        }
    }

    /// Parses a wire name, returning `None` for unknown types.
    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == value)
    }
}

/// Cost of a facility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum FacilityCost {
    #[serde(rename = "gratuito")]
    Free,
    #[serde(rename = "pago")]
    Paid,
    #[default]
    #[serde(rename = "nao_informado")]
    Unknown,
}

/// A facility entry. The type is kept as the raw wire string because the
/// backend may send types this build does not know about; the validator
/// flags those.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Facility {
    #[serde(rename = "type")]
    pub kind: String,
    pub available: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost: Option<FacilityCost>,
}

impl Facility {
    /// Creates an available facility of the given type.
    pub fn available(kind: FacilityType) -> Self {
        Self {
            kind: kind.as_str().to_string(),
            available: true,
            details: None,
            cost: None,
        }
    }

    /// Returns the parsed facility type, if known.
    pub fn facility_type(&self) -> Option<FacilityType> {
        FacilityType::parse(&self.kind)
    }
}

/// Precision of a coordinate pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum CoordinatePrecision {
    #[default]
    #[serde(rename = "exata")]
    Exact,
    #[serde(rename = "aproximada")]
    Approximate,
}

/// Geographic coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
    #[serde(rename = "precisao", default)]
    pub precision: CoordinatePrecision,
}

impl Coordinates {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self {
            lat,
            lng,
            precision: CoordinatePrecision::Exact,
        }
    }
}

/// Lunch break inside a working day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LunchBreak {
    #[serde(rename = "inicio")]
    pub starts: String,
    #[serde(rename = "fim")]
    pub ends: String,
}

/// Opening hours for a single day, as `HH:MM` strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperatingHours {
    #[serde(rename = "abertura")]
    pub opens: String,
    #[serde(rename = "fechamento")]
    pub closes: String,
    #[serde(rename = "fechado", default)]
    pub closed: bool,
    #[serde(rename = "almoco", default, skip_serializing_if = "Option::is_none")]
    pub lunch: Option<LunchBreak>,
}

impl OperatingHours {
    /// An open day.
    pub fn open(opens: impl Into<String>, closes: impl Into<String>) -> Self {
        Self {
            opens: opens.into(),
            closes: closes.into(),
            closed: false,
            lunch: None,
        }
    }

    /// A closed day.
    pub fn closed() -> Self {
        Self {
            opens: "00:00".to_string(),
            closes: "00:00".to_string(),
            closed: true,
            lunch: None,
        }
    }
}

/// Opening hours for a full week.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeeklySchedule {
    #[serde(rename = "segunda")]
    pub monday: OperatingHours,
    #[serde(rename = "terca")]
    pub tuesday: OperatingHours,
    #[serde(rename = "quarta")]
    pub wednesday: OperatingHours,
    #[serde(rename = "quinta")]
    pub thursday: OperatingHours,
    #[serde(rename = "sexta")]
    pub friday: OperatingHours,
    #[serde(rename = "sabado")]
    pub saturday: OperatingHours,
    #[serde(rename = "domingo")]
    pub sunday: OperatingHours,
}

impl WeeklySchedule {
    /// Weekdays open with the given hours, weekend closed.
    pub fn business_days(opens: &str, closes: &str) -> Self {
        let open = OperatingHours::open(opens, closes);
        Self {
            monday: open.clone(),
            tuesday: open.clone(),
            wednesday: open.clone(),
            thursday: open.clone(),
            friday: open,
            saturday: OperatingHours::closed(),
            sunday: OperatingHours::closed(),
        }
    }

    /// Iterates `(wire day name, hours)` pairs from Monday to Sunday.
    pub fn days(&self) -> [(&'static str, &OperatingHours); 7] {
        [
            ("segunda", &self.monday),
            ("terca", &self.tuesday),
            ("quarta", &self.wednesday),
            ("quinta", &self.thursday),
            ("sexta", &self.friday),
            ("sabado", &self.saturday),
            ("domingo", &self.sunday),
        ]
    }
}

/// An enhanced location record as owned by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationRecord {
    pub id: LocationId,
    #[serde(rename = "nome_local")]
    pub name: String,
    #[serde(rename = "endereco_completo")]
    pub address: String,
    #[serde(rename = "bairro", default)]
    pub neighborhood: String,
    #[serde(rename = "cidade")]
    pub city: String,
    #[serde(rename = "estado")]
    pub state: String,
    #[serde(rename = "cep", default)]
    pub postal_code: String,

    #[serde(rename = "telefone", default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub whatsapp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,

    #[serde(rename = "coordenadas", default, skip_serializing_if = "Option::is_none")]
    pub coordinates: Option<Coordinates>,
    #[serde(rename = "horario_funcionamento")]
    pub hours: WeeklySchedule,
    #[serde(rename = "facilidades", default)]
    pub facilities: Vec<Facility>,

    pub status: LocationStatus,
    #[serde(rename = "motivo_fechamento", default, skip_serializing_if = "Option::is_none")]
    pub closure_reason: Option<String>,
    #[serde(rename = "previsao_reabertura", default, skip_serializing_if = "Option::is_none")]
    pub reopening_forecast: Option<String>,

    #[serde(rename = "descricao", default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "instrucoes_acesso", default, skip_serializing_if = "Option::is_none")]
    pub access_instructions: Option<String>,

    #[serde(rename = "ultima_atualizacao")]
    pub updated_at: DateTime<Utc>,
    #[serde(rename = "verificado_em", default, skip_serializing_if = "Option::is_none")]
    pub verified_at: Option<DateTime<Utc>>,
    #[serde(rename = "fonte_dados", default)]
    pub source: DataSource,
}

impl LocationRecord {
    /// Applies the fields carried by `patch` onto this record.
    pub fn apply(&mut self, patch: &LocationPatch) {
        fn set<T: Clone>(target: &mut T, value: &Option<T>) {
            if let Some(v) = value {
                *target = v.clone();
            }
        }
        fn set_opt<T: Clone>(target: &mut Option<T>, value: &Option<T>) {
            if value.is_some() {
                *target = value.clone();
            }
        }

        set(&mut self.name, &patch.name);
        set(&mut self.address, &patch.address);
        set(&mut self.neighborhood, &patch.neighborhood);
        set(&mut self.city, &patch.city);
        set(&mut self.state, &patch.state);
        set(&mut self.postal_code, &patch.postal_code);
        set_opt(&mut self.phone, &patch.phone);
        set_opt(&mut self.whatsapp, &patch.whatsapp);
        set_opt(&mut self.email, &patch.email);
        set_opt(&mut self.website, &patch.website);
        set_opt(&mut self.coordinates, &patch.coordinates);
        set(&mut self.hours, &patch.hours);
        set(&mut self.facilities, &patch.facilities);
        set(&mut self.status, &patch.status);
        set_opt(&mut self.closure_reason, &patch.closure_reason);
        set_opt(&mut self.reopening_forecast, &patch.reopening_forecast);
        set_opt(&mut self.description, &patch.description);
        set_opt(&mut self.access_instructions, &patch.access_instructions);
    }
}

/// A partial record, as carried by update requests.
///
/// Absent fields are left untouched; present fields are validated and
/// applied.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LocationPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<LocationId>,
    #[serde(rename = "nome_local", default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "endereco_completo", default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(rename = "bairro", default, skip_serializing_if = "Option::is_none")]
    pub neighborhood: Option<String>,
    #[serde(rename = "cidade", default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(rename = "estado", default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(rename = "cep", default, skip_serializing_if = "Option::is_none")]
    pub postal_code: Option<String>,
    #[serde(rename = "telefone", default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub whatsapp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
    #[serde(rename = "coordenadas", default, skip_serializing_if = "Option::is_none")]
    pub coordinates: Option<Coordinates>,
    #[serde(rename = "horario_funcionamento", default, skip_serializing_if = "Option::is_none")]
    pub hours: Option<WeeklySchedule>,
    #[serde(rename = "facilidades", default, skip_serializing_if = "Option::is_none")]
    pub facilities: Option<Vec<Facility>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<LocationStatus>,
    #[serde(rename = "motivo_fechamento", default, skip_serializing_if = "Option::is_none")]
    pub closure_reason: Option<String>,
    #[serde(rename = "previsao_reabertura", default, skip_serializing_if = "Option::is_none")]
    pub reopening_forecast: Option<String>,
    #[serde(rename = "descricao", default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "instrucoes_acesso", default, skip_serializing_if = "Option::is_none")]
    pub access_instructions: Option<String>,
    #[serde(rename = "ultima_atualizacao", default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(rename = "verificado_em", default, skip_serializing_if = "Option::is_none")]
    pub verified_at: Option<DateTime<Utc>>,
}

impl From<&LocationRecord> for LocationPatch {
    fn from(r: &LocationRecord) -> Self {
        Self {
            id: Some(r.id.clone()),
            name: Some(r.name.clone()),
            address: Some(r.address.clone()),
            neighborhood: Some(r.neighborhood.clone()),
            city: Some(r.city.clone()),
            state: Some(r.state.clone()),
            postal_code: Some(r.postal_code.clone()),
            phone: r.phone.clone(),
            whatsapp: r.whatsapp.clone(),
            email: r.email.clone(),
            website: r.website.clone(),
            coordinates: r.coordinates,
            hours: Some(r.hours.clone()),
            facilities: Some(r.facilities.clone()),
            status: Some(r.status),
            closure_reason: r.closure_reason.clone(),
            reopening_forecast: r.reopening_forecast.clone(),
            description: r.description.clone(),
            access_instructions: r.access_instructions.clone(),
            updated_at: Some(r.updated_at),
            verified_at: r.verified_at,
        }
    }
}

/// Consultation modality of a time slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConsultationType {
    #[default]
    Presencial,
    Telemedicina,
    Hibrida,
}

/// A bookable time slot at a location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSlot {
    pub time: String,
    pub available: bool,
    pub location_id: LocationId,
    pub duration_minutes: u32,
    #[serde(rename = "tipo_consulta", default)]
    pub consultation: ConsultationType,
    #[serde(rename = "medico_id")]
    pub doctor_id: String,
}

/// A location plus its availability for one date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationDetail {
    #[serde(flatten)]
    pub record: LocationRecord,
    pub date: NaiveDate,
    #[serde(rename = "horarios_disponiveis", default)]
    pub slots: Vec<TimeSlot>,
    pub is_open_now: bool,
}

impl LocationDetail {
    /// Number of slots still available.
    pub fn available_slots(&self) -> usize {
        self.slots.iter().filter(|s| s.available).count()
    }

    /// First available slot time, if any.
    pub fn next_available_slot(&self) -> Option<&str> {
        self.slots
            .iter()
            .find(|s| s.available)
            .map(|s| s.time.as_str())
    }
}

/// Live status of a location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub location_id: LocationId,
    pub status: LocationStatus,
    pub is_open_now: bool,
    pub last_updated: DateTime<Utc>,
}

/// Sort field for list queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortBy {
    Name,
    Distance,
    Availability,
}

/// Search parameters for a location list.
///
/// Hashable so it can be part of a cache key; two equal parameter sets
/// always map to the same cached page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SearchParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    #[serde(rename = "cidade", default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(rename = "bairro", default, skip_serializing_if = "Option::is_none")]
    pub neighborhood: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub status: Vec<LocationStatus>,
    #[serde(rename = "facilidades", default, skip_serializing_if = "Vec::is_empty")]
    pub facilities: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort_by: Option<SortBy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<u32>,
}

impl SearchParams {
    /// Parameters with only a page size.
    pub fn with_limit(limit: u32) -> Self {
        Self {
            limit: Some(limit),
            ..Self::default()
        }
    }

    /// Canonical string form, used in cache keys.
    pub fn canonical(&self) -> String {
        if *self == Self::default() {
            return "all".to_string();
        }
        serde_json::to_string(self).unwrap_or_else(|_| format!("{self:?}"))
    }
}

/// One page of a location list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationPage {
    #[serde(rename = "locations")]
    pub items: Vec<LocationRecord>,
    pub total_count: u64,
    pub has_more: bool,
}

impl LocationPage {
    /// Returns true if the page lists the given location.
    pub fn contains(&self, id: &LocationId) -> bool {
        self.items.iter().any(|r| &r.id == id)
    }
}

/// A request to update a location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateRequest {
    pub location_id: LocationId,
    pub updates: LocationPatch,
    #[serde(default)]
    pub source: DataSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_by: Option<String>,
}

/// Acknowledgement returned by the backend after a persisted update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateAck {
    pub location_id: LocationId,
    pub updated_at: DateTime<Utc>,
}

/// Change notifications pushed by the backend's real-time channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ChangeNotification {
    #[serde(rename = "location-status-changed")]
    StatusChanged {
        #[serde(rename = "locationId")]
        location_id: LocationId,
        #[serde(rename = "newStatus")]
        new_status: LocationStatus,
        timestamp: DateTime<Utc>,
    },
    #[serde(rename = "location-data-updated")]
    DataUpdated {
        #[serde(rename = "locationId")]
        location_id: LocationId,
        timestamp: DateTime<Utc>,
    },
}

impl ChangeNotification {
    /// The location the notification is about.
    pub fn location_id(&self) -> &LocationId {
        match self {
            Self::StatusChanged { location_id, .. } | Self::DataUpdated { location_id, .. } => {
                location_id
            },
        }
    }

    /// When the change happened on the backend.
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::StatusChanged { timestamp, .. } | Self::DataUpdated { timestamp, .. } => {
                *timestamp
            },
        }
    }
}
