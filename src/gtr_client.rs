// src/gtr_client.rs

use chrono::NaiveDate;
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use url::Url;

pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 30;

// --- GTR API Data Structures ---

/// Final state of a day within the validation cycle, as the backend
/// reports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EstadoFinal {
    #[serde(rename = "No Guardado")]
    NoGuardado,
    #[serde(rename = "Validado")]
    Validado,
    #[serde(rename = "Pendiente Corrección", alias = "Pendiente Correccion")]
    PendienteCorreccion,
}

impl Default for EstadoFinal {
    fn default() -> Self {
        EstadoFinal::NoGuardado
    }
}

impl EstadoFinal {
    pub fn as_str(&self) -> &'static str {
        match self {
            EstadoFinal::NoGuardado => "No Guardado",
            EstadoFinal::Validado => "Validado",
            EstadoFinal::PendienteCorreccion => "Pendiente Corrección",
        }
    }
}

/// One day of an employee's queried period. Produced by the server; the
/// client never mutates it, only derives editable state from it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DayRecord {
    pub fecha: NaiveDate,
    pub inicio_turno_teorico: Option<String>,
    pub fin_turno_teorico: Option<String>,
    pub marca_real_inicio: Option<String>,
    pub marca_real_fin: Option<String>,
    #[serde(default)]
    pub hhee_inicio_calculadas: f64,
    #[serde(default)]
    pub hhee_fin_calculadas: f64,
    #[serde(default)]
    pub cantidad_hhee_calculadas: f64,
    #[serde(default)]
    pub hhee_aprobadas_inicio: f64,
    #[serde(default)]
    pub hhee_aprobadas_fin: f64,
    #[serde(default)]
    pub hhee_aprobadas_descanso: f64,
    #[serde(default)]
    pub hhee_autorizadas_antes_gv: f64,
    #[serde(default)]
    pub hhee_autorizadas_despues_gv: f64,
    #[serde(default)]
    pub estado_final: EstadoFinal,
    pub nota: Option<String>,
    #[serde(default)]
    pub permisos: Vec<String>,
}

impl DayRecord {
    /// A day with no theoretical shift is a rest day; only the rest-day
    /// HHEE field applies to it.
    pub fn es_descanso(&self) -> bool {
        self.inicio_turno_teorico
            .as_deref()
            .map_or(true, |s| s.trim().is_empty())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ConsultaEmpleadoRequest {
    pub rut: String,
    pub fecha_inicio: NaiveDate,
    pub fecha_fin: NaiveDate,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PeriodoResponse {
    pub nombre_agente: String,
    #[serde(default)]
    pub datos_periodo: Vec<DayRecord>,
}

/// One approved/flagged day inside a `cargar-hhee` batch. Derived from
/// the edit session at submit time; never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionBatchItem {
    pub rut_con_formato: String,
    pub fecha: NaiveDate,
    pub hhee_aprobadas_inicio: f64,
    pub hhee_aprobadas_fin: f64,
    pub hhee_aprobadas_descanso: f64,
    pub turno_es_incorrecto: bool,
    pub nota: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CargaHheeRequest {
    pub validaciones: Vec<DecisionBatchItem>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MensajeResponse {
    pub mensaje: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TipoSolicitud {
    #[serde(rename = "ANTES_TURNO")]
    AntesTurno,
    #[serde(rename = "DESPUES_TURNO")]
    DespuesTurno,
    #[serde(rename = "DESCANSO")]
    Descanso,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EstadoSolicitud {
    Pendiente,
    Aprobada,
    Rechazada,
}

/// An employee-initiated overtime request awaiting supervisor review.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolicitudHhee {
    pub solicitud_id: i64,
    pub rut_con_formato: String,
    pub nombre_agente: Option<String>,
    pub fecha: NaiveDate,
    pub tipo: TipoSolicitud,
    #[serde(default)]
    pub horas_solicitadas: f64,
    // System-suggested amounts per request type; the review defaults to
    // the one matching `tipo`.
    #[serde(default)]
    pub hhee_inicio_calculadas: f64,
    #[serde(default)]
    pub hhee_fin_calculadas: f64,
    #[serde(default)]
    pub cantidad_hhee_calculadas: f64,
    #[serde(default = "EstadoSolicitud::pendiente")]
    pub estado: EstadoSolicitud,
    pub comentario_supervisor: Option<String>,
}

impl EstadoSolicitud {
    fn pendiente() -> Self {
        EstadoSolicitud::Pendiente
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub solicitud_id: i64,
    pub estado: EstadoSolicitud,
    pub horas_aprobadas: f64,
    pub comentario_supervisor: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProcesarLoteRequest {
    pub decisiones: Vec<Decision>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DetailResponse {
    pub detail: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricasRequest {
    pub fecha_inicio: NaiveDate,
    pub fecha_fin: NaiveDate,
    pub formato: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricasCampana {
    pub campana: String,
    #[serde(default)]
    pub horas_aprobadas: f64,
    #[serde(default)]
    pub agentes: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Metricas {
    pub fecha_inicio: NaiveDate,
    pub fecha_fin: NaiveDate,
    #[serde(default)]
    pub total_horas_declaradas: f64,
    #[serde(default)]
    pub total_horas_aprobadas: f64,
    #[serde(default)]
    pub dias_validados: u32,
    #[serde(default)]
    pub dias_pendiente_correccion: u32,
    #[serde(default)]
    pub por_campana: Vec<MetricasCampana>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PendientesCampana {
    pub campana: String,
    #[serde(default)]
    pub pendientes: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricasPendientes {
    #[serde(default)]
    pub total_pendientes: u32,
    #[serde(default)]
    pub por_campana: Vec<PendientesCampana>,
}

// Error body the backend sends on non-2xx responses.
#[derive(Debug, Clone, Deserialize)]
struct ApiErrorPayload {
    detail: Option<String>,
}

// --- Error Type ---

#[derive(Error, Debug)]
pub enum GtrError {
    #[error("HTTP request failed")]
    Request(#[from] reqwest::Error),

    #[error("JSON processing error")]
    Json(#[from] serde_json::Error),

    #[error("URL parsing error")]
    UrlParse(#[from] url::ParseError),

    #[error("GTR API error: Status={status}, Detail='{detail}'")]
    Api { status: StatusCode, detail: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("RUT inválido: '{0}'")]
    InvalidRut(String),

    #[error("Rango de fechas inválido: {desde} > {hasta}")]
    InvalidDateRange { desde: NaiveDate, hasta: NaiveDate },

    #[error("No hay cambios para enviar")]
    EmptyBatch,

    #[error("CSV write failed")]
    Csv(#[from] csv::Error),

    #[error("File I/O error: {context}")]
    Io {
        #[source]
        source: std::io::Error,
        context: String,
    },
}

// Helper to create context-aware IO errors
pub(crate) fn io_context<S: Into<String>>(source: std::io::Error, context: S) -> GtrError {
    GtrError::Io {
        source,
        context: context.into(),
    }
}

// --- Configuration ---

/// Connection settings for the GTR backend. Token issuance happens
/// elsewhere; the bearer token arrives already minted via the
/// environment.
#[derive(Clone, Debug, Deserialize)]
pub struct GtrConfig {
    pub api_base_url: String,
    pub api_token: String,
    #[serde(default = "GtrConfig::default_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "GtrConfig::default_poll_interval")]
    pub poll_interval_secs: u64,
}

impl GtrConfig {
    fn default_timeout() -> u64 {
        DEFAULT_TIMEOUT_SECS
    }

    fn default_poll_interval() -> u64 {
        DEFAULT_POLL_INTERVAL_SECS
    }

    /// Reads `GTR_API_BASE_URL`, `GTR_API_TOKEN`, `GTR_TIMEOUT_SECS`,
    /// `GTR_POLL_INTERVAL_SECS` from the environment.
    pub fn from_env() -> Result<Self, GtrError> {
        envy::prefixed("GTR_")
            .from_env::<GtrConfig>()
            .map_err(|e| GtrError::Config(e.to_string()))
    }
}

// --- Client Implementation ---

#[derive(Clone)]
pub struct GtrClient {
    config: Arc<GtrConfig>,
    http_client: Client,
    base_url: String,
}

impl GtrClient {
    pub fn new(config: GtrConfig) -> Result<Self, GtrError> {
        if config.api_token.trim().is_empty() {
            return Err(GtrError::Config("GTR_API_TOKEN is empty".to_string()));
        }
        let base_url = config.api_base_url.trim_end_matches('/').to_string();
        // Validate the base URL up front so a bad environment fails fast.
        Url::parse(&base_url)?;
        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            config: Arc::new(config),
            http_client,
            base_url,
        })
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.config.poll_interval_secs)
    }

    fn build_request(&self, method: Method, endpoint: &str) -> Result<RequestBuilder, GtrError> {
        let url = format!("{}{}", self.base_url, endpoint);
        Url::parse(&url)?;
        Ok(self
            .http_client
            .request(method, &url)
            .header(AUTHORIZATION, format!("Bearer {}", self.config.api_token))
            .header(ACCEPT, "application/json")
            .header(CONTENT_TYPE, "application/json"))
    }

    async fn send_and_deserialize<T: DeserializeOwned>(
        &self,
        request_builder: RequestBuilder,
        context_msg: &str,
    ) -> Result<T, GtrError> {
        let request = request_builder.build()?;
        let request_url = request.url().to_string();
        debug!("Sending request for '{}' to {}", context_msg, request_url);

        let response = self.http_client.execute(request).await?;
        let status = response.status();
        debug!(
            "Received response for '{}' ({}): Status={}",
            context_msg, request_url, status
        );

        if status.is_success() {
            let bytes = response.bytes().await?;
            match serde_json::from_slice::<T>(&bytes) {
                Ok(data) => Ok(data),
                Err(e) => {
                    error!(
                        "JSON deserialization failed for '{}' ({}): {}",
                        context_msg, request_url, e
                    );
                    Err(GtrError::Json(e))
                }
            }
        } else {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error body".to_string());
            let detail = match serde_json::from_str::<ApiErrorPayload>(&body) {
                Ok(payload) => payload.detail.unwrap_or(body),
                Err(_) => body,
            };
            warn!(
                "GTR API error for '{}': Status={}, Detail='{}'",
                context_msg, status, detail
            );
            Err(GtrError::Api { status, detail })
        }
    }

    async fn get<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        query: &[(&str, String)],
        context_msg: &str,
    ) -> Result<T, GtrError> {
        let mut builder = self.build_request(Method::GET, endpoint)?;
        if !query.is_empty() {
            builder = builder.query(query);
        }
        self.send_and_deserialize(builder, context_msg).await
    }

    async fn post<B: Serialize, T: DeserializeOwned>(
        &self,
        endpoint: &str,
        body: &B,
        context_msg: &str,
    ) -> Result<T, GtrError> {
        let builder = self.build_request(Method::POST, endpoint)?.json(body);
        self.send_and_deserialize(builder, context_msg).await
    }

    // --- HHEE Endpoints ---

    /// One row per calendar day of the period, HHEE amounts precomputed
    /// by the server.
    pub async fn consultar_empleado(
        &self,
        request: &ConsultaEmpleadoRequest,
    ) -> Result<PeriodoResponse, GtrError> {
        self.post("/hhee/consultar-empleado", request, "consultar-empleado")
            .await
    }

    /// Cross-employee set of days flagged for correction.
    pub async fn pendientes(&self) -> Result<PeriodoResponse, GtrError> {
        self.get("/hhee/pendientes", &[], "pendientes").await
    }

    pub async fn cargar_hhee(
        &self,
        request: &CargaHheeRequest,
    ) -> Result<MensajeResponse, GtrError> {
        info!(
            "Submitting validation batch with {} item(s)",
            request.validaciones.len()
        );
        self.post("/hhee/cargar-hhee", request, "cargar-hhee").await
    }

    pub async fn solicitudes_pendientes(
        &self,
        fecha_inicio: NaiveDate,
        fecha_fin: NaiveDate,
    ) -> Result<Vec<SolicitudHhee>, GtrError> {
        self.get(
            "/hhee/solicitudes/pendientes/",
            &date_range_query(fecha_inicio, fecha_fin),
            "solicitudes-pendientes",
        )
        .await
    }

    pub async fn procesar_lote(
        &self,
        request: &ProcesarLoteRequest,
    ) -> Result<DetailResponse, GtrError> {
        info!(
            "Submitting supervisor decision batch with {} decision(s)",
            request.decisiones.len()
        );
        self.post("/hhee/solicitudes/procesar-lote/", request, "procesar-lote")
            .await
    }

    pub async fn solicitudes_historial(
        &self,
        fecha_inicio: NaiveDate,
        fecha_fin: NaiveDate,
    ) -> Result<Vec<SolicitudHhee>, GtrError> {
        self.get(
            "/hhee/solicitudes/historial/",
            &date_range_query(fecha_inicio, fecha_fin),
            "solicitudes-historial",
        )
        .await
    }

    pub async fn mis_solicitudes(
        &self,
        fecha_inicio: NaiveDate,
        fecha_fin: NaiveDate,
    ) -> Result<Vec<SolicitudHhee>, GtrError> {
        self.get(
            "/hhee/solicitudes/mis-solicitudes/",
            &date_range_query(fecha_inicio, fecha_fin),
            "mis-solicitudes",
        )
        .await
    }

    pub async fn metricas(&self, request: &MetricasRequest) -> Result<Metricas, GtrError> {
        self.post("/hhee/metricas", request, "metricas").await
    }

    pub async fn metricas_pendientes(&self) -> Result<MetricasPendientes, GtrError> {
        self.get("/hhee/metricas-pendientes", &[], "metricas-pendientes")
            .await
    }
}

fn date_range_query(fecha_inicio: NaiveDate, fecha_fin: NaiveDate) -> [(&'static str, String); 2] {
    [
        ("fecha_inicio", fecha_inicio.format("%Y-%m-%d").to_string()),
        ("fecha_fin", fecha_fin.format("%Y-%m-%d").to_string()),
    ]
}
