// src/gtr_data.rs

use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::gtr_client::{
    CargaHheeRequest, ConsultaEmpleadoRequest, DayRecord, DecisionBatchItem, GtrClient, GtrError,
    Metricas, MetricasPendientes, MetricasRequest, PeriodoResponse, ProcesarLoteRequest,
    SolicitudHhee,
};
use crate::rut::Rut;
use crate::solicitudes::LoteReview;
use crate::time_codec::{api_hours_to_minutes, decimal_to_hhmm, format_marca, minutes_to_decimal};
use crate::validation::ValidationSession;

/// A queried period together with the editable session seeded from it.
#[derive(Debug, Clone)]
pub struct ConsultaPeriodo {
    pub rut: Rut,
    pub nombre_agente: String,
    pub registros: Vec<DayRecord>,
    pub session: ValidationSession,
}

/// Locally-built echo of a submitted batch. Constructed from what was
/// actually sent, not from the server's reply, so the operator sees
/// their own intent even when the reply is terse.
#[derive(Debug, Clone)]
pub struct ResumenCarga {
    pub enviados: Vec<DecisionBatchItem>,
    pub dias_pendiente_correccion: usize,
    pub total_antes: Decimal,
    pub total_despues: Decimal,
    pub total_descanso: Decimal,
    pub mensaje_servidor: String,
}

impl ResumenCarga {
    fn build(enviados: Vec<DecisionBatchItem>, mensaje_servidor: String) -> Self {
        let mut resumen = Self {
            dias_pendiente_correccion: enviados.iter().filter(|i| i.turno_es_incorrecto).count(),
            total_antes: Decimal::ZERO,
            total_despues: Decimal::ZERO,
            total_descanso: Decimal::ZERO,
            mensaje_servidor,
            enviados,
        };
        for item in &resumen.enviados {
            resumen.total_antes += minutes_to_decimal(api_hours_to_minutes(
                item.hhee_aprobadas_inicio,
            ));
            resumen.total_despues +=
                minutes_to_decimal(api_hours_to_minutes(item.hhee_aprobadas_fin));
            resumen.total_descanso +=
                minutes_to_decimal(api_hours_to_minutes(item.hhee_aprobadas_descanso));
        }
        resumen
    }

    pub fn total_dias(&self) -> usize {
        self.enviados.len()
    }
}

#[derive(Clone)]
pub struct GtrDataService {
    client: Arc<GtrClient>,
}

impl GtrDataService {
    pub fn new(client: Arc<GtrClient>) -> Self {
        Self { client }
    }

    pub fn poll_interval(&self) -> std::time::Duration {
        self.client.poll_interval()
    }

    /// Fetches an employee's period and seeds the editable session.
    /// RUT and date range are validated before anything goes on the
    /// wire.
    pub async fn consultar_periodo(
        &self,
        rut_raw: &str,
        fecha_inicio: NaiveDate,
        fecha_fin: NaiveDate,
    ) -> Result<ConsultaPeriodo, GtrError> {
        let rut = Rut::normalizar(rut_raw)?;
        validar_rango(fecha_inicio, fecha_fin)?;

        info!(
            "Querying period {} .. {} for {}",
            fecha_inicio, fecha_fin, rut
        );
        let response = self
            .client
            .consultar_empleado(&ConsultaEmpleadoRequest {
                rut: rut.con_formato(),
                fecha_inicio,
                fecha_fin,
            })
            .await
            .map_err(|e| {
                error!("Period query failed for {}: {}", rut, e);
                e
            })?;

        info!(
            "Received {} day(s) for agent '{}'",
            response.datos_periodo.len(),
            response.nombre_agente
        );
        let session = ValidationSession::seed(&response.datos_periodo);
        Ok(ConsultaPeriodo {
            rut,
            nombre_agente: response.nombre_agente,
            registros: response.datos_periodo,
            session,
        })
    }

    /// Cross-employee days flagged for correction.
    pub async fn pendientes(&self) -> Result<PeriodoResponse, GtrError> {
        info!("Fetching pending-correction set...");
        self.client.pendientes().await.map_err(|e| {
            error!("Failed to fetch pending-correction set: {}", e);
            e
        })
    }

    /// Aggregates the session into a batch and submits it. An untouched
    /// session aborts locally with [`GtrError::EmptyBatch`] -- no call is
    /// made. On success the session should be discarded; the returned
    /// summary reflects exactly what was sent.
    pub async fn cargar_validaciones(
        &self,
        rut: &Rut,
        session: &ValidationSession,
    ) -> Result<ResumenCarga, GtrError> {
        let validaciones = session.aggregate(&rut.con_formato());
        if validaciones.is_empty() {
            warn!("Submit aborted: no touched days in session for {}", rut);
            return Err(GtrError::EmptyBatch);
        }

        let request = CargaHheeRequest {
            validaciones: validaciones.clone(),
        };
        let response = self.client.cargar_hhee(&request).await.map_err(|e| {
            error!("Batch submit failed for {}: {}", rut, e);
            e
        })?;

        info!(
            "Batch accepted for {}: {} day(s), server says '{}'",
            rut,
            validaciones.len(),
            response.mensaje
        );
        Ok(ResumenCarga::build(validaciones, response.mensaje))
    }

    pub async fn solicitudes_pendientes(
        &self,
        fecha_inicio: NaiveDate,
        fecha_fin: NaiveDate,
    ) -> Result<Vec<SolicitudHhee>, GtrError> {
        validar_rango(fecha_inicio, fecha_fin)?;
        info!(
            "Fetching pending requests {} .. {}",
            fecha_inicio, fecha_fin
        );
        self.client
            .solicitudes_pendientes(fecha_inicio, fecha_fin)
            .await
    }

    /// Submits the supervisor's reviewed batch. Untouched requests never
    /// reach the wire; an all-untouched round aborts locally.
    pub async fn procesar_lote(&self, review: &LoteReview) -> Result<(usize, String), GtrError> {
        let decisiones = review.aggregate_decisiones();
        if decisiones.is_empty() {
            warn!("Supervisor submit aborted: no decided requests");
            return Err(GtrError::EmptyBatch);
        }

        let enviadas = decisiones.len();
        let response = self
            .client
            .procesar_lote(&ProcesarLoteRequest { decisiones })
            .await
            .map_err(|e| {
                error!("Supervisor batch failed: {}", e);
                e
            })?;

        info!(
            "Supervisor batch accepted: {} decision(s), server says '{}'",
            enviadas, response.detail
        );
        Ok((enviadas, response.detail))
    }

    pub async fn solicitudes_historial(
        &self,
        fecha_inicio: NaiveDate,
        fecha_fin: NaiveDate,
    ) -> Result<Vec<SolicitudHhee>, GtrError> {
        validar_rango(fecha_inicio, fecha_fin)?;
        self.client
            .solicitudes_historial(fecha_inicio, fecha_fin)
            .await
    }

    pub async fn mis_solicitudes(
        &self,
        fecha_inicio: NaiveDate,
        fecha_fin: NaiveDate,
    ) -> Result<Vec<SolicitudHhee>, GtrError> {
        validar_rango(fecha_inicio, fecha_fin)?;
        self.client.mis_solicitudes(fecha_inicio, fecha_fin).await
    }

    pub async fn metricas(
        &self,
        fecha_inicio: NaiveDate,
        fecha_fin: NaiveDate,
        formato: &str,
    ) -> Result<Metricas, GtrError> {
        validar_rango(fecha_inicio, fecha_fin)?;
        info!("Fetching metrics {} .. {}", fecha_inicio, fecha_fin);
        self.client
            .metricas(&MetricasRequest {
                fecha_inicio,
                fecha_fin,
                formato: formato.to_string(),
            })
            .await
    }

    pub async fn metricas_pendientes(&self) -> Result<MetricasPendientes, GtrError> {
        self.client.metricas_pendientes().await
    }
}

fn validar_rango(fecha_inicio: NaiveDate, fecha_fin: NaiveDate) -> Result<(), GtrError> {
    if fecha_inicio > fecha_fin {
        return Err(GtrError::InvalidDateRange {
            desde: fecha_inicio,
            hasta: fecha_fin,
        });
    }
    Ok(())
}

/// Writes the queried period as CSV: one row per day with shift times,
/// formatted clock marks and HHEE amounts as "HH:MM".
pub fn write_period_csv(path: &Path, consulta: &ConsultaPeriodo) -> Result<(), GtrError> {
    let mut writer = csv::Writer::from_path(path)?;

    writer.write_record([
        "fecha",
        "agente",
        "inicio_turno",
        "fin_turno",
        "marca_inicio",
        "marca_fin",
        "hhee_antes_calculadas",
        "hhee_despues_calculadas",
        "hhee_descanso_calculadas",
        "estado",
    ])?;

    for record in &consulta.registros {
        writer.write_record([
            record.fecha.format("%Y-%m-%d").to_string(),
            consulta.nombre_agente.clone(),
            record.inicio_turno_teorico.clone().unwrap_or_default(),
            record.fin_turno_teorico.clone().unwrap_or_default(),
            format_marca(record.marca_real_inicio.as_deref()),
            format_marca(record.marca_real_fin.as_deref()),
            decimal_to_hhmm(record.hhee_inicio_calculadas),
            decimal_to_hhmm(record.hhee_fin_calculadas),
            decimal_to_hhmm(record.cantidad_hhee_calculadas),
            record.estado_final.as_str().to_string(),
        ])?;
    }

    writer
        .flush()
        .map_err(|e| crate::gtr_client::io_context(e, format!("Flushing CSV at {:?}", path)))?;
    info!("Wrote period CSV to {:?}", path);
    Ok(())
}
