// src/solicitudes.rs
//
// Supervisor-side review of employee overtime requests. Mirrors the
// operator session: seed from the server's pending set, apply decisions,
// aggregate only what was actually decided.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::collections::BTreeMap;

use crate::gtr_client::{Decision, EstadoSolicitud, SolicitudHhee, TipoSolicitud};
use crate::time_codec::{api_hours_to_minutes, hhmm_to_minutes, minutes_to_decimal};
use crate::validation::EditOutcome;

/// Review state for one pending request. `horas_aprobadas` starts at the
/// system-suggested amount for the request type and can only be lowered.
#[derive(Debug, Clone)]
pub struct SolicitudReview {
    pub solicitud_id: i64,
    pub tipo: TipoSolicitud,
    pub estado: EstadoSolicitud,
    pub horas_aprobadas: Decimal,
    pub comentario: Option<String>,
    sugerencia: Decimal,
}

impl SolicitudReview {
    fn seeded(solicitud: &SolicitudHhee) -> Self {
        let sugerida = match solicitud.tipo {
            TipoSolicitud::AntesTurno => solicitud.hhee_inicio_calculadas,
            TipoSolicitud::DespuesTurno => solicitud.hhee_fin_calculadas,
            TipoSolicitud::Descanso => solicitud.cantidad_hhee_calculadas,
        };
        let sugerencia = minutes_to_decimal(api_hours_to_minutes(sugerida));
        Self {
            solicitud_id: solicitud.solicitud_id,
            tipo: solicitud.tipo,
            estado: EstadoSolicitud::Pendiente,
            horas_aprobadas: sugerencia,
            comentario: None,
            sugerencia,
        }
    }

    pub fn sugerencia(&self) -> Decimal {
        self.sugerencia
    }

    /// Untouched requests stay `Pendiente` and are excluded from the
    /// submitted batch.
    pub fn decidida(&self) -> bool {
        self.estado != EstadoSolicitud::Pendiente
    }
}

/// The supervisor's working set for one review round.
#[derive(Debug, Clone, Default)]
pub struct LoteReview {
    reviews: BTreeMap<i64, SolicitudReview>,
}

impl LoteReview {
    pub fn seed(solicitudes: &[SolicitudHhee]) -> Self {
        Self {
            reviews: solicitudes
                .iter()
                .filter(|s| s.estado == EstadoSolicitud::Pendiente)
                .map(|s| (s.solicitud_id, SolicitudReview::seeded(s)))
                .collect(),
        }
    }

    pub fn review(&self, solicitud_id: i64) -> Option<&SolicitudReview> {
        self.reviews.get(&solicitud_id)
    }

    pub fn reviews(&self) -> impl Iterator<Item = &SolicitudReview> {
        self.reviews.values()
    }

    pub fn is_empty(&self) -> bool {
        self.reviews.is_empty()
    }

    /// Approves at whatever `horas_aprobadas` currently holds -- the
    /// suggestion unless the supervisor overrode it.
    pub fn aprobar(&mut self, solicitud_id: i64, comentario: Option<&str>) -> EditOutcome {
        let Some(review) = self.reviews.get_mut(&solicitud_id) else {
            return EditOutcome::NotFound;
        };
        review.estado = EstadoSolicitud::Aprobada;
        if let Some(c) = comentario {
            review.comentario = Some(c.to_string());
        }
        EditOutcome::Applied
    }

    pub fn rechazar(&mut self, solicitud_id: i64, comentario: Option<&str>) -> EditOutcome {
        let Some(review) = self.reviews.get_mut(&solicitud_id) else {
            return EditOutcome::NotFound;
        };
        review.estado = EstadoSolicitud::Rechazada;
        review.comentario = comentario.map(String::from);
        EditOutcome::Applied
    }

    /// Re-marks a request as untouched, pulling it back out of the batch.
    pub fn deshacer(&mut self, solicitud_id: i64) -> EditOutcome {
        let Some(review) = self.reviews.get_mut(&solicitud_id) else {
            return EditOutcome::NotFound;
        };
        review.estado = EstadoSolicitud::Pendiente;
        review.comentario = None;
        review.horas_aprobadas = review.sugerencia;
        EditOutcome::Applied
    }

    /// Overrides the hours to approve. The system suggestion acts as the
    /// ceiling, the same hard clamp the operator-side fields have.
    pub fn ajustar_horas(&mut self, solicitud_id: i64, valor: &str) -> EditOutcome {
        let Some(review) = self.reviews.get_mut(&solicitud_id) else {
            return EditOutcome::NotFound;
        };
        let value = minutes_to_decimal(hhmm_to_minutes(valor));
        if value > review.sugerencia {
            return EditOutcome::RejectedOverCeiling {
                tope: review.sugerencia,
            };
        }
        review.horas_aprobadas = value;
        EditOutcome::Applied
    }

    /// Decisions for every reviewed request; untouched ones are filtered
    /// out so the server only sees deliberate outcomes.
    pub fn aggregate_decisiones(&self) -> Vec<Decision> {
        self.reviews
            .values()
            .filter(|r| r.decidida())
            .map(|r| Decision {
                solicitud_id: r.solicitud_id,
                estado: r.estado,
                horas_aprobadas: r.horas_aprobadas.to_f64().unwrap_or(0.0),
                comentario_supervisor: r.comentario.clone(),
            })
            .collect()
    }
}
