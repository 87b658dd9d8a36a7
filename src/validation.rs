// src/validation.rs
//
// Editable per-day validation state for an operator's HHEE review, and
// the aggregation of that state into a decision batch. All hour amounts
// are minute-quantized Decimals so ceiling comparisons and totals are
// exact; f64 appears only at the wire boundary.

use chrono::NaiveDate;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use tracing::debug;

use crate::gtr_client::{DayRecord, DecisionBatchItem, EstadoFinal};
use crate::time_codec::{api_hours_to_minutes, hhmm_to_minutes, minutes_to_decimal};

/// The three HHEE candidate fields. On a workday only `Antes`/`Despues`
/// apply; on a rest day only `Descanso` does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Campo {
    Antes,
    Despues,
    Descanso,
}

/// A candidate field is either untouched or enabled with a value the
/// operator may have lowered. The value can never exceed the ceiling:
/// `enable` starts at the ceiling and `edit` rejects anything above it,
/// so an enabled-over-ceiling state is unrepresentable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FieldState {
    Disabled,
    Enabled(Decimal),
}

#[derive(Debug, Clone)]
pub struct FieldEdit {
    ceiling: Decimal,
    state: FieldState,
}

impl FieldEdit {
    fn seeded(ceiling_hours: f64) -> Self {
        Self {
            ceiling: minutes_to_decimal(api_hours_to_minutes(ceiling_hours)),
            state: FieldState::Disabled,
        }
    }

    pub fn is_enabled(&self) -> bool {
        matches!(self.state, FieldState::Enabled(_))
    }

    pub fn enabled_value(&self) -> Option<Decimal> {
        match self.state {
            FieldState::Enabled(v) => Some(v),
            FieldState::Disabled => None,
        }
    }

    fn enable(&mut self) {
        self.state = FieldState::Enabled(self.ceiling);
    }

    // Disabling discards any manual edit; re-enabling starts back at the
    // ceiling.
    fn disable(&mut self) {
        self.state = FieldState::Disabled;
    }

    fn edit(&mut self, value: Decimal) -> EditOutcome {
        match self.state {
            FieldState::Disabled => EditOutcome::RejectedDisabled,
            FieldState::Enabled(_) if value > self.ceiling => EditOutcome::RejectedOverCeiling {
                tope: self.ceiling,
            },
            FieldState::Enabled(_) => {
                self.state = FieldState::Enabled(value);
                EditOutcome::Applied
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditOutcome {
    Applied,
    /// The value exceeded the day's calculated ceiling; stored state is
    /// unchanged.
    RejectedOverCeiling { tope: Decimal },
    /// The field must be enabled before it can be edited.
    RejectedDisabled,
    /// The field does not apply to this kind of day (rest day vs
    /// workday).
    NoAplica,
    NotFound,
}

/// Editable state for one calendar day, derived from its [`DayRecord`].
#[derive(Debug, Clone)]
pub struct DayEdit {
    pub fecha: NaiveDate,
    pub es_descanso: bool,
    pub antes: FieldEdit,
    pub despues: FieldEdit,
    pub descanso: FieldEdit,
    pub pendiente: bool,
    pub motivo: Option<String>,
    pub revalidar: bool,
    estado_original: EstadoFinal,
    // Previously approved values pass through unchanged for fields the
    // operator did not touch.
    aprobadas_inicio: Decimal,
    aprobadas_fin: Decimal,
    aprobadas_descanso: Decimal,
    // RRHH-confirmed amounts, for the summary totals only.
    autorizadas_antes_gv: Decimal,
    autorizadas_despues_gv: Decimal,
}

impl DayEdit {
    fn seeded(record: &DayRecord) -> Self {
        Self {
            fecha: record.fecha,
            es_descanso: record.es_descanso(),
            antes: FieldEdit::seeded(record.hhee_inicio_calculadas),
            despues: FieldEdit::seeded(record.hhee_fin_calculadas),
            descanso: FieldEdit::seeded(record.cantidad_hhee_calculadas),
            pendiente: false,
            motivo: None,
            revalidar: false,
            estado_original: record.estado_final,
            aprobadas_inicio: minutes_to_decimal(api_hours_to_minutes(
                record.hhee_aprobadas_inicio,
            )),
            aprobadas_fin: minutes_to_decimal(api_hours_to_minutes(record.hhee_aprobadas_fin)),
            aprobadas_descanso: minutes_to_decimal(api_hours_to_minutes(
                record.hhee_aprobadas_descanso,
            )),
            autorizadas_antes_gv: minutes_to_decimal(api_hours_to_minutes(
                record.hhee_autorizadas_antes_gv,
            )),
            autorizadas_despues_gv: minutes_to_decimal(api_hours_to_minutes(
                record.hhee_autorizadas_despues_gv,
            )),
        }
    }

    fn field(&self, campo: Campo) -> &FieldEdit {
        match campo {
            Campo::Antes => &self.antes,
            Campo::Despues => &self.despues,
            Campo::Descanso => &self.descanso,
        }
    }

    fn field_mut(&mut self, campo: Campo) -> &mut FieldEdit {
        match campo {
            Campo::Antes => &mut self.antes,
            Campo::Despues => &mut self.despues,
            Campo::Descanso => &mut self.descanso,
        }
    }

    fn campo_aplica(&self, campo: Campo) -> bool {
        match campo {
            Campo::Descanso => self.es_descanso,
            Campo::Antes | Campo::Despues => !self.es_descanso,
        }
    }

    /// A day enters the outgoing batch only if the operator touched it.
    pub fn touched(&self) -> bool {
        self.antes.is_enabled()
            || self.despues.is_enabled()
            || self.descanso.is_enabled()
            || self.pendiente
            || self.revalidar
    }

    // Edited value if enabled, else the stored approved value -- each
    // field contributes exactly once.
    fn declared(&self, campo: Campo) -> Decimal {
        let prior = match campo {
            Campo::Antes => self.aprobadas_inicio,
            Campo::Despues => self.aprobadas_fin,
            Campo::Descanso => self.aprobadas_descanso,
        };
        self.field(campo).enabled_value().unwrap_or(prior)
    }
}

/// The whole editable session for a queried period, keyed by date.
/// Seeded from the server's rows, mutated by operator actions, consumed
/// by [`ValidationSession::aggregate`] and discarded after submit.
#[derive(Debug, Clone, Default)]
pub struct ValidationSession {
    days: BTreeMap<NaiveDate, DayEdit>,
}

impl ValidationSession {
    pub fn seed(records: &[DayRecord]) -> Self {
        Self {
            days: records
                .iter()
                .map(|r| (r.fecha, DayEdit::seeded(r)))
                .collect(),
        }
    }

    pub fn day(&self, fecha: NaiveDate) -> Option<&DayEdit> {
        self.days.get(&fecha)
    }

    pub fn days(&self) -> impl Iterator<Item = &DayEdit> {
        self.days.values()
    }

    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }

    /// Enables or disables a candidate field. Disabling resets the value
    /// back to the calculated ceiling (any manual edit is discarded).
    pub fn toggle(&mut self, fecha: NaiveDate, campo: Campo, habilitado: bool) -> EditOutcome {
        let Some(day) = self.days.get_mut(&fecha) else {
            return EditOutcome::NotFound;
        };
        if !day.campo_aplica(campo) {
            return EditOutcome::NoAplica;
        }
        if habilitado {
            day.field_mut(campo).enable();
        } else {
            day.field_mut(campo).disable();
        }
        EditOutcome::Applied
    }

    /// Applies an edited "HH:MM" value to an enabled field. The edit is
    /// rejected outright when its decimal equivalent exceeds the day's
    /// calculated ceiling -- a hard clamp, not a warning.
    pub fn edit(&mut self, fecha: NaiveDate, campo: Campo, valor: &str) -> EditOutcome {
        let Some(day) = self.days.get_mut(&fecha) else {
            return EditOutcome::NotFound;
        };
        if !day.campo_aplica(campo) {
            return EditOutcome::NoAplica;
        }
        let value = minutes_to_decimal(hhmm_to_minutes(valor));
        let outcome = day.field_mut(campo).edit(value);
        if let EditOutcome::RejectedOverCeiling { tope } = &outcome {
            debug!(
                "Edit rejected for {} {:?}: {} exceeds ceiling {}",
                fecha, campo, value, tope
            );
        }
        outcome
    }

    /// Flags a day for shift/mark correction. The free-text reason is
    /// required while the flag is set.
    pub fn set_pendiente(&mut self, fecha: NaiveDate, motivo: &str) -> EditOutcome {
        let Some(day) = self.days.get_mut(&fecha) else {
            return EditOutcome::NotFound;
        };
        day.pendiente = true;
        day.motivo = Some(motivo.to_string());
        EditOutcome::Applied
    }

    /// Clearing the flag discards the reason with it.
    pub fn clear_pendiente(&mut self, fecha: NaiveDate) -> EditOutcome {
        let Some(day) = self.days.get_mut(&fecha) else {
            return EditOutcome::NotFound;
        };
        day.pendiente = false;
        day.motivo = None;
        EditOutcome::Applied
    }

    /// Sends a previously flagged day back through validation: candidate
    /// fields re-seed from the calculated ceilings and the note is
    /// cleared, discarding partial edits. Only days the server reported
    /// as pending correction can be re-validated.
    pub fn revalidar(&mut self, fecha: NaiveDate) -> EditOutcome {
        let Some(day) = self.days.get_mut(&fecha) else {
            return EditOutcome::NotFound;
        };
        if day.estado_original != EstadoFinal::PendienteCorreccion {
            return EditOutcome::NoAplica;
        }
        day.antes.disable();
        day.despues.disable();
        day.descanso.disable();
        day.pendiente = false;
        day.motivo = None;
        day.revalidar = true;
        EditOutcome::Applied
    }

    /// Flattens the session into the outgoing batch. Untouched days are
    /// omitted entirely; for included days each hour field carries the
    /// edited value if enabled, otherwise the prior approved value
    /// unchanged. The server upserts keyed by (employee, fecha), so a
    /// partial batch never erases other days' history.
    pub fn aggregate(&self, rut_con_formato: &str) -> Vec<DecisionBatchItem> {
        self.days
            .values()
            .filter(|day| day.touched())
            .map(|day| DecisionBatchItem {
                rut_con_formato: rut_con_formato.to_string(),
                fecha: day.fecha,
                hhee_aprobadas_inicio: decimal_to_f64(day.declared(Campo::Antes)),
                hhee_aprobadas_fin: decimal_to_f64(day.declared(Campo::Despues)),
                hhee_aprobadas_descanso: decimal_to_f64(day.declared(Campo::Descanso)),
                turno_es_incorrecto: day.pendiente,
                nota: day.motivo.clone(),
            })
            .collect()
    }
}

fn decimal_to_f64(value: Decimal) -> f64 {
    value.to_f64().unwrap_or(0.0)
}

/// Running totals shown next to the edit table, recomputed after every
/// edit. "Declaradas" counts each field once (live edit or stored
/// approved value); "aprobadas RRHH" is what RRHH has confirmed. The
/// rest-day amount contributes to both the before and after components,
/// matching how RRHH splits authorized rest-day hours.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SummaryTotals {
    pub declaradas_antes: Decimal,
    pub declaradas_despues: Decimal,
    pub aprobadas_rrhh_antes: Decimal,
    pub aprobadas_rrhh_despues: Decimal,
}

impl SummaryTotals {
    pub fn compute(session: &ValidationSession) -> Self {
        let mut totals = SummaryTotals::default();
        for day in session.days() {
            let descanso = day.declared(Campo::Descanso);
            totals.declaradas_antes += day.declared(Campo::Antes) + descanso;
            totals.declaradas_despues += day.declared(Campo::Despues) + descanso;
            totals.aprobadas_rrhh_antes += day.autorizadas_antes_gv;
            totals.aprobadas_rrhh_despues += day.autorizadas_despues_gv;
        }
        totals
    }
}
