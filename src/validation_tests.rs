// src/validation_tests.rs

#[cfg(test)]
mod tests {
    use crate::gtr_client::{
        DayRecord, EstadoFinal, EstadoSolicitud, GtrClient, GtrConfig, GtrError, SolicitudHhee,
        TipoSolicitud,
    };
    use crate::gtr_data::GtrDataService;
    use crate::rut::Rut;
    use crate::solicitudes::LoteReview;
    use crate::validation::{Campo, EditOutcome, SummaryTotals, ValidationSession};
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    fn d(date_str: &str) -> NaiveDate {
        NaiveDate::parse_from_str(date_str, "%Y-%m-%d")
            .unwrap_or_else(|_| panic!("Invalid date string format: {}", date_str))
    }

    // Helper to build a server row. A workday gets a theoretical shift;
    // a rest day gets none and only `cantidad_hhee_calculadas` matters.
    fn build_day_record(
        fecha: &str,
        turno: Option<(&str, &str)>,
        hhee_inicio_calculadas: f64,
        hhee_fin_calculadas: f64,
        cantidad_hhee_calculadas: f64,
    ) -> DayRecord {
        DayRecord {
            fecha: d(fecha),
            inicio_turno_teorico: turno.map(|(i, _)| i.to_string()),
            fin_turno_teorico: turno.map(|(_, f)| f.to_string()),
            marca_real_inicio: None,
            marca_real_fin: None,
            hhee_inicio_calculadas,
            hhee_fin_calculadas,
            cantidad_hhee_calculadas,
            hhee_aprobadas_inicio: 0.0,
            hhee_aprobadas_fin: 0.0,
            hhee_aprobadas_descanso: 0.0,
            hhee_autorizadas_antes_gv: 0.0,
            hhee_autorizadas_despues_gv: 0.0,
            estado_final: EstadoFinal::NoGuardado,
            nota: None,
            permisos: Vec::new(),
        }
    }

    fn build_solicitud(id: i64, tipo: TipoSolicitud, sugerida: f64) -> SolicitudHhee {
        let (inicio, fin, descanso) = match tipo {
            TipoSolicitud::AntesTurno => (sugerida, 0.0, 0.0),
            TipoSolicitud::DespuesTurno => (0.0, sugerida, 0.0),
            TipoSolicitud::Descanso => (0.0, 0.0, sugerida),
        };
        SolicitudHhee {
            solicitud_id: id,
            rut_con_formato: "12.345.678-5".to_string(),
            nombre_agente: Some("Agente Test".to_string()),
            fecha: d("2024-03-11"),
            tipo,
            horas_solicitadas: sugerida,
            hhee_inicio_calculadas: inicio,
            hhee_fin_calculadas: fin,
            cantidad_hhee_calculadas: descanso,
            estado: EstadoSolicitud::Pendiente,
            comentario_supervisor: None,
        }
    }

    // Service whose requests all fail fast; used to prove client-side
    // guards fire before anything goes on the wire.
    fn offline_service() -> GtrDataService {
        let client = GtrClient::new(GtrConfig {
            api_base_url: "http://127.0.0.1:9".to_string(),
            api_token: "test-token".to_string(),
            timeout_secs: 1,
            poll_interval_secs: 30,
        })
        .expect("client config is valid");
        GtrDataService::new(Arc::new(client))
    }

    // --- Session seeding and toggling ---

    #[test]
    fn seed_starts_all_fields_disabled() {
        let records = vec![build_day_record(
            "2024-03-11",
            Some(("09:00", "18:00")),
            0.5,
            1.5,
            0.0,
        )];
        let session = ValidationSession::seed(&records);

        let day = session.day(d("2024-03-11")).expect("day was seeded");
        assert!(!day.antes.is_enabled());
        assert!(!day.despues.is_enabled());
        assert!(!day.descanso.is_enabled());
        assert!(!day.pendiente);
        assert!(!day.touched(), "a freshly seeded day counts as untouched");
    }

    #[test]
    fn toggling_enables_at_the_calculated_ceiling() {
        let records = vec![build_day_record(
            "2024-03-11",
            Some(("09:00", "18:00")),
            0.5,
            1.5,
            0.0,
        )];
        let mut session = ValidationSession::seed(&records);

        assert_eq!(
            session.toggle(d("2024-03-11"), Campo::Despues, true),
            EditOutcome::Applied
        );
        let day = session.day(d("2024-03-11")).unwrap();
        assert_eq!(day.despues.enabled_value(), Some(dec!(1.5)));
    }

    #[test]
    fn toggle_off_then_on_restores_ceiling_discarding_manual_edit() {
        let records = vec![build_day_record(
            "2024-03-11",
            Some(("09:00", "18:00")),
            1.5,
            0.0,
            0.0,
        )];
        let mut session = ValidationSession::seed(&records);
        let fecha = d("2024-03-11");

        session.toggle(fecha, Campo::Antes, true);
        assert_eq!(session.edit(fecha, Campo::Antes, "01:00"), EditOutcome::Applied);
        assert_eq!(
            session.day(fecha).unwrap().antes.enabled_value(),
            Some(dec!(1))
        );

        session.toggle(fecha, Campo::Antes, false);
        assert!(!session.day(fecha).unwrap().antes.is_enabled());

        session.toggle(fecha, Campo::Antes, true);
        assert_eq!(
            session.day(fecha).unwrap().antes.enabled_value(),
            Some(dec!(1.5)),
            "re-enabling must restore the original calculated ceiling"
        );
    }

    #[test]
    fn fields_only_apply_to_their_kind_of_day() {
        let records = vec![
            build_day_record("2024-03-11", Some(("09:00", "18:00")), 0.5, 1.5, 0.0),
            build_day_record("2024-03-12", None, 0.0, 0.0, 4.0),
        ];
        let mut session = ValidationSession::seed(&records);

        assert_eq!(
            session.toggle(d("2024-03-11"), Campo::Descanso, true),
            EditOutcome::NoAplica,
            "rest-day field must not apply to a workday"
        );
        assert_eq!(
            session.toggle(d("2024-03-12"), Campo::Antes, true),
            EditOutcome::NoAplica,
            "workday field must not apply to a rest day"
        );
        assert_eq!(
            session.toggle(d("2024-03-12"), Campo::Descanso, true),
            EditOutcome::Applied
        );
    }

    #[test]
    fn toggle_on_unknown_date_reports_not_found() {
        let mut session = ValidationSession::seed(&[]);
        assert_eq!(
            session.toggle(d("2024-03-11"), Campo::Antes, true),
            EditOutcome::NotFound
        );
    }

    // --- Clamp behavior ---

    #[test]
    fn edit_over_ceiling_is_rejected_and_value_unchanged() {
        let records = vec![build_day_record(
            "2024-03-11",
            Some(("09:00", "18:00")),
            1.5,
            0.0,
            0.0,
        )];
        let mut session = ValidationSession::seed(&records);
        let fecha = d("2024-03-11");

        session.toggle(fecha, Campo::Antes, true);
        assert_eq!(
            session.edit(fecha, Campo::Antes, "02:00"),
            EditOutcome::RejectedOverCeiling { tope: dec!(1.5) }
        );
        assert_eq!(
            session.day(fecha).unwrap().antes.enabled_value(),
            Some(dec!(1.5)),
            "a rejected edit must leave the stored value unchanged"
        );
    }

    #[test]
    fn edit_at_exactly_the_ceiling_is_accepted() {
        let records = vec![build_day_record(
            "2024-03-11",
            Some(("09:00", "18:00")),
            0.0,
            1.5,
            0.0,
        )];
        let mut session = ValidationSession::seed(&records);
        let fecha = d("2024-03-11");

        session.toggle(fecha, Campo::Despues, true);
        assert_eq!(session.edit(fecha, Campo::Despues, "01:30"), EditOutcome::Applied);
    }

    #[test]
    fn edit_requires_an_enabled_field() {
        let records = vec![build_day_record(
            "2024-03-11",
            Some(("09:00", "18:00")),
            1.5,
            0.0,
            0.0,
        )];
        let mut session = ValidationSession::seed(&records);

        assert_eq!(
            session.edit(d("2024-03-11"), Campo::Antes, "01:00"),
            EditOutcome::RejectedDisabled
        );
    }

    // --- Pendiente / revalidar ---

    #[test]
    fn pendiente_carries_a_reason_and_clearing_discards_it() {
        let records = vec![build_day_record(
            "2024-03-11",
            Some(("09:00", "18:00")),
            0.0,
            0.0,
            0.0,
        )];
        let mut session = ValidationSession::seed(&records);
        let fecha = d("2024-03-11");

        session.set_pendiente(fecha, "Marca de salida faltante");
        let day = session.day(fecha).unwrap();
        assert!(day.pendiente);
        assert_eq!(day.motivo.as_deref(), Some("Marca de salida faltante"));
        assert!(day.touched());

        session.clear_pendiente(fecha);
        let day = session.day(fecha).unwrap();
        assert!(!day.pendiente);
        assert_eq!(day.motivo, None);
        assert!(!day.touched());
    }

    #[test]
    fn revalidar_requires_a_pending_correction_day() {
        let records = vec![build_day_record(
            "2024-03-11",
            Some(("09:00", "18:00")),
            0.5,
            0.0,
            0.0,
        )];
        let mut session = ValidationSession::seed(&records);
        assert_eq!(
            session.revalidar(d("2024-03-11")),
            EditOutcome::NoAplica,
            "only days flagged by the server can be re-validated"
        );
    }

    #[test]
    fn revalidar_reseeds_the_day_and_marks_it_for_submission() {
        let mut record = build_day_record("2024-03-11", Some(("09:00", "18:00")), 1.5, 0.5, 0.0);
        record.estado_final = EstadoFinal::PendienteCorreccion;
        record.nota = Some("Turno mal cargado".to_string());
        let mut session = ValidationSession::seed(&[record]);
        let fecha = d("2024-03-11");

        // Partial edits that revalidation must discard.
        session.toggle(fecha, Campo::Antes, true);
        session.edit(fecha, Campo::Antes, "00:30");
        session.set_pendiente(fecha, "sigue mal");

        assert_eq!(session.revalidar(fecha), EditOutcome::Applied);
        let day = session.day(fecha).unwrap();
        assert!(!day.antes.is_enabled(), "fields re-seed to disabled");
        assert!(!day.pendiente);
        assert_eq!(day.motivo, None);
        assert!(day.revalidar);
        assert!(day.touched(), "a re-validated day must enter the batch");

        let batch = session.aggregate("12.345.678-5");
        assert_eq!(batch.len(), 1);
        assert!(!batch[0].turno_es_incorrecto);
        assert_eq!(batch[0].nota, None);
    }

    // --- Aggregation ---

    #[test]
    fn untouched_days_never_appear_in_the_batch() {
        let records = vec![
            build_day_record("2024-03-11", Some(("09:00", "18:00")), 0.5, 1.5, 0.0),
            build_day_record("2024-03-12", None, 0.0, 0.0, 4.0),
        ];
        let session = ValidationSession::seed(&records);
        assert!(session.aggregate("12.345.678-5").is_empty());
    }

    #[test]
    fn untouched_fields_pass_through_prior_approved_values() {
        let mut record = build_day_record("2024-03-11", Some(("09:00", "18:00")), 0.5, 1.5, 0.0);
        record.hhee_aprobadas_inicio = 0.25;
        let mut session = ValidationSession::seed(&[record]);
        let fecha = d("2024-03-11");

        session.toggle(fecha, Campo::Despues, true);
        session.edit(fecha, Campo::Despues, "01:00");

        let batch = session.aggregate("12.345.678-5");
        assert_eq!(batch.len(), 1);
        let item = &batch[0];
        assert_eq!(item.hhee_aprobadas_fin, 1.0);
        assert_eq!(
            item.hhee_aprobadas_inicio, 0.25,
            "an untouched field must carry the prior approved value, not zero"
        );
        assert_eq!(item.rut_con_formato, "12.345.678-5");
    }

    #[test]
    fn mixed_workday_and_rest_day_batch() {
        // One workday with after-shift overtime, one rest day.
        let records = vec![
            build_day_record("2024-03-11", Some(("09:00", "18:00")), 0.0, 1.5, 0.0),
            build_day_record("2024-03-12", None, 0.0, 0.0, 4.0),
        ];
        let mut session = ValidationSession::seed(&records);

        session.toggle(d("2024-03-11"), Campo::Despues, true);
        assert_eq!(
            session.edit(d("2024-03-11"), Campo::Despues, "01:00"),
            EditOutcome::Applied
        );
        session.toggle(d("2024-03-12"), Campo::Descanso, true);
        assert_eq!(
            session.edit(d("2024-03-12"), Campo::Descanso, "04:00"),
            EditOutcome::Applied
        );

        let batch = session.aggregate("12.345.678-5");
        assert_eq!(batch.len(), 2, "exactly the two touched days are sent");

        let workday = &batch[0];
        assert_eq!(workday.fecha, d("2024-03-11"));
        assert_eq!(workday.hhee_aprobadas_fin, 1.0);
        assert_eq!(workday.hhee_aprobadas_inicio, 0.0);
        assert_eq!(workday.hhee_aprobadas_descanso, 0.0);

        let rest_day = &batch[1];
        assert_eq!(rest_day.fecha, d("2024-03-12"));
        assert_eq!(rest_day.hhee_aprobadas_descanso, 4.0);
        assert_eq!(rest_day.hhee_aprobadas_inicio, 0.0);
        assert_eq!(rest_day.hhee_aprobadas_fin, 0.0);
    }

    #[test]
    fn pendiente_day_is_submitted_with_flag_and_note() {
        let records = vec![build_day_record(
            "2024-03-11",
            Some(("09:00", "18:00")),
            0.0,
            0.0,
            0.0,
        )];
        let mut session = ValidationSession::seed(&records);
        session.set_pendiente(d("2024-03-11"), "Marca de entrada faltante");

        let batch = session.aggregate("12.345.678-5");
        assert_eq!(batch.len(), 1);
        assert!(batch[0].turno_es_incorrecto);
        assert_eq!(batch[0].nota.as_deref(), Some("Marca de entrada faltante"));
    }

    // --- Summary totals ---

    #[test]
    fn totals_count_each_field_exactly_once() {
        let mut record = build_day_record("2024-03-11", Some(("09:00", "18:00")), 1.5, 2.0, 0.0);
        record.hhee_aprobadas_inicio = 0.5;
        record.hhee_aprobadas_fin = 0.75;
        let mut session = ValidationSession::seed(&[record]);

        // Untouched: both components come from stored approved values.
        let totals = SummaryTotals::compute(&session);
        assert_eq!(totals.declaradas_antes, dec!(0.5));
        assert_eq!(totals.declaradas_despues, dec!(0.75));

        // Enabling replaces the stored value with the live one -- no sum
        // of both.
        session.toggle(d("2024-03-11"), Campo::Antes, true);
        session.edit(d("2024-03-11"), Campo::Antes, "01:00");
        let totals = SummaryTotals::compute(&session);
        assert_eq!(totals.declaradas_antes, dec!(1));
        assert_eq!(totals.declaradas_despues, dec!(0.75));
    }

    #[test]
    fn rest_day_hours_contribute_to_both_components() {
        let records = vec![build_day_record("2024-03-12", None, 0.0, 0.0, 4.0)];
        let mut session = ValidationSession::seed(&records);
        session.toggle(d("2024-03-12"), Campo::Descanso, true);

        let totals = SummaryTotals::compute(&session);
        assert_eq!(totals.declaradas_antes, dec!(4));
        assert_eq!(totals.declaradas_despues, dec!(4));
    }

    #[test]
    fn rrhh_totals_come_from_authorized_amounts() {
        let mut record = build_day_record("2024-03-11", Some(("09:00", "18:00")), 0.0, 0.0, 0.0);
        record.hhee_autorizadas_antes_gv = 1.0;
        record.hhee_autorizadas_despues_gv = 2.5;
        let session = ValidationSession::seed(&[record]);

        let totals = SummaryTotals::compute(&session);
        assert_eq!(totals.aprobadas_rrhh_antes, dec!(1));
        assert_eq!(totals.aprobadas_rrhh_despues, dec!(2.5));
    }

    // --- Supervisor batch ---

    #[test]
    fn review_defaults_to_the_suggested_amount_per_type() {
        let solicitudes = vec![
            build_solicitud(1, TipoSolicitud::AntesTurno, 0.5),
            build_solicitud(2, TipoSolicitud::DespuesTurno, 1.5),
            build_solicitud(3, TipoSolicitud::Descanso, 4.0),
        ];
        let review = LoteReview::seed(&solicitudes);

        assert_eq!(review.review(1).unwrap().horas_aprobadas, dec!(0.5));
        assert_eq!(review.review(2).unwrap().horas_aprobadas, dec!(1.5));
        assert_eq!(review.review(3).unwrap().horas_aprobadas, dec!(4));
    }

    #[test]
    fn untouched_requests_are_excluded_from_the_lote() {
        let solicitudes = vec![
            build_solicitud(1, TipoSolicitud::DespuesTurno, 1.5),
            build_solicitud(2, TipoSolicitud::DespuesTurno, 2.0),
            build_solicitud(3, TipoSolicitud::Descanso, 4.0),
        ];
        let mut review = LoteReview::seed(&solicitudes);

        // Approve one at the untouched suggestion, reject one, leave the
        // third alone.
        assert_eq!(review.aprobar(1, None), EditOutcome::Applied);
        assert_eq!(
            review.rechazar(2, Some("Sin autorización previa")),
            EditOutcome::Applied
        );

        let decisiones = review.aggregate_decisiones();
        assert_eq!(decisiones.len(), 2, "the untouched request is excluded");

        let aprobada = decisiones.iter().find(|d| d.solicitud_id == 1).unwrap();
        assert_eq!(aprobada.estado, EstadoSolicitud::Aprobada);
        assert_eq!(
            aprobada.horas_aprobadas, 1.5,
            "approving untouched submits the system suggestion"
        );

        let rechazada = decisiones.iter().find(|d| d.solicitud_id == 2).unwrap();
        assert_eq!(rechazada.estado, EstadoSolicitud::Rechazada);
        assert_eq!(
            rechazada.comentario_supervisor.as_deref(),
            Some("Sin autorización previa")
        );
        assert!(!decisiones.iter().any(|d| d.solicitud_id == 3));
    }

    #[test]
    fn hours_override_is_clamped_to_the_suggestion() {
        let solicitudes = vec![build_solicitud(1, TipoSolicitud::DespuesTurno, 1.5)];
        let mut review = LoteReview::seed(&solicitudes);

        assert_eq!(
            review.ajustar_horas(1, "02:00"),
            EditOutcome::RejectedOverCeiling { tope: dec!(1.5) }
        );
        assert_eq!(review.ajustar_horas(1, "01:00"), EditOutcome::Applied);
        review.aprobar(1, None);

        let decisiones = review.aggregate_decisiones();
        assert_eq!(decisiones[0].horas_aprobadas, 1.0);
    }

    #[test]
    fn deshacer_returns_a_request_to_untouched() {
        let solicitudes = vec![build_solicitud(1, TipoSolicitud::AntesTurno, 0.5)];
        let mut review = LoteReview::seed(&solicitudes);

        review.ajustar_horas(1, "00:15");
        review.aprobar(1, Some("ok"));
        assert_eq!(review.deshacer(1), EditOutcome::Applied);

        assert!(review.aggregate_decisiones().is_empty());
        assert_eq!(
            review.review(1).unwrap().horas_aprobadas,
            dec!(0.5),
            "undo restores the suggested amount"
        );
    }

    #[test]
    fn already_resolved_requests_are_not_seeded() {
        let mut resolved = build_solicitud(9, TipoSolicitud::Descanso, 4.0);
        resolved.estado = EstadoSolicitud::Aprobada;
        let review = LoteReview::seed(&[build_solicitud(1, TipoSolicitud::AntesTurno, 0.5), resolved]);
        assert!(review.review(9).is_none());
        assert!(review.review(1).is_some());
    }

    // --- Client-side guards fire before the wire ---

    #[tokio::test]
    async fn empty_batch_aborts_locally_without_calling_the_api() {
        let service = offline_service();
        let records = vec![build_day_record(
            "2024-03-11",
            Some(("09:00", "18:00")),
            0.5,
            1.5,
            0.0,
        )];
        let session = ValidationSession::seed(&records);
        let rut = Rut::normalizar("12.345.678-5").unwrap();

        // The backend is unreachable; reaching it would fail with a
        // transport error, not EmptyBatch.
        let result = service.cargar_validaciones(&rut, &session).await;
        assert!(matches!(result, Err(GtrError::EmptyBatch)));
    }

    #[tokio::test]
    async fn empty_supervisor_lote_aborts_locally() {
        let service = offline_service();
        let review = LoteReview::seed(&[build_solicitud(1, TipoSolicitud::AntesTurno, 0.5)]);
        let result = service.procesar_lote(&review).await;
        assert!(matches!(result, Err(GtrError::EmptyBatch)));
    }

    #[tokio::test]
    async fn malformed_rut_is_rejected_before_the_wire() {
        let service = offline_service();
        let result = service
            .consultar_periodo("12.345.678-9", d("2024-03-01"), d("2024-03-15"))
            .await;
        assert!(matches!(result, Err(GtrError::InvalidRut(_))));
    }

    #[tokio::test]
    async fn inverted_date_range_is_rejected_before_the_wire() {
        let service = offline_service();
        let result = service
            .consultar_periodo("12.345.678-5", d("2024-03-15"), d("2024-03-01"))
            .await;
        assert!(matches!(result, Err(GtrError::InvalidDateRange { .. })));
    }
}
