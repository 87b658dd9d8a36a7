// src/main.rs
use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

mod gtr_client;
mod gtr_data;
mod poller;
mod rut;
mod solicitudes;
mod time_codec;
mod validation;
mod validation_tests;

use gtr_client::{GtrClient, GtrConfig, SolicitudHhee, TipoSolicitud};
use gtr_data::{write_period_csv, ConsultaPeriodo, GtrDataService, ResumenCarga};
use poller::PendingMetricsPoller;
use solicitudes::LoteReview;
use time_codec::{decimal_hours_to_hhmm, decimal_to_hhmm, format_marca};
use validation::{Campo, EditOutcome, SummaryTotals, ValidationSession};

#[derive(Parser)]
#[command(
    name = "gtr-hhee",
    about = "HHEE validation for the GTR portal: query periods, validate per-day overtime, submit decision batches"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Query an employee's period and print the per-day HHEE table
    Consultar {
        #[arg(long)]
        rut: String,
        #[arg(long)]
        desde: NaiveDate,
        #[arg(long)]
        hasta: NaiveDate,
        /// Also export the period as CSV
        #[arg(long)]
        csv: Option<PathBuf>,
    },
    /// List days flagged pending-correction across employees
    Pendientes,
    /// Apply an edits file to the period and submit the decision batch
    Cargar {
        #[arg(long)]
        rut: String,
        #[arg(long)]
        desde: NaiveDate,
        #[arg(long)]
        hasta: NaiveDate,
        /// JSON file with per-day edits
        #[arg(long)]
        edits: PathBuf,
    },
    /// Overtime request listings
    Solicitudes {
        #[command(subcommand)]
        listado: SolicitudesCmd,
    },
    /// Review pending requests from a decisions file and submit the lot
    Procesar {
        #[arg(long)]
        desde: NaiveDate,
        #[arg(long)]
        hasta: NaiveDate,
        /// JSON file with supervisor decisions
        #[arg(long)]
        decisiones: PathBuf,
    },
    /// Period metrics
    Metricas {
        #[arg(long)]
        desde: NaiveDate,
        #[arg(long)]
        hasta: NaiveDate,
        #[arg(long, default_value = "resumen")]
        formato: String,
    },
    /// Poll the pending-HHEE counters until Ctrl-C
    Monitor,
}

#[derive(Subcommand)]
enum SolicitudesCmd {
    Pendientes {
        #[arg(long)]
        desde: NaiveDate,
        #[arg(long)]
        hasta: NaiveDate,
    },
    Historial {
        #[arg(long)]
        desde: NaiveDate,
        #[arg(long)]
        hasta: NaiveDate,
    },
    Mias {
        #[arg(long)]
        desde: NaiveDate,
        #[arg(long)]
        hasta: NaiveDate,
    },
}

/// One day's worth of operator intent, as read from the edits file.
/// A field set to "HH:MM" enables it at that value; "" enables it at the
/// calculated ceiling. `pendiente` carries the required reason text;
/// `quitar_pendiente` clears a previously set flag along with its reason.
#[derive(Debug, Deserialize)]
struct EditInput {
    fecha: NaiveDate,
    antes: Option<String>,
    despues: Option<String>,
    descanso: Option<String>,
    pendiente: Option<String>,
    #[serde(default)]
    quitar_pendiente: bool,
    #[serde(default)]
    revalidar: bool,
}

#[derive(Debug, Deserialize)]
struct DecisionInput {
    solicitud_id: i64,
    accion: Accion,
    /// Override for the hours to approve; defaults to the suggestion.
    horas: Option<String>,
    comentario: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
enum Accion {
    Aprobar,
    Rechazar,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Setting tracing subscriber failed")?;

    let cli = Cli::parse();

    let config = GtrConfig::from_env().context("Loading GTR configuration from environment")?;
    let client = Arc::new(GtrClient::new(config).context("Initializing GTR client")?);
    let service = Arc::new(GtrDataService::new(client));

    match cli.command {
        Command::Consultar {
            rut,
            desde,
            hasta,
            csv,
        } => {
            let consulta = service.consultar_periodo(&rut, desde, hasta).await?;
            print_period(&consulta);
            if let Some(path) = csv {
                write_period_csv(&path, &consulta)?;
                println!("CSV exportado a {}", path.display());
            }
        }
        Command::Pendientes => {
            let response = service.pendientes().await?;
            println!(
                "Días pendientes de corrección ({}): {}",
                response.nombre_agente,
                response.datos_periodo.len()
            );
            for record in &response.datos_periodo {
                println!(
                    "  {}  {}  nota: {}",
                    record.fecha,
                    record.estado_final.as_str(),
                    record.nota.as_deref().unwrap_or("-")
                );
            }
        }
        Command::Cargar {
            rut,
            desde,
            hasta,
            edits,
        } => {
            let mut consulta = service.consultar_periodo(&rut, desde, hasta).await?;
            if consulta.session.is_empty() {
                println!("El período no contiene días");
                return Ok(());
            }
            let inputs: Vec<EditInput> = read_json(&edits)?;
            apply_edits(&mut consulta.session, &inputs);

            let totals = SummaryTotals::compute(&consulta.session);
            println!(
                "Totales tras edición | declaradas antes: {}, después: {}",
                decimal_hours_to_hhmm(totals.declaradas_antes),
                decimal_hours_to_hhmm(totals.declaradas_despues)
            );

            let resumen = service
                .cargar_validaciones(&consulta.rut, &consulta.session)
                .await?;
            print_resumen(&resumen);
        }
        Command::Solicitudes { listado } => match listado {
            SolicitudesCmd::Pendientes { desde, hasta } => {
                print_solicitudes(&service.solicitudes_pendientes(desde, hasta).await?);
            }
            SolicitudesCmd::Historial { desde, hasta } => {
                print_solicitudes(&service.solicitudes_historial(desde, hasta).await?);
            }
            SolicitudesCmd::Mias { desde, hasta } => {
                print_solicitudes(&service.mis_solicitudes(desde, hasta).await?);
            }
        },
        Command::Procesar {
            desde,
            hasta,
            decisiones,
        } => {
            let pendientes = service.solicitudes_pendientes(desde, hasta).await?;
            let mut review = LoteReview::seed(&pendientes);
            if review.is_empty() {
                println!("No hay solicitudes pendientes en el rango");
                return Ok(());
            }
            println!("Solicitudes por revisar:");
            for r in review.reviews() {
                println!(
                    "  #{:<6} {:?} sugerido {}",
                    r.solicitud_id,
                    r.tipo,
                    decimal_hours_to_hhmm(r.sugerencia())
                );
            }

            let inputs: Vec<DecisionInput> = read_json(&decisiones)?;
            apply_decisiones(&mut review, &inputs);

            let (enviadas, detail) = service.procesar_lote(&review).await?;
            println!(
                "Lote procesado: {} decisión(es). Servidor: {}",
                enviadas, detail
            );
        }
        Command::Metricas {
            desde,
            hasta,
            formato,
        } => {
            let metricas = service.metricas(desde, hasta, &formato).await?;
            println!(
                "Métricas {} .. {}: {} declaradas / {} aprobadas, {} día(s) validado(s), {} pendiente(s)",
                metricas.fecha_inicio,
                metricas.fecha_fin,
                decimal_to_hhmm(metricas.total_horas_declaradas),
                decimal_to_hhmm(metricas.total_horas_aprobadas),
                metricas.dias_validados,
                metricas.dias_pendiente_correccion
            );
            for campana in &metricas.por_campana {
                println!(
                    "  {}: {} ({} agente(s))",
                    campana.campana,
                    decimal_to_hhmm(campana.horas_aprobadas),
                    campana.agentes
                );
            }
        }
        Command::Monitor => {
            info!("Starting pending-metrics monitor; Ctrl-C to stop");
            let poller = PendingMetricsPoller::spawn(service.clone(), service.poll_interval());
            tokio::signal::ctrl_c()
                .await
                .context("Waiting for Ctrl-C")?;
            poller.stop().await;
        }
    }

    Ok(())
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let raw =
        std::fs::read_to_string(path).with_context(|| format!("Reading {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("Parsing {}", path.display()))
}

fn apply_edits(session: &mut ValidationSession, inputs: &[EditInput]) {
    for input in inputs {
        if input.revalidar {
            report_outcome(session.revalidar(input.fecha), input.fecha, "revalidar");
        }
        let campos = [
            (Campo::Antes, input.antes.as_deref()),
            (Campo::Despues, input.despues.as_deref()),
            (Campo::Descanso, input.descanso.as_deref()),
        ];
        for (campo, valor) in campos {
            let Some(valor) = valor else { continue };
            report_outcome(
                session.toggle(input.fecha, campo, true),
                input.fecha,
                "habilitar",
            );
            if !valor.trim().is_empty() {
                report_outcome(session.edit(input.fecha, campo, valor), input.fecha, "editar");
            }
        }
        if let Some(motivo) = &input.pendiente {
            report_outcome(
                session.set_pendiente(input.fecha, motivo),
                input.fecha,
                "pendiente",
            );
        } else if input.quitar_pendiente {
            report_outcome(
                session.clear_pendiente(input.fecha),
                input.fecha,
                "quitar pendiente",
            );
        }
    }
}

fn apply_decisiones(review: &mut LoteReview, inputs: &[DecisionInput]) {
    for input in inputs {
        if let Some(horas) = &input.horas {
            let outcome = review.ajustar_horas(input.solicitud_id, horas);
            if outcome != EditOutcome::Applied {
                warn!(
                    "Hours override ignored for request {}: {:?}",
                    input.solicitud_id, outcome
                );
            }
        }
        let outcome = match input.accion {
            Accion::Aprobar => review.aprobar(input.solicitud_id, input.comentario.as_deref()),
            Accion::Rechazar => review.rechazar(input.solicitud_id, input.comentario.as_deref()),
        };
        if outcome != EditOutcome::Applied {
            warn!(
                "Decision ignored for request {}: {:?}",
                input.solicitud_id, outcome
            );
        }
    }
}

fn report_outcome(outcome: EditOutcome, fecha: NaiveDate, accion: &str) {
    match outcome {
        EditOutcome::Applied => {}
        EditOutcome::RejectedOverCeiling { tope } => warn!(
            "{} rechazado para {}: excede el tope calculado ({})",
            accion,
            fecha,
            decimal_hours_to_hhmm(tope)
        ),
        other => warn!("{} ignorado para {}: {:?}", accion, fecha, other),
    }
}

fn print_period(consulta: &ConsultaPeriodo) {
    println!(
        "Agente: {} ({}), {} día(s)",
        consulta.nombre_agente,
        consulta.rut,
        consulta.registros.len()
    );
    println!(
        "{:<12} {:<14} {:<24} {:<24} {:>7} {:>8} {:>8}  {}",
        "fecha", "turno", "marca inicio", "marca fin", "antes", "después", "descanso", "estado"
    );
    for record in &consulta.registros {
        let turno = match (&record.inicio_turno_teorico, &record.fin_turno_teorico) {
            (Some(i), Some(f)) if !i.trim().is_empty() => format!("{}-{}", i, f),
            _ => "descanso".to_string(),
        };
        println!(
            "{:<12} {:<14} {:<24} {:<24} {:>7} {:>8} {:>8}  {}",
            record.fecha.to_string(),
            turno,
            format_marca(record.marca_real_inicio.as_deref()),
            format_marca(record.marca_real_fin.as_deref()),
            decimal_to_hhmm(record.hhee_inicio_calculadas),
            decimal_to_hhmm(record.hhee_fin_calculadas),
            decimal_to_hhmm(record.cantidad_hhee_calculadas),
            record.estado_final.as_str()
        );
    }

    let totals = SummaryTotals::compute(&consulta.session);
    println!(
        "Totales | declaradas antes: {}, después: {} | aprobadas RRHH antes: {}, después: {}",
        decimal_hours_to_hhmm(totals.declaradas_antes),
        decimal_hours_to_hhmm(totals.declaradas_despues),
        decimal_hours_to_hhmm(totals.aprobadas_rrhh_antes),
        decimal_hours_to_hhmm(totals.aprobadas_rrhh_despues)
    );
}

fn print_resumen(resumen: &ResumenCarga) {
    println!(
        "Carga enviada: {} día(s), {} pendiente(s) de corrección. Servidor: {}",
        resumen.total_dias(),
        resumen.dias_pendiente_correccion,
        resumen.mensaje_servidor
    );
    for item in &resumen.enviados {
        println!(
            "  {}  antes {}  después {}  descanso {}  {}{}",
            item.fecha,
            decimal_to_hhmm(item.hhee_aprobadas_inicio),
            decimal_to_hhmm(item.hhee_aprobadas_fin),
            decimal_to_hhmm(item.hhee_aprobadas_descanso),
            if item.turno_es_incorrecto {
                "turno incorrecto"
            } else {
                "ok"
            },
            item.nota
                .as_deref()
                .map(|n| format!(" ({})", n))
                .unwrap_or_default()
        );
    }
    println!(
        "Totales enviados | antes: {}, después: {}, descanso: {}",
        decimal_hours_to_hhmm(resumen.total_antes),
        decimal_hours_to_hhmm(resumen.total_despues),
        decimal_hours_to_hhmm(resumen.total_descanso)
    );
}

fn print_solicitudes(solicitudes: &[SolicitudHhee]) {
    println!("{} solicitud(es)", solicitudes.len());
    for s in solicitudes {
        let tipo = match s.tipo {
            TipoSolicitud::AntesTurno => "antes",
            TipoSolicitud::DespuesTurno => "después",
            TipoSolicitud::Descanso => "descanso",
        };
        println!(
            "  #{:<6} {}  {}  {:<9} solicitadas {}  estado {:?}  {}",
            s.solicitud_id,
            s.fecha,
            s.rut_con_formato,
            tipo,
            decimal_to_hhmm(s.horas_solicitadas),
            s.estado,
            s.comentario_supervisor.as_deref().unwrap_or("")
        );
    }
}
